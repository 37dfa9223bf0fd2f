mod auth;
mod gato;
mod groups;
mod social;

use crate::session::Session;
use anyhow::Result;
use tokio::io::AsyncRead;

impl<R: AsyncRead + Unpin> Session<R> {
    pub(crate) async fn help(&self) -> Result<()> {
        for line in [
            "=== COMANDOS DISPONIBLES ===",
            "registrar - Crear una nueva cuenta",
            "login - Iniciar sesión",
            "logout - Cerrar sesión",
            "@ o privado - Enviar mensaje privado (muestra usuarios)",
            "bloquear - Bloquear usuario (muestra lista)",
            "desbloquear - Desbloquear usuario (muestra lista)",
            "misBloqueados - Ver lista de usuarios bloqueados",
            "--- GRUPOS ---",
            "crearGrupo - Crear un grupo nuevo",
            "eliminarGrupo - Eliminar un grupo que creaste",
            "unirse - Unirse a un grupo",
            "salirGrupo - Salir de un grupo",
            "grupos - Ver todos los grupos",
            "misGrupos - Ver tus grupos y mensajes sin leer",
            "miembros - Ver miembros de un grupo",
            "cambiarGrupo - Cambiar tu grupo activo",
            "grupoActual - Ver tu grupo activo",
            "--- JUEGO DEL GATO ---",
            "gato o jugar - Invitar a alguien a jugar",
            "aceptar - Aceptar invitación de juego",
            "rechazar - Rechazar invitación de juego",
            "partidas - Ver tus partidas activas",
            "jugar fila columna - Realizar movimiento (ej: jugar 1 2)",
            "rendirse - Abandonar partida actual",
            "ranking - Ver el ranking general",
            "vs o estadisticas - Ver estadísticas contra otro jugador",
            "help - Mostrar esta ayuda",
        ] {
            self.send(line).await?;
        }
        Ok(())
    }

    /// Online registered users other than the caller, sorted.
    pub(crate) fn online_accounts(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .presence
            .snapshot()
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| name != &self.name && !charla::is_guest(name))
            .collect();
        names.sort();
        names
    }
}

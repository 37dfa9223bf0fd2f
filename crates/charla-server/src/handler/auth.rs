use crate::presence::RenameError;
use crate::session::{Session, guest_name, notify_all, store_try};
use anyhow::{Result, anyhow};
use charla::DEFAULT_GROUP;
use tokio::io::AsyncRead;

impl<R: AsyncRead + Unpin> Session<R> {
    pub(crate) async fn register(&mut self) -> Result<()> {
        if self.authenticated {
            self.send("[ERROR]: Ya has iniciado sesión. Escribe 'logout' primero.")
                .await?;
            return Ok(());
        }
        if self.state.games.in_game(&self.name) {
            self.send("[ERROR]: Termina tu partida antes de cambiar de sesión.")
                .await?;
            return Ok(());
        }

        self.send("[SISTEMA]: === REGISTRO ===").await?;
        self.send("[SISTEMA]: Ingresa tu nuevo nombre de usuario:")
            .await?;
        let name = self.read_prompt().await?;

        if let Err(reason) = charla::validate_name(&name) {
            self.send(format!(
                "[ERROR]: Nombre inválido: {reason}. Intenta de nuevo escribiendo 'registrar'."
            ))
            .await?;
            return Ok(());
        }
        if store_try!(self, self.state.store.name_taken(&name).await) {
            self.send(format!("[ERROR]: El nombre '{name}' ya está en uso."))
                .await?;
            return Ok(());
        }

        self.send("[SISTEMA]: Ingresa tu contraseña:").await?;
        let password = self.read_prompt().await?;
        if password.is_empty() {
            self.send("[ERROR]: La contraseña no puede estar vacía.")
                .await?;
            return Ok(());
        }

        // The UNIQUE constraint arbitrates racing registrations; losing
        // the race reads the same as a taken name.
        if self
            .state
            .store
            .register_account(&name, &password)
            .await
            .is_err()
        {
            self.send(format!("[ERROR]: El nombre '{name}' ya está en uso."))
                .await?;
            return Ok(());
        }

        match self.state.presence.rename(&self.name, &name) {
            Ok(()) => {}
            Err(RenameError::Taken) => {
                self.send("[ERROR]: El usuario ya está conectado en otra sesión.")
                    .await?;
                return Ok(());
            }
            Err(RenameError::Missing) => {
                return Err(anyhow!("session '{}' missing from presence", self.name));
            }
        }

        self.name = name;
        self.authenticated = true;
        self.free_used = 0;
        self.send(format!(
            "[SISTEMA]: ¡Registro exitoso! Ahora eres: {}",
            self.name
        ))
        .await?;
        tracing::info!(name = %self.name, "account registered");
        notify_all(
            &self.state,
            &self.name,
            &format!("{} se ha unido al chat.", self.name),
        )
        .await;
        Ok(())
    }

    pub(crate) async fn login(&mut self) -> Result<()> {
        if self.authenticated {
            self.send("[ERROR]: Ya has iniciado sesión. Escribe 'logout' primero.")
                .await?;
            return Ok(());
        }
        if self.state.games.in_game(&self.name) {
            self.send("[ERROR]: Termina tu partida antes de cambiar de sesión.")
                .await?;
            return Ok(());
        }

        self.send("[SISTEMA]: === INICIO DE SESIÓN ===").await?;
        self.send("[SISTEMA]: Ingresa tu nombre de usuario:").await?;
        let name = self.read_prompt().await?;
        self.send("[SISTEMA]: Ingresa tu contraseña:").await?;
        let password = self.read_prompt().await?;

        if !store_try!(self, self.state.store.authenticate(&name, &password).await) {
            self.send("[ERROR]: Usuario o contraseña incorrectos.")
                .await?;
            return Ok(());
        }

        // One live session per account; the registry picks the winner.
        match self.state.presence.rename(&self.name, &name) {
            Ok(()) => {}
            Err(RenameError::Taken) => {
                self.send("[ERROR]: El usuario ya está conectado en otra sesión.")
                    .await?;
                return Ok(());
            }
            Err(RenameError::Missing) => {
                return Err(anyhow!("session '{}' missing from presence", self.name));
            }
        }

        self.name = name;
        self.authenticated = true;
        self.free_used = 0;
        self.send(format!(
            "[SISTEMA]: ¡Inicio de sesión exitoso! Bienvenido de nuevo, {}",
            self.name
        ))
        .await?;
        tracing::info!(name = %self.name, "logged in");
        notify_all(
            &self.state,
            &self.name,
            &format!("{} se ha unido al chat.", self.name),
        )
        .await;
        Ok(())
    }

    pub(crate) async fn logout(&mut self) -> Result<()> {
        if !self.authenticated {
            self.send("[SISTEMA]: No has iniciado sesión.").await?;
            return Ok(());
        }
        if self.state.games.in_game(&self.name) {
            self.send("[ERROR]: Termina tu partida antes de cambiar de sesión.")
                .await?;
            return Ok(());
        }

        let old = self.name.clone();
        let guest = guest_name();
        if let Err(e) = self.state.presence.rename(&old, &guest) {
            return Err(anyhow!("failed to release identity '{old}': {e:?}"));
        }

        self.name = guest;
        self.authenticated = false;
        self.free_used = 0;
        self.handle.set_group(DEFAULT_GROUP);

        self.send(format!(
            "[SISTEMA]: Has cerrado sesión. Ahora eres: {}",
            self.name
        ))
        .await?;
        self.send(format!(
            "[SISTEMA]: Tienes {} mensajes gratuitos. Escribe 'login' para iniciar sesión nuevamente.",
            self.state.free_limit
        ))
        .await?;
        tracing::info!(name = %old, "logged out");
        notify_all(&self.state, &self.name, &format!("{old} ha cerrado sesión.")).await;
        Ok(())
    }
}

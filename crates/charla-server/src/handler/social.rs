use crate::session::{Session, store_try};
use anyhow::Result;
use tokio::io::AsyncRead;

impl<R: AsyncRead + Unpin> Session<R> {
    /// `@` / `privado`: list online users, then read one
    /// `usuario mensaje` line and deliver it directly.
    pub(crate) async fn private_message(&mut self) -> Result<()> {
        let online = self.online_accounts();
        if online.is_empty() {
            self.send("[SISTEMA]: No hay usuarios online.").await?;
            return Ok(());
        }
        self.send(format!("[USUARIOS ONLINE]: {}", online.join(", ")))
            .await?;
        self.send("[SISTEMA]: Escribe: usuario mensaje").await?;

        let input = self.read_prompt().await?;
        let Some((target, body)) = input.split_once(' ') else {
            self.send("[ERROR]: Formato incorrecto. Usa: usuario mensaje")
                .await?;
            return Ok(());
        };
        let target = target.to_string();
        let body = body.trim().to_string();

        if !store_try!(self, self.state.store.name_taken(&target).await) {
            self.send(format!("[ERROR]: Usuario '{target}' no existe."))
                .await?;
            return Ok(());
        }
        if !self.authenticated && self.free_used >= self.state.free_limit {
            self.send("[ERROR]: Debes autenticarte para enviar mensajes privados.")
                .await?;
            return Ok(());
        }
        // Delivery is refused when the recipient has blocked the sender.
        if store_try!(self, self.state.store.block_exists(&target, &self.name).await) {
            self.send(format!(
                "[ERROR]: No puedes enviar mensajes a {target} (bloqueado)."
            ))
            .await?;
            return Ok(());
        }

        match self.state.presence.lookup(&target) {
            Some(handle) => {
                let _ = handle
                    .tx
                    .send(format!("[PRIVADO de {}]: {body}", self.name))
                    .await;
                self.send(format!("[Mensaje privado enviado a {target}]: {body}"))
                    .await?;
                if !self.authenticated {
                    self.free_used += 1;
                }
            }
            None => {
                self.send(format!(
                    "[AVISO]: {target} no está conectado en este momento."
                ))
                .await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn block_user(&mut self) -> Result<()> {
        if !self.authenticated {
            self.send("[ERROR]: Debes estar autenticado para bloquear usuarios.")
                .await?;
            return Ok(());
        }

        let blocked = store_try!(self, self.state.store.blocked_by(&self.name).await);
        let candidates: Vec<String> =
            store_try!(self, self.state.store.list_users().await)
                .into_iter()
                .filter(|u| u != &self.name && !blocked.contains(u))
                .collect();
        if candidates.is_empty() {
            self.send("[SISTEMA]: No hay usuarios disponibles para bloquear.")
                .await?;
            return Ok(());
        }
        self.send(format!("[USUARIOS]: {}", candidates.join(", ")))
            .await?;
        self.send("[SISTEMA]: Escribe el nombre del usuario:").await?;

        let target = self.read_prompt().await?;
        if target.is_empty() {
            self.send("[SISTEMA]: Operación cancelada.").await?;
            return Ok(());
        }
        if target == self.name {
            self.send("[ERROR]: No puedes bloquearte a ti mismo.").await?;
            return Ok(());
        }
        if !store_try!(self, self.state.store.name_taken(&target).await) {
            self.send(format!("[ERROR]: El usuario '{target}' no existe."))
                .await?;
            return Ok(());
        }
        if store_try!(self, self.state.store.block_exists(&self.name, &target).await) {
            self.send(format!("[ERROR]: Ya tienes bloqueado a {target}."))
                .await?;
            return Ok(());
        }

        if store_try!(self, self.state.store.block(&self.name, &target).await) {
            self.send(format!(
                "[SISTEMA]: ¡Usuario '{target}' bloqueado correctamente!"
            ))
            .await?;
        } else {
            self.send("[ERROR]: No se pudo bloquear al usuario. Intenta de nuevo.")
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn unblock_user(&mut self) -> Result<()> {
        if !self.authenticated {
            self.send("[ERROR]: Debes estar autenticado para desbloquear usuarios.")
                .await?;
            return Ok(());
        }

        let blocked = store_try!(self, self.state.store.blocked_by(&self.name).await);
        if blocked.is_empty() {
            self.send("[SISTEMA]: No tienes usuarios bloqueados.").await?;
            return Ok(());
        }
        self.send(format!("[BLOQUEADOS]: {}", blocked.join(", ")))
            .await?;
        self.send("[SISTEMA]: Escribe el nombre del usuario:").await?;

        let target = self.read_prompt().await?;
        if target.is_empty() {
            self.send("[SISTEMA]: Operación cancelada.").await?;
            return Ok(());
        }
        if !store_try!(self, self.state.store.name_taken(&target).await) {
            self.send(format!("[ERROR]: El usuario '{target}' no existe."))
                .await?;
            return Ok(());
        }

        if store_try!(self, self.state.store.unblock(&self.name, &target).await) {
            self.send(format!(
                "[SISTEMA]: ¡Usuario '{target}' desbloqueado correctamente!"
            ))
            .await?;
        } else {
            self.send(format!("[ERROR]: No tienes bloqueado a {target}."))
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn list_blocked(&mut self) -> Result<()> {
        if !self.authenticated {
            self.send("[ERROR]: Debes estar autenticado para ver tu lista de bloqueados.")
                .await?;
            return Ok(());
        }
        let blocked = store_try!(self, self.state.store.blocked_by(&self.name).await);
        if blocked.is_empty() {
            self.send("[SISTEMA]: No tienes usuarios bloqueados.").await?;
            return Ok(());
        }
        self.send("[SISTEMA]: === USUARIOS BLOQUEADOS ===").await?;
        for (i, name) in blocked.iter().enumerate() {
            self.send(format!("{}. {name}", i + 1)).await?;
        }
        self.send(format!(
            "[SISTEMA]: Total: {} usuario(s) bloqueado(s)",
            blocked.len()
        ))
        .await?;
        Ok(())
    }
}

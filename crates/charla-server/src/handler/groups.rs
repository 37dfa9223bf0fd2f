use crate::router::{self, RouteError};
use crate::session::{Session, notify_group, store_try};
use anyhow::Result;
use charla::DEFAULT_GROUP;
use tokio::io::AsyncRead;

impl<R: AsyncRead + Unpin> Session<R> {
    async fn require_auth_for_groups(&self) -> Result<bool> {
        if self.authenticated {
            return Ok(true);
        }
        self.send("[ERROR]: Debes estar autenticado para usar grupos.")
            .await?;
        Ok(false)
    }

    /// Prompt for a group name; empty input cancels the operation.
    async fn read_group_name(&mut self, prompt: &str) -> Result<Option<String>> {
        self.send(format!("[SISTEMA]: {prompt}")).await?;
        let name = self.read_prompt().await?;
        if name.is_empty() {
            self.send("[SISTEMA]: Operación cancelada.").await?;
            return Ok(None);
        }
        Ok(Some(name))
    }

    pub(crate) async fn create_group(&mut self) -> Result<()> {
        if !self.require_auth_for_groups().await? {
            return Ok(());
        }
        let Some(group) = self
            .read_group_name("Ingresa el nombre del nuevo grupo:")
            .await?
        else {
            return Ok(());
        };
        if let Err(reason) = charla::validate_name(&group) {
            self.send(format!("[ERROR]: Nombre de grupo inválido: {reason}."))
                .await?;
            return Ok(());
        }
        if store_try!(self, self.state.store.group_exists(&group).await) {
            self.send(format!("[ERROR]: El grupo '{group}' ya existe."))
                .await?;
            return Ok(());
        }
        if self
            .state
            .store
            .create_group(&group, &self.name)
            .await
            .is_err()
        {
            // Lost a creation race; same outcome as the exists check.
            self.send(format!("[ERROR]: El grupo '{group}' ya existe."))
                .await?;
            return Ok(());
        }
        tracing::info!(group = %group, creator = %self.name, "group created");
        self.send(format!(
            "[SISTEMA]: ¡Grupo '{group}' creado correctamente! Ya eres miembro."
        ))
        .await?;
        Ok(())
    }

    pub(crate) async fn delete_group(&mut self) -> Result<()> {
        if !self.require_auth_for_groups().await? {
            return Ok(());
        }
        let Some(group) = self
            .read_group_name("Ingresa el nombre del grupo a eliminar:")
            .await?
        else {
            return Ok(());
        };
        if group == DEFAULT_GROUP {
            self.send(format!("[ERROR]: No puedes eliminar el grupo '{DEFAULT_GROUP}'."))
                .await?;
            return Ok(());
        }
        let creator = store_try!(self, self.state.store.group_creator(&group).await);
        let Some(creator) = creator else {
            self.send(format!("[ERROR]: El grupo '{group}' no existe."))
                .await?;
            return Ok(());
        };
        if creator != self.name {
            self.send("[ERROR]: Solo el creador puede eliminar el grupo.")
                .await?;
            return Ok(());
        }

        store_try!(self, self.state.store.delete_group(&group).await);
        tracing::info!(group = %group, "group deleted");

        // Anyone watching the deleted group falls back to the default.
        for (name, handle) in self.state.presence.snapshot() {
            if handle.group() == group {
                handle.set_group(DEFAULT_GROUP);
                if name != self.name {
                    let _ = handle
                        .tx
                        .send(format!(
                            "[SISTEMA]: El grupo '{group}' fue eliminado. Ahora estás en '{DEFAULT_GROUP}'."
                        ))
                        .await;
                }
            }
        }
        self.send(format!("[SISTEMA]: Grupo '{group}' eliminado."))
            .await?;
        Ok(())
    }

    pub(crate) async fn join_group(&mut self) -> Result<()> {
        if !self.require_auth_for_groups().await? {
            return Ok(());
        }
        let Some(group) = self.read_group_name("Ingresa el nombre del grupo:").await? else {
            return Ok(());
        };
        if !store_try!(self, self.state.store.group_exists(&group).await) {
            self.send(format!("[ERROR]: El grupo '{group}' no existe."))
                .await?;
            return Ok(());
        }
        if store_try!(self, self.state.store.join_group(&self.name, &group).await) {
            self.send(format!("[SISTEMA]: Te has unido al grupo '{group}'."))
                .await?;
            notify_group(
                &self.state,
                &group,
                &self.name,
                &format!("{} se ha unido al grupo '{group}'.", self.name),
            )
            .await;
        } else {
            self.send(format!("[ERROR]: Ya eres miembro del grupo '{group}'."))
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn leave_group(&mut self) -> Result<()> {
        if !self.require_auth_for_groups().await? {
            return Ok(());
        }
        let Some(group) = self.read_group_name("Ingresa el nombre del grupo:").await? else {
            return Ok(());
        };
        if group == DEFAULT_GROUP {
            self.send(format!("[ERROR]: No puedes salir del grupo '{DEFAULT_GROUP}'."))
                .await?;
            return Ok(());
        }
        if !store_try!(self, self.state.store.group_exists(&group).await) {
            self.send(format!("[ERROR]: El grupo '{group}' no existe."))
                .await?;
            return Ok(());
        }
        if store_try!(self, self.state.store.leave_group(&self.name, &group).await) {
            self.send(format!("[SISTEMA]: Has salido del grupo '{group}'."))
                .await?;
            if self.handle.group() == group {
                self.handle.set_group(DEFAULT_GROUP);
                self.send(format!("[SISTEMA]: Ahora estás en '{DEFAULT_GROUP}'."))
                    .await?;
            }
        } else {
            self.send(format!("[ERROR]: No eres miembro del grupo '{group}'."))
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn list_groups(&mut self) -> Result<()> {
        let groups = store_try!(self, self.state.store.list_groups().await);
        self.send("[SISTEMA]: === GRUPOS ===").await?;
        for g in groups {
            self.send(format!(
                "{} [{} miembros] (creador: {})",
                g.name, g.member_count, g.creator
            ))
            .await?;
        }
        Ok(())
    }

    /// The caller's groups with their unread counts.
    pub(crate) async fn my_groups(&mut self) -> Result<()> {
        if !self.require_auth_for_groups().await? {
            return Ok(());
        }
        let groups = store_try!(self, self.state.store.groups_of(&self.name).await);
        if groups.is_empty() {
            self.send("[SISTEMA]: No perteneces a ningún grupo.").await?;
            return Ok(());
        }
        let current = self.handle.group();
        self.send("[SISTEMA]: === MIS GRUPOS ===").await?;
        for group in groups {
            let unread = store_try!(
                self,
                self.state.store.unread_count(&self.name, &group).await
            );
            let marker = if group == current { " (actual)" } else { "" };
            self.send(format!("{group}{marker} - {unread} mensajes sin leer"))
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn group_members(&mut self) -> Result<()> {
        let Some(group) = self.read_group_name("Ingresa el nombre del grupo:").await? else {
            return Ok(());
        };
        if !store_try!(self, self.state.store.group_exists(&group).await) {
            self.send(format!("[ERROR]: El grupo '{group}' no existe."))
                .await?;
            return Ok(());
        }
        let members = store_try!(self, self.state.store.members_of(&group).await);
        self.send(format!("[MIEMBROS de {group}]: {}", members.join(", ")))
            .await?;
        Ok(())
    }

    pub(crate) async fn switch_group(&mut self) -> Result<()> {
        if !self.require_auth_for_groups().await? {
            return Ok(());
        }
        let Some(group) = self.read_group_name("Ingresa el nombre del grupo:").await? else {
            return Ok(());
        };
        if !store_try!(self, self.state.store.group_exists(&group).await) {
            self.send(format!("[ERROR]: El grupo '{group}' no existe."))
                .await?;
            return Ok(());
        }
        match router::switch_group(&self.state, &self.name, &group).await {
            Ok(unread) => {
                self.send(format!("[SISTEMA]: Ahora estás en el grupo '{group}'."))
                    .await?;
                if !unread.is_empty() {
                    self.send(format!(
                        "[SISTEMA]: Tienes {} mensajes sin leer:",
                        unread.len()
                    ))
                    .await?;
                    for m in &unread {
                        self.send(router::format_message(&group, &m.sender, &m.body))
                            .await?;
                    }
                }
            }
            Err(RouteError::NotMember) => {
                self.send(format!("[ERROR]: No eres miembro del grupo '{group}'."))
                    .await?;
            }
            Err(RouteError::Store(e)) => {
                tracing::error!(err = %e, "store operation failed");
                self.send("[ERROR]: persistencia no disponible. Intenta de nuevo.")
                    .await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn current_group(&mut self) -> Result<()> {
        self.send(format!(
            "[SISTEMA]: Tu grupo actual es '{}'.",
            self.handle.group()
        ))
        .await?;
        Ok(())
    }
}

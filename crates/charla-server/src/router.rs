use crate::session::ServerState;
use charla::DEFAULT_GROUP;
use charla_store::StoredMessage;
use std::collections::BTreeSet;

pub enum RouteError {
    /// The sender does not belong to the group.
    NotMember,
    Store(anyhow::Error),
}

pub fn format_message(group: &str, sender: &str, body: &str) -> String {
    format!("[{group}] {sender}: {body}")
}

/// Fan a group message out. The message is persisted first, then every
/// other member sees it according to where they are: watching the group
/// gets the full text (and their cursor advances), online elsewhere gets
/// a content-free notice, offline gets nothing and their unread grows.
pub async fn send_to_group(
    state: &ServerState,
    sender: &str,
    group: &str,
    body: &str,
) -> Result<(), RouteError> {
    let member = if charla::is_guest(sender) {
        // Guests have no membership rows; they belong to the default
        // group and nothing else.
        group == DEFAULT_GROUP
    } else {
        state
            .store
            .is_member(sender, group)
            .await
            .map_err(RouteError::Store)?
    };
    if !member {
        return Err(RouteError::NotMember);
    }

    let id = state
        .store
        .append_message(group, sender, body)
        .await
        .map_err(RouteError::Store)?;
    if !charla::is_guest(sender) {
        state
            .store
            .set_cursor(sender, group, id)
            .await
            .map_err(RouteError::Store)?;
    }

    // Recipients: persisted members plus any online session currently
    // watching the group (covers guests in the default group).
    let mut recipients: BTreeSet<String> = state
        .store
        .members_of(group)
        .await
        .map_err(RouteError::Store)?
        .into_iter()
        .collect();
    for (name, handle) in state.presence.snapshot() {
        if handle.group() == group {
            recipients.insert(name);
        }
    }
    recipients.remove(sender);

    let text = format_message(group, sender, body);
    for name in recipients {
        let Some(handle) = state.presence.lookup(&name) else {
            continue;
        };
        if handle.group() == group {
            if handle.tx.send(text.clone()).await.is_err() {
                tracing::debug!(name = %name, "delivery failed, session going away");
                continue;
            }
            if !charla::is_guest(&name) {
                if let Err(e) = state.store.set_cursor(&name, group, id).await {
                    tracing::debug!(name = %name, err = %e, "cursor advance failed");
                }
            }
        } else {
            let notice = format!("[SISTEMA]: Nuevo mensaje en el grupo '{group}'.");
            if handle.tx.send(notice).await.is_err() {
                tracing::debug!(name = %name, "notice failed, session going away");
            }
        }
    }
    Ok(())
}

/// Point the session at another group and collect its unread backlog.
/// The caller replays the returned messages; the cursor has already been
/// advanced past them.
pub async fn switch_group(
    state: &ServerState,
    user: &str,
    group: &str,
) -> Result<Vec<StoredMessage>, RouteError> {
    if !state
        .store
        .is_member(user, group)
        .await
        .map_err(RouteError::Store)?
    {
        return Err(RouteError::NotMember);
    }
    if let Some(handle) = state.presence.lookup(user) {
        handle.set_group(group);
    }
    let unread = state
        .store
        .unread_since(user, group)
        .await
        .map_err(RouteError::Store)?;
    if let Some(last) = unread.last() {
        state
            .store
            .set_cursor(user, group, last.id)
            .await
            .map_err(RouteError::Store)?;
    }
    Ok(unread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::SessionHandle;
    use crate::session::ServerState;
    use charla_store::ChatStore;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    async fn state() -> Arc<ServerState> {
        ServerState::new(ChatStore::open(None).unwrap(), 3)
    }

    fn connect(state: &ServerState, name: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(32);
        assert!(state.presence.claim(name, SessionHandle::new(tx)));
        rx
    }

    #[tokio::test]
    async fn watching_members_get_full_text_and_cursor_advance() {
        let state = state().await;
        state.store.register_account("ana", "a").await.unwrap();
        state.store.register_account("beto", "b").await.unwrap();
        let _ana = connect(&state, "ana");
        let mut beto = connect(&state, "beto");

        send_to_group(&state, "ana", DEFAULT_GROUP, "hola")
            .await
            .map_err(|_| "route failed")
            .unwrap();

        assert_eq!(beto.recv().await.unwrap(), "[Todos] ana: hola");
        assert_eq!(
            state.store.unread_count("beto", DEFAULT_GROUP).await.unwrap(),
            0
        );
        // The sender never counts their own message as unread.
        assert_eq!(
            state.store.unread_count("ana", DEFAULT_GROUP).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn member_in_another_group_gets_notice_and_keeps_unread() {
        let state = state().await;
        state.store.register_account("ana", "a").await.unwrap();
        state.store.register_account("beto", "b").await.unwrap();
        state.store.create_group("amigos", "beto").await.unwrap();
        let _ana = connect(&state, "ana");
        let mut beto = connect(&state, "beto");
        state.presence.lookup("beto").unwrap().set_group("amigos");

        send_to_group(&state, "ana", DEFAULT_GROUP, "hola")
            .await
            .map_err(|_| "route failed")
            .unwrap();

        assert_eq!(
            beto.recv().await.unwrap(),
            "[SISTEMA]: Nuevo mensaje en el grupo 'Todos'."
        );
        assert_eq!(
            state.store.unread_count("beto", DEFAULT_GROUP).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn offline_member_accumulates_unread_silently() {
        let state = state().await;
        state.store.register_account("ana", "a").await.unwrap();
        state.store.register_account("beto", "b").await.unwrap();
        let _ana = connect(&state, "ana");

        send_to_group(&state, "ana", DEFAULT_GROUP, "uno").await.ok();
        send_to_group(&state, "ana", DEFAULT_GROUP, "dos").await.ok();

        assert_eq!(
            state.store.unread_count("beto", DEFAULT_GROUP).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn non_member_is_rejected_before_persisting() {
        let state = state().await;
        state.store.register_account("ana", "a").await.unwrap();
        state.store.register_account("beto", "b").await.unwrap();
        state.store.create_group("amigos", "beto").await.unwrap();
        let _ana = connect(&state, "ana");

        assert!(matches!(
            send_to_group(&state, "ana", "amigos", "hola").await,
            Err(RouteError::NotMember)
        ));
        assert_eq!(state.store.unread_count("beto", "amigos").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn guests_may_only_reach_the_default_group() {
        let state = state().await;
        state.store.register_account("ana", "a").await.unwrap();
        state.store.create_group("amigos", "ana").await.unwrap();
        let _guest = connect(&state, "invitado_abc12345");

        assert!(
            send_to_group(&state, "invitado_abc12345", DEFAULT_GROUP, "hola")
                .await
                .is_ok()
        );
        assert!(matches!(
            send_to_group(&state, "invitado_abc12345", "amigos", "hola").await,
            Err(RouteError::NotMember)
        ));
    }

    #[tokio::test]
    async fn switch_replays_unread_in_order_and_advances_cursor() {
        let state = state().await;
        state.store.register_account("ana", "a").await.unwrap();
        state.store.register_account("beto", "b").await.unwrap();
        state.store.create_group("amigos", "ana").await.unwrap();
        state.store.join_group("beto", "amigos").await.unwrap();
        let _ana = connect(&state, "ana");
        state.presence.lookup("ana").unwrap().set_group("amigos");

        send_to_group(&state, "ana", "amigos", "uno").await.ok();
        send_to_group(&state, "ana", "amigos", "dos").await.ok();

        let _beto = connect(&state, "beto");
        let replayed = switch_group(&state, "beto", "amigos")
            .await
            .map_err(|_| "switch failed")
            .unwrap();
        let bodies: Vec<&str> = replayed.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["uno", "dos"]);
        assert_eq!(
            state.presence.lookup("beto").unwrap().group(),
            "amigos"
        );
        assert_eq!(state.store.unread_count("beto", "amigos").await.unwrap(), 0);

        // A second switch replays nothing.
        let replayed = switch_group(&state, "beto", "amigos").await.ok().unwrap();
        assert!(replayed.is_empty());
    }

    #[tokio::test]
    async fn switch_requires_membership() {
        let state = state().await;
        state.store.register_account("ana", "a").await.unwrap();
        state.store.register_account("beto", "b").await.unwrap();
        state.store.create_group("amigos", "ana").await.unwrap();
        let _beto = connect(&state, "beto");

        assert!(matches!(
            switch_group(&state, "beto", "amigos").await,
            Err(RouteError::NotMember)
        ));
        // Still pointed at the default group.
        assert_eq!(
            state.presence.lookup("beto").unwrap().group(),
            DEFAULT_GROUP
        );
    }
}

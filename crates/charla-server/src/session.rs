use crate::game::GameTable;
use crate::invites::InviteTable;
use crate::presence::{Presence, SessionHandle};
use crate::router::{self, RouteError};
use anyhow::{Context, Result, anyhow};
use charla::{Command, FrameCodec, GUEST_PREFIX};
use charla_store::ChatStore;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use uuid::Uuid;

/// Everything shared across client connections.
pub struct ServerState {
    pub store: ChatStore,
    pub presence: Presence,
    pub games: GameTable,
    pub invites: InviteTable,
    pub free_limit: u32,
}

impl ServerState {
    pub fn new(store: ChatStore, free_limit: u32) -> Arc<Self> {
        Arc::new(Self {
            store,
            presence: Presence::new(),
            games: GameTable::new(),
            invites: InviteTable::new(),
            free_limit,
        })
    }
}

/// Run a store call inside a handler; a failure reports to the client
/// and aborts the handler, never the connection.
macro_rules! store_try {
    ($sess:expr, $res:expr) => {
        match $res {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(err = %e, "store operation failed");
                $sess
                    .send("[ERROR]: persistencia no disponible. Intenta de nuevo.")
                    .await?;
                return Ok(());
            }
        }
    };
}
pub(crate) use store_try;

/// One client connection. `run` drives the read loop; every outbound
/// frame goes through `handle.tx` so the writer task is the only thing
/// touching the socket's write half.
pub(crate) struct Session<R> {
    pub(crate) state: Arc<ServerState>,
    pub(crate) reader: FramedRead<R, FrameCodec>,
    pub(crate) handle: SessionHandle,
    pub(crate) name: String,
    pub(crate) authenticated: bool,
    pub(crate) free_used: u32,
}

pub(crate) fn guest_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{GUEST_PREFIX}{}", &id[..8])
}

/// Serve one client. Generic over the stream so tests can drive it with
/// an in-memory duplex pipe.
pub async fn serve_connection<S>(state: Arc<ServerState>, stream: S)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let reader = FramedRead::new(read_half, FrameCodec);
    let mut writer = FramedWrite::new(write_half, FrameCodec);

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if writer.send(frame).await.is_err() {
                break;
            }
        }
    });

    let name = guest_name();
    let handle = SessionHandle::new(tx);
    if !state.presence.claim(&name, handle.clone()) {
        tracing::error!(name = %name, "guest identity collision");
        return;
    }
    tracing::info!(name = %name, "client connected");

    let mut session = Session {
        state: state.clone(),
        reader,
        handle,
        name,
        authenticated: false,
        free_used: 0,
    };

    if let Err(e) = session.run().await {
        tracing::debug!(name = %session.name, err = %e, "session ended with error");
    }

    let name = session.name.clone();
    drop(session);
    disconnect_cleanup(&state, &name).await;
    tracing::info!(name = %name, "client disconnected");
    writer_task.await.ok();
}

impl<R: AsyncRead + Unpin> Session<R> {
    pub(crate) async fn send(&self, text: impl Into<String>) -> Result<()> {
        self.handle
            .tx
            .send(text.into())
            .await
            .map_err(|_| anyhow!("writer task gone"))
    }

    /// Next inbound frame; `None` on clean EOF, error on protocol or
    /// I/O failure.
    async fn next_frame(&mut self) -> Result<Option<String>> {
        match self.reader.next().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(anyhow::Error::new(e).context("frame read failed")),
            None => Ok(None),
        }
    }

    /// Read the answer to a prompt. Connection loss mid-prompt is fatal.
    pub(crate) async fn read_prompt(&mut self) -> Result<String> {
        let line = self
            .next_frame()
            .await?
            .context("connection closed mid prompt")?;
        Ok(line.trim().to_string())
    }

    async fn banner(&self) -> Result<()> {
        let limit = self.state.free_limit;
        self.send("=== BIENVENIDO AL CHAT ===").await?;
        self.send(format!(
            "Puedes enviar {limit} mensajes de prueba antes de registrarte."
        ))
        .await?;
        self.send("Escribe 'registrar' o 'login' cuando quieras autenticarte.")
            .await?;
        self.send("Escribe 'logout' para cerrar sesión.").await?;
        self.send("Escribe 'help' para ver todos los comandos disponibles.")
            .await?;
        Ok(())
    }

    pub(crate) async fn run(&mut self) -> Result<()> {
        self.banner().await?;
        loop {
            let Some(line) = self.next_frame().await? else {
                return Ok(());
            };
            let line = line.trim().to_string();
            match Command::parse(&line) {
                Command::Register => self.register().await?,
                Command::Login => self.login().await?,
                Command::Logout => self.logout().await?,
                Command::Help => self.help().await?,
                Command::Private => self.private_message().await?,
                Command::Block => self.block_user().await?,
                Command::Unblock => self.unblock_user().await?,
                Command::ListBlocked => self.list_blocked().await?,
                Command::CreateGroup => self.create_group().await?,
                Command::DeleteGroup => self.delete_group().await?,
                Command::JoinGroup => self.join_group().await?,
                Command::LeaveGroup => self.leave_group().await?,
                Command::ListGroups => self.list_groups().await?,
                Command::MyGroups => self.my_groups().await?,
                Command::GroupMembers => self.group_members().await?,
                Command::SwitchGroup => self.switch_group().await?,
                Command::CurrentGroup => self.current_group().await?,
                Command::Invite => self.invite_to_game().await?,
                Command::Accept => self.accept_invite().await?,
                Command::Reject => self.reject_invite().await?,
                Command::ListGames => self.list_games().await?,
                Command::Resign => self.resign().await?,
                Command::Ranking => self.ranking().await?,
                Command::HeadToHead => self.head_to_head().await?,
                Command::Move { row, col, explicit } => {
                    if self.state.games.in_game(&self.name) {
                        self.play_move(row, col).await?;
                    } else if explicit {
                        self.send("[ERROR]: No tienes ninguna partida activa.")
                            .await?;
                    } else {
                        // A bare digit pair from an idle session is just
                        // chat.
                        self.chat(&line).await?;
                    }
                }
                Command::MalformedMove => {
                    self.send("[ERROR]: Movimiento inválido. Usa: jugar fila columna (1-3).")
                        .await?;
                }
                Command::Chat(text) => self.chat(&text).await?,
            }
        }
    }

    /// Plain text: to the opponent while a game is running, otherwise to
    /// the session's current group, with the guest quota applied.
    pub(crate) async fn chat(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        if let Some(game) = self.state.games.game_of(&self.name) {
            let opponent = {
                let g = game.lock().unwrap_or_else(|e| e.into_inner());
                g.opponent(&self.name).to_string()
            };
            if let Some(handle) = self.state.presence.lookup(&opponent) {
                let _ = handle
                    .tx
                    .send(format!("[{}]: {}", self.name, text))
                    .await;
            }
            return Ok(());
        }

        let limit = self.state.free_limit;
        if !self.authenticated && self.free_used >= limit {
            self.send(format!(
                "[SISTEMA]: Has alcanzado el límite de {limit} mensajes."
            ))
            .await?;
            self.send(
                "[SISTEMA]: Escribe 'registrar' para crear una cuenta o 'login' para iniciar sesión.",
            )
            .await?;
            return Ok(());
        }

        let group = self.handle.group();
        match router::send_to_group(&self.state, &self.name, &group, text).await {
            Ok(()) => {
                if !self.authenticated {
                    self.free_used += 1;
                    let remaining = limit - self.free_used;
                    if remaining > 0 {
                        self.send(format!(
                            "[SISTEMA]: Mensaje enviado. Te quedan {remaining} mensajes."
                        ))
                        .await?;
                    } else {
                        self.send(format!(
                            "[SISTEMA]: Has usado tus {limit} mensajes gratuitos. Escribe 'registrar' o 'login' para continuar."
                        ))
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
}

/// Broadcast a `[SISTEMA]` notice to every online session except `skip`.
pub(crate) async fn notify_all(state: &ServerState, skip: &str, text: &str) {
    for (name, handle) in state.presence.snapshot() {
        if name == skip {
            continue;
        }
        if handle.tx.send(format!("[SISTEMA]: {text}")).await.is_err() {
            tracing::debug!(name = %name, "notification failed");
        }
    }
}

/// Notice to the online sessions currently watching `group`.
pub(crate) async fn notify_group(state: &ServerState, group: &str, skip: &str, text: &str) {
    for (name, handle) in state.presence.snapshot() {
        if name == skip || handle.group() != group {
            continue;
        }
        if handle.tx.send(format!("[SISTEMA]: {text}")).await.is_err() {
            tracing::debug!(name = %name, "notification failed");
        }
    }
}

/// Ordered teardown after a connection ends: forfeit an unfinished game,
/// drop the presence entry, then tell the session's group.
pub(crate) async fn disconnect_cleanup(state: &ServerState, name: &str) {
    if let Some(game) = state.games.game_of(name) {
        let (player1, player2, winner) = {
            let mut g = game.lock().unwrap_or_else(|e| e.into_inner());
            let (p1, p2) = g.players();
            let (p1, p2) = (p1.to_string(), p2.to_string());
            if g.finished() {
                (p1, p2, None)
            } else {
                let winner = g.opponent(name).to_string();
                g.forfeit(name);
                (p1, p2, Some(winner))
            }
        };
        if let Some(winner) = winner {
            if let Some(handle) = state.presence.lookup(&winner) {
                let _ = handle
                    .tx
                    .send(format!(
                        "[GATO]: {name} se desconectó. ¡Has ganado la partida!"
                    ))
                    .await;
            }
            if let Err(e) = state.store.record_result(&player1, &player2, Some(&winner)).await {
                tracing::error!(err = %e, "failed to record forfeited game");
            }
        }
        state.games.finish(&player1, &player2);
    }

    let group = state.presence.remove(name).map(|h| h.group());
    if let Some(group) = group {
        notify_group(state, &group, name, &format!("{name} se ha desconectado.")).await;
    }
}

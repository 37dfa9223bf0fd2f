use crate::game::{GameResult, MoveError, MoveOutcome};
use crate::session::{Session, store_try};
use anyhow::Result;
use tokio::io::AsyncRead;

impl<R: AsyncRead + Unpin> Session<R> {
    async fn send_to(&self, name: &str, text: String) {
        if let Some(handle) = self.state.presence.lookup(name) {
            if handle.tx.send(text).await.is_err() {
                tracing::debug!(name = %name, "game notification failed");
            }
        }
    }

    /// Record a finished game and free both players for a rematch.
    async fn settle_game(&self, player1: &str, player2: &str, winner: Option<&str>) {
        if let Err(e) = self.state.store.record_result(player1, player2, winner).await {
            tracing::error!(err = %e, "failed to record game result");
        }
        self.state.games.finish(player1, player2);
    }

    pub(crate) async fn invite_to_game(&mut self) -> Result<()> {
        if !self.authenticated {
            self.send("[ERROR]: Debes estar autenticado para jugar.").await?;
            return Ok(());
        }
        if self.state.games.in_game(&self.name) {
            self.send("[ERROR]: Ya tienes una partida activa.").await?;
            return Ok(());
        }

        let online = self.online_accounts();
        if online.is_empty() {
            self.send("[SISTEMA]: No hay usuarios disponibles para jugar.")
                .await?;
            return Ok(());
        }
        self.send(format!("[USUARIOS ONLINE]: {}", online.join(", ")))
            .await?;
        self.send("[SISTEMA]: Escribe el nombre del usuario:").await?;

        let target = self.read_prompt().await?;
        if target.is_empty() {
            self.send("[SISTEMA]: Operación cancelada.").await?;
            return Ok(());
        }
        if target == self.name {
            self.send("[ERROR]: No puedes jugar contigo mismo.").await?;
            return Ok(());
        }
        if charla::is_guest(&target) {
            self.send("[ERROR]: No puedes invitar a un invitado.").await?;
            return Ok(());
        }
        if !self.state.presence.is_online(&target) {
            self.send("[ERROR]: El usuario no está conectado.").await?;
            return Ok(());
        }
        if self.state.games.in_game(&target) {
            self.send(format!("[ERROR]: {target} ya está en una partida."))
                .await?;
            return Ok(());
        }
        if !self.state.invites.invite(&self.name, &target) {
            self.send(format!(
                "[ERROR]: {target} ya tiene una invitación pendiente."
            ))
            .await?;
            return Ok(());
        }

        self.send_to(
            &target,
            format!(
                "[GATO]: {} te invita a jugar. Escribe 'aceptar' o 'rechazar'.",
                self.name
            ),
        )
        .await;
        self.send(format!("[SISTEMA]: Invitación enviada a {target}."))
            .await?;
        tracing::info!(inviter = %self.name, invitee = %target, "game invitation sent");
        Ok(())
    }

    pub(crate) async fn accept_invite(&mut self) -> Result<()> {
        let Some(inviter) = self.state.invites.take(&self.name) else {
            self.send("[ERROR]: No tienes invitaciones pendientes.").await?;
            return Ok(());
        };
        if !self.state.presence.is_online(&inviter) {
            self.send(format!("[ERROR]: {inviter} ya no está conectado."))
                .await?;
            return Ok(());
        }
        let inviter_starts = rand::random::<bool>();
        let Some(game) = self
            .state
            .games
            .start(&inviter, &self.name, inviter_starts)
        else {
            self.send("[ERROR]: No se pudo iniciar la partida. Alguno ya está jugando.")
                .await?;
            return Ok(());
        };

        let (board, first) = {
            let g = game.lock().unwrap_or_else(|e| e.into_inner());
            (g.render_board(), g.turn().to_string())
        };
        for player in [inviter.as_str(), self.name.as_str()] {
            self.send_to(
                player,
                format!("[GATO]: ¡Partida iniciada! {inviter} (X) vs {} (O).", self.name),
            )
            .await;
            self.send_to(player, format!("[GATO]: Empieza {first}.")).await;
            self.send_to(player, board.clone()).await;
        }
        tracing::info!(player1 = %inviter, player2 = %self.name, "game started");
        Ok(())
    }

    pub(crate) async fn reject_invite(&mut self) -> Result<()> {
        let Some(inviter) = self.state.invites.take(&self.name) else {
            self.send("[ERROR]: No tienes invitaciones pendientes.").await?;
            return Ok(());
        };
        self.send_to(
            &inviter,
            format!("[GATO]: {} rechazó tu invitación.", self.name),
        )
        .await;
        self.send("[SISTEMA]: Invitación rechazada.").await?;
        Ok(())
    }

    pub(crate) async fn list_games(&mut self) -> Result<()> {
        let Some(game) = self.state.games.game_of(&self.name) else {
            self.send("[SISTEMA]: No tienes partidas activas.").await?;
            return Ok(());
        };
        let (line, board) = {
            let g = game.lock().unwrap_or_else(|e| e.into_inner());
            let (p1, p2) = g.players();
            (
                format!("{p1} (X) vs {p2} (O) - Turno de: {}", g.turn()),
                g.render_board(),
            )
        };
        self.send("[SISTEMA]: === TU PARTIDA ===").await?;
        self.send(line).await?;
        self.send(board).await?;
        Ok(())
    }

    pub(crate) async fn play_move(&mut self, row: usize, col: usize) -> Result<()> {
        let Some(game) = self.state.games.game_of(&self.name) else {
            self.send("[ERROR]: No tienes ninguna partida activa.").await?;
            return Ok(());
        };
        let (player1, player2, opponent, outcome, board, turn) = {
            let mut g = game.lock().unwrap_or_else(|e| e.into_inner());
            let (p1, p2) = g.players();
            let (p1, p2) = (p1.to_string(), p2.to_string());
            let opponent = g.opponent(&self.name).to_string();
            let outcome = g.apply_move(&self.name, row, col);
            (p1, p2, opponent, outcome, g.render_board(), g.turn().to_string())
        };

        let outcome = match outcome {
            Err(MoveError::NotYourTurn) => {
                self.send("[ERROR]: No es tu turno.").await?;
                return Ok(());
            }
            Err(MoveError::CellTaken) => {
                self.send("[ERROR]: Esa casilla ya está ocupada.").await?;
                return Ok(());
            }
            Err(MoveError::OutOfBounds) => {
                self.send("[ERROR]: Movimiento inválido. Usa: jugar fila columna (1-3).")
                    .await?;
                return Ok(());
            }
            Err(MoveError::Finished) => {
                self.send("[ERROR]: La partida ya terminó.").await?;
                return Ok(());
            }
            Ok(outcome) => outcome,
        };

        let played = format!(
            "[GATO]: {} jugó en ({}, {}).",
            self.name,
            row + 1,
            col + 1
        );
        self.send(played.clone()).await?;
        self.send(board.clone()).await?;
        self.send_to(&opponent, played).await;
        self.send_to(&opponent, board).await;

        match outcome {
            MoveOutcome::Placed => {
                let notice = format!("[GATO]: Turno de {turn}.");
                self.send(notice.clone()).await?;
                self.send_to(&opponent, notice).await;
            }
            MoveOutcome::Finished(GameResult::Winner(winner)) => {
                let notice = format!("[GATO]: ¡{winner} ha ganado la partida!");
                self.send(notice.clone()).await?;
                self.send_to(&opponent, notice).await;
                self.settle_game(&player1, &player2, Some(&winner)).await;
                tracing::info!(winner = %winner, "game finished");
            }
            MoveOutcome::Finished(GameResult::Draw) => {
                let notice = "[GATO]: ¡Empate!".to_string();
                self.send(notice.clone()).await?;
                self.send_to(&opponent, notice).await;
                self.settle_game(&player1, &player2, None).await;
                tracing::info!(player1 = %player1, player2 = %player2, "game drawn");
            }
        }
        Ok(())
    }

    pub(crate) async fn resign(&mut self) -> Result<()> {
        let Some(game) = self.state.games.game_of(&self.name) else {
            self.send("[SISTEMA]: No tienes partidas activas.").await?;
            return Ok(());
        };
        let (player1, player2, winner) = {
            let mut g = game.lock().unwrap_or_else(|e| e.into_inner());
            let (p1, p2) = g.players();
            let (p1, p2) = (p1.to_string(), p2.to_string());
            let winner = g.opponent(&self.name).to_string();
            g.forfeit(&self.name);
            (p1, p2, winner)
        };
        self.send(format!("[GATO]: Te has rendido. {winner} gana la partida."))
            .await?;
        self.send_to(
            &winner,
            format!("[GATO]: {} se ha rendido. ¡Has ganado la partida!", self.name),
        )
        .await;
        self.settle_game(&player1, &player2, Some(&winner)).await;
        tracing::info!(loser = %self.name, winner = %winner, "game resigned");
        Ok(())
    }

    pub(crate) async fn ranking(&mut self) -> Result<()> {
        let board = store_try!(self, self.state.store.leaderboard().await);
        if board.is_empty() {
            self.send("[SISTEMA]: Aún no hay partidas registradas.").await?;
            return Ok(());
        }
        self.send("[SISTEMA]: === RANKING GENERAL ===").await?;
        for (i, row) in board.iter().enumerate() {
            self.send(format!(
                "{}. {} - {} pts ({}V/{}E/{}D) - {} partidas",
                i + 1,
                row.player,
                row.points,
                row.wins,
                row.draws,
                row.losses,
                row.total
            ))
            .await?;
        }
        Ok(())
    }

    pub(crate) async fn head_to_head(&mut self) -> Result<()> {
        if !self.authenticated {
            self.send("[ERROR]: Debes estar autenticado para ver estadísticas.")
                .await?;
            return Ok(());
        }
        self.send("[SISTEMA]: Escribe el nombre del otro jugador:")
            .await?;
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

        let h = store_try!(
            self,
            self.state.store.head_to_head(&self.name, &target).await
        );
        let total = h.total();
        if total == 0 {
            self.send(format!("[SISTEMA]: No has jugado contra {target}."))
                .await?;
            return Ok(());
        }
        let pct1 = (h.wins1 as f64 * 100.0) / total as f64;
        let pct2 = (h.wins2 as f64 * 100.0) / total as f64;
        self.send(format!("[SISTEMA]: === {} vs {target} ===", self.name))
            .await?;
        self.send(format!("Partidas: {total}")).await?;
        self.send(format!("{}: {} victorias ({pct1:.1}%)", self.name, h.wins1))
            .await?;
        self.send(format!("{target}: {} victorias ({pct2:.1}%)", h.wins2))
            .await?;
        self.send(format!("Empates: {}", h.draws)).await?;
        Ok(())
    }
}

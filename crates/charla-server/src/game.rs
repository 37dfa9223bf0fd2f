use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    pub fn as_char(self) -> char {
        match self {
            Symbol::X => 'X',
            Symbol::O => 'O',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameResult {
    Winner(String),
    Draw,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MoveError {
    Finished,
    NotYourTurn,
    OutOfBounds,
    CellTaken,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move stood and the turn passed to the opponent.
    Placed,
    /// The move ended the game.
    Finished(GameResult),
}

/// A tic-tac-toe match between two named players. Pure state machine,
/// no I/O; player 1 (the inviter) is always X, player 2 is always O.
pub struct Game {
    player1: String,
    player2: String,
    turn: String,
    board: [[Option<Symbol>; 3]; 3],
    result: Option<GameResult>,
}

impl Game {
    pub fn new(player1: &str, player2: &str, player1_starts: bool) -> Self {
        let turn = if player1_starts { player1 } else { player2 };
        Self {
            player1: player1.to_string(),
            player2: player2.to_string(),
            turn: turn.to_string(),
            board: [[None; 3]; 3],
            result: None,
        }
    }

    pub fn players(&self) -> (&str, &str) {
        (&self.player1, &self.player2)
    }

    pub fn turn(&self) -> &str {
        &self.turn
    }

    pub fn finished(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    pub fn opponent(&self, player: &str) -> &str {
        if player == self.player1 {
            &self.player2
        } else {
            &self.player1
        }
    }

    pub fn symbol_of(&self, player: &str) -> Symbol {
        if player == self.player1 {
            Symbol::X
        } else {
            Symbol::O
        }
    }

    /// Place `player`'s symbol at zero-based (row, col). On success the
    /// turn flips unless the move ended the game.
    pub fn apply_move(
        &mut self,
        player: &str,
        row: usize,
        col: usize,
    ) -> Result<MoveOutcome, MoveError> {
        if self.result.is_some() {
            return Err(MoveError::Finished);
        }
        if player != self.turn {
            return Err(MoveError::NotYourTurn);
        }
        if row > 2 || col > 2 {
            return Err(MoveError::OutOfBounds);
        }
        if self.board[row][col].is_some() {
            return Err(MoveError::CellTaken);
        }

        let symbol = self.symbol_of(player);
        self.board[row][col] = Some(symbol);

        if self.wins(symbol) {
            let result = GameResult::Winner(player.to_string());
            self.result = Some(result.clone());
            return Ok(MoveOutcome::Finished(result));
        }
        if self.board_full() {
            self.result = Some(GameResult::Draw);
            return Ok(MoveOutcome::Finished(GameResult::Draw));
        }
        self.turn = self.opponent(player).to_string();
        Ok(MoveOutcome::Placed)
    }

    /// End the game immediately with `player`'s opponent as winner,
    /// regardless of board state. Used by resign and disconnect.
    pub fn forfeit(&mut self, player: &str) -> GameResult {
        let result = GameResult::Winner(self.opponent(player).to_string());
        self.result = Some(result.clone());
        result
    }

    fn wins(&self, symbol: Symbol) -> bool {
        let s = Some(symbol);
        let b = &self.board;
        for i in 0..3 {
            if b[i][0] == s && b[i][1] == s && b[i][2] == s {
                return true;
            }
            if b[0][i] == s && b[1][i] == s && b[2][i] == s {
                return true;
            }
        }
        (b[0][0] == s && b[1][1] == s && b[2][2] == s)
            || (b[0][2] == s && b[1][1] == s && b[2][0] == s)
    }

    fn board_full(&self) -> bool {
        self.board
            .iter()
            .all(|row| row.iter().all(|cell| cell.is_some()))
    }

    /// The board as the client sees it, 1-based headers, '-' for empty.
    pub fn render_board(&self) -> String {
        let mut out = String::from("\n   1   2   3\n");
        for (i, row) in self.board.iter().enumerate() {
            out.push_str(&format!("{}  ", i + 1));
            for (j, cell) in row.iter().enumerate() {
                out.push(cell.map_or('-', Symbol::as_char));
                if j < 2 {
                    out.push_str(" | ");
                }
            }
            out.push('\n');
            if i < 2 {
                out.push_str("  -----------\n");
            }
        }
        out
    }
}

/// Active games, both players keying the same shared game. Creation is
/// a single critical section so two racing accepts can never commit one
/// player to two games.
#[derive(Default)]
pub struct GameTable {
    games: Mutex<HashMap<String, Arc<Mutex<Game>>>>,
}

impl GameTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<Game>>>> {
        self.games.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a game for two currently-free players. Returns `None` if
    /// either is already playing.
    pub fn start(
        &self,
        player1: &str,
        player2: &str,
        player1_starts: bool,
    ) -> Option<Arc<Mutex<Game>>> {
        let mut games = self.lock();
        if games.contains_key(player1) || games.contains_key(player2) {
            return None;
        }
        let game = Arc::new(Mutex::new(Game::new(player1, player2, player1_starts)));
        games.insert(player1.to_string(), game.clone());
        games.insert(player2.to_string(), game.clone());
        Some(game)
    }

    pub fn game_of(&self, player: &str) -> Option<Arc<Mutex<Game>>> {
        self.lock().get(player).cloned()
    }

    pub fn in_game(&self, player: &str) -> bool {
        self.lock().contains_key(player)
    }

    /// Drop both players' entries once a game is recorded.
    pub fn finish(&self, player1: &str, player2: &str) {
        let mut games = self.lock();
        games.remove(player1);
        games.remove(player2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inviter_is_x_and_start_is_honored() {
        let g = Game::new("ana", "beto", true);
        assert_eq!(g.symbol_of("ana"), Symbol::X);
        assert_eq!(g.symbol_of("beto"), Symbol::O);
        assert_eq!(g.turn(), "ana");

        let g = Game::new("ana", "beto", false);
        assert_eq!(g.turn(), "beto");
    }

    #[test]
    fn turns_alternate() {
        let mut g = Game::new("ana", "beto", true);
        assert_eq!(g.apply_move("ana", 0, 0).unwrap(), MoveOutcome::Placed);
        assert_eq!(g.turn(), "beto");
        assert_eq!(g.apply_move("beto", 1, 1).unwrap(), MoveOutcome::Placed);
        assert_eq!(g.turn(), "ana");
    }

    #[test]
    fn out_of_turn_is_rejected_without_state_change() {
        let mut g = Game::new("ana", "beto", true);
        assert_eq!(g.apply_move("beto", 0, 0), Err(MoveError::NotYourTurn));
        assert_eq!(g.turn(), "ana");
        assert_eq!(g.apply_move("ana", 0, 0).unwrap(), MoveOutcome::Placed);
    }

    #[test]
    fn occupied_and_out_of_bounds_rejected() {
        let mut g = Game::new("ana", "beto", true);
        g.apply_move("ana", 1, 1).unwrap();
        assert_eq!(g.apply_move("beto", 1, 1), Err(MoveError::CellTaken));
        assert_eq!(g.apply_move("beto", 3, 0), Err(MoveError::OutOfBounds));
        // Still beto's turn after both rejections.
        assert_eq!(g.turn(), "beto");
    }

    #[test]
    fn row_win() {
        let mut g = Game::new("ana", "beto", true);
        g.apply_move("ana", 0, 0).unwrap();
        g.apply_move("beto", 1, 0).unwrap();
        g.apply_move("ana", 0, 1).unwrap();
        g.apply_move("beto", 1, 1).unwrap();
        let out = g.apply_move("ana", 0, 2).unwrap();
        assert_eq!(out, MoveOutcome::Finished(GameResult::Winner("ana".into())));
        assert!(g.finished());
    }

    #[test]
    fn column_win() {
        let mut g = Game::new("ana", "beto", true);
        g.apply_move("ana", 0, 2).unwrap();
        g.apply_move("beto", 0, 0).unwrap();
        g.apply_move("ana", 1, 2).unwrap();
        g.apply_move("beto", 0, 1).unwrap();
        let out = g.apply_move("ana", 2, 2).unwrap();
        assert_eq!(out, MoveOutcome::Finished(GameResult::Winner("ana".into())));
    }

    #[test]
    fn diagonal_wins() {
        let mut g = Game::new("ana", "beto", true);
        g.apply_move("ana", 0, 0).unwrap();
        g.apply_move("beto", 0, 1).unwrap();
        g.apply_move("ana", 1, 1).unwrap();
        g.apply_move("beto", 0, 2).unwrap();
        let out = g.apply_move("ana", 2, 2).unwrap();
        assert_eq!(out, MoveOutcome::Finished(GameResult::Winner("ana".into())));

        let mut g = Game::new("ana", "beto", true);
        g.apply_move("ana", 0, 2).unwrap();
        g.apply_move("beto", 0, 0).unwrap();
        g.apply_move("ana", 1, 1).unwrap();
        g.apply_move("beto", 0, 1).unwrap();
        let out = g.apply_move("ana", 2, 0).unwrap();
        assert_eq!(out, MoveOutcome::Finished(GameResult::Winner("ana".into())));
    }

    #[test]
    fn full_board_without_line_is_a_draw() {
        let mut g = Game::new("ana", "beto", true);
        // X X O / O O X / X O X, no three in a line.
        let moves = [
            ("ana", 0, 0),
            ("beto", 0, 2),
            ("ana", 0, 1),
            ("beto", 1, 0),
            ("ana", 1, 2),
            ("beto", 1, 1),
            ("ana", 2, 0),
            ("beto", 2, 1),
        ];
        for (p, r, c) in moves {
            assert_eq!(g.apply_move(p, r, c).unwrap(), MoveOutcome::Placed);
        }
        let out = g.apply_move("ana", 2, 2).unwrap();
        assert_eq!(out, MoveOutcome::Finished(GameResult::Draw));
    }

    #[test]
    fn no_moves_after_finish() {
        let mut g = Game::new("ana", "beto", true);
        g.forfeit("beto");
        assert_eq!(g.apply_move("ana", 0, 0), Err(MoveError::Finished));
        assert_eq!(
            g.result(),
            Some(&GameResult::Winner("ana".to_string()))
        );
    }

    #[test]
    fn forfeit_hands_the_win_to_the_opponent() {
        let mut g = Game::new("ana", "beto", false);
        assert_eq!(g.forfeit("ana"), GameResult::Winner("beto".into()));
        assert!(g.finished());
    }

    #[test]
    fn board_rendering() {
        let mut g = Game::new("ana", "beto", true);
        g.apply_move("ana", 0, 0).unwrap();
        g.apply_move("beto", 1, 1).unwrap();
        let expected = "\n   1   2   3\n\
                        1  X | - | -\n\
                        \x20 -----------\n\
                        2  - | O | -\n\
                        \x20 -----------\n\
                        3  - | - | -\n";
        assert_eq!(g.render_board(), expected);
    }

    #[test]
    fn table_refuses_busy_players() {
        let t = GameTable::new();
        assert!(t.start("ana", "beto", true).is_some());
        assert!(t.start("ana", "carla", true).is_none());
        assert!(t.start("carla", "beto", true).is_none());
        assert!(t.in_game("ana") && t.in_game("beto"));
        assert!(!t.in_game("carla"));
    }

    #[test]
    fn both_players_see_the_same_game() {
        let t = GameTable::new();
        let g = t.start("ana", "beto", true).unwrap();
        assert!(Arc::ptr_eq(&g, &t.game_of("beto").unwrap()));

        t.finish("ana", "beto");
        assert!(t.game_of("ana").is_none());
        assert!(t.game_of("beto").is_none());
        // Both are free for a rematch.
        assert!(t.start("beto", "ana", false).is_some());
    }
}

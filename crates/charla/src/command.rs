/// One inbound frame, classified. Exact keyword match (case-insensitive)
/// takes priority over the move pattern, which takes priority over plain
/// chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register,
    Login,
    Logout,
    Help,
    /// `@` or `privado`
    Private,
    Block,
    Unblock,
    ListBlocked,
    CreateGroup,
    DeleteGroup,
    JoinGroup,
    LeaveGroup,
    ListGroups,
    MyGroups,
    GroupMembers,
    SwitchGroup,
    CurrentGroup,
    /// `gato` or `jugar` with no arguments: invite someone to play.
    Invite,
    Accept,
    Reject,
    ListGames,
    Resign,
    Ranking,
    /// `vs` or `estadisticas`
    HeadToHead,
    /// `jugar <f> <c>` or bare `<f> <c>`, digits 1-3, stored zero-based.
    /// `explicit` records whether the `jugar` keyword was present; a bare
    /// pair falls back to chat when the sender has no game in progress.
    Move {
        row: usize,
        col: usize,
        explicit: bool,
    },
    /// `jugar` followed by two tokens that are not both digits 1-3.
    MalformedMove,
    Chat(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "registrar" => return Command::Register,
            "login" => return Command::Login,
            "logout" => return Command::Logout,
            "help" => return Command::Help,
            "@" | "privado" => return Command::Private,
            "bloquear" => return Command::Block,
            "desbloquear" => return Command::Unblock,
            "misbloqueados" => return Command::ListBlocked,
            "creargrupo" => return Command::CreateGroup,
            "eliminargrupo" => return Command::DeleteGroup,
            "unirse" => return Command::JoinGroup,
            "salirgrupo" => return Command::LeaveGroup,
            "grupos" => return Command::ListGroups,
            "misgrupos" => return Command::MyGroups,
            "miembros" => return Command::GroupMembers,
            "cambiargrupo" => return Command::SwitchGroup,
            "grupoactual" => return Command::CurrentGroup,
            "gato" | "jugar" => return Command::Invite,
            "aceptar" => return Command::Accept,
            "rechazar" => return Command::Reject,
            "partidas" => return Command::ListGames,
            "rendirse" => return Command::Resign,
            "ranking" => return Command::Ranking,
            "vs" | "estadisticas" => return Command::HeadToHead,
            _ => {}
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        match tokens.as_slice() {
            [kw, row, col] if kw.eq_ignore_ascii_case("jugar") => {
                match (parse_cell(row), parse_cell(col)) {
                    (Some(row), Some(col)) => Command::Move {
                        row,
                        col,
                        explicit: true,
                    },
                    _ => Command::MalformedMove,
                }
            }
            [row, col] => match (parse_cell(row), parse_cell(col)) {
                (Some(row), Some(col)) => Command::Move {
                    row,
                    col,
                    explicit: false,
                },
                _ => Command::Chat(trimmed.to_string()),
            },
            _ => Command::Chat(trimmed.to_string()),
        }
    }
}

/// A single digit 1-3, converted to a zero-based index.
fn parse_cell(token: &str) -> Option<usize> {
    match token {
        "1" => Some(0),
        "2" => Some(1),
        "3" => Some(2),
        _ => None,
    }
}

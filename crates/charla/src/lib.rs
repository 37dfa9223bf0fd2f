pub mod command;
pub mod frame;

pub use command::Command;
pub use frame::{FrameCodec, FrameError, MAX_FRAME_BYTES};

/// The privileged group every account belongs to. It cannot be deleted
/// or left, and it is where guest sessions chat.
pub const DEFAULT_GROUP: &str = "Todos";

/// Prefix of generated guest identities. Registered names may not start
/// with it, so the prefix reliably distinguishes guests in user lists.
pub const GUEST_PREFIX: &str = "invitado_";

/// Whether a display name belongs to an unauthenticated guest session.
pub fn is_guest(name: &str) -> bool {
    name.starts_with(GUEST_PREFIX)
}

/// Validate a display name chosen at registration: non-empty, no spaces,
/// no `@` (reserved for the private-message command), and not shaped
/// like a guest identity.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("el nombre no puede estar vacío");
    }
    if name.contains(' ') {
        return Err("el nombre no puede contener espacios");
    }
    if name.contains('@') {
        return Err("el nombre no puede contener '@'");
    }
    if is_guest(name) {
        return Err("el prefijo 'invitado_' está reservado");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_name("ana").is_ok());
        assert!(validate_name("ana_22").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("ana maria").is_err());
        assert!(validate_name("ana@casa").is_err());
        assert!(validate_name("invitado_123").is_err());
    }

    #[test]
    fn guest_detection() {
        assert!(is_guest("invitado_ab12cd34"));
        assert!(!is_guest("ana"));
    }
}

use crate::error::{ProtocolError, Result};
use crate::protocol::message::Command;
use std::fmt;

/// Authentication state of a session.
///
/// `Unauthenticated -> Authenticated -> Closed`; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticated => "authenticated",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Handler a legal (state, command) pair is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    CardData,
    KeepAlive,
    Entitlement,
}

type Transition = (SessionState, Command, Route);

/// Every legal incoming command per state. Anything else is a violation.
const TRANSITIONS: &[Transition] = &[
    (SessionState::Unauthenticated, Command::ClientLogin, Route::Login),
    (SessionState::Authenticated, Command::CardDataRequest, Route::CardData),
    (SessionState::Authenticated, Command::KeepAlive, Route::KeepAlive),
    (SessionState::Authenticated, Command::EcmRequest, Route::Entitlement),
    (SessionState::Authenticated, Command::EmmRequest, Route::Entitlement),
];

/// Command router backed by a static transition table.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    table: &'static [Transition],
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { table: TRANSITIONS }
    }

    /// Commands accepted in `state`
    pub fn legal_commands(&self, state: SessionState) -> impl Iterator<Item = Command> + '_ {
        self.table
            .iter()
            .filter(move |(s, _, _)| *s == state)
            .map(|(_, command, _)| *command)
    }

    /// Route a raw command byte received in `state`.
    ///
    /// # Errors
    /// `ProtocolViolation` for unknown codes and for codes not legal in `state`
    pub fn route(&self, state: SessionState, command: u8) -> Result<Route> {
        let command = Command::try_from(command).map_err(|_| {
            ProtocolError::ProtocolViolation(format!("Unknown command 0x{command:02x}"))
        })?;

        self.table
            .iter()
            .find(|(s, c, _)| *s == state && *c == command)
            .map(|(_, _, route)| *route)
            .ok_or_else(|| {
                let expected: Vec<String> = self
                    .legal_commands(state)
                    .map(|c| format!("{c:?}"))
                    .collect();
                let expected = if expected.is_empty() {
                    "nothing".to_string()
                } else {
                    expected.join(", ")
                };
                ProtocolError::ProtocolViolation(format!(
                    "Command {command:?} not allowed while {state} (expected {expected})"
                ))
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_login_only_before_auth() {
        let d = Dispatcher::new();
        assert_eq!(
            d.route(SessionState::Unauthenticated, 0xe0).unwrap(),
            Route::Login
        );
        assert!(matches!(
            d.route(SessionState::Authenticated, 0xe0),
            Err(ProtocolError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_unauthenticated_rejects_everything_else() {
        let d = Dispatcher::new();
        for code in [0x80, 0x81, 0xe3, 0xfd] {
            assert!(
                d.route(SessionState::Unauthenticated, code).is_err(),
                "0x{code:02x} accepted before login"
            );
        }
    }

    #[test]
    fn test_authenticated_routes() {
        let d = Dispatcher::new();
        let s = SessionState::Authenticated;
        assert_eq!(d.route(s, 0xe3).unwrap(), Route::CardData);
        assert_eq!(d.route(s, 0xfd).unwrap(), Route::KeepAlive);
        assert_eq!(d.route(s, 0x80).unwrap(), Route::Entitlement);
        assert_eq!(d.route(s, 0x81).unwrap(), Route::Entitlement);
    }

    #[test]
    fn test_unknown_and_server_side_codes() {
        let d = Dispatcher::new();
        let s = SessionState::Authenticated;
        let err = d.route(s, 0x00).unwrap_err();
        assert!(err.to_string().contains("Unknown command 0x00"));
        // Known code, but only ever sent by a server.
        assert!(d.route(s, u8::from(Command::CardData)).is_err());
        assert!(d.route(s, u8::from(Command::Admin)).is_err());
    }

    #[test]
    fn test_closed_accepts_nothing() {
        let d = Dispatcher::new();
        assert_eq!(d.legal_commands(SessionState::Closed).count(), 0);
        assert!(d.route(SessionState::Closed, 0xfd).is_err());
    }

    #[test]
    fn test_legal_commands_listing() {
        let d = Dispatcher::new();
        let before: Vec<_> = d.legal_commands(SessionState::Unauthenticated).collect();
        assert_eq!(before, vec![Command::ClientLogin]);
        assert_eq!(d.legal_commands(SessionState::Authenticated).count(), 4);
    }

    #[test]
    fn test_violation_names_legal_commands() {
        let d = Dispatcher::new();
        let msg = d
            .route(SessionState::Unauthenticated, 0x80)
            .unwrap_err()
            .to_string();
        assert!(msg.contains("EcmRequest"));
        assert!(msg.contains("expected ClientLogin)"));

        let msg = d.route(SessionState::Closed, 0xfd).unwrap_err().to_string();
        assert!(msg.contains("expected nothing"));
    }
}

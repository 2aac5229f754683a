//! PANA join state machine

use crate::{WisunError, WisunResult};

/// Progress of the PANA authentication handshake
///
/// # State Transitions
/// ```text
/// Idle -> CredentialsSet (password, route-B id, channel and PAN id accepted)
/// CredentialsSet -> Joining (SKJOIN issued)
/// Joining -> Authenticated (EVENT 25)
/// Idle | CredentialsSet | Joining -> Failed (command error, timeout, link lost)
/// Authenticated | Failed -> Idle (restart)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinState {
    /// Nothing sent yet (initial state)
    #[default]
    Idle,
    /// All credential commands were accepted
    CredentialsSet,
    /// `SKJOIN` issued, waiting for the PANA outcome
    Joining,
    Authenticated,
    Failed,
}

impl JoinState {
    /// Whether the handshake has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, JoinState::Authenticated | JoinState::Failed)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, JoinState::Authenticated)
    }

    /// Validate state transition
    ///
    /// # Arguments
    /// * `new_state` - The target state
    ///
    /// # Errors
    /// Returns `WisunError::InvalidData` if the transition is not allowed
    pub fn validate_transition(&self, new_state: JoinState) -> WisunResult<()> {
        let valid = match (*self, new_state) {
            (JoinState::Idle, JoinState::CredentialsSet) => true,
            (JoinState::CredentialsSet, JoinState::Joining) => true,
            (JoinState::Joining, JoinState::Authenticated) => true,
            (JoinState::Idle | JoinState::CredentialsSet | JoinState::Joining, JoinState::Failed) => {
                true
            }
            // Restart
            (JoinState::Authenticated | JoinState::Failed, JoinState::Idle) => true,
            (JoinState::Idle, JoinState::Idle) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(WisunError::InvalidData(format!(
                "Invalid state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinState::Idle => "Idle",
            JoinState::CredentialsSet => "CredentialsSet",
            JoinState::Joining => "Joining",
            JoinState::Authenticated => "Authenticated",
            JoinState::Failed => "Failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = JoinState::default();
        for next in [
            JoinState::CredentialsSet,
            JoinState::Joining,
            JoinState::Authenticated,
            JoinState::Idle,
        ] {
            state.validate_transition(next).unwrap();
            state = next;
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(JoinState::Idle.validate_transition(JoinState::Joining).is_err());
        assert!(JoinState::Idle.validate_transition(JoinState::Authenticated).is_err());
        assert!(JoinState::Authenticated.validate_transition(JoinState::Failed).is_err());
        assert!(JoinState::Failed.validate_transition(JoinState::Joining).is_err());
        let err = JoinState::CredentialsSet
            .validate_transition(JoinState::Authenticated)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid data: Invalid state transition: CredentialsSet -> Authenticated"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(JoinState::Authenticated.is_terminal());
        assert!(JoinState::Failed.is_terminal());
        assert!(!JoinState::Joining.is_terminal());
        assert!(JoinState::Authenticated.is_authenticated());
        assert_eq!(JoinState::Joining.as_str(), "Joining");
    }
}

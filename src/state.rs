//! Socket-worker lifecycle state machine.
//!
//! Models the full life of one authenticated connection to the daemon,
//! with validated transitions that return `Result` instead of
//! panicking.
//!
//! ```text
//!  Disconnected ──► Connecting ──► Authenticating ──► Ready ◄──┐
//!        │               │               │              │      │ release
//!        │               │               │          check_out  │ (depth 0)
//!        │               │               │              ▼      │
//!        │               │               │        CheckedOut(depth)
//!        ▼               ▼               ▼              │
//!      Closed ◄──────────┴───────────────┴──────────────┘
//! ```
//!
//! `Closed` is terminal: a worker that failed mid-exchange is discarded
//! and never pooled again. Checking out an already checked-out worker
//! nests: the depth counter goes up, and only the outermost release
//! makes the worker `Ready` again.

use std::fmt;

use crate::error::EcError;

/// The current phase of a socket worker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkerPhase {
    /// No socket yet. Initial state.
    #[default]
    Disconnected,

    /// TCP connect in flight.
    Connecting,

    /// TCP link up; login handshake in progress.
    Authenticating,

    /// Authenticated and idle; eligible for the pool.
    Ready,

    /// In use by a caller. `depth` counts nested scoped uses.
    CheckedOut { depth: u32 },

    /// Discarded after an error or shutdown. Terminal.
    Closed,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Ready => write!(f, "Ready"),
            Self::CheckedOut { depth } => write!(f, "CheckedOut({depth})"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl WorkerPhase {
    /// Returns `true` when the worker may enter the idle pool.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` once the worker has been discarded.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Current reentrancy depth; zero unless checked out.
    pub fn depth(&self) -> u32 {
        match self {
            Self::CheckedOut { depth } => *depth,
            _ => 0,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), EcError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(EcError::InvalidState("cannot connect: worker already started")),
        }
    }

    /// Transition to `Authenticating`.
    ///
    /// Valid from: `Connecting`.
    pub fn begin_auth(&mut self) -> Result<(), EcError> {
        match self {
            Self::Connecting => {
                *self = Self::Authenticating;
                Ok(())
            }
            _ => Err(EcError::InvalidState("cannot authenticate: no connect in progress")),
        }
    }

    /// Transition to `Ready`.
    ///
    /// Valid from: `Authenticating`.
    pub fn complete_auth(&mut self) -> Result<(), EcError> {
        match self {
            Self::Authenticating => {
                *self = Self::Ready;
                Ok(())
            }
            _ => Err(EcError::InvalidState("cannot complete auth: no handshake in progress")),
        }
    }

    /// Check the worker out, or nest one level deeper.
    ///
    /// Valid from: `Ready`, `CheckedOut`.
    pub fn check_out(&mut self) -> Result<(), EcError> {
        match self {
            Self::Ready => {
                *self = Self::CheckedOut { depth: 1 };
                Ok(())
            }
            Self::CheckedOut { depth } => {
                *depth += 1;
                Ok(())
            }
            _ => Err(EcError::InvalidState("cannot check out: worker not ready")),
        }
    }

    /// Release one level; the outermost release returns to `Ready`.
    ///
    /// Valid from: `CheckedOut`.
    pub fn release(&mut self) -> Result<(), EcError> {
        match self {
            Self::CheckedOut { depth: 1 } => {
                *self = Self::Ready;
                Ok(())
            }
            Self::CheckedOut { depth } => {
                *depth -= 1;
                Ok(())
            }
            _ => Err(EcError::InvalidState("cannot release: worker not checked out")),
        }
    }

    /// Discard the worker regardless of current state. Terminal.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = WorkerPhase::default();
        assert_eq!(phase, WorkerPhase::Disconnected);

        phase.begin_connect().unwrap();
        assert_eq!(phase, WorkerPhase::Connecting);

        phase.begin_auth().unwrap();
        assert_eq!(phase, WorkerPhase::Authenticating);

        phase.complete_auth().unwrap();
        assert!(phase.is_ready());

        phase.check_out().unwrap();
        assert_eq!(phase.depth(), 1);

        phase.release().unwrap();
        assert!(phase.is_ready());
    }

    #[test]
    fn reentrant_checkout_nests() {
        let mut phase = WorkerPhase::Ready;
        phase.check_out().unwrap();
        phase.check_out().unwrap();
        phase.check_out().unwrap();
        assert_eq!(phase.depth(), 3);

        phase.release().unwrap();
        phase.release().unwrap();
        assert_eq!(phase.depth(), 1);
        assert!(!phase.is_ready());

        phase.release().unwrap();
        assert!(phase.is_ready());
    }

    #[test]
    fn invalid_transitions() {
        let mut phase = WorkerPhase::Disconnected;
        assert!(phase.begin_auth().is_err());
        assert!(phase.complete_auth().is_err());
        assert!(phase.check_out().is_err());
        assert!(phase.release().is_err());

        let mut phase = WorkerPhase::Ready;
        assert!(phase.begin_connect().is_err());
        assert!(phase.release().is_err());
    }

    #[test]
    fn close_is_terminal_from_any_state() {
        for mut phase in [
            WorkerPhase::Disconnected,
            WorkerPhase::Connecting,
            WorkerPhase::Authenticating,
            WorkerPhase::Ready,
            WorkerPhase::CheckedOut { depth: 2 },
        ] {
            phase.close();
            assert!(phase.is_closed());
            assert!(phase.check_out().is_err());
            assert!(phase.begin_connect().is_err());
        }
    }

    #[test]
    fn display_format() {
        assert_eq!(WorkerPhase::Ready.to_string(), "Ready");
        assert_eq!(WorkerPhase::CheckedOut { depth: 2 }.to_string(), "CheckedOut(2)");
        assert_eq!(WorkerPhase::Closed.to_string(), "Closed");
    }
}

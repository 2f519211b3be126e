//! Fault taxonomy shared by the transaction engines and device controllers.
//!
//! The polling contract itself is the tri-state [`Status`](crate::bus::Status);
//! a `FaultKind` is recorded alongside every transition into a terminal
//! `Error` state so that no failure is ever silently dropped — callers that
//! care can ask `last_fault()` after seeing `Status::Error`.
//!
//! All variants are `Copy` so they can be cheaply threaded through the tick
//! loop without allocation.

use core::fmt;

/// Why a component last entered its `Error` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The transaction did not complete within its timeout budget.
    /// Recoverable by re-issuing the operation.
    Timeout,
    /// The peer refused a byte (I2C NACK).
    Nack,
    /// Bus arbitration was lost mid-transaction.
    ArbitrationLost,
    /// Serial framing/overrun/parity error on a receive path.
    Frame,
    /// A verify pass found data that does not match what was written or
    /// expected. Terminal for that operation; the caller must re-attempt
    /// the whole operation.
    DataIntegrity,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Nack => write!(f, "not acknowledged"),
            Self::ArbitrationLost => write!(f, "arbitration lost"),
            Self::Frame => write!(f, "framing error"),
            Self::DataIntegrity => write!(f, "verify mismatch"),
        }
    }
}

//! Bus transaction engines.
//!
//! Non-blocking, byte-level transaction state machines for the two serial
//! buses the controller owns. Each engine is driven from two directions:
//!
//! - [`on_event`](i2c::I2cEngine::on_event) — hardware completion events
//!   (ISR-equivalents), each advancing exactly one state transition;
//! - `tick(elapsed_ms)` — timeout countdown, forcing `Error` if a
//!   transaction does not complete inside its budget.
//!
//! Callers never block: they poll [`Status`] until a terminal state
//! appears. Reading a terminal status clears the engine back to idle.
//!
//! One engine value exists per physical bus; controllers sharing a bus
//! borrow it mutably for each call, so cross-controller serialization is
//! enforced by ownership rather than by caller discipline.

pub mod i2c;
pub mod uart;

/// Poll result shared by every engine and device controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The last operation failed. Reading this clears the component to idle;
    /// `last_fault()` says why.
    Error,
    /// An operation is in flight.
    Pending,
    /// The last operation completed. Reading this clears the component to
    /// idle; it is reported exactly once.
    Success,
}

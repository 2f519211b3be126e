//! Device controllers layered on the bus engines.
//!
//! Each controller is an owned state machine that borrows its bus engine
//! per call. A controller only ticks the bus while it has a transaction of
//! its own in flight, so two controllers sharing one bus never touch each
//! other's timeout budgets.

pub mod eeprom;
pub mod expander;

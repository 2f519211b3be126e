//! Ovenctl control core.
//!
//! Pure-logic heart of a thermocouple oven controller: cooperative,
//! tick-driven state machines for the I2C/UART transaction engines, the
//! EEPROM and GPIO-expander controllers and the Modbus RTU slave, plus the
//! fixed-point control-loop filters that consume their outputs.
//!
//! Everything here is host-buildable. Register-level peripheral drivers
//! (ADC, PWM, raw GPIO, watchdog) and the board bring-up loop live outside
//! this crate and reach in through the small port traits in [`bus`] and
//! through `embedded_hal::digital::OutputPin` for the handful of discrete
//! pins the core drives itself (EEPROM write protect, RS-485 driver
//! enable, expander reset).
//!
//! ## Execution model
//!
//! Single-threaded cooperative scheduling. Two forces advance state:
//!
//! 1. a periodic tick carrying elapsed milliseconds, fanned out to every
//!    active component's `tick()`;
//! 2. hardware completion events (ISR-equivalents) delivered through
//!    `on_event()` / `on_interrupt()`, each advancing exactly one
//!    transaction step.
//!
//! No public entry point blocks. Completion is observed by polling
//! `status()`, which returns [`bus::Status::Pending`] until the underlying
//! transaction finishes and clears a terminal state back to idle when read.

#![deny(unused_must_use)]

pub mod bus;
pub mod config;
pub mod control;
pub mod device;
pub mod modbus;
pub mod sim;

mod error;

pub use error::FaultKind;

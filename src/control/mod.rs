//! Fixed-point control-loop building blocks.
//!
//! Everything in here works on 24.8 fixed-point values (`i32` with 8
//! fractional bits, `_fp` suffix): fine enough for hundredths of a degree,
//! cheap enough for a tick handler. The blocks share two conventions:
//!
//! - time-driven blocks take an elapsed-milliseconds tick and evaluate on
//!   their own period, carrying the remainder so long ticks do not drift;
//! - inputs are sampled by the caller and passed in as plain values, so a
//!   block never reaches out into the rest of the system.
//!
//! A typical heater chain: thermocouple conversion -> [`iir`] smoothing ->
//! [`setpoint`] ramp + [`pid_oven`] -> [`max_delta`] limiter -> PWM duty.

pub mod debounce;
pub mod fir;
pub mod iir;
pub mod max_delta;
pub mod pid;
pub mod pid_oven;
pub mod setpoint;
pub mod table;
pub mod thermocouple;

/// Fractional bits of the 24.8 representation.
pub const FP_SHIFT: u32 = 8;

/// 1.0 in 24.8.
pub const FP_ONE: i32 = 1 << FP_SHIFT;

/// Integer value to 24.8.
#[must_use]
pub const fn fp(value: i32) -> i32 {
    value << FP_SHIFT
}

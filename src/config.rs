//! Controller configuration.
//!
//! Tunable parameters for the control loop and the Modbus link. Values are
//! loaded by the board layer (EEPROM-backed via the [`device::eeprom`]
//! controller, or a host-side JSON file during commissioning) and handed to
//! the core at init.
//!
//! [`device::eeprom`]: crate::device::eeprom

use serde::{Deserialize, Serialize};

/// PID gain triplet. Gains multiply fixed-point 24.8 errors directly, so
/// they are plain integers (a gain of 1 means 1 output count per error
/// count per period).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidGains {
    pub p: i32,
    pub i: i32,
    pub d: i32,
}

/// Core controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    // --- Modbus link ---
    /// Slave address on the RTU bus (1-247).
    pub modbus_address: u8,
    /// Inter-frame timeout once a partial request has started arriving (ms).
    pub modbus_timeout_ms: u16,

    // --- Control loop ---
    /// PID gains for the heater loop.
    pub pid: PidGains,
    /// PID evaluation period (ms, max 100).
    pub pid_period_ms: u8,
    /// Master control-loop tick quantum (ms).
    pub tick_period_ms: u16,

    // --- EEPROM ---
    /// I2C device address of the configuration EEPROM.
    pub eeprom_address: u8,

    // --- Expander ---
    /// I2C device address of the GPIO expander.
    pub expander_address: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            modbus_address: 1,
            modbus_timeout_ms: 500,

            pid: PidGains { p: 0, i: 0, d: 0 },
            pid_period_ms: 100,
            tick_period_ms: 10,

            eeprom_address: 0x50,
            expander_address: 0x40,
        }
    }
}

//! Modbus RTU slave for the RS-485 service port.
//!
//! Supports the four functions the commissioning tools use: read holding
//! registers (0x03), read input registers (0x04, served from the same
//! register map), write single register (0x06) and write multiple
//! registers (0x10). Frames failing the CRC or addressed elsewhere are
//! discarded without a response, as the protocol requires; malformed but
//! well-addressed requests get exception responses.

pub mod crc;
pub mod slave;

pub use slave::{ModbusSlave, RangeHooks, ReadOnly, RegisterRange};

/// Function codes served.
pub const FN_READ_HOLDING: u8 = 0x03;
pub const FN_READ_INPUT: u8 = 0x04;
pub const FN_WRITE_SINGLE: u8 = 0x06;
pub const FN_WRITE_MULTIPLE: u8 = 0x10;

/// Exception codes returned with the function's high bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Exception {
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
}

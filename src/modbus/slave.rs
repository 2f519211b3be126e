//! Modbus RTU slave state machine.
//!
//! Sits on the UART engine and serves the register map one request at a
//! time: arm a read, watch the byte count grow, work the expected frame
//! length out of the function code, then answer. The RS-485 driver-enable
//! pin is raised for exactly the lifetime of the response transmission —
//! the UART engine reports success only once the shift register has
//! drained, so the line is never released mid-byte.
//!
//! Silence is part of the protocol: frames with a bad CRC, frames for
//! another slave and frames with an unknown function code are discarded
//! without a response. Only well-formed requests addressed to us get a
//! reply, normal or exception.

use embedded_hal::digital::OutputPin;
use heapless::Vec;
use log::{debug, warn};

use super::crc;
use super::{Exception, FN_READ_HOLDING, FN_READ_INPUT, FN_WRITE_MULTIPLE, FN_WRITE_SINGLE};
use crate::bus::uart::{UartEngine, UartPort, BUF_MAX};
use crate::bus::Status;

/// Per-range behaviour hooks. All methods default to allow / no-op; a
/// returned exception is sent to the master in place of the response.
pub trait RangeHooks {
    /// A validated read is about to be served. `regs` is the requested
    /// window of the backing storage; live values can be refreshed in
    /// place before serialization.
    fn after_read(&mut self, regs: &mut [u16]) -> Result<(), Exception> {
        let _ = regs;
        Ok(())
    }

    /// Validate one incoming register write. An error rejects the whole
    /// request and leaves every register untouched.
    fn before_write(&mut self, addr: u16, value: u16) -> Result<(), Exception> {
        let _ = (addr, value);
        Ok(())
    }

    /// `count` registers starting at `addr` were written.
    fn after_write(&mut self, addr: u16, count: u16) -> Result<(), Exception> {
        let _ = (addr, count);
        Ok(())
    }
}

impl RangeHooks for () {}

/// Hooks for a range the master may read but never write; writes answer
/// as if the address did not exist.
pub struct ReadOnly;

impl RangeHooks for ReadOnly {
    fn before_write(&mut self, _addr: u16, _value: u16) -> Result<(), Exception> {
        Err(Exception::IllegalDataAddress)
    }
}

/// One contiguous block of the register map.
pub struct RegisterRange<'a> {
    start: u16,
    regs: &'a mut [u16],
    hooks: &'a mut dyn RangeHooks,
}

impl<'a> RegisterRange<'a> {
    pub fn new(start: u16, regs: &'a mut [u16], hooks: &'a mut dyn RangeHooks) -> Self {
        Self { start, regs, hooks }
    }

    fn contains(&self, addr: u16, qty: u16) -> bool {
        addr >= self.start
            && u32::from(addr) + u32::from(qty) <= u32::from(self.start) + self.regs.len() as u32
    }
}

/// A request must fall entirely inside one range; straddling two is an
/// illegal-data-address error even when both halves exist.
fn find_range<'r, 'a>(
    ranges: &'r mut [RegisterRange<'a>],
    addr: u16,
    qty: u16,
) -> Option<&'r mut RegisterRange<'a>> {
    ranges.iter_mut().find(|r| r.contains(addr, qty))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Arm the receiver.
    Init,
    /// Receiver armed, bus quiet.
    Waiting,
    /// A partial frame has started arriving; inter-frame timeout armed.
    Reading,
    /// Response transmission in flight, driver enable high.
    Writing,
}

/// Modbus RTU slave. `OE` is the RS-485 driver-enable pin.
pub struct ModbusSlave<OE: OutputPin> {
    address: u8,
    /// Timeout for the remainder of a frame once its first byte arrives.
    timeout_ms: u16,
    oe: OE,
    state: State,
}

impl<OE: OutputPin> ModbusSlave<OE> {
    pub fn new(address: u8, timeout_ms: u16, mut oe: OE) -> Self {
        debug_assert!((1..=247).contains(&address));
        let _ = oe.set_low();
        Self {
            address,
            timeout_ms,
            oe,
            state: State::Init,
        }
    }

    /// Advance the slave. The UART engine is dedicated to this link, so
    /// the slave ticks it too.
    pub fn tick<P: UartPort>(
        &mut self,
        uart: &mut UartEngine<P>,
        ranges: &mut [RegisterRange<'_>],
        period_ms: u16,
    ) {
        uart.tick(period_ms);

        match self.state {
            State::Init => {
                uart.read(BUF_MAX);
                self.state = State::Waiting;
            }

            State::Waiting => {
                let (status, count) = uart.read_status();
                if status == Status::Error {
                    self.state = State::Init;
                } else if count > 0 {
                    // Frame under way: bound the wait for its remainder.
                    uart.set_read_timeout(self.timeout_ms);
                    self.state = State::Reading;
                }
            }

            State::Reading => {
                let (status, count) = uart.read_status();
                if status == Status::Error {
                    debug!("modbus: partial frame dropped after {count} bytes");
                    self.state = State::Init;
                    return;
                }
                let Some(expected) = expected_length(uart.rx_data()) else {
                    return; // not enough bytes to tell yet
                };
                if expected == 0 || expected > BUF_MAX {
                    // Unknown function or oversized frame: not ours to
                    // answer. Drop it and listen for the next one.
                    uart.abort_read();
                    self.state = State::Init;
                    return;
                }
                if count < expected {
                    return;
                }

                let mut frame: Vec<u8, BUF_MAX> = Vec::new();
                let _ = frame.extend_from_slice(&uart.rx_data()[..expected]);
                uart.abort_read();

                match self.process(&frame, ranges) {
                    Some(response) => {
                        let _ = self.oe.set_high();
                        uart.write(&response);
                        self.state = State::Writing;
                    }
                    None => self.state = State::Init,
                }
            }

            State::Writing => {
                let (status, _) = uart.write_status();
                match status {
                    Status::Pending => {}
                    Status::Success => {
                        let _ = self.oe.set_low();
                        self.state = State::Init;
                    }
                    Status::Error => {
                        warn!("modbus: response transmission failed");
                        let _ = self.oe.set_low();
                        self.state = State::Init;
                    }
                }
            }
        }
    }

    /// Validate and execute one complete frame. `None` means silence.
    fn process(
        &mut self,
        frame: &[u8],
        ranges: &mut [RegisterRange<'_>],
    ) -> Option<Vec<u8, BUF_MAX>> {
        if !crc::verify(frame) {
            debug!("modbus: crc mismatch, frame dropped");
            return None;
        }
        if frame[0] != self.address {
            return None;
        }

        let function = frame[1];
        let result = match function {
            FN_READ_HOLDING | FN_READ_INPUT => self.read_registers(frame, ranges),
            FN_WRITE_SINGLE => self.write_single(frame, ranges),
            FN_WRITE_MULTIPLE => self.write_multiple(frame, ranges),
            // Frame length already implied a known function, but stay
            // silent rather than panic if that ever changes.
            _ => return None,
        };

        Some(match result {
            Ok(response) => response,
            Err(code) => {
                debug!("modbus: fn {function:#04x} exception {:#04x}", code as u8);
                let mut response = Vec::new();
                let _ = response.push(self.address);
                let _ = response.push(function | 0x80);
                let _ = response.push(code as u8);
                append_crc(&mut response);
                response
            }
        })
    }

    fn read_registers(
        &mut self,
        frame: &[u8],
        ranges: &mut [RegisterRange<'_>],
    ) -> Result<Vec<u8, BUF_MAX>, Exception> {
        let addr = u16::from_be_bytes([frame[2], frame[3]]);
        let qty = u16::from_be_bytes([frame[4], frame[5]]);
        if qty == 0 || 3 + 2 * qty as usize + 2 > BUF_MAX {
            return Err(Exception::IllegalDataValue);
        }
        let range = find_range(ranges, addr, qty).ok_or(Exception::IllegalDataAddress)?;
        let offset = (addr - range.start) as usize;
        range
            .hooks
            .after_read(&mut range.regs[offset..offset + qty as usize])?;

        let mut response = Vec::new();
        let _ = response.push(self.address);
        let _ = response.push(frame[1]);
        let _ = response.push((2 * qty) as u8);
        for &reg in &range.regs[offset..offset + qty as usize] {
            let _ = response.extend_from_slice(&reg.to_be_bytes());
        }
        append_crc(&mut response);
        Ok(response)
    }

    fn write_single(
        &mut self,
        frame: &[u8],
        ranges: &mut [RegisterRange<'_>],
    ) -> Result<Vec<u8, BUF_MAX>, Exception> {
        let addr = u16::from_be_bytes([frame[2], frame[3]]);
        let value = u16::from_be_bytes([frame[4], frame[5]]);
        let range = find_range(ranges, addr, 1).ok_or(Exception::IllegalDataAddress)?;
        range.hooks.before_write(addr, value)?;
        range.regs[(addr - range.start) as usize] = value;
        range.hooks.after_write(addr, 1)?;

        // Echo the request: address high/low, then value high/low.
        let mut response = Vec::new();
        let _ = response.extend_from_slice(&frame[..6]);
        append_crc(&mut response);
        Ok(response)
    }

    fn write_multiple(
        &mut self,
        frame: &[u8],
        ranges: &mut [RegisterRange<'_>],
    ) -> Result<Vec<u8, BUF_MAX>, Exception> {
        let addr = u16::from_be_bytes([frame[2], frame[3]]);
        let qty = u16::from_be_bytes([frame[4], frame[5]]);
        let byte_count = frame[6] as usize;
        if qty == 0 || byte_count != 2 * qty as usize {
            return Err(Exception::IllegalDataValue);
        }
        let range = find_range(ranges, addr, qty).ok_or(Exception::IllegalDataAddress)?;

        // Validate everything first so a veto leaves the map untouched.
        for i in 0..qty as usize {
            let value = u16::from_be_bytes([frame[7 + 2 * i], frame[8 + 2 * i]]);
            range.hooks.before_write(addr + i as u16, value)?;
        }
        let offset = (addr - range.start) as usize;
        for i in 0..qty as usize {
            range.regs[offset + i] = u16::from_be_bytes([frame[7 + 2 * i], frame[8 + 2 * i]]);
        }
        range.hooks.after_write(addr, qty)?;

        let mut response = Vec::new();
        let _ = response.push(self.address);
        let _ = response.push(FN_WRITE_MULTIPLE);
        let _ = response.extend_from_slice(&addr.to_be_bytes());
        let _ = response.extend_from_slice(&qty.to_be_bytes());
        append_crc(&mut response);
        Ok(response)
    }
}

/// Total frame length implied by the function code, or `None` while more
/// bytes are needed to tell, or `Some(0)` for functions we do not speak.
fn expected_length(partial: &[u8]) -> Option<usize> {
    if partial.len() < 2 {
        return None;
    }
    match partial[1] {
        FN_READ_HOLDING | FN_READ_INPUT | FN_WRITE_SINGLE => Some(8),
        FN_WRITE_MULTIPLE => {
            if partial.len() < 7 {
                None
            } else {
                Some(9 + partial[6] as usize)
            }
        }
        _ => Some(0),
    }
}

fn append_crc(frame: &mut Vec<u8, BUF_MAX>) {
    let fcs = crc::to_wire(crc::compute(frame));
    let _ = frame.extend_from_slice(&fcs);
}

//! Configuration EEPROM controller.
//!
//! Chunked, verified access to a byte-addressed serial EEPROM behind the
//! I2C engine. The device accepts at most [`CHUNK`] bytes per write burst
//! and goes unaddressable during its self-timed write cycle, so every
//! write/erase runs as: drop write protect, burst a chunk, ACK-poll until
//! the device answers again, repeat, then read everything back and
//! compare. Write protect is reasserted on every path out of the machine,
//! error paths included.
//!
//! All operations are started with a method call and then driven by
//! [`Eeprom::tick`]; completion is observed through [`Eeprom::status`].

use embedded_hal::digital::OutputPin;
use heapless::Vec;
use log::{debug, warn};

use crate::bus::i2c::{I2cDevice, I2cEngine, I2cPort};
use crate::bus::Status;
use crate::error::FaultKind;

/// Device page-buffer limit per write burst.
pub const CHUNK: usize = 16;

/// Largest payload one operation moves.
pub const BUF_MAX: usize = 64;

/// Total budget for ACK polling after one chunk. The datasheet write
/// cycle is 5 ms; anything near this budget means a broken device.
const WAIT_TIMEOUT_MS: u16 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// Data chunk burst in flight.
    Write,
    /// ACK-polling the device after a write chunk.
    WriteWait,
    /// 0xFF chunk burst in flight.
    Erase,
    /// ACK-polling after an erase chunk.
    EraseWait,
    /// Address-set write for a plain read.
    ReadAddr,
    /// Read burst of a plain read.
    ReadData,
    /// Address-set write for write verification.
    VerifyAddr,
    /// Read-back burst, compared against the written data.
    VerifyData,
    /// Address-set write for erase verification.
    EraseVerifyAddr,
    /// Read-back burst, compared against 0xFF.
    EraseVerifyData,
    Completed,
    Error,
}

/// EEPROM controller. `WP` is the write-protect pin: driven high
/// (protected) except while a write or erase is actually in progress.
pub struct Eeprom<WP: OutputPin> {
    device: I2cDevice,
    wp: WP,
    state: State,
    buf: Vec<u8, BUF_MAX>,
    /// Start address of the operation in flight.
    addr: u8,
    /// Total length of the operation in flight.
    len: usize,
    /// Bytes written/erased so far.
    pos: usize,
    /// Bytes read back so far (read and verify phases).
    rpos: usize,
    wait_ms: u16,
    last_fault: Option<FaultKind>,
}

impl<WP: OutputPin> Eeprom<WP> {
    /// `address` is the device's I2C address (R/W bit clear). The
    /// write-protect pin is asserted immediately.
    pub fn new(address: u8, mut wp: WP) -> Self {
        let _ = wp.set_high();
        Self {
            device: I2cDevice::new(address),
            wp,
            state: State::Idle,
            buf: Vec::new(),
            addr: 0,
            len: 0,
            pos: 0,
            rpos: 0,
            wait_ms: 0,
            last_fault: None,
        }
    }

    pub fn idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Poll the operation in flight; terminal states clear back to idle.
    pub fn status(&mut self) -> Status {
        match self.state {
            State::Completed => {
                self.state = State::Idle;
                Status::Success
            }
            State::Error => {
                self.state = State::Idle;
                Status::Error
            }
            State::Idle => Status::Error,
            _ => Status::Pending,
        }
    }

    pub fn last_fault(&self) -> Option<FaultKind> {
        self.last_fault
    }

    /// Result of the last completed read.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Start reading `len` bytes from `addr`. Write protect stays asserted.
    pub fn read<P: I2cPort>(&mut self, bus: &mut I2cEngine<P>, addr: u8, len: usize) {
        debug_assert!(self.idle());
        debug_assert!(len > 0 && len <= BUF_MAX);
        self.begin(addr, len);
        self.device.write(bus, addr, &[]);
        self.state = State::ReadAddr;
    }

    /// Start writing `data` at `addr`. The data is read back and compared
    /// once every chunk has been accepted.
    pub fn write<P: I2cPort>(&mut self, bus: &mut I2cEngine<P>, addr: u8, data: &[u8]) {
        debug_assert!(self.idle());
        debug_assert!(!data.is_empty() && data.len() <= BUF_MAX);
        self.begin(addr, data.len());
        let _ = self.buf.extend_from_slice(data);
        let _ = self.wp.set_low();
        self.start_chunk(bus, State::Write);
    }

    /// Start erasing `len` bytes at `addr` (writing 0xFF), verified.
    pub fn erase<P: I2cPort>(&mut self, bus: &mut I2cEngine<P>, addr: u8, len: usize) {
        debug_assert!(self.idle());
        debug_assert!(len > 0 && addr as usize + len <= 256);
        self.begin(addr, len);
        let _ = self.wp.set_low();
        self.start_chunk(bus, State::Erase);
    }

    /// Check that the device holds `data` at `addr`, without writing.
    pub fn verify<P: I2cPort>(&mut self, bus: &mut I2cEngine<P>, addr: u8, data: &[u8]) {
        debug_assert!(self.idle());
        debug_assert!(!data.is_empty() && data.len() <= BUF_MAX);
        self.begin(addr, data.len());
        let _ = self.buf.extend_from_slice(data);
        self.device.write(bus, addr, &[]);
        self.state = State::VerifyAddr;
    }

    /// Check that `len` bytes at `addr` are erased, without touching them.
    pub fn erase_verify<P: I2cPort>(&mut self, bus: &mut I2cEngine<P>, addr: u8, len: usize) {
        debug_assert!(self.idle());
        debug_assert!(len > 0 && addr as usize + len <= 256);
        self.begin(addr, len);
        self.device.write(bus, addr, &[]);
        self.state = State::EraseVerifyAddr;
    }

    fn begin(&mut self, addr: u8, len: usize) {
        self.buf.clear();
        self.addr = addr;
        self.len = len;
        self.pos = 0;
        self.rpos = 0;
        self.wait_ms = 0;
    }

    /// Burst the next chunk of a write or erase.
    fn start_chunk<P: I2cPort>(&mut self, bus: &mut I2cEngine<P>, state: State) {
        let chunk = (self.len - self.pos).min(CHUNK);
        let addr = self.addr.wrapping_add(self.pos as u8);
        if state == State::Erase {
            self.device.write(bus, addr, &[0xFF; CHUNK][..chunk]);
        } else {
            self.device.write(bus, addr, &self.buf[self.pos..self.pos + chunk]);
        }
        self.pos += chunk;
        self.state = state;
    }

    fn next_read_chunk(&self) -> usize {
        (self.len - self.rpos).min(CHUNK)
    }

    /// Advance the machine. Must be called once per tick quantum while an
    /// operation is in flight; the controller ticks the bus itself.
    pub fn tick<P: I2cPort>(&mut self, bus: &mut I2cEngine<P>, period_ms: u16) {
        match self.state {
            State::Idle | State::Completed | State::Error => return,
            _ => bus.tick(period_ms),
        }

        match self.state {
            State::Write | State::Erase => match self.device.status(bus) {
                Status::Pending => {}
                Status::Success => {
                    // Chunk accepted; the device is now in its self-timed
                    // write cycle. Poll it by addressing it with no data.
                    self.wait_ms = WAIT_TIMEOUT_MS;
                    self.device.write(bus, self.addr.wrapping_add(self.pos as u8), &[]);
                    self.state = if self.state == State::Write {
                        State::WriteWait
                    } else {
                        State::EraseWait
                    };
                }
                Status::Error => self.fail(bus),
            },

            State::WriteWait | State::EraseWait => match self.device.status(bus) {
                Status::Pending => {}
                Status::Success => {
                    if self.pos < self.len {
                        let next = if self.state == State::WriteWait {
                            State::Write
                        } else {
                            State::Erase
                        };
                        self.start_chunk(bus, next);
                    } else {
                        // All chunks in; protect again and read back.
                        let _ = self.wp.set_high();
                        self.device.write(bus, self.addr, &[]);
                        self.state = if self.state == State::WriteWait {
                            State::VerifyAddr
                        } else {
                            State::EraseVerifyAddr
                        };
                    }
                }
                Status::Error => {
                    // NACK while the write cycle runs is expected; keep
                    // polling until the budget is gone.
                    if self.wait_ms <= period_ms {
                        warn!("eeprom: device stuck busy after chunk at {:#04x}", self.pos);
                        self.last_fault = Some(FaultKind::Timeout);
                        self.enter_error();
                    } else {
                        self.wait_ms -= period_ms;
                        self.device.write(bus, self.addr.wrapping_add(self.pos as u8), &[]);
                    }
                }
            },

            State::ReadAddr | State::VerifyAddr | State::EraseVerifyAddr => {
                match self.device.status(bus) {
                    Status::Pending => {}
                    Status::Success => {
                        self.device.read(bus, self.next_read_chunk());
                        self.state = match self.state {
                            State::ReadAddr => State::ReadData,
                            State::VerifyAddr => State::VerifyData,
                            _ => State::EraseVerifyData,
                        };
                    }
                    Status::Error => self.fail(bus),
                }
            }

            State::ReadData => match self.device.status(bus) {
                Status::Pending => {}
                Status::Success => {
                    let _ = self.buf.extend_from_slice(bus.rx_data());
                    self.rpos = self.buf.len();
                    if self.rpos < self.len {
                        self.device.read(bus, self.next_read_chunk());
                    } else {
                        self.state = State::Completed;
                    }
                }
                Status::Error => self.fail(bus),
            },

            State::VerifyData | State::EraseVerifyData => match self.device.status(bus) {
                Status::Pending => {}
                Status::Success => {
                    let expect_ff = self.state == State::EraseVerifyData;
                    let got = bus.rx_data();
                    let ok = if expect_ff {
                        got.iter().all(|&b| b == 0xFF)
                    } else {
                        got == &self.buf[self.rpos..self.rpos + got.len()]
                    };
                    if !ok {
                        warn!(
                            "eeprom: verify mismatch at {:#04x}",
                            self.addr.wrapping_add(self.rpos as u8)
                        );
                        self.last_fault = Some(FaultKind::DataIntegrity);
                        self.enter_error();
                        return;
                    }
                    self.rpos += got.len();
                    if self.rpos < self.len {
                        self.device.read(bus, self.next_read_chunk());
                    } else {
                        debug!("eeprom: {} bytes verified at {:#04x}", self.len, self.addr);
                        self.enter_completed();
                    }
                }
                Status::Error => self.fail(bus),
            },

            State::Idle | State::Completed | State::Error => {}
        }
    }

    fn fail<P: I2cPort>(&mut self, bus: &mut I2cEngine<P>) {
        self.last_fault = bus.last_fault();
        self.enter_error();
    }

    fn enter_error(&mut self) {
        let _ = self.wp.set_high();
        self.state = State::Error;
    }

    fn enter_completed(&mut self) {
        let _ = self.wp.set_high();
        self.state = State::Completed;
    }
}

//! Host-side simulation harness.
//!
//! Register-level fakes for the peripherals the core talks to, good enough
//! to exercise every state machine end to end on the host: an I2C
//! controller with a pluggable bus target, a behavioural EEPROM/expander
//! memory model, a UART that echoes transmit-side progress, and a probed
//! output pin. Scenario tests drive these through the same port traits the
//! board layer implements.

use core::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::bus::i2c::{I2cEvent, I2cPort};
use crate::bus::uart::{UartEvent, UartPort};

// ---------------------------------------------------------------------
// I2C

/// Behavioural model of a device sitting on the simulated bus.
pub trait I2cTarget {
    /// START condition with the given control byte; returns the ACK bit.
    fn on_start(&mut self, control: u8) -> bool;
    /// One data byte from the master; returns the ACK bit.
    fn on_write(&mut self, byte: u8) -> bool;
    /// Master clocks one byte out of the device.
    fn on_read(&mut self) -> u8;
    /// STOP condition.
    fn on_stop(&mut self);
}

/// Simulated I2C controller peripheral. Every port call completes
/// "in hardware" immediately and queues the completion event the real
/// peripheral would raise; tests drain the queue into the engine.
pub struct SimI2c<T: I2cTarget> {
    target: T,
    events: VecDeque<I2cEvent>,
    /// Data register: holds the last byte clocked in from the target.
    data_reg: u8,
    nack_armed: bool,
    nack_seen: bool,
}

impl<T: I2cTarget> SimI2c<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            events: VecDeque::new(),
            data_reg: 0,
            nack_armed: false,
            nack_seen: false,
        }
    }

    pub fn pop_event(&mut self) -> Option<I2cEvent> {
        self.events.pop_front()
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Whether the NACK bit was armed at any point since construction
    /// (it must be, before the final byte of any read burst).
    pub fn nack_was_armed(&self) -> bool {
        self.nack_seen
    }
}

impl<T: I2cTarget> I2cPort for SimI2c<T> {
    fn start(&mut self, control: u8) {
        let acked = self.target.on_start(control);
        self.events.push_back(I2cEvent::Transfer { acked });
    }

    fn write(&mut self, byte: u8) {
        let acked = self.target.on_write(byte);
        self.events.push_back(I2cEvent::Transfer { acked });
    }

    fn read(&mut self) -> u8 {
        let taken = self.data_reg;
        if !self.nack_armed {
            // Taking the data register clocks the next byte in.
            self.data_reg = self.target.on_read();
            self.events.push_back(I2cEvent::Transfer { acked: true });
        }
        taken
    }

    fn nack_next(&mut self, armed: bool) {
        self.nack_armed = armed;
        if armed {
            self.nack_seen = true;
        }
    }

    fn stop(&mut self) {
        self.events.clear();
        self.target.on_stop();
    }
}

/// Byte-addressed I2C memory: models both the configuration EEPROM
/// (including the busy window after a write burst, during which the
/// device NACKs its own address) and the expander's register file.
pub struct MemoryTarget {
    mem: [u8; 256],
    cursor: usize,
    /// Next master write is the register/memory address byte.
    expecting_addr: bool,
    wrote_data: bool,
    /// Remaining START conditions to NACK.
    busy: u8,
    /// Busy window re-armed after every data-carrying write burst.
    busy_after_write: u8,
    read_only: Option<usize>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self {
            mem: [0; 256],
            cursor: 0,
            expecting_addr: false,
            wrote_data: false,
            busy: 0,
            busy_after_write: 0,
            read_only: None,
        }
    }

    /// Preload memory contents.
    pub fn load(&mut self, addr: usize, data: &[u8]) {
        self.mem[addr..addr + data.len()].copy_from_slice(data);
    }

    pub fn mem(&self) -> &[u8; 256] {
        &self.mem
    }

    /// NACK the next `n` START conditions outright.
    pub fn set_busy(&mut self, n: u8) {
        self.busy = n;
    }

    /// NACK `n` START conditions after every data-carrying write burst
    /// (models EEPROM self-timed write cycles / ACK polling).
    pub fn set_busy_after_write(&mut self, n: u8) {
        self.busy_after_write = n;
    }

    /// Make one address refuse writes, so read-back verification fails.
    pub fn set_read_only(&mut self, addr: usize) {
        self.read_only = Some(addr);
    }
}

impl Default for MemoryTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cTarget for MemoryTarget {
    fn on_start(&mut self, control: u8) -> bool {
        if self.busy > 0 {
            self.busy -= 1;
            return false;
        }
        if control & 0x01 == 0 {
            self.expecting_addr = true;
        }
        true
    }

    fn on_write(&mut self, byte: u8) -> bool {
        if self.expecting_addr {
            self.cursor = byte as usize;
            self.expecting_addr = false;
        } else {
            if self.read_only != Some(self.cursor) {
                self.mem[self.cursor] = byte;
            }
            self.cursor = (self.cursor + 1) % self.mem.len();
            self.wrote_data = true;
        }
        true
    }

    fn on_read(&mut self) -> u8 {
        let byte = self.mem[self.cursor];
        self.cursor = (self.cursor + 1) % self.mem.len();
        byte
    }

    fn on_stop(&mut self) {
        if self.wrote_data {
            self.busy = self.busy_after_write;
            self.wrote_data = false;
        }
    }
}

// ---------------------------------------------------------------------
// UART

/// Simulated serial peripheral. Transmitted bytes are appended to a log;
/// each load raises `TxEmpty`, and once the engine stops loading, a single
/// `TxIdle` reports the shift register drained. Receive traffic is staged
/// with [`SimUart::push_rx`].
pub struct SimUart {
    events: VecDeque<UartEvent>,
    tx_log: Vec<u8>,
    drain_pending: bool,
    stalled: bool,
}

impl SimUart {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            tx_log: Vec::new(),
            drain_pending: false,
            stalled: false,
        }
    }

    pub fn pop_event(&mut self) -> Option<UartEvent> {
        if let Some(ev) = self.events.pop_front() {
            return Some(ev);
        }
        if self.drain_pending {
            self.drain_pending = false;
            return Some(UartEvent::TxIdle);
        }
        None
    }

    /// Stage inbound traffic; delivered ahead of transmit-side events.
    pub fn push_rx(&mut self, data: &[u8]) {
        for &b in data {
            self.events.push_back(UartEvent::Rx(b));
        }
    }

    /// Stop raising transmit-side events (stuck transmitter).
    pub fn stall_tx(&mut self) {
        self.stalled = true;
    }

    pub fn tx_log(&self) -> &[u8] {
        &self.tx_log
    }

    pub fn clear_tx_log(&mut self) {
        self.tx_log.clear();
    }
}

impl Default for SimUart {
    fn default() -> Self {
        Self::new()
    }
}

impl UartPort for SimUart {
    fn write(&mut self, byte: u8) {
        self.tx_log.push(byte);
        if !self.stalled {
            self.events.push_back(UartEvent::TxEmpty);
            self.drain_pending = true;
        }
    }
}

// ---------------------------------------------------------------------
// Pins

/// Probed output pin. The pin value itself moves into the component under
/// test; the probe half stays with the test and observes every level
/// change.
#[derive(Clone)]
pub struct SimPin {
    state: Rc<Cell<bool>>,
}

impl SimPin {
    /// New pin, initially low. Clone it to keep a probe.
    pub fn new() -> Self {
        Self {
            state: Rc::new(Cell::new(false)),
        }
    }

    pub fn is_high(&self) -> bool {
        self.state.get()
    }
}

impl Default for SimPin {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for SimPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.state.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.state.set(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_target_addressed_write_and_read() {
        let mut t = MemoryTarget::new();
        assert!(t.on_start(0xA0));
        assert!(t.on_write(0x20)); // address byte
        assert!(t.on_write(0x11));
        assert!(t.on_write(0x22));
        t.on_stop();
        assert_eq!(t.mem()[0x20], 0x11);
        assert_eq!(t.mem()[0x21], 0x22);

        assert!(t.on_start(0xA0));
        assert!(t.on_write(0x21));
        assert!(t.on_start(0xA1));
        assert_eq!(t.on_read(), 0x22);
    }

    #[test]
    fn busy_window_nacks_then_recovers() {
        let mut t = MemoryTarget::new();
        t.set_busy_after_write(2);
        assert!(t.on_start(0xA0));
        assert!(t.on_write(0x00));
        assert!(t.on_write(0x55));
        t.on_stop();

        assert!(!t.on_start(0xA0));
        assert!(!t.on_start(0xA0));
        assert!(t.on_start(0xA0));
    }

    #[test]
    fn pin_probe_tracks_level() {
        let pin = SimPin::new();
        let probe = pin.clone();
        let mut owned = pin;
        owned.set_high().unwrap();
        assert!(probe.is_high());
        owned.set_low().unwrap();
        assert!(!probe.is_high());
    }
}

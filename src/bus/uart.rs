//! UART transaction engine.
//!
//! Byte-stream engine for the RS-485 service port. Unlike the I2C engine
//! there is no transaction framing on the wire, so the read and write
//! halves run as two independent contexts:
//!
//! - the read half fills a buffer up to a requested length, reporting the
//!   byte count on every poll so callers can parse partial frames;
//! - the write half clocks a buffer out on transmit-empty events, then
//!   waits for the shift register to drain before reporting success (the
//!   caller must not drop the RS-485 driver-enable pin earlier).
//!
//! A read has no timeout until the caller arms one with
//! [`UartEngine::set_read_timeout`]; a write budgets 2 ms per byte plus a
//! fixed drain allowance.

use heapless::Vec;
use log::warn;

use super::Status;
use crate::error::FaultKind;

/// Largest frame either half carries. Sized for the Modbus RTU frames the
/// service port speaks (function 0x10 with a 16-register payload plus
/// framing is 41 bytes).
pub const BUF_MAX: usize = 64;

/// Transmit budget per byte. A byte at 9600 baud takes just over 1 ms.
const TX_MS_PER_BYTE: u16 = 2;

/// Budget for the shift register to drain after the last byte is loaded.
const TX_DRAIN_MS: u16 = 50;

/// Register-level collaborator: the serial peripheral. Receive traffic and
/// transmit-side progress come back as [`UartEvent`]s.
pub trait UartPort {
    /// Load one byte into the transmit data register.
    fn write(&mut self, byte: u8);
}

/// Hardware events, delivered from the ISR-equivalent context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartEvent {
    /// A byte arrived.
    Rx(u8),
    /// The receiver flagged a framing, parity or overrun error.
    RxError,
    /// The transmit data register is empty and can take the next byte.
    TxEmpty,
    /// The transmit shift register has fully drained onto the wire.
    TxIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    Receiving,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    Sending,
    /// All bytes loaded; waiting for the shift register to drain.
    Draining,
    Completed,
    Error,
}

/// Non-blocking UART engine with independent read and write halves.
pub struct UartEngine<P: UartPort> {
    port: P,

    rx_state: RxState,
    rx: Vec<u8, BUF_MAX>,
    rx_expected: usize,
    /// 0 = no timeout armed.
    rx_timeout_ms: u16,

    tx_state: TxState,
    tx: Vec<u8, BUF_MAX>,
    tx_pos: usize,
    tx_timeout_ms: u16,

    last_fault: Option<FaultKind>,
}

impl<P: UartPort> UartEngine<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            rx_state: RxState::Idle,
            rx: Vec::new(),
            rx_expected: 0,
            rx_timeout_ms: 0,
            tx_state: TxState::Idle,
            tx: Vec::new(),
            tx_pos: 0,
            tx_timeout_ms: 0,
            last_fault: None,
        }
    }

    pub fn last_fault(&self) -> Option<FaultKind> {
        self.last_fault
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    // --- read half ---------------------------------------------------

    /// Arm the read half for up to `len` bytes. Bytes arriving while no
    /// read is armed are dropped. No timeout runs until
    /// [`set_read_timeout`](Self::set_read_timeout) arms one.
    pub fn read(&mut self, len: usize) {
        debug_assert!(len > 0 && len <= BUF_MAX);
        debug_assert!(matches!(self.rx_state, RxState::Idle | RxState::Error));
        self.rx.clear();
        self.rx_expected = len;
        self.rx_timeout_ms = 0;
        self.rx_state = RxState::Receiving;
    }

    /// Arm (or re-arm) the read timeout. Typically called once the caller
    /// observes a partial frame, to bound the wait for its remainder.
    pub fn set_read_timeout(&mut self, ms: u16) {
        self.rx_timeout_ms = ms;
    }

    /// Cancel the read in flight and discard whatever arrived.
    pub fn abort_read(&mut self) {
        self.rx.clear();
        self.rx_expected = 0;
        self.rx_timeout_ms = 0;
        self.rx_state = RxState::Idle;
    }

    /// Poll the read half. The count is the number of bytes received so
    /// far, valid in every state including `Pending` — partial-frame
    /// parsers rely on it. Terminal states clear back to idle.
    pub fn read_status(&mut self) -> (Status, usize) {
        let count = self.rx.len();
        let status = match self.rx_state {
            RxState::Completed => {
                self.rx_state = RxState::Idle;
                Status::Success
            }
            RxState::Error => {
                self.rx_state = RxState::Idle;
                Status::Error
            }
            RxState::Receiving => Status::Pending,
            RxState::Idle => Status::Error,
        };
        (status, count)
    }

    /// Received bytes of the read in flight (or the one just finished).
    pub fn rx_data(&self) -> &[u8] {
        &self.rx
    }

    // --- write half --------------------------------------------------

    /// Start transmitting `data`. Success is reported only after the
    /// final byte has fully left the shift register.
    pub fn write(&mut self, data: &[u8]) {
        debug_assert!(!data.is_empty() && data.len() <= BUF_MAX);
        debug_assert!(matches!(self.tx_state, TxState::Idle | TxState::Error));
        self.tx.clear();
        let _ = self.tx.extend_from_slice(data);
        self.tx_pos = 1;
        self.tx_timeout_ms = TX_MS_PER_BYTE * data.len() as u16 + TX_DRAIN_MS;
        self.tx_state = TxState::Sending;
        self.port.write(self.tx[0]);
    }

    /// Cancel the write in flight. Bytes already handed to the hardware
    /// still go out; the rest are dropped.
    pub fn abort_write(&mut self) {
        self.tx.clear();
        self.tx_pos = 0;
        self.tx_timeout_ms = 0;
        self.tx_state = TxState::Idle;
    }

    /// Poll the write half; the count is the number of bytes handed to the
    /// hardware so far.
    pub fn write_status(&mut self) -> (Status, usize) {
        let count = self.tx_pos;
        let status = match self.tx_state {
            TxState::Completed => {
                self.tx_state = TxState::Idle;
                Status::Success
            }
            TxState::Error => {
                self.tx_state = TxState::Idle;
                Status::Error
            }
            TxState::Sending | TxState::Draining => Status::Pending,
            TxState::Idle => Status::Error,
        };
        (status, count)
    }

    // --- shared ------------------------------------------------------

    /// Timeout countdown for both halves.
    pub fn tick(&mut self, period_ms: u16) {
        if self.rx_state == RxState::Receiving && self.rx_timeout_ms > 0 {
            if self.rx_timeout_ms <= period_ms {
                warn!("uart: read timeout after {} bytes", self.rx.len());
                self.rx_timeout_ms = 0;
                self.rx_state = RxState::Error;
                self.last_fault = Some(FaultKind::Timeout);
            } else {
                self.rx_timeout_ms -= period_ms;
            }
        }
        if matches!(self.tx_state, TxState::Sending | TxState::Draining) {
            if self.tx_timeout_ms <= period_ms {
                warn!("uart: write timeout at byte {}/{}", self.tx_pos, self.tx.len());
                self.tx_timeout_ms = 0;
                self.tx_state = TxState::Error;
                self.last_fault = Some(FaultKind::Timeout);
            } else {
                self.tx_timeout_ms -= period_ms;
            }
        }
    }

    /// Advance one step for one hardware event.
    pub fn on_event(&mut self, event: UartEvent) {
        match event {
            UartEvent::Rx(byte) => {
                if self.rx_state == RxState::Receiving {
                    let _ = self.rx.push(byte);
                    if self.rx.len() >= self.rx_expected {
                        self.rx_state = RxState::Completed;
                        self.rx_timeout_ms = 0;
                    }
                }
                // Otherwise: unsolicited traffic, dropped.
            }
            UartEvent::RxError => {
                if self.rx_state == RxState::Receiving {
                    warn!("uart: receive error after {} bytes", self.rx.len());
                    self.rx_state = RxState::Error;
                    self.rx_timeout_ms = 0;
                    self.last_fault = Some(FaultKind::Frame);
                }
            }
            UartEvent::TxEmpty => {
                if self.tx_state == TxState::Sending {
                    if self.tx_pos < self.tx.len() {
                        self.port.write(self.tx[self.tx_pos]);
                        self.tx_pos += 1;
                    } else {
                        self.tx_state = TxState::Draining;
                    }
                }
            }
            UartEvent::TxIdle => {
                if self.tx_state == TxState::Draining {
                    self.tx_state = TxState::Completed;
                    self.tx_timeout_ms = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimUart;

    fn pump(engine: &mut UartEngine<SimUart>) {
        while let Some(ev) = engine.port_mut().pop_event() {
            engine.on_event(ev);
        }
    }

    #[test]
    fn write_drains_then_completes() {
        let mut e = UartEngine::new(SimUart::new());
        e.write(&[0x01, 0x02, 0x03]);
        assert_eq!(e.write_status().0, Status::Pending);

        pump(&mut e);
        let (status, count) = e.write_status();
        assert_eq!(status, Status::Success);
        assert_eq!(count, 3);
        assert_eq!(e.port_mut().tx_log(), &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn read_reports_partial_count_while_pending() {
        let mut e = UartEngine::new(SimUart::new());
        e.read(8);

        e.on_event(UartEvent::Rx(0xAA));
        e.on_event(UartEvent::Rx(0xBB));
        let (status, count) = e.read_status();
        assert_eq!(status, Status::Pending);
        assert_eq!(count, 2);
        assert_eq!(e.rx_data(), &[0xAA, 0xBB]);
    }

    #[test]
    fn read_completes_at_expected_length() {
        let mut e = UartEngine::new(SimUart::new());
        e.read(2);
        e.on_event(UartEvent::Rx(1));
        e.on_event(UartEvent::Rx(2));
        let (status, count) = e.read_status();
        assert_eq!(status, Status::Success);
        assert_eq!(count, 2);
    }

    #[test]
    fn read_timeout_only_after_armed() {
        let mut e = UartEngine::new(SimUart::new());
        e.read(8);

        // No timeout armed: the read waits forever.
        for _ in 0..1000 {
            e.tick(10);
        }
        assert_eq!(e.read_status().0, Status::Pending);

        e.on_event(UartEvent::Rx(0x01));
        e.set_read_timeout(500);
        for _ in 0..50 {
            e.tick(10);
        }
        let (status, count) = e.read_status();
        assert_eq!(status, Status::Error);
        assert_eq!(count, 1);
        assert_eq!(e.last_fault(), Some(FaultKind::Timeout));
    }

    #[test]
    fn abort_read_discards_bytes() {
        let mut e = UartEngine::new(SimUart::new());
        e.read(8);
        e.on_event(UartEvent::Rx(0x55));
        e.abort_read();
        // Further traffic is dropped until the next read.
        e.on_event(UartEvent::Rx(0x66));
        assert!(e.rx_data().is_empty());
    }

    #[test]
    fn abort_write_stops_loading_bytes() {
        let mut e = UartEngine::new(SimUart::new());
        e.port_mut().stall_tx();
        e.write(&[9, 8, 7]);
        e.abort_write();
        assert_eq!(e.write_status().0, Status::Error); // idle, nothing to report
        // Only the first byte ever reached the hardware.
        assert_eq!(e.port_mut().tx_log(), &[9]);
    }

    #[test]
    fn receive_error_faults_the_read() {
        let mut e = UartEngine::new(SimUart::new());
        e.read(4);
        e.on_event(UartEvent::Rx(1));
        e.on_event(UartEvent::RxError);
        assert_eq!(e.read_status().0, Status::Error);
        assert_eq!(e.last_fault(), Some(FaultKind::Frame));
    }

    #[test]
    fn stuck_transmitter_times_out() {
        let mut e = UartEngine::new(SimUart::new());
        e.port_mut().stall_tx();
        e.write(&[1, 2, 3, 4]);

        let mut elapsed = 0u16;
        while e.write_status().0 == Status::Pending {
            e.tick(10);
            elapsed += 10;
            assert!(elapsed <= 200, "engine failed liveness");
        }
        assert_eq!(e.last_fault(), Some(FaultKind::Timeout));
    }
}

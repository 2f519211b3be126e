//! GPIO expander controller.
//!
//! Drives a 16-bit I2C port expander carrying the panel inputs and the
//! low-speed discrete outputs. The controller keeps shadow images of the
//! output and input ports and runs a small work queue:
//!
//! - `Config` — (re)write the full register setup: outputs, direction,
//!   interrupt mask;
//! - `Output` — flush the output shadow after [`Expander::output_set`];
//! - `Input` — re-read the input port after the expander's interrupt line
//!   fires ([`Expander::on_interrupt`], safe from ISR context).
//!
//! Work is flagged in an atomic word and claimed one item per bus-idle
//! tick: configuration first, then input and output alternating so
//! neither can starve the other. Any bus fault is treated as a sign the
//! device is gone or wedged: the controller pulses the hardware reset
//! line, snaps the cached inputs to their fail-safe defaults (notifying
//! the listener, since downstream logic must react as if those inputs
//! were real), and reconfigures from scratch. Once configured, the
//! interrupt-mask register is also read back every second and compared
//! against what was written; a mismatch means the device browned out
//! behind our back and takes the same reset path.

use core::sync::atomic::{AtomicU8, Ordering};

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::bus::i2c::{I2cDevice, I2cEngine, I2cPort};
use crate::bus::Status;
use crate::error::FaultKind;

const REG_INPUT: u8 = 0x00;
const REG_OUTPUT: u8 = 0x02;
const REG_CONFIG: u8 = 0x06;
const REG_INT_MASK: u8 = 0x4A;

const FLAG_CONFIG: u8 = 0x01;
const FLAG_OUTPUT: u8 = 0x02;
const FLAG_INPUT: u8 = 0x04;

/// Interval between interrupt-mask self-checks.
const SELF_CHECK_PERIOD_MS: u16 = 1000;

/// Width of the reset pulse on the RST line.
const RESET_PULSE_MS: u16 = 10;

/// Observer for expander-driven events. All methods default to no-ops.
pub trait ExpanderListener {
    /// The input port image changed. Also raised with the fail-safe
    /// defaults when the device is reset.
    fn on_inputs_changed(&mut self, _inputs: u16) {}
    /// The device was hardware-reset and will be reconfigured.
    fn on_reset(&mut self) {}
}

impl ExpanderListener for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// Configuration register write in flight; step 0..=2.
    Config(u8),
    /// Output shadow flush in flight.
    WriteOutput,
    /// Register-pointer write before an input read.
    InputAddr,
    /// Input port read in flight.
    InputData,
    /// Register-pointer write before the self-check read.
    VerifyAddr,
    /// Interrupt-mask read-back in flight.
    VerifyData,
    /// RST line held low.
    ResetPulse,
}

/// Expander controller. `RST` is the active-low hardware reset line.
pub struct Expander<RST: OutputPin> {
    device: I2cDevice,
    rst: RST,
    state: State,
    /// Pending-work bits, shared with the interrupt handler.
    flags: AtomicU8,
    /// Pin direction, bit set = input.
    direction: u16,
    default_outputs: u16,
    /// Fail-safe input image assumed after a reset.
    default_inputs: u16,
    outputs: u16,
    inputs: u16,
    configured: bool,
    /// Alternates input/output claim priority.
    input_turn: bool,
    check_ms: u16,
    reset_ms: u16,
    last_fault: Option<FaultKind>,
}

impl<RST: OutputPin> Expander<RST> {
    /// `direction` bit set = input pin; interrupts are enabled for exactly
    /// the input pins. `default_inputs` is the fail-safe image assumed
    /// while the device is unreachable. Configuration starts on the first
    /// tick.
    pub fn new(
        address: u8,
        mut rst: RST,
        direction: u16,
        default_outputs: u16,
        default_inputs: u16,
    ) -> Self {
        let _ = rst.set_high();
        Self {
            device: I2cDevice::new(address),
            rst,
            state: State::Idle,
            flags: AtomicU8::new(FLAG_CONFIG),
            direction,
            default_outputs,
            default_inputs,
            outputs: default_outputs,
            inputs: default_inputs,
            configured: false,
            input_turn: true,
            check_ms: SELF_CHECK_PERIOD_MS,
            reset_ms: 0,
            last_fault: None,
        }
    }

    /// Expander interrupt line fired: flag the input port for re-reading.
    /// Callable from interrupt context.
    pub fn on_interrupt(&self) {
        self.flags.fetch_or(FLAG_INPUT, Ordering::Relaxed);
    }

    /// Configuration registers written and confirmed at least once.
    pub fn configured(&self) -> bool {
        self.configured
    }

    pub fn last_fault(&self) -> Option<FaultKind> {
        self.last_fault
    }

    /// Drive an output pin. The change is flushed on a following tick.
    pub fn output_set(&mut self, pin: u8, level: bool) {
        debug_assert!(pin < 16);
        debug_assert_eq!(self.direction & (1 << pin), 0, "pin is an input");
        if level {
            self.outputs |= 1 << pin;
        } else {
            self.outputs &= !(1 << pin);
        }
        self.flags.fetch_or(FLAG_OUTPUT, Ordering::Relaxed);
    }

    /// Commanded level of an output pin (shadow, not read back).
    pub fn output_get(&self, pin: u8) -> bool {
        debug_assert!(pin < 16);
        self.outputs & (1 << pin) != 0
    }

    /// Last-read level of an input pin.
    pub fn input_get(&self, pin: u8) -> bool {
        debug_assert!(pin < 16);
        self.inputs & (1 << pin) != 0
    }

    /// Last-read input port image.
    pub fn inputs(&self) -> u16 {
        self.inputs
    }

    /// Start a hardware reset followed by reconfiguration.
    pub fn reset(&mut self) {
        let _ = self.rst.set_low();
        self.reset_ms = RESET_PULSE_MS;
        self.state = State::ResetPulse;
    }

    fn int_mask(&self) -> u16 {
        // Interrupts wanted on inputs only; mask bit set = ignored.
        !self.direction
    }

    /// Advance the machine: finish the transaction in flight, then claim
    /// the next flagged work item, then run the self-check timer.
    pub fn tick<P: I2cPort, L: ExpanderListener>(
        &mut self,
        bus: &mut I2cEngine<P>,
        listener: &mut L,
        period_ms: u16,
    ) {
        match self.state {
            State::ResetPulse => {
                if self.reset_ms <= period_ms {
                    let _ = self.rst.set_high();
                    self.outputs = self.default_outputs;
                    self.inputs = self.default_inputs;
                    self.configured = false;
                    self.flags.store(FLAG_CONFIG, Ordering::Relaxed);
                    self.state = State::Idle;
                    info!("expander: reset released, reconfiguring");
                    // Downstream logic must act on the fail-safe image.
                    listener.on_inputs_changed(self.default_inputs);
                    listener.on_reset();
                } else {
                    self.reset_ms -= period_ms;
                }
                return;
            }
            State::Idle => {}
            _ => {
                bus.tick(period_ms);
                self.advance(bus, listener);
                return;
            }
        }

        // Idle: claim the next work item. Configuration always goes
        // first; input and output take turns.
        let flags = self.flags.load(Ordering::Relaxed);
        if flags & FLAG_CONFIG != 0 {
            self.flags.fetch_and(!FLAG_CONFIG, Ordering::Relaxed);
            self.start_config_step(bus, 0);
            return;
        }

        let want_input = flags & FLAG_INPUT != 0;
        let want_output = flags & FLAG_OUTPUT != 0;
        let take_input = want_input && (self.input_turn || !want_output);
        if take_input {
            self.flags.fetch_and(!FLAG_INPUT, Ordering::Relaxed);
            self.input_turn = false;
            self.device.write(bus, REG_INPUT, &[]);
            self.state = State::InputAddr;
        } else if want_output {
            self.flags.fetch_and(!FLAG_OUTPUT, Ordering::Relaxed);
            self.input_turn = true;
            self.device
                .write(bus, REG_OUTPUT, &self.outputs.to_le_bytes());
            self.state = State::WriteOutput;
        } else if self.configured {
            if self.check_ms <= period_ms {
                self.check_ms = SELF_CHECK_PERIOD_MS;
                self.device.write(bus, REG_INT_MASK, &[]);
                self.state = State::VerifyAddr;
            } else {
                self.check_ms -= period_ms;
            }
        }
    }

    fn start_config_step<P: I2cPort>(&mut self, bus: &mut I2cEngine<P>, step: u8) {
        let (reg, value) = match step {
            0 => (REG_OUTPUT, self.outputs),
            1 => (REG_CONFIG, self.direction),
            _ => (REG_INT_MASK, self.int_mask()),
        };
        self.device.write(bus, reg, &value.to_le_bytes());
        self.state = State::Config(step);
    }

    fn advance<P: I2cPort, L: ExpanderListener>(
        &mut self,
        bus: &mut I2cEngine<P>,
        listener: &mut L,
    ) {
        match self.device.status(bus) {
            Status::Pending => return,
            Status::Error => {
                // Device unreachable or wedged: fail safe and start over.
                self.last_fault = bus.last_fault();
                warn!("expander: bus fault in {:?}, resetting device", self.state);
                self.reset();
                return;
            }
            Status::Success => {}
        }

        match self.state {
            State::Config(step) if step < 2 => self.start_config_step(bus, step + 1),
            State::Config(_) => {
                if !self.configured {
                    info!("expander: configured");
                }
                self.configured = true;
                // A fresh device has stale inputs; read them now.
                self.flags.fetch_or(FLAG_INPUT, Ordering::Relaxed);
                self.state = State::Idle;
            }
            State::WriteOutput => self.state = State::Idle,
            State::InputAddr => {
                self.device.read(bus, 2);
                self.state = State::InputData;
            }
            State::InputData => {
                let rx = bus.rx_data();
                let image = u16::from_le_bytes([rx[0], rx[1]]);
                if image != self.inputs {
                    self.inputs = image;
                    listener.on_inputs_changed(image);
                }
                self.state = State::Idle;
            }
            State::VerifyAddr => {
                self.device.read(bus, 2);
                self.state = State::VerifyData;
            }
            State::VerifyData => {
                let rx = bus.rx_data();
                let read_back = u16::from_le_bytes([rx[0], rx[1]]);
                if read_back == self.int_mask() {
                    self.state = State::Idle;
                } else {
                    warn!(
                        "expander: interrupt mask read {:#06x}, expected {:#06x}; resetting",
                        read_back,
                        self.int_mask()
                    );
                    self.last_fault = Some(FaultKind::DataIntegrity);
                    self.reset();
                }
            }
            State::Idle | State::ResetPulse => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{MemoryTarget, SimI2c, SimPin};

    type Bus = I2cEngine<SimI2c<MemoryTarget>>;

    #[derive(Default)]
    struct Recorder {
        input_events: Vec<u16>,
        resets: usize,
    }

    impl ExpanderListener for Recorder {
        fn on_inputs_changed(&mut self, inputs: u16) {
            self.input_events.push(inputs);
        }
        fn on_reset(&mut self) {
            self.resets += 1;
        }
    }

    const DIRECTION: u16 = 0x00FF; // low byte inputs, high byte outputs
    const DEFAULT_INPUTS: u16 = 0x00FF; // fail-safe: all inputs released

    fn setup() -> (Expander<SimPin>, SimPin, Bus, Recorder) {
        let rst = SimPin::new();
        let probe = rst.clone();
        let expander = Expander::new(0x40, rst, DIRECTION, 0x0000, DEFAULT_INPUTS);
        let bus = I2cEngine::new(SimI2c::new(MemoryTarget::new()));
        (expander, probe, bus, Recorder::default())
    }

    fn run_ms(
        expander: &mut Expander<SimPin>,
        bus: &mut Bus,
        listener: &mut Recorder,
        ms: u16,
    ) {
        let mut elapsed = 0;
        while elapsed < ms {
            while let Some(ev) = bus.port_mut().pop_event() {
                bus.on_event(ev);
            }
            expander.tick(bus, listener, 10);
            elapsed += 10;
        }
    }

    #[test]
    fn startup_writes_full_configuration() {
        let (mut x, _rst, mut bus, mut rec) = setup();
        run_ms(&mut x, &mut bus, &mut rec, 200);

        assert!(x.configured());
        let mem = bus.port_mut().target_mut().mem();
        assert_eq!(&mem[REG_OUTPUT as usize..][..2], &0u16.to_le_bytes());
        assert_eq!(&mem[REG_CONFIG as usize..][..2], &DIRECTION.to_le_bytes());
        assert_eq!(
            &mem[REG_INT_MASK as usize..][..2],
            &(!DIRECTION).to_le_bytes()
        );
    }

    #[test]
    fn output_set_flushes_shadow() {
        let (mut x, _rst, mut bus, mut rec) = setup();
        run_ms(&mut x, &mut bus, &mut rec, 200);

        x.output_set(9, true);
        assert!(x.output_get(9));
        run_ms(&mut x, &mut bus, &mut rec, 100);

        let mem = bus.port_mut().target_mut().mem();
        let written = u16::from_le_bytes([mem[REG_OUTPUT as usize], mem[REG_OUTPUT as usize + 1]]);
        assert_eq!(written, 1 << 9);
    }

    #[test]
    fn interrupt_reads_inputs_and_notifies() {
        let (mut x, _rst, mut bus, mut rec) = setup();
        bus.port_mut()
            .target_mut()
            .load(REG_INPUT as usize, &DEFAULT_INPUTS.to_le_bytes());
        run_ms(&mut x, &mut bus, &mut rec, 200);
        rec.input_events.clear();

        bus.port_mut()
            .target_mut()
            .load(REG_INPUT as usize, &0x0042u16.to_le_bytes());
        x.on_interrupt();
        run_ms(&mut x, &mut bus, &mut rec, 100);

        assert_eq!(rec.input_events, vec![0x0042]);
        assert!(x.input_get(1));
        assert!(x.input_get(6));
        assert!(!x.input_get(0));

        // Same image again: no spurious notification.
        x.on_interrupt();
        run_ms(&mut x, &mut bus, &mut rec, 100);
        assert_eq!(rec.input_events.len(), 1);
    }

    #[test]
    fn input_and_output_work_alternate() {
        let (mut x, _rst, mut bus, mut rec) = setup();
        bus.port_mut()
            .target_mut()
            .load(REG_INPUT as usize, &DEFAULT_INPUTS.to_le_bytes());
        run_ms(&mut x, &mut bus, &mut rec, 200);

        // Flag both at once: both must be served.
        bus.port_mut()
            .target_mut()
            .load(REG_INPUT as usize, &0x0001u16.to_le_bytes());
        x.output_set(12, true);
        x.on_interrupt();
        run_ms(&mut x, &mut bus, &mut rec, 200);

        assert_eq!(x.inputs(), 0x0001);
        let mem = bus.port_mut().target_mut().mem();
        let written = u16::from_le_bytes([mem[REG_OUTPUT as usize], mem[REG_OUTPUT as usize + 1]]);
        assert_eq!(written, 1 << 12);
    }

    #[test]
    fn bus_fault_resets_and_fails_safe() {
        let (mut x, rst, mut bus, mut rec) = setup();
        bus.port_mut()
            .target_mut()
            .load(REG_INPUT as usize, &DEFAULT_INPUTS.to_le_bytes());
        run_ms(&mut x, &mut bus, &mut rec, 200);
        assert!(x.configured());

        // An input read arrives while the device has stopped answering.
        bus.port_mut()
            .target_mut()
            .load(REG_INPUT as usize, &0x0000u16.to_le_bytes());
        x.on_interrupt();
        run_ms(&mut x, &mut bus, &mut rec, 50);
        assert_eq!(x.inputs(), 0x0000);
        rec.input_events.clear();

        bus.port_mut().target_mut().set_busy(1);
        x.on_interrupt();

        let mut saw_reset_low = false;
        for _ in 0..30 {
            while let Some(ev) = bus.port_mut().pop_event() {
                bus.on_event(ev);
            }
            x.tick(&mut bus, &mut rec, 10);
            if !rst.is_high() {
                saw_reset_low = true;
            }
        }
        assert!(saw_reset_low, "RST line never pulsed");
        assert_eq!(rec.resets, 1);
        // Inputs snapped to the fail-safe image, listener told.
        assert_eq!(rec.input_events.first(), Some(&DEFAULT_INPUTS));

        // Device answers again: reconfiguration completes.
        run_ms(&mut x, &mut bus, &mut rec, 300);
        assert!(x.configured());
    }

    #[test]
    fn self_check_mismatch_triggers_reset_and_reconfig() {
        let (mut x, rst, mut bus, mut rec) = setup();
        bus.port_mut()
            .target_mut()
            .load(REG_INPUT as usize, &DEFAULT_INPUTS.to_le_bytes());
        run_ms(&mut x, &mut bus, &mut rec, 200);
        assert!(x.configured());

        // Simulate a brown-out: the mask register loses its value.
        bus.port_mut()
            .target_mut()
            .load(REG_INT_MASK as usize, &[0x00, 0x00]);

        let mut saw_reset_low = false;
        for _ in 0..150 {
            while let Some(ev) = bus.port_mut().pop_event() {
                bus.on_event(ev);
            }
            x.tick(&mut bus, &mut rec, 10);
            if !rst.is_high() {
                saw_reset_low = true;
            }
        }
        assert!(saw_reset_low, "RST line never pulsed");
        assert_eq!(rec.resets, 1);
        assert_eq!(x.last_fault(), Some(FaultKind::DataIntegrity));

        run_ms(&mut x, &mut bus, &mut rec, 200);
        assert!(x.configured());
        let mem = bus.port_mut().target_mut().mem();
        assert_eq!(
            &mem[REG_INT_MASK as usize..][..2],
            &(!DIRECTION).to_le_bytes()
        );
    }
}

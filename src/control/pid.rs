//! Plain PID block.
//!
//! Evaluates once per period with the remainder carried, so the loop rate
//! stays honest under a jittery tick. Both the integrator and the output
//! are clamped to the actuator span [0, [`OUTPUT_MAX_FP`]]; clamping the
//! integrator separately is the anti-windup.

/// Lower actuator bound, 24.8.
pub const OUTPUT_MIN_FP: i32 = 0;

/// Upper actuator bound, 24.8 (10000.0 — duty in hundredths of a percent).
pub const OUTPUT_MAX_FP: i32 = 2_560_000;

const DEFAULT_PERIOD_MS: u16 = 100;

/// PID controller on 24.8 values.
#[derive(Debug, Clone)]
pub struct Pid {
    p: i32,
    i: i32,
    d: i32,
    period_ms: u16,
    counter_ms: u16,
    error_fp: i32,
    integrator_fp: i32,
    output_fp: i32,
}

impl Pid {
    pub fn new() -> Self {
        Self {
            p: 0,
            i: 0,
            d: 0,
            period_ms: DEFAULT_PERIOD_MS,
            counter_ms: 0,
            error_fp: 0,
            integrator_fp: 0,
            output_fp: 0,
        }
    }

    pub fn set_gains(&mut self, p: i32, i: i32, d: i32) {
        self.p = p;
        self.i = i;
        self.d = d;
    }

    pub fn set_period(&mut self, period_ms: u16) {
        debug_assert!(period_ms > 0);
        self.period_ms = period_ms;
    }

    /// Clear the accumulated state; gains and period survive.
    pub fn reset(&mut self) {
        self.counter_ms = 0;
        self.error_fp = 0;
        self.integrator_fp = 0;
        self.output_fp = 0;
    }

    pub fn output_fp(&self) -> i32 {
        self.output_fp
    }

    /// Advance time and evaluate if a period has elapsed. `consign_fp`
    /// and `input_fp` are the setpoint and the measured value, both 24.8.
    pub fn tick(&mut self, period_ms: u16, consign_fp: i32, input_fp: i32) {
        self.counter_ms += period_ms;
        if self.counter_ms < self.period_ms {
            return;
        }
        self.counter_ms -= self.period_ms;

        let error_fp = consign_fp - input_fp;
        let delta_fp = error_fp - self.error_fp;
        self.error_fp = error_fp;

        let p_fp = error_fp * self.p;
        let d_fp = delta_fp * self.d;

        self.integrator_fp =
            (self.integrator_fp + error_fp * self.i).clamp(OUTPUT_MIN_FP, OUTPUT_MAX_FP);

        self.output_fp = (p_fp + self.integrator_fp + d_fp).clamp(OUTPUT_MIN_FP, OUTPUT_MAX_FP);
    }
}

impl Default for Pid {
    fn default() -> Self {
        Self::new()
    }
}

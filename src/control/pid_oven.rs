//! PID with a setpoint-keyed feed-forward offset.
//!
//! An oven at steady state needs a power level that depends mostly on the
//! temperature it must hold; the feed-forward table supplies that level
//! directly and the PID terms only trim around it. The integrator is
//! clamped to whatever headroom the offset + P + D leave, and zeroed
//! outright when they saturate the actuator on their own — it has no work
//! to do there and would only wind up.

use super::pid::{OUTPUT_MAX_FP, OUTPUT_MIN_FP};

const DEFAULT_PERIOD_MS: u16 = 100;

/// Feed-forward offsets, indexed by setpoint.
#[derive(Debug, Clone, Copy)]
pub struct FeedForwardTable<'a> {
    offsets_fp: &'a [i32],
    step_fp: i32,
}

impl<'a> FeedForwardTable<'a> {
    /// `offsets_fp[i]` is the steady-state output for setpoints in
    /// `[i * step_fp, (i + 1) * step_fp)`, saturating at both ends.
    pub const fn new(offsets_fp: &'a [i32], step_fp: i32) -> Self {
        assert!(!offsets_fp.is_empty());
        assert!(step_fp > 0);
        Self { offsets_fp, step_fp }
    }

    fn get(&self, setpoint_fp: i32) -> i32 {
        let index = setpoint_fp / self.step_fp;
        if index <= 0 {
            self.offsets_fp[0]
        } else if index as usize >= self.offsets_fp.len() {
            self.offsets_fp[self.offsets_fp.len() - 1]
        } else {
            self.offsets_fp[index as usize]
        }
    }
}

/// Oven PID on 24.8 values.
#[derive(Debug, Clone)]
pub struct OvenPid<'a> {
    table: FeedForwardTable<'a>,
    p: i32,
    i: i32,
    d: i32,
    period_ms: u16,
    counter_ms: u16,
    error_fp: i32,
    integrator_fp: i32,
    output_fp: i32,
}

impl<'a> OvenPid<'a> {
    pub fn new(table: FeedForwardTable<'a>) -> Self {
        Self {
            table,
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

    pub fn reset(&mut self) {
        self.counter_ms = 0;
        self.error_fp = 0;
        self.integrator_fp = 0;
        self.output_fp = 0;
    }

    pub fn output_fp(&self) -> i32 {
        self.output_fp
    }

    /// Advance time and evaluate if a period has elapsed.
    pub fn tick(&mut self, period_ms: u16, setpoint_fp: i32, input_fp: i32) {
        self.counter_ms += period_ms;
        if self.counter_ms < self.period_ms {
            return;
        }
        self.counter_ms -= self.period_ms;

        let error_fp = setpoint_fp - input_fp;
        let delta_fp = error_fp - self.error_fp;
        self.error_fp = error_fp;

        let offset_fp = self.table.get(setpoint_fp);
        let pd_fp = offset_fp + error_fp * self.p + delta_fp * self.d;

        if pd_fp <= OUTPUT_MIN_FP {
            self.integrator_fp = 0;
            self.output_fp = OUTPUT_MIN_FP;
        } else if pd_fp >= OUTPUT_MAX_FP {
            self.integrator_fp = 0;
            self.output_fp = OUTPUT_MAX_FP;
        } else {
            // The integrator may only use the headroom the other terms
            // leave, so the sum below can never saturate.
            self.integrator_fp = (self.integrator_fp + error_fp * self.i)
                .clamp(OUTPUT_MIN_FP - pd_fp, OUTPUT_MAX_FP - pd_fp);
            self.output_fp = pd_fp + self.integrator_fp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::fp;

    const OFFSETS: [i32; 4] = [fp(100), fp(1000), fp(2000), fp(4000)];

    fn oven() -> OvenPid<'static> {
        OvenPid::new(FeedForwardTable::new(&OFFSETS, fp(100)))
    }

    #[test]
    fn feed_forward_alone_sets_steady_output() {
        let mut pid = oven();
        // Zero gains: output is the table offset for the setpoint.
        pid.tick(100, fp(150), fp(150));
        assert_eq!(pid.output_fp(), fp(1000));
    }

    #[test]
    fn feed_forward_saturates_at_table_edges() {
        let mut pid = oven();
        pid.tick(100, fp(-20), fp(-20));
        assert_eq!(pid.output_fp(), fp(100));
        pid.tick(100, fp(9000), fp(9000));
        assert_eq!(pid.output_fp(), fp(4000));
    }

    #[test]
    fn integrator_zeroed_when_pd_saturates() {
        let mut pid = oven();
        pid.set_gains(0, 10, 0);
        // Build some integrator first.
        pid.tick(100, fp(150), fp(100));
        assert!(pid.output_fp() > fp(1000));

        // Huge proportional drive saturates the actuator on its own.
        pid.set_gains(10_000, 10, 0);
        pid.tick(100, fp(150), fp(0));
        assert_eq!(pid.output_fp(), OUTPUT_MAX_FP);

        // Back to normal: the integrator restarts from zero.
        pid.set_gains(0, 0, 0);
        pid.tick(100, fp(150), fp(150));
        assert_eq!(pid.output_fp(), fp(1000));
    }

    #[test]
    fn integrator_clamped_to_remaining_headroom() {
        let mut pid = oven();
        pid.set_gains(0, 1000, 0);
        // Offset fp(1000); headroom up to OUTPUT_MAX_FP. Drive hard for
        // a long time: output must stop exactly at the rail.
        for _ in 0..100 {
            pid.tick(100, fp(150), fp(0));
        }
        assert_eq!(pid.output_fp(), OUTPUT_MAX_FP);

        // And it can come straight back down: the integrator was held at
        // the headroom limit, not beyond it.
        pid.set_gains(0, 0, 0);
        pid.tick(100, fp(150), fp(150));
        assert_eq!(pid.output_fp(), OUTPUT_MAX_FP); // integrator at +headroom
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn output_always_within_actuator_span(
                p in 0i32..200,
                i in 0i32..200,
                d in 0i32..200,
                steps in proptest::collection::vec((0i32..2000, -1000i32..3000), 1..60),
            ) {
                let mut pid = oven();
                pid.set_gains(p, i, d);
                for (setpoint, input) in steps {
                    pid.tick(100, fp(setpoint), fp(input));
                    prop_assert!(pid.output_fp() >= OUTPUT_MIN_FP);
                    prop_assert!(pid.output_fp() <= OUTPUT_MAX_FP);
                }
            }
        }
    }
}

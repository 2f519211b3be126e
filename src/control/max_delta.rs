//! Output slew limiter.
//!
//! Bounds how fast a commanded value may move per evaluation period, with
//! the allowed step looked up from tables keyed by the current output
//! level — a hot heater may be allowed to shed power faster than it may
//! gain it. Outside the table (negative output, or beyond the last entry)
//! the output is left untouched.

/// Slew limits.
#[derive(Debug, Clone, Copy)]
pub struct DeltaTables<'a> {
    /// Max increase per evaluation, 24.8, indexed by output level.
    pub max_inc_fp: &'a [u16],
    /// Max decrease per evaluation, 24.8, indexed by output level.
    pub max_dec_fp: &'a [u16],
    /// Output-level width of one table entry, integer units.
    pub step: i16,
    /// Evaluation period.
    pub period_ms: u16,
}

/// Slew-limiting filter on 24.8 values.
#[derive(Debug, Clone)]
pub struct MaxDelta<'a> {
    tables: DeltaTables<'a>,
    counter_ms: u16,
    input_fp: i32,
    output_fp: i32,
}

impl<'a> MaxDelta<'a> {
    pub fn new(tables: DeltaTables<'a>) -> Self {
        debug_assert!(tables.step > 0);
        debug_assert!(tables.period_ms > 0);
        debug_assert_eq!(tables.max_inc_fp.len(), tables.max_dec_fp.len());
        Self {
            tables,
            counter_ms: 0,
            input_fp: 0,
            output_fp: 0,
        }
    }

    /// Re-seed input and output, typically from the measured value when
    /// the loop is (re)engaged, so the limiter does not slew from stale
    /// state.
    pub fn reset(&mut self, input_fp: i32) {
        self.counter_ms = 0;
        self.input_fp = input_fp;
        self.output_fp = input_fp;
    }

    /// New requested value. Zero disables the output immediately — the
    /// limiter must never hold power on a loop that was switched off.
    /// Retargeting while active re-seeds the output from `actual_fp` so
    /// the slew restarts from where the process really is instead of
    /// stepping from a stale commanded level.
    pub fn set_input(&mut self, input_fp: i32, actual_fp: i32) {
        if input_fp == 0 {
            self.input_fp = 0;
            self.output_fp = 0;
            return;
        }
        if self.input_fp != 0 && self.input_fp != input_fp {
            self.output_fp = actual_fp;
        }
        self.input_fp = input_fp;
    }

    pub fn output_fp(&self) -> i32 {
        self.output_fp
    }

    /// Advance time; moves the output toward the input by at most the
    /// table-allowed step per period.
    pub fn tick(&mut self, period_ms: u16) {
        self.counter_ms += period_ms;
        if self.counter_ms < self.tables.period_ms {
            return;
        }
        self.counter_ms -= self.tables.period_ms;

        let level = (self.output_fp >> 8) as i16;
        if level < 0 {
            return;
        }
        let index = (level / self.tables.step) as usize;
        if index >= self.tables.max_inc_fp.len() {
            return;
        }

        if self.input_fp > self.output_fp {
            let delta = self.input_fp - self.output_fp;
            self.output_fp += delta.min(i32::from(self.tables.max_inc_fp[index]));
        } else if self.input_fp < self.output_fp {
            let delta = self.output_fp - self.input_fp;
            self.output_fp -= delta.min(i32::from(self.tables.max_dec_fp[index]));
        }
    }
}

//! Averaging FIR block.
//!
//! Accumulates samples and flushes their average in one of two modes:
//!
//! - pull ([`Fir::new`]): reading the output averages and drains whatever
//!   arrived since the last read, decimating to the consumer's rate;
//! - windowed ([`Fir::windowed`]): the average is taken automatically
//!   every `n` samples and reads never drain.
//!
//! Either way, the previous output is held while no new average is due.

/// Draining averager on 24.8 values.
#[derive(Debug, Clone, Default)]
pub struct Fir {
    sum_fp: i32,
    count: u16,
    /// 0 = pull mode: flush on read.
    window: u16,
    output_fp: i32,
}

impl Fir {
    /// Pull mode: each [`output_fp`](Self::output_fp) call averages and
    /// drains the samples since the previous call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Windowed mode: flushes automatically every `n` samples.
    pub fn windowed(n: u16) -> Self {
        debug_assert!(n > 0);
        Self {
            window: n,
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        self.sum_fp = 0;
        self.count = 0;
        self.output_fp = 0;
    }

    pub fn push(&mut self, sample_fp: i32) {
        self.sum_fp += sample_fp;
        self.count += 1;
        if self.window > 0 && self.count >= self.window {
            self.flush();
        }
    }

    /// Current average; in pull mode this drains the accumulator.
    pub fn output_fp(&mut self) -> i32 {
        if self.window == 0 && self.count > 0 {
            self.flush();
        }
        self.output_fp
    }

    fn flush(&mut self) {
        self.output_fp = self.sum_fp / i32::from(self.count);
        self.sum_fp = 0;
        self.count = 0;
    }
}

//! First-order IIR smoothing.
//!
//! The classic accumulator trick: `accu` carries `n` times the smoothed
//! value, each sample replaces one share of it. Integer-only, one divide
//! per sample, time constant of roughly `n` samples.

/// Signed variant, for values that can go below zero.
#[derive(Debug, Clone)]
pub struct IirSigned {
    accu: i32,
    value: i16,
    n: i16,
}

impl IirSigned {
    pub fn new(n: i16) -> Self {
        debug_assert!(n > 0);
        Self { accu: 0, value: 0, n }
    }

    pub fn push(&mut self, sample: i16) {
        self.accu -= i32::from(self.value);
        self.accu += i32::from(sample);
        self.value = (self.accu / i32::from(self.n)) as i16;
    }

    pub fn value(&self) -> i16 {
        self.value
    }
}

/// Unsigned variant, for raw converter counts.
#[derive(Debug, Clone)]
pub struct IirUnsigned {
    accu: u32,
    value: u16,
    n: u16,
}

impl IirUnsigned {
    pub fn new(n: u16) -> Self {
        debug_assert!(n > 0);
        Self { accu: 0, value: 0, n }
    }

    pub fn push(&mut self, sample: u16) {
        self.accu -= u32::from(self.value);
        self.accu += u32::from(sample);
        self.value = (self.accu / u32::from(self.n)) as u16;
    }

    pub fn value(&self) -> u16 {
        self.value
    }
}

//! Saturating lookup table.
//!
//! Maps a 24.8 input onto a table of `i16` entries spaced `step_fp` apart,
//! clamping to the first/last entry outside the covered span. Used for the
//! setpoint-dependent slope and delta limits.

/// Table over evenly spaced 24.8 input steps.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    values: &'a [i16],
    step_fp: i32,
}

impl<'a> Table<'a> {
    /// `values[i]` covers inputs `[i * step_fp, (i + 1) * step_fp)`.
    pub const fn new(values: &'a [i16], step_fp: i32) -> Self {
        assert!(!values.is_empty());
        assert!(step_fp > 0);
        Self { values, step_fp }
    }

    /// Nearest-entry lookup, saturating at both ends.
    pub fn get(&self, input_fp: i32) -> i16 {
        let index = input_fp / self.step_fp;
        if index <= 0 {
            self.values[0]
        } else if index as usize >= self.values.len() {
            self.values[self.values.len() - 1]
        } else {
            self.values[index as usize]
        }
    }
}

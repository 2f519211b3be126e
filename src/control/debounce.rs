//! Digital input debouncing.
//!
//! A level change is accepted only after three consecutive samples agree;
//! any sample matching the accepted level restarts the count.

/// Debounced boolean input.
#[derive(Debug, Clone)]
pub struct Debounced {
    value: bool,
    counter: u8,
}

impl Debounced {
    /// `initial` is taken as already settled.
    pub fn new(initial: bool) -> Self {
        Self {
            value: initial,
            counter: 0,
        }
    }

    /// Feed one raw sample; returns the debounced level.
    pub fn update(&mut self, raw: bool) -> bool {
        if raw == self.value {
            self.counter = 0;
        } else {
            self.counter += 1;
            if self.counter >= 3 {
                self.counter = 0;
                self.value = raw;
            }
        }
        self.value
    }

    pub fn value(&self) -> bool {
        self.value
    }
}

//! Setpoint ramp.
//!
//! Turns a step change of the commanded setpoint into a bounded-slope
//! ramp so the thermal mass can follow. Rather than ramping from the
//! start, the block first lets the process run flat out toward the
//! target (`Max`), and only begins the ramp once the measured value gets
//! within a configured band of it (`Slope`):
//!
//! ```text
//! --> Off --> Max <==+------------+
//!      |       |     |            |
//!      +-------+==> Slope <--+    |
//!                    |       |    |
//!                    +-----> On --+
//! ```
//!
//! The slope and the band both come from tables keyed by the target, so
//! hot regions of the oven can use gentler approaches. A zero setpoint
//! switches everything off immediately.

use super::table::Table;

const PERIOD_MS: u16 = 100;

/// Ramp parameters.
#[derive(Debug, Clone, Copy)]
pub struct RampTables<'a> {
    /// Slope per evaluation while heating toward a target, keyed by target.
    pub slopes_inc: Table<'a>,
    /// Slope per evaluation while cooling toward a target, keyed by target.
    pub slopes_dec: Table<'a>,
    /// Approach time the band is sized for, in seconds.
    pub delay_s: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampState {
    Off,
    /// Full drive toward the target; the ramp has not started.
    Max,
    /// Ramping the output toward the target.
    Slope,
    /// Output equals the target.
    On,
}

/// Setpoint ramp filter on 24.8 values.
#[derive(Debug, Clone)]
pub struct SetpointRamp<'a> {
    tables: RampTables<'a>,
    state: RampState,
    counter_ms: u16,
    input_fp: i32,
    output_fp: i32,
    slope_fp: i32,
    delta_fp: i32,
}

impl<'a> SetpointRamp<'a> {
    pub fn new(tables: RampTables<'a>) -> Self {
        Self {
            tables,
            state: RampState::Off,
            counter_ms: 0,
            input_fp: 0,
            output_fp: 0,
            slope_fp: 0,
            delta_fp: 0,
        }
    }

    pub fn state(&self) -> RampState {
        self.state
    }

    /// Ramped setpoint, fed to the PID.
    pub fn output_fp(&self) -> i32 {
        self.output_fp
    }

    /// Command a new target. `actual_fp` is the current measured value,
    /// used to size the approach band and to decide whether the ramp can
    /// start right away.
    pub fn set_input(&mut self, input_fp: i32, actual_fp: i32) {
        if input_fp == 0 {
            self.set_off();
            return;
        }

        let retarget = match self.state {
            RampState::Off => {
                self.input_fp = input_fp;
                self.state = RampState::Max;
                true
            }
            RampState::Max | RampState::Slope | RampState::On => {
                if self.input_fp != input_fp {
                    self.input_fp = input_fp;
                    self.state = RampState::Max;
                    true
                } else {
                    false
                }
            }
        };
        if !retarget {
            return;
        }

        if actual_fp < input_fp {
            self.slope_fp = i32::from(self.tables.slopes_inc.get(input_fp));
            self.delta_fp = self.slope_fp * 10 * self.tables.delay_s;
            // Ramp start point, 3/4 of the band below the target.
            self.output_fp = input_fp - self.delta_fp * 3 / 4;
            if actual_fp > self.output_fp {
                // Already inside the band: ramp from where we are.
                self.output_fp = actual_fp;
                self.state = RampState::Slope;
            }
        } else if actual_fp > input_fp {
            self.slope_fp = i32::from(self.tables.slopes_dec.get(input_fp));
            self.delta_fp = self.slope_fp * 10 * self.tables.delay_s;
            self.output_fp = input_fp + self.delta_fp * 3 / 4;
            if actual_fp < self.output_fp {
                self.output_fp = actual_fp;
                self.state = RampState::Slope;
            }
        } else {
            self.set_on();
        }
    }

    /// Advance time; evaluates every 100 ms with the remainder carried.
    pub fn tick(&mut self, period_ms: u16, actual_fp: i32) {
        self.counter_ms += period_ms;
        if self.counter_ms < PERIOD_MS {
            return;
        }
        self.counter_ms -= PERIOD_MS;

        match self.state {
            RampState::Off | RampState::On => {}

            RampState::Max => {
                if self.output_fp < self.input_fp {
                    // Heating: start the ramp once the process crosses
                    // into the band below the target.
                    if actual_fp > self.input_fp - self.delta_fp {
                        self.state = RampState::Slope;
                    }
                } else if self.output_fp > self.input_fp {
                    if actual_fp < self.input_fp + self.delta_fp {
                        self.state = RampState::Slope;
                    }
                } else {
                    self.state = RampState::On;
                }
            }

            RampState::Slope => {
                if self.output_fp < self.input_fp {
                    self.output_fp += self.slope_fp;
                    if self.output_fp > self.input_fp {
                        self.set_on();
                    }
                } else if self.output_fp > self.input_fp {
                    self.output_fp -= self.slope_fp;
                    if self.output_fp < self.input_fp {
                        self.set_on();
                    }
                } else {
                    self.state = RampState::On;
                }
            }
        }
    }

    fn set_off(&mut self) {
        self.input_fp = 0;
        self.output_fp = 0;
        self.state = RampState::Off;
    }

    fn set_on(&mut self) {
        self.output_fp = self.input_fp;
        self.state = RampState::On;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::fp;

    const SLOPES: [i16; 1] = [fp(1) as i16]; // 1 degree per evaluation

    fn ramp() -> SetpointRamp<'static> {
        SetpointRamp::new(RampTables {
            slopes_inc: Table::new(&SLOPES, fp(100)),
            slopes_dec: Table::new(&SLOPES, fp(100)),
            delay_s: 4, // band = 1 * 10 * 4 = 40 degrees
        })
    }

    #[test]
    fn zero_input_switches_off() {
        let mut r = ramp();
        r.set_input(fp(200), fp(20));
        assert_eq!(r.state(), RampState::Max);
        r.set_input(0, fp(20));
        assert_eq!(r.state(), RampState::Off);
        assert_eq!(r.output_fp(), 0);
    }

    #[test]
    fn cold_start_runs_max_until_band() {
        let mut r = ramp();
        r.set_input(fp(200), fp(20));
        assert_eq!(r.state(), RampState::Max);
        // Ramp start point: 200 - 40 * 3/4 = 170.
        assert_eq!(r.output_fp(), fp(170));

        // Far below the band: stays in Max.
        r.tick(100, fp(100));
        assert_eq!(r.state(), RampState::Max);

        // Crosses 200 - 40 = 160: ramp starts.
        r.tick(100, fp(161));
        assert_eq!(r.state(), RampState::Slope);

        // Ramps 1 degree per evaluation up to the target, then holds.
        for _ in 0..29 {
            r.tick(100, fp(165));
        }
        assert_eq!(r.state(), RampState::Slope);
        assert_eq!(r.output_fp(), fp(199));
        r.tick(100, fp(199));
        r.tick(100, fp(200));
        assert_eq!(r.state(), RampState::On);
        assert_eq!(r.output_fp(), fp(200));
    }

    #[test]
    fn start_inside_band_ramps_from_actual() {
        let mut r = ramp();
        // Actual 180 is above the ramp start point 170.
        r.set_input(fp(200), fp(180));
        assert_eq!(r.state(), RampState::Slope);
        assert_eq!(r.output_fp(), fp(180));
    }

    #[test]
    fn start_at_target_is_immediately_on() {
        let mut r = ramp();
        r.set_input(fp(150), fp(150));
        assert_eq!(r.state(), RampState::On);
        assert_eq!(r.output_fp(), fp(150));
    }

    #[test]
    fn cooling_ramps_downward() {
        let mut r = ramp();
        r.set_input(fp(100), fp(300));
        assert_eq!(r.state(), RampState::Max);
        // Start point: 100 + 40 * 3/4 = 130.
        assert_eq!(r.output_fp(), fp(130));

        // Crosses 100 + 40 = 140 on the way down.
        r.tick(100, fp(139));
        assert_eq!(r.state(), RampState::Slope);
        let before = r.output_fp();
        r.tick(100, fp(139));
        assert_eq!(r.output_fp(), before - fp(1));
    }

    #[test]
    fn retarget_restarts_the_approach() {
        let mut r = ramp();
        r.set_input(fp(200), fp(195));
        assert_eq!(r.state(), RampState::Slope);

        r.set_input(fp(300), fp(195));
        assert_eq!(r.state(), RampState::Max);
        assert_eq!(r.output_fp(), fp(270));

        // Same target again: nothing changes.
        let state = r.state();
        let output = r.output_fp();
        r.set_input(fp(300), fp(210));
        assert_eq!(r.state(), state);
        assert_eq!(r.output_fp(), output);
    }
}

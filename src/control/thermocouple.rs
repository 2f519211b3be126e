//! Thermocouple linearization.
//!
//! Converts a measured thermocouple voltage to a hot-junction temperature:
//! the cold-junction temperature is turned into its equivalent voltage
//! through the reference table, added to the measured voltage along with
//! the calibration offset, and the sum is looked up in the reference table
//! with linear interpolation between entries. A reading beyond the table
//! is clamped and flagged, never extrapolated.
//!
//! Only type R is carried; the tables come from the NIST reference
//! functions, 16 degree steps for the hot junction and 5 degree steps over
//! the cold-junction span.

/// Reference table: voltages at evenly spaced temperatures.
#[derive(Debug)]
pub struct TcTable {
    begin_c: i16,
    end_c: i16,
    step_c: i16,
    values_uv: &'static [i16],
}

/// A thermocouple type: hot-junction table plus cold-junction span.
#[derive(Debug)]
pub struct TcType {
    table: &'static TcTable,
    table_cj: &'static TcTable,
}

#[rustfmt::skip]
static R_VALUES_UV: [i16; 112] = [
        0,    88,   183,   284,   390,   501,   618,   738, //    0 -  112 C
      863,   992,  1124,  1260,  1398,  1540,  1684,  1831, //  128 -  240 C
     1980,  2131,  2284,  2440,  2597,  2756,  2916,  3079, //  256 -  368 C
     3242,  3408,  3574,  3742,  3912,  4083,  4255,  4428, //  384 -  496 C
     4602,  4778,  4955,  5133,  5312,  5493,  5674,  5857, //  512 -  624 C
     6041,  6227,  6413,  6601,  6790,  6980,  7172,  7364, //  640 -  752 C
     7558,  7753,  7950,  8147,  8346,  8546,  8748,  8950, //  768 -  880 C
     9154,  9359,  9565,  9772,  9980, 10190, 10400, 10612, //  896 - 1008 C
    10825, 11039, 11253, 11469, 11686, 11904, 12123, 12342, // 1024 - 1136 C
    12563, 12784, 13006, 13228, 13451, 13674, 13898, 14123, // 1152 - 1264 C
    14347, 14572, 14798, 15023, 15249, 15475, 15701, 15927, // 1280 - 1392 C
    16153, 16379, 16605, 16831, 17056, 17282, 17507, 17732, // 1408 - 1520 C
    17956, 18180, 18404, 18627, 18849, 19071, 19292, 19512, // 1536 - 1648 C
    19732, 19951, 20168, 20369, 20594, 20801, 21003, 21201, // 1664 - 1776 C
];

#[rustfmt::skip]
static R_VALUES_CJ_UV: [i16; 19] = [
    -100, -76, -52, -26,   0,  27,  54,  83, // -20 - 15 C
     111, 141, 171, 201, 232, 264, 296, 329, //  20 - 55 C
     363, 397, 431,                          //  60 - 70 C
];

static R_TABLE: TcTable = TcTable {
    begin_c: 0,
    end_c: 1776,
    step_c: 16,
    values_uv: &R_VALUES_UV,
};

static R_TABLE_CJ: TcTable = TcTable {
    begin_c: -20,
    end_c: 70,
    step_c: 5,
    values_uv: &R_VALUES_CJ_UV,
};

/// Type R (Pt-13%Rh / Pt).
pub static TYPE_R: TcType = TcType {
    table: &R_TABLE,
    table_cj: &R_TABLE_CJ,
};

/// One converted reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub temp_c: i16,
    /// The compensated voltage was beyond the table; `temp_c` is clamped
    /// to the table end and must not be trusted.
    pub over_range: bool,
}

/// One thermocouple input with its calibration offset.
#[derive(Debug)]
pub struct Thermocouple {
    ty: &'static TcType,
    cal_offset_uv: i16,
}

impl Thermocouple {
    pub fn new(ty: &'static TcType) -> Self {
        Self {
            ty,
            cal_offset_uv: 0,
        }
    }

    pub fn cal_offset_uv(&self) -> i16 {
        self.cal_offset_uv
    }

    /// Convert a measured voltage, compensating for the cold-junction
    /// temperature `cj_c` (integer degrees).
    pub fn convert(&self, cj_c: i16, in_uv: i32) -> Reading {
        let cj_uv = c_to_uv(self.ty.table_cj, cj_c);
        let temp_uv = in_uv + i32::from(cj_uv) + i32::from(self.cal_offset_uv);

        let table = self.ty.table;
        let last_uv = i32::from(table.values_uv[table.values_uv.len() - 1]);
        Reading {
            temp_c: uv_to_c(table, temp_uv),
            over_range: temp_uv > last_uv,
        }
    }

    /// Two-point-free calibration: the probe read `read_c` where a
    /// reference says `real_c`; fold the difference into the offset.
    pub fn calibrate(&mut self, read_c: i16, real_c: i16) {
        let table = self.ty.table;
        let read_uv = c_to_uv(table, read_c) - self.cal_offset_uv;
        self.cal_offset_uv = c_to_uv(table, real_c) - read_uv;
    }
}

/// Temperature to voltage, linear interpolation, clamped to the table.
fn c_to_uv(table: &TcTable, in_c: i16) -> i16 {
    let values = table.values_uv;
    if in_c <= table.begin_c {
        return values[0];
    }
    if in_c >= table.end_c {
        return values[values.len() - 1];
    }

    // Index from the table start; the cold-junction table begins below
    // zero, so indexing straight off the temperature would be wrong.
    let offset_c = in_c - table.begin_c;
    let index = (offset_c / table.step_c) as usize;

    let delta_uv = values[index + 1] - values[index];
    let interpol_uv = (offset_c % table.step_c) * delta_uv / table.step_c;
    values[index] + interpol_uv
}

/// Voltage to temperature: binary search, then linear interpolation,
/// clamped to the table span.
fn uv_to_c(table: &TcTable, in_uv: i32) -> i16 {
    let values = table.values_uv;
    if in_uv <= i32::from(values[0]) {
        return table.begin_c;
    }
    if in_uv >= i32::from(values[values.len() - 1]) {
        return table.end_c;
    }
    let in_uv = in_uv as i16;

    let mut a = 0usize;
    let mut b = values.len() - 1;
    while b - a > 1 {
        let c = (a + b) / 2;
        if in_uv == values[c] {
            return table.begin_c + table.step_c * c as i16;
        }
        if in_uv < values[c] {
            b = c;
        } else {
            a = c;
        }
    }

    let delta_uv = values[b] - values[a];
    let interpol_c = table.step_c * (in_uv - values[a]) / delta_uv;
    table.begin_c + table.step_c * a as i16 + interpol_c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_microvolts_at_zero_cold_junction() {
        let tc = Thermocouple::new(&TYPE_R);
        let r = tc.convert(0, 0);
        assert_eq!(r.temp_c, 0);
        assert!(!r.over_range);
    }

    #[test]
    fn exact_table_point() {
        let tc = Thermocouple::new(&TYPE_R);
        // 5312 uV is the reference value for 576 C.
        let r = tc.convert(0, 5312);
        assert_eq!(r.temp_c, 576);
        assert!(!r.over_range);
    }

    #[test]
    fn interpolates_between_entries() {
        let tc = Thermocouple::new(&TYPE_R);
        // Halfway between 0 uV (0 C) and 88 uV (16 C).
        let r = tc.convert(0, 44);
        assert_eq!(r.temp_c, 8);
    }

    #[test]
    fn cold_junction_compensation_adds_in() {
        let tc = Thermocouple::new(&TYPE_R);
        // At a 25 C cold junction, type R contributes 141 uV; a probe at
        // 576 C therefore measures 141 uV less than the reference value.
        let r = tc.convert(25, 5312 - 141);
        assert_eq!(r.temp_c, 576);
    }

    #[test]
    fn negative_cold_junction_span_is_covered() {
        let tc = Thermocouple::new(&TYPE_R);
        // At -20 C the junction contributes -100 uV.
        let r = tc.convert(-20, 100);
        assert_eq!(r.temp_c, 0);
    }

    #[test]
    fn over_range_is_flagged_and_clamped() {
        let tc = Thermocouple::new(&TYPE_R);
        let r = tc.convert(0, 30_000);
        assert!(r.over_range);
        assert_eq!(r.temp_c, 1776);
    }

    #[test]
    fn below_range_clamps_without_flag() {
        let tc = Thermocouple::new(&TYPE_R);
        let r = tc.convert(0, -500);
        assert!(!r.over_range);
        assert_eq!(r.temp_c, 0);
    }

    #[test]
    fn calibration_shifts_readings() {
        let mut tc = Thermocouple::new(&TYPE_R);
        // The raw voltage for 100 C reads as 100 before calibration.
        assert_eq!(tc.convert(0, 648).temp_c, 100);

        // A reference thermometer says 110 C where we read 100 C.
        tc.calibrate(100, 110);
        assert_eq!(tc.convert(0, 648).temp_c, 110);
    }

    #[test]
    fn confirming_a_correct_reading_keeps_the_offset() {
        let mut tc = Thermocouple::new(&TYPE_R);
        tc.calibrate(100, 110);
        let offset = tc.cal_offset_uv();
        // The probe now reads 110 and the reference agrees.
        tc.calibrate(110, 110);
        assert_eq!(tc.cal_offset_uv(), offset);
    }
}

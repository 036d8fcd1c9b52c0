//! Fixed-precision sample values.

use std::fmt;

/// A floating point reading rendered with a fixed number of decimals.
///
/// The value is rounded half away from zero at `precision` decimal places and
/// then printed with exactly `precision` fractional digits, so `1134.43543`
/// at precision 2 renders as `1134.44`. Non-finite values use the exposition
/// spellings `NaN`, `+Inf` and `-Inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundedValue {
    /// The raw reading.
    pub value: f64,
    /// Number of fractional digits to render.
    pub precision: u32,
}

impl RoundedValue {
    /// Create a new rounded value.
    pub fn new(value: f64, precision: u32) -> Self {
        Self { value, precision }
    }

    /// The value after rounding to `precision` decimals.
    pub fn rounded(&self) -> f64 {
        let shift = 10f64.powi(self.precision.min(i32::MAX as u32) as i32);
        let scaled = self.value * shift;

        if scaled.is_finite() && shift.is_finite() {
            scaled.round() / shift
        } else {
            self.value
        }
    }

    /// Render the value in exposition form.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RoundedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_nan() {
            return f.write_str("NaN");
        }
        if self.value.is_infinite() {
            return f.write_str(if self.value.is_sign_positive() {
                "+Inf"
            } else {
                "-Inf"
            });
        }

        write!(f, "{:.*}", self.precision as usize, self.rounded())
    }
}

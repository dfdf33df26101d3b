use serde::{Deserialize, Serialize};
use std::fmt;

/// Whole-number percentage in `0..=100`.
///
/// Every percent shown to a learner (course completion, quiz score, in-quiz
/// progress) goes through this type so that rounding and bounds are applied
/// in exactly one place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Percent(u8);

impl Percent {
    pub const ZERO: Percent = Percent(0);
    pub const FULL: Percent = Percent(100);

    /// Creates a percent, clamping anything above 100 down to 100.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        if value > 100 { Self(100) } else { Self(value) }
    }

    /// Computes `round(100 * part / whole)` with halves rounded up.
    ///
    /// Returns `ZERO` when `whole` is zero, and caps `part` at `whole` so the
    /// result never exceeds 100.
    ///
    /// ```
    /// # use course_core::model::Percent;
    /// assert_eq!(Percent::from_ratio(1, 2).value(), 50);
    /// assert_eq!(Percent::from_ratio(1, 8).value(), 13); // 12.5 rounds up
    /// assert_eq!(Percent::from_ratio(3, 0), Percent::ZERO);
    /// ```
    #[must_use]
    pub fn from_ratio(part: u64, whole: u64) -> Self {
        if whole == 0 {
            return Self::ZERO;
        }
        let part = u128::from(part.min(whole));
        let whole = u128::from(whole);
        // floor((100 * part + whole / 2) / whole) without the floating-point detour.
        let rounded = (200 * part + whole) / (2 * whole);
        Self::new(u8::try_from(rounded).unwrap_or(100))
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_full(self) -> bool {
        self.0 == 100
    }
}

impl From<u8> for Percent {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<Percent> for u8 {
    fn from(value: Percent) -> Self {
        value.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_rounds_half_up() {
        assert_eq!(Percent::from_ratio(2, 4).value(), 50);
        assert_eq!(Percent::from_ratio(1, 3).value(), 33);
        assert_eq!(Percent::from_ratio(2, 3).value(), 67);
        assert_eq!(Percent::from_ratio(1, 200).value(), 1);
        assert_eq!(Percent::from_ratio(1, 201).value(), 0);
    }

    #[test]
    fn ratio_is_bounded() {
        assert_eq!(Percent::from_ratio(0, 0), Percent::ZERO);
        assert_eq!(Percent::from_ratio(9, 4), Percent::FULL);
        assert_eq!(Percent::from_ratio(u64::MAX, u64::MAX), Percent::FULL);
    }

    #[test]
    fn new_clamps_above_hundred() {
        assert_eq!(Percent::new(250).value(), 100);
    }

    #[test]
    fn deserialization_clamps() {
        let p: Percent = serde_json::from_str("180").unwrap();
        assert_eq!(p, Percent::FULL);
        assert_eq!(serde_json::to_string(&Percent::new(42)).unwrap(), "42");
    }

    #[test]
    fn display_appends_sign() {
        assert_eq!(Percent::new(7).to_string(), "7%");
    }
}

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Playback speed multiplier. Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Speed(f64);

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InvalidSpeed {
    #[error("Speed must be a number greater than 0")]
    NotANumber,
    #[error("Speed must be greater than 0")]
    NotPositive,
}

impl Speed {
    /// Four times faster
    pub const DEFAULT: Speed = Speed(4.0);

    pub fn new(value: f64) -> Result<Self, InvalidSpeed> {
        if !value.is_finite() {
            return Err(InvalidSpeed::NotANumber);
        }
        if value <= 0.0 {
            return Err(InvalidSpeed::NotPositive);
        }
        // Subnormal speeds overflow the timestamp scale
        if !(1.0 / value).is_finite() {
            return Err(InvalidSpeed::NotANumber);
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Video filter scaling presentation timestamps by `1/speed`, so `4` plays four times faster.
    pub fn setpts_filter(self) -> String {
        format!("setpts={}*PTS", 1.0 / self.0)
    }
}

impl TryFrom<f64> for Speed {
    type Error = InvalidSpeed;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Speed> for f64 {
    fn from(speed: Speed) -> Self {
        speed.0
    }
}

impl FromStr for Speed {
    type Err = InvalidSpeed;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s.trim().parse().map_err(|_| InvalidSpeed::NotANumber)?;
        Self::new(value)
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_positive_numbers() {
        assert_eq!("4".parse::<Speed>().unwrap().value(), 4.0);
        assert_eq!(" 2.5 ".parse::<Speed>().unwrap().value(), 2.5);
        assert_eq!("0.5".parse::<Speed>().unwrap().value(), 0.5);
        assert_eq!("1e1".parse::<Speed>().unwrap().value(), 10.0);
    }

    #[test]
    fn test_parse_rejects_non_positive() {
        assert_eq!("0".parse::<Speed>(), Err(InvalidSpeed::NotPositive));
        assert_eq!("-3".parse::<Speed>(), Err(InvalidSpeed::NotPositive));
        assert_eq!("-0.0".parse::<Speed>(), Err(InvalidSpeed::NotPositive));
    }

    #[test]
    fn test_parse_rejects_garbage_and_non_finite() {
        for raw in ["", "  ", "fast", "4x", "NaN", "inf", "-inf", "1e-310"] {
            assert_eq!(raw.parse::<Speed>(), Err(InvalidSpeed::NotANumber), "input {raw:?}");
        }
    }

    #[test]
    fn test_reciprocal_stays_finite() {
        assert_eq!(Speed::new(5e-324), Err(InvalidSpeed::NotANumber));
        assert_eq!(Speed::new(f64::MIN_POSITIVE).unwrap().setpts_filter(), format!("setpts={}*PTS", 1.0 / f64::MIN_POSITIVE));
    }

    #[test]
    fn test_error_messages_name_the_constraint() {
        assert!(InvalidSpeed::NotANumber.to_string().contains("greater than 0"));
        assert!(InvalidSpeed::NotPositive.to_string().contains("greater than 0"));
    }

    #[test]
    fn test_setpts_filter_uses_reciprocal() {
        assert_eq!(Speed::new(4.0).unwrap().setpts_filter(), "setpts=0.25*PTS");
        assert_eq!(Speed::new(2.0).unwrap().setpts_filter(), "setpts=0.5*PTS");
        assert_eq!(Speed::new(0.5).unwrap().setpts_filter(), "setpts=2*PTS");
    }
}

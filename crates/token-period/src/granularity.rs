use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{PeriodError, day::DAY_SECONDS};

/// Bucket length of a mining token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Biweekly,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [
        Granularity::Daily,
        Granularity::Weekly,
        Granularity::Biweekly,
    ];

    pub const fn days(self) -> i64 {
        match self {
            Granularity::Daily => 1,
            Granularity::Weekly => 7,
            Granularity::Biweekly => 14,
        }
    }

    /// Bucket length in seconds: 86400, 604800 or 1209600.
    pub const fn duration(self) -> i64 {
        self.days() * DAY_SECONDS
    }

    /// Inverse of [`Granularity::duration`].
    pub fn from_duration(seconds: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.duration() == seconds)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Biweekly => "biweekly",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(Granularity::Daily),
            "weekly" | "week" | "w" => Ok(Granularity::Weekly),
            "biweekly" | "biweek" | "bw" => Ok(Granularity::Biweekly),
            other => Err(PeriodError::UnknownGranularity(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations() {
        assert_eq!(Granularity::Daily.duration(), 86_400);
        assert_eq!(Granularity::Weekly.duration(), 604_800);
        assert_eq!(Granularity::Biweekly.duration(), 1_209_600);
    }

    #[test]
    fn test_from_duration() {
        assert_eq!(
            Granularity::from_duration(604_800),
            Some(Granularity::Weekly)
        );
        assert_eq!(Granularity::from_duration(3 * 86_400), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("Weekly".parse::<Granularity>(), Ok(Granularity::Weekly));
        assert_eq!(" bw ".parse::<Granularity>(), Ok(Granularity::Biweekly));
        assert!("monthly".parse::<Granularity>().is_err());
    }
}

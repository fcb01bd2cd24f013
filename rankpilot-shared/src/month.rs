use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar month a settlement record is scoped to, formatted `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SettlementMonth {
    pub year: i32,
    pub month: u32,
}

impl SettlementMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month containing the given instant, in UTC.
    pub fn current() -> Self {
        Self::from_date(chrono::Utc::now().date_naive())
    }

    /// The calendar month before this one.
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    /// First day of the month.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(self.year, 1, 1).unwrap())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (y, m) = s.split_once('-')?;
        let year = y.parse().ok()?;
        let month: u32 = m.parse().ok()?;
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }
}

impl fmt::Display for SettlementMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let m = SettlementMonth::new(2025, 3);
        assert_eq!(m.to_string(), "2025-03");
        assert_eq!(SettlementMonth::parse("2025-03"), Some(m));
        assert_eq!(SettlementMonth::parse("2025-13"), None);
        assert_eq!(SettlementMonth::parse("garbage"), None);
    }

    #[test]
    fn test_previous_wraps_year() {
        assert_eq!(
            SettlementMonth::new(2025, 1).previous(),
            SettlementMonth::new(2024, 12)
        );
        assert_eq!(
            SettlementMonth::new(2025, 6).previous(),
            SettlementMonth::new(2025, 5)
        );
    }

    #[test]
    fn test_contains() {
        let m = SettlementMonth::new(2025, 2);
        assert!(m.contains(NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()));
        assert!(!m.contains(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()));
    }
}

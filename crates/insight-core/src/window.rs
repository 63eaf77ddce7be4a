use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::{InsightError, InsightResult};

/// Daily claim window: the calendar date in a fixed reference timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyWindow {
    tz: Tz,
}

impl DailyWindow {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Build from an IANA timezone name such as `Asia/Singapore`
    pub fn from_name(name: &str) -> InsightResult<Self> {
        let tz: Tz = name
            .parse()
            .map_err(|e| InsightError::Config(format!("invalid window timezone '{name}': {e}")))?;
        Ok(Self::new(tz))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn key_at(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.tz).format("%Y-%m-%d").to_string()
    }

    pub fn current_key(&self) -> String {
        self.key_at(Utc::now())
    }
}

impl Default for DailyWindow {
    fn default() -> Self {
        Self::new(chrono_tz::Asia::Singapore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_follows_reference_timezone() {
        let window = DailyWindow::default();
        // 17:30 UTC is already the next day in Singapore (UTC+8)
        let late_utc = Utc.with_ymd_and_hms(2026, 3, 1, 17, 30, 0).unwrap();
        assert_eq!(window.key_at(late_utc), "2026-03-02");

        let early_utc = Utc.with_ymd_and_hms(2026, 3, 1, 15, 59, 0).unwrap();
        assert_eq!(window.key_at(early_utc), "2026-03-01");
    }

    #[test]
    fn timezone_names_are_validated() {
        assert!(DailyWindow::from_name("America/New_York").is_ok());
        assert!(matches!(
            DailyWindow::from_name("Mars/Olympus"),
            Err(InsightError::Config(_))
        ));
    }
}

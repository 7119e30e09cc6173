//! Market-hours and weekday gate.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use super::error::TraderError;

#[derive(Debug, Clone, PartialEq)]
pub struct MarketHours {
    pub timezone: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub weekdays: Vec<Weekday>,
    pub market_hours_only: bool,
    pub weekdays_only: bool,
}

impl Default for MarketHours {
    /// NSE cash session: 09:15-15:30 IST, Monday to Friday.
    fn default() -> Self {
        MarketHours {
            timezone: chrono_tz::Asia::Kolkata,
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default(),
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            market_hours_only: true,
            weekdays_only: true,
        }
    }
}

impl MarketHours {
    pub fn within_hours(&self, now: DateTime<Utc>) -> bool {
        if !self.market_hours_only {
            return true;
        }
        let local = now.with_timezone(&self.timezone).time();
        self.open <= local && local <= self.close
    }

    pub fn on_trading_day(&self, now: DateTime<Utc>) -> bool {
        if !self.weekdays_only {
            return true;
        }
        let weekday = now.with_timezone(&self.timezone).weekday();
        self.weekdays.contains(&weekday)
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.on_trading_day(now) && self.within_hours(now)
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Parse a comma separated weekday list such as `Mon,Tue,Wed`.
pub fn parse_weekdays(value: &str) -> Result<Vec<Weekday>, TraderError> {
    let mut days = Vec::new();
    for raw in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let day: Weekday = raw.parse().map_err(|_| TraderError::ConfigInvalid {
            section: "scheduler".into(),
            key: "active_weekdays".into(),
            reason: format!("unknown weekday '{raw}'"),
        })?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    if days.is_empty() {
        return Err(TraderError::ConfigInvalid {
            section: "scheduler".into(),
            key: "active_weekdays".into(),
            reason: "at least one weekday is required".into(),
        });
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2025-07-03 is a Thursday; IST is UTC+05:30.
    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn open_during_session() {
        let hours = MarketHours::default();
        assert!(hours.is_open(utc(2025, 7, 3, 5, 0)));
    }

    #[test]
    fn session_bounds_inclusive() {
        let hours = MarketHours::default();
        assert!(hours.is_open(utc(2025, 7, 3, 3, 45)));
        assert!(hours.is_open(utc(2025, 7, 3, 10, 0)));
        assert!(!hours.is_open(utc(2025, 7, 3, 3, 44)));
        assert!(!hours.is_open(utc(2025, 7, 3, 10, 1)));
    }

    #[test]
    fn closed_on_weekend() {
        let hours = MarketHours::default();
        assert!(!hours.is_open(utc(2025, 7, 5, 5, 0)));
        assert!(!hours.is_open(utc(2025, 7, 6, 5, 0)));
    }

    #[test]
    fn weekday_judged_in_exchange_timezone() {
        let hours = MarketHours {
            market_hours_only: false,
            ..MarketHours::default()
        };
        // Friday 20:00 UTC is already Saturday in IST.
        assert!(!hours.is_open(utc(2025, 7, 4, 20, 0)));
    }

    #[test]
    fn gates_can_be_disabled() {
        let hours = MarketHours {
            market_hours_only: false,
            weekdays_only: false,
            ..MarketHours::default()
        };
        assert!(hours.is_open(utc(2025, 7, 6, 22, 0)));
    }

    #[test]
    fn parse_time_formats() {
        assert_eq!(parse_time("09:15"), NaiveTime::from_hms_opt(9, 15, 0));
        assert_eq!(parse_time("15:30:00"), NaiveTime::from_hms_opt(15, 30, 0));
        assert_eq!(parse_time("25:00"), None);
    }

    #[test]
    fn parse_weekdays_list() {
        let days = parse_weekdays("Mon, tue,Wednesday,Mon").unwrap();
        assert_eq!(days, vec![Weekday::Mon, Weekday::Tue, Weekday::Wed]);
        assert!(parse_weekdays("Funday").is_err());
        assert!(parse_weekdays(" ").is_err());
    }
}

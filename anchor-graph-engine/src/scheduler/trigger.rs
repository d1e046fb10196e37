//! When recurring and deferred tasks fire.
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::SchedulerError;

#[derive(Debug, Clone)]
pub enum Trigger {
    /// Cron expression with a leading seconds field, e.g. `0 */5 * * * *`.
    Cron(cron::Schedule),
    /// Fixed period aligned to the unix epoch.
    Interval(Duration),
    /// A single instant.
    Date(DateTime<Utc>),
}

impl Trigger {
    pub fn cron(expression: &str) -> Result<Self, SchedulerError> {
        cron::Schedule::from_str(expression)
            .map(Trigger::Cron)
            .map_err(|e| SchedulerError::InvalidTrigger(format!("{expression}: {e}")))
    }

    pub fn interval(period: Duration) -> Result<Self, SchedulerError> {
        if period.as_millis() == 0 {
            return Err(SchedulerError::InvalidTrigger(
                "interval must be at least one millisecond".to_string(),
            ));
        }
        Ok(Trigger::Interval(period))
    }

    pub fn date(at: DateTime<Utc>) -> Self {
        Trigger::Date(at)
    }

    /// First fire time strictly after `after`, if any remains.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron(schedule) => schedule.after(&after).next(),
            Trigger::Interval(period) => {
                let period = i64::try_from(period.as_millis()).ok()?;
                let now = after.timestamp_millis();
                let next = (now.div_euclid(period) + 1).checked_mul(period)?;
                DateTime::from_timestamp_millis(next)
            }
            Trigger::Date(at) => (*at > after).then_some(*at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cron_next_fire_time() {
        let trigger = Trigger::cron("0 */5 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 4, 23, 9, 2, 30).unwrap();

        assert_eq!(
            trigger.next_after(now),
            Some(Utc.with_ymd_and_hms(2024, 4, 23, 9, 5, 0).unwrap())
        );
    }

    #[test]
    fn test_interval_is_epoch_aligned_and_strictly_after() {
        let trigger = Trigger::interval(Duration::from_secs(60)).unwrap();
        let on_boundary = Utc.with_ymd_and_hms(2024, 4, 23, 9, 0, 0).unwrap();

        assert_eq!(
            trigger.next_after(on_boundary),
            Some(Utc.with_ymd_and_hms(2024, 4, 23, 9, 1, 0).unwrap())
        );
    }

    #[test]
    fn test_date_fires_once() {
        let at = Utc.with_ymd_and_hms(2024, 4, 23, 9, 0, 0).unwrap();
        let trigger = Trigger::date(at);

        assert_eq!(trigger.next_after(at - chrono::Duration::seconds(1)), Some(at));
        assert_eq!(trigger.next_after(at), None);
    }

    #[test]
    fn test_invalid_triggers_are_rejected() {
        assert!(matches!(
            Trigger::cron("every minute"),
            Err(SchedulerError::InvalidTrigger(_))
        ));
        assert!(Trigger::interval(Duration::ZERO).is_err());
    }
}

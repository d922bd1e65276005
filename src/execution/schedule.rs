use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};

const HOUR_SECS: i64 = 3600;

/// Hourly check at a fixed minute of a local wall clock.
///
/// The check runs after the hourly candle has closed, with room for the
/// exchange to publish it. The local clock is a fixed UTC offset (IST,
/// +05:30, by default), so "minute 31" is measured in that zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckSchedule {
    pub check_minute: u32,
    pub utc_offset_minutes: i32,
}

impl Default for CheckSchedule {
    fn default() -> Self {
        Self {
            check_minute: 31,
            utc_offset_minutes: 330,
        }
    }
}

impl CheckSchedule {
    pub fn new(check_minute: u32, utc_offset_minutes: i32) -> Self {
        Self {
            check_minute,
            utc_offset_minutes,
        }
    }

    /// First check time strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_check_time(now, self.check_minute, self.utc_offset_minutes)
    }

    /// Hourly ticker whose first tick is the next check time. Missed ticks
    /// are skipped so a slow cycle never causes a burst.
    pub fn ticker(&self) -> Interval {
        let now = Utc::now();
        let next = self.next_after(now);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

        tracing::info!(
            "Next check at {} UTC (in {}m {}s)",
            next.format("%Y-%m-%d %H:%M:%S"),
            wait.as_secs() / 60,
            wait.as_secs() % 60
        );

        let mut ticker = interval_at(Instant::now() + wait, Duration::from_secs(HOUR_SECS as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }
}

/// Next `hh:check_minute:00` local time after `now`.
///
/// Before the check minute it is this hour's slot, from the check minute on
/// it is the next hour's.
pub fn next_check_time(now: DateTime<Utc>, check_minute: u32, utc_offset_minutes: i32) -> DateTime<Utc> {
    let offset_ms = i64::from(utc_offset_minutes) * 60_000;
    let local_ms = now.timestamp_millis() + offset_ms;

    let hour_ms = HOUR_SECS * 1000;
    let hour_start = local_ms - local_ms.rem_euclid(hour_ms);
    let mut slot = hour_start + i64::from(check_minute % 60) * 60_000;
    if local_ms >= slot {
        slot += hour_ms;
    }

    DateTime::from_timestamp_millis(slot - offset_ms)
        .unwrap_or_else(|| now + ChronoDuration::hours(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_before_check_minute_same_hour() {
        // 10:20 UTC = 15:50 IST -> 16:31 IST = 11:01 UTC
        assert_eq!(next_check_time(utc(10, 20, 0), 31, 330), utc(11, 1, 0));
        // 10:00 UTC = 15:30 IST -> 15:31 IST = 10:01 UTC
        assert_eq!(next_check_time(utc(10, 0, 0), 31, 330), utc(10, 1, 0));
    }

    #[test]
    fn test_at_or_after_check_minute_rolls_to_next_hour() {
        // 10:01:00 UTC = 15:31:00 IST -> 16:31 IST
        assert_eq!(next_check_time(utc(10, 1, 0), 31, 330), utc(11, 1, 0));
        assert_eq!(next_check_time(utc(10, 1, 5), 31, 330), utc(11, 1, 0));
    }

    #[test]
    fn test_utc_schedule() {
        assert_eq!(next_check_time(utc(10, 20, 0), 31, 0), utc(10, 31, 0));
        assert_eq!(next_check_time(utc(10, 45, 0), 31, 0), utc(11, 31, 0));
        assert_eq!(next_check_time(utc(23, 45, 0), 31, 0), Utc.with_ymd_and_hms(2024, 3, 2, 0, 31, 0).unwrap());
    }

    #[test]
    fn test_schedule_next_after() {
        let schedule = CheckSchedule::default();
        let next = schedule.next_after(utc(10, 20, 0));
        assert!(next > utc(10, 20, 0));
        assert!(next - utc(10, 20, 0) <= ChronoDuration::hours(1));
    }
}

use crate::db::DetectionStore;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use failure::Error;
use log::{error, info};
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed-width ISO-8601 so stored timestamps order the same as text and as
/// time.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct DuplicateChecker {
    store: Arc<dyn DetectionStore>,
    clock: Arc<dyn Clock>,
}

impl DuplicateChecker {
    pub fn new(store: Arc<dyn DetectionStore>, clock: Arc<dyn Clock>) -> DuplicateChecker {
        DuplicateChecker { store, clock }
    }

    /// True if `plate_text` was stored less than `window_minutes` ago.
    /// Store failures fail open: they are logged and reported as "not a
    /// duplicate" so the detection still gets recorded.
    pub fn is_duplicate(&self, plate_text: &str, window_minutes: i64) -> bool {
        match self.is_duplicate_impl(plate_text, window_minutes) {
            Ok(duplicate) => {
                if duplicate {
                    info!(
                        "Found duplicate license plate {} within the last {} minutes",
                        plate_text, window_minutes
                    );
                }
                duplicate
            }
            Err(e) => {
                error!(
                    "Error checking for duplicate license plate {}, failing open: {:?}",
                    plate_text, e
                );
                false
            }
        }
    }

    fn is_duplicate_impl(&self, plate_text: &str, window_minutes: i64) -> Result<bool, Error> {
        let threshold = Duration::try_minutes(window_minutes)
            .and_then(|window| self.clock.now().checked_sub_signed(window))
            .ok_or_else(|| format_err!("Duplicate window of {} minutes is out of range", window_minutes))?;
        let recent = self
            .store
            .find_recent(plate_text, &format_timestamp(threshold))?;
        Ok(!recent.is_empty())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{BrokenStore, FixedClock};
    use super::*;
    use crate::db::SqliteStore;
    use crate::types::{DecimalConfidence, DetectionRecord};
    use chrono::TimeZone;
    use rusqlite::Connection;

    fn store_with(plate: &str, timestamp: &str) -> Arc<SqliteStore> {
        let store =
            SqliteStore::with_connection(Connection::open_in_memory().unwrap(), "Detections").unwrap();
        store
            .put(&DetectionRecord {
                image_key: "first.jpg".to_string(),
                plate_text: plate.to_string(),
                confidence: DecimalConfidence::from_f64(98.0),
                timestamp: timestamp.to_string(),
                bucket_name: "gate-camera".to_string(),
            })
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let t = Utc.ymd(2026, 1, 2).and_hms(3, 4, 5);
        assert_eq!(format_timestamp(t), "2026-01-02T03:04:05.000000Z");
    }

    #[test]
    fn inside_window_is_duplicate() {
        let store = store_with("ABC123", "2026-10-19T10:00:00.000000Z");
        let clock = Arc::new(FixedClock::at("2026-10-19T10:04:59Z"));
        let checker = DuplicateChecker::new(store, clock);
        assert!(checker.is_duplicate("ABC123", 5));
        assert!(!checker.is_duplicate("XYZ789", 5));
    }

    #[test]
    fn record_exactly_at_threshold_is_not_duplicate() {
        let store = store_with("ABC123", "2026-10-19T10:00:00.000000Z");
        let clock = Arc::new(FixedClock::at("2026-10-19T10:05:00Z"));
        let checker = DuplicateChecker::new(store, clock.clone());
        assert!(!checker.is_duplicate("ABC123", 5));
        clock.advance(-1);
        assert!(checker.is_duplicate("ABC123", 5));
    }

    #[test]
    fn oversized_window_fails_open() {
        let store = store_with("ABC123", "2026-10-19T10:00:00.000000Z");
        let clock = Arc::new(FixedClock::at("2026-10-19T10:01:00Z"));
        let checker = DuplicateChecker::new(store, clock);
        assert!(!checker.is_duplicate("ABC123", 1_000_000_000_000));
        assert!(!checker.is_duplicate("ABC123", i64::MAX));
        assert!(checker.is_duplicate("ABC123", 5));
    }

    #[test]
    fn store_errors_fail_open() {
        let clock = Arc::new(FixedClock::at("2026-10-19T10:00:00Z"));
        let checker = DuplicateChecker::new(Arc::new(BrokenStore::default()), clock);
        assert!(!checker.is_duplicate("ABC123", 5));
    }
}

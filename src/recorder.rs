use crate::db::DetectionStore;
use crate::dedup::{format_timestamp, Clock, DuplicateChecker};
use crate::types::{DecimalConfidence, DetectionRecord, PlateCandidate};
use log::{error, info};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Recorded(DetectionRecord),
    /// Same plate already stored inside the duplicate window.
    Suppressed,
    BelowThreshold,
    /// The write failed; logged and otherwise ignored.
    NotSaved,
}

impl RecordOutcome {
    pub fn saved(&self) -> bool {
        matches!(self, RecordOutcome::Recorded(_))
    }
}

pub struct Recorder {
    store: Arc<dyn DetectionStore>,
    clock: Arc<dyn Clock>,
    checker: DuplicateChecker,
    window_minutes: i64,
    min_confidence: Option<f64>,
}

impl Recorder {
    pub fn new(
        store: Arc<dyn DetectionStore>,
        clock: Arc<dyn Clock>,
        window_minutes: i64,
        min_confidence: Option<f64>,
    ) -> Recorder {
        Recorder {
            checker: DuplicateChecker::new(store.clone(), clock.clone()),
            store,
            clock,
            window_minutes,
            min_confidence,
        }
    }

    pub fn record(
        &self,
        candidate: &PlateCandidate,
        image_key: &str,
        bucket_name: &str,
    ) -> RecordOutcome {
        if let Some(min) = self.min_confidence {
            if candidate.confidence < min {
                info!(
                    "Confidence {:.2} for {} below {:.2}, not saving",
                    candidate.confidence, candidate.plate_text, min
                );
                return RecordOutcome::BelowThreshold;
            }
        }
        if self
            .checker
            .is_duplicate(&candidate.plate_text, self.window_minutes)
        {
            info!("Skipping duplicate license plate: {}", candidate.plate_text);
            return RecordOutcome::Suppressed;
        }

        let record = DetectionRecord {
            image_key: image_key.to_string(),
            plate_text: candidate.plate_text.clone(),
            confidence: DecimalConfidence::from_f64(candidate.confidence),
            timestamp: format_timestamp(self.clock.now()),
            bucket_name: bucket_name.to_string(),
        };
        match self.store.put(&record) {
            Ok(()) => {
                info!("Saved license plate {} for {}", record.plate_text, image_key);
                RecordOutcome::Recorded(record)
            }
            Err(e) => {
                error!("Error saving license plate {}: {:?}", record.plate_text, e);
                RecordOutcome::NotSaved
            }
        }
    }
}

use crate::config::Strategy;
use crate::db::DetectionStore;
use crate::dedup::Clock;
use crate::plate::{LabelGatedSelector, PatternSelector, PlateSelector};
use crate::recognition::{RecognitionError, Recognizer};
use crate::recorder::{RecordOutcome, Recorder};
use crate::types::ImageRef;
use log::info;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn selector_for(strategy: Strategy) -> Box<dyn PlateSelector> {
    match strategy {
        Strategy::Pattern => Box::new(PatternSelector),
        Strategy::Label => Box::new(LabelGatedSelector::default()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    NoPlate {
        image_key: String,
    },
    Plate {
        license_plate: String,
        confidence: f64,
        image_key: String,
        record: RecordOutcome,
    },
}

impl Outcome {
    /// Response body handed back to the invoker.
    pub fn to_json(&self) -> Value {
        match self {
            Outcome::NoPlate { image_key } => json!({
                "message": "No license plate detected",
                "image_key": image_key,
            }),
            Outcome::Plate {
                license_plate,
                confidence,
                image_key,
                record,
            } => {
                let mut body = json!({
                    "license_plate": license_plate,
                    "confidence": confidence,
                    "image_key": image_key,
                    "saved_to_db": record.saved(),
                });
                if *record == RecordOutcome::Suppressed {
                    body["duplicate"] = json!(true);
                }
                body
            }
        }
    }
}

pub struct Pipeline {
    recognizer: Arc<dyn Recognizer>,
    selector: Box<dyn PlateSelector>,
    recorder: Recorder,
    max_labels: u32,
}

impl Pipeline {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        store: Arc<dyn DetectionStore>,
        selector: Box<dyn PlateSelector>,
        clock: Arc<dyn Clock>,
        window_minutes: i64,
        max_labels: u32,
    ) -> Pipeline {
        let recorder = Recorder::new(
            store,
            clock,
            window_minutes,
            selector.min_persist_confidence(),
        );
        Pipeline {
            recognizer,
            selector,
            recorder,
            max_labels,
        }
    }

    /// Detect, select, dedupe, persist. Only recognition failures are
    /// errors; storage trouble shows up in the record outcome.
    pub async fn process(
        &self,
        request_id: &str,
        image: &ImageRef,
    ) -> Result<Outcome, RecognitionError> {
        info!(
            "[{}] Detecting text in {} with {} selection",
            request_id,
            image.object_key,
            self.selector.name()
        );
        let detections = self.recognizer.detect_text(image).await?;
        let labels = if self.selector.needs_labels() {
            Some(self.recognizer.detect_labels(image, self.max_labels).await?)
        } else {
            None
        };

        let candidate = match self.selector.select(&detections, labels.as_deref()) {
            Some(candidate) => candidate,
            None => {
                info!("[{}] No license plate detected in the image", request_id);
                return Ok(Outcome::NoPlate {
                    image_key: image.object_key.clone(),
                });
            }
        };
        info!(
            "[{}] License plate detected: {} with confidence {:.2}",
            request_id, candidate.plate_text, candidate.confidence
        );

        let record = self
            .recorder
            .record(&candidate, &image.object_key, &image.bucket_name);
        if !record.saved() {
            info!("[{}] Not saved: {:?}", request_id, record);
        }
        Ok(Outcome::Plate {
            license_plate: candidate.plate_text,
            confidence: candidate.confidence,
            image_key: image.object_key.clone(),
            record,
        })
    }
}

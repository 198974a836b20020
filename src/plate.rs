use crate::types::{DetectionKind, Label, PlateCandidate, TextDetection};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

static COMPACT_PLATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{5,8}$").unwrap());
static SEPARATED_PLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{1,3}[-\s]?[0-9]{1,4}$").unwrap());

const PLATE_LABELS: [&str; 2] = ["license plate", "vehicle registration plate"];

/// A detection paired with its whitespace-free text.
#[derive(Debug)]
pub struct NormalizedDetection<'a> {
    pub detection: &'a TextDetection,
    pub normalized: String,
}

pub fn normalize(detections: &[TextDetection]) -> Vec<NormalizedDetection<'_>> {
    detections
        .iter()
        .map(|detection| NormalizedDetection {
            detection,
            normalized: detection.text.split_whitespace().collect(),
        })
        .collect()
}

/// Picks at most one plate out of an image's text detections.
pub trait PlateSelector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `select` needs the image's labels.
    fn needs_labels(&self) -> bool;

    /// Candidates below this confidence are never persisted.
    fn min_persist_confidence(&self) -> Option<f64>;

    fn select(&self, detections: &[TextDetection], labels: Option<&[Label]>)
        -> Option<PlateCandidate>;
}

/// Shape match over LINE detections.
#[derive(Debug, Default)]
pub struct PatternSelector;

impl PatternSelector {
    fn qualifies(item: &NormalizedDetection) -> bool {
        item.detection.kind == DetectionKind::Line
            && (COMPACT_PLATE_RE.is_match(&item.normalized)
                || SEPARATED_PLATE_RE.is_match(&item.detection.text))
    }
}

impl PlateSelector for PatternSelector {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn needs_labels(&self) -> bool {
        false
    }

    fn min_persist_confidence(&self) -> Option<f64> {
        None
    }

    fn select(
        &self,
        detections: &[TextDetection],
        _labels: Option<&[Label]>,
    ) -> Option<PlateCandidate> {
        let mut best: Option<NormalizedDetection> = None;
        for item in normalize(detections) {
            if !Self::qualifies(&item) {
                continue;
            }
            debug!(
                "Plate-shaped line {:?} (normalized {:?})",
                item.detection.text, item.normalized
            );
            // Strictly greater, so the earliest of equal confidences stays.
            let replace = best.as_ref().map_or(true, |b| {
                item.detection.confidence > b.detection.confidence
            });
            if replace {
                best = Some(item);
            }
        }
        let best = best?;
        info!(
            "Detected license plate: {} (cleaned: {}) with confidence {:.2}",
            best.detection.text, best.normalized, best.detection.confidence
        );
        Some(PlateCandidate {
            raw_text: best.detection.text.clone(),
            plate_text: best.normalized.clone(),
            normalized_text: best.normalized,
            confidence: best.detection.confidence,
        })
    }
}

/// WORD shape match, only on images labelled as showing a plate.
#[derive(Debug)]
pub struct LabelGatedSelector {
    pub min_confidence: f64,
}

impl Default for LabelGatedSelector {
    fn default() -> Self {
        LabelGatedSelector {
            min_confidence: 90.0,
        }
    }
}

impl LabelGatedSelector {
    fn has_plate_label(labels: &[Label]) -> bool {
        labels.iter().any(|label| {
            PLATE_LABELS
                .iter()
                .any(|name| label.name.eq_ignore_ascii_case(name))
        })
    }

    fn word_qualifies(&self, detection: &TextDetection) -> bool {
        let len = detection.text.chars().count();
        detection.kind == DetectionKind::Word
            && (6..=8).contains(&len)
            && detection.text.chars().any(|c| c.is_ascii_alphabetic())
            && detection.text.chars().any(|c| c.is_ascii_digit())
            && detection.confidence > self.min_confidence
    }
}

impl PlateSelector for LabelGatedSelector {
    fn name(&self) -> &'static str {
        "label"
    }

    fn needs_labels(&self) -> bool {
        true
    }

    fn min_persist_confidence(&self) -> Option<f64> {
        Some(self.min_confidence)
    }

    fn select(
        &self,
        detections: &[TextDetection],
        labels: Option<&[Label]>,
    ) -> Option<PlateCandidate> {
        if !labels.map_or(false, Self::has_plate_label) {
            info!("No license plate label on image, skipping text");
            return None;
        }
        let mut best: Option<&TextDetection> = None;
        for detection in detections.iter().filter(|d| self.word_qualifies(d)) {
            if best.map_or(true, |b| detection.confidence > b.confidence) {
                best = Some(detection);
            }
        }
        let best = best?;
        info!(
            "Detected license plate: {} with confidence {:.2}",
            best.text, best.confidence
        );
        Some(PlateCandidate {
            raw_text: best.text.clone(),
            normalized_text: best.text.split_whitespace().collect(),
            plate_text: best.text.clone(),
            confidence: best.confidence,
        })
    }
}

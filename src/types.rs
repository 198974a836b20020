use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionKind {
    Line,
    Word,
}

impl DetectionKind {
    pub fn parse(s: &str) -> Option<DetectionKind> {
        match s {
            "LINE" => Some(DetectionKind::Line),
            "WORD" => Some(DetectionKind::Word),
            _ => None,
        }
    }
}

/// A single text fragment returned by the recognition service.
#[derive(Debug, Clone, PartialEq)]
pub struct TextDetection {
    pub text: String,
    pub kind: DetectionKind,
    /// Percentage in [0, 100].
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub name: String,
    pub confidence: f64,
}

/// Location of an uploaded image in object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub bucket_name: String,
    pub object_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlateCandidate {
    pub raw_text: String,
    pub normalized_text: String,
    /// What gets reported and stored: the normalized text for pattern
    /// selection, the raw word for label-gated selection.
    pub plate_text: String,
    pub confidence: f64,
}

/// Confidence kept as an exact decimal string so the value written to the
/// store is the one the recognizer reported, digit for digit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalConfidence(String);

impl DecimalConfidence {
    /// Shortest decimal form that round-trips to the same `f64`.
    pub fn from_f64(value: f64) -> DecimalConfidence {
        DecimalConfidence(format!("{}", value))
    }

    /// Accepts a stored decimal string, rejecting anything that is not a
    /// plain finite number.
    pub fn parse(s: &str) -> Option<DecimalConfidence> {
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() && !s.contains(|c: char| c.is_alphabetic()) => {
                Some(DecimalConfidence(s.to_string()))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecimalConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One persisted detection. `image_key` is the primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub image_key: String,
    pub plate_text: String,
    pub confidence: DecimalConfidence,
    /// ISO-8601, UTC, microsecond precision.
    pub timestamp: String,
    pub bucket_name: String,
}

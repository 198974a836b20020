use crate::types::{DetectionKind, ImageRef, Label, TextDetection};
use failure::Fail;
use futures::future::{BoxFuture, FutureExt};
use log::{error, info};
use serde_json::{json, Value};
use url::Url;

#[derive(Debug, Fail)]
#[fail(display = "Couldn't {} in {}: {}", operation, image_key, cause)]
pub struct RecognitionError {
    pub operation: &'static str,
    pub image_key: String,
    pub cause: String,
}

impl RecognitionError {
    fn new(operation: &'static str, image: &ImageRef, cause: impl ToString) -> Self {
        RecognitionError {
            operation,
            image_key: image.object_key.clone(),
            cause: cause.to_string(),
        }
    }
}

/// Text and label detection for an image sitting in object storage.
pub trait Recognizer: Send + Sync {
    fn detect_text<'a>(
        &'a self,
        image: &'a ImageRef,
    ) -> BoxFuture<'a, Result<Vec<TextDetection>, RecognitionError>>;

    fn detect_labels<'a>(
        &'a self,
        image: &'a ImageRef,
        max_labels: u32,
    ) -> BoxFuture<'a, Result<Vec<Label>, RecognitionError>>;
}

/// Talks to a recognition service exposing `detect-text` and
/// `detect-labels` endpoints with Rekognition-shaped JSON bodies.
pub struct HttpRecognizer {
    client: reqwest::Client,
    text_url: Url,
    labels_url: Url,
}

impl HttpRecognizer {
    pub fn new(base: &Url) -> Result<HttpRecognizer, failure::Error> {
        // Url::join drops the last path segment unless it ends with '/'.
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(HttpRecognizer {
            client: reqwest::Client::new(),
            text_url: base.join("detect-text")?,
            labels_url: base.join("detect-labels")?,
        })
    }

    async fn call(&self, url: &Url, body: Value) -> Result<Value, reqwest::Error> {
        self.client
            .post(url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await
    }
}

fn image_body(image: &ImageRef) -> Value {
    json!({
        "Image": {
            "S3Object": {
                "Bucket": image.bucket_name,
                "Name": image.object_key,
            }
        }
    })
}

pub fn parse_text_detections(value: &Value) -> Result<Vec<TextDetection>, String> {
    let detections = value["TextDetections"]
        .as_array()
        .ok_or_else(|| "Missing TextDetections in response".to_string())?;
    detections
        .iter()
        .map(|d| {
            let text = d["DetectedText"]
                .as_str()
                .ok_or_else(|| format!("Missing DetectedText in {}", d))?;
            let kind = d["Type"]
                .as_str()
                .and_then(DetectionKind::parse)
                .ok_or_else(|| format!("Unrecognized Type in {}", d))?;
            Ok(TextDetection {
                text: text.to_string(),
                kind,
                confidence: confidence(d)?,
            })
        })
        .collect()
}

pub fn parse_labels(value: &Value) -> Result<Vec<Label>, String> {
    let labels = value["Labels"]
        .as_array()
        .ok_or_else(|| "Missing Labels in response".to_string())?;
    labels
        .iter()
        .map(|l| {
            let name = l["Name"]
                .as_str()
                .ok_or_else(|| format!("Missing Name in {}", l))?;
            Ok(Label {
                name: name.to_string(),
                confidence: confidence(l)?,
            })
        })
        .collect()
}

fn confidence(value: &Value) -> Result<f64, String> {
    match value["Confidence"].as_f64() {
        Some(c) if (0.0..=100.0).contains(&c) => Ok(c),
        _ => Err(format!("Missing or out of range Confidence in {}", value)),
    }
}

impl Recognizer for HttpRecognizer {
    fn detect_text<'a>(
        &'a self,
        image: &'a ImageRef,
    ) -> BoxFuture<'a, Result<Vec<TextDetection>, RecognitionError>> {
        async move {
            let response = self
                .call(&self.text_url, image_body(image))
                .await
                .map_err(|e| RecognitionError::new("detect text", image, e))?;
            let detections = parse_text_detections(&response)
                .map_err(|e| RecognitionError::new("detect text", image, e))?;
            info!("Found {} text detections in the image", detections.len());
            Ok(detections)
        }
        .map(|result| {
            if let Err(e) = &result {
                error!("{}", e);
            }
            result
        })
        .boxed()
    }

    fn detect_labels<'a>(
        &'a self,
        image: &'a ImageRef,
        max_labels: u32,
    ) -> BoxFuture<'a, Result<Vec<Label>, RecognitionError>> {
        async move {
            let mut body = image_body(image);
            body["MaxLabels"] = json!(max_labels);
            let response = self
                .call(&self.labels_url, body)
                .await
                .map_err(|e| RecognitionError::new("detect labels", image, e))?;
            let labels = parse_labels(&response)
                .map_err(|e| RecognitionError::new("detect labels", image, e))?;
            info!("Found {} labels in the image", labels.len());
            Ok(labels)
        }
        .map(|result| {
            if let Err(e) = &result {
                error!("{}", e);
            }
            result
        })
        .boxed()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_detections() {
        let response = json!({
            "TextDetections": [
                { "DetectedText": "ABC 123", "Type": "LINE", "Id": 0, "Confidence": 98.5 },
                { "DetectedText": "ABC", "Type": "WORD", "Id": 1, "ParentId": 0, "Confidence": 97.0 }
            ]
        });
        let detections = parse_text_detections(&response).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].text, "ABC 123");
        assert_eq!(detections[0].kind, DetectionKind::Line);
        assert_eq!(detections[1].kind, DetectionKind::Word);
        assert_eq!(detections[1].confidence, 97.0);
    }

    #[test]
    fn rejects_malformed_detections() {
        assert!(parse_text_detections(&json!({})).is_err());
        assert!(parse_text_detections(&json!({
            "TextDetections": [{ "DetectedText": "A", "Type": "BLOCK", "Confidence": 50 }]
        }))
        .is_err());
        assert!(parse_text_detections(&json!({
            "TextDetections": [{ "DetectedText": "A", "Type": "LINE", "Confidence": 150 }]
        }))
        .is_err());
    }

    #[test]
    fn parses_labels() {
        let labels = parse_labels(&json!({
            "Labels": [
                { "Name": "Car", "Confidence": 99.1 },
                { "Name": "License Plate", "Confidence": 93.0 }
            ]
        }))
        .unwrap();
        assert_eq!(labels[1].name, "License Plate");
    }

    #[test]
    fn endpoints_extend_base_path() {
        let recognizer = HttpRecognizer::new(&Url::parse("http://rekog.local/v1").unwrap()).unwrap();
        assert_eq!(recognizer.text_url.as_str(), "http://rekog.local/v1/detect-text");
        assert_eq!(recognizer.labels_url.as_str(), "http://rekog.local/v1/detect-labels");
    }

    #[test]
    fn request_body_names_the_object() {
        let body = image_body(&ImageRef {
            bucket_name: "gate".to_string(),
            object_key: "front gate.jpg".to_string(),
        });
        assert_eq!(body["Image"]["S3Object"]["Name"], "front gate.jpg");
    }
}

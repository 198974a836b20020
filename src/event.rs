use crate::types::ImageRef;
use failure::Fail;
use serde_json::Value;

#[derive(Debug, Fail, PartialEq)]
pub enum EventError {
    #[fail(display = "Missing {} in storage notification", _0)]
    MissingField(&'static str),
    #[fail(display = "Object key {:?} is not valid UTF-8 once decoded", _0)]
    BadKey(String),
}

/// Pulls the bucket and object key out of an S3-style notification. Only
/// the first record is used.
pub fn parse_notification(value: &Value) -> Result<ImageRef, EventError> {
    let s3 = &value["Records"][0]["s3"];
    let bucket_name = s3["bucket"]["name"]
        .as_str()
        .ok_or(EventError::MissingField("Records[0].s3.bucket.name"))?;
    let raw_key = s3["object"]["key"]
        .as_str()
        .ok_or(EventError::MissingField("Records[0].s3.object.key"))?;
    Ok(ImageRef {
        bucket_name: bucket_name.to_string(),
        object_key: decode_key(raw_key)?,
    })
}

/// Object keys arrive form-encoded: '+' is a space, the rest is
/// percent-encoded.
fn decode_key(raw: &str) -> Result<String, EventError> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|key| key.into_owned())
        .map_err(|_| EventError::BadKey(raw.to_string()))
}

use crate::event;
use crate::pipeline::Pipeline;
use log::{error, info, warn};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject::{LengthRequired, MethodNotAllowed, PayloadTooLarge};
use warp::{Filter, Rejection, Reply};

const MAX_NOTIFICATION_BYTES: u64 = 256 * 1024;

pub async fn run(pipeline: Arc<Pipeline>, port: u16) {
    info!("Listening for storage notifications on port {}", port);
    warp::serve(routes(pipeline)).run(([0, 0, 0, 0], port)).await;
}

fn routes(
    pipeline: Arc<Pipeline>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    warp::post()
        .and(warp::path!("webhook"))
        .and(warp::body::content_length_limit(MAX_NOTIFICATION_BYTES))
        .and(warp::body::json())
        .and(warp::any().map(move || pipeline.clone()))
        .and_then(|notification: Value, pipeline: Arc<Pipeline>| async move {
            let (status, body) = handle_notification(&notification, &pipeline).await;
            Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&body), status))
        })
        .recover(rejection_reply)
}

/// Requests that never reach the pipeline still get a JSON `message` body.
async fn rejection_reply(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid notification body: {}", e),
        )
    } else if err.find::<LengthRequired>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            "Missing Content-Length header".to_string(),
        )
    } else if err.find::<PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "Notification body too large".to_string(),
        )
    } else if err.find::<MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
        )
    } else {
        (StatusCode::BAD_REQUEST, format!("Bad request: {:?}", err))
    };
    warn!("Rejecting request: {}", message);
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "message": message })),
        status,
    ))
}

/// Runs one notification through the pipeline. Recognition failures map to
/// 500; a plate that was found but not stored is still a 200.
async fn handle_notification(notification: &Value, pipeline: &Pipeline) -> (StatusCode, Value) {
    let request_id = Uuid::new_v4().to_simple().to_string();
    let image = match event::parse_notification(notification) {
        Ok(image) => image,
        Err(e) => {
            warn!("[{}] Rejecting notification: {}", request_id, e);
            return (StatusCode::BAD_REQUEST, json!({ "message": e.to_string() }));
        }
    };
    info!(
        "[{}] Processing image {} from bucket {}",
        request_id, image.object_key, image.bucket_name
    );
    match pipeline.process(&request_id, &image).await {
        Ok(outcome) => (StatusCode::OK, outcome.to_json()),
        Err(e) => {
            error!("[{}] Error processing image: {}", request_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "message": format!("Error processing image: {}", e),
                    "image_key": image.object_key,
                }),
            )
        }
    }
}

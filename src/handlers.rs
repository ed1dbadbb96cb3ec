use std::io::Write;
use std::path::Path;

use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use tempfile::Builder;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::AppError;
use crate::models::{HealthResponse, PredictionResponse};
use crate::predictor::{Classifier, Prediction};

/// Content types accepted for the `file` field, with the suffix the
/// temporary copy gets.
const ALLOWED_TYPES: [(&str, &str); 3] = [
    ("image/jpeg", ".jpg"),
    ("image/jpg", ".jpg"),
    ("image/png", ".png"),
];

const FILE_FIELD: &str = "file";

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::post().to(predict)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/health").route(web::get().to(health)));
}

struct Upload {
    bytes: Vec<u8>,
    suffix: &'static str,
}

pub async fn predict(
    classifier: web::Data<Classifier>,
    limits: web::Data<UploadConfig>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, "classification request");

    let mut upload = None;
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::BadRequest(e.to_string()))?;
        let is_file = field.content_disposition().get_name() == Some(FILE_FIELD);

        if is_file && upload.is_none() {
            upload = Some(read_upload(&mut field, limits.max_bytes).await?);
        } else {
            drain(&mut field).await?;
        }
    }
    let upload = upload.ok_or(AppError::MissingField(FILE_FIELD))?;
    tracing::debug!(%request_id, bytes = upload.bytes.len(), "upload received");

    let classifier = classifier.into_inner();
    let dir = limits.dir.clone();
    let prediction =
        web::block(move || classify_upload(&classifier, &upload, dir.as_deref())).await??;

    tracing::info!(
        %request_id,
        label = %prediction.label,
        confidence = prediction.confidence(),
        "classified"
    );
    Ok(HttpResponse::Ok().json(PredictionResponse::from(prediction)))
}

pub async fn health(classifier: web::Data<Classifier>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        input: classifier.input_spec(),
    })
}

async fn read_upload(field: &mut Field, max_bytes: usize) -> Result<Upload, AppError> {
    let content_type = field.content_type().essence_str().to_string();
    let suffix = ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, suffix)| *suffix)
        .ok_or(AppError::UnsupportedMediaType(content_type))?;

    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| AppError::BadRequest(e.to_string()))?;
        if bytes.len() + data.len() > max_bytes {
            return Err(AppError::PayloadTooLarge { limit: max_bytes });
        }
        bytes.extend_from_slice(&data);
    }
    Ok(Upload { bytes, suffix })
}

async fn drain(field: &mut Field) -> Result<(), AppError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| AppError::BadRequest(e.to_string()))?;
    }
    Ok(())
}

// The temporary file is removed when `tmp` drops, whatever the outcome.
fn classify_upload(
    classifier: &Classifier,
    upload: &Upload,
    dir: Option<&Path>,
) -> Result<Prediction, AppError> {
    let mut builder = Builder::new();
    builder.prefix("upload-").suffix(upload.suffix);
    let mut tmp = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    tmp.write_all(&upload.bytes)?;
    tmp.flush()?;
    classifier.classify_path(tmp.path())
}

use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ErrorBody;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unsupported file type")]
    UnsupportedMediaType(String),

    #[error("File too large")]
    PayloadTooLarge { limit: usize },

    #[error("Missing form field: {0}")]
    MissingField(&'static str),

    #[error("Malformed upload: {0}")]
    BadRequest(String),

    #[error("Invalid image file")]
    InvalidImage(#[from] image::ImageError),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker pool unavailable")]
    Blocking,
}

impl From<BlockingError> for AppError {
    fn from(_: BlockingError) -> Self {
        AppError::Blocking
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) | AppError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            AppError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Inference(_) | AppError::Io(_) | AppError::Blocking => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            AppError::UnsupportedMediaType(mime) => {
                tracing::warn!(content_type = %mime, "rejected upload: {}", self)
            }
            AppError::PayloadTooLarge { limit } => {
                tracing::warn!(limit, "rejected upload: {}", self)
            }
            AppError::InvalidImage(e) => tracing::warn!("rejected upload: {}: {}", self, e),
            _ if status.is_client_error() => tracing::warn!("request failed: {}", self),
            _ => tracing::error!("request failed: {} ({})", self, status),
        }

        HttpResponse::build(status).json(ErrorBody {
            detail: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_upload_rules() {
        assert_eq!(
            AppError::UnsupportedMediaType("text/plain".into()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            AppError::PayloadTooLarge { limit: 10 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::MissingField("file").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Inference("nan".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn detail_messages_are_client_facing() {
        assert_eq!(
            AppError::UnsupportedMediaType("text/plain".into()).to_string(),
            "Unsupported file type"
        );
        assert_eq!(
            AppError::PayloadTooLarge { limit: 1 }.to_string(),
            "File too large"
        );
    }
}

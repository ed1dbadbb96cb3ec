pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod predictor;
pub mod preprocess;
pub mod server;

pub use config::{ModelConfig, ServerConfig, UploadConfig};
pub use error::AppError;
pub use predictor::{Classifier, Prediction, Scorer, TractModel};

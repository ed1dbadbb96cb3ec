use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};

use crate::config::{ServerConfig, UploadConfig};
use crate::handlers;
use crate::predictor::Classifier;

pub fn cors(origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .supports_credentials();

    if origins.iter().any(|o| o == "*") {
        return cors.allow_any_origin();
    }
    origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

pub async fn run(config: ServerConfig, classifier: Classifier) -> std::io::Result<()> {
    let classifier = web::Data::new(classifier);
    let upload = web::Data::new(UploadConfig::from(&config));
    let origins = config.allowed_origins.clone();

    tracing::info!("Server running at http://{}", config.bind);
    tracing::info!("  POST /         - classify an uploaded image");
    tracing::info!("  POST /predict  - same, kept for older clients");
    tracing::info!("  GET  /health   - model input and liveness");

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(cors(&origins))
            .wrap(middleware::Logger::default())
            .app_data(classifier.clone())
            .app_data(upload.clone())
            .configure(handlers::routes)
    });
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    server.bind(&config.bind)?.run().await
}

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use cat_or_loaf::config::{ModelConfig, Normalization, ResizeMode, UploadConfig};
use cat_or_loaf::handlers;
use cat_or_loaf::models::{ErrorBody, Label, PredictionResponse};
use cat_or_loaf::{Classifier, TractModel};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use tract_onnx::prelude::*;

const BOUNDARY: &str = "----catorloafboundary";

/// An identity graph: the score is the first normalized pixel value, so
/// white scores 1.0 (loaf) and black scores 0.0 (cat).
fn identity_classifier() -> Classifier {
    let mut model = TypedModel::default();
    let input = model
        .add_source(
            "input",
            TypedFact::dt_shape(f32::datum_type(), [1usize, 4, 4, 3]),
        )
        .unwrap();
    model.set_output_outlets(&[input]).unwrap();

    let config = ModelConfig {
        model_path: "unused.onnx".into(),
        input_size: None,
        resize: ResizeMode::Stretch,
        normalization: Normalization::Unit,
    };
    Classifier::new(Arc::new(TractModel::from_typed(model).unwrap()), &config)
}

fn png(color: [u8; 3]) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 12, Rgb(color)));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}

fn multipart(field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"upload\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, body: Vec<u8>) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
}

fn limits(max_bytes: usize) -> UploadConfig {
    UploadConfig {
        max_bytes,
        dir: None,
    }
}

macro_rules! app {
    ($upload:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(identity_classifier()))
                .app_data(web::Data::new($upload))
                .configure(handlers::routes),
        )
        .await
    };
}

#[actix_rt::test]
async fn white_image_is_a_loaf() {
    let app = app!(limits(1024 * 1024));
    let req = upload_request("/", multipart("file", "image/png", &png([255, 255, 255])))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: PredictionResponse = test::read_body_json(resp).await;
    assert_eq!(body.label, Label::Loaf);
    assert_eq!(body.confidence, 100.0);
}

#[actix_rt::test]
async fn black_image_is_a_cat() {
    let app = app!(limits(1024 * 1024));
    let req = upload_request(
        "/predict",
        multipart("file", "image/jpeg", &png([0, 0, 0])),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["label"], "cat");
    assert_eq!(body["confidence"], 100.0);
}

#[actix_rt::test]
async fn unsupported_type_is_415() {
    let app = app!(limits(1024 * 1024));
    let req = upload_request("/", multipart("file", "text/plain", b"meow"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!(body.detail, "Unsupported file type");
}

#[actix_rt::test]
async fn oversized_upload_is_413() {
    let app = app!(limits(1024));
    let req = upload_request("/", multipart("file", "image/png", &[0u8; 4096]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!(body.detail, "File too large");
}

#[actix_rt::test]
async fn missing_file_field_is_422() {
    let app = app!(limits(1024 * 1024));
    let req = upload_request("/", multipart("picture", "image/png", &png([0, 0, 0])))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_rt::test]
async fn undecodable_image_is_400() {
    let app = app!(limits(1024 * 1024));
    let req = upload_request("/", multipart("file", "image/png", b"not really a png"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!(body.detail, "Invalid image file");
}

#[actix_rt::test]
async fn health_reports_model_input() {
    let app = app!(limits(1024 * 1024));
    let req = test::TestRequest::get().uri("/health").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "ok");
    assert_eq!(body["input"]["width"], 4);
    assert_eq!(body["input"]["height"], 4);
    assert_eq!(body["input"]["layout"], "nhwc");
}

#[actix_rt::test]
async fn upload_exactly_at_the_limit_is_accepted() {
    let image = png([255, 255, 255]);
    let app = app!(limits(image.len()));
    let req = upload_request("/", multipart("file", "image/jpg", &image)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: PredictionResponse = test::read_body_json(resp).await;
    assert_eq!(body.label, Label::Loaf);
}

#[actix_rt::test]
async fn upload_one_byte_over_the_limit_is_413() {
    let image = png([255, 255, 255]);
    let app = app!(limits(image.len() - 1));
    let req = upload_request("/", multipart("file", "image/png", &image)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

fn entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[actix_rt::test]
async fn temporary_uploads_are_removed_after_each_request() {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().to_path_buf();
    let app = app!(UploadConfig {
        max_bytes: 1024 * 1024,
        dir: Some(upload_dir.clone()),
    });

    let req = upload_request("/", multipart("file", "image/png", &png([0, 0, 0]))).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(entries(&upload_dir).is_empty());

    let req = upload_request("/", multipart("file", "image/png", b"garbage")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(entries(&upload_dir).is_empty());
}

#[actix_rt::test]
async fn missing_upload_dir_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(UploadConfig {
        max_bytes: 1024 * 1024,
        dir: Some(dir.path().join("gone")),
    });

    let req = upload_request("/", multipart("file", "image/png", &png([0, 0, 0]))).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// src/handlers.rs
use crate::{AppState, errors::AnalysisError, models::*};
use actix_multipart::{Field, Multipart};
use actix_web::{Error, HttpResponse, Scope, web};
use bytes::BytesMut;
use futures_util::TryStreamExt;
use serde::Deserialize;
use std::time::Instant;
use uuid::Uuid;

/// Largest raw camera frame accepted: 4K RGBA.
pub const MAX_FRAME_BYTES: usize = 3840 * 2160 * 4;
const MAX_TEXT_FIELD_BYTES: usize = 256;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DataUriBody {
    pub image: String,
    pub fabric: String,
}

#[derive(Debug, Deserialize)]
pub struct FrameQuery {
    pub width: u32,
    pub height: u32,
    pub fabric: String,
    pub session: Option<Uuid>,
}

pub fn api_scope(max_upload_bytes: usize) -> Scope {
    // JSON bodies carry base64, which is 4/3 the size of the image.
    let json_limit = max_upload_bytes / 3 * 4 + 64 * 1024;

    web::scope("/api/v1")
        .app_data(
            web::JsonConfig::default()
                .limit(json_limit)
                .error_handler(|err, _req| invalid_request(err)),
        )
        .app_data(web::QueryConfig::default().error_handler(|err, _req| invalid_request(err)))
        .app_data(web::PayloadConfig::new(MAX_FRAME_BYTES))
        .route("/fabrics", web::get().to(list_fabrics))
        .route("/analyze", web::post().to(analyze_upload))
        .route("/analyze/data-uri", web::post().to(analyze_data_uri))
        .route("/analyze/frame", web::post().to(analyze_frame))
        .route("/sessions/{session_id}", web::delete().to(reset_session))
}

/// Extractor failures get the same JSON error body as every other rejection.
fn invalid_request(err: impl std::fmt::Display) -> Error {
    AnalysisError::InvalidInput(format!("invalid request: {err}")).into()
}

pub async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "metheu",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": data.analyzer.provider(),
        "model": data.analyzer.model_name(),
    }))
}

pub async fn list_fabrics(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.analyzer.fabrics().all())
}

/// Multipart upload: a `fabric` text field and an `image` file field.
pub async fn analyze_upload(
    mut payload: Multipart,
    query: web::Query<SessionQuery>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut fabric = None;
    let mut image = None;

    while let Some(mut field) = payload.try_next().await? {
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();

        match name.as_str() {
            "fabric" => fabric = Some(read_text_field(&mut field).await?),
            "image" | "file" => image = Some(read_image_field(&mut field, &data).await?),
            _ => while field.try_next().await?.is_some() {},
        }
    }

    // A drop with no files is not an error.
    let Some(image) = image else {
        return Ok(HttpResponse::NoContent().finish());
    };
    let fabric = fabric.ok_or_else(|| AnalysisError::InvalidInput("missing `fabric` field".to_string()))?;

    run_analysis(&data, query.session, AnalysisRequest::new(image, fabric)).await
}

pub async fn analyze_data_uri(
    body: web::Json<DataUriBody>,
    query: web::Query<SessionQuery>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let body = body.into_inner();
    let image = data.ingestor.from_data_uri(&body.image)?;
    run_analysis(&data, query.session, AnalysisRequest::new(image, body.fabric)).await
}

/// Raw RGBA pixels of one camera frame, dimensions in the query string.
pub async fn analyze_frame(
    query: web::Query<FrameQuery>,
    body: web::Bytes,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let query = query.into_inner();
    let frame = VideoFrame {
        width: query.width,
        height: query.height,
        rgba: body.to_vec(),
    };
    let image = data.ingestor.from_camera_frame(frame).await?;
    run_analysis(&data, query.session, AnalysisRequest::new(image, query.fabric)).await
}

pub async fn reset_session(path: web::Path<Uuid>, data: web::Data<AppState>) -> HttpResponse {
    let session_id = path.into_inner();
    if data.sessions.reset(&session_id) {
        log::info!("Session {session_id} reset; in-flight analysis will be discarded");
    }
    HttpResponse::NoContent().finish()
}

async fn run_analysis(
    data: &AppState,
    session: Option<Uuid>,
    request: AnalysisRequest,
) -> Result<HttpResponse, Error> {
    // The ticket clears its session entry when dropped, including when the
    // client disconnects and this future is abandoned.
    let ticket = session.map(|id| data.sessions.begin(id));
    let request_id = ticket.as_ref().map_or_else(Uuid::new_v4, |t| t.request_id);
    let start = Instant::now();

    let outcome = data.analyzer.analyze(request).await;

    let outcome = match ticket {
        Some(ticket) => match ticket.finish(outcome) {
            Some(outcome) => outcome,
            None => {
                return Ok(HttpResponse::Conflict().json(serde_json::json!({
                    "error": "Superseded",
                    "message": "a newer analysis was started for this session",
                    "requestId": request_id,
                })));
            }
        },
        None => outcome,
    };
    let order = outcome?;

    let report = AnalysisReport {
        request_id,
        order,
        metadata: AnalysisMetadata {
            processing_time_ms: start.elapsed().as_millis() as u64,
            model_used: data.analyzer.model_name().to_string(),
            provider: data.analyzer.provider().to_string(),
        },
        analyzed_at: chrono::Utc::now(),
    };
    Ok(HttpResponse::Ok().json(&report))
}

async fn read_text_field(field: &mut Field) -> Result<String, Error> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.try_next().await? {
        if buf.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(AnalysisError::InvalidInput("text field is too long".to_string()).into());
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf.to_vec())
        .map(|s| s.trim().to_string())
        .map_err(|_| AnalysisError::InvalidInput("text field is not UTF-8".to_string()).into())
}

async fn read_image_field(field: &mut Field, data: &AppState) -> Result<EncodedImage, Error> {
    // The declared type is checked before a single body byte is read.
    let content_type = field.content_type().map(|m| m.essence_str().to_string());
    data.ingestor.check_declared_type(content_type.as_deref())?;
    let filename = field.content_disposition().get_filename().map(str::to_string);

    let mut buf = BytesMut::new();
    while let Some(chunk) = field.try_next().await? {
        data.ingestor.check_size(buf.len() + chunk.len())?;
        buf.extend_from_slice(&chunk);
    }

    let upload = ImageUpload {
        filename,
        content_type,
        data: buf.freeze(),
    };
    Ok(data.ingestor.from_file(upload)?)
}

// src/models.rs
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Image bytes tagged with their MIME type, ready to send to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    data: Bytes,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.data)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// A file as the user handed it over: declared type plus raw content.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// One still frame from a live camera, RGBA8, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image: EncodedImage,
    pub fabric: String,
}

impl AnalysisRequest {
    pub fn new(image: EncodedImage, fabric: impl Into<String>) -> Self {
        Self {
            image,
            fabric: fabric.into(),
        }
    }
}

/// Validated production order (LSX). Only built by the schema validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionOrder {
    pub order_code: String,
    pub product_type: String,
    pub fabric: String,
    pub theme: String,
    pub details: Vec<MotifEntry>,
    pub total_time_minutes: f64,
    pub palette: Vec<PaletteEntry>,
    pub qc_note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotifEntry {
    pub sequence_number: u32,
    pub motif_name: String,
    pub technique: String,
    pub thread_code: String,
    pub color_name: String,
    pub color_hex: String,
    pub time_minutes: f64,
    pub technical_note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub code: String,
    pub name: String,
    pub hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub request_id: Uuid,
    pub order: ProductionOrder,
    pub metadata: AnalysisMetadata,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub processing_time_ms: u64,
    pub model_used: String,
    pub provider: String,
}

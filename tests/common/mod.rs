#![allow(dead_code)]

use async_trait::async_trait;
use metheu::AppState;
use metheu::services::{DesignAnalyzer, FabricCatalog, ImageIngestor, ModelCall, ModelError, VisionModel};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Stands in for the external model: replies with a fixed answer after an
/// optional delay and counts invocations.
pub struct ScriptedModel {
    reply: Result<String, ModelError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn replying(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.into()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(err: ModelError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(err),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(text: impl Into<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.into()),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-vision-1"
    }

    async fn generate(&self, _call: ModelCall) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }
}

pub fn analyzer(model: Arc<ScriptedModel>, timeout: Duration) -> DesignAnalyzer {
    DesignAnalyzer::new(model, FabricCatalog::default(), timeout)
}

pub fn app_state(model: Arc<ScriptedModel>) -> AppState {
    AppState::new(
        analyzer(model, Duration::from_secs(5)),
        ImageIngestor::default(),
    )
}

/// A well-formed order with `motifs` entries of 40 minutes each.
pub fn order_json(motifs: usize) -> Value {
    let colours = [("321", "Đỏ tươi", "#C50022"), ("3865", "Trắng ngà", "#FAF5EB"), ("E3821", "Vàng kim tuyến", "#D4AF37")];
    let details: Vec<Value> = (0..motifs)
        .map(|i| {
            let (code, name, hex) = colours[i % colours.len()];
            json!({
                "sequenceNumber": i + 1,
                "motifName": format!("Họa tiết {}", i + 1),
                "technique": "Thêu sa",
                "threadCode": code,
                "colorName": name,
                "colorHex": hex,
                "timeMinutes": 40,
                "technicalNote": "Mũi thêu mịn, đều tay"
            })
        })
        .collect();
    let palette: Vec<Value> = colours
        .iter()
        .take(motifs.min(colours.len()))
        .map(|(code, name, hex)| json!({ "code": code, "name": name, "hex": hex }))
        .collect();

    json!({
        "orderCode": "LSX-0425",
        "productType": "Khăn tay",
        "fabric": "Cotton",
        "theme": "Hoa hồng cổ điển",
        "details": details,
        "totalTimeMinutes": 40 * motifs,
        "palette": palette,
        "qcNote": "Kiểm tra độ mịn đường thêu và độ chính xác màu so với thiết kế gốc."
    })
}

/// Bytes that sniff as JPEG, padded to `len`.
pub fn fake_jpeg(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    data.resize(len, 0x5A);
    data
}

pub const BOUNDARY: &str = "metheu-test-boundary";

/// Builds a multipart/form-data body with optional fabric and image parts.
pub fn multipart_body(fabric: Option<&str>, image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(fabric) = fabric {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"fabric\"\r\n\r\n{fabric}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((content_type, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"design.jpg\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

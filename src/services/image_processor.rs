// src/services/image_processor.rs
use crate::errors::AnalysisError;
use crate::models::{EncodedImage, ImageUpload, VideoFrame};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, ImageOutputFormat, RgbaImage};
use log::debug;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Turns uploads, data URIs and camera frames into one `EncodedImage` form.
///
/// Every entry point is a pure function of its input: the same bytes always
/// produce the same `EncodedImage`.
#[derive(Debug, Clone)]
pub struct ImageIngestor {
    max_bytes: usize,
    jpeg_quality: u8,
}

impl Default for ImageIngestor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_JPEG_QUALITY)
    }
}

impl ImageIngestor {
    pub fn new(max_bytes: usize, jpeg_quality: u8) -> Self {
        Self {
            max_bytes,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Rejects anything not declared as `image/*`. Callers run this before
    /// reading the file body.
    pub fn check_declared_type(&self, declared: Option<&str>) -> Result<String, AnalysisError> {
        let essence = declared
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if essence.starts_with("image/") && essence.len() > "image/".len() {
            Ok(essence)
        } else if essence.is_empty() {
            Err(AnalysisError::InvalidInput(
                "file has no declared type; please choose an image".to_string(),
            ))
        } else {
            Err(AnalysisError::InvalidInput(format!(
                "`{essence}` is not an image type; please choose an image"
            )))
        }
    }

    pub fn check_size(&self, len: usize) -> Result<(), AnalysisError> {
        if len > self.max_bytes {
            return Err(AnalysisError::InvalidInput(format!(
                "image is larger than the {} MB limit",
                self.max_bytes / (1024 * 1024)
            )));
        }
        Ok(())
    }

    pub fn from_file(&self, upload: ImageUpload) -> Result<EncodedImage, AnalysisError> {
        let declared = self.check_declared_type(upload.content_type.as_deref())?;
        debug!(
            "Ingesting file {:?} ({}, {} bytes)",
            upload.filename,
            declared,
            upload.data.len()
        );
        self.encode_payload(&declared, upload.data)
    }

    /// Accepts `data:<mime>;base64,<payload>`. A bare base64 string is taken
    /// to be a JPEG.
    pub fn from_data_uri(&self, text: &str) -> Result<EncodedImage, AnalysisError> {
        let text = text.trim();
        let (declared, payload) = match text.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or_else(|| {
                    AnalysisError::InvalidInput("data URI has no payload".to_string())
                })?;
                let mime = header.strip_suffix(";base64").ok_or_else(|| {
                    AnalysisError::InvalidInput("data URI is not base64 encoded".to_string())
                })?;
                (self.check_declared_type(Some(mime))?, payload)
            }
            None => ("image/jpeg".to_string(), text),
        };

        // Reject before decoding; base64 inflates by 4/3.
        self.check_size(payload.len() / 4 * 3)?;

        let data = general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| AnalysisError::InvalidInput(format!("invalid base64 image data: {e}")))?;
        self.encode_payload(&declared, Bytes::from(data))
    }

    /// Rasterises one camera frame to a JPEG still at its native resolution.
    /// Encoding runs on the blocking pool so the caller stays responsive.
    pub async fn from_camera_frame(&self, frame: VideoFrame) -> Result<EncodedImage, AnalysisError> {
        validate_frame(&frame)?;
        let quality = self.jpeg_quality;
        let jpeg = tokio::task::spawn_blocking(move || rasterize(frame, quality))
            .await
            .map_err(|e| AnalysisError::InvalidInput(format!("frame encoding aborted: {e}")))??;
        self.encode_payload("image/jpeg", Bytes::from(jpeg))
    }

    fn encode_payload(&self, declared: &str, data: Bytes) -> Result<EncodedImage, AnalysisError> {
        if data.is_empty() {
            return Err(AnalysisError::InvalidInput("image file is empty".to_string()));
        }
        self.check_size(data.len())?;

        let mime = sniff_mime(&data, declared).ok_or_else(|| {
            AnalysisError::InvalidInput(format!(
                "file declared as {declared} does not contain a recognised image"
            ))
        })?;
        if mime != declared {
            debug!("Declared type {declared} overridden by content sniffing ({mime})");
        }
        Ok(EncodedImage::new(mime, data))
    }
}

fn sniff_mime(data: &[u8], declared: &str) -> Option<String> {
    match image::guess_format(data) {
        Ok(format) => Some(mime_for_format(format).unwrap_or(declared).to_string()),
        // HEIF containers from phones are not decoded here but the model accepts them.
        Err(_) if is_heif(data) && matches!(declared, "image/heic" | "image/heif") => {
            Some(declared.to_string())
        }
        Err(_) => None,
    }
}

fn is_heif(data: &[u8]) -> bool {
    data.len() > 12 && &data[4..8] == b"ftyp"
}

fn mime_for_format(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Tiff => Some("image/tiff"),
        ImageFormat::Avif => Some("image/avif"),
        _ => None,
    }
}

fn validate_frame(frame: &VideoFrame) -> Result<(), AnalysisError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "camera frame has no pixels ({}x{})",
            frame.width, frame.height
        )));
    }
    let expected = frame.width as u64 * frame.height as u64 * 4;
    if frame.rgba.len() as u64 != expected {
        return Err(AnalysisError::InvalidInput(format!(
            "camera frame is {} bytes, expected {expected} for {}x{} RGBA",
            frame.rgba.len(),
            frame.width,
            frame.height
        )));
    }
    Ok(())
}

fn rasterize(frame: VideoFrame, quality: u8) -> Result<Vec<u8>, AnalysisError> {
    let (width, height) = (frame.width, frame.height);
    let rgba = RgbaImage::from_raw(width, height, frame.rgba).ok_or_else(|| {
        AnalysisError::InvalidInput("camera frame buffer does not match its size".to_string())
    })?;
    // JPEG has no alpha channel.
    let still = DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8());

    let mut output = Vec::new();
    still
        .write_to(
            &mut std::io::Cursor::new(&mut output),
            ImageOutputFormat::Jpeg(quality),
        )
        .map_err(|e| AnalysisError::InvalidInput(format!("failed to encode camera frame: {e}")))?;
    Ok(output)
}

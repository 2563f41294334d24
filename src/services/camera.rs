// src/services/camera.rs
//
// Lifecycle for a locally attached camera: one open session at a time, and
// the stream is released once the still is grabbed. The served web UI
// captures in the browser instead; those frames reach the same
// `ImageIngestor::from_camera_frame` through `POST /api/v1/analyze/frame`.
use crate::errors::AnalysisError;
use crate::models::{EncodedImage, VideoFrame};
use crate::services::ImageIngestor;
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A camera that can be opened for a live stream.
///
/// `open` fails with `DeviceUnavailable` when permission is denied or no
/// device exists.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CameraStream>, AnalysisError>;
}

/// An acquired hardware stream. `stop` releases the device and must be
/// idempotent.
#[async_trait]
pub trait CameraStream: Send {
    async fn next_frame(&mut self) -> Result<VideoFrame, AnalysisError>;
    fn stop(&mut self);
}

/// Grants at most one open session at a time for the wrapped device.
pub struct Camera<D> {
    device: D,
    in_use: Arc<AtomicBool>,
}

impl<D: CameraDevice> Camera<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub async fn open(&self) -> Result<CameraSession, AnalysisError> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AnalysisError::DeviceUnavailable(
                "camera is already open".to_string(),
            ));
        }

        // If `open` is abandoned mid-acquisition the claim is handed back.
        let claim = Claim {
            flag: self.in_use.clone(),
            armed: true,
        };
        let stream = self.device.open().await?;
        info!("Camera opened");
        Ok(CameraSession {
            stream: Some(stream),
            in_use: claim.keep(),
        })
    }
}

struct Claim {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Claim {
    fn keep(mut self) -> Arc<AtomicBool> {
        self.armed = false;
        self.flag.clone()
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(false, Ordering::Release);
        }
    }
}

/// An open camera. The stream is released exactly once: by `capture`, by
/// `close`, or when the session is dropped (including a dropped in-flight
/// capture).
pub struct CameraSession {
    stream: Option<Box<dyn CameraStream>>,
    in_use: Arc<AtomicBool>,
}

impl CameraSession {
    /// Grabs one frame, releases the camera, then encodes the still.
    pub async fn capture(mut self, ingestor: &ImageIngestor) -> Result<EncodedImage, AnalysisError> {
        let frame = match self.stream.as_mut() {
            Some(stream) => stream.next_frame().await,
            None => Err(AnalysisError::DeviceUnavailable(
                "camera session already closed".to_string(),
            )),
        };
        self.release();
        ingestor.from_camera_frame(frame?).await
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            self.in_use.store(false, Ordering::Release);
            debug!("Camera released");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

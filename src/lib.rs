// src/lib.rs
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;

use std::sync::Arc;

use crate::config::Config;
use crate::services::llm_service::vision_model_from_config;
use crate::services::{DesignAnalyzer, FabricCatalog, ImageIngestor, SessionTracker};

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<DesignAnalyzer>,
    pub ingestor: Arc<ImageIngestor>,
    pub sessions: Arc<SessionTracker>,
}

impl AppState {
    pub fn new(analyzer: DesignAnalyzer, ingestor: ImageIngestor) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
            ingestor: Arc::new(ingestor),
            sessions: Arc::new(SessionTracker::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let analyzer = DesignAnalyzer::new(
            vision_model_from_config(config),
            FabricCatalog::with_extra(&config.extra_fabrics),
            config.request_timeout,
        );
        let ingestor = ImageIngestor::new(config.max_upload_bytes, config.jpeg_quality);
        Self::new(analyzer, ingestor)
    }
}

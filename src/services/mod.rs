// src/services/mod.rs
pub mod camera;
pub mod fabric;
pub mod gateway;
pub mod image_processor;
pub mod llm_service;
pub mod prompt;
pub mod schema;
pub mod session_tracker;

pub use camera::{Camera, CameraDevice, CameraSession, CameraStream};
pub use fabric::{Fabric, FabricCatalog};
pub use gateway::DesignAnalyzer;
pub use image_processor::ImageIngestor;
pub use llm_service::{GeminiVision, ModelCall, ModelError, OpenAiVision, VisionModel};
pub use session_tracker::{SessionTracker, Ticket};

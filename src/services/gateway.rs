// src/services/gateway.rs
use crate::errors::AnalysisError;
use crate::models::{AnalysisRequest, ProductionOrder};
use crate::services::fabric::FabricCatalog;
use crate::services::llm_service::{ModelCall, VisionModel};
use crate::services::{prompt, schema};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The only path from this service to the external model.
///
/// Holds no per-request state; one instance is shared by all concurrent
/// analyses. Nothing is retried here: callers decide based on
/// [`AnalysisError::is_retryable`].
pub struct DesignAnalyzer {
    model: Arc<dyn VisionModel>,
    fabrics: FabricCatalog,
    timeout: Duration,
}

impl DesignAnalyzer {
    pub fn new(model: Arc<dyn VisionModel>, fabrics: FabricCatalog, timeout: Duration) -> Self {
        Self {
            model,
            fabrics,
            timeout,
        }
    }

    pub fn provider(&self) -> &str {
        self.model.provider()
    }

    pub fn model_name(&self) -> &str {
        self.model.model()
    }

    pub fn fabrics(&self) -> &FabricCatalog {
        &self.fabrics
    }

    /// Checks preconditions and assembles the model invocation. Fails
    /// without touching the network.
    pub fn build_call(&self, request: AnalysisRequest) -> Result<ModelCall, AnalysisError> {
        if request.image.is_empty() {
            return Err(AnalysisError::InvalidInput("image is empty".to_string()));
        }
        let fabric = self.fabrics.resolve(&request.fabric)?;

        Ok(ModelCall {
            system_instruction: prompt::SYSTEM_INSTRUCTION.trim().to_string(),
            prompt: prompt::user_prompt(fabric),
            image: request.image,
            response_schema: schema::response_schema(),
        })
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<ProductionOrder, AnalysisError> {
        let call = self.build_call(request)?;
        let start = Instant::now();
        info!(
            "Analyzing {} byte {} design with {}/{}",
            call.image.len(),
            call.image.mime_type(),
            self.provider(),
            self.model_name()
        );

        let text = match tokio::time::timeout(self.timeout, self.model.generate(call)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                let err = AnalysisError::from(e);
                error!("{} call failed: {}", self.provider(), err);
                return Err(err);
            }
            Err(_) => {
                error!("{} call exceeded {:?}", self.provider(), self.timeout);
                return Err(AnalysisError::UpstreamUnavailable(format!(
                    "no answer within {} seconds",
                    self.timeout.as_secs_f32()
                )));
            }
        };

        let order = schema::parse_order(&text).inspect_err(|e| {
            warn!("Rejected model output: {e}");
        })?;

        info!(
            "Order {} ready: {} motifs, {} palette colours in {} ms",
            order.order_code,
            order.details.len(),
            order.palette.len(),
            start.elapsed().as_millis()
        );
        Ok(order)
    }
}

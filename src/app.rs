use crate::errors::ToolError;
use crate::managers::gateway::GatewayManager;
use crate::managers::mapping::MappingManager;
use crate::mcp::catalog::tool_catalog;
use crate::pipeline::mapping::MappingResolver;
use crate::pipeline::validation::DriftTracker;
use crate::pipeline::Orchestrator;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::logger::Logger;
use crate::services::settings::GatewaySettings;
use crate::services::tool_executor::{ToolExecutor, ToolHandler};
use crate::services::transport::{HttpTransport, ReqwestTransport};
use crate::services::validation::Validation;
use crate::stores::{FileMappingStore, MappingStore, MemoryMappingStore};
use std::collections::HashMap;
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub settings: GatewaySettings,
    pub store: Arc<dyn MappingStore>,
    pub resolver: Arc<MappingResolver>,
    pub breaker: Arc<CircuitBreaker>,
    pub drift: Arc<DriftTracker>,
    pub orchestrator: Arc<Orchestrator>,
    pub tool_executor: Arc<ToolExecutor>,
}

impl App {
    fn validate_tool_wiring(handlers: &HashMap<String, Arc<dyn ToolHandler>>) -> Result<(), ToolError> {
        let mut missing: Vec<String> = tool_catalog()
            .iter()
            .filter(|tool| !handlers.contains_key(&tool.name))
            .map(|tool| tool.name.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ToolError::internal("Tool wiring is incomplete")
            .with_hint("Every tool in tool_catalog.json must have a handler.")
            .with_details(serde_json::json!({ "missing_tools": missing })))
    }

    pub async fn initialize(settings: GatewaySettings) -> Result<Self, ToolError> {
        let logger = Logger::new("gateway");
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(logger.clone())?);
        Self::with_transport(settings, logger, transport).await
    }

    /// Wires the process around an explicit transport.
    pub async fn with_transport(
        settings: GatewaySettings,
        logger: Logger,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ToolError> {
        let validation = Validation::new();

        let store: Arc<dyn MappingStore> = match &settings.store_path {
            Some(path) => Arc::new(FileMappingStore::open(logger.clone(), path).await?),
            None => Arc::new(MemoryMappingStore::new()),
        };
        let resolver = Arc::new(MappingResolver::new(logger.clone(), store.clone()));
        let breaker = Arc::new(CircuitBreaker::new(logger.clone(), settings.circuit));
        let drift = Arc::new(DriftTracker::new(logger.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            logger.clone(),
            store.clone(),
            resolver.clone(),
            breaker.clone(),
            transport,
            drift.clone(),
            settings.clone(),
        ));

        let gateway_manager = Arc::new(GatewayManager::new(
            logger.clone(),
            validation.clone(),
            store.clone(),
            resolver.clone(),
            orchestrator.clone(),
            breaker.clone(),
            drift.clone(),
        ));
        let mapping_manager = Arc::new(MappingManager::new(
            logger.clone(),
            validation,
            store.clone(),
            resolver.clone(),
        ));

        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        handlers.insert("gateway".to_string(), gateway_manager);
        handlers.insert("mappings".to_string(), mapping_manager);

        Self::validate_tool_wiring(&handlers)?;

        let tool_executor = Arc::new(ToolExecutor::new(logger.clone(), handlers));

        logger.info(
            "Gateway initialized",
            Some(&serde_json::json!({
                "store": settings
                    .store_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "memory".to_string()),
                "max_pages": settings.max_pages,
                "max_items": settings.max_items,
            })),
        );

        Ok(Self {
            logger,
            settings,
            store,
            resolver,
            breaker,
            drift,
            orchestrator,
            tool_executor,
        })
    }
}

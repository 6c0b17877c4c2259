use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{
    assistant::Assistant, catalog::CatalogStore, config::AppConfig, faq_resolver::FaqResolver,
    intent::IntentRouter, product_resolver::ProductResolver, vector_store::KnowledgeStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub catalog: Arc<CatalogStore>,
    pub knowledge: Arc<KnowledgeStore>,
    pub assistant: Arc<Assistant>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Estado de la última (o actual) ingesta.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl AppState {
    /// Cablea router y resolvers sobre las stores ya abiertas.
    pub fn new(
        config: AppConfig,
        catalog: Arc<CatalogStore>,
        knowledge: Arc<KnowledgeStore>,
        shutdown_sender: Option<oneshot::Sender<()>>,
    ) -> Self {
        let assistant = Assistant::new(
            IntentRouter::new(config.routing_policy),
            ProductResolver::new(catalog.clone()),
            FaqResolver::new(knowledge.clone(), config.faq_top_k),
        );

        Self {
            config,
            catalog,
            knowledge,
            assistant: Arc::new(assistant),
            status: Arc::new(Mutex::new(Status {
                is_busy: false,
                message: "Servidor listo.".to_string(),
                progress: 0.0,
            })),
            shutdown_sender: Arc::new(Mutex::new(shutdown_sender)),
        }
    }
}

// Módulos de la aplicación
mod api;
mod app_state;
mod assistant;
mod catalog;
mod config;
mod embeddings;
mod error;
mod faq_resolver;
mod ingest;
mod intent;
mod models;
mod product_resolver;
mod vector_store;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    app_state::{AppState, Status},
    catalog::CatalogStore,
    config::AppConfig,
    embeddings::EmbeddingManager,
    ingest::FaqSource,
    vector_store::KnowledgeStore,
};

#[derive(Parser)]
#[command(name = "shopbot", version, about = "Asistente de tienda: FAQ + búsqueda de productos")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Arranca el servidor HTTP (por defecto).
    Serve,
    /// Reconstruye la base de conocimiento FAQ (semilla o CSV `question,answer`).
    IngestFaq {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Importa productos desde un CSV `brand,name,price,rating,url`.
    ImportProducts {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cli = Cli::parse();
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::IngestFaq { csv } => {
            let knowledge = open_knowledge(&cfg);
            let source = FaqSource::from_option(csv.as_deref().or(cfg.faq_csv.as_deref()));
            let summary = ingest::ingest_faq(&knowledge, &source, Arc::new(Mutex::new(Status::default())))
                .await
                .context("Error en la ingesta FAQ")?;
            info!("✅ Colección FAQ construida. {summary}");
            Ok(())
        }
        Command::ImportProducts { csv } => {
            let catalog = CatalogStore::open(&cfg.catalog_db_path).context("Error abriendo el catálogo")?;
            let inserted = ingest::import_products_csv(&catalog, &csv).context("Error importando productos")?;
            info!("✅ {inserted} productos importados.");
            Ok(())
        }
    }
}

fn open_knowledge(cfg: &AppConfig) -> KnowledgeStore {
    KnowledgeStore::open(
        &cfg.knowledge_dir,
        &cfg.faq_collection,
        EmbeddingManager::from_config(cfg),
    )
}

/// Deja la base de conocimiento lista antes de servir: si está vacía o
/// ilegible y `AUTO_INGEST` está activo, se construye una vez.
async fn ensure_faq_ready(cfg: &AppConfig, knowledge: &KnowledgeStore) -> Result<()> {
    let count = match knowledge.count() {
        Ok(n) => n,
        Err(e) => {
            warn!("Base de conocimiento ilegible: {e}");
            0
        }
    };
    if count > 0 {
        info!("Base de conocimiento '{}' lista con {count} entradas.", knowledge.collection());
        return Ok(());
    }

    if !cfg.auto_ingest {
        warn!("Base de conocimiento vacía y AUTO_INGEST desactivado; las preguntas FAQ devolverán 503.");
        return Ok(());
    }

    let source = FaqSource::from_option(cfg.faq_csv.as_deref());
    info!("Base de conocimiento vacía: ingesta inicial desde {source}.");
    let summary = ingest::ingest_faq(knowledge, &source, Arc::new(Mutex::new(Status::default()))).await?;
    info!("{summary}");

    if knowledge.count()? == 0 {
        bail!("La colección FAQ sigue vacía tras la ingesta; revisa la fuente de FAQs.");
    }
    Ok(())
}

async fn serve(cfg: AppConfig) -> Result<()> {
    // 3. Abrir catálogo y asegurar esquema + semilla
    let catalog = CatalogStore::open(&cfg.catalog_db_path).context("Error abriendo el catálogo")?;
    catalog.seed_if_empty().context("Error sembrando el catálogo")?;

    // 4. Abrir la base de conocimiento
    let knowledge = open_knowledge(&cfg);
    ensure_faq_ready(&cfg, &knowledge)
        .await
        .context("La base de conocimiento FAQ no pudo inicializarse")?;

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState::new(cfg.clone(), Arc::new(catalog), Arc::new(knowledge), Some(shutdown_tx));

    // 6. Configurar el router de la API
    let app = Router::new().merge(api::create_router(app_state)).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::select! {
                _ = shutdown_rx => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}

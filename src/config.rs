//! Carga y gestión de configuración de la aplicación (stores + embeddings + router).

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::intent::RoutingPolicy;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Embeddings deterministas calculados en local (sin red).
    Local,
    OpenAI,
}

impl EmbeddingProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" | "hash" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Proveedor de embeddings no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub catalog_db_path: PathBuf,
    pub knowledge_dir: PathBuf,
    pub faq_collection: String,
    /// CSV `question,answer` usado por la ingesta; si falta se usa la semilla.
    pub faq_csv: Option<PathBuf>,
    pub faq_top_k: usize,
    pub auto_ingest: bool,

    pub embedding_provider: EmbeddingProvider,
    pub embedding_model: String,
    pub local_embedding_dim: usize,

    pub routing_policy: RoutingPolicy,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo de una función arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server_addr = get_or("SERVER_ADDR", "127.0.0.1:3322");
        let catalog_db_path = PathBuf::from(get_or("CATALOG_DB_PATH", "data/products.db"));
        let knowledge_dir = PathBuf::from(get_or("KNOWLEDGE_DIR", "data/faq_index"));
        let faq_collection = get_or("FAQ_COLLECTION", "amazon_faqs");
        if faq_collection.is_empty()
            || !faq_collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(anyhow!("FAQ_COLLECTION inválido: '{faq_collection}'"));
        }

        let faq_csv = lookup("FAQ_CSV")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let faq_top_k: usize = get_or("FAQ_TOP_K", "3")
            .parse()
            .map_err(|e| anyhow!("FAQ_TOP_K inválido: {e}"))?;
        if faq_top_k == 0 {
            return Err(anyhow!("FAQ_TOP_K debe ser mayor que 0"));
        }

        let auto_ingest = parse_bool(&get_or("AUTO_INGEST", "true"))
            .ok_or_else(|| anyhow!("AUTO_INGEST debe ser true/false"))?;

        let embedding_provider = EmbeddingProvider::from_str(&get_or("EMBEDDING_PROVIDER", "local"))?;
        let embedding_model = get_or("EMBEDDING_MODEL", "text-embedding-3-small");
        let local_embedding_dim: usize = get_or("LOCAL_EMBEDDING_DIM", "384")
            .parse()
            .map_err(|e| anyhow!("LOCAL_EMBEDDING_DIM inválido: {e}"))?;

        let routing_policy = RoutingPolicy::from_str(&get_or("ROUTING_POLICY", "faq-priority"))?;

        Ok(Self {
            server_addr,
            catalog_db_path,
            knowledge_dir,
            faq_collection,
            faq_csv,
            faq_top_k,
            auto_ingest,
            embedding_provider,
            embedding_model,
            local_embedding_dim,
            routing_policy,
        })
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.server_addr, "127.0.0.1:3322");
        assert_eq!(cfg.faq_collection, "amazon_faqs");
        assert_eq!(cfg.faq_top_k, 3);
        assert!(cfg.auto_ingest);
        assert!(cfg.faq_csv.is_none());
        assert_eq!(cfg.embedding_provider, EmbeddingProvider::Local);
        assert_eq!(cfg.routing_policy, RoutingPolicy::FaqPriority);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config_from(&[
            ("EMBEDDING_PROVIDER", "OpenAI"),
            ("ROUTING_POLICY", "product-priority"),
            ("FAQ_CSV", "faq.csv"),
            ("AUTO_INGEST", "no"),
            ("FAQ_TOP_K", "5"),
        ])
        .unwrap();
        assert_eq!(cfg.embedding_provider, EmbeddingProvider::OpenAI);
        assert_eq!(cfg.routing_policy, RoutingPolicy::ProductPriority);
        assert_eq!(cfg.faq_csv, Some(PathBuf::from("faq.csv")));
        assert!(!cfg.auto_ingest);
        assert_eq!(cfg.faq_top_k, 5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("EMBEDDING_PROVIDER", "gemini")]).is_err());
        assert!(config_from(&[("FAQ_TOP_K", "0")]).is_err());
        assert!(config_from(&[("FAQ_COLLECTION", "../etc")]).is_err());
        assert!(config_from(&[("AUTO_INGEST", "maybe")]).is_err());
    }
}

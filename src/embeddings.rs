//! Abstracción sobre los proveedores de embeddings.
//! `Local` no necesita red; `OpenAI` pasa por Rig.

use crate::config::{AppConfig, EmbeddingProvider};
use crate::error::{AssistantError, Result};

/// Gestor de embeddings. Barato de clonar.
#[derive(Debug, Clone)]
pub struct EmbeddingManager {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub local_dim: usize,
}

impl EmbeddingManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        match cfg.embedding_provider {
            EmbeddingProvider::Local => Self::local(cfg.local_embedding_dim),
            EmbeddingProvider::OpenAI => Self {
                provider: EmbeddingProvider::OpenAI,
                model: cfg.embedding_model.clone(),
                local_dim: cfg.local_embedding_dim,
            },
        }
    }

    /// Manager local con la dimensión indicada (mínimo 8).
    pub fn local(dim: usize) -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            model: String::new(),
            local_dim: dim.max(8),
        }
    }

    /// Identificador del modelo que se guarda en el manifiesto del índice.
    pub fn model_id(&self) -> String {
        match self.provider {
            EmbeddingProvider::Local => format!("local-hash-{}", self.local_dim.max(8)),
            EmbeddingProvider::OpenAI => format!("openai/{}", self.model),
        }
    }

    /// Calcula un embedding por texto, en el mismo orden.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = match self.provider {
            EmbeddingProvider::Local => texts.iter().map(|t| hash_embedding(t, self.local_dim)).collect(),
            EmbeddingProvider::OpenAI => self.embed_with_openai(texts).await?,
        };

        if vectors.len() != texts.len() {
            return Err(AssistantError::Embedding(format!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f64>> {
        self.embed_texts(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AssistantError::Embedding("No se pudo generar embedding de la query".to_string()))
    }

    async fn embed_with_openai(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        use rig::client::EmbeddingsClient as _;
        use rig::embeddings::EmbeddingModel as _;
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};

        let client = openai::Client::from_env();
        let model_name = if self.model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.model.as_str()
        };
        let embedding_model = client.embedding_model(model_name);

        let embeddings = embedding_model
            .embed_texts(texts.to_vec())
            .await
            .map_err(|e| AssistantError::Embedding(e.to_string()))?;

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }
}

/// Bolsa de palabras con hash FNV-1a, normalizada L2.
fn hash_embedding(text: &str, dim: usize) -> Vec<f64> {
    let dim = dim.max(8);
    let mut v = vec![0.0f64; dim];

    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in token.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % dim as u64) as usize] += 1.0;
    }

    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Similitud coseno; 0.0 si las dimensiones no cuadran o algún vector es nulo.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, na, nb) = a
        .iter()
        .zip(b)
        .fold((0.0, 0.0, 0.0), |(d, aa, bb), (x, y)| (d + x * y, aa + x * x, bb + y * y));
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

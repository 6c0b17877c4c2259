//! Errores tipados de las stores, los resolvers y la ingesta.

use thiserror::Error;

/// Error común a catálogo, base de conocimiento e ingesta.
///
/// Que un producto no exista no es un error: eso se modela con
/// `ProductAnswer::Empty`.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Fichero o directorio de la store ausente, ilegible o corrupto.
    #[error("Store no disponible: {0}")]
    StoreUnavailable(String),

    /// La colección existe pero no tiene entradas; hay que re-ingerir.
    #[error("La base de conocimiento '{collection}' está vacía")]
    EmptyKnowledgeBase { collection: String },

    /// Fuente de ingesta sin columnas/campos obligatorios.
    #[error("Entrada de ingesta inválida: {0}")]
    MalformedIngestInput(String),

    /// Registro que viola los invariantes del modelo (precio, rating...).
    #[error("Registro inválido: {0}")]
    InvalidRecord(String),

    #[error("Error generando embeddings: {0}")]
    Embedding(String),

    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for AssistantError {
    fn from(err: rusqlite::Error) -> Self {
        AssistantError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AssistantError {
    fn from(err: serde_json::Error) -> Self {
        AssistantError::StoreUnavailable(format!("JSON corrupto: {err}"))
    }
}

impl AssistantError {
    /// `true` cuando el error indica que la base de conocimiento necesita
    /// (re)construirse.
    pub fn needs_ingestion(&self) -> bool {
        matches!(
            self,
            AssistantError::EmptyKnowledgeBase { .. } | AssistantError::StoreUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;

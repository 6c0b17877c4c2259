//! Resolver FAQ: busca en la base de conocimiento y formatea la respuesta.

use std::sync::Arc;

use tracing::debug;

use crate::error::{AssistantError, Result};
use crate::vector_store::KnowledgeStore;

pub const NOT_FOUND_MESSAGE: &str =
    "I couldn't find that in the FAQ knowledge base yet. Try asking in a different way.";

#[derive(Clone)]
pub struct FaqResolver {
    store: Arc<KnowledgeStore>,
    top_k: usize,
}

impl FaqResolver {
    pub fn new(store: Arc<KnowledgeStore>, top_k: usize) -> Self {
        Self {
            store,
            top_k: top_k.max(1),
        }
    }

    /// Respuesta principal del vecino más cercano, más las respuestas
    /// distintas del resto de vecinos como información relacionada.
    ///
    /// Store ausente o vacía → error tipado; sin vecinos → mensaje fijo.
    pub async fn resolve_faq(&self, text: &str) -> Result<String> {
        if self.store.count()? == 0 {
            return Err(AssistantError::EmptyKnowledgeBase {
                collection: self.store.collection().to_string(),
            });
        }

        let neighbors = self.store.nearest_neighbors(text, self.top_k).await?;
        let Some((best, extras)) = neighbors.split_first() else {
            return Ok(NOT_FOUND_MESSAGE.to_string());
        };
        debug!(id = %best.id, score = best.score, "Mejor coincidencia FAQ");

        let mut out = format!("**Answer (from FAQ):**\n\n{}", best.answer());

        let mut related: Vec<&str> = Vec::new();
        for n in extras {
            let answer = n.answer();
            if answer != best.answer() && !related.contains(&answer) {
                related.push(answer);
            }
        }
        if !related.is_empty() {
            out.push_str("\n\n**Related info:**\n");
            let lines: Vec<String> = related.iter().map(|a| format!("- {a}")).collect();
            out.push_str(&lines.join("\n"));
        }
        Ok(out)
    }
}

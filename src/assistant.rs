//! Cadena de una consulta: router de intención → resolver → respuesta.

use serde::Serialize;
use tracing::info;

use crate::{
    error::Result,
    faq_resolver::FaqResolver,
    intent::{Intent, IntentRouter},
    models::{Product, ProductAnswer},
    product_resolver::ProductResolver,
};

/// Respuesta de un turno de chat.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub intent: Intent,
    /// Texto listo para mostrar (markdown).
    pub answer: String,
    /// Productos estructurados; vacío para FAQ o búsquedas sin resultados.
    pub products: Vec<Product>,
}

#[derive(Clone)]
pub struct Assistant {
    router: IntentRouter,
    products: ProductResolver,
    faq: FaqResolver,
}

impl Assistant {
    pub fn new(router: IntentRouter, products: ProductResolver, faq: FaqResolver) -> Self {
        Self { router, products, faq }
    }

    pub fn products(&self) -> &ProductResolver {
        &self.products
    }

    pub fn faq(&self) -> &FaqResolver {
        &self.faq
    }

    /// Responde un mensaje. Cada llamada es independiente.
    pub async fn answer(&self, question: &str) -> Result<ChatReply> {
        let intent = self.router.route_intent(question);
        info!("Consulta enrutada a {}", intent.as_str());

        match intent {
            Intent::Product => {
                let answer = self.products.resolve_product(question)?;
                Ok(ChatReply {
                    intent,
                    answer: render_products(&answer),
                    products: match answer {
                        ProductAnswer::Results(rows) => rows,
                        ProductAnswer::Empty(_) => Vec::new(),
                    },
                })
            }
            Intent::Faq => Ok(ChatReply {
                intent,
                answer: self.faq.resolve_faq(question).await?,
                products: Vec::new(),
            }),
        }
    }
}

/// Texto markdown para una respuesta de producto.
pub fn render_products(answer: &ProductAnswer) -> String {
    match answer {
        ProductAnswer::Empty(message) => message.clone(),
        ProductAnswer::Results(rows) => {
            let mut out = format!("Here are the top {} results:", rows.len());
            for (i, p) in rows.iter().enumerate() {
                out.push_str(&format!(
                    "\n\n**{}. {}**\n- Brand: {}\n- Price: ${:.2}\n- Rating: {} ⭐",
                    i + 1,
                    p.name,
                    p.brand,
                    p.price,
                    p.rating
                ));
                if !p.url.is_empty() {
                    out.push_str(&format!("\n- Link: {}", p.url));
                }
            }
            out
        }
    }
}

//! Clasificador de intención basado en palabras clave: `faq` o `product`.

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Serialize;

/// Palabras que delatan una pregunta de políticas/FAQ.
pub const FAQ_HINTS: &[&str] = &[
    "refund", "return", "policy", "shipping", "delivery", "warranty", "cancel", "payment", "prime",
];

/// Palabras que delatan una búsqueda de producto.
pub const PRODUCT_HINTS: &[&str] = &[
    "price", "under", "below", "cheap", "best", "top", "recommend", "buy", "link", "amazon", "shoe",
    "shoes", "nike", "adidas", "puma", "laptop", "headphones",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Faq,
    Product,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Faq => "faq",
            Intent::Product => "product",
        }
    }
}

/// Qué lista de palabras clave se evalúa primero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// Las pistas FAQ ganan; luego producto/moneda; por defecto FAQ.
    FaqPriority,
    /// Sólo se miran pistas de producto/moneda; por defecto FAQ.
    ProductPriority,
}

impl RoutingPolicy {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "faq-priority" | "faq" => Ok(Self::FaqPriority),
            "product-priority" | "product" => Ok(Self::ProductPriority),
            other => Err(anyhow!("Política de enrutado no soportada: {other}")),
        }
    }
}

/// Router de intención. Se construye una vez y es puro: mismo texto,
/// misma intención.
#[derive(Debug, Clone)]
pub struct IntentRouter {
    policy: RoutingPolicy,
    currency: Regex,
}

impl IntentRouter {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            policy,
            currency: Regex::new(r"\$\s*\d+|\d+\s*usd").expect("Invalid currency regex"),
        }
    }

    pub fn route_intent(&self, text: &str) -> Intent {
        let t = text.trim().to_lowercase();

        if self.policy == RoutingPolicy::FaqPriority && contains_any(&t, FAQ_HINTS) {
            return Intent::Faq;
        }

        if contains_any(&t, PRODUCT_HINTS) || self.currency.is_match(&t) {
            return Intent::Product;
        }

        Intent::Faq
    }
}

impl Default for IntentRouter {
    fn default() -> Self {
        Self::new(RoutingPolicy::FaqPriority)
    }
}

fn contains_any(text: &str, hints: &[&str]) -> bool {
    hints.iter().any(|hint| text.contains(hint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faq_hints_win_under_faq_priority() {
        let router = IntentRouter::default();
        for text in [
            "What is your refund policy?",
            "can I return my nike shoes under $100?",
            "SHIPPING times",
            "cancel my order",
            "is prime worth it",
        ] {
            assert_eq!(router.route_intent(text), Intent::Faq, "{text}");
        }
    }

    #[test]
    fn brand_with_product_hint_routes_to_product() {
        let router = IntentRouter::default();
        assert_eq!(router.route_intent("best nike running shoes"), Intent::Product);
        assert_eq!(router.route_intent("adidas for 120 usd"), Intent::Product);
        assert_eq!(router.route_intent("something around $ 80"), Intent::Product);
    }

    #[test]
    fn unknown_text_defaults_to_faq() {
        let router = IntentRouter::default();
        assert_eq!(router.route_intent(""), Intent::Faq);
        assert_eq!(router.route_intent("   "), Intent::Faq);
        assert_eq!(router.route_intent("hello there"), Intent::Faq);
    }

    #[test]
    fn product_priority_ignores_faq_hints() {
        let router = IntentRouter::new(RoutingPolicy::ProductPriority);
        assert_eq!(router.route_intent("return my nike shoes"), Intent::Product);
        assert_eq!(router.route_intent("refund policy"), Intent::Faq);
    }

    #[test]
    fn policy_parsing() {
        assert_eq!(RoutingPolicy::from_str("FAQ_PRIORITY").unwrap(), RoutingPolicy::FaqPriority);
        assert_eq!(RoutingPolicy::from_str("product").unwrap(), RoutingPolicy::ProductPriority);
        assert!(RoutingPolicy::from_str("random").is_err());
    }
}

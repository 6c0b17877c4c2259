//! Resolver de productos: texto libre → `ProductFilter` → catálogo.
//!
//! Precedencia del umbral de rating (gana el último aplicado):
//!   1. frase cualitativa (`excellent`, `very good`, `good`),
//!   2. comparación (`above|over|at least|>=` + número),
//!   3. campo explícito (`rating 4.5`, `rating:4`, `rating=4.0`).
//!
//! Un número tras `above|over|at least|>=` es rating si no lleva `$`/`usd` y
//! vale como mucho 5; en otro caso es un precio mínimo.

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::catalog::CatalogStore;
use crate::error::Result;
use crate::models::{Brand, ProductAnswer, ProductFilter, MAX_RATING};

pub const NO_RESULTS_MESSAGE: &str = "No products found. Try another keyword like NIKE / ADIDAS / PUMA.";

const QUALITATIVE_RATINGS: &[(&str, f64)] = &[("excellent", 4.8), ("very good", 4.5), ("good", 4.2)];

const RATING_TRIGGERS: &[&str] = &["above", "over", "at least", ">="];
/// Importe o umbral; admite separadores de miles (`1,250.50`).
const NUMBER: &str = r"(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)";
const NUMBER_WORDS: &[(&str, usize)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];

/// Extrae filtros del texto libre. Las expresiones se compilan una vez.
#[derive(Debug, Clone)]
pub struct ProductQueryParser {
    explicit_rating: Regex,
    lower_bound: Regex,
    upper_bound: Regex,
    top_n: Regex,
    top_word: Regex,
}

impl Default for ProductQueryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductQueryParser {
    pub fn new() -> Self {
        Self {
            explicit_rating: Regex::new(r"\brating\s*[:=]?\s*(\d(?:\.\d+)?)")
                .expect("Invalid rating regex"),
            lower_bound: Regex::new(&format!(
                r"(\babove\b|\bover\b|\bat least\b|\bmore than\b|\bgreater than\b|>=)\s*(\$)?\s*{NUMBER}(\s*usd\b)?"
            ))
            .expect("Invalid lower bound regex"),
            upper_bound: Regex::new(&format!(r"(?:\bunder\b|\bbelow\b|\bless than\b)\s*\$?\s*{NUMBER}"))
                .expect("Invalid upper bound regex"),
            top_n: Regex::new(r"\btop\s*(\d+)").expect("Invalid top regex"),
            top_word: Regex::new(r"\btop\s+([a-z]+)\b").expect("Invalid top word regex"),
        }
    }

    pub fn parse(&self, text: &str) -> ProductFilter {
        let t = text.to_lowercase();
        let mut filter = ProductFilter::default();

        filter.brand = Brand::ALL
            .into_iter()
            .find(|b| t.contains(&b.as_str().to_lowercase()));

        // 1) frase cualitativa
        let mut min_rating = QUALITATIVE_RATINGS
            .iter()
            .find(|(phrase, _)| t.contains(phrase))
            .map(|(_, threshold)| *threshold);

        // 2) comparaciones: rating o precio mínimo, nunca ambos
        for caps in self.lower_bound.captures_iter(&t) {
            let trigger = &caps[1];
            let has_currency = caps.get(2).is_some() || caps.get(4).is_some();
            let Some(value) = parse_number(&caps[3]) else {
                continue;
            };
            if RATING_TRIGGERS.contains(&trigger) && !has_currency && value <= MAX_RATING {
                min_rating = Some(value);
            } else {
                filter.min_price = Some(value);
            }
        }

        // 3) campo explícito
        if let Some(value) = self
            .explicit_rating
            .captures(&t)
            .and_then(|caps| caps[1].parse::<f64>().ok())
        {
            min_rating = Some(value);
        }
        filter.min_rating = min_rating.map(|r| r.clamp(0.0, MAX_RATING));

        if let Some(value) = self
            .upper_bound
            .captures_iter(&t)
            .filter_map(|caps| parse_number(&caps[1]))
            .last()
        {
            filter.max_price = Some(value);
        }

        if let Some(n) = self
            .top_n
            .captures(&t)
            .and_then(|caps| caps[1].parse::<usize>().ok().or(Some(usize::MAX)))
        {
            filter.set_limit(n);
        } else if let Some(n) = self.top_word.captures(&t).and_then(|caps| {
            NUMBER_WORDS
                .iter()
                .find(|(word, _)| *word == &caps[1])
                .map(|(_, n)| *n)
        }) {
            filter.set_limit(n);
        }

        filter
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

/// Resuelve búsquedas de producto contra el catálogo inyectado.
#[derive(Clone)]
pub struct ProductResolver {
    catalog: Arc<CatalogStore>,
    parser: ProductQueryParser,
}

impl ProductResolver {
    pub fn new(catalog: Arc<CatalogStore>) -> Self {
        Self {
            catalog,
            parser: ProductQueryParser::new(),
        }
    }

    pub fn parse(&self, text: &str) -> ProductFilter {
        self.parser.parse(text)
    }

    pub fn resolve_product(&self, text: &str) -> Result<ProductAnswer> {
        self.resolve_filter(&self.parser.parse(text))
    }

    /// Consulta el catálogo con un filtro ya extraído.
    pub fn resolve_filter(&self, filter: &ProductFilter) -> Result<ProductAnswer> {
        debug!(?filter, "Filtro de producto");

        let products = self.catalog.query(filter)?;
        if products.is_empty() {
            return Ok(ProductAnswer::Empty(NO_RESULTS_MESSAGE.to_string()));
        }
        Ok(ProductAnswer::Results(products))
    }
}

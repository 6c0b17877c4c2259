//! Modelos de dominio: productos del catálogo, entradas FAQ y filtros.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, Result};

/// Límite de resultados por defecto de una búsqueda de productos.
pub const DEFAULT_LIMIT: usize = 5;
/// Límite máximo; cualquier valor pedido se recorta a `[1, MAX_LIMIT]`.
pub const MAX_LIMIT: usize = 20;
pub const MAX_RATING: f64 = 5.0;

/// Marcas conocidas por el catálogo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Brand {
    Nike,
    Adidas,
    Puma,
}

impl Brand {
    /// Orden en el que se buscan las marcas dentro del texto.
    pub const ALL: [Brand; 3] = [Brand::Nike, Brand::Adidas, Brand::Puma];

    pub fn as_str(&self) -> &'static str {
        match self {
            Brand::Nike => "NIKE",
            Brand::Adidas => "ADIDAS",
            Brand::Puma => "PUMA",
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fila de la tabla `products`. Inmutable una vez insertada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub brand: String,
    pub name: String,
    pub price: f64,
    pub rating: f64,
    pub url: String,
}

/// Producto aún sin id, tal y como llega de la semilla o de un CSV.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewProduct {
    pub brand: String,
    pub name: String,
    pub price: f64,
    pub rating: f64,
    #[serde(default)]
    pub url: String,
}

impl NewProduct {
    pub fn new(brand: &str, name: &str, price: f64, rating: f64, url: &str) -> Self {
        Self {
            brand: brand.to_string(),
            name: name.to_string(),
            price,
            rating,
            url: url.to_string(),
        }
    }

    /// Comprueba `price >= 0` y `rating ∈ [0, 5]`.
    pub fn validate(&self) -> Result<()> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(AssistantError::InvalidRecord(format!(
                "precio negativo o no numérico para '{}': {}",
                self.name, self.price
            )));
        }
        if !self.rating.is_finite() || !(0.0..=MAX_RATING).contains(&self.rating) {
            return Err(AssistantError::InvalidRecord(format!(
                "rating fuera de [0, 5] para '{}': {}",
                self.name, self.rating
            )));
        }
        if self.name.trim().is_empty() {
            return Err(AssistantError::InvalidRecord("producto sin nombre".to_string()));
        }
        Ok(())
    }
}

/// Criterios de búsqueda construidos por petición a partir del texto libre.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductFilter {
    pub brand: Option<Brand>,
    pub min_rating: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    limit: usize,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            brand: None,
            min_rating: None,
            min_price: None,
            max_price: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ProductFilter {
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.clamp(1, MAX_LIMIT);
    }

    #[cfg(test)]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.set_limit(limit);
        self
    }

    #[cfg(test)]
    pub fn with_brand(mut self, brand: Brand) -> Self {
        self.brand = Some(brand);
        self
    }
}

/// Respuesta del resolver de productos: o bien un mensaje de "sin
/// resultados", o bien la lista ordenada.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProductAnswer {
    Empty(String),
    Results(Vec<Product>),
}

/// Par pregunta/respuesta antes de generar su embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct FaqRecord {
    pub id: String,
    /// Texto que se indexa (pregunta o pasaje).
    pub document: String,
    pub question: String,
    pub answer: String,
    pub source: String,
}

/// Entrada persistida en la base de conocimiento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub id: String,
    pub document: String,
    pub question: String,
    pub answer: String,
    pub embedding: Vec<f64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Vecino devuelto por una búsqueda semántica.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f64,
}

impl Neighbor {
    /// Respuesta almacenada en los metadatos, o el documento si no la hay.
    pub fn answer(&self) -> &str {
        self.metadata
            .get("answer")
            .map(String::as_str)
            .unwrap_or(self.document.as_str())
    }
}

//! Ingesta: reconstruye la base de conocimiento FAQ a partir de la semilla
//! o de un CSV `question,answer`, e importa productos al catálogo.
//!
//! Es una operación administrativa; el camino de consulta sólo lee.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::{
    app_state::Status,
    catalog::CatalogStore,
    error::{AssistantError, Result},
    models::{FaqEntry, FaqRecord, NewProduct},
    vector_store::KnowledgeStore,
};

const EMBED_BATCH: usize = 64;

/// FAQs de ejemplo: (tema, texto).
const SEED_FAQS: &[(&str, &str)] = &[
    (
        "refund_policy",
        "Most items can be returned within the return window shown on your order. \
         Refunds are typically issued after the return is received and processed. \
         During holidays, return windows may be extended for eligible purchases.",
    ),
    (
        "return_process",
        "To return an item: go to Your Orders, choose the item, select Return or Replace Items, \
         choose a reason, select a return method, then print the label or use a QR code drop-off if available.",
    ),
    (
        "shipping",
        "Shipping speed depends on your selected option (Standard, Expedited, Prime) and item availability. \
         The estimated delivery date is shown at checkout and in Your Orders.",
    ),
    (
        "cancellations",
        "You can cancel an order from Your Orders if it hasn't entered the shipping process. \
         If it shipped already, you may need to return it after delivery.",
    ),
    (
        "payment_methods",
        "We accept major credit and debit cards, gift cards and store credit. \
         Payment is charged when your order ships.",
    ),
    (
        "warranty",
        "Warranty coverage is provided by the manufacturer and varies by product. \
         Check the product page or the manufacturer's site for warranty terms.",
    ),
];

/// Origen de los datos de una ingesta FAQ.
#[derive(Debug, Clone, PartialEq)]
pub enum FaqSource {
    Seed,
    Csv(PathBuf),
}

impl FaqSource {
    pub fn from_option(csv: Option<&Path>) -> Self {
        match csv {
            Some(path) => FaqSource::Csv(path.to_path_buf()),
            None => FaqSource::Seed,
        }
    }

    pub fn load(&self) -> Result<(Vec<FaqRecord>, usize)> {
        match self {
            FaqSource::Seed => Ok((seed_records(), 0)),
            FaqSource::Csv(path) => load_faq_csv(path),
        }
    }
}

impl fmt::Display for FaqSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaqSource::Seed => f.write_str("semilla integrada"),
            FaqSource::Csv(path) => write!(f, "CSV {}", path.display()),
        }
    }
}

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Clone)]
pub struct IngestionSummary {
    pub collection: String,
    pub records_read: usize,
    pub records_skipped: usize,
    pub entries_indexed: usize,
    pub dimensions: usize,
}

impl fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resumen: colección '{}', {} registros leídos, {} omitidos, {} entradas indexadas ({} dimensiones).",
            self.collection, self.records_read, self.records_skipped, self.entries_indexed, self.dimensions
        )
    }
}

fn seed_records() -> Vec<FaqRecord> {
    SEED_FAQS
        .iter()
        .map(|(topic, text)| {
            let question = humanize_topic(topic);
            FaqRecord {
                id: topic.to_string(),
                document: format!("{question}: {text}"),
                question,
                answer: text.to_string(),
                source: "faq_seed".to_string(),
            }
        })
        .collect()
}

fn humanize_topic(topic: &str) -> String {
    let spaced = topic.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lee un CSV con columnas `question` y `answer` (en cualquier orden y
/// mayúsculas). Devuelve los registros válidos y cuántas filas se omitieron.
pub fn load_faq_csv(path: &Path) -> Result<(Vec<FaqRecord>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| {
            AssistantError::MalformedIngestInput(format!("no se pudo abrir {}: {e}", path.display()))
        })?;

    let headers = reader
        .headers()
        .map_err(|e| AssistantError::MalformedIngestInput(format!("cabecera ilegible: {e}")))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                AssistantError::MalformedIngestInput(format!(
                    "falta la columna '{name}' en {}",
                    path.display()
                ))
            })
    };
    let q_idx = column("question")?;
    let a_idx = column("answer")?;

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0;

    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            AssistantError::MalformedIngestInput(format!("fila {} ilegible: {e}", row + 2))
        })?;
        let question = record.get(q_idx).unwrap_or("").trim();
        let answer = record.get(a_idx).unwrap_or("").trim();

        if question.is_empty() || answer.is_empty() {
            warn!("Fila {} sin pregunta o respuesta; se omite.", row + 2);
            skipped += 1;
            continue;
        }
        if !seen.insert(question.to_lowercase()) {
            warn!("Pregunta duplicada en la fila {}; se omite: {question}", row + 2);
            skipped += 1;
            continue;
        }

        records.push(FaqRecord {
            id: format!("csv-{:05}", records.len()),
            document: question.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            source: "csv".to_string(),
        });
    }

    if records.is_empty() {
        return Err(AssistantError::MalformedIngestInput(format!(
            "{} no contiene ninguna pregunta/respuesta válida",
            path.display()
        )));
    }
    Ok((records, skipped))
}

fn set_status(status: &Arc<Mutex<Status>>, message: String, progress: f32) {
    if let Ok(mut s) = status.lock() {
        s.message = message;
        s.progress = progress;
    }
}

/// (Re)construye la colección FAQ a partir de `source`.
///
/// Idempotente: con la misma entrada produce el mismo número de entradas,
/// y la generación anterior se sustituye por completo.
pub async fn ingest_faq(
    store: &KnowledgeStore,
    source: &FaqSource,
    status: Arc<Mutex<Status>>,
) -> Result<IngestionSummary> {
    set_status(&status, format!("Leyendo FAQs desde {source}..."), 0.05);
    let (records, skipped) = source.load()?;
    let total = records.len();
    info!("Ingesta FAQ desde {source}: {total} registros válidos, {skipped} omitidos.");

    let mut entries = Vec::with_capacity(total);
    for (batch_idx, batch) in records.chunks(EMBED_BATCH).enumerate() {
        let done = batch_idx * EMBED_BATCH;
        set_status(
            &status,
            format!("Generando embeddings [{}/{}]...", (done + batch.len()).min(total), total),
            0.1 + 0.8 * (done as f32 / total as f32),
        );

        let docs: Vec<String> = batch.iter().map(|r| r.document.clone()).collect();
        let vectors = store.embeddings().embed_texts(&docs).await?;

        for (record, embedding) in batch.iter().zip(vectors) {
            let metadata = BTreeMap::from([
                ("answer".to_string(), record.answer.clone()),
                ("source".to_string(), record.source.clone()),
            ]);
            entries.push(FaqEntry {
                id: record.id.clone(),
                document: record.document.clone(),
                question: record.question.clone(),
                answer: record.answer.clone(),
                embedding,
                metadata,
            });
        }
    }

    set_status(&status, "Publicando la nueva generación del índice...".to_string(), 0.95);
    let manifest = store.rebuild(&entries)?;
    set_status(&status, "Ingesta completada.".to_string(), 1.0);

    Ok(IngestionSummary {
        collection: manifest.collection,
        records_read: total + skipped,
        records_skipped: skipped,
        entries_indexed: manifest.count,
        dimensions: manifest.dimensions,
    })
}

/// Importa productos desde un CSV `brand,name,price,rating,url`.
/// Todo o nada: una fila inválida aborta la importación.
pub fn import_products_csv(catalog: &CatalogStore, path: &Path) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| {
            AssistantError::MalformedIngestInput(format!("no se pudo abrir {}: {e}", path.display()))
        })?;

    let mut products = Vec::new();
    for (row, result) in reader.deserialize::<NewProduct>().enumerate() {
        let product = result.map_err(|e| {
            AssistantError::MalformedIngestInput(format!("fila {} inválida: {e}", row + 2))
        })?;
        products.push(product);
    }
    if products.is_empty() {
        return Err(AssistantError::MalformedIngestInput(format!(
            "{} no contiene productos",
            path.display()
        )));
    }

    let inserted = catalog.insert_products(&products)?;
    info!("Importados {inserted} productos desde {}.", path.display());
    Ok(inserted)
}

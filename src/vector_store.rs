//! Base de conocimiento FAQ persistida como índice vectorial local.
//!
//! Estructura en disco:
//!   - `<dir>/<colección>/CURRENT`: nombre de la generación activa.
//!   - `<dir>/<colección>/gen-<uuid>/entries.jsonl`: una `FaqEntry` por línea.
//!   - `<dir>/<colección>/gen-<uuid>/manifest.json`: modelo, dimensiones, nº de entradas.
//!
//! `rebuild` escribe una generación nueva, la valida y sólo entonces
//! cambia `CURRENT` con un rename atómico.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::embeddings::{cosine_similarity, EmbeddingManager};
use crate::error::{AssistantError, Result};
use crate::models::{FaqEntry, Neighbor};

const CURRENT_FILE: &str = "CURRENT";
const ENTRIES_FILE: &str = "entries.jsonl";
const MANIFEST_FILE: &str = "manifest.json";
const GENERATION_PREFIX: &str = "gen-";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub collection: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub count: usize,
    pub created_at: DateTime<Utc>,
}

/// Generación cargada en memoria.
struct LoadedGeneration {
    name: String,
    entries: Arc<Vec<FaqEntry>>,
}

/// Handle de la base de conocimiento. Lectura concurrente; la reconstrucción
/// es una operación administrativa aparte.
pub struct KnowledgeStore {
    collection_dir: PathBuf,
    collection: String,
    embeddings: EmbeddingManager,
    cache: RwLock<Option<LoadedGeneration>>,
}

impl KnowledgeStore {
    pub fn open(root: &Path, collection: &str, embeddings: EmbeddingManager) -> Self {
        Self {
            collection_dir: root.join(collection),
            collection: collection.to_string(),
            embeddings,
            cache: RwLock::new(None),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn embeddings(&self) -> &EmbeddingManager {
        &self.embeddings
    }

    /// Nombre de la generación activa, o `None` si nunca se construyó.
    fn current_generation(&self) -> Result<Option<String>> {
        let pointer = self.collection_dir.join(CURRENT_FILE);
        match fs::read_to_string(&pointer) {
            Ok(name) => {
                let name = name.trim().to_string();
                if name.starts_with(GENERATION_PREFIX) && !name.contains(['/', '\\']) {
                    Ok(Some(name))
                } else {
                    Err(AssistantError::StoreUnavailable(format!(
                        "puntero de generación corrupto en {}",
                        pointer.display()
                    )))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AssistantError::StoreUnavailable(format!(
                "no se pudo leer {}: {e}",
                pointer.display()
            ))),
        }
    }

    /// Entradas de la generación activa, recargando si `CURRENT` cambió.
    fn entries(&self) -> Result<Arc<Vec<FaqEntry>>> {
        let Some(generation) = self.current_generation()? else {
            return Ok(Arc::new(Vec::new()));
        };

        if let Ok(cache) = self.cache.read() {
            if let Some(loaded) = cache.as_ref().filter(|l| l.name == generation) {
                return Ok(loaded.entries.clone());
            }
        }

        let entries = Arc::new(self.load_generation(&generation)?);
        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(LoadedGeneration {
                name: generation.clone(),
                entries: entries.clone(),
            });
        }
        info!(
            "Colección '{}' cargada (generación {generation}, {} entradas).",
            self.collection,
            entries.len()
        );
        Ok(entries)
    }

    fn load_generation(&self, generation: &str) -> Result<Vec<FaqEntry>> {
        let dir = self.collection_dir.join(generation);
        let manifest = read_manifest(&dir)?;
        let entries = read_entries(&dir)?;

        if manifest.count != entries.len() {
            return Err(AssistantError::StoreUnavailable(format!(
                "generación {generation} corrupta: el manifiesto declara {} entradas y hay {}",
                manifest.count,
                entries.len()
            )));
        }
        if manifest.embedding_model != self.embeddings.model_id() {
            warn!(
                "La colección '{}' se construyó con '{}' y ahora se usa '{}'; conviene re-ingerir.",
                self.collection,
                manifest.embedding_model,
                self.embeddings.model_id()
            );
        }
        Ok(entries)
    }

    /// Número de entradas de la generación activa (0 si no existe).
    pub fn count(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    /// Los `k` vecinos más cercanos a `query_text` por similitud coseno.
    pub async fn nearest_neighbors(&self, query_text: &str, k: usize) -> Result<Vec<Neighbor>> {
        let entries = self.entries()?;
        if entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embeddings.embed_query(query_text).await?;
        Ok(rank(&query_vec, &entries, k))
    }

    /// Sustituye el contenido de la colección por `entries`.
    ///
    /// Si algo falla antes del cambio de puntero, la generación anterior
    /// sigue activa y el directorio parcial se elimina.
    pub fn rebuild(&self, entries: &[FaqEntry]) -> Result<Manifest> {
        if entries.is_empty() {
            return Err(AssistantError::MalformedIngestInput(
                "no hay entradas que indexar".to_string(),
            ));
        }
        fs::create_dir_all(&self.collection_dir)?;

        let generation = format!("{GENERATION_PREFIX}{}", Uuid::new_v4().simple());
        let gen_dir = self.collection_dir.join(&generation);

        let manifest = match self.write_generation(&gen_dir, entries) {
            Ok(manifest) => manifest,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&gen_dir) {
                    warn!("No se pudo limpiar {}: {cleanup}", gen_dir.display());
                }
                return Err(e);
            }
        };

        // Puntero temporal por generación.
        let tmp_pointer = self.collection_dir.join(format!("{CURRENT_FILE}.{generation}.tmp"));
        fs::write(&tmp_pointer, &generation)?;
        fs::rename(&tmp_pointer, self.collection_dir.join(CURRENT_FILE))?;
        info!(
            "Colección '{}' reconstruida: generación {generation} con {} entradas.",
            self.collection, manifest.count
        );

        self.cleanup_after_publish(&generation);
        Ok(manifest)
    }

    /// Borra las generaciones antiguas sólo si `generation` sigue siendo la
    /// activa; si otra reconstrucción publicó después, no se toca nada.
    fn cleanup_after_publish(&self, generation: &str) {
        match self.current_generation() {
            Ok(Some(current)) if current == generation => self.remove_stale_generations(generation),
            Ok(current) => warn!(
                "La generación {generation} fue sustituida por {current:?}; no se borran generaciones."
            ),
            Err(e) => warn!("No se pudo releer el puntero tras publicar {generation}: {e}"),
        }
    }

    fn write_generation(&self, gen_dir: &Path, entries: &[FaqEntry]) -> Result<Manifest> {
        fs::create_dir_all(gen_dir)?;

        let file = File::create(gen_dir.join(ENTRIES_FILE))?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        let manifest = Manifest {
            collection: self.collection.clone(),
            embedding_model: self.embeddings.model_id(),
            dimensions: entries.first().map(|e| e.embedding.len()).unwrap_or(0),
            count: entries.len(),
            created_at: Utc::now(),
        };
        fs::write(gen_dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;

        // Validar releyendo antes de publicar.
        let reread = read_entries(gen_dir)?;
        if reread.is_empty() || reread.len() != entries.len() {
            return Err(AssistantError::StoreUnavailable(format!(
                "validación fallida: escritas {} entradas, releídas {}",
                entries.len(),
                reread.len()
            )));
        }
        Ok(manifest)
    }

    fn remove_stale_generations(&self, keep: &str) {
        let Ok(dir) = fs::read_dir(&self.collection_dir) else {
            return;
        };
        for entry in dir.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(GENERATION_PREFIX) && name != keep {
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    warn!("No se pudo borrar la generación antigua {name}: {e}");
                }
            }
        }
    }
}

fn read_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let raw = fs::read(&path).map_err(|e| {
        AssistantError::StoreUnavailable(format!("no se pudo leer {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_slice(&raw)?)
}

fn read_entries(dir: &Path) -> Result<Vec<FaqEntry>> {
    let path = dir.join(ENTRIES_FILE);
    let file = File::open(&path).map_err(|e| {
        AssistantError::StoreUnavailable(format!("no se pudo abrir {}: {e}", path.display()))
    })?;

    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str::<FaqEntry>(&line)?);
    }
    Ok(entries)
}

/// Ordena por score descendente; a igualdad, se respeta el orden de ingesta.
fn rank(query_vec: &[f64], entries: &[FaqEntry], k: usize) -> Vec<Neighbor> {
    let mut scored: Vec<(usize, f64)> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (i, cosine_similarity(query_vec, &e.embedding)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    scored
        .into_iter()
        .take(k)
        .map(|(i, score)| {
            let entry = &entries[i];
            let mut metadata = entry.metadata.clone();
            metadata
                .entry("answer".to_string())
                .or_insert_with(|| entry.answer.clone());
            Neighbor {
                id: entry.id.clone(),
                document: entry.document.clone(),
                metadata,
                score,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entry(id: &str, document: &str, answer: &str, embedding: Vec<f64>) -> FaqEntry {
        FaqEntry {
            id: id.to_string(),
            document: document.to_string(),
            question: document.to_string(),
            answer: answer.to_string(),
            embedding,
            metadata: BTreeMap::from([("source".to_string(), "test".to_string())]),
        }
    }

    async fn embedded(manager: &EmbeddingManager, pairs: &[(&str, &str)]) -> Vec<FaqEntry> {
        let docs: Vec<String> = pairs.iter().map(|(q, _)| q.to_string()).collect();
        let vectors = manager.embed_texts(&docs).await.unwrap();
        pairs
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, ((q, a), v))| entry(&format!("faq-{i}"), q, a, v))
            .collect()
    }

    #[test]
    fn missing_collection_counts_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), "faqs", EmbeddingManager::local(32));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn corrupt_pointer_is_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), "faqs", EmbeddingManager::local(32));
        fs::create_dir_all(dir.path().join("faqs")).unwrap();
        fs::write(dir.path().join("faqs").join(CURRENT_FILE), "../../etc").unwrap();
        assert!(matches!(store.count(), Err(AssistantError::StoreUnavailable(_))));
    }

    #[test]
    fn missing_generation_dir_is_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), "faqs", EmbeddingManager::local(32));
        store
            .rebuild(&[entry("a", "doc", "answer", vec![1.0, 0.0])])
            .unwrap();
        let generation = store.current_generation().unwrap().unwrap();
        fs::remove_dir_all(dir.path().join("faqs").join(generation)).unwrap();

        let fresh = KnowledgeStore::open(dir.path(), "faqs", EmbeddingManager::local(32));
        assert!(matches!(fresh.count(), Err(AssistantError::StoreUnavailable(_))));
    }

    #[test]
    fn rebuild_replaces_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), "faqs", EmbeddingManager::local(32));

        store
            .rebuild(&[
                entry("a", "a", "A", vec![1.0, 0.0]),
                entry("b", "b", "B", vec![0.0, 1.0]),
            ])
            .unwrap();
        assert_eq!(store.count().unwrap(), 2);

        store.rebuild(&[entry("c", "c", "C", vec![1.0, 1.0])]).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let generations: Vec<_> = fs::read_dir(dir.path().join("faqs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(GENERATION_PREFIX))
            .collect();
        assert_eq!(generations.len(), 1);
    }

    #[test]
    fn superseded_generation_does_not_clean_up() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("faqs");
        let store = KnowledgeStore::open(dir.path(), "faqs", EmbeddingManager::local(32));
        store.rebuild(&[entry("a", "a", "A", vec![1.0])]).unwrap();
        let ours = store.current_generation().unwrap().unwrap();

        // Otro proceso publica su propia generación antes de nuestra limpieza.
        let theirs = format!("{GENERATION_PREFIX}other");
        store
            .write_generation(&root.join(&theirs), &[entry("b", "b", "B", vec![1.0]), entry("c", "c", "C", vec![0.5])])
            .unwrap();
        fs::write(root.join(CURRENT_FILE), &theirs).unwrap();

        store.cleanup_after_publish(&ours);
        assert!(root.join(&ours).exists());
        assert!(root.join(&theirs).exists());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn rebuild_leaves_no_temporary_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), "faqs", EmbeddingManager::local(32));
        store.rebuild(&[entry("a", "a", "A", vec![1.0])]).unwrap();
        store.rebuild(&[entry("b", "b", "B", vec![1.0])]).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("faqs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn empty_rebuild_keeps_old_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), "faqs", EmbeddingManager::local(32));
        store.rebuild(&[entry("a", "a", "A", vec![1.0])]).unwrap();

        let err = store.rebuild(&[]).unwrap_err();
        assert!(matches!(err, AssistantError::MalformedIngestInput(_)));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn manifest_describes_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), "faqs", EmbeddingManager::local(16));
        let manifest = store
            .rebuild(&[entry("a", "a", "A", vec![0.5; 16])])
            .unwrap();
        assert_eq!(manifest.collection, "faqs");
        assert_eq!(manifest.dimensions, 16);
        assert_eq!(manifest.count, 1);
        assert_eq!(manifest.embedding_model, "local-hash-16");
    }

    #[tokio::test]
    async fn nearest_neighbors_ranks_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EmbeddingManager::local(384);
        let store = KnowledgeStore::open(dir.path(), "faqs", manager.clone());
        let entries = embedded(
            &manager,
            &[
                ("How long does shipping take?", "3-5 business days"),
                ("What is the return window?", "30 days"),
                ("Can I cancel my order?", "Yes, before it ships"),
            ],
        )
        .await;
        store.rebuild(&entries).unwrap();

        let hits = store.nearest_neighbors("return window", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "faq-1");
        assert_eq!(hits[0].answer(), "30 days");
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].metadata.get("source").map(String::as_str), Some("test"));
    }

    #[tokio::test]
    async fn empty_store_returns_no_neighbors() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), "faqs", EmbeddingManager::local(32));
        assert!(store.nearest_neighbors("anything", 3).await.unwrap().is_empty());
    }
}

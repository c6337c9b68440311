//! Self-reinforcing knowledge cache
//!
//! Previously answered questions with their embeddings. A new utterance is
//! resolved by nearest-neighbour cosine similarity; entries close to but
//! below the hit threshold become reference passages for the generative
//! fallback. Every failure in here is recovered by the caller.

pub mod embedder;
pub mod ranking;
pub mod similarity;
pub mod sqlite;
pub mod store;

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::CacheSettings;
use crate::error::CacheResult;
use crate::i18n;
use crate::language::Language;
use crate::safety::{contains_identifier, redact};

pub use embedder::{Embedder, HashingEmbedder, OpenAiEmbedder};
pub use similarity::cosine_similarity;
pub use sqlite::SqliteKnowledgeStore;
pub use store::{KnowledgeEntry, KnowledgeStore, MemoryKnowledgeStore, NewEntry, QueryLogEntry};

/// An entry together with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMatch {
    pub entry: KnowledgeEntry,
    pub similarity: f32,
}

/// Outcome of one lookup
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    /// Best entry at or above the hit threshold
    pub hit: Option<CacheMatch>,
    /// Entries between the reference and hit thresholds, best first
    pub references: Vec<CacheMatch>,
    /// Query embedding, reused by the cache writer
    pub embedding: Option<Vec<f32>>,
}

/// Suggested question surfaced by trending promotion
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingQuestion {
    pub id: i64,
    pub question: String,
    pub score: u32,
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Rank `entries` against `query`; entries of another dimensionality are
/// skipped.
pub fn rank_entries(query: &[f32], entries: Vec<KnowledgeEntry>) -> Vec<CacheMatch> {
    let mut matches: Vec<CacheMatch> = entries
        .into_iter()
        .filter(|e| e.embedding.len() == query.len() && !query.is_empty())
        .map(|entry| {
            let similarity = cosine_similarity(query, &entry.embedding);
            CacheMatch { entry, similarity }
        })
        .collect();
    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    matches
}

#[derive(Clone)]
pub struct KnowledgeCache {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    settings: CacheSettings,
}

impl std::fmt::Debug for KnowledgeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeCache")
            .field("embedder", &self.embedder.model())
            .field("threshold", &self.settings.similarity_threshold)
            .finish()
    }
}

impl KnowledgeCache {
    pub fn new(store: Arc<dyn KnowledgeStore>, embedder: Arc<dyn Embedder>, settings: CacheSettings) -> Self {
        Self {
            store,
            embedder,
            settings,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub fn embedder_model(&self) -> &str {
        self.embedder.model()
    }

    pub async fn embed(&self, text: &str) -> CacheResult<Vec<f32>> {
        self.embedder.embed(text).await
    }

    /// Best entry of `language` with similarity at or above `threshold`
    pub async fn find_best_match(
        &self,
        language: Language,
        vector: &[f32],
        threshold: f32,
    ) -> CacheResult<Option<CacheMatch>> {
        let entries = self.store.entries(language).await?;
        Ok(rank_entries(vector, entries)
            .into_iter()
            .next()
            .filter(|m| m.similarity >= threshold))
    }

    /// Embed the utterance and look it up. Embedding or store failures are
    /// logged and produce an empty lookup.
    pub async fn lookup(&self, language: Language, utterance: &str) -> Lookup {
        let embedding = match self.embed(utterance).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Embedding failed, skipping knowledge cache");
                return Lookup::default();
            }
        };

        let entries = match self.store.entries(language).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Knowledge store unavailable, skipping knowledge cache");
                return Lookup {
                    embedding: Some(embedding),
                    ..Default::default()
                };
            }
        };

        let threshold = self.settings.similarity_threshold;
        let mut ranked = rank_entries(&embedding, entries).into_iter();
        let mut lookup = Lookup::default();

        if let Some(best) = ranked.next() {
            if best.similarity >= threshold {
                debug!(id = best.entry.id, similarity = best.similarity, "Knowledge cache hit");
                lookup.hit = Some(best);
            } else if best.similarity >= self.settings.reference_threshold {
                lookup.references.push(best);
            }
        }
        if lookup.hit.is_none() {
            lookup.references.extend(
                ranked
                    .take_while(|m| m.similarity >= self.settings.reference_threshold)
                    .take(self.settings.max_references.saturating_sub(lookup.references.len())),
            );
        }
        lookup.embedding = Some(embedding);
        lookup
    }

    /// Record a use of an entry; failures are logged
    pub async fn touch(&self, id: i64) {
        if let Err(e) = self.store.touch(id, now_secs()).await {
            warn!(id, error = %e, "Could not update entry usage");
        }
    }

    /// Persist a fresh generative answer, embedding the question when no
    /// vector is supplied. The stored question is redacted. Returns the new
    /// entry id.
    pub async fn remember(
        &self,
        language: Language,
        question: &str,
        answer: &str,
        embedding: Option<Vec<f32>>,
    ) -> CacheResult<i64> {
        let embedding = match embedding {
            Some(v) => v,
            None => self.embed(question).await?,
        };
        self.store
            .insert(NewEntry {
                language,
                question: redact(question),
                answer: answer.to_string(),
                embedding,
                created_at: now_secs(),
            })
            .await
    }

    /// Append a redacted query log entry; failures are logged
    pub async fn log_query(&self, language: Language, utterance: &str, matched: Option<i64>) {
        let entry = QueryLogEntry {
            language,
            text: redact(utterance),
            matched_entry: matched,
            created_at: now_secs(),
        };
        if let Err(e) = self.store.log_query(entry).await {
            warn!(error = %e, "Could not write query log");
        }
    }

    /// Adjust the vote of an entry by one and return the new score
    pub async fn vote(&self, id: i64, up: bool) -> CacheResult<u32> {
        self.store.vote(id, if up { 1 } else { -1 }).await
    }

    /// Top entries of `language` by trending score. Questions that carried
    /// a personal identifier are never promoted.
    pub async fn trending(&self, language: Language, limit: usize) -> CacheResult<Vec<TrendingQuestion>> {
        let now = now_secs();
        let entries: Vec<KnowledgeEntry> = self
            .store
            .entries(language)
            .await?
            .into_iter()
            .filter(|e| !contains_identifier(&e.question))
            .collect();
        Ok(ranking::top_trending(entries, now, limit)
            .into_iter()
            .map(|e| TrendingQuestion {
                id: e.id,
                score: ranking::trending_score(e.votes, e.last_used_at, now),
                question: e.question,
            })
            .collect())
    }

    /// Suggested questions: trending entries, topped up with the built-in
    /// suggestions when the cache is small or unavailable
    pub async fn suggestions(&self, language: Language) -> Vec<String> {
        let limit = self.settings.trending_limit;
        let mut out: Vec<String> = match self.trending(language, limit).await {
            Ok(top) => top.into_iter().map(|t| t.question).collect(),
            Err(e) => {
                warn!(error = %e, "Could not rank trending questions");
                Vec::new()
            }
        };
        for s in i18n::default_suggestions(language) {
            if out.len() >= limit {
                break;
            }
            if !out.iter().any(|q| q == s) {
                out.push((*s).to_string());
            }
        }
        out
    }

    /// Insert `(question, answer)` pairs with embeddings; returns how many
    pub async fn seed(&self, language: Language, pairs: &[(&str, &str)]) -> CacheResult<usize> {
        for (question, answer) in pairs {
            self.remember(language, question, answer, None).await?;
        }
        Ok(pairs.len())
    }

    /// Whether the store answers at all
    pub async fn is_ready(&self) -> bool {
        self.store.count().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(threshold: f32) -> KnowledgeCache {
        let settings = CacheSettings {
            similarity_threshold: threshold,
            hashing_dimension: 64,
            ..Default::default()
        };
        KnowledgeCache::new(
            Arc::new(MemoryKnowledgeStore::new()),
            Arc::new(HashingEmbedder::new(64)),
            settings,
        )
    }

    #[tokio::test]
    async fn test_store_then_query_hits() {
        let cache = cache_with(0.82);
        let id = cache
            .remember(Language::Sv, "När får jag betalt?", "Efter att fakturan betalats.", None)
            .await
            .unwrap();

        let lookup = cache.lookup(Language::Sv, "När får jag betalt?").await;
        let hit = lookup.hit.unwrap();
        assert_eq!(hit.entry.id, id);
        assert!(hit.similarity >= 0.82);

        // Other languages never match
        assert!(cache.lookup(Language::En, "När får jag betalt?").await.hit.is_none());
    }

    #[tokio::test]
    async fn test_threshold_above_best_is_a_miss() {
        let cache = cache_with(0.82);
        cache
            .remember(Language::Sv, "När får jag betalt?", "Efter att fakturan betalats.", None)
            .await
            .unwrap();
        let query = cache.embed("När får jag betalt för uppdraget?").await.unwrap();
        let best = cache
            .find_best_match(Language::Sv, &query, 0.0)
            .await
            .unwrap()
            .unwrap();

        let above = (best.similarity + 0.01).min(1.0);
        assert!(cache
            .find_best_match(Language::Sv, &query, above)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mismatched_dimensions_are_skipped() {
        let cache = cache_with(0.5);
        cache
            .store()
            .insert(NewEntry {
                language: Language::Sv,
                question: "gammal".into(),
                answer: "gammal".into(),
                embedding: vec![1.0, 0.0, 0.0],
                created_at: 0,
            })
            .await
            .unwrap();
        let query = cache.embed("gammal").await.unwrap();
        assert!(cache.find_best_match(Language::Sv, &query, 0.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_references_between_thresholds() {
        let settings = CacheSettings {
            similarity_threshold: 0.95,
            reference_threshold: 0.5,
            max_references: 2,
            ..Default::default()
        };
        let cache = KnowledgeCache::new(
            Arc::new(MemoryKnowledgeStore::new()),
            Arc::new(HashingEmbedder::new(256)),
            settings,
        );
        for q in ["Vad kostar det?", "Vad kostar det per år?", "Vad kostar det per månad?"] {
            cache.remember(Language::Sv, q, "svar", None).await.unwrap();
        }
        let query = cache.embed("Vad kostar det per vecka?").await.unwrap();
        let lookup = cache.lookup(Language::Sv, "Vad kostar det per vecka?").await;
        assert!(lookup.hit.is_none());
        assert!(lookup.references.len() <= 2);
        assert_eq!(lookup.embedding.as_deref(), Some(query.as_slice()));
        for r in &lookup.references {
            assert!(r.similarity >= 0.5 && r.similarity < 0.95);
        }
    }

    #[tokio::test]
    async fn test_query_log_is_redacted() {
        let cache = cache_with(0.82);
        cache
            .log_query(Language::Sv, "Mejla mig på anna@example.se", None)
            .await;
        let log = cache.store().recent_queries(1).await.unwrap();
        assert_eq!(log[0].text, "Mejla mig på [email]");
    }

    #[tokio::test]
    async fn test_identifiers_never_reach_suggestions() {
        let cache = cache_with(0.82);
        let question = "Kan ni ringa mig på 070-123 45 67 eller maila anna.svensson@example.com om bemanning?";
        let id = cache.remember(Language::Sv, question, "Absolut.", None).await.unwrap();
        cache.vote(id, true).await.unwrap();

        let stored = &cache.store().entries(Language::Sv).await.unwrap()[0];
        assert!(!stored.question.contains("070-123"));
        assert!(!stored.question.contains("anna.svensson"));

        let suggestions = cache.suggestions(Language::Sv).await;
        assert!(suggestions.iter().all(|s| !s.contains("070") && !s.contains('@') && !s.contains("[phone]")));
        assert_eq!(suggestions.len(), 4);
    }

    #[tokio::test]
    async fn test_suggestions_fall_back_to_defaults() {
        let cache = cache_with(0.82);
        let suggestions = cache.suggestions(Language::En).await;
        assert_eq!(suggestions.len(), 4);
        assert_eq!(suggestions[0], i18n::default_suggestions(Language::En)[0]);

        let id = cache
            .remember(Language::En, "Do you offer weekend shifts?", "Yes.", None)
            .await
            .unwrap();
        cache.vote(id, true).await.unwrap();
        let suggestions = cache.suggestions(Language::En).await;
        assert_eq!(suggestions[0], "Do you offer weekend shifts?");
        assert_eq!(suggestions.len(), 4);
    }
}

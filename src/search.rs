use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::config::{FailurePolicy, SearchConfig};
use crate::error::{Result, SearchError};
use crate::models::{
    preview, CandidateRecord, Field, FieldHit, FieldMatch, FieldScore, FieldWeights,
    RankedResult, SearchHit, SearchResponse,
};
use crate::store::FieldStore;

const PREVIEW_CHARS: usize = 150;

/// Running per-candidate scores, in the order candidates were first seen.
#[derive(Debug, Default)]
pub struct CandidateScores {
    order: Vec<String>,
    tallies: HashMap<String, Tally>,
}

#[derive(Debug)]
struct Tally {
    name: String,
    fields: BTreeMap<Field, FieldScore>,
}

impl CandidateScores {
    /// Adds one field hit. A second hit for the same (candidate, field) only
    /// replaces the first when it is more relevant.
    pub fn record(&mut self, hit: &FieldHit, relevance: f32, weight: f32) {
        let candidate_id = &hit.key.candidate_id;
        if !self.tallies.contains_key(candidate_id) {
            self.order.push(candidate_id.clone());
        }
        let tally = self
            .tallies
            .entry(candidate_id.clone())
            .or_insert_with(|| Tally {
                name: hit.metadata.name.clone(),
                fields: BTreeMap::new(),
            });

        let field = hit.key.field;
        if tally
            .fields
            .get(&field)
            .is_some_and(|existing| existing.relevance >= relevance)
        {
            return;
        }
        tally.fields.insert(
            field,
            FieldScore {
                field,
                relevance,
                weight,
                contribution: relevance * weight,
                preview: preview(&hit.metadata.content, PREVIEW_CHARS),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Orders candidates by total score, highest first, keeping first-seen order
/// among equal totals, and keeps the top `num_results`.
pub fn rank(mut scores: CandidateScores, num_results: usize) -> Vec<RankedResult> {
    let mut results: Vec<RankedResult> = scores
        .order
        .iter()
        .filter_map(|candidate_id| {
            let tally = scores.tallies.remove(candidate_id)?;
            let total_score = tally.fields.values().map(|s| s.contribution).sum();
            let mut fields_matched: Vec<FieldScore> = tally.fields.into_values().collect();
            fields_matched.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
            Some(RankedResult {
                candidate_id: candidate_id.clone(),
                name: tally.name,
                total_score,
                fields_matched,
            })
        })
        .collect();

    results.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
    results.truncate(num_results);
    results
}

/// Weighted multi-field search over a [`FieldStore`].
pub struct SearchEngine<S> {
    store: S,
    config: SearchConfig,
}

impl<S: FieldStore> SearchEngine<S> {
    pub fn new(store: S, config: SearchConfig) -> Self {
        info!(weights = ?config.weights, policy = ?config.on_field_failure, "search engine ready");
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Ranks candidates by the weighted sum of their per-field relevance.
    /// `weights` overrides the configured weights for this call only.
    pub async fn search(
        &self,
        query_text: &str,
        num_results: usize,
        weights: Option<&FieldWeights>,
    ) -> Result<SearchResponse> {
        if num_results == 0 {
            return Err(SearchError::InvalidLimit);
        }
        let weights = weights.unwrap_or(&self.config.weights);
        let limit = self.config.per_field_limit(num_results);

        let mut scores = CandidateScores::default();
        let mut degraded_fields = Vec::new();

        for (field, weight) in weights.active() {
            let hits = match self.store.find_nearest(query_text, Some(field), limit).await {
                Ok(hits) => hits,
                Err(e) if self.config.on_field_failure == FailurePolicy::Degrade => {
                    warn!(%field, error = %e, "field lookup failed, returning partial results");
                    degraded_fields.push(field);
                    continue;
                }
                Err(e) => return Err(e),
            };

            debug!(%field, weight, hits = hits.len(), "field lookup");
            for hit in hits.iter().filter(|hit| hit.key.field == field) {
                let relevance = self.config.normalization.normalize(hit.distance);
                scores.record(hit, relevance, weight);
            }
        }

        if scores.is_empty() {
            info!(query = query_text, "no field matched");
            return Ok(SearchResponse {
                results: Vec::new(),
                degraded_fields,
            });
        }

        let matched = scores.len();
        let results = rank(scores, num_results);
        info!(query = query_text, matched, returned = results.len(), "search complete");

        Ok(SearchResponse {
            results,
            degraded_fields,
        })
    }

    /// Unweighted search of one field; relevance alone decides the order.
    pub async fn search_single_field(
        &self,
        query_text: &str,
        field: Field,
        num_results: usize,
    ) -> Result<Vec<FieldMatch>> {
        let hits = self
            .store
            .find_nearest(query_text, Some(field), num_results)
            .await?;

        let mut matches: Vec<FieldMatch> = hits
            .into_iter()
            .filter(|hit| hit.key.field == field)
            .map(|hit| FieldMatch {
                candidate_id: hit.key.candidate_id,
                name: hit.metadata.name,
                hit: SearchHit {
                    field,
                    distance: hit.distance,
                    relevance: self.config.normalization.normalize(hit.distance),
                },
                content: hit.metadata.content,
                content_length: hit.metadata.content_length,
            })
            .collect();
        matches.sort_by(|a, b| b.hit.relevance.total_cmp(&a.hit.relevance));

        info!(%field, query = query_text, returned = matches.len(), "single-field search complete");
        Ok(matches)
    }

    /// Rebuilds a candidate from its stored field entries.
    pub async fn get_full_record(&self, candidate_id: &str) -> Result<CandidateRecord> {
        let mut record: Option<CandidateRecord> = None;

        for field in Field::ALL {
            let Some(entry) = self.store.get_entry(candidate_id, field).await? else {
                continue;
            };
            if record.is_none() {
                record = Some(CandidateRecord {
                    id: candidate_id.to_string(),
                    name: Some(entry.name.clone()),
                    links: serde_json::from_str(&entry.links)?,
                    confidence_score: entry.confidence_score,
                    processing_timestamp: entry.processing_timestamp.clone(),
                    ..Default::default()
                });
            }
            if let Some(record) = record.as_mut() {
                record.set_field(field, entry.content);
            }
        }

        record.ok_or_else(|| SearchError::NotFound(candidate_id.to_string()))
    }
}

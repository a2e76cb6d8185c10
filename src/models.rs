use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// The resume sections that get their own embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Summary,
    Skills,
    WorkHistory,
    ProjectHistory,
    Education,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Summary,
        Field::Skills,
        Field::WorkHistory,
        Field::ProjectHistory,
        Field::Education,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Summary => "summary",
            Field::Skills => "skills",
            Field::WorkHistory => "work_history",
            Field::ProjectHistory => "project_history",
            Field::Education => "education",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| SearchError::InvalidField(s.to_string()))
    }
}

/// Identifies one (candidate, field) embedding entry.
///
/// The string form is `{candidate_id}_{field}`. Parsing anchors on a known
/// field suffix, so candidate ids may themselves contain underscores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub candidate_id: String,
    pub field: Field,
}

impl CompositeKey {
    pub fn new(candidate_id: impl Into<String>, field: Field) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            field,
        }
    }

    pub fn parse(key: &str) -> Result<Self> {
        Field::ALL
            .into_iter()
            .filter_map(|field| {
                let prefix = key.strip_suffix(field.as_str())?.strip_suffix('_')?;
                (!prefix.is_empty()).then(|| (prefix, field))
            })
            // Prefer the longest field suffix so the shortest candidate id wins.
            .max_by_key(|(_, field)| field.as_str().len())
            .map(|(prefix, field)| Self::new(prefix, field))
            .ok_or_else(|| SearchError::InvalidField(key.to_string()))
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.candidate_id, self.field)
    }
}

/// Per-field multipliers applied to relevance when ranking candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f32>", into = "BTreeMap<String, f32>")]
pub struct FieldWeights {
    weights: BTreeMap<Field, f32>,
}

impl FieldWeights {
    /// Builds weights from raw field names. Fields left out weigh 0.
    pub fn from_map<I, K>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f32)>,
        K: AsRef<str>,
    {
        let mut weights = BTreeMap::new();
        for (name, weight) in entries {
            let field: Field = name.as_ref().parse()?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(SearchError::InvalidWeight {
                    field: field.to_string(),
                    weight,
                });
            }
            weights.insert(field, weight);
        }
        Ok(Self { weights })
    }

    pub fn get(&self, field: Field) -> f32 {
        self.weights.get(&field).copied().unwrap_or(0.0)
    }

    /// Fields with a positive weight, in canonical field order.
    pub fn active(&self) -> impl Iterator<Item = (Field, f32)> + '_ {
        Field::ALL
            .into_iter()
            .map(|field| (field, self.get(field)))
            .filter(|(_, weight)| *weight > 0.0)
    }

    pub fn total(&self) -> f32 {
        self.weights.values().sum()
    }

    /// Returns a copy with one field overridden.
    pub fn with(mut self, field: Field, weight: f32) -> Result<Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(SearchError::InvalidWeight {
                field: field.to_string(),
                weight,
            });
        }
        self.weights.insert(field, weight);
        Ok(self)
    }
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            weights: BTreeMap::from([
                (Field::Summary, 0.30),
                (Field::Skills, 0.30),
                (Field::WorkHistory, 0.25),
                (Field::ProjectHistory, 0.10),
                (Field::Education, 0.05),
            ]),
        }
    }
}

impl TryFrom<BTreeMap<String, f32>> for FieldWeights {
    type Error = SearchError;

    fn try_from(map: BTreeMap<String, f32>) -> Result<Self> {
        Self::from_map(map)
    }
}

impl From<FieldWeights> for BTreeMap<String, f32> {
    fn from(weights: FieldWeights) -> Self {
        weights
            .weights
            .into_iter()
            .map(|(field, weight)| (field.to_string(), weight))
            .collect()
    }
}

/// Structured resume as produced by the extraction pipeline.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CandidateRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub work_history: String,
    #[serde(default)]
    pub project_history: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub links: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub confidence_score: Option<f32>,
    #[serde(default)]
    pub processing_timestamp: Option<String>,
}

impl CandidateRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Summary => &self.summary,
            Field::Skills => &self.skills,
            Field::WorkHistory => &self.work_history,
            Field::ProjectHistory => &self.project_history,
            Field::Education => &self.education,
        }
    }

    pub fn set_field(&mut self, field: Field, content: String) {
        match field {
            Field::Summary => self.summary = content,
            Field::Skills => self.skills = content,
            Field::WorkHistory => self.work_history = content,
            Field::ProjectHistory => self.project_history = content,
            Field::Education => self.education = content,
        }
    }

    /// Fields whose text is non-empty after trimming.
    pub fn embeddable_fields(&self) -> impl Iterator<Item = (Field, &str)> + '_ {
        Field::ALL
            .into_iter()
            .map(|field| (field, self.field(field)))
            .filter(|(_, content)| !content.trim().is_empty())
    }
}

/// One stored field embedding with its metadata.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoredEntry {
    pub candidate_id: String,
    pub name: String,
    pub field_name: Field,
    pub content: String,
    pub content_length: usize,
    pub embedding: Vec<f32>,
    pub confidence_score: Option<f32>,
    pub links: String,
    pub processing_timestamp: Option<String>,
    /// RFC 3339 timestamp.
    pub indexed_at: String,
}

impl StoredEntry {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.candidate_id.clone(), self.field_name)
    }
}

/// Metadata returned alongside each nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct HitMetadata {
    pub name: String,
    pub content: String,
    pub content_length: usize,
}

/// Raw nearest-neighbour hit as returned by a [`crate::store::FieldStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldHit {
    pub key: CompositeKey,
    pub distance: f32,
    pub metadata: HitMetadata,
}

/// A hit after distance normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub field: Field,
    pub distance: f32,
    pub relevance: f32,
}

/// One field's part in a candidate's total score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldScore {
    pub field: Field,
    pub relevance: f32,
    pub weight: f32,
    pub contribution: f32,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub candidate_id: String,
    pub name: String,
    pub total_score: f32,
    pub fields_matched: Vec<FieldScore>,
}

/// Outcome of a weighted search.
///
/// `degraded_fields` lists fields whose lookup failed and were skipped; when
/// it is non-empty the results are partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RankedResult>,
    pub degraded_fields: Vec<Field>,
}

impl SearchResponse {
    pub fn is_partial(&self) -> bool {
        !self.degraded_fields.is_empty()
    }
}

/// Result row from a single-field search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMatch {
    pub candidate_id: String,
    pub name: String,
    pub hit: SearchHit,
    pub content: String,
    pub content_length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub processed: usize,
    pub stored: usize,
    pub failed: usize,
    pub total_embeddings: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_embeddings: usize,
    pub unique_candidates: usize,
    pub field_distribution: BTreeMap<Field, usize>,
}

pub(crate) fn preview(content: &str, max_chars: usize) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_parse_rejects_unknown_names() {
        assert_eq!("work_history".parse::<Field>().unwrap(), Field::WorkHistory);
        assert!(matches!(
            "nonexistent".parse::<Field>(),
            Err(SearchError::InvalidField(name)) if name == "nonexistent"
        ));
    }

    #[test]
    fn test_composite_key_round_trips_ids_with_underscores() {
        let key = CompositeKey::new("jane_doe_work", Field::ProjectHistory);
        assert_eq!(key.to_string(), "jane_doe_work_project_history");

        let parsed = CompositeKey::parse("jane_doe_work_project_history").unwrap();
        assert_eq!(parsed, key);

        let parsed = CompositeKey::parse("cand_skills_skills").unwrap();
        assert_eq!(parsed.candidate_id, "cand_skills");
        assert_eq!(parsed.field, Field::Skills);
    }

    #[test]
    fn test_composite_key_rejects_missing_id_or_field() {
        assert!(CompositeKey::parse("_summary").is_err());
        assert!(CompositeKey::parse("summary").is_err());
        assert!(CompositeKey::parse("abc_history").is_err());
    }

    #[test]
    fn test_default_weights() {
        let weights = FieldWeights::default();
        assert_eq!(weights.get(Field::Summary), 0.30);
        assert_eq!(weights.get(Field::Education), 0.05);
        assert!((weights.total() - 1.0).abs() < 1e-6);
        assert_eq!(weights.active().count(), 5);
    }

    #[test]
    fn test_weights_from_map_validates() {
        let err = FieldWeights::from_map([("nonexistent", 1.0)]).unwrap_err();
        assert!(matches!(err, SearchError::InvalidField(_)));

        let err = FieldWeights::from_map([("skills", -0.5)]).unwrap_err();
        assert!(matches!(err, SearchError::InvalidWeight { .. }));

        let weights = FieldWeights::from_map([("skills", 1.0)]).unwrap();
        assert_eq!(weights.get(Field::Summary), 0.0);
        assert_eq!(weights.active().collect::<Vec<_>>(), vec![(Field::Skills, 1.0)]);
    }

    #[test]
    fn test_weights_deserialize_through_validation() {
        let weights: FieldWeights = serde_json::from_str(r#"{"summary": 0.5}"#).unwrap();
        assert_eq!(weights.get(Field::Summary), 0.5);

        let err = serde_json::from_str::<FieldWeights>(r#"{"hobbies": 0.5}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_embeddable_fields_skip_blank_text() {
        let record = CandidateRecord {
            id: "c1".into(),
            summary: "Backend engineer".into(),
            skills: "   \n".into(),
            education: "BSc".into(),
            ..Default::default()
        };
        let fields: Vec<Field> = record.embeddable_fields().map(|(f, _)| f).collect();
        assert_eq!(fields, vec![Field::Summary, Field::Education]);
        assert_eq!(record.display_name(), "Unknown");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo world", 5), "héllo...");
        assert_eq!(preview("short", 10), "short");
    }
}

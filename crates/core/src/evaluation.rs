//! Evaluation record model.
//!
//! One record per evaluator user, stored as `<evaluators_dir>/<username>.json`:
//!
//! ```text
//! {
//!   "username": "...",
//!   "created_at": "...", "updated_at": "...", "submitted_at": "...",
//!   "evaluation_results": {
//!     "case1": {
//!       "saved": true, "saved_at": "...",
//!       "ranking": [...], "tiers": {...},
//!       "LLM1": { "dimensions": { "logic": 4, ... } },
//!       ...
//!     }
//!   },
//!   "feedback": { "case1": { "LLM1": "..." } }
//! }
//! ```
//!
//! Evaluator entries share the case object with the metadata keys on disk. In memory each case
//! is a [`CaseEvaluation`] whose non-metadata keys are classified once, on load, into
//! [`CaseEntry::Evaluator`] or [`CaseEntry::Other`]. All merge logic works on those variants.
//!
//! Every mutation here is additive. The only values replaced as a whole are a case's
//! `ranking`/`tiers` pair, and entries whose stored shape is not an evaluator.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const SAVED_KEY: &str = "saved";
pub const SAVED_AT_KEY: &str = "saved_at";
pub const RANKING_KEY: &str = "ranking";
pub const TIERS_KEY: &str = "tiers";
pub const DIMENSIONS_KEY: &str = "dimensions";

/// Keys of a case object that are never evaluator ids.
pub const CASE_METADATA_KEYS: [&str; 4] = [SAVED_KEY, SAVED_AT_KEY, RANKING_KEY, TIERS_KEY];

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Parse RFC 3339, or a naive ISO 8601 timestamp interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(timestamp_from_value))
}

fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        tracing::warn!("ignoring unparsable timestamp '{raw}'");
    }
    parsed
}

// ============================================================================
// CASE ENTRIES
// ============================================================================

/// Scores given to one recorded conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorScores {
    pub dimensions: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EvaluatorScores {
    fn from_object(mut object: Map<String, Value>) -> Result<Self, Map<String, Value>> {
        match object.remove(DIMENSIONS_KEY) {
            Some(Value::Object(dimensions)) => Ok(Self {
                dimensions: dimensions.into_iter().collect(),
                extra: object,
            }),
            Some(other) => {
                object.insert(DIMENSIONS_KEY.to_owned(), other);
                Err(object)
            }
            None => Err(object),
        }
    }

    fn into_value(self) -> Value {
        let mut object = self.extra;
        object.insert(
            DIMENSIONS_KEY.to_owned(),
            Value::Object(self.dimensions.into_iter().collect()),
        );
        Value::Object(object)
    }
}

/// A non-metadata key of a case object.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseEntry {
    Evaluator(EvaluatorScores),
    /// Anything that is not shaped like an evaluator; kept verbatim.
    Other(Value),
}

impl CaseEntry {
    fn classify(value: Value) -> Self {
        match value {
            Value::Object(object) => match EvaluatorScores::from_object(object) {
                Ok(scores) => CaseEntry::Evaluator(scores),
                Err(object) => CaseEntry::Other(Value::Object(object)),
            },
            other => CaseEntry::Other(other),
        }
    }

    fn into_value(self) -> Value {
        match self {
            CaseEntry::Evaluator(scores) => scores.into_value(),
            CaseEntry::Other(value) => value,
        }
    }

    /// Turn this entry into an evaluator, keeping the fields of an object-shaped `Other`.
    fn into_evaluator(self) -> EvaluatorScores {
        match self {
            CaseEntry::Evaluator(scores) => scores,
            CaseEntry::Other(Value::Object(extra)) => EvaluatorScores {
                dimensions: BTreeMap::new(),
                extra,
            },
            CaseEntry::Other(_) => EvaluatorScores::default(),
        }
    }
}

// ============================================================================
// CASE EVALUATION
// ============================================================================

/// Everything an evaluator recorded for one case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct CaseEvaluation {
    pub saved: bool,
    pub saved_at: Option<DateTime<Utc>>,
    pub ranking: Option<Vec<Value>>,
    pub tiers: Option<Map<String, Value>>,
    pub entries: BTreeMap<String, CaseEntry>,
    /// Metadata values the typed fields cannot hold (an explicit `saved: false`, an
    /// unparsable `saved_at`, a non-array `ranking`, ...), written back unchanged unless the
    /// matching typed field is set.
    pub raw_metadata: Map<String, Value>,
}

impl CaseEvaluation {
    pub fn is_metadata_key(key: &str) -> bool {
        CASE_METADATA_KEYS.contains(&key)
    }

    /// Evaluator entries only.
    pub fn evaluators(&self) -> BTreeMap<String, EvaluatorScores> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| match entry {
                CaseEntry::Evaluator(scores) => Some((id.clone(), scores.clone())),
                CaseEntry::Other(_) => None,
            })
            .collect()
    }

    /// Set one dimension score, creating the evaluator entry when absent.
    pub fn upsert_dimension_score(&mut self, evaluator_id: &str, dimension_key: &str, score: Value) {
        let mut scores = self
            .entries
            .remove(evaluator_id)
            .map(CaseEntry::into_evaluator)
            .unwrap_or_default();
        scores.dimensions.insert(dimension_key.to_owned(), score);
        self.entries
            .insert(evaluator_id.to_owned(), CaseEntry::Evaluator(scores));
    }

    /// Merge a submitted evaluator into this case.
    ///
    /// A new evaluator is inserted whole. An existing evaluator gets the submitted dimensions
    /// merged key by key. An existing entry that is not an evaluator is replaced.
    pub fn merge_evaluator(&mut self, evaluator_id: &str, submitted: EvaluatorScores) {
        match self.entries.get_mut(evaluator_id) {
            Some(CaseEntry::Evaluator(existing)) => {
                existing.dimensions.extend(submitted.dimensions);
            }
            Some(entry) => *entry = CaseEntry::Evaluator(submitted),
            None => {
                self.entries
                    .insert(evaluator_id.to_owned(), CaseEntry::Evaluator(submitted));
            }
        }
    }

    /// Merge a whole submitted case into this one.
    ///
    /// `ranking` and `tiers` are replaced when present in `other`; evaluator entries merge as in
    /// [`CaseEvaluation::merge_evaluator`]; other entries are inserted or replaced.
    pub fn merge_from(&mut self, other: CaseEvaluation) {
        if other.saved {
            self.saved = true;
        }
        if other.saved_at.is_some() {
            self.saved_at = other.saved_at;
        }
        if other.ranking.is_some() {
            self.ranking = other.ranking;
        }
        if other.tiers.is_some() {
            self.tiers = other.tiers;
        }
        self.raw_metadata.extend(other.raw_metadata);
        for (id, entry) in other.entries {
            match entry {
                CaseEntry::Evaluator(scores) => self.merge_evaluator(&id, scores),
                CaseEntry::Other(value) => {
                    self.entries.insert(id, CaseEntry::Other(value));
                }
            }
        }
    }

    /// `ranking` and `tiers`, defaulting to empty values.
    pub fn ranking_and_tiers(&self) -> RankingAndTiers {
        RankingAndTiers {
            ranking: self.ranking.clone().unwrap_or_default(),
            tiers: self.tiers.clone().unwrap_or_default(),
        }
    }
}

impl From<Map<String, Value>> for CaseEvaluation {
    fn from(object: Map<String, Value>) -> Self {
        let mut case = CaseEvaluation::default();
        for (key, value) in object {
            match (key.as_str(), value) {
                (SAVED_KEY, Value::Bool(true)) => case.saved = true,
                (SAVED_AT_KEY, value) => match timestamp_from_value(&value) {
                    Some(saved_at) => case.saved_at = Some(saved_at),
                    None => {
                        case.raw_metadata.insert(key, value);
                    }
                },
                (RANKING_KEY, Value::Array(items)) => case.ranking = Some(items),
                (TIERS_KEY, Value::Object(tiers)) => case.tiers = Some(tiers),
                (SAVED_KEY | RANKING_KEY | TIERS_KEY, value) => {
                    case.raw_metadata.insert(key, value);
                }
                (_, value) => {
                    case.entries.insert(key, CaseEntry::classify(value));
                }
            }
        }
        case
    }
}

impl From<CaseEvaluation> for Map<String, Value> {
    fn from(case: CaseEvaluation) -> Self {
        let mut object = case.raw_metadata;
        if case.saved {
            object.insert(SAVED_KEY.to_owned(), Value::Bool(true));
        }
        if let Some(saved_at) = case.saved_at {
            object.insert(SAVED_AT_KEY.to_owned(), Value::String(saved_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)));
        }
        if let Some(ranking) = case.ranking {
            object.insert(RANKING_KEY.to_owned(), Value::Array(ranking));
        }
        if let Some(tiers) = case.tiers {
            object.insert(TIERS_KEY.to_owned(), Value::Object(tiers));
        }
        for (id, entry) in case.entries {
            object.insert(id, entry.into_value());
        }
        object
    }
}

/// A case's ranking pair as returned to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankingAndTiers {
    pub ranking: Vec<Value>,
    pub tiers: Map<String, Value>,
}

/// Saved state of one case as shown when an evaluator returns to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseState {
    pub saved: bool,
    pub ranking: Option<Vec<Value>>,
    pub evaluators: Option<BTreeMap<String, EvaluatorScores>>,
}

// ============================================================================
// EVALUATION RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub username: String,

    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub evaluation_results: BTreeMap<String, CaseEvaluation>,

    /// case id -> evaluator id -> free-text feedback
    #[serde(default)]
    pub feedback: BTreeMap<String, BTreeMap<String, String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EvaluationRecord {
    pub fn new(username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            username: username.into(),
            created_at: Some(now),
            updated_at: Some(now),
            submitted_at: None,
            evaluation_results: BTreeMap::new(),
            feedback: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn case(&self, case_key: &str) -> Option<&CaseEvaluation> {
        self.evaluation_results.get(case_key)
    }

    pub fn case_mut(&mut self, case_key: &str) -> &mut CaseEvaluation {
        self.evaluation_results
            .entry(case_key.to_owned())
            .or_default()
    }

    pub fn upsert_dimension_score(
        &mut self,
        case_key: &str,
        evaluator_id: &str,
        dimension_key: &str,
        score: Value,
    ) {
        self.case_mut(case_key)
            .upsert_dimension_score(evaluator_id, dimension_key, score);
    }

    pub fn replace_ranking_and_tiers(
        &mut self,
        case_key: &str,
        ranking: Vec<Value>,
        tiers: Map<String, Value>,
        now: DateTime<Utc>,
    ) {
        let case = self.case_mut(case_key);
        case.ranking = Some(ranking);
        case.tiers = Some(tiers);
        case.saved_at = Some(now);
    }

    /// Mark a case saved, replace its ranking and merge the submitted evaluators.
    ///
    /// Returns the number of evaluators merged.
    pub fn merge_case_state(
        &mut self,
        case_key: &str,
        ranking: Vec<Value>,
        submissions: BTreeMap<String, EvaluatorScores>,
        now: DateTime<Utc>,
    ) -> usize {
        let count = submissions.len();
        let case = self.case_mut(case_key);
        case.saved = true;
        case.saved_at = Some(now);
        case.ranking = Some(ranking);
        for (evaluator_id, scores) in submissions {
            case.merge_evaluator(&evaluator_id, scores);
        }
        count
    }

    pub fn initialize_case_fields(&mut self, case_key: &str) {
        self.evaluation_results
            .entry(case_key.to_owned())
            .or_default();
        self.feedback.entry(case_key.to_owned()).or_default();
    }

    pub fn save_feedback(&mut self, case_key: &str, evaluator_id: &str, text: String) {
        self.feedback
            .entry(case_key.to_owned())
            .or_default()
            .insert(evaluator_id.to_owned(), text);
    }

    /// Merge a final submission and stamp `submitted_at`. Feedback is left as it is.
    pub fn merge_submission(
        &mut self,
        results: BTreeMap<String, CaseEvaluation>,
        now: DateTime<Utc>,
    ) {
        for (case_key, submitted) in results {
            self.case_mut(&case_key).merge_from(submitted);
        }
        self.submitted_at = Some(now);
    }

    /// Whether the evaluator has saved this case, or submitted a record that ranks it.
    pub fn is_case_saved(&self, case_key: &str) -> bool {
        match self.case(case_key) {
            Some(case) if case.saved => true,
            Some(case) => self.submitted_at.is_some() && case.ranking.is_some(),
            None => false,
        }
    }

    pub fn case_state(&self, case_key: &str) -> CaseState {
        match self.case(case_key) {
            Some(case) if self.is_case_saved(case_key) => CaseState {
                saved: true,
                ranking: case.ranking.clone(),
                evaluators: Some(case.evaluators()),
            },
            _ => CaseState::default(),
        }
    }

    /// Ranking pair of every case, keyed by case id.
    pub fn rankings(&self) -> BTreeMap<String, RankingAndTiers> {
        self.evaluation_results
            .iter()
            .map(|(key, case)| (key.clone(), case.ranking_and_tiers()))
            .collect()
    }
}

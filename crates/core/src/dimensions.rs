//! Scoring dimensions.
//!
//! Loaded read-only from `evaluation_dimensions.json` in the conversations root. When the file
//! is absent the built-in list is used.

use crate::error::CoreResult;
use medsim_files::read_json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A named scoring criterion with anchor descriptions keyed by score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub dimension: String,
    #[serde(default)]
    pub anchors: BTreeMap<String, String>,
    #[serde(default)]
    pub category: String,
}

impl Dimension {
    fn builtin(dimension: &str, anchors: [(&str, &str); 3], category: &str) -> Self {
        Self {
            dimension: dimension.to_owned(),
            anchors: anchors
                .into_iter()
                .map(|(score, text)| (score.to_owned(), text.to_owned()))
                .collect(),
            category: category.to_owned(),
        }
    }
}

/// Load the dimension list from `path`, or the built-in list when the file does not exist.
///
/// # Errors
///
/// Returns `CoreError::Persistence` if the file exists but cannot be read or parsed.
pub fn load_dimensions(path: &Path) -> CoreResult<Vec<Dimension>> {
    match read_json::<Vec<Dimension>>(path)? {
        Some(dimensions) => {
            tracing::debug!("loaded {} dimensions from {}", dimensions.len(), path.display());
            Ok(dimensions)
        }
        None => {
            tracing::info!(
                "{} not found; using built-in dimensions",
                path.display()
            );
            Ok(default_dimensions())
        }
    }
}

pub fn default_dimensions() -> Vec<Dimension> {
    vec![
        Dimension::builtin(
            "Are the questions clear, coherent and logically ordered?",
            [
                ("1", "No logic; questions are random"),
                ("3", "Mostly fluent with occasional digressions"),
                ("5", "Builds step by step, in line with clinical communication practice"),
            ],
            "Interview logic",
        ),
        Dimension::builtin(
            "Is the final diagnosis correct?",
            [
                ("1", "Serious misdiagnosis with potentially severe consequences"),
                ("3", "Not exact, but pointing in the same direction as the reference"),
                ("5", "Fully correct"),
            ],
            "Diagnostic correctness",
        ),
        Dimension::builtin(
            "Are the secondary diagnoses complete?",
            [
                ("1", "Wrong secondary diagnoses or important ones missing"),
                ("3", "Covers most secondary diagnoses with some omissions"),
                ("5", "Complete"),
            ],
            "Diagnostic completeness",
        ),
        Dimension::builtin(
            "Is the diagnostic reasoning sound?",
            [
                ("1", "Reasoning unrelated to the diagnosis"),
                ("3", "Broadly reasonable but the chain of reasoning is incomplete"),
                ("5", "Well supported, complete and self-consistent evidence chain"),
            ],
            "Reasoning soundness",
        ),
        Dimension::builtin(
            "Is the treatment advice appropriate?",
            [
                ("1", "Clearly inappropriate and potentially harmful"),
                ("3", "Broadly reasonable but vague, too general or short of best practice"),
                ("5", "Fully appropriate, in line with guidelines and best practice"),
            ],
            "Treatment appropriateness",
        ),
        Dimension::builtin(
            "Is the treatment comprehensive?",
            [
                ("1", "A single, one-sided recommendation"),
                ("3", "Covers the main measures but misses supportive care or follow-up"),
                ("5", "Covers main treatment, complications, supportive measures and follow-up"),
            ],
            "Treatment completeness",
        ),
        Dimension::builtin(
            "From the patient's point of view, is this doctor's conduct acceptable?",
            [
                ("1", "Clearly unprofessional; shallow answers below a doctor's standard"),
                ("3", "Somewhat professional but reads like a junior doctor"),
                ("5", "Highly professional, mature and reliable; feels like a senior clinician"),
            ],
            "Perceived clinical professionalism",
        ),
        Dimension::builtin(
            "Do you think this 'doctor' was played by an AI or by a human doctor?",
            [
                ("0", "Very AI-like, nothing like a human doctor"),
                ("3", "Hard to tell; AI and human equally likely"),
                ("5", "Nothing like an AI; very much a human doctor's style"),
            ],
            "AI perception",
        ),
    ]
}

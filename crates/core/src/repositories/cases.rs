//! Case documents and the case loader.
//!
//! A case document is the read-only reference content of one scripted scenario, stored as
//! `case<N>/case<N>.json`. Field names on disk are kept as the authoring tools write them
//! (`prompt1`, `main_suit`, `Reference_Diagnostic`, ...); in Rust they carry descriptive names.

use crate::constants::ENGLISH_ONLY_INSTRUCTION;
use crate::reply::ChatMessage;
use crate::repositories::catalog::CaseCatalog;
use medsim_files::read_json;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Content of one case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseDocument {
    /// Role-play setup for the virtual patient.
    #[serde(rename = "prompt1", default)]
    pub scenario: String,

    /// Case narrative the patient answers from.
    #[serde(rename = "prompt2", default)]
    pub narrative: String,

    /// Examination findings; free-form JSON.
    #[serde(rename = "prompt3", default)]
    pub exam_findings: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_message: Option<Value>,

    #[serde(rename = "main_suit", default, skip_serializing_if = "Option::is_none")]
    pub main_complaint: Option<String>,

    #[serde(
        rename = "Reference_Diagnostic",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_diagnosis: Option<String>,

    #[serde(
        rename = "Reference_Treatment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_treatment: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference answer shown to evaluators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceAnswer {
    pub diagnosis: String,
    pub treatment: String,
    /// Narrative and exam findings rendered as one JSON string.
    pub original_case: String,
}

impl CaseDocument {
    /// The system messages that open every virtual patient conversation for this case.
    pub fn system_prompts(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.scenario.clone()),
            ChatMessage::system(self.narrative.clone()),
            ChatMessage::system(spaced_json(&self.exam_findings)),
            ChatMessage::system(ENGLISH_ONLY_INSTRUCTION),
        ]
    }

    /// Human-readable patient information block.
    ///
    /// Literal `\n` sequences in the stored text are expanded to newlines. The evaluator view
    /// also shows the main complaint.
    pub fn patient_summary(&self, include_main_complaint: bool) -> String {
        let mut summary = String::new();

        if let Some(info) = &self.personal_message {
            summary.push_str("Patient Information: ");
            summary.push_str(&expand_newlines(&display_value(info)));
            summary.push('\n');
        }

        if include_main_complaint {
            if let Some(complaint) = &self.main_complaint {
                summary.push_str("Main Complaint: ");
                summary.push_str(&expand_newlines(complaint));
                summary.push('\n');
            }
        }

        summary
    }

    pub fn reference_answer(&self) -> ReferenceAnswer {
        let original_case = serde_json::json!({
            "prompt2": self.narrative,
            "prompt3": self.exam_findings,
        });

        ReferenceAnswer {
            diagnosis: self.reference_diagnosis.clone().unwrap_or_default(),
            treatment: self.reference_treatment.clone().unwrap_or_default(),
            original_case: spaced_json(&original_case),
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => spaced_json(other),
    }
}

/// Writes `", "` between items and `": "` after keys, the layout the stored prompts were
/// authored against.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn spaced_json(value: &Value) -> String {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    match value.serialize(&mut ser) {
        Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| value.to_string()),
        Err(_) => value.to_string(),
    }
}

fn expand_newlines(text: &str) -> String {
    text.replace("\\n", "\n")
}

/// Reads case documents by catalog index.
///
/// Nothing is cached here; sessions keep whatever they load.
#[derive(Debug, Clone)]
pub struct CaseLoader {
    catalog: Arc<CaseCatalog>,
}

impl CaseLoader {
    pub fn new(catalog: Arc<CaseCatalog>) -> Self {
        Self { catalog }
    }

    /// Load the case at `index`.
    ///
    /// Returns `None` when the index is out of range or the document is missing or malformed;
    /// the cause is logged.
    pub fn load_case(&self, index: usize) -> Option<CaseDocument> {
        let Some(descriptor) = self.catalog.get(index) else {
            tracing::warn!(
                "case index {index} out of range ({} cases)",
                self.catalog.len()
            );
            return None;
        };
        Self::read_document(&descriptor.content_path)
    }

    fn read_document(path: &Path) -> Option<CaseDocument> {
        match read_json::<CaseDocument>(path) {
            Ok(Some(doc)) => {
                tracing::debug!("loaded case document {}", path.display());
                Some(doc)
            }
            Ok(None) => {
                tracing::warn!("case document missing: {}", path.display());
                None
            }
            Err(e) => {
                tracing::warn!("case document unreadable: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::reply::Role;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn sample_case() -> Value {
        json!({
            "prompt1": "You are a patient.",
            "prompt2": "Chest pain for two days.",
            "prompt3": {"ECG": "ST elevation"},
            "personal_message": "Male, 54\\nRetired engineer",
            "main_suit": "Chest pain",
            "Reference_Diagnostic": "STEMI",
            "Reference_Treatment": "PCI",
            "author": "dr-x"
        })
    }

    fn write_case(root: &Path, name: &str, body: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.json")), body).unwrap();
    }

    fn loader_for(root: &Path) -> CaseLoader {
        let cfg = Arc::new(CoreConfig::new(root.to_path_buf(), root.join("evaluators")));
        CaseLoader::new(Arc::new(CaseCatalog::new(cfg)))
    }

    #[test]
    fn test_case_document_maps_stored_field_names() {
        let doc: CaseDocument = serde_json::from_value(sample_case()).unwrap();
        assert_eq!(doc.scenario, "You are a patient.");
        assert_eq!(doc.main_complaint.as_deref(), Some("Chest pain"));
        assert_eq!(doc.reference_diagnosis.as_deref(), Some("STEMI"));
        assert_eq!(doc.extra.get("author"), Some(&json!("dr-x")));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back, sample_case());
    }

    #[test]
    fn test_system_prompts_end_with_language_instruction() {
        let doc: CaseDocument = serde_json::from_value(sample_case()).unwrap();
        let prompts = doc.system_prompts();

        assert_eq!(prompts.len(), 4);
        assert!(prompts.iter().all(|m| m.role == Role::System));
        assert_eq!(prompts[2].content, r#"{"ECG": "ST elevation"}"#);
        assert_eq!(prompts[3].content, ENGLISH_ONLY_INSTRUCTION);
    }

    #[test]
    fn test_nested_exam_findings_keep_spaced_separators() {
        let mut case = sample_case();
        case["prompt3"] = json!({"Labs": {"K": 4.1, "Na": 139}, "Vitals": ["BP 120/80", "HR 88"]});
        let doc: CaseDocument = serde_json::from_value(case).unwrap();

        assert_eq!(
            doc.system_prompts()[2].content,
            r#"{"Labs": {"K": 4.1, "Na": 139}, "Vitals": ["BP 120/80", "HR 88"]}"#
        );
        assert_eq!(
            doc.reference_answer().original_case,
            r#"{"prompt2": "Chest pain for two days.", "prompt3": {"Labs": {"K": 4.1, "Na": 139}, "Vitals": ["BP 120/80", "HR 88"]}}"#
        );
    }

    #[test]
    fn test_patient_summary_expands_newlines() {
        let doc: CaseDocument = serde_json::from_value(sample_case()).unwrap();

        assert_eq!(
            doc.patient_summary(false),
            "Patient Information: Male, 54\nRetired engineer\n"
        );
        assert_eq!(
            doc.patient_summary(true),
            "Patient Information: Male, 54\nRetired engineer\nMain Complaint: Chest pain\n"
        );
    }

    #[test]
    fn test_reference_answer_includes_original_case() {
        let doc: CaseDocument = serde_json::from_value(sample_case()).unwrap();
        let answer = doc.reference_answer();

        assert_eq!(answer.diagnosis, "STEMI");
        let original: Value = serde_json::from_str(&answer.original_case).unwrap();
        assert_eq!(original["prompt2"], "Chest pain for two days.");
        assert_eq!(original["prompt3"]["ECG"], "ST elevation");
    }

    #[test]
    fn test_load_case_reads_catalog_entry() {
        let temp = TempDir::new().unwrap();
        write_case(temp.path(), "case1", &sample_case().to_string());

        let doc = loader_for(temp.path()).load_case(0).unwrap();
        assert_eq!(doc.narrative, "Chest pain for two days.");
    }

    #[test]
    fn test_load_case_out_of_range_is_none() {
        let temp = TempDir::new().unwrap();
        write_case(temp.path(), "case1", &sample_case().to_string());

        assert!(loader_for(temp.path()).load_case(5).is_none());
    }

    #[test]
    fn test_load_case_missing_or_malformed_is_none() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("case1")).unwrap();
        write_case(temp.path(), "case2", "{ broken");

        let loader = loader_for(temp.path());
        assert!(loader.load_case(0).is_none());
        assert!(loader.load_case(1).is_none());
    }
}

//! Evaluator record location: `<evaluators_dir>/<username>.json`.

use medsim_types::Username;
use std::path::{Path, PathBuf};

pub struct EvaluatorRecordFile;

impl EvaluatorRecordFile {
    pub fn path(evaluators_dir: &Path, username: &Username) -> PathBuf {
        evaluators_dir.join(username.json_file_name())
    }
}

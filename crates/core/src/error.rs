use medsim_files::FilesError;
use medsim_types::TextError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("case not found: {0}")]
    CaseNotFound(String),
    #[error("no saved conversation: {0}")]
    ConversationNotFound(String),
    #[error("evaluator record not found for user '{0}'")]
    EvaluatorNotFound(String),
    #[error("case catalog unavailable: {} does not exist", path.display())]
    CatalogUnavailable { path: PathBuf },
    #[error("no cases available")]
    NoCases,
    #[error("already at the first case")]
    AtFirstCase,
    #[error("already at the last case")]
    AtLastCase,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("persistence failure: {0}")]
    Persistence(#[from] FilesError),
    #[error(transparent)]
    Text(#[from] TextError),
}

impl CoreError {
    /// True for every variant that means "the thing asked for is absent".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::CaseNotFound(_)
                | CoreError::ConversationNotFound(_)
                | CoreError::EvaluatorNotFound(_)
                | CoreError::NoCases
        )
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

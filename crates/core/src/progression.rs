//! Progression resolver.
//!
//! Forward navigation always lands on the earliest case the user has not completed yet, so a
//! case that was skipped or never saved is revisited before anything after it. Backward
//! navigation is unconditional: any earlier case can be reviewed.

use crate::paths::cases::CaseFolder;
use crate::repositories::catalog::CaseDescriptor;
use medsim_types::Username;
use serde::Serialize;

/// Source of per-user completion markers for case folders.
pub trait CompletionMarkers {
    fn is_complete(&self, folder: &CaseFolder, username: &Username) -> bool;
}

/// Where forward navigation lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NextCase {
    pub index: usize,
    /// Every case in the catalog carries a marker; `index` is then the last case.
    pub all_complete: bool,
}

/// Index of the first case without a completion marker for `username`.
///
/// When every case is complete the last index is returned with `all_complete` set. An empty
/// catalog yields index `0` with `all_complete` unset.
pub fn next_incomplete_index<M>(cases: &[CaseDescriptor], markers: &M, username: &Username) -> NextCase
where
    M: CompletionMarkers + ?Sized,
{
    if cases.is_empty() {
        tracing::debug!("no cases in catalog; next index for {username} is 0");
        return NextCase {
            index: 0,
            all_complete: false,
        };
    }

    match cases
        .iter()
        .find(|case| !markers.is_complete(&case.folder, username))
    {
        Some(case) => NextCase {
            index: case.index,
            all_complete: false,
        },
        None => NextCase {
            index: cases.len() - 1,
            all_complete: true,
        },
    }
}

/// Index before `current`, or `None` when already at the first case.
pub fn previous_index(current: usize) -> Option<usize> {
    current.checked_sub(1)
}

//! On-disk path definitions for medsim artefacts.
//!
//! This module defines filesystem paths for case folders, case documents and per-user records.
//! It contains **no I/O logic** - only typed path construction.

pub mod cases;
pub mod evaluators;

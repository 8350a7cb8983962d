//! Storage-backed repositories.
//!
//! The case catalog and loader read the fixed case content; the conversation and evaluation
//! stores persist per-user results that progression decisions are based on.

pub mod catalog;
pub mod cases;
pub mod conversations;
pub mod evaluations;

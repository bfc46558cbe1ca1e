//! Job application email extraction and lifecycle classification.
//!
//! One call chain per email: the [`cascade::Cascade`] tries an AI-backed
//! extractor, then layered heuristics, and always produces a
//! [`models::ParsedEmail`] for well-formed input. Reference tables live in
//! [`rules`] and are hot-reloadable.

pub mod ai;
pub mod cascade;
pub mod error;
pub mod heuristics;
pub mod mail;
pub mod models;
pub mod profession;
pub mod rules;
pub mod status;

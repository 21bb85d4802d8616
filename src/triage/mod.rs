//! Deterministic triage: the rule-based assessment that runs before any
//! generated reasoning, plus the follow-up planner and the independent
//! regimen cross-check.
//!
//! Everything in this module is pure and synchronous. Given the same
//! patient record, every function returns the same result.

pub mod engine;
pub mod follow_up;
pub mod validator;

pub use engine::{assess, complicating_factors, meets_symptom_criteria, recurrence_reason};
pub use follow_up::{enhanced_follow_up_plan, standard_follow_up_plan};
pub use validator::validate_regimen;

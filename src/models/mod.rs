//! Clinical data model: patient record, fixed treatment table, and the
//! result types produced by each pipeline stage.

pub mod enums;
pub mod outputs;
pub mod patient;
pub mod treatment;

use thiserror::Error;

pub use enums::*;
pub use outputs::*;
pub use patient::{History, PatientState, Recurrence, RedFlags, Symptoms};
pub use treatment::{spec_for, MedicationSpec, Recommendation, PREFERRED_ORDER, TMP_SMX_ALLERGY_TERMS};

/// Malformed or out-of-range patient record. Surfaced before triage runs;
/// nothing is coerced silently except the documented sex/pregnancy
/// normalization.
#[derive(Error, Debug)]
pub enum PatientValidationError {
    #[error("Invalid value '{value}' for {field}")]
    InvalidEnum { field: String, value: String },

    #[error("Age {0} is outside the supported 0-120 range")]
    AgeOutOfRange(u8),

    #[error("eGFR {0} must be a non-negative finite number")]
    InvalidEgfr(f64),

    #[error("Locale code '{0}' must be 2-10 characters")]
    InvalidLocaleCode(String),
}

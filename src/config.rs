//! Pipeline configuration, resolved once at construction.

use serde::{Deserialize, Serialize};

/// Behavior toggles for the assessment pipeline.
///
/// All gates default to on. Turning `strict_interrupts` off disables the
/// early returns at the deterministic, safety, and validator gates; the
/// pipeline then completes every stage and the gate outcomes surface only
/// in the consolidated result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stop at the deterministic, safety, and validator gates.
    pub strict_interrupts: bool,
    /// Annotate results as requiring prescriber signoff. Never changes
    /// control flow.
    pub prescriber_signoff_required: bool,
    /// On deterministic interrupts, produce a short doctor-style narrative
    /// for the reviewing clinician.
    pub doctor_summary_on_referral: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strict_interrupts: true,
            prescriber_signoff_required: true,
            doctor_summary_on_referral: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_all_gates() {
        let config = PipelineConfig::default();
        assert!(config.strict_interrupts);
        assert!(config.prescriber_signoff_required);
        assert!(config.doctor_summary_on_referral);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"strict_interrupts": false}"#).unwrap();
        assert!(!config.strict_interrupts);
        assert!(config.prescriber_signoff_required);
    }
}

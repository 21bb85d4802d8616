//! Consensus policy: reconciling the deterministic recommendation, the
//! clinician-proposed regimen, and the safety approval into one finalized
//! regimen and a consensus label. Also owns the verification predicate.

use crate::models::{
    ApprovalDecision, ClinicalReasoningOutput, ConsensusLabel, Decision, Recommendation,
    RiskLevel, SafetyValidationOutput, Severity, ValidatorResult,
};

const VERIFY_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Finalized regimen plus the consensus recommendation label/text.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusOutcome {
    /// The regimen the cross-check validates. `None` when antibiotics are
    /// deferred or never indicated.
    pub finalized_regimen: Option<String>,
    pub consensus_recommendation: String,
}

/// Reconcile decision, recommendation, and safety approval.
///
/// - approve: the clinician's proposed regimen wins over the algorithmic
///   text when present.
/// - modify/conditional: the first listed alternative distinct from the
///   original regimen is substituted, labeled as a safety modification.
/// - any hard stop: antibiotics are deferred regardless of the branch above.
pub fn finalize_regimen(
    decision: Decision,
    recommendation: Option<&Recommendation>,
    approval: ApprovalDecision,
    proposed_regimen_text: &str,
) -> ConsensusOutcome {
    let mut finalized: Option<String> = None;
    let mut consensus = ConsensusLabel::NoAntibioticsOrRefer.as_str().to_string();

    if decision == Decision::RecommendTreatment {
        if let Some(rec) = recommendation {
            let rec_text = rec.as_text();
            match approval {
                ApprovalDecision::Approve => {
                    let proposed = proposed_regimen_text.trim();
                    let text = if proposed.is_empty() {
                        rec_text
                    } else {
                        proposed.to_string()
                    };
                    consensus = text.clone();
                    finalized = Some(text);
                }
                ApprovalDecision::Modify | ApprovalDecision::Conditional => {
                    let chosen_alt = rec
                        .alternatives
                        .iter()
                        .map(|alt| alt.trim())
                        .find(|alt| !alt.is_empty() && *alt != rec_text);
                    match chosen_alt {
                        Some(alt) => {
                            consensus = format!("Modify regimen: {alt} (per safety validation)");
                            finalized = Some(alt.to_string());
                        }
                        None => {
                            consensus =
                                format!("Modify regimen: {rec_text} (see safety validation)");
                            finalized = Some(rec_text);
                        }
                    }
                }
                ApprovalDecision::Reject
                | ApprovalDecision::DoNotStart
                | ApprovalDecision::Deny => {
                    consensus = ConsensusLabel::DeferChooseAlternative.as_str().to_string();
                }
                _ => {
                    consensus = rec_text.clone();
                    finalized = Some(rec_text);
                }
            }
        }

        // A hard stop always defers, whatever the branch above produced.
        if approval.is_hard_stop() {
            consensus = ConsensusLabel::DeferRevisePlanSafety.as_str().to_string();
        }
    }

    ConsensusOutcome {
        finalized_regimen: finalized,
        consensus_recommendation: consensus,
    }
}

/// Whether the verification role should review the consolidated plan.
pub fn should_verify(
    reasoning: Option<&ClinicalReasoningOutput>,
    validator: &ValidatorResult,
    safety: Option<&SafetyValidationOutput>,
) -> bool {
    let confidence = reasoning.map(|r| r.confidence).unwrap_or(0.0);
    let risky = safety
        .map(|s| matches!(s.risk_level, RiskLevel::Moderate | RiskLevel::High))
        .unwrap_or(false);
    !validator.passed
        || matches!(validator.severity, Severity::Moderate | Severity::High)
        || confidence < VERIFY_CONFIDENCE_THRESHOLD
        || risky
}

//! Stage result types: everything produced after triage, plus the
//! consolidated shape returned for every request.
//!
//! Each stage has one concrete result struct. Stages that did not run are
//! represented by `StageOutcome::Skipped`/`Failed` sentinels so the
//! consolidated result always carries every field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{
    ApprovalDecision, Decision, EvidenceLevel, InterruptStage, OrchestrationPath,
    RiskLevel, Severity, VerificationVerdict,
};
use super::patient::PatientState;
use super::treatment::Recommendation;

/// A source citation collected from the generation service.
/// Keyed by URL within a single call; title and URL are always non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<String>,
}

/// Audit stamp attached to every assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentAudit {
    pub timestamp: DateTime<Utc>,
    pub algorithm_version: String,
}

impl AssessmentAudit {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            algorithm_version: "mermaid_v1".into(),
        }
    }
}

/// Standard 48-72 hour follow-up plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpPlan {
    pub assessment_timeframe: String,
    pub instructions: Vec<String>,
    pub red_flags_for_escalation: Vec<String>,
}

/// Follow-up plan enriched with patient-specific annotations.
/// Advisory only; never changes the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancedFollowUp {
    pub follow_up_plan: FollowUpPlan,
    pub monitoring_checklist: Vec<String>,
    pub special_instructions: Vec<String>,
    pub provider_actions: Vec<String>,
}

/// Output of the deterministic triage rule engine. Created once per request
/// and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentOutput {
    pub decision: Decision,
    /// Present only when the decision is recommend-treatment.
    pub recommendation: Option<Recommendation>,
    pub rationale: Vec<String>,
    pub follow_up: Option<FollowUpPlan>,
    pub audit: AssessmentAudit,
    #[serde(default)]
    pub triggered_complicating_factors: Vec<String>,
    #[serde(default)]
    pub triggered_recurrence_markers: Vec<String>,
    #[serde(default)]
    pub eligibility_criteria_met: bool,
    #[serde(default)]
    pub criteria_not_met_reasons: Vec<String>,
}

impl AssessmentOutput {
    /// One-block rendering embedded in prompts and doctor summaries.
    pub fn narrative(&self) -> String {
        let rec_text = self
            .recommendation
            .as_ref()
            .map(Recommendation::as_text)
            .unwrap_or_else(|| "None".into());
        let mut lines = vec![
            format!("Decision: {}", self.decision.as_str()),
            format!("Recommendation: {rec_text}"),
            format!("Rationale: {}", self.rationale.join("; ")),
        ];
        if let Some(fu) = &self.follow_up {
            lines.push(format!("Follow-up: {}", fu.assessment_timeframe));
        }
        lines.join(" \n")
    }
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("• {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Structured output of the clinical reasoning role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalReasoningOutput {
    pub reasoning: Vec<String>,
    /// Model-reported confidence in [0.0, 1.0].
    pub confidence: f64,
    pub differential_dx: Vec<String>,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub clinical_rationale: Vec<String>,
    pub stewardship_considerations: Vec<String>,
    pub citations: Vec<Citation>,
    /// Proposed regimen string when the decision is recommend-treatment,
    /// e.g. "Nitrofurantoin 100 mg PO BID x 5 days". Empty otherwise.
    pub proposed_regimen_text: String,
}

impl ClinicalReasoningOutput {
    pub fn as_narrative(&self) -> String {
        let mut parts = Vec::new();
        if !self.reasoning.is_empty() {
            parts.push(format!("Key reasoning:\n{}", bullets(&self.reasoning)));
        }
        if !self.recommendations.is_empty() {
            parts.push(format!(
                "Recommendations:\n{}",
                bullets(&self.recommendations)
            ));
        }
        if !self.stewardship_considerations.is_empty() {
            parts.push(format!(
                "Stewardship:\n{}",
                bullets(&self.stewardship_considerations)
            ));
        }
        if parts.is_empty() {
            "Clinical reasoning completed.".into()
        } else {
            parts.join("\n\n")
        }
    }
}

/// Structured output of the safety screening role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyValidationOutput {
    pub safety_flags: Vec<String>,
    pub contraindications: Vec<String>,
    pub drug_interactions: Vec<String>,
    pub monitoring_requirements: Vec<String>,
    pub risk_level: RiskLevel,
    pub approval_recommendation: ApprovalDecision,
    pub rationale: Option<String>,
    pub citations: Vec<Citation>,
}

impl Default for SafetyValidationOutput {
    fn default() -> Self {
        Self {
            safety_flags: Vec::new(),
            contraindications: Vec::new(),
            drug_interactions: Vec::new(),
            monitoring_requirements: Vec::new(),
            risk_level: RiskLevel::Unknown,
            approval_recommendation: ApprovalDecision::Undecided,
            rationale: None,
            citations: Vec::new(),
        }
    }
}

impl SafetyValidationOutput {
    pub fn as_narrative(&self) -> String {
        let mut highlights = vec![format!("Risk level: {}", self.risk_level.as_str())];
        if !self.contraindications.is_empty() {
            highlights.push(format!(
                "Contraindications:\n{}",
                bullets(&self.contraindications)
            ));
        }
        if !self.drug_interactions.is_empty() {
            highlights.push(format!(
                "Interactions:\n{}",
                bullets(&self.drug_interactions)
            ));
        }
        if !self.monitoring_requirements.is_empty() {
            highlights.push(format!(
                "Monitoring:\n{}",
                bullets(&self.monitoring_requirements)
            ));
        }
        highlights.join("\n\n")
    }
}

/// Short doctor-style narrative generated during deterministic interrupts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoctorSummary {
    pub narrative: String,
    pub confidence: f64,
    pub reasoning: Vec<String>,
}

/// Result of the regimen cross-check (second rule set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorResult {
    pub passed: bool,
    pub rules_fired: Vec<String>,
    pub contradictions: Vec<String>,
    pub severity: Severity,
}

/// Free-text evidence summary with citations from the research role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSummary {
    pub summary: String,
    pub region: String,
    pub citations: Vec<Citation>,
    pub narrative: String,
}

/// Prescribing guidance: fixed stewardship bullets plus patient-specific
/// contraindications and live resistance intelligence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescribingConsiderations {
    pub considerations: Vec<String>,
    pub region: String,
    pub citations: Vec<Citation>,
    pub narrative: String,
}

/// Provider-ready diagnosis brief from the diagnosis drafting role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub diagnosis: String,
    pub citations: Vec<Citation>,
    pub narrative: String,
}

/// One issue found during verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationIssue {
    pub issue_type: String,
    pub description: String,
    pub severity: Severity,
    pub components_affected: Vec<String>,
}

impl Default for VerificationIssue {
    fn default() -> Self {
        Self {
            issue_type: String::new(),
            description: String::new(),
            severity: Severity::Low,
            components_affected: Vec::new(),
        }
    }
}

/// Structured output of the verification role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationReport {
    pub contradictions: Vec<String>,
    pub unsupported_claims: Vec<String>,
    pub alignment_notes: Vec<String>,
    pub verdict: VerificationVerdict,
    pub issues: Vec<VerificationIssue>,
    pub confidence_score: f64,
}

impl Default for VerificationReport {
    fn default() -> Self {
        Self {
            contradictions: Vec::new(),
            unsupported_claims: Vec::new(),
            alignment_notes: Vec::new(),
            verdict: VerificationVerdict::NeedsReview,
            issues: Vec::new(),
            confidence_score: 0.0,
        }
    }
}

/// A single extracted claim with its supporting citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Claim {
    pub claim_text: String,
    pub evidence_level: EvidenceLevel,
    pub source_context: String,
    pub citations: Vec<Citation>,
}

impl Default for Claim {
    fn default() -> Self {
        Self {
            claim_text: String::new(),
            evidence_level: EvidenceLevel::Insufficient,
            source_context: String::new(),
            citations: Vec::new(),
        }
    }
}

/// Structured output of the claim extraction role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimExtractionOutput {
    pub claims: Vec<Claim>,
    pub extraction_metadata: serde_json::Value,
}

/// Outcome of one pipeline stage. Downstream consumers always read the full
/// result shape, so stages that did not run carry an explicit sentinel
/// instead of being absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Completed { output: T },
    /// Stage never ran: blocked by an interrupt or not applicable.
    Skipped {
        reason: String,
        interrupt_stage: Option<InterruptStage>,
    },
    /// Stage ran and failed after its internal retries; isolated so the
    /// rest of the request can still complete.
    Failed { reason: String },
}

impl<T> StageOutcome<T> {
    pub fn completed(output: T) -> Self {
        Self::Completed { output }
    }

    pub fn skipped(reason: impl Into<String>, interrupt_stage: Option<InterruptStage>) -> Self {
        Self::Skipped {
            reason: reason.into(),
            interrupt_stage,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn as_completed(&self) -> Option<&T> {
        match self {
            Self::Completed { output } => Some(output),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Traceability bundle: every stage's outcome plus the original input.
/// Built once at the end of a request, never partially persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditBundle {
    pub request_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub inputs: PatientState,
    pub assessment: AssessmentOutput,
    pub clinical_reasoning: StageOutcome<ClinicalReasoningOutput>,
    pub validator: StageOutcome<ValidatorResult>,
    pub safety_validation: StageOutcome<SafetyValidationOutput>,
    pub prescribing_considerations: StageOutcome<PrescribingConsiderations>,
    pub research_context: StageOutcome<ResearchSummary>,
    pub diagnosis: StageOutcome<DiagnosisReport>,
    pub verification_report: StageOutcome<VerificationReport>,
    pub claims_with_citations: StageOutcome<ClaimExtractionOutput>,
    pub consensus_recommendation: String,
}

/// The consolidated, fully-populated result of a complete assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    pub orchestration_path: OrchestrationPath,
    /// Set whenever the path is not `standard`.
    pub interrupt_stage: Option<InterruptStage>,
    pub assessment: AssessmentOutput,
    /// Narrative summary for human review on deterministic interrupts.
    pub doctor_summary: StageOutcome<DoctorSummary>,
    pub clinical_reasoning: StageOutcome<ClinicalReasoningOutput>,
    pub safety_validation: StageOutcome<SafetyValidationOutput>,
    pub prescribing_considerations: StageOutcome<PrescribingConsiderations>,
    pub research_context: StageOutcome<ResearchSummary>,
    pub diagnosis: StageOutcome<DiagnosisReport>,
    pub follow_up_details: StageOutcome<EnhancedFollowUp>,
    pub validator: StageOutcome<ValidatorResult>,
    pub verification_report: StageOutcome<VerificationReport>,
    pub claims_with_citations: StageOutcome<ClaimExtractionOutput>,
    /// Finalized regimen text or the deferral reason.
    pub consensus_recommendation: String,
    /// Confidence from clinical reasoning; 0.0 when reasoning never ran.
    pub confidence: f64,
    pub human_escalation: bool,
    /// Annotation only; does not change control flow.
    pub prescriber_signoff_required: bool,
    pub model: String,
    pub audit_bundle: AuditBundle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_outcome_serializes_with_status_tag() {
        let skipped: StageOutcome<DiagnosisReport> =
            StageOutcome::skipped("blocked", Some(InterruptStage::SafetyGate));
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["interrupt_stage"], "safety_gate");

        let failed: StageOutcome<DiagnosisReport> = StageOutcome::failed("boom");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "boom");
    }

    #[test]
    fn reasoning_output_parses_from_partial_json() {
        let out: ClinicalReasoningOutput = serde_json::from_value(serde_json::json!({
            "reasoning": ["meets criteria"],
            "confidence": 0.9
        }))
        .unwrap();
        assert_eq!(out.confidence, 0.9);
        assert!(out.proposed_regimen_text.is_empty());
        assert!(out.citations.is_empty());
    }

    #[test]
    fn safety_output_defaults_to_undecided() {
        let out: SafetyValidationOutput =
            serde_json::from_value(serde_json::json!({ "risk_level": "low" })).unwrap();
        assert_eq!(out.approval_recommendation, ApprovalDecision::Undecided);
        assert_eq!(out.risk_level, RiskLevel::Low);
    }

    #[test]
    fn reasoning_narrative_groups_sections() {
        let out = ClinicalReasoningOutput {
            reasoning: vec!["a".into()],
            recommendations: vec!["b".into()],
            stewardship_considerations: vec!["c".into()],
            ..Default::default()
        };
        let n = out.as_narrative();
        assert!(n.contains("Key reasoning:\n• a"));
        assert!(n.contains("Recommendations:\n• b"));
        assert!(n.contains("Stewardship:\n• c"));
    }

    #[test]
    fn empty_reasoning_narrative_has_fallback() {
        let out = ClinicalReasoningOutput::default();
        assert_eq!(out.as_narrative(), "Clinical reasoning completed.");
    }

    #[test]
    fn assessment_narrative_shows_none_without_recommendation() {
        let assessment = AssessmentOutput {
            decision: Decision::NoAntibioticsNotMet,
            recommendation: None,
            rationale: vec!["r1".into(), "r2".into()],
            follow_up: None,
            audit: AssessmentAudit::now(),
            triggered_complicating_factors: vec![],
            triggered_recurrence_markers: vec![],
            eligibility_criteria_met: false,
            criteria_not_met_reasons: vec![],
        };
        let n = assessment.narrative();
        assert!(n.contains("Recommendation: None"));
        assert!(n.contains("Rationale: r1; r2"));
    }
}

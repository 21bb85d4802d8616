//! Standard and enhanced 48-72 hour follow-up plans.

use crate::models::{
    AssessmentOutput, EnhancedFollowUp, FollowUpPlan, PatientState, RenalFunction,
};

/// Standard follow-up plan attached to every treatment decision.
pub fn standard_follow_up_plan() -> FollowUpPlan {
    FollowUpPlan {
        assessment_timeframe: "48-72 hours".into(),
        instructions: vec![
            "Complete documentation & notify a physician or nurse practitioner".into(),
            "Assess for improvement & side effects in 72 hours".into(),
        ],
        red_flags_for_escalation: vec![
            "Fever, rigors, or systemic symptoms".into(),
            "Worsening symptoms after 48-72 hours".into(),
            "Development of upper urinary tract or systemic disease".into(),
        ],
    }
}

/// Enhanced plan derived from a completed assessment. Appends advisory
/// special instructions for elderly patients, ACEI/ARB use, and impaired
/// renal function; never changes the decision itself.
pub fn enhanced_follow_up_plan(
    patient: &PatientState,
    assessment: &AssessmentOutput,
) -> EnhancedFollowUp {
    let monitoring_checklist = assessment
        .recommendation
        .as_ref()
        .map(|rec| rec.monitoring.clone())
        .unwrap_or_default();

    let mut special_instructions = Vec::new();
    if patient.age >= 65 {
        special_instructions.push("Monitor elderly patients closely for adverse effects".into());
    }
    if patient.history.acei_arb_use {
        special_instructions.push("Monitor for hyperkalemia if TMP/SMX prescribed".into());
    }
    if patient.renal_function_summary == RenalFunction::Impaired {
        special_instructions.push("Consider dose adjustment for renal impairment".into());
    }

    EnhancedFollowUp {
        follow_up_plan: standard_follow_up_plan(),
        monitoring_checklist,
        special_instructions,
        provider_actions: vec![
            "Complete documentation in medical record".into(),
            "Notify supervising physician or nurse practitioner".into(),
            "Schedule 72-hour follow-up contact".into(),
            "Provide patient education materials".into(),
        ],
    }
}

//! Prompt builders for each generation role. Prompts are XML-tagged blocks
//! with explicit output-contract instructions; structured roles demand
//! JSON-only responses matching their schema.

use crate::models::{
    AssessmentOutput, ClinicalReasoningOutput, PatientState, SafetyValidationOutput,
};

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

fn patient_block(patient: &PatientState) -> String {
    format!(
        "Age: {} years\n\
         Sex: {}\n\
         Pregnancy: {}\n\
         Renal function: {}\n\
         \n\
         Symptoms:\n\
         - Dysuria: {}\n\
         - Urgency: {}\n\
         - Frequency: {}\n\
         - Suprapubic pain: {}\n\
         - Hematuria: {}\n\
         \n\
         Red flags:\n\
         - Fever: {}\n\
         - Rigors: {}\n\
         - Flank pain: {}\n\
         - Nausea/vomiting: {}\n\
         - Systemic symptoms: {}\n\
         \n\
         History:\n\
         - Recent antibiotics (90d): {}\n\
         - Allergies: {}\n\
         - Current medications: {}\n\
         - ACEI/ARB use: {}\n\
         - Catheter: {}\n\
         - Kidney stones: {}\n\
         - Immunocompromised: {}\n\
         \n\
         Recurrence:\n\
         - Relapse within 4 weeks: {}\n\
         - >=2 UTIs in 6 months: {}\n\
         - >=3 UTIs in 12 months: {}",
        patient.age,
        patient.sex.as_str(),
        patient.pregnancy_status.as_str(),
        patient.renal_function_summary.as_str(),
        patient.symptoms.dysuria,
        patient.symptoms.urgency,
        patient.symptoms.frequency,
        patient.symptoms.suprapubic_pain,
        patient.symptoms.hematuria,
        patient.red_flags.fever,
        patient.red_flags.rigors,
        patient.red_flags.flank_pain,
        patient.red_flags.nausea_vomiting,
        patient.red_flags.systemic,
        patient.history.antibiotics_last_90d,
        join_or_none(&patient.history.allergies),
        join_or_none(&patient.history.meds),
        patient.history.acei_arb_use,
        patient.history.catheter,
        patient.history.stones,
        patient.history.immunocompromised,
        patient.recurrence.relapse_within_4w,
        patient.recurrence.recurrent_6m,
        patient.recurrence.recurrent_12m,
    )
}

fn json_or_empty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// Prompt for the clinical-reasoning role. `assessment` carries the
/// deterministic triage result for algorithm alignment.
pub fn clinical_reasoning_prompt(
    patient: &PatientState,
    assessment: Option<&AssessmentOutput>,
) -> String {
    let assessment_block = assessment
        .map(|a| format!("\n<ASSESSMENT_FULL>\n{}\n</ASSESSMENT_FULL>\n", json_or_empty(a)))
        .unwrap_or_default();
    format!(
        "<CLINICAL_REASONING_ASSESSMENT>\n\
         <INSTRUCTIONS>\n\
         - Output strictly valid JSON only with keys: reasoning[], confidence, \
           differential_dx[], risk_factors[], recommendations[], clinical_rationale[], \
           stewardship_considerations[], citations[], proposed_regimen_text.\n\
         - Map key clinical findings to the assessment criteria and evaluate every \
           red flag with explicit escalation triggers.\n\
         - differential_dx[] should include 4-6 possibilities with brief ruled-in/\
           ruled-out justifications.\n\
         - confidence must be a float in [0.0, 1.0].\n\
         - citations[] are objects with title, url, and a relevance explanation. \
           Do NOT embed citation URLs in reasoning text.\n\
         - No text outside the JSON object.\n\
         </INSTRUCTIONS>\n\
         <DECISION_RULES>\n\
         - If ASSESSMENT_FULL.decision == \"recommend_treatment\": set \
           proposed_regimen_text to the single best regimen string, including agent, \
           dose, route, frequency, and duration \
           (e.g., \"Nitrofurantoin 100 mg PO BID x 5 days\").\n\
         - Else: set proposed_regimen_text to an empty string.\n\
         </DECISION_RULES>\n\
         \n\
         <PATIENT_DATA>\n{}\n</PATIENT_DATA>\n\
         \n\
         <TASK>\n\
         Provide an expert clinical reasoning assessment as JSON using the specified \
         keys. Do not include any text outside the JSON object.\n\
         </TASK>\n{}\
         </CLINICAL_REASONING_ASSESSMENT>",
        patient_block(patient),
        assessment_block,
    )
}

/// Prompt for the safety-screening role.
pub fn safety_validation_prompt(
    patient: &PatientState,
    decision: &str,
    recommendation_text: &str,
    clinical_reasoning: Option<&ClinicalReasoningOutput>,
) -> String {
    let doctor_block = clinical_reasoning
        .map(|cr| format!("\n<DOCTOR_REASONING>\n{}\n</DOCTOR_REASONING>\n", json_or_empty(cr)))
        .unwrap_or_default();
    format!(
        "<SAFETY_VALIDATION_ASSESSMENT>\n\
         <INSTRUCTIONS>\n\
         - Output strictly valid JSON only with keys: safety_flags[], \
           contraindications[], drug_interactions[], monitoring_requirements[], \
           risk_level, approval_recommendation, rationale, citations[].\n\
         - risk_level must be one of: low, moderate, high.\n\
         - approval_recommendation must be one of: approve, conditional, modify, \
           reject, do not start, refer_no_antibiotics.\n\
         - If the clinical decision indicates referral or non-antibiotic management, \
           explicitly state that antibiotic initiation is not recommended.\n\
         - Address common UTI agents (nitrofurantoin, TMP/SMX, fosfomycin, \
           trimethoprim), including hyperkalemia risk with TMP/SMX in patients taking \
           ACEI/ARB, nitrofurantoin in severe renal impairment or late pregnancy, and \
           fosfomycin age restrictions.\n\
         - No text outside the JSON object.\n\
         </INSTRUCTIONS>\n\
         \n\
         <PATIENT_SAFETY_PROFILE>\n\
         Age: {} years\n\
         Sex: {}\n\
         Pregnancy: {}\n\
         Renal function: {}\n\
         Known allergies: {}\n\
         Current medications: {}\n\
         ACEI/ARB use: {}\n\
         Immunocompromised: {}\n\
         </PATIENT_SAFETY_PROFILE>\n\
         \n\
         <PROPOSED_TREATMENT>\n\
         Clinical decision: {}\n\
         Recommended regimen to screen: {}\n\
         Notes:\n\
         - If DOCTOR_REASONING.proposed_regimen_text is present, that is the \
           clinician-proposed regimen to screen.\n\
         - The assessment's recommendation provides algorithmic context only.\n\
         </PROPOSED_TREATMENT>\n{}\
         </SAFETY_VALIDATION_ASSESSMENT>",
        patient.age,
        patient.sex.as_str(),
        patient.pregnancy_status.as_str(),
        patient.renal_function_summary.as_str(),
        join_or_none(&patient.history.allergies),
        join_or_none(&patient.history.meds),
        patient.history.acei_arb_use,
        patient.history.immunocompromised,
        decision,
        recommendation_text,
        doctor_block,
    )
}

/// Prompt asking the reasoning role to revise its output against the
/// safety critique. Same output keys as the initial reasoning call.
pub fn reasoning_refinement_prompt(
    patient: &PatientState,
    initial: &ClinicalReasoningOutput,
    safety_feedback: &SafetyValidationOutput,
) -> String {
    format!(
        "<CLINICAL_REASONING_REFINEMENT>\n\
         <INSTRUCTIONS>\n\
         - You previously produced a Clinical Reasoning JSON object. A pharmacist \
           safety review has provided critique.\n\
         - Revise your reasoning to incorporate the pharmacist feedback.\n\
         - Output strictly valid JSON only with the SAME keys as before.\n\
         - If the pharmacist indicates modify/conditional/reject, your \
           recommendations must reflect that.\n\
         - No text outside the JSON object.\n\
         </INSTRUCTIONS>\n\
         \n\
         <PATIENT_DATA>\n\
         Age: {} years\n\
         Sex: {}\n\
         Pregnancy: {}\n\
         Renal function: {}\n\
         </PATIENT_DATA>\n\
         \n\
         <INITIAL_DOCTOR_REASONING>\n{}\n</INITIAL_DOCTOR_REASONING>\n\
         \n\
         <PHARMACIST_FEEDBACK>\n{}\n</PHARMACIST_FEEDBACK>\n\
         </CLINICAL_REASONING_REFINEMENT>",
        patient.age,
        patient.sex.as_str(),
        patient.pregnancy_status.as_str(),
        patient.renal_function_summary.as_str(),
        json_or_empty(initial),
        json_or_empty(safety_feedback),
    )
}

/// Prompt for the evidence-synthesis role.
pub fn web_research_prompt(query: &str, region: &str) -> String {
    format!(
        "<CLINICAL_RESEARCH_REQUEST>\n\
         <INSTRUCTIONS>\n\
         - Synthesize current UTI clinical guidelines, antimicrobial resistance \
           patterns, and treatment recommendations for the query below.\n\
         - Anchor to the specified region; when extrapolating from other \
           jurisdictions, state the limitation.\n\
         - Use crisp bullet points. Name guideline publishers and publication years. \
           Include resistance percentages when available.\n\
         - Limit to 1000 words. Avoid duplicate citations.\n\
         </INSTRUCTIONS>\n\
         \n\
         <RESEARCH_PARAMETERS>\n\
         Query: {}\n\
         Region: {} (prefer Canadian and Ontario sources and guidelines)\n\
         Focus: Clinical evidence, treatment guidelines, resistance patterns\n\
         </RESEARCH_PARAMETERS>\n\
         \n\
         <OUTPUT_FORMAT>\n\
         Sectioned bullet summary: Guidelines, Resistance, Comparative efficacy, \
         Limitations.\n\
         </OUTPUT_FORMAT>\n\
         </CLINICAL_RESEARCH_REQUEST>",
        query, region,
    )
}

/// Prompt for the provider-facing diagnosis brief.
pub fn diagnosis_prompt(
    patient: &PatientState,
    assessment: &AssessmentOutput,
    doctor_reasoning: Option<&ClinicalReasoningOutput>,
    safety: Option<&SafetyValidationOutput>,
) -> String {
    let rec_text = assessment
        .recommendation
        .as_ref()
        .map(|r| r.as_text())
        .unwrap_or_else(|| "None".to_string());
    let doctor_block = doctor_reasoning
        .map(|dr| format!("\n<DOCTOR_REASONING>\n{}\n</DOCTOR_REASONING>\n", json_or_empty(dr)))
        .unwrap_or_default();
    let safety_block = safety
        .map(|sv| format!("\n<PHARMACIST_SAFETY>\n{}\n</PHARMACIST_SAFETY>\n", json_or_empty(sv)))
        .unwrap_or_default();
    format!(
        "<CLINICAL_DIAGNOSIS_TASK>\n\
         <INSTRUCTIONS>\n\
         - Produce a provider-ready clinical diagnosis and treatment brief in \
           professional Markdown.\n\
         - Required sections: Executive Summary; Algorithm Alignment; Differential \
           Diagnosis; Therapeutic Plan & Justification; Safety Review Summary; \
           Monitoring & Follow-up; Patient Counseling; Evidence Pointers.\n\
         - Place citation URLs only in Evidence Pointers; citations are captured \
           separately from the stream.\n\
         </INSTRUCTIONS>\n\
         \n\
         <PATIENT_CONTEXT>\n\
         Region: {}\n\
         {}\n\
         \n\
         <ASSESSMENT_RESULTS>\n\
         Decision: {}\n\
         Recommendation: {}\n\
         Clinical rationale: {}\n\
         Follow-up plan: {}\n\
         </ASSESSMENT_RESULTS>\n{}{}\
         </PATIENT_CONTEXT>\n\
         </CLINICAL_DIAGNOSIS_TASK>",
        patient.locale_code,
        patient_block(patient),
        assessment.decision.as_str(),
        rec_text,
        assessment.rationale.join(" | "),
        assessment
            .follow_up
            .as_ref()
            .map(|f| f.assessment_timeframe.as_str())
            .unwrap_or("Standard UTI follow-up"),
        doctor_block,
        safety_block,
    )
}

/// Prompt for the plan-verification role over the consolidated snapshot.
pub fn verifier_prompt(final_snapshot: &serde_json::Value) -> String {
    format!(
        "<PLAN_VERIFICATION>\n\
         <INSTRUCTIONS>\n\
         - Output strictly valid JSON with keys: contradictions[], \
           unsupported_claims[], alignment_notes[], verdict.\n\
         - verdict must be one of: pass, needs_review, fail.\n\
         - Flag any recommendation that contradicts safety gating or the \
           algorithmic decision.\n\
         - Identify claims without clear evidence support or citations.\n\
         </INSTRUCTIONS>\n\
         <CONTEXT>\n{}\n</CONTEXT>\n\
         </PLAN_VERIFICATION>",
        final_snapshot,
    )
}

/// Prompt for the claims-and-citations extraction role.
pub fn claim_extractor_prompt(final_snapshot: &serde_json::Value) -> String {
    format!(
        "<CLAIMS_AND_CITATIONS>\n\
         <INSTRUCTIONS>\n\
         - Extract concise claims from the assessment rationale, clinical \
           reasoning, and diagnosis.\n\
         - For each claim, map citation URLs from the captured citations with a \
           one-line relevance.\n\
         - Deduplicate URLs within a claim; the same URL may support multiple \
           claims.\n\
         - Output strictly valid JSON with key 'claims'.\n\
         </INSTRUCTIONS>\n\
         <CONTEXT>\n{}\n</CONTEXT>\n\
         </CLAIMS_AND_CITATIONS>",
        final_snapshot,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        History, PregnancyStatus, Recurrence, RedFlags, RenalFunction, Sex, Symptoms,
    };

    fn patient() -> PatientState {
        PatientState {
            age: 25,
            sex: Sex::Female,
            pregnancy_status: PregnancyStatus::NotPregnant,
            renal_function_summary: RenalFunction::Normal,
            egfr_ml_min: None,
            symptoms: Symptoms {
                dysuria: true,
                ..Default::default()
            },
            red_flags: RedFlags::default(),
            history: History {
                allergies: vec!["Penicillin".into()],
                ..Default::default()
            },
            recurrence: Recurrence::default(),
            locale_code: "CA-ON".into(),
            asymptomatic_bacteriuria: false,
        }
        .validated()
        .unwrap()
    }

    #[test]
    fn reasoning_prompt_embeds_patient_and_assessment() {
        let p = patient();
        let assessment = crate::triage::assess(&p);
        let prompt = clinical_reasoning_prompt(&p, Some(&assessment));
        assert!(prompt.contains("Age: 25 years"));
        assert!(prompt.contains("Allergies: Penicillin"));
        assert!(prompt.contains("<ASSESSMENT_FULL>"));
    }

    #[test]
    fn reasoning_prompt_omits_block_without_assessment() {
        let prompt = clinical_reasoning_prompt(&patient(), None);
        assert!(!prompt.contains("<ASSESSMENT_FULL>"));
    }

    #[test]
    fn safety_prompt_carries_regimen_and_decision() {
        let prompt = safety_validation_prompt(
            &patient(),
            "recommend_treatment",
            "Nitrofurantoin macrocrystals 100 mg PO BID x 5 days",
            None,
        );
        assert!(prompt.contains("Clinical decision: recommend_treatment"));
        assert!(prompt.contains("100 mg PO BID x 5 days"));
        assert!(!prompt.contains("<DOCTOR_REASONING>"));
    }

    #[test]
    fn research_prompt_anchors_region() {
        let prompt = web_research_prompt("uncomplicated cystitis first-line", "CA-ON");
        assert!(prompt.contains("Region: CA-ON"));
    }
}

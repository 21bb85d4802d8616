//! Deterministic triage rule engine.
//!
//! `assess` is a pure function: the same patient record always produces the
//! same decision, recommendation, and triggered-factor lists (the audit
//! timestamp is the only clock-dependent field). Steps run in strict order
//! and short-circuit at the first matching terminal.

use crate::models::{
    spec_for, AssessmentAudit, AssessmentOutput, Decision, MedicationAgent, PatientState,
    Recommendation, RenalFunction, Sex, PREFERRED_ORDER, TMP_SMX_ALLERGY_TERMS,
};

use super::follow_up::standard_follow_up_plan;

/// UTI symptom criteria: dysuria, OR at least two of
/// urgency/frequency/suprapubic pain/hematuria.
pub fn meets_symptom_criteria(patient: &PatientState) -> bool {
    let s = &patient.symptoms;
    let secondary = [s.urgency, s.frequency, s.suprapubic_pain, s.hematuria]
        .iter()
        .filter(|b| **b)
        .count();
    s.dysuria || secondary >= 2
}

/// Complicating factors that preclude pharmacist-initiated therapy.
/// Returns the triggered factor names in check order.
pub fn complicating_factors(patient: &PatientState) -> Vec<String> {
    let mut factors = Vec::new();

    if patient.red_flags.any() {
        factors.push("systemic_or_upper_tract_symptoms".into());
    }
    if patient.sex == Sex::Male {
        factors.push("male_patient".into());
    }
    if patient.sex == Sex::Female && !patient.pregnancy_status.excludes_pregnancy() {
        factors.push("pregnancy".into());
    }
    if patient.age < 12 {
        factors.push("pediatric_<12y".into());
    }
    if patient.history.immunocompromised {
        factors.push("immunocompromised".into());
    }
    if patient.history.catheter
        || patient.history.neurogenic_bladder
        || patient.history.stones
        || patient.renal_function_summary != RenalFunction::Normal
    {
        factors.push("abnormal_urinary_tract_or_function".into());
    }

    factors
}

/// Recurrence/relapse check. First match wins: relapse within 4 weeks is
/// checked before the 6-month and 12-month recurrence definitions.
pub fn recurrence_reason(patient: &PatientState) -> Option<&'static str> {
    let r = &patient.recurrence;
    let patterns: [(bool, &'static str); 3] = [
        (r.relapse_within_4w, "relapse ≤4 weeks after treatment"),
        (r.recurrent_6m, "recurrent UTI: ≥2 in 6 months"),
        (r.recurrent_12m, "recurrent UTI: ≥3 in 12 months"),
    ];
    patterns
        .into_iter()
        .find(|(fired, _)| *fired)
        .map(|(_, reason)| reason)
}

fn agent_allowed(patient: &PatientState, agent: MedicationAgent) -> bool {
    let history = &patient.history;

    // Recent antibiotic exposure excludes every agent.
    if history.antibiotics_last_90d {
        return false;
    }

    match agent {
        MedicationAgent::Nitrofurantoin => {
            !history.has_allergy_term("nitrofurantoin")
                && !matches!(patient.egfr_ml_min, Some(egfr) if egfr < 30.0)
        }
        MedicationAgent::TmpSmx => {
            !TMP_SMX_ALLERGY_TERMS
                .iter()
                .any(|term| history.has_allergy_term(term))
                && !history.acei_arb_use
        }
        MedicationAgent::Trimethoprim => !history.has_allergy_term("trimethoprim"),
        MedicationAgent::Fosfomycin => {
            patient.age >= 18 && !history.has_allergy_term("fosfomycin")
        }
    }
}

/// Select the first allowed agent in preference order. `None` when every
/// first-line option is excluded.
pub fn select_treatment(patient: &PatientState) -> Option<Recommendation> {
    PREFERRED_ORDER
        .iter()
        .copied()
        .find(|agent| agent_allowed(patient, *agent))
        .map(|agent| Recommendation::from_spec(spec_for(agent)))
}

fn describe_factor(factor: &str) -> &str {
    match factor {
        "systemic_or_upper_tract_symptoms" => {
            "upper urinary tract or systemic disease with red flag symptoms including \
             fever, rigors, flank pain, back pain, nausea, or vomiting"
        }
        "male_patient" => "male sex, which increases complexity and risk of complications",
        "pregnancy" => "pregnancy, which requires specialized antibiotic selection and monitoring",
        "pediatric_<12y" => "age less than 12 years, requiring pediatric specialist management",
        "immunocompromised" => {
            "immunocompromised status, increasing risk of treatment failure and complications"
        }
        "abnormal_urinary_tract_or_function" => {
            "abnormal urinary tract function or structure including indwelling catheter, \
             neurogenic bladder, renal stones, or renal dysfunction"
        }
        other => other,
    }
}

fn describe_recurrence(reason: &str) -> String {
    match reason {
        "relapse ≤4 weeks after treatment" => {
            "This patient experienced a relapse of UTI symptoms within 4 weeks of completing \
             previous antibiotic treatment, suggesting possible treatment failure, antimicrobial \
             resistance, or underlying predisposing factors."
                .into()
        }
        "recurrent UTI: ≥2 in 6 months" => {
            "This patient has experienced 2 or more UTI episodes within the past 6 months, \
             meeting the definition for recurrent urinary tract infection."
                .into()
        }
        "recurrent UTI: ≥3 in 12 months" => {
            "This patient has experienced 3 or more UTI episodes within the past 12 months, \
             meeting the definition for recurrent urinary tract infection."
                .into()
        }
        other => format!("This patient presents with a recurrence pattern: {other}."),
    }
}

/// Run the full triage algorithm. Every terminal carries a human-readable
/// rationale; no branch is rationale-free.
pub fn assess(patient: &PatientState) -> AssessmentOutput {
    let mut rationale: Vec<String> = Vec::new();

    // Step 1: asymptomatic bacteriuria means no antibiotics, regardless of
    // any other field.
    if patient.asymptomatic_bacteriuria {
        return AssessmentOutput {
            decision: Decision::NoAntibioticsNotMet,
            recommendation: None,
            rationale: vec![
                "This patient presents with asymptomatic bacteriuria, which does not warrant \
                 antibiotic treatment according to current UTI management guidelines."
                    .into(),
                "The assessment algorithm specifically states that antibiotics should not be \
                 prescribed for asymptomatic bacteriuria, even when bacteria are present in \
                 urine cultures."
                    .into(),
            ],
            follow_up: None,
            audit: AssessmentAudit::now(),
            triggered_complicating_factors: vec![],
            triggered_recurrence_markers: vec![],
            eligibility_criteria_met: false,
            criteria_not_met_reasons: vec!["Asymptomatic bacteriuria present".into()],
        };
    }

    // Step 2: symptom eligibility.
    if !meets_symptom_criteria(patient) {
        if patient.symptoms.has_nonspecific() {
            return AssessmentOutput {
                decision: Decision::ReferComplicated,
                recommendation: None,
                rationale: vec![
                    "While this patient does not meet the standard criteria for uncomplicated \
                     cystitis, they present with nonspecific symptoms such as confusion, \
                     delirium, or gross hematuria."
                        .into(),
                    "Patients with these nonspecific symptoms should be referred to a physician \
                     or nurse practitioner for further investigation to rule out other \
                     conditions."
                        .into(),
                ],
                follow_up: None,
                audit: AssessmentAudit::now(),
                triggered_complicating_factors: vec![],
                triggered_recurrence_markers: vec![],
                eligibility_criteria_met: false,
                criteria_not_met_reasons: vec![
                    "Nonspecific symptoms requiring physician evaluation".into(),
                ],
            };
        }
        return AssessmentOutput {
            decision: Decision::NoAntibioticsNotMet,
            recommendation: None,
            rationale: vec![
                "This patient does not meet the diagnostic criteria for acute uncomplicated \
                 cystitis."
                    .into(),
                "The algorithm requires either acute dysuria OR at least two of the following \
                 symptoms: urinary urgency, frequency, suprapubic pain, or hematuria. This \
                 patient's presentation does not fulfill these requirements."
                    .into(),
                "Antibiotic treatment is not indicated when UTI criteria are not met, as this \
                 could contribute to unnecessary antibiotic resistance and adverse effects."
                    .into(),
            ],
            follow_up: None,
            audit: AssessmentAudit::now(),
            triggered_complicating_factors: vec![],
            triggered_recurrence_markers: vec![],
            eligibility_criteria_met: false,
            criteria_not_met_reasons: vec!["Insufficient symptoms for UTI diagnosis".into()],
        };
    }

    rationale.push(
        "This patient meets the diagnostic criteria for acute uncomplicated cystitis based on \
         their symptom presentation."
            .into(),
    );

    // Step 3: complicating factors.
    let complications = complicating_factors(patient);
    if !complications.is_empty() {
        let detailed: Vec<&str> = complications.iter().map(|c| describe_factor(c)).collect();
        return AssessmentOutput {
            decision: Decision::ReferComplicated,
            recommendation: None,
            rationale: vec![
                format!(
                    "This patient presents with complicating factors that preclude \
                     pharmacist-initiated antibiotic therapy: {}.",
                    detailed.join(", ")
                ),
                "Patients with any complicating factors should be referred to a physician or \
                 nurse practitioner for comprehensive evaluation and management."
                    .into(),
                "These factors increase the risk of treatment failure, complications, and the \
                 need for alternative diagnostic approaches or specialized antimicrobial \
                 regimens."
                    .into(),
            ],
            follow_up: None,
            audit: AssessmentAudit::now(),
            triggered_complicating_factors: complications,
            triggered_recurrence_markers: vec![],
            eligibility_criteria_met: true,
            criteria_not_met_reasons: vec![],
        };
    }

    rationale.push(
        "No complicating factors were identified that would preclude pharmacist-initiated \
         treatment."
            .into(),
    );

    // Step 4: recurrence or relapse.
    if let Some(reason) = recurrence_reason(patient) {
        return AssessmentOutput {
            decision: Decision::ReferRecurrence,
            recommendation: None,
            rationale: vec![
                describe_recurrence(reason),
                "Patients experiencing relapse or recurrent infections should be referred to a \
                 physician or nurse practitioner for comprehensive evaluation."
                    .into(),
                "Recurrent UTIs may indicate underlying anatomical abnormalities, functional \
                 disorders, antimicrobial resistance, or other predisposing factors that \
                 require specialized investigation and management."
                    .into(),
            ],
            follow_up: None,
            audit: AssessmentAudit::now(),
            triggered_complicating_factors: vec![],
            triggered_recurrence_markers: vec![reason.into()],
            eligibility_criteria_met: true,
            criteria_not_met_reasons: vec![],
        };
    }

    rationale.push(
        "No recurrence or relapse pattern was detected based on the patient's UTI history.".into(),
    );

    // Step 5: treatment selection.
    let Some(recommendation) = select_treatment(patient) else {
        return AssessmentOutput {
            decision: Decision::ReferComplicated,
            recommendation: None,
            rationale: vec![
                "No safe first-line antibiotic option is available for this patient based on \
                 their individual risk factors."
                    .into(),
                "Factors such as significant allergies, impaired renal function, drug \
                 interactions, or recent antibiotic exposure have eliminated all standard \
                 treatment options."
                    .into(),
                "This patient requires physician or nurse practitioner assessment to determine \
                 alternative antimicrobial therapy or specialized management approaches."
                    .into(),
            ],
            follow_up: None,
            audit: AssessmentAudit::now(),
            triggered_complicating_factors: vec![],
            triggered_recurrence_markers: vec![],
            eligibility_criteria_met: true,
            criteria_not_met_reasons: vec![],
        };
    };

    rationale.push(format!(
        "Based on the patient's clinical profile, {} has been selected as the most appropriate \
         first-line treatment option.",
        recommendation.regimen
    ));

    // Step 6: attach the standard 48-72 hour follow-up plan.
    AssessmentOutput {
        decision: Decision::RecommendTreatment,
        recommendation: Some(recommendation),
        rationale,
        follow_up: Some(standard_follow_up_plan()),
        audit: AssessmentAudit::now(),
        triggered_complicating_factors: vec![],
        triggered_recurrence_markers: vec![],
        eligibility_criteria_met: true,
        criteria_not_met_reasons: vec![],
    }
}

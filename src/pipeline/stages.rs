//! Per-stage wrappers: one async function per generation stage, each
//! turning an executor call into its typed result.

use tracing::instrument;

use crate::generation::{prompts, roles, GenerationError, GenerationExecutor, GenerationTransport};
use crate::models::{
    AssessmentOutput, Citation, ClinicalReasoningOutput, Decision, DiagnosisReport, DoctorSummary,
    PatientState, PrescribingConsiderations, Recommendation, ResearchSummary,
    SafetyValidationOutput,
};

/// Fixed stewardship bullets included in every prescribing-considerations
/// result, ahead of patient-specific and live-research lines.
static STEWARDSHIP_CONSIDERATIONS: &[&str] = &[
    "Urine cultures are not routinely recommended for acute uncomplicated cystitis \
     in non-pregnant women, as empirical therapy is typically effective and culture \
     results rarely change management in straightforward cases.",
    "Escherichia coli remains the most common causative organism in uncomplicated \
     cystitis, accounting for approximately 80-90% of cases in otherwise healthy women.",
    "While fosfomycin demonstrates low resistance rates, clinical studies suggest it \
     may be slightly less effective than nitrofurantoin for treating uncomplicated \
     cystitis, supporting nitrofurantoin as the primary first-line choice.",
    "Pediatric patients aged 12 years and older may require weight-based dosing \
     adjustments for certain antibiotics, and prescribers should consult pediatric \
     dosing guidelines for optimal therapeutic outcomes.",
    "Fosfomycin is not indicated for patients under 18 years of age due to limited \
     safety and efficacy data in this population.",
    "Clinical decision-making must account for patient-specific factors including \
     documented allergies and intolerances, recent antimicrobial use within the past \
     3 months, and previous culture results when available.",
    "Healthcare providers should monitor for potential drug-drug interactions, \
     particularly the risk of hyperkalemia when prescribing \
     trimethoprim-sulfamethoxazole to patients taking ACE inhibitors or ARBs.",
    "Short-course antimicrobial therapy (3-5 days) is strongly favored for \
     uncomplicated cystitis, as it provides equivalent clinical efficacy while \
     reducing the risk of adverse effects, antimicrobial resistance, and \
     Clostridioides difficile infection.",
];

/// Merge stream-captured citations into structured-output citations,
/// keeping first-seen order and URL uniqueness.
fn merge_citations(into: &mut Vec<Citation>, extra: Vec<Citation>) {
    for citation in extra {
        if !into.iter().any(|c| c.url == citation.url) {
            into.push(citation);
        }
    }
}

/// Clinical-reasoning stage: structured reasoning against the triage result.
#[instrument(skip_all, fields(decision = %assessment.map(|a| a.decision.as_str()).unwrap_or("none")))]
pub async fn clinical_reasoning<T: GenerationTransport>(
    executor: &GenerationExecutor<T>,
    patient: &PatientState,
    assessment: Option<&AssessmentOutput>,
) -> Result<ClinicalReasoningOutput, GenerationError> {
    let prompt = prompts::clinical_reasoning_prompt(patient, assessment);
    let (mut output, raw): (ClinicalReasoningOutput, _) = executor
        .execute_structured(&roles::CLINICAL_REASONING, &prompt)
        .await?;
    merge_citations(&mut output.citations, raw.citations);
    Ok(output)
}

/// Refinement pass: the reasoning role revises its output against the
/// safety critique. Same schema as the initial call.
#[instrument(skip_all)]
pub async fn reasoning_refinement<T: GenerationTransport>(
    executor: &GenerationExecutor<T>,
    patient: &PatientState,
    initial: &ClinicalReasoningOutput,
    safety: &SafetyValidationOutput,
) -> Result<ClinicalReasoningOutput, GenerationError> {
    let prompt = prompts::reasoning_refinement_prompt(patient, initial, safety);
    let (mut output, raw): (ClinicalReasoningOutput, _) = executor
        .execute_structured(&roles::CLINICAL_REASONING, &prompt)
        .await?;
    merge_citations(&mut output.citations, raw.citations);
    Ok(output)
}

/// Safety-screening stage. When the decision recommends treatment and the
/// clinician proposed a regimen, that proposal is what gets screened; the
/// algorithmic recommendation is context only.
#[instrument(skip_all, fields(decision = decision.as_str()))]
pub async fn safety_validation<T: GenerationTransport>(
    executor: &GenerationExecutor<T>,
    patient: &PatientState,
    decision: Decision,
    recommendation: Option<&Recommendation>,
    reasoning: Option<&ClinicalReasoningOutput>,
) -> Result<SafetyValidationOutput, GenerationError> {
    let mut rec_text = recommendation
        .map(Recommendation::as_text)
        .unwrap_or_else(|| "None".to_string());
    if decision == Decision::RecommendTreatment {
        if let Some(proposed) = reasoning.map(|r| r.proposed_regimen_text.trim()) {
            if !proposed.is_empty() {
                rec_text = proposed.to_string();
            }
        }
    }
    let prompt = prompts::safety_validation_prompt(patient, decision.as_str(), &rec_text, reasoning);
    let (mut output, raw): (SafetyValidationOutput, _) = executor
        .execute_structured(&roles::SAFETY_VALIDATION, &prompt)
        .await?;
    merge_citations(&mut output.citations, raw.citations);
    Ok(output)
}

/// Evidence-synthesis stage: free text plus stream-captured citations.
#[instrument(skip(executor))]
pub async fn web_research<T: GenerationTransport>(
    executor: &GenerationExecutor<T>,
    query: &str,
    region: &str,
) -> Result<ResearchSummary, GenerationError> {
    let prompt = prompts::web_research_prompt(query, region);
    let result = executor.execute(&roles::WEB_RESEARCH, &prompt).await?;
    let narrative = if result.text.is_empty() {
        format!("Evidence summary for {region}.")
    } else {
        result.text.clone()
    };
    Ok(ResearchSummary {
        summary: result.text,
        region: region.to_string(),
        citations: result.citations,
        narrative,
    })
}

/// Prescribing-considerations stage: fixed stewardship bullets, the
/// regional resistance line, patient-specific contraindications from the
/// triage recommendation, and a live resistance-intelligence suffix from an
/// embedded research call.
#[instrument(skip(executor, patient))]
pub async fn prescribing_considerations<T: GenerationTransport>(
    executor: &GenerationExecutor<T>,
    patient: &PatientState,
    region: &str,
) -> Result<PrescribingConsiderations, GenerationError> {
    let mut considerations: Vec<String> = STEWARDSHIP_CONSIDERATIONS
        .iter()
        .map(|s| s.to_string())
        .collect();
    considerations.insert(
        2,
        format!(
            "Current antimicrobial resistance surveillance data for Ontario indicates \
             E. coli resistance rates of approximately 3% for nitrofurantoin and 20% \
             for trimethoprim-sulfamethoxazole, making nitrofurantoin the preferred \
             first-line agent (region: {region})."
        ),
    );

    let assessment = crate::triage::assess(patient);
    if let Some(rec) = &assessment.recommendation {
        considerations.extend(
            rec.contraindications
                .iter()
                .map(|ci| format!("Patient-specific: {ci}")),
        );
    }

    let research = web_research(
        executor,
        "Latest regional resistance and any UTI guideline updates (concise)",
        region,
    )
    .await?;
    if !research.summary.is_empty() {
        considerations.push(format!(
            "Current resistance intelligence: {}",
            research.summary
        ));
    }

    let formatted: Vec<String> = considerations
        .iter()
        .map(|c| {
            if c.starts_with("Patient-specific:")
                || c.starts_with("Current resistance intelligence:")
            {
                format!("\n{c}")
            } else {
                format!("• {c}")
            }
        })
        .collect();
    let narrative = format!("Prescribing Considerations:\n\n{}", formatted.join("\n"));

    Ok(PrescribingConsiderations {
        considerations,
        region: region.to_string(),
        citations: research.citations,
        narrative,
    })
}

/// Diagnosis-brief stage: provider-ready Markdown drawing on the triage
/// result, the reasoning output, and the safety screen.
#[instrument(skip_all)]
pub async fn deep_research_diagnosis<T: GenerationTransport>(
    executor: &GenerationExecutor<T>,
    patient: &PatientState,
    assessment: &AssessmentOutput,
    reasoning: Option<&ClinicalReasoningOutput>,
    safety: Option<&SafetyValidationOutput>,
) -> Result<DiagnosisReport, GenerationError> {
    let prompt = prompts::diagnosis_prompt(patient, assessment, reasoning, safety);
    let result = executor.execute(&roles::DIAGNOSIS, &prompt).await?;
    Ok(DiagnosisReport {
        narrative: result.text.clone(),
        diagnosis: result.text,
        citations: result.citations,
    })
}

/// Doctor-style narrative for deterministic interrupts: reuses the
/// reasoning role and flattens its output to a short summary.
#[instrument(skip_all)]
pub async fn doctor_summary<T: GenerationTransport>(
    executor: &GenerationExecutor<T>,
    patient: &PatientState,
    assessment: &AssessmentOutput,
) -> Result<DoctorSummary, GenerationError> {
    let reasoning = clinical_reasoning(executor, patient, Some(assessment)).await?;
    Ok(DoctorSummary {
        narrative: reasoning.as_narrative().trim().to_string(),
        confidence: reasoning.confidence,
        reasoning: reasoning.reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_merge_is_url_unique() {
        let mut base = vec![Citation {
            title: "A".into(),
            url: "https://example.org/a".into(),
            relevance: None,
        }];
        merge_citations(
            &mut base,
            vec![
                Citation {
                    title: "A again".into(),
                    url: "https://example.org/a".into(),
                    relevance: None,
                },
                Citation {
                    title: "B".into(),
                    url: "https://example.org/b".into(),
                    relevance: None,
                },
            ],
        );
        assert_eq!(base.len(), 2);
        assert_eq!(base[0].title, "A");
    }

    #[test]
    fn stewardship_bullets_cover_known_pitfalls() {
        let joined = STEWARDSHIP_CONSIDERATIONS.join(" ");
        assert!(joined.contains("hyperkalemia"));
        assert!(joined.contains("under 18 years"));
        assert!(joined.contains("Short-course"));
    }
}

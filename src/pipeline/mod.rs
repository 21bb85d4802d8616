//! Orchestration pipeline: deterministic triage first, then the generation
//! stages, gated at three points (deterministic, safety, validator). Every
//! terminal path returns the same consolidated shape; stages that never ran
//! carry explicit sentinels.

pub mod consensus;
pub mod stages;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::generation::{
    prompts, roles, GenerationError, GenerationExecutor, GenerationTransport,
};
use crate::models::{
    ApprovalDecision, AssessmentOutput, AuditBundle, ClaimExtractionOutput,
    ClinicalReasoningOutput, ConsensusLabel, ConsolidatedResult, Decision, DiagnosisReport,
    DoctorSummary, EnhancedFollowUp, InterruptStage, OrchestrationPath, PatientState,
    PatientValidationError, PrescribingConsiderations, ResearchSummary, SafetyValidationOutput,
    Severity, StageOutcome, ValidatorResult, VerificationReport,
};
use crate::triage;

pub use consensus::{finalize_regimen, should_verify, ConsensusOutcome};

/// Errors that abort a request outright. Per-branch generation failures in
/// the fan-out are isolated as `StageOutcome::Failed` instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] PatientValidationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Run only the deterministic rule engine. No generation calls.
pub fn run_triage_only(patient: PatientState) -> Result<AssessmentOutput, PipelineError> {
    let patient = patient.validated()?;
    Ok(triage::assess(&patient))
}

/// Every stage outcome a request can carry, regardless of where it stopped.
struct StageSet {
    doctor_summary: StageOutcome<DoctorSummary>,
    clinical_reasoning: StageOutcome<ClinicalReasoningOutput>,
    safety_validation: StageOutcome<SafetyValidationOutput>,
    prescribing_considerations: StageOutcome<PrescribingConsiderations>,
    research_context: StageOutcome<ResearchSummary>,
    diagnosis: StageOutcome<DiagnosisReport>,
    follow_up_details: StageOutcome<EnhancedFollowUp>,
    validator: StageOutcome<ValidatorResult>,
    verification_report: StageOutcome<VerificationReport>,
    claims_with_citations: StageOutcome<ClaimExtractionOutput>,
}

impl StageSet {
    /// All stages skipped with one shared reason.
    fn skipped_all(reason: &str, interrupt: Option<InterruptStage>) -> Self {
        Self {
            doctor_summary: StageOutcome::skipped(reason, interrupt),
            clinical_reasoning: StageOutcome::skipped(reason, interrupt),
            safety_validation: StageOutcome::skipped(reason, interrupt),
            prescribing_considerations: StageOutcome::skipped(reason, interrupt),
            research_context: StageOutcome::skipped(reason, interrupt),
            diagnosis: StageOutcome::skipped(reason, interrupt),
            follow_up_details: StageOutcome::skipped(reason, interrupt),
            validator: StageOutcome::skipped(reason, interrupt),
            verification_report: StageOutcome::skipped(reason, interrupt),
            claims_with_citations: StageOutcome::skipped(reason, interrupt),
        }
    }
}

/// The complete triage + generation pipeline over a transport.
pub struct AssessmentPipeline<T> {
    executor: GenerationExecutor<T>,
    config: PipelineConfig,
}

impl<T: GenerationTransport> AssessmentPipeline<T> {
    pub fn new(executor: GenerationExecutor<T>, config: PipelineConfig) -> Self {
        Self { executor, config }
    }

    /// Run the full assessment for one patient.
    ///
    /// Control flow, in order:
    /// 1. validate patient, run deterministic triage
    /// 2. deterministic gate (referral decisions stop here under strict
    ///    interrupts, with an optional doctor summary)
    /// 3. clinical reasoning, then safety screening of the proposed regimen
    /// 4. safety gate (hard stops), else refinement on any non-approval
    /// 5. consensus finalization, regimen cross-check, validator gate
    /// 6. fan-out (prescribing, research, diagnosis), follow-up plan
    /// 7. verification when warranted, claim extraction, consolidation
    pub async fn run_complete_assessment(
        &self,
        patient: PatientState,
    ) -> Result<ConsolidatedResult, PipelineError> {
        let patient = patient.validated()?;
        let assessment = triage::assess(&patient);
        let decision = assessment.decision;
        info!(decision = decision.as_str(), "triage complete");

        // Deterministic gate.
        if self.config.strict_interrupts
            && matches!(
                decision,
                Decision::ReferComplicated | Decision::ReferRecurrence
            )
        {
            let mut set = StageSet::skipped_all(
                "deterministic referral",
                Some(InterruptStage::DeterministicGate),
            );
            set.doctor_summary = self.maybe_doctor_summary(&patient, &assessment).await;
            return Ok(self.consolidate(
                patient,
                assessment,
                OrchestrationPath::DeterministicInterrupt,
                Some(InterruptStage::DeterministicGate),
                set,
                ConsensusLabel::DeterministicInterrupt.as_str().to_string(),
                true,
            ));
        }

        let clinical_result = if decision == Decision::RecommendTreatment {
            stages::clinical_reasoning(&self.executor, &patient, Some(&assessment)).await?
        } else {
            if self.config.strict_interrupts {
                let mut set = StageSet::skipped_all("no antibiotics per algorithm", None);
                set.doctor_summary = self.maybe_doctor_summary(&patient, &assessment).await;
                return Ok(self.consolidate(
                    patient,
                    assessment,
                    OrchestrationPath::DeterministicNoRx,
                    None,
                    set,
                    ConsensusLabel::NoAntibioticsOrRefer.as_str().to_string(),
                    false,
                ));
            }
            ClinicalReasoningOutput {
                reasoning: vec!["Referral/no antibiotics per algorithm".into()],
                confidence: 1.0,
                ..Default::default()
            }
        };

        // Safety screening runs only when treatment is on the table.
        let mut clinical_result = clinical_result;
        let safety_result = if decision == Decision::RecommendTreatment {
            let safety = stages::safety_validation(
                &self.executor,
                &patient,
                decision,
                assessment.recommendation.as_ref(),
                Some(&clinical_result),
            )
            .await?;
            let approval = safety.approval_recommendation;

            if self.config.strict_interrupts && approval.is_hard_stop() {
                let mut set =
                    StageSet::skipped_all("safety hard stop", Some(InterruptStage::SafetyGate));
                set.clinical_reasoning = StageOutcome::completed(clinical_result);
                set.safety_validation = StageOutcome::completed(safety);
                return Ok(self.consolidate(
                    patient,
                    assessment,
                    OrchestrationPath::SafetyInterrupt,
                    Some(InterruptStage::SafetyGate),
                    set,
                    ConsensusLabel::SafetyInterrupt.as_str().to_string(),
                    true,
                ));
            }

            if approval.needs_refinement() {
                match stages::reasoning_refinement(
                    &self.executor,
                    &patient,
                    &clinical_result,
                    &safety,
                )
                .await
                {
                    Ok(refined) => clinical_result = refined,
                    // The initial reasoning stands if refinement fails.
                    Err(e) => {
                        warn!(error = %e, "reasoning refinement failed, keeping initial reasoning");
                    }
                }
            }
            Some(safety)
        } else {
            None
        };

        let approval = safety_result
            .as_ref()
            .map(|s| s.approval_recommendation)
            .unwrap_or(ApprovalDecision::Undecided);
        let consensus = finalize_regimen(
            decision,
            assessment.recommendation.as_ref(),
            approval,
            &clinical_result.proposed_regimen_text,
        );

        let validator = triage::validate_regimen(
            &patient,
            consensus.finalized_regimen.as_deref(),
            safety_result.as_ref(),
        );

        if self.config.strict_interrupts && validator.severity == Severity::High {
            let mut set = StageSet::skipped_all(
                "regimen cross-check failed",
                Some(InterruptStage::Validator),
            );
            set.clinical_reasoning = StageOutcome::completed(clinical_result);
            set.safety_validation = match safety_result {
                Some(s) => StageOutcome::completed(s),
                None => StageOutcome::skipped("no treatment recommended", None),
            };
            set.validator = StageOutcome::completed(validator);
            return Ok(self.consolidate(
                patient,
                assessment,
                OrchestrationPath::ValidatorInterrupt,
                Some(InterruptStage::Validator),
                set,
                ConsensusLabel::ValidatorInterrupt.as_str().to_string(),
                true,
            ));
        }

        // Fan-out. Branch failures are isolated; the request still completes.
        let (prescribing, research, diagnosis) = if validator.passed {
            let region = patient.locale_code.as_str();
            let (prescribing, research, diagnosis) = tokio::join!(
                stages::prescribing_considerations(&self.executor, &patient, region),
                stages::web_research(
                    &self.executor,
                    "Latest UTI guideline updates and resistance (concise)",
                    region,
                ),
                stages::deep_research_diagnosis(
                    &self.executor,
                    &patient,
                    &assessment,
                    Some(&clinical_result),
                    safety_result.as_ref(),
                ),
            );
            (
                isolate("prescribing_considerations", prescribing),
                isolate("web_research", research),
                isolate("diagnosis", diagnosis),
            )
        } else {
            let reason = "regimen cross-check failed";
            (
                StageOutcome::skipped(reason, None),
                StageOutcome::skipped(reason, None),
                StageOutcome::skipped(reason, None),
            )
        };

        let follow_up_details = if decision == Decision::RecommendTreatment {
            StageOutcome::completed(triage::enhanced_follow_up_plan(&patient, &assessment))
        } else {
            StageOutcome::skipped("no treatment recommended", None)
        };

        let final_snapshot = serde_json::json!({
            "assessment": assessment,
            "assessment_narrative": assessment.narrative(),
            "clinical_reasoning": clinical_result,
            "safety_validation": safety_result,
            "safety_narrative": safety_result.as_ref().map(SafetyValidationOutput::as_narrative),
            "diagnosis": diagnosis,
            "prescribing_considerations": prescribing,
            "research_context": research,
            "validator": validator,
            "consensus_recommendation": consensus.consensus_recommendation,
        });

        // Claim extraction always runs; verification is conditional. When
        // both are scheduled they fan out together, and either failure
        // fails the request.
        let claims_prompt = prompts::claim_extractor_prompt(&final_snapshot);
        let claims_call = self
            .executor
            .execute_structured::<ClaimExtractionOutput>(&roles::CLAIM_EXTRACTOR, &claims_prompt);

        let (verification_report, claims) = if should_verify(
            Some(&clinical_result),
            &validator,
            safety_result.as_ref(),
        ) {
            let verify_prompt = prompts::verifier_prompt(&final_snapshot);
            let verify_call = self
                .executor
                .execute_structured::<VerificationReport>(&roles::VERIFIER, &verify_prompt);
            let (verified, extracted) = tokio::join!(verify_call, claims_call);
            let (report, _raw) = verified?;
            let (claims, _raw) = extracted?;
            (StageOutcome::completed(report), claims)
        } else {
            let (claims, _raw) = claims_call.await?;
            (
                StageOutcome::skipped("verification not required", None),
                claims,
            )
        };

        let set = StageSet {
            doctor_summary: StageOutcome::skipped("no interrupt", None),
            clinical_reasoning: StageOutcome::completed(clinical_result),
            safety_validation: match safety_result {
                Some(s) => StageOutcome::completed(s),
                None => StageOutcome::skipped("no treatment recommended", None),
            },
            prescribing_considerations: prescribing,
            research_context: research,
            diagnosis,
            follow_up_details,
            validator: StageOutcome::completed(validator),
            verification_report,
            claims_with_citations: StageOutcome::completed(claims),
        };

        Ok(self.consolidate(
            patient,
            assessment,
            OrchestrationPath::Standard,
            None,
            set,
            consensus.consensus_recommendation,
            false,
        ))
    }

    /// Doctor-style narrative for deterministic terminals. Failure is
    /// tolerated with a placeholder so the interrupt still returns cleanly.
    async fn maybe_doctor_summary(
        &self,
        patient: &PatientState,
        assessment: &AssessmentOutput,
    ) -> StageOutcome<DoctorSummary> {
        if !self.config.doctor_summary_on_referral {
            return StageOutcome::skipped("doctor summary disabled", None);
        }
        match stages::doctor_summary(&self.executor, patient, assessment).await {
            Ok(summary) => StageOutcome::completed(summary),
            Err(e) => {
                warn!(error = %e, "doctor summary failed");
                StageOutcome::completed(DoctorSummary {
                    narrative: "Summary unavailable.".into(),
                    confidence: 0.0,
                    reasoning: Vec::new(),
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn consolidate(
        &self,
        patient: PatientState,
        assessment: AssessmentOutput,
        path: OrchestrationPath,
        interrupt_stage: Option<InterruptStage>,
        set: StageSet,
        consensus_recommendation: String,
        human_escalation: bool,
    ) -> ConsolidatedResult {
        let confidence = set
            .clinical_reasoning
            .as_completed()
            .map(|r| r.confidence)
            .or_else(|| set.doctor_summary.as_completed().map(|d| d.confidence))
            .unwrap_or(0.0);

        let audit_bundle = AuditBundle {
            request_id: uuid::Uuid::new_v4(),
            generated_at: chrono::Utc::now(),
            inputs: patient,
            assessment: assessment.clone(),
            clinical_reasoning: set.clinical_reasoning.clone(),
            validator: set.validator.clone(),
            safety_validation: set.safety_validation.clone(),
            prescribing_considerations: set.prescribing_considerations.clone(),
            research_context: set.research_context.clone(),
            diagnosis: set.diagnosis.clone(),
            verification_report: set.verification_report.clone(),
            claims_with_citations: set.claims_with_citations.clone(),
            consensus_recommendation: consensus_recommendation.clone(),
        };

        ConsolidatedResult {
            orchestration_path: path,
            interrupt_stage,
            assessment,
            doctor_summary: set.doctor_summary,
            clinical_reasoning: set.clinical_reasoning,
            safety_validation: set.safety_validation,
            prescribing_considerations: set.prescribing_considerations,
            research_context: set.research_context,
            diagnosis: set.diagnosis,
            follow_up_details: set.follow_up_details,
            validator: set.validator,
            verification_report: set.verification_report,
            claims_with_citations: set.claims_with_citations,
            consensus_recommendation,
            confidence,
            human_escalation,
            prescriber_signoff_required: self.config.prescriber_signoff_required,
            model: self.executor.model().to_string(),
            audit_bundle,
        }
    }
}

/// Collapse a fan-out branch result into its stage outcome.
fn isolate<V>(stage: &str, result: Result<V, GenerationError>) -> StageOutcome<V> {
    match result {
        Ok(output) => StageOutcome::completed(output),
        Err(e) => {
            warn!(stage, error = %e, "fan-out branch failed");
            StageOutcome::failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures_util::{stream, StreamExt};
    use serde_json::json;
    use tokio::sync::Notify;

    use crate::generation::transport::{EventStream, GenerationRequest};
    use crate::generation::StreamEvent;
    use crate::models::{
        History, PregnancyStatus, Recurrence, RedFlags, RenalFunction, Sex, Symptoms,
    };

    /// Scripted transport keyed by role: each call for a role pops that
    /// role's next script of events.
    struct RoleScriptedTransport {
        scripts: Mutex<HashMap<&'static str, VecDeque<Vec<StreamEvent>>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl RoleScriptedTransport {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn script(self, role: &'static str, events: Vec<StreamEvent>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .entry(role)
                .or_default()
                .push_back(events);
            self
        }

        fn roles_called(&self) -> Vec<&'static str> {
            self.requests.lock().unwrap().iter().map(|r| r.role).collect()
        }
    }

    #[async_trait]
    impl GenerationTransport for RoleScriptedTransport {
        async fn open(&self, request: GenerationRequest) -> Result<EventStream, GenerationError> {
            let role = request.role;
            self.requests.lock().unwrap().push(request);
            let events = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(role)
                .and_then(|q| q.pop_front())
                .ok_or_else(|| GenerationError::Stream(format!("no script for role {role}")))?;
            Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
        }
    }

    /// Wraps the scripted transport so the verifier's stream yields nothing
    /// until the claim extractor has been opened. Only an overlapped
    /// fan-out of the two audit roles can drain this transport.
    struct GatedVerifierTransport {
        inner: RoleScriptedTransport,
        claims_opened: Arc<Notify>,
    }

    #[async_trait]
    impl GenerationTransport for GatedVerifierTransport {
        async fn open(&self, request: GenerationRequest) -> Result<EventStream, GenerationError> {
            let role = request.role;
            if role == "claim_extractor" {
                self.claims_opened.notify_one();
            }
            let events = self.inner.open(request).await?;
            if role != "verifier" {
                return Ok(events);
            }
            let gate = self.claims_opened.clone();
            let head = stream::once(async move {
                gate.notified().await;
                Ok::<_, GenerationError>(StreamEvent::TextDelta(String::new()))
            });
            Ok(Box::pin(head.chain(events)))
        }
    }

    fn structured(value: serde_json::Value) -> Vec<StreamEvent> {
        vec![
            StreamEvent::Structured(value),
            StreamEvent::Completed,
        ]
    }

    fn text(body: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::TextDelta(body.to_string()),
            StreamEvent::Completed,
        ]
    }

    fn reasoning_json(confidence: f64, proposed: &str) -> serde_json::Value {
        json!({
            "reasoning": ["Meets uncomplicated cystitis criteria"],
            "confidence": confidence,
            "recommendations": ["Start first-line therapy"],
            "proposed_regimen_text": proposed,
        })
    }

    fn safety_json(approval: &str, risk: &str) -> serde_json::Value {
        json!({
            "approval_recommendation": approval,
            "risk_level": risk,
            "rationale": "screened",
        })
    }

    fn uncomplicated_patient() -> PatientState {
        PatientState {
            age: 25,
            sex: Sex::Female,
            pregnancy_status: PregnancyStatus::NotPregnant,
            renal_function_summary: RenalFunction::Normal,
            egfr_ml_min: None,
            symptoms: Symptoms {
                dysuria: true,
                urgency: true,
                frequency: true,
                ..Default::default()
            },
            red_flags: RedFlags::default(),
            history: History::default(),
            recurrence: Recurrence::default(),
            locale_code: "CA-ON".into(),
            asymptomatic_bacteriuria: false,
        }
    }

    fn pipeline(transport: RoleScriptedTransport) -> AssessmentPipeline<RoleScriptedTransport> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        AssessmentPipeline::new(
            GenerationExecutor::new(transport, "test-model"),
            PipelineConfig::default(),
        )
    }

    /// Scripts for the full standard path: reasoning, safety, two research
    /// calls (one embedded in prescribing), diagnosis, and claims.
    fn standard_scripts(reasoning: serde_json::Value, safety: serde_json::Value) -> RoleScriptedTransport {
        RoleScriptedTransport::new()
            .script("clinical_reasoning", structured(reasoning))
            .script("safety_validation", structured(safety))
            .script("web_research", text("resistance summary"))
            .script("web_research", text("guideline summary"))
            .script("diagnosis", text("# Clinical Brief"))
            .script("claim_extractor", structured(json!({"claims": []})))
    }

    #[tokio::test]
    async fn deterministic_referral_interrupts_before_any_screening() {
        let mut patient = uncomplicated_patient();
        patient.red_flags.fever = true;
        // Doctor summary reuses the reasoning role.
        let transport = RoleScriptedTransport::new()
            .script("clinical_reasoning", structured(reasoning_json(1.0, "")));
        let result = pipeline(transport)
            .run_complete_assessment(patient)
            .await
            .unwrap();

        assert_eq!(
            result.orchestration_path,
            OrchestrationPath::DeterministicInterrupt
        );
        assert_eq!(
            result.interrupt_stage,
            Some(InterruptStage::DeterministicGate)
        );
        assert!(result.human_escalation);
        assert_eq!(
            result.consensus_recommendation,
            "Escalate to human (interrupt)"
        );
        assert!(result.doctor_summary.is_completed());
        assert!(matches!(
            result.safety_validation,
            StageOutcome::Skipped { .. }
        ));
        assert!(matches!(result.diagnosis, StageOutcome::Skipped { .. }));
        assert!(matches!(result.validator, StageOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn doctor_summary_failure_does_not_break_the_interrupt() {
        let mut patient = uncomplicated_patient();
        patient.red_flags.fever = true;
        // No scripts at all: every generation call fails.
        let result = pipeline(RoleScriptedTransport::new())
            .run_complete_assessment(patient)
            .await
            .unwrap();

        assert_eq!(
            result.orchestration_path,
            OrchestrationPath::DeterministicInterrupt
        );
        let summary = result.doctor_summary.as_completed().unwrap();
        assert_eq!(summary.narrative, "Summary unavailable.");
    }

    #[tokio::test]
    async fn criteria_not_met_stops_with_no_rx_path() {
        let mut patient = uncomplicated_patient();
        patient.symptoms = Symptoms {
            urgency: true,
            ..Default::default()
        };
        let transport = RoleScriptedTransport::new()
            .script("clinical_reasoning", structured(reasoning_json(1.0, "")));
        let result = pipeline(transport)
            .run_complete_assessment(patient)
            .await
            .unwrap();

        assert_eq!(result.orchestration_path, OrchestrationPath::DeterministicNoRx);
        assert_eq!(result.interrupt_stage, None);
        assert!(!result.human_escalation);
        assert_eq!(result.consensus_recommendation, "No antibiotics / Refer");
    }

    #[tokio::test]
    async fn standard_path_finalizes_the_proposed_regimen() {
        let transport = standard_scripts(
            reasoning_json(0.9, "Nitrofurantoin 100 mg PO BID x 5 days"),
            safety_json("approve", "low"),
        );
        let result = pipeline(transport)
            .run_complete_assessment(uncomplicated_patient())
            .await
            .unwrap();

        assert_eq!(result.orchestration_path, OrchestrationPath::Standard);
        assert_eq!(result.interrupt_stage, None);
        assert_eq!(
            result.consensus_recommendation,
            "Nitrofurantoin 100 mg PO BID x 5 days"
        );
        assert_eq!(result.confidence, 0.9);
        assert!(!result.human_escalation);
        assert!(result.prescriber_signoff_required);
        assert!(result.prescribing_considerations.is_completed());
        assert!(result.research_context.is_completed());
        assert!(result.diagnosis.is_completed());
        assert!(result.follow_up_details.is_completed());
        assert!(result.claims_with_citations.is_completed());
        // Confident reasoning, clean validator, low risk: no verification.
        assert!(matches!(
            result.verification_report,
            StageOutcome::Skipped { .. }
        ));
        let validator = result.validator.as_completed().unwrap();
        assert!(validator.passed);
    }

    #[tokio::test]
    async fn safety_hard_stop_interrupts_at_the_safety_gate() {
        let transport = RoleScriptedTransport::new()
            .script(
                "clinical_reasoning",
                structured(reasoning_json(
                    0.9,
                    "Nitrofurantoin 100 mg PO BID x 5 days",
                )),
            )
            .script("safety_validation", structured(safety_json("reject", "high")));
        let result = pipeline(transport)
            .run_complete_assessment(uncomplicated_patient())
            .await
            .unwrap();

        assert_eq!(result.orchestration_path, OrchestrationPath::SafetyInterrupt);
        assert_eq!(result.interrupt_stage, Some(InterruptStage::SafetyGate));
        assert!(result.human_escalation);
        assert_eq!(
            result.consensus_recommendation,
            "Defer antibiotics; escalate to human (safety gate)"
        );
        assert!(result.clinical_reasoning.is_completed());
        assert!(result.safety_validation.is_completed());
        assert!(matches!(result.validator, StageOutcome::Skipped { .. }));
        assert!(matches!(result.diagnosis, StageOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn modify_approval_refines_reasoning_and_substitutes_alternative() {
        let transport = RoleScriptedTransport::new()
            .script(
                "clinical_reasoning",
                structured(reasoning_json(
                    0.9,
                    "Nitrofurantoin 100 mg PO BID x 5 days",
                )),
            )
            .script("safety_validation", structured(safety_json("modify", "moderate")))
            // Refinement reuses the reasoning role.
            .script("clinical_reasoning", structured(reasoning_json(0.85, "")))
            .script("web_research", text("resistance summary"))
            .script("web_research", text("guideline summary"))
            .script("diagnosis", text("# Clinical Brief"))
            .script(
                "verifier",
                structured(json!({"verdict": "pass", "alignment_notes": ["consistent"]})),
            )
            .script("claim_extractor", structured(json!({"claims": []})));
        let result = pipeline(transport)
            .run_complete_assessment(uncomplicated_patient())
            .await
            .unwrap();

        assert_eq!(result.orchestration_path, OrchestrationPath::Standard);
        assert_eq!(
            result.consensus_recommendation,
            "Modify regimen: TMP/SMX (per safety validation)"
        );
        // The refined reasoning replaced the initial one.
        assert_eq!(result.confidence, 0.85);
        // Moderate risk plus a duration-drift finding trigger verification.
        let report = result.verification_report.as_completed().unwrap();
        assert_eq!(
            report.verdict,
            crate::models::VerificationVerdict::Pass
        );
        let validator = result.validator.as_completed().unwrap();
        assert!(validator
            .rules_fired
            .contains(&"tmpsmx_duration_check_3_days".to_string()));
    }

    #[tokio::test]
    async fn contradictory_regimen_interrupts_at_the_validator() {
        // Triage avoids nitrofurantoin for this allergy, but the clinician
        // proposes it anyway and safety approves: the cross-check catches it.
        let mut patient = uncomplicated_patient();
        patient.history.allergies = vec!["Nitrofurantoin".into()];
        let transport = RoleScriptedTransport::new()
            .script(
                "clinical_reasoning",
                structured(reasoning_json(
                    0.9,
                    "Nitrofurantoin 100 mg PO BID x 5 days",
                )),
            )
            .script("safety_validation", structured(safety_json("approve", "low")));
        let result = pipeline(transport)
            .run_complete_assessment(patient)
            .await
            .unwrap();

        assert_eq!(
            result.orchestration_path,
            OrchestrationPath::ValidatorInterrupt
        );
        assert_eq!(result.interrupt_stage, Some(InterruptStage::Validator));
        assert!(result.human_escalation);
        assert_eq!(
            result.consensus_recommendation,
            "Escalate to human (validator fail)"
        );
        let validator = result.validator.as_completed().unwrap();
        assert!(!validator.passed);
        assert!(validator
            .contradictions
            .contains(&"allergy_conflict_nitrofurantoin".to_string()));
        assert!(matches!(result.diagnosis, StageOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn fan_out_branch_failure_is_isolated() {
        // Diagnosis has no script, so it exhausts retries and fails; the
        // other branches and the request still complete.
        let transport = RoleScriptedTransport::new()
            .script(
                "clinical_reasoning",
                structured(reasoning_json(
                    0.9,
                    "Nitrofurantoin 100 mg PO BID x 5 days",
                )),
            )
            .script("safety_validation", structured(safety_json("approve", "low")))
            .script("web_research", text("resistance summary"))
            .script("web_research", text("guideline summary"))
            .script("claim_extractor", structured(json!({"claims": []})));
        let result = pipeline(transport)
            .run_complete_assessment(uncomplicated_patient())
            .await
            .unwrap();

        assert_eq!(result.orchestration_path, OrchestrationPath::Standard);
        assert!(matches!(result.diagnosis, StageOutcome::Failed { .. }));
        assert!(result.prescribing_considerations.is_completed());
        assert!(result.research_context.is_completed());
    }

    #[tokio::test]
    async fn non_strict_mode_runs_the_full_pipeline_for_referrals() {
        let mut patient = uncomplicated_patient();
        patient.red_flags.fever = true;
        let transport = RoleScriptedTransport::new()
            .script("web_research", text("resistance summary"))
            .script("web_research", text("guideline summary"))
            .script("diagnosis", text("# Clinical Brief"))
            .script("claim_extractor", structured(json!({"claims": []})));
        let pipeline = AssessmentPipeline::new(
            GenerationExecutor::new(transport, "test-model"),
            PipelineConfig {
                strict_interrupts: false,
                ..Default::default()
            },
        );
        let result = pipeline.run_complete_assessment(patient).await.unwrap();

        assert_eq!(result.orchestration_path, OrchestrationPath::Standard);
        assert!(!result.human_escalation);
        assert_eq!(result.consensus_recommendation, "No antibiotics / Refer");
        // The algorithmic fallback reasoning stands in for the skipped role.
        let reasoning = result.clinical_reasoning.as_completed().unwrap();
        assert_eq!(reasoning.confidence, 1.0);
        assert!(matches!(
            result.safety_validation,
            StageOutcome::Skipped { .. }
        ));
        assert!(matches!(
            result.follow_up_details,
            StageOutcome::Skipped { .. }
        ));
        // Safety never runs for non-treatment decisions, even here.
        let pipeline_roles = pipeline.executor.transport().roles_called();
        assert!(!pipeline_roles.contains(&"safety_validation"));
    }

    #[tokio::test]
    async fn triage_only_requires_no_transport() {
        let assessment = run_triage_only(uncomplicated_patient()).unwrap();
        assert_eq!(assessment.decision, Decision::RecommendTreatment);
        let rec = assessment.recommendation.unwrap();
        assert_eq!(rec.as_text(), "Nitrofurantoin macrocrystals 100 mg PO BID x 5 days");
    }

    #[tokio::test]
    async fn verification_and_claim_extraction_run_together() {
        // Moderate safety risk schedules verification alongside the
        // always-on claim extraction.
        let inner = standard_scripts(
            reasoning_json(0.9, "Nitrofurantoin 100 mg PO BID x 5 days"),
            safety_json("approve", "moderate"),
        )
        .script("verifier", structured(json!({"verdict": "pass"})));
        let transport = GatedVerifierTransport {
            inner,
            claims_opened: Arc::new(Notify::new()),
        };
        let pipeline = AssessmentPipeline::new(
            GenerationExecutor::new(transport, "test-model"),
            PipelineConfig::default(),
        );
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            pipeline.run_complete_assessment(uncomplicated_patient()),
        )
        .await
        .expect("the audit roles must overlap, not run back-to-back")
        .unwrap();

        let report = result.verification_report.as_completed().unwrap();
        assert_eq!(report.verdict, crate::models::VerificationVerdict::Pass);
        assert!(result.claims_with_citations.is_completed());
    }

    #[tokio::test]
    async fn audit_prompts_carry_assessment_and_safety_narratives() {
        let transport = standard_scripts(
            reasoning_json(0.9, "Nitrofurantoin 100 mg PO BID x 5 days"),
            safety_json("approve", "moderate"),
        )
        .script("verifier", structured(json!({"verdict": "pass"})));
        let pipeline = pipeline(transport);
        pipeline
            .run_complete_assessment(uncomplicated_patient())
            .await
            .unwrap();

        let requests = pipeline.executor.transport().requests.lock().unwrap();
        for role in ["verifier", "claim_extractor"] {
            let prompt = &requests.iter().find(|r| r.role == role).unwrap().prompt;
            assert!(prompt.contains("Decision: recommend_treatment"), "{role}");
            assert!(prompt.contains("Risk level: moderate"), "{role}");
        }
    }

    #[tokio::test]
    async fn malformed_structured_output_fails_the_request() {
        let transport = RoleScriptedTransport::new().script(
            "clinical_reasoning",
            structured(json!({"confidence": "not a number"})),
        );
        let err = pipeline(transport)
            .run_complete_assessment(uncomplicated_patient())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Generation(GenerationError::SchemaParse { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_patient_is_rejected_before_any_generation() {
        let mut patient = uncomplicated_patient();
        patient.age = 130;
        let transport = RoleScriptedTransport::new();
        let pipeline = pipeline(transport);
        let err = pipeline
            .run_complete_assessment(patient)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(pipeline.executor.transport().roles_called().is_empty());
    }
}

//! Regimen cross-check: a second, independent rule set that validates the
//! finalized regimen text against the patient record and the safety-screen
//! result. Catches contradictions the generation-based stages might
//! introduce, including dosing/duration drift.

use crate::models::{
    MedClass, PatientState, RenalFunction, SafetyValidationOutput, Severity,
    ValidatorResult, TMP_SMX_ALLERGY_TERMS,
};

/// Regimen text markers for TMP/SMX (trimethoprim alone matches the
/// dedicated rule below and the shared allergy vocabulary).
static TMP_SMX_TEXT_MARKERS: &[&str] = &["tmp", "sulfamethoxazole", "smx"];

struct ValidationRule {
    fired: bool,
    name: &'static str,
    severity: Severity,
    is_contradiction: bool,
}

impl ValidationRule {
    fn fired(name: &'static str, severity: Severity, fired: bool) -> Self {
        Self {
            fired,
            name,
            severity,
            is_contradiction: false,
        }
    }

    fn contradiction(name: &'static str, severity: Severity, fired: bool) -> Self {
        Self {
            fired,
            name,
            severity,
            is_contradiction: true,
        }
    }
}

/// Cross-check the finalized regimen. `regimen_text` is `None` when no
/// regimen was finalized (deferred/rejected paths).
pub fn validate_regimen(
    patient: &PatientState,
    regimen_text: Option<&str>,
    safety: Option<&SafetyValidationOutput>,
) -> ValidatorResult {
    let rt = regimen_text.unwrap_or("").to_lowercase();
    let regimen_present = !rt.is_empty() && rt != "none";

    let safety_rejected = safety
        .map(|s| s.approval_recommendation.is_hard_stop())
        .unwrap_or(false);

    let allergy_match = |term: &str| patient.history.has_allergy_term(term);
    let tmp_smx_in_text = || {
        TMP_SMX_TEXT_MARKERS.iter().any(|t| rt.contains(t)) || rt.contains("trimethoprim")
    };

    let mentions_nitrofurantoin = rt.contains("nitrofurantoin");
    let mentions_fosfomycin = rt.contains("fosfomycin");
    let mentions_tmp_smx = TMP_SMX_TEXT_MARKERS.iter().any(|t| rt.contains(t));

    let rules = [
        ValidationRule::contradiction(
            "safety_rejected_but_regimen_present",
            Severity::High,
            safety_rejected && regimen_present,
        ),
        ValidationRule::contradiction(
            "allergy_conflict_nitrofurantoin",
            Severity::High,
            mentions_nitrofurantoin && allergy_match("nitrofurantoin"),
        ),
        ValidationRule::contradiction(
            "allergy_conflict_tmpsmx_or_trimethoprim",
            Severity::High,
            tmp_smx_in_text()
                && TMP_SMX_ALLERGY_TERMS.iter().any(|term| allergy_match(term)),
        ),
        ValidationRule::contradiction(
            "allergy_conflict_fosfomycin",
            Severity::High,
            mentions_fosfomycin && allergy_match("fosfomycin"),
        ),
        ValidationRule::fired(
            "avoid_nitrofurantoin_in_renal_failure",
            Severity::High,
            patient.renal_function_summary == RenalFunction::Failure && mentions_nitrofurantoin,
        ),
        ValidationRule::fired(
            "avoid_nitrofurantoin_egfr_lt_30",
            Severity::High,
            matches!(patient.egfr_ml_min, Some(egfr) if egfr < 30.0) && mentions_nitrofurantoin,
        ),
        ValidationRule::fired(
            "acei_arb_plus_tmpsmx_hyperkalemia_risk",
            Severity::Moderate,
            patient.history.acei_arb_use && mentions_tmp_smx,
        ),
        ValidationRule::fired(
            "tmpsmx_with_potassium_sparing_or_nsaid_monitor_k",
            Severity::Moderate,
            mentions_tmp_smx
                && (patient.history.med_classes.contains(&MedClass::PotassiumSparing)
                    || patient.history.med_classes.contains(&MedClass::Nsaid)),
        ),
        ValidationRule::fired(
            "fosfomycin_not_indicated_under_18",
            Severity::High,
            patient.age < 18 && mentions_fosfomycin,
        ),
        // Dosing/duration drift checks against the fixed specifications.
        ValidationRule::fired(
            "nitrofurantoin_duration_check_5_days",
            Severity::Moderate,
            mentions_nitrofurantoin && !rt.contains("x 5"),
        ),
        ValidationRule::fired(
            "tmpsmx_duration_check_3_days",
            Severity::Moderate,
            mentions_tmp_smx && !rt.contains("x 3"),
        ),
        ValidationRule::fired(
            "trimethoprim_duration_check_3_days",
            Severity::Moderate,
            rt.contains("trimethoprim") && !rt.contains("x 3"),
        ),
        ValidationRule::fired(
            "fosfomycin_dose_check_3g_single_dose",
            Severity::Moderate,
            mentions_fosfomycin && !(rt.contains("3 g") || rt.contains("3g")),
        ),
    ];

    let mut rules_fired = Vec::new();
    let mut contradictions = Vec::new();
    let mut severity = Severity::Low;

    for rule in rules.iter().filter(|r| r.fired) {
        if rule.is_contradiction {
            contradictions.push(rule.name.to_string());
        } else {
            rules_fired.push(rule.name.to_string());
        }
        severity = severity.max(rule.severity);
    }

    let passed = severity != Severity::High && contradictions.is_empty();
    ValidatorResult {
        passed,
        rules_fired,
        contradictions,
        severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApprovalDecision, History, PregnancyStatus, Recurrence, RedFlags, RiskLevel, Sex,
        Symptoms,
    };
    use crate::models::PatientState;

    fn patient() -> PatientState {
        PatientState {
            age: 30,
            sex: Sex::Female,
            pregnancy_status: PregnancyStatus::NotPregnant,
            renal_function_summary: RenalFunction::Normal,
            egfr_ml_min: None,
            symptoms: Symptoms::default(),
            red_flags: RedFlags::default(),
            history: History::default(),
            recurrence: Recurrence::default(),
            locale_code: "CA-ON".into(),
            asymptomatic_bacteriuria: false,
        }
        .validated()
        .unwrap()
    }

    fn safety(approval: ApprovalDecision) -> SafetyValidationOutput {
        SafetyValidationOutput {
            approval_recommendation: approval,
            risk_level: RiskLevel::Low,
            ..Default::default()
        }
    }

    #[test]
    fn clean_regimen_passes() {
        let result = validate_regimen(
            &patient(),
            Some("Nitrofurantoin macrocrystals 100 mg PO BID x 5 days"),
            Some(&safety(ApprovalDecision::Approve)),
        );
        assert!(result.passed);
        assert_eq!(result.severity, Severity::Low);
        assert!(result.contradictions.is_empty());
    }

    #[test]
    fn rejected_safety_with_regimen_is_high_contradiction() {
        let result = validate_regimen(
            &patient(),
            Some("Nitrofurantoin macrocrystals 100 mg PO BID x 5 days"),
            Some(&safety(ApprovalDecision::Reject)),
        );
        assert!(!result.passed);
        assert_eq!(result.severity, Severity::High);
        assert!(result
            .contradictions
            .contains(&"safety_rejected_but_regimen_present".to_string()));
    }

    #[test]
    fn rejected_safety_without_regimen_does_not_fire() {
        let result = validate_regimen(&patient(), None, Some(&safety(ApprovalDecision::Reject)));
        assert!(result.passed);
    }

    #[test]
    fn allergy_conflict_is_detected_in_regimen_text() {
        let mut p = patient();
        p.history.allergies = vec!["Sulfonamides".into()];
        let result = validate_regimen(
            &p,
            Some("TMP/SMX 160/800 mg PO BID x 3 days"),
            Some(&safety(ApprovalDecision::Approve)),
        );
        assert!(!result.passed);
        assert!(result
            .contradictions
            .contains(&"allergy_conflict_tmpsmx_or_trimethoprim".to_string()));
    }

    #[test]
    fn nitrofurantoin_in_renal_failure_is_high() {
        let mut p = patient();
        p.renal_function_summary = RenalFunction::Failure;
        let result = validate_regimen(
            &p,
            Some("Nitrofurantoin macrocrystals 100 mg PO BID x 5 days"),
            None,
        );
        assert!(!result.passed);
        assert!(result
            .rules_fired
            .contains(&"avoid_nitrofurantoin_in_renal_failure".to_string()));
    }

    #[test]
    fn high_severity_dominates_moderate_rules() {
        // ACEI/ARB interaction (moderate) plus under-18 fosfomycin in the
        // same text (high): overall severity must be high.
        let mut p = patient();
        p.age = 16;
        p.history.acei_arb_use = true;
        let result = validate_regimen(
            &p,
            Some("TMP/SMX then fosfomycin 3 g PO x 3 days"),
            None,
        );
        assert_eq!(result.severity, Severity::High);
        assert!(result
            .rules_fired
            .contains(&"fosfomycin_not_indicated_under_18".to_string()));
        assert!(result
            .rules_fired
            .contains(&"acei_arb_plus_tmpsmx_hyperkalemia_risk".to_string()));
    }

    #[test]
    fn duration_drift_is_moderate() {
        let result = validate_regimen(
            &patient(),
            Some("Nitrofurantoin macrocrystals 100 mg PO BID x 7 days"),
            None,
        );
        assert_eq!(result.severity, Severity::Moderate);
        assert!(result
            .rules_fired
            .contains(&"nitrofurantoin_duration_check_5_days".to_string()));
        // Moderate severity alone still passes.
        assert!(result.passed);
    }

    #[test]
    fn fosfomycin_dose_drift_is_detected() {
        let result = validate_regimen(&patient(), Some("Fosfomycin trometamol 6 g PO"), None);
        assert!(result
            .rules_fired
            .contains(&"fosfomycin_dose_check_3g_single_dose".to_string()));
    }

    #[test]
    fn potassium_sparing_med_class_fires_monitor_rule() {
        let mut p = patient();
        p.history.meds = vec!["Spironolactone 25mg".into()];
        p.history.recompute_med_classes();
        let result = validate_regimen(
            &p,
            Some("TMP/SMX 160/800 mg PO BID x 3 days"),
            None,
        );
        assert!(result
            .rules_fired
            .contains(&"tmpsmx_with_potassium_sparing_or_nsaid_monitor_k".to_string()));
    }
}

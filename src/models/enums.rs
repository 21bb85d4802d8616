use serde::{Deserialize, Serialize};

use super::PatientValidationError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = PatientValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(PatientValidationError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(
    /// Administrative sex recorded for safety rules.
    Sex {
        Female => "female",
        Male => "male",
        Other => "other",
        Unknown => "unknown",
});

str_enum!(
    /// Pregnancy status at time of assessment.
    PregnancyStatus {
        Pregnant => "pregnant",
        NotPregnant => "not_pregnant",
        NotApplicable => "not_applicable",
        Unknown => "unknown",
        No => "no",
});

impl PregnancyStatus {
    /// Statuses that do NOT count as pregnancy for the complicating-factor
    /// check. Anything outside this set is treated as pregnant.
    pub fn excludes_pregnancy(&self) -> bool {
        matches!(
            self,
            Self::No | Self::NotPregnant | Self::NotApplicable | Self::Unknown
        )
    }
}

str_enum!(
    /// Clinically summarized renal function.
    RenalFunction {
        Normal => "normal",
        Impaired => "impaired",
        Failure => "failure",
        Unknown => "unknown",
});

str_enum!(
    /// First-line antimicrobial agents the triage engine can select.
    MedicationAgent {
        Nitrofurantoin => "nitrofurantoin",
        TmpSmx => "tmp_smx",
        Trimethoprim => "trimethoprim",
        Fosfomycin => "fosfomycin",
});

str_enum!(
    /// Overall safety/interaction risk reported by the safety screen.
    RiskLevel {
        Low => "low",
        Moderate => "moderate",
        High => "high",
        Unknown => "unknown",
});

str_enum!(
    /// Approval decision from the safety screening stage.
    ApprovalDecision {
        Approve => "approve",
        Conditional => "conditional",
        Modify => "modify",
        Reject => "reject",
        DoNotStart => "do not start",
        ReferNoAntibiotics => "refer_no_antibiotics",
        Deny => "deny",
        Undecided => "undecided",
});

impl ApprovalDecision {
    /// Terminal rejections that stop the pipeline at the safety gate.
    pub fn is_hard_stop(&self) -> bool {
        matches!(
            self,
            Self::Reject | Self::DoNotStart | Self::Deny | Self::ReferNoAntibiotics
        )
    }

    /// Anything short of a clean approval triggers reasoning refinement.
    pub fn needs_refinement(&self) -> bool {
        matches!(self, Self::Modify | Self::Conditional) || self.is_hard_stop()
    }

    /// Parse a free-text approval string, falling back to `Undecided`.
    /// The generation service occasionally returns unlisted values.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.trim().to_lowercase().parse().unwrap_or(Self::Undecided)
    }
}

str_enum!(
    /// Final routing decision from the triage rule engine.
    Decision {
        NoAntibioticsNotMet => "no_antibiotics_not_met",
        ReferComplicated => "refer_complicated",
        ReferRecurrence => "refer_recurrence",
        RecommendTreatment => "recommend_treatment",
});

str_enum!(
    /// Overall verdict from the verification stage.
    VerificationVerdict {
        Pass => "pass",
        NeedsReview => "needs_review",
        Fail => "fail",
});

str_enum!(
    /// Evidence quality supporting an extracted claim.
    EvidenceLevel {
        High => "high",
        Moderate => "moderate",
        Low => "low",
        Insufficient => "insufficient",
});

/// Severity assigned by validator/verification rules. Ordered so that
/// `max()` implements "high takes precedence".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

str_enum!(
    /// Medication classes inferred from the free-text medication list.
    MedClass {
        Nsaid => "nsaid",
        PotassiumSparing => "potassium_sparing_diuretic",
        Acei => "acei",
        Arb => "arb",
});

str_enum!(
    /// Where the pipeline stopped when it did not reach `done`.
    InterruptStage {
        DeterministicGate => "deterministic_gate",
        SafetyGate => "safety_gate",
        Validator => "validator",
});

str_enum!(
    /// Which terminal path the orchestration took.
    OrchestrationPath {
        Standard => "standard",
        DeterministicInterrupt => "deterministic_interrupt",
        DeterministicNoRx => "deterministic_no_rx",
        SafetyInterrupt => "safety_interrupt",
        ValidatorInterrupt => "validator_interrupt",
});

/// Human-readable consensus summaries for deferral outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusLabel {
    DeterministicInterrupt,
    NoAntibioticsOrRefer,
    SafetyInterrupt,
    DeferChooseAlternative,
    DeferRevisePlanSafety,
    ValidatorInterrupt,
}

impl ConsensusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeterministicInterrupt => "Escalate to human (interrupt)",
            Self::NoAntibioticsOrRefer => "No antibiotics / Refer",
            Self::SafetyInterrupt => "Defer antibiotics; escalate to human (safety gate)",
            Self::DeferChooseAlternative => "Defer antibiotics; refer or choose alternative",
            Self::DeferRevisePlanSafety => "Defer antibiotics; refer or revise plan (safety gate)",
            Self::ValidatorInterrupt => "Escalate to human (validator fail)",
        }
    }
}

//! Patient record: the validated, immutable-per-request input to triage.
//!
//! Construction goes through `PatientState::validated`, which enforces
//! range checks, coerces pregnancy status for male records, and recomputes
//! the derived medication-class tags from the free-text medication list.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::enums::{MedClass, PregnancyStatus, RenalFunction, Sex};
use super::PatientValidationError;

/// Presenting UTI-related symptoms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symptoms {
    /// Painful urination reported within current episode.
    pub dysuria: bool,
    /// Sudden compelling need to urinate.
    pub urgency: bool,
    /// Urination frequency above normal for patient.
    pub frequency: bool,
    /// Pain or discomfort in suprapubic area.
    pub suprapubic_pain: bool,
    /// Visible blood in urine or positive dipstick.
    pub hematuria: bool,
    /// Nonspecific symptom requiring physician referral when criteria not met.
    #[serde(default)]
    pub gross_hematuria: bool,
    #[serde(default)]
    pub confusion: bool,
    #[serde(default)]
    pub delirium: bool,
}

impl Symptoms {
    /// Any nonspecific symptom that requires referral to rule out other causes.
    pub fn has_nonspecific(&self) -> bool {
        self.confusion || self.delirium || self.gross_hematuria
    }
}

/// Upper urinary tract or systemic red flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedFlags {
    /// Temperature ≥38°C within past 24-48h.
    pub fever: bool,
    /// Shaking chills suggesting bacteremia.
    pub rigors: bool,
    /// Unilateral/bilateral flank or CVA tenderness.
    pub flank_pain: bool,
    #[serde(default)]
    pub back_pain: bool,
    pub nausea_vomiting: bool,
    /// Signs of systemic illness or sepsis concern.
    pub systemic: bool,
}

impl RedFlags {
    pub fn any(&self) -> bool {
        self.fever
            || self.rigors
            || self.flank_pain
            || self.back_pain
            || self.nausea_vomiting
            || self.systemic
    }
}

// ── Medication-class vocabularies ───────────────────────────

static NSAID_NAMES: &[&str] = &[
    "ibuprofen", "naproxen", "diclofenac", "celecoxib", "indomethacin", "ketorolac",
];

static POTASSIUM_SPARING_NAMES: &[&str] =
    &["spironolactone", "eplerenone", "amiloride", "triamterene"];

static ACEI_NAMES: &[&str] = &[
    "lisinopril", "ramipril", "enalapril", "benazepril", "perindopril", "captopril",
];

static ARB_NAMES: &[&str] = &[
    "losartan", "valsartan", "olmesartan", "candesartan", "irbesartan",
];

/// Allergy and medication context for safety checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Any systemic antibiotic exposure within last 90 days.
    pub antibiotics_last_90d: bool,
    /// All reported allergies (free-text).
    #[serde(default)]
    pub allergies: Vec<String>,
    /// Active medication list (free-text).
    #[serde(default)]
    pub meds: Vec<String>,
    /// True if ACE inhibitor or ARB used (hyperkalemia risk with TMP/SMX).
    pub acei_arb_use: bool,
    /// Indwelling urinary catheter present.
    pub catheter: bool,
    /// Known urinary tract stones history.
    pub stones: bool,
    /// Any condition or therapy causing immunosuppression.
    pub immunocompromised: bool,
    #[serde(default)]
    pub neurogenic_bladder: bool,
    /// Derived from `meds` at validation time; never supplied directly.
    #[serde(default, skip_deserializing)]
    pub med_classes: BTreeSet<MedClass>,
}

impl History {
    /// Recompute the derived medication-class tags from the free-text
    /// medication list. Must run whenever `meds` changes.
    pub fn recompute_med_classes(&mut self) {
        let mut classes = BTreeSet::new();
        for med in &self.meds {
            let m = med.to_lowercase();
            if NSAID_NAMES.iter().any(|k| m.contains(k)) {
                classes.insert(MedClass::Nsaid);
            }
            if POTASSIUM_SPARING_NAMES.iter().any(|k| m.contains(k)) {
                classes.insert(MedClass::PotassiumSparing);
            }
            if ACEI_NAMES.iter().any(|k| m.contains(k)) {
                classes.insert(MedClass::Acei);
            }
            if ARB_NAMES.iter().any(|k| m.contains(k)) {
                classes.insert(MedClass::Arb);
            }
        }
        self.med_classes = classes;
    }

    /// Case-insensitive substring match against the allergy list.
    pub fn has_allergy_term(&self, term: &str) -> bool {
        self.allergies
            .iter()
            .any(|a| a.to_lowercase().contains(term))
    }
}

/// Relapse/recurrent infection indicators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// Return of symptoms within 4 weeks post-therapy.
    pub relapse_within_4w: bool,
    /// ≥2 UTIs within 6 months.
    pub recurrent_6m: bool,
    /// ≥3 UTIs within 12 months.
    pub recurrent_12m: bool,
}

/// A patient's clinical state at assessment time.
///
/// Read-only after `validated()`; every downstream stage receives it by
/// reference and produces new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientState {
    /// Age in years (0-120).
    pub age: u8,
    pub sex: Sex,
    pub pregnancy_status: PregnancyStatus,
    pub renal_function_summary: RenalFunction,
    /// Optional numeric eGFR in mL/min, used only for supplemental safety
    /// checks (e.g. nitrofurantoin below 30 mL/min).
    #[serde(default)]
    pub egfr_ml_min: Option<f64>,
    pub symptoms: Symptoms,
    pub red_flags: RedFlags,
    pub history: History,
    pub recurrence: Recurrence,
    /// Region code (e.g. "CA-ON") for resistance data.
    pub locale_code: String,
    /// Antibiotics are never indicated when this is set.
    #[serde(default)]
    pub asymptomatic_bacteriuria: bool,
}

impl PatientState {
    /// Validate ranges and normalize derived fields.
    ///
    /// The only silent coercion: a male record with a pregnancy status other
    /// than not-applicable/unknown is normalized to not-applicable.
    pub fn validated(mut self) -> Result<Self, PatientValidationError> {
        if self.age > 120 {
            return Err(PatientValidationError::AgeOutOfRange(self.age));
        }
        if let Some(egfr) = self.egfr_ml_min {
            if !egfr.is_finite() || egfr < 0.0 {
                return Err(PatientValidationError::InvalidEgfr(egfr));
            }
        }
        let locale_len = self.locale_code.len();
        if !(2..=10).contains(&locale_len) {
            return Err(PatientValidationError::InvalidLocaleCode(
                self.locale_code.clone(),
            ));
        }
        if self.sex == Sex::Male
            && !matches!(
                self.pregnancy_status,
                PregnancyStatus::NotApplicable | PregnancyStatus::Unknown
            )
        {
            self.pregnancy_status = PregnancyStatus::NotApplicable;
        }
        self.history.recompute_med_classes();
        Ok(self)
    }
}

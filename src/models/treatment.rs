//! Fixed first-line treatment table and the recommendation produced from it.

use serde::{Deserialize, Serialize};

use super::enums::MedicationAgent;

/// Immutable clinical specification for one antimicrobial agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MedicationSpec {
    pub regimen: &'static str,
    pub agent: MedicationAgent,
    pub dose: &'static str,
    pub frequency: &'static str,
    pub duration: &'static str,
    pub alternatives: &'static [&'static str],
    pub contraindications: &'static [&'static str],
    pub monitoring: &'static [&'static str],
}

/// Allergy vocabulary that excludes TMP/SMX (and trimethoprim cross-match
/// in the regimen validator).
pub static TMP_SMX_ALLERGY_TERMS: &[&str] =
    &["tmp/smx", "trimethoprim", "sulfamethoxazole", "sulfonamides"];

/// Agents in order of preference, first-line to alternatives.
pub static PREFERRED_ORDER: &[MedicationAgent] = &[
    MedicationAgent::Nitrofurantoin,
    MedicationAgent::TmpSmx,
    MedicationAgent::Trimethoprim,
    MedicationAgent::Fosfomycin,
];

/// Fixed dose/frequency/duration specification per agent.
pub fn spec_for(agent: MedicationAgent) -> &'static MedicationSpec {
    match agent {
        MedicationAgent::Nitrofurantoin => &MedicationSpec {
            regimen: "Nitrofurantoin macrocrystals",
            agent: MedicationAgent::Nitrofurantoin,
            dose: "100 mg",
            frequency: "PO BID",
            duration: "5 days",
            alternatives: &["TMP/SMX", "Trimethoprim", "Fosfomycin"],
            contraindications: &["eGFR <30 mL/min", "Recent nitrofurantoin use"],
            monitoring: &["Take with food", "Monitor for nausea, headache, dark urine"],
        },
        MedicationAgent::TmpSmx => &MedicationSpec {
            regimen: "Trimethoprim/Sulfamethoxazole",
            agent: MedicationAgent::TmpSmx,
            dose: "160/800 mg",
            frequency: "PO BID",
            duration: "3 days",
            alternatives: &["Nitrofurantoin", "Trimethoprim", "Fosfomycin"],
            contraindications: &["ACEI/ARB use (hyperkalemia risk)", "Sulfa allergy"],
            monitoring: &["Hydrate adequately", "Monitor for nausea, rash"],
        },
        MedicationAgent::Trimethoprim => &MedicationSpec {
            regimen: "Trimethoprim",
            agent: MedicationAgent::Trimethoprim,
            dose: "200 mg",
            frequency: "PO once daily",
            duration: "3 days",
            alternatives: &["Nitrofurantoin", "TMP/SMX", "Fosfomycin"],
            contraindications: &["Trimethoprim allergy"],
            monitoring: &["Hydrate adequately", "Monitor for nausea, rash"],
        },
        MedicationAgent::Fosfomycin => &MedicationSpec {
            regimen: "Fosfomycin trometamol",
            agent: MedicationAgent::Fosfomycin,
            dose: "3 g",
            frequency: "PO",
            duration: "Single dose",
            alternatives: &["Nitrofurantoin", "TMP/SMX", "Trimethoprim"],
            contraindications: &["Age <18 years"],
            monitoring: &[
                "Dissolve in water, take on empty stomach",
                "Monitor for nausea, diarrhea",
            ],
        },
    }
}

/// Treatment recommendation produced by the triage engine.
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Chosen agent name (e.g. "Nitrofurantoin macrocrystals").
    pub regimen: String,
    pub regimen_agent: Option<MedicationAgent>,
    pub dose: String,
    pub frequency: String,
    pub duration: String,
    pub alternatives: Vec<String>,
    pub contraindications: Vec<String>,
    pub monitoring: Vec<String>,
}

impl Recommendation {
    pub fn from_spec(spec: &MedicationSpec) -> Self {
        Self {
            regimen: spec.regimen.into(),
            regimen_agent: Some(spec.agent),
            dose: spec.dose.into(),
            frequency: spec.frequency.into(),
            duration: spec.duration.into(),
            alternatives: spec.alternatives.iter().map(|s| (*s).into()).collect(),
            contraindications: spec
                .contraindications
                .iter()
                .map(|s| (*s).into())
                .collect(),
            monitoring: spec.monitoring.iter().map(|s| (*s).into()).collect(),
        }
    }

    /// Single-line regimen rendering used by prompts and the validator,
    /// e.g. "Nitrofurantoin macrocrystals 100 mg PO BID x 5 days".
    pub fn as_text(&self) -> String {
        let head: Vec<&str> = [&self.regimen, &self.dose, &self.frequency]
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(String::as_str)
            .collect();
        let head = head.join(" ");
        if self.duration.is_empty() {
            head
        } else {
            format!("{head} x {}", self.duration)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommendation_text_includes_duration() {
        let rec = Recommendation::from_spec(spec_for(MedicationAgent::Nitrofurantoin));
        assert_eq!(
            rec.as_text(),
            "Nitrofurantoin macrocrystals 100 mg PO BID x 5 days"
        );
    }

    #[test]
    fn fosfomycin_is_single_dose() {
        let rec = Recommendation::from_spec(spec_for(MedicationAgent::Fosfomycin));
        assert_eq!(rec.as_text(), "Fosfomycin trometamol 3 g PO x Single dose");
        assert_eq!(rec.regimen_agent, Some(MedicationAgent::Fosfomycin));
    }

    #[test]
    fn preference_order_starts_with_nitrofurantoin() {
        assert_eq!(PREFERRED_ORDER[0], MedicationAgent::Nitrofurantoin);
        assert_eq!(PREFERRED_ORDER.len(), 4);
    }

    #[test]
    fn every_agent_lists_three_alternatives() {
        for agent in PREFERRED_ORDER {
            assert_eq!(spec_for(*agent).alternatives.len(), 3);
        }
    }
}

//! Fixed role table: one `RoleSpec` per generation role, carrying its
//! sampling temperature, structured-output schema, and tool capability.

use super::transport::GenerationRequest;

/// Static description of a generation role.
#[derive(Debug, Clone, Copy)]
pub struct RoleSpec {
    pub name: &'static str,
    pub temperature: Option<f64>,
    /// Schema name for structured output; `None` for free-text roles.
    pub schema: Option<&'static str>,
    pub web_search: bool,
    /// System instructions sent with every call for this role.
    pub instructions: &'static str,
}

impl RoleSpec {
    /// Assemble the transport request for this role.
    pub fn request(&self, model: String, prompt: String) -> GenerationRequest {
        GenerationRequest {
            role: self.name,
            model,
            instructions: self.instructions.to_string(),
            prompt,
            temperature: self.temperature,
            schema: self.schema,
            web_search: self.web_search,
        }
    }
}

pub const CLINICAL_REASONING: RoleSpec = RoleSpec {
    name: "clinical_reasoning",
    temperature: Some(0.2),
    schema: Some("clinical_reasoning"),
    web_search: true,
    instructions: "You are an expert clinical pharmacist and infectious disease \
        specialist providing clinical decision support for UTI assessment and \
        treatment planning.",
};

pub const SAFETY_VALIDATION: RoleSpec = RoleSpec {
    name: "safety_validation",
    temperature: Some(0.05),
    schema: Some("safety_validation"),
    web_search: true,
    instructions: "You are a clinical medication safety specialist responsible \
        for identifying contraindications, drug interactions, and safety \
        considerations for antimicrobial therapy.",
};

pub const WEB_RESEARCH: RoleSpec = RoleSpec {
    name: "web_research",
    temperature: Some(0.5),
    schema: None,
    web_search: true,
    instructions: "You are a clinical research assistant providing \
        evidence-based medical information with focus on current antimicrobial \
        resistance patterns and treatment guidelines. Prioritize Canadian and \
        Ontario sources, guidelines, and surveillance where applicable.",
};

pub const DIAGNOSIS: RoleSpec = RoleSpec {
    name: "diagnosis",
    temperature: Some(0.3),
    schema: None,
    web_search: true,
    instructions: "You are a senior clinician producing provider-ready \
        diagnosis and treatment briefs in professional Markdown, suitable for \
        attending physician review and clinical documentation.",
};

pub const VERIFIER: RoleSpec = RoleSpec {
    name: "verifier",
    temperature: Some(0.0),
    schema: Some("verification_report"),
    web_search: false,
    instructions: "You are a plan verification reviewer checking alignment \
        between a deterministic clinical assessment, safety screening, and the \
        generated reasoning and diagnosis.",
};

pub const CLAIM_EXTRACTOR: RoleSpec = RoleSpec {
    name: "claim_extractor",
    temperature: Some(0.05),
    schema: Some("claim_extraction"),
    web_search: false,
    instructions: "You are a clinical evidence analyst extracting and \
        organizing clinical claims from complex medical assessments while \
        maintaining rigorous citation standards.",
};

//! Persona framing for generated replies
//!
//! The generation engine is a plain completion model, so the persona lives in
//! the prompt: an instruction line, the literal question, then a reply marker
//! the model continues from. Stop sequences keep it from writing the next
//! question itself.

use crate::transcript::Transcript;

/// Default persona instruction
pub const DEFAULT_INSTRUCTION: &str = "Tu es Elise, une femme de 26 ans, française.";

/// Reply used when generation fails
pub const DEFAULT_FALLBACK_REPLY: &str =
    "Désolé, je ne peux pas traiter votre demande pour le moment.";

/// Section marker opening the instruction and reply sections
pub const SECTION_MARKER: &str = "###";

/// Label preceding the user's question
pub const QUESTION_LABEL: &str = "Question:";

/// Label preceding the model's reply
pub const REPLY_LABEL: &str = "Réponse:";

/// Fixed persona instruction and fallback reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaTemplate {
    instruction: String,
    fallback_reply: String,
}

impl Default for PersonaTemplate {
    fn default() -> Self {
        Self {
            instruction: DEFAULT_INSTRUCTION.to_string(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

impl PersonaTemplate {
    #[must_use]
    pub fn new(instruction: impl Into<String>, fallback_reply: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            fallback_reply: fallback_reply.into(),
        }
    }

    #[must_use]
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Spoken when the generation engine fails
    #[must_use]
    pub fn fallback_reply(&self) -> &str {
        &self.fallback_reply
    }

    /// Render the completion prompt for a question
    #[must_use]
    pub fn render(&self, question: &Transcript) -> String {
        format!(
            "{SECTION_MARKER} {} {QUESTION_LABEL} {question}\n{SECTION_MARKER} {REPLY_LABEL} ",
            self.instruction
        )
    }

    /// Stop sequences bounding the reply
    #[must_use]
    pub fn stop_sequences(&self) -> Vec<String> {
        [SECTION_MARKER, QUESTION_LABEL, REPLY_LABEL]
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

/// Fixed sampling parameters for generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 250,
            temperature: 0.2,
            top_p: 0.9,
            top_k: 10,
            repeat_penalty: 1.3,
        }
    }
}

/// A fully assembled completion request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub params: GenerationParams,
    pub stop: Vec<String>,
}

impl GenerationRequest {
    /// Frame a question with the persona
    #[must_use]
    pub fn new(persona: &PersonaTemplate, params: GenerationParams, question: &Transcript) -> Self {
        Self {
            prompt: persona.render(question),
            params,
            stop: persona.stop_sequences(),
        }
    }
}

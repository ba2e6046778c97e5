//! [`ExamAssistant`]: the public face of the library.
//!
//! Every operation follows the same three steps: build a prompt from
//! [`crate::prompts`], send it through the [`GeminiClient`] with the task's
//! tuning, then hand the reply to the matching parser in
//! [`crate::pipeline::parse`]. The assistant itself holds no per-call state,
//! so one instance can serve many concurrent callers.

use crate::config::{AssistantConfig, TaskTuning};
use crate::error::QuizError;
use crate::keys::KeyRotator;
use crate::pipeline::gemini::{DelayFn, GeminiClient, InvokeRequest, Transport};
use crate::pipeline::parse;
use crate::prompts::{self, ExtractionContext};
use crate::question::{
    ExtractedQuestion, GeneratedSolution, GenerationRequest, PageMemory, StructureCheck,
    ValidationVerdict,
};
use crate::validate;
use std::sync::Arc;
use tracing::{debug, info};

/// Raw reply and parsed records for one page.
#[derive(Debug, Clone, Default)]
pub struct PageReply {
    pub raw: String,
    pub questions: Vec<ExtractedQuestion>,
}

/// Extraction, generation and validation of exam questions via Gemini.
#[derive(Debug, Clone)]
pub struct ExamAssistant {
    config: AssistantConfig,
    client: GeminiClient,
}

impl ExamAssistant {
    /// Assistant backed by `reqwest`.
    ///
    /// The key pool is shared: keys set through [`Self::set_api_keys`] are
    /// seen by every holder of `keys`.
    pub fn new(config: AssistantConfig, keys: Arc<KeyRotator>) -> Result<Self, QuizError> {
        let client = GeminiClient::new(&config, keys)?;
        Ok(Self { config, client })
    }

    /// Assistant with an explicit transport and retry delay.
    pub fn with_transport(
        config: AssistantConfig,
        keys: Arc<KeyRotator>,
        transport: Arc<dyn Transport>,
        delay: DelayFn,
    ) -> Self {
        let client = GeminiClient::with_transport(&config, keys, transport, delay);
        Self { config, client }
    }

    /// Configuration and keys both read from the environment.
    pub fn from_env() -> Result<Self, QuizError> {
        let config = AssistantConfig::from_env()?;
        Self::new(config, Arc::new(KeyRotator::from_env()))
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<KeyRotator> {
        self.client.keys()
    }

    /// Replace the key pool and reset rotation to the first key.
    pub fn set_api_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.client.keys().set_keys(keys);
        info!("API key pool replaced: {} key(s)", self.client.keys().len());
    }

    async fn call(
        &self,
        prompt: &str,
        image: Option<&str>,
        tuning: TaskTuning,
    ) -> Result<String, QuizError> {
        self.client
            .invoke(&InvokeRequest {
                prompt,
                image,
                temperature: tuning.temperature,
                max_output_tokens: tuning.max_output_tokens,
            })
            .await
    }

    /// Extract the questions on one page image.
    ///
    /// `image` is a base64 payload or a `data:` URL. `prior_context` is the
    /// previous page's raw reply; only its tail reaches the prompt. When
    /// `page_memory` is given, it feeds the prompt and then records this
    /// page's reply.
    ///
    /// A reply with no decodable array yields an empty list, not an error.
    pub async fn extract_questions(
        &self,
        image: &str,
        page_number: u32,
        prior_context: Option<&str>,
        page_memory: Option<&mut PageMemory>,
    ) -> Result<Vec<ExtractedQuestion>, QuizError> {
        self.extract_page(image, page_number, prior_context, page_memory)
            .await
            .map(|reply| reply.questions)
    }

    /// [`Self::extract_questions`], also returning the raw reply.
    pub async fn extract_page(
        &self,
        image: &str,
        page_number: u32,
        prior_context: Option<&str>,
        page_memory: Option<&mut PageMemory>,
    ) -> Result<PageReply, QuizError> {
        let prompt = prompts::extraction_prompt(&ExtractionContext {
            page_number,
            prior_context,
            memory: page_memory.as_deref(),
            version: self.config.prompt_version,
        });

        let raw = self
            .call(&prompt, Some(image), self.config.extraction)
            .await?;
        let questions = parse::parse_extraction(&raw, page_number, page_memory);
        debug!("Page {}: {} question(s) extracted", page_number, questions.len());

        Ok(PageReply { raw, questions })
    }

    /// Generate new practice questions for a topic.
    ///
    /// Every returned record has a statement, a type and an answer, and
    /// carries `request.topic.id`.
    pub async fn generate_questions(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ExtractedQuestion>, QuizError> {
        let prompt = prompts::generation_prompt(request, self.config.prompt_version);
        let raw = self.call(&prompt, None, self.config.generation).await?;
        let questions = parse::parse_generation(&raw, &request.topic.id)?;
        info!(
            "Generated {} {} question(s) for topic '{}'",
            questions.len(),
            request.question_type,
            request.topic.name
        );
        Ok(questions)
    }

    /// Answer and solve a batch of questions, one result per question.
    ///
    /// An empty batch returns immediately without a request.
    pub async fn generate_solutions(
        &self,
        questions: &[ExtractedQuestion],
        topic_notes: Option<&str>,
    ) -> Result<Vec<GeneratedSolution>, QuizError> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = prompts::solution_prompt(questions, topic_notes);
        let raw = self.call(&prompt, None, self.config.solutions).await?;
        parse::parse_solutions(&raw, questions.len())
    }

    /// Ask the model whether a question's answer is wrong.
    ///
    /// An undecodable reply yields a "treat as correct" verdict with
    /// `degraded` set. Transport and API failures are still errors.
    pub async fn validate_question(
        &self,
        question: &ExtractedQuestion,
    ) -> Result<ValidationVerdict, QuizError> {
        let prompt = prompts::validation_prompt(question);
        let raw = self.call(&prompt, None, self.config.validation).await?;
        Ok(parse::parse_validation(&raw))
    }

    /// Local structural check; see [`validate::validate_question_structure`].
    pub fn validate_question_structure(&self, question: &ExtractedQuestion) -> StructureCheck {
        validate::validate_question_structure(question)
    }
}

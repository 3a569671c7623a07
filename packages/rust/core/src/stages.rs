//! The four generation stages.
//!
//! Each stage applies its fixed prompt pair to the completion client and
//! returns the generated text unchanged.

use std::sync::Arc;

use tracing::instrument;

use blogsmith_shared::{
    CompletionClient, CompletionRequest, GenerationParams, PromptPair, Result, Stage,
};

use crate::prompts;

/// Stage functions bound to one completion client and parameter set.
#[derive(Clone)]
pub struct Stages {
    client: Arc<dyn CompletionClient>,
    params: GenerationParams,
}

impl Stages {
    pub fn new(client: Arc<dyn CompletionClient>, params: GenerationParams) -> Self {
        Self { client, params }
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Propose a blog topic.
    pub async fn generate_topic(&self) -> Result<String> {
        self.call(Stage::Topic, prompts::topic()).await
    }

    /// Structured outline for `topic`.
    pub async fn write_outline(&self, topic: &str) -> Result<String> {
        self.call(Stage::Outline, prompts::outline(topic)).await
    }

    /// Revise `outline` against the four structural criteria.
    pub async fn evaluate_outline(&self, outline: &str) -> Result<String> {
        self.call(Stage::Evaluation, prompts::evaluation(outline))
            .await
    }

    /// Expand a revised outline into the full post.
    pub async fn write_blog(&self, revised_outline: &str) -> Result<String> {
        self.call(Stage::Blog, prompts::blog(revised_outline)).await
    }

    #[instrument(skip_all, fields(stage = %stage))]
    async fn call(&self, stage: Stage, prompt: PromptPair) -> Result<String> {
        let request = CompletionRequest::new(prompt, &self.params);
        self.client.complete(&request).await
    }
}

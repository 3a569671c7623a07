//! Core domain types for a Blogsmith workflow run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BlogsmithError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for workflow run identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Prompts and generation parameters
// ---------------------------------------------------------------------------

/// System instruction plus user prompt for one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    /// May be empty, in which case no system message is sent.
    pub system_instruction: String,
    pub user_prompt: String,
}

impl PromptPair {
    pub fn new(system_instruction: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            user_prompt: user_prompt.into(),
        }
    }
}

/// Model selection and sampling limits applied to every stage call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Model (Azure deployment) identifier.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A fully-specified completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: PromptPair,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Build a request for `prompt` using the given generation parameters.
    pub fn new(prompt: PromptPair, params: &GenerationParams) -> Self {
        Self {
            prompt,
            model: params.model.clone(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Stages and run state
// ---------------------------------------------------------------------------

/// One of the four generation stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Topic,
    Outline,
    Evaluation,
    Blog,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [Stage::Topic, Stage::Outline, Stage::Evaluation, Stage::Blog];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Outline => "outline",
            Self::Evaluation => "evaluation",
            Self::Blog => "blog",
        }
    }

    /// Runner state while this stage is executing.
    pub fn state(&self) -> RunState {
        match self {
            Self::Topic => RunState::GeneratingTopic,
            Self::Outline => RunState::WritingOutline,
            Self::Evaluation => RunState::EvaluatingOutline,
            Self::Blog => RunState::WritingBlog,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow runner state machine.
///
/// `Idle → GeneratingTopic → WritingOutline → EvaluatingOutline → WritingBlog
/// → Appending → Done`, with `Failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    GeneratingTopic,
    WritingOutline,
    EvaluatingOutline,
    WritingBlog,
    Appending,
    Done,
    Failed,
}

impl RunState {
    /// Next state on success; terminal states stay put.
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::GeneratingTopic,
            Self::GeneratingTopic => Self::WritingOutline,
            Self::WritingOutline => Self::EvaluatingOutline,
            Self::EvaluatingOutline => Self::WritingBlog,
            Self::WritingBlog => Self::Appending,
            Self::Appending => Self::Done,
            Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::GeneratingTopic => "generating_topic",
            Self::WritingOutline => "writing_outline",
            Self::EvaluatingOutline => "evaluating_outline",
            Self::WritingBlog => "writing_blog",
            Self::Appending => "appending",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunState {
    type Err = BlogsmithError;

    fn from_str(s: &str) -> Result<Self> {
        [
            Self::Idle,
            Self::GeneratingTopic,
            Self::WritingOutline,
            Self::EvaluatingOutline,
            Self::WritingBlog,
            Self::Appending,
            Self::Done,
            Self::Failed,
        ]
        .into_iter()
        .find(|state| state.as_str() == s)
        .ok_or_else(|| BlogsmithError::validation(format!("unknown run state '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// WorkflowRun
// ---------------------------------------------------------------------------

/// The outputs of one completed workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub topic: String,
    pub outline: String,
    pub revised_outline: String,
    pub blog_post: String,
}

/// Return at most the first `max_chars` characters of `text`.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

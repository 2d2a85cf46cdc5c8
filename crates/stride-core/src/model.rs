//! Core data model types for stride.
//!
//! Programs own tasks, tasks own an append-only log of interactions, and
//! evaluations record the scored outcome of a task or a whole program.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::metrics::ProgramMetrics;

/// The learning context a program runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Discovery,
    Pbl,
    Assessment,
}

impl Mode {
    /// Evaluation subtype used for a single task in this mode.
    pub fn task_subtype(&self) -> String {
        format!("{self}_task")
    }

    /// Evaluation subtype used for the program-level evaluation in this mode.
    pub fn program_subtype(&self) -> String {
        format!("{self}_complete")
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Discovery => write!(f, "discovery"),
            Mode::Pbl => write!(f, "pbl"),
            Mode::Assessment => write!(f, "assessment"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discovery" => Ok(Mode::Discovery),
            "pbl" => Ok(Mode::Pbl),
            "assessment" => Ok(Mode::Assessment),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks and interactions
// ---------------------------------------------------------------------------

/// Lifecycle of a task. Only moves forward: pending → active → completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Active,
    Completed,
}

impl TaskStatus {
    /// Whether a task in this status may move to `next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Active) | (TaskStatus::Active, TaskStatus::Completed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Active => write!(f, "active"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A single unit of work inside a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub program_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Append-only interaction log, in order. Unknown kinds are dropped on load.
    #[serde(default, deserialize_with = "deserialize_interactions")]
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

/// Denormalized task state written on completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<TaskEvaluationSummary>,
}

/// Evaluation summary attached to a completed task for fast reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvaluationSummary {
    pub evaluation_id: String,
    pub score: u32,
    #[serde(rename = "actualXP")]
    pub actual_xp: u32,
    pub feedback: String,
    /// Language code → feedback text.
    #[serde(default)]
    pub feedback_versions: BTreeMap<String, String>,
    pub evaluated_at: DateTime<Utc>,
}

impl Task {
    /// Score recorded for this task, if it has been evaluated.
    pub fn score(&self) -> u32 {
        self.metadata
            .evaluation
            .as_ref()
            .map(|e| e.score)
            .unwrap_or(0)
    }

    /// AI responses in interaction order.
    pub fn responses(&self) -> impl Iterator<Item = &AiResponse> {
        self.interactions.iter().filter_map(Interaction::response)
    }
}

/// One entry in a task's interaction log.
///
/// Serialized as `{"type": "...", "content": ..., "timestamp": ..., "context": ...}`
/// and decoded through [`RawInteraction`], so stored records with
/// string-encoded content load the same way as fresh ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInteraction", into = "RawInteraction")]
pub struct Interaction {
    pub kind: InteractionKind,
    pub timestamp: DateTime<Utc>,
    pub context: InteractionContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionKind {
    UserInput(String),
    AiResponse(AiResponse),
}

/// Structured content of an `ai_response` interaction.
///
/// Each field decodes on its own: a `null` or mistyped value falls back to
/// that field's default without discarding the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub completed: bool,
    #[serde(default, rename = "xpEarned", deserialize_with = "lenient_xp")]
    pub xp_earned: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub skills_improved: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub feedback: String,
    #[serde(default, deserialize_with = "lenient")]
    pub strengths: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub improvements: Vec<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// XP arrives as any JSON number (or a numeric string); round it and clamp
/// into `u32`.
fn lenient_xp<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let xp = match &value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(xp.map(clamp_xp).unwrap_or_default())
}

fn clamp_xp(xp: f64) -> u32 {
    if xp.is_nan() || xp <= 0.0 {
        0
    } else if xp >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        xp.round() as u32
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionContext {
    /// Seconds the learner spent on this interaction.
    #[serde(default)]
    pub time_spent: u64,
}

impl Interaction {
    pub fn user_input(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: InteractionKind::UserInput(content.into()),
            timestamp,
            context: InteractionContext::default(),
        }
    }

    pub fn ai_response(response: AiResponse, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: InteractionKind::AiResponse(response),
            timestamp,
            context: InteractionContext::default(),
        }
    }

    pub fn with_time_spent(mut self, seconds: u64) -> Self {
        self.context.time_spent = seconds;
        self
    }

    pub fn response(&self) -> Option<&AiResponse> {
        match &self.kind {
            InteractionKind::AiResponse(r) => Some(r),
            InteractionKind::UserInput(_) => None,
        }
    }
}

/// An interaction as it arrives from outside, before decoding.
///
/// `content` may be a JSON object, a JSON-encoded string, or free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInteraction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: InteractionContext,
}

impl RawInteraction {
    /// Decode into a typed interaction.
    ///
    /// Malformed `ai_response` content becomes a zeroed [`AiResponse`]; unknown
    /// kinds yield `None`.
    pub fn decode(self) -> Option<Interaction> {
        let kind = match self.kind.as_str() {
            "user_input" => InteractionKind::UserInput(match self.content {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            }),
            "ai_response" => InteractionKind::AiResponse(decode_ai_response(self.content)),
            other => {
                tracing::debug!("skipping interaction of unknown type '{other}'");
                return None;
            }
        };
        Some(Interaction {
            kind,
            timestamp: self.timestamp,
            context: self.context,
        })
    }
}

fn decode_ai_response(content: serde_json::Value) -> AiResponse {
    let value = match content {
        serde_json::Value::String(s) => match serde_json::from_str(&s) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("ai_response content is not valid JSON: {e}");
                return AiResponse::default();
            }
        },
        other => other,
    };
    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!("ai_response content has unexpected shape: {e}");
        AiResponse::default()
    })
}

impl TryFrom<RawInteraction> for Interaction {
    type Error = String;

    fn try_from(raw: RawInteraction) -> Result<Self, Self::Error> {
        let kind = raw.kind.clone();
        raw.decode()
            .ok_or_else(|| format!("unknown interaction type: {kind}"))
    }
}

impl From<Interaction> for RawInteraction {
    fn from(interaction: Interaction) -> Self {
        let (kind, content) = match interaction.kind {
            InteractionKind::UserInput(text) => ("user_input", serde_json::Value::String(text)),
            InteractionKind::AiResponse(response) => (
                "ai_response",
                serde_json::to_value(response).unwrap_or_default(),
            ),
        };
        Self {
            kind: kind.to_string(),
            content,
            timestamp: interaction.timestamp,
            context: interaction.context,
        }
    }
}

/// Decode a batch of raw interactions, dropping unknown kinds.
pub fn decode_interactions(raw: Vec<RawInteraction>) -> Vec<Interaction> {
    raw.into_iter().filter_map(RawInteraction::decode).collect()
}

fn deserialize_interactions<'de, D>(deserializer: D) -> Result<Vec<Interaction>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<RawInteraction>::deserialize(deserializer).map(decode_interactions)
}

// ---------------------------------------------------------------------------
// Programs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramStatus {
    #[default]
    Active,
    Completed,
}

/// A learner's run through a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub user_id: String,
    pub scenario_id: String,
    pub mode: Mode,
    #[serde(default)]
    pub status: ProgramStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: ProgramMetadata,
}

impl Program {
    /// When the learner started, preferring `created_at`.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.created_at.or(self.started_at)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramMetadata {
    #[serde(default, rename = "totalXP")]
    pub total_xp: u32,
    #[serde(default)]
    pub final_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_regenerated_at: Option<DateTime<Utc>>,
}

/// Optional world/career context forwarded to the generator and translator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainContext {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skill_focus: Vec<String>,
}

impl DomainContext {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.description.is_empty() && self.skill_focus.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Evaluations
// ---------------------------------------------------------------------------

pub const MAX_SCORE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationType {
    Task,
    Program,
}

/// Program-level qualitative feedback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitativeFeedback {
    #[serde(default)]
    pub overall_assessment: String,
    #[serde(default)]
    pub career_alignment: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub growth_areas: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl QualitativeFeedback {
    pub fn is_empty(&self) -> bool {
        self.overall_assessment.is_empty()
            && self.career_alignment.is_empty()
            && self.strengths.is_empty()
            && self.growth_areas.is_empty()
            && self.next_steps.is_empty()
    }
}

/// One language version of an evaluation's feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedbackBody {
    Text(String),
    Qualitative(QualitativeFeedback),
}

/// Mode-specific statistics stored with an evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeData {
    #[serde(rename = "xpEarned")]
    pub xp_earned: u32,
    pub total_attempts: u32,
    pub passed_attempts: u32,
    #[serde(default)]
    pub skills_improved: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Program-level rollup, present on program evaluations only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ProgramMetrics>,
}

/// Mode data keyed by the mode's block name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModeBlock {
    #[serde(rename = "discoveryData")]
    Discovery(ModeData),
    #[serde(rename = "pblData")]
    Pbl(ModeData),
    #[serde(rename = "assessmentData")]
    Assessment(ModeData),
}

impl ModeBlock {
    pub fn new(mode: Mode, data: ModeData) -> Self {
        match mode {
            Mode::Discovery => ModeBlock::Discovery(data),
            Mode::Pbl => ModeBlock::Pbl(data),
            Mode::Assessment => ModeBlock::Assessment(data),
        }
    }

    pub fn data(&self) -> &ModeData {
        match self {
            ModeBlock::Discovery(d) | ModeBlock::Pbl(d) | ModeBlock::Assessment(d) => d,
        }
    }
}

/// Fields supplied when creating or upserting an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvaluation {
    pub user_id: String,
    pub program_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub mode: Mode,
    pub evaluation_type: EvaluationType,
    pub evaluation_subtype: String,
    pub score: u32,
    pub max_score: u32,
    pub feedback_text: String,
    #[serde(default)]
    pub feedback_data: BTreeMap<String, FeedbackBody>,
    pub mode_data: ModeBlock,
}

/// A persisted evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: String,
    pub user_id: String,
    pub program_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub mode: Mode,
    pub evaluation_type: EvaluationType,
    pub evaluation_subtype: String,
    pub score: u32,
    pub max_score: u32,
    pub feedback_text: String,
    #[serde(default)]
    pub feedback_data: BTreeMap<String, FeedbackBody>,
    pub mode_data: ModeBlock,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every write; used for optimistic upserts.
    #[serde(default = "initial_version")]
    pub version: u32,
}

fn initial_version() -> u32 {
    1
}

impl Evaluation {
    /// Materialize a new record from its input fields.
    pub fn from_new(id: String, input: NewEvaluation, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: input.user_id,
            program_id: input.program_id,
            task_id: input.task_id,
            mode: input.mode,
            evaluation_type: input.evaluation_type,
            evaluation_subtype: input.evaluation_subtype,
            score: input.score.min(MAX_SCORE),
            max_score: input.max_score,
            feedback_text: input.feedback_text,
            feedback_data: input.feedback_data,
            mode_data: input.mode_data,
            created_at: now,
            updated_at: now,
            version: initial_version(),
        }
    }

    /// Overwrite the content fields, keeping identity and creation time.
    pub fn refresh(&mut self, input: NewEvaluation, now: DateTime<Utc>) {
        self.score = input.score.min(MAX_SCORE);
        self.max_score = input.max_score;
        self.feedback_text = input.feedback_text;
        self.feedback_data = input.feedback_data;
        self.mode_data = input.mode_data;
        self.updated_at = now;
        self.version += 1;
    }
}

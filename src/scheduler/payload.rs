//! Typed inputs and outputs for each job kind.
//!
//! Payloads arrive as JSON and are decoded against the submitted kind, so a
//! handler only ever sees the variant it was registered for.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::AggregatedView;
use crate::scheduler::job::JobKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseTemplatePayload {
    pub template_id: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPdfPayload {
    pub resume_id: String,
    #[serde(default)]
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAtsPayload {
    pub resume_id: String,
    pub resume_text: String,
    pub job_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewAnswer {
    pub question: String,
    /// Rating on a 0-10 scale.
    pub rating: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateInterviewPayload {
    pub interview_id: String,
    #[serde(default)]
    pub candidate_id: Option<String>,
    pub answers: Vec<InterviewAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeEvaluatePayload {
    pub interview_id: String,
    pub judge_role: String,
    pub weight: f64,
    /// Explicit score; when absent the judge's rubric ratings are averaged.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub ratings: Vec<f64>,
    /// Roles the panel waits for. Installed as the completion rule when the
    /// panel has none yet.
    #[serde(default)]
    pub expected_roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum JobPayload {
    ParseTemplate(ParseTemplatePayload),
    RenderPdf(RenderPdfPayload),
    ScoreAts(ScoreAtsPayload),
    EvaluateInterview(EvaluateInterviewPayload),
    JudgeEvaluate(JudgeEvaluatePayload),
}

impl JobPayload {
    /// Decode a raw JSON payload for the given kind.
    pub fn from_json(kind: JobKind, value: serde_json::Value) -> Result<Self, String> {
        let decoded = match kind {
            JobKind::ParseTemplate => serde_json::from_value(value).map(JobPayload::ParseTemplate),
            JobKind::RenderPdf => serde_json::from_value(value).map(JobPayload::RenderPdf),
            JobKind::ScoreAts => serde_json::from_value(value).map(JobPayload::ScoreAts),
            JobKind::EvaluateInterview => {
                serde_json::from_value(value).map(JobPayload::EvaluateInterview)
            }
            JobKind::JudgeEvaluate => serde_json::from_value(value).map(JobPayload::JudgeEvaluate),
        };
        let payload = decoded.map_err(|e| format!("{} payload: {}", kind, e))?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::ParseTemplate(_) => JobKind::ParseTemplate,
            JobPayload::RenderPdf(_) => JobKind::RenderPdf,
            JobPayload::ScoreAts(_) => JobKind::ScoreAts,
            JobPayload::EvaluateInterview(_) => JobKind::EvaluateInterview,
            JobPayload::JudgeEvaluate(_) => JobKind::JudgeEvaluate,
        }
    }

    /// Shape checks shared by every handler of a kind.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            JobPayload::ParseTemplate(p) => require("template_id", &p.template_id),
            JobPayload::RenderPdf(p) => require("resume_id", &p.resume_id),
            JobPayload::ScoreAts(p) => {
                require("resume_id", &p.resume_id)?;
                require("job_description", &p.job_description)
            }
            JobPayload::EvaluateInterview(p) => {
                require("interview_id", &p.interview_id)?;
                if p.answers.is_empty() {
                    return Err("answers must not be empty".to_string());
                }
                for answer in &p.answers {
                    if !(0.0..=10.0).contains(&answer.rating) {
                        return Err(format!(
                            "rating {} for '{}' is outside 0-10",
                            answer.rating, answer.question
                        ));
                    }
                    if !answer.weight.is_finite() || answer.weight < 0.0 {
                        return Err(format!("weight for '{}' must be >= 0", answer.question));
                    }
                }
                Ok(())
            }
            JobPayload::JudgeEvaluate(p) => {
                require("interview_id", &p.interview_id)?;
                require("judge_role", &p.judge_role)?;
                if !p.weight.is_finite() || p.weight < 0.0 {
                    return Err("weight must be a finite number >= 0".to_string());
                }
                match p.score {
                    Some(score) if !score.is_finite() => Err("score must be finite".to_string()),
                    None if p.ratings.is_empty() => {
                        Err("either score or ratings is required".to_string())
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} must not be empty", field))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTemplate {
    pub template_id: String,
    pub fields: Vec<String>,
    pub sections: Vec<String>,
}

/// Reference to a rendered document held by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub resume_id: String,
    pub template_id: Option<String>,
    pub uri: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtsScore {
    pub resume_id: String,
    pub score: f64,
    pub matched_keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub question: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewEvaluation {
    pub interview_id: String,
    pub score: f64,
    pub breakdown: Vec<QuestionScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeEvaluation {
    pub interview_id: String,
    pub judge_role: String,
    pub contribution_id: Uuid,
    pub score: f64,
    /// Panel state right after this contribution, when it could be computed.
    pub panel: Option<AggregatedView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum JobOutput {
    ParseTemplate(ParsedTemplate),
    RenderPdf(DocumentRef),
    ScoreAts(AtsScore),
    EvaluateInterview(InterviewEvaluation),
    JudgeEvaluate(JudgeEvaluation),
}

impl JobOutput {
    pub fn kind(&self) -> JobKind {
        match self {
            JobOutput::ParseTemplate(_) => JobKind::ParseTemplate,
            JobOutput::RenderPdf(_) => JobKind::RenderPdf,
            JobOutput::ScoreAts(_) => JobKind::ScoreAts,
            JobOutput::EvaluateInterview(_) => JobKind::EvaluateInterview,
            JobOutput::JudgeEvaluate(_) => JobKind::JudgeEvaluate,
        }
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::scheduler::payload::{
    AtsScore, EvaluateInterviewPayload, InterviewEvaluation, QuestionScore, ScoreAtsPayload,
};
use crate::scheduler::{JobOutput, JobPayload};
use crate::worker::context::JobContext;
use crate::worker::registry::TaskHandler;

/// Scores a resume against a job description.
#[async_trait]
pub trait AtsScorer: Send + Sync + 'static {
    async fn score(&self, payload: &ScoreAtsPayload) -> Result<AtsScore, HandlerError>;
}

/// Scores a whole interview from its rated answers.
#[async_trait]
pub trait InterviewEvaluator: Send + Sync + 'static {
    async fn evaluate(
        &self,
        payload: &EvaluateInterviewPayload,
    ) -> Result<InterviewEvaluation, HandlerError>;
}

const STOP_WORDS: &[&str] = &[
    "and", "are", "for", "from", "has", "have", "our", "the", "that", "this", "with", "will",
    "you", "your", "who", "into", "all", "can", "not", "but", "its", "was", "were", "been",
];

fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() >= 3 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Keyword overlap between the job description and the resume text.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordScorer;

#[async_trait]
impl AtsScorer for KeywordScorer {
    async fn score(&self, payload: &ScoreAtsPayload) -> Result<AtsScore, HandlerError> {
        let wanted = keywords(&payload.job_description);
        if wanted.is_empty() {
            return Err(HandlerError::InvalidInput(
                "job description has no keywords".to_string(),
            ));
        }
        let present = keywords(&payload.resume_text);

        let (matched, missing): (Vec<String>, Vec<String>) =
            wanted.iter().cloned().partition(|k| present.contains(k));
        let score = round2(matched.len() as f64 * 100.0 / wanted.len() as f64);

        Ok(AtsScore {
            resume_id: payload.resume_id.clone(),
            score,
            matched_keywords: matched,
            missing_keywords: missing,
        })
    }
}

/// Weighted mean of 0-10 answer ratings, reported on a 0-100 scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct RubricEvaluator;

#[async_trait]
impl InterviewEvaluator for RubricEvaluator {
    async fn evaluate(
        &self,
        payload: &EvaluateInterviewPayload,
    ) -> Result<InterviewEvaluation, HandlerError> {
        let total_weight: f64 = payload.answers.iter().map(|a| a.weight).sum();
        if total_weight <= 0.0 {
            return Err(HandlerError::InvalidInput(
                "answer weights sum to zero".to_string(),
            ));
        }

        let weighted: f64 = payload.answers.iter().map(|a| a.rating * a.weight).sum();
        let breakdown = payload
            .answers
            .iter()
            .map(|a| QuestionScore {
                question: a.question.clone(),
                score: round2(a.rating * 10.0),
            })
            .collect();

        Ok(InterviewEvaluation {
            interview_id: payload.interview_id.clone(),
            score: round2(weighted / total_weight * 10.0),
            breakdown,
        })
    }
}

pub struct ScoreAtsHandler {
    scorer: Arc<dyn AtsScorer>,
}

impl ScoreAtsHandler {
    pub fn new(scorer: impl AtsScorer) -> Self {
        Self {
            scorer: Arc::new(scorer),
        }
    }
}

impl Default for ScoreAtsHandler {
    fn default() -> Self {
        Self::new(KeywordScorer)
    }
}

#[async_trait]
impl TaskHandler for ScoreAtsHandler {
    async fn run(&self, payload: JobPayload, ctx: JobContext) -> Result<JobOutput, HandlerError> {
        let JobPayload::ScoreAts(payload) = payload else {
            return Err(HandlerError::InvalidInput(
                "expected a score_ats payload".to_string(),
            ));
        };

        ctx.report_progress(10).await;
        let score = self.scorer.score(&payload).await?;
        ctx.ensure_active()?;
        ctx.report_progress(100).await;

        tracing::debug!(
            job_id = %ctx.job_id(),
            resume_id = %score.resume_id,
            score = score.score,
            "Resume scored"
        );
        Ok(JobOutput::ScoreAts(score))
    }
}

pub struct EvaluateInterviewHandler {
    evaluator: Arc<dyn InterviewEvaluator>,
}

impl EvaluateInterviewHandler {
    pub fn new(evaluator: impl InterviewEvaluator) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
        }
    }
}

impl Default for EvaluateInterviewHandler {
    fn default() -> Self {
        Self::new(RubricEvaluator)
    }
}

#[async_trait]
impl TaskHandler for EvaluateInterviewHandler {
    async fn run(&self, payload: JobPayload, ctx: JobContext) -> Result<JobOutput, HandlerError> {
        let JobPayload::EvaluateInterview(payload) = payload else {
            return Err(HandlerError::InvalidInput(
                "expected an evaluate_interview payload".to_string(),
            ));
        };

        ctx.report_progress(10).await;
        let evaluation = self.evaluator.evaluate(&payload).await?;
        ctx.ensure_active()?;
        ctx.report_progress(100).await;

        Ok(JobOutput::EvaluateInterview(evaluation))
    }
}

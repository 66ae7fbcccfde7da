use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregate::{Aggregator, CompletionRule};
use crate::error::HandlerError;
use crate::scheduler::payload::{JudgeEvaluatePayload, JudgeEvaluation};
use crate::scheduler::{JobOutput, JobPayload};
use crate::worker::context::JobContext;
use crate::worker::registry::TaskHandler;

/// Produces a single judge's score for an interview.
#[async_trait]
pub trait JudgeScorer: Send + Sync + 'static {
    async fn score(&self, payload: &JudgeEvaluatePayload) -> Result<f64, HandlerError>;
}

/// Uses the explicit score when given, otherwise the mean of the ratings.
#[derive(Debug, Clone, Copy, Default)]
pub struct RubricJudge;

#[async_trait]
impl JudgeScorer for RubricJudge {
    async fn score(&self, payload: &JudgeEvaluatePayload) -> Result<f64, HandlerError> {
        if let Some(score) = payload.score {
            return Ok(score);
        }
        if payload.ratings.is_empty() {
            return Err(HandlerError::InvalidInput(
                "judge provided neither score nor ratings".to_string(),
            ));
        }
        Ok(payload.ratings.iter().sum::<f64>() / payload.ratings.len() as f64)
    }
}

/// Scores one judge's view of an interview and feeds it to the panel.
///
/// The interview id is the aggregation key. When the payload lists
/// `expected_roles` and the panel has no rule yet, those roles become the
/// panel's completion rule.
pub struct JudgeEvaluateHandler {
    scorer: Arc<dyn JudgeScorer>,
    aggregator: Arc<Aggregator>,
}

impl JudgeEvaluateHandler {
    pub fn new(scorer: impl JudgeScorer, aggregator: Arc<Aggregator>) -> Self {
        Self {
            scorer: Arc::new(scorer),
            aggregator,
        }
    }
}

#[async_trait]
impl TaskHandler for JudgeEvaluateHandler {
    async fn run(&self, payload: JobPayload, ctx: JobContext) -> Result<JobOutput, HandlerError> {
        let JobPayload::JudgeEvaluate(payload) = payload else {
            return Err(HandlerError::InvalidInput(
                "expected a judge_evaluate payload".to_string(),
            ));
        };

        ctx.report_progress(10).await;
        let score = self.scorer.score(&payload).await?;
        ctx.ensure_active()?;
        ctx.report_progress(50).await;

        let key = payload.interview_id.as_str();
        if let Some(roles) = &payload.expected_roles {
            if self
                .aggregator
                .configure_if_absent(key, CompletionRule::expected_roles(roles.clone()))
                .await
            {
                tracing::debug!(aggregation_key = key, roles = ?roles, "Panel roles installed");
            }
        }

        let contribution = self
            .aggregator
            .submit_contribution(key, &payload.judge_role, payload.weight, score)
            .await?;
        // A zero-weight panel has no mean yet; the contribution still counts.
        let panel = self.aggregator.get_aggregated(key).await.ok();
        ctx.report_progress(100).await;

        Ok(JobOutput::JudgeEvaluate(JudgeEvaluation {
            interview_id: payload.interview_id,
            judge_role: payload.judge_role,
            contribution_id: contribution.id,
            score,
            panel,
        }))
    }
}

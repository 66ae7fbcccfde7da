//! Built-in handlers for the platform's job kinds.
//!
//! Each handler wraps a collaborator trait. The defaults here are in-process
//! and deterministic; production deployments swap in clients for the real
//! document and scoring services through [`HandlerRegistry::builder`].

mod document;
mod judge;
mod scoring;

use std::sync::Arc;

use crate::aggregate::Aggregator;
use crate::scheduler::JobKind;
use crate::worker::registry::HandlerRegistry;

pub use document::{
    DocumentRenderer, ParseTemplateHandler, PlaceholderParser, ReferenceRenderer,
    RenderPdfHandler, TemplateParser,
};
pub use judge::{JudgeEvaluateHandler, JudgeScorer, RubricJudge};
pub use scoring::{
    AtsScorer, EvaluateInterviewHandler, InterviewEvaluator, KeywordScorer, RubricEvaluator,
    ScoreAtsHandler,
};

/// Registry with a default handler for every kind.
pub fn default_registry(aggregator: Arc<Aggregator>, document_base_uri: &str) -> HandlerRegistry {
    HandlerRegistry::builder()
        .register(JobKind::ParseTemplate, ParseTemplateHandler::default())
        .register(
            JobKind::RenderPdf,
            RenderPdfHandler::new(ReferenceRenderer::new(document_base_uri)),
        )
        .register(JobKind::ScoreAts, ScoreAtsHandler::default())
        .register(JobKind::EvaluateInterview, EvaluateInterviewHandler::default())
        .register(
            JobKind::JudgeEvaluate,
            JudgeEvaluateHandler::new(RubricJudge, aggregator),
        )
        .build()
}

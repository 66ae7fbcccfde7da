use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::scheduler::payload::{
    DocumentRef, ParseTemplatePayload, ParsedTemplate, RenderPdfPayload,
};
use crate::scheduler::{JobOutput, JobPayload};
use crate::worker::context::JobContext;
use crate::worker::registry::TaskHandler;

/// Turns a template source into its fields and sections.
#[async_trait]
pub trait TemplateParser: Send + Sync + 'static {
    async fn parse(&self, template_id: &str, source: &str) -> Result<ParsedTemplate, HandlerError>;
}

/// Produces a stored document for a resume.
#[async_trait]
pub trait DocumentRenderer: Send + Sync + 'static {
    async fn render(
        &self,
        resume_id: &str,
        template_id: Option<&str>,
    ) -> Result<DocumentRef, HandlerError>;
}

/// Reads `{{field}}` placeholders and `#` section headings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderParser;

impl PlaceholderParser {
    fn fields(source: &str) -> Result<Vec<String>, HandlerError> {
        let mut fields: Vec<String> = Vec::new();
        let mut rest = source;

        loop {
            let open = rest.find("{{");
            let close = rest.find("}}");
            let start = match (open, close) {
                (None, None) => break,
                (None, Some(_)) => {
                    return Err(HandlerError::InvalidInput(
                        "unbalanced '}}' in template".to_string(),
                    ))
                }
                (Some(o), Some(c)) if c < o => {
                    return Err(HandlerError::InvalidInput(
                        "unbalanced '}}' in template".to_string(),
                    ))
                }
                (Some(o), _) => o,
            };

            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                HandlerError::InvalidInput("unclosed '{{' in template".to_string())
            })?;
            let name = after[..end].trim();
            if name.is_empty() || name.contains("{{") {
                return Err(HandlerError::InvalidInput(format!(
                    "malformed placeholder '{{{{{}}}}}'",
                    &after[..end]
                )));
            }
            if !fields.iter().any(|f| f == name) {
                fields.push(name.to_string());
            }
            rest = &after[end + 2..];
        }

        Ok(fields)
    }

    fn sections(source: &str) -> Vec<String> {
        source
            .lines()
            .filter_map(|line| line.trim_start().strip_prefix('#'))
            .map(|heading| heading.trim_start_matches('#').trim())
            .filter(|heading| !heading.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl TemplateParser for PlaceholderParser {
    async fn parse(&self, template_id: &str, source: &str) -> Result<ParsedTemplate, HandlerError> {
        if source.trim().is_empty() {
            return Err(HandlerError::InvalidInput(
                "template source is empty".to_string(),
            ));
        }
        Ok(ParsedTemplate {
            template_id: template_id.to_string(),
            fields: Self::fields(source)?,
            sections: Self::sections(source),
        })
    }
}

/// Addresses rendered documents under a base URI without producing bytes.
#[derive(Debug, Clone)]
pub struct ReferenceRenderer {
    base_uri: String,
}

impl ReferenceRenderer {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Resume and template ids end up in document URIs.
pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[async_trait]
impl DocumentRenderer for ReferenceRenderer {
    async fn render(
        &self,
        resume_id: &str,
        template_id: Option<&str>,
    ) -> Result<DocumentRef, HandlerError> {
        let uri = match template_id {
            Some(template) => format!("{}/{}/{}.pdf", self.base_uri, resume_id, template),
            None => format!("{}/{}.pdf", self.base_uri, resume_id),
        };
        Ok(DocumentRef {
            resume_id: resume_id.to_string(),
            template_id: template_id.map(str::to_string),
            uri,
            content_type: "application/pdf".to_string(),
        })
    }
}

pub struct ParseTemplateHandler {
    parser: Arc<dyn TemplateParser>,
}

impl ParseTemplateHandler {
    pub fn new(parser: impl TemplateParser) -> Self {
        Self {
            parser: Arc::new(parser),
        }
    }
}

impl Default for ParseTemplateHandler {
    fn default() -> Self {
        Self::new(PlaceholderParser)
    }
}

#[async_trait]
impl TaskHandler for ParseTemplateHandler {
    async fn run(&self, payload: JobPayload, ctx: JobContext) -> Result<JobOutput, HandlerError> {
        let JobPayload::ParseTemplate(ParseTemplatePayload { template_id, source }) = payload
        else {
            return Err(HandlerError::InvalidInput(
                "expected a parse_template payload".to_string(),
            ));
        };

        ctx.report_progress(10).await;
        let parsed = self.parser.parse(&template_id, &source).await?;
        ctx.ensure_active()?;
        ctx.report_progress(100).await;

        tracing::debug!(
            job_id = %ctx.job_id(),
            template_id = %parsed.template_id,
            fields = parsed.fields.len(),
            sections = parsed.sections.len(),
            "Template parsed"
        );
        Ok(JobOutput::ParseTemplate(parsed))
    }
}

pub struct RenderPdfHandler {
    renderer: Arc<dyn DocumentRenderer>,
}

impl RenderPdfHandler {
    pub fn new(renderer: impl DocumentRenderer) -> Self {
        Self {
            renderer: Arc::new(renderer),
        }
    }
}

#[async_trait]
impl TaskHandler for RenderPdfHandler {
    fn validate(&self, payload: &JobPayload) -> Result<(), String> {
        let JobPayload::RenderPdf(p) = payload else {
            return Ok(());
        };
        if !is_valid_id(&p.resume_id) {
            return Err(format!("resume_id '{}' is not a valid id", p.resume_id));
        }
        match &p.template_id {
            Some(t) if !is_valid_id(t) => Err(format!("template_id '{}' is not a valid id", t)),
            _ => Ok(()),
        }
    }

    async fn run(&self, payload: JobPayload, ctx: JobContext) -> Result<JobOutput, HandlerError> {
        let JobPayload::RenderPdf(RenderPdfPayload {
            resume_id,
            template_id,
        }) = payload
        else {
            return Err(HandlerError::InvalidInput(
                "expected a render_pdf payload".to_string(),
            ));
        };

        ctx.report_progress(10).await;
        let document = self
            .renderer
            .render(&resume_id, template_id.as_deref())
            .await?;
        ctx.ensure_active()?;
        ctx.report_progress(100).await;

        tracing::debug!(job_id = %ctx.job_id(), uri = %document.uri, "Document rendered");
        Ok(JobOutput::RenderPdf(document))
    }
}

//! Multi-contributor aggregation for judge panels.
//!
//! Several judges score the same interview independently. Each score is an
//! [`EvaluationContribution`] keyed by the interview id; the [`Aggregator`]
//! folds them into a weighted mean and decides completion with a
//! caller-supplied [`CompletionRule`].
//!
//! # Weights
//!
//! Weights are stored exactly as submitted. They are normalized only when the
//! mean is computed:
//!
//! ```text
//! aggregated = sum(score_i * weight_i) / sum(weight_i)
//! ```
//!
//! A panel whose weights sum to zero has no defined mean and reports
//! [`AggregateError::NoWeightedInput`].
//!
//! # Recomputation
//!
//! The panel view is recomputed whenever a contribution arrives, a finalize
//! is requested or the rule changes, and cached until the next such event.
//! Contributions are kept in role order so the same set always folds in the
//! same order and yields the identical value.

mod rule;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AggregateError;

pub use rule::{CompletionRule, PanelProgress};

/// One judge's weighted input toward an interview's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContribution {
    pub id: Uuid,
    pub interview_id: String,
    pub judge_role: String,
    pub weight: f64,
    pub score: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Aggregated read of a panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedView {
    pub aggregation_key: String,
    /// `None` until the first contribution arrives.
    pub aggregated_score: Option<f64>,
    pub contributions_received: usize,
    pub contributions_expected: Option<usize>,
    pub complete: bool,
    pub finalize_requested: bool,
}

/// Weighted mean over contributions, normalizing weights at call time.
///
/// Weights are first scaled by the largest one and the mean is folded as a
/// convex combination of the scores, so no intermediate sum can overflow for
/// any finite input.
pub fn weighted_mean<'a, I>(key: &str, contributions: I) -> Result<f64, AggregateError>
where
    I: IntoIterator<Item = &'a EvaluationContribution>,
{
    let contributions: Vec<&EvaluationContribution> = contributions.into_iter().collect();
    let max_weight = contributions
        .iter()
        .map(|c| c.weight)
        .fold(0.0_f64, f64::max);
    if max_weight <= 0.0 {
        return Err(AggregateError::NoWeightedInput(key.to_string()));
    }

    let total: f64 = contributions.iter().map(|c| c.weight / max_weight).sum();
    let mean = contributions
        .iter()
        .map(|c| c.score * (c.weight / max_weight / total))
        .sum::<f64>();

    if !mean.is_finite() {
        return Err(AggregateError::NoWeightedInput(key.to_string()));
    }
    Ok(mean)
}

#[derive(Debug)]
struct Panel {
    contributions: BTreeMap<String, EvaluationContribution>,
    rule: Option<CompletionRule>,
    finalize_requested: bool,
    last_activity: DateTime<Utc>,
    view: Result<AggregatedView, AggregateError>,
}

impl Panel {
    fn new(key: &str) -> Self {
        let mut panel = Self {
            contributions: BTreeMap::new(),
            rule: None,
            finalize_requested: false,
            last_activity: Utc::now(),
            view: Err(AggregateError::KeyNotFound(key.to_string())),
        };
        panel.recompute(key);
        panel
    }

    fn recompute(&mut self, key: &str) {
        self.last_activity = Utc::now();
        let score = if self.contributions.is_empty() {
            Ok(None)
        } else {
            weighted_mean(key, self.contributions.values()).map(Some)
        };

        let progress = PanelProgress::new(&self.contributions, self.finalize_requested);
        let default_rule;
        let rule = match &self.rule {
            Some(rule) => rule,
            None => {
                default_rule = CompletionRule::on_finalize();
                &default_rule
            }
        };
        let complete = rule.is_satisfied(&progress);
        let contributions_expected = rule.expected();

        self.view = score.map(|aggregated_score| AggregatedView {
            aggregation_key: key.to_string(),
            aggregated_score,
            contributions_received: self.contributions.len(),
            contributions_expected,
            complete,
            finalize_requested: self.finalize_requested,
        });
    }
}

/// Holds every judge panel in the process.
#[derive(Debug, Default)]
pub struct Aggregator {
    panels: RwLock<HashMap<String, Panel>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the completion rule for a panel, creating it if needed.
    pub async fn configure(&self, key: &str, rule: CompletionRule) {
        let mut panels = self.panels.write().await;
        let panel = panels
            .entry(key.to_string())
            .or_insert_with(|| Panel::new(key));
        panel.rule = Some(rule);
        panel.recompute(key);
        tracing::debug!(aggregation_key = key, "Panel rule configured");
    }

    /// Install a rule only if the panel has none. Returns true if it was installed.
    pub async fn configure_if_absent(&self, key: &str, rule: CompletionRule) -> bool {
        let mut panels = self.panels.write().await;
        let panel = panels
            .entry(key.to_string())
            .or_insert_with(|| Panel::new(key));
        if panel.rule.is_some() {
            return false;
        }
        panel.rule = Some(rule);
        panel.recompute(key);
        true
    }

    /// Record a judge's contribution. A second contribution from the same role
    /// replaces the first.
    pub async fn submit_contribution(
        &self,
        key: &str,
        judge_role: &str,
        weight: f64,
        score: f64,
    ) -> Result<EvaluationContribution, AggregateError> {
        if key.trim().is_empty() {
            return Err(AggregateError::InvalidContribution(
                "aggregation key must not be empty".to_string(),
            ));
        }
        if judge_role.trim().is_empty() {
            return Err(AggregateError::InvalidContribution(
                "judge role must not be empty".to_string(),
            ));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(AggregateError::InvalidContribution(format!(
                "weight must be a finite number >= 0, got {}",
                weight
            )));
        }
        if !score.is_finite() {
            return Err(AggregateError::InvalidContribution(
                "score must be finite".to_string(),
            ));
        }

        let contribution = EvaluationContribution {
            id: Uuid::new_v4(),
            interview_id: key.to_string(),
            judge_role: judge_role.to_string(),
            weight,
            score,
            submitted_at: Utc::now(),
        };

        let mut panels = self.panels.write().await;
        let panel = panels
            .entry(key.to_string())
            .or_insert_with(|| Panel::new(key));
        let replaced = panel
            .contributions
            .insert(judge_role.to_string(), contribution.clone())
            .is_some();
        panel.recompute(key);

        tracing::info!(
            aggregation_key = key,
            judge_role,
            weight,
            score,
            replaced,
            received = panel.contributions.len(),
            "Contribution recorded"
        );
        Ok(contribution)
    }

    /// Request finalization. Panels on the default rule complete once they have
    /// at least one contribution and a finalize request.
    pub async fn finalize(&self, key: &str) -> Result<AggregatedView, AggregateError> {
        let mut panels = self.panels.write().await;
        let panel = panels
            .get_mut(key)
            .ok_or_else(|| AggregateError::KeyNotFound(key.to_string()))?;
        panel.finalize_requested = true;
        panel.recompute(key);
        tracing::info!(aggregation_key = key, "Panel finalize requested");
        panel.view.clone()
    }

    /// Current view of a panel. Before completion this is the partial mean.
    pub async fn get_aggregated(&self, key: &str) -> Result<AggregatedView, AggregateError> {
        let panels = self.panels.read().await;
        panels
            .get(key)
            .ok_or_else(|| AggregateError::KeyNotFound(key.to_string()))?
            .view
            .clone()
    }

    /// Contributions of a panel in role order.
    pub async fn contributions(
        &self,
        key: &str,
    ) -> Result<Vec<EvaluationContribution>, AggregateError> {
        let panels = self.panels.read().await;
        let panel = panels
            .get(key)
            .ok_or_else(|| AggregateError::KeyNotFound(key.to_string()))?;
        Ok(panel.contributions.values().cloned().collect())
    }

    pub async fn panel_count(&self) -> usize {
        self.panels.read().await.len()
    }

    /// Drop panels with no rule change, contribution or finalize since
    /// `cutoff`. Returns the number removed.
    pub async fn purge_idle_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut panels = self.panels.write().await;
        let before = panels.len();
        panels.retain(|_, panel| panel.last_activity >= cutoff);
        before - panels.len()
    }
}

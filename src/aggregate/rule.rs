use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::EvaluationContribution;

/// What a completion predicate gets to look at.
pub struct PanelProgress<'a> {
    contributions: &'a BTreeMap<String, EvaluationContribution>,
    finalize_requested: bool,
}

impl<'a> PanelProgress<'a> {
    pub(super) fn new(
        contributions: &'a BTreeMap<String, EvaluationContribution>,
        finalize_requested: bool,
    ) -> Self {
        Self {
            contributions,
            finalize_requested,
        }
    }

    pub fn received(&self) -> usize {
        self.contributions.len()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.contributions.contains_key(role)
    }

    pub fn finalize_requested(&self) -> bool {
        self.finalize_requested
    }

    pub fn contributions(&self) -> impl Iterator<Item = &'a EvaluationContribution> {
        self.contributions.values()
    }
}

type Predicate = dyn Fn(&PanelProgress<'_>) -> bool + Send + Sync;

/// Caller-chosen condition under which a panel counts as complete.
#[derive(Clone)]
pub struct CompletionRule {
    expected: Option<usize>,
    predicate: Arc<Predicate>,
}

impl CompletionRule {
    /// Arbitrary predicate. `expected` is only reported back to readers.
    pub fn new<F>(expected: Option<usize>, predicate: F) -> Self
    where
        F: Fn(&PanelProgress<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            expected,
            predicate: Arc::new(predicate),
        }
    }

    /// Complete once `count` distinct judges have reported.
    pub fn expected_count(count: usize) -> Self {
        Self::new(Some(count), move |p| p.received() >= count)
    }

    /// Complete once every listed role has reported.
    pub fn expected_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: BTreeSet<String> = roles.into_iter().map(Into::into).collect();
        Self::new(Some(roles.len()), move |p| {
            roles.iter().all(|role| p.has_role(role))
        })
    }

    /// Complete once at least one judge reported and finalize was requested.
    pub fn on_finalize() -> Self {
        Self::new(None, |p| p.finalize_requested() && p.received() >= 1)
    }

    pub fn expected(&self) -> Option<usize> {
        self.expected
    }

    pub fn is_satisfied(&self, progress: &PanelProgress<'_>) -> bool {
        (self.predicate)(progress)
    }
}

impl fmt::Debug for CompletionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionRule")
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

//! Check engine: named boolean predicates over iteration responses
//!
//! Checks are pure and independent of each other: every predicate runs for
//! every completed iteration, with no ordering guarantee and no
//! short-circuiting. A predicate that panics fails that one check and
//! nothing else.

use crate::iteration::Response;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

type Predicate = dyn Fn(&Response) -> bool + Send + Sync;

/// A named predicate evaluated against every completed iteration.
#[derive(Clone)]
pub struct Check {
    name: String,
    predicate: Arc<Predicate>,
}

impl Check {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&Response) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

/// Outcome of one predicate against one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

/// The set of checks an integrator supplies alongside an iteration body.
#[derive(Debug, Clone, Default)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with(
        mut self,
        name: impl Into<String>,
        predicate: impl Fn(&Response) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.checks.push(Check::new(name, predicate));
        self
    }

    pub fn push(&mut self, check: Check) {
        self.checks.push(check);
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Evaluate every check against the response.
    ///
    /// With `None` (the iteration errored before producing a response) each
    /// check is recorded as failed. A panicking predicate is caught and
    /// recorded as failed for that check only; the remaining checks still
    /// run.
    pub fn evaluate(&self, response: Option<&Response>) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|check| {
                let passed = match response {
                    Some(resp) => {
                        catch_unwind(AssertUnwindSafe(|| (check.predicate)(resp))).unwrap_or(false)
                    }
                    None => false,
                };
                CheckResult {
                    name: check.name.clone(),
                    passed,
                }
            })
            .collect()
    }
}

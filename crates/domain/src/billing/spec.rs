//! Composable business-rule specifications.
//!
//! A `SpecSet` is an ordered collection of named predicates evaluated
//! against a subject. Evaluation never short-circuits: the caller gets
//! every violated rule at once, not just the first.

use crate::billing::DocumentError;

struct Rule<T: ?Sized> {
    name: String,
    check: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

/// A set of named business rules over one subject type.
pub struct SpecSet<T: ?Sized> {
    rules: Vec<Rule<T>>,
}

impl<T: ?Sized> Default for SpecSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> SpecSet<T> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a rule. The name doubles as the violation message, so it
    /// should read as the statement that was violated.
    pub fn require(
        mut self,
        name: impl Into<String>,
        check: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(Rule {
            name: name.into(),
            check: Box::new(check),
        });
        self
    }

    /// Evaluates every rule, returning the names of all violated ones.
    pub fn violations(&self, subject: &T) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| !(rule.check)(subject))
            .map(|rule| rule.name.clone())
            .collect()
    }

    /// Evaluates every rule, failing with the complete violation set.
    pub fn check(&self, subject: &T) -> Result<(), DocumentError> {
        let violations = self.violations(subject);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(DocumentError::Validation { violations })
        }
    }
}

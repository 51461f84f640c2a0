//! Warn/ok accumulation for recoverable conditions (§7): split-window
//! degeneracy, capacity-retry attempts, dropped rows. Hard errors never
//! enter here — they go through [`crate::error::FieldOpsError`].

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub category: String,
    pub message: String,
    pub line: Option<usize>,
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            line: None,
            entity: None,
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " (entity={entity})")?;
        }
        if let Some(line) = self.line {
            write!(f, " (line={line})")?;
        }
        Ok(())
    }
}

/// A severity-tagged, mergeable collector, shared by every stage function's
/// `Result<(T, Diagnostics), FieldOpsError>` return contract (§7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, category: impl Into<String>, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_entity(
        &mut self,
        category: impl Into<String>,
        message: impl Into<String>,
        entity: impl Into<String>,
    ) {
        self.issues.push(
            DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity),
        );
    }

    pub fn add_error(&mut self, category: impl Into<String>, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn issues(&self) -> &[DiagnosticIssue] {
        &self.issues
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    /// Status string for the stage-function ok/warn/error contract (§6/§7).
    pub fn status(&self) -> &'static str {
        if self.has_errors() {
            "error"
        } else if self.has_issues() {
            "warn"
        } else {
            "ok"
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} warning(s), {} error(s)",
            self.warning_count(),
            self.error_count()
        )
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "{issue}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reflects_highest_severity_present() {
        let mut d = Diagnostics::new();
        assert_eq!(d.status(), "ok");
        d.add_warning("split", "window narrowed");
        assert_eq!(d.status(), "warn");
        d.add_error("routing", "no incumbent");
        assert_eq!(d.status(), "error");
    }

    #[test]
    fn merge_concatenates_issues() {
        let mut a = Diagnostics::new();
        a.add_warning("x", "one");
        let mut b = Diagnostics::new();
        b.add_warning("y", "two");
        a.merge(b);
        assert_eq!(a.warning_count(), 2);
    }

    #[test]
    fn entity_context_round_trips_through_display() {
        let mut d = Diagnostics::new();
        d.add_warning_with_entity("split", "window too narrow", "partner#9");
        let rendered = d.to_string();
        assert!(rendered.contains("partner#9"));
    }
}

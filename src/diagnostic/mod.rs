//! Runtime diagnostics.
//!
//! Programmer errors — undefined names, wrong arity, type misuse, runaway
//! loops — degrade to a `null` result and a record here; evaluation keeps
//! going. The sink is serializable so tooling can consume diagnostics as
//! JSON.

use serde::{Deserialize, Serialize};

use crate::ast::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl From<&crate::lexer::LexError> for Diagnostic {
    fn from(e: &crate::lexer::LexError) -> Self {
        Diagnostic::error(e.to_string()).with_span(Span {
            start: e.position,
            end: e.position + 1,
        })
    }
}

impl From<&crate::parser::ParseError> for Diagnostic {
    fn from(e: &crate::parser::ParseError) -> Self {
        Diagnostic::error(&e.message).with_span(e.span)
    }
}

/// Collected diagnostics for one run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.report(Diagnostic::error(message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.report(Diagnostic::warning(message));
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn messages(&self) -> Vec<String> {
        self.items.iter().map(|d| d.message.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// One line per diagnostic, `error:`/`warning:` prefixed.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for d in &self.items {
            let prefix = match d.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            out.push_str(prefix);
            out.push_str(": ");
            out.push_str(&d.message);
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_fields() {
        let d = Diagnostic::error("bad").with_span(Span { start: 1, end: 3 });
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "bad");
        assert_eq!(d.span, Some(Span { start: 1, end: 3 }));

        let w = Diagnostic::warning("careful");
        assert_eq!(w.severity, Severity::Warning);
        assert!(w.span.is_none());
    }

    #[test]
    fn sink_collects_and_renders() {
        let mut sink = Diagnostics::new();
        assert!(sink.is_empty());
        sink.error("first");
        sink.warning("second");
        assert_eq!(sink.len(), 2);
        let rendered = sink.render();
        assert!(rendered.contains("error: first"));
        assert!(rendered.contains("warning: second"));
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn serializes_to_json() {
        let mut sink = Diagnostics::new();
        sink.error("boom");
        let json = sink.to_json().expect("json");
        assert!(json.contains("boom"));
        assert!(json.contains("Error"));
    }

    #[test]
    fn from_lex_error() {
        let e = crate::lexer::LexError {
            position: 4,
            message: "unexpected character(s) '@'".to_string(),
        };
        let d = Diagnostic::from(&e);
        assert!(d.message.contains('@'));
        assert_eq!(d.span.map(|s| s.start), Some(4));
    }
}

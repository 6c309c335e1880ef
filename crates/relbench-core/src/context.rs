use tracing::field;
use tracing::Span;

/// Per-run logging context handed to every component call.
///
/// Log lines emitted with `parent: ctx.span()` are tagged with the run label
/// and, once allocated, the run key. Nothing here touches global logger state,
/// so concurrent runs in one process stay separated.
#[derive(Debug, Clone)]
pub struct RunContext {
    label: String,
    run_key: Option<String>,
    span: Span,
}

impl RunContext {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let span = tracing::info_span!("run", label = %label, run_key = field::Empty);
        Self {
            label,
            run_key: None,
            span,
        }
    }

    /// Context that logs nowhere in particular. Used by tests and one-off calls.
    pub fn detached() -> Self {
        Self {
            label: "detached".to_string(),
            run_key: None,
            span: Span::none(),
        }
    }

    pub fn with_run_key(&self, run_key: &str) -> Self {
        self.span.record("run_key", run_key);
        Self {
            label: self.label.clone(),
            run_key: Some(run_key.to_string()),
            span: self.span.clone(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn run_key(&self) -> Option<&str> {
        self.run_key.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_key_is_attached_without_mutating_the_parent() {
        let ctx = RunContext::new("sweep-1");
        let keyed = ctx.with_run_key("ABCDEFGH2345");
        assert_eq!(ctx.run_key(), None);
        assert_eq!(keyed.run_key(), Some("ABCDEFGH2345"));
        assert_eq!(keyed.label(), "sweep-1");
    }
}

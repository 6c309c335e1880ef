use crate::cli::args::{LogArgs, LogFormat};
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Stderr output follows `RUST_LOG` (or `--log-level`). With `--log-dir`,
/// every run also gets its own `relbench-<run_key>.log` at `debug`.
pub fn init_logging(args: &LogArgs) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr: Box<dyn Layer<Registry> + Send + Sync> = match args.log_format {
        LogFormat::Text => fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let file = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log dir {}", dir.display()))?;
            Some(RunFileLayer::new(dir.clone()).with_filter(LevelFilter::DEBUG))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr.with_filter(filter))
        .with(file)
        .try_init()
        .context("global subscriber already set")?;
    Ok(())
}

/// Routes events to one append-only file per run, keyed by the `run_key`
/// field of the enclosing `run` span. Events before the key is recorded, or
/// outside any run, are not written.
pub struct RunFileLayer {
    dir: PathBuf,
    files: Mutex<HashMap<String, File>>,
}

struct RunKey(String);

#[derive(Default)]
struct RunKeyVisitor(Option<String>);

impl Visit for RunKeyVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "run_key" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "run_key" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl RunFileLayer {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: Mutex::new(HashMap::new()),
        }
    }

    fn append(&self, run_key: &str, line: &str) -> std::io::Result<()> {
        let mut files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        if !files.contains_key(run_key) {
            let path = self.dir.join(format!("relbench-{run_key}.log"));
            let f = OpenOptions::new().create(true).append(true).open(path)?;
            files.insert(run_key.to_string(), f);
        }
        match files.get_mut(run_key) {
            Some(f) => f.write_all(line.as_bytes()),
            None => Ok(()),
        }
    }

    fn remember_key<S>(id: &Id, key: Option<String>, ctx: &layer::Context<'_, S>)
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        // keys become file names
        let Some(key) = key.filter(|k| !k.is_empty() && k.chars().all(|c| c.is_ascii_alphanumeric()))
        else {
            return;
        };
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().replace(RunKey(key));
        }
    }
}

impl<S> Layer<S> for RunFileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: layer::Context<'_, S>) {
        let mut visitor = RunKeyVisitor::default();
        attrs.record(&mut visitor);
        Self::remember_key(id, visitor.0, &ctx);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: layer::Context<'_, S>) {
        let mut visitor = RunKeyVisitor::default();
        values.record(&mut visitor);
        Self::remember_key(id, visitor.0, &ctx);
    }

    fn on_event(&self, event: &Event<'_>, ctx: layer::Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };
        let run_key = scope
            .from_root()
            .find_map(|span| span.extensions().get::<RunKey>().map(|k| k.0.clone()));
        let Some(run_key) = run_key else {
            return;
        };

        let mut line = LineVisitor::default();
        event.record(&mut line);
        let meta = event.metadata();
        let text = format!(
            "{} {:>5} {}: {}{}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            meta.level(),
            meta.target(),
            line.message,
            line.fields
        );
        if let Err(e) = self.append(&run_key, &text) {
            eprintln!("relbench: failed to write run log for {run_key}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_names(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn each_run_key_gets_its_own_file() {
        let dir = TempDir::new().unwrap();
        let subscriber = tracing_subscriber::registry()
            .with(RunFileLayer::new(dir.path().to_path_buf()).with_filter(LevelFilter::DEBUG));

        tracing::subscriber::with_default(subscriber, || {
            let first = tracing::info_span!("run", label = "a", run_key = tracing::field::Empty);
            let second = tracing::info_span!("run", label = "b", run_key = tracing::field::Empty);

            tracing::info!(parent: &first, "before the key is known");
            first.record("run_key", "AAAAAAAAAAAA");
            second.record("run_key", "BBBBBBBBBBBB");

            tracing::info!(parent: &first, event = "run_finalized", "first done");
            tracing::debug!(parent: &second, idx = 1u64, "second prompt");
            tracing::info!("outside any run");
        });

        assert_eq!(
            log_names(&dir),
            vec!["relbench-AAAAAAAAAAAA.log", "relbench-BBBBBBBBBBBB.log"]
        );
        let first = std::fs::read_to_string(dir.path().join("relbench-AAAAAAAAAAAA.log")).unwrap();
        assert!(first.contains("first done event=run_finalized"));
        assert!(!first.contains("before the key is known"));
        assert!(!first.contains("second prompt"));
        let second = std::fs::read_to_string(dir.path().join("relbench-BBBBBBBBBBBB.log")).unwrap();
        assert!(second.contains("DEBUG"));
        assert!(second.contains("second prompt idx=1"));
        assert!(!second.contains("outside any run"));
    }

    #[test]
    fn unsafe_keys_are_not_turned_into_paths() {
        let dir = TempDir::new().unwrap();
        let subscriber = tracing_subscriber::registry()
            .with(RunFileLayer::new(dir.path().to_path_buf()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("run", run_key = "../escape");
            tracing::info!(parent: &span, "hello");
        });

        assert!(log_names(&dir).is_empty());
    }
}

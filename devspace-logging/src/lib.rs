//! Tracing setup for devspace binaries.
//!
//! Everything is driven by environment variables so that the orchestrator can
//! be embedded without touching code:
//!
//! | Variable | Values | Default |
//! |---|---|---|
//! | `DEVSPACE_LOG_LEVEL` | any `EnvFilter` directive | `info` |
//! | `DEVSPACE_LOG_OUTPUT` | `console`, `file`, `both`, `none` | `console` |
//! | `DEVSPACE_LOG_FORMAT` | `human`, `pretty`, `json` | `human` |
//! | `DEVSPACE_LOG_TAGS` | `key:value,...` span field filters | empty |
//! | `DEVSPACE_LOG_FILE` | path of the rolling log file | `/tmp/devspace.log` |
//!
//! `RUST_LOG` still wins over `DEVSPACE_LOG_LEVEL` when set.

use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
};
use tracing::{field::Visit, span, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    layer::{Context, Layer},
    prelude::*,
    registry::LookupSpan,
    EnvFilter, Registry,
};

const DEFAULT_LOG_FILE: &str = "/tmp/devspace.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Pretty,
    Json,
}

/// A `key:value` span field filter. A value of `*` matches any value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub output: LogOutput,
    pub format: LogFormat,
    pub tags: Vec<Tag>,
    pub file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Console,
            format: LogFormat::Human,
            tags: Vec::new(),
            file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env::var("DEVSPACE_LOG_LEVEL").unwrap_or(defaults.level),
            output: match env::var("DEVSPACE_LOG_OUTPUT").as_deref() {
                Ok("file") => LogOutput::File,
                Ok("both") => LogOutput::Both,
                Ok("none") => LogOutput::None,
                _ => LogOutput::Console,
            },
            format: match env::var("DEVSPACE_LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                Ok("pretty") => LogFormat::Pretty,
                _ => LogFormat::Human,
            },
            tags: env::var("DEVSPACE_LOG_TAGS")
                .map(|raw| parse_tags(&raw))
                .unwrap_or_default(),
            file: env::var("DEVSPACE_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.file),
        }
    }
}

/// Parse `workspace_id:W1,attempt_id:*` into tag filters, skipping malformed entries.
pub fn parse_tags(raw: &str) -> Vec<Tag> {
    raw.split(',')
        .filter_map(|entry| {
            let (key, value) = entry.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some(Tag {
                key: key.to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

// --- Span tag filtering ---

struct TagFilterLayer {
    filters: Vec<Tag>,
}

type SpanFields = HashMap<String, String>;

impl<S> Layer<S> for TagFilterLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = SpanFields::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        span.extensions_mut().insert(fields);
    }

    fn enabled(&self, _meta: &Metadata<'_>, ctx: Context<'_, S>) -> bool {
        if self.filters.is_empty() {
            return true;
        }

        // With tags configured, events outside any span are dropped.
        let Some(scope) = ctx.current_span().id().and_then(|id| ctx.span_scope(id)) else {
            return false;
        };

        let mut seen = SpanFields::new();
        for span_ref in scope {
            if let Some(fields) = span_ref.extensions().get::<SpanFields>() {
                for (k, v) in fields {
                    seen.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }

        self.filters.iter().all(|tag| {
            seen.get(&tag.key)
                .is_some_and(|value| tag.value == "*" || value.contains(&tag.value))
        })
    }
}

struct FieldVisitor<'a>(&'a mut SpanFields);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

/// Initializes the global subscriber from `DEVSPACE_LOG_*` variables.
///
/// The returned guard must be held for as long as file logging should keep
/// flushing. Installing twice is a no-op.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(LogSettings::from_env())
}

pub fn init_with(settings: LogSettings) -> Option<WorkerGuard> {
    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    for quiet in ["tokio=warn", "hyper=warn"] {
        if let Ok(directive) = quiet.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    let tag_layer = TagFilterLayer {
        filters: settings.tags.clone(),
    };

    let (writer, guard) = match settings.output {
        LogOutput::None => {
            let _ = Registry::default().with(env_filter).with(tag_layer).try_init();
            return None;
        }
        LogOutput::Console => (BoxMakeWriter::new(std::io::stderr), None),
        LogOutput::File => {
            let (file_writer, guard) = file_writer(&settings.file);
            (BoxMakeWriter::new(file_writer), Some(guard))
        }
        LogOutput::Both => {
            let (file_writer, guard) = file_writer(&settings.file);
            (
                BoxMakeWriter::new(std::io::stderr.and(file_writer)),
                Some(guard),
            )
        }
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(writer);
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match settings.format {
        LogFormat::Json => fmt_layer.json().boxed(),
        LogFormat::Pretty => fmt_layer.pretty().boxed(),
        LogFormat::Human => fmt_layer.boxed(),
    };

    let _ = Registry::default()
        .with(fmt_layer)
        .with(env_filter)
        .with(tag_layer)
        .try_init();

    guard
}

fn file_writer(path: &Path) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("/tmp"));
    let name = path
        .file_name()
        .unwrap_or_else(|| "devspace.log".as_ref());
    tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name))
}

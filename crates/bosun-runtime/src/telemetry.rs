//! Process log pipeline
//!
//! A reloadable [`EnvFilter`] in front of a capture layer (feeds the debug
//! [`LogBuffer`] while one is attached), a span-timing layer (feeds active
//! profiling sessions) and the fmt output layer.

use crate::logbuf::{LogBuffer, LogLine};
use crate::toggle::{LogControl, ProfileReport, Profiler, SpanStat};
use bosun_config::LoggingConfig;
use bosun_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tfmt, reload, EnvFilter, Layer, Registry};

type SpanTotals = HashMap<&'static str, (u64, Duration)>;
type Sessions = HashMap<String, SpanTotals>;

/// Handle over the installed log pipeline
#[derive(Clone)]
pub struct TelemetryHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    directive: Arc<Mutex<String>>,
    sink: Arc<Mutex<Option<LogBuffer>>>,
    sessions: Arc<Mutex<Sessions>>,
}

impl fmt::Debug for TelemetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryHandle")
            .field("directive", &*self.directive.lock())
            .field("capturing", &self.sink.lock().is_some())
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

/// Build the subscriber without installing it
pub fn build(
    config: &LoggingConfig,
) -> Result<(TelemetryHandle, impl Subscriber + Send + Sync + 'static)> {
    let filter = parse_filter(&config.level)?;
    let (filter, reload_handle) = reload::Layer::new(filter);

    let handle = TelemetryHandle {
        filter: reload_handle,
        directive: Arc::new(Mutex::new(config.level.clone())),
        sink: Arc::new(Mutex::new(None)),
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let (text, json) = match config.format.as_str() {
        "text" => (Some(tfmt::layer().with_target(true)), None),
        "json" => (None, Some(tfmt::layer().json())),
        "off" => (None, None),
        other => {
            return Err(Error::config(format!("Unknown log format: {other}")));
        }
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(CaptureLayer {
            sink: handle.sink.clone(),
        })
        .with(ProfilingLayer {
            sessions: handle.sessions.clone(),
        })
        .with(text)
        .with(json);

    Ok((handle, subscriber))
}

/// Build and install the subscriber as the global default
pub fn init(config: &LoggingConfig) -> Result<TelemetryHandle> {
    let (handle, subscriber) = build(config)?;
    subscriber
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to install log subscriber: {e}")))?;
    Ok(handle)
}

fn parse_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| Error::config(format!("Invalid log filter '{directive}': {e}")))
}

impl LogControl for TelemetryHandle {
    fn current_filter(&self) -> String {
        self.directive.lock().clone()
    }

    fn set_filter(&self, directive: &str) -> Result<()> {
        let filter = parse_filter(directive)?;
        self.filter
            .reload(filter)
            .map_err(|e| Error::Internal(format!("Failed to reload log filter: {e}")))?;
        *self.directive.lock() = directive.to_string();
        Ok(())
    }

    fn attach_sink(&self, buffer: LogBuffer) {
        *self.sink.lock() = Some(buffer);
    }

    fn detach_sink(&self) -> Option<LogBuffer> {
        self.sink.lock().take()
    }
}

impl Profiler for TelemetryHandle {
    fn start(&self, slot: &str) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(slot) {
            return Err(Error::Internal(format!("profiling slot busy: {slot}")));
        }
        sessions.insert(slot.to_string(), HashMap::new());
        Ok(())
    }

    fn stop(&self, slot: &str) -> Result<ProfileReport> {
        let totals = self
            .sessions
            .lock()
            .remove(slot)
            .ok_or_else(|| Error::Internal(format!("profiling slot idle: {slot}")))?;

        let mut spans: Vec<SpanStat> = totals
            .into_iter()
            .map(|(name, (count, total))| SpanStat {
                name: name.to_string(),
                count,
                total,
            })
            .collect();
        spans.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));

        Ok(ProfileReport {
            slot: slot.to_string(),
            spans,
        })
    }
}

struct CaptureLayer {
    sink: Arc<Mutex<Option<LogBuffer>>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let sink = self.sink.lock();
        let Some(buffer) = sink.as_ref() else {
            return;
        };

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        buffer.push(LogLine::new(
            meta.level().to_string(),
            meta.target(),
            visitor.finish(),
        ));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: Vec<String>,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        format!("{} {}", self.message, self.fields.join(" "))
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

struct SpanStart(Instant);

struct ProfilingLayer {
    sessions: Arc<Mutex<Sessions>>,
}

impl<S> Layer<S> for ProfilingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, _attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if self.sessions.lock().is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanStart(Instant::now()));
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };
        let Some(elapsed) = span.extensions().get::<SpanStart>().map(|s| s.0.elapsed()) else {
            return;
        };

        let name = span.name();
        for totals in self.sessions.lock().values_mut() {
            let entry = totals.entry(name).or_insert((0, Duration::ZERO));
            entry.0 += 1;
            entry.1 += elapsed;
        }
    }
}

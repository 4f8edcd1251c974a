//! In-memory capture of tracing events.
//!
//! [`EventCapture`] is a [`Layer`] that records every event it sees, with
//! its fields rendered as JSON, into a shared [`CapturedEvents`] store. Tests
//! use it to assert on what a component logged.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// One recorded event.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    /// Level name (`INFO`, `WARN`, ...).
    pub level: String,
    /// Module path that emitted the event.
    pub target: String,
    /// The `message` field, if any.
    pub message: Option<String>,
    /// Remaining fields.
    pub fields: HashMap<String, serde_json::Value>,
    /// Names of the enclosing spans, outermost first.
    pub spans: Vec<String>,
}

impl CapturedEvent {
    /// A field value rendered as a string, if present.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Shared storage for captured events.
#[derive(Debug, Clone, Default)]
pub struct CapturedEvents {
    events: Arc<RwLock<Vec<CapturedEvent>>>,
}

impl CapturedEvents {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.read().map(|events| events.clone()).unwrap_or_default()
    }

    /// Events whose message contains `needle`.
    pub fn with_message(&self, needle: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message.as_deref().is_some_and(|m| m.contains(needle)))
            .collect()
    }

    fn push(&self, event: CapturedEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}

/// A tracing layer that records events into [`CapturedEvents`].
pub struct EventCapture {
    storage: CapturedEvents,
}

impl EventCapture {
    /// Create a layer writing into `storage`.
    pub fn new(storage: CapturedEvents) -> Self {
        Self { storage }
    }
}

impl<S> Layer<S> for EventCapture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = fields.remove("message").map(|value| match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        let spans = ctx
            .event_scope(event)
            .map(|scope| scope.from_root().map(|span| span.name().to_string()).collect())
            .unwrap_or_default();

        let metadata = event.metadata();
        self.storage.push(CapturedEvent {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
            spans,
        });
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn records_message_fields_and_span_path() {
        let storage = CapturedEvents::new();
        let subscriber = tracing_subscriber::registry().with(EventCapture::new(storage.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("answer_question", question_len = 42);
            let _guard = span.enter();
            tracing::warn!(path = "scan.pdf", chunk_count = 3u64, skipped = true, "skipping file");
        });

        let events = storage.with_message("skipping file");
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level, "WARN");
        assert_eq!(event.field("path").as_deref(), Some("scan.pdf"));
        assert_eq!(event.fields["chunk_count"], serde_json::json!(3));
        assert_eq!(event.fields["skipped"], serde_json::json!(true));
        assert_eq!(event.spans, vec!["answer_question"]);
    }
}

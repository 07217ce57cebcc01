//! Capture `tracing` events for assertions.
//!
//! Install a [`LogCapture`] as the thread's default subscriber, run the code
//! under test, then look the events up by message:
//!
//! ```
//! use scaffold_testing::LogCapture;
//!
//! let capture = LogCapture::new();
//! {
//!     let _guard = capture.install();
//!     let span = tracing::info_span!("request", trace_id = "abc");
//!     let _entered = span.enter();
//!     tracing::warn!(status = 404, "Outgoing response");
//! }
//!
//! let event = capture.find("Outgoing response").unwrap();
//! assert_eq!(event.level, tracing::Level::WARN);
//! assert_eq!(event.field("status"), Some("404"));
//! assert_eq!(event.field("trace_id"), Some("abc"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, Registry};

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// The `message` field.
    pub message: String,
    /// Fields recorded on the event itself.
    pub fields: BTreeMap<String, String>,
    /// Fields of the enclosing spans, innermost winning.
    pub span_fields: BTreeMap<String, String>,
    /// Names of the enclosing spans, outermost first.
    pub spans: Vec<String>,
}

impl CapturedEvent {
    /// Value of `name` on the event, falling back to the enclosing spans.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .or_else(|| self.span_fields.get(name))
            .map(String::as_str)
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

/// Fields stored in a span's extensions.
struct SpanFields(BTreeMap<String, String>);

/// A [`Layer`] that appends every event to a shared list.
#[derive(Debug, Clone)]
pub struct CapturingLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S> Layer<S> for CapturingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(visitor.fields));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            let mut extensions = span.extensions_mut();
            if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
                fields.extend(visitor.fields);
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut span_fields = BTreeMap::new();
        let mut spans = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                spans.push(span.name().to_owned());
                if let Some(SpanFields(fields)) = span.extensions().get::<SpanFields>() {
                    span_fields.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }

        let captured = CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
            span_fields,
            spans,
        };

        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(captured);
    }
}

/// Shared handle to captured events.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    /// An empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A layer feeding this capture.
    #[must_use]
    pub fn layer(&self) -> CapturingLayer {
        CapturingLayer {
            events: Arc::clone(&self.events),
        }
    }

    /// A complete subscriber feeding this capture.
    #[must_use]
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync {
        Registry::default().with(self.layer())
    }

    /// Make this capture the current thread's subscriber until the guard drops.
    #[must_use]
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(self.subscriber())
    }

    /// Every event captured so far.
    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The first event whose message is `message`.
    #[must_use]
    pub fn find(&self, message: &str) -> Option<CapturedEvent> {
        self.events().into_iter().find(|e| e.message == message)
    }

    /// Every event whose message is `message`.
    #[must_use]
    pub fn find_all(&self, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message == message)
            .collect()
    }
}

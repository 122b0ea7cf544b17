//! Unified event logging for the optimization pipeline.
//!
//! Every pass reports what it did by appending [`Event`]s to the shared [`EventLog`] of
//! the compilation context. Statistics are derived from the log afterwards rather than
//! tracked separately, so a pass never has to update counters by hand.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event (transformation, rejection, diagnostic)
//! - [`EventLog`] - Lock-free, append-only collection with query and summary helpers
//! - [`EventBuilder`] - Fluent API; the event is committed when the builder is dropped
//! - [`DerivedStats`] - Counters computed from a log
//!
//! # Example
//!
//! ```rust,ignore
//! use cfopt::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::AllocationInlined)
//!     .at(&method, 12)
//!     .message("new LFoo; eliminated");
//! log.info("starting class inlining");
//! println!("{}", log.summary());
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    time::Duration,
};

use crate::metadata::MethodRef;

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A method body was lifted to SSA form.
    MethodLifted,
    /// An allocation was eliminated and its fields replaced by SSA values.
    AllocationInlined,
    /// An allocation site was left alone by the class inliner.
    SiteRejected,
    /// A call was replaced by a copy of the callee's body.
    MethodInlined,
    /// A phi was synthesized during field-value reconstruction.
    PhiInserted,
    /// A phi was removed or replaced by its single operand.
    PhiSimplified,
    /// An instruction was removed.
    InstructionRemoved,
    /// Two blocks were merged or a trampoline was bypassed.
    BlockMerged,
    /// A renaming layer was added to the lens chain.
    LensLayerCreated,
    /// A bridge method was forwarded to its target.
    BridgeForwarded,
    /// A class eligibility verdict was computed and cached.
    ClassVerdictComputed,

    /// An SSA pass started.
    PassStarted,
    /// An SSA pass completed.
    PassCompleted,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            // Transformations
            Self::MethodLifted => "method lifted",
            Self::AllocationInlined => "allocation inlined",
            Self::MethodInlined => "method inlined",
            Self::PhiInserted => "phi inserted",
            Self::PhiSimplified => "phi simplified",
            Self::InstructionRemoved => "instruction removed",
            Self::BlockMerged => "block merged",
            Self::LensLayerCreated => "lens layer created",
            Self::BridgeForwarded => "bridge forwarded",
            // Analysis
            Self::SiteRejected => "site rejected",
            Self::ClassVerdictComputed => "class verdict computed",
            // Engine
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            // Diagnostic
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a code transformation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::AllocationInlined
                | Self::MethodInlined
                | Self::PhiInserted
                | Self::PhiSimplified
                | Self::InstructionRemoved
                | Self::BlockMerged
                | Self::LensLayerCreated
                | Self::BridgeForwarded
        )
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The method where the event occurred (if applicable).
    pub method: Option<MethodRef>,
    /// Instruction offset within the method.
    pub location: Option<usize>,
    /// Human-readable description.
    pub message: String,
    /// Associated pass name (if from a pass).
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            method: None,
            location: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.method, self.location) {
            (Some(method), Some(location)) => {
                write!(f, "[{}] {method}@{location}: {}", self.kind, self.message)
            }
            (Some(method), None) => write!(f, "[{}] {method}: {}", self.kind, self.message),
            _ => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is
/// dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    method: Option<MethodRef>,
    location: Option<usize>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            method: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the method and instruction offset where the event occurred.
    pub fn at(mut self, method: &MethodRef, location: usize) -> Self {
        self.method = Some(method.clone());
        self.location = Some(location);
        self
    }

    /// Sets only the method (for method-level events without specific location).
    pub fn method(mut self, method: &MethodRef) -> Self {
        self.method = Some(method.clone());
        self
    }

    /// Sets the location.
    pub fn location(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a specific pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        let event = Event {
            kind: self.kind,
            method: self.method.take(),
            location: self.location.take(),
            message,
            pass: self.pass.take(),
        };

        self.log.events.push(event);
    }
}

/// Collection of events from one compilation.
///
/// This type is thread-safe: events can be appended concurrently from multiple worker
/// threads through shared references.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    ///
    /// The event is added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Events recorded against `method`, in recording order.
    pub fn for_method<'a>(
        &'a self,
        method: &'a MethodRef,
    ) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.method.as_ref() == Some(method))
    }

    /// Returns an iterator over transformation events only.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_transformation())
    }

    /// Returns an iterator over diagnostic events only.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_diagnostic())
    }

    /// Returns an iterator over warning events.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Returns an iterator over error events.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Error)
    }

    /// Allocation sites the class inliner declined, with the reason in the message.
    ///
    /// Empty unless rejection logging is enabled.
    pub fn rejections(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::SiteRejected)
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of distinct methods with transformation events.
    #[must_use]
    pub fn methods_affected(&self) -> usize {
        self.transformations()
            .filter_map(|e| e.method.as_ref())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Generates a human-readable summary of all transformation events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Statistics derived from an [`EventLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedStats {
    /// Number of methods that had any transformations.
    pub methods_transformed: usize,
    /// Number of method bodies lifted.
    pub methods_lifted: usize,
    /// Number of allocations eliminated by the class inliner.
    pub allocations_inlined: usize,
    /// Number of allocation sites the class inliner left alone.
    pub sites_rejected: usize,
    /// Number of calls force-inlined.
    pub methods_inlined: usize,
    /// Number of phis synthesized.
    pub phis_inserted: usize,
    /// Number of phis simplified away.
    pub phis_simplified: usize,
    /// Number of instructions removed.
    pub instructions_removed: usize,
    /// Number of blocks merged.
    pub blocks_merged: usize,
    /// Number of lens layers created.
    pub lens_layers: usize,
    /// Number of bridges forwarded.
    pub bridges_forwarded: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Number of errors.
    pub errors: usize,
    /// Number of scheduler iterations.
    pub iterations: usize,
    /// Processing time.
    pub total_time: Duration,
}

impl DerivedStats {
    /// Computes statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            methods_transformed: log.methods_affected(),
            methods_lifted: get(EventKind::MethodLifted),
            allocations_inlined: get(EventKind::AllocationInlined),
            sites_rejected: get(EventKind::SiteRejected),
            methods_inlined: get(EventKind::MethodInlined),
            phis_inserted: get(EventKind::PhiInserted),
            phis_simplified: get(EventKind::PhiSimplified),
            instructions_removed: get(EventKind::InstructionRemoved),
            blocks_merged: get(EventKind::BlockMerged),
            lens_layers: get(EventKind::LensLayerCreated),
            bridges_forwarded: get(EventKind::BridgeForwarded),
            warnings: get(EventKind::Warning),
            errors: get(EventKind::Error),
            iterations: 0,
            total_time: Duration::ZERO,
        }
    }

    /// Sets the total processing time.
    #[must_use]
    pub fn with_time(mut self, time: Duration) -> Self {
        self.total_time = time;
        self
    }

    /// Sets the number of iterations.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Generates a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let counters = [
            (self.methods_lifted, "lifted"),
            (self.allocations_inlined, "allocations inlined"),
            (self.sites_rejected, "sites rejected"),
            (self.methods_inlined, "calls inlined"),
            (self.phis_inserted, "phis inserted"),
            (self.phis_simplified, "phis simplified"),
            (self.instructions_removed, "instructions removed"),
            (self.blocks_merged, "blocks merged"),
            (self.lens_layers, "lens layers"),
            (self.bridges_forwarded, "bridges forwarded"),
            (self.errors, "errors"),
            (self.warnings, "warnings"),
        ];
        let parts: Vec<String> = counters
            .iter()
            .filter(|(count, _)| *count > 0)
            .map(|(count, label)| format!("{count} {label}"))
            .collect();

        let stats = if parts.is_empty() {
            "no transformations".to_string()
        } else {
            parts.join(", ")
        };

        if self.total_time.as_millis() > 0 {
            format!(
                "{} in {:?} ({} iterations)",
                stats, self.total_time, self.iterations
            )
        } else {
            stats
        }
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Proto, TypeRef};

    fn method(name: &str) -> MethodRef {
        MethodRef::new(
            TypeRef::class("Main"),
            name,
            Proto::new(TypeRef::int(), vec![]),
        )
    }

    #[test]
    fn test_empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(!log.has(EventKind::AllocationInlined));
    }

    #[test]
    fn test_record_event() {
        let log = EventLog::new();
        let m = method("run");

        log.record(EventKind::AllocationInlined)
            .at(&m, 3)
            .message("new LL; eliminated");

        assert_eq!(log.len(), 1);
        let event = log.iter().next().unwrap();
        assert_eq!(event.method.as_ref(), Some(&m));
        assert_eq!(event.location, Some(3));
        assert_eq!(event.message, "new LL; eliminated");
    }

    #[test]
    fn test_info_warn_error() {
        let log = EventLog::new();

        log.info("informational message");
        log.warn("warning message");
        log.error("error message");

        assert_eq!(log.count_kind(EventKind::Info), 1);
        assert_eq!(log.count_kind(EventKind::Warning), 1);
        assert_eq!(log.count_kind(EventKind::Error), 1);
        assert_eq!(log.diagnostics().count(), 3);
    }

    #[test]
    fn test_summary_lists_transformations_only() {
        let log = EventLog::new();
        let m = method("run");

        log.record(EventKind::InstructionRemoved).at(&m, 1);
        log.record(EventKind::InstructionRemoved).at(&m, 2);
        log.record(EventKind::SiteRejected).at(&m, 0);
        log.info("ignored");

        let summary = log.summary();
        assert_eq!(summary, "2 instruction removed");
    }

    #[test]
    fn test_derived_stats() {
        let log = EventLog::new();
        let a = method("a");
        let b = method("b");

        log.record(EventKind::AllocationInlined).at(&a, 0);
        log.record(EventKind::MethodInlined).at(&b, 4);
        log.record(EventKind::SiteRejected).at(&b, 7);
        log.warn("careful");

        let stats = DerivedStats::from_log(&log);
        assert_eq!(stats.methods_transformed, 2);
        assert_eq!(stats.allocations_inlined, 1);
        assert_eq!(stats.methods_inlined, 1);
        assert_eq!(stats.sites_rejected, 1);
        assert_eq!(stats.warnings, 1);
        assert!(stats.summary().contains("1 allocations inlined"));
    }

    #[test]
    fn test_for_method_and_rejections() {
        let log = EventLog::new();
        let a = method("a");
        let b = method("b");

        log.record(EventKind::PhiSimplified).at(&a, 1);
        log.record(EventKind::SiteRejected)
            .at(&b, 1)
            .message("LL;: instance flows into a phi");
        log.record(EventKind::BlockMerged).method(&a);

        assert_eq!(log.for_method(&a).count(), 2);
        let rejected: Vec<_> = log.rejections().collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].method.as_ref(), Some(&b));
    }

    #[test]
    fn test_default_message_and_pass() {
        let log = EventLog::new();
        let m = method("run");

        log.record(EventKind::BlockMerged).at(&m, 0).pass("block-merging");

        let event = log.iter().next().unwrap();
        assert_eq!(event.message, "block merged");
        assert_eq!(event.pass.as_deref(), Some("block-merging"));
    }

    #[test]
    fn test_thread_safe_append() {
        use std::{sync::Arc, thread};

        let log = Arc::new(EventLog::new());
        let mut handles = vec![];

        for i in 0..4 {
            let log_clone = Arc::clone(&log);
            handles.push(thread::spawn(move || {
                let m = method(&format!("m{i}"));
                for j in 0..100 {
                    log_clone
                        .record(EventKind::PhiInserted)
                        .at(&m, j)
                        .message(format!("thread {i} event {j}"));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.len(), 400);
    }
}

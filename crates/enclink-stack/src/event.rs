use core::fmt;

/// Severity attached to an [`EventSink`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Debug => "DEBUG",
            Priority::Info => "INFO",
            Priority::Warning => "WARNING",
            Priority::Error => "ERROR",
            Priority::Critical => "CRITICAL",
        })
    }
}

/// Optional board peripheral that wants to hear about notable network events, such as a status
/// display or a persistent log on flash.
///
/// Everything reported here is also logged through `tracing`; a sink only adds a second
/// destination.
pub trait EventSink {
    fn event(&mut self, source: &'static str, priority: Priority, message: &str);
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn event(&mut self, source: &'static str, priority: Priority, message: &str) {
        <T as EventSink>::event(&mut **self, source, priority, message);
    }
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn event(&mut self, source: &'static str, priority: Priority, message: &str) {
        <T as EventSink>::event(&mut **self, source, priority, message);
    }
}

impl<S: EventSink> EventSink for Option<S> {
    fn event(&mut self, source: &'static str, priority: Priority, message: &str) {
        if let Some(sink) = self.as_mut() {
            sink.event(source, priority, message);
        }
    }
}

/// Collects events in memory. Handy in tests and for boards that forward events in batches.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: std::rc::Rc<std::cell::RefCell<Vec<RecordedEvent>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub source: &'static str,
    pub priority: Priority,
    pub message: String,
}

impl RecordingSink {
    /// Snapshot of everything recorded so far, shared across clones of this sink.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.borrow().clone()
    }

    pub fn contains(&self, priority: Priority, needle: &str) -> bool {
        self.events
            .borrow()
            .iter()
            .any(|event| event.priority == priority && event.message.contains(needle))
    }
}

impl EventSink for RecordingSink {
    fn event(&mut self, source: &'static str, priority: Priority, message: &str) {
        self.events.borrow_mut().push(RecordedEvent {
            source,
            priority,
            message: message.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_sink_is_a_no_op() {
        let mut sink: Option<RecordingSink> = None;
        sink.event("test", Priority::Info, "ignored");
    }

    #[test]
    fn clones_share_storage() {
        let sink = RecordingSink::default();
        let mut boxed: Box<dyn EventSink> = Box::new(sink.clone());
        boxed.event("stack", Priority::Warning, "DoS limit reached");
        assert!(sink.contains(Priority::Warning, "DoS"));
        assert_eq!(sink.events()[0].source, "stack");
        assert_eq!(Priority::Critical.to_string(), "CRITICAL");
        assert!(Priority::Error > Priority::Warning);
    }
}

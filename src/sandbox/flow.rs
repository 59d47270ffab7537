//! Execution-flow events recorded from instrumentation hooks.
//!
//! The recorder lives in the store data and is only touched by the thread
//! running the guest, so hooks never take a lock.

use std::fmt;

/// One flow event, in the order the guest produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// Execution reached the start of a line.
    LineReached {
        /// 1-based line.
        line: u32,
    },
    /// A value was observed.
    ValueObserved {
        /// 1-based line.
        line: u32,
        /// Expression text.
        expression: String,
        /// Rendered value.
        value: String,
    },
    /// An exception was raised or a guard rejected an operation.
    ExceptionObserved {
        /// 1-based line, 0 when unknown.
        line: u32,
        /// Description of the exception.
        description: String,
    },
}

impl FlowEvent {
    /// Line the event belongs to.
    pub fn line(&self) -> u32 {
        match self {
            FlowEvent::LineReached { line }
            | FlowEvent::ValueObserved { line, .. }
            | FlowEvent::ExceptionObserved { line, .. } => *line,
        }
    }

    /// Whether this is an exception event.
    pub fn is_exception(&self) -> bool {
        matches!(self, FlowEvent::ExceptionObserved { .. })
    }
}

impl fmt::Display for FlowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowEvent::LineReached { line } => write!(f, "line {line}"),
            FlowEvent::ValueObserved {
                line,
                expression,
                value,
            } => write!(f, "line {line}: {expression} = {value}"),
            FlowEvent::ExceptionObserved { line, description } => {
                write!(f, "line {line}: exception: {description}")
            }
        }
    }
}

/// Append-only, bounded flow event log.
#[derive(Debug, Clone)]
pub struct FlowRecorder {
    events: Vec<FlowEvent>,
    limit: usize,
    dropped: usize,
    current_line: u32,
}

impl FlowRecorder {
    /// Create a recorder keeping at most `limit` events.
    pub fn new(limit: usize) -> Self {
        Self {
            events: Vec::new(),
            limit,
            dropped: 0,
            current_line: 0,
        }
    }

    /// Append an event. Events past the limit are counted and dropped, except
    /// that a final exception always replaces the last slot.
    pub fn record(&mut self, event: FlowEvent) {
        if let FlowEvent::LineReached { line } = event {
            self.current_line = line;
        }
        if self.events.len() < self.limit {
            self.events.push(event);
            return;
        }
        self.dropped += 1;
        if event.is_exception() {
            if let Some(last) = self.events.last_mut() {
                *last = event;
            }
        }
    }

    /// Line of the most recent `LineReached` event.
    pub fn current_line(&self) -> u32 {
        self.current_line
    }

    /// Number of events dropped past the limit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Recorded events.
    pub fn events(&self) -> &[FlowEvent] {
        &self.events
    }

    /// Take the recorded events.
    pub fn into_events(self) -> Vec<FlowEvent> {
        self.events
    }
}

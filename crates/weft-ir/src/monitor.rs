use std::fmt;

/// Severity of a diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Position in a connector source file, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Location { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Message {
    pub severity: Severity,
    pub location: Option<Location>,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{} [{loc}]: {}", self.severity, self.text),
            None => write!(f, "{}: {}", self.severity, self.text),
        }
    }
}

/// Ordered, append-only sink for diagnostics.
///
/// Stages report recoverable problems here and keep going, so a single run
/// can surface several independent errors. The monitor is owned by the
/// top-level run and passed down explicitly; it is rendered once, at the end.
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    messages: Vec<Message>,
}

impl Monitor {
    pub fn new() -> Self {
        Monitor::default()
    }

    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.add(Message {
            severity: Severity::Info,
            location: None,
            text: text.into(),
        });
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.add(Message {
            severity: Severity::Warning,
            location: None,
            text: text.into(),
        });
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.add(Message {
            severity: Severity::Error,
            location: None,
            text: text.into(),
        });
    }

    pub fn error_at(&mut self, location: Location, text: impl Into<String>) {
        self.add(Message {
            severity: Severity::Error,
            location: Some(location),
            text: text.into(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.severity == Severity::Error)
    }

    /// All records, one per line, in the order they were reported.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for m in &self.messages {
            out.push_str(&m.to_string());
            out.push('\n');
        }
        out
    }
}

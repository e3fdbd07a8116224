//! Log accumulator
//!
//! Keeps the user-facing progress transcript of one session. Only `log`
//! messages that begin with the marker glyph are kept; everything else is
//! treated as internal diagnostics. The transcript is append-only and keeps
//! arrival order; it is replaced (never edited) when a new session begins.

/// Ordered, append-only list of accepted progress lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    marker: char,
    entries: Vec<String>,
}

impl Transcript {
    pub fn new(marker: char) -> Self {
        Self {
            marker,
            entries: Vec::new(),
        }
    }

    /// Apply the marker filter to one message, appending it when accepted
    ///
    /// Returns the stored line when the message was accepted.
    pub fn accept(&mut self, message: &str) -> Option<&str> {
        let line = strip_marker(message, self.marker)?;
        self.entries.push(line.to_string());
        self.entries.last().map(String::as_str)
    }

    pub fn marker(&self) -> char {
        self.marker
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    /// Collapsed view: the latest entry, numbered with the transcript length
    pub fn collapsed_view(&self) -> Option<String> {
        self.latest()
            .map(|line| format!("{}. {}", self.entries.len(), line))
    }

    /// Expanded view: every entry, numbered from 1
    pub fn expanded_view(&self) -> Vec<String> {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, line)| format!("{}. {}", idx + 1, line))
            .collect()
    }
}

/// Strip the marker and at most one following whitespace character
///
/// `None` when the message does not start with the marker.
pub fn strip_marker(message: &str, marker: char) -> Option<&str> {
    let rest = message.strip_prefix(marker)?;
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() => Some(chars.as_str()),
        _ => Some(rest),
    }
}

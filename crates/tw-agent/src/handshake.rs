use regex::Regex;
use std::path::Path;
use std::time::Duration;

/// Codex prints this once it has chosen its session id.
pub const DEFAULT_PATTERN: &str = r"session id: ([a-f0-9-]+)";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 40;

/// How long and how often to look for a self-identifying backend's id.
#[derive(Debug, Clone)]
pub struct HandshakePolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pattern: Regex,
}

impl HandshakePolicy {
    /// `pattern` must contain a capture group; the first group is the id.
    pub fn new(
        pattern: &str,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            poll_interval,
            max_attempts,
            pattern: Regex::new(pattern)?,
        })
    }

    /// Upper bound on time spent polling.
    pub fn budget(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }

    /// First identifier in `text`. The raw text is tried first; colour and
    /// hyperlink escapes are only stripped when that finds nothing.
    pub fn find_identifier(&self, text: &str) -> Option<String> {
        self.capture(text)
            .or_else(|| self.capture(&strip_ansi_sequences(text)))
    }

    fn capture(&self, text: &str) -> Option<String> {
        self.pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// One pass over the log as it is right now. A missing or unreadable
    /// log is "no match yet".
    pub fn scan_log(&self, log_path: &Path) -> Option<String> {
        let bytes = std::fs::read(log_path).ok()?;
        self.find_identifier(&String::from_utf8_lossy(&bytes))
    }

    /// Poll the log until the identifier shows up or the attempt budget runs
    /// out. Running out is not an error: the caller gets `None`.
    pub async fn detect(&self, log_path: &Path) -> Option<String> {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.poll_interval).await;
            if let Some(found) = self.scan_log(log_path) {
                tracing::debug!(attempt, native_id = %found, "Handshake matched");
                return Some(found);
            }
        }
        None
    }
}

/// Drops CSI (`ESC [` .. final byte) and OSC (`ESC ]` .. BEL or `ESC \`)
/// sequences. An unterminated sequence ends at the next newline, which is
/// kept.
pub(crate) fn strip_ansi_sequences(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\u{1b}' {
            out.push(ch);
            continue;
        }

        match chars.peek().copied() {
            Some('[') => {
                chars.next();
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                    if ('@'..='~').contains(&next) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                    if next == '\u{7}' {
                        break;
                    }
                    if next == '\u{1b}' {
                        if chars.peek().copied() == Some('\\') {
                            chars.next();
                        }
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

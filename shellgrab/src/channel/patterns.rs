//! Prompt shapes and the rules for recognising them.
//!
//! Two matching strategies exist, see [`MatchMode`]. The naive strategy
//! looks for the bare marker character anywhere in the accumulated output,
//! so a `#` inside a configuration dump ends the capture early. The default
//! strategy examines only the trailing, unterminated line and, once the
//! device's prompt name is known, requires that exact prompt.

use std::fmt;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use super::buffer::PatternBuffer;

/// How the accumulated output is searched for a prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The marker character anywhere in the whole buffer counts as a prompt.
    Anywhere,

    /// Only the trailing line counts, and it must be `<name><marker>`.
    #[default]
    TrailingLine,
}

/// Privilege level a prompt indicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PromptKind {
    Unprivileged,
    Privileged,
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptKind::Unprivileged => f.write_str("unprivileged"),
            PromptKind::Privileged => f.write_str("privileged"),
        }
    }
}

/// Which prompt kinds a wait should accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptWatch {
    Unprivileged,
    Privileged,
    Either,
}

impl PromptWatch {
    /// Kinds in the order they are tested.
    fn kinds(self) -> &'static [PromptKind] {
        match self {
            PromptWatch::Unprivileged => &[PromptKind::Unprivileged],
            PromptWatch::Privileged => &[PromptKind::Privileged],
            PromptWatch::Either => &[PromptKind::Unprivileged, PromptKind::Privileged],
        }
    }
}

/// The device's own prompt name, captured at classification time.
///
/// `router1>` and `router1#` share the name `router1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPrompt {
    name: String,
}

impl HostPrompt {
    /// Pin a prompt name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The prompt name without its marker.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A recognised prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMatch {
    /// Privilege level the prompt indicates.
    pub kind: PromptKind,

    /// The line the prompt was found on, trimmed.
    pub line: String,

    /// Prompt name, when the line had the `<name><marker>` shape.
    pub name: Option<String>,
}

impl PromptMatch {
    /// The prompt name to pin for later waits.
    pub fn host_prompt(&self) -> Option<HostPrompt> {
        self.name.as_deref().map(HostPrompt::new)
    }
}

/// Compiled prompt patterns for one pair of markers.
#[derive(Debug, Clone)]
pub struct PromptPatterns {
    unprivileged_marker: char,
    privileged_marker: char,
    unprivileged_line: Regex,
    privileged_line: Regex,
}

impl PromptPatterns {
    /// Build patterns for the given marker characters.
    pub fn new(unprivileged_marker: char, privileged_marker: char) -> Result<Self, regex::Error> {
        Ok(Self {
            unprivileged_marker,
            privileged_marker,
            unprivileged_line: line_pattern(unprivileged_marker)?,
            privileged_line: line_pattern(privileged_marker)?,
        })
    }

    /// Marker character for a prompt kind.
    pub fn marker(&self, kind: PromptKind) -> char {
        match kind {
            PromptKind::Unprivileged => self.unprivileged_marker,
            PromptKind::Privileged => self.privileged_marker,
        }
    }

    fn line_regex(&self, kind: PromptKind) -> &Regex {
        match kind {
            PromptKind::Unprivileged => &self.unprivileged_line,
            PromptKind::Privileged => &self.privileged_line,
        }
    }

    /// The full prompt text a pinned host shows at `kind`.
    pub fn prompt_line(&self, host: &HostPrompt, kind: PromptKind) -> String {
        format!("{}{}", host.name(), self.marker(kind))
    }

    /// Look for a prompt in the buffer.
    ///
    /// `pinned` is only honoured in [`MatchMode::TrailingLine`].
    pub fn find(
        &self,
        buffer: &PatternBuffer,
        watch: PromptWatch,
        mode: MatchMode,
        pinned: Option<&HostPrompt>,
    ) -> Option<PromptMatch> {
        match mode {
            MatchMode::Anywhere => self.find_anywhere(buffer.as_slice(), watch),
            MatchMode::TrailingLine => match pinned {
                Some(host) => self.match_pinned(buffer.trailing_line(), watch, host),
                None => self.match_line(buffer.trailing_line(), watch),
            },
        }
    }

    /// Classify a single line as a prompt of one of the watched kinds.
    pub fn match_line(&self, line: &[u8], watch: PromptWatch) -> Option<PromptMatch> {
        let line = line.trim_ascii();
        watch.kinds().iter().find_map(|&kind| {
            let caps = self.line_regex(kind).captures(line)?;
            let name = caps
                .name("name")
                .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned());
            Some(PromptMatch {
                kind,
                line: String::from_utf8_lossy(line).into_owned(),
                name,
            })
        })
    }

    fn match_pinned(&self, line: &[u8], watch: PromptWatch, host: &HostPrompt) -> Option<PromptMatch> {
        let line = line.trim_ascii();
        watch.kinds().iter().find_map(|&kind| {
            let expected = self.prompt_line(host, kind);
            (line == expected.as_bytes()).then(|| PromptMatch {
                kind,
                line: expected,
                name: Some(host.name().to_string()),
            })
        })
    }

    fn find_anywhere(&self, data: &[u8], watch: PromptWatch) -> Option<PromptMatch> {
        watch.kinds().iter().find_map(|&kind| {
            let mut marker = [0u8; 4];
            let marker = self.marker(kind).encode_utf8(&mut marker).as_bytes();
            let pos = memchr::memmem::find(data, marker)?;

            let start = memchr::memrchr(b'\n', &data[..pos]).map_or(0, |p| p + 1);
            let end = memchr::memchr(b'\n', &data[pos..]).map_or(data.len(), |p| pos + p);
            let line = data[start..end].trim_ascii();
            let name = data[start..pos].trim_ascii();

            Some(PromptMatch {
                kind,
                line: String::from_utf8_lossy(line).into_owned(),
                name: (!name.is_empty()).then(|| String::from_utf8_lossy(name).into_owned()),
            })
        })
    }
}

impl Default for PromptPatterns {
    fn default() -> Self {
        Self {
            unprivileged_marker: '>',
            privileged_marker: '#',
            unprivileged_line: line_pattern('>').expect("static prompt pattern"),
            privileged_line: line_pattern('#').expect("static prompt pattern"),
        }
    }
}

/// `<name><marker>` with optional trailing whitespace, name free of whitespace.
fn line_pattern(marker: char) -> Result<Regex, regex::Error> {
    let marker = regex::escape(marker.encode_utf8(&mut [0u8; 4]));
    Regex::new(&format!(r"^(?P<name>\S{{1,255}}?){marker}\s*$"))
}

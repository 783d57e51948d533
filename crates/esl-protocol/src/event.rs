//! Switch event records
//!
//! An event is an immutable bag of named string fields plus an optional body.
//! Only a handful of fields matter to call control, so fields are looked up by
//! name instead of being modelled as a typed struct.
//!
//! The switch delivers events either as a JSON object (`text/event-json`) or
//! as percent-encoded header lines (`text/event-plain`).

use std::fmt;

use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::headers::Headers;

/// Field carrying the channel UUID an event belongs to
pub const UNIQUE_ID: &str = "Unique-ID";
/// Field carrying the ringing/answered state of a dialed leg
pub const ANSWER_STATE: &str = "Answer-State";
/// Field carrying the event class name
pub const EVENT_NAME: &str = "Event-Name";
/// Field carrying the media channel lifecycle stage
pub const CHANNEL_STATE: &str = "Channel-State";

/// JSON key the switch uses for the event body
const JSON_BODY_KEY: &str = "_body";

/// A single occurrence reported by the switch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    headers: Headers,
    body: Option<String>,
}

impl Event {
    /// Create an empty event
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Builder-style body setter
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Look up a field by name (case-insensitive)
    ///
    /// A missing field is a normal outcome, not an error.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Channel UUID this event belongs to, if any
    ///
    /// Empty values are treated as absent.
    pub fn call_id(&self) -> Option<&str> {
        self.get(UNIQUE_ID).filter(|id| !id.is_empty())
    }

    /// Event class name (`CHANNEL_ANSWER`, `PLAYBACK_STOP`, ...)
    pub fn name(&self) -> Option<&str> {
        self.get(EVENT_NAME)
    }

    /// Event body, if the switch attached one
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// All fields in delivery order
    pub fn fields(&self) -> &Headers {
        &self.headers
    }

    /// Decode a `text/event-json` body
    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(ParseError::NotAnObject);
        };

        let mut event = Event::new();
        for (key, value) in map {
            let text = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            if key == JSON_BODY_KEY {
                event.body = Some(text);
            } else {
                event.headers.insert(key, text);
            }
        }
        Ok(event)
    }

    /// Encode as a `text/event-json` body
    pub fn to_json(&self) -> String {
        let mut map = Map::new();
        for (key, value) in self.headers.iter() {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
        if let Some(body) = &self.body {
            map.insert(JSON_BODY_KEY.to_string(), Value::String(body.clone()));
        }
        Value::Object(map).to_string()
    }

    /// Encode as a `text/event-plain` body
    ///
    /// A body is appended after a blank line with its own `Content-Length`.
    pub fn to_plain(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.headers.iter() {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(&percent_encode(value));
            out.push('\n');
        }
        if let Some(body) = &self.body {
            out.push_str(&format!("Content-Length: {}\n\n{}", body.len(), body));
        }
        out
    }

    /// Decode a `text/event-plain` body
    ///
    /// Header values are percent-encoded. If the inner headers carry a
    /// `Content-Length`, the text after the first blank line is the body.
    pub fn from_plain(text: &str) -> Result<Self, ParseError> {
        let (head, rest) = match text.find("\n\n") {
            Some(pos) => (&text[..pos], Some(&text[pos + 2..])),
            None => (text, None),
        };

        let mut event = Event::new();
        for line in head.lines().filter(|l| !l.trim().is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ParseError::MalformedHeader(line.to_string()))?;
            event
                .headers
                .insert(name.trim(), percent_decode(value.trim()));
        }

        if let Some(len) = event.get("Content-Length") {
            let len: usize = len
                .parse()
                .map_err(|_| ParseError::InvalidContentLength(len.to_string()))?;
            let rest = rest.unwrap_or_default();
            let end = len.min(rest.len());
            event.body = rest.get(..end).map(str::to_string);
        }

        Ok(event)
    }

    /// Multi-line rendering of every field, for verbose event logging
    pub fn pretty(&self) -> PrettyEvent<'_> {
        PrettyEvent(self)
    }
}

/// Display adapter returned by [`Event::pretty`]
pub struct PrettyEvent<'a>(&'a Event);

impl fmt::Display for PrettyEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.0.headers.iter() {
            writeln!(f, "{}: {}", name, value)?;
        }
        if let Some(body) = &self.0.body {
            writeln!(f)?;
            writeln!(f, "{}", body)?;
        }
        Ok(())
    }
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Decode `%XX` escapes; `+` is left untouched since the switch encodes spaces as `%20`
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

//! A single m3u8 directive: key plus raw, ordered attribute list

use std::fmt;

/// Parsed playlist tag such as `#EXT-X-STREAM-INF:BANDWIDTH=1,CODECS="a,b"`.
///
/// Attributes are kept as the raw text between commas (commas inside quoted
/// values do not split), so attributes the model does not know about and
/// non key/value payloads like `#EXTINF:10.0,` survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistTag {
    pub key: String,
    pub attrs: Vec<String>,
}

impl PlaylistTag {
    pub fn new(key: impl Into<String>, attrs: Vec<String>) -> Self {
        Self {
            key: key.into(),
            attrs,
        }
    }

    /// Parse a `#`-prefixed line
    pub fn parse(line: &str) -> Self {
        match line.split_once(':') {
            Some((key, rest)) => Self {
                key: key.to_string(),
                attrs: split_attributes(rest),
            },
            None => Self {
                key: line.to_string(),
                attrs: Vec::new(),
            },
        }
    }

    /// Attribute value by name, with surrounding quotes removed
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find_map(|raw| {
            let (k, v) = raw.split_once('=')?;
            if k != name {
                return None;
            }
            Some(unquote(v))
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace the raw value of an existing attribute in place.
    ///
    /// Returns false and leaves the tag untouched when no attribute has that
    /// name; appending is up to the caller.
    pub fn set(&mut self, name: &str, raw_value: &str) -> bool {
        for raw in self.attrs.iter_mut() {
            if raw.split_once('=').map(|(k, _)| k) == Some(name) {
                *raw = format!("{}={}", name, raw_value);
                return true;
            }
        }
        false
    }

    /// Append a `NAME=value` attribute
    pub fn push(&mut self, name: &str, raw_value: &str) {
        self.attrs.push(format!("{}={}", name, raw_value));
    }

    /// Set the attribute if present, append it otherwise
    pub fn set_or_push(&mut self, name: &str, raw_value: &str) {
        if !self.set(name, raw_value) {
            self.push(name, raw_value);
        }
    }
}

impl fmt::Display for PlaylistTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)?;
        if !self.attrs.is_empty() {
            write!(f, ":{}", self.attrs.join(","))?;
        }
        Ok(())
    }
}

/// Wrap a value in double quotes
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value)
}

fn unquote(v: &str) -> &str {
    match v.strip_prefix('"') {
        Some(inner) => inner.strip_suffix('"').unwrap_or(inner),
        None => v,
    }
}

/// Split on commas that are not inside a quoted string
fn split_attributes(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in s.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => out.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}

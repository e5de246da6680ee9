// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The cloud provider configuration file.
//!
//! The file uses the git-config ("gcfg") syntax:
//!
//! ```ini
//! [global]
//! project-id = my-project
//! zone = us-central1-a
//! token-url = https://token.example.com/v1/token
//! token-body = "{\"scope\": \"compute\"}"
//! ```
//!
//! All keys are optional. Unknown sections and keys are ignored.

use crate::build_errors::Error;
use serde::Deserialize;
use serde_json::{Map, Value};

/// The parsed configuration file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ConfigFile {
    /// The `[global]` section.
    #[serde(default)]
    pub global: ConfigGlobal,
}

/// The `[global]` section of the configuration file. Empty means unset.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigGlobal {
    /// Mint tokens at this URL instead of using the ambient credentials.
    #[serde(rename = "token-url")]
    pub token_url: String,
    /// The request sent to `token_url`.
    #[serde(rename = "token-body")]
    pub token_body: String,
    /// Overrides the project reported by the metadata server.
    #[serde(rename = "project-id")]
    pub project_id: String,
    /// Overrides the zone reported by the metadata server.
    pub zone: String,
}

impl std::fmt::Debug for ConfigGlobal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigGlobal")
            .field("token_url", &self.token_url)
            .field("token_body", &"[censored]")
            .field("project_id", &self.project_id)
            .field("zone", &self.zone)
            .finish()
    }
}

/// Loads the configuration file at `path`.
///
/// An empty `path` means no configuration was requested and returns `None`.
pub fn read_config(path: &str) -> Result<Option<ConfigFile>, Error> {
    if path.is_empty() {
        tracing::debug!("no cloud provider configuration file");
        return Ok(None);
    }
    let file = std::fs::File::open(path).map_err(|e| Error::config_unreadable(path, e))?;
    let contents = std::io::read_to_string(file).map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => Error::config_malformed(path, e),
        _ => Error::config_unreadable(path, e),
    })?;
    let config = parse(&contents).map_err(|e| Error::config_malformed(path, e))?;
    tracing::debug!("loaded cloud provider configuration from {path}: {config:?}");
    Ok(Some(config))
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum ParseError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: &'static str },
    #[error("unexpected configuration contents: {0}")]
    Decode(#[from] serde_json::Error),
}

fn syntax(line: usize, message: &'static str) -> ParseError {
    ParseError::Syntax { line, message }
}

pub(crate) fn parse(contents: &str) -> Result<ConfigFile, ParseError> {
    let mut sections = Map::new();
    let mut current: Option<String> = None;
    for (index, raw) in contents.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() || is_comment(text) {
            continue;
        }
        if let Some(header) = text.strip_prefix('[') {
            let name = parse_header(header).ok_or_else(|| syntax(line, "invalid section header"))?;
            sections
                .entry(name.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            current = Some(name);
            continue;
        }
        let Some(section) = current.as_ref() else {
            return Err(syntax(line, "variable outside of a section"));
        };
        let (name, value) = parse_variable(text).map_err(|m| syntax(line, m))?;
        if let Some(Value::Object(vars)) = sections.get_mut(section) {
            vars.insert(name, Value::String(value));
        }
    }
    Ok(serde_json::from_value(Value::Object(sections))?)
}

fn is_comment(text: &str) -> bool {
    text.starts_with(';') || text.starts_with('#')
}

// Returns the lowercase section name. Subsections (`[name "sub"]`) are kept
// apart from their parent section.
fn parse_header(header: &str) -> Option<String> {
    let (inner, rest) = header.split_once(']')?;
    let rest = rest.trim();
    if !rest.is_empty() && !is_comment(rest) {
        return None;
    }
    let inner = inner.trim();
    let (name, subsection) = match inner.split_once(char::is_whitespace) {
        Some((name, sub)) => (name, Some(sub.trim())),
        None => (inner, None),
    };
    if !is_name(name) {
        return None;
    }
    let name = name.to_ascii_lowercase();
    match subsection {
        None => Some(name),
        Some(sub) => {
            let sub = sub.strip_prefix('"')?.strip_suffix('"')?;
            Some(format!("{name} \"{sub}\""))
        }
    }
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn parse_variable(text: &str) -> Result<(String, String), &'static str> {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or(text.len());
    let (name, rest) = text.split_at(end);
    if !is_name(name) {
        return Err("invalid variable name");
    }
    let name = name.to_ascii_lowercase();
    let rest = rest.trim_start();
    if rest.is_empty() || is_comment(rest) {
        return Ok((name, String::new()));
    }
    let Some(value) = rest.strip_prefix('=') else {
        return Err("expected `=` after the variable name");
    };
    Ok((name, parse_value(value)?))
}

fn parse_value(text: &str) -> Result<String, &'static str> {
    let mut value = String::new();
    // Whitespace outside quotes is kept only if more value follows.
    let mut pending = String::new();
    let mut quoted = false;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                value.push_str(&std::mem::take(&mut pending));
                quoted = !quoted;
            }
            '\\' => {
                value.push_str(&std::mem::take(&mut pending));
                match chars.next() {
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('b') => value.push('\u{8}'),
                    _ => return Err("invalid escape sequence"),
                }
            }
            c if quoted => value.push(c),
            ';' | '#' => break,
            c if c.is_whitespace() => {
                if !value.is_empty() {
                    pending.push(c);
                }
            }
            c => {
                value.push_str(&std::mem::take(&mut pending));
                value.push(c);
            }
        }
    }
    if quoted {
        return Err("unterminated quoted value");
    }
    Ok(value)
}

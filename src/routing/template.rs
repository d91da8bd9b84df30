//! Path templates.
//!
//! A template is a request path with named captures, e.g.
//! `/v1/dataset/:dataset/layer/:layer`. Compilation produces an anchored,
//! case-insensitive pattern plus the ordered capture names; the pattern is
//! what gets persisted, so the hot path never re-parses templates.

use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;

/// Capture values keyed by capture name.
pub type PathParams = BTreeMap<String, String>;

/// Error produced while compiling a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("path template '{0}' must start with '/'")]
    NotAbsolute(String),

    #[error("path template '{template}' declares capture '{key}' twice")]
    DuplicateKey { template: String, key: String },

    #[error("invalid pattern for '{template}': {source}")]
    Pattern {
        template: String,
        #[source]
        source: regex::Error,
    },
}

/// Serialized form of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    pub pattern: String,
    pub keys: Vec<String>,
}

enum Token<'a> {
    Literal(char),
    Key(&'a str),
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(template: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = template.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c == ':' && chars.peek().is_some_and(|(_, next)| is_key_char(*next)) {
            let start = idx + 1;
            let mut end = start;
            while let Some((i, next)) = chars.peek().copied() {
                if !is_key_char(next) {
                    break;
                }
                end = i + next.len_utf8();
                chars.next();
            }
            tokens.push(Token::Key(&template[start..end]));
        } else {
            tokens.push(Token::Literal(c));
        }
    }
    tokens
}

/// Compile a template into its pattern and ordered capture names.
pub fn compile(template: &str) -> Result<CompiledPath, TemplateError> {
    if !template.starts_with('/') {
        return Err(TemplateError::NotAbsolute(template.to_string()));
    }

    let trimmed = if template.len() > 1 {
        template.trim_end_matches('/')
    } else {
        ""
    };

    let mut pattern = String::from("(?i)^");
    let mut keys: Vec<String> = Vec::new();
    let mut literal = [0u8; 4];

    for token in tokenize(trimmed) {
        match token {
            Token::Literal(c) => pattern.push_str(&regex::escape(c.encode_utf8(&mut literal))),
            Token::Key(key) => {
                if keys.iter().any(|k| k == key) {
                    return Err(TemplateError::DuplicateKey {
                        template: template.to_string(),
                        key: key.to_string(),
                    });
                }
                keys.push(key.to_string());
                pattern.push_str("([^/]+?)");
            }
        }
    }
    pattern.push_str("/?$");

    // Reject anything the regex engine would refuse later.
    Regex::new(&pattern).map_err(|source| TemplateError::Pattern {
        template: template.to_string(),
        source,
    })?;

    Ok(CompiledPath { pattern, keys })
}

/// Match `path` and bind each capture group to its key.
pub fn captures(regex: &Regex, keys: &[String], path: &str) -> Option<PathParams> {
    let caps = regex.captures(path)?;
    let params = keys
        .iter()
        .enumerate()
        .filter_map(|(i, key)| caps.get(i + 1).map(|m| (key.clone(), m.as_str().to_string())))
        .collect();
    Some(params)
}

/// Substitute bound captures into a template. Unbound keys are left as-is.
pub fn render(template: &str, params: &PathParams) -> String {
    let mut out = String::with_capacity(template.len());
    for token in tokenize(template) {
        match token {
            Token::Literal(c) => out.push(c),
            Token::Key(key) => match params.get(key) {
                Some(value) => out.push_str(value),
                None => {
                    out.push(':');
                    out.push_str(key);
                }
            },
        }
    }
    out
}

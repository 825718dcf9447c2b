//! Safety checks applied to commands before they touch a workspace
//!
//! Path and shell checks reject; content checks rewrite. Content sanitization
//! is a hygiene pass over markup-like payloads and is not a security boundary
//! for executable code. The shell denylist is advisory filtering, not a
//! sandbox.

use crate::{AutocodeError, Command, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use thiserror::Error;

/// Characters rejected in paths on common filesystems
const ILLEGAL_PATH_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script pattern"));

static JAVASCRIPT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript\s*:").expect("javascript scheme pattern"));

static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*(?:"[^"]*"|'[^']*')"#).expect("event handler pattern")
});

static DEFAULT_DENYLIST: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // rm with both recursive and force flags, in any order or grouping
        r"\brm\s+(?:-[a-zA-Z]*r[a-zA-Z]*f|-[a-zA-Z]*f[a-zA-Z]*r)",
        r"\brm\s+(?:-[a-zA-Z]*[rf][a-zA-Z]*\s+)+-[a-zA-Z]*[rf]",
        r"\brm\s+.*--no-preserve-root",
        r"\bmkfs(?:\.\w+)?\b",
        r"\bdd\s+if=",
        r"\b(?:shutdown|reboot|halt|poweroff)\b",
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        r">\s*/dev/sd[a-z]",
        r"(?i)\bformat\s+[a-z]:",
        r"\bchmod\s+-R\s+0?777\s+/(?:\s|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("denylist pattern"))
    .collect()
});

/// Why a command was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("path is empty")]
    EmptyPath,

    #[error("path contains a parent-directory segment: {0}")]
    ParentTraversal(String),

    #[error("path references the home directory: {0}")]
    HomeReference(String),

    #[error("path is absolute: {0}")]
    AbsolutePath(String),

    #[error("path contains illegal character {ch:?}: {path}")]
    IllegalCharacter { path: String, ch: char },

    #[error("shell command is empty")]
    EmptyCommand,

    #[error("shell command matches denylisted pattern `{pattern}`")]
    DeniedCommand { pattern: String },
}

/// Check a workspace-relative path
pub fn validate_path(path: &str) -> std::result::Result<(), ValidationError> {
    if path.trim().is_empty() {
        return Err(ValidationError::EmptyPath);
    }

    if path.starts_with('/') || path.starts_with('\\') {
        return Err(ValidationError::AbsolutePath(path.to_string()));
    }

    if let Some(ch) = path
        .chars()
        .find(|c| ILLEGAL_PATH_CHARS.contains(c) || c.is_control())
    {
        return Err(ValidationError::IllegalCharacter {
            path: path.to_string(),
            ch,
        });
    }

    for segment in path.split(['/', '\\']) {
        if segment == ".." {
            return Err(ValidationError::ParentTraversal(path.to_string()));
        }
        if segment.starts_with('~') {
            return Err(ValidationError::HomeReference(path.to_string()));
        }
    }

    Ok(())
}

/// Strip script blocks, `javascript:` schemes and inline event handlers.
/// Borrows the input when nothing matched.
pub fn sanitize_content(content: &str) -> Cow<'_, str> {
    let mut out = Cow::Borrowed(content);
    for pattern in [&*SCRIPT_BLOCK, &*JAVASCRIPT_SCHEME, &*EVENT_HANDLER] {
        if pattern.is_match(&out) {
            out = Cow::Owned(pattern.replace_all(&out, "").into_owned());
        }
    }
    out
}

/// Command validator with a configurable shell denylist
#[derive(Debug, Clone)]
pub struct Validator {
    extra_denylist: Vec<Regex>,
    sanitize: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            extra_denylist: Vec::new(),
            sanitize: true,
        }
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add denylist patterns on top of the built-in ones
    pub fn with_denylist<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let regex = Regex::new(pattern.as_ref()).map_err(|e| {
                AutocodeError::InvalidConfig(format!(
                    "bad shell denylist pattern {:?}: {}",
                    pattern.as_ref(),
                    e
                ))
            })?;
            self.extra_denylist.push(regex);
        }
        Ok(self)
    }

    pub fn with_sanitize(mut self, sanitize: bool) -> Self {
        self.sanitize = sanitize;
        self
    }

    /// Reject shell commands that look destructive
    pub fn check_shell(&self, command: &str) -> std::result::Result<(), ValidationError> {
        if command.trim().is_empty() {
            return Err(ValidationError::EmptyCommand);
        }
        if let Some(pattern) = DEFAULT_DENYLIST
            .iter()
            .chain(self.extra_denylist.iter())
            .find(|p| p.is_match(command))
        {
            return Err(ValidationError::DeniedCommand {
                pattern: pattern.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Validate one command. Create/Edit always carry content by construction,
    /// so only paths and shell strings can fail here.
    pub fn validate(&self, command: &Command) -> std::result::Result<(), ValidationError> {
        match command {
            Command::CreateFile { path, .. }
            | Command::EditFile { path, .. }
            | Command::DeleteFile { path, .. } => validate_path(path),
            Command::RunShell { command, .. } => self.check_shell(command),
        }
    }

    /// Payload to write for a create/edit
    pub fn prepare_content<'a>(&self, content: &'a str) -> Cow<'a, str> {
        if self.sanitize {
            sanitize_content(content)
        } else {
            Cow::Borrowed(content)
        }
    }
}

//! Input checks for project parameters. These run before anything touches disk.

use crate::error::CcliError;
use crate::paths::{expand_path, BINARY_NAME};
use std::env;
use std::path::PathBuf;
use url::Url;

/// Characters that would break the generated shortcut scripts or image tags.
const DISALLOWED_CHARS: &[char] = &['!', '@', '#', '*', '+', '$', '&', '%', '\\', '/', '=', '~'];

const ALLOWED_URL_SCHEMES: &[&str] = &["https", "ssh"];

fn offending_char(value: &str) -> Option<char> {
    value
        .chars()
        .find(|c| c.is_whitespace() || DISALLOWED_CHARS.contains(c))
}

fn check_word(value: &str, field: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    if let Some(c) = offending_char(value) {
        return Err(format!(
            "{field} '{}' contains disallowed character {:?}",
            value.escape_debug(),
            c
        ));
    }
    Ok(())
}

pub fn validate_name(value: &str) -> Result<(), CcliError> {
    check_word(value, "name").map_err(CcliError::InvalidName)
}

/// Shortcut names share the bin directory with the `ccli` link itself.
pub fn validate_alias(value: &str) -> Result<(), CcliError> {
    check_word(value, "alias").map_err(CcliError::InvalidName)?;
    if value == BINARY_NAME {
        return Err(CcliError::InvalidName(format!(
            "shortcut name '{value}' is taken by {BINARY_NAME} itself; pass a different --alias"
        )));
    }
    Ok(())
}

pub fn validate_command(value: &str) -> Result<(), CcliError> {
    check_word(value, "command").map_err(CcliError::InvalidCommand)
}

pub fn validate_url(value: &str) -> Result<(), CcliError> {
    let parsed = Url::parse(value.trim())
        .map_err(|err| CcliError::InvalidUrl(format!("'{value}' is not a valid url ({err})")))?;
    if !ALLOWED_URL_SCHEMES.contains(&parsed.scheme()) {
        return Err(CcliError::InvalidUrl(format!(
            "scheme '{}' is not supported; use https:// or ssh://",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(CcliError::InvalidUrl(format!("'{value}' has no host")));
    }
    Ok(())
}

/// Resolves a destination directory: expands `~`, anchors relative paths at the
/// current directory, and rejects paths that exist but are not directories.
pub fn resolve_destination(value: &str) -> Result<PathBuf, CcliError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CcliError::InvalidDestination(
            "destination must not be empty".to_string(),
        ));
    }
    if trimmed.contains('\n') || trimmed.contains('\r') {
        return Err(CcliError::InvalidDestination(
            "destination contains a newline".to_string(),
        ));
    }
    let expanded = PathBuf::from(expand_path(trimmed));
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        env::current_dir()?.join(expanded)
    };
    if absolute.exists() && !absolute.is_dir() {
        return Err(CcliError::InvalidDestination(format!(
            "{} exists and is not a directory",
            absolute.display()
        )));
    }
    Ok(absolute)
}

pub fn validate_destination(value: &str) -> Result<(), CcliError> {
    resolve_destination(value).map(|_| ())
}

use anyhow::{Result, anyhow};
use std::borrow::Cow;
use std::path::Path;
use validator::ValidationError;

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '/'
}

/// Matches `^/?[A-Za-z0-9_\-/]+$`. Since the slash is part of the character
/// class, this is any non-empty run of letters, digits, `_`, `-` and `/`.
pub fn is_valid_upload_path(path: &str) -> bool {
    !path.is_empty() && path.chars().all(is_path_char)
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let valid = !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_username").with_message(Cow::from(
            "Username can only contain letters, numbers, underscores, and hyphens",
        )))
    }
}

/// Reduces a client supplied filename to a single safe path component.
/// The result is used both as the object name and inside the staging file name.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    // Get only the filename component (remove any path)
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from uploaded filename: {}", filename);
    }

    // Windows-style separators survive Path::file_name on unix
    let name = name.rsplit('\\').next().unwrap_or("");

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == '/'
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return Err(anyhow!("Filename cannot be empty"));
    }

    Ok(sanitized)
}

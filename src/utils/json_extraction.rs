//! JSON extraction from LLM responses.
//!
//! Models frequently wrap JSON in markdown code fences or surround it with a
//! sentence of prose. These helpers recover the JSON payload in both cases.

use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur when extracting JSON from a response.
#[derive(Debug, Error)]
pub enum JsonExtractionError {
    /// No JSON object or array could be located.
    #[error("No JSON found in response: {0}")]
    NotFound(String),

    /// A candidate was found but did not deserialize.
    #[error("Invalid JSON in response: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Strips markdown code fences around a JSON payload.
///
/// Returns the fenced body when a ```` ```json ```` (or bare ```` ``` ````)
/// block is present, and the input unchanged otherwise.
pub fn clean_json_response(raw: &str) -> String {
    if let Ok(re) = Regex::new(r"(?is)```(?:json)?[\r\n]+(.*?)[\r\n]+```") {
        if let Some(body) = re.captures(raw).and_then(|caps| caps.get(1)) {
            return body.as_str().to_string();
        }
    }

    let stripped = raw.trim();
    if stripped.len() >= 6 && stripped.starts_with("```") && stripped.ends_with("```") {
        let lines: Vec<&str> = stripped.lines().collect();
        if lines.len() >= 2 {
            return lines[1..lines.len() - 1].join("\n");
        }
    }

    raw.to_string()
}

/// Parses a model response as JSON.
///
/// Tries the fence-stripped text first, then the first balanced object or
/// array embedded in it.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T, JsonExtractionError> {
    let cleaned = clean_json_response(raw);
    let first_error = match serde_json::from_str(cleaned.trim()) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    match extract_embedded_json(&cleaned) {
        Some(candidate) => Ok(serde_json::from_str(candidate)?),
        None if cleaned.contains('{') || cleaned.contains('[') => Err(first_error.into()),
        None => Err(JsonExtractionError::NotFound(preview(raw))),
    }
}

/// Returns the first balanced `{...}` or `[...]` span in `content`.
pub fn extract_embedded_json(content: &str) -> Option<&str> {
    let start = content.find(['{', '['])?;
    let (open, close) = if content[start..].starts_with('{') {
        ('{', '}')
    } else {
        ('[', ']')
    };
    let end = find_matching_delimiter(&content[start..], open, close)?;
    Some(&content[start..=start + end])
}

/// Finds the index of the delimiter closing the one at the start of `s`.
///
/// Delimiters inside string literals (including escaped quotes) are ignored.
pub fn find_matching_delimiter(s: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn preview(raw: &str) -> String {
    raw.chars().take(120).collect()
}

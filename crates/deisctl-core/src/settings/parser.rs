//! TOML parsing for deisctl.toml with line context on errors.

use std::path::Path;

use super::schema::Settings;
use crate::error::{Error, Result};

pub fn parse_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_settings_str(&content)
        .map_err(|e| Error::Settings(format!("{}: {e}", path.display())))
}

pub fn parse_settings_str(content: &str) -> Result<Settings> {
    let settings: Settings =
        toml::from_str(content).map_err(|e| describe_toml_error(&e, content))?;
    settings.validate()?;
    Ok(settings)
}

fn describe_toml_error(error: &toml::de::Error, content: &str) -> Error {
    let message = error.message().trim().to_string();
    let Some(span) = error.span() else {
        return Error::Settings(message);
    };
    let line = content[..span.start.min(content.len())].matches('\n').count() + 1;
    Error::Settings(format!(
        "line {line}: {message}\n{}",
        line_context(content, line)
    ))
}

/// The offending line with one line of context on each side.
fn line_context(content: &str, line: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line.saturating_sub(2);
    let end = (line + 1).min(lines.len());
    (start..end)
        .map(|i| {
            let marker = if i + 1 == line { ">>>" } else { "   " };
            format!("{marker} {:4} | {}", i + 1, lines[i])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

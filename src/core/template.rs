//! `${{ ... }}` placeholders in env values, commands and action params

use crate::core::condition::is_event_path;
use crate::core::error::DefinitionError;
use regex::Regex;
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\{\s*([^}]*?)\s*\}\}").expect("placeholder regex is valid"))
}

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").expect("segment regex is valid"))
}

/// What a placeholder refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `secrets.NAME`
    Secret(String),
    /// `env.NAME`
    Env(String),
    /// `event.*` / `github.*`
    Event(Vec<String>),
}

impl Placeholder {
    fn parse(inner: &str) -> Result<Self, DefinitionError> {
        let invalid = |reason: &str| DefinitionError::InvalidPlaceholder {
            placeholder: inner.to_string(),
            reason: reason.to_string(),
        };

        let path: Vec<String> = inner.split('.').map(str::to_string).collect();
        if path.iter().any(|s| !segment_regex().is_match(s)) {
            return Err(invalid("expected a dotted path"));
        }

        match path[0].as_str() {
            "secrets" if path.len() == 2 => Ok(Placeholder::Secret(path[1].clone())),
            "env" if path.len() == 2 => Ok(Placeholder::Env(path[1].clone())),
            "secrets" | "env" => Err(invalid("expected exactly one name after the root")),
            _ if is_event_path(&path) => Ok(Placeholder::Event(path)),
            _ => Err(invalid("unknown context")),
        }
    }
}

/// Parse every placeholder in `text`
pub fn placeholders(text: &str) -> Result<Vec<Placeholder>, DefinitionError> {
    placeholder_regex()
        .captures_iter(text)
        .map(|caps| Placeholder::parse(&caps[1]))
        .collect()
}

/// Secret names referenced by `text`. Assumes `text` already validated.
pub fn secret_references(text: &str) -> Vec<String> {
    placeholders(text)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| match p {
            Placeholder::Secret(name) => Some(name),
            _ => None,
        })
        .collect()
}

/// Substitute every placeholder using `resolve`
pub fn render<E>(
    text: &str,
    mut resolve: impl FnMut(&Placeholder) -> Result<String, E>,
) -> Result<String, E>
where
    E: From<DefinitionError>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in placeholder_regex().captures_iter(text) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        out.push_str(&text[last..whole.start]);
        let placeholder = Placeholder::parse(&caps[1])?;
        out.push_str(&resolve(&placeholder)?);
        last = whole.end;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

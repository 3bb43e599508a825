// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! miette diagnostics for configuration failures.
//!
//! Every key can come from a TOML file or a `COURIER_<SECTION>_<KEY>`
//! variable, so diagnostics name both spellings. Misspelled keys inside a
//! known section get a Jaro-Winkler suggestion and, for file sources, a
//! labelled span.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;

const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in [{section}]")]
    #[diagnostic(
        code(courier::config::unknown_key),
        help("{}", unknown_key_help(section, suggestion.as_deref()))
    )]
    UnknownKey {
        section: String,
        key: String,
        suggestion: Option<String>,
        #[label("not a {section} setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(
        code(courier::config::invalid_type),
        help("expected {expected} (from courier.toml or {env})")
    )]
    InvalidValue {
        /// Dotted key, e.g. `gateway.port`.
        key: String,
        found: String,
        expected: String,
        env: String,
    },

    /// A value that parsed but breaks a semantic rule.
    #[error("validation error: {message}")]
    #[diagnostic(code(courier::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(courier::config::other))]
    Other(String),
}

fn unknown_key_help(section: &str, suggestion: Option<&str>) -> String {
    match suggestion {
        Some(key) => format!("did you mean `{section}.{key}`?"),
        None => format!("remove it; `courier check-config` lists what [{section}] accepts"),
    }
}

/// Environment variable that overrides a dotted key.
pub fn env_var_name(path: &[String]) -> String {
    format!("COURIER_{}", path.join("_").to_ascii_uppercase())
}

/// Maps each error in a figment failure to a [`ConfigError`].
///
/// `toml_sources` pairs file paths with their contents so unknown keys
/// can be labelled in place.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                let section = error.path.first().cloned().unwrap_or_default();
                let (span, src) = locate(&error, &section, field, toml_sources);
                ConfigError::UnknownKey {
                    suggestion: suggest_key(field, expected),
                    key: field.clone(),
                    section,
                    span,
                    src,
                }
            }
            Kind::InvalidType(found, expected) => ConfigError::InvalidValue {
                key: error.path.join("."),
                found: found.to_string(),
                expected: expected.clone(),
                env: env_var_name(&error.path),
            },
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

fn locate(
    error: &figment::error::Error,
    section: &str,
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some(figment::Source::File(file)) = error.metadata.as_ref().and_then(|m| m.source.as_ref())
    else {
        return (None, None);
    };
    let file = file.display().to_string();
    toml_sources
        .iter()
        .find(|(path, _)| *path == file)
        .and_then(|(name, content)| {
            let offset = find_key_offset(content, section, field)?;
            Some((
                Some(SourceSpan::new(offset.into(), field.len())),
                Some(NamedSource::new(name, content.clone())),
            ))
        })
        .unwrap_or((None, None))
}

/// Byte offset of `field = ...` inside the `[section]` table. An empty
/// section means the top level, before any table header.
pub fn find_key_offset(content: &str, section: &str, field: &str) -> Option<usize> {
    let mut table = "";
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix('[') {
            table = header.split(']').next().unwrap_or_default().trim();
        } else if table == section
            && let Some(rest) = trimmed.strip_prefix(field)
            && rest.trim_start().starts_with('=')
        {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Prints every error to stderr through the installed miette handler.
pub fn render_errors(errors: Vec<ConfigError>) {
    eprintln!("courier: {} configuration problem(s)", errors.len());
    for error in errors {
        eprintln!("{:?}", Report::new(error));
    }
}

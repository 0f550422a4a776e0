//  SUBSTITUTION.rs
//    by Lut99
//
//  Created:
//    11 Mar 2024, 10:09:54
//  Last edited:
//    02 Jul 2024, 11:23:46
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the two-phase variable handling for `user_config.yml`.
//!
//!   Phase one happens while the configuration is processed:
//!   `${NAME}` and `${NAME:-default}` are expanded against a snapshot of
//!   the calling environment. Phase two happens when Docker Compose
//!   reads the emitted file: `{{NAME}}` and `{{NAME:-default}}` markers
//!   travel through the pipeline untouched and are rewritten to
//!   `${NAME}` / `${NAME:-default}` just before the compose file is
//!   written.
//

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FResult};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_yaml::Value;


/***** STATICS *****/
lazy_static! {
    /// Matches a configure-time variable, with an optional `:-default` part.
    ///
    /// The default may not contain `}` (and thus no nested `${...}`); a nested variable leaves
    /// the outer token unmatched, after which leftover detection rejects it.
    static ref CONFIG_VAR: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap();
    /// Matches anything that still looks like a configure-time variable after substitution.
    static ref LEFTOVER_VAR: Regex = Regex::new(r"\$\{[^}]*\}?").unwrap();
}





/***** ERRORS *****/
/// Describes why a single `{{...}}` passthrough marker is malformed.
#[derive(Debug)]
pub enum MarkerError {
    /// A `{{` was found without a matching `}}`.
    Unterminated { snippet: String },
    /// The name part of the marker is not a legal variable name.
    IllegalName { name: String },
}
impl Display for MarkerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use MarkerError::*;
        match self {
            Unterminated { snippet } => write!(f, "'{{{{' without matching '}}}}' (near '{snippet}')"),
            IllegalName { name } => write!(f, "illegal variable name '{name}' (expected a name matching [A-Za-z_][A-Za-z0-9_]*)"),
        }
    }
}
impl std::error::Error for MarkerError {}



/// Errors that may occur while walking a configuration tree.
#[derive(Debug)]
pub enum Error {
    /// A `${...}` token survived substitution.
    UnresolvedVariable { path: String, token: String },
    /// A `{{...}}` marker is not well-formed.
    MalformedMarker { path: String, err: MarkerError },
}
impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use Error::*;
        match self {
            UnresolvedVariable { path, token } => {
                write!(
                    f,
                    "Unresolved configure-time variable '{token}' at '{path}'; export the variable before running configure, or write it as \
                     '{{{{...}}}}' to defer substitution to Docker Compose"
                )
            },
            MalformedMarker { path, err } => write!(f, "Malformed passthrough marker at '{path}': {err}"),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use Error::*;
        match self {
            UnresolvedVariable { .. } => None,
            MalformedMarker { err, .. } => Some(err),
        }
    }
}





/***** HELPER FUNCTIONS *****/
/// Returns whether the given string is a legal variable name (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Returns a short snippet of the given text for use in error messages.
fn snippet(text: &str) -> String {
    const MAX_LEN: usize = 24;
    if text.len() > MAX_LEN {
        let mut end: usize = MAX_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.into()
    }
}

/// Renders a tree path for error messages, mapping the empty (root) path to something readable.
fn display_path(path: &str) -> String { if path.is_empty() { "<root>".into() } else { path.into() } }

/// Returns a label for a mapping key, for use in tree paths.
fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => "<non-scalar key>".into(),
    }
}

/// Calls the given closure on every string leaf in the given tree, in document order.
///
/// The closure receives the dotted path of the leaf (e.g., `stage_1.ports[0]`) and mutable
/// access to the string itself.
fn for_each_string_mut(
    value: &mut Value,
    path: &str,
    f: &mut dyn FnMut(&str, &mut String) -> Result<(), Error>,
) -> Result<(), Error> {
    match value {
        Value::String(s) => f(path, s),
        Value::Sequence(seq) => {
            for (i, elem) in seq.iter_mut().enumerate() {
                for_each_string_mut(elem, &format!("{path}[{i}]"), f)?;
            }
            Ok(())
        },
        Value::Mapping(map) => {
            for (key, elem) in map.iter_mut() {
                let label: String = key_label(key);
                let child: String = if path.is_empty() { label } else { format!("{path}.{label}") };
                for_each_string_mut(elem, &child, f)?;
            }
            Ok(())
        },
        Value::Tagged(tagged) => for_each_string_mut(&mut tagged.value, path, f),

        // The other leaves carry nothing substitutable
        _ => Ok(()),
    }
}





/***** AUXILLARY *****/
/// A single well-formed `{{...}}` marker found in a string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Marker {
    /// The variable name, with surrounding whitespace trimmed.
    pub name:    String,
    /// The literal default, if the marker had a `:-default` part.
    pub default: Option<String>,
    /// The byte range of the whole marker (including braces) in the scanned string.
    pub span:    (usize, usize),
}





/***** LIBRARY *****/
/// Expands every `${NAME}` / `${NAME:-default}` occurrence in the given text.
///
/// `${NAME}` with `NAME` unset expands to the empty string; `${NAME:-default}` uses the literal
/// default when `NAME` is unset _or_ empty. Defaults are never recursively resolved: a default
/// containing `${` leaves the whole token in place, to be rejected by [`find_leftover()`].
///
/// # Arguments
/// - `text`: The text to substitute in.
/// - `env`: The environment snapshot to resolve variables against.
///
/// # Returns
/// The text with all matching tokens replaced.
pub fn substitute_env(text: &str, env: &HashMap<String, String>) -> String {
    CONFIG_VAR
        .replace_all(text, |caps: &Captures| {
            let name: &str = &caps[1];
            match caps.get(2) {
                None => env.get(name).cloned().unwrap_or_default(),
                Some(default) => {
                    if default.as_str().contains("${") {
                        // Leave the token untouched so leftover detection names it
                        return caps[0].to_string();
                    }
                    match env.get(name) {
                        Some(value) if !value.is_empty() => value.clone(),
                        _ => default.as_str().to_string(),
                    }
                },
            }
        })
        .into_owned()
}

/// Searches the given text for any `${...}` token that survived substitution.
///
/// # Returns
/// The first offending token, or [`None`] if the text is clean.
pub fn find_leftover(text: &str) -> Option<String> { LEFTOVER_VAR.find(text).map(|m| m.as_str().into()) }

/// Returns whether the given text contains (the start of) a passthrough marker.
///
/// Used to gate fields that never travel through Docker Compose; even a malformed marker counts.
#[inline]
pub fn contains_passthrough(text: &str) -> bool { text.contains("{{") }

/// Scans the given text for `{{NAME}}` / `{{NAME:-default}}` markers and checks that every
/// occurrence is well-formed.
///
/// A marker is well-formed if its name (after trimming whitespace) matches
/// `[A-Za-z_][A-Za-z0-9_]*`. The default runs up to the first `}}` and is taken literally.
///
/// # Returns
/// All markers found, in order of occurrence.
///
/// # Errors
/// This function errors if a `{{` has no matching `}}`, or if a marker name is illegal.
pub fn scan_passthrough(text: &str) -> Result<Vec<Marker>, MarkerError> {
    let mut markers: Vec<Marker> = vec![];
    let mut pos: usize = 0;
    while let Some(rel) = text[pos..].find("{{") {
        let open: usize = pos + rel;
        let close: usize = match text[open + 2..].find("}}") {
            Some(rel) => open + 2 + rel,
            None => {
                return Err(MarkerError::Unterminated { snippet: snippet(&text[open..]) });
            },
        };

        // Split the inner part into a name and an optional default
        let inner: &str = &text[open + 2..close];
        let (name, default): (&str, Option<&str>) = match inner.find(":-") {
            Some(sep) => (&inner[..sep], Some(&inner[sep + 2..])),
            None => (inner, None),
        };
        let name: &str = name.trim();
        if !is_valid_var_name(name) {
            return Err(MarkerError::IllegalName { name: name.into() });
        }

        markers.push(Marker { name: name.into(), default: default.map(String::from), span: (open, close + 2) });
        pos = close + 2;
    }
    Ok(markers)
}

/// Rewrites every `{{...}}` marker in the given text to its Docker Compose `${...}` form.
///
/// Everything outside the markers is preserved byte-for-byte.
///
/// # Errors
/// This function errors if any marker is malformed (see [`scan_passthrough()`]).
pub fn rewrite_passthrough(text: &str) -> Result<String, MarkerError> {
    let markers: Vec<Marker> = scan_passthrough(text)?;
    if markers.is_empty() {
        return Ok(text.into());
    }

    let mut result: String = String::with_capacity(text.len());
    let mut pos: usize = 0;
    for marker in markers {
        result.push_str(&text[pos..marker.span.0]);
        match &marker.default {
            Some(default) => result.push_str(&format!("${{{}:-{}}}", marker.name, default)),
            None => result.push_str(&format!("${{{}}}", marker.name)),
        }
        pos = marker.span.1;
    }
    result.push_str(&text[pos..]);
    Ok(result)
}

/// Applies [`substitute_env()`] to every string leaf in the given tree.
///
/// After substitution, every leaf is checked for leftover `${...}` tokens and for malformed
/// `{{...}}` markers, so the rest of the pipeline can rely on both properties.
///
/// # Arguments
/// - `root`: The tree to substitute in.
/// - `env`: The environment snapshot to resolve variables against.
///
/// # Errors
/// This function errors if any leaf keeps an unresolved `${...}` token, or carries a malformed
/// passthrough marker. The error names the dotted path of the offending leaf.
pub fn substitute_tree(root: &mut Value, env: &HashMap<String, String>) -> Result<(), Error> {
    for_each_string_mut(root, "", &mut |path, s| {
        let substituted: String = substitute_env(s, env);
        if let Some(token) = find_leftover(&substituted) {
            return Err(Error::UnresolvedVariable { path: display_path(path), token });
        }
        if let Err(err) = scan_passthrough(&substituted) {
            return Err(Error::MalformedMarker { path: display_path(path), err });
        }
        *s = substituted;
        Ok(())
    })
}

/// Applies [`rewrite_passthrough()`] to every string leaf in the given tree.
///
/// This is the final pass before the compose file is written; afterwards, the tree carries
/// Docker Compose `${...}` substitutions and no `{{...}}` markers.
///
/// # Errors
/// This function errors if any leaf carries a malformed passthrough marker, naming the dotted
/// path of the offending leaf.
pub fn rewrite_tree(root: &mut Value) -> Result<(), Error> {
    for_each_string_mut(root, "", &mut |path, s| {
        match rewrite_passthrough(s) {
            Ok(rewritten) => {
                *s = rewritten;
                Ok(())
            },
            Err(err) => Err(Error::MalformedMarker { path: display_path(path), err }),
        }
    })
}

/// Returns whether any string leaf in the given tree contains (the start of) a passthrough
/// marker.
pub fn tree_has_passthrough(root: &Value) -> bool {
    match root {
        Value::String(s) => contains_passthrough(s),
        Value::Sequence(seq) => seq.iter().any(tree_has_passthrough),
        Value::Mapping(map) => map.iter().any(|(_, value)| tree_has_passthrough(value)),
        Value::Tagged(tagged) => tree_has_passthrough(&tagged.value),
        _ => false,
    }
}





/***** TESTS *****/

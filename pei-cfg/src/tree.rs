//  TREE.rs
//    by Lut99
//
//  Created:
//    11 Mar 2024, 11:33:56
//  Last edited:
//    17 Jun 2024, 15:21:44
//  Auto updated?
//    Yes
//
//  Description:
//!   Loads `user_config.yml` into a schema-agnostic, order-preserving
//!   YAML tree.
//!
//!   Typing into the [`crate::user::UserConfig`] schema happens only
//!   after configure-time substitution ran over this tree; see the
//!   pipeline in `pei-ctl`. Duplicate mapping keys are rejected here,
//!   at any depth: silently letting the last key win is how broken SSH
//!   user tables and mount maps slip through unnoticed.
//

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde_yaml::Value;

pub use crate::errors::TreeError as Error;


/***** HELPER FUNCTIONS *****/
/// Returns whether the given backend error reports a duplicate mapping key.
///
/// The `serde_yaml` backend refuses duplicate keys while building its `Mapping` and reports
/// them with a distinctive "duplicate entry" diagnostic; we surface those as their own error
/// kind instead of a generic parse failure.
#[inline]
fn is_duplicate_key(err: &serde_yaml::Error) -> bool { err.to_string().contains("duplicate entry") }





/***** LIBRARY *****/
/// Parses the given raw YAML into an ordered tree.
///
/// # Arguments
/// - `raw`: The raw document text.
/// - `path`: The path the text came from, for error reporting.
///
/// # Returns
/// The document as a [`Value`], with mapping and sequence order preserved.
///
/// # Errors
/// This function errors if the document is not valid YAML, or if any mapping (at any depth)
/// contains the same key twice.
pub fn parse_tree(raw: &str, path: impl Into<PathBuf>) -> Result<Value, Error> {
    match serde_yaml::from_str(raw) {
        Ok(tree) => Ok(tree),
        Err(err) if is_duplicate_key(&err) => Err(Error::DuplicateKey { path: path.into(), err }),
        Err(err) => Err(Error::ParseError { path: path.into(), err }),
    }
}

/// Loads the YAML document at the given path into an ordered tree.
///
/// # Errors
/// This function errors if the file could not be read, or for any reason [`parse_tree()`] may
/// fail.
pub fn load_tree(path: impl AsRef<Path>) -> Result<Value, Error> {
    let path: &Path = path.as_ref();
    debug!("Loading YAML tree from '{}'...", path.display());

    let raw: String = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            return Err(Error::FileReadError { path: path.into(), err });
        },
    };
    parse_tree(&raw, path)
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_preserved() {
        let tree = parse_tree("zulu: 1\nalpha: 2\nmike: 3\n", "test.yml").unwrap();
        let keys: Vec<&str> = tree.as_mapping().unwrap().iter().map(|(k, _)| k.as_str().unwrap()).collect();
        assert_eq!(keys, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let raw = "stage_1:\n  ssh:\n    users:\n      alice:\n        password: a\n      alice:\n        password: b\n";
        match parse_tree(raw, "test.yml") {
            Err(Error::DuplicateKey { .. }) => {},
            other => panic!("expected a duplicate key error, got {other:?}"),
        }
    }

    #[test]
    fn broken_yaml_is_a_parse_error() {
        match parse_tree("stage_1: [unclosed", "test.yml") {
            Err(Error::ParseError { .. }) => {},
            other => panic!("expected a parse error, got {other:?}"),
        }
    }
}

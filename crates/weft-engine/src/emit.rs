use std::fs;
use std::path::Path;

use miette::Diagnostic;
use thiserror::Error;

use crate::component::ComponentList;

/// Write one generated file into the output directory.
///
/// Best-effort: returns whether the write succeeded. No partial-file cleanup
/// is guaranteed on failure; the caller decides whether a failed write aborts
/// the run.
pub fn write(dir: &Path, name: &str, contents: &str) -> bool {
    fs::write(dir.join(name), contents).is_ok()
}

/// Failures while emitting machine-readable artifacts.
#[derive(Debug, Error, Diagnostic)]
pub enum EmitError {
    #[error("failed to serialize artifact: {0}")]
    #[diagnostic(code(weft::emit::serialize))]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write artifact: {0}")]
    #[diagnostic(code(weft::emit::io))]
    Io(#[from] std::io::Error),
}

/// Write the component list as a JSON artifact for downstream tooling.
pub fn write_json_artifact(path: &Path, list: &ComponentList) -> Result<(), EmitError> {
    let json = serde_json::to_string_pretty(list)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_list() -> ComponentList {
        ComponentList {
            program: "demo".into(),
            source: None,
            components: Vec::new(),
        }
    }

    #[test]
    fn write_reports_success_as_bool() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(write(dir.path(), "out.txt", "contents"));
        let read = std::fs::read_to_string(dir.path().join("out.txt")).expect("written");
        assert_eq!(read, "contents");
    }

    #[test]
    fn write_reports_failure_as_bool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("no-such-subdir");
        assert!(!write(&missing, "out.txt", "contents"));
    }

    #[test]
    fn json_artifact_round_trips_through_serde() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("components.json");
        write_json_artifact(&path, &empty_list()).expect("emit");
        let raw = std::fs::read_to_string(&path).expect("written");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(value["program"], "demo");
    }
}

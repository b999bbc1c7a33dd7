use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::InferenceError;

/// Class id to display name mapping for detector output.
///
/// Lookup is total: an id with no entry renders as its decimal form, so
/// a checkpoint with more classes than the map never fails a request.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    names: BTreeMap<u32, String>,
}

impl Default for LabelMap {
    fn default() -> Self {
        let names = BTreeMap::from([(1, "Hole".to_string()), (2, "Infected".to_string())]);
        Self { names }
    }
}

impl LabelMap {
    pub fn new(names: BTreeMap<u32, String>) -> Result<Self, InferenceError> {
        if names.is_empty() {
            return Err(InferenceError::EmptyLabelMap);
        }
        Ok(Self { names })
    }

    /// Loads a JSON object of `{"id": "name"}` entries.
    pub fn from_file(path: &Path) -> Result<Self, InferenceError> {
        let raw = fs::read_to_string(path).map_err(|source| InferenceError::LabelMapRead {
            path: path.to_path_buf(),
            source,
        })?;
        let names: BTreeMap<u32, String> = serde_json::from_str(&raw)?;
        Self::new(names)
    }

    pub fn name(&self, id: u32) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Class count the detector head must be built with: one output
    /// column per label plus the background column.
    pub fn num_classes(&self) -> usize {
        self.names.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    /// Tests the built-in label set.
    ///
    /// Tests:
    /// - ids 1 and 2 resolve to the leaf disease names
    /// - an unmapped id falls back to its decimal form
    /// - background adds one to the class count
    #[test]
    fn test_default_labels() {
        let labels = LabelMap::default();

        assert_eq!(labels.name(1), "Hole");
        assert_eq!(labels.name(2), "Infected");
        assert_eq!(labels.name(7), "7");
        assert_eq!(labels.num_classes(), 3);
    }

    #[test]
    fn test_from_file_parses_json_object() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"1": "Scratch", "2": "Dent", "3": "Rust"}}"#).unwrap();

        let labels = LabelMap::from_file(file.path()).unwrap();

        assert_eq!(labels.name(3), "Rust");
        assert_eq!(labels.num_classes(), 4);
    }

    #[test]
    fn test_from_file_rejects_empty_object() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();

        let err = LabelMap::from_file(file.path()).unwrap_err();
        assert!(matches!(err, InferenceError::EmptyLabelMap));
    }

    #[test]
    fn test_from_file_rejects_malformed_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = LabelMap::from_file(file.path()).unwrap_err();
        assert!(matches!(err, InferenceError::LabelMapParse(_)));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = LabelMap::from_file(Path::new("/nonexistent/labels.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/labels.json"));
    }
}

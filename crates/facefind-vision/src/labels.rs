//! Label file loading.

use facefind_models::Labels;
use std::path::Path;
use tracing::debug;

use crate::error::{VisionError, VisionResult};

/// Read a label file: a JSON array of strings, or one label per line.
pub fn load_labels(path: &Path) -> VisionResult<Labels> {
    if !path.exists() {
        return Err(VisionError::ModelNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let labels = Labels::parse(&content)?;

    debug!(path = %path.display(), count = labels.len(), "Loaded labels");
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facefind_models::LabelError;
    use tempfile::TempDir;

    #[test]
    fn test_load_text_labels() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("labels.txt");
        std::fs::write(&path, "Alice\nBob\n").unwrap();

        let labels = load_labels(&path).unwrap();
        assert_eq!(labels.get(0), Some("Alice"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_load_empty_labels() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("labels.json");
        std::fs::write(&path, "[]").unwrap();

        assert!(matches!(
            load_labels(&path),
            Err(VisionError::Labels(LabelError::Empty))
        ));
    }

    #[test]
    fn test_missing_label_file() {
        assert!(matches!(
            load_labels(Path::new("/nonexistent/labels.txt")),
            Err(VisionError::ModelNotFound(_))
        ));
    }
}

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Explicit result of a best-effort delete.
///
/// A missing file is its own benign outcome; a real failure (permissions,
/// I/O) stays visible to the caller instead of being silently dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
    Failed(String),
}

impl DeleteOutcome {
    #[must_use]
    pub fn deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

#[must_use]
pub fn remove_file_best_effort(path: &Path) -> DeleteOutcome {
    match fs::remove_file(path) {
        Ok(()) => DeleteOutcome::Deleted,
        Err(e) if e.kind() == ErrorKind::NotFound => DeleteOutcome::AlreadyAbsent,
        Err(e) => DeleteOutcome::Failed(format!("{}: {e}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn delete_distinguishes_present_and_absent() {
        let tmp = tempdir().expect("tempdir");
        let file = tmp.path().join("x.bin");
        std::fs::write(&file, b"data").expect("write");
        assert_eq!(remove_file_best_effort(&file), DeleteOutcome::Deleted);
        assert_eq!(remove_file_best_effort(&file), DeleteOutcome::AlreadyAbsent);
    }
}

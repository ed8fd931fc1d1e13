use crate::audio::AudioSegment;
use crate::error::PipelineError;
use log::debug;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory for one task's intermediate audio.
///
/// The directory is named after the task id and removed when the workspace is
/// dropped, whichever way the task ends.
pub struct TaskWorkspace {
    dir: TempDir,
}

impl TaskWorkspace {
    /// Create a workspace under `base`, or the system temp directory.
    pub fn create(task_id: &str, base: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("{}_", task_id);
        builder.prefix(&prefix);

        let dir = match base {
            Some(base) => {
                std::fs::create_dir_all(base).map_err(|e| {
                    PipelineError::Workspace(format!("cannot create {}: {}", base.display(), e))
                })?;
                builder.tempdir_in(base)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| PipelineError::Workspace(e.to_string()))?;

        debug!("Task workspace at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Store one chunk's audio as `chunk_NNNN.<ext>`.
    pub fn write_segment(&self, index: usize, extension: &str, audio: &[u8]) -> Result<AudioSegment, PipelineError> {
        let path: PathBuf = self.dir.path().join(format!("chunk_{:04}.{}", index, extension));
        std::fs::write(&path, audio)
            .map_err(|e| PipelineError::Workspace(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(AudioSegment::new(index, path))
    }

    /// Remove the directory now, reporting failure instead of ignoring it.
    pub fn close(self) -> Result<(), PipelineError> {
        self.dir
            .close()
            .map_err(|e| PipelineError::Workspace(format!("cleanup failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_after_task() {
        let base = TempDir::new().unwrap();
        let workspace = TaskWorkspace::create("abc123", Some(base.path())).unwrap();
        let name = workspace.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("abc123_"), "{}", name);
        assert!(workspace.path().starts_with(base.path()));
    }

    #[test]
    fn test_write_segment() {
        let workspace = TaskWorkspace::create("t", None).unwrap();
        let segment = workspace.write_segment(7, "mp3", b"abc").unwrap();
        assert_eq!(segment.index, 7);
        assert!(segment.path.ends_with("chunk_0007.mp3"));
        assert_eq!(std::fs::read(&segment.path).unwrap(), b"abc");
    }

    #[test]
    fn test_removed_on_drop_and_close() {
        let dropped = TaskWorkspace::create("t", None).unwrap();
        let dropped_path = dropped.path().to_path_buf();
        dropped.write_segment(0, "mp3", b"x").unwrap();
        drop(dropped);
        assert!(!dropped_path.exists());

        let closed = TaskWorkspace::create("t", None).unwrap();
        let closed_path = closed.path().to_path_buf();
        closed.close().unwrap();
        assert!(!closed_path.exists());
    }

    #[test]
    fn test_creates_missing_base() {
        let root = TempDir::new().unwrap();
        let base = root.path().join("nested").join("work");
        let workspace = TaskWorkspace::create("t", Some(&base)).unwrap();
        assert!(workspace.path().starts_with(&base));
    }
}

//! Audio concatenation using FFmpeg.

use super::format::AudioFormat;
use super::{AudioAssembler, AudioSegment};
use crate::error::MergeError;
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Joins segments with FFmpeg's concat demuxer (`-c copy`, no re-encode).
///
/// The list file and output are written to a scratch directory beside the
/// segments, so they are cleaned up with the task workspace.
pub struct FfmpegAssembler {
    program: PathBuf,
}

impl FfmpegAssembler {
    /// Use `ffmpeg` from PATH when no program is given.
    pub fn new(program: Option<PathBuf>) -> Self {
        Self {
            program: program.unwrap_or_else(|| PathBuf::from("ffmpeg")),
        }
    }

    /// Check if FFmpeg can be run.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

/// Build the concat demuxer list file contents.
fn concat_list(paths: &[&Path]) -> String {
    let mut list_content = String::new();
    for path in paths {
        // Escape single quotes in path
        let path_str = path.to_string_lossy().replace('\'', "'\\''");
        list_content.push_str(&format!("file '{}'\n", path_str));
    }
    list_content
}

fn output_extension(first: &AudioSegment) -> &'static str {
    std::fs::read(&first.path)
        .ok()
        .and_then(|bytes| AudioFormat::sniff(&bytes))
        .map(|f| f.extension())
        .unwrap_or("mp3")
}

impl AudioAssembler for FfmpegAssembler {
    fn merge(&self, segments: &[AudioSegment]) -> Result<Vec<u8>, MergeError> {
        let Some(first) = segments.first() else {
            return Err(MergeError::NoSegments);
        };

        if segments.len() == 1 {
            return std::fs::read(&first.path).map_err(|e| MergeError::UnreadableSegment {
                index: first.index,
                message: e.to_string(),
            });
        }

        let scratch_parent = first.path.parent().unwrap_or_else(|| Path::new("."));
        let temp_dir = TempDir::new_in(scratch_parent)
            .map_err(|e| MergeError::Ffmpeg(format!("cannot create scratch directory: {}", e)))?;

        let list_file = temp_dir.path().join("concat_list.txt");
        let paths: Vec<&Path> = segments.iter().map(|s| s.path.as_path()).collect();
        std::fs::write(&list_file, concat_list(&paths))
            .map_err(|e| MergeError::Ffmpeg(format!("cannot write concat list: {}", e)))?;

        let output_path = temp_dir
            .path()
            .join(format!("merged.{}", output_extension(first)));

        debug!(
            "Running {} concat over {} segments",
            self.program.display(),
            segments.len()
        );

        let output = Command::new(&self.program)
            .args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_file)
            .args(["-c", "copy"])
            .arg(&output_path)
            .output()
            .map_err(|e| MergeError::Ffmpeg(format!("failed to run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MergeError::Ffmpeg(stderr.trim().to_string()));
        }

        std::fs::read(&output_path)
            .map_err(|e| MergeError::Ffmpeg(format!("cannot read merged output: {}", e)))
    }
}

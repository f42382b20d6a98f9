//! Numbered frame images shared by the frame sink and the reassembler.
//!
//! Frame `n` is stored as `images/{n:06}.jpg`. The reassembler only accepts
//! a directory holding exactly `1..=N` under that scheme.

use image::{ImageFormat, RgbImage};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Digits in a stored frame file name.
pub const FRAME_NUMBER_WIDTH: usize = 6;
/// Extension of stored frames.
pub const FRAME_EXTENSION: &str = "jpg";

/// A validated, contiguous run of stored frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSequence {
    /// Number of frames, stored as `1..=count`
    pub count: u64,
    /// Path of frame 1
    pub first_path: PathBuf,
}

/// Directory of numbered frame images.
#[derive(Debug, Clone)]
pub struct FrameStore {
    dir: PathBuf,
}

impl FrameStore {
    /// Create the directory if needed.
    pub async fn create(dir: impl AsRef<Path>) -> MediaResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Open an existing directory without creating it.
    pub fn open(dir: impl AsRef<Path>) -> MediaResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(MediaError::FileNotFound(dir));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path where frame `frame_number` is stored.
    pub fn frame_path(&self, frame_number: u64) -> PathBuf {
        self.dir.join(frame_file_name(frame_number))
    }

    /// FFmpeg `image2` pattern matching the stored names.
    pub fn input_pattern(&self) -> PathBuf {
        self.dir
            .join(format!("%0{}d.{}", FRAME_NUMBER_WIDTH, FRAME_EXTENSION))
    }

    /// Write one frame as JPEG.
    pub async fn persist(&self, frame_number: u64, pixels: RgbImage) -> MediaResult<PathBuf> {
        if frame_number == 0 {
            return Err(MediaError::frame_sequence("frame numbers start at 1"));
        }

        let path = self.frame_path(frame_number);
        let target = path.clone();
        tokio::task::spawn_blocking(move || pixels.save_with_format(&target, ImageFormat::Jpeg))
            .await
            .map_err(|e| MediaError::internal(format!("frame writer panicked: {}", e)))??;

        Ok(path)
    }

    /// Validate the stored frames and describe the sequence.
    ///
    /// Fails on an empty directory, a gap in the numbering, or any file that
    /// does not follow the naming scheme. The directory is listed on a
    /// blocking thread.
    pub async fn sequence(&self) -> MediaResult<FrameSequence> {
        let dir = self.dir.clone();
        let count = tokio::task::spawn_blocking(move || scan_sequence(&dir))
            .await
            .map_err(|e| MediaError::internal(format!("frame scan panicked: {}", e)))??;

        debug!(dir = %self.dir.display(), count, "Validated frame sequence");

        Ok(FrameSequence {
            count,
            first_path: self.frame_path(1),
        })
    }
}

/// Number of frames in `dir`, which must hold exactly `1..=N`.
fn scan_sequence(dir: &Path) -> MediaResult<u64> {
    let mut numbers = BTreeSet::new();

    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();

        let number = parse_frame_number(&name).ok_or_else(|| {
            MediaError::frame_sequence(format!("unexpected file {} in {}", name, dir.display()))
        })?;
        numbers.insert(number);
    }

    if numbers.is_empty() {
        return Err(MediaError::frame_sequence(format!(
            "no frames in {}",
            dir.display()
        )));
    }

    let count = numbers.len() as u64;
    if let Some(missing) = (1..=count).zip(numbers).find_map(|(expected, actual)| {
        (expected != actual).then_some(expected)
    }) {
        return Err(MediaError::frame_sequence(format!(
            "frame {} is missing from {}",
            missing,
            dir.display()
        )));
    }

    Ok(count)
}

fn frame_file_name(frame_number: u64) -> String {
    format!(
        "{:0width$}.{}",
        frame_number,
        FRAME_EXTENSION,
        width = FRAME_NUMBER_WIDTH
    )
}

/// Frame number encoded in a stored file name.
pub fn parse_frame_number(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(&format!(".{}", FRAME_EXTENSION))?;
    if stem.len() < FRAME_NUMBER_WIDTH || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok().filter(|n| *n > 0)
}

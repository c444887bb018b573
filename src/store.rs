//! Temporary on-disk buffer of captured frames
//!
//! Every session gets its own scope directory inside `<cache>/screengif/`,
//! and the finished GIF is placed next to it.

use crate::error::{CatResult, Error};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "screengif";
const FRAME_EXT: &str = "png";
const PARTIAL_EXT: &str = "part";

/// Resolved `<cache>/screengif` directory
#[derive(Debug, Clone)]
pub struct CacheArea {
    dir: PathBuf,
}

impl CacheArea {
    /// Use `cache_dir` if given, otherwise the user's cache directory.
    ///
    /// Creates `screengif/` inside it if it's not there yet.
    pub fn resolve(cache_dir: Option<&Path>) -> CatResult<Self> {
        let root = match cache_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_cache_root().ok_or(Error::CacheDirectoryNotFound)?,
        };
        let dir = root.join(APP_DIR);
        fs::create_dir_all(&dir).map_err(Error::CacheDirectoryCreateFailed)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claims a new, empty scope for one session, and picks the output path that goes with it.
    ///
    /// `start_time` is in seconds. Scopes are created exclusively, so two sessions
    /// started in the same microsecond still get separate directories.
    pub fn open_session(&self, start_time: f64) -> CatResult<(FrameStore, PathBuf)> {
        let stamp = (start_time * 1_000_000.).round() as u64;
        let mut n = 0_u32;
        loop {
            let name = if n == 0 { stamp.to_string() } else { format!("{stamp}-{n}") };
            let dir = self.dir.join(&name);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    let output = self.dir.join(format!("{name}.gif"));
                    return Ok((FrameStore { dir }, output));
                },
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && n < 1000 => n += 1,
                Err(e) => return Err(Error::TmpDirectoryCreateFailed(e)),
            }
        }
    }
}

fn default_cache_root() -> Option<PathBuf> {
    let non_empty = |v: std::ffi::OsString| if v.is_empty() { None } else { Some(PathBuf::from(v)) };
    std::env::var_os("XDG_CACHE_HOME").and_then(non_empty)
        .or_else(|| std::env::var_os("HOME").and_then(non_empty).map(|home| home.join(".cache")))
}

/// A frame that has been written to the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFrame {
    /// Capture time in seconds
    pub timestamp: f64,
    pub path: PathBuf,
}

/// Frames of a single session, keyed by capture timestamp
#[derive(Debug)]
pub struct FrameStore {
    dir: PathBuf,
}

impl FrameStore {
    /// Use an existing directory as the scope. It should be empty and not shared with anything else.
    #[must_use]
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a frame with this timestamp is stored at. Timestamps are kept with µs precision.
    #[must_use]
    pub fn frame_path(&self, timestamp: f64) -> PathBuf {
        self.dir.join(format!("{timestamp:.6}.{FRAME_EXT}"))
    }

    /// Writes encoded frame data. The file only appears under its final name once fully written.
    pub fn append(&self, timestamp: f64, data: &[u8]) -> CatResult<PathBuf> {
        let path = self.frame_path(timestamp);
        let partial = path.with_extension(PARTIAL_EXT);
        fs::write(&partial, data)
            .and_then(|()| fs::rename(&partial, &path))
            .map_err(|e| {
                let _ = fs::remove_file(&partial);
                Error::StorageWriteFailed(e)
            })?;
        log::debug!("stored frame {}", path.display());
        Ok(path)
    }

    /// All stored frames, oldest first
    pub fn drain_ordered(&self) -> CatResult<Vec<StoredFrame>> {
        let mut frames = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(Error::FileListingFailed)? {
            let path = entry.map_err(Error::FileListingFailed)?.path();
            if path.extension() != Some(OsStr::new(FRAME_EXT)) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse::<f64>().ok()) {
                Some(timestamp) if timestamp.is_finite() => frames.push(StoredFrame { timestamp, path }),
                _ => log::warn!("ignoring unexpected file {}", path.display()),
            }
        }
        frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(frames)
    }

    /// Removes the scope with everything in it. Already gone is fine.
    pub fn reset(&self) -> CatResult<()> {
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Error::CleanupFailed(e)),
            _ => Ok(()),
        }
    }
}

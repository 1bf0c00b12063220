use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rtsp_client::FrameSink;

/// Keeps the most recent frame on disk so a viewer can pick it up.
///
/// Every admitted frame overwrites the file. The file is removed when the
/// cache is dropped.
pub struct FrameCache {
    path: PathBuf,
}

impl FrameCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the cached frame. A missing file is not an error.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl FrameSink for FrameCache {
    fn accept(&self, sequence_number: u16, payload: &[u8]) {
        match fs::write(&self.path, payload) {
            Ok(()) => tracing::debug!(
                seq = sequence_number,
                bytes = payload.len(),
                path = %self.path.display(),
                "frame cached"
            ),
            Err(e) => tracing::warn!(
                seq = sequence_number,
                path = %self.path.display(),
                error = %e,
                "failed to cache frame"
            ),
        }
    }
}

impl Drop for FrameCache {
    fn drop(&mut self) {
        if let Err(e) = self.clear() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove frame cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_frame_wins_and_file_is_removed_on_drop() {
        let path = std::env::temp_dir().join(format!("cache-test-{}.jpg", std::process::id()));
        let cache = FrameCache::new(&path);

        cache.accept(1, b"first");
        cache.accept(2, b"second");
        assert_eq!(fs::read(&path).unwrap(), b"second");

        drop(cache);
        assert!(!path.exists());
    }

    #[test]
    fn clearing_a_missing_file_is_ok() {
        let path = std::env::temp_dir().join(format!("cache-missing-{}.jpg", std::process::id()));
        let cache = FrameCache::new(path);
        assert!(cache.clear().is_ok());
    }
}

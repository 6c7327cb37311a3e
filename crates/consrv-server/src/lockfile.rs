//! Lock files guarding server names and bind points.
//!
//! A lock is a file created with `create_new` in the runtime directory;
//! existence means taken. Acquisition failure is how a second server
//! discovers a name or address collision and moves on to the next
//! candidate. Locks are removed on drop so a clean shutdown frees the
//! name; a crashed process leaves the file behind and the stale name is
//! simply skipped by the retry ladder.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use consrv_types::{ConsrvError, Result};

/// A held lock file, removed on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Create `<runtime_dir>/<stem>.lock`, failing if it already exists.
    pub fn acquire(runtime_dir: &Path, stem: &str) -> Result<Self> {
        fs::create_dir_all(runtime_dir)?;
        let path = runtime_dir.join(format!("{stem}.lock"));
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                log::debug!("acquired lock {}", path.display());
                Ok(Self { path })
            },
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ConsrvError::Transport(
                format!("lock {} already held", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to remove lock {}: {e}", self.path.display());
        }
    }
}

/// Lock stem for an IP bind point, one per transport/host/port triple.
pub(crate) fn ip_stem(transport: &str, host: &str, port: u16) -> String {
    format!("{transport}-{}-{port}", host.replace(':', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_and_drop_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let lock = LockFile::acquire(dir.path(), "tel1").unwrap();
            path = lock.path().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn second_acquire_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _held = LockFile::acquire(dir.path(), "tel1").unwrap();
        assert!(LockFile::acquire(dir.path(), "tel1").is_err());
    }

    #[test]
    fn freed_name_can_be_retaken() {
        let dir = tempfile::tempdir().unwrap();
        drop(LockFile::acquire(dir.path(), "tel1").unwrap());
        assert!(LockFile::acquire(dir.path(), "tel1").is_ok());
    }

    #[test]
    fn missing_runtime_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        assert!(LockFile::acquire(&nested, "tel1").is_ok());
    }

    #[test]
    fn ip_stem_format() {
        assert_eq!(ip_stem("udp", "127.0.0.1", 7501), "udp-127.0.0.1-7501");
        assert_eq!(ip_stem("tcp", "::1", 9000), "tcp-__1-9000");
    }
}

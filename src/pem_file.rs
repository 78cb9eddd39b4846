//! Staged PEM file writes.
//!
//! Every file is first written to a `<name>.tmp` sibling with its final
//! permission mode, flushed, and only then renamed over the target. A staged
//! file that is dropped without being committed is removed, so a failed
//! operation never leaves partial output where a previous good file was.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{io_at, Result};

/// Mode for certificates (world-readable).
pub const PUBLIC_FILE_MODE: u32 = 0o644;
/// Mode for private keys (owner read/write only).
pub const SECRET_FILE_MODE: u32 = 0o600;
/// Mode for directories holding key material.
pub const PRIVATE_DIR_MODE: u32 = 0o700;

pub(crate) struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub(crate) fn write(target: &Path, contents: &[u8], mode: u32) -> Result<Self> {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = target.with_file_name(format!("{}.tmp", file_name));

        // A stale tmp from a crashed run may carry the wrong mode
        if tmp.exists() {
            fs::remove_file(&tmp).map_err(io_at(&tmp))?;
        }

        let staged = StagedFile {
            tmp,
            target: target.to_path_buf(),
            committed: false,
        };

        let mut file = open_with_mode(&staged.tmp, mode)?;
        file.write_all(contents).map_err(io_at(&staged.tmp))?;
        file.sync_all().map_err(io_at(&staged.tmp))?;

        Ok(staged)
    }

    pub(crate) fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.tmp, &self.target).map_err(io_at(&self.target))?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Create `dir` (and parents) and restrict it to the owner.
pub(crate) fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(io_at(dir))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(PRIVATE_DIR_MODE))
            .map_err(io_at(dir))?;
    }

    Ok(())
}

fn open_with_mode(path: &Path, mode: u32) -> Result<fs::File> {
    let mut opts = fs::OpenOptions::new();
    opts.create_new(true).write(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    opts.open(path).map_err(io_at(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cert.pem");
        fs::write(&target, b"old").unwrap();

        let staged = StagedFile::write(&target, b"new", PUBLIC_FILE_MODE).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"old");
        staged.commit().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!dir.path().join("cert.pem.tmp").exists());
    }

    #[test]
    fn dropped_stage_leaves_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("key.pem");
        fs::write(&target, b"previous").unwrap();

        {
            let _staged = StagedFile::write(&target, b"partial", SECRET_FILE_MODE).unwrap();
        }

        assert_eq!(fs::read(&target).unwrap(), b"previous");
        assert!(!dir.path().join("key.pem.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn secret_mode_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ca.key");
        StagedFile::write(&target, b"k", SECRET_FILE_MODE)
            .unwrap()
            .commit()
            .unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}

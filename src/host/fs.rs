//! Local filesystem collaborator.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{chown, MetadataExt, PermissionsExt};
use std::path::Path;

use nix::unistd::{Group, User};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ConvergeError, ConvergeResult};

use super::traits::{FileAttrs, FileSystem};

/// Permission bits compared when converging file modes.
const MODE_MASK: u32 = 0o7777;

/// Filesystem collaborator backed by the local host.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn mkdir_all(&self, path: &Path, owner: &str, group: &str) -> ConvergeResult<bool> {
        let (uid, gid) = resolve_ids(owner, group)?;

        let created = if path.is_dir() {
            false
        } else {
            fs::create_dir_all(path).map_err(|e| ConvergeError::filesystem(path, e))?;
            true
        };

        let meta = fs::metadata(path).map_err(|e| ConvergeError::filesystem(path, e))?;
        let chowned = if meta.uid() != uid || meta.gid() != gid {
            chown(path, Some(uid), Some(gid)).map_err(|e| ConvergeError::filesystem(path, e))?;
            true
        } else {
            false
        };

        if created || chowned {
            info!(path = %path.display(), owner, group, created, "Directory converged");
        }
        Ok(created || chowned)
    }

    fn read_file(&self, path: &Path) -> ConvergeResult<Option<String>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConvergeError::filesystem(path, e)),
        }
    }

    fn write_file(&self, path: &Path, content: &str, attrs: &FileAttrs) -> ConvergeResult<()> {
        let ids = resolve_ids(&attrs.owner, &attrs.group)?;
        write_atomic(path, content, attrs.mode, Some(ids))
    }

    fn set_attrs(&self, path: &Path, attrs: &FileAttrs) -> ConvergeResult<bool> {
        let (uid, gid) = resolve_ids(&attrs.owner, &attrs.group)?;
        let meta = fs::metadata(path).map_err(|e| ConvergeError::filesystem(path, e))?;
        let mut changed = false;

        if meta.mode() & MODE_MASK != attrs.mode {
            fs::set_permissions(path, fs::Permissions::from_mode(attrs.mode))
                .map_err(|e| ConvergeError::filesystem(path, e))?;
            changed = true;
        }
        if meta.uid() != uid || meta.gid() != gid {
            chown(path, Some(uid), Some(gid)).map_err(|e| ConvergeError::filesystem(path, e))?;
            changed = true;
        }

        if changed {
            info!(
                path = %path.display(),
                mode = %format!("{:o}", attrs.mode),
                "File attributes repaired"
            );
        }
        Ok(changed)
    }

    fn rename(&self, from: &Path, to: &Path) -> ConvergeResult<()> {
        fs::rename(from, to).map_err(|e| ConvergeError::filesystem(to, e))
    }

    fn delete_file(&self, path: &Path) -> ConvergeResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "File deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ConvergeError::filesystem(path, e)),
        }
    }
}

/// Write through a uniquely named sibling, then rename over `path`.
///
/// The temp file is created with `O_EXCL` so a pre-planted symlink cannot
/// redirect the write. Mode and ownership are applied before the rename.
pub(crate) fn write_atomic(
    path: &Path,
    content: &str,
    mode: u32,
    ids: Option<(u32, u32)>,
) -> ConvergeResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| ConvergeError::filesystem(parent, e))?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| ConvergeError::filesystem(path, "path has no file name"))?;
    let temp_path = path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    debug!(path = %path.display(), bytes = content.len(), "Writing file");

    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(mode))?;
        if let Some((uid, gid)) = ids {
            chown(&temp_path, Some(uid), Some(gid))?;
        }
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(ConvergeError::filesystem(path, e));
    }
    Ok(())
}

/// Look up numeric ids for an owner and group name.
fn resolve_ids(owner: &str, group: &str) -> ConvergeResult<(u32, u32)> {
    let user = User::from_name(owner)
        .map_err(|e| ConvergeError::filesystem(owner, format!("user lookup failed: {}", e)))?
        .ok_or_else(|| ConvergeError::filesystem(owner, "no such user"))?;
    let group_entry = Group::from_name(group)
        .map_err(|e| ConvergeError::filesystem(group, format!("group lookup failed: {}", e)))?
        .ok_or_else(|| ConvergeError::filesystem(group, "no such group"))?;
    Ok((user.uid.as_raw(), group_entry.gid.as_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn current_owner() -> (String, String) {
        let user = User::from_uid(nix::unistd::getuid()).unwrap().unwrap();
        let group = Group::from_gid(nix::unistd::getgid()).unwrap().unwrap();
        (user.name, group.name)
    }

    fn attrs(mode: u32) -> FileAttrs {
        let (owner, group) = current_owner();
        FileAttrs { owner, group, mode }
    }

    #[test]
    fn test_write_read_roundtrip_with_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.xml");
        let fs = LocalFileSystem::new();

        fs.write_file(&path, "<clickhouse/>\n", &attrs(0o640)).unwrap();

        assert_eq!(fs.read_file(&path).unwrap().as_deref(), Some("<clickhouse/>\n"));
        let mode = std::fs::metadata(&path).unwrap().mode() & MODE_MASK;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        fs.write_file(&dir.path().join("a.xml"), "a", &attrs(0o644)).unwrap();
        fs.write_file(&dir.path().join("a.xml"), "b", &attrs(0o644)).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.xml")]);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(LocalFileSystem::new().read_file(&dir.path().join("nope")).unwrap(), None);
    }

    #[test]
    fn test_mkdir_all_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c");
        let (owner, group) = current_owner();
        let fs = LocalFileSystem::new();

        assert!(fs.mkdir_all(&path, &owner, &group).unwrap());
        assert!(path.is_dir());
        assert!(!fs.mkdir_all(&path, &owner, &group).unwrap());
    }

    #[test]
    fn test_set_attrs_repairs_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.xml");
        let fs = LocalFileSystem::new();
        fs.write_file(&path, "x", &attrs(0o644)).unwrap();

        assert!(fs.set_attrs(&path, &attrs(0o640)).unwrap());
        assert!(!fs.set_attrs(&path, &attrs(0o640)).unwrap());
    }

    #[test]
    fn test_delete_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stale.conf");
        std::fs::write(&path, "x").unwrap();
        let fs = LocalFileSystem::new();

        assert!(fs.delete_file(&path).unwrap());
        assert!(!path.exists());
        assert!(!fs.delete_file(&path).unwrap());
    }

    #[test]
    fn test_unknown_owner() {
        let dir = TempDir::new().unwrap();
        let err = LocalFileSystem::new()
            .mkdir_all(&dir.path().join("x"), "no-such-user-4242", "no-such-group-4242")
            .unwrap_err();
        assert!(err.is_collaborator());
    }
}

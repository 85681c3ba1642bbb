//! Render-compare-stage-verify-commit for managed files.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConvergeError, ConvergeResult};
use crate::host::{FileAttrs, Host};

/// Converge `path` to `content`.
///
/// Identical content is a no-op apart from repairing owner, group and mode.
/// Otherwise the content is staged in a hidden sibling. With `verify_with`
/// set, the staged file is checked by running that binary against it, and
/// only a passing candidate is renamed over `path`. A rejected candidate is
/// removed and the committed file is left untouched.
///
/// Returns `true` when the host changed.
pub fn converge_file(
    host: &Host<'_>,
    path: &Path,
    content: &str,
    attrs: &FileAttrs,
    verify_with: Option<&Path>,
) -> ConvergeResult<bool> {
    if host.fs.read_file(path)?.as_deref() == Some(content) {
        debug!(path = %path.display(), "File content up to date");
        return host.fs.set_attrs(path, attrs);
    }

    let Some(generic_bin) = verify_with else {
        host.fs.write_file(path, content, attrs)?;
        info!(path = %path.display(), bytes = content.len(), "File updated");
        return Ok(true);
    };

    let staged = staged_path(path)?;
    host.fs.write_file(&staged, content, attrs)?;

    let committed = host
        .verifier
        .verify(generic_bin, &staged)
        .and_then(|()| host.fs.rename(&staged, path));

    if let Err(e) = committed {
        discard(host, &staged);
        return Err(e);
    }

    info!(path = %path.display(), bytes = content.len(), "File verified and updated");
    Ok(true)
}

/// `.<name>.<uuid>.staged` next to `path`.
fn staged_path(path: &Path) -> ConvergeResult<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ConvergeError::filesystem(path, "path has no file name"))?;
    Ok(path.with_file_name(format!(
        ".{}.{}.staged",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    )))
}

fn discard(host: &Host<'_>, staged: &Path) {
    if let Err(e) = host.fs.delete_file(staged) {
        warn!(path = %staged.display(), error = %e, "Failed to remove staged file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_path_is_hidden_sibling() {
        let staged = staged_path(Path::new("/etc/ch/ch/config.xml")).unwrap();
        assert_eq!(staged.parent(), Some(Path::new("/etc/ch/ch")));
        let name = staged.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".config.xml."));
        assert!(name.ends_with(".staged"));
    }

    #[test]
    fn test_staged_paths_are_unique() {
        let path = Path::new("/etc/ch/ch/config.xml");
        assert_ne!(staged_path(path).unwrap(), staged_path(path).unwrap());
    }
}

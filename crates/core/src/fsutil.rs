//! Small filesystem helpers shared by the provisioning layers

use std::fs;
use std::io;
use std::path::Path;

/// Alias `link` to `target`, creating intermediate directories as needed.
///
/// Callers depend on "a path that resolves to the shared content", not on a
/// symbolic link specifically: on platforms without symlink support the
/// content is copied instead. Existing aliases are left alone, so repeated
/// runs are idempotent.
pub fn link_or_copy(target: &Path, link: &Path) -> io::Result<()> {
    if link.exists() || link.is_symlink() {
        return Ok(());
    }
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    make_link(target, link)
}

/// Like [`link_or_copy`], but a stale non-symlink entry left by a previous
/// manual setup is deleted and replaced.
pub fn symlink_replacing(target: &Path, link: &Path) -> io::Result<()> {
    if link.is_symlink() {
        fs::remove_file(link)?;
    } else if link.is_dir() {
        fs::remove_dir_all(link)?;
    } else if link.exists() {
        fs::remove_file(link)?;
    }
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    make_link(target, link)
}

#[cfg(unix)]
fn make_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_link(target: &Path, link: &Path) -> io::Result<()> {
    // Relative targets are resolved against the link location, matching
    // symlink semantics.
    let resolved = match (target.is_relative(), link.parent()) {
        (true, Some(parent)) => parent.join(target),
        _ => target.to_path_buf(),
    };
    if resolved.is_dir() {
        copy_tree(&resolved, link)
    } else {
        fs::copy(&resolved, link).map(|_| ())
    }
}

#[cfg(not(unix))]
fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Mark a bootstrap script executable. No-op where the permission model
/// does not apply.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_link_or_copy_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target.jar");
        fs::write(&target, "jar bytes").unwrap();
        let link = temp.path().join("dist/alias.jar");

        link_or_copy(&target, &link).unwrap();
        link_or_copy(&target, &link).unwrap();

        assert_eq!(fs::read_to_string(&link).unwrap(), "jar bytes");
    }

    #[test]
    fn test_symlink_replacing_removes_stale_directory() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("real");
        fs::create_dir_all(target.join("sub")).unwrap();
        fs::write(target.join("sub/file.txt"), "shared").unwrap();

        // Stale directory with dummy content at the link location.
        let link = temp.path().join("plugin/db4o-7.4/src");
        fs::create_dir_all(&link).unwrap();
        fs::write(link.join("dummy.txt"), "stale").unwrap();

        symlink_replacing(&target, &link).unwrap();
        assert_eq!(
            fs::read_to_string(link.join("sub/file.txt")).unwrap(),
            "shared"
        );
        assert!(!link.join("dummy.txt").exists());
    }
}

// ABOUTME: Filesystem helpers for release directories.
// ABOUTME: Recursive copy preserving modes and forced deletion that overrides read-only entries.

use std::fs;
use std::io;
use std::path::Path;

/// Recursively copies `src` into `dst`, preserving file modes and recreating
/// symlinks. `dst` is created if missing.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let source = entry.path();
        let target = dst.join(entry.file_name());
        let meta = fs::symlink_metadata(&source)?;

        if meta.file_type().is_symlink() {
            let link_target = fs::read_link(&source)?;
            symlink::symlink_auto(&link_target, &target)?;
        } else if meta.is_dir() {
            copy_dir_recursive(&source, &target)?;
        } else {
            fs::copy(&source, &target)?;
        }
    }
    Ok(())
}

/// Removes a directory tree, overriding read-only permissions along the way.
/// Succeeds silently if `path` does not exist.
pub fn remove_dir_all_force(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) => remove_entry(path, &meta),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn remove_entry(path: &Path, meta: &fs::Metadata) -> io::Result<()> {
    if meta.file_type().is_symlink() || !meta.is_dir() {
        return fs::remove_file(path);
    }

    make_traversable(path)?;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let child = entry.path();
        let child_meta = fs::symlink_metadata(&child)?;
        remove_entry(&child, &child_meta)?;
    }
    fs::remove_dir(path)
}

#[cfg(unix)]
fn make_traversable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_traversable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

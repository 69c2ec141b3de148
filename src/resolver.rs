use crate::builtin::Registry;
use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::task::Target;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolve a command name the way this shell does.
///
/// Tries, in order:
/// 1. a built-in registered under `name`;
/// 2. `name` itself as a path (relative names are taken from the shell's current
///    directory) to an executable regular file;
/// 3. each directory of `PATH`, left to right, listing its entries and taking the
///    first one called exactly `name` that is an executable regular file.
///
/// Matching is case-sensitive and no extension is ever appended.
pub fn resolve(registry: &Registry, env: &Environment, name: &str) -> Result<Target> {
    if let Some(builtin) = registry.get(name) {
        tracing::debug!(name, "resolved to built-in");
        return Ok(Target::Builtin(builtin));
    }

    let direct = env.resolve_path(name);
    if is_executable(&direct) {
        tracing::debug!(name, path = %direct.display(), "resolved as path");
        return Ok(Target::External(direct));
    }

    let search_paths = env.get_var("PATH").unwrap_or_default();
    match find_in_path(OsStr::new(&search_paths), OsStr::new(name)) {
        Some(path) => {
            tracing::debug!(name, path = %path.display(), "resolved on search path");
            Ok(Target::External(path))
        }
        None => Err(ShellError::CommandNotFound(name.to_string())),
    }
}

/// Look for `cmd` among the entries of each directory in the colon-separated
/// `search_paths`. Empty entries and directories that can't be listed are skipped.
pub fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    if cmd.is_empty() {
        return None;
    }
    for dir in std::env::split_paths(search_paths) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "skipping search directory");
                continue;
            }
        };
        let listed = entries
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().as_os_str() == cmd);
        if listed {
            let path = dir.join(cmd);
            if is_executable(&path) {
                return Some(path);
            }
        }
    }
    None
}

/// A regular file (after following symlinks) with at least one execute bit set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
}

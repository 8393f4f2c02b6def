//! Static file fallback under the web root.
//!
//! # Design Decisions
//! - Paths with `..` components or NUL bytes are refused before touching the disk
//! - The canonical target must stay inside the canonical web root, so symlinks
//!   pointing outside are refused as well; the directory index gets the same check
//! - The directory index must be a plain file name inside the requested directory
//! - Refusals look like a missing file to the client (404)

use std::path::{Path, PathBuf};

/// Map a decoded request path to a servable file, if there is one.
///
/// Directories resolve to `dir_index` inside them when that file exists.
pub fn resolve(web_root: &Path, dir_index: &str, request_path: &str) -> Option<PathBuf> {
    if !is_safe_path(request_path) {
        tracing::debug!(path = %request_path, "Refusing unsafe static path");
        return None;
    }

    let root = web_root.canonicalize().ok()?;
    let canonical = inside_root(&root, &root.join(request_path.trim_start_matches('/')), request_path)?;

    if canonical.is_dir() {
        if !is_file_name(dir_index) {
            tracing::debug!(dir_index = %dir_index, "Directory index is not a plain file name");
            return None;
        }
        let index = inside_root(&root, &canonical.join(dir_index), request_path)?;
        return index.is_file().then_some(index);
    }
    canonical.is_file().then_some(canonical)
}

/// Canonicalize `candidate` and keep it only if it stays under `root`.
fn inside_root(root: &Path, candidate: &Path, request_path: &str) -> Option<PathBuf> {
    let canonical = candidate.canonicalize().ok()?;
    if !canonical.starts_with(root) {
        tracing::debug!(path = %request_path, "Static path escapes the web root");
        return None;
    }
    Some(canonical)
}

fn is_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

fn is_safe_path(path: &str) -> bool {
    if path.contains('\0') {
        return false;
    }
    !path.split(['/', '\\']).any(|component| component == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn web_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("subdir")).unwrap();
        fs::write(dir.path().join("subdir/file1.txt"), "file one").unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();
        dir
    }

    #[test]
    fn existing_file_resolves() {
        let root = web_root();
        let found = resolve(root.path(), "index.html", "/subdir/file1.txt").unwrap();
        assert_eq!(fs::read_to_string(found).unwrap(), "file one");
    }

    #[test]
    fn directory_serves_index() {
        let root = web_root();
        let found = resolve(root.path(), "index.html", "/docs").unwrap();
        assert!(found.ends_with("docs/index.html"));
        assert!(resolve(root.path(), "index.html", "/subdir").is_none());
    }

    #[test]
    fn missing_file_is_none() {
        let root = web_root();
        assert!(resolve(root.path(), "index.html", "/nope.txt").is_none());
    }

    #[test]
    fn traversal_is_refused() {
        let root = web_root();
        let outside = root.path().parent().unwrap().join("outside-secret.txt");
        let _ = fs::write(&outside, "secret");

        assert!(resolve(root.path(), "index.html", "/../outside-secret.txt").is_none());
        assert!(resolve(root.path(), "index.html", "/subdir/../../outside-secret.txt").is_none());
        let _ = fs::remove_file(outside);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_is_refused() {
        let root = web_root();
        let elsewhere = tempfile::tempdir().unwrap();
        fs::write(elsewhere.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(elsewhere.path().join("secret.txt"), root.path().join("link.txt")).unwrap();

        assert!(resolve(root.path(), "index.html", "/link.txt").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn index_symlink_out_of_root_is_refused() {
        let root = web_root();
        let elsewhere = tempfile::tempdir().unwrap();
        fs::write(elsewhere.path().join("secret.html"), "secret").unwrap();
        fs::create_dir_all(root.path().join("site")).unwrap();
        std::os::unix::fs::symlink(elsewhere.path().join("secret.html"), root.path().join("site/index.html")).unwrap();

        assert!(resolve(root.path(), "index.html", "/site").is_none());
        assert!(resolve(root.path(), "index.html", "/site/").is_none());
    }

    #[test]
    fn index_name_cannot_leave_the_directory() {
        let root = web_root();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("hostname"), "secret").unwrap();
        let escape = format!("../../../../../../../..{}", outside.path().join("hostname").display());

        assert!(resolve(root.path(), &escape, "/docs").is_none());
        assert!(resolve(root.path(), "../subdir/file1.txt", "/docs").is_none());
        assert!(resolve(root.path(), "..", "/docs").is_none());
    }
}

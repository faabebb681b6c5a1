use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The requested name escapes the root directory
    #[error("access denied")]
    AccessDenied,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A canonicalized base directory every file lookup is confined to.
/// Served downloads resolve inside it, received uploads land inside it.
#[derive(Debug, Clone)]
pub struct RootDir {
    base: PathBuf,
}

impl RootDir {
    /// Create the directory if needed and pin its canonical path
    pub fn open(path: &Path) -> io::Result<Self> {
        fs::create_dir_all(path)?;
        Ok(Self {
            base: path.canonicalize()?,
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a requested name to an absolute path inside the root.
    /// `..` components are collapsed lexically first (popping past the
    /// root is denied), then symlinks are resolved for existing paths,
    /// and the result must still sit under the base.
    pub fn resolve(&self, candidate: &str) -> Result<PathBuf, ResolveError> {
        let unified = candidate.replace('\\', "/");

        let mut safe = PathBuf::new();
        for component in Path::new(&unified).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => safe.push(part),
                Component::ParentDir => {
                    if !safe.pop() {
                        return Err(ResolveError::AccessDenied);
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ResolveError::AccessDenied);
                }
            }
        }

        let joined = self.base.join(safe);
        let real = match joined.canonicalize() {
            Ok(path) => path,
            // Nonexistent targets keep the lexical path so the caller
            // can report "not found" instead of "denied"
            Err(e) if e.kind() == io::ErrorKind::NotFound => joined,
            Err(e) => return Err(ResolveError::Io(e)),
        };

        if real.starts_with(&self.base) {
            Ok(real)
        } else {
            Err(ResolveError::AccessDenied)
        }
    }
}

/// Reduce an upload name to a plain filename: everything up to the last
/// separator (either style) is dropped. `None` means the argument holds
/// no usable filename at all.
pub fn bare_name(arg: &str) -> Option<String> {
    let unified = arg.replace('\\', "/");
    let name = unified.rsplit('/').next().unwrap_or("").trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn root_with_file(name: &str, contents: &[u8]) -> (TempDir, RootDir) {
        let dir = TempDir::new().unwrap();
        let mut file = File::create(dir.path().join(name)).unwrap();
        file.write_all(contents).unwrap();
        let root = RootDir::open(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_resolves_plain_names() {
        let (_dir, root) = root_with_file("hello.txt", b"hi");
        let path = root.resolve("hello.txt").unwrap();
        assert!(path.is_file());
        assert!(path.starts_with(root.base()));
    }

    #[test]
    fn test_missing_file_resolves_without_error() {
        let (_dir, root) = root_with_file("hello.txt", b"hi");
        let path = root.resolve("nope.txt").unwrap();
        assert!(!path.exists());
        assert!(path.starts_with(root.base()));
    }

    #[test]
    fn test_interior_dotdot_is_collapsed() {
        let (_dir, root) = root_with_file("hello.txt", b"hi");
        let path = root.resolve("sub/../hello.txt").unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_traversal_is_denied() {
        let (_dir, root) = root_with_file("hello.txt", b"hi");
        for escape in ["../secret", "../../etc/passwd", "a/../../../x", "/etc/passwd"] {
            match root.resolve(escape) {
                Err(ResolveError::AccessDenied) => {}
                other => panic!("{:?} should be denied, got {:?}", escape, other),
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_denied() {
        let outside = TempDir::new().unwrap();
        File::create(outside.path().join("secret.txt")).unwrap();

        let (dir, root) = root_with_file("hello.txt", b"hi");
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            dir.path().join("link.txt"),
        )
        .unwrap();

        match root.resolve("link.txt") {
            Err(ResolveError::AccessDenied) => {}
            other => panic!("symlink escape should be denied, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_name_strips_directories() {
        assert_eq!(bare_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(bare_name("a/b/report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(
            bare_name("a/b/../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(bare_name("c:\\temp\\notes.txt").as_deref(), Some("notes.txt"));
        assert_eq!(bare_name("/etc/shadow").as_deref(), Some("shadow"));
    }

    #[test]
    fn test_bare_name_rejects_nameless_args() {
        for arg in ["", "dir/", ".", "..", "a/.."] {
            assert_eq!(bare_name(arg), None, "arg {:?}", arg);
        }
    }
}

use anyhow::{anyhow, Result};
use std::fs::File;
use std::path::{Component, Path, PathBuf};

pub fn open(path: &Path, kind: &str) -> Result<File> {
    match File::open(path) {
        Err(e) => Err(anyhow!("Opening {} file `{}`: {}", kind, path.display(), e)),
        Ok(file) => Ok(file),
    }
}

/// Returns true iff `path` is `dir` or lies within `dir`. Both paths are
/// canonicalized when possible so that symlinks and `..` don't fool the
/// comparison.
pub fn path_in_eq_dir(path: &Path, dir: &Path) -> bool {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_owned());
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_owned());
    path.starts_with(dir)
}

/// Lexically resolves `.` and `..` components of a relative path. Returns
/// `None` if the path is absolute or climbs above its starting point.
pub fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::Normal(part) => normalized.push(part),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(normalized)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_normalize_relative() {
        assert_eq!(
            Some(PathBuf::from("items/notes/a.html")),
            normalize_relative(Path::new("items/./drafts/../notes/a.html"))
        );
        assert_eq!(None, normalize_relative(Path::new("../outside.html")));
        assert_eq!(None, normalize_relative(Path::new("/etc/passwd")));
    }

    #[test]
    fn test_path_in_eq_dir() {
        assert!(path_in_eq_dir(Path::new("/site/build"), Path::new("/site/build")));
        assert!(path_in_eq_dir(
            Path::new("/site/build/index.html"),
            Path::new("/site/build")
        ));
        assert!(!path_in_eq_dir(
            Path::new("/site/builder/index.html"),
            Path::new("/site/build")
        ));
    }
}

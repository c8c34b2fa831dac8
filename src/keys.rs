//! Mapping between local save files and object keys.
//!
//! Keys have the stable shape `slug/rootDirName/relative/path`, always with
//! forward slashes regardless of the host separator.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::game::GameIdentity;

/// Key separator used by every S3-compatible store.
pub const KEY_DELIMITER: char = '/';

/// Maps paths under one save root to keys under one game prefix, and back.
#[derive(Debug, Clone)]
pub struct KeyMapper {
    root: PathBuf,
    prefix: String,
}

impl KeyMapper {
    /// Build the mapper for `root`, whose key prefix is `slug/baseName(root)`.
    pub fn new(game: &GameIdentity, root: &Path) -> Result<Self> {
        let prefix = key_prefix(game.slug(), root)?;
        Ok(Self {
            root: root.to_path_buf(),
            prefix,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key for a local file, which must live under the root. Names that are
    /// not valid UTF-8 have no faithful key and are rejected.
    pub fn to_object_key(&self, local_path: &Path) -> Result<String> {
        let rel = local_path
            .strip_prefix(&self.root)
            .map_err(|_| self.path_error(local_path))?;

        let mut key = self.prefix.clone();
        let mut segments = 0usize;
        for component in rel.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| SyncError::NonUtf8Path {
                        path: local_path.to_path_buf(),
                    })?;
                    key.push(KEY_DELIMITER);
                    key.push_str(part);
                    segments += 1;
                }
                Component::CurDir => {}
                _ => return Err(self.path_error(local_path)),
            }
        }

        if segments == 0 {
            return Err(self.path_error(local_path));
        }
        Ok(key)
    }

    /// Local destination for a key, which must start with the prefix.
    pub fn to_local_path(&self, key: &str) -> Result<PathBuf> {
        let rest = key
            .strip_prefix(self.prefix.as_str())
            .and_then(|r| r.strip_prefix(KEY_DELIMITER))
            .ok_or_else(|| SyncError::ForeignKey {
                key: key.to_string(),
                prefix: self.prefix.clone(),
            })?;

        let mut path = self.root.clone();
        let mut segments = 0usize;
        for segment in rest.split(KEY_DELIMITER) {
            match segment {
                "" | "." => {}
                ".." => return Err(invalid_key(key, "path traversal not allowed")),
                s if is_host_separator_in(s) || Path::new(s).has_root() => {
                    return Err(invalid_key(key, "segment is not a plain file name"))
                }
                s => {
                    path.push(s);
                    segments += 1;
                }
            }
        }

        if segments == 0 {
            return Err(invalid_key(key, "key names the prefix itself"));
        }
        Ok(path)
    }

    fn path_error(&self, path: &Path) -> SyncError {
        SyncError::Path {
            path: path.to_path_buf(),
            root: self.root.clone(),
        }
    }
}

/// `slug/baseName(root)`.
pub fn key_prefix(slug: &str, root: &Path) -> Result<String> {
    let base = root.file_name().ok_or_else(|| {
        SyncError::Config(format!(
            "save directory {} has no final path component",
            root.display()
        ))
    })?;
    let base = base.to_str().ok_or_else(|| SyncError::NonUtf8Path {
        path: root.to_path_buf(),
    })?;
    Ok(format!("{}{}{}", slug, KEY_DELIMITER, base))
}

/// Backslash is an ordinary file name character on Unix and a separator on
/// Windows.
fn is_host_separator_in(segment: &str) -> bool {
    cfg!(windows) && segment.contains('\\')
}

fn invalid_key(key: &str, reason: &str) -> SyncError {
    SyncError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mapper(root: &str) -> KeyMapper {
        KeyMapper::new(&GameIdentity::new("My Game"), Path::new(root)).unwrap()
    }

    #[test]
    fn test_prefix_uses_slug_and_root_basename() {
        assert_eq!(mapper("/home/me/saves/SaveData").prefix(), "my-game/SaveData");
        assert_eq!(mapper("/home/me/saves/SaveData/").prefix(), "my-game/SaveData");
    }

    #[test]
    fn test_to_object_key() {
        let m = mapper("/data/slot");
        assert_eq!(
            m.to_object_key(Path::new("/data/slot/a.txt")).unwrap(),
            "my-game/slot/a.txt"
        );
        assert_eq!(
            m.to_object_key(Path::new("/data/slot/b/c.txt")).unwrap(),
            "my-game/slot/b/c.txt"
        );
    }

    #[test]
    fn test_to_object_key_outside_root() {
        let m = mapper("/data/slot");
        assert!(matches!(
            m.to_object_key(Path::new("/data/other/a.txt")),
            Err(SyncError::Path { .. })
        ));
        assert!(matches!(
            m.to_object_key(Path::new("/data/slot")),
            Err(SyncError::Path { .. })
        ));
        assert!(matches!(
            m.to_object_key(Path::new("/data/slot/../escape.txt")),
            Err(SyncError::Path { .. })
        ));
    }

    #[test]
    fn test_to_local_path() {
        let m = mapper("/restore/slot");
        assert_eq!(
            m.to_local_path("my-game/slot/b/c.txt").unwrap(),
            PathBuf::from("/restore/slot/b/c.txt")
        );
    }

    #[test]
    fn test_to_local_path_rejects_foreign_keys() {
        let m = mapper("/restore/slot");
        assert!(matches!(
            m.to_local_path("other-game/slot/a.txt"),
            Err(SyncError::ForeignKey { .. })
        ));
        // Sibling directory sharing a string prefix is not part of this tree.
        assert!(matches!(
            m.to_local_path("my-game/slot2/a.txt"),
            Err(SyncError::ForeignKey { .. })
        ));
        assert!(matches!(
            m.to_local_path("my-game/slot/"),
            Err(SyncError::InvalidKey { .. })
        ));
        assert!(matches!(
            m.to_local_path("my-game/slot/../../etc/passwd"),
            Err(SyncError::InvalidKey { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_have_no_key() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let m = mapper("/data/slot");
        let a = Path::new("/data/slot").join(OsStr::from_bytes(b"a\xff.sav"));
        let b = Path::new("/data/slot").join(OsStr::from_bytes(b"a\xfe.sav"));
        assert!(matches!(m.to_object_key(&a), Err(SyncError::NonUtf8Path { .. })));
        assert!(matches!(m.to_object_key(&b), Err(SyncError::NonUtf8Path { .. })));

        let root = Path::new("/data").join(OsStr::from_bytes(b"sl\xffot"));
        assert!(matches!(
            KeyMapper::new(&GameIdentity::new("My Game"), &root),
            Err(SyncError::NonUtf8Path { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_is_a_plain_character() {
        let m = mapper("/data/slot");
        let local = Path::new("/data/slot/slot\\1.sav");
        let key = m.to_object_key(local).unwrap();
        assert_eq!(key, "my-game/slot/slot\\1.sav");
        assert_eq!(m.to_local_path(&key).unwrap(), local);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            segments in prop::collection::vec("[A-Za-z0-9_ -]{1,12}(\\.[a-z]{1,4})?", 1..5)
        ) {
            let m = mapper("/srv/saves/root");
            let mut local = PathBuf::from("/srv/saves/root");
            for s in &segments {
                local.push(s);
            }

            let key = m.to_object_key(&local).unwrap();
            prop_assert!(key.starts_with("my-game/root/"));
            prop_assert_eq!(m.to_local_path(&key).unwrap(), local);
        }
    }
}

//! Lazy enumeration of the regular files under a save root.

use std::io;
use std::path::PathBuf;

use ignore::{Walk, WalkBuilder};

use crate::error::{Result, SyncError};

/// Walks one directory tree. Every call to [`PathWalker::walk`] starts a
/// fresh traversal.
#[derive(Debug, Clone)]
pub struct PathWalker {
    root: PathBuf,
}

impl PathWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Start a traversal. Fails immediately if the root is missing or is not
    /// a directory.
    pub fn walk(&self) -> Result<FileWalk> {
        let meta = std::fs::metadata(&self.root).map_err(|e| self.walk_error(e))?;
        if !meta.is_dir() {
            return Err(self.walk_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "save root is not a directory",
            )));
        }

        // Save trees are copied verbatim: no ignore files, no hidden-file
        // filtering, symlinks are not followed.
        let inner = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .build();

        Ok(FileWalk {
            root: self.root.clone(),
            inner,
            failed: false,
        })
    }

    fn walk_error(&self, source: io::Error) -> SyncError {
        SyncError::Walk {
            root: self.root.clone(),
            source,
        }
    }
}

/// Iterator over absolute paths of regular files. Yields at most one error,
/// after which it is exhausted.
pub struct FileWalk {
    root: PathBuf,
    inner: Walk,
    failed: bool,
}

impl Iterator for FileWalk {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        for entry in self.inner.by_ref() {
            match entry {
                Ok(entry) => {
                    // Directories, symlinks, sockets and devices are not
                    // transferable.
                    if entry.file_type().is_some_and(|ft| ft.is_file()) {
                        return Some(Ok(entry.into_path()));
                    }
                }
                Err(err) => {
                    self.failed = true;
                    let msg = err.to_string();
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, msg));
                    tracing::error!("walk of {} failed: {}", self.root.display(), source);
                    return Some(Err(SyncError::Walk {
                        root: self.root.clone(),
                        source,
                    }));
                }
            }
        }
        None
    }
}

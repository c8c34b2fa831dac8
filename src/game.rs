//! Game identity and the save tree a sync run operates on.

use std::fmt;
use std::path::{Path, PathBuf};

/// Display name plus the slug used as the top-level key namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameIdentity {
    name: String,
    slug: String,
}

impl GameIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let slug = slug::slugify(&name);
        Self { name, slug }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercase, ASCII, hyphen-separated form of the name.
    pub fn slug(&self) -> &str {
        &self.slug
    }
}

impl fmt::Display for GameIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A tracked game: who it is, which platform the entry belongs to, and where
/// its saves live locally.
#[derive(Debug, Clone)]
pub struct Game {
    pub identity: GameIdentity,
    pub platform: String,
    pub save_root: PathBuf,
}

impl Game {
    pub fn new(
        name: impl Into<String>,
        platform: impl Into<String>,
        save_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identity: GameIdentity::new(name),
            platform: platform.into(),
            save_root: save_root.into(),
        }
    }

    pub fn save_root(&self) -> &Path {
        &self.save_root
    }

    /// Whether the platform tag names the OS this binary runs on.
    pub fn matches_current_platform(&self) -> bool {
        let tag = self.platform.to_ascii_lowercase();
        match std::env::consts::OS {
            "macos" => matches!(tag.as_str(), "macos" | "darwin" | "osx" | "mac"),
            "windows" => matches!(tag.as_str(), "windows" | "win" | "win32"),
            os => tag == os,
        }
    }
}

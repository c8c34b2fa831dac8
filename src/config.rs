//! JSON configuration: tracked games and object store connection.
//!
//! Lives at `<config dir>/savepoint/config.json` unless overridden. Loaded
//! once at startup and passed down by reference.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::game::{Game, GameIdentity};

pub const CONFIG_DIR_NAME: &str = "savepoint";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub games: Vec<GameConfig>,
    pub bucket: BucketConfig,
}

/// One tracked game on one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GameConfig {
    pub name: String,
    pub os: String,
    pub save_dir: String,
}

/// Connection parameters for the S3-compatible store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BucketConfig {
    /// `host[:port]`, a full URL, or `file:///dir` for a local directory store
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_secure")]
    pub secure: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_secure() -> bool {
    true
}

impl Config {
    /// `<config dir>/savepoint/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            SyncError::Config("cannot determine the user configuration directory".to_string())
        })?;
        Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Read, validate and preprocess the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!("config path is {}", path.display());
        let content = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(content)
            .map_err(|e| SyncError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        config.expand_paths();
        Ok(config)
    }

    /// Required fields are present and no two games share a name or slug.
    pub fn validate(&self) -> Result<()> {
        let b = &self.bucket;
        require("bucket.endpoint", &b.endpoint)?;
        require("bucket.accessKey", &b.access_key)?;
        require("bucket.secretKey", &b.secret_key)?;
        require("bucket.bucket", &b.bucket)?;

        let mut entries: HashSet<(&str, String)> = HashSet::new();
        let mut slugs: HashMap<String, usize> = HashMap::new();
        for (i, game) in self.games.iter().enumerate() {
            require(&format!("games[{}].name", i), &game.name)?;
            require(&format!("games[{}].os", i), &game.os)?;
            require(&format!("games[{}].saveDir", i), &game.save_dir)?;

            // The same game may appear once per platform.
            if !entries.insert((game.name.as_str(), game.os.to_ascii_lowercase())) {
                return Err(SyncError::Config(format!(
                    "games[{}] repeats {:?} for os {:?}",
                    i, game.name, game.os
                )));
            }

            let slug = GameIdentity::new(&game.name).slug().to_string();
            if slug.is_empty() {
                return Err(SyncError::Config(format!(
                    "games[{}].name {:?} has no usable characters for a key prefix",
                    i, game.name
                )));
            }
            if let Some(prev) = slugs.insert(slug.clone(), i) {
                if self.games[prev].name != game.name {
                    return Err(SyncError::Config(format!(
                        "games[{}] {:?} and games[{}] {:?} map to the same key prefix {:?}",
                        prev, self.games[prev].name, i, game.name, slug
                    )));
                }
            }
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        for game in &mut self.games {
            game.save_dir = expand_path(&game.save_dir).to_string_lossy().into_owned();
        }
    }

    pub fn games(&self) -> impl Iterator<Item = Game> + '_ {
        self.games
            .iter()
            .map(|g| Game::new(&g.name, &g.os, &g.save_dir))
    }

    /// Resolve a game by zero-based index, exact name, or slug. Entries for
    /// the running platform win when a name is listed for several.
    pub fn game(&self, selector: &str) -> Result<Game> {
        if let Ok(index) = selector.parse::<usize>() {
            if let Some(game) = self.games().nth(index) {
                return Ok(game);
            }
        }

        let mut matches: Vec<Game> = self
            .games()
            .filter(|g| g.identity.name() == selector || g.identity.slug() == selector)
            .collect();

        if let Some(pos) = matches.iter().position(|g| g.matches_current_platform()) {
            return Ok(matches.swap_remove(pos));
        }
        matches
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::Config(format!("no game matches {:?}", selector)))
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(SyncError::Config(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

/// Expand `$VAR`, `${VAR}` and a leading `~` in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = expand_env(raw, |name| std::env::var(name).ok());
    expand_tilde(Path::new(&expanded))
}

fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str == "~" {
        dirs::home_dir().unwrap_or_else(|| path.to_path_buf())
    } else if let Some(rest) = path_str
        .strip_prefix("~/")
        .or_else(|| path_str.strip_prefix("~\\"))
    {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        }
    } else {
        path.to_path_buf()
    }
}

/// Unset variables expand to the empty string.
fn expand_env(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                out.push_str(&lookup(&braced[..end]).unwrap_or_default());
                rest = &braced[end + 1..];
                continue;
            }
        }

        let len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if len == 0 {
            out.push('$');
            rest = after;
        } else {
            out.push_str(&lookup(&after[..len]).unwrap_or_default());
            rest = &after[len..];
        }
    }
    out.push_str(rest);
    out
}

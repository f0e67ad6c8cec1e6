//! Character registry for the banter relay.
//!
//! Characters live on disk as one directory per character containing a
//! `config.json` (`{name, voice, images, instructions?}`). The registry
//! loads them at startup, serves lookups, and persists instruction edits
//! back to the owning file — the rest of the system never touches the files
//! directly.

use banter_types::{Character, CharacterSummary};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum CharacterError {
    #[error("character not found: {0}")]
    NotFound(String),

    #[error("failed to read characters directory {dir}: {source}")]
    DirRead {
        dir: String,
        source: std::io::Error,
    },

    #[error("failed to write config for character {key}: {source}")]
    ConfigWrite {
        key: String,
        source: std::io::Error,
    },

    #[error("failed to serialize config for character {key}: {source}")]
    ConfigSerialize {
        key: String,
        source: serde_json::Error,
    },
}

/// In-memory view of the on-disk character directory.
#[derive(Debug)]
pub struct CharacterRegistry {
    dir: PathBuf,
    characters: BTreeMap<String, Character>,
}

impl CharacterRegistry {
    /// Scans `dir` for `<key>/config.json` records.
    ///
    /// Entries without a readable, valid config are skipped with a debug log
    /// (stray files like `.DS_Store` are expected). A missing directory
    /// yields an empty registry with a warning rather than an error — the
    /// server still starts, it just has nobody to talk as.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self, CharacterError> {
        let dir = dir.as_ref().to_path_buf();
        let mut characters = BTreeMap::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %dir.display(), "characters directory not found");
                return Ok(Self { dir, characters });
            }
            Err(source) => {
                return Err(CharacterError::DirRead {
                    dir: dir.display().to_string(),
                    source,
                })
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), "error iterating characters directory: {e}");
                    break;
                }
            };
            let key = entry.file_name().to_string_lossy().to_string();
            let config_path = entry.path().join("config.json");
            let contents = match tokio::fs::read_to_string(&config_path).await {
                Ok(contents) => contents,
                Err(_) => {
                    tracing::debug!(key = %key, "skipping entry without config.json");
                    continue;
                }
            };
            match serde_json::from_str::<Character>(&contents) {
                Ok(character) => {
                    tracing::info!(key = %key, name = %character.name, "loaded character");
                    characters.insert(key, character);
                }
                Err(e) => {
                    tracing::warn!(key = %key, "invalid character config, skipping: {e}");
                }
            }
        }

        Ok(Self { dir, characters })
    }

    /// The default active character: first key in sorted order, if any.
    pub fn default_key(&self) -> Option<&str> {
        self.characters.keys().next().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.characters.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Character> {
        self.characters.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Public-facing summaries for the HTTP API and init payload.
    pub fn summaries(&self) -> BTreeMap<String, CharacterSummary> {
        self.characters
            .iter()
            .map(|(key, c)| (key.clone(), CharacterSummary::from(c)))
            .collect()
    }

    /// Updates a character's custom instructions and persists the config
    /// back to its file, pretty-printed.
    pub async fn set_instructions(
        &mut self,
        key: &str,
        instructions: &str,
    ) -> Result<(), CharacterError> {
        let character = self
            .characters
            .get_mut(key)
            .ok_or_else(|| CharacterError::NotFound(key.to_string()))?;
        character.instructions = if instructions.trim().is_empty() {
            None
        } else {
            Some(instructions.to_string())
        };

        let serialized = serde_json::to_string_pretty(character).map_err(|source| {
            CharacterError::ConfigSerialize {
                key: key.to_string(),
                source,
            }
        })?;
        let config_path = self.dir.join(key).join("config.json");
        tokio::fs::write(&config_path, serialized)
            .await
            .map_err(|source| CharacterError::ConfigWrite {
                key: key.to_string(),
                source,
            })?;

        tracing::info!(key = %key, "updated character instructions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_character(dir: &Path, key: &str, body: &str) {
        let char_dir = dir.join(key);
        tokio::fs::create_dir_all(&char_dir).await.unwrap();
        tokio::fs::write(char_dir.join("config.json"), body)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn loads_characters_and_sorts_default() {
        let tmp = tempfile::tempdir().unwrap();
        write_character(
            tmp.path(),
            "zoe",
            r#"{"name": "Zoe", "voice": "af_sky", "images": {"neutral": "n.png"}}"#,
        )
        .await;
        write_character(
            tmp.path(),
            "arlo",
            r#"{"name": "Arlo", "voice": "am_onyx", "images": {}}"#,
        )
        .await;

        let registry = CharacterRegistry::load(tmp.path()).await.unwrap();
        assert_eq!(registry.default_key(), Some("arlo"));
        assert!(registry.contains("zoe"));
        assert_eq!(registry.summaries().len(), 2);
        assert_eq!(registry.get("zoe").unwrap().voice, "af_sky");
    }

    #[tokio::test]
    async fn skips_entries_without_valid_config() {
        let tmp = tempfile::tempdir().unwrap();
        write_character(tmp.path(), "ok", r#"{"name": "Ok", "voice": "v"}"#).await;
        write_character(tmp.path(), "broken", "{not json").await;
        tokio::fs::create_dir_all(tmp.path().join("empty-folder"))
            .await
            .unwrap();
        tokio::fs::write(tmp.path().join(".DS_Store"), b"junk")
            .await
            .unwrap();

        let registry = CharacterRegistry::load(tmp.path()).await.unwrap();
        assert_eq!(registry.summaries().len(), 1);
        assert!(registry.contains("ok"));
    }

    #[tokio::test]
    async fn missing_directory_yields_empty_registry() {
        let registry = CharacterRegistry::load("/nonexistent/banter-characters")
            .await
            .unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.default_key(), None);
    }

    #[tokio::test]
    async fn set_instructions_persists_to_disk() {
        let tmp = tempfile::tempdir().unwrap();
        write_character(tmp.path(), "kit", r#"{"name": "Kit", "voice": "v"}"#).await;

        let mut registry = CharacterRegistry::load(tmp.path()).await.unwrap();
        registry
            .set_instructions("kit", "Speak only in riddles.")
            .await
            .unwrap();
        assert_eq!(
            registry.get("kit").unwrap().instructions.as_deref(),
            Some("Speak only in riddles.")
        );

        // A fresh load sees the persisted edit.
        let reloaded = CharacterRegistry::load(tmp.path()).await.unwrap();
        assert_eq!(
            reloaded.get("kit").unwrap().instructions.as_deref(),
            Some("Speak only in riddles.")
        );
    }

    #[tokio::test]
    async fn set_instructions_for_unknown_key_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let mut registry = CharacterRegistry::load(tmp.path()).await.unwrap();
        let err = registry.set_instructions("ghost", "hi").await.unwrap_err();
        assert!(matches!(err, CharacterError::NotFound(_)));
    }
}

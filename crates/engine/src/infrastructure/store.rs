//! Filesystem adventure store.
//!
//! Adventure content is plain JSON under a data directory:
//!
//! ```text
//! data/
//!   adventures/
//!     lost_mines_of_phandelver/
//!       adventure.json      <- mutable play state
//!       chapters/*.json     <- authored content
//!       locations/*.json
//!       npcs/*.json
//!   characters/*.json       <- party sheets, shared across adventures
//!   npcs/*.json             <- generic monster sheets
//!   adventure_config.json   <- remembers the last loaded adventure
//!   additional_rules.md     <- user-defined rules appended to the prompt
//! ```
//!
//! Authored content never changes at runtime and is cached after first
//! read. `adventure.json` is the one mutable document: re-read on load,
//! written through after every state change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::fs;

use loremaster_domain::{chapter_ordinal, Adventure, CharacterSheet, Chapter, LocationSheet, NpcSheet};

use crate::infrastructure::ports::StoreError;

const ADVENTURE_MANIFEST: &str = "adventure.json";
const CONFIG_FILE: &str = "adventure_config.json";

/// Name of the user-defined rules file under the data directory.
pub const RULES_FILE_NAME: &str = "additional_rules.md";

/// Placeholder content served when no rules file has been saved yet.
pub const DEFAULT_ADDITIONAL_RULES: &str =
    "# Additional Rules\n\nAdd your custom rules here.\nThese will be appended to the core D&D 5e rules.\n";

/// Header fields of an adventure, for listing what can be played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdventureSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub level_range: Vec<u32>,
    pub estimated_sessions: Option<u32>,
}

impl AdventureSummary {
    fn from_adventure(adventure: &Adventure) -> Self {
        Self {
            id: adventure.id.clone(),
            name: adventure.name.clone(),
            description: adventure.description.clone(),
            level_range: adventure.level_range.clone().unwrap_or_else(|| vec![1, 20]),
            estimated_sessions: adventure.estimated_sessions,
        }
    }
}

/// JSON file store for adventures and their authored content.
pub struct AdventureStore {
    data_dir: PathBuf,
    adventures_dir: PathBuf,
    chapter_cache: DashMap<String, Arc<Chapter>>,
    location_cache: DashMap<String, Arc<LocationSheet>>,
    npc_cache: DashMap<String, Arc<NpcSheet>>,
}

impl AdventureStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let adventures_dir = data_dir.join("adventures");
        Self {
            data_dir,
            adventures_dir,
            chapter_cache: DashMap::new(),
            location_cache: DashMap::new(),
            npc_cache: DashMap::new(),
        }
    }

    /// Override the adventures directory (defaults to `data_dir/adventures`).
    pub fn with_adventures_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.adventures_dir = dir.into();
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn adventure_dir(&self, adventure_id: &str) -> PathBuf {
        self.adventures_dir.join(adventure_id)
    }

    /// Scan for adventures that can be loaded. Directories without a valid
    /// manifest are skipped with a warning rather than failing the scan.
    pub async fn list_adventures(&self) -> Vec<AdventureSummary> {
        let mut summaries = Vec::new();
        let Ok(mut entries) = fs::read_dir(&self.adventures_dir).await else {
            return summaries;
        };

        while let Some(entry) = entries.next_entry().await.ok().flatten() {
            let manifest = entry.path().join(ADVENTURE_MANIFEST);
            if let Some(adventure) = read_json::<Adventure>(&manifest).await {
                summaries.push(AdventureSummary::from_adventure(&adventure));
            }
        }

        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub async fn load_adventure(&self, adventure_id: &str) -> Result<Adventure, StoreError> {
        let path = self.adventure_dir(adventure_id).join(ADVENTURE_MANIFEST);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::not_found("Adventure", adventure_id));
            }
            Err(e) => return Err(StoreError::io(format!("Reading {}", path.display()), e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub async fn save_adventure(&self, adventure: &Adventure) -> Result<(), StoreError> {
        let dir = self.adventure_dir(&adventure.id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io("Creating adventure directory", e))?;

        let path = dir.join(ADVENTURE_MANIFEST);
        let json = serde_json::to_vec_pretty(adventure)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&path, json)
            .await
            .map_err(|e| StoreError::io(format!("Writing {}", path.display()), e))
    }

    /// Load a chapter, resolving loose naming conventions.
    ///
    /// Adventure state may refer to a chapter as `ch01` while the file on
    /// disk is `part1_goblin_arrows.json`. Resolution tries, in order: the
    /// exact name, ordinal-mapped `partN` names, a filename prefix match,
    /// and finally a substring match in either direction.
    pub async fn load_chapter(&self, adventure_id: &str, chapter_id: &str) -> Option<Arc<Chapter>> {
        let cache_key = format!("{adventure_id}/{chapter_id}");
        if let Some(hit) = self.chapter_cache.get(&cache_key) {
            return Some(Arc::clone(&hit));
        }

        let dir = self.adventure_dir(adventure_id).join("chapters");
        let path = resolve_chapter_file(&dir, chapter_id).await?;
        let mut chapter: Chapter = read_json(&path).await?;
        if chapter.id.is_empty() {
            chapter.id = stem_of(&path);
        }

        let chapter = Arc::new(chapter);
        self.chapter_cache.insert(cache_key, Arc::clone(&chapter));
        Some(chapter)
    }

    pub async fn load_location(
        &self,
        adventure_id: &str,
        location_id: &str,
    ) -> Option<Arc<LocationSheet>> {
        let cache_key = format!("{adventure_id}/{location_id}");
        if let Some(hit) = self.location_cache.get(&cache_key) {
            return Some(Arc::clone(&hit));
        }

        let path = self
            .adventure_dir(adventure_id)
            .join("locations")
            .join(format!("{location_id}.json"));
        let mut location: LocationSheet = read_json(&path).await?;
        if location.id.is_empty() {
            location.id = location_id.to_string();
        }

        let location = Arc::new(location);
        self.location_cache.insert(cache_key, Arc::clone(&location));
        Some(location)
    }

    pub async fn load_npc(&self, adventure_id: &str, npc_id: &str) -> Option<Arc<NpcSheet>> {
        let cache_key = format!("{adventure_id}/{npc_id}");
        if let Some(hit) = self.npc_cache.get(&cache_key) {
            return Some(Arc::clone(&hit));
        }

        let path = self
            .adventure_dir(adventure_id)
            .join("npcs")
            .join(format!("{npc_id}.json"));
        let mut npc: NpcSheet = read_json(&path).await?;
        if npc.id.is_empty() {
            npc.id = npc_id.to_string();
        }

        let npc = Arc::new(npc);
        self.npc_cache.insert(cache_key, Arc::clone(&npc));
        Some(npc)
    }

    pub async fn list_chapters(&self, adventure_id: &str) -> Vec<String> {
        json_stems(&self.adventure_dir(adventure_id).join("chapters")).await
    }

    pub async fn list_locations(&self, adventure_id: &str) -> Vec<String> {
        json_stems(&self.adventure_dir(adventure_id).join("locations")).await
    }

    pub async fn list_npcs(&self, adventure_id: &str) -> Vec<String> {
        json_stems(&self.adventure_dir(adventure_id).join("npcs")).await
    }

    /// Every location sheet of an adventure, for accessibility partitioning.
    pub async fn all_locations(&self, adventure_id: &str) -> Vec<Arc<LocationSheet>> {
        let mut locations = Vec::new();
        for stem in self.list_locations(adventure_id).await {
            if let Some(location) = self.load_location(adventure_id, &stem).await {
                locations.push(location);
            }
        }
        locations
    }

    /// Party character sheets, keyed by character name.
    pub async fn load_party(&self) -> HashMap<String, CharacterSheet> {
        load_sheets(&self.data_dir.join("characters")).await
    }

    /// Generic NPC/monster sheets, keyed by name.
    pub async fn load_bestiary(&self) -> HashMap<String, CharacterSheet> {
        load_sheets(&self.data_dir.join("npcs")).await
    }

    /// The adventure loaded in the previous run, if any.
    pub async fn last_adventure(&self) -> Option<String> {
        let config: AdventureConfig = read_json(&self.data_dir.join(CONFIG_FILE)).await?;
        config.last_adventure_id
    }

    pub async fn save_last_adventure(&self, adventure_id: &str) -> Result<(), StoreError> {
        self.write_config(AdventureConfig {
            last_adventure_id: Some(adventure_id.to_string()),
        })
        .await
    }

    pub async fn clear_last_adventure(&self) -> Result<(), StoreError> {
        self.write_config(AdventureConfig::default()).await
    }

    async fn write_config(&self, config: AdventureConfig) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StoreError::io("Creating data directory", e))?;
        let json = serde_json::to_vec_pretty(&config)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(self.data_dir.join(CONFIG_FILE), json)
            .await
            .map_err(|e| StoreError::io("Writing adventure config", e))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AdventureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_adventure_id: Option<String>,
}

/// Store for the user-defined rules file.
pub struct RulesStore {
    path: PathBuf,
}

impl RulesStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(RULES_FILE_NAME),
        }
    }

    /// The saved rules, or `None` if nothing has been saved yet.
    pub async fn load(&self) -> Option<String> {
        fs::read_to_string(&self.path).await.ok()
    }

    pub async fn save(&self, content: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io("Creating data directory", e))?;
        }
        fs::write(&self.path, content)
            .await
            .map_err(|e| StoreError::io("Writing additional rules", e))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Skipping unparseable JSON file");
            None
        }
    }
}

async fn load_sheets(dir: &Path) -> HashMap<String, CharacterSheet> {
    let mut sheets = HashMap::new();
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return sheets;
    };
    while let Some(entry) = entries.next_entry().await.ok().flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(sheet) = read_json::<CharacterSheet>(&path).await {
            sheets.insert(sheet.name.clone(), sheet);
        }
    }
    sheets
}

/// Sorted file stems of every `.json` file in a directory.
async fn json_stems(dir: &Path) -> Vec<String> {
    let mut stems = Vec::new();
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return stems;
    };
    while let Some(entry) = entries.next_entry().await.ok().flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            stems.push(stem_of(&path));
        }
    }
    stems.sort();
    stems
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

async fn resolve_chapter_file(dir: &Path, chapter_id: &str) -> Option<PathBuf> {
    let exact = dir.join(format!("{chapter_id}.json"));
    if fs::try_exists(&exact).await.unwrap_or(false) {
        return Some(exact);
    }

    let stems = json_stems(dir).await;
    let by_stem = |stem: &str| dir.join(format!("{stem}.json"));

    if let Some(n) = chapter_ordinal(chapter_id) {
        let part = dir.join(format!("part{n}.json"));
        if fs::try_exists(&part).await.unwrap_or(false) {
            return Some(part);
        }
        let prefix = format!("part{n}_");
        if let Some(stem) = stems.iter().find(|s| s.starts_with(&prefix)) {
            return Some(by_stem(stem));
        }
    }

    if let Some(stem) = stems.iter().find(|s| s.starts_with(chapter_id)) {
        return Some(by_stem(stem));
    }

    stems
        .iter()
        .find(|s| s.contains(chapter_id) || chapter_id.contains(s.as_str()))
        .map(|stem| by_stem(stem))
}

use crate::{
    cache::{CollectionSnapshot, ResultCache},
    config::{ManagerOptions, Settings, SettingsStore},
    database::{self, AddedModEntry, CharacterInfo, ModEntry, ModEntryPatch, NewModEntry},
    download,
    enrich::{
        self, BatchPoll, EnrichContext, EnrichMessage, Enricher, Enrichment, EnrichmentBatch,
        FsEnricher, Generation,
    },
    error::ManagerError,
    images::{self, PreviewImage},
    library::{self, CharacterItem, CopiedArchive, ItemKey, ModItem},
    metadata::{ModMeta, ModMetaPatch},
    shell,
    watcher::{RootWatcher, DEFAULT_DEBOUNCE},
};
use anyhow::Result;
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

const IDLE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Showing the cached snapshot while a refresh runs.
    Hydrated,
    Enriching { processed: usize, total: usize },
    Settled,
}

/// Live state of one collection as seen by a front end.
#[derive(Debug, Clone)]
pub struct CollectionView {
    pub generation: u64,
    pub state: LoadState,
    pub snapshot: CollectionSnapshot,
}

/// What `load_collection` hands back right away.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    pub collection: String,
    pub generation: u64,
    pub cached: Option<CollectionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    ItemEnriched { collection: String, key: ItemKey },
    EnrichmentComplete { collection: String, generation: u64 },
    RootChanged { root: PathBuf },
}

/// Owns settings, the result cache and every running enrichment batch.
///
/// All state is mutated on the caller's thread; workers only report back
/// through `poll`.
pub struct ModManager {
    store: SettingsStore,
    pub settings: Settings,
    options: ManagerOptions,
    cache: ResultCache,
    enricher: Arc<dyn Enricher>,
    generations: HashMap<String, Generation>,
    views: HashMap<String, CollectionView>,
    batches: Vec<EnrichmentBatch>,
    active: Option<String>,
    watcher: Option<RootWatcher>,
}

impl ModManager {
    pub fn initialize() -> Result<Self> {
        let store = SettingsStore::default_location()?;
        Ok(Self::with_enricher(
            store,
            ManagerOptions::default(),
            Arc::new(FsEnricher),
        ))
    }

    pub fn with_enricher(
        store: SettingsStore,
        options: ManagerOptions,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        let settings = store.load();
        Self {
            store,
            settings,
            options,
            cache: ResultCache::new(options.cache_capacity),
            enricher,
            generations: HashMap::new(),
            views: HashMap::new(),
            batches: Vec::new(),
            active: None,
            watcher: None,
        }
    }

    pub fn settings_path(&self) -> &Path {
        self.store.path()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn active_collection(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn mods_root(&self) -> Result<&Path> {
        self.settings
            .mods_root
            .as_deref()
            .ok_or_else(|| ManagerError::ModsRootNotSet.into())
    }

    pub fn images_root(&self) -> Result<&Path> {
        self.settings
            .images_root
            .as_deref()
            .ok_or_else(|| ManagerError::ImagesRootNotSet.into())
    }

    pub fn set_mods_root(&mut self, root: PathBuf) -> Result<()> {
        self.settings.mods_root = Some(root);
        self.store.save(&self.settings)?;
        self.reset_collections();
        if self.watcher.is_some() {
            self.watch_root()?;
        }
        Ok(())
    }

    pub fn set_images_root(&mut self, root: PathBuf) -> Result<()> {
        self.settings.images_root = Some(root);
        self.store.save(&self.settings)?;
        self.reset_collections();
        Ok(())
    }

    fn reset_collections(&mut self) {
        for generation in self.generations.values() {
            generation.bump();
        }
        self.cache.clear();
        self.views.clear();
        self.batches.clear();
        self.active = None;
    }

    /// Starts (or restarts) the debounced watch over the mods root.
    pub fn watch_root(&mut self) -> Result<()> {
        let root = self.mods_root()?.to_path_buf();
        self.watcher = Some(RootWatcher::start(&root, DEFAULT_DEBOUNCE)?);
        Ok(())
    }

    fn generation(&mut self, key: &str) -> Generation {
        self.generations.entry(key.to_string()).or_default().clone()
    }

    /// Returns the cached snapshot (if any) immediately and starts a fresh
    /// enrichment batch for `key`.
    pub fn load_collection(&mut self, key: &str) -> Result<LoadTicket> {
        let root = self.mods_root()?.to_path_buf();
        let latest = self.generation(key);
        let generation = latest.bump();
        self.active = Some(key.to_string());

        let cached = self.cache.get(key).cloned();
        let items = library::list_mods(&root, key);
        let total = items.len();
        let mut snapshot = cached.clone().unwrap_or_default();
        snapshot.items = items.clone();
        let state = if cached.is_some() {
            LoadState::Hydrated
        } else {
            LoadState::Enriching {
                processed: 0,
                total,
            }
        };
        self.views.insert(
            key.to_string(),
            CollectionView {
                generation,
                state,
                snapshot,
            },
        );
        tracing::debug!("loading {key} generation {generation} ({total} items)");

        let ctx = EnrichContext {
            collection: key.to_string(),
            images_root: self.settings.images_root.clone(),
        };
        self.batches.push(enrich::spawn_batch(
            ctx,
            items,
            self.options.workers,
            Arc::clone(&self.enricher),
            latest,
            generation,
        ));

        Ok(LoadTicket {
            collection: key.to_string(),
            generation,
            cached,
        })
    }

    /// Loads `key` and waits until its enrichment settles.
    pub fn load_collection_blocking(&mut self, key: &str) -> Result<CollectionSnapshot> {
        let ticket = self.load_collection(key)?;
        while self.batches.iter().any(|b| b.collection == key) {
            self.poll();
            thread::sleep(IDLE_POLL);
        }
        Ok(self
            .views
            .get(key)
            .filter(|view| view.generation == ticket.generation)
            .map(|view| view.snapshot.clone())
            .unwrap_or_default())
    }

    pub fn invalidate_collection(&mut self, key: &str) {
        if self.cache.invalidate(key) {
            tracing::debug!("invalidated cached collection {key}");
        }
    }

    pub fn current(&self, key: &str) -> Option<&CollectionView> {
        self.views.get(key)
    }

    pub fn is_idle(&self) -> bool {
        self.batches.is_empty()
    }

    /// Applies worker results and watcher notifications on the caller's thread.
    pub fn poll(&mut self) -> Vec<ManagerEvent> {
        let mut events = Vec::new();
        self.poll_batches(&mut events);
        self.poll_watcher(&mut events);
        events
    }

    fn poll_batches(&mut self, events: &mut Vec<ManagerEvent>) {
        let mut batches = std::mem::take(&mut self.batches);
        batches.retain_mut(|batch| loop {
            match batch.try_next() {
                BatchPoll::Message(message) => self.apply_message(batch, message, events),
                BatchPoll::Empty => return true,
                BatchPoll::Finished => {
                    self.finish_batch(batch, events);
                    return false;
                }
            }
        });
        self.batches = batches;
    }

    fn is_current(&self, collection: &str, generation: u64) -> bool {
        self.generations
            .get(collection)
            .map(|latest| latest.is_current(generation))
            .unwrap_or(false)
    }

    fn apply_message(
        &mut self,
        batch: &EnrichmentBatch,
        message: EnrichMessage,
        events: &mut Vec<ManagerEvent>,
    ) {
        let generation = match &message {
            EnrichMessage::Value { generation, .. } | EnrichMessage::ItemDone { generation } => {
                *generation
            }
        };
        if !self.is_current(&batch.collection, generation) {
            return;
        }
        let Some(view) = self.views.get_mut(&batch.collection) else {
            return;
        };
        match message {
            EnrichMessage::Value { key, value, .. } => {
                let snapshot = &mut view.snapshot;
                let inserted = match value {
                    Enrichment::Image(image) => insert_absent(&mut snapshot.images, &key, image),
                    Enrichment::Name(name) => insert_absent(&mut snapshot.names, &key, name),
                    Enrichment::Link(link) => insert_absent(&mut snapshot.links, &key, link),
                };
                if inserted {
                    events.push(ManagerEvent::ItemEnriched {
                        collection: batch.collection.clone(),
                        key,
                    });
                }
            }
            EnrichMessage::ItemDone { .. } => {
                view.state = LoadState::Enriching {
                    processed: batch.processed,
                    total: batch.total,
                };
            }
        }
    }

    fn finish_batch(&mut self, batch: &EnrichmentBatch, events: &mut Vec<ManagerEvent>) {
        if !self.is_current(&batch.collection, batch.generation) {
            tracing::debug!(
                "dropping superseded batch {} generation {}",
                batch.collection,
                batch.generation
            );
            return;
        }
        let Some(view) = self.views.get_mut(&batch.collection) else {
            return;
        };
        view.state = LoadState::Settled;
        let snapshot = consolidate(&view.snapshot);
        self.cache.put(&batch.collection, snapshot);
        tracing::debug!(
            "{} settled at generation {} ({} items)",
            batch.collection,
            batch.generation,
            batch.total
        );
        events.push(ManagerEvent::EnrichmentComplete {
            collection: batch.collection.clone(),
            generation: batch.generation,
        });
    }

    fn poll_watcher(&mut self, events: &mut Vec<ManagerEvent>) {
        let Some(watcher) = &self.watcher else {
            return;
        };
        if !watcher.poll_changed() {
            return;
        }
        let root = watcher.root().to_path_buf();
        tracing::info!("mods root changed: {root:?}");
        let characters: HashSet<String> = library::list_characters(&root).into_iter().collect();
        self.cache.retain_keys(&characters);
        self.views.retain(|key, _| characters.contains(key));
        match self.active.clone() {
            Some(active) if characters.contains(&active) => {
                self.invalidate_collection(&active);
                if let Err(err) = self.load_collection(&active) {
                    tracing::warn!("reloading {active} failed: {err:#}");
                }
            }
            _ => self.active = None,
        }
        events.push(ManagerEvent::RootChanged { root });
    }

    /// Drops the cached snapshot after a mutation and reloads the collection
    /// if it is the one on screen.
    fn after_mutation(&mut self, character: &str) -> Result<()> {
        self.invalidate_collection(character);
        if self.active.as_deref() == Some(character) {
            self.load_collection(character)?;
        }
        Ok(())
    }

    pub fn characters(&self) -> Result<Vec<CharacterItem>> {
        let root = self.mods_root()?;
        Ok(library::list_characters_with_images(
            root,
            self.settings.images_root.as_deref(),
        ))
    }

    /// Re-lists the characters and forgets cached collections that vanished.
    pub fn refresh_characters(&mut self) -> Result<Vec<CharacterItem>> {
        let characters = self.characters()?;
        let valid: HashSet<String> = characters.iter().map(|c| c.name.clone()).collect();
        self.cache.retain_keys(&valid);
        Ok(characters)
    }

    pub fn add_character(&mut self, name: &str) -> Result<String> {
        let root = self.mods_root()?.to_path_buf();
        library::add_character(&root, name)
    }

    pub fn delete_character(&mut self, name: &str) -> Result<()> {
        let root = self.mods_root()?.to_path_buf();
        library::delete_character(&root, self.settings.images_root.as_deref(), name)?;
        let name = name.trim();
        self.generation(name).bump();
        self.invalidate_collection(name);
        self.views.remove(name);
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        Ok(())
    }

    pub fn character_info(&self, character: &str) -> Result<CharacterInfo> {
        Ok(database::character_info(self.images_root()?, character))
    }

    pub fn save_character_image_from_url(&mut self, character: &str, url: &str) -> Result<PathBuf> {
        let character = library::validate_name(character, ManagerError::CharacterRequired)?;
        let root = self.images_root()?.to_path_buf();
        let image = download::fetch_image(url)?;
        let extension = images::extension_for_url(url);
        database::save_character_image(&root, character, &image, &extension, Some(url))
    }

    pub fn save_character_image_from_data_url(
        &mut self,
        character: &str,
        data_url: &str,
    ) -> Result<PathBuf> {
        let character = library::validate_name(character, ManagerError::CharacterRequired)?;
        let root = self.images_root()?.to_path_buf();
        let image = PreviewImage::from_data_url(data_url)?;
        let extension = image.file_extension();
        database::save_character_image(&root, character, &image, extension, None)
    }

    pub fn list_mods(&self, character: &str) -> Result<Vec<ModItem>> {
        Ok(library::list_mods(self.mods_root()?, character))
    }

    pub fn add_mod_from_archive(
        &mut self,
        character: &str,
        archive: &Path,
        mod_name: &str,
        patch: ModMetaPatch,
    ) -> Result<ModMeta> {
        let root = self.mods_root()?.to_path_buf();
        let meta = library::add_mod_from_archive(&root, character, archive, mod_name, patch)?;
        self.after_mutation(character.trim())?;
        Ok(meta)
    }

    pub fn copy_archive_to_mod_folder(
        &mut self,
        character: &str,
        archive: &Path,
    ) -> Result<CopiedArchive> {
        let root = self.mods_root()?.to_path_buf();
        let copied = library::copy_archive_to_mod_folder(&root, character, archive)?;
        self.after_mutation(character.trim())?;
        Ok(copied)
    }

    pub fn save_metadata(
        &mut self,
        character: &str,
        mod_name: &str,
        patch: ModMetaPatch,
    ) -> Result<ModMeta> {
        let root = self.mods_root()?.to_path_buf();
        let meta = library::save_metadata(&root, character, mod_name, patch)?;
        self.after_mutation(character.trim())?;
        Ok(meta)
    }

    pub fn delete_mod(&mut self, character: &str, mod_name: &str) -> Result<()> {
        let root = self.mods_root()?.to_path_buf();
        library::delete_mod(&root, character, mod_name)?;
        self.after_mutation(character.trim())
    }

    pub fn set_enabled(&mut self, character: &str, mod_name: &str, enabled: bool) -> Result<ModMeta> {
        let root = self.mods_root()?.to_path_buf();
        let meta = library::set_enabled(&root, character, mod_name, enabled)?;
        self.after_mutation(character.trim())?;
        Ok(meta)
    }

    pub fn activate_exclusive(&mut self, character: &str, mod_name: &str) -> Result<()> {
        let root = self.mods_root()?.to_path_buf();
        library::activate_exclusive(&root, character, mod_name)?;
        self.after_mutation(character.trim())
    }

    pub fn save_mod_image_from_data_url(
        &mut self,
        character: &str,
        mod_name: &str,
        data_url: &str,
    ) -> Result<String> {
        let root = self.mods_root()?.to_path_buf();
        let file = library::save_mod_image_from_data_url(&root, character, mod_name, data_url)?;
        self.after_mutation(character.trim())?;
        Ok(file)
    }

    pub fn save_mod_image_from_url(
        &mut self,
        character: &str,
        mod_name: &str,
        url: &str,
    ) -> Result<String> {
        let root = self.mods_root()?.to_path_buf();
        let file = library::save_mod_image_from_url(&root, character, mod_name, url)?;
        self.after_mutation(character.trim())?;
        Ok(file)
    }

    pub fn update_from_url(&mut self, character: &str, mod_name: &str) -> Result<ModMeta> {
        let root = self.mods_root()?.to_path_buf();
        let meta = library::update_from_url(&root, character, mod_name)?;
        self.after_mutation(character.trim())?;
        Ok(meta)
    }

    pub fn mod_entry(&self, character: &str, mod_name: &str) -> Result<Option<ModEntry>> {
        Ok(database::get_mod_entry(self.images_root()?, character, mod_name))
    }

    pub fn update_mod_entry(
        &mut self,
        character: &str,
        mod_name: &str,
        patch: ModEntryPatch,
    ) -> Result<()> {
        let root = self.images_root()?.to_path_buf();
        database::update_mod_entry(&root, character, mod_name, patch)?;
        self.after_mutation(character.trim())
    }

    pub fn add_mod_entry(
        &mut self,
        character: &str,
        mod_name: &str,
        entry: NewModEntry,
    ) -> Result<AddedModEntry> {
        let root = self.images_root()?.to_path_buf();
        let added = database::add_mod_entry(&root, character, mod_name, entry)?;
        self.after_mutation(character.trim())?;
        Ok(added)
    }

    /// Opens the mod's `pageUrl`; false when it has none.
    pub fn open_mod_page(&self, character: &str, mod_name: &str) -> Result<bool> {
        let root = self.mods_root()?;
        let dir = library::mod_dir(root, character.trim(), mod_name.trim());
        let meta = crate::metadata::read_mod_meta(&dir);
        match meta.page_url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => {
                shell::open_url(url)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Opens the deepest folder named by the arguments, or the mods root.
    pub fn open_folder(&self, character: Option<&str>, mod_name: Option<&str>) -> Result<PathBuf> {
        let root = self.mods_root()?;
        let target = match (character, mod_name) {
            (Some(character), Some(mod_name)) => {
                library::mod_dir(root, character.trim(), mod_name.trim())
            }
            (Some(character), None) => library::character_dir(root, character.trim()),
            _ => root.to_path_buf(),
        };
        if !target.is_dir() {
            return Err(match (character, mod_name) {
                (Some(character), Some(mod_name)) => ManagerError::ModNotFound {
                    character: character.trim().to_string(),
                    name: mod_name.trim().to_string(),
                }
                .into(),
                (Some(character), None) => {
                    ManagerError::CharacterNotFound(character.trim().to_string()).into()
                }
                _ => anyhow::anyhow!("mods root {target:?} does not exist"),
            });
        }
        shell::open_path(&target)?;
        Ok(target)
    }
}

fn insert_absent<V>(map: &mut HashMap<ItemKey, V>, key: &ItemKey, value: V) -> bool {
    if map.contains_key(key) {
        return false;
    }
    map.insert(key.clone(), value);
    true
}

/// Snapshot for the cache: only values whose item is still listed.
fn consolidate(live: &CollectionSnapshot) -> CollectionSnapshot {
    let keys: HashSet<&ItemKey> = live.items.iter().map(|item| &item.key).collect();
    let keep = |key: &ItemKey| keys.contains(key);
    CollectionSnapshot {
        items: live.items.clone(),
        images: filtered(&live.images, keep),
        names: filtered(&live.names, keep),
        links: filtered(&live.links, keep),
    }
}

fn filtered<V: Clone>(
    map: &HashMap<ItemKey, V>,
    keep: impl Fn(&ItemKey) -> bool,
) -> HashMap<ItemKey, V> {
    map.iter()
        .filter(|(key, _)| keep(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata;
    use std::{
        fs,
        sync::{Condvar, Mutex},
    };
    use tempfile::TempDir;

    fn manager(dir: &TempDir, enricher: Arc<dyn Enricher>) -> ModManager {
        let store = SettingsStore::at(dir.path().join("settings.json"));
        let mut manager = ModManager::with_enricher(store, ManagerOptions::default(), enricher);
        manager
            .set_mods_root(dir.path().join("mods"))
            .unwrap();
        manager
    }

    fn seed(dir: &TempDir, character: &str, count: usize) {
        for index in 0..count {
            let mod_dir = dir.path().join("mods").join(character).join(format!("m{index}"));
            fs::create_dir_all(&mod_dir).unwrap();
            metadata::write_mod_meta(&mod_dir, ModMetaPatch::named(&format!("m{index}"))).unwrap();
        }
    }

    /// Blocks every lookup until released, then names items after the gate's round.
    struct GatedEnricher {
        round: Mutex<(u32, bool)>,
        cv: Condvar,
    }

    impl GatedEnricher {
        fn new() -> Self {
            Self {
                round: Mutex::new((1, false)),
                cv: Condvar::new(),
            }
        }

        fn open(&self, round: u32) {
            let mut state = self.round.lock().unwrap();
            *state = (round, true);
            self.cv.notify_all();
        }

        fn wait(&self) -> u32 {
            let mut state = self.round.lock().unwrap();
            while !state.1 {
                state = self.cv.wait(state).unwrap();
            }
            state.0
        }
    }

    impl Enricher for GatedEnricher {
        fn preview_image(&self, _: &EnrichContext, _: &ModItem) -> Result<Option<PreviewImage>> {
            Ok(None)
        }
        fn display_name(&self, _: &EnrichContext, _: &ModItem) -> Result<Option<String>> {
            Ok(Some(format!("round{}", self.wait())))
        }
        fn external_link(&self, _: &EnrichContext, _: &ModItem) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn settle(manager: &mut ModManager) -> Vec<ManagerEvent> {
        let mut events = Vec::new();
        while !manager.is_idle() {
            events.extend(manager.poll());
            thread::sleep(IDLE_POLL);
        }
        events
    }

    #[test]
    fn missing_mods_root_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::at(dir.path().join("settings.json"));
        let mut manager =
            ModManager::with_enricher(store, ManagerOptions::default(), Arc::new(FsEnricher));
        let err = manager.load_collection("Alice").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ManagerError>(),
            Some(ManagerError::ModsRootNotSet)
        ));
        assert!(manager.character_info("Alice").is_err());
    }

    #[test]
    fn superseded_results_are_never_applied() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "Alice", 6);
        let gate = Arc::new(GatedEnricher::new());
        let mut manager = manager(&dir, gate.clone());

        let first = manager.load_collection("Alice").unwrap();
        let second = manager.load_collection("Alice").unwrap();
        assert!(second.generation > first.generation);
        gate.open(2);

        let events = settle(&mut manager);
        let view = manager.current("Alice").unwrap();
        assert_eq!(view.generation, second.generation);
        assert_eq!(view.state, LoadState::Settled);
        assert_eq!(view.snapshot.names.len(), 6);
        assert!(view.snapshot.names.values().all(|name| name == "round2"));
        let completions: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ManagerEvent::EnrichmentComplete { .. }))
            .collect();
        assert_eq!(
            completions,
            vec![&ManagerEvent::EnrichmentComplete {
                collection: "Alice".to_string(),
                generation: second.generation,
            }]
        );
    }

    #[test]
    fn hydrated_values_win_over_refreshed_ones() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "Alice", 2);
        let gate = Arc::new(GatedEnricher::new());
        gate.open(1);
        let mut manager = manager(&dir, gate.clone());

        manager.load_collection_blocking("Alice").unwrap();
        gate.open(7);
        let ticket = manager.load_collection("Alice").unwrap();
        let cached = ticket.cached.unwrap();
        assert!(cached.names.values().all(|name| name == "round1"));
        settle(&mut manager);
        let view = manager.current("Alice").unwrap();
        assert!(view.snapshot.names.values().all(|name| name == "round1"));
    }

    #[test]
    fn mutation_invalidates_and_reloads_active_collection() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "Alice", 3);
        let mut manager = manager(&dir, Arc::new(FsEnricher));
        manager.load_collection_blocking("Alice").unwrap();
        assert!(manager.cache().contains("Alice"));

        manager.delete_mod("Alice", "m0").unwrap();
        assert!(!manager.cache().contains("Alice"));
        settle(&mut manager);
        let view = manager.current("Alice").unwrap();
        assert_eq!(view.snapshot.items.len(), 2);
        assert!(manager.cache().contains("Alice"));
    }

    #[test]
    fn changing_mods_root_clears_everything() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "Alice", 1);
        let mut manager = manager(&dir, Arc::new(FsEnricher));
        manager.load_collection_blocking("Alice").unwrap();
        manager.set_mods_root(dir.path().join("other")).unwrap();
        assert!(manager.cache().is_empty());
        assert!(manager.current("Alice").is_none());
        assert_eq!(manager.active_collection(), None);
        let reloaded = SettingsStore::at(dir.path().join("settings.json")).load();
        assert_eq!(reloaded.mods_root, Some(dir.path().join("other")));
    }

    #[test]
    fn deleting_character_drops_its_cache() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "Alice", 1);
        seed(&dir, "Bob", 1);
        let mut manager = manager(&dir, Arc::new(FsEnricher));
        manager.load_collection_blocking("Alice").unwrap();
        manager.load_collection_blocking("Bob").unwrap();
        manager.delete_character("Alice").unwrap();
        assert!(!manager.cache().contains("Alice"));
        let names: Vec<String> = manager
            .refresh_characters()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Bob"]);
        assert!(manager.cache().contains("Bob"));
    }

    #[test]
    fn mod_page_without_url_is_not_opened() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "Alice", 1);
        let manager = manager(&dir, Arc::new(FsEnricher));
        assert!(!manager.open_mod_page("Alice", "m0").unwrap());
        let err = manager.open_folder(Some("Nobody"), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ManagerError>(),
            Some(ManagerError::CharacterNotFound(name)) if name == "Nobody"
        ));
    }
}

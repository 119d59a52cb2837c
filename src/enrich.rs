//! Background enrichment of a freshly listed collection.
//!
//! A batch runs a fixed number of worker threads over a shared cursor. Each
//! worker takes the next item and performs its three lookups in order
//! (preview image, display name, external link). Workers never touch shared
//! state: every result is sent back tagged with the batch generation and the
//! owner decides whether it still applies.

use crate::{
    database,
    images::{self, PreviewImage},
    library::{self, ItemKey, ModItem},
};
use anyhow::Result;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread,
};

/// Latest load request for one collection.
///
/// Shared read-only with workers so they can stop pulling items once a newer
/// load has started.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// What a lookup may consult besides the item itself.
#[derive(Debug, Clone)]
pub struct EnrichContext {
    pub collection: String,
    pub images_root: Option<PathBuf>,
}

/// Per-item lookups. Each may fail; failures only cost that one value.
pub trait Enricher: Send + Sync {
    fn preview_image(&self, ctx: &EnrichContext, item: &ModItem) -> Result<Option<PreviewImage>>;
    fn display_name(&self, ctx: &EnrichContext, item: &ModItem) -> Result<Option<String>>;
    fn external_link(&self, ctx: &EnrichContext, item: &ModItem) -> Result<Option<String>>;
}

/// Lookups against the mod folders and the character database.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsEnricher;

impl Enricher for FsEnricher {
    fn preview_image(&self, _ctx: &EnrichContext, item: &ModItem) -> Result<Option<PreviewImage>> {
        match images::find_mod_preview(&item.dir, item.meta.image.as_deref()) {
            Some(path) => PreviewImage::read(&path).map(Some),
            None => Ok(None),
        }
    }

    fn display_name(&self, _ctx: &EnrichContext, item: &ModItem) -> Result<Option<String>> {
        Ok(library::primary_internal_name(&item.dir))
    }

    fn external_link(&self, ctx: &EnrichContext, item: &ModItem) -> Result<Option<String>> {
        let from_database = ctx.images_root.as_deref().and_then(|root| {
            database::get_mod_entry(root, &ctx.collection, &item.folder)
                .and_then(|entry| entry.page_url)
        });
        Ok(from_database.or_else(|| {
            item.meta
                .page_url
                .as_ref()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty())
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    Image(PreviewImage),
    Name(String),
    Link(String),
}

#[derive(Debug)]
pub enum EnrichMessage {
    Value {
        generation: u64,
        key: ItemKey,
        value: Enrichment,
    },
    ItemDone {
        generation: u64,
    },
}

#[derive(Debug)]
pub enum BatchPoll {
    Message(EnrichMessage),
    Empty,
    Finished,
}

/// Handle on a running batch; dropped once all workers have exited.
#[derive(Debug)]
pub struct EnrichmentBatch {
    pub collection: String,
    pub generation: u64,
    pub total: usize,
    pub processed: usize,
    rx: Receiver<EnrichMessage>,
}

impl EnrichmentBatch {
    pub fn try_next(&mut self) -> BatchPoll {
        match self.rx.try_recv() {
            Ok(message) => {
                if matches!(message, EnrichMessage::ItemDone { .. }) {
                    self.processed += 1;
                }
                BatchPoll::Message(message)
            }
            Err(TryRecvError::Empty) => BatchPoll::Empty,
            Err(TryRecvError::Disconnected) => BatchPoll::Finished,
        }
    }
}

/// Starts `workers` threads enriching `items` for generation `generation`.
pub fn spawn_batch(
    ctx: EnrichContext,
    items: Vec<ModItem>,
    workers: usize,
    enricher: Arc<dyn Enricher>,
    latest: Generation,
    generation: u64,
) -> EnrichmentBatch {
    let (tx, rx) = mpsc::channel();
    let total = items.len();
    let items = Arc::new(items);
    let cursor = Arc::new(AtomicUsize::new(0));
    let ctx = Arc::new(ctx);
    let worker_count = workers.max(1).min(total);

    for _ in 0..worker_count {
        let tx = tx.clone();
        let items = Arc::clone(&items);
        let cursor = Arc::clone(&cursor);
        let ctx = Arc::clone(&ctx);
        let enricher = Arc::clone(&enricher);
        let latest = latest.clone();
        thread::spawn(move || {
            run_worker(&ctx, &items, &cursor, enricher.as_ref(), &latest, generation, &tx)
        });
    }

    EnrichmentBatch {
        collection: ctx.collection.clone(),
        generation,
        total,
        processed: 0,
        rx,
    }
}

fn run_worker(
    ctx: &EnrichContext,
    items: &[ModItem],
    cursor: &AtomicUsize,
    enricher: &dyn Enricher,
    latest: &Generation,
    generation: u64,
    tx: &Sender<EnrichMessage>,
) {
    loop {
        if !latest.is_current(generation) {
            return;
        }
        let index = cursor.fetch_add(1, Ordering::SeqCst);
        let Some(item) = items.get(index) else {
            return;
        };

        let step = |lookup: &dyn Fn() -> Option<Enrichment>| -> bool {
            if !latest.is_current(generation) {
                return false;
            }
            match lookup() {
                Some(value) => tx
                    .send(EnrichMessage::Value {
                        generation,
                        key: item.key.clone(),
                        value,
                    })
                    .is_ok(),
                None => true,
            }
        };
        let finished = step(&|| {
            absorb("preview", item, enricher.preview_image(ctx, item)).map(Enrichment::Image)
        }) && step(&|| absorb("name", item, enricher.display_name(ctx, item)).map(Enrichment::Name))
            && step(&|| absorb("link", item, enricher.external_link(ctx, item)).map(Enrichment::Link));
        if !finished || tx.send(EnrichMessage::ItemDone { generation }).is_err() {
            return;
        }
    }
}

fn absorb<T>(what: &str, item: &ModItem, result: Result<Option<T>>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!("{what} lookup for {} failed: {err:#}", item.folder);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ModMeta;
    use anyhow::anyhow;
    use std::{collections::HashMap, time::Duration};

    fn items(count: usize) -> Vec<ModItem> {
        (0..count)
            .map(|index| {
                let folder = format!("mod{index:02}");
                let dir = PathBuf::from("/mods/Alice").join(&folder);
                ModItem {
                    key: ItemKey::new(&dir, &folder),
                    meta: ModMeta::for_folder(&folder),
                    folder,
                    dir,
                }
            })
            .collect()
    }

    fn ctx() -> EnrichContext {
        EnrichContext {
            collection: "Alice".to_string(),
            images_root: None,
        }
    }

    fn drain(mut batch: EnrichmentBatch) -> (Vec<EnrichMessage>, usize) {
        let mut out = Vec::new();
        loop {
            match batch.try_next() {
                BatchPoll::Message(message) => out.push(message),
                BatchPoll::Empty => thread::sleep(Duration::from_millis(1)),
                BatchPoll::Finished => return (out, batch.processed),
            }
        }
    }

    #[derive(Default)]
    struct CountingEnricher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingEnricher {
        fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Enricher for CountingEnricher {
        fn preview_image(&self, _: &EnrichContext, _: &ModItem) -> Result<Option<PreviewImage>> {
            self.enter();
            Ok(None)
        }
        fn display_name(&self, _: &EnrichContext, item: &ModItem) -> Result<Option<String>> {
            self.enter();
            Ok(Some(item.folder.to_uppercase()))
        }
        fn external_link(&self, _: &EnrichContext, _: &ModItem) -> Result<Option<String>> {
            self.enter();
            Err(anyhow!("offline"))
        }
    }

    #[test]
    fn in_flight_lookups_never_exceed_worker_count() {
        let enricher = Arc::new(CountingEnricher::default());
        let latest = Generation::default();
        let generation = latest.bump();
        let batch = spawn_batch(ctx(), items(20), 3, enricher.clone(), latest, generation);
        let (messages, processed) = drain(batch);

        assert_eq!(processed, 20);
        let peak = enricher.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak was {peak}");
        let names = messages
            .iter()
            .filter(|m| matches!(m, EnrichMessage::Value { value: Enrichment::Name(_), .. }))
            .count();
        assert_eq!(names, 20);
    }

    struct FlakyEnricher;

    impl Enricher for FlakyEnricher {
        fn preview_image(&self, _: &EnrichContext, item: &ModItem) -> Result<Option<PreviewImage>> {
            if item.folder.ends_with('0') {
                return Err(anyhow!("unreadable"));
            }
            Ok(Some(PreviewImage {
                mime: "image/png".to_string(),
                bytes: vec![1],
            }))
        }
        fn display_name(&self, _: &EnrichContext, item: &ModItem) -> Result<Option<String>> {
            if item.folder.ends_with('0') {
                return Err(anyhow!("unreadable"));
            }
            Ok(Some("n".to_string()))
        }
        fn external_link(&self, _: &EnrichContext, item: &ModItem) -> Result<Option<String>> {
            if item.folder.ends_with('0') {
                return Ok(None);
            }
            Ok(Some("https://l.test".to_string()))
        }
    }

    #[test]
    fn failed_lookups_leave_no_values() {
        let latest = Generation::default();
        let generation = latest.bump();
        let list = items(12);
        let failing: Vec<ItemKey> = list
            .iter()
            .filter(|item| item.folder.ends_with('0'))
            .map(|item| item.key.clone())
            .collect();
        let batch = spawn_batch(ctx(), list, 4, Arc::new(FlakyEnricher), latest, generation);
        let (messages, processed) = drain(batch);
        assert_eq!(processed, 12);

        let mut per_key: HashMap<ItemKey, usize> = HashMap::new();
        for message in messages {
            if let EnrichMessage::Value { key, .. } = message {
                *per_key.entry(key).or_default() += 1;
            }
        }
        for key in &failing {
            assert!(!per_key.contains_key(key));
        }
        assert_eq!(per_key.len(), 12 - failing.len());
        assert!(per_key.values().all(|count| *count == 3));
    }

    #[test]
    fn superseded_batch_stops_pulling_items() {
        let enricher = Arc::new(CountingEnricher::default());
        let latest = Generation::default();
        let generation = latest.bump();
        latest.bump();
        let batch = spawn_batch(ctx(), items(8), 2, enricher, latest, generation);
        let (messages, processed) = drain(batch);
        assert!(messages.is_empty());
        assert_eq!(processed, 0);
    }

    #[test]
    fn empty_collection_finishes_immediately() {
        let latest = Generation::default();
        let generation = latest.bump();
        let batch = spawn_batch(ctx(), Vec::new(), 4, Arc::new(FsEnricher), latest, generation);
        let (messages, processed) = drain(batch);
        assert!(messages.is_empty());
        assert_eq!(processed, 0);
    }
}

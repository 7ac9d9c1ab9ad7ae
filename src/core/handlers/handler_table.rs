// Name-keyed storage shared by the command and event registries.

use super::handler_models::{HandlerDescriptor, HandlerKind, HandlerMeta};
use super::registry_error::RegistryError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const NAME_WEIGHT: u8 = 4;
const ALIAS_WEIGHT: u8 = 3;
const DESCRIPTION_WEIGHT: u8 = 2;
const CATEGORY_WEIGHT: u8 = 1;

struct Slot<A: ?Sized> {
    descriptor: HandlerDescriptor<A>,
    seq: u64,
}

pub(crate) struct HandlerTable<A: ?Sized> {
    kind: HandlerKind,
    entries: DashMap<String, Slot<A>>,
    sources: DashMap<String, PathBuf>,
    next_seq: AtomicU64,
}

/// Strongest field of `meta` containing `needle` (already lowercased).
fn match_weight(meta: &HandlerMeta, needle: &str) -> Option<u8> {
    let contains = |haystack: &str| haystack.to_lowercase().contains(needle);

    if contains(meta.name.as_str()) {
        Some(NAME_WEIGHT)
    } else if meta.aliases.iter().any(|alias| contains(alias.as_str())) {
        Some(ALIAS_WEIGHT)
    } else if contains(meta.description.as_str()) {
        Some(DESCRIPTION_WEIGHT)
    } else if meta.category.as_deref().is_some_and(contains) {
        Some(CATEGORY_WEIGHT)
    } else {
        None
    }
}

impl<A: ?Sized> HandlerTable<A> {
    pub fn new(kind: HandlerKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
            sources: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn insert_unique(&self, descriptor: HandlerDescriptor<A>) -> Result<(), RegistryError> {
        match self.entries.entry(descriptor.meta.name.clone()) {
            Entry::Occupied(occupied) => Err(RegistryError::DuplicateName {
                kind: self.kind,
                name: occupied.key().clone(),
            }),
            Entry::Vacant(vacant) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                vacant.insert(Slot { descriptor, seq });
                Ok(())
            }
        }
    }

    /// Drop an entry and whatever source path was recorded for it.
    pub fn remove(&self, name: &str) -> Result<HandlerDescriptor<A>, RegistryError> {
        self.sources.remove(name);
        self.entries
            .remove(name)
            .map(|(_, slot)| slot.descriptor)
            .ok_or_else(|| RegistryError::NotFound {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<HandlerDescriptor<A>> {
        self.entries.get(name).map(|slot| slot.descriptor.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn record_source(&self, name: &str, path: &Path) {
        self.sources.insert(name.to_string(), path.to_path_buf());
    }

    pub fn source(&self, name: &str) -> Option<PathBuf> {
        self.sources.get(name).map(|path| path.clone())
    }

    /// Every descriptor, oldest registration first.
    pub fn ordered(&self) -> Vec<HandlerDescriptor<A>> {
        let mut slots: Vec<(u64, HandlerDescriptor<A>)> = self
            .entries
            .iter()
            .map(|slot| (slot.seq, slot.descriptor.clone()))
            .collect();
        slots.sort_by_key(|(seq, _)| *seq);
        slots.into_iter().map(|(_, descriptor)| descriptor).collect()
    }

    pub fn filter(&self, keep: impl Fn(&HandlerMeta) -> bool) -> Vec<HandlerDescriptor<A>> {
        self.ordered()
            .into_iter()
            .filter(|descriptor| keep(&descriptor.meta))
            .collect()
    }

    /// Case-insensitive substring search, best field match first.
    ///
    /// Name beats alias beats description beats category. Equal weights keep
    /// registration order. A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<HandlerDescriptor<A>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(u8, HandlerDescriptor<A>)> = self
            .ordered()
            .into_iter()
            .filter_map(|descriptor| {
                match_weight(&descriptor.meta, &needle).map(|weight| (weight, descriptor))
            })
            .collect();
        // Stable sort keeps registration order within a weight.
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        hits.into_iter().map(|(_, descriptor)| descriptor).collect()
    }
}

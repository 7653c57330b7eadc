use std::collections::HashMap;

use crate::errors::{Error, Result};
use crate::hash::HashBits;
use crate::table::HashTable;
use crate::tagset::Tagset;
use crate::translation::TranslationTables;

/// Collects the entries of a [`TagLexicon`] before the tagset is known
#[derive(Debug, Clone, Default)]
pub struct TagLexiconBuilder {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
    open_tags: Vec<String>,
}

impl TagLexiconBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the possible tags of a word form
    ///
    /// Tags are merged with any tags already recorded for `key`.
    pub fn insert<K, I, S>(&mut self, key: K, tags: I) -> &mut Self
    where
        K: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.entries.push((key.clone(), Vec::new()));
                self.index.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        let existing = &mut self.entries[idx].1;
        for tag in tags {
            let tag = tag.into();
            if !existing.contains(&tag) {
                existing.push(tag);
            }
        }
        self
    }

    /// Record one `(word, tag)` occurrence from a tagged corpus
    pub fn observe(&mut self, word: &str, tag: &str) -> &mut Self {
        self.insert(word.to_lowercase(), [tag])
    }

    /// Tags allowed for words missing from the lexicon
    pub fn open_tags<I, S>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.open_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve all tags through `tagset` and build the hash table
    pub fn build(&self, tagset: &Tagset, bits: HashBits) -> Result<TagLexicon> {
        let mut open = tagset.ids(&self.open_tags)?;
        open.sort_unstable();
        open.dedup();
        if open.is_empty() {
            return Err(Error::config("tag lexicon needs at least one open tag"));
        }

        let mut lexicon = TagLexicon {
            table: HashTable::with_items(self.entries.len()),
            lists: Vec::new(),
            open,
            bits,
        };
        let mut list_index: HashMap<Vec<u32>, u32> = HashMap::new();
        let mut collisions = 0usize;
        for (key, tags) in &self.entries {
            if tags.is_empty() {
                return Err(Error::config(format!(
                    "tag lexicon entry '{}' has no tags",
                    key
                )));
            }
            let ids = tagset.ids(tags)?;
            let hash = lexicon.key_hash(key);
            if lexicon.table.get(hash).is_some() {
                collisions += 1;
                continue;
            }
            let next = lexicon.lists.len() as u32;
            let idx = *list_index.entry(ids.clone()).or_insert(next);
            if idx == next {
                lexicon.lists.push(ids);
            }
            if !lexicon.table.insert(hash, idx) {
                collisions += 1;
            }
        }
        tracing::debug!(
            entries = self.entries.len(),
            lists = lexicon.lists.len(),
            open_tags = lexicon.open.len(),
            capacity = lexicon.table.capacity(),
            collisions,
            "built tag lexicon"
        );
        Ok(lexicon)
    }
}

/// Closed hash map from normalized word form to its possible tags
#[derive(Debug, Clone)]
pub struct TagLexicon {
    table: HashTable,
    /// Distinct tag id lists
    lists: Vec<Vec<u32>>,
    /// Sorted open-class tag ids
    open: Vec<u32>,
    bits: HashBits,
}

impl TagLexicon {
    pub fn builder() -> TagLexiconBuilder {
        TagLexiconBuilder::new()
    }

    /// Number of word forms stored
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn open_tags(&self) -> &[u32] {
        &self.open
    }

    /// Key hash of a word, which is normalized first
    pub fn key_hash(&self, word: &str) -> u64 {
        let cps = TranslationTables::get().normalize_str(word);
        self.key_of_normalized(&cps)
    }

    /// Key hash of already normalized codepoints
    #[inline]
    pub fn key_of_normalized(&self, cps: &[u32]) -> u64 {
        self.bits.fmix(self.bits.hash_codepoints(cps))
    }

    /// Key hash from the per-token hash of `normalize(field)`
    #[inline]
    pub(crate) fn key_of_invariant(&self, invariant: u64) -> u64 {
        self.bits.fmix(invariant)
    }

    #[inline]
    pub fn lookup_hash(&self, hash: u64) -> Option<&[u32]> {
        self.table
            .get(hash)
            .map(|idx| self.lists[idx as usize].as_slice())
    }

    pub fn lookup(&self, word: &str) -> Option<&[u32]> {
        self.lookup_hash(self.key_hash(word))
    }

    /// Tags of a key hash, or the open tags when it is absent
    #[inline]
    pub fn candidates(&self, hash: u64) -> &[u32] {
        self.lookup_hash(hash).unwrap_or(&self.open)
    }
}

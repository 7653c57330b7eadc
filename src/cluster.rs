use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use bstr::ByteSlice;

use crate::errors::{Error, Result};
use crate::hash::HashBits;
use crate::table::HashTable;
use crate::translation::TranslationTables;

/// Word clusters read from a `word<TAB>cluster_id` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordClusters {
    name: String,
    items: Vec<(String, u32)>,
}

impl WordClusters {
    /// Create word clusters from `(word, cluster id)` pairs.
    ///
    /// `name` identifies the lexicon inside feature identities, so it must be
    /// stable between training and tagging.
    pub fn new<S, I, W>(name: S, items: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (W, u32)>,
        W: Into<String>,
    {
        Self {
            name: name.into(),
            items: items.into_iter().map(|(w, id)| (w.into(), id)).collect(),
        }
    }

    /// Parse one `word<TAB>cluster_id` pair per line
    pub fn read<S: Into<String>, R: BufRead>(name: S, reader: R) -> Result<Self> {
        let mut items = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let (word, id) = match (fields.next(), fields.next(), fields.next()) {
                (Some(word), Some(id), None) => (word, id),
                _ => {
                    return Err(Error::format(format!(
                        "line {}: expected word<TAB>cluster_id",
                        lineno + 1
                    )))
                }
            };
            let id = id.trim().parse::<u32>().map_err(|e| {
                Error::format(format!("line {}: invalid cluster id: {}", lineno + 1, e))
            })?;
            items.push((word.to_string(), id));
        }
        Ok(Self {
            name: name.into(),
            items,
        })
    }

    pub fn from_file<S: Into<String>, P: AsRef<Path>>(name: S, path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::read(name, BufReader::new(file))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// How words are hashed into lexicon keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyHash {
    /// Hash of the raw UTF-8 bytes
    #[default]
    Bytes,
    /// Finalized hash of the normalized codepoints
    Normalized,
}

/// Closed hash map from word to cluster id
///
/// Cluster id 0 is reserved for words without a cluster.
#[derive(Debug, Clone)]
pub struct WordClusterLexicon {
    name: String,
    table: HashTable,
    bits: HashBits,
    key_hash: KeyHash,
}

impl WordClusterLexicon {
    /// Build a lexicon hashing its keys as raw bytes
    pub fn new(clusters: &WordClusters, bits: HashBits) -> Self {
        Self::build(clusters, bits, KeyHash::Bytes)
    }

    pub(crate) fn build(clusters: &WordClusters, bits: HashBits, key_hash: KeyHash) -> Self {
        let mut lexicon = Self {
            name: clusters.name.clone(),
            table: HashTable::with_items(clusters.items.len()),
            bits,
            key_hash,
        };
        let mut collisions = 0usize;
        for (word, id) in &clusters.items {
            let hash = lexicon.key_of_str(word);
            if !lexicon.table.insert(hash, *id) {
                collisions += 1;
            }
        }
        tracing::debug!(
            name = %lexicon.name,
            items = clusters.items.len(),
            capacity = lexicon.table.capacity(),
            collisions,
            key_hash = ?key_hash,
            "built word cluster lexicon"
        );
        lexicon
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_hash(&self) -> KeyHash {
        self.key_hash
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn key_of_str(&self, word: &str) -> u64 {
        match self.key_hash {
            KeyHash::Bytes => self.bits.hash_data(1, word.as_bytes()),
            KeyHash::Normalized => {
                let cps = TranslationTables::get().normalize_str(word);
                self.bits.fmix(self.bits.hash_codepoints(&cps))
            }
        }
    }

    /// Key of a field given as codepoints
    pub(crate) fn key_of_codepoints(
        &self,
        cps: &[u32],
        utf8: &mut Vec<u8>,
        normalized: &mut Vec<u32>,
    ) -> u64 {
        match self.key_hash {
            KeyHash::Bytes => {
                utf8.clear();
                let mut buf = [0u8; 4];
                for c in cps.iter().filter_map(|&cp| char::from_u32(cp)) {
                    utf8.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
                self.bits.hash_data(1, utf8)
            }
            KeyHash::Normalized => {
                let tables = TranslationTables::get();
                normalized.clear();
                normalized.extend(cps.iter().map(|&cp| tables.normalize(cp)));
                self.bits.fmix(self.bits.hash_codepoints(normalized))
            }
        }
    }

    /// Key of a field given as raw bytes
    pub(crate) fn key_of_bytes(&self, bytes: &[u8]) -> Result<u64, bstr::Utf8Error> {
        match self.key_hash {
            KeyHash::Bytes => Ok(self.bits.hash_data(1, bytes)),
            KeyHash::Normalized => Ok(self.key_of_str(bytes.to_str()?)),
        }
    }

    /// Cluster id stored under a key hash, 0 when absent
    #[inline]
    pub fn lookup_hash(&self, hash: u64) -> u32 {
        self.table.get(hash).unwrap_or(0)
    }

    /// Cluster id of a word, 0 when absent
    pub fn lookup(&self, word: &str) -> u32 {
        self.lookup_hash(self.key_of_str(word))
    }
}

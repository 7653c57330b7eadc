use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use bstr::ByteSlice;
use cqdb::{CQDBWriter, CQDB};

use crate::errors::{Error, Result};

type MappingFn = dyn Fn(&str) -> String + Send + Sync;

/// A function deriving a coarser value from a tag
///
/// Feature templates may refer to a mapped tag instead of the tag itself,
/// e.g. only the part-of-speech of a tag carrying morphological features.
#[derive(Clone)]
pub struct TagMapping {
    name: String,
    fun: Arc<MappingFn>,
}

impl TagMapping {
    pub fn new<S, F>(name: S, fun: F) -> Self
    where
        S: Into<String>,
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fun: Arc::new(fun),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, tag: &str) -> String {
        (self.fun)(tag)
    }
}

impl fmt::Debug for TagMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagMapping").field("name", &self.name).finish()
    }
}

/// One distinct derived-tag column
#[derive(Debug, Clone)]
struct Subset {
    /// Output of the mapping for every tag id
    column: Vec<String>,
    /// Dense index of every output, in sorted output order
    indexed: Vec<u64>,
    bits: u32,
    shift: u32,
}

/// The dense label space of a tagger
#[derive(Debug, Clone)]
pub struct Tagset {
    /// Sorted distinct tags, indexed by tag id
    tags: Vec<String>,
    index: HashMap<String, u32>,
    bits: u32,
    /// Training column holding the tags
    tag_field: Option<usize>,
    subsets: Vec<Subset>,
    /// Bit-packed derived values, one per tag id
    packed: Vec<u64>,
    packed_bits: u32,
    frozen: bool,
}

/// Number of bits needed to store `n` distinct values
fn bits_for(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

impl Tagset {
    /// Create a tagset from the tags observed in the tag column of training data
    pub fn new<I, S>(tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: Vec<String> = tags.into_iter().map(|t| t.as_ref().to_string()).collect();
        tags.sort();
        tags.dedup();
        if tags.is_empty() {
            return Err(Error::config("tagset must contain at least one tag"));
        }
        let index = tags
            .iter()
            .enumerate()
            .map(|(i, tag)| (tag.clone(), i as u32))
            .collect();
        let bits = bits_for(tags.len());
        Ok(Self {
            tags,
            index,
            bits,
            tag_field: None,
            subsets: Vec::new(),
            packed: Vec::new(),
            packed_bits: 0,
            frozen: false,
        })
    }

    /// Number of tags, also the sentinel value for positions before the sequence
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Number of bits needed for a tag id
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Convert a tag id to tag string
    pub fn tag(&self, id: u32) -> Option<&str> {
        self.tags.get(id as usize).map(String::as_str)
    }

    /// Convert a tag string to tag id
    pub fn id(&self, tag: &str) -> Option<u32> {
        self.index.get(tag).copied()
    }

    /// Convert tag strings to ids, failing on the first unknown tag
    pub fn ids<I, S>(&self, tags: I) -> Result<Vec<u32>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tags.into_iter()
            .map(|tag| {
                let tag = tag.as_ref();
                self.id(tag)
                    .ok_or_else(|| Error::config(format!("unknown tag '{}'", tag)))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.tags
            .iter()
            .enumerate()
            .map(|(id, tag)| (id as u32, tag.as_str()))
    }

    pub fn tag_field(&self) -> Option<usize> {
        self.tag_field
    }

    /// Declare which training column holds the tags.
    ///
    /// Declaring the same column again is a no-op, a different one is an error.
    pub fn set_tag_field(&mut self, field: usize) -> Result<()> {
        match self.tag_field {
            Some(existing) if existing != field => Err(Error::config(format!(
                "only one tag field is supported, already using field {} (got {})",
                existing, field
            ))),
            _ => {
                self.tag_field = Some(field);
                Ok(())
            }
        }
    }

    /// Register a derived-tag mapping, returning its subset index.
    ///
    /// Mappings producing the same column of outputs share one subset.
    pub fn register_mapping(&mut self, mapping: &TagMapping) -> Result<usize> {
        if self.frozen {
            return Err(Error::config(format!(
                "cannot register tag mapping '{}' on a finalized tagset",
                mapping.name()
            )));
        }
        let column: Vec<String> = self.tags.iter().map(|tag| mapping.apply(tag)).collect();
        if let Some(idx) = self.subsets.iter().position(|s| s.column == column) {
            return Ok(idx);
        }
        let mut distinct = column.clone();
        distinct.sort();
        distinct.dedup();
        let indexed = column
            .iter()
            .map(|value| distinct.binary_search(value).unwrap_or(0) as u64)
            .collect();
        self.subsets.push(Subset {
            column,
            indexed,
            bits: bits_for(distinct.len()),
            shift: 0,
        });
        Ok(self.subsets.len() - 1)
    }

    /// Assign shifts and pack all registered subsets, freezing the tagset.
    pub fn finalize(&mut self) -> Result<()> {
        if self.frozen {
            return Ok(());
        }
        let total: u32 = self.subsets.iter().map(|s| s.bits).sum();
        if total > 64 {
            return Err(Error::config(format!(
                "tag mappings need {} bits, at most 64 are available",
                total
            )));
        }
        let mut shift = 0;
        for subset in &mut self.subsets {
            subset.shift = shift;
            shift += subset.bits;
        }
        self.packed = (0..self.tags.len())
            .map(|tag| {
                self.subsets
                    .iter()
                    .fold(0u64, |acc, s| acc | s.indexed[tag].checked_shl(s.shift).unwrap_or(0))
            })
            .collect();
        self.packed_bits = if total <= 32 { 32 } else { 64 };
        self.frozen = true;
        tracing::debug!(
            tags = self.tags.len(),
            subsets = self.subsets.len(),
            subset_bits = total,
            "finalized tagset"
        );
        Ok(())
    }

    /// Width of the packed subset column, 32 or 64
    pub fn packed_bits(&self) -> u32 {
        self.packed_bits
    }

    /// Packed derived values of a tag id
    pub fn packed(&self, id: u32) -> Option<u64> {
        self.packed.get(id as usize).copied()
    }

    /// Bit mask selecting one subset inside the packed value
    pub fn subset_mask(&self, subset: usize) -> u64 {
        let s = &self.subsets[subset];
        if s.bits == 0 {
            0
        } else {
            (u64::MAX >> (64 - s.bits)) << s.shift
        }
    }

    /// Derived value of a tag for hashing.
    ///
    /// The out-of-tagset sentinel passes through unchanged.
    #[inline]
    pub fn mapped_value(&self, subset: usize, tag: u64) -> u64 {
        match self.packed.get(tag as usize) {
            Some(packed) => packed & self.subset_mask(subset),
            None => tag,
        }
    }

    /// Serialize the tag strings and ids as a CQDB database
    pub fn to_cqdb(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = CQDBWriter::new(&mut cursor)?;
            for (id, tag) in self.iter() {
                writer.put(tag, id)?;
            }
        }
        Ok(cursor.into_inner())
    }

    /// Read back a tagset written by [`Tagset::to_cqdb`]
    pub fn from_cqdb(buf: &[u8]) -> Result<Self> {
        let db = CQDB::new(buf)?;
        let mut tags = Vec::new();
        while let Some(tag) = db.to_str(tags.len() as u32) {
            let tag = tag
                .to_str()
                .map_err(|_| Error::format("tag is not valid UTF-8"))?;
            tags.push(tag.to_string());
        }
        let tagset = Self::new(&tags)?;
        for (id, tag) in tags.iter().enumerate() {
            if tagset.id(tag) != Some(id as u32) {
                return Err(Error::format(format!(
                    "tag '{}' is stored out of sorted order",
                    tag
                )));
            }
        }
        Ok(tagset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suc_tags() -> Tagset {
        Tagset::new(["NN|UTR|SIN", "VB|PRS|AKT", "NN|NEU|PLU", "DT|UTR|SIN", "VB|INF|AKT"])
            .unwrap()
    }

    fn pos(tag: &str) -> String {
        tag.split('|').next().unwrap_or(tag).to_string()
    }

    #[test]
    fn test_tagset_sorted_dense_ids() {
        let tagset = Tagset::new(["VERB", "NOUN", "ADJ", "NOUN"]).unwrap();
        assert_eq!(tagset.len(), 3);
        assert_eq!(tagset.id("ADJ"), Some(0));
        assert_eq!(tagset.id("NOUN"), Some(1));
        assert_eq!(tagset.id("VERB"), Some(2));
        assert_eq!(tagset.tag(2), Some("VERB"));
        assert_eq!(tagset.tag(3), None);
        assert_eq!(tagset.bits(), 2);
        assert!(tagset.ids(["ADJ", "X"]).is_err());
    }

    #[test]
    fn test_bits_for() {
        assert_eq!(bits_for(1), 0);
        assert_eq!(bits_for(2), 1);
        assert_eq!(bits_for(3), 2);
        assert_eq!(bits_for(4), 2);
        assert_eq!(bits_for(5), 3);
        assert_eq!(bits_for(17), 5);
    }

    #[test]
    fn test_empty_tagset() {
        assert!(Tagset::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_single_tag_field() {
        let mut tagset = suc_tags();
        tagset.set_tag_field(1).unwrap();
        tagset.set_tag_field(1).unwrap();
        assert!(matches!(tagset.set_tag_field(2), Err(Error::Config(_))));
        assert_eq!(tagset.tag_field(), Some(1));
    }

    #[test]
    fn test_subset_packing() {
        let mut tagset = suc_tags();
        let by_pos = TagMapping::new("pos", pos);
        let first = tagset.register_mapping(&by_pos).unwrap();
        let again = tagset
            .register_mapping(&TagMapping::new("pos-again", pos))
            .unwrap();
        assert_eq!(first, again);
        let number = tagset
            .register_mapping(&TagMapping::new("number", |t: &str| {
                t.split('|').nth(2).unwrap_or("").to_string()
            }))
            .unwrap();
        tagset.finalize().unwrap();

        // pos: DT NN VB -> 2 bits at shift 0; number: AKT PLU SIN -> 2 bits at shift 2
        assert_eq!(tagset.subset_mask(first), 0b0011);
        assert_eq!(tagset.subset_mask(number), 0b1100);
        assert_eq!(tagset.packed_bits(), 32);

        let dt = tagset.id("DT|UTR|SIN").unwrap();
        let nn_plu = tagset.id("NN|NEU|PLU").unwrap();
        let vb = tagset.id("VB|INF|AKT").unwrap();
        assert_eq!(tagset.packed(dt), Some(2 << 2));
        assert_eq!(tagset.packed(nn_plu), Some(1 | (1 << 2)));
        assert_eq!(tagset.packed(vb), Some(2));
        assert_eq!(
            tagset.mapped_value(first, u64::from(tagset.id("NN|UTR|SIN").unwrap())),
            tagset.mapped_value(first, u64::from(nn_plu))
        );
        // sentinel
        assert_eq!(tagset.mapped_value(first, 5), 5);

        assert!(tagset.register_mapping(&by_pos).is_err());
    }

    #[test]
    fn test_subset_overflow() {
        let tags: Vec<String> = (0..300).map(|i| format!("T{:03}", i)).collect();
        let mut tagset = Tagset::new(&tags).unwrap();
        // 9 bits each, eight distinct columns need 72 bits
        for k in 0..8 {
            let mapping = TagMapping::new(format!("m{}", k), move |t: &str| format!("{}{}", k, t));
            tagset.register_mapping(&mapping).unwrap();
        }
        assert!(matches!(tagset.finalize(), Err(Error::Config(_))));
    }

    #[test]
    fn test_cqdb_round_trip() {
        let tagset = suc_tags();
        let buf = tagset.to_cqdb().unwrap();
        let loaded = Tagset::from_cqdb(&buf).unwrap();
        assert_eq!(loaded.len(), tagset.len());
        for (id, tag) in tagset.iter() {
            assert_eq!(loaded.tag(id), Some(tag));
            assert_eq!(loaded.id(tag), Some(id));
        }
    }
}

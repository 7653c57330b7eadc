use std::{fmt, fs, mem, path::Path};

use crate::errors::{Error, Result};
use crate::tagset::Tagset;

const WEIGHT_SIZE: usize = mem::size_of::<f32>();
const MAGIC: &[u8; 4] = b"bTAG";
const VERSION: u32 = 1;
/// magic, version, tagset size
const HEADER_SIZE: usize = 12;

#[inline]
fn unpack_f32(buf: &[u8]) -> f32 {
    f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

#[inline]
fn unpack_u32(buf: &[u8]) -> Result<u32> {
    if buf.len() < 4 {
        return Err(Error::model_load("not enough data for unpacking u32"));
    }
    Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// The trained weights of a tagger
///
/// A flat array of `2^k` weights indexed by the low `k` bits of a feature
/// hash. Stored on disk as little-endian `f32` values.
#[derive(Clone)]
pub struct WeightTable {
    weights: Vec<f32>,
    mask: u64,
}

impl fmt::Debug for WeightTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightTable")
            .field("len", &self.weights.len())
            .finish()
    }
}

impl WeightTable {
    /// Create a weight table from weights in memory
    pub fn from_weights(weights: Vec<f32>) -> Result<Self> {
        let len = weights.len();
        if len == 0 {
            return Err(Error::model_load("weight table is empty"));
        }
        if !len.is_power_of_two() {
            return Err(Error::model_load(format!(
                "{} weights, length must be a power of two",
                len
            )));
        }
        Ok(Self {
            weights,
            mask: len as u64 - 1,
        })
    }

    /// Parse a little-endian `f32` blob
    ///
    /// When `expected_len` is given the table must hold exactly that many
    /// weights.
    pub fn from_bytes(buf: &[u8], expected_len: Option<usize>) -> Result<Self> {
        if buf.len() % WEIGHT_SIZE != 0 {
            return Err(Error::model_load(format!(
                "{} bytes is not a whole number of f32 weights",
                buf.len()
            )));
        }
        let len = buf.len() / WEIGHT_SIZE;
        if let Some(expected) = expected_len {
            if len != expected {
                return Err(Error::model_load(format!(
                    "expected {} weights, found {}",
                    expected, len
                )));
            }
        }
        let weights = buf.chunks_exact(WEIGHT_SIZE).map(unpack_f32).collect();
        let table = Self::from_weights(weights)?;
        tracing::debug!(len = table.len(), "loaded weight table");
        Ok(table)
    }

    /// Read a weight table file
    pub fn load<P: AsRef<Path>>(path: P, expected_len: Option<usize>) -> Result<Self> {
        let buf = fs::read(path)?;
        Self::from_bytes(&buf, expected_len)
    }

    /// Serialize as a little-endian `f32` blob
    pub fn to_bytes(&self) -> Vec<u8> {
        self.weights.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Number of weights
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    /// Weight of a feature hash
    #[inline]
    pub fn weight(&self, hash: u64) -> f32 {
        self.weights[(hash & self.mask) as usize]
    }

    /// Sum of the weights of feature hashes
    pub fn score(&self, hashes: &[u64]) -> f32 {
        hashes.iter().fold(0.0, |sum, &h| sum + self.weight(h))
    }
}

/// A tagset and the weights trained for its tag ids, stored in one file
///
/// The file starts with a 12 byte header (magic `bTAG`, format version and
/// the size of the tagset section, all little-endian), followed by the tags
/// as a CQDB database and the raw weight table.
#[derive(Debug, Clone)]
pub struct Model {
    tagset: Tagset,
    weights: WeightTable,
}

impl Model {
    pub fn new(tagset: Tagset, weights: WeightTable) -> Self {
        Self { tagset, weights }
    }

    /// Parse a model file in memory
    pub fn from_bytes(buf: &[u8], expected_len: Option<usize>) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::model_load("model file is truncated"));
        }
        if &buf[0..4] != MAGIC {
            return Err(Error::model_load("invalid file format, magic mismatch"));
        }
        let version = unpack_u32(&buf[4..])?;
        if version != VERSION {
            return Err(Error::model_load(format!(
                "unsupported model version {}",
                version
            )));
        }
        let tagset_size = unpack_u32(&buf[8..])? as usize;
        let tagset_end = HEADER_SIZE
            .checked_add(tagset_size)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| {
                Error::model_load(format!(
                    "tagset section of {} bytes exceeds the file",
                    tagset_size
                ))
            })?;
        let tagset = Tagset::from_cqdb(&buf[HEADER_SIZE..tagset_end])
            .map_err(|e| Error::model_load(format!("invalid tagset: {}", e)))?;
        let weights = WeightTable::from_bytes(&buf[tagset_end..], expected_len)?;
        Ok(Self { tagset, weights })
    }

    /// Read a model file
    pub fn load<P: AsRef<Path>>(path: P, expected_len: Option<usize>) -> Result<Self> {
        let buf = fs::read(path)?;
        Self::from_bytes(&buf, expected_len)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(&self.tagset, &self.weights)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn tagset(&self) -> &Tagset {
        &self.tagset
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn into_parts(self) -> (Tagset, WeightTable) {
        (self.tagset, self.weights)
    }
}

/// Serialize a tagset and its weights in the model file format
pub(crate) fn encode(tagset: &Tagset, weights: &WeightTable) -> Result<Vec<u8>> {
    let tags = tagset.to_cqdb()?;
    let tagset_size = u32::try_from(tags.len())
        .map_err(|_| Error::model_load("tagset section is too large"))?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + tags.len() + weights.len() * WEIGHT_SIZE);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&tagset_size.to_le_bytes());
    buf.extend_from_slice(&tags);
    buf.extend(weights.as_slice().iter().flat_map(|w| w.to_le_bytes()));
    tracing::debug!(
        tags = tagset.len(),
        weights = weights.len(),
        bytes = buf.len(),
        "encoded model"
    );
    Ok(buf)
}

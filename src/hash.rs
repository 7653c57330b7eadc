//! Hash primitives
//!
//! Every feature value the tagger sees is collapsed into a fixed-width integer
//! by the functions in this module. The exact bit patterns matter: a trained
//! weight table is only meaningful together with the hash functions that
//! produced its indices, so none of these may change.
//!
//! Values of either width are carried as `u64`; 32-bit hashes occupy the low
//! half.

use sha2::{Digest, Sha256};

/// Minimum number of codepoints that must remain outside of an affix.
///
/// Shorter words hash to a per-width constant instead of their affix.
pub const MIN_STEM: usize = 2;

const M1_64: u64 = 14029467366897019727;
const M2_64: u64 = 11400714785074694791;

/// Width of invariant, feature and lexicon hashes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HashBits {
    #[default]
    B32,
    B64,
}

impl HashBits {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(HashBits::B32),
            64 => Some(HashBits::B64),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            HashBits::B32 => 32,
            HashBits::B64 => 64,
        }
    }

    /// Order-sensitive combination of a value `x` into the running hash `y`.
    #[inline]
    pub fn mix(self, x: u64, y: u64) -> u64 {
        match self {
            HashBits::B32 => mix32(x as u32, y as u32) as u64,
            HashBits::B64 => mix64(x, y),
        }
    }

    /// Finalizing avalanche step.
    #[inline]
    pub fn fmix(self, x: u64) -> u64 {
        match self {
            HashBits::B32 => fmix32(x as u32) as u64,
            HashBits::B64 => fmix64(x),
        }
    }

    /// Hash of a raw byte buffer, finalized.
    pub fn hash_data(self, seed: u64, data: &[u8]) -> u64 {
        match self {
            HashBits::B32 => hash_data32(seed as u32, data) as u64,
            HashBits::B64 => hash_data64(seed, data),
        }
    }

    /// Hash of a codepoint buffer. The result is *not* finalized.
    pub fn hash_codepoints(self, cps: &[u32]) -> u64 {
        match self {
            HashBits::B32 => hash_codepoints32(cps) as u64,
            HashBits::B64 => hash_codepoints64(cps),
        }
    }

    /// Constant used for prefixes of words too short to carry one.
    pub fn short_prefix(self) -> u64 {
        match self {
            HashBits::B32 => 0x719986aa,
            HashBits::B64 => 0xc1a7bd3b4e853fc9,
        }
    }

    /// Constant used for suffixes of words too short to carry one.
    pub fn short_suffix(self) -> u64 {
        match self {
            HashBits::B32 => 0x34b020cc,
            HashBits::B64 => 0xb9d9d9fb4440f7bb,
        }
    }

    /// Hash of the first `n` codepoints, or [`Self::short_prefix`].
    pub fn hash_prefix(self, cps: &[u32], n: usize) -> u64 {
        if MIN_STEM + n > cps.len() {
            return self.short_prefix();
        }
        self.hash_codepoints(&cps[..n])
    }

    /// Hash of the last `n` codepoints, or [`Self::short_suffix`].
    pub fn hash_suffix(self, cps: &[u32], n: usize) -> u64 {
        if MIN_STEM + n > cps.len() {
            return self.short_suffix();
        }
        self.hash_codepoints(&cps[cps.len() - n..])
    }

    /// Hash of the first `n` bytes, or [`Self::short_prefix`].
    pub fn hash_prefix_bytes(self, data: &[u8], n: usize) -> u64 {
        if MIN_STEM + n > data.len() {
            return self.short_prefix();
        }
        self.hash_data(1, &data[..n])
    }

    /// Hash of the last `n` bytes, or [`Self::short_suffix`].
    pub fn hash_suffix_bytes(self, data: &[u8], n: usize) -> u64 {
        if MIN_STEM + n > data.len() {
            return self.short_suffix();
        }
        self.hash_data(1, &data[data.len() - n..])
    }

    /// Platform independent constant derived from an identity string.
    ///
    /// This is the leading `bits / 4` hex digits of the SHA-256 digest.
    pub fn fixed_hash(self, ident: &str) -> u64 {
        let digest = Sha256::digest(ident.as_bytes());
        let n = (self.bits() / 8) as usize;
        digest[..n]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }
}

#[inline]
fn mix32(x: u32, y: u32) -> u32 {
    let x = x
        .wrapping_mul(0xcc9e2d51)
        .rotate_left(15)
        .wrapping_mul(0x1b873593);
    (y ^ x)
        .rotate_left(13)
        .wrapping_mul(5)
        .wrapping_add(0xe6546b64)
}

#[inline]
fn mix_tail32(x: u32, y: u32) -> u32 {
    let x = x
        .wrapping_mul(0xcc9e2d51)
        .rotate_left(15)
        .wrapping_mul(0x1b873593);
    y ^ x
}

#[inline]
fn fmix32(x: u32) -> u32 {
    let x = 0x85ebca6b_u32.wrapping_mul(x ^ (x >> 16));
    let x = 0xc2b2ae35_u32.wrapping_mul(x ^ (x >> 13));
    x ^ (x >> 16)
}

#[inline]
fn mix64(x: u64, y: u64) -> u64 {
    let x = x.wrapping_mul(M1_64).rotate_left(31).wrapping_mul(M2_64);
    (y ^ x)
        .rotate_left(31)
        .wrapping_mul(5)
        .wrapping_add(0xbdef9f91b243c6e6)
}

#[inline]
fn mix_tail64(x: u64, y: u64) -> u64 {
    let x = x.wrapping_mul(M1_64).rotate_left(31).wrapping_mul(M2_64);
    y ^ x
}

#[inline]
fn fmix64(x: u64) -> u64 {
    let x = (x ^ (x >> 33)).wrapping_mul(M1_64);
    let x = (x ^ (x >> 29)).wrapping_mul(1609587929392839161);
    x ^ (x >> 32)
}

fn hash_data32(seed: u32, data: &[u8]) -> u32 {
    let mut h = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        h = mix32(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]), h);
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let x = tail
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &b)| acc | (u32::from(b) << (8 * i)));
        h = mix_tail32(x, h);
    }
    fmix32(h ^ data.len() as u32)
}

fn hash_data64(seed: u64, data: &[u8]) -> u64 {
    let mut h = seed;
    let mut i = 0;
    // 8-byte windows advance by 4 bytes
    while i + 8 <= data.len() {
        let mut word = [0u8; 8];
        word.copy_from_slice(&data[i..i + 8]);
        h = mix64(u64::from_le_bytes(word), h);
        i += 4;
    }
    if i < data.len() {
        h = mix_tail64(read64_tail(&data[i..]), h);
    }
    fmix64(h ^ data.len() as u64)
}

/// Bytes `1..=len` are or-ed in above byte 0, where byte `len` reads as zero.
/// A 7-byte tail keeps only its first byte.
fn read64_tail(tail: &[u8]) -> u64 {
    let byte = |k: usize| u64::from(tail.get(k).copied().unwrap_or(0));
    let mut x = byte(0);
    if tail.len() <= 6 {
        for k in 1..=tail.len() {
            x |= byte(k) << (8 * k);
        }
    }
    x
}

fn hash_codepoints32(cps: &[u32]) -> u32 {
    let Some((&first, rest)) = cps.split_first() else {
        return 0x3a5c441;
    };
    let h = rest.iter().fold(first, |h, &c| mix32(c, h));
    h ^ cps.len() as u32
}

fn hash_codepoints64(cps: &[u32]) -> u64 {
    let len = cps.len();
    if len == 0 {
        return 0x7fb838a8a0a95046;
    }
    let pair = |i: usize| u64::from(cps[i]) | (u64::from(cps[i + 1]) << 32);
    let mut h = if len == 1 { u64::from(cps[0]) } else { pair(0) };
    for i in 1..len / 2 {
        h = mix64(pair(i * 2), h);
    }
    if len % 2 == 1 {
        h = mix64(u64::from(cps[len - 1]), h);
    }
    h ^ len as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmix32_known_values() {
        assert_eq!(fmix32(0), 0);
        // murmur3 fmix32(1)
        assert_eq!(fmix32(1), 0x514e28b7);
    }

    #[test]
    fn test_fmix64_known_values() {
        assert_eq!(fmix64(0), 0);
        assert_ne!(fmix64(1), 1);
    }

    #[test]
    fn test_mix_is_order_sensitive() {
        for bits in [HashBits::B32, HashBits::B64] {
            assert_ne!(bits.mix(1, 2), bits.mix(2, 1));
        }
    }

    #[test]
    fn test_hash32_stays_in_low_half() {
        let h = HashBits::B32.hash_data(1, b"hello world");
        assert!(h <= u64::from(u32::MAX));
        let h = HashBits::B32.mix(u64::MAX, u64::MAX);
        assert!(h <= u64::from(u32::MAX));
    }

    #[test]
    fn test_hash_data_depends_on_every_byte() {
        for bits in [HashBits::B32, HashBits::B64] {
            let a = bits.hash_data(1, b"abcdefghij");
            let b = bits.hash_data(1, b"abcdefghiJ");
            let c = bits.hash_data(1, b"Abcdefghij");
            assert_ne!(a, b);
            assert_ne!(a, c);
            assert_ne!(bits.hash_data(1, b""), bits.hash_data(1, b"\0"));
        }
    }

    #[test]
    fn test_read64_tail() {
        assert_eq!(read64_tail(&[1]), 1);
        assert_eq!(read64_tail(&[1, 2, 3]), 0x030201);
        assert_eq!(read64_tail(&[1, 2, 3, 4, 5, 6]), 0x060504030201);
        assert_eq!(read64_tail(&[1, 2, 3, 4, 5, 6, 7]), 1);
    }

    #[test]
    fn test_hash_codepoints_empty() {
        assert_eq!(HashBits::B32.hash_codepoints(&[]), 0x3a5c441);
        assert_eq!(HashBits::B64.hash_codepoints(&[]), 0x7fb838a8a0a95046);
    }

    #[test]
    fn test_hash_codepoints_single() {
        assert_eq!(HashBits::B32.hash_codepoints(&[0x61]), 0x61 ^ 1);
        assert_eq!(
            HashBits::B64.hash_codepoints(&[0x61]),
            mix64(0x61, 0x61) ^ 1
        );
        assert_eq!(
            HashBits::B64.hash_codepoints(&[0x61, 0x62]),
            (0x61 | (0x62 << 32)) ^ 2
        );
    }

    #[test]
    fn test_affix_minimum_stem() {
        let word: Vec<u32> = "walk".chars().map(u32::from).collect();
        for bits in [HashBits::B32, HashBits::B64] {
            assert_eq!(bits.hash_prefix(&word, 2), bits.hash_codepoints(&word[..2]));
            assert_eq!(bits.hash_suffix(&word, 2), bits.hash_codepoints(&word[2..]));
            assert_eq!(bits.hash_prefix(&word, 3), bits.short_prefix());
            assert_eq!(bits.hash_suffix(&word, 3), bits.short_suffix());
            assert_eq!(bits.hash_prefix_bytes(b"walking", 5), bits.hash_data(1, b"walki"));
            assert_eq!(bits.hash_suffix_bytes(b"walking", 3), bits.hash_data(1, b"ing"));
            assert_eq!(bits.hash_suffix_bytes(b"ing", 3), bits.short_suffix());
        }
    }

    #[test]
    fn test_fixed_hash() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(HashBits::B32.fixed_hash("abc"), 0xba7816bf);
        assert_eq!(HashBits::B64.fixed_hash("abc"), 0xba7816bf8f01cfea);
    }

    #[test]
    fn test_from_bits() {
        assert_eq!(HashBits::from_bits(32), Some(HashBits::B32));
        assert_eq!(HashBits::from_bits(64), Some(HashBits::B64));
        assert_eq!(HashBits::from_bits(16), None);
        assert_eq!(HashBits::default().bits(), 32);
    }
}

use std::str::FromStr;

use crate::errors::{Error, Result};
use crate::hash::HashBits;

/// Tagger parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggerConfig {
    beam_size: usize,
    hash_bits: HashBits,
    n_train_fields: usize,
    weights_len: Option<usize>,
    use_lexicon: bool,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            beam_size: 4,
            hash_bits: HashBits::B32,
            n_train_fields: 2,
            weights_len: None,
            use_lexicon: true,
        }
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("invalid value for {}: {}", name, value)))
}

impl TaggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of hypotheses kept while decoding, 1 for greedy search
    pub fn beam_size(&self) -> usize {
        self.beam_size
    }

    pub fn set_beam_size(&mut self, beam_size: usize) -> Result<()> {
        if beam_size < 1 {
            return Err(Error::config("beam_size must be at least 1"));
        }
        self.beam_size = beam_size;
        Ok(())
    }

    /// Width of invariant, feature and lexicon hashes
    pub fn hash_bits(&self) -> HashBits {
        self.hash_bits
    }

    pub fn set_hash_bits(&mut self, bits: u32) -> Result<()> {
        self.hash_bits =
            HashBits::from_bits(bits).ok_or_else(|| Error::config("hash_bits must be 32 or 64"))?;
        Ok(())
    }

    /// Number of columns in training data, including the tag column
    pub fn n_train_fields(&self) -> usize {
        self.n_train_fields
    }

    pub fn set_n_train_fields(&mut self, n_train_fields: usize) -> Result<()> {
        if n_train_fields < 2 {
            return Err(Error::config("n_train_fields must be at least 2"));
        }
        self.n_train_fields = n_train_fields;
        Ok(())
    }

    /// Number of columns of the rows passed to the tagger
    pub fn n_input_fields(&self) -> usize {
        self.n_train_fields - 1
    }

    /// Required length of the weight table, if any
    pub fn weights_len(&self) -> Option<usize> {
        self.weights_len
    }

    pub fn set_weights_len(&mut self, weights_len: Option<usize>) -> Result<()> {
        if let Some(len) = weights_len {
            if !len.is_power_of_two() {
                return Err(Error::config("weights_len must be a power of two"));
            }
        }
        self.weights_len = weights_len;
        Ok(())
    }

    /// Whether the tag lexicon restricts the candidate tags
    pub fn use_lexicon(&self) -> bool {
        self.use_lexicon
    }

    pub fn set_use_lexicon(&mut self, use_lexicon: bool) {
        self.use_lexicon = use_lexicon;
    }

    /// Set a parameter from its string representation
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "beam_size" => self.set_beam_size(parse(name, value)?),
            "hash_bits" => self.set_hash_bits(parse(name, value)?),
            "n_train_fields" => self.set_n_train_fields(parse(name, value)?),
            "weights_len" => match value.trim() {
                "" | "none" => self.set_weights_len(None),
                _ => self.set_weights_len(Some(parse(name, value)?)),
            },
            "use_lexicon" => {
                self.set_use_lexicon(parse(name, value)?);
                Ok(())
            }
            _ => Err(Error::config(format!("unknown parameter: {}", name))),
        }
    }

    /// Get the string representation of a parameter
    pub fn get(&self, name: &str) -> Result<String> {
        Ok(match name {
            "beam_size" => self.beam_size.to_string(),
            "hash_bits" => self.hash_bits.bits().to_string(),
            "n_train_fields" => self.n_train_fields.to_string(),
            "weights_len" => self
                .weights_len
                .map_or_else(|| "none".to_string(), |len| len.to_string()),
            "use_lexicon" => self.use_lexicon.to_string(),
            _ => return Err(Error::config(format!("unknown parameter: {}", name))),
        })
    }

    /// Names of all parameters
    pub fn params() -> &'static [&'static str] {
        &[
            "beam_size",
            "hash_bits",
            "n_train_fields",
            "weights_len",
            "use_lexicon",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TaggerConfig::default();
        assert_eq!(config.beam_size(), 4);
        assert_eq!(config.hash_bits(), HashBits::B32);
        assert_eq!(config.n_train_fields(), 2);
        assert_eq!(config.n_input_fields(), 1);
        assert_eq!(config.weights_len(), None);
        assert!(config.use_lexicon());
    }

    #[test]
    fn test_set_get() {
        let mut config = TaggerConfig::new();
        config.set("beam_size", "1").unwrap();
        config.set("hash_bits", "64").unwrap();
        config.set("n_train_fields", "3").unwrap();
        config.set("weights_len", "1024").unwrap();
        config.set("use_lexicon", "false").unwrap();
        assert_eq!(config.get("beam_size").unwrap(), "1");
        assert_eq!(config.get("hash_bits").unwrap(), "64");
        assert_eq!(config.get("n_train_fields").unwrap(), "3");
        assert_eq!(config.get("weights_len").unwrap(), "1024");
        assert_eq!(config.get("use_lexicon").unwrap(), "false");
        config.set("weights_len", "none").unwrap();
        assert_eq!(config.weights_len(), None);
        for name in TaggerConfig::params() {
            assert!(config.get(name).is_ok());
        }
    }

    #[test]
    fn test_validation() {
        let mut config = TaggerConfig::new();
        let err = config.set("beam_size", "0").unwrap_err();
        assert_eq!(err.to_string(), "beam_size must be at least 1");
        let err = config.set("hash_bits", "16").unwrap_err();
        assert_eq!(err.to_string(), "hash_bits must be 32 or 64");
        let err = config.set("weights_len", "1000").unwrap_err();
        assert_eq!(err.to_string(), "weights_len must be a power of two");
        assert!(config.set("n_train_fields", "1").is_err());
        assert!(config.set("beam_size", "wide").is_err());
        let err = config.set("beam", "4").unwrap_err();
        assert!(err.to_string().contains("unknown parameter"));
        assert!(matches!(config.get("beam"), Err(Error::Config(_))));
        assert_eq!(config, TaggerConfig::default());
    }
}

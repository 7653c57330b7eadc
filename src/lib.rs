//! Hashed-feature sequence tagger with beam search decoding
//!
//! Feature templates over the columns of a token sequence are compiled into
//! hashing plans. Every feature is hashed into a fixed-width integer that
//! directly indexes a flat table of trained weights, and sequences are
//! decoded left to right with beam search.
//!
//! # Examples
//!
//! ```no_run
//! use beamtag::feature::{normalize, suffix, FieldRef, Term};
//! use beamtag::{Model, TagLexicon, Tagger, WordClusters};
//!
//! let clusters = WordClusters::from_file("brown", "clusters.txt")?;
//! let model = Model::load("tagger.model", None)?;
//!
//! let (mut builder, weights) = Tagger::builder_from_model(model);
//! builder.set("beam_size", "4")?;
//! let this_tag = builder.tag(1, 0)?;
//! let last_tag = builder.tag(1, -1)?;
//! let this_word = FieldRef::new(0, 0);
//! let next_cluster = builder.lookup(FieldRef::new(0, 1), &clusters);
//!
//! builder
//!     .template([this_tag, last_tag])?
//!     .template([Term::from(this_tag), normalize(this_word).into()])?
//!     .template([Term::from(this_tag), suffix(normalize(this_word), 3).into()])?
//!     .template([Term::from(this_tag), next_cluster.into()])?;
//!
//! let mut lexicon = TagLexicon::builder();
//! lexicon.insert("the", ["DET"]).open_tags(["ADJ", "NOUN", "VERB"]);
//! builder.tag_lexicon(0, lexicon);
//!
//! let tagger = builder.build(weights)?;
//! let tags = tagger.tag_tokens(&["The", "old", "man", "the", "boat"])?;
//! # Ok::<(), beamtag::Error>(())
//! ```

mod cluster;
mod compiler;
mod config;
mod context;
mod dataset;
mod errors;
pub mod feature;
pub mod hash;
mod lexicon;
mod model;
mod search;
mod table;
mod tagger;
mod tagset;
pub mod translation;

pub use self::cluster::{KeyHash, WordClusterLexicon, WordClusters};
pub use self::compiler::{FeaturePlan, InvariantPlan};
pub use self::config::TaggerConfig;
pub use self::context::Context;
pub use self::dataset::{Instance, MAX_FIELD_BYTES};
pub use self::errors::{Error, Result};
pub use self::hash::HashBits;
pub use self::lexicon::{TagLexicon, TagLexiconBuilder};
pub use self::model::{Model, WeightTable};
pub use self::table::HashTable;
pub use self::tagger::{Tagger, TaggerBuilder};
pub use self::tagset::{TagMapping, Tagset};

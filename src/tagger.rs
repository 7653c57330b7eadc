use std::fs;
use std::path::Path;
use std::slice;

use crate::cluster::{KeyHash, WordClusterLexicon, WordClusters};
use crate::compiler::{self, Columns, FeaturePlan, InvariantPlan, Invariants};
use crate::config::TaggerConfig;
use crate::context::Context;
use crate::dataset::Instance;
use crate::errors::{Error, Result};
use crate::feature::{ClusterRef, FeatureTemplate, Form, TagRef, Term};
use crate::lexicon::{TagLexicon, TagLexiconBuilder};
use crate::model::{self, Model, WeightTable};
use crate::search::Search;
use crate::tagset::{TagMapping, Tagset};
use crate::translation::Translation;

/// Word clusters bound to forms, built into lexicons with the tagger
#[derive(Debug, Clone)]
struct ClusterSource {
    clusters: WordClusters,
    /// Looked up through a normalized form
    normalized: bool,
}

/// Assembles and validates everything a [`Tagger`] needs
#[derive(Debug, Clone)]
pub struct TaggerBuilder {
    config: TaggerConfig,
    tagset: Tagset,
    templates: Vec<FeatureTemplate>,
    clusters: Vec<ClusterSource>,
    lexicon: Option<(usize, TagLexiconBuilder)>,
}

impl TaggerBuilder {
    pub fn new(tagset: Tagset) -> Self {
        Self::with_config(tagset, TaggerConfig::default())
    }

    pub fn with_config(tagset: Tagset, config: TaggerConfig) -> Self {
        Self {
            config,
            tagset,
            templates: Vec::new(),
            clusters: Vec::new(),
            lexicon: None,
        }
    }

    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TaggerConfig {
        &mut self.config
    }

    /// Set a configuration parameter from its string representation
    pub fn set(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        self.config.set(name, value)?;
        Ok(self)
    }

    pub fn tagset(&self) -> &Tagset {
        &self.tagset
    }

    /// Reference the tag in training column `field`, `offset` positions away
    /// from the token being tagged.
    ///
    /// Only already decided tags (`offset <= 0`) can be referenced, and all
    /// references must use the same column.
    pub fn tag(&mut self, field: usize, offset: isize) -> Result<TagRef> {
        if offset > 0 {
            return Err(Error::config(format!(
                "tag offset {} refers to a tag that is not decided yet",
                offset
            )));
        }
        self.tagset.set_tag_field(field)?;
        Ok(TagRef {
            offset,
            subset: None,
        })
    }

    /// Like [`TaggerBuilder::tag`], hashing the value `mapping` derives from
    /// the tag instead of the tag itself
    pub fn mapped_tag(
        &mut self,
        field: usize,
        offset: isize,
        mapping: &TagMapping,
    ) -> Result<TagRef> {
        let mut tag = self.tag(field, offset)?;
        tag.subset = Some(self.tagset.register_mapping(mapping)?);
        Ok(tag)
    }

    /// Look up `form` in a word cluster lexicon
    ///
    /// Lexicons are identified by name. Once any form is looked up through
    /// `normalize`, every lookup of that lexicon is case-insensitive.
    pub fn lookup<F: Into<Form>>(&mut self, form: F, clusters: &WordClusters) -> Form {
        let form = form.into();
        let index = match self
            .clusters
            .iter()
            .position(|c| c.clusters.name() == clusters.name())
        {
            Some(index) => index,
            None => {
                self.clusters.push(ClusterSource {
                    clusters: clusters.clone(),
                    normalized: false,
                });
                self.clusters.len() - 1
            }
        };
        if form.translation() == Some(Translation::Normalize) {
            self.clusters[index].normalized = true;
        }
        form.lookup(ClusterRef {
            index,
            name: clusters.name().to_string(),
        })
    }

    /// Add a feature template
    pub fn template<I, T>(&mut self, terms: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<Term>,
    {
        let template = FeatureTemplate::new(terms);
        for form in template.forms() {
            if let Some(reason) = &form.invalid {
                return Err(Error::config(reason.clone()));
            }
        }
        if template.tags().next().is_none() {
            return Err(Error::config(format!(
                "feature template {} does not reference any tag",
                self.templates.len() + 1
            )));
        }
        self.templates.push(template);
        Ok(self)
    }

    /// Restrict the candidate tags of each token to those listed for the
    /// normalized value of its `field`
    pub fn tag_lexicon(&mut self, field: usize, lexicon: TagLexiconBuilder) -> &mut Self {
        self.lexicon = Some((field, lexicon));
        self
    }

    /// Validate the configuration and freeze it into a tagger
    pub fn build(mut self, weights: WeightTable) -> Result<Tagger> {
        if let Some(expected) = self.config.weights_len() {
            if weights.len() != expected {
                return Err(Error::model_load(format!(
                    "expected {} weights, found {}",
                    expected,
                    weights.len()
                )));
            }
        }
        if self.templates.is_empty() {
            return Err(Error::config("no feature templates"));
        }
        let tag_field = self
            .tagset
            .tag_field()
            .ok_or_else(|| Error::config("no tag field"))?;
        let n_train_fields = self.config.n_train_fields();
        if tag_field >= n_train_fields {
            return Err(Error::config(format!(
                "tag field {} is out of range, training data has {} fields",
                tag_field, n_train_fields
            )));
        }
        let columns = Columns {
            n_train_fields,
            tag_field,
        };
        self.tagset.finalize()?;

        let bits = self.config.hash_bits();
        let clusters = self
            .clusters
            .iter()
            .map(|source| {
                let key_hash = if source.normalized {
                    KeyHash::Normalized
                } else {
                    KeyHash::Bytes
                };
                WordClusterLexicon::build(&source.clusters, bits, key_hash)
            })
            .collect();
        let (lexicon_field, lexicon) = match &self.lexicon {
            Some((field, builder)) => (Some(*field), Some(builder.build(&self.tagset, bits)?)),
            None => (None, None),
        };
        let (invariants, features, lexicon_key) =
            compiler::compile(&self.templates, columns, lexicon_field, bits)?;

        tracing::info!(
            tags = self.tagset.len(),
            templates = features.len(),
            invariants = invariants.len(),
            weights = weights.len(),
            beam_size = self.config.beam_size(),
            hash_bits = bits.bits(),
            "built tagger"
        );
        Ok(Tagger {
            config: self.config,
            tagset: self.tagset,
            columns,
            invariants,
            features,
            clusters,
            lexicon: lexicon.zip(lexicon_key),
            weights,
        })
    }
}

/// The tagger assigns a tag to every token of a sequence
///
/// A tagger is immutable and can be shared between threads; each call keeps
/// its working state in a [`Context`].
#[derive(Debug, Clone)]
pub struct Tagger {
    config: TaggerConfig,
    tagset: Tagset,
    columns: Columns,
    invariants: InvariantPlan,
    features: FeaturePlan,
    clusters: Vec<WordClusterLexicon>,
    /// Tag lexicon and the invariant holding its key
    lexicon: Option<(TagLexicon, usize)>,
    weights: WeightTable,
}

impl Tagger {
    pub fn builder(tagset: Tagset) -> TaggerBuilder {
        TaggerBuilder::new(tagset)
    }

    /// Start building a tagger from a saved model, returning the weights to
    /// pass to [`TaggerBuilder::build`]
    pub fn builder_from_model(model: Model) -> (TaggerBuilder, WeightTable) {
        let (tagset, weights) = model.into_parts();
        (TaggerBuilder::new(tagset), weights)
    }

    /// Save the tagset and weights of this tagger as a model file
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let buf = model::encode(&self.tagset, &self.weights)?;
        fs::write(path, buf)?;
        Ok(())
    }

    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    pub fn tagset(&self) -> &Tagset {
        &self.tagset
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn invariant_plan(&self) -> &InvariantPlan {
        &self.invariants
    }

    pub fn feature_plan(&self) -> &FeaturePlan {
        &self.features
    }

    pub fn tag_lexicon(&self) -> Option<&TagLexicon> {
        self.lexicon.as_ref().map(|(lexicon, _)| lexicon)
    }

    /// Number of columns expected in each row
    pub fn n_input_fields(&self) -> usize {
        self.columns.n_input_fields()
    }

    fn search(&self) -> Search<'_> {
        Search {
            features: &self.features,
            weights: &self.weights,
            tagset: &self.tagset,
            lexicon: self
                .lexicon
                .as_ref()
                .filter(|_| self.config.use_lexicon())
                .map(|(lexicon, key)| (lexicon, *key)),
        }
    }

    /// Validate the rows and fill the invariant matrix of `ctx`
    fn prepare<R, B>(&self, ctx: &mut Context, rows: &[R]) -> Result<()>
    where
        R: AsRef<[B]>,
        B: AsRef<[u8]>,
    {
        let mut instance = Instance::with_capacity(self.n_input_fields(), rows.len());
        for row in rows {
            instance.push(row.as_ref())?;
        }
        ctx.reset(instance.num_items(), self.config.beam_size());
        self.invariants.extract(
            &instance,
            &self.clusters,
            &mut ctx.scratch,
            &mut ctx.invariants,
        )
    }

    /// Tag a sequence, keeping the result and working state in `ctx`.
    pub fn tag_with<R, B>(&self, ctx: &mut Context, rows: &[R]) -> Result<()>
    where
        R: AsRef<[B]>,
        B: AsRef<[u8]>,
    {
        let beam_size = self.config.beam_size();
        let _span = tracing::debug_span!("decode", n_items = rows.len(), beam_size).entered();
        self.prepare(ctx, rows)?;
        self.search().run(beam_size, ctx);
        Ok(())
    }

    /// Predict the tag ids of a sequence of rows
    pub fn tag_ids<R, B>(&self, rows: &[R]) -> Result<Vec<u32>>
    where
        R: AsRef<[B]>,
        B: AsRef<[u8]>,
    {
        let mut ctx = Context::new();
        self.tag_with(&mut ctx, rows)?;
        Ok(ctx.result)
    }

    /// Predict the tags of a sequence of rows
    pub fn tag<R, B>(&self, rows: &[R]) -> Result<Vec<&str>>
    where
        R: AsRef<[B]>,
        B: AsRef<[u8]>,
    {
        let ids = self.tag_ids(rows)?;
        Ok(ids
            .into_iter()
            .filter_map(|id| self.tagset.tag(id))
            .collect())
    }

    /// Predict the tags of a sequence of single-column tokens
    pub fn tag_tokens<B: AsRef<[u8]>>(&self, tokens: &[B]) -> Result<Vec<&str>> {
        let rows: Vec<&[B]> = tokens.iter().map(slice::from_ref).collect();
        self.tag(&rows)
    }

    fn check_position(&self, ctx: &Context, i: usize, history: &[u32], tag: u32) -> Result<()> {
        if i >= ctx.num_items() {
            return Err(Error::decode(i, "position is past the end of the sequence"));
        }
        if history.len() < i {
            return Err(Error::decode(
                i,
                format!("{} history tags given, {} needed", history.len(), i),
            ));
        }
        let n_tags = self.tagset.len();
        if tag as usize >= n_tags || history[..i].iter().any(|&t| t as usize >= n_tags) {
            return Err(Error::config(format!(
                "tag ids must be below {}, the number of tags",
                n_tags
            )));
        }
        Ok(())
    }

    /// Feature hashes of `tag` at position `i`, given the tags of `0..i`
    pub fn feature_hashes<R, B>(
        &self,
        rows: &[R],
        i: usize,
        history: &[u32],
        tag: u32,
    ) -> Result<Vec<u64>>
    where
        R: AsRef<[B]>,
        B: AsRef<[u8]>,
    {
        let mut ctx = Context::new();
        self.prepare(&mut ctx, rows)?;
        self.check_position(&ctx, i, history, tag)?;
        let invariants = Invariants {
            values: &ctx.invariants,
            width: self.invariants.len(),
            n_items: ctx.num_items(),
        };
        let mut hashes = Vec::with_capacity(self.features.len());
        self.features.feature_hashes(
            &self.tagset,
            &invariants,
            i,
            &history[..i],
            tag,
            &mut hashes,
        );
        Ok(hashes)
    }

    /// Score of `tag` at position `i`, given the tags of `0..i`
    pub fn score<R, B>(&self, rows: &[R], i: usize, history: &[u32], tag: u32) -> Result<f32>
    where
        R: AsRef<[B]>,
        B: AsRef<[u8]>,
    {
        let hashes = self.feature_hashes(rows, i, history, tag)?;
        Ok(self.weights.score(&hashes))
    }
}

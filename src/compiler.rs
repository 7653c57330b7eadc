//! Compilation of feature templates into hashing plans
//!
//! Templates are compiled once, when the tagger is built, into two plans:
//!
//! * the [`InvariantPlan`] lists every distinct form value that must be
//!   hashed for each token, independent of the tags being decoded.
//! * the [`FeaturePlan`] describes how each template merges those per-token
//!   hashes with tags into one feature hash per `(position, tag)` pair.

use std::collections::HashMap;

use crate::cluster::WordClusterLexicon;
use crate::dataset::Instance;
use crate::errors::{Error, Result};
use crate::feature::{Affix, FeatureTemplate, Form};
use crate::hash::HashBits;
use crate::model::WeightTable;
use crate::tagset::Tagset;
use crate::translation::{decode_utf8, Translation, TranslationTables, Translations};

/// One per-token hash computation
#[derive(Debug, Clone)]
struct Invariant {
    /// Input column the value is read from
    column: usize,
    translation: Option<Translation>,
    affix: Option<Affix>,
    cluster: Option<usize>,
    ident: String,
}

/// Reusable buffers for invariant extraction
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    codepoints: Vec<u32>,
    translated: Vec<u32>,
    normalized: Vec<u32>,
    utf8: Vec<u8>,
}

/// Deduplicated per-token hash computations, in order of first appearance
#[derive(Debug, Clone)]
pub struct InvariantPlan {
    invariants: Vec<Invariant>,
    index: HashMap<String, usize>,
    /// Evaluation order, grouping invariants by column and translation
    order: Vec<usize>,
    /// Translations needed per input column
    translations: Vec<Translations>,
    bits: HashBits,
}

impl InvariantPlan {
    pub(crate) fn new(bits: HashBits, n_columns: usize) -> Self {
        Self {
            invariants: Vec::new(),
            index: HashMap::new(),
            order: Vec::new(),
            translations: vec![Translations::default(); n_columns],
            bits,
        }
    }

    /// Number of hashes computed per token
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    /// Identities of the invariants, in matrix column order
    pub fn idents(&self) -> impl Iterator<Item = &str> + '_ {
        self.invariants.iter().map(|inv| inv.ident.as_str())
    }

    /// Translations applied to an input column
    pub fn translations(&self, column: usize) -> Translations {
        self.translations.get(column).copied().unwrap_or_default()
    }

    /// Index of the invariant computing `form` read from `column`, added on
    /// first use
    pub(crate) fn intern(&mut self, form: &Form, column: usize) -> usize {
        let ident = form.ident();
        if let Some(&idx) = self.index.get(&ident) {
            return idx;
        }
        if let Some(translation) = form.translation {
            self.translations[column] |= translation.flag();
        }
        let idx = self.invariants.len();
        self.invariants.push(Invariant {
            column,
            translation: form.translation,
            affix: form.affix,
            cluster: form.cluster.as_ref().map(|c| c.index),
            ident: ident.clone(),
        });
        self.index.insert(ident, idx);
        self.order.push(idx);
        let invariants = &self.invariants;
        self.order
            .sort_by_key(|&i| (invariants[i].column, invariants[i].translation));
        idx
    }

    /// Compute the invariant hash matrix `[n_items][len]` of an instance.
    pub(crate) fn extract(
        &self,
        instance: &Instance<'_>,
        clusters: &[WordClusterLexicon],
        scratch: &mut Scratch,
        out: &mut Vec<u64>,
    ) -> Result<()> {
        let n = self.invariants.len();
        out.clear();
        out.resize(instance.num_items() * n, 0);
        if n == 0 {
            return Ok(());
        }
        let tables = TranslationTables::get();
        for (i, row) in out.chunks_exact_mut(n).enumerate() {
            let mut column = None;
            let mut translated = None;
            for &idx in &self.order {
                let inv = &self.invariants[idx];
                let bytes = instance.field(i, inv.column);
                if column != Some(inv.column) {
                    column = Some(inv.column);
                    translated = None;
                    // only columns with translated forms are decoded
                    if !self.translations[inv.column].is_empty() {
                        decode_utf8(bytes, &mut scratch.codepoints).map_err(|_| {
                            Error::decode(i, format!("invalid UTF-8 in column {}", inv.column))
                        })?;
                    }
                }
                row[idx] = match inv.translation {
                    None => self.hash_bytes(inv, bytes, clusters, i)?,
                    Some(translation) => {
                        if translated != Some(translation) {
                            tables.translate(
                                translation,
                                &scratch.codepoints,
                                &mut scratch.translated,
                            );
                            translated = Some(translation);
                        }
                        self.hash_codepoints(inv, clusters, scratch)
                    }
                };
            }
        }
        Ok(())
    }

    fn hash_bytes(
        &self,
        inv: &Invariant,
        bytes: &[u8],
        clusters: &[WordClusterLexicon],
        token: usize,
    ) -> Result<u64> {
        let bits = self.bits;
        if let Some(cluster) = inv.cluster {
            let lexicon = &clusters[cluster];
            let id = match inv.affix {
                None => {
                    let key = lexicon.key_of_bytes(bytes).map_err(|_| {
                        Error::decode(token, format!("invalid UTF-8 in column {}", inv.column))
                    })?;
                    lexicon.lookup_hash(key)
                }
                // an affix cut through a character has no cluster
                Some(affix) => cut(bytes, affix)
                    .and_then(|part| lexicon.key_of_bytes(part).ok())
                    .map_or(0, |key| lexicon.lookup_hash(key)),
            };
            return Ok(u64::from(id));
        }
        Ok(match inv.affix {
            None => bits.hash_data(1, bytes),
            Some(Affix::Prefix(n)) => bits.hash_prefix_bytes(bytes, n),
            Some(Affix::Suffix(n)) => bits.hash_suffix_bytes(bytes, n),
        })
    }

    fn hash_codepoints(
        &self,
        inv: &Invariant,
        clusters: &[WordClusterLexicon],
        scratch: &mut Scratch,
    ) -> u64 {
        let bits = self.bits;
        let cps = &scratch.translated;
        if let Some(cluster) = inv.cluster {
            let lexicon = &clusters[cluster];
            let part = match inv.affix {
                None => Some(cps.as_slice()),
                Some(affix) => cut(cps, affix),
            };
            let id = part.map_or(0, |part| {
                let key =
                    lexicon.key_of_codepoints(part, &mut scratch.utf8, &mut scratch.normalized);
                lexicon.lookup_hash(key)
            });
            return u64::from(id);
        }
        match inv.affix {
            None => bits.hash_codepoints(cps),
            Some(Affix::Prefix(n)) => bits.hash_prefix(cps, n),
            Some(Affix::Suffix(n)) => bits.hash_suffix(cps, n),
        }
    }
}

/// The affix of `data`, unless the remaining stem would be too short
fn cut<T>(data: &[T], affix: Affix) -> Option<&[T]> {
    let n = affix.width();
    if crate::hash::MIN_STEM + n > data.len() {
        return None;
    }
    Some(match affix {
        Affix::Prefix(n) => &data[..n],
        Affix::Suffix(n) => &data[data.len() - n..],
    })
}

/// View of an invariant hash matrix
#[derive(Debug, Clone, Copy)]
pub(crate) struct Invariants<'a> {
    pub values: &'a [u64],
    pub width: usize,
    pub n_items: usize,
}

impl<'a> Invariants<'a> {
    #[inline]
    pub fn get(&self, item: usize, idx: usize) -> u64 {
        self.values[item * self.width + idx]
    }
}

#[derive(Debug, Clone)]
enum Component {
    Form {
        offset: isize,
        invariant: usize,
        /// Value used when `i + offset` is outside of the sequence
        fallback: u64,
    },
    Tag {
        offset: isize,
        subset: Option<usize>,
    },
}

#[derive(Debug, Clone)]
struct Template {
    /// 1-based position of the template
    channel: u64,
    components: Vec<Component>,
}

/// Per-template merge recipes
#[derive(Debug, Clone)]
pub struct FeaturePlan {
    templates: Vec<Template>,
    bits: HashBits,
}

impl FeaturePlan {
    /// Number of templates, also the number of features per scored tag
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    #[inline]
    fn value(
        &self,
        component: &Component,
        tagset: &Tagset,
        invariants: &Invariants<'_>,
        i: usize,
        history: &[u32],
        tag: u32,
    ) -> u64 {
        match *component {
            Component::Form {
                offset,
                invariant,
                fallback,
            } => {
                let pos = i as isize + offset;
                if pos >= 0 && (pos as usize) < invariants.n_items {
                    invariants.get(pos as usize, invariant)
                } else {
                    fallback
                }
            }
            Component::Tag { offset, subset } => {
                let value = if offset == 0 {
                    u64::from(tag)
                } else {
                    let pos = i as isize + offset;
                    if pos >= 0 {
                        u64::from(history[pos as usize])
                    } else {
                        tagset.len() as u64
                    }
                };
                match subset {
                    Some(subset) => tagset.mapped_value(subset, value),
                    None => value,
                }
            }
        }
    }

    #[inline]
    fn hash(
        &self,
        template: &Template,
        tagset: &Tagset,
        invariants: &Invariants<'_>,
        i: usize,
        history: &[u32],
        tag: u32,
    ) -> u64 {
        let bits = self.bits;
        // right fold: mix(channel, mix(f1, ... mix(fn, mix(t1, ... tn))))
        let mut components = template.components.iter().rev();
        let mut acc = match components.next() {
            Some(last) => self.value(last, tagset, invariants, i, history, tag),
            None => return bits.fmix(template.channel),
        };
        for component in components {
            let value = self.value(component, tagset, invariants, i, history, tag);
            acc = bits.mix(value, acc);
        }
        bits.fmix(bits.mix(template.channel, acc))
    }

    /// Feature hashes of every template for `tag` at position `i`.
    ///
    /// `history` holds the tags already decided for positions `0..i`.
    pub(crate) fn feature_hashes(
        &self,
        tagset: &Tagset,
        invariants: &Invariants<'_>,
        i: usize,
        history: &[u32],
        tag: u32,
        out: &mut Vec<u64>,
    ) {
        out.clear();
        out.extend(
            self.templates
                .iter()
                .map(|t| self.hash(t, tagset, invariants, i, history, tag)),
        );
    }

    /// Sum of the weights of all features for `tag` at position `i`
    #[inline]
    pub(crate) fn score(
        &self,
        weights: &WeightTable,
        tagset: &Tagset,
        invariants: &Invariants<'_>,
        i: usize,
        history: &[u32],
        tag: u32,
    ) -> f32 {
        self.templates.iter().fold(0.0, |sum, t| {
            sum + weights.weight(self.hash(t, tagset, invariants, i, history, tag))
        })
    }
}

/// Layout of the input columns
#[derive(Debug, Clone, Copy)]
pub(crate) struct Columns {
    /// Number of columns in training data, including the tag column
    pub n_train_fields: usize,
    pub tag_field: usize,
}

impl Columns {
    /// Input column of a training field, the tag column being absent from
    /// the input.
    pub fn column(&self, field: usize) -> Result<usize> {
        if field == self.tag_field {
            return Err(Error::config(format!(
                "field {} holds the tags and cannot be used as a word form",
                field
            )));
        }
        if field >= self.n_train_fields {
            return Err(Error::config(format!(
                "field {} is out of range, training data has {} fields",
                field, self.n_train_fields
            )));
        }
        Ok(if field < self.tag_field { field } else { field - 1 })
    }

    pub fn n_input_fields(&self) -> usize {
        self.n_train_fields - 1
    }
}

/// Compile validated templates into hashing plans.
pub(crate) fn compile(
    templates: &[FeatureTemplate],
    columns: Columns,
    lexicon_field: Option<usize>,
    bits: HashBits,
) -> Result<(InvariantPlan, FeaturePlan, Option<usize>)> {
    let mut invariants = InvariantPlan::new(bits, columns.n_input_fields());
    let mut plan = FeaturePlan {
        templates: Vec::with_capacity(templates.len()),
        bits,
    };
    for (idx, template) in templates.iter().enumerate() {
        // forms merge before tags, whatever the declaration order
        let mut components = Vec::with_capacity(template.terms.len());
        for form in template.forms() {
            let column = columns.column(form.field())?;
            components.push(Component::Form {
                offset: form.offset(),
                invariant: invariants.intern(form, column),
                fallback: bits.fixed_hash(&form.ident()),
            });
        }
        components.extend(template.tags().map(|tag| Component::Tag {
            offset: tag.offset,
            subset: tag.subset,
        }));
        plan.templates.push(Template {
            channel: idx as u64 + 1,
            components,
        });
    }
    let lexicon_key = match lexicon_field {
        Some(field) => {
            let form = crate::feature::normalize(crate::feature::FieldRef::new(field, 0));
            Some(invariants.intern(&form, columns.column(field)?))
        }
        None => None,
    };
    tracing::debug!(
        templates = plan.len(),
        invariants = invariants.len(),
        lexicon_key = ?lexicon_key,
        "compiled feature templates"
    );
    Ok((invariants, plan, lexicon_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{KeyHash, WordClusters};
    use crate::feature::{
        abstract_, normalize, prefix, suffix, ClusterRef, FieldRef, TagRef, Term,
    };

    const COLUMNS: Columns = Columns {
        n_train_fields: 3,
        tag_field: 1,
    };

    fn tag(offset: isize) -> Term {
        Term::Tag(TagRef {
            offset,
            subset: None,
        })
    }

    fn instance<'a>(rows: &'a [[&'a str; 2]]) -> Instance<'a> {
        let mut instance = Instance::with_capacity(2, rows.len());
        for row in rows {
            instance.push(row).unwrap();
        }
        instance
    }

    #[test]
    fn test_columns() {
        assert_eq!(COLUMNS.column(0).unwrap(), 0);
        assert_eq!(COLUMNS.column(2).unwrap(), 1);
        assert!(matches!(COLUMNS.column(1), Err(Error::Config(_))));
        assert!(matches!(COLUMNS.column(3), Err(Error::Config(_))));
    }

    #[test]
    fn test_invariants_deduplicated() {
        let templates = vec![
            FeatureTemplate::new([tag(0), FieldRef::new(0, 0).into()]),
            FeatureTemplate::new([tag(0), FieldRef::new(0, -1).into()]),
            FeatureTemplate::new([tag(0), normalize(FieldRef::new(0, 1)).into()]),
            FeatureTemplate::new([tag(0), suffix(normalize(FieldRef::new(2, 0)), 2).into()]),
        ];
        let (invariants, plan, key) =
            compile(&templates, COLUMNS, Some(0), HashBits::B32).unwrap();
        assert_eq!(plan.len(), 4);
        let idents: Vec<&str> = invariants.idents().collect();
        assert_eq!(idents, ["0_x_x", "0_x_normalize", "2_suf2_normalize"]);
        // the lexicon key reuses normalize(field 0)
        assert_eq!(key, Some(1));
        assert!(invariants.translations(0).contains(Translations::NORMALIZE));
        assert!(invariants.translations(1).contains(Translations::NORMALIZE));
    }

    #[test]
    fn test_extract() {
        let templates = vec![
            FeatureTemplate::new([tag(0), FieldRef::new(0, 0).into()]),
            FeatureTemplate::new([tag(0), normalize(FieldRef::new(0, 0)).into()]),
            FeatureTemplate::new([tag(0), abstract_(FieldRef::new(0, 0)).into()]),
            FeatureTemplate::new([tag(0), prefix(FieldRef::new(2, 0), 2).into()]),
            FeatureTemplate::new([tag(0), suffix(normalize(FieldRef::new(0, 0)), 3).into()]),
        ];
        for bits in [HashBits::B32, HashBits::B64] {
            let (plan, _, _) = compile(&templates, COLUMNS, None, bits).unwrap();
            let rows = [["Walking", "x"], ["on", "yz"]];
            let instance = instance(&rows);
            let mut out = Vec::new();
            plan.extract(&instance, &[], &mut Scratch::default(), &mut out)
                .unwrap();
            assert_eq!(out.len(), 2 * plan.len());
            let walking: Vec<u32> = "walking".chars().map(u32::from).collect();
            assert_eq!(out[0], bits.hash_data(1, b"Walking"));
            assert_eq!(out[1], bits.hash_codepoints(&walking));
            assert_eq!(out[3], bits.short_prefix());
            assert_eq!(out[4], bits.hash_codepoints(&walking[4..]));
            let on = plan.len();
            assert_eq!(out[on], bits.hash_data(1, b"on"));
            assert_eq!(out[on + 4], bits.short_suffix());
            // Walking and on have different shapes
            assert_ne!(out[2], out[on + 2]);
        }
    }

    #[test]
    fn test_extract_invalid_utf8() {
        let templates = vec![FeatureTemplate::new([
            tag(0),
            normalize(FieldRef::new(0, 0)).into(),
        ])];
        let (plan, _, _) = compile(&templates, COLUMNS, None, HashBits::B32).unwrap();
        let rows: [[&[u8]; 2]; 2] = [[b"ok", b""], [b"\xff", b""]];
        let mut instance = Instance::with_capacity(2, 2);
        for row in &rows {
            instance.push(row).unwrap();
        }
        let mut out = Vec::new();
        let err = plan
            .extract(&instance, &[], &mut Scratch::default(), &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::Decode { token: 1, .. }));
    }

    #[test]
    fn test_extract_decodes_translated_columns_only() {
        let templates = vec![
            FeatureTemplate::new([tag(0), FieldRef::new(0, 0).into()]),
            FeatureTemplate::new([tag(0), normalize(FieldRef::new(2, 0)).into()]),
        ];
        let (plan, _, _) = compile(&templates, COLUMNS, None, HashBits::B32).unwrap();
        assert!(plan.translations(0).is_empty());
        assert_eq!(plan.translations(1), Translations::NORMALIZE);

        // column 0 is hashed as raw bytes, column 1 must be text
        let rows: [[&[u8]; 2]; 1] = [[b"\xff\xfe", b"Ok"]];
        let mut instance = Instance::with_capacity(2, 1);
        instance.push(&rows[0]).unwrap();
        let mut out = Vec::new();
        plan.extract(&instance, &[], &mut Scratch::default(), &mut out)
            .unwrap();
        let ok: Vec<u32> = "ok".chars().map(u32::from).collect();
        assert_eq!(out, [
            HashBits::B32.hash_data(1, b"\xff\xfe"),
            HashBits::B32.hash_codepoints(&ok),
        ]);

        let rows: [[&[u8]; 2]; 1] = [[b"ok", b"\xff"]];
        let mut instance = Instance::with_capacity(2, 1);
        instance.push(&rows[0]).unwrap();
        let err = plan
            .extract(&instance, &[], &mut Scratch::default(), &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::Decode { token: 0, .. }));
    }

    #[test]
    fn test_extract_clusters() {
        let clusters = WordClusters::new("wc", vec![("the", 5), ("cat", 2)]);
        let lexicons = vec![
            WordClusterLexicon::build(&clusters, HashBits::B32, KeyHash::Bytes),
            WordClusterLexicon::build(&clusters, HashBits::B32, KeyHash::Normalized),
        ];
        let bytes = Form::from(FieldRef::new(0, 0)).lookup(ClusterRef {
            index: 0,
            name: "wc".to_string(),
        });
        let normalized = normalize(FieldRef::new(0, 0)).lookup(ClusterRef {
            index: 1,
            name: "wc2".to_string(),
        });
        let templates = vec![
            FeatureTemplate::new([tag(0), bytes.into()]),
            FeatureTemplate::new([tag(0), normalized.into()]),
        ];
        let (plan, _, _) = compile(&templates, COLUMNS, None, HashBits::B32).unwrap();
        let rows = [["The", ""], ["cat", ""], ["dog", ""]];
        let instance = instance(&rows);
        let mut out = Vec::new();
        plan.extract(&instance, &lexicons, &mut Scratch::default(), &mut out)
            .unwrap();
        assert_eq!(out, [0, 5, 2, 2, 0, 0]);
    }

    #[test]
    fn test_feature_hash_merge() {
        let tagset = Tagset::new(["A", "B", "C"]).unwrap();
        let templates = vec![
            FeatureTemplate::new([tag(0), tag(-1)]),
            FeatureTemplate::new([tag(0), FieldRef::new(0, 1).into()]),
        ];
        let bits = HashBits::B32;
        let (invariant_plan, plan, _) = compile(&templates, COLUMNS, None, bits).unwrap();
        let rows = [["a", ""], ["b", ""]];
        let instance = instance(&rows);
        let mut values = Vec::new();
        invariant_plan
            .extract(&instance, &[], &mut Scratch::default(), &mut values)
            .unwrap();
        let invariants = Invariants {
            values: &values,
            width: invariant_plan.len(),
            n_items: 2,
        };
        let mut hashes = Vec::new();

        // position 0: previous tag is the sentinel, next word is "b"
        plan.feature_hashes(&tagset, &invariants, 0, &[], 2, &mut hashes);
        assert_eq!(hashes[0], bits.fmix(bits.mix(1, bits.mix(2, 3))));
        assert_eq!(
            hashes[1],
            bits.fmix(bits.mix(2, bits.mix(bits.hash_data(1, b"b"), 2)))
        );

        // position 1: previous tag is history[0], next word is past the end
        plan.feature_hashes(&tagset, &invariants, 1, &[1], 0, &mut hashes);
        assert_eq!(hashes[0], bits.fmix(bits.mix(1, bits.mix(0, 1))));
        assert_eq!(
            hashes[1],
            bits.fmix(bits.mix(2, bits.mix(bits.fixed_hash("0_x_x"), 0)))
        );

        let weights = WeightTable::from_weights(vec![1.0; 8]).unwrap();
        assert_eq!(
            plan.score(&weights, &tagset, &invariants, 1, &[1], 0),
            2.0
        );
    }

    #[test]
    fn test_forms_merge_before_tags() {
        let tagset = Tagset::new(["A", "B", "C"]).unwrap();
        let word = normalize(FieldRef::new(0, 0));
        let next = Term::from(FieldRef::new(0, 1));
        let templates = vec![
            FeatureTemplate::new([tag(0), word.clone().into()]),
            FeatureTemplate::new([word.clone().into(), tag(0)]),
            FeatureTemplate::new([tag(0), word.clone().into(), tag(-1), next.clone()]),
            FeatureTemplate::new([word.clone().into(), next, tag(0), tag(-1)]),
        ];
        let bits = HashBits::B32;
        let (invariant_plan, plan, _) = compile(&templates, COLUMNS, None, bits).unwrap();
        let rows = [["Dog", ""], ["barks", ""]];
        let instance = instance(&rows);
        let mut values = Vec::new();
        invariant_plan
            .extract(&instance, &[], &mut Scratch::default(), &mut values)
            .unwrap();
        let invariants = Invariants {
            values: &values,
            width: invariant_plan.len(),
            n_items: 2,
        };
        let mut hashes = Vec::new();
        plan.feature_hashes(&tagset, &invariants, 0, &[], 1, &mut hashes);

        let dog: Vec<u32> = "dog".chars().map(u32::from).collect();
        let dog = bits.hash_codepoints(&dog);
        let barks = bits.hash_data(1, b"barks");
        assert_eq!(hashes[0], bits.fmix(bits.mix(1, bits.mix(dog, 1))));
        assert_eq!(hashes[1], bits.fmix(bits.mix(2, bits.mix(dog, 1))));
        // previous tag is the sentinel 3
        let merged = bits.mix(dog, bits.mix(barks, bits.mix(1, 3)));
        assert_eq!(hashes[2], bits.fmix(bits.mix(3, merged)));
        assert_eq!(hashes[3], bits.fmix(bits.mix(4, merged)));
    }
}

//! Feature template declarations
//!
//! A template is an ordered tuple of [`Term`]s: word forms read from the
//! input columns and tags already assigned by the decoder. Each template
//! contributes one hashed feature per scored `(position, tag)` pair.
//!
//! ```
//! use beamtag::feature::{normalize, suffix, FieldRef};
//!
//! let word = FieldRef::new(0, 0);
//! let next_suffix = suffix(normalize(FieldRef::new(0, 1)), 3);
//! assert_eq!(word.ident(), "0_x_x");
//! assert_eq!(next_suffix.ident(), "0_suf3_normalize");
//! ```

use std::fmt;

use crate::translation::Translation;

/// A column of the input at a position relative to the token being tagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Column index in the training layout
    pub field: usize,
    pub offset: isize,
}

impl FieldRef {
    pub fn new(field: usize, offset: isize) -> Self {
        Self { field, offset }
    }

    pub fn ident(&self) -> String {
        Form::from(*self).ident()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affix {
    Prefix(usize),
    Suffix(usize),
}

impl Affix {
    pub fn width(self) -> usize {
        match self {
            Affix::Prefix(n) | Affix::Suffix(n) => n,
        }
    }
}

impl fmt::Display for Affix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Affix::Prefix(n) => write!(f, "pre{}", n),
            Affix::Suffix(n) => write!(f, "suf{}", n),
        }
    }
}

/// Word cluster lexicon bound to a form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ClusterRef {
    pub index: usize,
    pub name: String,
}

/// A field value, optionally translated, cut to an affix and looked up in a
/// word cluster lexicon, in that order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Form {
    pub(crate) field: FieldRef,
    pub(crate) translation: Option<Translation>,
    pub(crate) affix: Option<Affix>,
    pub(crate) cluster: Option<ClusterRef>,
    /// First illegal wrapping applied to this form, reported when the
    /// template is registered
    pub(crate) invalid: Option<String>,
}

impl From<FieldRef> for Form {
    fn from(field: FieldRef) -> Self {
        Self {
            field,
            translation: None,
            affix: None,
            cluster: None,
            invalid: None,
        }
    }
}

impl Form {
    pub fn field(&self) -> usize {
        self.field.field
    }

    pub fn offset(&self) -> isize {
        self.field.offset
    }

    pub fn translation(&self) -> Option<Translation> {
        self.translation
    }

    pub fn affix(&self) -> Option<Affix> {
        self.affix
    }

    /// Name of the word cluster lexicon this form is looked up in
    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_ref().map(|c| c.name.as_str())
    }

    /// Identity of the value computed for this form, ignoring its offset.
    ///
    /// Forms with the same identity share one per-token hash, and the
    /// identity seeds the constant used beyond the sequence boundaries.
    pub fn ident(&self) -> String {
        let affix = self.affix.map_or_else(|| "x".to_string(), |a| a.to_string());
        let translation = self.translation.map_or("x", Translation::name);
        match &self.cluster {
            Some(cluster) => format!(
                "{}_{}_{}_{}",
                self.field.field, affix, translation, cluster.name
            ),
            None => format!("{}_{}_{}", self.field.field, affix, translation),
        }
    }

    fn invalidate(mut self, reason: String) -> Self {
        if self.invalid.is_none() {
            self.invalid = Some(reason);
        }
        self
    }

    fn translate(self, translation: Translation) -> Self {
        if self.translation.is_some() {
            let reason = format!(
                "cannot apply {} to {}: only one translation per form",
                translation,
                self.ident()
            );
            return self.invalidate(reason);
        }
        if self.affix.is_some() || self.cluster.is_some() {
            let reason = format!(
                "cannot apply {} to {}: translations must come before affixes and lookups",
                translation,
                self.ident()
            );
            return self.invalidate(reason);
        }
        Self {
            translation: Some(translation),
            ..self
        }
    }

    fn cut(self, affix: Affix) -> Self {
        if affix.width() == 0 {
            let reason = format!("{} of {} must be at least 1", affix, self.ident());
            return self.invalidate(reason);
        }
        if self.affix.is_some() || self.cluster.is_some() {
            let reason = format!(
                "cannot take {} of {}: affixes must come before lookups and cannot be nested",
                affix,
                self.ident()
            );
            return self.invalidate(reason);
        }
        Self {
            affix: Some(affix),
            ..self
        }
    }

    pub(crate) fn lookup(self, cluster: ClusterRef) -> Self {
        if self.cluster.is_some() {
            let reason = format!(
                "cannot look up {} in {}: already looked up",
                self.ident(),
                cluster.name
            );
            return self.invalidate(reason);
        }
        Self {
            cluster: Some(cluster),
            ..self
        }
    }
}

/// Lower-case the form (below U+0530)
pub fn normalize<F: Into<Form>>(form: F) -> Form {
    form.into().translate(Translation::Normalize)
}

/// Replace every character of the form by its Unicode general category
pub fn delexicalize<F: Into<Form>>(form: F) -> Form {
    form.into().translate(Translation::Delexicalize)
}

/// Delexicalize the form and collapse runs of equal categories
pub fn abstract_<F: Into<Form>>(form: F) -> Form {
    form.into().translate(Translation::Abstract)
}

/// First `n` characters of the form
pub fn prefix<F: Into<Form>>(form: F, n: usize) -> Form {
    form.into().cut(Affix::Prefix(n))
}

/// Last `n` characters of the form
pub fn suffix<F: Into<Form>>(form: F, n: usize) -> Form {
    form.into().cut(Affix::Suffix(n))
}

/// A tag of the sequence relative to the token being tagged
///
/// Offset 0 is the tag being scored, negative offsets are tags already
/// decided. Created through [`crate::TaggerBuilder::tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagRef {
    pub(crate) offset: isize,
    /// Registered tag mapping applied to the tag
    pub(crate) subset: Option<usize>,
}

impl TagRef {
    pub fn offset(&self) -> isize {
        self.offset
    }

    pub fn is_mapped(&self) -> bool {
        self.subset.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Form(Form),
    Tag(TagRef),
}

impl From<Form> for Term {
    fn from(form: Form) -> Self {
        Term::Form(form)
    }
}

impl From<FieldRef> for Term {
    fn from(field: FieldRef) -> Self {
        Term::Form(field.into())
    }
}

impl From<TagRef> for Term {
    fn from(tag: TagRef) -> Self {
        Term::Tag(tag)
    }
}

/// An ordered tuple of terms hashed into one feature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureTemplate {
    pub(crate) terms: Vec<Term>,
}

impl FeatureTemplate {
    pub fn new<I, T>(terms: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Term>,
    {
        Self {
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub(crate) fn forms(&self) -> impl Iterator<Item = &Form> + '_ {
        self.terms.iter().filter_map(|term| match term {
            Term::Form(form) => Some(form),
            Term::Tag(_) => None,
        })
    }

    pub(crate) fn tags(&self) -> impl Iterator<Item = &TagRef> + '_ {
        self.terms.iter().filter_map(|term| match term {
            Term::Tag(tag) => Some(tag),
            Term::Form(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident() {
        assert_eq!(FieldRef::new(0, -1).ident(), "0_x_x");
        assert_eq!(prefix(FieldRef::new(2, 0), 4).ident(), "2_pre4_x");
        assert_eq!(abstract_(FieldRef::new(0, 0)).ident(), "0_x_abstract");
        assert_eq!(
            suffix(delexicalize(FieldRef::new(1, 0)), 2).ident(),
            "1_suf2_delexicalize"
        );
        let cluster = ClusterRef {
            index: 0,
            name: "brown".to_string(),
        };
        assert_eq!(
            normalize(FieldRef::new(0, 1)).lookup(cluster).ident(),
            "0_x_normalize_brown"
        );
    }

    #[test]
    fn test_ident_ignores_offset() {
        assert_eq!(
            normalize(FieldRef::new(0, -2)).ident(),
            normalize(FieldRef::new(0, 3)).ident()
        );
    }

    #[test]
    fn test_illegal_chains() {
        let twice = normalize(abstract_(FieldRef::new(0, 0)));
        assert!(twice.invalid.is_some());
        assert_eq!(twice.translation(), Some(Translation::Abstract));

        let after_affix = normalize(prefix(FieldRef::new(0, 0), 2));
        assert!(after_affix.invalid.is_some());

        let nested = suffix(prefix(FieldRef::new(0, 0), 3), 2);
        assert!(nested.invalid.is_some());

        assert!(prefix(FieldRef::new(0, 0), 0).invalid.is_some());
        assert!(suffix(normalize(FieldRef::new(0, 0)), 3).invalid.is_none());
    }

    #[test]
    fn test_template_terms() {
        let tag = TagRef {
            offset: 0,
            subset: None,
        };
        let template = FeatureTemplate::new([
            Term::from(tag),
            FieldRef::new(0, 0).into(),
            normalize(FieldRef::new(0, 1)).into(),
        ]);
        assert_eq!(template.terms().len(), 3);
        assert_eq!(template.forms().count(), 2);
        assert_eq!(template.tags().count(), 1);
    }
}

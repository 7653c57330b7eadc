//! Unicode translation tables
//!
//! Translations rewrite the codepoints of a field before it is hashed:
//!
//! * `normalize` lower-cases (and NFC-composes) codepoints below `0x530`,
//!   covering the Latin, Greek, Cyrillic and Armenian blocks.
//! * `delexicalize` replaces every codepoint with the index of its Unicode
//!   general category, so "Fish" and "Make" become equal.
//! * `abstract` is `delexicalize` with runs of equal categories collapsed, so
//!   "Fish123" and "Making7" become equal.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use bitflags::bitflags;
use bstr::ByteSlice;
use unicode_general_category::{get_general_category, GeneralCategory};
use unicode_normalization::UnicodeNormalization;

/// Codepoints at or above this value are left untouched by `normalize`.
pub const NORMALIZE_LIMIT: u32 = 0x530;

/// Codepoints at or above this value are delexicalized to the sentinel.
pub const DELEXICALIZE_LIMIT: u32 = 0x10000;

/// A codepoint rewrite applied to a field before hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Translation {
    Normalize,
    Delexicalize,
    Abstract,
}

impl Translation {
    pub fn name(self) -> &'static str {
        match self {
            Translation::Normalize => "normalize",
            Translation::Delexicalize => "delexicalize",
            Translation::Abstract => "abstract",
        }
    }

    pub(crate) fn flag(self) -> Translations {
        match self {
            Translation::Normalize => Translations::NORMALIZE,
            Translation::Delexicalize => Translations::DELEXICALIZE,
            Translation::Abstract => Translations::ABSTRACT,
        }
    }
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Translations needed for one field
    #[derive(Default)]
    pub struct Translations: u8 {
        const NORMALIZE = 0x01;
        const DELEXICALIZE = 0x02;
        const ABSTRACT = 0x04;
    }
}

/// Precomputed per-codepoint maps
#[derive(Debug, Clone)]
pub struct TranslationTables {
    /// `[0x530]` lower-cased first codepoint of each codepoint
    normalize: Vec<u32>,
    /// `[0x10000]` general category index of each codepoint
    delexicalize: Vec<u8>,
    /// Category index used at or above [`DELEXICALIZE_LIMIT`]
    sentinel: u8,
}

impl TranslationTables {
    /// The process-wide tables, built on first use.
    pub fn get() -> &'static TranslationTables {
        static TABLES: OnceLock<TranslationTables> = OnceLock::new();
        TABLES.get_or_init(TranslationTables::build)
    }

    fn build() -> Self {
        let normalize = (0..NORMALIZE_LIMIT).map(normalize_codepoint).collect();

        let categories: Vec<&'static str> =
            (0..DELEXICALIZE_LIMIT).map(category_abbrev).collect();
        let sorted: BTreeSet<&'static str> = categories.iter().copied().collect();
        let index = |cat: &str| sorted.iter().position(|c| *c == cat).unwrap_or(0) as u8;
        let delexicalize = categories.iter().map(|cat| index(cat)).collect();
        let sentinel = sorted.len() as u8;

        tracing::debug!(categories = sorted.len(), "built translation tables");
        Self {
            normalize,
            delexicalize,
            sentinel,
        }
    }

    #[inline]
    pub fn normalize(&self, cp: u32) -> u32 {
        if cp < NORMALIZE_LIMIT {
            self.normalize[cp as usize]
        } else {
            cp
        }
    }

    #[inline]
    pub fn delexicalize(&self, cp: u32) -> u32 {
        if cp < DELEXICALIZE_LIMIT {
            u32::from(self.delexicalize[cp as usize])
        } else {
            u32::from(self.sentinel)
        }
    }

    /// Category index given to codepoints outside of the Basic Multilingual Plane.
    pub fn sentinel(&self) -> u32 {
        u32::from(self.sentinel)
    }

    /// Apply `translation` to `src`, replacing the contents of `dest`.
    pub fn translate(&self, translation: Translation, src: &[u32], dest: &mut Vec<u32>) {
        dest.clear();
        match translation {
            Translation::Normalize => dest.extend(src.iter().map(|&cp| self.normalize(cp))),
            Translation::Delexicalize => {
                dest.extend(src.iter().map(|&cp| self.delexicalize(cp)))
            }
            Translation::Abstract => {
                let mut last = None;
                for &cp in src {
                    let c = self.delexicalize(cp);
                    if last != Some(c) {
                        dest.push(c);
                        last = Some(c);
                    }
                }
            }
        }
    }

    /// Normalized codepoints of a string, the key space of the tag lexicon.
    pub fn normalize_str(&self, s: &str) -> Vec<u32> {
        s.chars().map(|c| self.normalize(u32::from(c))).collect()
    }
}

/// Decode UTF-8 bytes into codepoints, replacing the contents of `dest`.
pub fn decode_utf8(bytes: &[u8], dest: &mut Vec<u32>) -> Result<(), bstr::Utf8Error> {
    let s = bytes.to_str()?;
    dest.clear();
    dest.extend(s.chars().map(u32::from));
    Ok(())
}

fn normalize_codepoint(cp: u32) -> u32 {
    if cp == 0 {
        return 0;
    }
    match char::from_u32(cp) {
        Some(c) => c.to_lowercase().nfc().next().map_or(cp, u32::from),
        None => cp,
    }
}

fn category_abbrev(cp: u32) -> &'static str {
    let Some(c) = char::from_u32(cp) else {
        return "Cs";
    };
    #[allow(unreachable_patterns)]
    match get_general_category(c) {
        GeneralCategory::UppercaseLetter => "Lu",
        GeneralCategory::LowercaseLetter => "Ll",
        GeneralCategory::TitlecaseLetter => "Lt",
        GeneralCategory::ModifierLetter => "Lm",
        GeneralCategory::OtherLetter => "Lo",
        GeneralCategory::NonspacingMark => "Mn",
        GeneralCategory::SpacingMark => "Mc",
        GeneralCategory::EnclosingMark => "Me",
        GeneralCategory::DecimalNumber => "Nd",
        GeneralCategory::LetterNumber => "Nl",
        GeneralCategory::OtherNumber => "No",
        GeneralCategory::ConnectorPunctuation => "Pc",
        GeneralCategory::DashPunctuation => "Pd",
        GeneralCategory::OpenPunctuation => "Ps",
        GeneralCategory::ClosePunctuation => "Pe",
        GeneralCategory::InitialPunctuation => "Pi",
        GeneralCategory::FinalPunctuation => "Pf",
        GeneralCategory::OtherPunctuation => "Po",
        GeneralCategory::MathSymbol => "Sm",
        GeneralCategory::CurrencySymbol => "Sc",
        GeneralCategory::ModifierSymbol => "Sk",
        GeneralCategory::OtherSymbol => "So",
        GeneralCategory::SpaceSeparator => "Zs",
        GeneralCategory::LineSeparator => "Zl",
        GeneralCategory::ParagraphSeparator => "Zp",
        GeneralCategory::Control => "Cc",
        GeneralCategory::Format => "Cf",
        GeneralCategory::Surrogate => "Cs",
        GeneralCategory::PrivateUse => "Co",
        GeneralCategory::Unassigned => "Cn",
        _ => "Cn",
    }
}

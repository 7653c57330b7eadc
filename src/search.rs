//! Beam search over tag sequences
//!
//! Decoding is left to right. At beam size 1 the best tag of each position is
//! committed immediately, otherwise the best `beam_size` partial sequences
//! are kept and the best complete sequence is returned.

use crate::compiler::{FeaturePlan, Invariants};
use crate::context::{Context, Hypothesis};
use crate::lexicon::TagLexicon;
use crate::model::WeightTable;
use crate::tagset::Tagset;

/// Tags considered at one position
#[derive(Debug, Clone, Copy)]
enum Candidates<'a> {
    Tags(&'a [u32]),
    All(u32),
}

impl<'a> Candidates<'a> {
    fn len(&self) -> usize {
        match self {
            Candidates::Tags(tags) => tags.len(),
            Candidates::All(n) => *n as usize,
        }
    }

    #[inline]
    fn get(&self, k: usize) -> u32 {
        match self {
            Candidates::Tags(tags) => tags[k],
            Candidates::All(_) => k as u32,
        }
    }

    fn iter(self) -> impl Iterator<Item = u32> + 'a {
        (0..self.len()).map(move |k| self.get(k))
    }
}

/// Everything a search needs besides the per-sequence buffers
#[derive(Debug, Clone, Copy)]
pub(crate) struct Search<'a> {
    pub features: &'a FeaturePlan,
    pub weights: &'a WeightTable,
    pub tagset: &'a Tagset,
    /// Tag lexicon and the invariant holding its key
    pub lexicon: Option<(&'a TagLexicon, usize)>,
}

impl<'a> Search<'a> {
    fn candidates(&self, invariants: &Invariants<'_>, i: usize) -> Candidates<'a> {
        match self.lexicon {
            Some((lexicon, key)) => {
                let hash = lexicon.key_of_invariant(invariants.get(i, key));
                Candidates::Tags(lexicon.candidates(hash))
            }
            None => Candidates::All(self.tagset.len() as u32),
        }
    }

    #[inline]
    fn score(&self, invariants: &Invariants<'_>, i: usize, history: &[u32], tag: u32) -> f32 {
        self.features
            .score(self.weights, self.tagset, invariants, i, history, tag)
    }

    /// Decode `ctx` with the given beam size.
    ///
    /// The invariant matrix of `ctx` must already be filled.
    pub fn run(&self, beam_size: usize, ctx: &mut Context) {
        if beam_size <= 1 {
            self.greedy(ctx)
        } else {
            self.beam(beam_size, ctx)
        }
    }

    /// Commit the best tag of each position in turn
    pub fn greedy(&self, ctx: &mut Context) {
        let n = ctx.num_items;
        let Context {
            invariants,
            result,
            beam_sizes,
            ..
        } = ctx;
        let invariants = Invariants {
            values: invariants,
            width: if n == 0 { 0 } else { invariants.len() / n },
            n_items: n,
        };
        for i in 0..n {
            let candidates = self.candidates(&invariants, i);
            let tag = match candidates {
                Candidates::Tags(&[only]) => only,
                _ => {
                    let history = &result[..i];
                    let mut best: Option<(f32, u32)> = None;
                    for k in 0..candidates.len() {
                        let tag = candidates.get(k);
                        let score = self.score(&invariants, i, history, tag);
                        let better = match best {
                            Some((max, _)) => score > max,
                            None => true,
                        };
                        if better {
                            best = Some((score, tag));
                        }
                    }
                    best.map_or(0, |(_, tag)| tag)
                }
            };
            result[i] = tag;
            beam_sizes.push(1);
        }
    }

    /// Keep the `beam_size` best partial sequences at each position
    pub fn beam(&self, beam_size: usize, ctx: &mut Context) {
        let n = ctx.num_items;
        let Context {
            invariants,
            beams,
            new_beams,
            beam_scores,
            ranked,
            result,
            beam_sizes,
            ..
        } = ctx;
        let invariants = Invariants {
            values: invariants,
            width: if n == 0 { 0 } else { invariants.len() / n },
            n_items: n,
        };
        let mut active = 1;
        beam_scores[0] = 0.0;
        for i in 0..n {
            ranked.clear();
            let candidates = self.candidates(&invariants, i);
            for tag in candidates.iter() {
                for k in 0..active {
                    let history = &beams[k * n..k * n + i];
                    let score = beam_scores[k] + self.score(&invariants, i, history, tag);
                    insert(
                        ranked,
                        beam_size,
                        Hypothesis {
                            score,
                            tag,
                            source: k,
                        },
                    );
                }
            }

            // rebuild rows whose source moved, through the work space
            for (k, hyp) in ranked.iter().enumerate() {
                if hyp.source != k {
                    let src = hyp.source * n;
                    new_beams[k * n..k * n + i].copy_from_slice(&beams[src..src + i]);
                }
            }
            for (k, hyp) in ranked.iter().enumerate() {
                if hyp.source != k {
                    beams[k * n..k * n + i].copy_from_slice(&new_beams[k * n..k * n + i]);
                }
                beams[k * n + i] = hyp.tag;
                beam_scores[k] = hyp.score;
            }
            active = ranked.len();
            beam_sizes.push(active);
            tracing::trace!(item = i, beam_size = active, "beam step");
        }
        result.copy_from_slice(&beams[..n]);
    }
}

/// Insert into a score-descending ranking of at most `cap` entries.
///
/// Entries only move down for strictly higher scores, so among equal scores
/// the first inserted ranks highest.
fn insert(ranked: &mut Vec<Hypothesis>, cap: usize, hyp: Hypothesis) {
    if ranked.len() == cap {
        match ranked.last() {
            Some(last) if hyp.score > last.score => {
                ranked.pop();
            }
            _ => return,
        }
    }
    let pos = ranked
        .iter()
        .position(|h| hyp.score > h.score)
        .unwrap_or(ranked.len());
    ranked.insert(pos, hyp);
}

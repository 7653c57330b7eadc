use crate::compiler::Scratch;

/// A partial hypothesis ranked during one beam step
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Hypothesis {
    /// Cumulative score
    pub score: f32,
    /// Tag appended at this step
    pub tag: u32,
    /// Beam row the hypothesis extends
    pub source: usize,
}

/// Context maintains the working buffers for decoding a sequence
///
/// A context can be reused across calls to [`crate::Tagger::tag_with`] to
/// avoid reallocating its buffers.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// The number of items in the sequence
    pub(crate) num_items: usize,
    /// The maximum beam size the buffers are laid out for
    pub(crate) beam_size: usize,
    /// Invariant hash matrix
    ///
    /// This is a `[T][I]` matrix whose element `[t][i]` is the hash of
    /// invariant #i for item #t.
    pub(crate) invariants: Vec<u64>,
    pub(crate) scratch: Scratch,
    /// Tag sequences of the hypotheses
    ///
    /// This is a `[B][T]` matrix whose row `[k]` holds the tags of beam #k.
    pub(crate) beams: Vec<u32>,
    /// Work space for rebuilding `beams`
    pub(crate) new_beams: Vec<u32>,
    /// Cumulative score of each beam row
    pub(crate) beam_scores: Vec<f32>,
    /// Bounded ranking of the current step
    pub(crate) ranked: Vec<Hypothesis>,
    /// Decoded tag ids
    pub(crate) result: Vec<u32>,
    /// Number of live hypotheses after each item
    pub(crate) beam_sizes: Vec<usize>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lay out the buffers for `t` items and a beam of `b` hypotheses
    pub(crate) fn reset(&mut self, t: usize, b: usize) {
        self.num_items = t;
        self.beam_size = b;
        self.result.clear();
        self.result.resize(t, 0);
        self.beam_sizes.clear();
        self.ranked.clear();
        if b > 1 {
            self.beams.clear();
            self.beams.resize(t * b, 0);
            self.new_beams.clear();
            self.new_beams.resize(t * b, 0);
            self.beam_scores.clear();
            self.beam_scores.resize(b, 0.0);
            self.ranked.reserve(b);
        }
    }

    /// Number of items of the last decoded sequence
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Tag ids of the last decoded sequence
    pub fn result(&self) -> &[u32] {
        &self.result
    }

    /// Number of hypotheses kept after each item of the last decoded sequence
    pub fn beam_sizes(&self) -> &[usize] {
        &self.beam_sizes
    }

    /// Invariant hashes of an item of the last decoded sequence
    pub fn invariants(&self, item: usize) -> &[u64] {
        let width = if self.num_items == 0 {
            0
        } else {
            self.invariants.len() / self.num_items
        };
        &self.invariants[item * width..(item + 1) * width]
    }
}

//! Pair counting and the incremental merge loop.
//!
//! [`MergeState`] owns everything a merge step reads or writes: the words
//! with their counts, the pair-count table, the symbol table and the learned
//! merges. Each step touches only the words that contain the selected pair
//! and patches the pair table with per-word deltas instead of recounting.

use std::cmp::Ordering;
use std::time::Instant;

use ahash::AHashMap;
use dary_heap::OctonaryHeap;

use crate::pretokenize::WordCounts;
use crate::{Count, Pair};

/// Adjacent symbol pair -> weighted number of occurrences.
pub type PairCounts = AHashMap<Pair, Count>;

/// A learned merge, as the byte sequences of its left and right symbols.
pub type MergeRule = (Vec<u8>, Vec<u8>);

/// Count every adjacent pair in every word, weighted by the word's count.
///
/// A pair that occurs twice in one word contributes that word's count twice.
pub fn count_pairs(word_counts: &WordCounts) -> PairCounts {
    let mut pair_counts = PairCounts::new();
    for (ids, &count) in word_counts {
        if count == 0 {
            continue;
        }
        for w in ids.windows(2) {
            *pair_counts.entry((w[0], w[1])).or_default() += count;
        }
    }
    pair_counts
}

#[derive(Clone, Debug)]
struct Word {
    ids: Vec<u32>,
}

impl Word {
    #[inline]
    fn new(ids: Vec<u32>) -> Self {
        Self { ids }
    }

    #[inline]
    fn pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        self.ids.windows(2).map(|w| (w[0], w[1]))
    }

    /// Replace every non-overlapping occurrence of `pair`, scanning left to
    /// right, with `new_id`.
    ///
    /// Returns the pair-count deltas for this word alone: -1 for each pair
    /// that disappeared, +1 for each pair that appeared. Empty when the word
    /// does not contain `pair`.
    fn merge_pair(&mut self, pair: Pair, new_id: u32) -> Vec<(Pair, i32)> {
        let (a, b) = pair;
        let n = self.ids.len();
        if n < 2 {
            return Vec::new();
        }

        let mut out: Vec<u32> = Vec::with_capacity(n);
        let mut deltas: Vec<(Pair, i32)> = Vec::with_capacity(6);

        let mut i = 0;
        while i < n {
            if i + 1 < n && self.ids[i] == a && self.ids[i + 1] == b {
                let left = out.last().copied();
                let right = if i + 2 < n { Some(self.ids[i + 2]) } else { None };

                // The left neighbour may itself be a fresh merge from this pass.
                if let Some(x) = left {
                    deltas.push(((x, a), -1));
                    deltas.push(((x, new_id), 1));
                }
                deltas.push(((a, b), -1));
                if let Some(y) = right {
                    deltas.push(((b, y), -1));
                    deltas.push(((new_id, y), 1));
                }

                out.push(new_id);
                i += 2;
            } else {
                out.push(self.ids[i]);
                i += 1;
            }
        }

        self.ids = out;
        deltas
    }
}

/// Heap entry for a candidate pair.
///
/// Ordered by count, then by the left symbol's bytes, then by the right
/// symbol's bytes, all descending. Symbols with identical bytes fall back to
/// the lower pair of IDs. `count` may be stale: it is revalidated against the
/// pair table when the entry reaches the top.
#[derive(Debug)]
struct MergeJob {
    pair: Pair,
    count: Count,
    left: Vec<u8>,
    right: Vec<u8>,
    /// Indices of words that contained the pair when this entry was made.
    pos: Vec<usize>,
}

impl PartialEq for MergeJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeJob {}

impl PartialOrd for MergeJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| self.left.cmp(&other.left))
            .then_with(|| self.right.cmp(&other.right))
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

/// One completed merge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub pair: Pair,
    pub new_id: u32,
    /// Pair count at the moment it was selected.
    pub count: Count,
}

/// Mutable training state threaded through the merge loop.
pub struct MergeState {
    words: Vec<Word>,
    counts: Vec<Count>,
    pair_counts: PairCounts,
    heap: OctonaryHeap<MergeJob>,
    symbols: Vec<Vec<u8>>,
    merges: Vec<MergeRule>,
}

impl MergeState {
    /// Build the state from corpus word counts and the initial symbol table
    /// (special tokens followed by the 256 raw bytes). The next minted ID is
    /// `symbols.len()`.
    pub fn new(word_counts: WordCounts, symbols: Vec<Vec<u8>>) -> Self {
        let pair_counts = count_pairs(&word_counts);

        let (words, counts): (Vec<Word>, Vec<Count>) = word_counts
            .into_iter()
            .filter(|&(_, count)| count > 0)
            .map(|(ids, count)| (Word::new(ids), count))
            .unzip();

        let mut where_to_update: AHashMap<Pair, Vec<usize>> = AHashMap::new();
        for (i, word) in words.iter().enumerate() {
            for pair in word.pairs() {
                let pos = where_to_update.entry(pair).or_default();
                if pos.last() != Some(&i) {
                    pos.push(i);
                }
            }
        }

        let mut state = Self {
            words,
            counts,
            pair_counts,
            heap: OctonaryHeap::with_capacity(where_to_update.len()),
            symbols,
            merges: Vec::new(),
        };
        for (pair, pos) in where_to_update {
            let count = state.pair_counts.get(&pair).copied().unwrap_or(0);
            if count > 0 {
                let job = state.job(pair, count, pos);
                state.heap.push(job);
            }
        }
        state
    }

    fn job(&self, pair: Pair, count: Count, pos: Vec<usize>) -> MergeJob {
        MergeJob {
            pair,
            count,
            left: self.symbols[pair.0 as usize].clone(),
            right: self.symbols[pair.1 as usize].clone(),
            pos,
        }
    }

    /// ID the next merge will receive.
    pub fn next_id(&self) -> u32 {
        self.symbols.len() as u32
    }

    /// Current pair counts. Pairs whose count reached zero are absent.
    pub fn pair_counts(&self) -> &PairCounts {
        &self.pair_counts
    }

    /// Current words in their merged-so-far form, with their counts.
    pub fn word_counts(&self) -> WordCounts {
        self.words
            .iter()
            .zip(&self.counts)
            .map(|(w, &c)| (w.ids.clone(), c))
            .collect()
    }

    /// Symbol table: ID -> byte sequence.
    pub fn symbols(&self) -> &[Vec<u8>] {
        &self.symbols
    }

    /// Merges learned so far, in order.
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    pub fn into_parts(self) -> (Vec<Vec<u8>>, Vec<MergeRule>) {
        (self.symbols, self.merges)
    }

    fn add_pair_count(&mut self, pair: Pair, delta: Count) {
        let entry = self.pair_counts.entry(pair).or_default();
        *entry += delta;
        if *entry == 0 {
            self.pair_counts.remove(&pair);
        }
    }

    /// Select the best pair, mint a symbol for it and rewrite every word
    /// containing it. `None` once no pair has a positive count.
    pub fn step(&mut self) -> Option<Merge> {
        let top = loop {
            let mut top = self.heap.pop()?;
            let current = self.pair_counts.get(&top.pair).copied().unwrap_or(0);
            if current <= 0 {
                continue;
            }
            if top.count != current {
                top.count = current;
                self.heap.push(top);
                continue;
            }
            break top;
        };

        let new_id = self.next_id();
        let mut merged = top.left.clone();
        merged.extend_from_slice(&top.right);
        self.symbols.push(merged);

        let mut local_pos_updates: AHashMap<Pair, Vec<usize>> = AHashMap::new();
        for &word_idx in &top.pos {
            let count = self.counts[word_idx];
            let changes = self.words[word_idx].merge_pair(top.pair, new_id);
            for (pair, delta) in changes {
                self.add_pair_count(pair, Count::from(delta) * count);
                if delta > 0 {
                    let pos = local_pos_updates.entry(pair).or_default();
                    if pos.last() != Some(&word_idx) {
                        pos.push(word_idx);
                    }
                }
            }
        }
        self.pair_counts.remove(&top.pair);

        for (pair, pos) in local_pos_updates {
            let count = self.pair_counts.get(&pair).copied().unwrap_or(0);
            if count > 0 {
                let job = self.job(pair, count, pos);
                self.heap.push(job);
            }
        }

        let MergeJob { pair, count, left, right, .. } = top;
        self.merges.push((left, right));
        Some(Merge { pair, new_id, count })
    }

    /// Run up to `num_merges` steps. Returns how many were performed, which
    /// is smaller than requested when the pairs run out first.
    pub fn run(&mut self, num_merges: u32) -> u32 {
        let start = Instant::now();
        log::info!(
            "merge: {} merges requested over {} unique words, {} unique pairs",
            num_merges,
            self.words.len(),
            self.pair_counts.len()
        );

        let mut merges_done = 0u32;
        let mut last_log_percent = 0u64;
        while merges_done < num_merges {
            let Some(merge) = self.step() else {
                log::info!(
                    "merge: no pairs left after {} of {} merges",
                    merges_done,
                    num_merges
                );
                break;
            };
            merges_done += 1;

            let pct = percent(merges_done, num_merges);
            if pct > last_log_percent {
                log::info!(
                    "merge: {}% ({}/{}) {:?} -> {} (freq {})",
                    pct,
                    merges_done,
                    num_merges,
                    merge.pair,
                    merge.new_id,
                    merge.count
                );
                last_log_percent = pct;
            }
        }

        log::info!(
            "merge: {} merges in {:.2}s",
            merges_done,
            start.elapsed().as_secs_f64()
        );
        merges_done
    }
}

/// Whole percent of `total` that `done` represents.
fn percent(done: u32, total: u32) -> u64 {
    u64::from(done) * 100 / u64::from(total.max(1))
}

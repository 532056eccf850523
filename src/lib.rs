//! Byte-level BPE vocabulary training.
//!
//! The pipeline runs in three stages:
//!
//! 1. The corpus is cut into byte ranges that end right after a split marker
//!    (by default the first special token), and every range is pre-tokenized
//!    on its own thread into word counts. Special tokens are cut out of the
//!    text first so they never take part in a merge.
//! 2. The per-range counts are summed and every adjacent symbol pair is
//!    counted once, weighted by word frequency.
//! 3. The merge loop repeatedly takes the most frequent pair (ties go to the
//!    lexicographically greater left bytes, then right bytes), mints a symbol
//!    for it, and patches only the words and pair counts it touched.
//!
//! ```no_run
//! use bpetrain::{Trainer, TrainerConfig};
//!
//! let trainer = Trainer::new(TrainerConfig {
//!     vocab_size: 10_000,
//!     special_tokens: vec!["<|endoftext|>".into()],
//!     ..Default::default()
//! });
//! let output = trainer.train_from_file("corpus.txt")?;
//! println!("{} symbols, {} merges", output.vocab.len(), output.merges.len());
//! # Ok::<(), bpetrain::TrainError>(())
//! ```

pub mod boundaries;
pub mod corpus;
pub mod error;
pub mod merge;
pub mod pretokenize;
pub mod trainer;

#[cfg(feature = "python")]
mod python;

/// GPT-2 word-splitting pattern: contractions, letter runs, digit runs and
/// punctuation runs (each with at most one leading space), then whitespace.
pub const GPT2_PATTERN: &str =
    r"'(?:[sdmt]|ll|ve|re)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// Two adjacent symbol IDs.
pub type Pair = (u32, u32);

/// Occurrence count. Signed so pair-count deltas can be applied directly.
pub type Count = i64;

pub use boundaries::find_chunk_boundaries;
pub use corpus::{Corpus, FileCorpus, MemoryCorpus};
pub use error::{Result, TrainError};
pub use merge::{Merge, MergeRule, MergeState, PairCounts, count_pairs};
pub use pretokenize::{ChunkJob, PreTokenizer, WordCounts, merge_word_counts, pre_tokenize};
pub use trainer::{TrainOutput, Trainer, TrainerConfig, Vocab, train_bpe};

//! Training orchestration: seed the vocabulary, pre-tokenize, merge.

use std::collections::HashMap as StdHashMap;
use std::path::Path;
use std::time::Instant;

use crate::GPT2_PATTERN;
use crate::corpus::{Corpus, FileCorpus, MemoryCorpus};
use crate::error::{Result, TrainError};
use crate::merge::{MergeRule, MergeState};
use crate::pretokenize::{PreTokenizer, pre_tokenize};

/// Configuration for BPE training.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Target vocabulary size, counting special tokens and the 256 bytes.
    pub vocab_size: u32,
    /// Reserved tokens, assigned IDs `0..n` in this order.
    pub special_tokens: Vec<String>,
    /// Pre-tokenization threads, which is also the number of corpus chunks.
    /// `None` uses the available hardware parallelism.
    pub num_workers: Option<usize>,
    /// Word-splitting pattern. `None` uses [`GPT2_PATTERN`].
    pub pattern: Option<String>,
    /// Marker that chunk boundaries are aligned to. `None` uses the first
    /// special token, or a newline without special tokens.
    pub split_token: Option<Vec<u8>>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            vocab_size: 32768,
            special_tokens: vec!["<|endoftext|>".into()],
            num_workers: None,
            pattern: None,
            split_token: None,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.special_tokens.iter().any(|t| t.is_empty()) {
            return Err(TrainError::InvalidConfig(
                "special tokens must not be empty strings".into(),
            ));
        }
        if matches!(&self.split_token, Some(token) if token.is_empty()) {
            return Err(TrainError::InvalidConfig(
                "split_token must not be empty".into(),
            ));
        }
        if self.num_workers == Some(0) {
            return Err(TrainError::InvalidConfig(
                "num_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn resolved_split_token(&self) -> Vec<u8> {
        match (&self.split_token, self.special_tokens.first()) {
            (Some(token), _) => token.clone(),
            (None, Some(special)) => special.as_bytes().to_vec(),
            (None, None) => b"\n".to_vec(),
        }
    }

    fn resolved_num_workers(&self) -> usize {
        self.num_workers.unwrap_or_else(rayon::current_num_threads)
    }
}

/// Dense symbol table: ID `i` maps to `self.get(i)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocab {
    symbols: Vec<Vec<u8>>,
}

impl Vocab {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&[u8]> {
        self.symbols.get(id as usize).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        self.symbols
            .iter()
            .enumerate()
            .map(|(id, bytes)| (id as u32, bytes.as_slice()))
    }

    pub fn into_map(self) -> StdHashMap<u32, Vec<u8>> {
        self.symbols
            .into_iter()
            .enumerate()
            .map(|(id, bytes)| (id as u32, bytes))
            .collect()
    }
}

impl From<Vec<Vec<u8>>> for Vocab {
    fn from(symbols: Vec<Vec<u8>>) -> Self {
        Self { symbols }
    }
}

/// Result of a training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainOutput {
    pub vocab: Vocab,
    /// Merges in the order they were learned. Encoders must replay them in
    /// this order.
    pub merges: Vec<MergeRule>,
}

/// BPE trainer: learns a vocabulary and merge list from a corpus.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Special tokens at `0..k`, then raw bytes at `k..k + 256`.
    pub fn initial_symbols(&self) -> Vec<Vec<u8>> {
        self.config
            .special_tokens
            .iter()
            .map(|t| t.as_bytes().to_vec())
            .chain((0..=255u8).map(|b| vec![b]))
            .collect()
    }

    /// Train on any byte-seekable corpus.
    ///
    /// The corpus is opened even when `vocab_size` leaves no room for merges,
    /// so an unreadable corpus is always an error.
    pub fn train<C: Corpus>(&self, corpus: &C) -> Result<TrainOutput> {
        self.config.validate()?;
        let start = Instant::now();

        let pattern = self.config.pattern.as_deref().unwrap_or(GPT2_PATTERN);
        let pretokenizer = PreTokenizer::new(pattern, &self.config.special_tokens)?;
        corpus.open()?;

        let symbols = self.initial_symbols();
        let initial_size = symbols.len() as u32;
        let num_merges = self.config.vocab_size.saturating_sub(initial_size);
        if num_merges == 0 {
            log::info!(
                "train: vocab_size {} leaves no room for merges over {} initial symbols",
                self.config.vocab_size,
                initial_size
            );
            return Ok(TrainOutput {
                vocab: Vocab::from(symbols),
                merges: Vec::new(),
            });
        }

        log::info!(
            "train: vocab_size={} special_tokens={} merges_requested={}",
            self.config.vocab_size,
            self.config.special_tokens.len(),
            num_merges
        );

        let word_counts = pre_tokenize(
            corpus,
            &pretokenizer,
            &self.config.resolved_split_token(),
            self.config.resolved_num_workers(),
        )?;

        let mut state = MergeState::new(word_counts, symbols);
        state.run(num_merges);
        let (symbols, merges) = state.into_parts();

        log::info!(
            "train: done, {} symbols and {} merges in {:.2}s",
            symbols.len(),
            merges.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(TrainOutput {
            vocab: Vocab::from(symbols),
            merges,
        })
    }

    pub fn train_from_file(&self, path: impl AsRef<Path>) -> Result<TrainOutput> {
        self.train(&FileCorpus::new(path.as_ref()))
    }

    pub fn train_from_bytes(&self, bytes: &[u8]) -> Result<TrainOutput> {
        self.train(&MemoryCorpus::new(bytes))
    }
}

/// Train on the file at `path` with default settings otherwise.
pub fn train_bpe(
    path: impl AsRef<Path>,
    vocab_size: u32,
    special_tokens: &[String],
) -> Result<TrainOutput> {
    Trainer::new(TrainerConfig {
        vocab_size,
        special_tokens: special_tokens.to_vec(),
        ..Default::default()
    })
    .train_from_file(path)
}

//! Parallel pre-tokenization: corpus chunks in, corpus-wide word counts out.

use std::time::Instant;

use ahash::AHashMap;
use compact_str::CompactString;
use fancy_regex::Regex;
use rayon::prelude::*;

use crate::Count;
use crate::boundaries::find_chunk_boundaries;
use crate::corpus::{Corpus, read_range};
use crate::error::Result;

/// Distinct word (as symbol IDs) -> number of occurrences.
pub type WordCounts = AHashMap<Vec<u32>, Count>;

/// One unit of pre-tokenization work: the half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkJob {
    pub start: u64,
    pub end: u64,
}

impl ChunkJob {
    /// One job per adjacent pair of boundary offsets.
    pub fn from_boundaries(boundaries: &[u64]) -> Vec<ChunkJob> {
        boundaries
            .windows(2)
            .map(|w| ChunkJob { start: w[0], end: w[1] })
            .collect()
    }
}

/// Splits text into words and encodes them as byte-level symbol IDs.
///
/// Raw byte `b` becomes symbol `b + byte_offset`; the IDs below the offset
/// belong to the special tokens, which are cut out of the text before the
/// word pattern runs and so never show up inside a word.
#[derive(Debug, Clone)]
pub struct PreTokenizer {
    pattern: Regex,
    special: Option<Regex>,
    byte_offset: u32,
}

impl PreTokenizer {
    pub fn new(pattern: &str, special_tokens: &[String]) -> Result<Self> {
        let special = if special_tokens.is_empty() {
            None
        } else {
            let alternation = special_tokens
                .iter()
                .map(|t| fancy_regex::escape(t).into_owned())
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&alternation)?)
        };
        Ok(Self {
            pattern: Regex::new(pattern)?,
            special,
            byte_offset: special_tokens.len() as u32,
        })
    }

    /// First symbol ID used for raw bytes.
    pub fn byte_offset(&self) -> u32 {
        self.byte_offset
    }

    #[inline]
    fn encode_word(&self, word: &str) -> Vec<u32> {
        word.bytes().map(|b| b as u32 + self.byte_offset).collect()
    }

    /// Text between special-token occurrences, in order. Special tokens
    /// themselves are discarded.
    fn split_specials<'t>(&self, text: &'t str) -> Result<Vec<&'t str>> {
        let Some(special) = &self.special else {
            return Ok(vec![text]);
        };
        let mut segments = Vec::new();
        let mut last = 0;
        for m in special.find_iter(text) {
            let m = m?;
            segments.push(&text[last..m.start()]);
            last = m.end();
        }
        segments.push(&text[last..]);
        Ok(segments)
    }

    /// Count every word the pattern yields in `text`.
    pub fn count_words(&self, text: &str) -> Result<WordCounts> {
        let mut chunk_counts: AHashMap<CompactString, Count> = AHashMap::new();
        for segment in self.split_specials(text)? {
            for mat in self.pattern.find_iter(segment) {
                *chunk_counts.entry(CompactString::from(mat?.as_str())).or_default() += 1;
            }
        }
        Ok(chunk_counts
            .into_iter()
            .map(|(word, count)| (self.encode_word(&word), count))
            .collect())
    }

    /// Read one byte range of the corpus and count its words.
    pub fn tokenize_chunk<C: Corpus>(&self, corpus: &C, job: ChunkJob) -> Result<WordCounts> {
        if job.start >= job.end {
            return Ok(WordCounts::new());
        }
        let bytes = read_range(corpus, job.start, job.end)?;
        let counts = self.count_words(&decode_dropping_invalid(&bytes))?;
        log::debug!(
            "tokenize_chunk: [{}, {}) -> {} unique words",
            job.start,
            job.end,
            counts.len()
        );
        Ok(counts)
    }
}

/// Decode UTF-8, silently dropping every invalid byte run.
pub fn decode_dropping_invalid(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

/// Sum per-chunk counts into one table. Order of the inputs does not matter.
pub fn merge_word_counts<I>(parts: I) -> WordCounts
where
    I: IntoIterator<Item = WordCounts>,
{
    let mut merged = WordCounts::new();
    for part in parts {
        if merged.is_empty() {
            merged = part;
            continue;
        }
        for (word, count) in part {
            *merged.entry(word).or_default() += count;
        }
    }
    merged
}

/// Cut the corpus into `num_workers` marker-aligned chunks, count words in
/// every chunk on a dedicated pool of `num_workers` threads, and reduce the
/// results. The pool is dropped before this returns.
pub fn pre_tokenize<C: Corpus>(
    corpus: &C,
    pretokenizer: &PreTokenizer,
    split_token: &[u8],
    num_workers: usize,
) -> Result<WordCounts> {
    let start = Instant::now();
    let num_workers = num_workers.max(1);

    let boundaries = find_chunk_boundaries(&mut corpus.open()?, num_workers, split_token)?;
    let jobs = ChunkJob::from_boundaries(&boundaries);
    let corpus_len = boundaries.last().copied().unwrap_or(0);
    log::info!(
        "pre_tokenize: {} chunks over {} bytes on {} workers",
        jobs.len(),
        corpus_len,
        num_workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .build()?;
    let per_chunk: Vec<WordCounts> = pool.install(|| {
        jobs.par_iter()
            .map(|&job| pretokenizer.tokenize_chunk(corpus, job))
            .collect::<Result<Vec<_>>>()
    })?;
    drop(pool);

    let merged = merge_word_counts(per_chunk);
    log::info!(
        "pre_tokenize: {} unique words in {:.2}s",
        merged.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GPT2_PATTERN;
    use crate::corpus::MemoryCorpus;

    fn words(pretok: &PreTokenizer, text: &str) -> Vec<String> {
        let segments = pretok.split_specials(text).unwrap();
        segments
            .iter()
            .flat_map(|s| pretok.pattern.find_iter(s).map(|m| m.unwrap().as_str().to_string()))
            .collect()
    }

    fn ids(s: &str, offset: u32) -> Vec<u32> {
        s.bytes().map(|b| b as u32 + offset).collect()
    }

    #[test]
    fn test_pattern_splits_words_numbers_punctuation() {
        let p = PreTokenizer::new(GPT2_PATTERN, &[]).unwrap();
        assert_eq!(
            words(&p, "Hello world, it's 2024!"),
            vec!["Hello", " world", ",", " it", "'s", " 2024", "!"]
        );
    }

    #[test]
    fn test_pattern_contractions() {
        let p = PreTokenizer::new(GPT2_PATTERN, &[]).unwrap();
        assert_eq!(
            words(&p, "we'll they've you're I'd"),
            vec!["we", "'ll", " they", "'ve", " you", "'re", " I", "'d"]
        );
    }

    #[test]
    fn test_pattern_trailing_whitespace_runs() {
        let p = PreTokenizer::new(GPT2_PATTERN, &[]).unwrap();
        // The run before "b" leaves its last space to attach to the word.
        assert_eq!(words(&p, "a   b  "), vec!["a", "  ", " b", "  "]);
    }

    #[test]
    fn test_special_tokens_are_removed_not_tokenized() {
        let specials = vec!["<|endoftext|>".to_string()];
        let p = PreTokenizer::new(GPT2_PATTERN, &specials).unwrap();
        assert_eq!(words(&p, "ab<|endoftext|>cd"), vec!["ab", "cd"]);

        let counts = p.count_words("ab<|endoftext|>ab").unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&ids("ab", 1)], 2);
    }

    #[test]
    fn test_special_tokens_with_regex_metacharacters() {
        let specials = vec!["[SEP]".to_string(), "a.b".to_string()];
        let p = PreTokenizer::new(GPT2_PATTERN, &specials).unwrap();
        // "a.b" is literal; "axb" must survive as ordinary text.
        assert_eq!(words(&p, "x[SEP]axb a.b"), vec!["x", "axb", " "]);
    }

    #[test]
    fn test_count_words_applies_byte_offset() {
        let specials = vec!["<s>".to_string(), "</s>".to_string()];
        let p = PreTokenizer::new(GPT2_PATTERN, &specials).unwrap();
        assert_eq!(p.byte_offset(), 2);
        let counts = p.count_words("hi hi").unwrap();
        assert_eq!(counts[&ids("hi", 2)], 1);
        assert_eq!(counts[&ids(" hi", 2)], 1);
    }

    #[test]
    fn test_decode_drops_invalid_bytes() {
        assert_eq!(decode_dropping_invalid(b"ab\xffcd\xc3"), "abcd");
        assert_eq!(decode_dropping_invalid("caf\u{e9}".as_bytes()), "caf\u{e9}");
    }

    #[test]
    fn test_tokenize_chunk_reads_only_its_range() {
        let corpus = MemoryCorpus::new(b"one two\nthree four\n");
        let p = PreTokenizer::new(GPT2_PATTERN, &[]).unwrap();
        let counts = p
            .tokenize_chunk(&corpus, ChunkJob { start: 8, end: 19 })
            .unwrap();
        assert!(counts.contains_key(&ids("three", 0)));
        assert!(!counts.contains_key(&ids("one", 0)));
    }

    #[test]
    fn test_tokenize_empty_chunk_is_noop() {
        let corpus = MemoryCorpus::new(b"abc");
        let p = PreTokenizer::new(GPT2_PATTERN, &[]).unwrap();
        let counts = p.tokenize_chunk(&corpus, ChunkJob { start: 3, end: 3 }).unwrap();
        assert!(counts.is_empty());
    }

    #[test]
    fn test_merge_word_counts_accumulates() {
        let mut a = WordCounts::new();
        a.insert(vec![1, 2], 3);
        a.insert(vec![4], 1);
        let mut b = WordCounts::new();
        b.insert(vec![1, 2], 2);
        b.insert(vec![5, 6], 7);
        let merged = merge_word_counts(vec![a, b]);
        assert_eq!(merged[&vec![1, 2]], 5);
        assert_eq!(merged[&vec![4]], 1);
        assert_eq!(merged[&vec![5, 6]], 7);
    }

    #[test]
    fn test_merge_word_counts_empty() {
        assert!(merge_word_counts(Vec::new()).is_empty());
    }

    #[test]
    fn test_pre_tokenize_matches_single_pass() {
        let mut text = String::new();
        for i in 0..200 {
            text.push_str(&format!("the cat {i} sat on the mat<|endoftext|>"));
        }
        let specials = vec!["<|endoftext|>".to_string()];
        let p = PreTokenizer::new(GPT2_PATTERN, &specials).unwrap();
        let corpus = MemoryCorpus::new(text.as_bytes());

        let parallel = pre_tokenize(&corpus, &p, b"<|endoftext|>", 4).unwrap();
        let single = p.count_words(&text).unwrap();
        assert_eq!(parallel, single);
    }

    #[test]
    fn test_chunk_job_from_boundaries() {
        let jobs = ChunkJob::from_boundaries(&[0, 5, 9]);
        assert_eq!(
            jobs,
            vec![ChunkJob { start: 0, end: 5 }, ChunkJob { start: 5, end: 9 }]
        );
        assert!(ChunkJob::from_boundaries(&[0]).is_empty());
    }
}

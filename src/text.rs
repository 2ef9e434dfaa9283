//! Character vocabulary and corpus preparation for the character-level model.
//!
//! The corpus is turned into (input, target) index pairs where each target is
//! the next character, and then cut into contiguous minibatches.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::{LstmError, Result};

/// Symbol used as the target of the last character in the corpus.
pub const SENTINEL: char = '.';

/// Character vocabulary for text generation tasks.
///
/// Maps characters to indices `0..size()` and back. Characters are sorted, so
/// the same text always yields the same indices.
#[derive(Clone, Debug, PartialEq)]
pub struct TextVocabulary {
    char_to_idx: HashMap<char, usize>,
    idx_to_char: Vec<char>,
}

impl TextVocabulary {
    /// Create vocabulary from text, extracting unique characters plus the sentinel.
    pub fn from_text(text: &str) -> Self {
        let mut chars: BTreeSet<char> = text.chars().collect();
        chars.insert(SENTINEL);
        let chars: Vec<char> = chars.into_iter().collect();
        Self::from_chars(&chars)
    }

    /// Create vocabulary from explicit character list, keeping its order.
    pub fn from_chars(chars: &[char]) -> Self {
        let mut idx_to_char = Vec::with_capacity(chars.len());
        let mut char_to_idx = HashMap::with_capacity(chars.len());
        for &ch in chars {
            if !char_to_idx.contains_key(&ch) {
                char_to_idx.insert(ch, idx_to_char.len());
                idx_to_char.push(ch);
            }
        }

        Self { char_to_idx, idx_to_char }
    }

    /// Get index for a character.
    pub fn char_to_index(&self, ch: char) -> Result<usize> {
        self.char_to_idx.get(&ch).copied().ok_or(LstmError::UnknownSymbol(ch))
    }

    /// Get character for an index.
    pub fn index_to_char(&self, idx: usize) -> Result<char> {
        self.idx_to_char.get(idx).copied().ok_or(LstmError::SymbolOutOfRange {
            index: idx,
            vocab_size: self.size(),
        })
    }

    /// Get vocabulary size.
    pub fn size(&self) -> usize {
        self.idx_to_char.len()
    }

    /// Check if character is in vocabulary.
    pub fn contains(&self, ch: char) -> bool {
        self.char_to_idx.contains_key(&ch)
    }

    /// Get all characters in vocabulary order.
    pub fn chars(&self) -> &[char] {
        &self.idx_to_char
    }

    /// Encode string to indices.
    pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
        text.chars().map(|ch| self.char_to_index(ch)).collect()
    }

    /// Decode indices to string.
    pub fn decode(&self, indices: &[usize]) -> Result<String> {
        indices.iter().map(|&idx| self.index_to_char(idx)).collect()
    }
}

/// A contiguous run of (input, target) pairs from the corpus.
#[derive(Clone, Debug, PartialEq)]
pub struct Minibatch {
    pub inputs: Vec<usize>,
    pub targets: Vec<usize>,
}

impl Minibatch {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn pairs(&self) -> impl DoubleEndedIterator<Item = (usize, usize)> + ExactSizeIterator + '_ {
        self.inputs.iter().copied().zip(self.targets.iter().copied())
    }
}

/// Training text encoded as next-character prediction pairs.
#[derive(Clone, Debug)]
pub struct Corpus {
    pub vocab: TextVocabulary,
    pub inputs: Vec<usize>,
    pub targets: Vec<usize>,
}

impl Corpus {
    /// Build the vocabulary from `text` and encode it.
    pub fn from_text(text: &str) -> Result<Self> {
        Self::with_vocabulary(text, TextVocabulary::from_text(text))
    }

    /// Read a UTF-8 text file fully into memory and encode it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    /// Encode `text` against an existing vocabulary.
    ///
    /// The target at position `t` is the character at `t + 1`; the last
    /// position targets the sentinel.
    pub fn with_vocabulary(text: &str, vocab: TextVocabulary) -> Result<Self> {
        if text.is_empty() {
            return Err(LstmError::EmptyCorpus);
        }

        let inputs = vocab.encode(text)?;
        let mut targets = Vec::with_capacity(inputs.len());
        targets.extend_from_slice(&inputs[1..]);
        targets.push(vocab.char_to_index(SENTINEL)?);

        Ok(Corpus { vocab, inputs, targets })
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Cut the corpus into consecutive minibatches of `seq_len` pairs.
    ///
    /// Together the minibatches cover every pair exactly once, in order; the
    /// last one is shorter when `seq_len` does not divide the corpus length.
    pub fn minibatches(&self, seq_len: usize) -> Result<Vec<Minibatch>> {
        if seq_len == 0 {
            return Err(LstmError::InvalidConfig("minibatch length must be positive".to_string()));
        }

        Ok(self
            .inputs
            .chunks(seq_len)
            .zip(self.targets.chunks(seq_len))
            .map(|(inputs, targets)| Minibatch {
                inputs: inputs.to_vec(),
                targets: targets.to_vec(),
            })
            .collect())
    }
}

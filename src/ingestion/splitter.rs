//! Deterministic overlapping-window text splitting.
//!
//! The splitter produces consecutive windows of up to `max_size` characters;
//! each window after the first begins `max_size - overlap` characters after
//! the previous window's start, so consecutive chunks share `overlap`
//! characters. When a whitespace break point exists within the last
//! `overlap` characters of a window the chunk ends there instead of cutting
//! a token in half; the skipped tail is always covered by the next window,
//! so no text is ever lost. Identical input and config always yield an
//! identical chunk sequence.

use crate::types::{Chunk, QuerysmithError};

/// Splits documents into overlapping bounded-size [`Chunk`]s.
///
/// All window arithmetic is in characters (`char` boundaries), never raw
/// bytes, so multi-byte text cannot be cut mid-codepoint. `source_offset`
/// on the produced chunks is the byte offset of the window start, suitable
/// for slicing back into the original document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextSplitter {
    max_size: usize,
    overlap: usize,
}

impl TextSplitter {
    /// Creates a splitter, rejecting degenerate window geometry.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self, QuerysmithError> {
        if max_size == 0 {
            return Err(QuerysmithError::InvalidConfig(
                "chunk max_size must be greater than zero".into(),
            ));
        }
        if overlap >= max_size {
            return Err(QuerysmithError::InvalidConfig(format!(
                "chunk overlap ({overlap}) must be smaller than max_size ({max_size})"
            )));
        }
        Ok(Self { max_size, overlap })
    }

    /// Builds a splitter from the pipeline configuration.
    pub fn from_config(config: &crate::config::PipelineConfig) -> Result<Self, QuerysmithError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `document` into chunks with sequential ids starting at 0.
    ///
    /// An empty document yields an empty sequence; the final chunk may be
    /// shorter than `max_size`.
    pub fn split(&self, document: &str) -> Vec<Chunk> {
        let chars: Vec<(usize, char)> = document.char_indices().collect();
        let total = chars.len();
        let stride = self.max_size - self.overlap;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut id = 0u64;

        while start < total {
            let hard_end = (start + self.max_size).min(total);
            let end = if hard_end < total {
                self.preferred_break(&chars, hard_end)
            } else {
                hard_end
            };

            let byte_start = chars[start].0;
            let byte_end = if end < total {
                chars[end].0
            } else {
                document.len()
            };
            chunks.push(Chunk::new(id, &document[byte_start..byte_end], byte_start));
            id += 1;

            if hard_end == total {
                break;
            }
            start += stride;
        }

        chunks
    }

    /// Finds the last whitespace position within the final `overlap`
    /// characters of the window, or falls back to the hard limit.
    ///
    /// The returned position is always past the next window's start
    /// (`hard_end - overlap`), so shrinking a chunk never leaves a gap.
    fn preferred_break(&self, chars: &[(usize, char)], hard_end: usize) -> usize {
        let window_tail = hard_end - self.overlap;
        (window_tail..hard_end)
            .rev()
            .find(|&pos| chars[pos].1.is_whitespace())
            .unwrap_or(hard_end)
    }
}

//! Paragraph chunking for corpus indexing.
//!
//! The corpus is split on blank-line boundaries: one or more lines holding
//! only whitespace between two paragraphs. Paragraphs are trusted as semantic
//! units, so no size capping or re-merging is performed. Chunks that are empty
//! after trimming are discarded.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::Chunk;

#[allow(clippy::expect_used)]
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph break pattern is a valid literal"));

/// Splits raw corpus text into paragraph chunks.
///
/// Borrowing the corpus keeps iteration restartable: every call to
/// [`ParagraphChunker::chunks`] starts again from the first paragraph.
#[derive(Debug, Clone, Copy)]
pub struct ParagraphChunker<'a> {
    corpus: &'a str,
}

impl<'a> ParagraphChunker<'a> {
    /// Create a chunker over `corpus`.
    pub fn new(corpus: &'a str) -> Self {
        Self { corpus }
    }

    /// Iterate over the non-empty paragraphs in corpus order.
    pub fn chunks(&self) -> Paragraphs<'a> {
        Paragraphs {
            corpus: self.corpus,
            cursor: 0,
        }
    }
}

/// Split `corpus` into chunks, collecting the iterator.
pub fn chunk_paragraphs(corpus: &str) -> Vec<Chunk> {
    ParagraphChunker::new(corpus).chunks().collect()
}

/// Iterator over the paragraphs of a corpus.
#[derive(Debug, Clone)]
pub struct Paragraphs<'a> {
    corpus: &'a str,
    cursor: usize,
}

impl Iterator for Paragraphs<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        while self.cursor <= self.corpus.len() {
            let start = self.cursor;
            let rest = &self.corpus[start..];
            let (end, next) = match PARAGRAPH_BREAK.find(rest) {
                Some(m) => (start + m.start(), start + m.end()),
                None => (self.corpus.len(), self.corpus.len() + 1),
            };
            self.cursor = next;

            let raw = &self.corpus[start..end];
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let offset = start + (raw.len() - raw.trim_start().len());
            return Some(Chunk::new(trimmed).with_offset(offset));
        }
        None
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Overlapping word-window text chunker.
//!
//! Splits document text into [`Passage`]s of at most `target_tokens`
//! whitespace-delimited words. Consecutive windows share `overlap_tokens`
//! words. When a window would end mid-sentence, its end is pulled back to
//! the nearest preceding sentence or line break, as long as the passage
//! keeps at least half of the target size. Passages shorter than
//! `min_chars` characters are dropped and the survivors are indexed
//! contiguously from 0.
//!
//! Chunk boundaries are a pure function of position, so a run can be
//! resumed from any passage index with [`Passages::resume_from`].

use crate::config::ChunkingConfig;

/// A contiguous span of the source text produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    /// 0-based, contiguous index among emitted passages.
    pub index: usize,
    /// The original text slice, inner whitespace preserved.
    pub text: String,
    /// First word of the window (inclusive).
    pub start_token: usize,
    /// Last word of the window (exclusive).
    pub end_token: usize,
    /// Byte offset of the passage in the source text.
    pub byte_offset: usize,
    /// Whether the window end was pulled back to a sentence boundary.
    pub snapped: bool,
}

impl Passage {
    pub fn token_count(&self) -> usize {
        self.end_token - self.start_token
    }
}

#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
    newline_before: bool,
}

/// Lazy iterator over the passages of one text.
pub struct Passages<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    target: usize,
    overlap: usize,
    min_chars: usize,
    start: usize,
    next_index: usize,
    done: bool,
}

impl<'a> Passages<'a> {
    pub fn new(text: &'a str, config: &ChunkingConfig) -> Self {
        Self {
            text,
            tokens: tokenize(text),
            target: config.target_tokens.max(1),
            overlap: config.overlap_tokens,
            min_chars: config.min_chars,
            start: 0,
            next_index: 0,
            done: false,
        }
    }

    /// Skip to the passage with index `index`; yields exactly the passages
    /// a full run would yield from that index on.
    pub fn resume_from(self, index: usize) -> std::iter::Skip<Self> {
        self.skip(index)
    }

    /// Whether a window may end right before token `i`.
    fn is_boundary(&self, i: usize) -> bool {
        if i == 0 || i >= self.tokens.len() {
            return true;
        }
        if self.tokens[i].newline_before {
            return true;
        }
        let prev = self.tokens[i - 1];
        ends_sentence(&self.text[prev.start..prev.end])
    }
}

impl Iterator for Passages<'_> {
    type Item = Passage;

    fn next(&mut self) -> Option<Passage> {
        let n = self.tokens.len();
        loop {
            if self.done || self.start >= n {
                return None;
            }

            let start = self.start;
            let mut end = (start + self.target).min(n);
            let mut snapped = false;

            if end < n && !self.is_boundary(end) {
                let min_end = start + self.target.div_ceil(2);
                if let Some(b) = (min_end..end).rev().find(|&i| self.is_boundary(i)) {
                    end = b;
                    snapped = true;
                }
            }

            if end >= n {
                self.done = true;
            } else {
                self.start = end.saturating_sub(self.overlap).max(start + 1);
            }

            let byte_offset = self.tokens[start].start;
            let text = &self.text[byte_offset..self.tokens[end - 1].end];
            if text.chars().count() < self.min_chars {
                continue;
            }

            let passage = Passage {
                index: self.next_index,
                text: text.to_string(),
                start_token: start,
                end_token: end,
                byte_offset,
                snapped,
            };
            self.next_index += 1;
            return Some(passage);
        }
    }
}

/// Split `text` into overlapping passages.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<Passage> {
    Passages::new(text, config).collect()
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;
    let mut newline_in_gap = false;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = word_start.take() {
                tokens.push(Token {
                    start: s,
                    end: i,
                    newline_before: newline_in_gap,
                });
                newline_in_gap = false;
            }
            if c == '\n' {
                newline_in_gap = true;
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(s) = word_start {
        tokens.push(Token {
            start: s,
            end: text.len(),
            newline_before: newline_in_gap,
        });
    }
    tokens
}

fn ends_sentence(word: &str) -> bool {
    let trimmed = word.trim_end_matches(['"', '\'', ')', ']', '\u{201d}', '\u{2019}']);
    trimmed.ends_with(['.', '!', '?'])
}

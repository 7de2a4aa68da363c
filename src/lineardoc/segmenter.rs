//! Sentence boundary adapter.
//!
//! The pipeline treats sentence splitting as an injected function from
//! plaintext to ordered boundary offsets. The adapter wraps either a
//! sentence splitter (whose sentences are located by forward search) or a
//! raw boundary function, and validates the result before anyone trusts it:
//! splitters that re-search substrings are known to produce duplicate or
//! non-monotonic offsets on repeated text.

use super::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// A function that splits plaintext into sentences.
pub type SplitFn = Box<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// A function that reports sentence-start offsets directly.
pub type BoundaryFn = Box<dyn Fn(&str) -> Vec<usize> + Send + Sync>;

/// The injected sentence source.
enum Source {
    /// Sentences, converted to offsets by forward search.
    Split(SplitFn),
    /// Offsets as-is.
    Boundaries(BoundaryFn),
}

/// Adapts an injected sentence splitter to the validated boundary-offset
/// form [`Doc::segment`](super::doc::Doc::segment) consumes.
pub struct Segmenter {
    /// Where boundaries come from.
    source: Source,
}

impl Segmenter {
    /// Wraps a sentence splitter.
    pub fn from_splitter(split: SplitFn) -> Self {
        Segmenter {
            source: Source::Split(split),
        }
    }

    /// Wraps a raw boundary function.
    pub fn from_boundaries(boundaries: BoundaryFn) -> Self {
        Segmenter {
            source: Source::Boundaries(boundaries),
        }
    }

    /// Returns the validated, strictly increasing sentence-start offsets of
    /// `text`. Empty text has no boundaries.
    pub fn boundaries(&self, text: &str) -> Result<Vec<usize>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let mut offsets = match &self.source {
            Source::Boundaries(boundaries) => boundaries(text),
            Source::Split(split) => {
                let mut offsets = Vec::new();
                let mut cursor = 0;
                for sentence in split(text) {
                    if sentence.is_empty() {
                        continue;
                    }
                    if let Some(found) = text[cursor..].find(&sentence) {
                        offsets.push(cursor + found);
                        cursor += found + sentence.len();
                    }
                }
                offsets
            }
        };
        offsets.sort_unstable();
        offsets.dedup();
        for &offset in &offsets {
            if offset > text.len() {
                return Err(Error::BoundaryOutOfRange {
                    offset,
                    len: text.len(),
                });
            }
            if !text.is_char_boundary(offset) {
                return Err(Error::BoundaryNotCharAligned(offset));
            }
        }
        Ok(offsets)
    }
}

impl Default for Segmenter {
    /// A naive terminal-punctuation splitter, sufficient for driving the
    /// pipeline when no language-aware splitter is injected.
    fn default() -> Self {
        Segmenter::from_splitter(Box::new(naive_split))
    }
}

/// Splits after terminal punctuation (plus any closing quotes or brackets)
/// followed by whitespace; the whitespace stays with the finished sentence.
fn naive_split(text: &str) -> Vec<String> {
    static BREAK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"[.!?]["'”’)\]]*\s+"#).unwrap());

    let mut sentences = Vec::new();
    let mut start = 0;
    for found in BREAK.find_iter(text) {
        sentences.push(text[start..found.end()].to_string());
        start = found.end();
    }
    if start < text.len() {
        sentences.push(text[start..].to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_boundaries() {
        let segmenter = Segmenter::default();
        assert_eq!(
            segmenter
                .boundaries("First sentence. Second sentence.")
                .unwrap(),
            vec![0, 16]
        );
        assert_eq!(segmenter.boundaries("").unwrap(), Vec::<usize>::new());
        assert_eq!(segmenter.boundaries("No break here").unwrap(), vec![0]);
    }

    #[test]
    fn test_quoted_terminal_punctuation() {
        let segmenter = Segmenter::default();
        assert_eq!(
            segmenter.boundaries("He said \"Stop.\" She left.").unwrap(),
            vec![0, 16]
        );
    }

    #[test]
    fn test_duplicate_offsets_collapse() {
        let segmenter = Segmenter::from_boundaries(Box::new(|_| vec![4, 0, 4, 2]));
        assert_eq!(segmenter.boundaries("abcdef").unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn test_out_of_range_offset_is_rejected() {
        let segmenter = Segmenter::from_boundaries(Box::new(|text| vec![text.len() + 1]));
        assert!(matches!(
            segmenter.boundaries("ab"),
            Err(Error::BoundaryOutOfRange { offset: 3, len: 2 })
        ));
    }

    #[test]
    fn test_char_misaligned_offset_is_rejected() {
        let segmenter = Segmenter::from_boundaries(Box::new(|_| vec![1]));
        assert!(matches!(
            segmenter.boundaries("é!"),
            Err(Error::BoundaryNotCharAligned(1))
        ));
    }

    #[test]
    fn test_unlocatable_sentences_are_skipped() {
        let segmenter =
            Segmenter::from_splitter(Box::new(|_| vec!["missing".to_string(), "ab".to_string()]));
        assert_eq!(segmenter.boundaries("ab").unwrap(), vec![0]);
    }
}

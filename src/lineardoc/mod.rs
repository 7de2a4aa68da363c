//! The linear document pipeline.
//!
//! Parsoid HTML arrives as a tree of tags; machine translation wants
//! sentences. This module flattens the tree into a linear form that serves
//! both masters:
//!
//! 1. The [`Parser`] streams SAX events over the input. The
//!    [`Contextualizer`] decides each tag's fate (removable subtrees are
//!    dropped outright, figures and styles suspend segmentation) and the
//!    `Builder` folds what survives into a `Doc`: a flat item sequence of
//!    block opens and closes, paragraph-scale text blocks, and verbatim
//!    inter-block whitespace. References and math bodies are assembled as
//!    sub-documents owned by a zero-width chunk of their parent block.
//! 2. `Doc::wrap_sections` re-partitions the top level into numbered
//!    `cx:Section` wrappers and gives every tag a stable sequential id.
//! 3. `Doc::segment` asks the injected [`Segmenter`] for sentence
//!    boundaries in plaintext coordinates, projects them back onto the
//!    chunked text model, wraps each sentence in a `cx-segment` span, and
//!    tags every translatable link.
//! 4. `Doc::get_html` re-serializes. The load-bearing invariant all the
//!    way through: the concatenated chunk text of every block equals the
//!    plaintext the segmenter saw, so boundary offsets can always be mapped
//!    back losslessly.
//!
//! One request owns one parser/builder/document graph exclusively; nothing
//! here is re-entrant or shared. The compiled removable-section rules are
//! the only cross-request state, and they are read-only.

pub use builder::Builder;
pub use contextualizer::{
    Context, Contextualizer, KeepAll, MwContextualizer, Removability, RemovableRules,
};
pub use doc::{Doc, IdSequence, Item};
pub use normalizer::Normalizer;
pub use parser::{Options, Parser};
pub use segmenter::{BoundaryFn, Segmenter, SplitFn};
pub use textblock::{InlineContent, Range, RangeMapping, TagOffset, TextBlock, TextChunk};

mod builder;
mod contextualizer;
mod doc;
mod normalizer;
mod parser;
mod segmenter;
pub mod tags;
mod textblock;

/// A pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request body held no HTML to work on.
    #[error("refusing to process empty HTML input")]
    EmptyInput,

    /// A close tag did not match the innermost open tag.
    #[error("mismatched close tag: expected </{expected}>, got </{actual}>")]
    TagMismatch {
        /// The name of the innermost open tag.
        expected: String,
        /// The name actually closed.
        actual: String,
    },

    /// A close tag arrived with nothing open.
    #[error("unexpected close tag </{0}>")]
    UnexpectedClose(String),

    /// An element was still open at the end of input.
    #[error("unclosed element <{0}> at end of input")]
    Unclosed(String),

    /// Something other than a reference or math wrapper tried to close a
    /// sub-document.
    #[error("unexpected close tag </{0}> inside an inline sub-document")]
    BadSubDocumentClose(String),

    /// Two translation target ranges overlap.
    #[error("overlapping target ranges at offset {0}")]
    RangeOverlap(usize),

    /// The segmenter reported a boundary past the end of the plaintext.
    #[error("segment boundary {offset} outside plaintext of length {len}")]
    BoundaryOutOfRange {
        /// The offending offset.
        offset: usize,
        /// The plaintext length.
        len: usize,
    },

    /// The segmenter reported a boundary inside a multi-byte character.
    #[error("segment boundary {0} is not a character boundary")]
    BoundaryNotCharAligned(usize),

    /// A removable-template entry failed to compile.
    #[error("bad removable template pattern: {0}")]
    TemplatePattern(#[from] regex::Error),

    /// The tokenizer rejected the input.
    #[error("tokenizer error: {0}")]
    Tokenizer(#[from] quick_xml::Error),
}

/// The pipeline result type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Runs the whole pipeline over one document: parse, wrap sections,
/// segment, serialize.
pub fn prepare(
    html: &str,
    contextualizer: MwContextualizer,
    segmenter: &Segmenter,
) -> Result<String> {
    if html.trim().is_empty() {
        return Err(Error::EmptyInput);
    }
    let doc = Parser::new(contextualizer, Options::default()).parse(html)?;
    let doc = doc.wrap_sections();
    let doc = doc.segment(segmenter)?;
    Ok(doc.get_html())
}

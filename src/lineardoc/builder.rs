//! Stateful assembly of the linear document.

use super::{
    Error, Result,
    doc::{Doc, Item},
    tags::{TagRef, is_category, is_external_link, is_transclusion},
    textblock::{InlineContent, TextBlock, TextChunk},
};
use std::rc::Rc;

/// Assembles a [`Doc`] from parser events: a stack of open block tags, a
/// stack of open inline annotation tags, and the pending chunks of the text
/// block being built.
pub struct Builder {
    /// The open block tags.
    block_tags: Vec<TagRef>,
    /// The open inline annotation tags; chunks snapshot this stack.
    inline_annotation_tags: Vec<TagRef>,
    /// The chunks of the text block in progress.
    chunks: Vec<TextChunk>,
    /// Whether every context that contributed to the pending block allowed
    /// segmentation.
    is_block_segmentable: bool,
    /// The document under construction.
    pub doc: Doc,
}

impl Builder {
    /// Creates a builder, optionally for a sub-document wrapped by a tag.
    pub fn new(wrapper_tag: Option<TagRef>) -> Self {
        Builder {
            block_tags: Vec::new(),
            inline_annotation_tags: Vec::new(),
            chunks: Vec::new(),
            is_block_segmentable: true,
            doc: Doc::new(wrapper_tag),
        }
    }

    /// Creates the builder for a sub-document (reference or math body)
    /// wrapped by `tag`.
    pub fn create_child_builder(&self, tag: TagRef) -> Builder {
        Builder::new(Some(tag))
    }

    /// Whether any inline annotation tag is open.
    pub fn has_open_annotations(&self) -> bool {
        !self.inline_annotation_tags.is_empty()
    }

    /// Opens a block tag: the pending text block is finished first.
    pub fn push_block_tag(&mut self, tag: TagRef) {
        self.finish_text_block();
        if tag.name == "figure" {
            tag.set_attr("rel", "cx:Figure");
        }
        self.block_tags.push(Rc::clone(&tag));
        self.doc.add_item(Item::Open(tag));
    }

    /// Closes the innermost block tag, which must be named `name`.
    pub fn pop_block_tag(&mut self, name: &str) -> Result<()> {
        self.finish_text_block();
        let tag = self
            .block_tags
            .pop()
            .ok_or_else(|| Error::UnexpectedClose(name.to_string()))?;
        if tag.name != name {
            return Err(Error::TagMismatch {
                expected: tag.name.clone(),
                actual: name.to_string(),
            });
        }
        self.doc.add_item(Item::Close(tag));
        Ok(())
    }

    /// Opens an inline annotation tag.
    pub fn push_inline_annotation_tag(&mut self, tag: TagRef) {
        self.inline_annotation_tags.push(tag);
    }

    /// Closes the innermost inline annotation tag, which must be named
    /// `name`.
    ///
    /// A closing annotation that contains only whitespace is collapsed: if
    /// it is an external link or a transclusion, its trailing
    /// whitespace-only chunks are replaced by a single zero-width chunk
    /// whose sub-document wraps the whitespace, so the element survives as
    /// an atomic inline item instead of evaporating. References never take
    /// this path; the parser assembles them as sub-documents before the
    /// annotation stack is involved.
    pub fn pop_inline_annotation_tag(&mut self, name: &str) -> Result<()> {
        let tag = self
            .inline_annotation_tags
            .pop()
            .ok_or_else(|| Error::UnexpectedClose(name.to_string()))?;
        if tag.name != name {
            return Err(Error::TagMismatch {
                expected: tag.name.clone(),
                actual: name.to_string(),
            });
        }
        let depth = self.inline_annotation_tags.len();
        if tag.attributes.borrow().is_empty() {
            return Ok(());
        }

        let mut cut = self.chunks.len();
        for (index, chunk) in self.chunks.iter().enumerate().rev() {
            let inside = chunk.tags.len() > depth && Rc::ptr_eq(&chunk.tags[depth], &tag);
            if !inside {
                break;
            }
            if !chunk.text.trim().is_empty() || chunk.inline_content.is_some() {
                // Real content: the tag stays a plain annotation.
                return Ok(());
            }
            cut = index;
        }

        if is_external_link(&tag) || is_transclusion(&tag) {
            let whitespace: String = self.chunks[cut..]
                .iter()
                .map(|chunk| chunk.text.as_str())
                .collect();
            self.chunks.truncate(cut);
            let mut sub = Doc::new(Some(Rc::clone(&tag)));
            if !whitespace.is_empty() {
                sub.add_item(Item::TextBlock(TextBlock::new(
                    vec![TextChunk::new(whitespace, Vec::new(), None)],
                    true,
                )));
            }
            self.add_inline_content(InlineContent::Doc(sub), true);
        }
        Ok(())
    }

    /// Appends a text chunk under the current annotation stack.
    pub fn add_text_chunk(&mut self, text: impl Into<String>, can_segment: bool) {
        self.chunks.push(TextChunk::new(
            text.into(),
            self.inline_annotation_tags.clone(),
            None,
        ));
        self.is_block_segmentable &= can_segment;
    }

    /// Appends inline content as a zero-width chunk. Category links are
    /// routed into the document's category collection instead.
    pub fn add_inline_content(&mut self, content: InlineContent, can_segment: bool) {
        if let InlineContent::Tag(tag) = &content
            && is_category(tag)
        {
            self.doc.categories.push(Rc::clone(tag));
            return;
        }
        self.chunks.push(TextChunk::new(
            String::new(),
            self.inline_annotation_tags.clone(),
            Some(content),
        ));
        self.is_block_segmentable &= can_segment;
    }

    /// Finishes the pending text block: whitespace-only chunks become a
    /// block-space item, anything else a text block. Pending state resets.
    pub fn finish_text_block(&mut self) {
        if self.chunks.is_empty() {
            return;
        }
        let whitespace_only = self
            .chunks
            .iter()
            .all(|chunk| chunk.inline_content.is_none() && chunk.text.trim().is_empty());
        if whitespace_only {
            let space: String = self
                .chunks
                .drain(..)
                .map(|chunk| chunk.text)
                .collect();
            self.doc.add_item(Item::BlockSpace(space));
        } else {
            let chunks = core::mem::take(&mut self.chunks);
            self.doc
                .add_item(Item::TextBlock(TextBlock::new(
                    chunks,
                    self.is_block_segmentable,
                )));
        }
        self.is_block_segmentable = true;
    }
}

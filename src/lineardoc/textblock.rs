//! Annotated text runs: chunks and paragraph-scale blocks.
//!
//! A text block owns the inline content of one paragraph-scale region as a
//! flat list of chunks. Concatenating the chunk texts yields exactly the
//! plaintext a sentence segmenter sees, which is the invariant that lets
//! boundary offsets reported in plaintext coordinates be mapped back onto
//! chunk-relative splits without loss.

use super::{
    Error, Result,
    doc::{Doc, IdSequence},
    segmenter::Segmenter,
    tags::{Attributes, Tag, TagRef, append_close_tag, append_open_tag, escape_text_into,
        is_translatable_link, is_transclusion},
};
use std::rc::Rc;

/// Inline content carried by a zero-width chunk: either a lone void tag or
/// a nested sub-document (a reference or math body).
#[derive(Clone, Debug)]
pub enum InlineContent {
    /// A self-contained empty element, e.g. `<br/>` or `<img/>`.
    Tag(TagRef),
    /// A sub-document owned by this chunk.
    Doc(Doc),
}

/// A run of text over which one ordered stack of inline annotation tags is
/// open.
///
/// The tag list is a snapshot of the builder's live annotation stack at the
/// moment the chunk was created: the vector is copied, the tags themselves
/// are shared, so a later pass that decorates a tag is visible in every
/// chunk holding it.
#[derive(Clone, Debug)]
pub struct TextChunk {
    /// The chunk text. Empty when the chunk exists only to carry
    /// [`inline_content`](Self::inline_content).
    pub text: String,
    /// The open inline annotation tags, outermost first.
    pub tags: Vec<TagRef>,
    /// Inline content at the end of the chunk.
    pub inline_content: Option<InlineContent>,
}

impl TextChunk {
    /// Creates a new chunk.
    pub fn new(text: String, tags: Vec<TagRef>, inline_content: Option<InlineContent>) -> Self {
        TextChunk {
            text,
            tags,
            inline_content,
        }
    }
}

/// The plaintext position of one chunk of a [`TextBlock`].
#[derive(Clone, Debug)]
pub struct TagOffset {
    /// Byte offset of the chunk's text in the block plaintext.
    pub start: usize,
    /// Byte length of the chunk's text.
    pub length: usize,
    /// The chunk's annotation stack snapshot.
    pub tags: Vec<TagRef>,
}

/// A source or target range in plaintext byte offsets.
#[derive(Clone, Copy, Debug)]
pub struct Range {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte length of the range.
    pub length: usize,
}

impl Range {
    /// The exclusive end offset.
    fn end(self) -> usize {
        self.start + self.length
    }
}

/// An aligned pair of source and target ranges used to project inline
/// annotations onto translated text.
#[derive(Clone, Copy, Debug)]
pub struct RangeMapping {
    /// The covered range of the source plaintext.
    pub source: Range,
    /// The corresponding range of the target plaintext.
    pub target: Range,
}

/// One paragraph-scale run of inline content.
#[derive(Clone, Debug)]
pub struct TextBlock {
    /// The chunks, in document order.
    pub chunks: Vec<TextChunk>,
    /// False iff any non-segmentable context contributed to the block.
    pub can_segment: bool,
    /// Plaintext positions parallel to [`chunks`](Self::chunks).
    offsets: Vec<TagOffset>,
}

impl TextBlock {
    /// Creates a block and computes the chunk offsets.
    pub fn new(chunks: Vec<TextChunk>, can_segment: bool) -> Self {
        let mut offsets = Vec::with_capacity(chunks.len());
        let mut start = 0;
        for chunk in &chunks {
            offsets.push(TagOffset {
                start,
                length: chunk.text.len(),
                tags: chunk.tags.clone(),
            });
            start += chunk.text.len();
        }
        TextBlock {
            chunks,
            can_segment,
            offsets,
        }
    }

    /// The longest common prefix of the chunks' annotation stacks, compared
    /// by tag identity.
    pub fn common_tags(&self) -> Vec<TagRef> {
        let len = common_prefix_len(&self.chunks);
        self.chunks
            .first()
            .map_or_else(Vec::new, |first| first.tags[..len].to_vec())
    }

    /// The offsets of chunks annotated more deeply than the common prefix
    /// and carrying actual text. These runs bound where a segment may end:
    /// segmentation drops any sentence boundary falling strictly inside
    /// one, so a link label or footnote marker is never split in two.
    pub fn get_tag_offsets(&self) -> Vec<TagOffset> {
        let common = common_prefix_len(&self.chunks);
        self.offsets
            .iter()
            .filter(|offset| offset.tags.len() > common && offset.length > 0)
            .cloned()
            .collect()
    }

    /// The concatenated chunk text.
    pub fn get_plain_text(&self) -> String {
        let mut text = String::new();
        for chunk in &self.chunks {
            text.push_str(&chunk.text);
        }
        text
    }

    /// The item governing the whole block, if the block is not plain text:
    /// the outermost tag of the first significant chunk, descending into
    /// inline sub-documents.
    pub fn get_root_item(&self) -> Option<TagRef> {
        let chunk = self.chunks.iter().find(|chunk| {
            !chunk.text.trim().is_empty() || !chunk.tags.is_empty() || chunk.inline_content.is_some()
        })?;
        if let Some(tag) = chunk.tags.first() {
            return Some(Rc::clone(tag));
        }
        match &chunk.inline_content {
            Some(InlineContent::Tag(tag)) => Some(Rc::clone(tag)),
            Some(InlineContent::Doc(doc)) => doc.get_root_item(),
            None => None,
        }
    }

    /// Emits the block as HTML with a minimal-reopen tag sequence: between
    /// adjacent chunks only the divergent suffix of the annotation stack is
    /// closed and reopened.
    pub fn get_html(&self) -> String {
        let mut html = String::new();
        let mut open: &[TagRef] = &[];
        for chunk in &self.chunks {
            let mut shared = 0;
            while shared < open.len()
                && shared < chunk.tags.len()
                && Rc::ptr_eq(&open[shared], &chunk.tags[shared])
            {
                shared += 1;
            }
            for tag in open[shared..].iter().rev() {
                append_close_tag(&mut html, tag);
            }
            for tag in &chunk.tags[shared..] {
                append_open_tag(&mut html, tag);
            }
            escape_text_into(&mut html, &chunk.text);
            match &chunk.inline_content {
                Some(InlineContent::Tag(tag)) => {
                    append_open_tag(&mut html, tag);
                    append_close_tag(&mut html, tag);
                }
                Some(InlineContent::Doc(doc)) => html.push_str(&doc.get_html()),
                None => {}
            }
            open = &chunk.tags;
        }
        for tag in open.iter().rev() {
            append_close_tag(&mut html, tag);
        }
        html
    }

    /// Splits the block into sentence segments.
    ///
    /// Boundaries are requested in plaintext coordinates and re-projected
    /// onto chunk-relative splits; each finished segment is wrapped in a
    /// `cx-segment` span and its links are tagged. Blocks rooted in a
    /// transclusion are returned unchanged.
    pub fn segment(&self, segmenter: &Segmenter, ids: &IdSequence) -> Result<TextBlock> {
        if self
            .get_root_item()
            .is_some_and(|root| is_transclusion(&root))
        {
            return Ok(self.clone());
        }

        let plain = self.get_plain_text();
        // Boundaries strictly inside an annotated run do not end a segment.
        let tag_offsets = self.get_tag_offsets();
        let boundaries: Vec<usize> = segmenter
            .boundaries(&plain)?
            .into_iter()
            .filter(|&boundary| {
                !tag_offsets.iter().any(|offset| {
                    offset.start < boundary && boundary < offset.start + offset.length
                })
            })
            .collect();
        let mut bounds = boundaries.iter().copied().peekable();

        let mut chunks = Vec::with_capacity(self.chunks.len());
        let mut pending: Vec<TextChunk> = Vec::new();
        let mut pos = 0;
        for chunk in &self.chunks {
            if bounds.peek() == Some(&pos) && pos < plain.len() {
                bounds.next();
                flush_segment(&mut pending, &mut chunks, ids);
            }
            if chunk.text.is_empty() {
                // Zero-width chunks stay at their position in the current
                // segment.
                pending.push(chunk.clone());
                continue;
            }
            let mut piece_start = 0;
            while let Some(&boundary) = bounds.peek() {
                if boundary >= pos + chunk.text.len() {
                    break;
                }
                bounds.next();
                pending.push(TextChunk::new(
                    chunk.text[piece_start..boundary - pos].to_string(),
                    chunk.tags.clone(),
                    None,
                ));
                flush_segment(&mut pending, &mut chunks, ids);
                piece_start = boundary - pos;
            }
            pending.push(TextChunk::new(
                chunk.text[piece_start..].to_string(),
                chunk.tags.clone(),
                chunk.inline_content.clone(),
            ));
            pos += chunk.text.len();
        }
        flush_segment(&mut pending, &mut chunks, ids);

        Ok(TextBlock::new(chunks, self.can_segment))
    }

    /// Tags every translatable link held by the block's chunks, descending
    /// into inline sub-documents.
    pub fn set_link_ids_in_place(&self, ids: &IdSequence) {
        set_link_ids(&self.chunks, ids);
    }

    /// Projects the block's inline annotations onto a translated plaintext.
    ///
    /// Mapped ranges take the annotation stack of the source chunk covering
    /// their start; zero-width source chunks inside a mapped range are
    /// carried over after it; unmapped target gaps and the tail fall back to
    /// the block's common tags.
    pub fn translate_tags(
        &self,
        target_text: &str,
        mappings: &[RangeMapping],
    ) -> Result<TextBlock> {
        let mut order: Vec<&RangeMapping> = mappings.iter().collect();
        order.sort_by_key(|mapping| mapping.target.start);

        let common = self.common_tags();
        let mut carried = vec![false; self.chunks.len()];
        let mut chunks = Vec::new();
        let mut pos = 0;
        for mapping in order {
            if mapping.target.start < pos {
                return Err(Error::RangeOverlap(mapping.target.start));
            }
            if mapping.target.start > pos {
                chunks.push(TextChunk::new(
                    target_text[pos..mapping.target.start].to_string(),
                    common.clone(),
                    None,
                ));
            }
            let (tags, inline_content) = match self.chunk_covering(mapping.source.start) {
                Some(index) => (
                    self.chunks[index].tags.clone(),
                    self.chunks[index].inline_content.clone(),
                ),
                None => (common.clone(), None),
            };
            chunks.push(TextChunk::new(
                target_text[mapping.target.start..mapping.target.end()].to_string(),
                tags,
                inline_content,
            ));
            for (index, offset) in self.offsets.iter().enumerate() {
                if !carried[index]
                    && self.chunks[index].text.is_empty()
                    && self.chunks[index].inline_content.is_some()
                    && offset.start >= mapping.source.start
                    && offset.start <= mapping.source.end()
                {
                    carried[index] = true;
                    chunks.push(self.chunks[index].clone());
                }
            }
            pos = mapping.target.end();
        }
        if pos < target_text.len() {
            chunks.push(TextChunk::new(
                target_text[pos..].to_string(),
                common,
                None,
            ));
        }

        Ok(TextBlock::new(chunks, self.can_segment))
    }

    /// Finds the chunk whose text covers the given plaintext offset.
    fn chunk_covering(&self, pos: usize) -> Option<usize> {
        let index = self
            .offsets
            .partition_point(|offset| offset.start + offset.length <= pos);
        (index < self.offsets.len() && self.offsets[index].start <= pos).then_some(index)
    }
}

/// The length of the longest common annotation-stack prefix, by identity.
fn common_prefix_len(chunks: &[TextChunk]) -> usize {
    let Some(first) = chunks.first() else {
        return 0;
    };
    let mut len = first.tags.len();
    for chunk in &chunks[1..] {
        let mut shared = 0;
        while shared < len
            && shared < chunk.tags.len()
            && Rc::ptr_eq(&first.tags[shared], &chunk.tags[shared])
        {
            shared += 1;
        }
        len = shared;
    }
    len
}

/// Finishes the accumulated segment: wraps its pieces in a fresh
/// `cx-segment` span inserted after their common tag prefix, then tags the
/// segment's links. Ids are only drawn once the segment holds pieces.
fn flush_segment(pending: &mut Vec<TextChunk>, out: &mut Vec<TextChunk>, ids: &IdSequence) {
    if pending.is_empty() {
        return;
    }
    let common = common_prefix_len(pending);
    let mut attributes = Attributes::new();
    attributes.insert("class".to_string(), "cx-segment".to_string());
    attributes.insert("data-segmentid".to_string(), ids.next());
    let segment = Tag::new("span", attributes, false);
    for piece in pending.iter_mut() {
        piece.tags.insert(common, Rc::clone(&segment));
    }
    set_link_ids(pending, ids);
    out.append(pending);
}

/// Assigns `data-linkid` and the `cx-link` class to every translatable link
/// in the chunks that does not already carry one.
pub fn set_link_ids(chunks: &[TextChunk], ids: &IdSequence) {
    for chunk in chunks {
        for tag in &chunk.tags {
            if is_translatable_link(tag) && !tag.has_attr("data-linkid") {
                tag.add_attr_token("class", "cx-link");
                tag.set_attr("data-linkid", ids.next());
            }
        }
        if let Some(InlineContent::Doc(doc)) = &chunk.inline_content {
            doc.set_link_ids(ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(text: &str, tags: &[&TagRef]) -> TextChunk {
        TextChunk::new(
            text.to_string(),
            tags.iter().map(|tag| Rc::clone(tag)).collect(),
            None,
        )
    }

    fn anchor(href: &str) -> TagRef {
        let mut attributes = Attributes::new();
        attributes.insert("href".to_string(), href.to_string());
        Tag::new("a", attributes, false)
    }

    #[test]
    fn test_offsets_partition_plaintext() {
        let b = Tag::plain("b");
        let block = TextBlock::new(
            vec![chunk("one ", &[]), chunk("two", &[&b]), chunk("!", &[])],
            true,
        );
        assert_eq!(block.get_plain_text(), "one two!");
        let mut end = 0;
        for offset in &block.offsets {
            assert_eq!(offset.start, end);
            end = offset.start + offset.length;
        }
        assert_eq!(end, block.get_plain_text().len());
    }

    #[test]
    fn test_common_tags_by_identity() {
        let b = Tag::plain("b");
        let twin = Tag::plain("b");
        let block = TextBlock::new(vec![chunk("x", &[&b]), chunk("y", &[&b])], true);
        assert_eq!(block.common_tags().len(), 1);
        let mixed = TextBlock::new(vec![chunk("x", &[&b]), chunk("y", &[&twin])], true);
        assert!(mixed.common_tags().is_empty(), "equal value is not identity");
    }

    #[test]
    fn test_minimal_reopen_html() {
        let b = Tag::plain("b");
        let i = Tag::plain("i");
        let block = TextBlock::new(
            vec![
                chunk("plain ", &[]),
                chunk("bold", &[&b]),
                chunk(" bold italic", &[&b, &i]),
                chunk(" tail", &[]),
            ],
            true,
        );
        assert_eq!(
            block.get_html(),
            "plain <b>bold<i> bold italic</i></b> tail"
        );
    }

    #[test]
    fn test_segment_wraps_sentences() {
        let ids = IdSequence::default();
        let block = TextBlock::new(vec![chunk("First one. Second one.", &[])], true);
        let segmented = block.segment(&Segmenter::default(), &ids).unwrap();
        assert_eq!(
            segmented.get_html(),
            "<span class=\"cx-segment\" data-segmentid=\"0\">First one. </span>\
             <span class=\"cx-segment\" data-segmentid=\"1\">Second one.</span>"
        );
        assert_eq!(segmented.get_plain_text(), block.get_plain_text());
    }

    #[test]
    fn test_segment_spans_stay_outside_links() {
        let ids = IdSequence::default();
        let a = anchor("/wiki/Foo");
        let block = TextBlock::new(
            vec![chunk("See ", &[]), chunk("Foo", &[&a]), chunk(".", &[])],
            true,
        );
        let segmented = block.segment(&Segmenter::default(), &ids).unwrap();
        assert_eq!(
            segmented.get_html(),
            "<span class=\"cx-segment\" data-segmentid=\"0\">See \
             <a href=\"/wiki/Foo\" class=\"cx-link\" data-linkid=\"1\">Foo</a>.</span>"
        );
    }

    #[test]
    fn test_boundary_inside_annotated_run_is_suppressed() {
        let ids = IdSequence::default();
        let a = anchor("/wiki/Foo");
        let block = TextBlock::new(
            vec![
                chunk("See ", &[]),
                chunk("Foo. Bar", &[&a]),
                chunk(" now.", &[]),
            ],
            true,
        );
        assert_eq!(block.get_tag_offsets().len(), 1);
        let segmented = block.segment(&Segmenter::default(), &ids).unwrap();
        let html = segmented.get_html();
        // The break after "Foo." falls inside the link label; the whole
        // block stays one segment and the anchor is not split.
        assert_eq!(html.matches("data-segmentid").count(), 1);
        assert_eq!(html.matches("<a ").count(), 1);
        assert_eq!(segmented.get_plain_text(), "See Foo. Bar now.");
    }

    #[test]
    fn test_segment_spans_inside_common_formatting() {
        let ids = IdSequence::default();
        let b = Tag::plain("b");
        let block = TextBlock::new(vec![chunk("One. Two.", &[&b])], true);
        let segmented = block.segment(&Segmenter::default(), &ids).unwrap();
        assert_eq!(
            segmented.get_html(),
            "<b><span class=\"cx-segment\" data-segmentid=\"0\">One. </span>\
             <span class=\"cx-segment\" data-segmentid=\"1\">Two.</span></b>"
        );
    }

    #[test]
    fn test_translate_identity_preserves_tags() {
        let a = anchor("/wiki/Foo");
        let block = TextBlock::new(vec![chunk("Foo bar", &[&a])], true);
        let text = block.get_plain_text();
        let translated = block
            .translate_tags(
                &text,
                &[RangeMapping {
                    source: Range {
                        start: 0,
                        length: text.len(),
                    },
                    target: Range {
                        start: 0,
                        length: text.len(),
                    },
                }],
            )
            .unwrap();
        assert_eq!(translated.get_plain_text(), text);
        assert_eq!(translated.chunks.len(), 1);
        assert!(Rc::ptr_eq(&translated.chunks[0].tags[0], &a));
    }

    #[test]
    fn test_translate_fills_gaps_with_common_tags() {
        let b = Tag::plain("b");
        let block = TextBlock::new(vec![chunk("alpha beta", &[&b])], true);
        let translated = block
            .translate_tags(
                "ALPHA BETA ",
                &[
                    RangeMapping {
                        source: Range { start: 0, length: 5 },
                        target: Range { start: 0, length: 5 },
                    },
                    RangeMapping {
                        source: Range { start: 6, length: 4 },
                        target: Range { start: 6, length: 4 },
                    },
                ],
            )
            .unwrap();
        assert_eq!(translated.get_plain_text(), "ALPHA BETA ");
        // gap and tail both carry the common <b> tag
        assert!(translated
            .chunks
            .iter()
            .all(|chunk| Rc::ptr_eq(&chunk.tags[0], &b)));
    }

    #[test]
    fn test_translate_rejects_overlap() {
        let block = TextBlock::new(vec![chunk("abcdef", &[])], true);
        let result = block.translate_tags(
            "abcdef",
            &[
                RangeMapping {
                    source: Range { start: 0, length: 4 },
                    target: Range { start: 0, length: 4 },
                },
                RangeMapping {
                    source: Range { start: 4, length: 2 },
                    target: Range { start: 2, length: 2 },
                },
            ],
        );
        assert!(matches!(result, Err(Error::RangeOverlap(2))));
    }
}

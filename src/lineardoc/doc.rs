//! The linear document: a flat, ordered item stream.

use super::{
    Result,
    segmenter::Segmenter,
    tags::{
        Attributes, Tag, TagRef, append_close_tag, append_open_tag, is_heading,
        is_ignorable_block,
    },
    textblock::{InlineContent, TextBlock, TextChunk, set_link_ids},
};
use core::cell::Cell;
use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

/// A monotonic id allocator, request-local.
#[derive(Debug, Default)]
pub struct IdSequence {
    /// The next unused id.
    counter: Cell<u32>,
}

impl IdSequence {
    /// Takes the next id.
    pub fn next(&self) -> String {
        let id = self.counter.get();
        self.counter.set(id + 1);
        id.to_string()
    }
}

/// One item of the flat document stream.
#[derive(Clone, Debug)]
pub enum Item {
    /// A block-level open tag.
    Open(TagRef),
    /// The matching close. Carries the same tag handle as its open.
    Close(TagRef),
    /// A paragraph-scale run of inline content.
    TextBlock(TextBlock),
    /// Inter-block whitespace, preserved verbatim.
    BlockSpace(String),
}

/// A tree of tags flattened into a balanced open/close item sequence with
/// text blocks in between.
#[derive(Clone, Debug, Default)]
pub struct Doc {
    /// The tag wrapping this document, for sub-documents.
    pub wrapper_tag: Option<TagRef>,
    /// The items, in document order.
    pub items: Vec<Item>,
    /// Category links captured out of the inline stream, re-emitted after
    /// the outermost close.
    pub categories: Vec<TagRef>,
}

impl Doc {
    /// Creates a document, optionally wrapped by a tag.
    pub fn new(wrapper_tag: Option<TagRef>) -> Self {
        Doc {
            wrapper_tag,
            ..Doc::default()
        }
    }

    /// Appends an item.
    pub fn add_item(&mut self, item: Item) -> &mut Self {
        self.items.push(item);
        self
    }

    /// The item governing the document: its wrapper, or the first open tag,
    /// or the root of the first text block.
    pub fn get_root_item(&self) -> Option<TagRef> {
        if let Some(wrapper) = &self.wrapper_tag {
            return Some(Rc::clone(wrapper));
        }
        self.items.iter().find_map(|item| match item {
            Item::Open(tag) => Some(Rc::clone(tag)),
            Item::TextBlock(block) => block.get_root_item(),
            Item::Close(_) | Item::BlockSpace(_) => None,
        })
    }

    /// The plaintext of the document: text blocks terminated by a newline,
    /// block space verbatim.
    pub fn get_plain_text(&self) -> String {
        let mut text = String::new();
        for item in &self.items {
            match item {
                Item::TextBlock(block) => {
                    text.push_str(&block.get_plain_text());
                    text.push('\n');
                }
                Item::BlockSpace(space) => text.push_str(space),
                Item::Open(_) | Item::Close(_) => {}
            }
        }
        text
    }

    /// Serializes the document.
    pub fn get_html(&self) -> String {
        let mut html = String::new();
        if let Some(wrapper) = &self.wrapper_tag {
            append_open_tag(&mut html, wrapper);
        }
        for item in &self.items {
            match item {
                Item::Open(tag) => append_open_tag(&mut html, tag),
                Item::Close(tag) => append_close_tag(&mut html, tag),
                Item::TextBlock(block) => html.push_str(&block.get_html()),
                Item::BlockSpace(space) => html.push_str(space),
            }
        }
        for category in &self.categories {
            append_open_tag(&mut html, category);
            append_close_tag(&mut html, category);
        }
        if let Some(wrapper) = &self.wrapper_tag {
            append_close_tag(&mut html, wrapper);
        }
        html
    }

    /// Deep-copies the document. Each distinct tag is re-allocated exactly
    /// once, so identity sharing between items and chunk snapshots survives
    /// the copy.
    pub fn duplicate(&self) -> Doc {
        let mut memo = HashMap::new();
        self.duplicate_with(&mut memo)
    }

    /// [`duplicate`](Self::duplicate) under a shared tag memo.
    fn duplicate_with(&self, memo: &mut HashMap<*const Tag, TagRef>) -> Doc {
        let copy_tag = |memo: &mut HashMap<*const Tag, TagRef>, tag: &TagRef| {
            Rc::clone(
                memo.entry(Rc::as_ptr(tag))
                    .or_insert_with(|| tag.duplicate()),
            )
        };
        let mut doc = Doc::new(self.wrapper_tag.as_ref().map(|tag| copy_tag(memo, tag)));
        doc.categories = self
            .categories
            .iter()
            .map(|tag| copy_tag(memo, tag))
            .collect();
        for item in &self.items {
            doc.items.push(match item {
                Item::Open(tag) => Item::Open(copy_tag(memo, tag)),
                Item::Close(tag) => Item::Close(copy_tag(memo, tag)),
                Item::BlockSpace(space) => Item::BlockSpace(space.clone()),
                Item::TextBlock(block) => {
                    let chunks = block
                        .chunks
                        .iter()
                        .map(|chunk| {
                            let tags =
                                chunk.tags.iter().map(|tag| copy_tag(memo, tag)).collect();
                            let inline_content =
                                chunk.inline_content.as_ref().map(|content| match content {
                                    InlineContent::Tag(tag) => {
                                        InlineContent::Tag(copy_tag(memo, tag))
                                    }
                                    InlineContent::Doc(doc) => {
                                        InlineContent::Doc(doc.duplicate_with(memo))
                                    }
                                });
                            TextChunk::new(chunk.text.clone(), tags, inline_content)
                        })
                        .collect();
                    Item::TextBlock(TextBlock::new(chunks, block.can_segment))
                }
            });
        }
        doc
    }

    /// Tags translatable links in every text block without segmenting.
    pub(crate) fn set_link_ids(&self, ids: &IdSequence) {
        for item in &self.items {
            if let Item::TextBlock(block) = item {
                set_link_ids(&block.chunks, ids);
            }
        }
    }

    /// Returns a new document with every segmentable text block split into
    /// sentence segments and every translatable link tagged. Segment and
    /// link ids are drawn from one document-wide sequence.
    pub fn segment(&self, segmenter: &Segmenter) -> Result<Doc> {
        let ids = IdSequence::default();
        let mut doc = Doc::new(self.wrapper_tag.clone());
        doc.categories = self.categories.clone();
        for item in &self.items {
            doc.items.push(match item {
                Item::TextBlock(block) if block.can_segment => {
                    Item::TextBlock(block.segment(segmenter, &ids)?)
                }
                Item::TextBlock(block) => {
                    block.set_link_ids_in_place(&ids);
                    Item::TextBlock(block.clone())
                }
                other => other.clone(),
            });
        }
        Ok(doc)
    }

    /// Re-partitions the top level of the document into numbered
    /// translation sections and assigns sequential ids.
    ///
    /// Existing top-level Parsoid section markers are replaced one for one;
    /// bare top-level content is grouped into synthesized sections, with a
    /// new section begun at every top-level heading. Nested markers pass
    /// through untouched. Afterwards every tag still lacking an `id`
    /// receives the next value of a monotonic integer sequence.
    pub fn wrap_sections(&self) -> Doc {
        let has_body = self
            .items
            .iter()
            .any(|item| matches!(item, Item::Open(tag) if tag.name == "body"));

        let mut doc = Doc::new(self.wrapper_tag.clone());
        doc.categories = self.categories.clone();

        let mut sections = SectionCounter::default();
        // Depth below the partition level; None while still outside <body>.
        let mut depth = if has_body { None } else { Some(0) };
        // The synthesized section currently open, if any.
        let mut synthesized: Option<TagRef> = None;
        // The replacement for the currently open top-level marker, if any.
        let mut replaced: Option<TagRef> = None;

        for item in &self.items {
            match item {
                Item::Open(tag) => match depth {
                    None => {
                        doc.items.push(item.clone());
                        if tag.name == "body" {
                            depth = Some(0);
                        }
                    }
                    Some(0) => {
                        if is_ignorable_block(tag) {
                            if let Some(open) = synthesized.take() {
                                doc.items.push(Item::Close(open));
                            }
                            let section = sections.next_tag();
                            replaced = Some(Rc::clone(&section));
                            doc.items.push(Item::Open(section));
                        } else {
                            if is_heading(tag)
                                && let Some(open) = synthesized.take()
                            {
                                doc.items.push(Item::Close(open));
                            }
                            if synthesized.is_none() {
                                let section = sections.next_tag();
                                synthesized = Some(Rc::clone(&section));
                                doc.items.push(Item::Open(section));
                            }
                            doc.items.push(item.clone());
                        }
                        depth = Some(1);
                    }
                    Some(below) => {
                        doc.items.push(item.clone());
                        depth = Some(below + 1);
                    }
                },
                Item::Close(tag) => match depth {
                    None => doc.items.push(item.clone()),
                    Some(0) => {
                        // Closing the partition container itself.
                        if let Some(open) = synthesized.take() {
                            doc.items.push(Item::Close(open));
                        }
                        doc.items.push(item.clone());
                        if tag.name == "body" {
                            depth = None;
                        }
                    }
                    Some(1) => {
                        if let Some(section) = replaced.take() {
                            doc.items.push(Item::Close(section));
                        } else {
                            doc.items.push(item.clone());
                        }
                        depth = Some(0);
                    }
                    Some(below) => {
                        doc.items.push(item.clone());
                        depth = Some(below - 1);
                    }
                },
                Item::TextBlock(_) => {
                    if depth == Some(0) && synthesized.is_none() {
                        let section = sections.next_tag();
                        synthesized = Some(Rc::clone(&section));
                        doc.items.push(Item::Open(section));
                    }
                    doc.items.push(item.clone());
                }
                Item::BlockSpace(_) => {
                    // Whitespace alone never opens a section.
                    doc.items.push(item.clone());
                }
            }
        }
        if let Some(open) = synthesized.take() {
            doc.items.push(Item::Close(open));
        }

        let ids = IdSequence::default();
        let mut seen = HashSet::new();
        doc.assign_ids(&ids, &mut seen);
        doc
    }

    /// Walks every tag of the document in order and assigns the next
    /// sequential id to each one lacking an `id` attribute. Shared tags are
    /// visited once.
    fn assign_ids(&self, ids: &IdSequence, seen: &mut HashSet<*const Tag>) {
        fn assign(seen: &mut HashSet<*const Tag>, ids: &IdSequence, tag: &TagRef) {
            if seen.insert(Rc::as_ptr(tag)) && !tag.has_attr("id") {
                tag.set_attr("id", ids.next());
            }
        }
        if let Some(wrapper) = &self.wrapper_tag {
            assign(seen, ids, wrapper);
        }
        for item in &self.items {
            match item {
                Item::Open(tag) | Item::Close(tag) => assign(seen, ids, tag),
                Item::TextBlock(block) => {
                    for chunk in &block.chunks {
                        for tag in &chunk.tags {
                            assign(seen, ids, tag);
                        }
                        match &chunk.inline_content {
                            Some(InlineContent::Tag(tag)) => assign(seen, ids, tag),
                            Some(InlineContent::Doc(doc)) => doc.assign_ids(ids, seen),
                            None => {}
                        }
                    }
                }
                Item::BlockSpace(_) => {}
            }
        }
        for category in &self.categories {
            assign(seen, ids, category);
        }
    }
}

/// Allocates the numbered `cx:Section` wrapper tags.
#[derive(Default)]
struct SectionCounter {
    /// The next section number.
    number: u32,
}

impl SectionCounter {
    /// Builds the wrapper tag for the next section.
    fn next_tag(&mut self) -> TagRef {
        let number = self.number;
        self.number += 1;
        let mut attributes = Attributes::new();
        attributes.insert("rel".to_string(), "cx:Section".to_string());
        attributes.insert("id".to_string(), format!("cxSourceSection{number}"));
        attributes.insert("data-mw-section-number".to_string(), number.to_string());
        Tag::new("section", attributes, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_block(text: &str) -> Item {
        Item::TextBlock(TextBlock::new(
            vec![TextChunk::new(text.to_string(), Vec::new(), None)],
            true,
        ))
    }

    #[test]
    fn test_wrap_sections_synthesizes_one_section() {
        let p = Tag::plain("p");
        let mut doc = Doc::default();
        doc.add_item(Item::Open(Rc::clone(&p)))
            .add_item(text_block("Hello."))
            .add_item(Item::Close(p));
        let wrapped = doc.wrap_sections();
        assert_eq!(
            wrapped.get_html(),
            "<section rel=\"cx:Section\" id=\"cxSourceSection0\" \
             data-mw-section-number=\"0\"><p id=\"0\">Hello.</p></section>"
        );
    }

    #[test]
    fn test_wrap_sections_splits_at_headings() {
        let mut doc = Doc::default();
        for (name, text) in [("p", "Lead."), ("h2", "History"), ("p", "Old.")] {
            let tag = Tag::plain(name);
            doc.add_item(Item::Open(Rc::clone(&tag)))
                .add_item(text_block(text))
                .add_item(Item::Close(tag));
        }
        let wrapped = doc.wrap_sections();
        let html = wrapped.get_html();
        assert!(html.contains("data-mw-section-number=\"0\"><p id=\"0\">Lead.</p></section>"));
        assert!(html.contains("data-mw-section-number=\"1\"><h2 id=\"1\">History</h2>"));
        assert!(!html.contains("cxSourceSection2"), "h2 body joins its section");
    }

    #[test]
    fn test_wrap_sections_replaces_markers() {
        let mut marker_attributes = Attributes::new();
        marker_attributes.insert("data-mw-section-id".to_string(), "7".to_string());
        let marker = Tag::new("section", marker_attributes, false);
        let p = Tag::plain("p");
        let mut doc = Doc::default();
        doc.add_item(Item::Open(Rc::clone(&marker)))
            .add_item(Item::Open(Rc::clone(&p)))
            .add_item(text_block("Inside."))
            .add_item(Item::Close(p))
            .add_item(Item::Close(marker));
        let wrapped = doc.wrap_sections();
        let html = wrapped.get_html();
        assert!(html.starts_with(
            "<section rel=\"cx:Section\" id=\"cxSourceSection0\" data-mw-section-number=\"0\">"
        ));
        assert!(!html.contains("data-mw-section-id"));
    }

    #[test]
    fn test_assign_ids_skips_existing() {
        let p = Tag::plain("p");
        p.set_attr("id", "keep-me");
        let q = Tag::plain("p");
        let mut doc = Doc::default();
        doc.add_item(Item::Open(Rc::clone(&p)))
            .add_item(Item::Close(p))
            .add_item(Item::Open(Rc::clone(&q)))
            .add_item(Item::Close(Rc::clone(&q)));
        let wrapped = doc.wrap_sections();
        let html = wrapped.get_html();
        assert!(html.contains("id=\"keep-me\""));
        assert!(html.contains("<p id=\"0\">"));
    }

    #[test]
    fn test_duplicate_preserves_identity_sharing() {
        let a = Tag::plain("a");
        let mut doc = Doc::default();
        doc.add_item(Item::TextBlock(TextBlock::new(
            vec![
                TextChunk::new("x".to_string(), vec![Rc::clone(&a)], None),
                TextChunk::new("y".to_string(), vec![Rc::clone(&a)], None),
            ],
            true,
        )));
        let copy = doc.duplicate();
        let Item::TextBlock(block) = &copy.items[0] else {
            panic!("expected a text block");
        };
        assert!(Rc::ptr_eq(&block.chunks[0].tags[0], &block.chunks[1].tags[0]));
        assert!(!Rc::ptr_eq(&block.chunks[0].tags[0], &a));
    }

    #[test]
    fn test_plain_text_terminates_blocks() {
        let mut doc = Doc::default();
        doc.add_item(text_block("One"))
            .add_item(Item::BlockSpace(" ".to_string()))
            .add_item(text_block("Two"));
        assert_eq!(doc.get_plain_text(), "One\n Two\n");
    }
}

//! The streaming SAX driver.
//!
//! Tokenization is quick-xml's; this module owns the event policy: dropped
//! removable subtrees, inline/block routing via the contextualizer, child
//! builder transitions for references and math, and the open-tag bookkeeping
//! the context stack is kept parallel to. Entity references are decoded with
//! the HTML named-entity table, since Parsoid output freely uses entities
//! that XML-level unescaping rejects.

use super::{
    Error, Result,
    builder::Builder,
    contextualizer::{Context, Contextualizer, Removability},
    doc::Doc,
    tags::{
        Attributes, BLOCK_TAGS, Tag, TagRef, is_inline_empty_tag, is_math, is_reference,
        is_segment, is_transclusion, is_transclusion_fragment,
    },
    textblock::InlineContent,
};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::rc::Rc;

/// Parser behaviour switches.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Wrap each pre-segmented region in a `cx-segment-block` div, keeping
    /// its content out of the surrounding text flow.
    pub isolate_segments: bool,
}

/// Drives builder and contextualizer from one pass over the input HTML.
pub struct Parser<R> {
    /// The context stack, parallel to [`all_tags`](Self::all_tags).
    contextualizer: Contextualizer<R>,
    /// The builder stack; the last entry is active, earlier entries are
    /// parents waiting for their sub-documents to finish.
    builders: Vec<Builder>,
    /// Every open tag, removable ones included.
    all_tags: Vec<TagRef>,
    /// Behaviour switches.
    options: Options,
}

impl<R: Removability> Parser<R> {
    /// Creates a parser around a contextualizer.
    pub fn new(contextualizer: Contextualizer<R>, options: Options) -> Self {
        Parser {
            contextualizer,
            builders: vec![Builder::new(None)],
            all_tags: Vec::new(),
            options,
        }
    }

    /// Parses one HTML document into its linear form.
    pub fn parse(mut self, html: &str) -> Result<Doc> {
        let mut reader = Reader::from_str(html);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let tag = make_tag(&start)?;
                    if tag.self_closing {
                        // A void element in its HTML form; it will see no
                        // close event of its own.
                        let name = tag.name.clone();
                        self.on_open_tag(tag)?;
                        self.on_close_tag(&name)?;
                    } else {
                        self.on_open_tag(tag)?;
                    }
                }
                Event::Empty(start) => {
                    let tag = make_tag(&start)?;
                    let name = tag.name.clone();
                    self.on_open_tag(tag)?;
                    self.on_close_tag(&name)?;
                }
                Event::End(end) => {
                    let name =
                        String::from_utf8_lossy(end.name().as_ref()).to_ascii_lowercase();
                    if !is_inline_empty_tag(&name) {
                        self.on_close_tag(&name)?;
                    }
                }
                Event::Text(text) => {
                    let raw = text.decode().map_err(quick_xml::Error::from)?;
                    self.on_text(&html_escape::decode_html_entities(&raw));
                }
                Event::CData(data) => {
                    let raw = data.into_inner();
                    self.on_text(&String::from_utf8_lossy(&raw));
                }
                Event::GeneralRef(reference) => {
                    let name = reference.decode().map_err(quick_xml::Error::from)?;
                    let mut entity = String::with_capacity(name.len() + 2);
                    entity.push('&');
                    entity.push_str(&name);
                    entity.push(';');
                    self.on_text(&html_escape::decode_html_entities(&entity));
                }
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        self.finish()
    }

    /// The active builder.
    fn builder(&self) -> &Builder {
        self.builders.last().expect("builder stack underflow")
    }

    /// The active builder, mutably.
    fn builder_mut(&mut self) -> &mut Builder {
        self.builders.last_mut().expect("builder stack underflow")
    }

    /// Routes an open tag.
    fn on_open_tag(&mut self, tag: TagRef) -> Result<()> {
        if self.contextualizer.context() == Some(Context::Removable)
            || self.contextualizer.is_removable(&tag)
        {
            // Dropped subtree; only the stacks move.
            self.all_tags.push(Rc::clone(&tag));
            self.contextualizer.on_open_tag(&tag);
            return Ok(());
        }

        let can_segment = self.contextualizer.can_segment();
        if self.options.isolate_segments && is_segment(&tag) {
            let mut attributes = Attributes::new();
            attributes.insert("class".to_string(), "cx-segment-block".to_string());
            self.builder_mut()
                .push_block_tag(Tag::new("div", attributes, false));
        }

        if is_reference(&tag) || is_math(&tag) {
            let child = self.builder_mut().create_child_builder(Rc::clone(&tag));
            self.builders.push(child);
        } else if is_inline_empty_tag(&tag.name) {
            self.builder_mut()
                .add_inline_content(InlineContent::Tag(Rc::clone(&tag)), can_segment);
        } else if self.is_inline_annotation(&tag) {
            self.builder_mut()
                .push_inline_annotation_tag(Rc::clone(&tag));
        } else {
            self.builder_mut().push_block_tag(Rc::clone(&tag));
        }

        self.all_tags.push(Rc::clone(&tag));
        self.contextualizer.on_open_tag(&tag);
        Ok(())
    }

    /// Routes a close tag.
    fn on_close_tag(&mut self, name: &str) -> Result<()> {
        let Some(tag) = self.all_tags.pop() else {
            return Err(Error::UnexpectedClose(name.to_string()));
        };
        let tag_context = self.contextualizer.context();
        let was_inline = is_inline_annotation_in(&tag, self.contextualizer.parent_context());
        self.contextualizer.on_close_tag();

        if tag_context == Some(Context::Removable) {
            return Ok(());
        }
        if tag.name != name {
            return Err(Error::TagMismatch {
                expected: tag.name.clone(),
                actual: name.to_string(),
            });
        }
        if is_inline_empty_tag(&tag.name) {
            return Ok(());
        }

        let can_segment = self.contextualizer.can_segment();
        if was_inline && self.builder().has_open_annotations() {
            self.builder_mut().pop_inline_annotation_tag(name)?;
            if self.options.isolate_segments && is_segment(&tag) {
                self.builder_mut().pop_block_tag("div")?;
            }
        } else if was_inline && self.builders.len() > 1 {
            // The wrapper of a reference or math sub-document.
            let wrapper_name = self
                .builders
                .last()
                .and_then(|builder| builder.doc.wrapper_tag.as_ref())
                .map(|wrapper| wrapper.name.clone());
            if !matches!(name, "span" | "sup") && wrapper_name.as_deref() != Some(name) {
                return Err(Error::BadSubDocumentClose(name.to_string()));
            }
            let mut child = self.builders.pop().expect("builder stack underflow");
            child.finish_text_block();
            self.builder_mut()
                .add_inline_content(InlineContent::Doc(child.doc), can_segment);
        } else {
            if name == "p" && can_segment {
                // Flush trailing inline references into the outgoing block.
                self.builder_mut().add_text_chunk("", true);
            }
            self.builder_mut().pop_block_tag(name)?;
        }
        Ok(())
    }

    /// Routes a text run.
    fn on_text(&mut self, text: &str) {
        if self.contextualizer.context() == Some(Context::Removable) {
            return;
        }
        let can_segment = self.contextualizer.can_segment();
        self.builder_mut().add_text_chunk(text, can_segment);
    }

    /// Finishes parsing and surrenders the document.
    fn finish(mut self) -> Result<Doc> {
        if let Some(tag) = self.all_tags.last() {
            return Err(Error::Unclosed(tag.name.clone()));
        }
        let mut builder = self.builders.pop().expect("builder stack underflow");
        if !self.builders.is_empty() {
            let name = builder
                .doc
                .wrapper_tag
                .as_ref()
                .map_or_else(String::new, |wrapper| wrapper.name.clone());
            return Err(Error::Unclosed(name));
        }
        builder.finish_text_block();
        Ok(builder.doc)
    }

    /// Whether the tag is an inline annotation in the current context.
    fn is_inline_annotation(&self, tag: &Tag) -> bool {
        is_inline_annotation_in(tag, self.contextualizer.context())
    }
}

/// Whether the tag is an inline annotation when opened in `context`.
///
/// The block list decides, with three exceptions: a span inside media is
/// block (it wraps a video there), audio and video inside inline media are
/// inline, and a style that is itself a transclusion is inline.
fn is_inline_annotation_in(tag: &Tag, context: Option<Context>) -> bool {
    match &*tag.name {
        "span" if context == Some(Context::Media) => false,
        "audio" | "video" if context == Some(Context::MediaInline) => true,
        "style" => is_transclusion(tag) || is_transclusion_fragment(tag),
        name => !BLOCK_TAGS.contains(name),
    }
}

/// Builds a [`Tag`] from a start-tag event. Names are lowercased; attribute
/// values are entity-decoded; void elements are marked self-contained.
pub(super) fn make_tag(start: &BytesStart<'_>) -> Result<TagRef> {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
    let mut attributes = Attributes::new();
    for attribute in start.attributes().with_checks(false) {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
        let raw = String::from_utf8_lossy(&attribute.value);
        attributes.insert(key, html_escape::decode_html_entities(&raw).into_owned());
    }
    let self_closing = is_inline_empty_tag(&name);
    Ok(Tag::new(name, attributes, self_closing))
}

//! Tag records, classification predicates, and HTML rendering.
//!
//! Tags are shared by reference between the parser's live stacks and the
//! annotation snapshots stored inside text chunks, so passes that decorate a
//! tag in place (`data-linkid`, sequential ids) are visible everywhere the
//! tag appears. Identity, not value, is the notion of sameness throughout
//! the linear document model.

use core::cell::RefCell;
use indexmap::IndexMap;
use phf::Set;
use std::rc::Rc;

/// Attribute storage for a [`Tag`].
///
/// Insertion order is preserved because it is part of the serialization
/// contract: re-emitted tags must list attributes in the order the input
/// document declared them, followed by any attributes added by later passes.
pub type Attributes = IndexMap<String, String>;

/// One parsed HTML tag.
///
/// Interior mutability on the attribute map lets decoration passes write
/// through the shared [`Rc`] handles without cloning chunk snapshots.
#[derive(Debug)]
pub struct Tag {
    /// The lowercase tag name.
    pub name: String,
    /// The attributes, in insertion order.
    pub attributes: RefCell<Attributes>,
    /// Whether the tag is a self-contained void element.
    pub self_closing: bool,
}

/// A shared handle to a tag.
pub type TagRef = Rc<Tag>;

impl Tag {
    /// Creates a new tag with the given lowercase name and attributes.
    pub fn new(name: impl Into<String>, attributes: Attributes, self_closing: bool) -> TagRef {
        Rc::new(Tag {
            name: name.into(),
            attributes: RefCell::new(attributes),
            self_closing,
        })
    }

    /// Creates a tag with no attributes.
    pub fn plain(name: impl Into<String>) -> TagRef {
        Self::new(name, Attributes::new(), false)
    }

    /// Returns a copy of the value of the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    /// Whether the named attribute is present.
    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.borrow().contains_key(name)
    }

    /// Sets an attribute, appending it to the attribute order if new.
    pub fn set_attr(&self, name: &str, value: impl Into<String>) {
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.into());
    }

    /// Whether any whitespace-separated token of the named attribute equals
    /// `token`. RDFa `typeof`/`rel` values and `class` lists are all
    /// space-separated token sets.
    pub fn attr_has_token(&self, name: &str, token: &str) -> bool {
        self.attributes
            .borrow()
            .get(name)
            .is_some_and(|value| value.split_ascii_whitespace().any(|t| t == token))
    }

    /// Appends a token to a space-separated attribute, creating the attribute
    /// if missing and leaving it alone if the token is already present.
    pub fn add_attr_token(&self, name: &str, token: &str) {
        if self.attr_has_token(name, token) {
            return;
        }
        let mut attributes = self.attributes.borrow_mut();
        match attributes.get_mut(name) {
            Some(value) if !value.is_empty() => {
                value.push(' ');
                value.push_str(token);
            }
            _ => {
                attributes.insert(name.to_string(), token.to_string());
            }
        }
    }

    /// Creates an identical tag with its own attribute map.
    pub fn duplicate(&self) -> TagRef {
        Tag::new(
            self.name.clone(),
            self.attributes.borrow().clone(),
            self.self_closing,
        )
    }
}

/// Whether the tag is a Cite reference wrapper.
pub fn is_reference(tag: &Tag) -> bool {
    tag.attr_has_token("typeof", "mw:Extension/ref")
        || tag.attr_has_token("typeof", "mw:Cite/Footnote")
        || tag.attr_has_token("typeof", "mw:Reference")
}

/// Whether the tag is a Math extension wrapper.
pub fn is_math(tag: &Tag) -> bool {
    tag.name == "math" || tag.attr_has_token("typeof", "mw:Extension/math")
}

/// Whether the tag is the root of a transclusion.
pub fn is_transclusion(tag: &Tag) -> bool {
    tag.attr_has_token("typeof", "mw:Transclusion")
}

/// Whether the tag belongs to some transclusion's output.
pub fn is_transclusion_fragment(tag: &Tag) -> bool {
    tag.attributes
        .borrow()
        .get("about")
        .is_some_and(|about| about.starts_with("#mwt"))
}

/// Whether the tag is an external link.
pub fn is_external_link(tag: &Tag) -> bool {
    tag.attr_has_token("rel", "mw:ExtLink")
}

/// Whether the tag already carries a segment id.
pub fn is_segment(tag: &Tag) -> bool {
    tag.has_attr("data-segmentid")
}

/// Whether the tag is a gallery container.
pub fn is_gallery(tag: &Tag) -> bool {
    tag.attr_has_token("class", "gallery")
}

/// Whether the tag is a category page-property link.
pub fn is_category(tag: &Tag) -> bool {
    tag.name == "link" && tag.attr_has_token("rel", "mw:PageProp/Category")
}

/// Whether the tag is a Parsoid section marker or a category link; both are
/// invisible to readers and handled by dedicated passes instead of the
/// ordinary block flow.
pub fn is_ignorable_block(tag: &Tag) -> bool {
    (tag.name == "section" && tag.has_attr("data-mw-section-id")) || is_category(tag)
}

/// Whether the tag is a heading.
pub fn is_heading(tag: &Tag) -> bool {
    matches!(&*tag.name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Whether the tag is a link whose text a translator may edit: an anchor
/// with a target that is not itself part of a transclusion's output.
pub fn is_translatable_link(tag: &Tag) -> bool {
    tag.name == "a" && tag.has_attr("href") && !is_transclusion_fragment(tag)
}

/// Whether the lowercase tag name is an HTML void element.
pub fn is_inline_empty_tag(name: &str) -> bool {
    VOID_TAGS.contains(name)
}

/// The HTML void element set.
static VOID_TAGS: Set<&str> = phf::phf_set! {
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link",
    "meta", "param", "source", "track", "wbr",
};

/// Tags that always open a new block-level region.
///
/// Everything else is an inline annotation unless a context rule says
/// otherwise; see the parser's classification step.
pub static BLOCK_TAGS: Set<&str> = phf::phf_set! {
    "html", "head", "body", "title", "base", "script", "style",
    "article", "section", "nav", "aside", "header", "footer", "address",
    "h1", "h2", "h3", "h4", "h5", "h6", "hgroup",
    "p", "div", "pre", "blockquote", "hr",
    "ol", "ul", "li", "dl", "dt", "dd",
    "figure", "figcaption",
    "table", "caption", "colgroup", "col", "tbody", "thead", "tfoot",
    "tr", "td", "th",
    "form", "fieldset", "legend", "details", "summary", "center",
    "br", "img", "meta", "link",
    "wiki-chart",
};

/// Appends `text` with `&`, `<`, and `>` replaced by numeric character
/// references.
pub fn escape_text_into(html: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => html.push_str("&#38;"),
            '<' => html.push_str("&#60;"),
            '>' => html.push_str("&#62;"),
            c => html.push(c),
        }
    }
}

/// Appends an attribute value with `&`, `"`, `'`, `<`, and `>` replaced by
/// numeric character references.
fn escape_attr_into(html: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => html.push_str("&#38;"),
            '"' => html.push_str("&#34;"),
            '\'' => html.push_str("&#39;"),
            '<' => html.push_str("&#60;"),
            '>' => html.push_str("&#62;"),
            c => html.push(c),
        }
    }
}

/// Appends the opening form of `tag`, attributes in insertion order and
/// values double-quoted. Void tags render in their self-contained form.
pub fn append_open_tag(html: &mut String, tag: &Tag) {
    html.push('<');
    html.push_str(&tag.name);
    for (name, value) in tag.attributes.borrow().iter() {
        html.push(' ');
        html.push_str(name);
        html.push_str("=\"");
        escape_attr_into(html, value);
        html.push('"');
    }
    if tag.self_closing {
        html.push('/');
    }
    html.push('>');
}

/// Appends the closing form of `tag`, which is nothing for a void tag.
pub fn append_close_tag(html: &mut String, tag: &Tag) {
    if !tag.self_closing {
        html.push_str("</");
        html.push_str(&tag.name);
        html.push('>');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_with(name: &str, attrs: &[(&str, &str)]) -> TagRef {
        let mut attributes = Attributes::new();
        for (k, v) in attrs {
            attributes.insert((*k).to_string(), (*v).to_string());
        }
        Tag::new(name, attributes, false)
    }

    #[test]
    fn test_classification() {
        assert!(is_reference(&tag_with(
            "sup",
            &[("typeof", "mw:Extension/ref")]
        )));
        assert!(is_reference(&tag_with(
            "sup",
            &[("typeof", "mw:Cite/Footnote mw:Transclusion")]
        )));
        assert!(!is_reference(&tag_with("sup", &[("typeof", "mw:Ref")])));
        assert!(is_math(&tag_with("math", &[])));
        assert!(is_math(&tag_with(
            "span",
            &[("typeof", "mw:Extension/math")]
        )));
        assert!(is_transclusion_fragment(&tag_with(
            "span",
            &[("about", "#mwt3")]
        )));
        assert!(!is_transclusion_fragment(&tag_with(
            "span",
            &[("about", "mwt3")]
        )));
        assert!(is_category(&tag_with(
            "link",
            &[("rel", "mw:PageProp/Category")]
        )));
        assert!(is_ignorable_block(&tag_with(
            "section",
            &[("data-mw-section-id", "1")]
        )));
        assert!(!is_ignorable_block(&tag_with("section", &[])));
        assert!(is_translatable_link(&tag_with("a", &[("href", "/wiki/X")])));
        assert!(!is_translatable_link(&tag_with(
            "a",
            &[("href", "/wiki/X"), ("about", "#mwt1")]
        )));
    }

    #[test]
    fn test_open_tag_escaping() {
        let tag = tag_with("a", &[("href", "/wiki/\"A\"&<B>'C'")]);
        let mut html = String::new();
        append_open_tag(&mut html, &tag);
        assert_eq!(
            html,
            "<a href=\"/wiki/&#34;A&#34;&#38;&#60;B&#62;&#39;C&#39;\">"
        );
        html.clear();
        append_close_tag(&mut html, &tag);
        assert_eq!(html, "</a>");
    }

    #[test]
    fn test_void_rendering() {
        let tag = Tag::new("br", Attributes::new(), true);
        let mut html = String::new();
        append_open_tag(&mut html, &tag);
        append_close_tag(&mut html, &tag);
        assert_eq!(html, "<br/>");
    }

    #[test]
    fn test_text_escaping() {
        let mut html = String::new();
        escape_text_into(&mut html, "a < b && c > d");
        assert_eq!(html, "a &#60; b &#38;&#38; c &#62; d");
    }

    #[test]
    fn test_attr_tokens() {
        let tag = tag_with("a", &[("class", "extiw")]);
        tag.add_attr_token("class", "cx-link");
        tag.add_attr_token("class", "cx-link");
        assert_eq!(tag.attr("class").as_deref(), Some("extiw cx-link"));
        let bare = tag_with("a", &[]);
        bare.add_attr_token("class", "cx-link");
        assert_eq!(bare.attr("class").as_deref(), Some("cx-link"));
    }
}

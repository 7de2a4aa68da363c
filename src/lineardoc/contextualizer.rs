//! Segmentation context tracking.
//!
//! The contextualizer maintains a stack parallel to the parser's open-tag
//! list: on every open it computes the child context the new tag puts its
//! descendants in, and on every close it pops. The parser consults it for
//! tag fate (removable subtrees) and for whether the text it is currently
//! routing may be sentence-segmented.

use super::{Result, tags::Tag};
use phf::Set;
use regex::Regex;
use serde_json::Value;
use std::{collections::HashSet, sync::Arc};

/// The symbolic context a tag puts its descendants in. A tag with no entry
/// (`None` in the stack) is neutral.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Context {
    /// Editorially irrelevant; the whole subtree is dropped.
    Removable,
    /// Inside a figure: block-structured media, not running text.
    Media,
    /// Inline playable media inside a figure.
    MediaInline,
    /// Content reproduced byte for byte, never segmented.
    Verbatim,
    /// Inside a section wrapper.
    Section,
    /// A paragraph-scale container of translatable text.
    ContentBranch,
}

/// The extension point deciding which tags are removable.
pub trait Removability {
    /// Whether the tag roots an editorially irrelevant subtree.
    fn is_removable(&self, tag: &Tag) -> bool;
}

impl<R: Removability> Removability for Arc<R> {
    fn is_removable(&self, tag: &Tag) -> bool {
        (**self).is_removable(tag)
    }
}

/// Rules that keep everything.
#[derive(Debug, Default)]
pub struct KeepAll;

impl Removability for KeepAll {
    fn is_removable(&self, _tag: &Tag) -> bool {
        false
    }
}

/// One compiled entry of the removable-template list.
#[derive(Debug)]
enum TemplateMatcher {
    /// A bare name, matched exactly.
    Exact(String),
    /// A `/…/`-bracketed pattern.
    Pattern(Regex),
}

impl TemplateMatcher {
    /// Compiles a configuration entry.
    fn compile(entry: &str) -> Result<Self> {
        if let Some(inner) = entry
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
        {
            Ok(TemplateMatcher::Pattern(Regex::new(inner)?))
        } else {
            Ok(TemplateMatcher::Exact(entry.to_string()))
        }
    }

    /// Whether the template target matches this entry.
    fn matches(&self, target: &str) -> bool {
        match self {
            TemplateMatcher::Exact(name) => name == target,
            TemplateMatcher::Pattern(pattern) => pattern.is_match(target),
        }
    }
}

/// The MediaWiki removable-section rules: class names, RDFa `typeof`
/// values, and template-name matchers. Compiled once at startup and shared
/// read-only across workers.
#[derive(Debug)]
pub struct RemovableRules {
    /// Literal removable class names.
    classes: HashSet<String>,
    /// Literal removable `typeof` values.
    rdfa: HashSet<String>,
    /// Removable template-name matchers.
    templates: Vec<TemplateMatcher>,
}

impl RemovableRules {
    /// Compiles the rule lists. Fails if a `/…/` template entry is not a
    /// valid pattern.
    pub fn compile(
        classes: impl IntoIterator<Item = String>,
        rdfa: impl IntoIterator<Item = String>,
        templates: &[String],
    ) -> Result<Self> {
        Ok(RemovableRules {
            classes: classes.into_iter().collect(),
            rdfa: rdfa.into_iter().collect(),
            templates: templates
                .iter()
                .map(|entry| TemplateMatcher::compile(entry))
                .collect::<Result<_>>()?,
        })
    }
}

impl Removability for RemovableRules {
    fn is_removable(&self, tag: &Tag) -> bool {
        {
            let attributes = tag.attributes.borrow();
            if attributes
                .get("class")
                .is_some_and(|v| v.split_ascii_whitespace().any(|t| self.classes.contains(t)))
                || attributes
                    .get("typeof")
                    .is_some_and(|v| v.split_ascii_whitespace().any(|t| self.rdfa.contains(t)))
            {
                return true;
            }
        }
        !self.templates.is_empty()
            && super::tags::is_transclusion(tag)
            && template_targets(tag)
                .iter()
                .any(|target| self.templates.iter().any(|matcher| matcher.matches(target)))
    }
}

/// The template targets of a transclusion, read from its `data-mw` JSON and
/// stripped of the `./Template:` href prefix. Unparseable metadata yields
/// nothing rather than an error: Parsoid emits `data-mw` for many node
/// types and only the template parts matter here.
fn template_targets(tag: &Tag) -> Vec<String> {
    let Some(data_mw) = tag.attr("data-mw") else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<Value>(&data_mw) else {
        return Vec::new();
    };
    let Some(parts) = value.get("parts").and_then(Value::as_array) else {
        return Vec::new();
    };
    parts
        .iter()
        .filter_map(|part| {
            part.get("template")?
                .get("target")?
                .get("href")?
                .as_str()
                .map(|href| href.strip_prefix("./Template:").unwrap_or(href).to_string())
        })
        .collect()
}

/// Containers of translatable running text.
static CONTENT_BRANCH_TAGS: Set<&str> = phf::phf_set! {
    "p", "li", "dd", "dt", "caption", "td", "th", "figcaption",
};

/// The context stack, parallel to the parser's open tags.
pub struct Contextualizer<R> {
    /// One entry per open tag; `None` entries are neutral.
    contexts: Vec<Option<Context>>,
    /// The removability rules in force.
    rules: R,
}

/// The contextualizer for MediaWiki Parsoid documents.
pub type MwContextualizer = Contextualizer<Arc<RemovableRules>>;

impl<R: Removability> Contextualizer<R> {
    /// Creates a contextualizer with the given removability rules.
    pub fn new(rules: R) -> Self {
        Contextualizer {
            contexts: Vec::new(),
            rules,
        }
    }

    /// Whether the tag roots a removable subtree.
    pub fn is_removable(&self, tag: &Tag) -> bool {
        self.rules.is_removable(tag)
    }

    /// The context the innermost open tag put us in.
    pub fn context(&self) -> Option<Context> {
        self.contexts.last().copied().flatten()
    }

    /// The context of the innermost open tag's parent.
    pub fn parent_context(&self) -> Option<Context> {
        match self.contexts.len() {
            0 | 1 => None,
            len => self.contexts[len - 2],
        }
    }

    /// Whether text routed right now may be sentence-segmented.
    pub fn can_segment(&self) -> bool {
        matches!(
            self.context(),
            None | Some(Context::Section | Context::ContentBranch)
        )
    }

    /// Pushes the child context of an opening tag.
    pub fn on_open_tag(&mut self, tag: &Tag) {
        let child = self.child_context(tag);
        self.contexts.push(child);
    }

    /// Pops on a closing tag.
    pub fn on_close_tag(&mut self) {
        self.contexts.pop();
    }

    /// Decides the context `tag` gives its descendants, from the tag and
    /// the current context. Removability is sticky; everything else
    /// inherits unless a rule below overrides it.
    fn child_context(&self, tag: &Tag) -> Option<Context> {
        let parent = self.context();
        if parent == Some(Context::Removable) || self.rules.is_removable(tag) {
            return Some(Context::Removable);
        }
        match (&*tag.name, parent) {
            ("figcaption", Some(Context::Media)) => None,
            ("audio" | "video", Some(Context::Media)) => Some(Context::MediaInline),
            ("figure", _) => Some(Context::Media),
            _ if super::tags::is_gallery(tag) => Some(Context::Media),
            ("style", _) => Some(Context::Verbatim),
            ("section", _) => Some(Context::Section),
            (name, None | Some(Context::Section)) if CONTENT_BRANCH_TAGS.contains(name) => {
                Some(Context::ContentBranch)
            }
            _ => parent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineardoc::tags::Attributes;

    fn open<R: Removability>(contextualizer: &mut Contextualizer<R>, name: &str) {
        contextualizer.on_open_tag(&Tag::plain(name));
    }

    #[test]
    fn test_figure_contexts() {
        let mut c = Contextualizer::new(KeepAll);
        open(&mut c, "body");
        open(&mut c, "figure");
        assert_eq!(c.context(), Some(Context::Media));
        assert!(!c.can_segment());
        open(&mut c, "figcaption");
        assert_eq!(c.context(), None);
        assert!(c.can_segment());
        c.on_close_tag();
        open(&mut c, "video");
        assert_eq!(c.context(), Some(Context::MediaInline));
        assert!(!c.can_segment());
    }

    #[test]
    fn test_removable_is_sticky() {
        let rules =
            RemovableRules::compile(vec!["ambox".to_string()], Vec::new(), &[]).unwrap();
        let mut c = Contextualizer::new(rules);
        let mut attributes = Attributes::new();
        attributes.insert("class".to_string(), "ambox mbox-small".to_string());
        c.on_open_tag(&Tag::new("div", attributes, false));
        assert_eq!(c.context(), Some(Context::Removable));
        open(&mut c, "p");
        assert_eq!(c.context(), Some(Context::Removable));
        assert!(!c.can_segment());
    }

    #[test]
    fn test_paragraphs_inside_sections_segment() {
        let mut c = Contextualizer::new(KeepAll);
        open(&mut c, "section");
        open(&mut c, "p");
        assert!(c.can_segment());
        assert_eq!(c.parent_context(), Some(Context::Section));
    }

    #[test]
    fn test_template_matchers() {
        let rules = RemovableRules::compile(
            Vec::new(),
            Vec::new(),
            &["Short description".to_string(), "/^Use \\w+ dates$/".to_string()],
        )
        .unwrap();
        let mut attributes = Attributes::new();
        attributes.insert("typeof".to_string(), "mw:Transclusion".to_string());
        attributes.insert(
            "data-mw".to_string(),
            r#"{"parts":[{"template":{"target":{"href":"./Template:Short description"}}}]}"#
                .to_string(),
        );
        assert!(rules.is_removable(&Tag::new("p", attributes.clone(), false)));

        attributes.insert(
            "data-mw".to_string(),
            r#"{"parts":[{"template":{"target":{"href":"./Template:Use dmy dates"}}}]}"#
                .to_string(),
        );
        assert!(rules.is_removable(&Tag::new("p", attributes.clone(), false)));

        attributes.insert(
            "data-mw".to_string(),
            r#"{"parts":[{"template":{"target":{"href":"./Template:Citation needed"}}}]}"#
                .to_string(),
        );
        assert!(!rules.is_removable(&Tag::new("p", attributes, false)));
    }

    #[test]
    fn test_bad_template_pattern_is_a_config_error() {
        assert!(RemovableRules::compile(Vec::new(), Vec::new(), &["/(/".to_string()]).is_err());
    }

    #[test]
    fn test_rdfa_rules() {
        let rules =
            RemovableRules::compile(Vec::new(), vec!["mw:PageProp/toc".to_string()], &[]).unwrap();
        let mut attributes = Attributes::new();
        attributes.insert("typeof".to_string(), "mw:PageProp/toc".to_string());
        assert!(rules.is_removable(&Tag::new("meta", attributes, false)));
    }
}

//! Deterministic re-serialization.
//!
//! A minimal SAX echo: tags and text are re-emitted through the same
//! rendering helpers the linear document uses, so two HTML strings that
//! tokenize identically normalize to byte-equal output. Round-trip and
//! refinement tests compare through this pass.

use super::{
    Result,
    parser::make_tag,
    tags::{append_close_tag, append_open_tag, escape_text_into, is_inline_empty_tag},
};
use quick_xml::{Reader, events::Event};

/// Accumulates the normalized document.
#[derive(Default)]
pub struct Normalizer {
    /// The output so far.
    html: String,
}

impl Normalizer {
    /// Normalizes one HTML document.
    pub fn normalize(html: &str) -> Result<String> {
        let mut normalizer = Normalizer::default();
        let mut reader = Reader::from_str(html);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let tag = make_tag(&start)?;
                    append_open_tag(&mut normalizer.html, &tag);
                }
                Event::Empty(start) => {
                    let tag = make_tag(&start)?;
                    append_open_tag(&mut normalizer.html, &tag);
                    append_close_tag(&mut normalizer.html, &tag);
                }
                Event::End(end) => {
                    let name =
                        String::from_utf8_lossy(end.name().as_ref()).to_ascii_lowercase();
                    if !is_inline_empty_tag(&name) {
                        normalizer.html.push_str("</");
                        normalizer.html.push_str(&name);
                        normalizer.html.push('>');
                    }
                }
                Event::Text(text) => {
                    let raw = text.decode().map_err(quick_xml::Error::from)?;
                    escape_text_into(
                        &mut normalizer.html,
                        &html_escape::decode_html_entities(&raw),
                    );
                }
                Event::CData(data) => {
                    let raw = data.into_inner();
                    escape_text_into(&mut normalizer.html, &String::from_utf8_lossy(&raw));
                }
                Event::GeneralRef(reference) => {
                    let name = reference.decode().map_err(quick_xml::Error::from)?;
                    let mut entity = String::with_capacity(name.len() + 2);
                    entity.push('&');
                    entity.push_str(&name);
                    entity.push(';');
                    escape_text_into(
                        &mut normalizer.html,
                        &html_escape::decode_html_entities(&entity),
                    );
                }
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        Ok(normalizer.html)
    }
}

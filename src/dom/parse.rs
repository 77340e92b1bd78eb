//! Lenient HTML parsing on top of the quick-xml event reader.
//!
//! Handles what pages actually contain but XML forbids: void elements without
//! a closing slash, unclosed or mismatched end tags, bare `&`, valueless
//! attributes, and raw `<script>`/`<style>` bodies.

use super::{DomError, Document, NodeData, NodeId, RAW_TEXT_ELEMENTS, VOID_ELEMENTS};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::borrow::Cow;

fn create_reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(content.as_bytes());
    reader.config_mut().trim_text(false);
    reader.config_mut().enable_all_checks(false);
    reader
}

fn lowercase_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).to_ascii_lowercase()
}

fn element_data(elem: &BytesStart<'_>) -> NodeData {
    let attrs = elem
        .html_attributes()
        .with_checks(false)
        .flatten()
        .map(|attr| {
            let key = lowercase_name(attr.key.as_ref());
            let value = decode_entities(&String::from_utf8_lossy(&attr.value));
            (key, value)
        })
        .collect();
    NodeData::Element {
        tag: lowercase_name(elem.name().as_ref()),
        attrs,
    }
}

/// Parse `html` and append the resulting nodes to `parent`.
pub(super) fn parse_into(doc: &mut Document, parent: NodeId, html: &str) -> Result<(), DomError> {
    let html = escape_bare_ampersands(html);
    let mut reader = create_reader(&html);
    let mut stack: Vec<NodeId> = vec![parent];

    loop {
        let top = stack.last().copied().unwrap_or(parent);
        let event = reader.read_event().map_err(|err| DomError::Parse {
            position: reader.error_position() as u64,
            message: err.to_string(),
        })?;

        match event {
            Event::Start(elem) => {
                let data = element_data(&elem);
                let tag = lowercase_name(elem.name().as_ref());
                let node = doc.create_node(data);
                doc.append_child(top, node);

                if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                    let body = reader.read_text(elem.name()).map_err(|err| DomError::Parse {
                        position: reader.error_position() as u64,
                        message: err.to_string(),
                    })?;
                    let body: &[u8] = (*body).as_ref();
                    if !body.is_empty() {
                        let text = doc.create_text(&String::from_utf8_lossy(body));
                        doc.append_child(node, text);
                    }
                } else if !VOID_ELEMENTS.contains(&tag.as_str()) {
                    stack.push(node);
                }
            }
            Event::Empty(elem) => {
                let node = doc.create_node(element_data(&elem));
                doc.append_child(top, node);
            }
            Event::End(elem) => {
                let tag = lowercase_name(elem.name().as_ref());
                // close the nearest matching element; stray end tags are dropped
                if let Some(pos) = stack
                    .iter()
                    .skip(1)
                    .rposition(|&open| doc.tag(open) == Some(tag.as_str()))
                {
                    stack.truncate(pos + 1);
                }
            }
            Event::Text(text) => {
                let text = decode_entities(&String::from_utf8_lossy(text.as_ref()));
                push_text(doc, top, &text);
            }
            Event::GeneralRef(entity) => {
                let name = String::from_utf8_lossy(&entity);
                push_text(doc, top, &decode_entities(&format!("&{name};")));
            }
            Event::CData(data) => {
                push_text(doc, top, &String::from_utf8_lossy(data.as_ref()));
            }
            Event::Comment(comment) => {
                let node = doc.create_node(NodeData::Comment(
                    String::from_utf8_lossy(comment.as_ref()).into_owned(),
                ));
                doc.append_child(top, node);
            }
            Event::DocType(doctype) => {
                let node = doc.create_node(NodeData::Doctype(
                    String::from_utf8_lossy(doctype.as_ref()).trim().to_string(),
                ));
                doc.append_child(top, node);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(())
}

/// Append text to `parent`, merging with a trailing text node.
fn push_text(doc: &mut Document, parent: NodeId, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(&last) = doc.children(parent).last()
        && let Some(NodeData::Text(existing)) = doc.data(last)
    {
        let merged = format!("{existing}{text}");
        doc.set_text(last, &merged);
        return;
    }
    let node = doc.create_text(text);
    doc.append_child(parent, node);
}

fn entity_end(s: &str) -> Option<usize> {
    let end = s.find(';')?;
    let name = &s[1..end];
    let valid = match name.strip_prefix('#') {
        Some(num) => match num.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()),
        },
        None => !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()),
    };
    valid.then_some(end)
}

/// Escape `&` that does not start an entity, outside raw text elements.
fn escape_bare_ampersands(html: &str) -> Cow<'_, str> {
    if !html.contains('&') {
        return Cow::Borrowed(html);
    }

    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len() + 16);
    let mut i = 0;

    while i < html.len() {
        let rest = &html[i..];
        if rest.starts_with('<')
            && let Some(raw) = RAW_TEXT_ELEMENTS
                .iter()
                .find(|tag| lower[i + 1..].starts_with(*tag))
        {
            let close = format!("</{raw}");
            let end = lower[i..].find(&close).map_or(html.len(), |p| i + p);
            out.push_str(&html[i..end]);
            i = end;
            if i < html.len() {
                out.push('<');
                i += 1;
            }
            continue;
        }

        let Some(c) = rest.chars().next() else {
            break;
        };
        if c == '&' && entity_end(rest).is_none() {
            out.push_str("&amp;");
        } else {
            out.push(c);
        }
        i += c.len_utf8();
    }

    Cow::Owned(out)
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        _ => return None,
    })
}

/// Decode character references. Unknown ones are kept literally.
pub(super) fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        let decoded = entity_end(rest).and_then(|end| {
            let name = &rest[1..end];
            let c = match name.strip_prefix('#') {
                Some(num) => match num.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok().and_then(char::from_u32),
                    None => num.parse::<u32>().ok().and_then(char::from_u32),
                },
                None => named_entity(name),
            };
            c.map(|c| (c, end))
        });

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_and_unclosed_elements() {
        let doc = Document::parse("<p>a<br>b<img src=\"x.png\"></p><p>c").unwrap();
        let ps = doc.elements_by_tag(doc.root(), "p");
        assert_eq!(ps.len(), 2);
        assert_eq!(doc.text_content(ps[0]), "ab");
        assert_eq!(doc.elements_by_tag(ps[0], "img").len(), 1);
        assert_eq!(doc.text_content(ps[1]), "c");
    }

    #[test]
    fn test_stray_end_tag_ignored() {
        let doc = Document::parse("<div>a</span>b</div>").unwrap();
        let div = doc.elements_by_tag(doc.root(), "div")[0];
        assert_eq!(doc.text_content(div), "ab");
    }

    #[test]
    fn test_entities_in_text_and_attributes() {
        let doc =
            Document::parse("<code data-x=\"a &amp; b\">[1] &lt;tag&gt; &#65;&#x42;</code>")
                .unwrap();
        let code = doc.elements_by_tag(doc.root(), "code")[0];
        assert_eq!(doc.attr(code, "data-x"), Some("a & b"));
        assert_eq!(doc.text_content(code), "[1] <tag> AB");
    }

    #[test]
    fn test_bare_ampersand() {
        let doc = Document::parse("<p>a & b &unknown; c</p>").unwrap();
        let p = doc.elements_by_tag(doc.root(), "p")[0];
        assert_eq!(doc.text_content(p), "a & b &unknown; c");
    }

    #[test]
    fn test_script_body_kept_raw() {
        let html = "<script>if (a < b && c) {}</script><p>x</p>";
        let doc = Document::parse(html).unwrap();
        let script = doc.elements_by_tag(doc.root(), "script")[0];
        assert_eq!(doc.text_content(script), "if (a < b && c) {}");
        assert_eq!(doc.elements_by_tag(doc.root(), "p").len(), 1);
    }

    #[test]
    fn test_valueless_attribute_and_case() {
        let doc = Document::parse("<DIV Hidden ID=\"x\"></DIV>").unwrap();
        let div = doc.get_element_by_id("x").unwrap();
        assert_eq!(doc.tag(div), Some("div"));
        assert!(doc.has_attr(div, "hidden"));
    }

    #[test]
    fn test_doctype_and_comment() {
        let doc = Document::parse("<!DOCTYPE html><!-- note --><html></html>").unwrap();
        let children = doc.children(doc.root());
        assert!(matches!(doc.data(children[0]), Some(NodeData::Doctype(d)) if d == "html"));
        assert!(matches!(doc.data(children[1]), Some(NodeData::Comment(c)) if c == " note "));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("&lt;&gt;&amp;&quot;"), "<>&\"");
        assert_eq!(decode_entities("&bogus; & &#xZZ;"), "&bogus; & &#xZZ;");
    }
}

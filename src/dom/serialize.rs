//! HTML serialization through the quick-xml writer.

use super::{Document, NodeData, NodeId, RAW_TEXT_ELEMENTS, VOID_ELEMENTS};
use crate::log;
use quick_xml::{
    Writer,
    escape::partial_escape,
    events::{BytesEnd, BytesStart, BytesText, Event},
};
use std::io::{Cursor, Write};

type HtmlWriter = Writer<Cursor<Vec<u8>>>;

pub(super) fn outer_html(doc: &Document, id: NodeId) -> String {
    render(doc, &[id], false)
}

pub(super) fn inner_html(doc: &Document, id: NodeId) -> String {
    let raw = doc
        .tag(id)
        .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag));
    render(doc, doc.children(id), raw)
}

fn render(doc: &Document, nodes: &[NodeId], raw: bool) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    for &node in nodes {
        if let Err(err) = write_node(doc, node, &mut writer, raw) {
            // in-memory writes only fail on broken invariants
            log!("error"; "serialize: {err}");
            break;
        }
    }
    String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned()
}

fn write_node(
    doc: &Document,
    id: NodeId,
    writer: &mut HtmlWriter,
    raw: bool,
) -> Result<(), String> {
    let Some(data) = doc.data(id) else {
        return Ok(());
    };
    match data {
        NodeData::Root => {
            for &child in doc.children(id) {
                write_node(doc, child, writer, false)?;
            }
        }
        NodeData::Text(text) if raw => {
            write_event(writer, Event::Text(BytesText::from_escaped(text.as_str())))?;
        }
        NodeData::Text(text) => {
            write_event(writer, Event::Text(BytesText::from_escaped(partial_escape(text.as_str()))))?;
        }
        NodeData::Comment(comment) => {
            write_event(writer, Event::Comment(BytesText::from_escaped(comment.as_str())))?;
        }
        NodeData::Doctype(doctype) => {
            writer
                .get_mut()
                .write_all(format!("<!DOCTYPE {doctype}>").as_bytes())
                .map_err(|err| err.to_string())?;
        }
        NodeData::Element { tag, attrs } => {
            let mut elem = BytesStart::new(tag.as_str());
            for (key, value) in attrs {
                elem.push_attribute((key.as_str(), value.as_str()));
            }

            let children = doc.children(id);
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return write_event(writer, Event::Empty(elem));
            }

            write_event(writer, Event::Start(elem))?;
            let raw = RAW_TEXT_ELEMENTS.contains(&tag.as_str());
            for &child in children {
                write_node(doc, child, writer, raw)?;
            }
            write_event(writer, Event::End(BytesEnd::new(tag.as_str())))?;
        }
    }
    Ok(())
}

fn write_event(writer: &mut HtmlWriter, event: Event<'_>) -> Result<(), String> {
    writer.write_event(event).map_err(|err| err.to_string())
}

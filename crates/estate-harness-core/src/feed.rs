//! Feed parser: raw XML text → generic JSON tree.
//!
//! The tree layout mirrors what portal feeds look like when read as nested
//! key/value data:
//!
//! - every element becomes an entry keyed by its (qualified) tag name;
//! - repeated sibling elements collapse into an array, in document order;
//! - attributes live under `"@_" + name` so they never collide with child
//!   elements;
//! - a text-only element becomes a string (trimmed, entities unescaped,
//!   CDATA included); an element with attributes or children keeps any text
//!   under `"#text"`.
//!
//! Nothing is validated beyond well-formedness. Downstream mappers must treat
//! every field as optional.
//!
//! Raw bytes go through [`decode_feed`] first, which honours the charset named
//! in the XML declaration (feeds are often ISO-8859-1).

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::ImportError;

/// Key prefix for attributes in the parsed tree.
pub const ATTRIBUTE_PREFIX: &str = "@_";

/// Key holding an element's text when the element also has attributes or children.
pub const TEXT_KEY: &str = "#text";

/// An element still open on the parser stack.
struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, ImportError> {
        let name = element_name(start)?;
        let mut fields = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ImportError::MalformedInput(e.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| ImportError::MalformedInput(e.to_string()))?;
            let raw = std::str::from_utf8(&attr.value)
                .map_err(|e| ImportError::MalformedInput(e.to_string()))?;
            let value = quick_xml::escape::unescape(raw)
                .map_err(|e| ImportError::MalformedInput(e.to_string()))?;
            fields.insert(
                format!("{}{}", ATTRIBUTE_PREFIX, key),
                Value::String(value.into_owned()),
            );
        }
        Ok(Self {
            name,
            fields,
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let text = self.text.trim();
        if self.fields.is_empty() {
            return (self.name, Value::String(text.to_string()));
        }
        let mut fields = self.fields;
        if !text.is_empty() {
            fields.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
        }
        (self.name, Value::Object(fields))
    }
}

fn element_name(start: &BytesStart<'_>) -> Result<String, ImportError> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|e| ImportError::MalformedInput(e.to_string()))
}

/// Insert `value` under `key`, turning repeated keys into an ordered array.
fn attach(fields: &mut Map<String, Value>, key: String, value: Value) {
    match fields.get_mut(&key) {
        None => {
            fields.insert(key, value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

/// Decode raw feed bytes into text.
///
/// UTF-8 input is taken as is. Otherwise a byte order mark or the
/// `encoding` of the XML declaration picks the charset. Bytes that still do
/// not decode are replaced rather than failing the run.
pub fn decode_feed(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.trim_start_matches('\u{feff}').to_string();
    }

    let mut reader = Reader::from_reader(bytes);
    // Reading the declaration switches the reader's decoder to its charset.
    let _ = reader.read_event();
    let (text, used, lossy) = reader.decoder().encoding().decode(bytes);
    if lossy {
        tracing::warn!(encoding = used.name(), "feed has undecodable bytes; replaced");
    }
    text.trim_start_matches('\u{feff}').to_string()
}

fn reject_second_root(stack: &[Frame], root: &Map<String, Value>) -> Result<(), ImportError> {
    if stack.is_empty() && !root.is_empty() {
        return Err(ImportError::MalformedInput(
            "document has more than one root element".to_string(),
        ));
    }
    Ok(())
}

/// Parse feed text into a generic tree.
///
/// Returns an object keyed by the document's root element name.
///
/// # Errors
///
/// [`ImportError::MalformedInput`] when the text is not well-formed XML:
/// syntax errors, mismatched or unclosed tags, text outside the root element,
/// more than one root, or no root element at all.
pub fn parse_feed(xml: &str) -> Result<Value, ImportError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Frame> = Vec::new();
    let mut root = Map::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            ImportError::MalformedInput(format!("{} (at byte {})", e, reader.buffer_position()))
        })?;

        match event {
            Event::Start(start) => {
                reject_second_root(&stack, &root)?;
                stack.push(Frame::open(&start)?);
            }
            Event::Empty(start) => {
                reject_second_root(&stack, &root)?;
                let frame = Frame::open(&start)?;
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.fields, name, value),
                    None => attach(&mut root, name, value),
                }
            }
            Event::End(end) => {
                let frame = stack.pop().ok_or_else(|| {
                    ImportError::MalformedInput("closing tag without an open element".to_string())
                })?;
                if end.name().as_ref() != frame.name.as_bytes() {
                    return Err(ImportError::MalformedInput(format!(
                        "expected </{}>, found </{}>",
                        frame.name,
                        String::from_utf8_lossy(end.name().as_ref())
                    )));
                }
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.fields, name, value),
                    None => attach(&mut root, name, value),
                }
            }
            Event::Text(text) => {
                let unescaped = text
                    .unescape()
                    .map_err(|e| ImportError::MalformedInput(e.to_string()))?;
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(&unescaped),
                    None if unescaped.trim().is_empty() => {}
                    None => {
                        return Err(ImportError::MalformedInput(format!(
                            "text outside the root element (at byte {})",
                            reader.buffer_position()
                        )))
                    }
                }
            }
            Event::CData(cdata) => {
                let Some(frame) = stack.last_mut() else {
                    return Err(ImportError::MalformedInput(
                        "CDATA outside the root element".to_string(),
                    ));
                };
                let raw = cdata.into_inner();
                let text = std::str::from_utf8(&raw)
                    .map_err(|e| ImportError::MalformedInput(e.to_string()))?;
                frame.text.push_str(text);
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype.
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ImportError::MalformedInput(format!(
            "unexpected end of document: <{}> is never closed",
            open.name
        )));
    }
    if root.is_empty() {
        return Err(ImportError::MalformedInput(
            "document has no root element".to_string(),
        ));
    }

    Ok(Value::Object(root))
}

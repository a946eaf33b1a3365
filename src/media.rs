//! Media type handlers and the registry that selects them.
//!
//! # Lookup policy
//!
//! MIME strings are normalized before every lookup and at registration:
//! parameters after `;` are dropped, whitespace is trimmed and the type is
//! ASCII-lowercased. `Application/JSON; charset=utf-8` therefore finds the
//! handler registered for `application/json`. Serialize and deserialize share
//! the same policy.
//!
//! Registering a second handler for a MIME type replaces the first; the
//! override is logged, not rejected.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Number, Value};
use tracing::warn;
use url::form_urlencoded;

use crate::coerce::conform;
use crate::descriptor::ParamType;

pub const JSON: &str = "application/json";
pub const FORM: &str = "application/x-www-form-urlencoded";
pub const XML: &str = "application/xml";
pub const XML_TEXT: &str = "text/xml";
/// Content type of the plain-text fallback written when no codec applies.
pub const TEXT: &str = "text/plain; charset=utf-8";

/// Why a value could not be encoded or decoded.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("no handler registered for `{0}`")]
    Unsupported(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("expected {expected:?}, found {found}")]
    TypeMismatch { expected: ParamType, found: &'static str },

    #[error("value cannot be represented as {0}")]
    Unrepresentable(&'static str),
}

/// A serializer/deserializer pair bound to one or more MIME types.
pub trait MediaTypeHandler: Send + Sync {
    /// MIME types served by this handler, without parameters.
    fn media_types(&self) -> &[&'static str];

    fn serialize(&self, value: &Value, sink: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decodes `bytes` into a value conforming to `target`.
    fn deserialize(&self, bytes: &[u8], target: ParamType) -> Result<Value, CodecError>;
}

/// Strips parameters and case from a MIME string.
pub fn normalize(mime: &str) -> String {
    mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// MIME type → handler map, assembled at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct MediaTypeRegistry {
    handlers: HashMap<String, Arc<dyn MediaTypeHandler>>,
}

impl MediaTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the JSON, XML and form handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(JsonMediaType);
        registry.register(XmlMediaType);
        registry.register(FormMediaType);
        registry
    }

    pub fn register(&mut self, handler: impl MediaTypeHandler + 'static) {
        let handler: Arc<dyn MediaTypeHandler> = Arc::new(handler);
        for mime in handler.media_types() {
            let key = normalize(mime);
            if self.handlers.insert(key.clone(), Arc::clone(&handler)).is_some() {
                warn!(media_type = %key, "media type handler replaced by a later registration");
            }
        }
    }

    pub fn supports(&self, mime: &str) -> bool {
        self.handlers.contains_key(&normalize(mime))
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Serializes `value` into `sink`. Returns `false` when no handler exists
    /// or the handler failed; the caller then falls back to plain text.
    pub fn serialize(&self, mime: &str, value: &Value, sink: &mut Vec<u8>) -> bool {
        let key = normalize(mime);
        let Some(handler) = self.handlers.get(&key) else {
            return false;
        };
        let start = sink.len();
        match handler.serialize(value, sink) {
            Ok(()) => true,
            Err(e) => {
                sink.truncate(start);
                warn!(media_type = %key, error = %e, "failed to serialize response body");
                false
            }
        }
    }

    pub fn deserialize(&self, mime: &str, bytes: &[u8], target: ParamType) -> Result<Value, CodecError> {
        let key = normalize(mime);
        let handler = self.handlers.get(&key).ok_or_else(|| CodecError::Unsupported(key.clone()))?;
        handler.deserialize(bytes, target)
    }

    /// Picks the media type a response should be written in.
    ///
    /// The first `Accept` entry with a registered handler wins, with `*/*`
    /// standing for `default`. An `Accept` header naming nothing we support
    /// still wins (the body then falls back to text). Without `Accept`, the
    /// request content type is used, then `default`.
    pub fn negotiate(&self, accept: Option<&str>, content_type: Option<&str>, default: &str) -> String {
        if let Some(accept) = accept.filter(|a| !a.trim().is_empty()) {
            let mut first = None;
            for entry in accept.split(',') {
                let mime = normalize(entry);
                let mime = if mime == "*/*" { normalize(default) } else { mime };
                if self.handlers.contains_key(&mime) {
                    return mime;
                }
                first.get_or_insert(mime);
            }
            if let Some(first) = first {
                return first;
            }
        }
        match content_type.filter(|c| !c.trim().is_empty()) {
            Some(content_type) => normalize(content_type),
            None => normalize(default),
        }
    }
}

impl fmt::Debug for MediaTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("MediaTypeRegistry").field("types", &types).finish()
    }
}

// ── Built-in handlers ─────────────────────────────────────────────────────────

/// `application/json` via `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonMediaType;

impl MediaTypeHandler for JsonMediaType {
    fn media_types(&self) -> &[&'static str] {
        &[JSON]
    }

    fn serialize(&self, value: &Value, sink: &mut Vec<u8>) -> Result<(), CodecError> {
        serde_json::to_writer(sink, value).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8], target: ParamType) -> Result<Value, CodecError> {
        let value = serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
        conform(value, target)
    }
}

/// `application/x-www-form-urlencoded`, limited to flat string maps.
#[derive(Clone, Copy, Debug, Default)]
pub struct FormMediaType;

impl MediaTypeHandler for FormMediaType {
    fn media_types(&self) -> &[&'static str] {
        &[FORM]
    }

    fn serialize(&self, value: &Value, sink: &mut Vec<u8>) -> Result<(), CodecError> {
        let Value::Object(map) = value else {
            return Err(CodecError::Unrepresentable("a form"));
        };
        let mut form = form_urlencoded::Serializer::new(String::new());
        for (key, value) in map {
            match value {
                Value::String(s) => form.append_pair(key, s),
                Value::Object(_) | Value::Array(_) => return Err(CodecError::Unrepresentable("a form")),
                Value::Null => form.append_pair(key, ""),
                scalar => form.append_pair(key, &scalar.to_string()),
            };
        }
        sink.extend_from_slice(form.finish().as_bytes());
        Ok(())
    }

    fn deserialize(&self, bytes: &[u8], target: ParamType) -> Result<Value, CodecError> {
        if !matches!(target, ParamType::Map | ParamType::Json | ParamType::Any) {
            return Err(CodecError::TypeMismatch { expected: target, found: "form" });
        }
        let map: Map<String, Value> = form_urlencoded::parse(bytes)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();
        Ok(Value::Object(map))
    }
}

/// `application/xml` and `text/xml`.
///
/// The document root is `<Value>`. Object members become child elements
/// named after their keys, array items become `<item>` children. Every
/// non-string value carries a `type` attribute (`object`, `array`, `number`,
/// `boolean`, `null`) so the tree reads back with its types intact.
/// Untyped elements read as strings, or as objects when they have children,
/// which is how hand-written documents come out. Keys must be XML names.
#[derive(Clone, Copy, Debug, Default)]
pub struct XmlMediaType;

const XML_ROOT: &str = "Value";
const XML_ITEM: &str = "item";

impl MediaTypeHandler for XmlMediaType {
    fn media_types(&self) -> &[&'static str] {
        &[XML, XML_TEXT]
    }

    fn serialize(&self, value: &Value, sink: &mut Vec<u8>) -> Result<(), CodecError> {
        let mut writer = Writer::new(sink);
        write_xml(&mut writer, XML_ROOT, value)
    }

    fn deserialize(&self, bytes: &[u8], target: ParamType) -> Result<Value, CodecError> {
        let mut reader = Reader::from_reader(bytes);
        loop {
            let (start, empty) = match reader.read_event().map_err(malformed)? {
                Event::Start(start) => (start, false),
                Event::Empty(start) => (start, true),
                Event::Eof => return Err(CodecError::Malformed("xml document has no root element".to_owned())),
                _ => continue,
            };
            let kind = xml_kind(&start)?;
            let value = read_xml(&mut reader, kind.as_deref(), empty)?;
            return conform(value, target);
        }
    }
}

type XmlWriter<'a> = Writer<&'a mut Vec<u8>>;

fn write_xml(writer: &mut XmlWriter<'_>, name: &str, value: &Value) -> Result<(), CodecError> {
    let start = BytesStart::new(name);
    match value {
        Value::Null => emit(writer, Event::Empty(start.with_attributes([("type", "null")]))),
        Value::String(s) => write_leaf(writer, start, s),
        Value::Bool(b) => write_leaf(writer, start.with_attributes([("type", "boolean")]), &b.to_string()),
        Value::Number(n) => write_leaf(writer, start.with_attributes([("type", "number")]), &n.to_string()),
        Value::Array(items) => {
            emit(writer, Event::Start(start.with_attributes([("type", "array")])))?;
            for item in items {
                write_xml(writer, XML_ITEM, item)?;
            }
            emit(writer, Event::End(BytesEnd::new(name)))
        }
        Value::Object(map) => {
            emit(writer, Event::Start(start.with_attributes([("type", "object")])))?;
            for (key, item) in map {
                if !is_xml_name(key) {
                    return Err(CodecError::Unrepresentable("an xml element name"));
                }
                write_xml(writer, key, item)?;
            }
            emit(writer, Event::End(BytesEnd::new(name)))
        }
    }
}

fn write_leaf(writer: &mut XmlWriter<'_>, start: BytesStart<'_>, text: &str) -> Result<(), CodecError> {
    let end = start.to_end().into_owned();
    emit(writer, Event::Start(start))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(end))
}

fn emit(writer: &mut XmlWriter<'_>, event: Event<'_>) -> Result<(), CodecError> {
    writer.write_event(event).map_err(malformed)
}

/// Reads the element whose start tag was just consumed, through its end tag.
fn read_xml(reader: &mut Reader<&[u8]>, kind: Option<&str>, empty: bool) -> Result<Value, CodecError> {
    let mut text = String::new();
    let mut children = Vec::new();

    while !empty {
        let (start, child_empty) = match reader.read_event().map_err(malformed)? {
            Event::Start(start) => (start, false),
            Event::Empty(start) => (start, true),
            Event::Text(t) => {
                text.push_str(&t.unescape().map_err(malformed)?);
                continue;
            }
            Event::CData(c) => {
                text.push_str(&String::from_utf8_lossy(&c));
                continue;
            }
            Event::End(_) => break,
            Event::Eof => return Err(CodecError::Malformed("unterminated xml element".to_owned())),
            _ => continue,
        };
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let child_kind = xml_kind(&start)?;
        children.push((name, read_xml(reader, child_kind.as_deref(), child_empty)?));
    }

    match kind {
        Some("null") => Ok(Value::Null),
        Some("boolean") => match text.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(CodecError::Malformed(format!("`{other}` is not a boolean"))),
        },
        Some("number") => text
            .trim()
            .parse::<Number>()
            .map(Value::Number)
            .map_err(|_| CodecError::Malformed(format!("`{}` is not a number", text.trim()))),
        Some("array") => Ok(Value::Array(children.into_iter().map(|(_, v)| v).collect())),
        Some("object") => Ok(Value::Object(children.into_iter().collect())),
        None | Some("string") if children.is_empty() => Ok(Value::String(text)),
        None => Ok(Value::Object(children.into_iter().collect())),
        Some(other) => Err(CodecError::Malformed(format!("unknown xml value type `{other}`"))),
    }
}

fn xml_kind(start: &BytesStart<'_>) -> Result<Option<String>, CodecError> {
    match start.try_get_attribute("type").map_err(malformed)? {
        Some(attr) => Ok(Some(attr.unescape_value().map_err(malformed)?.into_owned())),
        None => Ok(None),
    }
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn malformed(e: impl fmt::Display) -> CodecError {
    CodecError::Malformed(e.to_string())
}

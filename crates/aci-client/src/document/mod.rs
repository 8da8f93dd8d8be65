//! APIC response documents
//!
//! The APIC answers in two encodings: a JSON tree
//! (`{"totalCount": "n", "imdata": [{"<class>": {"attributes": {...}, "children": [...]}}]}`)
//! and an equivalent markup form (`<imdata totalCount="n"><class attr='v'/></imdata>`).
//! [`ResponseDocument`] normalises both into one [`Content`] tree of
//! [`ManagedObject`]s and converts back to either encoding.

pub mod markup;

use crate::error::AciError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Class name the APIC uses for error items inside `imdata`
const ERROR_CLASS: &str = "error";

/// One node of the APIC object tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedObject {
    class: String,
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) children: Option<Vec<ManagedObject>>,
}

impl ManagedObject {
    /// Create an object with no attributes and no children block
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            attributes: Vec::new(),
            children: None,
        }
    }

    /// Add or replace an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Append a child, creating the children block if needed
    #[must_use]
    pub fn with_child(mut self, child: ManagedObject) -> Self {
        self.children.get_or_insert_with(Vec::new).push(child);
        self
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Object class (the record's tag)
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attributes in document order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Children, `None` when the object carried no children block at all
    pub fn children(&self) -> Option<&[ManagedObject]> {
        self.children.as_deref()
    }

    /// JSON form: `{"<class>": {"attributes": {...}, "children": [...]}}`
    pub fn to_json(&self) -> Value {
        let attributes: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(n, v)| (n.clone(), Value::String(v.clone())))
            .collect();
        let mut body = Map::new();
        body.insert("attributes".to_string(), Value::Object(attributes));
        if let Some(children) = &self.children {
            body.insert(
                "children".to_string(),
                Value::Array(children.iter().map(ManagedObject::to_json).collect()),
            );
        }
        let mut object = Map::new();
        object.insert(self.class.clone(), Value::Object(body));
        Value::Object(object)
    }

    /// Build an object from its JSON form
    pub fn from_json(value: &Value) -> Result<Self, AciError> {
        let Some((class, body)) = value.as_object().and_then(single_entry) else {
            return Err(AciError::parse(0, "record must be an object with exactly one class key"));
        };
        let attributes = match body.get("attributes") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, value)| scalar(value).map(|v| (name.clone(), v)))
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(AciError::parse(0, format!("{class} has no attributes object"))),
        };
        let children = match body.get("children") {
            None => None,
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(ManagedObject::from_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => return Err(AciError::parse(0, format!("children of {class} must be a list"))),
        };
        Ok(Self {
            class: class.clone(),
            attributes,
            children,
        })
    }
}

fn single_entry(map: &Map<String, Value>) -> Option<(&String, &Value)> {
    if map.len() == 1 {
        map.iter().next()
    } else {
        None
    }
}

fn scalar(value: &Value) -> Result<String, AciError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(AciError::parse(0, "attribute values must be scalars")),
    }
}

/// Parsed body of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// A bare record
    Record(ManagedObject),
    /// The `imdata` envelope; a bare list of records is read as an envelope without a count
    Collection {
        total_count: Option<u64>,
        items: Vec<ManagedObject>,
    },
}

/// Output encoding for rendering and saving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Markup,
}

impl FromStr for Format {
    type Err = AciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "xml" | "markup" => Ok(Self::Markup),
            other => Err(AciError::InvalidRequest(format!(
                "invalid format {other:?}, expected \"json\" or \"xml\""
            ))),
        }
    }
}

/// `error` item returned by the APIC inside `imdata`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFault {
    pub code: String,
    pub text: String,
}

/// A parsed APIC response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDocument {
    content: Content,
}

impl ResponseDocument {
    /// Parse a response body; a leading `<` selects the markup decoder, anything else JSON
    pub fn parse(text: &str) -> Result<Self, AciError> {
        let text = text.trim();
        let content = if text.starts_with('<') {
            markup::parse(text)?
        } else {
            let value: Value = serde_json::from_str(text).map_err(|e| {
                AciError::parse(byte_offset(text, e.line(), e.column()), e.to_string())
            })?;
            content_from_json(&value)?
        };
        debug!("Parsed response document");
        Ok(Self { content })
    }

    /// Build a document from JSON already in memory
    pub fn from_json(value: &Value) -> Result<Self, AciError> {
        Ok(Self {
            content: content_from_json(value)?,
        })
    }

    pub fn from_content(content: Content) -> Self {
        Self { content }
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Result items, always as a list
    pub fn imdata(&self) -> &[ManagedObject] {
        match &self.content {
            Content::Record(object) => std::slice::from_ref(object),
            Content::Collection { items, .. } => items,
        }
    }

    /// Declared total count, else 1 for a bare record, else the number of items
    pub fn count(&self) -> u64 {
        match &self.content {
            Content::Record(_) => 1,
            Content::Collection {
                total_count: Some(count),
                ..
            } => *count,
            Content::Collection { items, .. } => items.len() as u64,
        }
    }

    /// True when the response holds no items ("no matching objects")
    pub fn is_empty(&self) -> bool {
        self.imdata().is_empty()
    }

    /// The value of `name` for every item
    pub fn attribute(&self, name: &str) -> Result<Vec<&str>, AciError> {
        self.imdata()
            .iter()
            .map(|object| lookup(object, name))
            .collect()
    }

    /// The values of several attributes for every item, in the order requested
    pub fn attributes(&self, names: &[&str]) -> Result<Vec<Vec<&str>>, AciError> {
        self.imdata()
            .iter()
            .map(|object| names.iter().map(|name| lookup(object, name)).collect::<Result<Vec<_>, _>>())
            .collect()
    }

    /// The values of several attributes for every item, keyed by attribute name
    pub fn attributes_by_key(&self, names: &[&str]) -> Result<Vec<BTreeMap<String, String>>, AciError> {
        self.imdata()
            .iter()
            .map(|object| {
                names
                    .iter()
                    .map(|name| lookup(object, name).map(|v| ((*name).to_string(), v.to_string())))
                    .collect::<Result<BTreeMap<_, _>, _>>()
            })
            .collect()
    }

    /// First item's value of `name`, `None` for an empty response
    pub fn value(&self, name: &str) -> Result<Option<&str>, AciError> {
        Ok(self.attribute(name)?.into_iter().next())
    }

    /// Occurrences of each value of `name`, keeping values seen more than `minimum` times
    pub fn summarize(&self, name: &str, minimum: u64) -> Result<BTreeMap<String, u64>, AciError> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for value in self.attribute(name)? {
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
        counts.retain(|_, count| *count > minimum);
        Ok(counts)
    }

    /// The first `error` item, if the APIC returned one
    pub fn error(&self) -> Option<ApiFault> {
        self.imdata()
            .iter()
            .find(|object| object.class() == ERROR_CLASS)
            .map(|object| ApiFault {
                code: object.attribute("code").unwrap_or_default().to_string(),
                text: object.attribute("text").unwrap_or_default().to_string(),
            })
    }

    /// JSON form of the whole content
    pub fn to_json(&self) -> Value {
        match &self.content {
            Content::Record(object) => object.to_json(),
            Content::Collection { total_count, items } => {
                let mut envelope = Map::new();
                if let Some(count) = total_count {
                    envelope.insert("totalCount".to_string(), Value::String(count.to_string()));
                }
                envelope.insert(
                    "imdata".to_string(),
                    Value::Array(items.iter().map(ManagedObject::to_json).collect()),
                );
                Value::Object(envelope)
            }
        }
    }

    /// JSON list of the items
    pub fn imdata_json(&self) -> Value {
        Value::Array(self.imdata().iter().map(ManagedObject::to_json).collect())
    }

    /// Markup form of the whole content
    pub fn to_markup(&self) -> String {
        markup::emit(&self.content)
    }

    /// Render the items (or the item at `index`) in the given format
    pub fn render(&self, index: Option<usize>, format: Format) -> Result<String, AciError> {
        let item = index.map(|i| self.item(i)).transpose()?;
        match (format, item) {
            (Format::Json, None) => Ok(serde_json::to_string_pretty(&self.imdata_json())?),
            (Format::Json, Some(object)) => Ok(serde_json::to_string_pretty(&object.to_json())?),
            (Format::Markup, None) => Ok(self.to_markup()),
            (Format::Markup, Some(object)) => Ok(markup::emit_object(object)),
        }
    }

    /// Write the rendered items to `path`; a single-item document saves that item alone
    pub fn save(&self, path: impl AsRef<Path>, index: Option<usize>, format: Format) -> Result<(), AciError> {
        let index = match index {
            None if self.imdata().len() == 1 => Some(0),
            other => other,
        };
        let rendered = self.render(index, format)?;
        std::fs::write(path.as_ref(), rendered)?;
        debug!("Saved response document to {}", path.as_ref().display());
        Ok(())
    }

    fn item(&self, index: usize) -> Result<&ManagedObject, AciError> {
        let items = self.imdata();
        items.get(index).ok_or_else(|| {
            AciError::InvalidRequest(format!(
                "index {index} is out of bounds for {} items",
                items.len()
            ))
        })
    }
}

impl fmt::Display for ResponseDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.imdata_json()) {
            Ok(text) => f.write_str(&text),
            Err(_) => Err(fmt::Error),
        }
    }
}

fn lookup<'a>(object: &'a ManagedObject, name: &str) -> Result<&'a str, AciError> {
    object.attribute(name).ok_or_else(|| {
        AciError::InvalidRequest(format!("unknown attribute {name} on {}", object.class()))
    })
}

fn content_from_json(value: &Value) -> Result<Content, AciError> {
    match value {
        Value::Object(map) if map.contains_key("imdata") => {
            let items = match &map["imdata"] {
                Value::Array(items) => items
                    .iter()
                    .map(ManagedObject::from_json)
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(AciError::parse(0, "imdata must be a list")),
            };
            let total_count = match map.get("totalCount") {
                None => None,
                Some(Value::String(s)) => Some(s.trim().parse::<u64>().map_err(|_| {
                    AciError::parse(0, format!("totalCount {s:?} is not a number"))
                })?),
                Some(Value::Number(n)) => Some(
                    n.as_u64()
                        .ok_or_else(|| AciError::parse(0, format!("totalCount {n} is not a count")))?,
                ),
                Some(_) => return Err(AciError::parse(0, "totalCount must be a string or number")),
            };
            Ok(Content::Collection { total_count, items })
        }
        Value::Array(items) => Ok(Content::Collection {
            total_count: None,
            items: items
                .iter()
                .map(ManagedObject::from_json)
                .collect::<Result<Vec<_>, _>>()?,
        }),
        Value::Object(_) => Ok(Content::Record(ManagedObject::from_json(value)?)),
        _ => Err(AciError::parse(0, "response must be a JSON object or list")),
    }
}

/// Convert serde_json's 1-based line/column into a byte offset
fn byte_offset(text: &str, line: usize, column: usize) -> usize {
    let preceding: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    preceding + column.saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TENANTS: &str = r#"<imdata totalCount="2"><fvTenant name='a'/><fvTenant name='b'/></imdata>"#;

    fn sample() -> ResponseDocument {
        ResponseDocument::from_json(&json!({
            "totalCount": "3",
            "imdata": [
                {"fabricNode": {"attributes": {"id": "101", "role": "leaf", "name": "leaf-101"}}},
                {"fabricNode": {"attributes": {"id": "102", "role": "leaf", "name": "leaf-102"}}},
                {"fabricNode": {"attributes": {"id": "201", "role": "spine", "name": "spine-201"},
                    "children": [{"fabricLink": {"attributes": {"n1": "201", "n2": "101"}}}]}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_markup_attribute_extraction() {
        let doc = ResponseDocument::parse(TENANTS).unwrap();
        assert_eq!(doc.imdata().len(), 2);
        assert_eq!(doc.attribute("name").unwrap(), vec!["a", "b"]);
        assert_eq!(doc.count(), 2);
    }

    #[test]
    fn test_count_rules() {
        assert_eq!(sample().count(), 3);

        let bare = ResponseDocument::parse(r#"{"fvTenant": {"attributes": {"name": "a"}}}"#).unwrap();
        assert_eq!(bare.count(), 1);
        assert_eq!(bare.imdata().len(), 1);

        let unwrapped = ResponseDocument::parse(
            r#"{"imdata": [{"a": {"attributes": {}}}, {"a": {"attributes": {}}}, {"a": {"attributes": {}}}]}"#,
        )
        .unwrap();
        assert_eq!(unwrapped.count(), 3);
    }

    #[test]
    fn test_unknown_attribute_is_error() {
        assert!(matches!(sample().attribute("serial"), Err(AciError::InvalidRequest(_))));
    }

    #[test]
    fn test_grouped_attributes() {
        let doc = sample();
        let grouped = doc.attributes(&["id", "role"]).unwrap();
        assert_eq!(grouped[2], vec!["201", "spine"]);

        let keyed = doc.attributes_by_key(&["id", "role"]).unwrap();
        assert_eq!(keyed[0].get("role").map(String::as_str), Some("leaf"));
        assert_eq!(keyed[0].len(), 2);
    }

    #[test]
    fn test_value_of_empty_response() {
        let empty = ResponseDocument::parse(r#"{"totalCount": "0", "imdata": []}"#).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.count(), 0);
        assert_eq!(empty.value("name").unwrap(), None);
        assert_eq!(sample().value("name").unwrap(), Some("leaf-101"));
    }

    #[test]
    fn test_summarize_counts_true_frequency() {
        let doc = sample();
        let all = doc.summarize("role", 0).unwrap();
        assert_eq!(all.get("leaf"), Some(&2));
        assert_eq!(all.get("spine"), Some(&1));

        let repeated = doc.summarize("role", 1).unwrap();
        assert_eq!(repeated.len(), 1);
        assert_eq!(repeated.get("leaf"), Some(&2));
    }

    #[test]
    fn test_error_item() {
        let doc = ResponseDocument::parse(
            r#"{"totalCount": "1", "imdata": [{"error": {"attributes": {"code": "400", "text": "bad dn"}}}]}"#,
        )
        .unwrap();
        assert_eq!(
            doc.error(),
            Some(ApiFault {
                code: "400".to_string(),
                text: "bad dn".to_string()
            })
        );
        assert_eq!(sample().error(), None);
    }

    #[test]
    fn test_json_markup_round_trip() {
        let doc = sample();
        let markup = doc.to_markup();
        let reparsed = ResponseDocument::parse(&markup).unwrap();
        assert_eq!(reparsed.to_json(), doc.to_json());
        assert_eq!(reparsed.to_markup(), markup);
    }

    #[test]
    fn test_markup_round_trip_preserves_order() {
        let doc = ResponseDocument::parse(
            "<fvTenant name='t' descr='d' annotation=''><fvBD name='b2'/><fvBD name='b1'/></fvTenant>",
        )
        .unwrap();
        let json = doc.to_json();
        let again = ResponseDocument::from_json(&json).unwrap();
        assert_eq!(again, doc);
        let attrs: Vec<_> = again.imdata()[0].attributes().map(|(n, _)| n).collect();
        assert_eq!(attrs, vec!["name", "descr", "annotation"]);
    }

    #[test]
    fn test_bare_lists_survive_markup() {
        for text in [
            "[]",
            r#"[{"fvTenant": {"attributes": {"name": "a"}}}]"#,
            r#"[{"fvTenant": {"attributes": {"name": "a"}}}, {"fvTenant": {"attributes": {"name": "b"}}}]"#,
        ] {
            let doc = ResponseDocument::parse(text).unwrap();
            let markup = doc.to_markup();
            let reparsed = ResponseDocument::parse(&markup).unwrap();
            assert_eq!(reparsed, doc, "{text}");
            assert_eq!(reparsed.to_json(), doc.to_json(), "{text}");
            assert_eq!(reparsed.to_markup(), markup, "{text}");
        }

        let single = ResponseDocument::parse(r#"[{"fvTenant": {"attributes": {"name": "a"}}}]"#).unwrap();
        assert_eq!(single.to_markup(), "<imdata>\n  <fvTenant name='a'/>\n</imdata>\n");
        assert_eq!(single.count(), 1);
        assert_eq!(ResponseDocument::parse("[]").unwrap().to_markup(), "<imdata>\n</imdata>\n");
    }

    #[test]
    fn test_render_index_bounds() {
        let doc = sample();
        assert!(doc.render(Some(3), Format::Json).is_err());
        let item = doc.render(Some(0), Format::Markup).unwrap();
        assert_eq!(item, "<fabricNode id='101' role='leaf' name='leaf-101'/>\n");
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(ResponseDocument::parse("{\"imdata\": "), Err(AciError::Parse { .. })));
        assert!(matches!(ResponseDocument::parse("42"), Err(AciError::Parse { .. })));
        assert!(matches!(
            ResponseDocument::parse(r#"{"a": {"attributes": {}}, "b": {"attributes": {}}}"#),
            Err(AciError::Parse { .. })
        ));
        assert!(matches!(
            ResponseDocument::parse(r#"{"fvTenant": {"name": "a"}}"#),
            Err(AciError::Parse { .. })
        ));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("XML".parse::<Format>().unwrap(), Format::Markup);
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert!("yaml".parse::<Format>().is_err());
    }
}

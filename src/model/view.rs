use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reserved sibling key carrying the failure reason for section `name`.
pub fn annotation_key(name: &str) -> String {
    format!("_{}_error", name)
}

/// One named nested section of a merged view: either data or the reason it is missing.
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    Data(Value),
    Annotated(String),
}

/// A local record's fields plus named nested sections.
///
/// Top-level fields are always emitted. A section renders either as `name: data` or
/// as `_name_error: reason`, never both. Section names are reserved: a top-level field
/// with the same name (or its annotation key) is shadowed by the section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedView {
    fields: Map<String, Value>,
    sections: BTreeMap<String, Section>,
}

impl MergedView {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            sections: BTreeMap::new(),
        }
    }

    /// Build a view from any record that serializes to a JSON object.
    pub fn from_record<R: Serialize>(record: &R) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(record)? {
            Value::Object(fields) => Ok(Self::from_fields(fields)),
            other => Ok(Self::from_fields(Map::from_iter([("value".to_string(), other)]))),
        }
    }

    /// Attach a section, replacing any previous section of the same name.
    pub fn attach(&mut self, name: impl Into<String>, section: Section) {
        self.sections.insert(name.into(), section);
    }

    pub fn attach_data(&mut self, name: impl Into<String>, data: Value) {
        self.attach(name, Section::Data(data));
    }

    pub fn annotate(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.attach(name, Section::Annotated(reason.into()));
    }

    pub fn into_value(self) -> Value {
        serde_json::to_value(&self).unwrap_or(Value::Null)
    }

    fn is_reserved(&self, key: &str) -> bool {
        if self.sections.contains_key(key) {
            return true;
        }
        key.strip_prefix('_')
            .and_then(|k| k.strip_suffix("_error"))
            .map_or(false, |name| self.sections.contains_key(name))
    }
}

impl Serialize for MergedView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in &self.fields {
            if !self.is_reserved(key) {
                map.serialize_entry(key, value)?;
            }
        }
        for (name, section) in &self.sections {
            match section {
                Section::Data(data) => map.serialize_entry(name, data)?,
                Section::Annotated(reason) => map.serialize_entry(&annotation_key(name), reason)?,
            }
        }
        map.end()
    }
}

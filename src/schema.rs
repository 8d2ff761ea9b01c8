//! Compiled Protocol Schema
//!
//! The normalized, serializable form of one or more protocol documents:
//! interface name → version, description, and ordered requests, events and
//! enums with opcodes already assigned.
//!
//! Human-readable fields (`description`, `signature`, `summary`) are
//! optional so the compact interchange form can simply leave them out.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Wire type of a request or event argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    Int,
    Uint,
    Fixed,
    String,
    Object,
    NewId,
    Array,
    Fd,
}

impl ArgType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgType::Int => "int",
            ArgType::Uint => "uint",
            ArgType::Fixed => "fixed",
            ArgType::String => "string",
            ArgType::Object => "object",
            ArgType::NewId => "new_id",
            ArgType::Array => "array",
            ArgType::Fd => "fd",
        }
    }
}

impl std::str::FromStr for ArgType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "int" => ArgType::Int,
            "uint" => ArgType::Uint,
            "fixed" => ArgType::Fixed,
            "string" => ArgType::String,
            "object" => ArgType::Object,
            "new_id" => ArgType::NewId,
            "array" => ArgType::Array,
            "fd" => ArgType::Fd,
            other => return Err(SchemaError::UnknownArgType(other.to_string())),
        })
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One argument of a request or event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arg {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(rename = "allow-null", default, skip_serializing_if = "Option::is_none")]
    pub allow_null: Option<bool>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Arg {
    /// Argument with only a name and type
    pub fn new(name: impl Into<String>, arg_type: ArgType) -> Self {
        Self {
            name: name.into(),
            arg_type,
            interface: None,
            allow_null: None,
            enum_name: None,
            summary: None,
        }
    }

    /// A `new_id` whose concrete interface is chosen by the caller
    pub fn is_dynamic_new_id(&self) -> bool {
        self.arg_type == ArgType::NewId && self.interface.as_deref().is_none_or(str::is_empty)
    }
}

/// A request or an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    pub opcode: u16,
    /// Message kind attribute, e.g. `destructor`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    pub args: Vec<Arg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Message {
    pub fn is_destructor(&self) -> bool {
        self.kind.as_deref() == Some("destructor")
    }

    fn minimise(&mut self) {
        self.description = None;
        self.signature = None;
        for arg in &mut self.args {
            arg.summary = None;
        }
    }
}

/// A named integer constant inside an enum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enum {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(default)]
    pub bitfield: bool,
    pub entries: Vec<Entry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Enum {
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    fn minimise(&mut self) {
        self.description = None;
        self.signature = None;
        for entry in &mut self.entries {
            entry.summary = None;
        }
    }
}

/// One protocol object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub requests: Vec<Message>,
    pub events: Vec<Message>,
    pub enums: Vec<Enum>,
}

impl Interface {
    pub fn new(version: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            description: Some(description.into()),
            requests: Vec::new(),
            events: Vec::new(),
            enums: Vec::new(),
        }
    }

    pub fn request(&self, name: &str) -> Option<&Message> {
        self.requests.iter().find(|request| request.name == name)
    }

    pub fn event(&self, name: &str) -> Option<&Message> {
        self.events.iter().find(|event| event.name == name)
    }

    pub fn request_by_opcode(&self, opcode: u16) -> Option<&Message> {
        self.requests.get(usize::from(opcode))
    }

    pub fn event_by_opcode(&self, opcode: u16) -> Option<&Message> {
        self.events.get(usize::from(opcode))
    }

    pub fn enumeration(&self, name: &str) -> Option<&Enum> {
        self.enums.iter().find(|e| e.name == name)
    }

    fn minimise(&mut self) {
        self.description = None;
        self.requests.iter_mut().for_each(Message::minimise);
        self.events.iter_mut().for_each(Message::minimise);
        self.enums.iter_mut().for_each(Enum::minimise);
    }
}

/// Compiled interfaces keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    interfaces: BTreeMap<String, Interface>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = (&str, &Interface)> {
        self.interfaces.iter().map(|(name, iface)| (name.as_str(), iface))
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Entry for `name`, created with the given metadata on first use.
    ///
    /// Metadata of an existing interface is never overwritten.
    pub(crate) fn interface_entry(
        &mut self,
        name: &str,
        metadata: impl FnOnce() -> Interface,
    ) -> &mut Interface {
        self.interfaces
            .entry(name.to_string())
            .or_insert_with(metadata)
    }

    /// Copy with every description, signature and summary removed
    pub fn minimised(&self) -> Schema {
        let mut copy = self.clone();
        copy.interfaces.values_mut().for_each(Interface::minimise);
        copy
    }

    /// Serialize to the JSON interchange form.
    ///
    /// With `minimise` the human-readable fields are left out. `self` is
    /// never modified.
    pub fn to_json(&self, minimise: bool) -> Result<String, SchemaError> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        if minimise {
            self.minimised().serialize(&mut serializer)?;
        } else {
            self.serialize(&mut serializer)?;
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Load a previously serialized schema
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        let mut schema = Schema::new();
        let iface = schema.interface_entry("wl_demo", || Interface::new("3", "demo\nbody"));
        iface.requests.push(Message {
            name: "create".into(),
            opcode: 0,
            kind: None,
            since: None,
            args: vec![Arg {
                summary: Some("new thing".into()),
                ..Arg::new("id", ArgType::NewId)
            }],
            description: Some("create a thing".into()),
            signature: Some("wl_demo.create(id: new_id)".into()),
        });
        iface.enums.push(Enum {
            name: "error".into(),
            since: None,
            bitfield: false,
            entries: vec![Entry {
                name: "bad".into(),
                value: 1,
                since: None,
                summary: Some("bad thing".into()),
            }],
            description: Some("errors".into()),
            signature: None,
        });
        schema
    }

    #[test]
    fn test_minimised_json_has_no_human_fields() {
        let schema = sample();
        let json = schema.to_json(true).unwrap();

        assert!(!json.contains("\"description\""));
        assert!(!json.contains("\"signature\""));
        assert!(!json.contains("\"summary\""));
        assert!(json.contains("\"wl_demo\""));
        assert!(json.contains("\"new_id\""));
    }

    #[test]
    fn test_full_json_keeps_human_fields() {
        let schema = sample();
        let value: serde_json::Value = serde_json::from_str(&schema.to_json(false).unwrap()).unwrap();

        let iface = &value["wl_demo"];
        assert_eq!(iface["description"], "demo\nbody");
        assert_eq!(iface["requests"][0]["signature"], "wl_demo.create(id: new_id)");
        assert_eq!(iface["requests"][0]["args"][0]["summary"], "new thing");
        assert_eq!(iface["enums"][0]["entries"][0]["summary"], "bad thing");
    }

    #[test]
    fn test_to_json_does_not_mutate() {
        let schema = sample();
        let before = schema.clone();
        schema.to_json(true).unwrap();

        assert_eq!(schema, before);
    }

    #[test]
    fn test_json_reload() {
        let schema = sample();
        let reloaded = Schema::from_json(&schema.to_json(false).unwrap()).unwrap();
        assert_eq!(reloaded, schema);

        let compact = Schema::from_json(&schema.to_json(true).unwrap()).unwrap();
        assert_eq!(compact, schema.minimised());
    }

    #[test]
    fn test_lookups() {
        let schema = sample();
        let iface = schema.interface("wl_demo").unwrap();

        assert_eq!(iface.request("create").unwrap().opcode, 0);
        assert!(iface.request_by_opcode(1).is_none());
        assert_eq!(iface.enumeration("error").unwrap().entry("bad").unwrap().value, 1);
        assert!(schema.interface("wl_other").is_none());
    }

    #[test]
    fn test_dynamic_new_id() {
        assert!(Arg::new("id", ArgType::NewId).is_dynamic_new_id());
        let typed = Arg {
            interface: Some("wl_callback".into()),
            ..Arg::new("id", ArgType::NewId)
        };
        assert!(!typed.is_dynamic_new_id());
    }

    #[test]
    fn test_arg_type_parse() {
        assert_eq!("new_id".parse::<ArgType>().unwrap(), ArgType::NewId);
        assert!(matches!(
            "float".parse::<ArgType>(),
            Err(SchemaError::UnknownArgType(_))
        ));
    }
}

//! Protocol Schema Compiler
//!
//! Folds protocol-definition documents into a [`Schema`]. Each document is
//! walked in a fixed order: every `request`, then every `event`, then every
//! `enum`, each in document order. Opcodes are the position of a member in
//! its interface's request or event list, so elements are never sorted or
//! reordered before folding.
//!
//! Several documents accumulate into the same interface map.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::ProtocolConfig;
use crate::error::SchemaError;
use crate::schema::{Arg, ArgType, Entry, Enum, Interface, Message, Schema};
use crate::source::DocumentSource;
use crate::xml::{self, Element};

/// Identifiers that cannot be used verbatim in generated Rust code
const RESERVED_IDENTIFIERS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final", "gen",
    "macro", "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Suffix appended to identifiers that collide with a reserved word
const RENAME_MARKER: char = '_';

pub fn is_reserved(name: &str) -> bool {
    RESERVED_IDENTIFIERS.contains(&name)
}

/// Rename `name` in place if it is reserved; returns whether it changed
fn fix_identifier(name: &mut String) -> bool {
    if is_reserved(name) {
        name.push(RENAME_MARKER);
        true
    } else {
        false
    }
}

/// Parse an enum entry value written in decimal, `0x` hex or `0b` binary
pub fn parse_value(value: &str) -> Option<u32> {
    let value = value.trim();
    if let Some(bin) = value.strip_prefix("0b") {
        u32::from_str_radix(bin, 2).ok()
    } else if let Some(hex) = value.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

/// Human-readable text of a `<description>` element: the trimmed summary,
/// then the body with every line trimmed
fn describe(description: Option<&Element>) -> String {
    let Some(description) = description else {
        return String::new();
    };
    let summary = description.attr("summary").unwrap_or_default().trim();
    if description.text.is_empty() {
        return summary.to_string();
    }
    let body: Vec<&str> = description.text.split('\n').map(str::trim).collect();
    format!("{}\n{}", summary, body.join("\n"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Request,
    Event,
    Enum,
}

impl MemberKind {
    const WALK_ORDER: [MemberKind; 3] = [MemberKind::Request, MemberKind::Event, MemberKind::Enum];

    fn tag(self) -> &'static str {
        match self {
            MemberKind::Request => "request",
            MemberKind::Event => "event",
            MemberKind::Enum => "enum",
        }
    }
}

/// One entry of the remote repository tree listing
#[derive(Debug, Deserialize)]
struct TreeEntry {
    id: String,
    path: String,
}

/// Builds a [`Schema`] from protocol documents
#[derive(Debug)]
pub struct SchemaCompiler {
    schema: Schema,
    protocol_name: String,
    config: ProtocolConfig,
    http: Option<reqwest::blocking::Client>,
}

impl Default for SchemaCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCompiler {
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    pub fn with_config(config: ProtocolConfig) -> Self {
        Self {
            schema: Schema::new(),
            protocol_name: String::new(),
            config,
            http: None,
        }
    }

    /// Use `client` for remote listings and documents
    pub fn with_http_client(mut self, client: reqwest::blocking::Client) -> Self {
        self.http = Some(client);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }

    /// Name of the most recently parsed protocol document
    pub fn protocol_name(&self) -> &str {
        &self.protocol_name
    }

    /// See [`Schema::to_json`]
    pub fn to_json(&self, minimise: bool) -> Result<String, SchemaError> {
        self.schema.to_json(minimise)
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    /// Parse a document given as a filesystem path or an HTTP(S) location.
    ///
    /// Blank input is ignored.
    pub fn parse(&mut self, input: &str) -> Result<(), SchemaError> {
        match DocumentSource::resolve(input) {
            Some(source) => self.parse_source(&source),
            None => Ok(()),
        }
    }

    pub fn parse_source(&mut self, source: &DocumentSource) -> Result<(), SchemaError> {
        let document = match source {
            DocumentSource::Path(path) => {
                std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
                    path: path.clone(),
                    source,
                })?
            }
            DocumentSource::Uri(uri) => {
                let timeout = Duration::from_secs(self.config.remote.document_timeout_secs);
                self.http()?
                    .get(uri)
                    .timeout(timeout)
                    .send()?
                    .error_for_status()?
                    .text()?
            }
        };
        self.parse_document(&document)
    }

    /// Parse every source in order, stopping at the first error
    pub fn parse_all<I>(&mut self, sources: I) -> Result<(), SchemaError>
    where
        I: IntoIterator<Item = DocumentSource>,
    {
        for source in sources {
            info!("Parsing {}", source);
            self.parse_source(&source)?;
        }
        Ok(())
    }

    /// Parse an in-memory protocol document
    pub fn parse_document(&mut self, document: &str) -> Result<(), SchemaError> {
        let root = xml::parse(document)?;
        self.protocol_name = root.required("name")?.to_string();
        if root.tag != "protocol" {
            debug!("Root element <{}> is not a protocol, nothing to fold", root.tag);
            return Ok(());
        }

        for kind in MemberKind::WALK_ORDER {
            for interface in root.children_named("interface") {
                for element in interface.children_named(kind.tag()) {
                    self.fold_element(interface, element, kind)?;
                }
            }
        }
        Ok(())
    }

    fn fold_element(
        &mut self,
        interface: &Element,
        element: &Element,
        kind: MemberKind,
    ) -> Result<(), SchemaError> {
        let interface_name = interface.required("name")?;
        let name = element.required("name")?.to_string();
        debug!("    ({}) {}.{}", kind.tag(), interface_name, name);

        // First element seen for an interface fixes its metadata
        self.schema.interface_entry(interface_name, || {
            Interface::new(
                interface.attr("version").unwrap_or("1"),
                describe(interface.child("description")),
            )
        });

        let description = Some(describe(element.child("description")));

        match kind {
            MemberKind::Request | MemberKind::Event => {
                let args = self.read_args(interface_name, &name, element, kind)?;
                let signature = signature(interface_name, &name, &args);
                let message = Message {
                    name,
                    opcode: 0,
                    kind: element.attr("type").map(str::to_owned),
                    since: element.attr("since").map(str::to_owned),
                    args,
                    description,
                    signature: Some(signature),
                };
                if kind == MemberKind::Request {
                    self.add_request(interface_name, message)?;
                } else {
                    self.add_event(interface_name, message)?;
                }
            }
            MemberKind::Enum => {
                let entries = self.read_entries(element)?;
                let listing: Vec<String> = entries
                    .iter()
                    .map(|entry| format!("{}: {}", entry.name, entry.value))
                    .collect();
                let signature = format!("{}.{}({})", interface_name, name, listing.join(", "));
                let enumeration = Enum {
                    name,
                    since: element.attr("since").map(str::to_owned),
                    bitfield: element.attr("bitfield") == Some("true"),
                    entries,
                    description,
                    signature: Some(signature),
                };
                self.add_enum(interface_name, enumeration);
            }
        }
        Ok(())
    }

    /// Read `<arg>` children, renaming reserved names and synthesizing the
    /// `interface`/`version` pair after every untyped `new_id`
    fn read_args(
        &self,
        interface: &str,
        member: &str,
        element: &Element,
        kind: MemberKind,
    ) -> Result<Vec<Arg>, SchemaError> {
        let mut args = Vec::new();
        for node in element.children_named("arg") {
            let mut arg = Arg {
                name: node.required("name")?.to_string(),
                arg_type: node.required("type")?.parse()?,
                interface: node.attr("interface").map(str::to_owned),
                allow_null: node.attr("allow-null").map(|v| v == "true"),
                enum_name: node.attr("enum").map(str::to_owned),
                summary: node.attr("summary").map(str::to_owned),
            };

            if fix_identifier(&mut arg.name) {
                info!(
                    "Renamed argument to {} in {}.{}.{}",
                    arg.name, self.protocol_name, interface, member
                );
            }

            let dynamic = arg.is_dynamic_new_id();
            if dynamic && kind == MemberKind::Event {
                return Err(SchemaError::DynamicNewIdEvent {
                    interface: interface.to_string(),
                    event: member.to_string(),
                });
            }

            args.push(arg);
            if dynamic {
                // The receiver cannot know the concrete interface otherwise
                args.push(Arg::new("interface", ArgType::String));
                args.push(Arg::new("version", ArgType::Uint));
            }
        }
        Ok(args)
    }

    fn read_entries(&self, element: &Element) -> Result<Vec<Entry>, SchemaError> {
        let mut entries = Vec::new();
        for node in element.children_named("entry") {
            let mut name = node.required("name")?.to_string();
            let raw = node.required("value")?;
            let value = parse_value(raw).ok_or_else(|| SchemaError::InvalidEnumValue {
                entry: name.clone(),
                value: raw.to_string(),
            })?;
            if fix_identifier(&mut name) {
                info!("Renamed enum entry to {} in {}", name, self.protocol_name);
            }
            entries.push(Entry {
                name,
                value,
                since: node.attr("since").map(str::to_owned),
                summary: node.attr("summary").map(str::to_owned),
            });
        }
        Ok(entries)
    }

    // ========================================================================
    // Accumulators
    // ========================================================================

    fn interface_mut(&mut self, interface: &str) -> &mut Interface {
        self.schema
            .interface_entry(interface, || Interface::new("1", ""))
    }

    fn rename_member(&self, interface: &str, name: &mut String) {
        if fix_identifier(name) {
            info!("Renamed {}.{}.{}", self.protocol_name, interface, name);
        }
    }

    /// Append a request to `interface`; returns its opcode
    pub fn add_request(&mut self, interface: &str, mut request: Message) -> Result<u16, SchemaError> {
        self.rename_member(interface, &mut request.name);
        let requests = &mut self.interface_mut(interface).requests;
        let opcode = next_opcode(requests.len(), interface, "request")?;
        request.opcode = opcode;
        requests.push(request);
        Ok(opcode)
    }

    /// Append an event to `interface`; returns its opcode.
    ///
    /// Fails if the (possibly renamed) event shares its name with a request
    /// of the same interface.
    pub fn add_event(&mut self, interface: &str, mut event: Message) -> Result<u16, SchemaError> {
        self.rename_member(interface, &mut event.name);
        let target = self.interface_mut(interface);
        if target.request(&event.name).is_some() {
            return Err(SchemaError::EventRequestCollision {
                interface: interface.to_string(),
                name: event.name,
            });
        }
        let opcode = next_opcode(target.events.len(), interface, "event")?;
        event.opcode = opcode;
        target.events.push(event);
        Ok(opcode)
    }

    pub fn add_enum(&mut self, interface: &str, mut enumeration: Enum) {
        self.rename_member(interface, &mut enumeration.name);
        self.interface_mut(interface).enums.push(enumeration);
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    fn http(&mut self) -> Result<&reqwest::blocking::Client, SchemaError> {
        let client = match self.http.take() {
            Some(client) => client,
            None => reqwest::blocking::Client::builder().build()?,
        };
        Ok(self.http.insert(client))
    }

    /// List protocol documents in the remote repository.
    ///
    /// The canonical core protocol always comes first. Any non-success
    /// response aborts the listing.
    pub fn get_remote_uris(&mut self) -> Result<Vec<String>, SchemaError> {
        let remote = self.config.remote.clone();
        let extension = self.config.extension.clone();
        let timeout = Duration::from_secs(remote.listing_timeout_secs);
        let tree_url = format!("{}/tree", remote.api_base.trim_end_matches('/'));
        let client = self.http()?.clone();

        let mut uris = Vec::new();
        for path in &remote.paths {
            info!("Searching for {} protocol definitions", path);
            let mut page: u32 = 1;
            loop {
                let entries: Vec<TreeEntry> = client
                    .get(&tree_url)
                    .query(&[
                        ("per_page", remote.per_page.to_string()),
                        ("page", page.to_string()),
                        ("path", path.clone()),
                        ("recursive", "true".to_string()),
                    ])
                    .timeout(timeout)
                    .send()?
                    .error_for_status()?
                    .json()?;

                if entries.is_empty() {
                    break;
                }
                page += 1;

                uris.extend(
                    entries
                        .iter()
                        .filter(|entry| has_extension(Path::new(&entry.path), &extension))
                        .map(|entry| {
                            format!(
                                "{}/blobs/{}/raw",
                                remote.api_base.trim_end_matches('/'),
                                entry.id
                            )
                        }),
                );
            }
        }

        uris.insert(0, remote.canonical_uri.clone());
        Ok(uris)
    }

    /// Protocol documents found under the configured local directories.
    ///
    /// Missing directories contribute nothing.
    pub fn get_local_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for dir in &self.config.local_dirs {
            info!("Searching for local files in {:?}", dir);
            files.extend(
                WalkDir::new(dir)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|entry| entry.file_type().is_file())
                    .filter(|entry| has_extension(entry.path(), &self.config.extension))
                    .map(walkdir::DirEntry::into_path),
            );
        }
        files
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext == extension)
}

/// `interface.member(name: type, ...)`
fn signature(interface: &str, member: &str, args: &[Arg]) -> String {
    let args: Vec<String> = args
        .iter()
        .map(|arg| format!("{}: {}", arg.name, arg.arg_type))
        .collect();
    format!("{}.{}({})", interface, member, args.join(", "))
}

/// Opcode for the member appended after `count` existing ones
fn next_opcode(count: usize, interface: &str, kind: &'static str) -> Result<u16, SchemaError> {
    u16::try_from(count).map_err(|_| SchemaError::TooManyMembers {
        interface: interface.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    const CORE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<protocol name="core">
  <interface name="wl_registry" version="2">
    <description summary="global registry object">
      The singleton global registry object.
      Clients bind to globals.
    </description>
    <request name="bind">
      <description summary="bind an object to the display"/>
      <arg name="name" type="uint" summary="unique numeric name of the object"/>
      <arg name="id" type="new_id" summary="bounded object"/>
    </request>
    <event name="global">
      <arg name="name" type="uint"/>
      <arg name="interface" type="string"/>
      <arg name="version" type="uint"/>
    </event>
    <request name="sync">
      <arg name="callback" type="new_id" interface="wl_callback"/>
    </request>
    <enum name="error">
      <entry name="invalid" value="0"/>
    </enum>
    <event name="global_remove">
      <arg name="name" type="uint"/>
    </event>
    <request name="destroy" type="destructor"/>
  </interface>
  <interface name="wl_callback" version="1">
    <event name="done">
      <arg name="callback_data" type="uint"/>
    </event>
  </interface>
</protocol>
"#;

    fn compile(document: &str) -> Result<Schema, SchemaError> {
        let mut compiler = SchemaCompiler::new();
        compiler.parse_document(document)?;
        Ok(compiler.into_schema())
    }

    fn wrap(body: &str) -> String {
        format!(r#"<protocol name="test"><interface name="x" version="4">{}</interface></protocol>"#, body)
    }

    #[test]
    fn test_opcodes_follow_document_order() {
        let schema = compile(CORE).unwrap();
        let registry = schema.interface("wl_registry").unwrap();

        let requests: Vec<(&str, u16)> = registry
            .requests
            .iter()
            .map(|r| (r.name.as_str(), r.opcode))
            .collect();
        assert_eq!(requests, [("bind", 0), ("sync", 1), ("destroy", 2)]);

        let events: Vec<(&str, u16)> = registry
            .events
            .iter()
            .map(|e| (e.name.as_str(), e.opcode))
            .collect();
        assert_eq!(events, [("global", 0), ("global_remove", 1)]);

        assert!(registry.request("destroy").unwrap().is_destructor());
        assert_eq!(schema.interface("wl_callback").unwrap().events[0].opcode, 0);
    }

    #[test]
    fn test_interleaved_members_do_not_shift_opcodes() {
        let schema = compile(&wrap(
            r#"<request name="r1"/><event name="e1"/><enum name="k"><entry name="a" value="1"/></enum>
               <request name="r2"/><event name="e2"/><request name="r3"/>"#,
        ))
        .unwrap();
        let x = schema.interface("x").unwrap();

        assert_eq!(x.request("r1").unwrap().opcode, 0);
        assert_eq!(x.request("r2").unwrap().opcode, 1);
        assert_eq!(x.request("r3").unwrap().opcode, 2);
        assert_eq!(x.event("e2").unwrap().opcode, 1);
    }

    #[test]
    fn test_interface_metadata() {
        let schema = compile(CORE).unwrap();
        let registry = schema.interface("wl_registry").unwrap();

        assert_eq!(registry.version, "2");
        assert_eq!(
            registry.description.as_deref(),
            Some("global registry object\n\nThe singleton global registry object.\nClients bind to globals.\n")
        );
        assert_eq!(
            registry.request("bind").unwrap().description.as_deref(),
            Some("bind an object to the display")
        );
    }

    #[test]
    fn test_default_version() {
        let schema = compile(
            r#"<protocol name="p"><interface name="y"><request name="r"/></interface></protocol>"#,
        )
        .unwrap();
        let y = schema.interface("y").unwrap();

        assert_eq!(y.version, "1");
        assert_eq!(y.description.as_deref(), Some(""));
    }

    #[test]
    fn test_metadata_first_document_wins() {
        let mut compiler = SchemaCompiler::new();
        compiler
            .parse_document(r#"<protocol name="a"><interface name="z" version="3"><request name="one"/></interface></protocol>"#)
            .unwrap();
        compiler
            .parse_document(r#"<protocol name="b"><interface name="z" version="9"><request name="two"/></interface></protocol>"#)
            .unwrap();

        let z = compiler.schema().interface("z").unwrap();
        assert_eq!(z.version, "3");
        assert_eq!(z.request("two").unwrap().opcode, 1);
        assert_eq!(compiler.protocol_name(), "b");
    }

    #[test]
    fn test_event_request_collision() {
        let err = compile(&wrap(r#"<request name="done"/><event name="done"/>"#)).unwrap_err();

        match err {
            SchemaError::EventRequestCollision { interface, name } => {
                assert_eq!(interface, "x");
                assert_eq!(name, "done");
            }
            other => panic!("wrong error: {:?}", other),
        }
    }

    #[test]
    fn test_collision_stops_accumulation() {
        let mut compiler = SchemaCompiler::new();
        let result = compiler.parse_document(&wrap(
            r#"<request name="done"/><event name="first"/><event name="done"/><event name="after"/>"#,
        ));

        assert!(result.is_err());
        let x = compiler.schema().interface("x").unwrap();
        assert_eq!(x.events.len(), 1);
        assert!(x.event("done").is_none());
        assert!(x.event("after").is_none());
    }

    #[test]
    fn test_reserved_identifiers_renamed() {
        let schema = compile(&wrap(
            r#"<request name="move"><arg name="type" type="uint"/></request>
               <event name="async"/>
               <enum name="type"><entry name="fn" value="0x1"/></enum>"#,
        ))
        .unwrap();
        let x = schema.interface("x").unwrap();

        let request = x.request("move_").unwrap();
        assert_eq!(request.args[0].name, "type_");
        assert_eq!(request.signature.as_deref(), Some("x.move(type_: uint)"));
        assert!(x.event("async_").is_some());
        let kind = x.enumeration("type_").unwrap();
        assert_eq!(kind.entries[0].name, "fn_");
    }

    #[test]
    fn test_renamed_event_collides_with_renamed_request() {
        let err = compile(&wrap(r#"<request name="loop"/><event name="loop"/>"#)).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::EventRequestCollision { ref name, .. } if name == "loop_"
        ));
    }

    #[test]
    fn test_dynamic_new_id_synthesis() {
        let schema = compile(CORE).unwrap();
        let bind = schema.interface("wl_registry").unwrap().request("bind").unwrap();

        let args: Vec<(&str, ArgType)> = bind.args.iter().map(|a| (a.name.as_str(), a.arg_type)).collect();
        assert_eq!(
            args,
            [
                ("name", ArgType::Uint),
                ("id", ArgType::NewId),
                ("interface", ArgType::String),
                ("version", ArgType::Uint),
            ]
        );
        assert_eq!(
            bind.signature.as_deref(),
            Some("wl_registry.bind(name: uint, id: new_id, interface: string, version: uint)")
        );

        // Typed new_id stays untouched
        let sync = schema.interface("wl_registry").unwrap().request("sync").unwrap();
        assert_eq!(sync.args.len(), 1);
        assert_eq!(sync.args[0].interface.as_deref(), Some("wl_callback"));
    }

    #[test]
    fn test_opcode_space_exhausted() {
        assert_eq!(next_opcode(0, "wl_big", "request").unwrap(), 0);
        assert_eq!(next_opcode(65535, "wl_big", "request").unwrap(), u16::MAX);

        let err = next_opcode(65536, "wl_big", "event").unwrap_err();
        assert!(matches!(
            err,
            SchemaError::TooManyMembers { ref interface, kind: "event" } if interface == "wl_big"
        ));
    }

    #[test]
    fn test_dynamic_new_id_event_rejected() {
        let err = compile(&wrap(r#"<event name="spawn"><arg name="id" type="new_id"/></event>"#))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DynamicNewIdEvent { .. }));
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(parse_value("10"), Some(10));
        assert_eq!(parse_value("0xA"), Some(10));
        assert_eq!(parse_value("0b1010"), Some(10));
        assert_eq!(parse_value("ten"), None);

        let schema = compile(&wrap(
            r#"<enum name="k" bitfield="true">
                 <entry name="a" value="10"/><entry name="b" value="0xA"/><entry name="c" value="0b1010"/>
               </enum>"#,
        ))
        .unwrap();
        let k = schema.interface("x").unwrap().enumeration("k").unwrap();
        assert!(k.bitfield);
        assert!(k.entries.iter().all(|entry| entry.value == 10));
    }

    #[test]
    fn test_invalid_enum_value() {
        let err = compile(&wrap(r#"<enum name="k"><entry name="a" value="zz"/></enum>"#)).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidEnumValue { .. }));
    }

    #[test]
    fn test_unknown_arg_type() {
        let err = compile(&wrap(r#"<request name="r"><arg name="a" type="float"/></request>"#))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownArgType(_)));
    }

    #[test]
    fn test_minimise_round_trip() {
        let mut compiler = SchemaCompiler::new();
        compiler.parse_document(CORE).unwrap();
        let before = compiler.schema().clone();

        let compact = compiler.to_json(true).unwrap();
        for key in ["\"description\"", "\"signature\"", "\"summary\""] {
            assert!(!compact.contains(key), "{} left in minimised output", key);
        }

        let full = compiler.to_json(false).unwrap();
        for key in ["\"description\"", "\"signature\"", "\"summary\""] {
            assert!(full.contains(key), "{} missing from full output", key);
        }
        assert_eq!(compiler.schema(), &before);
    }

    #[test]
    fn test_blank_input_is_noop() {
        let mut compiler = SchemaCompiler::new();
        compiler.parse("   ").unwrap();
        assert!(compiler.schema().is_empty());
    }

    #[test]
    fn test_parse_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.xml");
        std::fs::write(&path, CORE).unwrap();

        let mut compiler = SchemaCompiler::new();
        compiler.parse(path.to_str().unwrap()).unwrap();
        assert_eq!(compiler.schema().len(), 2);
        assert_eq!(compiler.protocol_name(), "core");

        let err = compiler.parse(dir.path().join("nope.xml").to_str().unwrap()).unwrap_err();
        assert!(matches!(err, SchemaError::Io { .. }));
    }

    #[test]
    fn test_local_discovery() {
        let root = tempfile::tempdir().unwrap();
        let stable = root.path().join("stable/xdg-shell");
        std::fs::create_dir_all(&stable).unwrap();
        std::fs::write(stable.join("xdg-shell.xml"), CORE).unwrap();
        std::fs::write(stable.join("README.md"), "docs").unwrap();
        std::fs::write(root.path().join("wayland.xml"), CORE).unwrap();

        let config = ProtocolConfig {
            local_dirs: vec![root.path().to_path_buf(), root.path().join("does-not-exist")],
            ..ProtocolConfig::default()
        };
        let compiler = SchemaCompiler::with_config(config);
        let files = compiler.get_local_files();

        assert_eq!(
            files,
            vec![stable.join("xdg-shell.xml"), root.path().join("wayland.xml")]
        );
    }

    /// Serve canned HTTP responses: `handler` maps a request line to
    /// `(status, body)`.
    fn serve(handler: fn(&str) -> (u16, String)) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                }
                let (status, body) = handler(&request_line);
                write!(
                    stream,
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                )
                .unwrap();
            }
        });
        format!("http://{}", addr)
    }

    fn remote_compiler(base: &str) -> SchemaCompiler {
        let config = ProtocolConfig {
            remote: RemoteConfig {
                api_base: format!("{}/api", base),
                canonical_uri: "https://example.org/wayland.xml".into(),
                ..RemoteConfig::default()
            },
            ..ProtocolConfig::default()
        };
        let client = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
        SchemaCompiler::with_config(config).with_http_client(client)
    }

    #[test]
    fn test_remote_discovery_paginates() {
        let base = serve(|line| {
            let body = if line.contains("path=staging") && line.contains("page=1&") {
                r#"[{"id":"aaa","path":"staging/foo/foo-v1.xml"},{"id":"bbb","path":"staging/foo/README.md"}]"#
            } else if line.contains("path=stable") && line.contains("page=1&") {
                r#"[{"id":"ccc","path":"stable/xdg-shell/xdg-shell.xml"}]"#
            } else {
                "[]"
            };
            (200, body.to_string())
        });

        let mut compiler = remote_compiler(&base);
        let uris = compiler.get_remote_uris().unwrap();

        assert_eq!(
            uris,
            vec![
                "https://example.org/wayland.xml".to_string(),
                format!("{}/api/blobs/aaa/raw", base),
                format!("{}/api/blobs/ccc/raw", base),
            ]
        );
    }

    #[test]
    fn test_remote_error_is_fatal() {
        let base = serve(|_| (500, "oops".to_string()));

        let mut compiler = remote_compiler(&base);
        let err = compiler.get_remote_uris().unwrap_err();
        assert!(matches!(err, SchemaError::Http(_)));
    }

    #[test]
    fn test_parse_remote_document() {
        let base = serve(|_| (200, CORE.to_string()));

        let mut compiler = remote_compiler(&base);
        compiler.parse(&format!("{}/core.xml", base)).unwrap();
        assert!(compiler.schema().interface("wl_registry").is_some());
    }
}

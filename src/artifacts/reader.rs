use roxmltree::{Document, Node, ParsingOptions};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{load_owned, ArtifactError};
use crate::object_store::ObjectStoreError;
use crate::storage::models::{ArtifactRecord, FileType};
use crate::AppState;

const ATTR_KEY: &str = "$";
const TEXT_KEY: &str = "_";

/// Parsed file content, serialized under the field name clients expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ParsedContent {
    #[serde(rename = "geoJSON")]
    GeoJson(Value),
    #[serde(rename = "kmlData")]
    Kml(Value),
}

/// Load a record's content from the object store and parse it by declared type.
pub async fn read_artifact(
    state: &AppState,
    record: &ArtifactRecord,
) -> Result<ParsedContent, ArtifactError> {
    let data = state
        .object_store
        .get(&record.storage_key)
        .await
        .map_err(ArtifactError::storage("Error reading the file"))?;

    parse_content(record.file_type, &data)
}

/// Load and parse a record the caller owns.
///
/// These reads take no key lock, so a rename can move the file between
/// loading the record and opening its content. A missing file is retried
/// once against the reloaded record.
pub async fn read_owned(
    state: &AppState,
    id: &str,
    owner_id: &str,
) -> Result<(ArtifactRecord, ParsedContent), ArtifactError> {
    let record = load_owned(state, id, owner_id)?;
    read_following_moves(state, record).await
}

/// [`read_owned`] for GeoJSON maps.
pub async fn read_owned_map(
    state: &AppState,
    id: &str,
    owner_id: &str,
) -> Result<(ArtifactRecord, Value), ArtifactError> {
    let record = load_owned(state, id, owner_id)?;
    ensure_map(&record)?;
    let (record, content) = read_following_moves(state, record).await?;
    Ok((record, content.into_value()))
}

async fn read_following_moves(
    state: &AppState,
    record: ArtifactRecord,
) -> Result<(ArtifactRecord, ParsedContent), ArtifactError> {
    let err = match read_artifact(state, &record).await {
        Ok(content) => return Ok((record, content)),
        Err(e) => e,
    };
    if !matches!(
        err,
        ArtifactError::Storage {
            source: ObjectStoreError::NotFound(_),
            ..
        }
    ) {
        return Err(err);
    }

    let current = load_owned(state, &record.id, &record.owner_id)?;
    if current.storage_key == record.storage_key {
        return Err(err);
    }
    tracing::debug!(
        artifact_id = %record.id,
        from = %record.storage_key,
        to = %current.storage_key,
        "Content moved during read, retrying"
    );
    let content = read_artifact(state, &current).await?;
    Ok((current, content))
}

fn ensure_map(record: &ArtifactRecord) -> Result<(), ArtifactError> {
    if record.file_type != FileType::GeoJson {
        return Err(ArtifactError::Validation(format!(
            "File is {}, not a GeoJSON map",
            record.file_type
        )));
    }
    Ok(())
}

impl ParsedContent {
    pub fn into_value(self) -> Value {
        match self {
            ParsedContent::GeoJson(value) | ParsedContent::Kml(value) => value,
        }
    }
}

/// KML is parsed as XML; every other declared type is treated as JSON text.
pub fn parse_content(file_type: FileType, data: &[u8]) -> Result<ParsedContent, ArtifactError> {
    match file_type {
        FileType::Kml => {
            let text = std::str::from_utf8(data).map_err(|e| ArtifactError::Parse {
                context: "Error parsing KML file",
                detail: e.to_string(),
            })?;
            kml_to_json(text)
                .map(ParsedContent::Kml)
                .map_err(|e| ArtifactError::Parse {
                    context: "Error parsing KML file",
                    detail: e.to_string(),
                })
        }
        FileType::GeoJson | FileType::Tiff => serde_json::from_slice(data)
            .map(ParsedContent::GeoJson)
            .map_err(|e| ArtifactError::Parse {
                context: "Error parsing file as JSON",
                detail: e.to_string(),
            }),
    }
}

/// Convert an XML document into a JSON tree.
///
/// The root element becomes a single-key object. Attributes are collected
/// under `"$"`, child elements are grouped by tag name into arrays, and text
/// content is a plain string for bare elements or sits under `"_"` next to
/// attributes and children. Whitespace-only text between elements is dropped.
/// A `<!DOCTYPE>` prolog is accepted.
pub fn kml_to_json(text: &str) -> Result<Value, roxmltree::Error> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options)?;
    let root = doc.root_element();

    let mut wrapper = Map::new();
    wrapper.insert(qualified_name(root), element_to_json(root));
    Ok(Value::Object(wrapper))
}

fn qualified_name(node: Node) -> String {
    let local = node.tag_name().name();
    match node
        .tag_name()
        .namespace()
        .and_then(|ns| node.lookup_prefix(ns))
    {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
        _ => local.to_string(),
    }
}

fn attributes(node: Node) -> Map<String, Value> {
    let mut attrs = Map::new();

    // Namespace declarations made on this element (not inherited ones)
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();
    for ns in node.namespaces() {
        if ns.name() == Some("xml") || inherited.contains(&(ns.name(), ns.uri())) {
            continue;
        }
        let key = match ns.name() {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        attrs.insert(key, Value::String(ns.uri().to_string()));
    }

    for attr in node.attributes() {
        let key = match attr.namespace().and_then(|ns| node.lookup_prefix(ns)) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", attr.name()),
            _ => attr.name().to_string(),
        };
        attrs.insert(key, Value::String(attr.value().to_string()));
    }
    attrs
}

fn element_to_json(node: Node) -> Value {
    let attrs = attributes(node);
    let mut text = String::new();
    let mut children: Map<String, Value> = Map::new();

    for child in node.children() {
        if child.is_element() {
            let entry = children
                .entry(qualified_name(child))
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = entry {
                items.push(element_to_json(child));
            }
        } else if child.is_text() {
            if let Some(t) = child.text() {
                text.push_str(t);
            }
        }
    }

    let has_text = !text.trim().is_empty();
    if attrs.is_empty() && children.is_empty() {
        return Value::String(if has_text { text } else { String::new() });
    }

    let mut obj = Map::new();
    if !attrs.is_empty() {
        obj.insert(ATTR_KEY.to_string(), Value::Object(attrs));
    }
    if has_text {
        obj.insert(TEXT_KEY.to_string(), Value::String(text));
    }
    for (name, items) in children {
        obj.insert(name, items);
    }
    Value::Object(obj)
}

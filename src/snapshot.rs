use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::*;

/// The persisted unit shared by local files, the content-store blob and the
/// publish store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    #[serde(default)]
    pub positions: BTreeMap<String, Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeMap<String, GroupRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<EdgeRecord>>,
    /// Node assignments that differ from the catalog table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parents: BTreeMap<String, String>,
}

impl LayoutSnapshot {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
            && self.groups.as_ref().is_none_or(BTreeMap::is_empty)
            && self.edges.as_ref().is_none_or(Vec::is_empty)
            && self.parents.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Group geometry and metadata. Every field is optional so that a saved
/// layout can override only what changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_subgroup: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
}

impl GroupRecord {
    /// Shallow merge onto a live group; fields absent from the record are kept.
    pub fn apply_to(&self, group: &mut GroupNode) {
        if let Some(label) = &self.label {
            group.label = label.clone();
        }
        if let Some(section) = self.section {
            group.section = section;
        }
        if let Some(depth) = self.depth {
            group.depth = depth;
        }
        if let Some(parent_id) = &self.parent_id {
            group.parent_id = parent_id.clone();
        }
        if let Some(position) = self.position {
            group.position = position;
        }
        if let Some(size) = self.size {
            group.size = size;
        }
    }

    fn from_spec(spec: &GroupSpec) -> Self {
        Self {
            label: Some(spec.label.clone()),
            section: Some(spec.section),
            depth: Some(spec.depth),
            parent_id: Some(spec.parent_id.clone()),
            is_subgroup: Some(spec.is_subgroup),
            position: Some(spec.position),
            size: Some(spec.size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default, alias = "sourceAttachment", deserialize_with = "lenient_attachment")]
    pub source_handle: Option<Attachment>,
    #[serde(default, alias = "targetAttachment", deserialize_with = "lenient_attachment")]
    pub target_handle: Option<Attachment>,
    #[serde(default)]
    pub control_point: Option<Point>,
}

impl From<&EdgeSpec> for EdgeRecord {
    fn from(spec: &EdgeSpec) -> Self {
        Self {
            id: Some(spec.id.clone()),
            source: spec.source.clone(),
            target: spec.target.clone(),
            source_handle: Some(spec.source_attachment.clone()),
            target_handle: Some(spec.target_attachment.clone()),
            control_point: spec.control_point,
        }
    }
}

impl From<&Edge> for EdgeRecord {
    fn from(edge: &Edge) -> Self {
        Self {
            id: Some(edge.id.clone()),
            source: edge.source.clone(),
            target: edge.target.clone(),
            source_handle: Some(edge.source_attachment.clone()),
            target_handle: Some(edge.target_attachment.clone()),
            control_point: edge.control_point,
        }
    }
}

/// Distinguishes `"parentId": null` (clear the parent) from a missing key.
fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Unknown handle names fall back to the default attachment instead of
/// rejecting the whole layout.
fn lenient_attachment<'de, D>(deserializer: D) -> Result<Option<Attachment>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.parse().ok()))
}

impl Graph {
    /// Flattens the live graph into a snapshot. Positions and group geometry
    /// are rounded to whole canvas units; control points are kept as-is.
    pub fn flatten(&self) -> LayoutSnapshot {
        let positions = self
            .nodes
            .iter()
            .map(|node| (node.id().to_string(), node.position.round()))
            .collect();

        let groups = self
            .groups
            .iter()
            .map(|group| {
                let mut record = self
                    .catalog
                    .group(&group.id)
                    .map(GroupRecord::from_spec)
                    .unwrap_or_default();
                record.label = Some(group.label.clone());
                record.section = Some(group.section);
                record.depth = Some(group.depth);
                record.parent_id = Some(group.parent_id.clone());
                record.position = Some(group.position.round());
                record.size = Some(group.size.round());
                (group.id.clone(), record)
            })
            .collect();

        let edges = self.edges.iter().map(EdgeRecord::from).collect();

        let parents = self
            .nodes
            .iter()
            .filter_map(|node| {
                let current = node.parent_group_id.as_deref()?;
                (self.catalog.parent_of(node.id()) != Some(current))
                    .then(|| (node.id().to_string(), current.to_string()))
            })
            .collect();

        LayoutSnapshot {
            positions,
            groups: Some(groups),
            edges: Some(edges),
            parents,
        }
    }
}

/// Accepts the canonical `{positions, groups, edges}` shape, the legacy
/// `{nodes: positions}` shape, or a bare `{id: {x, y}}` map.
pub fn normalize_import(text: &str) -> Result<LayoutSnapshot, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(object) = value else {
        return Err(ImportError::UnrecognisedShape(format!(
            "expected a JSON object, found {}",
            json_kind(&value)
        )));
    };

    const CANONICAL_KEYS: [&str; 4] = ["positions", "groups", "edges", "parents"];
    if CANONICAL_KEYS.iter().any(|key| object.contains_key(*key)) {
        return Ok(serde_json::from_value(Value::Object(object))?);
    }

    // a node that happens to be called "nodes" still reads as a bare map
    if let Some(nodes) = object.get("nodes").filter(|nodes| !looks_like_point(nodes)) {
        let Value::Object(nodes) = nodes else {
            return Err(ImportError::UnrecognisedShape(
                "legacy 'nodes' entry must be an object".into(),
            ));
        };
        return Ok(LayoutSnapshot {
            positions: parse_position_map(nodes)?,
            ..LayoutSnapshot::default()
        });
    }

    Ok(LayoutSnapshot {
        positions: parse_position_map(&object)?,
        ..LayoutSnapshot::default()
    })
}

fn parse_position_map(map: &Map<String, Value>) -> Result<BTreeMap<String, Point>, ImportError> {
    map.iter()
        .map(|(id, value)| {
            if !looks_like_point(value) {
                return Err(ImportError::UnrecognisedShape(format!(
                    "entry '{id}' is not an {{x, y}} position"
                )));
            }
            Ok((id.clone(), serde_json::from_value(value.clone())?))
        })
        .collect()
}

fn looks_like_point(value: &Value) -> bool {
    value.get("x").is_some_and(Value::is_number) && value.get("y").is_some_and(Value::is_number)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Download name for a locally exported layout.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("roadmap-layout-{}.json", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn bare_position_map_is_normalised() {
        let snapshot = normalize_import(r#"{"a": {"x": 1, "y": 2}}"#).unwrap();
        assert_eq!(snapshot.positions.get("a"), Some(&Point::new(1.0, 2.0)));
        assert_eq!(snapshot.groups, None);
        assert_eq!(snapshot.edges, None);
    }

    #[test]
    fn legacy_nodes_shape_is_normalised() {
        let snapshot = normalize_import(r#"{"nodes": {"a": {"x": 5, "y": 6}}}"#).unwrap();
        assert_eq!(snapshot.positions.get("a"), Some(&Point::new(5.0, 6.0)));
        assert_eq!(snapshot.groups, None);
    }

    #[test]
    fn a_node_named_nodes_is_still_a_bare_map() {
        let snapshot =
            normalize_import(r#"{"nodes": {"x": 1, "y": 2}, "b": {"x": 3, "y": 4}}"#).unwrap();
        assert_eq!(snapshot.positions.len(), 2);
        assert_eq!(snapshot.positions.get("nodes"), Some(&Point::new(1.0, 2.0)));
    }

    #[test]
    fn canonical_shape_is_read_verbatim() {
        let text = r#"{
            "positions": {"a": {"x": 1, "y": 1}},
            "groups": {"sec_basic": {"position": {"x": 3, "y": 4}, "parentId": null}},
            "edges": [{"id": "e", "source": "a", "target": "sec_basic",
                       "sourceHandle": "right-src", "targetAttachment": "left",
                       "controlPoint": {"x": 1.5, "y": 2.5}}]
        }"#;
        let snapshot = normalize_import(text).unwrap();
        let group = &snapshot.groups.as_ref().unwrap()["sec_basic"];
        assert_eq!(group.parent_id, Some(None));
        assert_eq!(group.label, None);
        let edge = &snapshot.edges.as_ref().unwrap()[0];
        assert_eq!(edge.source_handle, Some(Attachment::with_slot(Side::Right, "src")));
        assert_eq!(edge.target_handle, Some(Attachment::new(Side::Left)));
        assert_eq!(edge.control_point, Some(Point::new(1.5, 2.5)));
    }

    #[test]
    fn malformed_imports_are_rejected() {
        assert!(matches!(normalize_import("not json"), Err(ImportError::Json(_))));
        assert!(matches!(
            normalize_import("[1, 2]"),
            Err(ImportError::UnrecognisedShape(_))
        ));
        assert!(matches!(
            normalize_import(r#"{"a": "left"}"#),
            Err(ImportError::UnrecognisedShape(_))
        ));
    }

    #[test]
    fn flatten_rounds_geometry_and_keeps_catalog_fields() {
        let catalog = Arc::new(Catalog::default_roadmap());
        let mut topic = Topic::new("node_intro", "Intro");
        topic.order = 1.0;
        let mut graph = Graph::build(catalog, &[topic], None);
        graph.move_node("node_intro", Point::new(10.4, 20.6)).unwrap();

        let snapshot = graph.flatten();
        assert_eq!(snapshot.positions["node_intro"], Point::new(10.0, 21.0));

        let groups = snapshot.groups.as_ref().unwrap();
        assert_eq!(groups.len(), 15);
        let tools = &groups["sec_tools_ide"];
        assert_eq!(tools.is_subgroup, Some(true));
        assert_eq!(tools.parent_id, Some(Some("sec_tools".to_string())));
        assert!(snapshot.parents.is_empty());

        let json = snapshot.to_json().unwrap();
        assert!(!json.contains("\"parents\""));
        assert!(json.contains("\"isSubgroup\":true"));
    }

    #[test]
    fn export_name_carries_the_date() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(export_file_name(date), "roadmap-layout-2025-01-15.json");
    }
}

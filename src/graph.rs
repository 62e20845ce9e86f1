use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::*;

/// What an id resolves to inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Content,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub id: String,
    pub label: String,
    pub section: Section,
    pub depth: usize,
    pub parent_id: Option<String>,
    /// Relative to the parent group when `parent_id` is set.
    pub position: Point,
    pub size: Size,
}

impl GroupNode {
    pub fn z_index(&self) -> i32 {
        GROUP_BASE_Z + self.depth as i32 * GROUP_DEPTH_Z_STEP
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentNode {
    pub topic: Topic,
    /// Relative to `parent_group_id` when set, absolute otherwise.
    pub position: Point,
    pub parent_group_id: Option<String>,
    /// Set on freshly created nodes until the presentation layer has opened
    /// the label editor once.
    pub pending_edit: bool,
}

impl ContentNode {
    pub fn id(&self) -> &str {
        &self.topic.id
    }

    pub fn z_index(&self) -> i32 {
        CONTENT_NODE_Z
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_attachment: Attachment,
    pub target_attachment: Attachment,
    /// Canvas-space curvature handle; `None` uses the computed default.
    pub control_point: Option<Point>,
}

impl Edge {
    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

/// The live roadmap: groups (sorted by depth), content nodes and edges, plus
/// the session-scoped `node -> group` assignment table.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) groups: Vec<GroupNode>,
    pub(crate) nodes: Vec<ContentNode>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) node_parents: HashMap<String, String>,
}

impl Graph {
    /// Merges topics, the catalog and an optional saved layout into one graph.
    ///
    /// Positions: override, then catalog default, then a grid slot derived
    /// from the topic index. Groups: catalog entries with override fields laid
    /// on top; override keys missing from the catalog are ignored. Edges: a
    /// non-empty override list replaces the catalog list; edges whose
    /// endpoints are absent are dropped.
    pub fn build(catalog: Arc<Catalog>, topics: &[Topic], overrides: Option<&LayoutSnapshot>) -> Self {
        let groups = merge_groups(&catalog, overrides.and_then(|o| o.groups.as_ref()));
        let group_ids: HashSet<&str> = groups.iter().map(|g| g.id.as_str()).collect();

        let mut node_parents: HashMap<String, String> = catalog.node_parents.clone();
        if let Some(overrides) = overrides {
            for (node, group) in &overrides.parents {
                if group_ids.contains(group.as_str()) {
                    node_parents.insert(node.clone(), group.clone());
                } else {
                    warn!("ignoring saved parent '{group}' for '{node}': no such group");
                }
            }
        }

        let mut nodes: Vec<ContentNode> = Vec::with_capacity(topics.len());
        let mut seen: HashSet<&str> = HashSet::new();
        for (index, topic) in topics.iter().enumerate() {
            if group_ids.contains(topic.id.as_str()) {
                warn!("topic '{}' collides with a group id; skipping", topic.id);
                continue;
            }
            if !seen.insert(topic.id.as_str()) {
                warn!("duplicate topic id '{}'; keeping the first", topic.id);
                continue;
            }

            let position = overrides
                .and_then(|o| o.positions.get(&topic.id))
                .or_else(|| catalog.positions.get(&topic.id))
                .copied()
                .unwrap_or_else(|| fallback_position(index));

            let parent_group_id = node_parents
                .get(&topic.id)
                .filter(|group| group_ids.contains(group.as_str()))
                .cloned();

            nodes.push(ContentNode {
                topic: topic.clone(),
                position,
                parent_group_id,
                pending_edit: false,
            });
        }

        let mut graph = Self {
            catalog,
            groups,
            nodes,
            edges: Vec::new(),
            node_parents,
        };

        let candidates = match overrides.and_then(|o| o.edges.as_ref()) {
            Some(edges) if !edges.is_empty() => edges.clone(),
            _ => graph.catalog.edges.iter().map(EdgeRecord::from).collect(),
        };
        graph.edges = graph.resolve_edges(candidates);
        graph
    }

    fn resolve_edges(&self, records: Vec<EdgeRecord>) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(records.len());
        let mut ids: HashSet<String> = HashSet::new();
        let mut stale = 0usize;

        for (index, record) in records.into_iter().enumerate() {
            if !self.contains(&record.source) || !self.contains(&record.target) {
                stale += 1;
                continue;
            }
            let id = record.id.unwrap_or_else(|| format!("edge-{index}"));
            if !ids.insert(id.clone()) {
                warn!("duplicate edge id '{id}'; keeping the first");
                continue;
            }
            edges.push(Edge {
                id,
                source: record.source,
                target: record.target,
                source_attachment: record
                    .source_handle
                    .unwrap_or_else(Attachment::default_source),
                target_attachment: record
                    .target_handle
                    .unwrap_or_else(Attachment::default_target),
                control_point: record.control_point,
            });
        }

        if stale > 0 {
            debug!("dropped {stale} edge(s) referencing missing endpoints");
        }
        edges
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn shared_catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    pub fn groups(&self) -> &[GroupNode] {
        &self.groups
    }

    pub fn nodes(&self) -> &[ContentNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn group(&self, id: &str) -> Option<&GroupNode> {
        self.groups.iter().find(|group| group.id == id)
    }

    pub fn node(&self, id: &str) -> Option<&ContentNode> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    pub fn kind_of(&self, id: &str) -> Option<NodeKind> {
        if self.group(id).is_some() {
            Some(NodeKind::Group)
        } else if self.node(id).is_some() {
            Some(NodeKind::Content)
        } else {
            None
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.kind_of(id).is_some()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.nodes.iter().map(|node| node.topic.clone()).collect()
    }

    pub fn assigned_group(&self, node_id: &str) -> Option<&str> {
        self.node_parents.get(node_id).map(String::as_str)
    }

    pub fn children_of(&self, group_id: &str) -> Vec<&ContentNode> {
        self.nodes
            .iter()
            .filter(|node| node.parent_group_id.as_deref() == Some(group_id))
            .collect()
    }

    pub fn subgroups_of(&self, group_id: &str) -> Vec<&GroupNode> {
        self.groups
            .iter()
            .filter(|group| group.parent_id.as_deref() == Some(group_id))
            .collect()
    }

    pub fn edges_touching(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|edge| edge.touches(id)).collect()
    }

    pub fn absolute_position(&self, id: &str) -> Option<Point> {
        match self.kind_of(id)? {
            NodeKind::Group => {
                let group = self.group(id)?;
                let base = match &group.parent_id {
                    Some(parent) => self.absolute_position(parent)?,
                    None => Point::default(),
                };
                Some(base.translate(group.position))
            }
            NodeKind::Content => {
                let node = self.node(id)?;
                let base = match &node.parent_group_id {
                    Some(parent) => self.absolute_position(parent)?,
                    None => Point::default(),
                };
                Some(base.translate(node.position))
            }
        }
    }

    /// Raw canvas-space handle coordinate. Content nodes use `measured` when
    /// the renderer knows their size, else the nominal node box.
    pub fn handle_point(&self, id: &str, side: Side, measured: Option<Size>) -> Option<Point> {
        let origin = self.absolute_position(id)?;
        let size = match self.kind_of(id)? {
            NodeKind::Group => self.group(id)?.size,
            NodeKind::Content => measured.unwrap_or(Size::new(NODE_WIDTH, NODE_HEIGHT)),
        };
        Some(side.handle_on(origin, size))
    }

    /// Renderable curve for an edge, using measured content-node sizes when
    /// available.
    pub fn edge_path(&self, edge_id: &str, measured: &HashMap<String, Size>) -> Option<EdgePath> {
        let edge = self.edge(edge_id)?;
        let source_side = edge.source_attachment.side;
        let target_side = edge.target_attachment.side;
        let source = self.handle_point(&edge.source, source_side, measured.get(&edge.source).copied())?;
        let target = self.handle_point(&edge.target, target_side, measured.get(&edge.target).copied())?;
        Some(compute_path(
            Anchor::new(source, source_side),
            Anchor::new(target, target_side),
            edge.control_point,
        ))
    }
}

pub fn fallback_position(index: usize) -> Point {
    let column = (index % FALLBACK_COLUMNS) as f64;
    let row = (index / FALLBACK_COLUMNS) as f64;
    Point::new(
        FALLBACK_ORIGIN_X + column * FALLBACK_COLUMN_SPACING,
        FALLBACK_ORIGIN_Y + row * FALLBACK_ROW_SPACING,
    )
}

fn merge_groups(catalog: &Catalog, overrides: Option<&BTreeMap<String, GroupRecord>>) -> Vec<GroupNode> {
    let mut groups: Vec<GroupNode> = catalog
        .groups
        .iter()
        .map(|(id, spec)| GroupNode {
            id: id.clone(),
            label: spec.label.clone(),
            section: spec.section,
            depth: spec.depth,
            parent_id: spec.parent_id.clone(),
            position: spec.position,
            size: spec.size,
        })
        .collect();

    if let Some(overrides) = overrides {
        for (id, record) in overrides {
            match groups.iter_mut().find(|group| &group.id == id) {
                Some(group) => record.apply_to(group),
                None => debug!("ignoring layout for unknown group '{id}'"),
            }
        }
    }

    let known: HashSet<String> = groups.iter().map(|g| g.id.clone()).collect();
    let invalid = |group: &GroupNode| match &group.parent_id {
        Some(parent) => parent == &group.id || !known.contains(parent),
        None => false,
    };
    for group in &mut groups {
        if invalid(&*group) {
            warn!("group '{}' has an invalid parent; restoring catalog parent", group.id);
            group.parent_id = catalog.group(&group.id).and_then(|spec| spec.parent_id.clone());
        }
        if invalid(&*group) {
            warn!("catalog parent of group '{}' is invalid; detaching it", group.id);
            group.parent_id = None;
        }
    }

    assign_depths(catalog, &mut groups);
    groups.sort_by_key(|group| group.depth);
    groups
}

/// Recomputes every depth from the parent chain so that
/// `depth == parent.depth + 1` always holds. Overridden parent links found on
/// a cycle fall back to the catalog's; a cycle the catalog itself contains is
/// cut by detaching its groups.
fn assign_depths(catalog: &Catalog, groups: &mut [GroupNode]) {
    loop {
        let parents: HashMap<String, Option<String>> = groups
            .iter()
            .map(|g| (g.id.clone(), g.parent_id.clone()))
            .collect();

        let depths: Result<HashMap<String, usize>, Vec<String>> = groups
            .iter()
            .map(|group| depth_or_cycle(&parents, &group.id).map(|depth| (group.id.clone(), depth)))
            .collect();

        let chain = match depths {
            Ok(depths) => {
                for group in groups.iter_mut() {
                    if let Some(&depth) = depths.get(&group.id) {
                        if depth != group.depth {
                            debug!("group '{}' depth corrected {} -> {}", group.id, group.depth, depth);
                        }
                        group.depth = depth;
                    }
                }
                return;
            }
            Err(chain) => chain,
        };

        let mut restored = false;
        for group in groups.iter_mut().filter(|g| chain.contains(&g.id)) {
            let original = catalog.group(&group.id).and_then(|spec| spec.parent_id.clone());
            if group.parent_id != original {
                warn!("group '{}' is part of a containment cycle; restoring catalog parent", group.id);
                group.parent_id = original;
                restored = true;
            }
        }
        if !restored {
            for group in groups.iter_mut().filter(|g| chain.contains(&g.id)) {
                warn!("group '{}' is part of a catalog containment cycle; detaching it", group.id);
                group.parent_id = None;
            }
        }
    }
}

/// Number of ancestors above `id`, or the ids walked when the chain loops.
fn depth_or_cycle(parents: &HashMap<String, Option<String>>, id: &str) -> Result<usize, Vec<String>> {
    let mut chain = vec![id.to_string()];
    let mut cursor = parents.get(id).cloned().flatten();
    while let Some(parent) = cursor {
        if let Some(start) = chain.iter().position(|id| id == &parent) {
            return Err(chain.split_off(start));
        }
        cursor = parents.get(&parent).cloned().flatten();
        chain.push(parent);
    }
    Ok(chain.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::empty()
                .with_group("root", "Root", Section::Basic, None, (0.0, 0.0), (600.0, 400.0))
                .with_group("child", "Child", Section::Basic, Some("root"), (20.0, 40.0), (300.0, 200.0))
                .with_group("adv", "Advanced", Section::Advanced, None, (700.0, 0.0), (300.0, 400.0))
                .with_node("A", "child", Some((10.0, 10.0)))
                .with_node("B", "child", Some((60.0, 10.0)))
                .with_node("C", "adv", None)
                .with_edge("e1", "A", "B", ("right-src", "left"), None)
                .with_edge("e2", "B", "C", ("right-src", "left"), Some((1.0, 2.0)))
                .with_edge("e3", "child", "adv", ("right-src", "left"), None),
        )
    }

    fn topics(ids: &[&str]) -> Vec<Topic> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                let mut topic = Topic::new(*id, format!("Topic {id}"));
                topic.order = i as f64;
                topic
            })
            .collect()
    }

    #[test]
    fn override_positions_win_over_catalog_defaults() {
        let mut overrides = LayoutSnapshot::default();
        overrides.positions.insert("A".into(), Point::new(50.0, 50.0));

        let graph = Graph::build(small_catalog(), &topics(&["A", "B"]), Some(&overrides));

        assert_eq!(graph.node("A").unwrap().position, Point::new(50.0, 50.0));
        assert_eq!(graph.node("B").unwrap().position, Point::new(60.0, 10.0));
    }

    #[test]
    fn unplaced_topics_get_grid_slots() {
        let graph = Graph::build(Arc::new(Catalog::empty()), &topics(&["a", "b", "c", "d", "e"]), None);
        assert_eq!(graph.node("a").unwrap().position, Point::new(20.0, 40.0));
        assert_eq!(graph.node("b").unwrap().position, Point::new(140.0, 40.0));
        assert_eq!(graph.node("e").unwrap().position, Point::new(20.0, 120.0));
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn partial_group_override_keeps_catalog_metadata() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "child".to_string(),
            GroupRecord {
                position: Some(Point::new(99.0, 98.0)),
                ..GroupRecord::default()
            },
        );
        groups.insert(
            "ghost".to_string(),
            GroupRecord {
                label: Some("Ghost".into()),
                ..GroupRecord::default()
            },
        );
        let overrides = LayoutSnapshot {
            groups: Some(groups),
            ..LayoutSnapshot::default()
        };

        let graph = Graph::build(small_catalog(), &[], Some(&overrides));
        let child = graph.group("child").unwrap();
        assert_eq!(child.position, Point::new(99.0, 98.0));
        assert_eq!(child.label, "Child");
        assert_eq!(child.section, Section::Basic);
        assert_eq!(child.depth, 1);
        assert!(graph.group("ghost").is_none());
    }

    #[test]
    fn groups_are_emitted_parents_first() {
        let graph = Graph::build(Arc::new(Catalog::default_roadmap()), &[], None);
        let depths: Vec<usize> = graph.groups().iter().map(|g| g.depth).collect();
        let mut sorted = depths.clone();
        sorted.sort();
        assert_eq!(depths, sorted);
        assert_eq!(graph.groups()[0].z_index(), -10);
    }

    #[test]
    fn edges_with_missing_endpoints_are_dropped() {
        let graph = Graph::build(small_catalog(), &topics(&["A", "B"]), None);
        let ids: Vec<&str> = graph.edges().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e3"]);
    }

    #[test]
    fn non_empty_edge_override_replaces_the_catalog() {
        let overrides = LayoutSnapshot {
            edges: Some(vec![EdgeRecord {
                id: None,
                source: "B".into(),
                target: "A".into(),
                source_handle: None,
                target_handle: None,
                control_point: None,
            }]),
            ..LayoutSnapshot::default()
        };
        let graph = Graph::build(small_catalog(), &topics(&["A", "B"]), Some(&overrides));
        assert_eq!(graph.edges().len(), 1);
        let edge = &graph.edges()[0];
        assert_eq!(edge.id, "edge-0");
        assert_eq!(edge.source_attachment, Attachment::default_source());
        assert_eq!(edge.target_attachment, Attachment::default_target());

        let empty = LayoutSnapshot {
            edges: Some(Vec::new()),
            ..LayoutSnapshot::default()
        };
        let graph = Graph::build(small_catalog(), &topics(&["A", "B"]), Some(&empty));
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn parents_come_from_the_assignment_table() {
        let graph = Graph::build(small_catalog(), &topics(&["A", "C", "loose"]), None);
        assert_eq!(graph.node("A").unwrap().parent_group_id.as_deref(), Some("child"));
        assert_eq!(graph.node("C").unwrap().parent_group_id.as_deref(), Some("adv"));
        assert_eq!(graph.node("loose").unwrap().parent_group_id, None);
        assert_eq!(graph.kind_of("child"), Some(NodeKind::Group));
        assert_eq!(graph.kind_of("A"), Some(NodeKind::Content));
        assert_eq!(graph.kind_of("nope"), None);
    }

    #[test]
    fn topics_colliding_with_groups_are_skipped() {
        let graph = Graph::build(small_catalog(), &topics(&["child", "A", "A"]), None);
        assert_eq!(graph.nodes().len(), 1);
        assert_eq!(graph.kind_of("child"), Some(NodeKind::Group));
    }

    #[test]
    fn invalid_parent_overrides_fall_back_and_depths_stay_consistent() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "root".to_string(),
            GroupRecord {
                parent_id: Some(Some("child".into())),
                depth: Some(7),
                ..GroupRecord::default()
            },
        );
        groups.insert(
            "adv".to_string(),
            GroupRecord {
                parent_id: Some(Some("missing".into())),
                ..GroupRecord::default()
            },
        );
        let overrides = LayoutSnapshot {
            groups: Some(groups),
            ..LayoutSnapshot::default()
        };
        let graph = Graph::build(small_catalog(), &[], Some(&overrides));

        for group in graph.groups() {
            match &group.parent_id {
                Some(parent) => assert_eq!(group.depth, graph.group(parent).unwrap().depth + 1),
                None => assert_eq!(group.depth, 0),
            }
        }
        assert_eq!(graph.group("adv").unwrap().parent_id, None);
    }

    #[test]
    fn self_parented_catalog_group_is_detached() {
        let catalog = Catalog::empty()
            .with_group("a", "A", Section::Basic, Some("a"), (0.0, 0.0), (300.0, 200.0))
            .with_group("b", "B", Section::Basic, Some("ghost"), (0.0, 0.0), (300.0, 200.0));
        let graph = Graph::build(Arc::new(catalog), &[], None);

        for id in ["a", "b"] {
            let group = graph.group(id).unwrap();
            assert_eq!(group.parent_id, None);
            assert_eq!(group.depth, 0);
        }
    }

    #[test]
    fn cyclic_catalog_is_cut_instead_of_looping() {
        let catalog = Catalog::empty()
            .with_group("x", "X", Section::Basic, Some("y"), (0.0, 0.0), (300.0, 200.0))
            .with_group("y", "Y", Section::Basic, Some("x"), (0.0, 0.0), (300.0, 200.0))
            .with_group("z", "Z", Section::Basic, Some("x"), (0.0, 0.0), (300.0, 200.0));
        let graph = Graph::build(Arc::new(catalog), &[], None);

        assert_eq!(graph.group("x").unwrap().parent_id, None);
        assert_eq!(graph.group("y").unwrap().parent_id, None);
        let z = graph.group("z").unwrap();
        assert_eq!(z.parent_id.as_deref(), Some("x"));
        assert_eq!(z.depth, 1);
    }

    #[test]
    fn absolute_positions_accumulate_through_parents() {
        let graph = Graph::build(small_catalog(), &topics(&["A"]), None);
        assert_eq!(graph.absolute_position("child"), Some(Point::new(20.0, 40.0)));
        assert_eq!(graph.absolute_position("A"), Some(Point::new(30.0, 50.0)));
        assert_eq!(
            graph.handle_point("child", Side::Right, None),
            Some(Point::new(320.0, 140.0))
        );
    }

    #[test]
    fn edge_path_uses_group_geometry() {
        let graph = Graph::build(small_catalog(), &[], None);
        let path = graph.edge_path("e3", &HashMap::new()).unwrap();
        assert_eq!(path.source, Point::new(325.0, 140.0));
        assert_eq!(path.target, Point::new(695.0, 200.0));
        assert!(!path.custom);
    }
}

use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    None,
    Node(String),
    Edge(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deleted {
    Node(String),
    Edge(String),
}

#[derive(Debug, Clone, PartialEq)]
enum DragTarget {
    Node { id: String, origin: Point },
    Group { id: String, origin: Point },
    ControlPoint { edge_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    target: DragTarget,
    start: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome<T> {
    Completed(T),
    InFlight,
}

#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub fn try_begin(&self) -> Option<FlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { busy: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct FlightGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct EditorSession {
    graph: Graph,
    selection: Selection,
    viewport: Viewport,
    drag: Option<DragSession>,
    saving: SingleFlight,
    publishing: SingleFlight,
}

impl EditorSession {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            selection: Selection::None,
            viewport: Viewport::default(),
            drag: None,
            saving: SingleFlight::default(),
            publishing: SingleFlight::default(),
        }
    }

    pub async fn load(store: &impl ContentStore, catalog: Arc<Catalog>) -> Result<Self, StoreError> {
        let (topics, layout) = store.fetch_roadmap().await?;
        info!(
            "loaded {} topic(s){}",
            topics.len(),
            if layout.is_some() { " with a saved layout" } else { "" }
        );
        Ok(Self::new(Graph::build(catalog, &topics, layout.as_ref())))
    }

    pub fn from_published(roadmap: PublishedRoadmap, catalog: Arc<Catalog>) -> Self {
        let (topics, layout) = roadmap.into_parts();
        Self::new(Graph::build(catalog, &topics, Some(&layout)))
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn is_saving(&self) -> bool {
        self.saving.is_busy()
    }

    pub fn is_publishing(&self) -> bool {
        self.publishing.is_busy()
    }

    pub fn select_node(&mut self, id: &str) -> Result<(), EditError> {
        if !self.graph.contains(id) {
            return Err(EditError::UnknownNode(id.to_string()));
        }
        self.selection = Selection::Node(id.to_string());
        Ok(())
    }

    pub fn select_edge(&mut self, id: &str) -> Result<(), EditError> {
        if self.graph.edge(id).is_none() {
            return Err(EditError::UnknownEdge(id.to_string()));
        }
        self.selection = Selection::Edge(id.to_string());
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection = Selection::None;
    }

    /// Delete-key gesture. A selected group is refused and stays selected.
    pub fn delete_selected(&mut self) -> Result<Option<Deleted>, EditError> {
        let deleted = match &self.selection {
            Selection::None => return Ok(None),
            Selection::Node(id) => self
                .graph
                .delete_node(id)?
                .then(|| Deleted::Node(id.clone())),
            Selection::Edge(id) => self.graph.delete_edge(id).then(|| Deleted::Edge(id.clone())),
        };
        self.selection = Selection::None;
        Ok(deleted)
    }

    pub fn drag(&self) -> Option<&DragSession> {
        self.drag.as_ref()
    }

    pub fn begin_drag(&mut self, id: &str, screen: Point) -> Result<(), EditError> {
        let target = match self.graph.kind_of(id) {
            Some(NodeKind::Group) => DragTarget::Group {
                id: id.to_string(),
                origin: self.graph.group(id).map(|g| g.position).unwrap_or_default(),
            },
            Some(NodeKind::Content) => DragTarget::Node {
                id: id.to_string(),
                origin: self.graph.node(id).map(|n| n.position).unwrap_or_default(),
            },
            None => return Err(EditError::UnknownNode(id.to_string())),
        };
        self.drag = Some(DragSession {
            target,
            start: self.viewport.screen_to_canvas(screen),
        });
        Ok(())
    }

    pub fn begin_control_point_drag(&mut self, edge_id: &str, screen: Point) -> Result<(), EditError> {
        if self.graph.edge(edge_id).is_none() {
            return Err(EditError::UnknownEdge(edge_id.to_string()));
        }
        self.drag = Some(DragSession {
            target: DragTarget::ControlPoint {
                edge_id: edge_id.to_string(),
            },
            start: self.viewport.screen_to_canvas(screen),
        });
        Ok(())
    }

    pub fn pointer_move(&mut self, screen: Point) -> Result<(), EditError> {
        let Some(drag) = &self.drag else {
            return Ok(());
        };
        let canvas = self.viewport.screen_to_canvas(screen);
        let delta = canvas.minus(drag.start);
        match &drag.target {
            DragTarget::Node { id, origin } => self.graph.move_node(id, origin.translate(delta)),
            DragTarget::Group { id, origin } => self.graph.move_group(id, origin.translate(delta)),
            DragTarget::ControlPoint { edge_id } => self.graph.set_control_point(edge_id, canvas),
        }
    }

    pub fn pointer_up(&mut self) {
        self.drag = None;
    }

    pub fn reset_curvature(&mut self, edge_id: &str) -> Result<(), EditError> {
        self.graph.reset_control_point(edge_id)
    }

    /// Flattens the graph and writes it to the content store. The graph is
    /// never touched, so a failed save leaves it as it was.
    pub async fn save_to_content_store(&self, store: &impl ContentStore) -> Result<SaveOutcome<()>, StoreError> {
        let Some(_guard) = self.saving.try_begin() else {
            return Ok(SaveOutcome::InFlight);
        };
        let json = self.graph.flatten().to_json()?;
        store.write_layout_blob(&json).await?;
        info!("saved layout ({} chars)", json.chars().count());
        Ok(SaveOutcome::Completed(()))
    }

    pub async fn publish(
        &self,
        store: &impl PublishStore,
        title: Option<&str>,
    ) -> Result<SaveOutcome<PublishReceipt>, StoreError> {
        let Some(_guard) = self.publishing.try_begin() else {
            return Ok(SaveOutcome::InFlight);
        };
        let receipt = store
            .publish(title, &self.graph.topics(), &self.graph.flatten())
            .await?;
        Ok(SaveOutcome::Completed(receipt))
    }

    pub async fn sync_topic(&self, store: &impl ContentStore, node_id: &str) -> Result<(), StoreError> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| StoreError::NotFound(format!("node '{node_id}'")))?;
        let record_id = node.topic.source_record_id.as_deref().ok_or_else(|| {
            StoreError::Validation(format!("node '{node_id}' has no source record to update"))
        })?;
        store
            .update_topic(record_id, &TopicUpdate::from_topic(&node.topic))
            .await
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        self.graph.flatten().to_json_pretty()
    }

    /// Replaces the layout with an imported one, keeping the current topics.
    /// Nodes placed outside the catalog keep their groups unless the import
    /// says otherwise. A rejected import leaves the graph unchanged.
    pub fn import_json(&mut self, text: &str) -> Result<(), ImportError> {
        let mut snapshot = normalize_import(text)?;
        let catalog = self.graph.shared_catalog();
        for node in self.graph.nodes() {
            let Some(group) = node.parent_group_id.as_deref() else {
                continue;
            };
            if catalog.parent_of(node.id()) != Some(group) {
                snapshot
                    .parents
                    .entry(node.id().to_string())
                    .or_insert_with(|| group.to_string());
            }
        }
        self.graph = Graph::build(catalog, &self.graph.topics(), Some(&snapshot));
        self.selection = Selection::None;
        self.drag = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::empty()
                .with_group("g", "Group", Section::Basic, None, (100.0, 100.0), (400.0, 300.0))
                .with_node("a", "g", Some((10.0, 10.0)))
                .with_node("b", "g", Some((200.0, 10.0)))
                .with_edge("ab", "a", "b", ("right-src", "left"), None),
        )
    }

    fn topics() -> Vec<Topic> {
        ["a", "b"]
            .iter()
            .map(|id| {
                let mut topic = Topic::new(*id, id.to_uppercase());
                topic.source_record_id = Some(format!("page-{id}"));
                topic
            })
            .collect()
    }

    fn session() -> EditorSession {
        EditorSession::new(Graph::build(catalog(), &topics(), None))
    }

    #[derive(Default)]
    struct SlowStore {
        writes: AtomicUsize,
    }

    impl ContentStore for SlowStore {
        async fn list_topics(&self) -> Result<Vec<Topic>, StoreError> {
            Ok(Vec::new())
        }

        async fn update_topic(&self, _: &str, _: &TopicUpdate) -> Result<(), StoreError> {
            Ok(())
        }

        async fn read_layout_blob(&self) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn write_layout_blob(&self, _: &str) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn selection_is_exclusive_and_drives_delete() {
        let mut session = session();
        session.select_node("a").unwrap();
        session.select_edge("ab").unwrap();
        assert_eq!(session.selection(), &Selection::Edge("ab".into()));

        assert_eq!(session.delete_selected(), Ok(Some(Deleted::Edge("ab".into()))));
        assert!(session.graph().edges().is_empty());
        assert_eq!(session.delete_selected(), Ok(None));

        session.select_node("g").unwrap();
        assert!(session.delete_selected().is_err());
        assert_eq!(session.selection(), &Selection::Node("g".into()));
    }

    #[test]
    fn stale_selection_reports_nothing_deleted() {
        let mut session = session();
        session.select_edge("ab").unwrap();
        session.graph_mut().delete_node("a").unwrap();
        assert_eq!(session.delete_selected(), Ok(None));
        assert_eq!(session.selection(), &Selection::None);

        session.select_node("b").unwrap();
        session.graph_mut().delete_node("b").unwrap();
        assert_eq!(session.delete_selected(), Ok(None));
    }

    #[test]
    fn node_drag_follows_the_pointer_through_the_viewport() {
        let mut session = session();
        session.set_viewport(Viewport::new(Point::new(50.0, 0.0), 2.0).unwrap());

        session.begin_drag("a", Point::new(50.0, 0.0)).unwrap();
        session.pointer_move(Point::new(70.0, 40.0)).unwrap();
        assert_eq!(session.graph().node("a").unwrap().position, Point::new(20.0, 30.0));
        session.pointer_move(Point::new(90.0, 40.0)).unwrap();
        assert_eq!(session.graph().node("a").unwrap().position, Point::new(30.0, 30.0));
        session.pointer_up();

        session.pointer_move(Point::new(500.0, 500.0)).unwrap();
        assert_eq!(session.graph().node("a").unwrap().position, Point::new(30.0, 30.0));
    }

    #[test]
    fn control_point_drag_writes_canvas_coordinates() {
        let mut session = session();
        session.set_viewport(Viewport::new(Point::new(10.0, 10.0), 0.5).unwrap());
        session.begin_control_point_drag("ab", Point::new(10.0, 10.0)).unwrap();
        session.pointer_move(Point::new(60.0, 35.0)).unwrap();
        session.pointer_up();
        assert_eq!(
            session.graph().edge("ab").unwrap().control_point,
            Some(Point::new(100.0, 50.0))
        );

        session.reset_curvature("ab").unwrap();
        assert_eq!(session.graph().edge("ab").unwrap().control_point, None);
    }

    #[test]
    fn non_finite_pointer_positions_leave_the_layout_intact() {
        let mut session = session();
        let before = session.graph().flatten();

        session.begin_drag("a", Point::new(0.0, 0.0)).unwrap();
        assert!(matches!(
            session.pointer_move(Point::new(f64::NAN, 3.0)),
            Err(EditError::NonFinitePoint { .. })
        ));
        session.pointer_up();
        session.begin_control_point_drag("ab", Point::new(0.0, 0.0)).unwrap();
        assert!(session.pointer_move(Point::new(f64::INFINITY, 0.0)).is_err());
        session.pointer_up();

        assert_eq!(session.graph().flatten(), before);
        let json = session.export_json().unwrap();
        assert_eq!(normalize_import(&json).unwrap().positions, before.positions);
    }

    #[test]
    fn group_drag_moves_the_group_only() {
        let mut session = session();
        session.begin_drag("g", Point::new(0.0, 0.0)).unwrap();
        session.pointer_move(Point::new(5.0, -5.0)).unwrap();
        assert_eq!(session.graph().group("g").unwrap().position, Point::new(105.0, 95.0));
        assert_eq!(session.graph().node("a").unwrap().position, Point::new(10.0, 10.0));
    }

    #[tokio::test]
    async fn overlapping_saves_write_once() {
        let session = session();
        let store = SlowStore::default();

        let (first, second) = tokio::join!(
            session.save_to_content_store(&store),
            session.save_to_content_store(&store)
        );
        assert_eq!(first, Ok(SaveOutcome::Completed(())));
        assert_eq!(second, Ok(SaveOutcome::InFlight));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert!(!session.is_saving());
    }

    #[tokio::test]
    async fn failed_save_leaves_the_graph_alone() {
        let session = session();
        let before = session.graph().flatten();
        let store = MemoryContentStore::without_layout_record(topics());

        let err = session.save_to_content_store(&store).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(session.graph().flatten(), before);
        assert!(session.save_to_content_store(&store).await.is_err());
    }

    #[tokio::test]
    async fn topic_edits_sync_through_the_source_record() {
        let mut session = session();
        let store = MemoryContentStore::new(topics());
        session
            .graph_mut()
            .edit_topic("a", Some("Alpha"), Some("https://alpha.example"))
            .unwrap();
        session.sync_topic(&store, "a").await.unwrap();
        let stored = store.list_topics().await.unwrap();
        assert_eq!(stored[0].name, "Alpha");
        assert_eq!(stored[0].link, "https://alpha.example");

        let id = session.graph_mut().create_node("g", "Fresh").unwrap();
        let err = session.sync_topic(&store, &id).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn import_keeps_topics_and_ad_hoc_groups() {
        let mut session = session();
        let id = session.graph_mut().create_node("g", "Fresh").unwrap();

        session.import_json(r#"{"a": {"x": 7, "y": 8}}"#).unwrap();
        let graph = session.graph();
        assert_eq!(graph.node("a").unwrap().position, Point::new(7.0, 8.0));
        assert_eq!(graph.node(&id).unwrap().parent_group_id.as_deref(), Some("g"));
        assert_eq!(graph.edges().len(), 1);

        assert!(session.import_json("[]").is_err());
        assert_eq!(session.graph().node("a").unwrap().position, Point::new(7.0, 8.0));
    }
}

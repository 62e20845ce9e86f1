use log::debug;
use uuid::Uuid;

use crate::*;

impl Graph {
    pub fn move_node(&mut self, node_id: &str, position: Point) -> Result<(), EditError> {
        let position = finite_point(position)?;
        self.node_mut(node_id)?.position = position;
        Ok(())
    }

    pub fn move_group(&mut self, group_id: &str, position: Point) -> Result<(), EditError> {
        let position = finite_point(position)?;
        self.group_mut(group_id)?.position = position;
        Ok(())
    }

    pub fn resize_group(&mut self, group_id: &str, size: Size) -> Result<(), EditError> {
        let below_floor = !(size.width >= MIN_GROUP_WIDTH && size.height >= MIN_GROUP_HEIGHT);
        if below_floor || !size.width.is_finite() || !size.height.is_finite() {
            return Err(EditError::SizeBelowFloor {
                width: size.width,
                height: size.height,
                min_width: MIN_GROUP_WIDTH,
                min_height: MIN_GROUP_HEIGHT,
            });
        }
        let group = self.group_mut(group_id)?;
        group.size = size;
        Ok(())
    }

    pub fn create_node(&mut self, parent_group_id: &str, label: &str) -> Result<String, EditError> {
        let group = self
            .group(parent_group_id)
            .ok_or_else(|| EditError::UnknownGroup(parent_group_id.to_string()))?;
        let section = group.section;

        let id = format!("node_{}", Uuid::new_v4().simple());
        let order = self
            .nodes
            .iter()
            .map(|node| node.topic.order)
            .fold(0.0, f64::max)
            + 1.0;

        let topic = Topic {
            id: id.clone(),
            name: label.to_string(),
            link: String::new(),
            group: parent_group_id.to_string(),
            section,
            order,
            source_record_id: None,
        };

        self.node_parents
            .insert(id.clone(), parent_group_id.to_string());
        self.nodes.push(ContentNode {
            topic,
            position: NEW_NODE_OFFSET,
            parent_group_id: Some(parent_group_id.to_string()),
            pending_edit: true,
        });
        debug!("created node '{id}' in '{parent_group_id}'");
        Ok(id)
    }

    pub fn take_pending_edit(&mut self, node_id: &str) -> bool {
        match self.nodes.iter_mut().find(|node| node.id() == node_id) {
            Some(node) => std::mem::take(&mut node.pending_edit),
            None => false,
        }
    }

    /// Removes a content node and every edge touching it. Unknown ids are a
    /// no-op; group ids are rejected. Returns whether a node was removed.
    pub fn delete_node(&mut self, node_id: &str) -> Result<bool, EditError> {
        if self.group(node_id).is_some() {
            return Err(EditError::GroupsAreStructural(node_id.to_string()));
        }
        let before = self.nodes.len();
        self.nodes.retain(|node| node.id() != node_id);
        if self.nodes.len() == before {
            return Ok(false);
        }
        self.edges.retain(|edge| !edge.touches(node_id));
        self.node_parents.remove(node_id);
        Ok(true)
    }

    pub fn delete_group(&mut self, group_id: &str) -> Result<(), EditError> {
        match self.group(group_id) {
            Some(_) => Err(EditError::GroupsAreStructural(group_id.to_string())),
            None => Err(EditError::UnknownGroup(group_id.to_string())),
        }
    }

    pub fn connect(
        &mut self,
        source: &str,
        source_attachment: Attachment,
        target: &str,
        target_attachment: Attachment,
    ) -> Result<String, EditError> {
        self.check_endpoints(source, target)?;

        let id = format!("edge-{}", Uuid::new_v4().simple());
        self.edges.push(Edge {
            id: id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            source_attachment,
            target_attachment,
            control_point: None,
        });
        Ok(id)
    }

    /// Re-points one or both ends of an edge in place. The id and any custom
    /// control point are kept.
    pub fn reconnect_edge(
        &mut self,
        edge_id: &str,
        new_source: Option<(&str, Attachment)>,
        new_target: Option<(&str, Attachment)>,
    ) -> Result<(), EditError> {
        let edge = self
            .edge(edge_id)
            .ok_or_else(|| EditError::UnknownEdge(edge_id.to_string()))?;
        let source = new_source.as_ref().map_or(edge.source.as_str(), |(id, _)| *id);
        let target = new_target.as_ref().map_or(edge.target.as_str(), |(id, _)| *id);
        self.check_endpoints(source, target)?;

        let edge = self.edge_mut(edge_id)?;
        if let Some((id, attachment)) = new_source {
            edge.source = id.to_string();
            edge.source_attachment = attachment;
        }
        if let Some((id, attachment)) = new_target {
            edge.target = id.to_string();
            edge.target_attachment = attachment;
        }
        Ok(())
    }

    pub fn delete_edge(&mut self, edge_id: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|edge| edge.id != edge_id);
        self.edges.len() != before
    }

    pub fn set_control_point(&mut self, edge_id: &str, point: Point) -> Result<(), EditError> {
        let point = finite_point(point)?;
        self.edge_mut(edge_id)?.control_point = Some(point);
        Ok(())
    }

    pub fn reset_control_point(&mut self, edge_id: &str) -> Result<(), EditError> {
        self.edge_mut(edge_id)?.control_point = None;
        Ok(())
    }

    /// Moves a content node into another group, keeping it where it is on the
    /// canvas by rebasing its relative position.
    pub fn reparent_node(&mut self, node_id: &str, group_id: &str) -> Result<(), EditError> {
        if self.group(group_id).is_none() {
            return Err(EditError::UnknownGroup(group_id.to_string()));
        }
        let absolute = self
            .absolute_position(node_id)
            .filter(|_| self.node(node_id).is_some())
            .ok_or_else(|| EditError::UnknownNode(node_id.to_string()))?;
        let group_origin = self
            .absolute_position(group_id)
            .ok_or_else(|| EditError::UnknownGroup(group_id.to_string()))?;
        let position = finite_point(absolute.minus(group_origin))?;

        let node = self.node_mut(node_id)?;
        node.position = position;
        node.parent_group_id = Some(group_id.to_string());
        node.topic.group = group_id.to_string();
        self.node_parents
            .insert(node_id.to_string(), group_id.to_string());
        Ok(())
    }

    pub fn edit_topic(
        &mut self,
        node_id: &str,
        name: Option<&str>,
        link: Option<&str>,
    ) -> Result<&Topic, EditError> {
        let node = self.node_mut(node_id)?;
        if let Some(name) = name {
            node.topic.name = name.to_string();
        }
        if let Some(link) = link {
            node.topic.link = link.trim().to_string();
        }
        Ok(&node.topic)
    }

    fn check_endpoints(&self, source: &str, target: &str) -> Result<(), EditError> {
        if source == target {
            return Err(EditError::SelfLoop(source.to_string()));
        }
        for id in [source, target] {
            if !self.contains(id) {
                return Err(EditError::UnknownEndpoint(id.to_string()));
            }
        }
        Ok(())
    }

    fn node_mut(&mut self, node_id: &str) -> Result<&mut ContentNode, EditError> {
        self.nodes
            .iter_mut()
            .find(|node| node.id() == node_id)
            .ok_or_else(|| EditError::UnknownNode(node_id.to_string()))
    }

    fn group_mut(&mut self, group_id: &str) -> Result<&mut GroupNode, EditError> {
        self.groups
            .iter_mut()
            .find(|group| group.id == group_id)
            .ok_or_else(|| EditError::UnknownGroup(group_id.to_string()))
    }

    fn edge_mut(&mut self, edge_id: &str) -> Result<&mut Edge, EditError> {
        self.edges
            .iter_mut()
            .find(|edge| edge.id == edge_id)
            .ok_or_else(|| EditError::UnknownEdge(edge_id.to_string()))
    }
}

use std::collections::{HashMap, HashSet};

use crate::*;

/// Catalog entry for one group. Geometry is relative to the parent group when
/// `parent_id` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub label: String,
    pub section: Section,
    pub depth: usize,
    pub parent_id: Option<String>,
    pub is_subgroup: bool,
    pub position: Point,
    pub size: Size,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_attachment: Attachment,
    pub target_attachment: Attachment,
    pub control_point: Option<Point>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Groups in declaration order.
    pub groups: Vec<(String, GroupSpec)>,
    pub node_parents: HashMap<String, String>,
    pub positions: HashMap<String, Point>,
    pub edges: Vec<EdgeSpec>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn group(&self, id: &str) -> Option<&GroupSpec> {
        self.groups
            .iter()
            .find(|(group_id, _)| group_id == id)
            .map(|(_, spec)| spec)
    }

    pub fn contains_group(&self, id: &str) -> bool {
        self.group(id).is_some()
    }

    pub fn parent_of(&self, node_id: &str) -> Option<&str> {
        self.node_parents.get(node_id).map(String::as_str)
    }

    pub fn with_group(
        mut self,
        id: &str,
        label: &str,
        section: Section,
        parent_id: Option<&str>,
        position: (f64, f64),
        size: (f64, f64),
    ) -> Self {
        let depth = match parent_id {
            Some(parent) => self.group(parent).map(|spec| spec.depth + 1).unwrap_or(1),
            None => 0,
        };
        self.groups.push((
            id.to_string(),
            GroupSpec {
                label: label.to_string(),
                section,
                depth,
                parent_id: parent_id.map(str::to_string),
                is_subgroup: parent_id.is_some(),
                position: Point::new(position.0, position.1),
                size: Size::new(size.0, size.1),
            },
        ));
        self
    }

    pub fn with_node(mut self, node_id: &str, group_id: &str, position: Option<(f64, f64)>) -> Self {
        self.node_parents
            .insert(node_id.to_string(), group_id.to_string());
        if let Some((x, y)) = position {
            self.positions.insert(node_id.to_string(), Point::new(x, y));
        }
        self
    }

    pub fn with_edge(
        mut self,
        id: &str,
        source: &str,
        target: &str,
        handles: (&str, &str),
        control_point: Option<(f64, f64)>,
    ) -> Self {
        let source_attachment = handles
            .0
            .parse()
            .unwrap_or_else(|_| Attachment::default_source());
        let target_attachment = handles
            .1
            .parse()
            .unwrap_or_else(|_| Attachment::default_target());
        self.edges.push(EdgeSpec {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            source_attachment,
            target_attachment,
            control_point: control_point.map(|(x, y)| Point::new(x, y)),
        });
        self
    }

    /// Checks the structural invariants of the catalog: parents declared
    /// before children, depth = parent depth + 1, and node assignments that
    /// point at known groups.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen: HashSet<&str> = HashSet::new();
        for (id, spec) in &self.groups {
            if !seen.insert(id.as_str()) {
                return Err(format!("group '{id}' is declared twice"));
            }
            match &spec.parent_id {
                Some(parent) => {
                    let Some(parent_spec) = self.group(parent) else {
                        return Err(format!("group '{id}' references unknown parent '{parent}'"));
                    };
                    if !seen.contains(parent.as_str()) {
                        return Err(format!("group '{id}' is declared before its parent"));
                    }
                    if spec.depth != parent_spec.depth + 1 {
                        return Err(format!("group '{id}' has depth {} under depth {}", spec.depth, parent_spec.depth));
                    }
                }
                None if spec.depth != 0 => {
                    return Err(format!("top-level group '{id}' has depth {}", spec.depth));
                }
                None => {}
            }
        }

        for (node, group) in &self.node_parents {
            if !seen.contains(group.as_str()) {
                return Err(format!("node '{node}' is assigned to unknown group '{group}'"));
            }
        }
        Ok(())
    }

    /// The algorithm-study roadmap shipped with the editor.
    pub fn default_roadmap() -> Self {
        use Section::{Advanced, Basic};

        Catalog::empty()
            .with_group("sec_basic", "Basic Course", Basic, None, (-361.0, -29.0), (693.0, 765.0))
            .with_group("sec_adv", "Advanced Course", Advanced, None, (352.0, -28.0), (334.0, 762.0))
            .with_group("sec_platform", "Platform Sign-up", Basic, Some("sec_basic"), (22.0, 83.0), (331.0, 153.0))
            .with_group("sec_solved", "solved.ac", Basic, Some("sec_basic"), (394.0, 83.0), (272.0, 152.0))
            .with_group("sec_tools", "Coding Tools", Basic, Some("sec_basic"), (23.0, 244.0), (643.0, 270.0))
            .with_group("sec_record", "Study Notes / Sharing / Talks", Basic, Some("sec_basic"), (77.0, 528.0), (555.0, 104.0))
            .with_group("sec_arena", "Contests", Basic, Some("sec_basic"), (102.0, 642.0), (530.0, 100.0))
            .with_group("sec_tools_ide", "IDE", Basic, Some("sec_tools"), (21.0, 100.0), (140.0, 149.0))
            .with_group("sec_tools_online_ide", "Online IDE", Basic, Some("sec_tools"), (171.0, 100.0), (141.0, 148.0))
            .with_group("sec_tools_runner", "Online Runner", Basic, Some("sec_tools"), (323.0, 99.0), (139.0, 148.0))
            .with_group("sec_tools_notebook", "Notebooks", Basic, Some("sec_tools"), (473.0, 99.0), (151.0, 147.0))
            .with_group("sec_adv_ext", "Browser Extensions", Advanced, Some("sec_adv"), (57.0, 259.0), (250.0, 155.0))
            .with_group("sec_adv_usage", "Power Usage", Advanced, Some("sec_adv"), (87.0, 49.0), (187.0, 201.0))
            .with_group("sec_adv_contest", "Online Contests", Advanced, Some("sec_adv"), (90.0, 591.0), (150.0, 150.0))
            .with_group("sec_adv_til", "Advanced Note Taking", Advanced, Some("sec_adv"), (26.0, 426.0), (286.0, 159.0))
            .with_node("node_intro", "sec_basic", Some((25.0, 25.0)))
            .with_node("node_tools_intro", "sec_tools", Some((190.0, 43.0)))
            .with_node("node_boj_setup", "sec_platform", Some((38.0, 43.0)))
            .with_node("node_boj_usage", "sec_platform", Some((177.0, 43.0)))
            .with_node("node_koala_setup", "sec_platform", Some((40.0, 88.0)))
            .with_node("node_koala_usage", "sec_platform", Some((170.0, 88.0)))
            .with_node("node_solved_link", "sec_solved", Some((19.0, 44.0)))
            .with_node("node_solved_usage", "sec_solved", Some((107.0, 89.0)))
            .with_node("tool_vscode", "sec_tools_ide", Some((25.0, 42.0)))
            .with_node("tool_pycharm", "sec_tools_ide", Some((25.0, 89.0)))
            .with_node("tool_replit", "sec_tools_online_ide", Some((30.0, 42.0)))
            .with_node("tool_onlinegdb", "sec_tools_online_ide", Some((30.0, 88.0)))
            .with_node("tool_ideone", "sec_tools_runner", Some((30.0, 45.0)))
            .with_node("tool_tio", "sec_tools_runner", Some((31.0, 89.0)))
            .with_node("tool_colab", "sec_tools_notebook", Some((19.0, 46.0)))
            .with_node("tool_marimo", "sec_tools_notebook", Some((35.0, 89.0)))
            .with_node("node_til", "sec_record", Some((35.0, 45.0)))
            .with_node("node_join", "sec_record", Some((192.0, 45.0)))
            .with_node("node_study", "sec_record", Some((355.0, 45.0)))
            .with_node("node_arena", "sec_arena", Some((30.0, 43.0)))
            .with_node("node_arenajoin", "sec_arena", Some((195.0, 43.0)))
            .with_node("node_arenacoalla", "sec_arena", Some((360.0, 43.0)))
            .with_node("ext_bjcode", "sec_adv_ext", None)
            .with_node("ext_bojhub", "sec_adv_ext", None)
            .with_node("ext_bojext", "sec_adv_ext", None)
            .with_node("ext_testcase", "sec_adv_ext", None)
            .with_node("adv_boj", "sec_adv_usage", None)
            .with_node("adv_solved", "sec_adv_usage", None)
            .with_node("adv_koala", "sec_adv_usage", None)
            .with_node("contest_atcoder", "sec_adv_contest", None)
            .with_node("contest_codeforces", "sec_adv_contest", None)
            .with_node("draw_io", "sec_adv_til", None)
            .with_node("excalidraw", "sec_adv_til", None)
            .with_node("pythontutor", "sec_adv_til", None)
            .with_node("vscode_ext", "sec_adv_til", None)
            .with_edge("edge-2", "node_boj_setup", "node_boj_usage", ("right-src", "left"), Some((-175.09, 118.08)))
            .with_edge("edge-3", "node_koala_setup", "node_koala_usage", ("right-src", "left"), Some((-179.04, 162.5)))
            .with_edge("edge-13", "node_arena", "node_arenajoin", ("right-src", "left"), None)
            .with_edge("edge-14", "node_arenajoin", "node_arenacoalla", ("right-src", "left"), None)
            .with_edge("edge-1768455001460", "node_boj_usage", "node_solved_link", ("right-src", "left"), Some((-1.48, 112.74)))
            .with_edge("edge-1768457272681", "node_intro", "node_koala_setup", ("bottom-src", "left"), Some((-362.09, 162.08)))
            .with_edge("edge-1768457708909", "sec_platform", "sec_tools", ("right-src", "top"), Some((13.11, 128.03)))
            .with_edge("edge-1768457839803", "node_tools_intro", "sec_tools_ide", ("left-src", "top"), Some((-238.41, 293.4)))
            .with_edge("edge-1768457846287", "node_tools_intro", "sec_tools_notebook", ("right-src", "top"), Some((202.1, 282.98)))
            .with_edge("edge-1768457863495", "node_tools_intro", "sec_tools_online_ide", ("bottom-src", "top"), Some((-93.19, 304.51)))
            .with_edge("edge-1768457879417", "node_tools_intro", "sec_tools_runner", ("right-src", "top"), Some((56.19, 280.2)))
            .with_edge("edge-1768457941643", "sec_tools", "sec_record", ("bottom-src", "top"), Some((-7.73, 488.64)))
            .with_edge("edge-1768457963564", "sec_record", "sec_arena", ("bottom-src", "top"), Some((2.69, 605.37)))
            .with_edge("edge-1768458027580", "node_solved_link", "node_solved_usage", ("bottom-src", "left"), None)
            .with_edge("edge-1768458251117", "sec_record", "sec_adv_til", ("right-src", "left"), Some((339.68, 484.47)))
            .with_edge("edge-1768458255698", "sec_arena", "sec_adv_contest", ("right-src", "left"), Some((409.86, 639.42)))
            .with_edge("edge-1768458351295", "sec_solved", "sec_adv_ext", ("right-src", "left"), Some((354.27, 306.6)))
            .with_edge("edge-1768459407226", "sec_solved", "sec_adv_usage", ("right-src", "left"), Some((374.42, 121.08)))
            .with_edge("edge-11", "node_til", "node_join", ("right-src", "left"), Some((-118.21, 562.99)))
            .with_edge("edge-12", "node_join", "node_study", ("right-src", "left"), Some((48.55, 561.6)))
            .with_edge("edge-1768651866715", "node_intro", "node_boj_setup", ("bottom-src", "left"), Some((-357.92, 112.74)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roadmap_is_well_formed() {
        let catalog = Catalog::default_roadmap();
        catalog.validate().unwrap();
        assert_eq!(catalog.groups.len(), 15);
        assert_eq!(catalog.edges.len(), 21);
        assert_eq!(catalog.group("sec_tools_ide").unwrap().depth, 2);
        assert_eq!(catalog.parent_of("tool_colab"), Some("sec_tools_notebook"));
    }

    #[test]
    fn every_group_contains_its_children_at_creation() {
        let catalog = Catalog::default_roadmap();
        for (id, spec) in &catalog.groups {
            let Some(parent) = spec.parent_id.as_deref().and_then(|p| catalog.group(p)) else {
                continue;
            };
            assert!(
                spec.position.x >= 0.0
                    && spec.position.y >= 0.0
                    && spec.position.x + spec.size.width <= parent.size.width
                    && spec.position.y + spec.size.height <= parent.size.height,
                "group '{id}' overflows its parent"
            );
        }
    }

    #[test]
    fn validate_reports_unknown_parents() {
        let catalog = Catalog::empty().with_node("orphan", "missing", None);
        assert!(catalog.validate().unwrap_err().contains("missing"));
    }
}

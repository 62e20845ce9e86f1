use serde::{Deserialize, Deserializer, Serialize};

pub mod catalog;
pub mod edit;
pub mod error;
pub mod geometry;
pub mod graph;
#[cfg(feature = "stores")]
pub mod notion;
#[cfg(feature = "stores")]
pub mod publish;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod utils;
pub mod visited;

pub use catalog::*;
pub use error::*;
pub use geometry::*;
pub use graph::*;
pub use session::*;
pub use snapshot::*;
pub use store::*;
pub use utils::*;
pub use visited::*;

pub const HANDLE_RADIUS: f64 = 5.0;
pub const CURVATURE_FACTOR: f64 = 0.15;
pub const MIN_CURVATURE: f64 = 20.0;
pub const MAX_CURVATURE: f64 = 60.0;
pub const MIN_GROUP_WIDTH: f64 = 100.0;
pub const MIN_GROUP_HEIGHT: f64 = 50.0;
pub const FALLBACK_GROUP_WIDTH: f64 = 200.0;
pub const FALLBACK_GROUP_HEIGHT: f64 = 100.0;
pub const NODE_WIDTH: f64 = 140.0;
pub const NODE_HEIGHT: f64 = 40.0;
pub const FALLBACK_ORIGIN_X: f64 = 20.0;
pub const FALLBACK_ORIGIN_Y: f64 = 40.0;
pub const FALLBACK_COLUMN_SPACING: f64 = 120.0;
pub const FALLBACK_ROW_SPACING: f64 = 80.0;
pub const FALLBACK_COLUMNS: usize = 4;
pub const NEW_NODE_OFFSET: Point = Point { x: 20.0, y: 40.0 };
pub const GROUP_BASE_Z: i32 = -10;
pub const GROUP_DEPTH_Z_STEP: i32 = 5;
pub const CONTENT_NODE_Z: i32 = 100;
pub const LAYOUT_RECORD_ID: &str = "_layout";
pub const LAYOUT_CHUNK_CHARS: usize = 2000;
pub const SHORT_ID_LEN: usize = 8;
pub const DEFAULT_ROADMAP_TITLE: &str = "Roadmap";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn round(self) -> Self {
        Self {
            x: self.x.round(),
            y: self.y.round(),
        }
    }

    pub fn translate(self, other: Point) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn minus(self, other: Point) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn round(self) -> Self {
        Self {
            width: self.width.round(),
            height: self.height.round(),
        }
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(FALLBACK_GROUP_WIDTH, FALLBACK_GROUP_HEIGHT)
    }
}

/// Styling track of a topic or group. Drives presentation only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    #[default]
    Basic,
    Advanced,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Basic => "basic",
            Section::Advanced => "advanced",
        }
    }

    /// Lenient mapping for free-text select values coming from the content store.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "advanced" | "adv" | "고급" => Section::Advanced,
            _ => Section::Basic,
        }
    }
}

impl<'de> Deserialize<'de> for Section {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Section::from_label(&label))
    }
}

/// A learning-resource entry sourced from the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    /// Empty means "not yet available".
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub section: Section,
    #[serde(default)]
    pub order: f64,
    #[serde(default, alias = "notionPageId", skip_serializing_if = "Option::is_none")]
    pub source_record_id: Option<String>,
}

impl Topic {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            link: String::new(),
            group: String::new(),
            section: Section::Basic,
            order: 0.0,
            source_record_id: None,
        }
    }

    pub fn has_link(&self) -> bool {
        !self.link.trim().is_empty()
    }
}

/// Sorts topics by `order`, keeping the incoming order for ties.
pub fn sort_topics(topics: &mut [Topic]) {
    topics.sort_by(|a, b| a.order.total_cmp(&b.order));
}

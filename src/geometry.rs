use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::*;

/// Side of a node or group an edge attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Left,
    Right,
    Bottom,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Top => "top",
            Side::Left => "left",
            Side::Right => "right",
            Side::Bottom => "bottom",
        }
    }

    /// Unit vector pointing away from the node through this side.
    pub fn outward(&self) -> Point {
        match self {
            Side::Top => Point::new(0.0, -1.0),
            Side::Left => Point::new(-1.0, 0.0),
            Side::Right => Point::new(1.0, 0.0),
            Side::Bottom => Point::new(0.0, 1.0),
        }
    }

    /// Raw handle coordinate on a box at `origin` with `size`.
    pub fn handle_on(&self, origin: Point, size: Size) -> Point {
        match self {
            Side::Top => Point::new(origin.x + size.width / 2.0, origin.y),
            Side::Left => Point::new(origin.x, origin.y + size.height / 2.0),
            Side::Right => Point::new(origin.x + size.width, origin.y + size.height / 2.0),
            Side::Bottom => Point::new(origin.x + size.width / 2.0, origin.y + size.height),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Side::Top),
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            "bottom" => Ok(Side::Bottom),
            other => Err(format!("unknown attachment side '{other}'")),
        }
    }
}

/// A named attachment slot: a side plus an optional slot name, written as
/// `side` or `side-slot` (for example `right-src`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Attachment {
    pub side: Side,
    pub slot: Option<String>,
}

impl Attachment {
    pub fn new(side: Side) -> Self {
        Self { side, slot: None }
    }

    pub fn with_slot(side: Side, slot: impl Into<String>) -> Self {
        Self {
            side,
            slot: Some(slot.into()),
        }
    }

    pub fn default_source() -> Self {
        Self::with_slot(Side::Bottom, "src")
    }

    pub fn default_target() -> Self {
        Self::new(Side::Top)
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.slot {
            Some(slot) => write!(f, "{}-{}", self.side.as_str(), slot),
            None => f.write_str(self.side.as_str()),
        }
    }
}

impl FromStr for Attachment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (side, slot) = match value.split_once('-') {
            Some((side, slot)) if !slot.is_empty() => (side, Some(slot.to_string())),
            Some((side, _)) => (side, None),
            None => (value, None),
        };
        Ok(Self {
            side: side.parse()?,
            slot,
        })
    }
}

impl TryFrom<String> for Attachment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Attachment> for String {
    fn from(value: Attachment) -> Self {
        value.to_string()
    }
}

/// One end of a connection: the raw handle coordinate and its side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub point: Point,
    pub side: Side,
}

impl Anchor {
    pub fn new(point: Point, side: Side) -> Self {
        Self { point, side }
    }
}

/// Renderable quadratic curve of an edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePath {
    pub source: Point,
    pub control: Point,
    pub target: Point,
    /// `true` when `control` came from the edge's stored control point.
    pub custom: bool,
}

impl EdgePath {
    pub fn to_svg_path(&self) -> String {
        format!(
            "M {} {} Q {} {} {} {}",
            self.source.x,
            self.source.y,
            self.control.x,
            self.control.y,
            self.target.x,
            self.target.y
        )
    }

    /// Point on the curve at parameter `t` in `[0, 1]`.
    pub fn point_at(&self, t: f64) -> Point {
        let t = t.clamp(0.0, 1.0);
        let u = 1.0 - t;
        Point::new(
            u * u * self.source.x + 2.0 * u * t * self.control.x + t * t * self.target.x,
            u * u * self.source.y + 2.0 * u * t * self.control.y + t * t * self.target.y,
        )
    }
}

/// Moves a raw handle coordinate outward by the handle radius so the curve
/// starts just outside the node boundary.
pub fn adjust_attachment(point: Point, side: Side) -> Point {
    let outward = side.outward();
    Point::new(
        point.x + outward.x * HANDLE_RADIUS,
        point.y + outward.y * HANDLE_RADIUS,
    )
}

/// Perpendicular offset magnitude used for the default curvature.
pub fn default_offset(distance: f64) -> f64 {
    (distance * CURVATURE_FACTOR).clamp(MIN_CURVATURE, MAX_CURVATURE)
}

/// Default control point between two already-adjusted endpoints.
pub fn default_control_point(source: Point, target: Point) -> Point {
    let mid = Point::new((source.x + target.x) / 2.0, (source.y + target.y) / 2.0);
    let dx = target.x - source.x;
    let dy = target.y - source.y;
    let distance = (dx * dx + dy * dy).sqrt();

    let (perp_x, perp_y) = if distance > 0.0 {
        (-dy / distance, dx / distance)
    } else {
        (0.0, 1.0)
    };

    let offset = default_offset(distance);
    Point::new(mid.x + perp_x * offset, mid.y + perp_y * offset)
}

pub fn compute_path(source: Anchor, target: Anchor, control_point: Option<Point>) -> EdgePath {
    let source = adjust_attachment(source.point, source.side);
    let target = adjust_attachment(target.point, target.side);

    match control_point {
        Some(control) => EdgePath {
            source,
            control,
            target,
            custom: true,
        },
        None => EdgePath {
            source,
            control: default_control_point(source, target),
            target,
            custom: false,
        },
    }
}

/// Rejects NaN and infinite coordinates, which would not survive JSON.
pub fn finite_point(point: Point) -> Result<Point, EditError> {
    if point.is_finite() {
        Ok(point)
    } else {
        Err(EditError::NonFinitePoint { x: point.x, y: point.y })
    }
}

/// Pan/zoom transform of the canvas: `screen = canvas * zoom + pan`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ViewportParts")]
pub struct Viewport {
    pan: Point,
    zoom: f64,
}

#[derive(Deserialize)]
struct ViewportParts {
    pan: Point,
    zoom: f64,
}

impl TryFrom<ViewportParts> for Viewport {
    type Error = EditError;

    fn try_from(parts: ViewportParts) -> Result<Self, Self::Error> {
        Viewport::new(parts.pan, parts.zoom)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan: Point::default(),
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(pan: Point, zoom: f64) -> Result<Self, EditError> {
        if !(zoom > 0.0 && zoom.is_finite()) {
            return Err(EditError::InvalidZoom(zoom));
        }
        let pan = finite_point(pan)?;
        Ok(Self { pan, zoom })
    }

    pub fn pan(&self) -> Point {
        self.pan
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn screen_to_canvas(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.pan.x) / self.zoom,
            (screen.y - self.pan.y) / self.zoom,
        )
    }

    pub fn canvas_to_screen(&self, canvas: Point) -> Point {
        Point::new(
            canvas.x * self.zoom + self.pan.x,
            canvas.y * self.zoom + self.pan.y,
        )
    }
}

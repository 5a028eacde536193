//! Normalized CAD entity model.
//!
//! Every source drawing, whatever its DXF flavor, is reduced to this
//! format-independent representation before anything downstream touches it.
//! Normalization rules: 2D points (Z dropped), angles in degrees as stored
//! in DXF, MTEXT paragraph codes decoded to newlines.

use serde::{Deserialize, Serialize};

/// A 2D point (or direction vector, for ellipse axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The twelve entity kinds the pipeline recognizes.
/// Anything else in the source drawing is skipped at extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityKind {
    Line,
    Circle,
    Arc,
    LwPolyline,
    Polyline,
    Ellipse,
    Spline,
    Point,
    Text,
    MText,
    Insert,
    Hatch,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Line => "LINE",
            Self::Circle => "CIRCLE",
            Self::Arc => "ARC",
            Self::LwPolyline => "LWPOLYLINE",
            Self::Polyline => "POLYLINE",
            Self::Ellipse => "ELLIPSE",
            Self::Spline => "SPLINE",
            Self::Point => "POINT",
            Self::Text => "TEXT",
            Self::MText => "MTEXT",
            Self::Insert => "INSERT",
            Self::Hatch => "HATCH",
        }
    }

    pub fn from_dxf_name(name: &str) -> Option<Self> {
        match name {
            "LINE" => Some(Self::Line),
            "CIRCLE" => Some(Self::Circle),
            "ARC" => Some(Self::Arc),
            "LWPOLYLINE" => Some(Self::LwPolyline),
            "POLYLINE" => Some(Self::Polyline),
            "ELLIPSE" => Some(Self::Ellipse),
            "SPLINE" => Some(Self::Spline),
            "POINT" => Some(Self::Point),
            "TEXT" => Some(Self::Text),
            "MTEXT" => Some(Self::MText),
            "INSERT" => Some(Self::Insert),
            "HATCH" => Some(Self::Hatch),
            _ => None,
        }
    }

    pub fn all() -> &'static [EntityKind] {
        &[
            Self::Line,
            Self::Circle,
            Self::Arc,
            Self::LwPolyline,
            Self::Polyline,
            Self::Ellipse,
            Self::Spline,
            Self::Point,
            Self::Text,
            Self::MText,
            Self::Insert,
            Self::Hatch,
        ]
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-specific geometry fields.
///
/// Serializes with a `"type"` tag so a serialized entity reads like the
/// DXF it came from (`{"type": "CIRCLE", "center": ..., "radius": ...}`).
/// This shape is what the label prompt and `extract` dumps carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Geometry {
    Line {
        start: Point,
        end: Point,
    },
    Circle {
        center: Point,
        radius: f64,
    },
    Arc {
        center: Point,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
    LwPolyline {
        points: Vec<Point>,
        closed: bool,
    },
    Polyline {
        points: Vec<Point>,
        closed: bool,
    },
    Ellipse {
        center: Point,
        /// Endpoint of the major axis, relative to the center.
        major_axis: Point,
        ratio: f64,
        start_param: f64,
        end_param: f64,
    },
    Spline {
        degree: u32,
        control_points: Vec<Point>,
        fit_points: Vec<Point>,
    },
    Point {
        location: Point,
    },
    Text {
        insert: Point,
        height: f64,
    },
    MText {
        insert: Point,
        height: f64,
    },
    Insert {
        block_name: String,
        insert: Point,
        x_scale: f64,
        y_scale: f64,
        rotation: f64,
    },
    Hatch {
        pattern: String,
        paths: Vec<Vec<Point>>,
    },
}

impl Geometry {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Line { .. } => EntityKind::Line,
            Self::Circle { .. } => EntityKind::Circle,
            Self::Arc { .. } => EntityKind::Arc,
            Self::LwPolyline { .. } => EntityKind::LwPolyline,
            Self::Polyline { .. } => EntityKind::Polyline,
            Self::Ellipse { .. } => EntityKind::Ellipse,
            Self::Spline { .. } => EntityKind::Spline,
            Self::Point { .. } => EntityKind::Point,
            Self::Text { .. } => EntityKind::Text,
            Self::MText { .. } => EntityKind::MText,
            Self::Insert { .. } => EntityKind::Insert,
            Self::Hatch { .. } => EntityKind::Hatch,
        }
    }
}

/// One extracted CAD primitive.
///
/// Immutable once extracted. Entities carry no persistent identity: a
/// record is identified by its position in extraction order, and nothing
/// outlives the run that extracted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(flatten)]
    pub geometry: Geometry,
    pub layer: String,
    /// Text payload for TEXT/MTEXT; `None` for every other kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
}

impl Entity {
    /// Entity on the default layer with no text payload.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            layer: "0".to_string(),
            text_content: None,
        }
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = layer.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.geometry.kind()
    }
}

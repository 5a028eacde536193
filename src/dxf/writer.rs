//! Minimal DXF document assembly.
//!
//! Builds a standalone ASCII DXF (HEADER, BLOCKS for referenced inserts,
//! ENTITIES) from normalized entities. Encoding is a pure step per entity:
//! either the complete group-code pair list comes back, or a
//! [`EncodeError`] describing why the entity cannot be represented.
//! A failed entity contributes nothing to the document, so no partial
//! group runs ever reach the output.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::models::{Entity, Geometry, Point};

/// Declared DXF version of regenerated documents (R2000, the oldest
/// revision in which every recognized entity kind exists).
pub const DXF_VERSION: &str = "AC1015";

/// Height used for TEXT/MTEXT whose source carried none.
pub const DEFAULT_TEXT_HEIGHT: f64 = 50.0;

/// Half-extent of the placeholder geometry drawn for referenced blocks.
pub const DEFAULT_BLOCK_SIZE: f64 = 50.0;

/// Why a single entity could not be encoded. These are per-entity
/// warnings, never document failures.
#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("non-finite coordinate")]
    NonFiniteCoordinate,
    #[error("radius must be positive, got {0}")]
    InvalidRadius(f64),
    #[error("needs at least {needed} vertices, got {got}")]
    TooFewVertices { needed: usize, got: usize },
    #[error("axis ratio must be in (0, 1], got {0}")]
    InvalidAxisRatio(f64),
    #[error("major axis has zero length")]
    ZeroMajorAxis,
    #[error("text entity has no content")]
    MissingText,
    #[error("insert references an unnamed block")]
    EmptyBlockName,
    #[error("hatch has no usable boundary loop")]
    EmptyBoundary,
}

type Pairs = Vec<(i32, String)>;

fn fmt_f64(v: f64) -> String {
    let s = format!("{v}");
    if s.contains('.') || s.contains('e') {
        s
    } else {
        format!("{s}.0")
    }
}

fn push_point(pairs: &mut Pairs, x_code: i32, y_code: i32, p: Point) {
    pairs.push((x_code, fmt_f64(p.x)));
    pairs.push((y_code, fmt_f64(p.y)));
}

fn finite(points: &[Point]) -> Result<(), EncodeError> {
    if points.iter().all(Point::is_finite) {
        Ok(())
    } else {
        Err(EncodeError::NonFiniteCoordinate)
    }
}

/// Encode one entity as its complete group-code pair sequence.
pub fn encode_entity(entity: &Entity) -> Result<Pairs, EncodeError> {
    let mut pairs: Pairs = Vec::new();

    match &entity.geometry {
        Geometry::Line { start, end } => {
            finite(&[*start, *end])?;
            pairs.push((0, "LINE".into()));
            pairs.push((8, entity.layer.clone()));
            push_point(&mut pairs, 10, 20, *start);
            push_point(&mut pairs, 11, 21, *end);
        }

        Geometry::Circle { center, radius } => {
            finite(&[*center])?;
            if !radius.is_finite() || *radius <= 0.0 {
                return Err(EncodeError::InvalidRadius(*radius));
            }
            pairs.push((0, "CIRCLE".into()));
            pairs.push((8, entity.layer.clone()));
            push_point(&mut pairs, 10, 20, *center);
            pairs.push((40, fmt_f64(*radius)));
        }

        Geometry::Arc {
            center,
            radius,
            start_angle,
            end_angle,
        } => {
            finite(&[*center])?;
            if !radius.is_finite() || *radius <= 0.0 {
                return Err(EncodeError::InvalidRadius(*radius));
            }
            if !start_angle.is_finite() || !end_angle.is_finite() {
                return Err(EncodeError::NonFiniteCoordinate);
            }
            pairs.push((0, "ARC".into()));
            pairs.push((8, entity.layer.clone()));
            push_point(&mut pairs, 10, 20, *center);
            pairs.push((40, fmt_f64(*radius)));
            pairs.push((50, fmt_f64(*start_angle)));
            pairs.push((51, fmt_f64(*end_angle)));
        }

        // Heavyweight polylines are re-emitted as LWPOLYLINE; the vertex
        // geometry is identical and the lightweight form is self-contained.
        Geometry::LwPolyline { points, closed } | Geometry::Polyline { points, closed } => {
            if points.len() < 2 {
                return Err(EncodeError::TooFewVertices {
                    needed: 2,
                    got: points.len(),
                });
            }
            finite(points)?;
            pairs.push((0, "LWPOLYLINE".into()));
            pairs.push((8, entity.layer.clone()));
            pairs.push((90, points.len().to_string()));
            pairs.push((70, if *closed { "1" } else { "0" }.into()));
            for p in points {
                push_point(&mut pairs, 10, 20, *p);
            }
        }

        Geometry::Ellipse {
            center,
            major_axis,
            ratio,
            start_param,
            end_param,
        } => {
            finite(&[*center, *major_axis])?;
            if major_axis.x == 0.0 && major_axis.y == 0.0 {
                return Err(EncodeError::ZeroMajorAxis);
            }
            if !ratio.is_finite() || *ratio <= 0.0 || *ratio > 1.0 {
                return Err(EncodeError::InvalidAxisRatio(*ratio));
            }
            if !start_param.is_finite() || !end_param.is_finite() {
                return Err(EncodeError::NonFiniteCoordinate);
            }
            pairs.push((0, "ELLIPSE".into()));
            pairs.push((8, entity.layer.clone()));
            push_point(&mut pairs, 10, 20, *center);
            push_point(&mut pairs, 11, 21, *major_axis);
            pairs.push((40, fmt_f64(*ratio)));
            pairs.push((41, fmt_f64(*start_param)));
            pairs.push((42, fmt_f64(*end_param)));
        }

        Geometry::Spline {
            degree,
            control_points,
            fit_points,
        } => {
            // Prefer fit points (what most exporters round-trip); fall back
            // to control points when the source had only those.
            let (points, is_fit) = if !fit_points.is_empty() {
                (fit_points, true)
            } else {
                (control_points, false)
            };
            if points.len() < 2 {
                return Err(EncodeError::TooFewVertices {
                    needed: 2,
                    got: points.len(),
                });
            }
            finite(points)?;
            pairs.push((0, "SPLINE".into()));
            pairs.push((8, entity.layer.clone()));
            pairs.push((70, "8".into()));
            pairs.push((71, degree.to_string()));
            if is_fit {
                pairs.push((74, points.len().to_string()));
                for p in points {
                    push_point(&mut pairs, 11, 21, *p);
                }
            } else {
                pairs.push((73, points.len().to_string()));
                for p in points {
                    push_point(&mut pairs, 10, 20, *p);
                }
            }
        }

        Geometry::Point { location } => {
            finite(&[*location])?;
            pairs.push((0, "POINT".into()));
            pairs.push((8, entity.layer.clone()));
            push_point(&mut pairs, 10, 20, *location);
        }

        Geometry::Text { insert, height } => {
            finite(&[*insert])?;
            let text = entity
                .text_content
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or(EncodeError::MissingText)?;
            let height = if *height > 0.0 { *height } else { DEFAULT_TEXT_HEIGHT };
            pairs.push((0, "TEXT".into()));
            pairs.push((8, entity.layer.clone()));
            push_point(&mut pairs, 10, 20, *insert);
            pairs.push((40, fmt_f64(height)));
            pairs.push((1, text.to_string()));
        }

        Geometry::MText { insert, height } => {
            finite(&[*insert])?;
            let text = entity
                .text_content
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or(EncodeError::MissingText)?;
            let height = if *height > 0.0 { *height } else { DEFAULT_TEXT_HEIGHT };
            pairs.push((0, "MTEXT".into()));
            pairs.push((8, entity.layer.clone()));
            push_point(&mut pairs, 10, 20, *insert);
            pairs.push((40, fmt_f64(height)));
            pairs.push((1, text.replace('\n', "\\P")));
        }

        Geometry::Insert {
            block_name,
            insert,
            x_scale,
            y_scale,
            rotation,
        } => {
            finite(&[*insert])?;
            if block_name.trim().is_empty() {
                return Err(EncodeError::EmptyBlockName);
            }
            if ![*x_scale, *y_scale, *rotation].iter().all(|v| v.is_finite()) {
                return Err(EncodeError::NonFiniteCoordinate);
            }
            pairs.push((0, "INSERT".into()));
            pairs.push((8, entity.layer.clone()));
            pairs.push((2, block_name.trim().to_string()));
            push_point(&mut pairs, 10, 20, *insert);
            pairs.push((41, fmt_f64(*x_scale)));
            pairs.push((42, fmt_f64(*y_scale)));
            pairs.push((50, fmt_f64(*rotation)));
        }

        Geometry::Hatch { pattern, paths } => {
            // Only the first boundary loop is carried over.
            let boundary = paths
                .iter()
                .find(|p| p.len() >= 3)
                .ok_or(EncodeError::EmptyBoundary)?;
            finite(boundary)?;
            pairs.push((0, "HATCH".into()));
            pairs.push((8, entity.layer.clone()));
            pairs.push((2, pattern.clone()));
            pairs.push((70, "1".into()));
            pairs.push((91, "1".into()));
            pairs.push((92, "7".into()));
            pairs.push((93, boundary.len().to_string()));
            for p in boundary {
                push_point(&mut pairs, 10, 20, *p);
            }
        }
    }

    Ok(pairs)
}

/// Accumulates encoded entities and renders the finished document.
#[derive(Debug, Default)]
pub struct DocumentWriter {
    blocks: BTreeSet<String>,
    body: Pairs,
    entity_count: usize,
}

impl DocumentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode and append one entity. On error nothing is appended.
    pub fn add_entity(&mut self, entity: &Entity) -> Result<(), EncodeError> {
        let pairs = encode_entity(entity)?;
        if let Geometry::Insert { block_name, .. } = &entity.geometry {
            self.blocks.insert(block_name.trim().to_string());
        }
        self.body.extend(pairs);
        self.entity_count += 1;
        Ok(())
    }

    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// Render the complete document. Valid even with zero entities.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut pair = |code: i32, value: &str| {
            out.push_str(&format!("{code}\n{value}\n"));
        };

        pair(0, "SECTION");
        pair(2, "HEADER");
        pair(9, "$ACADVER");
        pair(1, DXF_VERSION);
        pair(0, "ENDSEC");

        if !self.blocks.is_empty() {
            pair(0, "SECTION");
            pair(2, "BLOCKS");
            for name in &self.blocks {
                render_placeholder_block(&mut pair, name);
            }
            pair(0, "ENDSEC");
        }

        pair(0, "SECTION");
        pair(2, "ENTITIES");
        for (code, value) in &self.body {
            pair(*code, value);
        }
        pair(0, "ENDSEC");
        pair(0, "EOF");

        out
    }
}

/// Generic stand-in geometry for a referenced block whose definition is
/// not carried through extraction: crosshair plus circle.
fn render_placeholder_block(pair: &mut impl FnMut(i32, &str), name: &str) {
    let size = fmt_f64(DEFAULT_BLOCK_SIZE);
    let neg_size = fmt_f64(-DEFAULT_BLOCK_SIZE);

    pair(0, "BLOCK");
    pair(8, "0");
    pair(2, name);
    pair(70, "0");
    pair(10, "0.0");
    pair(20, "0.0");
    pair(30, "0.0");
    pair(3, name);

    pair(0, "LINE");
    pair(8, "0");
    pair(10, &neg_size);
    pair(20, "0.0");
    pair(11, &size);
    pair(21, "0.0");

    pair(0, "LINE");
    pair(8, "0");
    pair(10, "0.0");
    pair(20, &neg_size);
    pair(11, "0.0");
    pair(21, &size);

    pair(0, "CIRCLE");
    pair(8, "0");
    pair(10, "0.0");
    pair(20, "0.0");
    pair(40, &size);

    pair(0, "ENDBLK");
    pair(8, "0");
}

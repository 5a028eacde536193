//! Entity extraction from DXF drawings.
//!
//! `DxfExtractor` walks the ENTITIES section of an ASCII DXF file and
//! yields normalized [`Entity`] records in document order. Exactly twelve
//! entity kinds are recognized; anything else is skipped by consuming its
//! body. Extraction is lazy and non-restartable: the iterator consumes
//! the reader as it goes.
//!
//! Failure policy: unreadable files, malformed group-code structure, and
//! recognized entities missing required fields are all fatal for the run.
//! Unknown group codes inside a recognized entity are ignored, which is
//! what lets drawings from different CAD exporters parse cleanly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::reader::{DxfReader, ReadError};
use crate::models::{Entity, EntityKind, Geometry, Point};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a DXF file: {0}")]
    NotDxf(PathBuf),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("malformed DXF structure: {0}")]
    Structure(String),
    #[error("{kind} entity is missing required field ({what})")]
    MissingField { kind: EntityKind, what: &'static str },
    #[error("invalid numeric value {value:?} for {what}")]
    InvalidNumber { value: String, what: &'static str },
}

fn parse_f64(value: &str, what: &'static str) -> Result<f64, ExtractionError> {
    value
        .trim()
        .parse()
        .map_err(|_| ExtractionError::InvalidNumber {
            value: value.trim().to_string(),
            what,
        })
}

fn parse_u32(value: &str, what: &'static str) -> Result<u32, ExtractionError> {
    value
        .trim()
        .parse()
        .map_err(|_| ExtractionError::InvalidNumber {
            value: value.trim().to_string(),
            what,
        })
}

fn parse_flags(value: &str, what: &'static str) -> Result<i32, ExtractionError> {
    value
        .trim()
        .parse()
        .map_err(|_| ExtractionError::InvalidNumber {
            value: value.trim().to_string(),
            what,
        })
}

#[derive(Debug)]
enum State {
    Scanning,
    InEntities,
    Done,
}

/// Streaming extractor over one DXF document.
#[derive(Debug)]
pub struct DxfExtractor {
    reader: DxfReader,
    state: State,
}

impl DxfExtractor {
    /// Open a `.dxf` file for extraction. The whole file is read up front;
    /// parsing happens lazily as the iterator is driven.
    pub fn open(path: &Path) -> Result<Self, ExtractionError> {
        let is_dxf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dxf"));
        if !is_dxf {
            return Err(ExtractionError::NotDxf(path.to_path_buf()));
        }

        let source = std::fs::read_to_string(path).map_err(|source| ExtractionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::from_source(source))
    }

    /// Extractor over in-memory DXF content.
    pub fn from_source(source: String) -> Self {
        Self {
            reader: DxfReader::new(source),
            state: State::Scanning,
        }
    }

    /// Extract every recognized entity from `path`, logging per-kind
    /// counts. This is the convenience entry the pipeline uses.
    pub fn extract_all(path: &Path) -> Result<Vec<Entity>, ExtractionError> {
        let extractor = Self::open(path)?;
        let entities: Vec<Entity> = extractor.collect::<Result<_, _>>()?;

        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for entity in &entities {
            *counts.entry(entity.kind().as_str()).or_default() += 1;
        }
        for (kind, count) in &counts {
            tracing::debug!(kind, count, "extracted");
        }
        tracing::info!(path = %path.display(), total = entities.len(), "DXF extraction complete");

        Ok(entities)
    }

    fn fail(&mut self, err: ExtractionError) -> Option<Result<Entity, ExtractionError>> {
        self.state = State::Done;
        Some(Err(err))
    }

    /// Consume pairs up to (but not including) the next `0` record.
    fn skip_entity_body(&mut self) -> Result<(), ExtractionError> {
        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 0 {
                self.reader.put_back((code, value));
                break;
            }
        }
        Ok(())
    }

    /// Consume everything up to and including the section's ENDSEC.
    fn skip_section(&mut self) -> Result<(), ExtractionError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDSEC" => return Ok(()),
                Some(_) => continue,
                None => {
                    return Err(ExtractionError::Structure(
                        "section not terminated by ENDSEC".into(),
                    ))
                }
            }
        }
    }

    fn parse_entity(&mut self, kind: EntityKind) -> Result<Entity, ExtractionError> {
        match kind {
            EntityKind::Line => self.parse_line(),
            EntityKind::Circle => self.parse_circle(),
            EntityKind::Arc => self.parse_arc(),
            EntityKind::LwPolyline => self.parse_lwpolyline(),
            EntityKind::Polyline => self.parse_polyline(),
            EntityKind::Ellipse => self.parse_ellipse(),
            EntityKind::Spline => self.parse_spline(),
            EntityKind::Point => self.parse_point(),
            EntityKind::Text => self.parse_text(),
            EntityKind::MText => self.parse_mtext(),
            EntityKind::Insert => self.parse_insert(),
            EntityKind::Hatch => self.parse_hatch(),
        }
    }

    fn parse_line(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::Line;
        let mut layer = None;
        let (mut x1, mut y1, mut x2, mut y2) = (None, None, None, None);

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                10 => x1 = Some(parse_f64(&value, "LINE start x")?),
                20 => y1 = Some(parse_f64(&value, "LINE start y")?),
                11 => x2 = Some(parse_f64(&value, "LINE end x")?),
                21 => y2 = Some(parse_f64(&value, "LINE end y")?),
                _ => {}
            }
        }

        let start = Point::new(
            x1.ok_or(ExtractionError::MissingField { kind, what: "start x" })?,
            y1.ok_or(ExtractionError::MissingField { kind, what: "start y" })?,
        );
        let end = Point::new(
            x2.ok_or(ExtractionError::MissingField { kind, what: "end x" })?,
            y2.ok_or(ExtractionError::MissingField { kind, what: "end y" })?,
        );

        Ok(on_layer(Geometry::Line { start, end }, layer))
    }

    fn parse_circle(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::Circle;
        let mut layer = None;
        let (mut cx, mut cy, mut radius) = (None, None, None);

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                10 => cx = Some(parse_f64(&value, "CIRCLE center x")?),
                20 => cy = Some(parse_f64(&value, "CIRCLE center y")?),
                40 => radius = Some(parse_f64(&value, "CIRCLE radius")?),
                _ => {}
            }
        }

        Ok(on_layer(
            Geometry::Circle {
                center: Point::new(
                    cx.ok_or(ExtractionError::MissingField { kind, what: "center x" })?,
                    cy.ok_or(ExtractionError::MissingField { kind, what: "center y" })?,
                ),
                radius: radius.ok_or(ExtractionError::MissingField { kind, what: "radius" })?,
            },
            layer,
        ))
    }

    fn parse_arc(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::Arc;
        let mut layer = None;
        let (mut cx, mut cy, mut radius) = (None, None, None);
        let (mut start_angle, mut end_angle) = (None, None);

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                10 => cx = Some(parse_f64(&value, "ARC center x")?),
                20 => cy = Some(parse_f64(&value, "ARC center y")?),
                40 => radius = Some(parse_f64(&value, "ARC radius")?),
                50 => start_angle = Some(parse_f64(&value, "ARC start angle")?),
                51 => end_angle = Some(parse_f64(&value, "ARC end angle")?),
                _ => {}
            }
        }

        Ok(on_layer(
            Geometry::Arc {
                center: Point::new(
                    cx.ok_or(ExtractionError::MissingField { kind, what: "center x" })?,
                    cy.ok_or(ExtractionError::MissingField { kind, what: "center y" })?,
                ),
                radius: radius.ok_or(ExtractionError::MissingField { kind, what: "radius" })?,
                start_angle: start_angle
                    .ok_or(ExtractionError::MissingField { kind, what: "start angle" })?,
                end_angle: end_angle
                    .ok_or(ExtractionError::MissingField { kind, what: "end angle" })?,
            },
            layer,
        ))
    }

    fn parse_lwpolyline(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::LwPolyline;
        let mut layer = None;
        let mut closed = false;
        let mut points: Vec<Point> = Vec::new();
        let mut pending_x: Option<f64> = None;

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                70 => closed = parse_flags(&value, "LWPOLYLINE flags")? & 0x01 == 0x01,
                10 => {
                    if pending_x.replace(parse_f64(&value, "LWPOLYLINE vertex x")?).is_some() {
                        return Err(ExtractionError::MissingField { kind, what: "vertex y" });
                    }
                }
                20 => {
                    let y = parse_f64(&value, "LWPOLYLINE vertex y")?;
                    let x = pending_x
                        .take()
                        .ok_or(ExtractionError::MissingField { kind, what: "vertex x" })?;
                    points.push(Point::new(x, y));
                }
                _ => {}
            }
        }

        if pending_x.is_some() {
            return Err(ExtractionError::MissingField { kind, what: "vertex y" });
        }
        if points.is_empty() {
            return Err(ExtractionError::MissingField { kind, what: "vertices" });
        }

        Ok(on_layer(Geometry::LwPolyline { points, closed }, layer))
    }

    /// Heavyweight POLYLINE: header record followed by VERTEX records and
    /// a SEQEND terminator.
    fn parse_polyline(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::Polyline;
        let mut layer = None;
        let mut closed = false;

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                70 => closed = parse_flags(&value, "POLYLINE flags")? & 0x01 == 0x01,
                _ => {}
            }
        }

        let mut points: Vec<Point> = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.as_str() {
                    "VERTEX" => {
                        if let Some(point) = self.parse_vertex_record()? {
                            points.push(point);
                        }
                    }
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        // Missing SEQEND; hand the record back and stop here.
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some(_) => continue,
                None => break,
            }
        }

        if points.is_empty() {
            return Err(ExtractionError::MissingField { kind, what: "vertices" });
        }

        Ok(on_layer(Geometry::Polyline { points, closed }, layer))
    }

    /// One VERTEX record. Returns `None` for non-coordinate records
    /// (polyface face definitions and the like).
    fn parse_vertex_record(&mut self) -> Result<Option<Point>, ExtractionError> {
        let (mut x, mut y) = (None, None);
        let mut flags = 0;

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                10 => x = Some(parse_f64(&value, "VERTEX x")?),
                20 => y = Some(parse_f64(&value, "VERTEX y")?),
                70 => flags = parse_flags(&value, "VERTEX flags")?,
                _ => {}
            }
        }

        // Face-record vertices (bit 0x80 without 0x40) carry indices, not
        // coordinates.
        if flags & 0x80 != 0 && flags & 0x40 == 0 {
            return Ok(None);
        }

        match (x, y) {
            (Some(x), Some(y)) => Ok(Some(Point::new(x, y))),
            _ => Ok(None),
        }
    }

    fn parse_ellipse(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::Ellipse;
        let mut layer = None;
        let (mut cx, mut cy, mut mx, mut my) = (None, None, None, None);
        let mut ratio = 1.0;
        let mut start_param = 0.0;
        let mut end_param = std::f64::consts::TAU;

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                10 => cx = Some(parse_f64(&value, "ELLIPSE center x")?),
                20 => cy = Some(parse_f64(&value, "ELLIPSE center y")?),
                11 => mx = Some(parse_f64(&value, "ELLIPSE major axis x")?),
                21 => my = Some(parse_f64(&value, "ELLIPSE major axis y")?),
                40 => ratio = parse_f64(&value, "ELLIPSE axis ratio")?,
                41 => start_param = parse_f64(&value, "ELLIPSE start parameter")?,
                42 => end_param = parse_f64(&value, "ELLIPSE end parameter")?,
                _ => {}
            }
        }

        Ok(on_layer(
            Geometry::Ellipse {
                center: Point::new(
                    cx.ok_or(ExtractionError::MissingField { kind, what: "center x" })?,
                    cy.ok_or(ExtractionError::MissingField { kind, what: "center y" })?,
                ),
                major_axis: Point::new(
                    mx.ok_or(ExtractionError::MissingField { kind, what: "major axis x" })?,
                    my.ok_or(ExtractionError::MissingField { kind, what: "major axis y" })?,
                ),
                ratio,
                start_param,
                end_param,
            },
            layer,
        ))
    }

    fn parse_spline(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::Spline;
        let mut layer = None;
        let mut degree = 3;
        let mut control_points: Vec<Point> = Vec::new();
        let mut fit_points: Vec<Point> = Vec::new();
        let mut pending_control_x: Option<f64> = None;
        let mut pending_fit_x: Option<f64> = None;

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                71 => degree = parse_u32(&value, "SPLINE degree")?,
                10 => pending_control_x = Some(parse_f64(&value, "SPLINE control point x")?),
                20 => {
                    let y = parse_f64(&value, "SPLINE control point y")?;
                    if let Some(x) = pending_control_x.take() {
                        control_points.push(Point::new(x, y));
                    }
                }
                11 => pending_fit_x = Some(parse_f64(&value, "SPLINE fit point x")?),
                21 => {
                    let y = parse_f64(&value, "SPLINE fit point y")?;
                    if let Some(x) = pending_fit_x.take() {
                        fit_points.push(Point::new(x, y));
                    }
                }
                _ => {}
            }
        }

        if control_points.is_empty() && fit_points.is_empty() {
            return Err(ExtractionError::MissingField { kind, what: "points" });
        }

        Ok(on_layer(
            Geometry::Spline {
                degree,
                control_points,
                fit_points,
            },
            layer,
        ))
    }

    fn parse_point(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::Point;
        let mut layer = None;
        let (mut x, mut y) = (None, None);

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                10 => x = Some(parse_f64(&value, "POINT x")?),
                20 => y = Some(parse_f64(&value, "POINT y")?),
                _ => {}
            }
        }

        Ok(on_layer(
            Geometry::Point {
                location: Point::new(
                    x.ok_or(ExtractionError::MissingField { kind, what: "x" })?,
                    y.ok_or(ExtractionError::MissingField { kind, what: "y" })?,
                ),
            },
            layer,
        ))
    }

    fn parse_text(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::Text;
        let mut layer = None;
        let (mut x, mut y) = (None, None);
        let mut height = 0.0;
        let mut content: Option<String> = None;

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                10 => x = Some(parse_f64(&value, "TEXT insert x")?),
                20 => y = Some(parse_f64(&value, "TEXT insert y")?),
                40 => height = parse_f64(&value, "TEXT height")?,
                1 => content = Some(value),
                _ => {}
            }
        }

        let entity = on_layer(
            Geometry::Text {
                insert: Point::new(
                    x.ok_or(ExtractionError::MissingField { kind, what: "insert x" })?,
                    y.ok_or(ExtractionError::MissingField { kind, what: "insert y" })?,
                ),
                height,
            },
            layer,
        );
        let content = content.ok_or(ExtractionError::MissingField { kind, what: "text" })?;
        Ok(entity.with_text(content))
    }

    fn parse_mtext(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::MText;
        let mut layer = None;
        let (mut x, mut y) = (None, None);
        let mut height = 0.0;
        let mut fragments: Vec<String> = Vec::new();

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                10 => x = Some(parse_f64(&value, "MTEXT insert x")?),
                20 => y = Some(parse_f64(&value, "MTEXT insert y")?),
                40 => height = parse_f64(&value, "MTEXT height")?,
                // 3 carries continuation fragments for long text, 1 the tail.
                1 | 3 => fragments.push(value),
                _ => {}
            }
        }

        if fragments.is_empty() {
            return Err(ExtractionError::MissingField { kind, what: "text" });
        }
        let content: String = fragments
            .into_iter()
            .map(|fragment| fragment.replace("\\P", "\n"))
            .collect();

        let entity = on_layer(
            Geometry::MText {
                insert: Point::new(
                    x.ok_or(ExtractionError::MissingField { kind, what: "insert x" })?,
                    y.ok_or(ExtractionError::MissingField { kind, what: "insert y" })?,
                ),
                height,
            },
            layer,
        );
        Ok(entity.with_text(content))
    }

    fn parse_insert(&mut self) -> Result<Entity, ExtractionError> {
        let kind = EntityKind::Insert;
        let mut layer = None;
        let mut block_name: Option<String> = None;
        let (mut x, mut y) = (None, None);
        let mut x_scale = 1.0;
        let mut y_scale = 1.0;
        let mut rotation = 0.0;

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                2 => block_name = Some(value.trim().to_string()),
                10 => x = Some(parse_f64(&value, "INSERT x")?),
                20 => y = Some(parse_f64(&value, "INSERT y")?),
                41 => x_scale = parse_f64(&value, "INSERT x scale")?,
                42 => y_scale = parse_f64(&value, "INSERT y scale")?,
                50 => rotation = parse_f64(&value, "INSERT rotation")?,
                _ => {}
            }
        }

        Ok(on_layer(
            Geometry::Insert {
                block_name: block_name
                    .ok_or(ExtractionError::MissingField { kind, what: "block name" })?,
                insert: Point::new(
                    x.ok_or(ExtractionError::MissingField { kind, what: "insert x" })?,
                    y.ok_or(ExtractionError::MissingField { kind, what: "insert y" })?,
                ),
                x_scale,
                y_scale,
                rotation,
            },
            layer,
        ))
    }

    /// HATCH boundary data: each loop opens with a 92 path-type flag.
    /// Only polyline loops (bit 2) carry plain vertex lists; edge-based
    /// loops are ignored, matching what the labelling prompt can use.
    fn parse_hatch(&mut self) -> Result<Entity, ExtractionError> {
        let mut layer = None;
        let mut pattern = String::from("SOLID");
        let mut paths: Vec<Vec<Point>> = Vec::new();
        let mut current: Option<Vec<Point>> = None;
        let mut pending_x: Option<f64> = None;

        while let Some((code, value)) = self.reader.next_pair()? {
            match code {
                0 => {
                    self.reader.put_back((code, value));
                    break;
                }
                8 => layer = Some(value.trim().to_string()),
                2 => pattern = value.trim().to_string(),
                92 => {
                    if let Some(path) = current.take() {
                        if !path.is_empty() {
                            paths.push(path);
                        }
                    }
                    pending_x = None;
                    let flags = parse_flags(&value, "HATCH path type")?;
                    current = (flags & 0x02 != 0).then(Vec::new);
                }
                10 => {
                    if current.is_some() {
                        pending_x = Some(parse_f64(&value, "HATCH vertex x")?);
                    }
                }
                20 => {
                    if let Some(path) = current.as_mut() {
                        let y = parse_f64(&value, "HATCH vertex y")?;
                        if let Some(x) = pending_x.take() {
                            path.push(Point::new(x, y));
                        }
                    }
                }
                _ => {}
            }
        }

        if let Some(path) = current.take() {
            if !path.is_empty() {
                paths.push(path);
            }
        }

        Ok(on_layer(Geometry::Hatch { pattern, paths }, layer))
    }
}

fn on_layer(geometry: Geometry, layer: Option<String>) -> Entity {
    let entity = Entity::new(geometry);
    match layer {
        Some(layer) if !layer.is_empty() => entity.with_layer(layer),
        _ => entity,
    }
}

impl Iterator for DxfExtractor {
    type Item = Result<Entity, ExtractionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                State::Done => return None,
                State::Scanning => match self.reader.next_pair() {
                    Ok(Some((0, value))) if value == "SECTION" => {
                        let name = match self.reader.next_pair() {
                            Ok(Some((2, name))) => name,
                            Ok(_) => {
                                return self.fail(ExtractionError::Structure(
                                    "SECTION without a name record".into(),
                                ))
                            }
                            Err(e) => return self.fail(e.into()),
                        };
                        if name == "ENTITIES" {
                            self.state = State::InEntities;
                        } else if let Err(e) = self.skip_section() {
                            return self.fail(e);
                        }
                    }
                    Ok(Some((0, value))) if value == "EOF" => {
                        self.state = State::Done;
                        return None;
                    }
                    Ok(Some(_)) => continue,
                    Ok(None) => {
                        self.state = State::Done;
                        return None;
                    }
                    Err(e) => return self.fail(e.into()),
                },
                State::InEntities => match self.reader.next_pair() {
                    Ok(Some((0, value))) => match value.as_str() {
                        "ENDSEC" => {
                            self.state = State::Done;
                            return None;
                        }
                        "SEQEND" => {
                            if let Err(e) = self.skip_entity_body() {
                                return self.fail(e);
                            }
                        }
                        name => match EntityKind::from_dxf_name(name) {
                            Some(kind) => {
                                return match self.parse_entity(kind) {
                                    Ok(entity) => Some(Ok(entity)),
                                    Err(e) => self.fail(e),
                                }
                            }
                            None => {
                                if let Err(e) = self.skip_entity_body() {
                                    return self.fail(e);
                                }
                            }
                        },
                    },
                    Ok(Some((code, _))) => {
                        return self.fail(ExtractionError::Structure(format!(
                            "unexpected group code {code} between entities"
                        )))
                    }
                    Ok(None) => {
                        return self.fail(ExtractionError::Structure(
                            "ENTITIES section not terminated by ENDSEC".into(),
                        ))
                    }
                    Err(e) => return self.fail(e.into()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> Vec<Entity> {
        DxfExtractor::from_source(source.to_string())
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn wrap_entities(body: &str) -> String {
        format!("0\nSECTION\n2\nENTITIES\n{body}0\nENDSEC\n0\nEOF\n")
    }

    #[test]
    fn extracts_line_with_layer() {
        let source = wrap_entities("0\nLINE\n8\nWALLS\n10\n0.0\n20\n0.0\n11\n100.0\n21\n50.0\n");
        let entities = extract(&source);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind(), EntityKind::Line);
        assert_eq!(entities[0].layer, "WALLS");
        match &entities[0].geometry {
            Geometry::Line { start, end } => {
                assert_eq!(*start, Point::new(0.0, 0.0));
                assert_eq!(*end, Point::new(100.0, 50.0));
            }
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[test]
    fn extracts_circle_and_arc() {
        let source = wrap_entities(concat!(
            "0\nCIRCLE\n10\n5.0\n20\n5.0\n40\n2.5\n",
            "0\nARC\n10\n0.0\n20\n0.0\n40\n10.0\n50\n0.0\n51\n90.0\n",
        ));
        let entities = extract(&source);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].kind(), EntityKind::Circle);
        match &entities[1].geometry {
            Geometry::Arc {
                radius,
                start_angle,
                end_angle,
                ..
            } => {
                assert_eq!(*radius, 10.0);
                assert_eq!(*start_angle, 0.0);
                assert_eq!(*end_angle, 90.0);
            }
            other => panic!("expected arc, got {other:?}"),
        }
    }

    #[test]
    fn unknown_entity_kinds_are_skipped() {
        let source = wrap_entities(concat!(
            "0\nLINE\n10\n0.0\n20\n0.0\n11\n1.0\n21\n1.0\n",
            "0\nSOLID\n10\n0.0\n20\n0.0\n11\n1.0\n21\n0.0\n12\n0.0\n22\n1.0\n",
            "0\nCIRCLE\n10\n0.0\n20\n0.0\n40\n1.0\n",
        ));
        let entities = extract(&source);
        let kinds: Vec<EntityKind> = entities.iter().map(Entity::kind).collect();
        assert_eq!(kinds, vec![EntityKind::Line, EntityKind::Circle]);
    }

    #[test]
    fn lwpolyline_collects_vertices_and_closed_flag() {
        let source = wrap_entities(
            "0\nLWPOLYLINE\n90\n3\n70\n1\n10\n0.0\n20\n0.0\n10\n10.0\n20\n0.0\n10\n10.0\n20\n10.0\n",
        );
        let entities = extract(&source);
        match &entities[0].geometry {
            Geometry::LwPolyline { points, closed } => {
                assert_eq!(points.len(), 3);
                assert!(*closed);
            }
            other => panic!("expected lwpolyline, got {other:?}"),
        }
    }

    #[test]
    fn polyline_consumes_vertex_sequence() {
        let source = wrap_entities(concat!(
            "0\nPOLYLINE\n66\n1\n70\n0\n",
            "0\nVERTEX\n10\n0.0\n20\n0.0\n",
            "0\nVERTEX\n10\n5.0\n20\n5.0\n",
            "0\nSEQEND\n",
            "0\nPOINT\n10\n1.0\n20\n2.0\n",
        ));
        let entities = extract(&source);
        assert_eq!(entities.len(), 2);
        match &entities[0].geometry {
            Geometry::Polyline { points, closed } => {
                assert_eq!(points.len(), 2);
                assert!(!closed);
            }
            other => panic!("expected polyline, got {other:?}"),
        }
        assert_eq!(entities[1].kind(), EntityKind::Point);
    }

    #[test]
    fn text_and_mtext_carry_content() {
        let source = wrap_entities(concat!(
            "0\nTEXT\n10\n1.0\n20\n2.0\n40\n25.0\n1\nKITCHEN\n",
            "0\nMTEXT\n10\n0.0\n20\n0.0\n40\n12.0\n3\nfirst \n1\nline\\Psecond line\n",
        ));
        let entities = extract(&source);
        assert_eq!(entities[0].text_content.as_deref(), Some("KITCHEN"));
        assert_eq!(
            entities[1].text_content.as_deref(),
            Some("first line\nsecond line")
        );
    }

    #[test]
    fn insert_defaults_scale_and_rotation() {
        let source = wrap_entities("0\nINSERT\n2\nDOOR\n10\n10.0\n20\n20.0\n");
        let entities = extract(&source);
        match &entities[0].geometry {
            Geometry::Insert {
                block_name,
                x_scale,
                y_scale,
                rotation,
                ..
            } => {
                assert_eq!(block_name, "DOOR");
                assert_eq!((*x_scale, *y_scale, *rotation), (1.0, 1.0, 0.0));
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn hatch_collects_polyline_loops_only() {
        let source = wrap_entities(concat!(
            "0\nHATCH\n2\nANSI31\n91\n2\n",
            // Polyline loop, 3 vertices
            "92\n7\n93\n3\n10\n0.0\n20\n0.0\n10\n10.0\n20\n0.0\n10\n5.0\n20\n8.0\n",
            // Edge-based loop (no polyline bit), ignored
            "92\n1\n93\n1\n10\n99.0\n20\n99.0\n",
        ));
        let entities = extract(&source);
        match &entities[0].geometry {
            Geometry::Hatch { pattern, paths } => {
                assert_eq!(pattern, "ANSI31");
                assert_eq!(paths.len(), 1);
                assert_eq!(paths[0].len(), 3);
            }
            other => panic!("expected hatch, got {other:?}"),
        }
    }

    #[test]
    fn sections_other_than_entities_are_skipped() {
        let source = concat!(
            "0\nSECTION\n2\nHEADER\n9\n$ACADVER\n1\nAC1015\n0\nENDSEC\n",
            "0\nSECTION\n2\nTABLES\n0\nLAYER\n2\nWALLS\n0\nENDSEC\n",
            "0\nSECTION\n2\nENTITIES\n0\nPOINT\n10\n1.0\n20\n1.0\n0\nENDSEC\n",
            "0\nEOF\n",
        );
        let entities = extract(source);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind(), EntityKind::Point);
    }

    #[test]
    fn missing_required_field_is_fatal() {
        let source = wrap_entities("0\nCIRCLE\n10\n5.0\n20\n5.0\n");
        let result: Result<Vec<Entity>, _> =
            DxfExtractor::from_source(source).collect();
        assert!(matches!(
            result,
            Err(ExtractionError::MissingField {
                kind: EntityKind::Circle,
                ..
            })
        ));
    }

    #[test]
    fn garbage_group_code_is_fatal() {
        let source = wrap_entities("0\nLINE\nnot-a-code\nvalue\n");
        let result: Result<Vec<Entity>, _> =
            DxfExtractor::from_source(source).collect();
        assert!(matches!(result, Err(ExtractionError::Read(_))));
    }

    #[test]
    fn unterminated_entities_section_is_fatal() {
        let source = "0\nSECTION\n2\nENTITIES\n0\nPOINT\n10\n1.0\n20\n1.0\n".to_string();
        let result: Result<Vec<Entity>, _> = DxfExtractor::from_source(source).collect();
        assert!(matches!(result, Err(ExtractionError::Structure(_))));
    }

    #[test]
    fn drawing_without_entities_section_is_empty() {
        let source = "0\nSECTION\n2\nHEADER\n0\nENDSEC\n0\nEOF\n";
        assert!(extract(source).is_empty());
    }

    #[test]
    fn iterator_is_lazy_and_stops_after_error() {
        let source = wrap_entities("0\nCIRCLE\n10\n5.0\n20\n5.0\n0\nPOINT\n10\n1.0\n20\n1.0\n");
        let mut it = DxfExtractor::from_source(source);
        assert!(matches!(it.next(), Some(Err(_))));
        assert!(it.next().is_none());
    }

    #[test]
    fn open_rejects_non_dxf_extension() {
        let err = DxfExtractor::open(Path::new("/tmp/drawing.pdf")).unwrap_err();
        assert!(matches!(err, ExtractionError::NotDxf(_)));
    }

    #[test]
    fn open_reports_missing_file() {
        let err = DxfExtractor::open(Path::new("/nonexistent/drawing.dxf")).unwrap_err();
        assert!(matches!(err, ExtractionError::Io { .. }));
    }
}

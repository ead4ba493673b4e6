//! # KML Parser Module
//!
//! Reads the geography half of a Gabmap dataset: a KML 2.2 document whose
//! point placemarks are localities and whose first polygon is the boundary
//! ring of the surveyed area.
//!
//! Elements are matched by local name, so documents with or without the
//! `kml:` prefix (or with a missing default namespace) read the same way.
//!
//! ## Placemark rules
//! * A placemark that contains a `Polygon` anywhere inside it is a boundary
//!   record and never becomes a locality.
//! * Otherwise the placemark needs a direct `name` child and a
//!   `coordinates` element somewhere below it. Only the first
//!   `lon,lat[,alt]` tuple of that element is used.
//! * Placemarks whose coordinates do not parse are skipped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info};

use crate::error::{ConvertError, Result};
use crate::model::{BoundaryPath, Coordinates, GeoLocalities, GeoLocality};

/// Localities and the boundary ring read from one KML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KmlDocument {
    pub localities: GeoLocalities,
    /// Vertices of the first polygon in the document, if it had any.
    pub boundary: Option<BoundaryPath>,
}

#[derive(Debug, Default)]
struct PlacemarkState {
    /// Element depth of the `Placemark` itself.
    depth: usize,
    name: Option<String>,
    description: Option<String>,
    coordinates: Option<String>,
    has_polygon: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Name,
    Description,
    Coordinates,
}

#[derive(Debug, Default)]
struct BoundaryState {
    /// Depth of the first `Polygon` while we are inside it.
    polygon_depth: Option<usize>,
    /// Set once the first polygon has been closed.
    done: bool,
    /// Depth of the `coordinates` element being captured.
    capture_depth: Option<usize>,
    text: Option<String>,
}

/// Parses a KML document into point localities and the first boundary ring.
///
/// Fails only when the document is not well-formed XML.
pub fn parse_geo_file(bytes: &[u8]) -> Result<KmlDocument> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    let mut doc = KmlDocument::default();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut placemark: Option<PlacemarkState> = None;
    let mut capture: Option<(Field, usize)> = None;
    let mut boundary = BoundaryState::default();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| malformed(reader.error_position(), e.to_string()))?;

        match event {
            Event::Start(e) => {
                depth += 1;
                saw_root = true;
                if let Some(field) = open_element(&e, depth, &mut placemark, &mut boundary) {
                    capture = Some((field, depth));
                }
                if boundary.text.is_none() && boundary.polygon_depth.is_some() && is_coordinates(&e)
                {
                    boundary.capture_depth = Some(depth);
                    boundary.text = Some(String::new());
                }
            }
            Event::Empty(e) => {
                saw_root = true;
                // An empty element opens and closes in one event.
                let inner = depth + 1;
                open_element(&e, inner, &mut placemark, &mut boundary);
                if boundary.text.is_none() && boundary.polygon_depth.is_some() && is_coordinates(&e)
                {
                    boundary.text = Some(String::new());
                }
                close_element(&e, inner, &mut placemark, &mut boundary, &mut doc);
            }
            Event::End(e) => {
                if capture.is_some_and(|(_, d)| d == depth) {
                    capture = None;
                }
                if boundary.capture_depth == Some(depth) {
                    boundary.capture_depth = None;
                }
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                close_named(&name, depth, &mut placemark, &mut boundary, &mut doc);
                depth = depth.saturating_sub(1);
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(reader.buffer_position(), e.to_string()))?;
                append_text(&text, depth, capture, &mut placemark, &mut boundary);
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                append_text(&text, depth, capture, &mut placemark, &mut boundary);
            }
            Event::Eof => break,
            _ => (),
        }
        buf.clear();
    }

    if !saw_root {
        return Err(malformed(reader.buffer_position(), "no element found".into()));
    }
    if depth != 0 {
        return Err(malformed(
            reader.buffer_position(),
            format!("document ended with {} unclosed element(s)", depth),
        ));
    }

    doc.boundary = boundary
        .text
        .as_deref()
        .map(parse_boundary_ring)
        .filter(|path| !path.is_empty());

    info!(
        "Parsed KML: {} localities, boundary ring with {} vertices",
        doc.localities.len(),
        doc.boundary.as_ref().map_or(0, |b| b.vertices.len())
    );
    Ok(doc)
}

fn malformed(position: u64, message: String) -> ConvertError {
    ConvertError::MalformedGeoFile { position, message }
}

fn is_coordinates(e: &BytesStart) -> bool {
    e.local_name().as_ref() == b"coordinates"
}

/// Handles an opening tag at `depth` and returns the placemark field whose text should be captured.
fn open_element(
    e: &BytesStart,
    depth: usize,
    placemark: &mut Option<PlacemarkState>,
    boundary: &mut BoundaryState,
) -> Option<Field> {
    let local = e.local_name();
    match local.as_ref() {
        b"Placemark" => {
            if placemark.is_none() {
                *placemark = Some(PlacemarkState {
                    depth,
                    ..Default::default()
                });
            }
            None
        }
        b"Polygon" => {
            if !boundary.done && boundary.polygon_depth.is_none() {
                boundary.polygon_depth = Some(depth);
            }
            if let Some(pm) = placemark.as_mut() {
                pm.has_polygon = true;
            }
            None
        }
        b"name" => {
            let pm = placemark.as_mut().filter(|pm| depth == pm.depth + 1)?;
            pm.name = Some(String::new());
            Some(Field::Name)
        }
        b"description" => {
            let pm = placemark.as_mut().filter(|pm| depth == pm.depth + 1)?;
            pm.description = Some(String::new());
            Some(Field::Description)
        }
        b"coordinates" => {
            let pm = placemark.as_mut().filter(|pm| pm.coordinates.is_none())?;
            pm.coordinates = Some(String::new());
            Some(Field::Coordinates)
        }
        _ => None,
    }
}

fn close_element(
    e: &BytesStart,
    depth: usize,
    placemark: &mut Option<PlacemarkState>,
    boundary: &mut BoundaryState,
    doc: &mut KmlDocument,
) {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    close_named(&name, depth, placemark, boundary, doc);
}

fn close_named(
    name: &str,
    depth: usize,
    placemark: &mut Option<PlacemarkState>,
    boundary: &mut BoundaryState,
    doc: &mut KmlDocument,
) {
    match name {
        "Polygon" if boundary.polygon_depth == Some(depth) => {
            boundary.polygon_depth = None;
            boundary.done = true;
        }
        "Placemark" if placemark.as_ref().is_some_and(|pm| pm.depth == depth) => {
            if let Some(pm) = placemark.take() {
                finish_placemark(pm, doc);
            }
        }
        _ => (),
    }
}

fn append_text(
    text: &str,
    depth: usize,
    capture: Option<(Field, usize)>,
    placemark: &mut Option<PlacemarkState>,
    boundary: &mut BoundaryState,
) {
    if boundary.capture_depth == Some(depth) {
        if let Some(buf) = boundary.text.as_mut() {
            buf.push_str(text);
        }
    }

    let Some((field, capture_depth)) = capture else {
        return;
    };
    if capture_depth != depth {
        return;
    }
    let Some(pm) = placemark.as_mut() else {
        return;
    };
    let target = match field {
        Field::Name => pm.name.as_mut(),
        Field::Description => pm.description.as_mut(),
        Field::Coordinates => pm.coordinates.as_mut(),
    };
    if let Some(buf) = target {
        buf.push_str(text);
    }
}

fn finish_placemark(pm: PlacemarkState, doc: &mut KmlDocument) {
    if pm.has_polygon {
        debug!("Placemark {:?} holds a polygon; treating it as boundary", pm.name);
        return;
    }
    let (Some(name), Some(coordinates)) = (pm.name, pm.coordinates) else {
        debug!("Skipping placemark without name or coordinates");
        return;
    };
    let name = name.trim().to_string();
    match parse_coordinate_tuple(&coordinates) {
        Some(coordinates) => {
            let code = pm.description.map(|d| d.trim().to_string()).unwrap_or_default();
            doc.localities.insert(
                name,
                GeoLocality {
                    coordinates: Some(coordinates),
                    code,
                },
            );
        }
        None => debug!(
            "Skipping placemark {:?}: unparseable coordinates {:?}",
            name,
            coordinates.trim()
        ),
    }
}

/// Parses the first `lon,lat[,alt]` tuple of a KML `coordinates` text.
///
/// Returns `None` when there is no tuple or either number does not parse.
pub fn parse_coordinate_tuple(text: &str) -> Option<Coordinates> {
    let first = text.split_whitespace().next()?;
    let mut parts = first.split(',');
    let lon = parse_number(parts.next()?)?;
    let lat = parse_number(parts.next()?)?;
    Some(Coordinates { lat, lon })
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses every `lon,lat[,alt]` tuple of a polygon ring, skipping bad ones.
pub fn parse_boundary_ring(text: &str) -> BoundaryPath {
    let vertices = text
        .split_whitespace()
        .filter_map(|tuple| {
            let vertex = parse_coordinate_tuple(tuple);
            if vertex.is_none() {
                debug!("Skipping boundary vertex {:?}", tuple);
            }
            vertex
        })
        .collect();
    BoundaryPath { vertices }
}

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::Result;
use crate::model::{BoundaryPath, Coordinates, GeoLocalities};
use crate::writer::format_coordinate;

pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

/// Name of the placemark that carries the boundary polygon.
pub const BOUNDARY_PLACEMARK: &str = "Boundaries";

pub struct KmlWriter {
    indent: usize,
}

impl Default for KmlWriter {
    fn default() -> Self {
        Self { indent: 2 }
    }
}

impl KmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indent(indent: usize) -> Self {
        Self { indent }
    }

    /// Renders one placemark per locality, plus the boundary polygon if given.
    pub fn render(
        &self,
        localities: &GeoLocalities,
        boundary: Option<&BoundaryPath>,
    ) -> Result<Vec<u8>> {
        tracing::info!(
            "Writing KML: {} placemarks, boundary: {}",
            localities.len(),
            boundary.is_some()
        );

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', self.indent);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(
            BytesStart::new("kml").with_attributes([("xmlns", KML_NAMESPACE)]),
        ))?;
        writer.write_event(Event::Start(BytesStart::new("Document")))?;

        // 地点ごとのPlacemark
        for (name, locality) in localities.iter() {
            writer.write_event(Event::Start(BytesStart::new("Placemark")))?;
            write_text_element(&mut writer, "name", name)?;

            // 座標が不明な地点はPointを出力しない
            if let Some(Coordinates { lat, lon }) = locality.coordinates {
                writer.write_event(Event::Start(BytesStart::new("Point")))?;
                write_text_element(&mut writer, "coordinates", &coordinate_tuple(lon, lat))?;
                writer.write_event(Event::End(BytesEnd::new("Point")))?;
            }

            writer.write_event(Event::End(BytesEnd::new("Placemark")))?;
        }

        // 境界ポリゴン
        if let Some(boundary) = boundary {
            self.write_boundary(&mut writer, boundary)?;
        }

        writer.write_event(Event::End(BytesEnd::new("Document")))?;
        writer.write_event(Event::End(BytesEnd::new("kml")))?;

        Ok(writer.into_inner())
    }

    fn write_boundary(&self, writer: &mut Writer<Vec<u8>>, boundary: &BoundaryPath) -> Result<()> {
        let ring: Vec<String> = boundary
            .vertices
            .iter()
            .map(|v| coordinate_tuple(v.lon, v.lat))
            .collect();

        writer.write_event(Event::Start(BytesStart::new("Placemark")))?;
        write_text_element(writer, "name", BOUNDARY_PLACEMARK)?;
        for element in ["Polygon", "outerBoundaryIs", "LinearRing"] {
            writer.write_event(Event::Start(BytesStart::new(element)))?;
        }
        write_text_element(writer, "coordinates", &ring.join(" "))?;
        for element in ["LinearRing", "outerBoundaryIs", "Polygon", "Placemark"] {
            writer.write_event(Event::End(BytesEnd::new(element)))?;
        }
        Ok(())
    }
}

/// Renders a KML document with the default two-space indentation.
pub fn render_geo_file(
    localities: &GeoLocalities,
    boundary: Option<&BoundaryPath>,
) -> Result<Vec<u8>> {
    KmlWriter::new().render(localities, boundary)
}

fn coordinate_tuple(lon: f64, lat: f64) -> String {
    format!("{},{},0", format_coordinate(lon), format_coordinate(lat))
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

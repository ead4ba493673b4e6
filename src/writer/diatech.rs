use tracing::debug;

use crate::matcher::NameIndex;
use crate::model::{BoundaryPath, Coordinates, GeoLocalities, GeoLocality, LinguisticTable};
use crate::writer::{format_coordinate, CRLF};

/// Wraps a value in double quotes as-is; embedded quotes are not doubled.
fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}

/// Renders a Diatech table.
///
/// Columns follow the linguistic table's insertion order. A locality whose
/// name matches a geographic record (ignoring case and surrounding
/// whitespace) is written as `"Name[lat,lon]"` using the geographic display
/// name, any other as `"Name"`.
pub fn render_table(table: &LinguisticTable, geo: &GeoLocalities) -> Vec<u8> {
    let index = NameIndex::new(geo.iter());
    let mut out = String::new();

    // ヘッダー行: 空のセル + 地点ごとの列
    out.push_str(&quoted(""));
    for name in table.localities.keys() {
        out.push(';');
        out.push_str(&header_field(name, &index));
    }
    out.push_str(CRLF);

    // データ行: 概念ごとに1行
    for (i, concept) in table.concepts.iter().enumerate() {
        out.push_str(&quoted(concept));
        for (_, variants) in table.localities.iter() {
            out.push(';');
            out.push_str(&quoted(variants.get(i).map_or("", String::as_str)));
        }
        out.push_str(CRLF);
    }

    out.into_bytes()
}

fn header_field(name: &str, index: &NameIndex<'_, GeoLocality>) -> String {
    match index.lookup(name) {
        Some((
            geo_name,
            GeoLocality {
                coordinates: Some(Coordinates { lat, lon }),
                ..
            },
        )) => quoted(&format!(
            "{}[{},{}]",
            geo_name,
            format_coordinate(*lat),
            format_coordinate(*lon)
        )),
        _ => {
            debug!("No coordinates for {:?}; writing bare column name", name);
            quoted(name)
        }
    }
}

/// Renders a Diatech boundaries file, one `"longitude";"latitude"` line per vertex.
///
/// Returns `None` when there is no boundary to write.
pub fn render_boundaries(boundary: Option<&BoundaryPath>) -> Option<Vec<u8>> {
    let boundary = boundary.filter(|b| !b.is_empty())?;
    let mut out = String::new();
    for vertex in &boundary.vertices {
        out.push_str(&quoted(&format_coordinate(vertex.lon)));
        out.push(';');
        out.push_str(&quoted(&format_coordinate(vertex.lat)));
        out.push_str(CRLF);
    }
    Some(out.into_bytes())
}

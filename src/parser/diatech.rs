//! # Diatech Parser Module
//!
//! A Diatech table is a `;`-separated, `"`-quoted CSV. The header row starts
//! with a blank placeholder and then names one locality per column, with its
//! coordinates embedded in the name:
//!
//! ```text
//! "";"Villa, Cundinamarca[4.5,-74.1]";"Tunja[5.5,-73.3]";"Sin coordenadas"
//! "CASA";"casa1";"casa2";"casa3"
//! ```
//!
//! The header grammar is a single rule, see [`parse_header_field`]. Data rows
//! start with a concept label and map their remaining fields positionally to
//! the header's localities.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::encoding::{decode_utf8_strict, split_lines};
use crate::error::Result;
use crate::model::{BoundaryPath, Coordinates, GeoLocalities, GeoLocality, LinguisticTable};

/// `Name[lat,lon]`, where `Name` may carry a `, Department` suffix and the
/// comma between the numbers may be surrounded by whitespace.
static HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^"?(.+?)\[([0-9.-]+)\s*,\s*([0-9.-]+)\]"?$"#).expect("header pattern is valid")
});

/// A Diatech table split into its linguistic and geographic halves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiatechTable {
    pub table: LinguisticTable,
    /// Every header column, with or without coordinates, in header order.
    pub geo: GeoLocalities,
}

/// One decoded header column.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderField {
    pub name: String,
    pub coordinates: Option<Coordinates>,
}

/// Decomposes a header field according to the `Name[lat,lon]` rule.
///
/// * `"Villa[4.5,-74.1]"` gives `Villa` at (4.5, -74.1).
/// * `"Villa, Cundinamarca[4.5,-74.1]"` gives `Villa`; the department is dropped.
/// * A field without the bracket pattern is a locality without coordinates.
///   Should it still contain brackets, the text before the first `[` is the name.
///
/// Never fails: a header that cannot be decomposed degrades to "no coordinates".
pub fn parse_header_field(field: &str) -> HeaderField {
    if let Some(caps) = HEADER_PATTERN.captures(field) {
        let lat = caps[2].parse::<f64>().ok().filter(|v| v.is_finite());
        let lon = caps[3].parse::<f64>().ok().filter(|v| v.is_finite());
        if let (Some(lat), Some(lon)) = (lat, lon) {
            let full = caps[1].trim_matches('"');
            let name = full.split(',').next().unwrap_or(full).trim();
            return HeaderField {
                name: name.to_string(),
                coordinates: Some(Coordinates { lat, lon }),
            };
        }
        warn!("Header {:?} has unreadable coordinates; keeping it without", field);
    }

    let mut name = field.trim_matches('"');
    if name.contains('[') && name.contains(']') {
        name = name.split('[').next().unwrap_or(name).trim();
    }
    HeaderField {
        name: name.to_string(),
        coordinates: None,
    }
}

/// Returns the concept label of a data row, or `None` if the row should be skipped.
pub fn row_concept(record: &csv::StringRecord) -> Option<String> {
    let label = clean_field(record.get(0)?);
    (!label.is_empty()).then(|| label.to_string())
}

fn clean_field(field: &str) -> &str {
    field.trim().trim_matches('"').trim()
}

/// Reads one line as a `;`-separated, `"`-quoted record.
///
/// Each line gets its own reader, so an unbalanced quote damages only its
/// own row. Returns `None` for a line with no fields.
pub fn read_record(line: &str) -> Result<Option<csv::StringRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .quote(b'"')
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let record = reader.records().next().transpose()?;
    Ok(record)
}

/// Parses a Diatech table into concepts, locality variants and header geography.
///
/// Localities enter the variant table when a data row first carries a value
/// for them; the geography keeps every header column.
pub fn parse_table(bytes: &[u8]) -> Result<DiatechTable> {
    let text = decode_utf8_strict(bytes, "Diatech table")?;
    let mut lines = split_lines(&text);

    let mut parsed = DiatechTable::default();
    let Some(header_line) = lines.next() else {
        return Ok(parsed);
    };
    let header = read_record(header_line)?.unwrap_or_default();

    let columns: Vec<String> = header
        .iter()
        .skip(1)
        .map(|field| {
            let column = parse_header_field(field);
            parsed.geo.insert(
                column.name.clone(),
                GeoLocality {
                    coordinates: column.coordinates,
                    code: String::new(),
                },
            );
            column.name
        })
        .collect();

    let table = &mut parsed.table;
    for (line_no, line) in lines.enumerate() {
        let Some(record) = read_record(line)? else {
            continue;
        };
        let Some(concept) = row_concept(&record) else {
            debug!("Skipping line {}: no concept", line_no + 2);
            continue;
        };
        table.concepts.push(concept);
        let n = table.concepts.len();

        for (name, variant) in columns.iter().zip(record.iter().skip(1)) {
            let variants = table.localities.get_or_insert_with(name, Vec::new);
            if variants.len() < n {
                variants.resize(n, String::new());
            }
            variants[n - 1] = clean_field(variant).to_string();
        }
    }
    table.conform();

    info!(
        "Parsed Diatech table: {} concepts, {} localities, {} header columns",
        parsed.table.concepts.len(),
        parsed.table.localities.len(),
        parsed.geo.len()
    );
    Ok(parsed)
}

/// Parses one `"longitude";"latitude"` line, or `None` if it is not a vertex.
pub fn parse_boundary_vertex(line: &str) -> Option<Coordinates> {
    let mut fields = line.trim().split(';');
    let lon = clean_field(fields.next()?).parse::<f64>().ok()?;
    let lat = clean_field(fields.next()?).parse::<f64>().ok()?;
    (lon.is_finite() && lat.is_finite()).then_some(Coordinates { lat, lon })
}

/// Parses a Diatech boundaries file into a ring, in file order.
///
/// Returns `None` when the file holds no readable vertex.
pub fn parse_boundaries(bytes: &[u8]) -> Result<Option<BoundaryPath>> {
    let text = decode_utf8_strict(bytes, "Diatech boundaries")?;
    let vertices: Vec<Coordinates> = split_lines(&text)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let vertex = parse_boundary_vertex(line);
            if vertex.is_none() {
                debug!("Skipping boundary line {:?}", line);
            }
            vertex
        })
        .collect();

    info!("Parsed {} boundary vertices", vertices.len());
    Ok((!vertices.is_empty()).then_some(BoundaryPath { vertices }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;

    #[test]
    fn test_header_with_coordinates() {
        let field = parse_header_field("Villa[4.5,-74.1]");
        assert_eq!(field.name, "Villa");
        assert_eq!(field.coordinates, Some(Coordinates { lat: 4.5, lon: -74.1 }));
    }

    #[test]
    fn test_header_drops_department() {
        let field = parse_header_field("Villa, Cundinamarca[4.5,-74.1]");
        assert_eq!(field.name, "Villa");
        assert_eq!(field.coordinates, Some(Coordinates { lat: 4.5, lon: -74.1 }));
    }

    #[test]
    fn test_header_allows_spaces_around_comma() {
        let field = parse_header_field("Pasto[1.2 , -77.3]");
        assert_eq!(field.coordinates, Some(Coordinates { lat: 1.2, lon: -77.3 }));
    }

    #[test]
    fn test_header_without_coordinates() {
        let field = parse_header_field("Sin datos");
        assert_eq!(field.name, "Sin datos");
        assert_eq!(field.coordinates, None);

        let field = parse_header_field("Roto[norte,sur]");
        assert_eq!(field.name, "Roto");
        assert_eq!(field.coordinates, None);
    }

    #[test]
    fn test_header_with_unreadable_numbers_degrades() {
        let field = parse_header_field("Raro[4.5.1,-7-4]");
        assert_eq!(field.name, "Raro");
        assert_eq!(field.coordinates, None);
    }

    #[test]
    fn test_parse_table() {
        let csv = "\"\";\"Bogotá[4.5,-74.1]\";\"Tunja, Boyacá[5.5,-73.3]\"\r\n\
                   \"CASA\";\"casa1\";\"casa2\"\r\n\
                   \" AGUA\";\"agua1\";\"\"\r\n";
        let parsed = parse_table(csv.as_bytes()).unwrap();

        assert_eq!(parsed.table.concepts, vec!["CASA", "AGUA"]);
        assert_eq!(
            parsed.table.localities.keys().collect::<Vec<_>>(),
            vec!["Bogotá", "Tunja"]
        );
        assert_eq!(parsed.table.localities.get("Tunja").unwrap(), &vec!["casa2", ""]);
        assert_eq!(
            parsed.geo.get("Tunja").unwrap().coordinates,
            Some(Coordinates { lat: 5.5, lon: -73.3 })
        );
    }

    #[test]
    fn test_embedded_semicolons_in_quotes() {
        let csv = "\"\";\"A\"\n\"CASA\";\"ca;sa\"\n";
        let parsed = parse_table(csv.as_bytes()).unwrap();
        assert_eq!(parsed.table.localities.get("A").unwrap(), &vec!["ca;sa"]);
    }

    #[test]
    fn test_unbalanced_quote_stays_in_its_row() {
        // `"` written unescaped by the Diatech writer
        let csv = "\"\";\"X\"\r\n\"A\";\"\"\"\r\n\"B\";\"b1\"\r\n\"C\";\"c1\"\r\n";
        let parsed = parse_table(csv.as_bytes()).unwrap();

        assert_eq!(parsed.table.concepts, vec!["A", "B", "C"]);
        assert_eq!(parsed.table.localities.get("X").unwrap(), &vec!["", "b1", "c1"]);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let csv = "\"\";\"A\"\r\n\r\n\"UNO\";\"a1\"\r\n";
        let parsed = parse_table(csv.as_bytes()).unwrap();
        assert_eq!(parsed.table.concepts, vec!["UNO"]);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let csv = "\"\";\"A\";\"B\"\n\"UNO\";\"a1\";\"b1\"\n\"DOS\";\"a2\"\n\"\";\"x\";\"y\"\n";
        let parsed = parse_table(csv.as_bytes()).unwrap();

        assert_eq!(parsed.table.concepts, vec!["UNO", "DOS"]);
        assert_eq!(parsed.table.localities.get("B").unwrap(), &vec!["b1", ""]);
    }

    #[test]
    fn test_header_only_column_stays_in_geography() {
        let csv = "\"\";\"A[1,2]\";\"B[3,4]\"\n\"UNO\";\"a1\"\n";
        let parsed = parse_table(csv.as_bytes()).unwrap();

        assert_eq!(parsed.table.localities.len(), 1);
        assert_eq!(parsed.geo.len(), 2);
    }

    #[test]
    fn test_invalid_utf8_is_a_decode_error() {
        let result = parse_table(b"\"\";\"Bogot\xE1\"\n");
        assert!(matches!(result, Err(ConvertError::Decode { .. })));
    }

    #[test]
    fn test_parse_boundaries() {
        let path = parse_boundaries(b"\"-74.1\";\"4.5\"\r\n\"-74.2\";\"4.6\"\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            path.vertices,
            vec![
                Coordinates { lat: 4.5, lon: -74.1 },
                Coordinates { lat: 4.6, lon: -74.2 }
            ]
        );
    }

    #[test]
    fn test_boundaries_skip_unreadable_lines() {
        let path = parse_boundaries(b"\"lon\";\"lat\"\n-74.1;4.5\n\"solo\"\n")
            .unwrap()
            .unwrap();
        assert_eq!(path.vertices.len(), 1);
    }

    #[test]
    fn test_empty_boundaries_are_absent() {
        assert_eq!(parse_boundaries(b"").unwrap(), None);
        assert_eq!(parse_boundaries(b"\r\n  \r\n").unwrap(), None);
    }
}

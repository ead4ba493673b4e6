//! Conversions in both directions.
//!
//! Each conversion is a pure function of its input buffers:
//! read → reconcile → write, returning the output buffers and a [`Stats`]
//! record. Nothing is cached between calls.

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{ConvertError, Result};
use crate::matcher::reconcile;
use crate::model::NameKey;
use crate::parser::{parse_boundaries, parse_geo_file, parse_linguistic_table, parse_table};
use crate::writer::{render_boundaries, render_geo_file, render_linguistic_table, render_table};

/// How many unmatched names are listed in [`MatchSummary::sample_unmatched`].
pub const UNMATCHED_SAMPLE_SIZE: usize = 10;

/// Default name for a Diatech table whose original filename is unknown.
pub const DEFAULT_DIATECH_NAME: &str = "dialec.csv";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub concept_count: usize,
    pub locality_count: usize,
    pub localities_with_coords: usize,
    /// Only present for Gabmap → Diatech.
    #[serde(flatten)]
    pub matching: Option<MatchSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    pub matched_count: usize,
    pub unmatched_count: usize,
    /// Up to [`UNMATCHED_SAMPLE_SIZE`] unmatched names as written in the table,
    /// ordered by their case-folded form.
    pub sample_unmatched: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiatechOutput {
    pub csv: Vec<u8>,
    /// `None` when the KML has no boundary polygon.
    pub boundaries: Option<Vec<u8>>,
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GabmapOutput {
    pub txt: Vec<u8>,
    pub kml: Vec<u8>,
    pub stats: Stats,
}

/// Converts a Gabmap TXT + KML pair into a Diatech table and boundaries file.
pub fn gabmap_to_diatech(txt: &[u8], kml: &[u8]) -> Result<DiatechOutput> {
    let table = parse_linguistic_table(txt);
    let geo = parse_geo_file(kml)?;

    let reconciliation = reconcile(table.localities.keys(), geo.localities.keys());

    // 表示用には元の地点名を使う
    let mut display: HashMap<NameKey, &str> = HashMap::new();
    for name in table.localities.keys() {
        display.entry(NameKey::new(name)).or_insert(name);
    }
    // キー順（大文字小文字を区別しない）で先頭から選ぶ
    let sample_unmatched: Vec<String> = reconciliation
        .unmatched
        .iter()
        .take(UNMATCHED_SAMPLE_SIZE)
        .filter_map(|key| display.get(key).map(|name| name.to_string()))
        .collect();

    if !reconciliation.unmatched.is_empty() {
        warn!(
            "{} localities have no coordinates in the KML, e.g. {:?}",
            reconciliation.unmatched.len(),
            sample_unmatched
        );
    }

    let csv = render_table(&table, &geo.localities);
    let boundaries = render_boundaries(geo.boundary.as_ref());

    let stats = Stats {
        concept_count: table.concepts.len(),
        locality_count: table.localities.len(),
        localities_with_coords: geo.localities.len(),
        matching: Some(MatchSummary {
            matched_count: reconciliation.matched.len(),
            unmatched_count: reconciliation.unmatched.len(),
            sample_unmatched,
        }),
    };
    info!(
        "Gabmap → Diatech: {} concepts, {} localities, {} matched",
        stats.concept_count,
        stats.locality_count,
        reconciliation.matched.len()
    );

    Ok(DiatechOutput {
        csv,
        boundaries,
        stats,
    })
}

/// Converts a Diatech table (and optional boundaries file) into a Gabmap TXT + KML pair.
///
/// An empty table is an error; an empty boundaries file just means no boundary.
pub fn diatech_to_gabmap(csv: &[u8], boundaries: Option<&[u8]>) -> Result<GabmapOutput> {
    if csv.iter().all(u8::is_ascii_whitespace) {
        return Err(ConvertError::EmptyTable);
    }

    let parsed = parse_table(csv)?;
    let boundary = match boundaries {
        Some(bytes) => parse_boundaries(bytes)?,
        None => None,
    };

    let txt = render_linguistic_table(&parsed.table);
    let kml = render_geo_file(&parsed.geo, boundary.as_ref())?;

    let stats = Stats {
        concept_count: parsed.table.concepts.len(),
        locality_count: parsed.table.localities.len(),
        localities_with_coords: parsed
            .geo
            .iter()
            .filter(|(_, g)| g.coordinates.is_some())
            .count(),
        matching: None,
    };
    info!(
        "Diatech → Gabmap: {} concepts, {} localities, {} with coordinates",
        stats.concept_count, stats.locality_count, stats.localities_with_coords
    );

    Ok(GabmapOutput { txt, kml, stats })
}

/// File names for the outputs of one conversion, derived from the input names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    /// Main output file, e.g. `dialec.csv` or `dialec.txt`.
    pub primary: String,
    /// Second output file, relative to the archive root.
    pub secondary: String,
    pub archive: String,
}

impl OutputNames {
    /// Names for Gabmap → Diatech: `<txt>.csv`, `boundaries/<kml>.csv`, `<txt>-diatech.zip`.
    pub fn for_diatech(txt_name: &str, kml_name: &str) -> Self {
        let txt_stem = file_stem(txt_name);
        Self {
            primary: format!("{}.csv", txt_stem),
            secondary: format!("boundaries/{}.csv", file_stem(kml_name)),
            archive: format!("{}-diatech.zip", txt_stem),
        }
    }

    /// Names for Diatech → Gabmap: `<csv>.txt`, `<csv>.kml`, `<csv>-gabmap.zip`.
    pub fn for_gabmap(csv_name: Option<&str>) -> Self {
        let stem = file_stem(csv_name.unwrap_or(DEFAULT_DIATECH_NAME));
        Self {
            primary: format!("{}.txt", stem),
            secondary: format!("{}.kml", stem),
            archive: format!("{}-gabmap.zip", stem),
        }
    }
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

use tracing::{debug, info};

use crate::encoding::{decode_text, split_lines};
use crate::model::{ConceptList, LinguisticTable};

/// Parses a Gabmap linguistic table (tab-separated, localities × concepts).
///
/// The first line lists the concepts; a blank leading field is the
/// placeholder above the locality-name column and is dropped. Every other
/// line is `name\tvariant\tvariant...`. Lines with fewer than two fields are
/// skipped, and variant rows are padded or truncated to the concept count.
pub fn parse_linguistic_table(bytes: &[u8]) -> LinguisticTable {
    let decoded = decode_text(bytes);
    let mut lines = split_lines(&decoded.text);

    let mut table = LinguisticTable {
        concepts: lines.next().map(parse_concepts).unwrap_or_default(),
        ..Default::default()
    };

    for (line_no, line) in lines.enumerate() {
        match split_locality_row(line) {
            Some((name, variants)) => {
                table.localities.insert(name, variants);
            }
            None => debug!("Skipping line {}: fewer than two fields", line_no + 2),
        }
    }
    table.conform();

    info!(
        "Parsed Gabmap table: {} concepts, {} localities",
        table.concepts.len(),
        table.localities.len()
    );
    table
}

fn parse_concepts(line: &str) -> ConceptList {
    let mut concepts: ConceptList = line.trim().split('\t').map(str::to_string).collect();
    if concepts.first().is_some_and(|c| c.trim().is_empty()) {
        concepts.remove(0);
    }
    concepts
}

/// Splits one data line into a locality name and its raw variants.
///
/// Returns `None` for lines that carry no variant column.
pub fn split_locality_row(line: &str) -> Option<(String, Vec<String>)> {
    let mut fields = line.trim().split('\t');
    let name = fields.next()?.trim().to_string();
    let variants: Vec<String> = fields.map(str::to_string).collect();
    if variants.is_empty() {
        return None;
    }
    Some((name, variants))
}

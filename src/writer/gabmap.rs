use crate::model::LinguisticTable;
use crate::writer::CRLF;

/// Renders a Gabmap linguistic table.
///
/// The first line holds the concepts; localities follow sorted by name,
/// each as `name\tvariant...` padded to the concept count.
pub fn render_linguistic_table(table: &LinguisticTable) -> Vec<u8> {
    let n = table.concepts.len();
    let mut out = String::new();

    // 1行目: 概念
    out.push_str(&table.concepts.join("\t"));
    out.push_str(CRLF);

    // 地点名でソートして出力
    let mut rows: Vec<(&str, &Vec<String>)> = table.localities.iter().collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));

    for (name, variants) in rows {
        out.push_str(bare_locality_name(name));
        out.push('\t');
        let cells: Vec<&str> = (0..n)
            .map(|i| variants.get(i).map_or("", String::as_str))
            .collect();
        out.push_str(&cells.join("\t"));
        out.push_str(CRLF);
    }

    out.into_bytes()
}

/// Strips a `, Department[lat,lon]` suffix left over from a Diatech header.
///
/// Names without a `[...]` pair are written as-is, commas included.
pub fn bare_locality_name(name: &str) -> &str {
    match name.split_once('[') {
        Some((before, _)) if name.contains(']') => {
            before.split(',').next().unwrap_or(before).trim()
        }
        _ => name,
    }
}

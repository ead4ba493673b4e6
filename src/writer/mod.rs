//! Serializers for both dataset formats.
//!
//! Every writer produces the complete file as bytes; the caller decides where
//! the bytes go. Text files use CRLF line endings, which is what the
//! receiving tools write themselves.

pub mod diatech;
pub mod gabmap;
pub mod kml;

pub use diatech::{render_boundaries, render_table};
pub use gabmap::render_linguistic_table;
pub use kml::{render_geo_file, KmlWriter};

pub(crate) const CRLF: &str = "\r\n";

/// Formats a coordinate as shortest round-trip text, always with a decimal point.
pub fn format_coordinate(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{}.0", text)
    } else {
        text
    }
}

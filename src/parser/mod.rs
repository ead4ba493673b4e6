//! Readers for both dataset formats.
//!
//! Readers never abort on a single bad row or placemark. They skip it and
//! log at `debug` level; only undecodable or unparseable documents are errors.

pub mod diatech;
pub mod gabmap;
pub mod kml;

pub use diatech::{parse_boundaries, parse_table, DiatechTable};
pub use gabmap::parse_linguistic_table;
pub use kml::{parse_geo_file, KmlDocument};

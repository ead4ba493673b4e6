use thiserror::Error;

/// Failures surfaced to the caller of a conversion.
///
/// Per-row and per-placemark irregularities never end up here: they are
/// skipped by the readers and show up in the statistics instead.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{what} is not valid UTF-8 (invalid sequence at byte {offset})")]
    Decode { what: &'static str, offset: usize },

    #[error("malformed KML at byte {position}: {message}")]
    MalformedGeoFile { position: u64, message: String },

    #[error("the Diatech table is empty")]
    EmptyTable,

    #[error("archive does not contain a {0}")]
    MissingArchiveEntry(&'static str),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("ZIP error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

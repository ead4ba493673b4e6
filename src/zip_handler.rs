use std::io::{Cursor, Read, Write};
use std::path::Path;

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::convert::{DiatechOutput, GabmapOutput, OutputNames};
use crate::error::{ConvertError, Result};

/// The files of a Diatech dataset found inside a ZIP archive.
#[derive(Debug, Clone, PartialEq)]
pub struct DiatechBundle {
    /// Base name of the main table, e.g. `dialec.csv`.
    pub csv_name: String,
    pub csv: Vec<u8>,
    pub boundaries: Option<Vec<u8>>,
}

/// Reads Diatech datasets out of an in-memory ZIP archive.
pub struct ZipHandler<'a> {
    bytes: &'a [u8],
}

impl<'a> ZipHandler<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Finds the main table and the optional boundaries file.
    ///
    /// Any `.csv` under a `boundaries/` directory is the boundaries file; the
    /// first other `.csv` is the main table.
    pub fn extract_diatech(&self) -> Result<DiatechBundle> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes))?;
        let mut main: Option<(String, Vec<u8>)> = None;
        let mut boundaries = None;

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            if !name.ends_with(".csv") {
                debug!("Ignoring archive entry {}", name);
                continue;
            }

            if name.to_lowercase().contains("boundaries/") {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                boundaries = Some(buf);
            } else if main.is_none() {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                let base = Path::new(&name)
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone());
                main = Some((base, buf));
            }
        }

        let (csv_name, csv) = main.ok_or(ConvertError::MissingArchiveEntry("main CSV table"))?;
        info!(
            "Found {} in archive (boundaries: {})",
            csv_name,
            boundaries.is_some()
        );
        Ok(DiatechBundle {
            csv_name,
            csv,
            boundaries,
        })
    }
}

/// Packs `(path, contents)` entries into a deflated ZIP archive.
pub fn write_archive<'e>(entries: impl IntoIterator<Item = (&'e str, &'e [u8])>) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (path, contents) in entries {
        zip.start_file(path, options)?;
        zip.write_all(contents)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Packs a Gabmap → Diatech result: the table at the root, boundaries under `boundaries/`.
pub fn package_diatech(output: &DiatechOutput, names: &OutputNames) -> Result<Vec<u8>> {
    let mut entries: Vec<(&str, &[u8])> = vec![(names.primary.as_str(), output.csv.as_slice())];
    if let Some(boundaries) = &output.boundaries {
        entries.push((names.secondary.as_str(), boundaries.as_slice()));
    }
    write_archive(entries)
}

/// Packs a Diatech → Gabmap result: TXT and KML side by side.
pub fn package_gabmap(output: &GabmapOutput, names: &OutputNames) -> Result<Vec<u8>> {
    write_archive([
        (names.primary.as_str(), output.txt.as_slice()),
        (names.secondary.as_str(), output.kml.as_slice()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Stats;

    #[test]
    fn test_extract_diatech_bundle() {
        let archive = write_archive([
            ("readme.txt", b"hola".as_slice()),
            ("datos/dialec.csv", b"\"\";\"A\"\r\n".as_slice()),
            ("otro.csv", b"ignored".as_slice()),
            ("Boundaries/colombia.csv", b"\"1\";\"2\"\r\n".as_slice()),
        ])
        .unwrap();

        let bundle = ZipHandler::new(&archive).extract_diatech().unwrap();
        assert_eq!(bundle.csv_name, "dialec.csv");
        assert_eq!(bundle.csv, b"\"\";\"A\"\r\n");
        assert_eq!(bundle.boundaries.as_deref(), Some(b"\"1\";\"2\"\r\n".as_slice()));
    }

    #[test]
    fn test_missing_main_table() {
        let archive = write_archive([("boundaries/b.csv", b"1;2".as_slice())]).unwrap();
        let result = ZipHandler::new(&archive).extract_diatech();
        assert!(matches!(result, Err(ConvertError::MissingArchiveEntry(_))));
    }

    #[test]
    fn test_not_a_zip() {
        let result = ZipHandler::new(b"definitely not a zip").extract_diatech();
        assert!(matches!(result, Err(ConvertError::Archive(_))));
    }

    #[test]
    fn test_package_diatech_without_boundaries() {
        let output = DiatechOutput {
            csv: b"\"\"\r\n".to_vec(),
            boundaries: None,
            stats: Stats::default(),
        };
        let names = OutputNames::for_diatech("dialec.txt", "mapa.kml");
        let archive = package_diatech(&output, &names).unwrap();

        let zip = ZipArchive::new(Cursor::new(archive.as_slice())).unwrap();
        let files: Vec<&str> = zip.file_names().collect();
        assert_eq!(files, vec!["dialec.csv"]);
    }
}

pub mod convert;
pub mod encoding;
pub mod error;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod writer;
pub mod zip_handler;

pub use convert::{diatech_to_gabmap, gabmap_to_diatech, DiatechOutput, GabmapOutput, OutputNames, Stats};
pub use error::{ConvertError, Result};
pub use model::{BoundaryPath, Coordinates, GeoLocality, LinguisticTable};
pub use zip_handler::{DiatechBundle, ZipHandler};

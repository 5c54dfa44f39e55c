use thiserror::Error;

/// Failure converting a single source page. Terminal for that page only.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("no code/name cells matched in {bytes} bytes of markup")]
    Extraction { bytes: usize },
    #[error("record list is empty, nothing to classify")]
    EmptyInput,
    #[error("province {code} ({name}) has no cities or areas")]
    Structure { code: u32, name: String },
}

//! Error types owned by this crate's pure logic (hashing, Work assembly).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkBuilderError {
    #[error("destination-selectors.yaml names directory {0:?} more than once")]
    DuplicateSelectorDirectory(String),

    #[error("destination-selectors.yaml directory {0:?} is not a single top-level name")]
    NonTopLevelDirectory(String),

    #[error("reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path:?} as YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

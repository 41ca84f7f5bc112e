use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by discovery and profile reconciliation.
///
/// A missing profile file and an unparseable profile file are not errors:
/// the first is reported as a skip, the second is repaired to an empty document.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No bundle-root candidate holds an `extensions/` directory and a `package.json`.
    #[error(
        "cannot find repo root (extensions/ directory); searched: {}",
        display_paths(.searched)
    )]
    MissingBundleRoot { searched: Vec<PathBuf> },

    /// The bundle root exists but no plugin manifest was found beneath it.
    #[error("no plugins found in {}", .extensions_dir.display())]
    EmptyCatalog { extensions_dir: PathBuf },

    /// Every selected profile file is absent.
    #[error("no openclaw config files found ({}); run 'bot init' first", display_paths(.searched))]
    NoProfiles { searched: Vec<PathBuf> },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A known key holds a value of the wrong shape.
    #[error("section '{section}' has an unexpected shape: {source}")]
    MismatchedSection {
        section: String,
        source: serde_json::Error,
    },

    #[error("failed to serialize profile document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ReconcileError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReconcileError::Io {
            path: path.into(),
            source,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<none>".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

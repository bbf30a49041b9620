use super::ConfigMirror;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Failed to read mirror file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mirror file {path} is not valid mirror JSON: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize mirror: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write mirror file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigMirror {
    /// Loads the mirror from `path`. A missing file yields an empty mirror.
    pub async fn load(path: &Path) -> Result<Self, MirrorError> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Mirror file {} does not exist, starting empty",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(MirrorError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mirror: Self = serde_json::from_slice(&content).map_err(|source| MirrorError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "Loaded mirror from {} ({} values)",
            path.display(),
            mirror.len()
        );
        Ok(mirror)
    }

    /// Rewrites the whole file in place.
    pub async fn save(&self, path: &Path) -> Result<(), MirrorError> {
        let content = self.to_pretty_json()?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| MirrorError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Mirror written to {}", path.display());
        Ok(())
    }

    /// JSON with four-space indentation, the layout the configuration UIs write.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>, MirrorError> {
        let mut buf = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut serializer)?;
        Ok(buf)
    }
}

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Subscribed when the topics file lists no filter.
pub const DEFAULT_FILTER: &str = "/devices/+/controls/+";

#[derive(Debug, thiserror::Error)]
#[error("Failed to read subscription file {path}: {source}")]
pub struct SubscriptionError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Topic filters the broker session subscribes to, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionList {
    filters: Vec<String>,
}

impl SubscriptionList {
    /// Reads one filter per line. Lines are trimmed; blank lines and `#` comments
    /// are skipped. A file without any filter yields [`DEFAULT_FILTER`].
    pub async fn load(path: &Path) -> Result<Self, SubscriptionError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| SubscriptionError {
                    path: path.to_path_buf(),
                    source,
                })?;

        let mut list = Self::parse(&content);
        if list.is_empty() {
            warn!(
                "No topic filters in {}, subscribing to {}",
                path.display(),
                DEFAULT_FILTER
            );
            list.filters.push(DEFAULT_FILTER.to_string());
        }
        info!(
            "Loaded {} topic filters from {}",
            list.len(),
            path.display()
        );
        Ok(list)
    }

    pub fn parse(content: &str) -> Self {
        let filters = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .inspect(|line| debug!("Topic filter: {}", line))
            .map(str::to_string)
            .collect();
        Self { filters }
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

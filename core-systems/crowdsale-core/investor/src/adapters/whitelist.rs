//! Whitelist seed read from a TOML file.
//!
//! ```toml
//! [[tiers]]
//! tier = 0
//! entries = [{ address = "0x...", min = "1", max = "100" }]
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use crowdsale_launchpad::chain::{ChainError, TierWhitelist, WhitelistService};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
struct WhitelistFile {
    #[serde(default)]
    tiers: Vec<TierWhitelist>,
}

pub struct FileWhitelistService {
    path: PathBuf,
}

impl FileWhitelistService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WhitelistService for FileWhitelistService {
    async fn fetch_capped_assets(&self) -> Result<Vec<TierWhitelist>, ChainError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ChainError::Rpc(format!("{}: {e}", self.path.display())))?;
        let file: WhitelistFile =
            toml::from_str(&raw).map_err(|e| ChainError::Decode(format!("{}: {e}", self.path.display())))?;
        info!(path = %self.path.display(), tiers = file.tiers.len(), "whitelist seed loaded");
        Ok(file.tiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_tier_entries() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
[[tiers]]
tier = 1
entries = [
  {{ address = "0x0000000000000000000000000000000000000001", min = "1", max = "10" }},
  {{ address = "0x0000000000000000000000000000000000000002", min = "2", max = "20" }},
]
"#
        )
        .unwrap();

        let lists = FileWhitelistService::new(f.path()).fetch_capped_assets().await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].tier, 1);
        assert_eq!(lists[0].entries[1].max, "20");
    }

    #[tokio::test]
    async fn missing_or_malformed_file_errors() {
        let svc = FileWhitelistService::new("/definitely/not/here.toml");
        assert!(matches!(svc.fetch_capped_assets().await, Err(ChainError::Rpc(_))));

        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "tiers = 3").unwrap();
        let svc = FileWhitelistService::new(f.path());
        assert!(matches!(svc.fetch_capped_assets().await, Err(ChainError::Decode(_))));
    }
}

//! Zone lookup and selection.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{HarnessError, ProvisionError, Result};

const ZONE_PATTERN: &str = r"^[a-z]+-[a-z]+[0-9]+-[a-z]$";

/// Lists the zones of a region that are up.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ZoneLister: Send + Sync {
    /// Returns the available zones of `region` in `project`.
    async fn zones(&self, project: &str, region: &str) -> Result<Vec<String>>;
}

/// [`ZoneLister`] backed by `gcloud compute zones list`.
#[derive(Debug, Clone)]
pub struct GcloudZones {
    bin: String,
}

impl GcloudZones {
    /// Creates a lister that runs the given gcloud binary.
    #[must_use]
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for GcloudZones {
    fn default() -> Self {
        Self::new("gcloud")
    }
}

#[async_trait]
impl ZoneLister for GcloudZones {
    async fn zones(&self, project: &str, region: &str) -> Result<Vec<String>> {
        let command = format!("{} compute zones list", self.bin);
        let filter = format!("--filter=region:{region} AND status:UP");
        let output = Command::new(&self.bin)
            .args([
                "compute",
                "zones",
                "list",
                "--project",
                project,
                filter.as_str(),
                "--format=value(name)",
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProvisionError::new(&command, ".", None, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ProvisionError::new(command, ".", output.status.code(), stderr).into());
        }
        parse_zone_list(&String::from_utf8_lossy(&output.stdout), region)
    }
}

/// Keeps the well-formed zone names of `region` from gcloud output.
fn parse_zone_list(stdout: &str, region: &str) -> Result<Vec<String>> {
    let pattern = Regex::new(ZONE_PATTERN)
        .map_err(|e| HarnessError::Config(format!("zone pattern: {e}")))?;
    let prefix = format!("{region}-");
    let mut zones: Vec<String> = stdout
        .lines()
        .map(str::trim)
        .filter(|z| pattern.is_match(z) && z.starts_with(&prefix))
        .map(String::from)
        .collect();
    zones.sort();
    zones.dedup();
    debug!(region = %region, zones = ?zones, "Listed zones");
    Ok(zones)
}

/// Picks one random zone of `region`.
pub async fn random_zone(lister: &dyn ZoneLister, project: &str, region: &str) -> Result<String> {
    let zones = lister.zones(project, region).await?;
    let zone = zones
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| HarnessError::Config(format!("no zones are up in region {region}")))?;
    info!(zone = %zone, "Picked zone");
    Ok(zone)
}

/// Picks two different random zones of `region`.
pub async fn two_distinct_zones(
    lister: &dyn ZoneLister,
    project: &str,
    region: &str,
) -> Result<(String, String)> {
    let zones = lister.zones(project, region).await?;
    if zones.len() < 2 {
        return Err(HarnessError::Config(format!(
            "region {region} needs at least two zones, found {}",
            zones.len()
        )));
    }
    let picked: Vec<String> = zones
        .choose_multiple(&mut rand::thread_rng(), 2)
        .cloned()
        .collect();
    match picked.as_slice() {
        [first, second] => {
            info!(first = %first, second = %second, "Picked two distinct zones");
            Ok((first.clone(), second.clone()))
        }
        _ => Err(HarnessError::Config(format!(
            "could not pick two zones in region {region}"
        ))),
    }
}

//! Google Cloud lookups made by the `bootstrap` stage.

mod zones;

pub use zones::{random_zone, two_distinct_zones, GcloudZones, ZoneLister};

use rand::seq::SliceRandom;
use tracing::info;

use crate::config::EnvSource;
use crate::errors::{HarnessError, Result};

/// Environment variables that may hold the project id, in lookup order.
pub const PROJECT_ENV_VARS: [&str; 4] = [
    "GOOGLE_CLOUD_PROJECT",
    "GOOGLE_CLOUD_PROJECT_ID",
    "GCLOUD_PROJECT",
    "CLOUDSDK_CORE_PROJECT",
];

/// Returns the first non-empty project id variable.
pub fn project_id_from_env(env: &dyn EnvSource) -> Result<String> {
    PROJECT_ENV_VARS
        .iter()
        .find_map(|name| env.var(name).filter(|v| !v.trim().is_empty()))
        .map(|v| v.trim().to_string())
        .ok_or_else(|| {
            HarnessError::Config(format!(
                "no project id set; export one of {}",
                PROJECT_ENV_VARS.join(", ")
            ))
        })
}

/// Picks a random region from `approved` that is not `forbidden`.
pub fn random_region(approved: &[String], forbidden: &[String]) -> Result<String> {
    let candidates: Vec<&String> = approved.iter().filter(|r| !forbidden.contains(*r)).collect();
    let region = candidates
        .choose(&mut rand::thread_rng())
        .map(|r| (*r).clone())
        .ok_or_else(|| {
            HarnessError::Config("every approved region is forbidden".to_string())
        })?;
    info!(region = %region, candidates = candidates.len(), "Picked region");
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapEnv;

    fn regions(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_project_id_lookup_order() {
        let env = MapEnv::new()
            .with("GCLOUD_PROJECT", "from-gcloud")
            .with("GOOGLE_CLOUD_PROJECT_ID", "from-project-id");
        assert_eq!(project_id_from_env(&env).unwrap(), "from-project-id");
    }

    #[test]
    fn test_project_id_skips_empty_values() {
        let env = MapEnv::new()
            .with("GOOGLE_CLOUD_PROJECT", "  ")
            .with("CLOUDSDK_CORE_PROJECT", "core-project");
        assert_eq!(project_id_from_env(&env).unwrap(), "core-project");
    }

    #[test]
    fn test_project_id_missing() {
        let err = project_id_from_env(&MapEnv::new()).unwrap_err();
        assert!(matches!(err, HarnessError::Config(ref m) if m.contains("GOOGLE_CLOUD_PROJECT")));
    }

    #[test]
    fn test_random_region_respects_forbidden() {
        let approved = regions(&["europe-north1", "europe-west1", "us-east1"]);
        let forbidden = regions(&["europe-west1", "us-east1"]);
        for _ in 0..20 {
            assert_eq!(random_region(&approved, &forbidden).unwrap(), "europe-north1");
        }
    }

    #[test]
    fn test_random_region_stays_in_approved() {
        let approved = regions(&["europe-north1", "europe-west1"]);
        for _ in 0..20 {
            assert!(approved.contains(&random_region(&approved, &[]).unwrap()));
        }
    }

    #[test]
    fn test_random_region_with_no_candidates() {
        let approved = regions(&["europe-north1"]);
        assert!(random_region(&approved, &approved).is_err());
    }
}

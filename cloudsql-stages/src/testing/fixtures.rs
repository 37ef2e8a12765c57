//! Ready-made scenario contexts backed by [`FakeCloud`].

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use super::mocks::{FakeCloud, StaticZones};
use crate::config::{HarnessConfig, MapEnv};
use crate::consts::examples;
use crate::errors::Result;
use crate::events::CollectingEventSink;
use crate::scenarios::ScenarioContext;

/// Project id every fixture context resolves.
pub const TEST_PROJECT: &str = "test-project";
/// The only region fixture contexts approve.
pub const TEST_REGION: &str = "europe-north1";

const EXAMPLES: [&str; 6] = [
    examples::CLOUD_SQL_MYSQL,
    examples::MYSQL_PUBLIC_IP,
    examples::MYSQL_REPLICAS,
    examples::POSTGRES_PUBLIC_IP,
    examples::POSTGRES_REPLICAS,
    examples::CLIENT_CERTIFICATE,
];

/// Writes a minimal module tree: one folder per example plus a shared module.
pub fn write_module_tree(root: &Path) -> Result<()> {
    let shared = root.join("modules").join("cloud-sql");
    std::fs::create_dir_all(&shared)?;
    std::fs::write(shared.join("main.tf"), "# shared module\n")?;
    for example in EXAMPLES {
        let dir = root.join("examples").join(example);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(
            dir.join("main.tf"),
            format!("module \"{example}\" {{\n  source = \"../../modules/cloud-sql\"\n}}\n"),
        )?;
    }
    Ok(())
}

/// A module tree, a [`FakeCloud`] and an event collector.
#[derive(Debug)]
pub struct TestHarness {
    /// Root of the module tree.
    pub root: TempDir,
    /// The simulated project.
    pub cloud: FakeCloud,
    /// Stage events of every run.
    pub sink: Arc<CollectingEventSink>,
}

impl TestHarness {
    /// Creates a fresh module tree and an empty project.
    pub fn new() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("cloudsql-stages-fixture-")
            .tempdir()?;
        write_module_tree(root.path())?;
        Ok(Self {
            root,
            cloud: FakeCloud::new(),
            sink: Arc::new(CollectingEventSink::new()),
        })
    }

    /// Context with the fixture project set and no skip toggles.
    #[must_use]
    pub fn context(&self) -> ScenarioContext {
        self.context_with_env(&[])
    }

    /// Context with extra environment variables, e.g. `SKIP_teardown`.
    #[must_use]
    pub fn context_with_env(&self, vars: &[(&str, &str)]) -> ScenarioContext {
        let env = vars
            .iter()
            .fold(MapEnv::new().with("GOOGLE_CLOUD_PROJECT", TEST_PROJECT), |env, (k, v)| {
                env.with(*k, *v)
            });
        let config = HarnessConfig::default()
            .with_module_root(self.root.path())
            .with_approved_regions(vec![TEST_REGION.to_string()]);
        ScenarioContext::new(
            config,
            Arc::new(self.cloud.clone()),
            Arc::new(self.cloud.clone()),
            Arc::new(StaticZones::abc(TEST_REGION)),
            Arc::new(env),
        )
        .with_sink(self.sink.clone())
    }

    /// Path of an example folder in the original tree.
    #[must_use]
    pub fn example(&self, name: &str) -> std::path::PathBuf {
        self.root.path().join("examples").join(name)
    }
}

use std::sync::Arc;

use crate::config::{EnvSource, HarnessConfig, ProcessEnv};
use crate::errors::Result;
use crate::events::{EventSink, LoggingEventSink};
use crate::gcp::{GcloudZones, ZoneLister};
use crate::provision::{Provisioner, TerraformCli};
use crate::sql::{DriverConnector, SqlConnector};
use crate::stages::{SkipToggles, StageRunner};
use crate::state::{copy_module_to_temp, ModuleCopy};

/// Collaborators a scenario runs against.
///
/// Cloning is cheap; deferred stages hold their own clone.
#[derive(Clone)]
pub struct ScenarioContext {
    /// Harness configuration.
    pub config: HarnessConfig,
    /// Provisioning tool.
    pub provisioner: Arc<dyn Provisioner>,
    /// SQL connection factory.
    pub connector: Arc<dyn SqlConnector>,
    /// Zone lookup for the replicas scenarios.
    pub zones: Arc<dyn ZoneLister>,
    /// Stage skip toggles.
    pub toggles: SkipToggles,
    /// Stage event sink.
    pub sink: Arc<dyn EventSink>,
    /// Environment the project id is read from.
    pub env: Arc<dyn EnvSource>,
}

impl std::fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("config", &self.config)
            .field("toggles", &self.toggles)
            .finish_non_exhaustive()
    }
}

impl ScenarioContext {
    /// Wires the given collaborators; toggles are read from `env`.
    #[must_use]
    pub fn new(
        config: HarnessConfig,
        provisioner: Arc<dyn Provisioner>,
        connector: Arc<dyn SqlConnector>,
        zones: Arc<dyn ZoneLister>,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        Self {
            config,
            provisioner,
            connector,
            zones,
            toggles: SkipToggles::new(Arc::clone(&env)),
            sink: Arc::new(LoggingEventSink::default()),
            env,
        }
    }

    /// Production wiring: the process environment, `terraform`, `gcloud`
    /// and the real SQL drivers.
    pub fn from_process_env() -> Result<Self> {
        let env: Arc<dyn EnvSource> = Arc::new(ProcessEnv);
        let config = HarnessConfig::from_env(env.as_ref())?;
        let provisioner = Arc::new(TerraformCli::new(config.terraform_bin.as_str()));
        let connector = Arc::new(DriverConnector::new(&config));
        let zones = Arc::new(GcloudZones::new(config.gcloud_bin.as_str()));
        Ok(Self::new(config, provisioner, connector, zones, env))
    }

    /// Replaces the skip toggles.
    #[must_use]
    pub fn with_toggles(mut self, toggles: SkipToggles) -> Self {
        self.toggles = toggles;
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub(crate) fn runner(&self, run_name: &str) -> StageRunner {
        StageRunner::with_sink(run_name, self.toggles.clone(), Arc::clone(&self.sink))
    }

    pub(crate) fn module_copy(&self) -> Result<ModuleCopy> {
        copy_module_to_temp(
            &self.config.module_root,
            &self.config.examples_folder,
            &self.toggles,
        )
    }
}

//! Provisioning tool lifecycle: `init`, `apply`, `destroy` and `output`.

mod options;
mod terraform;

pub use options::{to_hcl, ProvisionOptions};
pub use terraform::TerraformCli;

use async_trait::async_trait;

use crate::errors::{HarnessError, Result};

/// Applies and destroys infrastructure modules and reads their outputs.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Initialises the module directory.
    async fn init(&self, options: &ProvisionOptions) -> Result<()>;

    /// Creates or updates the module's resources.
    async fn apply(&self, options: &ProvisionOptions) -> Result<()>;

    /// Destroys the module's resources.
    async fn destroy(&self, options: &ProvisionOptions) -> Result<()>;

    /// Reads one output as JSON.
    async fn output_json(
        &self,
        options: &ProvisionOptions,
        name: &str,
    ) -> Result<serde_json::Value>;

    /// Reads one output as a string.
    async fn output(&self, options: &ProvisionOptions, name: &str) -> Result<String> {
        Ok(output_to_string(self.output_json(options, name).await?))
    }

    /// Reads one list output as strings.
    async fn output_list(&self, options: &ProvisionOptions, name: &str) -> Result<Vec<String>> {
        match self.output_json(options, name).await? {
            serde_json::Value::Array(items) => {
                Ok(items.into_iter().map(output_to_string).collect())
            }
            other => Err(HarnessError::assertion(
                format!("output {name}"),
                "a list",
                other.to_string(),
            )),
        }
    }

    /// Runs `init` then `apply`.
    async fn init_and_apply(&self, options: &ProvisionOptions) -> Result<()> {
        self.init(options).await?;
        self.apply(options).await
    }
}

fn output_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_to_string() {
        assert_eq!(output_to_string(json!("10.0.0.1")), "10.0.0.1");
        assert_eq!(output_to_string(json!(3)), "3");
        assert_eq!(output_to_string(json!(true)), "true");
    }
}

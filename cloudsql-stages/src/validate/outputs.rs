use tracing::info;

use super::{expect_eq, expect_prefix, expect_proxy_connection};
use crate::consts::DB_NAME;
use crate::errors::Result;
use crate::provision::{ProvisionOptions, Provisioner};

/// Identity outputs of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceOutputs {
    /// Instance name output.
    pub instance_name: String,
    /// Proxy connection identifier output.
    pub proxy_connection: String,
    /// Database name output, only exported for the master.
    pub db_name: Option<String>,
}

impl InstanceOutputs {
    /// Reads the named outputs from the provisioned module.
    pub async fn read(
        provisioner: &dyn Provisioner,
        options: &ProvisionOptions,
        instance_name_output: &str,
        proxy_connection_output: &str,
        db_name_output: Option<&str>,
    ) -> Result<Self> {
        let instance_name = provisioner.output(options, instance_name_output).await?;
        let proxy_connection = provisioner.output(options, proxy_connection_output).await?;
        let db_name = match db_name_output {
            Some(name) => Some(provisioner.output(options, name).await?),
            None => None,
        };
        Ok(Self {
            instance_name,
            proxy_connection,
            db_name,
        })
    }
}

/// Checks the naming prefix, database name and proxy connection of an instance.
pub fn validate_instance_outputs(
    outputs: &InstanceOutputs,
    prefix: &str,
    project: &str,
    region: &str,
) -> Result<()> {
    expect_prefix("instance name", &outputs.instance_name, prefix)?;
    if let Some(db_name) = &outputs.db_name {
        expect_eq("database name", DB_NAME, db_name.as_str())?;
    }
    expect_proxy_connection(
        "proxy connection",
        project,
        region,
        &outputs.instance_name,
        &outputs.proxy_connection,
    )?;
    info!(instance = %outputs.instance_name, "Instance outputs are valid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HarnessError;

    fn outputs() -> InstanceOutputs {
        InstanceOutputs {
            instance_name: "mysql-replicas-1a2b".to_string(),
            proxy_connection: "proj:europe-north1:mysql-replicas-1a2b".to_string(),
            db_name: Some("testdb".to_string()),
        }
    }

    #[test]
    fn test_valid_outputs() {
        validate_instance_outputs(&outputs(), "mysql-replicas", "proj", "europe-north1").unwrap();
    }

    #[test]
    fn test_replica_outputs_have_no_db_name() {
        let replica = InstanceOutputs {
            db_name: None,
            ..outputs()
        };
        validate_instance_outputs(&replica, "mysql-replicas", "proj", "europe-north1").unwrap();
    }

    #[test]
    fn test_wrong_db_name() {
        let wrong = InstanceOutputs {
            db_name: Some("postgres".to_string()),
            ..outputs()
        };
        let err = validate_instance_outputs(&wrong, "mysql-replicas", "proj", "europe-north1")
            .unwrap_err();
        assert!(
            matches!(err, HarnessError::Assertion { ref what, .. } if what == "database name")
        );
    }

    #[test]
    fn test_wrong_region_in_proxy_connection() {
        let err = validate_instance_outputs(&outputs(), "mysql-replicas", "proj", "us-east1")
            .unwrap_err();
        assert!(
            matches!(err, HarnessError::Assertion { ref what, .. } if what == "proxy connection")
        );
    }
}

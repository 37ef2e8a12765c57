//! `terraform` binary driven through `tokio::process`.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ProvisionOptions, Provisioner};
use crate::errors::{ProvisionError, Result};

/// Runs the Terraform CLI against a module directory.
///
/// Every command is non-interactive and colourless; a non-zero exit is
/// returned as [`ProvisionError`] with the captured stderr. Nothing is
/// retried.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    bin: String,
}

impl Default for TerraformCli {
    fn default() -> Self {
        Self::new("terraform")
    }
}

impl TerraformCli {
    /// Creates a CLI wrapper for the given binary.
    #[must_use]
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// The binary this wrapper invokes.
    #[must_use]
    pub fn bin(&self) -> &str {
        &self.bin
    }

    async fn run(&self, options: &ProvisionOptions, args: Vec<String>) -> Result<String> {
        // Variable values may hold credentials; only the subcommand is reported.
        let command = format!("{} {}", self.bin, args.first().map_or("", String::as_str));
        let dir = options.dir().display().to_string();
        info!(
            command = %command,
            dir = %dir,
            fingerprint = %options.fingerprint(),
            "Running provisioning command"
        );

        let output = Command::new(&self.bin)
            .args(&args)
            .current_dir(options.dir())
            .env("TF_IN_AUTOMATION", "1")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProvisionError::new(&command, &dir, None, e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!(command = %command, "{line}");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ProvisionError::new(command, dir, output.status.code(), stderr).into());
        }
        Ok(stdout)
    }
}

pub(crate) fn init_args() -> Vec<String> {
    ["init", "-upgrade=false", "-input=false", "-no-color"]
        .map(String::from)
        .to_vec()
}

pub(crate) fn apply_args(options: &ProvisionOptions) -> Vec<String> {
    let mut args: Vec<String> =
        ["apply", "-input=false", "-auto-approve", "-lock=false", "-no-color"]
            .map(String::from)
            .to_vec();
    args.extend(options.var_args());
    args
}

pub(crate) fn destroy_args(options: &ProvisionOptions) -> Vec<String> {
    let mut args: Vec<String> =
        ["destroy", "-auto-approve", "-input=false", "-lock=false", "-no-color"]
            .map(String::from)
            .to_vec();
    args.extend(options.var_args());
    args
}

pub(crate) fn output_args(name: &str) -> Vec<String> {
    vec![
        "output".to_string(),
        "-no-color".to_string(),
        "-json".to_string(),
        name.to_string(),
    ]
}

#[async_trait]
impl Provisioner for TerraformCli {
    async fn init(&self, options: &ProvisionOptions) -> Result<()> {
        self.run(options, init_args()).await.map(drop)
    }

    async fn apply(&self, options: &ProvisionOptions) -> Result<()> {
        self.run(options, apply_args(options)).await.map(drop)
    }

    async fn destroy(&self, options: &ProvisionOptions) -> Result<()> {
        self.run(options, destroy_args(options)).await.map(drop)
    }

    async fn output_json(
        &self,
        options: &ProvisionOptions,
        name: &str,
    ) -> Result<serde_json::Value> {
        let stdout = self.run(options, output_args(name)).await?;
        Ok(serde_json::from_str(stdout.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HarnessError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_lines() {
        let options = ProvisionOptions::new("/tmp/mysql-public-ip")
            .with_var("region", "europe-north1")
            .with_var("require_ssl", true);

        assert_eq!(init_args(), vec!["init", "-upgrade=false", "-input=false", "-no-color"]);
        assert_eq!(
            apply_args(&options),
            vec![
                "apply",
                "-input=false",
                "-auto-approve",
                "-lock=false",
                "-no-color",
                "-var",
                "region=europe-north1",
                "-var",
                "require_ssl=true",
            ]
        );
        assert_eq!(destroy_args(&options)[0], "destroy");
        assert_eq!(destroy_args(&options).len(), 9);
        assert_eq!(output_args("db_name"), vec!["output", "-no-color", "-json", "db_name"]);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_provision_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new("false");

        let err = cli.init(&ProvisionOptions::new(dir.path())).await.unwrap_err();
        match err {
            HarnessError::Provision(e) => {
                assert_eq!(e.command, "false init");
                assert_eq!(e.code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_provision_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new("definitely-not-a-terraform-binary");

        let err = cli.apply(&ProvisionOptions::new(dir.path())).await.unwrap_err();
        assert!(matches!(err, HarnessError::Provision(ref e) if e.code.is_none()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_outputs_are_parsed_from_json() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-terraform");
        std::fs::write(
            &script,
            "#!/bin/sh\ncase \"$4\" in\n  names) echo '[\"a\",\"b\"]' ;;\n  *) echo '\"mysql-test-1\"' ;;\nesac\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = TerraformCli::new(script.to_string_lossy().to_string());
        let options = ProvisionOptions::new(dir.path());

        assert_eq!(cli.output(&options, "instance_name").await.unwrap(), "mysql-test-1");
        assert_eq!(cli.output_list(&options, "names").await.unwrap(), vec!["a", "b"]);
    }
}

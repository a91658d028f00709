// global_config.rs
//
// Everything the lifecycle needs to know about the deployment under test is read from a
// single YAML file (paths::DEFAULT_CONFIG unless overridden on the command line).

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when the config file has no subscription ID
pub const SUBSCRIPTION_ENV_VAR: &str = "ARM_SUBSCRIPTION_ID";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    pub terraform: DeploymentConfig,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub expected: ExpectedConfig,
    #[serde(default = "default_teardown_retry")]
    pub teardown: RetryConfig,
}

/// Where the Terraform definitions live and what variables they are applied with
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeploymentConfig {
    #[serde(default = "default_terraform_binary")]
    pub binary: String,
    pub dir: PathBuf,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Extra environment variables for every terraform invocation
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Run from a throwaway copy of `dir`, so parallel runs don't share state files
    #[serde(default)]
    pub copy_to_temp: bool,
    /// Retry budget for init/apply/destroy when they hit a known transient error
    #[serde(default = "default_provision_retry")]
    pub retry: RetryConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AzureConfig {
    #[serde(default = "default_azure_cli_binary")]
    pub cli_binary: String,
    #[serde(default)]
    pub subscription_id: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        AzureConfig {
            cli_binary: default_azure_cli_binary(),
            subscription_id: String::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExpectedConfig {
    /// The Terraform variable holding the naming prefix
    #[serde(default = "default_naming_var")]
    pub naming_var: String,
    #[serde(default = "default_vm_suffix")]
    pub vm_suffix: String,
    #[serde(default = "default_resource_group_suffix")]
    pub resource_group_suffix: String,
    #[serde(default)]
    pub nic_name: Option<String>,
    #[serde(default)]
    pub image: ImageConfig,
}

impl Default for ExpectedConfig {
    fn default() -> Self {
        ExpectedConfig {
            naming_var: default_naming_var(),
            vm_suffix: default_vm_suffix(),
            resource_group_suffix: default_resource_group_suffix(),
            nic_name: None,
            image: ImageConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            publisher: "Canonical".to_string(),
            offer: "0001-com-ubuntu-server-jammy".to_string(),
            sku: "22_04-lts-gen2".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub interval_secs: u64,
}

impl From<RetryConfig> for RetryPolicy {
    fn from(rc: RetryConfig) -> Self {
        RetryPolicy::new(rc.max_attempts, Duration::from_secs(rc.interval_secs))
    }
}

fn default_terraform_binary() -> String {
    "terraform".to_string()
}

fn default_azure_cli_binary() -> String {
    "az".to_string()
}

fn default_naming_var() -> String {
    "labelPrefix".to_string()
}

fn default_vm_suffix() -> String {
    "A05VM".to_string()
}

fn default_resource_group_suffix() -> String {
    "-A05-RG".to_string()
}

fn default_teardown_retry() -> RetryConfig {
    RetryConfig { max_attempts: 5, interval_secs: 60 }
}

fn default_provision_retry() -> RetryConfig {
    RetryConfig { max_attempts: 3, interval_secs: 5 }
}

impl LifecycleConfig {
    pub fn from_yaml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let cfg: LifecycleConfig = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.teardown.max_attempts == 0 {
            return Err(ConfigError::Invalid("teardown.max_attempts must be at least 1".to_string()));
        }
        if self.terraform.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("terraform.retry.max_attempts must be at least 1".to_string()));
        }
        match self.terraform.vars.get(&self.expected.naming_var) {
            Some(prefix) if !prefix.is_empty() => Ok(()),
            _ => Err(ConfigError::Invalid(format!(
                "terraform.vars must set the naming variable '{}'",
                self.expected.naming_var
            ))),
        }
    }

    /// The value of the naming variable, which every expected name is derived from
    pub fn naming_prefix(&self) -> &str {
        self.terraform
            .vars
            .get(&self.expected.naming_var)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Config value first, then the environment
    pub fn subscription_id(&self) -> Option<String> {
        let from_file = self.azure.subscription_id.trim();
        if !from_file.is_empty() {
            return Some(from_file.to_string());
        }
        std::env::var(SUBSCRIPTION_ENV_VAR)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LifecycleConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    LifecycleConfig::from_yaml(&text, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const MINIMAL: &str = "
terraform:
  dir: terraform
  vars:
    labelPrefix: duan0027
";

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = LifecycleConfig::from_yaml(MINIMAL, Path::new("test.yml")).unwrap();
        assert_eq!(cfg.terraform.binary, "terraform");
        assert_eq!(cfg.terraform.dir, PathBuf::from("terraform"));
        assert!(!cfg.terraform.copy_to_temp);
        assert_eq!(cfg.azure.cli_binary, "az");
        assert_eq!(cfg.expected.naming_var, "labelPrefix");
        assert_eq!(cfg.expected.image, ImageConfig::default());
        assert_eq!(cfg.naming_prefix(), "duan0027");

        let teardown: RetryPolicy = cfg.teardown.into();
        assert_eq!(teardown, RetryPolicy::new(5, Duration::from_secs(60)));
        let provision: RetryPolicy = cfg.terraform.retry.into();
        assert_eq!(provision, RetryPolicy::new(3, Duration::from_secs(5)));
    }

    #[test]
    fn shipped_config_parses() {
        let cfg = load_config(concat!(env!("CARGO_MANIFEST_DIR"), "/config/lifecycle.yml")).unwrap();
        assert_eq!(cfg.naming_prefix(), "duan0027");
        assert_eq!(cfg.teardown, RetryConfig { max_attempts: 5, interval_secs: 60 });

        // the definitions ship with the repo
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join(&cfg.terraform.dir);
        assert!(dir.join("main.tf").is_file());
        assert!(dir.join("outputs.tf").is_file());
    }

    #[test]
    fn naming_var_must_be_set() {
        let text = "
terraform:
  dir: terraform
  vars:
    somethingElse: x
";
        let err = LifecycleConfig::from_yaml(text, Path::new("test.yml")).unwrap_err();
        assert_matches!(err, ConfigError::Invalid(msg) if msg.contains("labelPrefix"));
    }

    #[test]
    fn zero_teardown_attempts_rejected() {
        let text = format!("{}teardown:\n  max_attempts: 0\n  interval_secs: 60\n", MINIMAL);
        assert_matches!(
            LifecycleConfig::from_yaml(&text, Path::new("test.yml")),
            Err(ConfigError::Invalid(_))
        );
    }

    #[test]
    fn bad_yaml_reports_path() {
        let err = LifecycleConfig::from_yaml("terraform: [", Path::new("broken.yml")).unwrap_err();
        assert_matches!(err, ConfigError::Parse { ref path, .. } if path == Path::new("broken.yml"));
    }

    #[test]
    fn missing_file_is_read_error() {
        assert_matches!(load_config("/nonexistent/lifecycle.yml"), Err(ConfigError::Read { .. }));
    }

    #[test]
    fn subscription_from_file_wins() {
        let mut cfg = LifecycleConfig::from_yaml(MINIMAL, Path::new("test.yml")).unwrap();
        cfg.azure.subscription_id = " 127e7a44-d802-42e4-b654-a434382666ac ".to_string();
        assert_eq!(cfg.subscription_id().as_deref(), Some("127e7a44-d802-42e4-b654-a434382666ac"));
    }
}

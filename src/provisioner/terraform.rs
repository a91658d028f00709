use crate::error::ProvisionError;
use crate::paths;
use crate::provisioner::Provisioner;
use crate::retry::{self, RetryPolicy, ThreadSleeper};
use crate::shell_tools::{self, ShellCommand};
use crate::utils::files::{self, TempCopy};
use crate::utils::global_config::DeploymentConfig;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

lazy_static! {
    /// Errors terraform is known to hit transiently, with an explanation of each.
    pub static ref RETRYABLE_TERRAFORM_ERRORS: Vec<(Regex, &'static str)> = vec![
        (".*read: connection reset by peer.*", "Failed to reach helm charts repository."),
        (".*transport is closing.*", "Failed to reach Kubernetes API."),
        (".*TLS handshake timeout.*", "Transient network error."),
        (".*unable to verify signature.*", "Failed to retrieve plugin due to transient network error."),
        (".*unable to verify checksum.*", "Failed to retrieve plugin due to transient network error."),
        (".*no provider exists with the given name.*", "Failed to retrieve plugin due to transient network error."),
        (".*registry service is unreachable.*", "Failed to retrieve plugin due to transient network error."),
        (".*Error installing provider.*", "Failed to install provider due to transient network error."),
        (".*Failed to query available provider packages.*", "Failed to retrieve plugin due to transient network error."),
        (".*timeout while waiting for plugin to start.*", "Failed to retrieve plugin due to transient network error."),
        (".*timed out waiting for server handshake.*", "Failed to retrieve plugin due to transient network error."),
        ("could not query provider registry for", "Failed to retrieve plugin due to transient network error."),
    ]
    .into_iter()
    .map(|(pattern, reason)| (Regex::new(pattern).expect("invalid retryable error pattern"), reason))
    .collect();

    static ref OUTPUT_NOT_FOUND: Regex =
        Regex::new(r"(?i)output .*not found|no outputs found").expect("invalid output pattern");
}

/// Drives the terraform CLI in a directory of definitions
#[derive(Debug)]
pub struct Terraform {
    binary: String,
    dir: PathBuf,
    vars: BTreeMap<String, String>,
    env: BTreeMap<String, String>,
    retry: RetryPolicy,
    /// Removed on drop once nothing is left to destroy
    temp_copy: Option<TempCopy>,
}

impl Terraform {
    /// Copies the definitions to a temp dir first if the config asks for it
    pub fn new(config: &DeploymentConfig) -> Result<Self, ProvisionError> {
        let temp_copy = if config.copy_to_temp {
            Some(files::copy_folder_to_temp(&config.dir, paths::TEMP_DIR_PREFIX)?)
        } else {
            None
        };
        let dir = match &temp_copy {
            Some(copy) => copy.path().to_path_buf(),
            None => config.dir.clone(),
        };

        Ok(Terraform {
            binary: config.binary.clone(),
            dir,
            vars: config.vars.clone(),
            env: config.env.clone(),
            retry: config.retry.into(),
            temp_copy,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn set_holds_state(&self, holds_state: bool) {
        if let Some(copy) = &self.temp_copy {
            copy.set_holds_state(holds_state);
        }
    }

    fn command(&self, args: Vec<String>) -> ShellCommand {
        ShellCommand::new(&self.binary)
            .args(args)
            .current_dir(&self.dir)
            .envs(&self.env)
    }

    /// Runs a command, retrying on the known transient errors
    fn run_retryable(&self, description: &str, args: Vec<String>) -> Result<String, ProvisionError> {
        let cmd = self.command(args);
        let details = retry::do_with_retryable_errors(
            description,
            self.retry,
            &RETRYABLE_TERRAFORM_ERRORS,
            &ThreadSleeper,
            || cmd.run().into_result(),
        )?;
        Ok(details.stdout)
    }
}

impl Provisioner for Terraform {
    fn preflight(&self) -> Result<(), String> {
        if !shell_tools::check_command_exist(&self.binary) {
            return Err(format!(
                "terraform is not installed on this system with path '{}', please check the provided path in the config file and/or install terraform.",
                self.binary
            ));
        }
        if !self.dir.is_dir() {
            return Err(format!("terraform directory {} does not exist", self.dir.display()));
        }
        Ok(())
    }

    fn init_and_apply(&self) -> Result<(), ProvisionError> {
        // even a failed apply can leave resources in the state file
        self.set_holds_state(true);
        tracing::info!(dir = %self.dir.display(), "terraform init");
        self.run_retryable("terraform init", init_args())?;
        tracing::info!(dir = %self.dir.display(), "terraform apply");
        self.run_retryable("terraform apply", apply_args(&self.vars))?;
        Ok(())
    }

    fn output(&self, name: &str) -> Result<Option<String>, ProvisionError> {
        let res = self.command(output_args(name)).run();
        if res.non_zero_exit() && OUTPUT_NOT_FOUND.is_match(&format!("{}\n{}", res.stdout(), res.stderr())) {
            return Ok(None);
        }
        let details = res.into_result()?;
        parse_output(name, &details.stdout).map(Some)
    }

    fn destroy(&self) -> Result<(), ProvisionError> {
        tracing::info!(dir = %self.dir.display(), "terraform destroy");
        self.run_retryable("terraform destroy", destroy_args(&self.vars))?;
        self.set_holds_state(false);
        Ok(())
    }
}

fn var_args(vars: &BTreeMap<String, String>) -> Vec<String> {
    vars.iter()
        .flat_map(|(k, v)| vec!["-var".to_string(), format!("{}={}", k, v)])
        .collect()
}

fn to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

pub fn init_args() -> Vec<String> {
    to_strings(&["init", "-upgrade=false", "-input=false", "-no-color"])
}

pub fn apply_args(vars: &BTreeMap<String, String>) -> Vec<String> {
    let mut ret = to_strings(&["apply", "-input=false", "-auto-approve", "-lock=false", "-no-color"]);
    ret.extend(var_args(vars));
    ret
}

pub fn destroy_args(vars: &BTreeMap<String, String>) -> Vec<String> {
    let mut ret = to_strings(&["destroy", "-input=false", "-auto-approve", "-lock=false", "-no-color"]);
    ret.extend(var_args(vars));
    ret
}

pub fn output_args(name: &str) -> Vec<String> {
    to_strings(&["output", "-no-color", "-json", name])
}

/// `terraform output -json <name>` prints a JSON value. Strings are unwrapped, anything
/// else is kept in its JSON form and null becomes an empty string.
pub fn parse_output(name: &str, stdout: &str) -> Result<String, ProvisionError> {
    let value: serde_json::Value =
        serde_json::from_str(stdout.trim()).map_err(|source| ProvisionError::InvalidOutput {
            name: name.to_string(),
            source,
        })?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

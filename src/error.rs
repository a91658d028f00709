use crate::verify::VerificationReport;
use std::path::PathBuf;

/// Failure to run an external program, or a non-zero exit from it.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("could not run `{command}`: {source}")]
    NotFound {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` returned non-zero code ({code:?})\n{stdout}\n{stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("'{description}' unsuccessful after {attempts} attempts")]
    Exhausted {
        description: String,
        attempts: usize,
        #[source]
        last: E,
    },

    #[error("'{description}' failed with a non-retryable error")]
    Fatal {
        description: String,
        #[source]
        source: E,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Retry(#[from] RetryError<CommandError>),

    #[error("output '{name}' is not valid JSON: {source}")]
    InvalidOutput {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not copy {from} into a temporary directory: {source}")]
    CopyToTemp {
        from: PathBuf,
        #[source]
        source: fs_extra::error::Error,
    },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("could not parse {what} returned by the Azure CLI: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("no Azure subscription configured, set azure.subscription_id or ARM_SUBSCRIPTION_ID")]
    MissingSubscription,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Destroy kept failing after the whole retry budget was used.
#[derive(Debug, thiserror::Error)]
#[error("destroy unsuccessful after {attempts} attempts, cloud resources may be left behind")]
pub struct TeardownError {
    pub attempts: usize,
    #[source]
    pub last: ProvisionError,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("preflight check failed: {0}")]
    Preflight(String),

    #[error("provisioning failed")]
    Provision(#[source] ProvisionError),

    #[error("required output '{name}' is missing or empty")]
    OutputMissing { name: String },

    #[error("verification failed: {}", .0.failed_names().join(", "))]
    Verification(VerificationReport),

    #[error("teardown failed")]
    Teardown {
        #[source]
        source: TeardownError,
        /// How the run had gone before teardown was attempted.
        outcome: Box<Result<VerificationReport, LifecycleError>>,
    },
}

impl LifecycleError {
    /// The verification report, if verification got far enough to produce one.
    pub fn report(&self) -> Option<&VerificationReport> {
        match self {
            LifecycleError::Verification(report) => Some(report),
            LifecycleError::Teardown { outcome, .. } => match outcome.as_ref() {
                Ok(report) => Some(report),
                Err(prior) => prior.report(),
            },
            _ => None,
        }
    }
}

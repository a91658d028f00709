//! Apply, verify, destroy.
//!
//! Once `run` has started applying, the deployment is always destroyed before it
//! returns, including when apply itself fails or something below panics.

use crate::cloud_functions::ResourceInspector;
use crate::error::{LifecycleError, RetryError, TeardownError};
use crate::provisioner::{DeploymentOutputs, Provisioner};
use crate::retry::{self, RetryPolicy, Sleeper, ThreadSleeper};
use crate::verify::{self, ExpectedResources, VerificationReport};

pub struct Lifecycle<'a, P: ?Sized, I: ?Sized, S = ThreadSleeper> {
    provisioner: &'a P,
    inspector: &'a I,
    expected: ExpectedResources,
    teardown: RetryPolicy,
    sleeper: S,
}

impl<'a, P, I> Lifecycle<'a, P, I, ThreadSleeper>
where
    P: Provisioner + ?Sized,
    I: ResourceInspector + ?Sized,
{
    pub fn new(provisioner: &'a P, inspector: &'a I, expected: ExpectedResources, teardown: RetryPolicy) -> Self {
        Lifecycle {
            provisioner,
            inspector,
            expected,
            teardown,
            sleeper: ThreadSleeper,
        }
    }
}

impl<'a, P, I, S> Lifecycle<'a, P, I, S>
where
    P: Provisioner + ?Sized,
    I: ResourceInspector + ?Sized,
    S: Sleeper,
{
    /// Replaces what is used to wait between destroy attempts
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> Lifecycle<'a, P, I, S2> {
        Lifecycle {
            provisioner: self.provisioner,
            inspector: self.inspector,
            expected: self.expected,
            teardown: self.teardown,
            sleeper,
        }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    fn preflight(&self, provisioner: bool) -> Result<(), LifecycleError> {
        if provisioner {
            self.provisioner.preflight().map_err(LifecycleError::Preflight)?;
        }
        self.inspector.preflight().map_err(LifecycleError::Preflight)
    }

    /// The whole lifecycle. Returns the report if every check passed and the deployment
    /// was destroyed.
    pub fn run(&self) -> Result<VerificationReport, LifecycleError> {
        self.preflight(true)?;

        let guard = DeploymentGuard::new(self.provisioner, self.teardown, &self.sleeper);
        let outcome = self.apply_and_verify();
        if let Err(e) = &outcome {
            tracing::error!(error = %retry::DisplayChain(e), "lifecycle aborted, tearing down");
        }

        match guard.release() {
            Ok(()) => outcome,
            Err(source) => Err(LifecycleError::Teardown {
                source,
                outcome: Box::new(outcome),
            }),
        }
    }

    /// Verifies a deployment that already exists, without applying or destroying it
    pub fn verify_existing(&self) -> Result<VerificationReport, LifecycleError> {
        self.preflight(false)?;
        let outputs = DeploymentOutputs::read(self.provisioner)?;
        self.verify_outputs(&outputs)
    }

    /// Destroys the deployment, retrying according to the teardown policy
    pub fn teardown(&self) -> Result<(), TeardownError> {
        destroy_with_retry(self.provisioner, self.teardown, &self.sleeper)
    }

    fn apply_and_verify(&self) -> Result<VerificationReport, LifecycleError> {
        tracing::info!("applying deployment");
        self.provisioner.init_and_apply().map_err(LifecycleError::Provision)?;

        let outputs = DeploymentOutputs::read(self.provisioner)?;
        tracing::info!(
            vm_name = %outputs.vm_name,
            resource_group_name = %outputs.resource_group_name,
            nic_name = %outputs.nic_name,
            "deployment outputs"
        );
        self.verify_outputs(&outputs)
    }

    fn verify_outputs(&self, outputs: &DeploymentOutputs) -> Result<VerificationReport, LifecycleError> {
        let report = verify::verify(self.inspector, outputs, &self.expected);
        report.log();
        match report.passed() {
            true => Ok(report),
            false => Err(LifecycleError::Verification(report)),
        }
    }
}

pub fn destroy_with_retry<P, S>(provisioner: &P, policy: RetryPolicy, sleeper: &S) -> Result<(), TeardownError>
where
    P: Provisioner + ?Sized,
    S: Sleeper + ?Sized,
{
    match retry::do_with_retry("Destroy resources", policy, sleeper, || provisioner.destroy()) {
        Ok(()) => {
            tracing::info!("Resources destroyed successfully");
            Ok(())
        }
        Err(RetryError::Exhausted { attempts, last, .. }) => Err(TeardownError { attempts, last }),
        Err(RetryError::Fatal { source, .. }) => Err(TeardownError { attempts: 1, last: source }),
    }
}

/// Owns the obligation to destroy a deployment. `release` does it explicitly and
/// reports the result; dropping an unreleased guard does it anyway and can only log.
pub struct DeploymentGuard<'g, P: Provisioner + ?Sized, S: Sleeper> {
    provisioner: &'g P,
    policy: RetryPolicy,
    sleeper: &'g S,
    released: bool,
}

impl<'g, P: Provisioner + ?Sized, S: Sleeper> DeploymentGuard<'g, P, S> {
    pub fn new(provisioner: &'g P, policy: RetryPolicy, sleeper: &'g S) -> Self {
        DeploymentGuard {
            provisioner,
            policy,
            sleeper,
            released: false,
        }
    }

    pub fn release(mut self) -> Result<(), TeardownError> {
        self.released = true;
        destroy_with_retry(self.provisioner, self.policy, self.sleeper)
    }
}

impl<'g, P: Provisioner + ?Sized, S: Sleeper> Drop for DeploymentGuard<'g, P, S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::warn!("deployment guard dropped without release, destroying resources");
        if let Err(e) = destroy_with_retry(self.provisioner, self.policy, self.sleeper) {
            tracing::error!(error = %retry::DisplayChain(&e), "teardown failed while unwinding");
        }
    }
}

use std::process::Command;
use std::time::Duration;

use tracing::{debug, info};

use crate::core::identity::Identity;
use crate::error::{GithaulError, Result};
use crate::util::process::run_captured;

/// Confirms that the SSH alias authenticates as the expected account
/// before any repository is touched.
pub trait SshVerifier: Send + Sync {
    fn verify(&self, identity: &Identity) -> Result<()>;
}

/// Runs `ssh -T git@<alias>` and looks for GitHub's greeting for the user.
#[derive(Debug, Clone)]
pub struct SshCommandVerifier {
    timeout: Duration,
}

impl SshCommandVerifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl SshVerifier for SshCommandVerifier {
    fn verify(&self, identity: &Identity) -> Result<()> {
        let target = format!("git@{}", identity.ssh_alias());
        debug!(%target, "verifying ssh access");
        let output = run_captured(
            Command::new("ssh").args(["-T", "-o", "BatchMode=yes", target.as_str()]),
            self.timeout,
        )
        .map_err(|err| unverified(identity, format!("ssh {target}: {err}")))?;

        // GitHub exits 1 even on success, so only the greeting counts.
        match greeting_stream(identity.user(), &output.stdout, &output.stderr) {
            Some(stream) => {
                info!(alias = identity.ssh_alias(), user = identity.user(), stream, "ssh access verified");
                Ok(())
            }
            None => Err(unverified(
                identity,
                format!(
                    "ssh exited with {}; stdout: '{}'; stderr: '{}'",
                    output.exit_code(),
                    output.stdout.trim(),
                    output.stderr.trim()
                ),
            )),
        }
    }
}

/// Accepts every identity. For offline use and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipSshVerification;

impl SshVerifier for SkipSshVerification {
    fn verify(&self, identity: &Identity) -> Result<()> {
        debug!(alias = identity.ssh_alias(), "ssh verification skipped");
        Ok(())
    }
}

fn greeting_stream(user: &str, stdout: &str, stderr: &str) -> Option<&'static str> {
    let expected = format!("Hi {user}!");
    if stdout.contains(&expected) {
        Some("stdout")
    } else if stderr.contains(&expected) {
        Some("stderr")
    } else {
        None
    }
}

fn unverified(identity: &Identity, detail: String) -> GithaulError {
    GithaulError::SshUnverified {
        alias: identity.ssh_alias().to_string(),
        user: identity.user().to_string(),
        detail,
    }
}

use crate::consent::ConsentDecision;
use crate::error::BootstrapError;
use crate::host::BringUpHost;
use crate::settings::Settings;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BringUpState {
    CheckRuntime,
    ConsentWait,
    CheckProvider,
    Import,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    AlreadyConfigured,
    Imported { config_file: PathBuf },
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub outcome: BootstrapOutcome,
    /// The runtime was downloaded and started during this run.
    pub installed: bool,
    pub states: Vec<BringUpState>,
}

impl BootstrapReport {
    pub fn message(&self) -> String {
        match &self.outcome {
            BootstrapOutcome::AlreadyConfigured => {
                "AOG is running and a service provider is already configured.".to_string()
            }
            BootstrapOutcome::Imported { config_file } => format!(
                "AOG is running; imported service provider config from {}.",
                config_file.display()
            ),
        }
    }
}

struct BringUp<'a, H: BringUpHost> {
    host: &'a H,
    settings: &'a Settings,
    config_file: &'a Path,
    installed: bool,
    outcome: Option<BootstrapOutcome>,
}

impl<'a, H: BringUpHost> BringUp<'a, H> {
    fn step(&mut self, state: BringUpState) -> Result<BringUpState, BootstrapError> {
        match state {
            BringUpState::CheckRuntime => {
                if self.host.is_runtime_available() {
                    Ok(BringUpState::CheckProvider)
                } else {
                    Ok(BringUpState::ConsentWait)
                }
            }
            BringUpState::ConsentWait => {
                self.consent_and_install()?;
                Ok(BringUpState::CheckProvider)
            }
            BringUpState::CheckProvider => {
                self.host
                    .notify("AOG is running; checking for a service provider...");
                if self.host.has_service_provider() {
                    self.outcome = Some(BootstrapOutcome::AlreadyConfigured);
                    Ok(BringUpState::Done)
                } else {
                    Ok(BringUpState::Import)
                }
            }
            BringUpState::Import => {
                self.host.notify(&format!(
                    "No service provider found; importing {}...",
                    self.config_file.display()
                ));
                let executable = self.host.runtime_executable();
                self.host.import_config(&executable, self.config_file)?;
                self.outcome = Some(BootstrapOutcome::Imported {
                    config_file: self.config_file.to_path_buf(),
                });
                Ok(BringUpState::Done)
            }
            BringUpState::Done => Ok(BringUpState::Done),
        }
    }

    fn consent_and_install(&mut self) -> Result<(), BootstrapError> {
        self.host
            .notify("AOG is not available; asking for permission to install it...");
        match self.host.request_consent()? {
            ConsentDecision::Granted => {}
            ConsentDecision::Denied => return Err(BootstrapError::UserDenied),
            ConsentDecision::Unknown => {
                return Err(BootstrapError::ConsentTimeout(
                    self.settings.consent.timeout_sec,
                ))
            }
        }
        self.host.notify("Downloading AOG...");
        let executable = self.host.install_runtime()?;
        self.installed = true;
        self.host.notify("Starting AOG...");
        self.host.launch_runtime(&executable)?;
        Ok(())
    }
}

/// Drives the bring-up from `CheckRuntime` to `Done`. Any failing step
/// aborts the run; nothing is rolled back, and re-running is safe.
pub fn run_bring_up<H: BringUpHost>(
    host: &H,
    settings: &Settings,
    config_file: &Path,
) -> Result<BootstrapReport, BootstrapError> {
    let mut machine = BringUp {
        host,
        settings,
        config_file,
        installed: false,
        outcome: None,
    };
    let mut states = Vec::new();
    let mut state = BringUpState::CheckRuntime;
    loop {
        states.push(state);
        if state == BringUpState::Done {
            break;
        }
        let next = machine.step(state).map_err(|err| {
            tracing::warn!(?state, error = %err, "bring-up aborted");
            err
        })?;
        tracing::debug!(from = ?state, to = ?next, "bring-up transition");
        state = next;
    }
    let outcome = machine.outcome.ok_or_else(|| {
        BootstrapError::Config("bring-up finished without an outcome".to_string())
    })?;
    Ok(BootstrapReport {
        outcome,
        installed: machine.installed,
        states,
    })
}

//! Makes sure the local AOG runtime is installed, running and has a service
//! provider before an application continues.
//!
//! [`bootstrap`] runs the whole bring-up with default collaborators. Use
//! [`run_bring_up`] with a custom [`BringUpHost`] to drive it differently.

pub mod bootstrap;
pub mod browser;
pub mod consent;
pub mod consent_server;
pub mod error;
pub mod host;
pub mod import;
pub mod install;
pub mod launch;
pub mod probe;
pub mod search_path;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use bootstrap::{run_bring_up, BootstrapOutcome, BootstrapReport, BringUpState};
pub use consent::{ConsentCell, ConsentDecision};
pub use error::BootstrapError;
pub use host::{BringUpHost, ConsentSource, SystemHost};
pub use settings::Settings;

use std::path::{Path, PathBuf};

/// Brings the runtime up using the settings file at its default location.
/// `config_file` defaults to `.aog` in the current working directory.
pub fn bootstrap(config_file: Option<&Path>) -> Result<BootstrapReport, BootstrapError> {
    let settings_path = settings::resolve_settings_path(None);
    let settings = settings::load_settings(&settings_path)?;
    let config_file: PathBuf = match config_file {
        Some(path) => path.to_path_buf(),
        None => settings::default_config_file()?,
    };
    let host = SystemHost::new(settings.clone())?;
    run_bring_up(&host, &settings, &config_file)
}

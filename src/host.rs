use crate::browser::{SystemBrowser, UrlOpener};
use crate::consent::{ConsentCell, ConsentDecision};
use crate::consent_server::ConsentServer;
use crate::error::BootstrapError;
use crate::import;
use crate::install;
use crate::launch::{self, LaunchReadiness, START_ARGS};
use crate::probe::RuntimeProbe;
use crate::search_path::{platform_search_path_store, SearchPathStore};
use crate::settings::{ConsentMode, InstallLocation, RuntimeEndpoint, Settings};
use dialoguer::console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use which::which;

/// Everything the bring-up state machine needs from the outside world.
pub trait BringUpHost {
    fn is_runtime_available(&self) -> bool;
    fn has_service_provider(&self) -> bool;
    /// Blocks for at most the consent timeout. `Unknown` means it elapsed.
    fn request_consent(&self) -> Result<ConsentDecision, BootstrapError>;
    fn install_runtime(&self) -> Result<PathBuf, BootstrapError>;
    fn launch_runtime(&self, executable: &Path) -> Result<LaunchReadiness, BootstrapError>;
    /// Executable used for `import`; the runtime may predate this run.
    fn runtime_executable(&self) -> PathBuf;
    fn import_config(&self, executable: &Path, config_file: &Path) -> Result<(), BootstrapError>;
    fn notify(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentSource {
    Browser,
    Terminal,
    /// Consent given up front, e.g. `init --yes`.
    PreGranted,
}

impl From<ConsentMode> for ConsentSource {
    fn from(mode: ConsentMode) -> Self {
        match mode {
            ConsentMode::Browser => ConsentSource::Browser,
            ConsentMode::Terminal => ConsentSource::Terminal,
        }
    }
}

/// Host backed by real HTTP, processes, the browser and the user's
/// search-path store.
pub struct SystemHost {
    settings: Settings,
    probe: RuntimeProbe,
    location: InstallLocation,
    consent_source: ConsentSource,
    browser: Box<dyn UrlOpener>,
    search_path: Option<Box<dyn SearchPathStore>>,
    quiet: bool,
}

impl SystemHost {
    pub fn new(settings: Settings) -> Result<Self, BootstrapError> {
        let endpoint = RuntimeEndpoint::from_settings(&settings.runtime);
        let probe = RuntimeProbe::new(endpoint, settings.runtime.probe_timeout())?;
        let location = InstallLocation::from_settings(&settings)?;
        let search_path = if settings.install.register_search_path {
            match platform_search_path_store() {
                Ok(store) => Some(store),
                Err(err) => {
                    tracing::warn!(error = %err, "search path registration disabled");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            consent_source: settings.consent.mode.into(),
            settings,
            probe,
            location,
            browser: Box::new(SystemBrowser),
            search_path,
            quiet: false,
        })
    }

    pub fn with_consent_source(mut self, source: ConsentSource) -> Self {
        self.consent_source = source;
        self
    }

    pub fn with_browser(mut self, browser: Box<dyn UrlOpener>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_search_path_store(mut self, store: Box<dyn SearchPathStore>) -> Self {
        self.search_path = Some(store);
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn location(&self) -> &InstallLocation {
        &self.location
    }

    pub fn probe(&self) -> &RuntimeProbe {
        &self.probe
    }

    fn browser_consent(&self) -> Result<ConsentDecision, BootstrapError> {
        let cell = ConsentCell::new();
        let mut server = ConsentServer::start(self.settings.consent.port, cell.clone())?;
        let url = server.prompt_url();
        let mut opened = false;
        if self.settings.consent.open_browser {
            match self.browser.open(&url) {
                Ok(()) => opened = true,
                Err(err) => tracing::warn!(%url, error = %err, "failed to open browser"),
            }
        }
        if !opened {
            self.notify(&format!("Open {url} in a browser to confirm the installation."));
        }
        let decision = cell.wait(self.settings.consent.timeout());
        server.shutdown();
        Ok(decision)
    }

    fn terminal_consent(&self) -> Result<ConsentDecision, BootstrapError> {
        if !io::stdin().is_terminal() {
            return Err(BootstrapError::Config(
                "terminal consent requires an interactive terminal; use --consent browser or --yes"
                    .to_string(),
            ));
        }
        let cell = ConsentCell::new();
        let writer = cell.clone();
        // The prompt cannot be interrupted; on timeout the thread is left
        // blocked on stdin and its late answer is ignored.
        thread::spawn(move || {
            let answer = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt("AOG is required to continue. Download and install it now?")
                .default(false)
                .interact_opt();
            let decision = match answer {
                Ok(Some(true)) => ConsentDecision::Granted,
                _ => ConsentDecision::Denied,
            };
            writer.record(decision);
        });
        Ok(cell.wait(self.settings.consent.timeout()))
    }
}

impl BringUpHost for SystemHost {
    fn is_runtime_available(&self) -> bool {
        self.probe.is_runtime_available()
    }

    fn has_service_provider(&self) -> bool {
        self.probe.has_service_provider()
    }

    fn request_consent(&self) -> Result<ConsentDecision, BootstrapError> {
        match self.consent_source {
            ConsentSource::Browser => self.browser_consent(),
            ConsentSource::Terminal => self.terminal_consent(),
            ConsentSource::PreGranted => Ok(ConsentDecision::Granted),
        }
    }

    fn install_runtime(&self) -> Result<PathBuf, BootstrapError> {
        let client = install::download_client(Duration::from_secs(
            self.settings.install.download_timeout_sec,
        ))?;
        install::install_runtime(
            &client,
            &self.settings.install.download_url,
            &self.location,
            self.search_path.as_deref(),
        )
    }

    fn launch_runtime(&self, executable: &Path) -> Result<LaunchReadiness, BootstrapError> {
        launch::launch_detached(
            executable,
            &START_ARGS,
            self.settings.launch.ready_timeout(),
            self.settings.launch.poll_interval(),
            || self.probe.is_runtime_available(),
        )
    }

    fn runtime_executable(&self) -> PathBuf {
        resolve_runtime_executable(&self.location, &self.settings.runtime.executable_file_name())
    }

    fn import_config(&self, executable: &Path, config_file: &Path) -> Result<(), BootstrapError> {
        import::import_config(executable, config_file)
    }

    fn notify(&self, message: &str) {
        tracing::info!("{message}");
        if !self.quiet {
            eprintln!("{} {}", style("aog:").cyan().bold(), message);
        }
    }
}

/// The installed executable if present, else the one found on PATH, else
/// the install location (so errors name the expected path).
pub fn resolve_runtime_executable(location: &InstallLocation, name: &str) -> PathBuf {
    if location.executable.is_file() {
        return location.executable.clone();
    }
    match which(name) {
        Ok(path) => path,
        Err(_) => location.executable.clone(),
    }
}

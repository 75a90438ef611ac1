use aog_checker::error::BootstrapError;
use aog_checker::host::{resolve_runtime_executable, ConsentSource, SystemHost};
use aog_checker::settings::{
    self, build_default_settings_yaml, load_settings, read_settings, resolve_settings_path,
    ConsentMode, InstallLocation, RuntimeEndpoint, Settings,
};
use aog_checker::{run_bring_up, BootstrapOutcome};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::console::style;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aog-checker", version, about = "Installs, starts and configures the local AOG runtime")]
struct Cli {
    /// Settings file; overrides AOG_CHECKER_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print results as a JSON envelope.
    #[arg(long, global = true)]
    json: bool,
    /// Suppress progress messages.
    #[arg(long, short, global = true)]
    quiet: bool,
    /// Raise log verbosity (-v info, -vv debug).
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring AOG up: install on consent, start it, import the provider config.
    Init {
        /// Service provider file; defaults to `.aog` in the current directory.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Install without asking.
        #[arg(long, default_value_t = false)]
        yes: bool,
        /// How to ask before installing; defaults to `consent.mode`.
        #[arg(long, value_enum)]
        consent: Option<ConsentArg>,
    },
    /// Probe the runtime without changing anything.
    Status,
    /// Show where settings, the runtime and its config file are looked up.
    Paths,
    /// Manage the aog-checker settings file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default settings file unless one exists.
    Init,
    /// Print the effective settings.
    Show,
    /// Parse and validate the settings file.
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConsentArg {
    Browser,
    Terminal,
}

impl From<ConsentArg> for ConsentMode {
    fn from(arg: ConsentArg) -> Self {
        match arg {
            ConsentArg::Browser => ConsentMode::Browser,
            ConsentArg::Terminal => ConsentMode::Terminal,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

#[derive(Debug, Clone)]
struct Context {
    settings_path: PathBuf,
    json: bool,
    quiet: bool,
}

fn main() -> Result<(), BootstrapError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let ctx = Context {
        settings_path: resolve_settings_path(cli.config.as_ref()),
        json: cli.json,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::Init { file, yes, consent } => handle_init(&ctx, file, yes, consent),
        Commands::Status => handle_status(&ctx),
        Commands::Paths => handle_paths(&ctx),
        Commands::Config { command } => handle_config(&ctx, command),
    };

    if let Err(err) = result {
        if ctx.json {
            let payload = JsonResult::<serde_json::Value> {
                ok: false,
                result: None,
                error: Some(err.to_string()),
                error_code: Some(err.code().to_string()),
            };
            print_json(&payload)?;
        } else {
            eprintln!("{} {err}", style("error:").red().bold());
        }
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn load_context_settings(ctx: &Context) -> Result<Settings, BootstrapError> {
    load_settings(&ctx.settings_path).map_err(|err| {
        BootstrapError::Config(format!(
            "failed to load {}: {err}",
            ctx.settings_path.display()
        ))
    })
}

fn handle_init(
    ctx: &Context,
    file: Option<PathBuf>,
    yes: bool,
    consent: Option<ConsentArg>,
) -> Result<(), BootstrapError> {
    let settings = load_context_settings(ctx)?;
    let config_file = match file {
        Some(path) => path,
        None => settings::default_config_file()?,
    };
    let source = if yes {
        ConsentSource::PreGranted
    } else {
        ConsentSource::from(consent.map_or(settings.consent.mode, ConsentMode::from))
    };
    let host = SystemHost::new(settings.clone())?
        .with_consent_source(source)
        .quiet(ctx.quiet);
    let report = run_bring_up(&host, &settings, &config_file)?;
    if ctx.json {
        return output(ctx, serde_json::to_value(&report)?);
    }
    let marker = match report.outcome {
        BootstrapOutcome::AlreadyConfigured => style("ok").green().bold(),
        BootstrapOutcome::Imported { .. } => style("done").green().bold(),
    };
    println!("{marker} {}", report.message());
    Ok(())
}

fn handle_status(ctx: &Context) -> Result<(), BootstrapError> {
    let settings = load_context_settings(ctx)?;
    let host = SystemHost::new(settings)?;
    let probe = host.probe();
    let runtime_available = probe.is_runtime_available();
    let service_provider = runtime_available && probe.has_service_provider();
    output(
        ctx,
        json!({
            "runtime_url": probe.endpoint().root_url(),
            "runtime_available": runtime_available,
            "service_provider": service_provider,
            "checked_at": Utc::now().to_rfc3339(),
        }),
    )
}

fn handle_paths(ctx: &Context) -> Result<(), BootstrapError> {
    let settings = load_context_settings(ctx)?;
    let location = InstallLocation::from_settings(&settings)?;
    let endpoint = RuntimeEndpoint::from_settings(&settings.runtime);
    let runtime_executable =
        resolve_runtime_executable(&location, &settings.runtime.executable_file_name());
    output(
        ctx,
        json!({
            "settings_path": ctx.settings_path,
            "settings_exists": ctx.settings_path.exists(),
            "install_folder": location.folder,
            "install_executable": location.executable,
            "installed": location.executable.is_file(),
            "runtime_executable": runtime_executable,
            "default_config_file": settings::default_config_file()?,
            "runtime_url": endpoint.root_url(),
            "service_provider_url": endpoint.service_provider_url(),
            "consent_url": format!("http://127.0.0.1:{}/install-prompt", settings.consent.port),
        }),
    )
}

fn handle_config(ctx: &Context, command: ConfigCommand) -> Result<(), BootstrapError> {
    match command {
        ConfigCommand::Init => {
            if ctx.settings_path.exists() {
                return output(ctx, json!({"path": ctx.settings_path, "created": false}));
            }
            ensure_parent(&ctx.settings_path)?;
            fs::write(&ctx.settings_path, build_default_settings_yaml()?)?;
            output(ctx, json!({"path": ctx.settings_path, "created": true}))
        }
        ConfigCommand::Show => {
            let settings = load_context_settings(ctx)?;
            if ctx.json {
                return output(ctx, serde_json::to_value(&settings)?);
            }
            print!("{}", serde_yaml::to_string(&settings)?);
            Ok(())
        }
        ConfigCommand::Validate => {
            let _settings = read_settings(&ctx.settings_path)?;
            output(ctx, json!({"path": ctx.settings_path, "valid": true}))
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), BootstrapError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn output(ctx: &Context, payload: serde_json::Value) -> Result<(), BootstrapError> {
    if ctx.json {
        let wrapper = JsonResult {
            ok: true,
            result: Some(payload),
            error: None,
            error_code: None,
        };
        print_json(&wrapper)?;
    } else {
        println!("{}", payload);
    }
    Ok(())
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), BootstrapError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}

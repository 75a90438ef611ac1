use crate::error::BootstrapError;
use std::env;
use std::process::{Command, Stdio};
use which::which;

pub trait UrlOpener {
    fn open(&self, url: &str) -> Result<(), BootstrapError>;
}

/// Opens URLs with the desktop's default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

/// Program and arguments that open `url` on `os`.
pub fn open_command(os: &str, url: &str) -> (String, Vec<String>) {
    match os {
        "windows" => (
            "cmd".to_string(),
            vec![
                "/c".to_string(),
                "start".to_string(),
                String::new(),
                url.to_string(),
            ],
        ),
        "macos" => ("open".to_string(), vec![url.to_string()]),
        _ => ("xdg-open".to_string(), vec![url.to_string()]),
    }
}

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), BootstrapError> {
        let (program, args) = open_command(env::consts::OS, url);
        let program_path = which(&program).map_err(|err| {
            BootstrapError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{program} not found on PATH: {err}"),
            ))
        })?;
        Command::new(program_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(())
    }
}

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("consent server error: {0}")]
    ConsentServer(String),
    #[error("user declined the AOG installation")]
    UserDenied,
    #[error("no installation decision received within {0}s; AOG was not installed")]
    ConsentTimeout(u64),
    #[error("AOG download failed: {0}")]
    Download(String),
    #[error("AOG failed to start: {0}")]
    ProcessLaunch(String),
    #[error("config import failed: {0}")]
    Import(String),
    #[error("search path registration failed: {0}")]
    PathRegistration(String),
}

impl BootstrapError {
    /// Stable identifier used in the `--json` error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            BootstrapError::Config(_) => "config_invalid",
            BootstrapError::Io(_) => "io_error",
            BootstrapError::Yaml(_) => "config_parse_failed",
            BootstrapError::Json(_) => "json_error",
            BootstrapError::Http(_) => "network_error",
            BootstrapError::ConsentServer(_) => "consent_server_failed",
            BootstrapError::UserDenied => "user_denied",
            BootstrapError::ConsentTimeout(_) => "consent_timeout",
            BootstrapError::Download(_) => "download_failed",
            BootstrapError::ProcessLaunch(_) => "launch_failed",
            BootstrapError::Import(_) => "import_failed",
            BootstrapError::PathRegistration(_) => "path_registration_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_errors_have_distinct_messages_and_codes() {
        let errors = [
            BootstrapError::UserDenied,
            BootstrapError::ConsentTimeout(300),
            BootstrapError::Download("connection reset".to_string()),
            BootstrapError::ProcessLaunch("exited with status 1".to_string()),
            BootstrapError::Import("exit status 2".to_string()),
        ];
        let messages: Vec<String> = errors.iter().map(|err| err.to_string()).collect();
        let codes: Vec<&str> = errors.iter().map(|err| err.code()).collect();
        for (idx, message) in messages.iter().enumerate() {
            assert!(!messages[idx + 1..].contains(message));
            assert!(!codes[idx + 1..].contains(&codes[idx]));
        }
        assert!(messages[1].contains("300s"));
    }
}

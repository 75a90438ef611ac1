use crate::error::BootstrapError;
use std::path::Path;
use std::process::{Command, Stdio};

/// Runs `<executable> import --file <config_file>` and waits for it.
pub fn import_config(executable: &Path, config_file: &Path) -> Result<(), BootstrapError> {
    if !config_file.is_file() {
        return Err(BootstrapError::Import(format!(
            "config file not found: {}",
            config_file.display()
        )));
    }
    let output = Command::new(executable)
        .arg("import")
        .arg("--file")
        .arg(config_file)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| {
            BootstrapError::Import(format!("failed to run {}: {err}", executable.display()))
        })?;
    if output.status.success() {
        tracing::info!(config_file = %config_file.display(), "service provider config imported");
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let mut message = format!(
        "{} import exited with {}",
        executable.display(),
        output.status
    );
    if !stderr.is_empty() {
        message.push_str(": ");
        message.push_str(stderr);
    }
    Err(BootstrapError::Import(message))
}

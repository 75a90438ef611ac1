use crate::error::BootstrapError;
use dirs::home_dir;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPathChange {
    AlreadyPresent,
    Appended,
}

/// Persistent, user-level executable search path.
pub trait SearchPathStore {
    /// Adds `folder` unless it is already registered. Existing entries are
    /// never rewritten.
    fn append_if_absent(&self, folder: &Path) -> Result<SearchPathChange, BootstrapError>;

    fn describe(&self) -> String;
}

/// Picks the store for the host platform.
pub fn platform_search_path_store() -> Result<Box<dyn SearchPathStore>, BootstrapError> {
    if cfg!(windows) {
        return Ok(Box::new(RegistryPathStore));
    }
    let home = home_dir().ok_or_else(|| {
        BootstrapError::PathRegistration("home directory could not be determined".to_string())
    })?;
    let shell = env::var("SHELL").unwrap_or_default();
    Ok(Box::new(ShellProfileStore::for_shell(&home, &shell)))
}

/// Appends an `export PATH=...` line to the user's shell profile.
#[derive(Debug, Clone)]
pub struct ShellProfileStore {
    profile: PathBuf,
}

impl ShellProfileStore {
    pub fn new(profile: PathBuf) -> Self {
        Self { profile }
    }

    /// `.zshrc` for zsh users, `.bash_profile` otherwise.
    pub fn for_shell(home: &Path, shell: &str) -> Self {
        let name = if shell.contains("zsh") {
            ".zshrc"
        } else {
            ".bash_profile"
        };
        Self::new(home.join(name))
    }

    pub fn profile(&self) -> &Path {
        &self.profile
    }
}

pub fn export_line(folder: &Path) -> String {
    format!("export PATH=\"$PATH:{}\"", folder.display())
}

impl SearchPathStore for ShellProfileStore {
    fn append_if_absent(&self, folder: &Path) -> Result<SearchPathChange, BootstrapError> {
        let line = export_line(folder);
        let existing = match fs::read_to_string(&self.profile) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(BootstrapError::PathRegistration(format!(
                    "failed to read {}: {err}",
                    self.profile.display()
                )))
            }
        };
        if existing.lines().any(|existing| existing.trim() == line) {
            return Ok(SearchPathChange::AlreadyPresent);
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.profile)
            .map_err(|err| {
                BootstrapError::PathRegistration(format!(
                    "failed to open {}: {err}",
                    self.profile.display()
                ))
            })?;
        let separator = if existing.is_empty() || existing.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        writeln!(file, "{separator}{line}").map_err(|err| {
            BootstrapError::PathRegistration(format!(
                "failed to write {}: {err}",
                self.profile.display()
            ))
        })?;
        Ok(SearchPathChange::Appended)
    }

    fn describe(&self) -> String {
        self.profile.display().to_string()
    }
}

/// `HKCU\Environment\Path`, edited with `reg.exe`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryPathStore;

const REGISTRY_KEY: &str = r"HKCU\Environment";

impl RegistryPathStore {
    fn query_current(&self) -> Result<String, BootstrapError> {
        let output = Command::new("reg")
            .args(["query", REGISTRY_KEY, "/v", "Path"])
            .output()
            .map_err(|err| {
                BootstrapError::PathRegistration(format!("failed to run reg query: {err}"))
            })?;
        if !output.status.success() {
            // No user-level Path value yet.
            return Ok(String::new());
        }
        Ok(parse_reg_query_value(&String::from_utf8_lossy(&output.stdout)).unwrap_or_default())
    }
}

impl SearchPathStore for RegistryPathStore {
    fn append_if_absent(&self, folder: &Path) -> Result<SearchPathChange, BootstrapError> {
        let current = self.query_current()?;
        let folder = folder.display().to_string();
        let Some(updated) = merge_search_path(&current, &folder) else {
            return Ok(SearchPathChange::AlreadyPresent);
        };
        let status = Command::new("reg")
            .args([
                "add",
                REGISTRY_KEY,
                "/v",
                "Path",
                "/t",
                "REG_EXPAND_SZ",
                "/d",
                &updated,
                "/f",
            ])
            .output()
            .map_err(|err| {
                BootstrapError::PathRegistration(format!("failed to run reg add: {err}"))
            })?;
        if !status.status.success() {
            return Err(BootstrapError::PathRegistration(format!(
                "reg add exited with {}: {}",
                status.status,
                String::from_utf8_lossy(&status.stderr).trim()
            )));
        }
        Ok(SearchPathChange::Appended)
    }

    fn describe(&self) -> String {
        format!(r"{REGISTRY_KEY}\Path")
    }
}

/// Extracts the data column of the `Path` row from `reg query` output.
pub fn parse_reg_query_value(output: &str) -> Option<String> {
    for line in output.lines() {
        let mut columns = line.split_whitespace();
        if !columns
            .next()
            .is_some_and(|name| name.eq_ignore_ascii_case("path"))
        {
            continue;
        }
        let Some(kind) = columns.next() else { continue };
        if !kind.starts_with("REG_") {
            continue;
        }
        let idx = line.find(kind)? + kind.len();
        return Some(line[idx..].trim().to_string());
    }
    None
}

/// Returns the new `;`-separated value, or `None` when `folder` is already
/// an entry (case-insensitive, trailing separators ignored).
pub fn merge_search_path(current: &str, folder: &str) -> Option<String> {
    let normalize = |entry: &str| {
        entry
            .trim()
            .trim_end_matches(['\\', '/'])
            .to_ascii_lowercase()
    };
    let wanted = normalize(folder);
    if current
        .split(';')
        .any(|entry| !entry.trim().is_empty() && normalize(entry) == wanted)
    {
        return None;
    }
    let trimmed = current.trim_end_matches(';');
    if trimmed.trim().is_empty() {
        Some(folder.to_string())
    } else {
        Some(format!("{trimmed};{folder}"))
    }
}

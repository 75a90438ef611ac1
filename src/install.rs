use crate::error::BootstrapError;
use crate::search_path::{SearchPathChange, SearchPathStore};
use crate::settings::InstallLocation;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn download_client(timeout: Duration) -> Result<Client, BootstrapError> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent("aog-checker")
        .build()?)
}

/// Streams `url` into the install location. The payload lands in a
/// `.part` file first and is renamed only after the body was read in full.
pub fn download_runtime(
    client: &Client,
    url: &str,
    location: &InstallLocation,
) -> Result<PathBuf, BootstrapError> {
    fs::create_dir_all(&location.folder).map_err(|err| {
        BootstrapError::Download(format!(
            "failed to create {}: {err}",
            location.folder.display()
        ))
    })?;
    let mut response = client
        .get(url)
        .send()
        .map_err(|err| BootstrapError::Download(format!("{url}: {err}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(BootstrapError::Download(format!("{url} (HTTP {status})")));
    }

    let partial = location.partial_download_path();
    let written = match write_body(&mut response, &partial) {
        Ok(written) => written,
        Err(err) => {
            let _ = fs::remove_file(&partial);
            return Err(BootstrapError::Download(format!("{url}: {err}")));
        }
    };
    if let Err(err) = finalize_executable(&partial, &location.executable) {
        let _ = fs::remove_file(&partial);
        return Err(BootstrapError::Download(format!(
            "failed to install {}: {err}",
            location.executable.display()
        )));
    }
    tracing::info!(
        %url,
        bytes = written,
        path = %location.executable.display(),
        "runtime downloaded"
    );
    Ok(location.executable.clone())
}

fn write_body(response: &mut impl io::Read, path: &Path) -> io::Result<u64> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let written = io::copy(response, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(written)
}

fn finalize_executable(partial: &Path, executable: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(partial, fs::Permissions::from_mode(0o755))?;
    }
    fs::rename(partial, executable)
}

/// Registers the install folder on the user's search path. Failures are
/// logged and reported as `false`; they never abort an installation.
pub fn register_install_folder(store: &dyn SearchPathStore, folder: &Path) -> bool {
    match store.append_if_absent(folder) {
        Ok(SearchPathChange::AlreadyPresent) => {
            tracing::info!(
                folder = %folder.display(),
                store = %store.describe(),
                "install folder already on search path"
            );
            true
        }
        Ok(SearchPathChange::Appended) => {
            tracing::info!(
                folder = %folder.display(),
                store = %store.describe(),
                "install folder added to search path; open a new shell to pick it up"
            );
            true
        }
        Err(err) => {
            tracing::warn!(
                folder = %folder.display(),
                error = %err,
                "search path registration failed; continuing"
            );
            false
        }
    }
}

/// Download followed by best-effort search-path registration.
pub fn install_runtime(
    client: &Client,
    url: &str,
    location: &InstallLocation,
    store: Option<&dyn SearchPathStore>,
) -> Result<PathBuf, BootstrapError> {
    let executable = download_runtime(client, url, location)?;
    if let Some(store) = store {
        register_install_folder(store, &location.folder);
    }
    Ok(executable)
}

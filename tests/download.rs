mod common;

use aog_checker::install::{download_client, download_runtime};
use aog_checker::settings::InstallLocation;
use aog_checker::BootstrapError;
use common::TruncatedServer;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn truncated_body_is_cleaned_up() {
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let server = TruncatedServer::start(body, 1_000);
    let dir = tempdir().unwrap();
    let folder = dir.path().join("AOG");
    let location = InstallLocation {
        executable: folder.join("aog"),
        folder,
    };
    let client = download_client(Duration::from_secs(10)).unwrap();

    let err = download_runtime(&client, &server.url("/aog"), &location)
        .expect_err("truncated body should fail");

    assert!(matches!(err, BootstrapError::Download(_)));
    assert!(!location.executable.exists());
    assert!(!location.partial_download_path().exists());
}

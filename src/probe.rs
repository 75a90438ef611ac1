use crate::error::BootstrapError;
use crate::settings::RuntimeEndpoint;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;

/// Read-only liveness and configuration checks against the local runtime.
///
/// Both checks swallow every transport failure and report `false`, so the
/// orchestrator can treat "unreachable" and "not ready" the same way.
#[derive(Debug, Clone)]
pub struct RuntimeProbe {
    client: Client,
    endpoint: RuntimeEndpoint,
}

impl RuntimeProbe {
    pub fn new(endpoint: RuntimeEndpoint, timeout: Duration) -> Result<Self, BootstrapError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent("aog-checker")
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &RuntimeEndpoint {
        &self.endpoint
    }

    pub fn is_runtime_available(&self) -> bool {
        let url = self.endpoint.root_url();
        match self.client.get(&url).send() {
            Ok(response) => {
                let status = response.status();
                if status != StatusCode::OK {
                    tracing::debug!(%url, %status, "runtime liveness probe returned non-200");
                }
                status == StatusCode::OK
            }
            Err(err) => {
                tracing::debug!(%url, error = %err, "runtime liveness probe failed");
                false
            }
        }
    }

    pub fn has_service_provider(&self) -> bool {
        let url = self.endpoint.service_provider_url();
        let response = match self.client.get(&url).send() {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(%url, error = %err, "service provider probe failed");
                return false;
            }
        };
        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!(%url, %status, "service provider probe returned non-200");
            return false;
        }
        match response.text() {
            Ok(body) => !body.trim().is_empty(),
            Err(err) => {
                tracing::debug!(%url, error = %err, "service provider body could not be read");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Settings, DEFAULT_API_PREFIX};
    use crate::test_support::unused_local_url;
    use httpmock::prelude::*;

    const PROVIDER_PATH: &str = "/aog/v0.3/service_provider";

    fn probe_for(base_url: &str, timeout: Duration) -> RuntimeProbe {
        RuntimeProbe::new(RuntimeEndpoint::new(base_url, DEFAULT_API_PREFIX), timeout).unwrap()
    }

    fn provider_server(status: u16, body: &str) -> MockServer {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(PROVIDER_PATH);
            then.status(status).body(body);
        });
        server
    }

    #[test]
    fn available_only_on_200() {
        let server = MockServer::start();
        let root = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("aog");
        });
        let probe = probe_for(&server.base_url(), Duration::from_secs(3));
        assert!(probe.is_runtime_available());
        root.assert_calls(1);

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(503).body("starting");
        });
        let probe = probe_for(&server.base_url(), Duration::from_secs(3));
        assert!(!probe.is_runtime_available());
    }

    #[test]
    fn connection_refused_maps_to_false() {
        let probe = probe_for(&unused_local_url(), Duration::from_millis(500));
        assert!(!probe.is_runtime_available());
        assert!(!probe.has_service_provider());
    }

    #[test]
    fn timeout_maps_to_false() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body("slow")
                .delay(Duration::from_millis(800));
        });
        let probe = probe_for(&server.base_url(), Duration::from_millis(200));
        assert!(!probe.is_runtime_available());
    }

    #[test]
    fn provider_requires_non_blank_body() {
        let server = provider_server(200, "  \n\t ");
        let probe = probe_for(&server.base_url(), Duration::from_secs(3));
        assert!(!probe.has_service_provider());

        let server = provider_server(200, "");
        let probe = probe_for(&server.base_url(), Duration::from_secs(3));
        assert!(!probe.has_service_provider());

        let server = provider_server(200, "{\"data\":[{\"provider_name\":\"local_ollama\"}]}");
        let probe = probe_for(&server.base_url(), Duration::from_secs(3));
        assert!(probe.has_service_provider());
    }

    #[test]
    fn provider_non_200_is_absent_even_with_body() {
        let server = provider_server(500, "{\"error\":\"boom\"}");
        let probe = probe_for(&server.base_url(), Duration::from_secs(3));
        assert!(!probe.has_service_provider());
    }

    #[test]
    fn default_settings_find_a_v03_provider() {
        let server = provider_server(200, "{\"data\":[{\"provider_name\":\"local_ollama\"}]}");
        let mut settings = Settings::default();
        settings.runtime.base_url = server.base_url();
        let endpoint = RuntimeEndpoint::from_settings(&settings.runtime);
        let probe = RuntimeProbe::new(endpoint, settings.runtime.probe_timeout()).unwrap();
        assert!(probe.has_service_provider());
    }
}

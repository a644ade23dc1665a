//! Resolved client configuration.

use std::time::Duration;

use pulsar_settings::RealtimeSettings;
use url::Url;

use crate::errors::{RealtimeError, Result};
use crate::policy::ReconnectPolicy;

/// Validated settings in the form the driver consumes.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    endpoint: Url,
    /// Backoff policy.
    pub policy: ReconnectPolicy,
    /// Interval between liveness probes.
    pub heartbeat_interval: Duration,
}

impl ClientConfig {
    /// Resolve `<url><path>` and the timing parameters.
    pub fn from_settings(settings: &RealtimeSettings) -> Result<Self> {
        settings.validate()?;

        let raw = join_endpoint(&settings.url, &settings.path);
        let endpoint = Url::parse(&raw).map_err(|e| RealtimeError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(RealtimeError::InvalidUrl {
                url: raw,
                reason: format!("unsupported scheme {}", endpoint.scheme()),
            });
        }

        Ok(Self {
            endpoint,
            policy: ReconnectPolicy::from(&settings.reconnect),
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
        })
    }

    /// Endpoint without a credential.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Endpoint to open, with `token` appended as a query parameter when present.
    pub fn connect_url(&self, token: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(token) = token {
            let _ = url.query_pairs_mut().append_pair("token", token);
        }
        url
    }
}

fn join_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    match path.trim() {
        "" => base.to_string(),
        p if p.starts_with('/') => format!("{base}{p}"),
        p => format!("{base}/{p}"),
    }
}

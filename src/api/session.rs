//! Purpose: Hold the immutable connection configuration for one API endpoint.
//! Exports: `Session`, `TlsPolicy`.
//! Role: Validated input to `Transport`; safe to share across threads.
//! Invariants: `base_url` is absolute http(s); `api_key` is non-empty.
//! Invariants: The TLS policy is an explicit caller choice, never a default.

use crate::core::error::{Error, ErrorKind};
use std::path::PathBuf;
use std::time::Duration;

/// TLS server-certificate policy for a session.
///
/// There is deliberately no default: deployments behind a private CA pass a
/// PEM bundle, and everything else must opt into the insecure fallback by
/// naming it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TlsPolicy {
    /// Verify server certificates against the PEM bundle at this path.
    CaBundle(PathBuf),
    /// Accept any server certificate. This disables TLS verification
    /// entirely and must only be used against trusted networks.
    DangerouslyDisableVerification,
}

/// Connection settings for one API endpoint. Constructed once, then read-only;
/// concurrent callers may share a `Session` freely.
#[derive(Clone, Debug)]
pub struct Session {
    base_url: url::Url,
    api_key: String,
    tls: TlsPolicy,
    timeout: Option<Duration>,
}

impl Session {
    /// Validate and build a session. `base_url` is the API root, including
    /// any version path (e.g. `https://eln.example.org/api/v2/`).
    pub fn new(
        base_url: impl AsRef<str>,
        api_key: impl Into<String>,
        tls: TlsPolicy,
    ) -> Result<Self, Error> {
        let base_url = parse_base_url(base_url.as_ref())?;
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("api key must not be empty"));
        }
        Ok(Self {
            base_url,
            api_key,
            tls,
            timeout: None,
        })
    }

    /// Bound every request with an overall timeout. There is no cancellation
    /// mid-request; this is the only mechanism that limits a blocking call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn tls_policy(&self) -> &TlsPolicy {
        &self.tls
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

fn parse_base_url(raw: &str) -> Result<url::Url, Error> {
    let mut url = url::Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage).with_message("base url must use http or https"));
    }
    if url.host_str().is_none() {
        return Err(Error::new(ErrorKind::Usage).with_message("base url must include a host"));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

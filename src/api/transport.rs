//! Purpose: Perform authenticated, blocking HTTP calls against the configured API root.
//! Exports: `Transport`.
//! Role: The only module that touches the network; everything above it sees
//! Role: typed results or the crate error taxonomy.
//! Invariants: Every request carries the session API key as `Authorization`.
//! Invariants: Non-2xx responses become `Api`/`NotFound`, network failures
//! Invariants: become `Transport`; nothing is retried here.
#![allow(clippy::result_large_err)]

use crate::api::session::{Session, TlsPolicy};
use crate::core::error::{Error, ErrorKind};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use serde::Serialize;
use serde_json::Value;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug)]
pub struct Transport {
    agent: ureq::Agent,
    base_url: Url,
    api_key: String,
}

#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

impl Transport {
    pub fn new(session: &Session) -> Result<Self, Error> {
        let agent = build_agent(session)?;
        Ok(Self {
            agent,
            base_url: session.base_url().clone(),
            api_key: session.api_key().to_string(),
        })
    }

    pub fn get_json(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Value, Error> {
        let url = self.build_url(segments, query)?;
        let response = self.call("GET", &url, None)?;
        read_json_response(response)
    }

    pub fn get_bytes(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Vec<u8>, Error> {
        let url = self.build_url(segments, query)?;
        let response = self.call("GET", &url, None)?;
        let mut out = Vec::new();
        response.into_reader().read_to_end(&mut out).map_err(|err| {
            Error::new(ErrorKind::Transport)
                .with_message("failed to read response body")
                .with_source(err)
        })?;
        Ok(out)
    }

    pub fn post_json<T: Serialize>(&self, segments: &[&str], body: &T) -> Result<Value, Error> {
        let url = self.build_url(segments, &[])?;
        let response = self.call("POST", &url, Some(encode_body(body)?))?;
        read_json_response(response)
    }

    pub fn patch_json<T: Serialize>(&self, segments: &[&str], body: &T) -> Result<Value, Error> {
        let url = self.build_url(segments, &[])?;
        let response = self.call("PATCH", &url, Some(encode_body(body)?))?;
        read_json_response(response)
    }

    pub fn delete(&self, segments: &[&str]) -> Result<(), Error> {
        let url = self.build_url(segments, &[])?;
        let _ = self.call("DELETE", &url, None)?;
        Ok(())
    }

    fn build_url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::new(ErrorKind::Usage).with_message("base url cannot be a base")
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn call(&self, method: &str, url: &Url, payload: Option<String>) -> Result<ureq::Response, Error> {
        // Request lines are logged without the key; the original client
        // censored the Authorization header the same way.
        debug!(method, url = %url, authorization = "**censored**", "api request");
        let request = self
            .agent
            .request(method, url.as_str())
            .set("Authorization", &self.api_key)
            .set("Accept", "application/json");

        let response = match payload {
            None => request.call(),
            Some(payload) => request
                .set("Content-Type", "application/json")
                .send_string(&payload),
        };

        match response {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(status, resp)) => Err(status_error(status, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transport)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

fn build_agent(session: &Session) -> Result<ureq::Agent, Error> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let tls_config = match session.tls_policy() {
        TlsPolicy::CaBundle(path) => ca_bundle_config(path)?,
        TlsPolicy::DangerouslyDisableVerification => {
            warn!("TLS certificate verification is disabled for this session");
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth()
        }
    };
    let mut builder = ureq::builder().tls_config(Arc::new(tls_config));
    if let Some(timeout) = session.timeout() {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build())
}

fn ca_bundle_config(path: &Path) -> Result<rustls::ClientConfig, Error> {
    let cert_bytes = std::fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("failed to read certificate bundle")
            .with_path(path)
            .with_source(err)
    })?;
    let mut cert_reader = Cursor::new(cert_bytes);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to parse certificate bundle")
                .with_path(path)
                .with_source(err)
        })?;
    if certs.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("certificate bundle contains no certificates")
            .with_path(path));
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, _) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("certificate bundle contains no parsable certificates")
            .with_path(path));
    }

    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

fn encode_body<T: Serialize>(body: &T) -> Result<String, Error> {
    serde_json::to_string(body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode request json")
            .with_source(err)
    })
}

fn status_error(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let kind = if status == 404 {
        ErrorKind::NotFound
    } else {
        ErrorKind::Api
    };
    let mut err = Error::new(kind)
        .with_message(format!("server returned status {status}"))
        .with_status(status);
    if !body.is_empty() {
        err = err.with_body(body);
    }
    err
}

fn read_json_response(response: ureq::Response) -> Result<Value, Error> {
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

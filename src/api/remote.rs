//! Purpose: Provide the blocking HTTP client for the Qdrant REST API.
//! Exports: `RemoteClient`, `ClientOptions`.
//! Role: `Gateway` implementation; one request/response exchange per call.
//! Invariants: Responses are unwrapped from the `{result, status, time}` envelope.
//! Invariants: 401/403 map to `Authentication`; other >= 400 map to `Request` with status + body.
//! Invariants: Transport timeouts map to `Timeout`, every other transport failure to `Transport`.
//! Invariants: Connections are not pooled; each request opens its own connection.
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind, is_timeout_source};
use crate::core::gateway::Gateway;
use crate::core::record::{CollectionInfo, Page, ScrollRequest, Telemetry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use ureq::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use ureq::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use ureq::rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use url::Url;

type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("qdtk/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub api_key: Option<String>,
    pub tls_ca_file: Option<PathBuf>,
    pub tls_skip_verify: bool,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            api_key: None,
            tls_ca_file: None,
            tls_skip_verify: false,
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

struct RemoteClientInner {
    base_url: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug)]
struct AcceptAllServerCertVerifier;

impl ServerCertVerifier for AcceptAllServerCertVerifier {
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
        ureq::rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionsList {
    collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    status: ErrorStatus,
}

#[derive(Deserialize)]
struct ErrorStatus {
    error: String,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        Self::with_options(base_url, ClientOptions::new())
    }

    pub fn with_options(base_url: impl Into<String>, options: ClientOptions) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = build_agent(&options)?;
        Ok(Self {
            inner: Arc::new(RemoteClientInner {
                base_url,
                api_key: options.api_key,
                agent,
            }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Issues one exchange against `segments` under the base URL and decodes `result`.
    pub fn execute<T, R>(&self, method: &str, segments: &[&str], body: Option<&T>) -> ApiResult<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = build_url(&self.inner.base_url, segments)?;
        let request = self.request(method, &url);
        let response = match body {
            None => request.call(),
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Encoding)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };

        match response {
            Ok(resp) => {
                tracing::debug!(method, url = %url, status = resp.status(), "request completed");
                let envelope: Envelope<R> = read_json_response(resp)?;
                Ok(envelope.result)
            }
            Err(ureq::Error::Status(code, resp)) => {
                tracing::debug!(method, url = %url, status = code, "request rejected");
                Err(parse_error_response(code, resp))
            }
            Err(ureq::Error::Transport(err)) => {
                tracing::debug!(method, url = %url, error = %err, "request failed");
                Err(transport_error(err))
            }
        }
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let mut request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        if let Some(api_key) = &self.inner.api_key {
            request = request.set("api-key", api_key);
        }
        request
    }
}

impl Gateway for RemoteClient {
    fn list_collections(&self) -> ApiResult<Vec<String>> {
        let list: CollectionsList = self.execute::<(), _>("GET", &["collections"], None)?;
        Ok(list
            .collections
            .into_iter()
            .map(|collection| collection.name)
            .collect())
    }

    fn collection_info(&self, collection: &str) -> ApiResult<CollectionInfo> {
        self.execute::<(), _>("GET", &["collections", collection], None)
    }

    fn scroll(&self, collection: &str, request: &ScrollRequest) -> ApiResult<Page> {
        self.execute(
            "POST",
            &["collections", collection, "points", "scroll"],
            Some(request),
        )
    }

    fn telemetry(&self) -> ApiResult<Telemetry> {
        self.execute::<(), _>("GET", &["telemetry"], None)
    }
}

fn build_agent(options: &ClientOptions) -> ApiResult<ureq::Agent> {
    let mut builder = ureq::AgentBuilder::new()
        .timeout(options.timeout)
        .redirects(0)
        .max_idle_connections(0)
        .max_idle_connections_per_host(0)
        .user_agent(USER_AGENT);

    if options.tls_skip_verify {
        let _ = ureq::rustls::crypto::ring::default_provider().install_default();
        let tls_config = ureq::rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAllServerCertVerifier))
            .with_no_client_auth();
        builder = builder.tls_config(Arc::new(tls_config));
    } else if let Some(path) = &options.tls_ca_file {
        builder = builder.tls_config(Arc::new(ca_tls_config(path)?));
    }
    Ok(builder.build())
}

fn ca_tls_config(path: &Path) -> ApiResult<ureq::rustls::ClientConfig> {
    let cert_bytes = std::fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!(
                "failed to read TLS CA/certificate file {}",
                path.display()
            ))
            .with_source(err)
    })?;
    let mut cert_reader = Cursor::new(cert_bytes);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "failed to parse TLS CA/certificate file {}",
                    path.display()
                ))
                .with_source(err)
        })?;
    if certs.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "TLS CA/certificate file {} contains no certificates",
            path.display()
        )));
    }

    let _ = ureq::rustls::crypto::ring::default_provider().install_default();
    let mut root_store = ureq::rustls::RootCertStore::empty();
    let (added, _) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "TLS CA/certificate file {} contains no parsable certificates",
            path.display()
        )));
    }

    Ok(ureq::rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid Qdrant url")
            .with_hint("Use a full URL such as http://localhost:6333.")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("Qdrant url must use http or https scheme")
            .with_hint("Use a full URL such as http://localhost:6333."));
    }
    if url.cannot_be_a_base() {
        return Err(Error::new(ErrorKind::Usage).with_message("Qdrant url cannot be a base"));
    }
    let trimmed = url.path().trim_end_matches('/').to_string();
    url.set_path(&trimmed);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("Qdrant url cannot be a base")
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let reader = BufReader::new(response.into_reader());
    serde_json::from_reader(reader).map_err(|err| {
        if !err.is_io() {
            return Error::new(ErrorKind::Request)
                .with_message("invalid response json")
                .with_source(err);
        }
        let timed_out = matches!(
            err.io_error_kind(),
            Some(io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
        ) || is_timeout_source(&err);
        let kind = if timed_out {
            ErrorKind::Timeout
        } else {
            ErrorKind::Transport
        };
        Error::new(kind)
            .with_message("failed to read response body")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.status.error)
        .unwrap_or_else(|_| format!("HTTP {status}"));
    let err = Error::new(error_kind_from_status(status))
        .with_message(message)
        .with_status(status)
        .with_body(body);
    match status {
        401 | 403 => err.with_hint("Provide a valid key with --api-key or QDRANT_API_KEY."),
        404 => err.with_hint("Check the collection name with `qdtk list`."),
        _ => err,
    }
}

fn transport_error(err: ureq::Transport) -> Error {
    let kind = if is_timeout_source(&err) {
        ErrorKind::Timeout
    } else {
        ErrorKind::Transport
    };
    let message = match kind {
        ErrorKind::Timeout => "request timed out",
        _ => "request failed",
    };
    Error::new(kind).with_message(message).with_source(err)
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Authentication,
        _ => ErrorKind::Request,
    }
}

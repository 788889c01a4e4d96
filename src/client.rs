use crate::client::SynoError::*;
use crate::entities::{ApiRequest, ApiResponse, AuthData, HttpMethod, Params};
use crate::{utils, wire};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde_json::Value;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Namespace shared by all Synology APIs
pub const API_NAMESPACE: &str = "SYNO";
/// Service hosting authentication and API discovery
pub const AUTH_SERVICE: &str = "API";
pub const FILE_STATION_SERVICE: &str = "FileStation";
pub const DRIVE_SERVICE: &str = "SynologyDrive";
pub const DEFAULT_SESSION_NAME: &str = "default";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const AUTH_PATH: &str = "auth.cgi";
const AUTH_VERSION: u32 = 2;

/// Custom error types for the [`SynoClient`]
#[derive(Error, Debug)]
pub enum SynoError {
    #[error("Connection error: HTTP status {status}")]
    Transport { status: u16, body: String },

    #[error("Connection timeout after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("Synology API error: code={code}, message={message}")]
    Api { code: i32, message: String },

    #[error("Missing session")]
    MissingSession,

    #[error("Network request error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Environment variable error: {0}")]
    Environment(#[from] env::VarError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid input parameter: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scheme used to reach the NAS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }
}

impl FromStr for Protocol {
    type Err = SynoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(Configuration(format!(
                "Protocol must be http or https, got: {other}"
            ))),
        }
    }
}

/// Session-aware client for one Synology webapi service family
pub struct SynoClient {
    service_name: String,
    namespace: String,
    base_url: String,
    version: u32,
    request_timeout: Duration,
    client: Client,
    sid: Option<String>,
    session_name: String,
    debug: bool,
}

impl SynoClient {
    /// Creates a new `SynoClient` with a builder pattern
    #[must_use]
    pub fn builder() -> SynoClientBuilder {
        SynoClientBuilder::default()
    }

    /// Builder preset for the `SYNO.FileStation` APIs
    pub fn file_station(host: impl Into<String>) -> SynoClientBuilder {
        Self::builder().service_name(FILE_STATION_SERVICE).host(host)
    }

    /// Builder preset for the `SYNO.SynologyDrive` APIs (My Drive, Team Folders)
    pub fn drive(host: impl Into<String>) -> SynoClientBuilder {
        Self::builder().service_name(DRIVE_SERVICE).host(host)
    }

    /// Creates a configured HTTP client
    fn create_client(
        connect_timeout: Duration,
        request_timeout: Duration,
        verify_ssl: bool,
    ) -> Result<Client> {
        Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .danger_accept_invalid_certs(!verify_ssl)
            .danger_accept_invalid_hostnames(!verify_ssl)
            .build()
            .context("Failed to create HTTP client")
    }

    /// Logs in and stores the returned session ID.
    ///
    /// An already open session is logged out first. The session name is only
    /// replaced once the login succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Username or password is empty
    /// - Network request fails
    /// - The NAS rejects the credentials
    /// - The response carries no session ID
    pub async fn connect(
        &mut self,
        username: &str,
        password: &str,
        session_name: Option<&str>,
    ) -> Result<()> {
        if username.is_empty() {
            return Err(InvalidInput("Username cannot be empty".into()).into());
        }

        if password.is_empty() {
            return Err(InvalidInput("Password cannot be empty".into()).into());
        }

        if self.sid.is_some() {
            debug!("Closing session '{}' before logging in again", self.session_name);
            if let Err(e) = self.disconnect().await {
                warn!("Logout of the previous session failed: {e:#}");
            }
        }

        let session_name = session_name
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.session_name)
            .to_string();

        self.log("Connect Session", &session_name);
        self.log("User", username);

        let request = ApiRequest::new(AUTH_SERVICE, "Auth", AUTH_PATH, "login")
            .params([
                ("account", username),
                ("passwd", password),
                ("session", self.service_name.as_str()),
                ("format", "sid"),
            ])
            .version(AUTH_VERSION)
            .without_session();

        let auth: AuthData = self
            .request(request)
            .await
            .context("Failed to authorize")?
            .into_data()?;

        let sid = auth
            .sid
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| InvalidResponse("No session ID received".into()))?;

        debug!(
            "Connected to {} as {username}, session '{session_name}'",
            self.base_url
        );
        self.sid = Some(sid);
        self.session_name = session_name;
        Ok(())
    }

    /// Logs out and forgets the session ID.
    ///
    /// Without an active session this does nothing. The local session is
    /// cleared before the logout call, so the client ends up disconnected even
    /// when that call fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the logout request fails
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(sid) = self.sid.take() else {
            debug!("No active session to close");
            return Ok(());
        };

        self.log("Disconnect Session", &self.session_name);

        let request = ApiRequest::new(AUTH_SERVICE, "Auth", AUTH_PATH, "logout")
            .params([("_sid", sid.as_str()), ("session", self.session_name.as_str())])
            .without_session();

        self.request(request)
            .await
            .context("Failed to log out")?;

        debug!("Session '{}' closed", self.session_name);
        Ok(())
    }

    /// Runs `f` inside a session that is always closed afterwards, whether `f`
    /// succeeds or not.
    ///
    /// ```rust,no_run
    /// # use syno_webapi::client::SynoClient;
    /// # async fn run() -> anyhow::Result<()> {
    /// let mut client = SynoClient::file_station("nas.local").build()?;
    /// let apis = client
    ///     .with_session("admin", "secret", None, async |client| {
    ///         client.get_available_api().await
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the login error, the error of `f`, or the logout error, in that
    /// order of precedence
    pub async fn with_session<T, F>(
        &mut self,
        username: &str,
        password: &str,
        session_name: Option<&str>,
        f: F,
    ) -> Result<T>
    where
        F: AsyncFnOnce(&mut Self) -> Result<T>,
    {
        self.connect(username, password, session_name).await?;
        let outcome = f(&mut *self).await;
        let closed = self.disconnect().await;

        match (outcome, closed) {
            (Err(e), Err(logout)) => {
                warn!("Logout failed after an error: {logout:#}");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(logout)) => Err(logout),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Lists the APIs the NAS exposes, with their paths and version ranges
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - API returns an error response
    pub async fn get_available_api(&self) -> Result<Value> {
        let request = ApiRequest::new(AUTH_SERVICE, "Info", "query.cgi", "query")
            .param("query", "all")
            .without_session();

        let data = self
            .request(request)
            .await
            .context("Failed to query available APIs")?
            .into_data()?;
        Ok(data)
    }

    /// Sends one webapi call.
    ///
    /// The session ID, the API identifier `{namespace}.{service}.{api}`, the
    /// version and the method are added to the request parameters. Uploads send
    /// only `api`, `method`, `version` and `_sid` in the query string and
    /// everything else as multipart form fields.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The request needs a session and the client isn't connected (nothing is sent)
    /// - Service, API or method name is empty
    /// - Network request fails or times out
    /// - The HTTP status isn't 200
    /// - API returns an error response
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        request.validate()?;

        let ApiRequest {
            service,
            api,
            path,
            method,
            mut params,
            version,
            http_method,
            file,
            requires_session,
        } = request;

        match &self.sid {
            Some(sid) => params.insert("_sid", sid),
            None if requires_session => return Err(MissingSession.into()),
            None => {}
        }

        params.insert("api", format!("{}.{service}.{api}", self.namespace));
        params.insert(
            "version",
            version.filter(|v| *v > 0).unwrap_or(self.version),
        );
        params.insert("method", method);

        let start = Instant::now();
        let sent = match (http_method, file) {
            (HttpMethod::Post, Some(file)) => {
                let (routing, mut fields) = wire::split_routing(&params);
                fields.insert("size", file.len());

                let url = wire::request_url(&self.base_url, &path, &routing);
                let boundary = wire::new_boundary();
                let body = wire::multipart_body(&boundary, &fields, &file);

                self.log("Requested Url", &url);
                debug!(
                    "Uploading {} ({}) with {} form fields",
                    file.filename,
                    utils::human_size(file.len()),
                    fields.len()
                );

                self.client
                    .post(&url)
                    .header(CONTENT_TYPE, wire::multipart_content_type(&boundary))
                    .body(body)
                    .send()
                    .await
            }
            (HttpMethod::Post, None) => {
                let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
                self.log("Requested Url", &url);

                self.client
                    .post(&url)
                    .form(&params.iter().collect::<Vec<_>>())
                    .send()
                    .await
            }
            (HttpMethod::Get, _) => {
                let url = wire::request_url(&self.base_url, &path, &params);
                self.log(
                    "Requested Url",
                    wire::request_url(&self.base_url, &path, &redacted(&params)),
                );

                self.client.get(&url).send().await
            }
        };

        let response = sent.map_err(|e| Self::transport_failure(e, start))?;
        let status = response.status();
        debug!("API request status: {status}");
        self.log("Response code", status.as_u16());

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::transport_failure(e, start))?
            .to_vec();

        let outcome = wire::interpret_response(
            status.as_u16(),
            &content_type,
            start.elapsed(),
            self.request_timeout,
            body,
        );

        if let Err(Transport { body, .. }) = &outcome {
            self.log("Result", body);
        }

        outcome.map_err(Into::into)
    }

    fn transport_failure(error: reqwest::Error, start: Instant) -> SynoError {
        if error.is_timeout() {
            Timeout {
                elapsed: start.elapsed(),
            }
        } else {
            Network(error)
        }
    }

    /// Activates the debug mode, tracing URLs, status codes and error bodies
    pub fn activate_debug(&mut self) -> &mut Self {
        self.debug = true;
        self
    }

    fn log(&self, key: &str, value: impl Display) {
        if self.debug {
            info!("{key}: {value}");
        }
    }

    /// Returns the current session ID
    ///
    /// # Errors
    ///
    /// Returns [`SynoError::MissingSession`] when not connected
    pub fn session_id(&self) -> Result<&str> {
        self.sid
            .as_deref()
            .ok_or_else(|| MissingSession.into())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.sid.is_some()
    }

    #[must_use]
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Drop for SynoClient {
    fn drop(&mut self) {
        let Some(sid) = self.sid.take() else {
            return;
        };

        warn!(
            "Client dropped with session '{}' still open, sending a logout",
            self.session_name
        );

        let params = Params::from([
            ("api", format!("{}.{AUTH_SERVICE}.Auth", self.namespace)),
            ("version", self.version.to_string()),
            ("method", "logout".to_string()),
            ("_sid", sid),
            ("session", self.session_name.clone()),
        ]);
        let url = wire::request_url(&self.base_url, AUTH_PATH, &params);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                handle.spawn(async move {
                    if let Err(e) = client.get(&url).send().await {
                        debug!("Logout on drop failed: {e}");
                    }
                });
            }
            Err(_) => warn!("No async runtime available, the session stays open on the NAS"),
        }
    }
}

/// Copy of `params` that is safe to print
fn redacted(params: &Params) -> Params {
    let mut params = params.clone();
    if params.get("passwd").is_some() {
        params.insert("passwd", "*****");
    }
    params
}

/// Builder for [`SynoClient`]
#[derive(Default)]
pub struct SynoClientBuilder {
    service_name: Option<String>,
    namespace: Option<String>,
    url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    protocol: Option<Protocol>,
    version: Option<u32>,
    verify_ssl: bool,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl SynoClientBuilder {
    /// Starts a builder from `SYNOLOGY_HOST`, and optionally `SYNOLOGY_PORT`,
    /// `SYNOLOGY_PROTOCOL` and `SYNOLOGY_VERIFY_SSL`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `SYNOLOGY_HOST` is not set
    /// - Port or protocol can't be parsed
    pub fn from_env() -> Result<Self> {
        let mut builder = Self {
            host: Some(env::var("SYNOLOGY_HOST").map_err(Environment)?),
            ..Self::default()
        };

        if let Ok(port) = env::var("SYNOLOGY_PORT") {
            let port = port
                .parse::<u16>()
                .map_err(|_| Configuration(format!("Invalid port: {port}")))?;
            builder.port = Some(port);
        }

        if let Ok(protocol) = env::var("SYNOLOGY_PROTOCOL") {
            builder.protocol = Some(protocol.parse()?);
        }

        if let Ok(verify) = env::var("SYNOLOGY_VERIFY_SSL") {
            builder.verify_ssl = matches!(verify.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(builder)
    }

    /// Sets the service family, e.g. `FileStation`
    #[must_use]
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Sets the API namespace, `SYNO` by default
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets scheme, host and port at once from a URL like `https://nas.local:5001`.
    /// Explicit `protocol`, `host` and `port` take precedence.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the host name or address, without scheme
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port, 80 for http and 443 for https by default
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Sets the default API version, 1 by default
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Enables certificate and hostname verification.
    ///
    /// Verification is off by default because most NAS units serve a
    /// self-signed certificate. Leaving it off is insecure.
    #[must_use]
    pub fn verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the total request timeout
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Builds the [`SynoClient`]
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Service name or host is missing or empty
    /// - Host includes a scheme, or the URL can't be parsed
    /// - Version is zero
    pub fn build(self) -> Result<SynoClient> {
        let service_name = self
            .service_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Configuration("Service name is required".into()))?;

        let (mut protocol, mut host, mut port) = (self.protocol, self.host, self.port);
        if let Some(url) = self.url {
            let parsed =
                Url::parse(&url).map_err(|e| Configuration(format!("Invalid URL {url}: {e}")))?;
            protocol = protocol.or(Some(parsed.scheme().parse()?));
            host = host.or_else(|| parsed.host_str().map(String::from));
            port = port.or(parsed.port());
        }

        let host = host.ok_or_else(|| Configuration("Host is required".into()))?;
        if host.is_empty() {
            return Err(Configuration("Host cannot be empty".into()).into());
        }

        if host.contains("://") {
            return Err(Configuration(format!(
                "Host must not include a scheme, got: {host}"
            ))
            .into());
        }

        let version = self.version.unwrap_or(1);
        if version == 0 {
            return Err(Configuration("API version must be positive".into()).into());
        }

        let protocol = protocol.unwrap_or_default();
        let port = port.unwrap_or(protocol.default_port());
        let host = host.trim_end_matches('/');
        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        if !self.verify_ssl && protocol == Protocol::Https {
            debug!("TLS certificate verification disabled for {host}");
        }

        let client = SynoClient::create_client(
            self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            request_timeout,
            self.verify_ssl,
        )?;

        Ok(SynoClient {
            service_name,
            namespace: self.namespace.unwrap_or_else(|| API_NAMESPACE.to_string()),
            base_url: wire::base_url(protocol, host, port),
            version,
            request_timeout,
            client,
            sid: None,
            session_name: DEFAULT_SESSION_NAME.to_string(),
            debug: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_defaults() {
        let client = SynoClient::file_station("nas.local").build().unwrap();

        assert_eq!("http://nas.local:80/webapi/", client.base_url());
        assert_eq!(FILE_STATION_SERVICE, client.service_name());
        assert_eq!(DEFAULT_SESSION_NAME, client.session_name());
        assert_eq!(1, client.version);
        assert_eq!(DEFAULT_REQUEST_TIMEOUT, client.request_timeout);
        assert!(!client.is_connected());
    }

    #[test]
    fn test_build_https_default_port() {
        let client = SynoClient::drive("nas.local")
            .protocol(Protocol::Https)
            .build()
            .unwrap();
        assert_eq!("https://nas.local:443/webapi/", client.base_url());
    }

    #[test]
    fn test_build_from_url() {
        let client = SynoClient::builder()
            .service_name(FILE_STATION_SERVICE)
            .url("https://127.0.0.1:5001")
            .build()
            .unwrap();
        assert_eq!("https://127.0.0.1:5001/webapi/", client.base_url());

        let client = SynoClient::builder()
            .service_name(FILE_STATION_SERVICE)
            .url("https://127.0.0.1:5001")
            .port(8443)
            .build()
            .unwrap();
        assert_eq!("https://127.0.0.1:8443/webapi/", client.base_url());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let cases = [
            SynoClient::builder().host("nas.local"),
            SynoClient::file_station(""),
            SynoClient::file_station("https://nas.local"),
            SynoClient::file_station("nas.local").version(0),
            SynoClient::builder()
                .service_name(FILE_STATION_SERVICE)
                .url("ftp://nas.local"),
        ];

        for builder in cases {
            let error = builder.build().err().unwrap();
            assert!(matches!(
                error.downcast_ref::<SynoError>(),
                Some(Configuration(_))
            ));
        }
    }

    #[test]
    fn test_protocol_from_str() {
        assert_eq!(Protocol::Https, "HTTPS".parse().unwrap());
        assert_eq!(Protocol::Http, "http".parse().unwrap());
        assert!("ftp".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_session_id_without_session() {
        let client = SynoClient::file_station("nas.local").build().unwrap();
        let error = client.session_id().unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SynoError>(),
            Some(MissingSession)
        ));
    }

    #[test]
    fn test_redacted_hides_password() {
        let params = Params::from([("account", "admin"), ("passwd", "secret")]);
        let safe = redacted(&params);
        assert_eq!(Some("*****"), safe.get("passwd"));
        assert_eq!(Some("admin"), safe.get("account"));
    }
}

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{ApiError, ApiResult};

/// Base path of the app-registry API
pub const API_PREFIX: &str = "/app-registry/api";

/// Username and password used for the publisher endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// All credentials known for this invocation.
///
/// Which one ends up on a request is decided per call through [`Auth`].
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub api_token: Option<String>,
    pub basic: Option<BasicAuth>,
}

/// Authentication scheme of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    /// `Authorization: Bearer <api-token>`
    Bearer,
    /// `Authorization: Basic <username:password>`
    Basic,
}

impl Credentials {
    /// Builds the `Authorization` header value for the given scheme
    fn header(&self, auth: Auth) -> ApiResult<String> {
        match auth {
            Auth::Bearer => match &self.api_token {
                Some(token) if !token.is_empty() => Ok(format!("Bearer {token}")),
                _ => Err(ApiError::Configuration(
                    "API token is required. Please provide it using --api-token or PEEK_API_TOKEN"
                        .to_string(),
                )),
            },
            Auth::Basic => match &self.basic {
                Some(BasicAuth { username, password }) => {
                    let encoded = STANDARD.encode(format!("{username}:{password}"));
                    Ok(format!("Basic {encoded}"))
                }
                None => Err(ApiError::Configuration(
                    "Missing authentication credentials. Please set ADMIN_BASIC_AUTH_USERNAME and ADMIN_BASIC_AUTH_PASSWORD environment variables."
                        .to_string(),
                )),
            },
        }
    }
}

/// A fully prepared request, ready to be put on the wire
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[cfg(test)]
impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw answer of the server
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json(&self) -> ApiResult<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Why a request never produced a response
#[derive(Debug)]
pub enum TransportError {
    Connect,
    Timeout,
    Other(String),
}

/// Sends a single request and hands back whatever the server answered
pub trait Transport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a blocking reqwest client with library defaults
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let res = builder.send().map_err(classify)?;
        let status = res.status().as_u16();
        let body = res.bytes().map_err(classify)?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect
    } else {
        TransportError::Other(err.to_string())
    }
}

/// Pulls a human readable reason out of an error response.
///
/// Prefers the `error` and `message` fields of a JSON body, then the whole JSON body,
/// then the raw text.
pub fn error_detail(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => {
            let field = ["error", "message"]
                .iter()
                .filter_map(|key| value.get(*key))
                .find(|v| !is_falsy(v));
            match field {
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None => Some(value.to_string()),
            }
        }
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            if text.is_empty() {
                None
            } else {
                Some(text.into_owned())
            }
        }
    }
}

fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Client for the app-registry of one environment
pub struct Registry<T = ReqwestTransport> {
    base_url: Url,
    credentials: Credentials,
    transport: T,
}

impl Registry<ReqwestTransport> {
    pub fn new(base_url: Url, credentials: Credentials) -> Self {
        Self::with_transport(base_url, credentials, ReqwestTransport::new())
    }
}

impl<T: Transport> Registry<T> {
    pub fn with_transport(base_url: Url, credentials: Credentials, transport: T) -> Self {
        Registry {
            base_url,
            credentials,
            transport,
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolves an API path (relative to [`API_PREFIX`]) against the base-url
    pub fn endpoint(&self, path: &str) -> ApiResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let raw = format!("{base}{API_PREFIX}/{}", path.trim_start_matches('/'));
        Url::parse(&raw)
            .map_err(|e| ApiError::Configuration(format!("invalid url '{raw}': {e}")))
    }

    /// Performs one request and fails on any status >= 400.
    ///
    /// Credentials are checked before anything is sent.
    pub fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        auth: Auth,
        body: Option<&B>,
    ) -> ApiResult<HttpResponse> {
        let authorization = self.credentials.header(auth)?;
        let body = body.map(serde_json::to_vec).transpose()?;

        debug!(%method, %url, ?auth, "sending request");
        let request = HttpRequest {
            method,
            url: url.clone(),
            headers: vec![
                (CONTENT_TYPE.to_string(), "application/json".to_string()),
                (AUTHORIZATION.to_string(), authorization),
            ],
            body,
        };

        let response = self.transport.send(request).map_err(|e| match e {
            TransportError::Connect => ApiError::Connection { url: url.clone() },
            TransportError::Timeout => ApiError::Timeout { url: url.clone() },
            TransportError::Other(message) => ApiError::Transport { message },
        })?;
        debug!(status = response.status, %url, "received response");

        if response.status >= 400 {
            let detail = error_detail(&response.body);
            if let Some(err) = ApiError::from_status(response.status, detail) {
                return Err(err);
            }
        }
        Ok(response)
    }

    fn get_json(&self, path: &str) -> ApiResult<Value> {
        let url = self.endpoint(path)?;
        self.request::<Value>(Method::GET, url, Auth::Bearer, None)?
            .json()
    }

    fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        auth: Auth,
        body: Option<&B>,
    ) -> ApiResult<Value> {
        let url = self.endpoint(path)?;
        self.request(method, url, auth, body)?.json()
    }

    /// Returns all registered apps
    pub fn list_apps(&self) -> ApiResult<Value> {
        self.get_json("apps/")
    }

    /// Registers a new app
    pub fn create_app(&self, name: &str) -> ApiResult<Value> {
        let body = serde_json::json!({ "app": { "name": name } });
        self.send_json(Method::POST, "apps/", Auth::Bearer, Some(&body))
    }

    /// Registers a new publisher
    ///
    /// This is the only endpoint that uses basic-auth.
    pub fn create_publisher(&self, publisher: &NewPublisher) -> ApiResult<Value> {
        let body = serde_json::json!({ "publisher": publisher });
        self.send_json(Method::POST, "publishers/", Auth::Basic, Some(&body))
    }

    pub fn create_version(
        &self,
        app_id: &str,
        version: &str,
        description: Option<&str>,
    ) -> ApiResult<Value> {
        let body = serde_json::json!({
            "app_version": {
                "display_version": version,
                "description": description,
            }
        });
        self.send_json(
            Method::POST,
            &format!("apps/{app_id}/versions/"),
            Auth::Bearer,
            Some(&body),
        )
    }

    pub fn list_versions(&self, app_id: &str) -> ApiResult<Value> {
        self.get_json(&format!("apps/{app_id}/versions/"))
    }

    pub fn publish_version(&self, app_id: &str, version: &str) -> ApiResult<Value> {
        self.send_json::<Value>(
            Method::POST,
            &format!("apps/{app_id}/versions/{version}/publish"),
            Auth::Bearer,
            None,
        )
    }

    pub fn version_url(&self, app_id: &str, version: &str) -> ApiResult<Url> {
        self.endpoint(&format!("apps/{app_id}/versions/{version}/"))
    }

    /// Fetches the current state of a version
    pub fn get_version(&self, url: &Url) -> ApiResult<Value> {
        self.request::<Value>(Method::GET, url.clone(), Auth::Bearer, None)?
            .json()
    }

    /// Replaces a version as a whole
    pub fn update_version(&self, url: &Url, payload: &Value) -> ApiResult<Value> {
        self.request(Method::PUT, url.clone(), Auth::Bearer, Some(payload))?
            .json()
    }

    /// Returns all extendables
    pub fn list_extendables(&self) -> ApiResult<Value> {
        self.get_json("extendables/")
    }

    /// Returns the extendable catalog used to seed new configured extendables
    pub fn extendable_catalog(&self) -> ApiResult<Value> {
        self.get_json("extendables")
    }
}

/// Body of the `publisher` envelope
#[derive(Debug, Clone, Serialize)]
pub struct NewPublisher {
    pub name: String,
    pub email: String,
    pub website_url: String,
    pub level: String,
}

/// Renders json with 4-space indentation
pub fn to_pretty_json(value: &Value) -> ApiResult<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

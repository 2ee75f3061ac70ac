//! Blocking JSON client for the tracking server API

use std::fmt;

use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::{Error, Result};

/// Versioned path prefix of every tracking API endpoint.
pub const API_PREFIX: &str = "api/2.0/mlflow";

/// HTTP client bound to one tracking server.
///
/// Connections are not kept alive between calls.
pub struct RestClient {
    base_url: String,
    bearer_token: Option<String>,
    http: Client,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Create a client for the server at `base_url`. A trailing `/` is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, bearer_token: Option<&str>) -> Result<Self> {
        let http = Client::builder().pool_max_idle_per_host(0).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            http,
        })
    }

    /// Server base URL without trailing `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{API_PREFIX}/{endpoint}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `GET` an endpoint with query parameters. GET requests never carry a body.
    pub(crate) fn get<Res>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Res>
    where
        Res: DeserializeOwned,
    {
        let url = self.endpoint_url(endpoint);
        debug!(method = "GET", %url, ?query, "tracking request");
        let request = self.authorize(self.http.get(&url).query(query));
        Self::decode("GET", &url, request)
    }

    /// `POST` a JSON body to an endpoint.
    pub(crate) fn post<Req, Res>(&self, endpoint: &str, body: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = self.endpoint_url(endpoint);
        debug!(method = "POST", %url, "tracking request");
        let request = self.authorize(self.http.post(&url).json(body));
        Self::decode("POST", &url, request)
    }

    fn decode<Res: DeserializeOwned>(method: &str, url: &str, request: RequestBuilder) -> Result<Res> {
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(Error::Transport {
                message: format!("{method} {url} failed"),
                status: Some(status.as_u16()),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| Error::Transport {
            message: format!("{method} {url}: cannot decode response: {e}"),
            status: Some(status.as_u16()),
            body,
        })
    }

    /// `PUT` raw bytes to a pre-signed URL with the headers the server issued.
    ///
    /// The signed URL carries its own authorization; the bearer token is not sent.
    pub(crate) fn put_signed(&self, url: &str, headers: &[(String, String)], body: Vec<u8>) -> Result<()> {
        debug!(method = "PUT", %url, bytes = body.len(), "signed upload");
        let mut request = self.http.put(url).body(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send()?;
        let status = response.status();
        if status == reqwest::StatusCode::OK {
            return Ok(());
        }
        Err(Error::Transport {
            message: format!("PUT {url} failed"),
            status: Some(status.as_u16()),
            body: response.text().unwrap_or_default(),
        })
    }
}

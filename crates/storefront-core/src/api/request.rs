use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;

use super::ApiError;
use crate::auth::AccessToken;

/// A request that can be dispatched more than once.
///
/// The session client builds a fresh `reqwest` request from this description
/// for every attempt, so a retry after renewal carries exactly the same
/// method, path, headers and body with only the credential changed.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn build(
        &self,
        client: &Client,
        base_url: &str,
        token: Option<&AccessToken>,
    ) -> RequestBuilder {
        let url = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        let mut builder = client
            .request(self.method.clone(), url)
            .headers(self.headers.clone());
        if let Some(token) = token {
            builder = builder.bearer_auth(token.as_str());
        }
        if let Some(ref body) = self.body {
            builder = builder.json(body);
        }
        builder
    }
}

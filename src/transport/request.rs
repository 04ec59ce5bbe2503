//! Request descriptors.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::{CacheKey, ParamValue};
use crate::session::Credential;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

/// How a request authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Attach the session credential, if there is one. A 401 expires the
    /// session.
    #[default]
    Session,
    /// Send no credential.
    Public,
    /// Send this credential and leave the session alone on 401.
    Bearer(Credential),
}

/// One HTTP request against the API, relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    path: String,
    query: BTreeMap<String, ParamValue>,
    body: Body,
    auth: AuthMode,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            body: Body::Empty,
            auth: AuthMode::Session,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter only when `value` is present.
    pub fn opt_query<V: Into<ParamValue>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.query(name, v),
            None => self,
        }
    }

    /// Serialize `body` as the JSON payload.
    pub fn json(mut self, body: &impl Serialize) -> Result<Self> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.body = Body::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn public(mut self) -> Self {
        self.auth = AuthMode::Public;
        self
    }

    pub fn bearer(mut self, credential: Credential) -> Self {
        self.auth = AuthMode::Bearer(credential);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn auth(&self) -> &AuthMode {
        &self.auth
    }

    /// Query string pairs; list values repeat the parameter name.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.cache_key().query_pairs()
    }

    /// Cache key for this request: the path without surrounding slashes as
    /// the resource, query parameters as the params.
    pub fn cache_key(&self) -> CacheKey {
        let resource = self.path.trim_matches('/');
        self.query
            .iter()
            .fold(CacheKey::new(resource), |key, (name, value)| {
                key.param(name.clone(), value.clone())
            })
    }
}

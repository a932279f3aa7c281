//! Request/response records flowing through the pipeline.
//!
//! These are transport-agnostic: the HTTP bridge in `adapters::http` converts
//! to and from them, but nothing here depends on an HTTP library.

use crate::domain::correlation::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Wildcard permission granting every other permission
pub const ADMIN_ALL: &str = "admin:all";

/// Identity attached to a request after successful authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub permissions: HashSet<String>,
}

impl AuthenticatedUser {
    pub fn new<I, S>(id: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.permissions.contains(ADMIN_ALL)
    }
}

/// Session returned by the external session validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub permissions: HashSet<String>,
}

impl Session {
    pub fn new<I, S>(user_id: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Session> for AuthenticatedUser {
    fn from(session: Session) -> Self {
        Self {
            id: session.user_id,
            permissions: session.permissions,
        }
    }
}

/// Inbound request record.
///
/// Header names are stored lower-cased; use [`Request::header`] for lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub path: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub query: BTreeMap<String, Value>,
    pub body: Value,
    pub client_ip: String,
    pub user_agent: String,
    pub user: Option<AuthenticatedUser>,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            path: path.into(),
            method: method.into().to_ascii_uppercase(),
            headers: HashMap::new(),
            query: BTreeMap::new(),
            body: Value::Null,
            client_ip: "unknown".to_string(),
            user_agent: String::new(),
            user: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = ip.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("authorization", format!("Bearer {token}"))
    }

    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = id;
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.headers.get(name) {
            return Some(v.as_str());
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Id of the authenticated user, if any
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

/// Outbound response record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl Response {
    /// 200 with a data payload
    pub fn ok(data: impl Into<Value>) -> Self {
        Self::with_status(200, data)
    }

    pub fn with_status(status: u16, data: impl Into<Value>) -> Self {
        Self {
            status,
            data: Some(data.into()),
            error: None,
            headers: None,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            data: None,
            error: Some(message.into()),
            headers: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

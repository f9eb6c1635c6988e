use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::RpoolError;

/// Connection parameters for one database server.
///
/// Field names follow the driver's option names (`authKey`, `db`), so a JSON
/// object written for the driver deserializes as-is. Keys the pool does not
/// know about are kept in `extra` and handed to the driver untouched.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
    #[serde(alias = "database", skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
    /// Driver-specific fields.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Which authentication form an endpoint uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials<'a> {
    /// No credentials; the driver applies its defaults
    None,
    /// Single opaque key
    AuthKey(&'a str),
    /// Principal plus secret
    User {
        user: &'a str,
        password: Option<&'a str>,
    },
}

impl EndpointConfig {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self.auth_key = None;
        self
    }

    #[must_use]
    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = Some(key.into());
        self.user = None;
        self.password = None;
        self
    }

    /// The authentication form in effect. A password next to a principal
    /// wins over an auth key.
    #[must_use]
    pub fn credentials(&self) -> Credentials<'_> {
        match (&self.user, &self.password, &self.auth_key) {
            (Some(user), Some(password), _) => Credentials::User {
                user,
                password: Some(password),
            },
            (_, _, Some(key)) => Credentials::AuthKey(key),
            (Some(user), None, None) => Credentials::User {
                user,
                password: None,
            },
            (None, _, None) => Credentials::None,
        }
    }

    fn has_credentials(&self) -> bool {
        self.user.is_some() || self.password.is_some() || self.auth_key.is_some()
    }

    /// Fill unset fields from `defaults`; fields already set on `self` win.
    ///
    /// Credentials are taken as a group: if `self` carries any credential the
    /// defaults' credentials are ignored, so one endpoint never mixes an
    /// auth key with a user/password pair.
    #[must_use]
    pub fn with_defaults(mut self, defaults: &EndpointConfig) -> Self {
        self.host = self.host.or_else(|| defaults.host.clone());
        self.port = self.port.or(defaults.port);
        self.db = self.db.or_else(|| defaults.db.clone());
        if !self.has_credentials() {
            self.user.clone_from(&defaults.user);
            self.password.clone_from(&defaults.password);
            self.auth_key.clone_from(&defaults.auth_key);
        }
        for (key, value) in &defaults.extra {
            self.extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }
}

// Manual Debug implementation so secrets never reach logs
impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("EndpointConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("auth_key", &redact(&self.auth_key))
            .field("db", &self.db)
            .field("extra", &self.extra)
            .finish()
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.host.as_deref().unwrap_or("<default host>"))?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if let Some(db) = &self.db {
            write!(f, "/{db}")?;
        }
        Ok(())
    }
}

/// Ordered, non-empty list of endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSet(Vec<EndpointConfig>);

#[allow(clippy::len_without_is_empty)]
impl EndpointSet {
    /// # Errors
    /// Returns `RpoolError::EmptyEndpointSet` if `endpoints` is empty.
    pub fn new(endpoints: Vec<EndpointConfig>) -> Result<Self, RpoolError> {
        if endpoints.is_empty() {
            return Err(RpoolError::EmptyEndpointSet);
        }
        Ok(Self(endpoints))
    }

    #[must_use]
    pub fn single(endpoint: EndpointConfig) -> Self {
        Self(vec![endpoint])
    }

    /// Number of endpoints; always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&EndpointConfig> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EndpointConfig> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[EndpointConfig] {
        &self.0
    }
}

impl Index<usize> for EndpointSet {
    type Output = EndpointConfig;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a EndpointSet {
    type Item = &'a EndpointConfig;
    type IntoIter = std::slice::Iter<'a, EndpointConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_driver_option_names() {
        let ep: EndpointConfig = serde_json::from_value(json!({
            "host": "db1",
            "port": 28015,
            "authKey": "k",
            "database": "app",
            "timeout": 20
        }))
        .unwrap();
        assert_eq!(ep.auth_key.as_deref(), Some("k"));
        assert_eq!(ep.db.as_deref(), Some("app"));
        assert_eq!(ep.extra.get("timeout"), Some(&json!(20)));
        assert_eq!(ep.credentials(), Credentials::AuthKey("k"));
    }

    #[test]
    fn password_next_to_user_wins() {
        let mut ep = EndpointConfig::new("db1").with_user("alice", "pw");
        ep.auth_key = Some("stale".into());
        assert_eq!(
            ep.credentials(),
            Credentials::User {
                user: "alice",
                password: Some("pw")
            }
        );
    }

    #[test]
    fn defaults_fill_gaps_but_credentials_move_together() {
        let defaults = EndpointConfig::new("fallback")
            .with_port(28015)
            .with_auth_key("shared");
        let merged = EndpointConfig::new("db1")
            .with_user("alice", "pw")
            .with_defaults(&defaults);
        assert_eq!(merged.host.as_deref(), Some("db1"));
        assert_eq!(merged.port, Some(28015));
        assert_eq!(merged.auth_key, None);

        let inherited = EndpointConfig::new("db2").with_defaults(&defaults);
        assert_eq!(inherited.auth_key.as_deref(), Some("shared"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let ep = EndpointConfig::new("db1").with_user("alice", "hunter2");
        let rendered = format!("{ep:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("alice"));
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(matches!(
            EndpointSet::new(Vec::new()),
            Err(RpoolError::EmptyEndpointSet)
        ));
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RpoolError;

use super::conn_string::{parse_db_url, redact_url};
use super::{EndpointConfig, EndpointSet};

/// One or more connection strings under an options object's `url` key.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlList {
    One(String),
    Many(Vec<String>),
}

impl UrlList {
    fn as_slice(&self) -> &[String] {
        match self {
            UrlList::One(url) => std::slice::from_ref(url),
            UrlList::Many(urls) => urls,
        }
    }
}

impl fmt::Debug for UrlList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.as_slice().iter().map(|u| redact_url(u)))
            .finish()
    }
}

/// Structured endpoint input: driver options plus an optional `url` (or list
/// of urls) whose parsed fields override the sibling options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<UrlList>,
    #[serde(flatten)]
    pub defaults: EndpointConfig,
}

/// Anything the resolver accepts.
///
/// ```rust
/// use rpool::endpoint::EndpointSpec;
///
/// let spec: EndpointSpec = serde_json::from_str(
///     r#"{"db": "app", "url": ["rethinkdb://db1", "rethinkdb://db2:29015"]}"#,
/// )?;
/// let set = spec.resolve()?;
/// assert_eq!(set.len(), 2);
/// assert_eq!(set[1].port, Some(29015));
/// assert_eq!(set[1].db.as_deref(), Some("app"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EndpointSpec {
    Url(String),
    List(Vec<EndpointSpec>),
    Options(EndpointOptions),
}

impl EndpointSpec {
    /// Resolve into a non-empty, ordered endpoint set. Pure; no I/O.
    ///
    /// # Errors
    /// Returns `RpoolError::UnsupportedProtocol`/`InvalidUrl` for bad
    /// connection strings and `RpoolError::EmptyEndpointSet` when the input
    /// expands to nothing.
    pub fn resolve(&self) -> Result<EndpointSet, RpoolError> {
        let mut out = Vec::new();
        self.collect_into(&mut out)?;
        EndpointSet::new(out)
    }

    fn collect_into(&self, out: &mut Vec<EndpointConfig>) -> Result<(), RpoolError> {
        match self {
            EndpointSpec::Url(url) => out.push(parse_db_url(url)?),
            EndpointSpec::Options(opts) => match &opts.url {
                None => out.push(opts.defaults.clone()),
                Some(urls) => {
                    for url in urls.as_slice() {
                        out.push(parse_db_url(url)?.with_defaults(&opts.defaults));
                    }
                }
            },
            EndpointSpec::List(items) => {
                for item in items {
                    item.collect_into(out)?;
                }
            }
        }
        Ok(())
    }
}

impl FromStr for EndpointSpec {
    type Err = RpoolError;

    /// Accepts a single connection string; the scheme is checked eagerly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_db_url(s)?;
        Ok(EndpointSpec::Url(s.to_string()))
    }
}

impl From<&str> for EndpointSpec {
    fn from(url: &str) -> Self {
        EndpointSpec::Url(url.to_string())
    }
}

impl From<String> for EndpointSpec {
    fn from(url: String) -> Self {
        EndpointSpec::Url(url)
    }
}

impl From<EndpointConfig> for EndpointSpec {
    fn from(config: EndpointConfig) -> Self {
        EndpointSpec::Options(EndpointOptions {
            url: None,
            defaults: config,
        })
    }
}

impl From<EndpointOptions> for EndpointSpec {
    fn from(options: EndpointOptions) -> Self {
        EndpointSpec::Options(options)
    }
}

impl<T: Into<EndpointSpec>> From<Vec<T>> for EndpointSpec {
    fn from(items: Vec<T>) -> Self {
        EndpointSpec::List(items.into_iter().map(Into::into).collect())
    }
}

/// Resolve any endpoint input into an [`EndpointSet`].
///
/// # Errors
/// See [`EndpointSpec::resolve`].
pub fn resolve_endpoints(spec: impl Into<EndpointSpec>) -> Result<EndpointSet, RpoolError> {
    spec.into().resolve()
}

use core::fmt;

use crate::{Error, Result, registry::parse_business_flag};

/// Host-supplied settings for reaching the coordination service.
///
/// The crate doesn't ship a network client; these settings are carried for
/// whichever [`WorkerRegistry`] implementation the host plugs in, and are
/// validated up front so a bad deployment fails at startup rather than on
/// the first reconnect.
///
/// [`WorkerRegistry`]: crate::WorkerRegistry
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Comma-separated `host:port` list of coordination servers.
    pub server_lists: String,
    /// Root path all slots live under.
    pub namespace: String,
    /// Business group; its numeric suffix after the last `_` is the business
    /// flag.
    pub group: String,
    /// Initial retry backoff.
    pub base_sleep_time_ms: u64,
    /// Upper bound for the retry backoff.
    pub max_sleep_time_ms: u64,
    /// Retries per operation before the client gives up.
    pub max_retries: u32,
    pub session_timeout_ms: u64,
    pub connection_timeout_ms: u64,
    /// Optional `user:password` digest for authenticated namespaces.
    pub digest: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            server_lists: String::from("localhost:2181"),
            namespace: String::from("ferroslot"),
            group: String::from("default"),
            base_sleep_time_ms: 1_000,
            max_sleep_time_ms: 3_000,
            max_retries: 3,
            session_timeout_ms: 60_000,
            connection_timeout_ms: 15_000,
            digest: None,
        }
    }
}

impl RegistryConfig {
    /// Default settings for the given servers and namespace.
    pub fn new(server_lists: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            server_lists: server_lists.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Checks every field for values a client could never work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.servers().next().is_none() {
            return Err(Error::configuration("server_lists must name at least one server"));
        }
        if let Some(server) = self.servers().find(|server| !server.contains(':')) {
            return Err(Error::configuration(format!(
                "server {server:?} must be in host:port form"
            )));
        }
        if self.namespace.trim().is_empty() || self.namespace.contains('/') {
            return Err(Error::configuration(format!(
                "namespace {:?} must be a non-empty path segment",
                self.namespace
            )));
        }
        if self.group.trim().is_empty() || self.group.contains('/') {
            return Err(Error::configuration(format!(
                "group {:?} must be a non-empty path segment",
                self.group
            )));
        }
        parse_business_flag(&self.group)?;
        if self.base_sleep_time_ms == 0 || self.base_sleep_time_ms > self.max_sleep_time_ms {
            return Err(Error::configuration(format!(
                "retry backoff must satisfy 0 < base ({}) <= max ({})",
                self.base_sleep_time_ms, self.max_sleep_time_ms
            )));
        }
        if self.session_timeout_ms == 0 || self.connection_timeout_ms == 0 {
            return Err(Error::configuration("timeouts must be greater than 0"));
        }
        if self
            .digest
            .as_deref()
            .is_some_and(|digest| !digest.contains(':'))
        {
            return Err(Error::configuration("digest must be in user:password form"));
        }
        Ok(())
    }

    /// Individual `host:port` entries of [`Self::server_lists`].
    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.server_lists
            .split(',')
            .map(str::trim)
            .filter(|server| !server.is_empty())
    }

    /// Where this configuration's slots live.
    pub fn node_path(&self) -> NodePath {
        NodePath::new(self.namespace.clone(), self.group.clone())
    }
}

/// Location of a business group inside the coordination service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath {
    namespace: String,
    group: String,
}

impl NodePath {
    pub fn new(namespace: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Path of one worker slot under this group.
    pub fn worker_path(&self, slot_id: u16) -> String {
        format!("{self}/worker/{slot_id:04}")
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.namespace, self.group)
    }
}

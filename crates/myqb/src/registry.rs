//! Named connection profiles and their lazily opened connections.

use crate::client::{Connection, Connector};
use crate::config::ConnectionProfile;
use crate::error::{DbError, DbResult};
use std::collections::{BTreeMap, HashMap};

/// Holds profiles by name and at most one live connection per profile.
///
/// Connections are opened on first use ([`ConnectionRegistry::resolve`]).
pub struct ConnectionRegistry<C: Connector> {
    connector: C,
    profiles: BTreeMap<String, ConnectionProfile>,
    live: HashMap<String, C::Conn>,
}

impl<C: Connector> ConnectionRegistry<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            profiles: BTreeMap::new(),
            live: HashMap::new(),
        }
    }

    /// Store (or overwrite) a profile. Does not connect.
    pub fn add_profile(&mut self, name: impl Into<String>, profile: ConnectionProfile) {
        self.profiles.insert(name.into(), profile);
    }

    pub fn profile(&self, name: &str) -> Option<&ConnectionProfile> {
        self.profiles.get(name)
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn profiles(&self) -> &BTreeMap<String, ConnectionProfile> {
        &self.profiles
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.live.contains_key(name)
    }

    /// The open connection for `name`, without connecting.
    pub fn live(&self, name: &str) -> Option<&C::Conn> {
        self.live.get(name)
    }

    /// The live connection for `name`, connecting first if needed.
    pub async fn resolve(&mut self, name: &str) -> DbResult<&mut C::Conn> {
        if !self.live.contains_key(name) {
            self.connect(name).await?;
        }
        self.live
            .get_mut(name)
            .ok_or_else(|| DbError::connection(format!("connection {name} is not open")))
    }

    /// Open a connection for `name`, replacing any existing one.
    pub async fn connect(&mut self, name: &str) -> DbResult<()> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| DbError::configuration(format!("connection {name} was not added")))?;
        if !profile.is_addressable() {
            return Err(DbError::connection(format!(
                "connection {name}: host or socket must be set"
            )));
        }

        let mut conn = self
            .connector
            .connect(profile)
            .await
            .map_err(|e| DbError::connection(format!("connection {name}: {e}")))?;
        if let Some(charset) = profile.charset.as_deref() {
            conn.set_charset(charset)
                .await
                .map_err(|e| DbError::connection(format!("connection {name}: charset {charset}: {e}")))?;
        }

        tracing::debug!(target: "myqb", connection = name, host = %profile.host, "connected");
        self.live.insert(name.to_string(), conn);
        Ok(())
    }

    /// Close the connection for `name`. Returns whether one was open.
    pub fn disconnect(&mut self, name: &str) -> bool {
        let closed = self.live.remove(name).is_some();
        if closed {
            tracing::debug!(target: "myqb", connection = name, "disconnected");
        }
        closed
    }

    /// Close every open connection.
    pub fn disconnect_all(&mut self) {
        for name in self.live.keys() {
            tracing::debug!(target: "myqb", connection = %name, "disconnected");
        }
        self.live.clear();
    }

    /// Same connector and profiles, no open connections.
    pub fn detached(&self) -> Self
    where
        C: Clone,
    {
        Self {
            connector: self.connector.clone(),
            profiles: self.profiles.clone(),
            live: HashMap::new(),
        }
    }
}

//! Mountpoint credential registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol::sourcetable;
use crate::registry::MountConfig;

use super::credential::{constant_time_eq, Credential};

/// Credential a source must present
#[derive(Clone, PartialEq, Eq)]
pub struct SourceCredential {
    /// Required user name; `None` accepts a password-only (NTRIP 1.0) login
    pub user: Option<String>,
    /// Required password
    pub password: String,
}

impl std::fmt::Debug for SourceCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCredential")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// A user allowed to subscribe
#[derive(Clone, PartialEq, Eq)]
pub struct UserCredential {
    /// User name
    pub user: String,
    /// Password
    pub password: String,
}

impl std::fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredential")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Everything the caster knows about one configured mountpoint
#[derive(Debug, Clone)]
pub struct MountpointDefinition {
    /// Mountpoint name, without the leading `/`
    pub name: String,
    /// Credential for the source
    pub source: SourceCredential,
    /// Users allowed to subscribe; empty means anyone may
    pub subscribers: Vec<UserCredential>,
    /// Settings for the mount's broadcast hub
    pub config: MountConfig,
    /// Raw `STR;` sourcetable record; generated from the name if absent
    pub sourcetable_entry: Option<String>,
}

impl MountpointDefinition {
    /// Define a mountpoint whose source authenticates with `source_password`
    pub fn new(name: impl Into<String>, source_password: impl Into<String>) -> Self {
        Self {
            name: name.into().trim_start_matches('/').to_owned(),
            source: SourceCredential {
                user: None,
                password: source_password.into(),
            },
            subscribers: Vec::new(),
            config: MountConfig::default(),
            sourcetable_entry: None,
        }
    }

    /// Require the source to also present this user name
    pub fn source_user(mut self, user: impl Into<String>) -> Self {
        self.source.user = Some(user.into());
        self
    }

    /// Allow a subscriber
    pub fn subscriber(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.subscribers.push(UserCredential {
            user: user.into(),
            password: password.into(),
        });
        self
    }

    /// Set the broadcast hub configuration
    pub fn config(mut self, config: MountConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the sourcetable record
    pub fn sourcetable_entry(mut self, entry: impl Into<String>) -> Self {
        self.sourcetable_entry = Some(entry.into());
        self
    }

    /// Whether anyone may subscribe without credentials
    pub fn is_public(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Internal result of a credential check
///
/// Callers must answer every non-granted outcome identically so a client
/// cannot tell which mountpoints exist; the distinction is for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credential accepted
    Granted,
    /// No such mountpoint
    UnknownMountpoint,
    /// Credential presented but wrong
    BadCredential,
    /// Credential required but none presented
    MissingCredential,
}

impl AuthOutcome {
    /// Whether access was granted
    pub fn is_granted(self) -> bool {
        self == AuthOutcome::Granted
    }
}

/// Mountpoint → credentials lookup
///
/// Read-mostly: connection handling only reads it. [`reload`](Self::reload)
/// swaps the whole record set at once, so a lookup sees either the old or
/// the new configuration, never a mix.
pub struct AuthRegistry {
    records: RwLock<Arc<HashMap<String, Arc<MountpointDefinition>>>>,
}

impl AuthRegistry {
    /// Create a registry from mountpoint definitions
    pub fn new(definitions: impl IntoIterator<Item = MountpointDefinition>) -> Self {
        Self {
            records: RwLock::new(Arc::new(Self::index(definitions))),
        }
    }

    fn index(
        definitions: impl IntoIterator<Item = MountpointDefinition>,
    ) -> HashMap<String, Arc<MountpointDefinition>> {
        definitions
            .into_iter()
            .map(|def| (def.name.clone(), Arc::new(def)))
            .collect()
    }

    /// Replace every record
    pub fn reload(&self, definitions: impl IntoIterator<Item = MountpointDefinition>) {
        let records = Arc::new(Self::index(definitions));
        let count = records.len();
        *self.records.write() = records;
        tracing::info!(mountpoints = count, "Authorization records reloaded");
    }

    /// Definition for `mount`
    pub fn definition(&self, mount: &str) -> Option<Arc<MountpointDefinition>> {
        self.records.read().get(mount).cloned()
    }

    /// All definitions, sorted by name
    pub fn definitions(&self) -> Vec<Arc<MountpointDefinition>> {
        let records = self.records.read().clone();
        let mut defs: Vec<_> = records.values().cloned().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// `STR;` sourcetable records of every mountpoint, sorted by name
    pub fn sourcetable_entries(&self) -> Vec<String> {
        self.definitions()
            .iter()
            .map(|def| sourcetable::entry_for(def))
            .collect()
    }

    /// Check a source credential
    pub fn check_producer(&self, mount: &str, credential: Option<&Credential>) -> AuthOutcome {
        let Some(def) = self.definition(mount) else {
            return AuthOutcome::UnknownMountpoint;
        };
        let Some(credential) = credential else {
            return AuthOutcome::MissingCredential;
        };

        let user_ok = match (&def.source.user, credential.user()) {
            (None, _) => true,
            (Some(required), Some(user)) => required == user,
            (Some(_), None) => false,
        };

        if user_ok && constant_time_eq(&def.source.password, credential.password()) {
            AuthOutcome::Granted
        } else {
            AuthOutcome::BadCredential
        }
    }

    /// Check a subscriber credential
    pub fn check_subscriber(&self, mount: &str, credential: Option<&Credential>) -> AuthOutcome {
        let Some(def) = self.definition(mount) else {
            return AuthOutcome::UnknownMountpoint;
        };
        if def.is_public() {
            return AuthOutcome::Granted;
        }

        match credential {
            None => AuthOutcome::MissingCredential,
            Some(Credential::Password(_)) => AuthOutcome::BadCredential,
            Some(Credential::Basic { user, password }) => {
                let granted = def.subscribers.iter().any(|allowed| {
                    allowed.user == *user && constant_time_eq(&allowed.password, password)
                });
                if granted {
                    AuthOutcome::Granted
                } else {
                    AuthOutcome::BadCredential
                }
            }
        }
    }

    /// Whether a source may publish on `mount`
    pub fn authorize_producer(&self, mount: &str, credential: Option<&Credential>) -> bool {
        self.check_producer(mount, credential).is_granted()
    }

    /// Whether a subscriber may read `mount`
    pub fn authorize_subscriber(&self, mount: &str, credential: Option<&Credential>) -> bool {
        self.check_subscriber(mount, credential).is_granted()
    }

    /// Number of configured mountpoints
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no mountpoint is configured
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for AuthRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

//! Group credentials and the startup-built credential store.
//!
//! Each webhook group is configured by three environment variables:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `WH_SECRET_<NAME>` | Shared secret, at least 12 characters (required) |
//! | `WH_AUTH_<NAME>` | Registry credential, base64 of `user:password` |
//! | `WH_REMOVE_<NAME>` | `true` deletes the previous image after an update |
//!
//! Groups can also be listed in a TOML file under `[groups.<NAME>]`; the
//! environment wins when both define the same group. The store is built
//! once and never mutated afterwards.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::labels::normalize_group;

/// Shortest secret a group may use.
pub const MIN_SECRET_LEN: usize = 12;

pub const ENV_SECRET_PREFIX: &str = "WH_SECRET_";
pub const ENV_AUTH_PREFIX: &str = "WH_AUTH_";
pub const ENV_REMOVE_PREFIX: &str = "WH_REMOVE_";

fn mask(value: &str) -> String {
    "*".repeat(value.chars().count())
}

// ── Registry auth ──────────────────────────────────────────────────

/// Decoded private-registry credential.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

impl RegistryAuth {
    /// Decode a base64 `user:password` value.
    pub fn decode(encoded: &str) -> ConfigResult<Self> {
        let bytes = STANDARD.decode(encoded.trim())?;
        let text =
            String::from_utf8(bytes).map_err(|_| ConfigError::RegistryAuth("credential is not UTF-8"))?;
        let (username, password) = text
            .split_once(':')
            .ok_or(ConfigError::RegistryAuth("expected user:password"))?;
        if username.is_empty() {
            return Err(ConfigError::RegistryAuth("empty registry username"));
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .finish()
    }
}

// ── Group credential ───────────────────────────────────────────────

/// Settings for one webhook group.
#[derive(Clone, PartialEq, Eq)]
pub struct GroupCredential {
    /// Name as configured (original casing).
    pub name: String,
    secret: String,
    pub registry_auth: Option<RegistryAuth>,
    /// Delete the previous image after a successful update.
    pub purge_old_image: bool,
}

impl GroupCredential {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            secret: secret.into().trim().to_string(),
            registry_auth: None,
            purge_old_image: false,
        }
    }

    pub fn with_registry_auth(mut self, auth: RegistryAuth) -> Self {
        self.registry_auth = Some(auth);
        self
    }

    pub fn with_purge_old_image(mut self, purge: bool) -> Self {
        self.purge_old_image = purge;
        self
    }

    /// Whether `candidate` (trimmed) equals the configured secret.
    pub fn secret_matches(&self, candidate: &str) -> bool {
        let candidate = candidate.trim().as_bytes();
        let secret = self.secret.as_bytes();
        if candidate.len() != secret.len() {
            return false;
        }
        candidate
            .iter()
            .zip(secret)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    fn secret_len(&self) -> usize {
        self.secret.chars().count()
    }
}

impl fmt::Debug for GroupCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupCredential")
            .field("name", &self.name)
            .field("secret", &mask(&self.secret))
            .field("registry_auth", &self.registry_auth)
            .field("purge_old_image", &self.purge_old_image)
            .finish()
    }
}

// ── TOML file format ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    groups: HashMap<String, GroupEntry>,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    secret: String,
    auth: Option<String>,
    #[serde(default)]
    purge_old_image: bool,
}

// ── Store ──────────────────────────────────────────────────────────

/// Immutable group name → credential lookup.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    groups: HashMap<String, GroupCredential>,
}

impl CredentialStore {
    /// Build a store, dropping credentials whose secret is too short.
    pub fn from_credentials(credentials: impl IntoIterator<Item = GroupCredential>) -> Self {
        let mut store = Self::default();
        for credential in credentials {
            store.admit(credential);
        }
        store
    }

    /// Build from `(key, value)` pairs following the `WH_*` convention.
    pub fn from_env_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let mut names: Vec<&str> = vars
            .keys()
            .filter_map(|k| k.strip_prefix(ENV_SECRET_PREFIX))
            .collect();
        names.sort_unstable();

        let mut store = Self::default();
        for name in names {
            if name.trim().is_empty() {
                warn!(variable = ENV_SECRET_PREFIX, "empty webhook name, skipping");
                continue;
            }
            let secret = vars[&format!("{ENV_SECRET_PREFIX}{name}")].trim();
            let auth = vars
                .get(&format!("{ENV_AUTH_PREFIX}{name}"))
                .map(|a| a.trim())
                .filter(|a| !a.is_empty());
            let purge = vars
                .get(&format!("{ENV_REMOVE_PREFIX}{name}"))
                .is_some_and(|v| v.trim() == "true");

            store.admit(build_credential(name, secret, auth, purge));
        }
        store
    }

    /// Build from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_vars(std::env::vars())
    }

    /// Parse a TOML credential document.
    pub fn from_toml_str(content: &str, origin: &str) -> ConfigResult<Self> {
        let file: CredentialFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

        let mut entries: Vec<_> = file.groups.into_iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut store = Self::default();
        for (name, entry) in entries {
            store.admit(build_credential(
                &name,
                &entry.secret,
                entry.auth.as_deref(),
                entry.purge_old_image,
            ));
        }
        Ok(store)
    }

    /// Read and parse a TOML credential file.
    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_toml_str(&content, &display)
    }

    /// Combine two stores; entries in `other` replace same-named entries.
    pub fn merge(mut self, other: CredentialStore) -> Self {
        self.groups.extend(other.groups);
        self
    }

    /// Fail when no group survived loading.
    pub fn require_groups(self) -> ConfigResult<Self> {
        if self.groups.is_empty() {
            return Err(ConfigError::NoGroups {
                prefix: ENV_SECRET_PREFIX,
                min_len: MIN_SECRET_LEN,
            });
        }
        Ok(self)
    }

    /// Look up a group by name (trimmed, case-insensitive).
    pub fn lookup(&self, name: &str) -> Option<&GroupCredential> {
        self.groups.get(&normalize_group(name))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Configured group names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.values().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn admit(&mut self, credential: GroupCredential) -> bool {
        if credential.name.is_empty() {
            warn!("empty webhook name, skipping");
            return false;
        }
        if credential.secret_len() < MIN_SECRET_LEN {
            warn!(
                webhook = %credential.name,
                min_len = MIN_SECRET_LEN,
                "secrets are required to be at least {MIN_SECRET_LEN} chars long, dropping group"
            );
            return false;
        }
        info!(webhook = %credential.name, secret = %mask(&credential.secret), "loaded webhook secret");
        if credential.purge_old_image {
            warn!(
                webhook = %credential.name,
                "purge mode enabled: old images will be deleted after pulling new images"
            );
        }
        self.groups.insert(normalize_group(&credential.name), credential);
        true
    }
}

fn build_credential(name: &str, secret: &str, auth: Option<&str>, purge: bool) -> GroupCredential {
    let mut credential = GroupCredential::new(name, secret).with_purge_old_image(purge);
    if let Some(encoded) = auth {
        match RegistryAuth::decode(encoded) {
            Ok(auth) => {
                info!(webhook = %name, username = %auth.username, "loaded registry credential");
                credential = credential.with_registry_auth(auth);
            }
            Err(e) => warn!(webhook = %name, error = %e, "ignoring unusable registry credential"),
        }
    }
    credential
}

//! Caller-supplied configuration (§3, §4.6). No parsing lives here --
//! a DSN/env parser is an external collaborator (Non-goal); this crate
//! only accepts the already-resolved fields.

use std::collections::HashMap;

/// Credentials for a remote server to be logged into alongside the
/// primary connection during an encrypted login (§4.6 step 7).
#[derive(Debug, Clone)]
pub struct RemoteServer {
    pub name: String,
    pub password: String,
}

/// Everything needed to open and authenticate a connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Database to `use` immediately after a successful login, if
    /// non-empty (§4.7).
    pub database: String,
    pub application_name: String,
    /// Requests the encrypted login flow when true (§4.6); the plain
    /// flow is used otherwise. This driver only implements the
    /// strongest encryption tier, so there is no tier selector here --
    /// a caller who needs a weaker tier gets `unsupported-encryption`.
    pub encrypt: bool,
    pub remote_servers: Vec<RemoteServer>,
    /// Defaulted/overridable options (host process id, library name and
    /// version, language, character set, `odce`) the adapter layer may
    /// want to override; anything absent falls back to this driver's
    /// defaults.
    pub properties: HashMap<String, String>,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, password: impl Into<String>) -> Self {
        ConnectionInfo {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            database: String::new(),
            application_name: "ase-tds".into(),
            encrypt: false,
            remote_servers: Vec::new(),
            properties: HashMap::new(),
        }
    }

    fn property(&self, key: &str, default: &str) -> String {
        self.properties
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Builds the wire-level login record for this configuration. The
    /// password itself is filled in later by the login state machine,
    /// plaintext or RSA-encrypted depending on `encrypt`.
    pub fn login_config(&self) -> LoginConfig {
        LoginConfig {
            host_name: self.property("hostname", "localhost"),
            user_name: self.username.clone(),
            password: self.password.clone(),
            host_process: self.property("hostproc", &std::process::id().to_string()),
            app_name: self.application_name.clone(),
            server_name: self.host.clone(),
            library_name: self.property("libname", "ase-tds"),
            library_version: self.property("libversion", env!("CARGO_PKG_VERSION")),
            language: self.property("language", "us_english"),
            char_set: self.property("charset", "iso_1"),
            encrypt: self.encrypt,
            odce: self.property("odce", "false") == "true",
            remote_servers: self.remote_servers.clone(),
        }
    }
}

/// The resolved inputs to the login state machine (§4.6), derived from
/// [`ConnectionInfo`] plus driver defaults for anything the caller left
/// unset.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub host_name: String,
    pub user_name: String,
    pub password: String,
    pub host_process: String,
    pub app_name: String,
    pub server_name: String,
    pub library_name: String,
    pub library_version: String,
    pub language: String,
    pub char_set: String,
    pub encrypt: bool,
    /// On-demand command encryption: when true, the symmetric session
    /// key generated during encrypted login (§4.6 step 8) is the wider
    /// AES-128-class width rather than the DES-class default.
    pub odce: bool,
    pub remote_servers: Vec<RemoteServer>,
}

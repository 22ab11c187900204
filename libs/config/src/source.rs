//! A single Kea control channel the exporter polls.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// label every sample carries, holds [`ServerSource::identity`]
pub const SERVER_LABEL: &str = "server";
/// label for the `subnet[<id>]` hierarchy segment
pub const SUBNET_LABEL: &str = "subnet_id";
/// label for the `pool[<id>]` hierarchy segment
pub const POOL_LABEL: &str = "pool_id";
/// labels the exporter sets itself; static labels may not use these names,
/// nor any other name ending in `_id`
pub const RESERVED_LABELS: [&str; 3] = [SERVER_LABEL, SUBNET_LABEL, POOL_LABEL];

/// Which Kea daemon sits behind a control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Dhcp4,
    Dhcp6,
    Ddns,
}

impl ServerKind {
    /// name the Kea Control Agent uses to route commands to this daemon
    pub fn service(&self) -> &'static str {
        match self {
            ServerKind::Dhcp4 => "dhcp4",
            ServerKind::Dhcp6 => "dhcp6",
            ServerKind::Ddns => "d2",
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerKind::Dhcp4 => write!(f, "dhcp4"),
            ServerKind::Dhcp6 => write!(f, "dhcp6"),
            ServerKind::Ddns => write!(f, "ddns"),
        }
    }
}

impl FromStr for ServerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dhcp4" => Ok(ServerKind::Dhcp4),
            "dhcp6" => Ok(ServerKind::Dhcp6),
            "ddns" | "d2" => Ok(ServerKind::Ddns),
            other => Err(format!(
                "unknown server kind `{other}`, expected dhcp4, dhcp6 or ddns"
            )),
        }
    }
}

/// Where a control channel lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transport {
    /// unix domain socket, the daemon's own `control-socket`
    Unix(PathBuf),
    /// raw JSON over TCP, `host:port`
    Tcp(String),
    /// Kea Control Agent (or an http control socket), commands are POSTed
    Http(String),
}

impl Transport {
    /// does the far end route commands by `service`? Only true for the
    /// control agent, daemons addressed directly don't need it
    pub fn routes_by_service(&self) -> bool {
        matches!(self, Transport::Http(_))
    }

    /// socket path if this is a unix transport
    pub fn unix_path(&self) -> Option<&Path> {
        match self {
            Transport::Unix(path) => Some(path),
            _ => None,
        }
    }
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = s.trim();
        let invalid = |reason: &str| ConfigError::InvalidAddress {
            address: address.to_owned(),
            reason: reason.to_owned(),
        };
        if address.is_empty() {
            return Err(invalid("address is empty"));
        }
        if let Some(rest) = address
            .strip_prefix("http://")
            .or_else(|| address.strip_prefix("https://"))
        {
            if rest.is_empty() || rest.starts_with('/') {
                return Err(invalid("url has no host"));
            }
            return Ok(Transport::Http(address.to_owned()));
        }
        if address.contains("://") {
            return Err(invalid("only http:// and https:// urls are supported"));
        }
        // anything that looks like a path is a unix socket
        if address.starts_with('/') || address.starts_with('.') || address.contains('/') {
            return Ok(Transport::Unix(PathBuf::from(address)));
        }
        match address.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                port.parse::<u16>()
                    .map_err(|_| invalid("port is not a number between 0 and 65535"))?;
                Ok(Transport::Tcp(address.to_owned()))
            }
            None => Ok(Transport::Unix(PathBuf::from(address))),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Unix(path) => write!(f, "{}", path.display()),
            Transport::Tcp(addr) | Transport::Http(addr) => write!(f, "{addr}"),
        }
    }
}

/// One configured Kea daemon. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSource {
    address: Transport,
    kind: ServerKind,
    identity: String,
    static_labels: BTreeMap<String, String>,
}

impl ServerSource {
    /// Build a source, validating its static labels. Without a `name` the
    /// identity is `<kind>@<address>`
    pub fn new(
        address: Transport,
        kind: ServerKind,
        name: Option<String>,
        static_labels: BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        for (name, value) in &static_labels {
            validate_label(name, value)?;
        }
        let identity = match name.map(|n| n.trim().to_owned()) {
            Some(n) if !n.is_empty() => n,
            _ => format!("{kind}@{address}"),
        };
        Ok(Self {
            address,
            kind,
            identity,
            static_labels,
        })
    }

    pub fn address(&self) -> &Transport {
        &self.address
    }
    pub fn kind(&self) -> ServerKind {
        self.kind
    }
    /// value of the `server` label
    pub fn identity(&self) -> &str {
        &self.identity
    }
    pub fn static_labels(&self) -> &BTreeMap<String, String> {
        &self.static_labels
    }

    /// labels this source stamps on every sample, regardless of statistic
    pub fn identity_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.static_labels.clone();
        labels.insert(SERVER_LABEL.to_owned(), self.identity.clone());
        labels
    }
}

impl fmt::Display for ServerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} at {})", self.identity, self.kind, self.address)
    }
}

/// prometheus label names are `[a-zA-Z_][a-zA-Z0-9_]*`, `__` prefix is reserved
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_label(name: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidLabel {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };
    if !is_valid_label_name(name) {
        return Err(invalid("not a valid prometheus label name"));
    }
    if RESERVED_LABELS.contains(&name) {
        return Err(invalid("name is reserved by the exporter"));
    }
    // `<kind>[<id>]` segments of a statistic key export as `<kind>_id`
    if name.ends_with("_id") {
        return Err(invalid("names ending in `_id` are reserved for statistic segments"));
    }
    // an empty value is indistinguishable from an absent label once scraped
    if value.is_empty() {
        return Err(invalid("value is empty"));
    }
    Ok(())
}

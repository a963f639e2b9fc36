use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Resource kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    File,
    Template,
    Service,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::File => "file",
            ResourceKind::Template => "template",
            ResourceKind::Service => "service",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ResourceKind::File),
            "template" => Ok(ResourceKind::Template),
            "service" => Ok(ResourceKind::Service),
            other => Err(IdentityParseError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Identity key for a resource: kind plus the key that names it
/// (path for files and templates, unit name for services).
///
/// Rendered `kind:key` in plan files, reports, and error messages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity {
    pub kind: ResourceKind,
    pub key: String,
}

impl Identity {
    pub fn new(kind: ResourceKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.key)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityParseError {
    #[error("identity `{input}` is missing a `kind:` prefix")]
    MissingKind { input: String },

    #[error("unknown resource kind `{kind}`")]
    UnknownKind { kind: String },

    #[error("identity `{input}` has an empty key")]
    EmptyKey { input: String },
}

impl FromStr for Identity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((kind, key)) = s.split_once(':') else {
            return Err(IdentityParseError::MissingKind {
                input: s.to_string(),
            });
        };
        if key.is_empty() {
            return Err(IdentityParseError::EmptyKey {
                input: s.to_string(),
            });
        }
        Ok(Identity::new(kind.parse::<ResourceKind>()?, key))
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Unix permission bits, written as an octal string (`"0644"`) on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(pub u32);

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl FromStr for FileMode {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u32::from_str_radix(s, 8).map(FileMode)
    }
}

impl Serialize for FileMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FileMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|e| D::Error::custom(format!("invalid octal mode `{s}`: {e}")))
    }
}

/// Requested run-state action for a service resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    Enable,
    Start,
    Restart,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Enable => "enable",
            ServiceAction::Start => "start",
            ServiceAction::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: Utf8PathBuf,

    /// Content source URI (`file://...` or a bare path), resolved by an
    /// artifact-source collaborator.
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<FileMode>,

    /// Number of prior versions to keep when overwriting. `None` uses the
    /// run-level backup policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub path: Utf8PathBuf,

    /// Template file to render.
    pub template: Utf8PathBuf,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<FileMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,

    #[serde(default)]
    pub actions: Vec<ServiceAction>,
}

/// Desired-state payload, tagged by resource kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    File(FileSpec),
    Template(TemplateSpec),
    Service(ServiceSpec),
}

/// One declared unit of desired state. Immutable once loaded for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDecl {
    #[serde(flatten)]
    pub spec: ResourceSpec,

    /// Ordering predecessors: identities that must converge before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Identity>,

    /// Notification targets re-applied after this resource changes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifies: Vec<Identity>,
}

impl ResourceDecl {
    pub fn kind(&self) -> ResourceKind {
        match &self.spec {
            ResourceSpec::File(_) => ResourceKind::File,
            ResourceSpec::Template(_) => ResourceKind::Template,
            ResourceSpec::Service(_) => ResourceKind::Service,
        }
    }

    pub fn identity(&self) -> Identity {
        let key = match &self.spec {
            ResourceSpec::File(f) => f.path.to_string(),
            ResourceSpec::Template(t) => t.path.to_string(),
            ResourceSpec::Service(s) => s.name.clone(),
        };
        Identity::new(self.kind(), key)
    }
}

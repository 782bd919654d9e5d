//! Invocation parameters.
//!
//! Parameters arrive loosely typed: numbers may be JSON numbers or decimal
//! strings, booleans may be any of the usual boolean-like spellings. They are
//! parsed into [`FlavorParams`] here, before any comparison logic runs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_AUTH_URL: &str = "http://127.0.0.1:35357/v2.0/";

/// Parameter validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required parameter: {0}")]
    MissingField(&'static str),

    #[error("parameter {field} must be a non-negative integer, got '{value}'")]
    InvalidInteger { field: &'static str, value: String },

    #[error("parameter {field} must be a boolean, got '{value}'")]
    InvalidBool { field: &'static str, value: String },

    #[error("parameter name must not be empty")]
    EmptyName,

    #[error("invalid state '{0}', expected one of: present, absent")]
    InvalidState(String),

    #[error("invalid extra spec '{0}', expected KEY=VALUE")]
    InvalidExtraSpec(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// A loosely typed scalar as passed by an automation framework.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(n) => write!(f, "{:?}", n),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

impl Scalar {
    fn to_u64(&self, field: &'static str) -> Result<u64> {
        let invalid = || ValidationError::InvalidInteger {
            field,
            value: self.to_string(),
        };
        match self {
            Scalar::Int(n) => u64::try_from(*n).map_err(|_| invalid()),
            Scalar::Float(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= u64::MAX as f64 => {
                Ok(*n as u64)
            }
            Scalar::Str(s) => s.trim().parse::<u64>().map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    fn to_bool(&self, field: &'static str) -> Result<bool> {
        let invalid = || ValidationError::InvalidBool {
            field,
            value: self.to_string(),
        };
        match self {
            Scalar::Bool(b) => Ok(*b),
            Scalar::Int(0) => Ok(false),
            Scalar::Int(1) => Ok(true),
            Scalar::Str(s) => parse_bool_like(s).ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

/// Parses the boolean-like spellings accepted for `is_public`.
pub fn parse_bool_like(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "y" | "t" => Some(true),
        "false" | "no" | "off" | "0" | "n" | "f" => Some(false),
        _ => None,
    }
}

/// Desired state directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Present,
    Absent,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Present => "present",
            State::Absent => "absent",
        }
    }
}

impl FromStr for State {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(State::Present),
            "absent" => Ok(State::Absent),
            _ => Err(ValidationError::InvalidState(s.to_string())),
        }
    }
}

/// Parameters exactly as received, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawParams {
    pub login_username: Option<String>,
    pub login_password: Option<String>,
    pub login_tenant_name: Option<String>,
    pub auth_url: Option<String>,
    pub region_name: Option<String>,
    pub name: Option<String>,
    pub ram: Option<Scalar>,
    pub vcpus: Option<Scalar>,
    pub root: Option<Scalar>,
    pub ephemeral: Option<Scalar>,
    pub swap: Option<Scalar>,
    pub id: Option<Scalar>,
    pub is_public: Option<Scalar>,
    pub extra_specs: Option<BTreeMap<String, Scalar>>,
    pub state: Option<String>,
}

impl RawParams {
    /// Overlays `other` on top of `self`. Fields set in `other` win; extra
    /// specs are merged key by key.
    pub fn merge(self, other: RawParams) -> RawParams {
        let extra_specs = match (self.extra_specs, other.extra_specs) {
            (Some(mut base), Some(over)) => {
                base.extend(over);
                Some(base)
            }
            (base, over) => over.or(base),
        };
        RawParams {
            login_username: other.login_username.or(self.login_username),
            login_password: other.login_password.or(self.login_password),
            login_tenant_name: other.login_tenant_name.or(self.login_tenant_name),
            auth_url: other.auth_url.or(self.auth_url),
            region_name: other.region_name.or(self.region_name),
            name: other.name.or(self.name),
            ram: other.ram.or(self.ram),
            vcpus: other.vcpus.or(self.vcpus),
            root: other.root.or(self.root),
            ephemeral: other.ephemeral.or(self.ephemeral),
            swap: other.swap.or(self.swap),
            id: other.id.or(self.id),
            is_public: other.is_public.or(self.is_public),
            extra_specs,
            state: other.state.or(self.state),
        }
    }

    /// Parses and validates into strict types.
    pub fn validate(self) -> Result<FlavorParams> {
        let state = match &self.state {
            Some(s) => s.parse()?,
            None => State::default(),
        };

        let credentials = Credentials {
            username: non_empty(self.login_username)
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: self
                .login_password
                .ok_or(ValidationError::MissingField("login_password"))?,
            tenant_name: non_empty(self.login_tenant_name)
                .ok_or(ValidationError::MissingField("login_tenant_name"))?,
            auth_url: non_empty(self.auth_url).unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            region_name: non_empty(self.region_name),
        };

        let name = self.name.ok_or(ValidationError::MissingField("name"))?;
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }

        let desired = match state {
            State::Absent => Desired::Absent { name },
            State::Present => {
                let required = |value: Option<Scalar>, field: &'static str| {
                    value
                        .ok_or(ValidationError::MissingField(field))
                        .and_then(|v| v.to_u64(field))
                };
                let optional = |value: Option<Scalar>, field: &'static str| {
                    value.map(|v| v.to_u64(field)).transpose()
                };

                Desired::Present(FlavorSpec {
                    ram: required(self.ram, "ram")?,
                    vcpus: required(self.vcpus, "vcpus")?,
                    disk: required(self.root, "root")?,
                    ephemeral: optional(self.ephemeral, "ephemeral")?.unwrap_or(0),
                    swap: optional(self.swap, "swap")?.unwrap_or(0),
                    id: self
                        .id
                        .map(|id| id.to_string())
                        .filter(|id| !id.trim().is_empty()),
                    is_public: self
                        .is_public
                        .map(|v| v.to_bool("is_public"))
                        .transpose()?
                        .unwrap_or(true),
                    extra_specs: self
                        .extra_specs
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(k, v)| (k, v.to_string()))
                        .collect(),
                    name,
                })
            }
        };

        Ok(FlavorParams {
            credentials,
            desired,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses a `KEY=VALUE` extra spec given on the command line.
pub fn parse_extra_spec(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ValidationError::InvalidExtraSpec(s.to_string())),
    }
}

/// Identity service credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub tenant_name: String,
    pub auth_url: String,
    pub region_name: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tenant_name", &self.tenant_name)
            .field("auth_url", &self.auth_url)
            .field("region_name", &self.region_name)
            .finish()
    }
}

/// Desired flavor definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlavorSpec {
    pub name: String,
    /// RAM in MB.
    pub ram: u64,
    pub vcpus: u64,
    /// Root disk in GB.
    pub disk: u64,
    /// Ephemeral disk in GB.
    pub ephemeral: u64,
    /// Swap in MB.
    pub swap: u64,
    /// Explicit flavor id; the compute service assigns one when unset.
    pub id: Option<String>,
    pub is_public: bool,
    pub extra_specs: BTreeMap<String, String>,
}

/// What the operator wants to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desired {
    Present(FlavorSpec),
    Absent { name: String },
}

impl Desired {
    pub fn name(&self) -> &str {
        match self {
            Desired::Present(spec) => &spec.name,
            Desired::Absent { name } => name,
        }
    }

    pub fn state(&self) -> State {
        match self {
            Desired::Present(_) => State::Present,
            Desired::Absent { .. } => State::Absent,
        }
    }
}

/// Validated parameters.
#[derive(Debug, Clone)]
pub struct FlavorParams {
    pub credentials: Credentials,
    pub desired: Desired,
}

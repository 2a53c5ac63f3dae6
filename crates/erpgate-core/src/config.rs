//! Backend connection configuration

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::{ErpError, Result};

/// Untyped key/value parameters, used both for configuration intake and for
/// operation arguments.
pub type Params = serde_json::Map<String, Value>;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of attempts made by `execute_with_retry`
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base delay for exponential backoff
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

const HOST_KEYS: &[&str] = &["host", "ashost", "server"];
const USERNAME_KEYS: &[&str] = &["username", "user"];
const PASSWORD_KEYS: &[&str] = &["password", "passwd"];
const DATABASE_KEYS: &[&str] = &["database", "service_name", "db"];
const POLICY_KEYS: &[&str] = &["port", "timeout", "max_retries", "retry_delay"];

/// Immutable description of one backend target.
///
/// Built once when a pool is created and shared by every connector of that
/// pool. Backend families spell the common keys differently (`ashost` vs
/// `host`, `passwd` vs `password`); `from_params` folds those aliases into
/// the typed fields and keeps everything else in `extra_params`.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database, Oracle service name or similar
    pub database: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    pub retry_delay: Duration,
    /// Backend-specific parameters that have no typed field
    pub extra_params: Params,
}

impl ConnectionConfig {
    /// Create an empty configuration with the default retry policy
    pub fn new() -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            extra_params: Params::new(),
        }
    }

    /// Normalize an untyped configuration map.
    ///
    /// `timeout` and `retry_delay` are read as seconds (fractions allowed),
    /// `port` and `max_retries` accept numbers or numeric strings.
    pub fn from_params(params: &Params) -> Result<Self> {
        let mut config = Self::new();

        config.host = first_string(params, HOST_KEYS);
        config.username = first_string(params, USERNAME_KEYS);
        config.password = first_string(params, PASSWORD_KEYS);
        config.database = first_string(params, DATABASE_KEYS);

        if let Some(port) = params.get("port").filter(|v| !v.is_null()) {
            let port = value_as_u64(port)
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| ErpError::Configuration(format!("invalid port: {}", port)))?;
            config.port = Some(port);
        }

        if let Some(timeout) = params.get("timeout").filter(|v| !v.is_null()) {
            config.timeout = value_as_seconds(timeout).ok_or_else(|| {
                ErpError::Configuration(format!("invalid timeout: {}", timeout))
            })?;
        }

        if let Some(retries) = params.get("max_retries").filter(|v| !v.is_null()) {
            config.max_retries = value_as_u64(retries)
                .and_then(|r| u32::try_from(r).ok())
                .ok_or_else(|| {
                    ErpError::Configuration(format!("invalid max_retries: {}", retries))
                })?;
        }

        if let Some(delay) = params.get("retry_delay").filter(|v| !v.is_null()) {
            config.retry_delay = value_as_seconds(delay).ok_or_else(|| {
                ErpError::Configuration(format!("invalid retry_delay: {}", delay))
            })?;
        }

        let typed_keys = HOST_KEYS
            .iter()
            .chain(USERNAME_KEYS)
            .chain(PASSWORD_KEYS)
            .chain(DATABASE_KEYS)
            .chain(POLICY_KEYS);
        let mut extra = params.clone();
        for key in typed_keys {
            extra.remove(*key);
        }
        config.extra_params = extra;

        Ok(config)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Add a backend-specific parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    /// Get a raw extra parameter
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.extra_params.get(key).filter(|v| !v.is_null())
    }

    /// Get an extra parameter as a string, trying each alias in order.
    ///
    /// Numbers and booleans are rendered, so `sysnr = 0` and `sysnr = "00"`
    /// both come back as strings.
    pub fn param_str(&self, keys: &[&str]) -> Option<String> {
        first_string(&self.extra_params, keys)
    }

    /// Get an extra parameter as a boolean (`true`, `"true"`, `"yes"`, `1`)
    pub fn param_bool(&self, key: &str) -> Option<bool> {
        match self.param(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Some(true),
                "false" | "no" | "0" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Get an extra parameter as an unsigned integer
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.param(key).and_then(value_as_u64)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("extra_params", &self.extra_params.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Typed accessors for operation arguments
pub trait ParamsExt {
    /// Get a required string argument
    fn require_str(&self, key: &str) -> Result<&str>;

    /// Get an optional, non-empty string argument
    fn opt_str(&self, key: &str) -> Option<&str>;

    /// Get an optional unsigned integer argument (number or numeric string)
    fn opt_u64(&self, key: &str) -> Option<u64>;

    /// Get an optional array argument
    fn opt_array(&self, key: &str) -> Option<&Vec<Value>>;

    /// Get an optional object argument
    fn opt_object(&self, key: &str) -> Option<&Params>;

    /// Get an optional list of strings, accepting either an array or a
    /// comma-separated string
    fn opt_str_list(&self, key: &str) -> Vec<String>;
}

impl ParamsExt for Params {
    fn require_str(&self, key: &str) -> Result<&str> {
        self.opt_str(key)
            .ok_or_else(|| ErpError::InvalidArgument(format!("'{}' is required", key)))
    }

    fn opt_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    fn opt_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(value_as_u64)
    }

    fn opt_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(Value::as_array)
    }

    fn opt_object(&self, key: &str) -> Option<&Params> {
        self.get(key).and_then(Value::as_object)
    }

    fn opt_str_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(value_as_string).collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn first_string(params: &Params, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| params.get(*key))
        .find_map(value_as_string)
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_seconds(value: &Value) -> Option<Duration> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Duration::try_from_secs_f64(secs).ok()
}

//! DIA connection settings

use std::fmt;
use std::time::Duration;

use erpgate_core::{ConnectionConfig, ErpError, Result};
use url::Url;

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_DONEM_KODU: u64 = 1;

/// Settings derived from a pool's `ConnectionConfig`
#[derive(Clone)]
pub struct DiaSettings {
    /// `https://{server_code}.ws.dia.com.tr/api/v3` unless overridden
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub api_key: String,
    /// Drop other sessions of the same user on login
    pub disconnect_same_user: bool,
    pub session_timeout: Duration,
    /// Injected into SCF requests that name no company
    pub default_firma_kodu: Option<u64>,
    /// Injected into SCF requests that name no period
    pub default_donem_kodu: u64,
}

impl DiaSettings {
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let base_url = match config.param_str(&["base_url"]) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let server_code = config
                    .param_str(&["server_code"])
                    .or_else(|| config.host.clone())
                    .ok_or_else(|| {
                        ErpError::Configuration("DIA connection requires 'server_code'".into())
                    })?;
                format!("https://{}.ws.dia.com.tr/api/v3", server_code)
            }
        };
        Url::parse(&base_url).map_err(|e| {
            ErpError::Configuration(format!("invalid DIA base URL '{}': {}", base_url, e))
        })?;

        let required = |value: Option<String>, key: &str| {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ErpError::Configuration(format!("DIA connection requires '{}'", key)))
        };

        Ok(Self {
            base_url,
            username: required(config.username.clone(), "username")?,
            password: required(config.password.clone(), "password")?,
            api_key: required(config.param_str(&["api_key", "apikey"]), "api_key")?,
            disconnect_same_user: config.param_bool("disconnect_same_user").unwrap_or(true),
            session_timeout: config
                .param_u64("session_timeout")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SESSION_TIMEOUT),
            default_firma_kodu: config.param_u64("firma_kodu"),
            default_donem_kodu: config
                .param_u64("donem_kodu")
                .unwrap_or(DEFAULT_DONEM_KODU),
        })
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

impl fmt::Debug for DiaSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiaSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("api_key", &"***")
            .field("disconnect_same_user", &self.disconnect_same_user)
            .field("session_timeout", &self.session_timeout)
            .field("default_firma_kodu", &self.default_firma_kodu)
            .field("default_donem_kodu", &self.default_donem_kodu)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn config(value: Value) -> ConnectionConfig {
        ConnectionConfig::from_params(value.as_object().expect("object")).expect("config")
    }

    #[test]
    fn test_base_url_from_server_code() {
        let settings = DiaSettings::from_config(&config(json!({
            "server_code": "acme",
            "username": "ws",
            "password": "pw",
            "apikey": "key",
        })))
        .expect("settings");

        assert_eq!(settings.base_url, "https://acme.ws.dia.com.tr/api/v3");
        assert_eq!(settings.endpoint_url("/SIS/json"), "https://acme.ws.dia.com.tr/api/v3/SIS/json");
        assert!(settings.disconnect_same_user);
        assert_eq!(settings.session_timeout, DEFAULT_SESSION_TIMEOUT);
        assert_eq!(settings.default_donem_kodu, 1);
        assert_eq!(settings.default_firma_kodu, None);
    }

    #[test]
    fn test_host_fallback_and_overrides() {
        let settings = DiaSettings::from_config(&config(json!({
            "host": "globex",
            "username": "ws",
            "password": "pw",
            "api_key": "key",
            "disconnect_same_user": "false",
            "session_timeout": 600,
            "firma_kodu": 3,
        })))
        .expect("settings");

        assert_eq!(settings.base_url, "https://globex.ws.dia.com.tr/api/v3");
        assert!(!settings.disconnect_same_user);
        assert_eq!(settings.session_timeout, Duration::from_secs(600));
        assert_eq!(settings.default_firma_kodu, Some(3));
    }

    #[test]
    fn test_missing_api_key() {
        let err = DiaSettings::from_config(&config(json!({
            "server_code": "acme",
            "username": "ws",
            "password": "pw",
        })))
        .unwrap_err();
        assert!(matches!(err, ErpError::Configuration(ref m) if m.contains("api_key")));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let settings = DiaSettings::from_config(&config(json!({
            "server_code": "acme",
            "username": "ws",
            "password": "hunter2",
            "api_key": "sk-live",
        })))
        .expect("settings");
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("sk-live"));
    }
}

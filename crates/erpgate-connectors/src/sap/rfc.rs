//! Native RFC binding seam
//!
//! The RFC SDK is a proprietary C library, so erpgate does not link it
//! directly. An embedding application registers an `RfcBinding` at bootstrap;
//! the SAP connector drives the blocking sessions it opens on the shared
//! worker pool.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use erpgate_core::{ConnectionConfig, ErpError, Params, Result};
use parking_lot::Mutex;
use serde_json::Value;

use crate::BlockingPool;

/// Optional logon parameters passed through to the RFC library verbatim
const PASS_THROUGH_KEYS: &[(&str, &[&str])] = &[
    ("saprouter", &["saprouter", "router"]),
    ("gwhost", &["gwhost"]),
    ("gwserv", &["gwserv"]),
    ("group", &["group"]),
    ("mshost", &["mshost"]),
    ("msserv", &["msserv"]),
    ("sysid", &["sysid"]),
    ("snc_mode", &["snc_mode", "sncmode"]),
    ("snc_partnername", &["snc_partnername"]),
    ("snc_qop", &["snc_qop"]),
];

/// Logon parameters for an RFC session
#[derive(Clone, PartialEq)]
pub struct RfcConnectParams {
    pub ashost: String,
    pub sysnr: String,
    pub client: String,
    pub user: String,
    pub passwd: String,
    pub lang: String,
    pub optional: BTreeMap<String, String>,
}

impl RfcConnectParams {
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let missing = |what: &str| {
            ErpError::Configuration(format!("SAP RFC connection requires '{}'", what))
        };

        let mut optional = BTreeMap::new();
        for (name, keys) in PASS_THROUGH_KEYS {
            if let Some(value) = config.param_str(keys) {
                optional.insert((*name).to_string(), value);
            }
        }

        Ok(Self {
            ashost: config.host.clone().ok_or_else(|| missing("ashost"))?,
            sysnr: config
                .param_str(&["sysnr"])
                .unwrap_or_else(|| "00".to_string()),
            client: config
                .param_str(&["client"])
                .unwrap_or_else(|| "100".to_string()),
            user: config.username.clone().ok_or_else(|| missing("user"))?,
            passwd: config.password.clone().ok_or_else(|| missing("passwd"))?,
            lang: config
                .param_str(&["lang"])
                .unwrap_or_else(|| "EN".to_string()),
            optional,
        })
    }

    /// Flatten into the key/value form RFC libraries take
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = self.optional.clone();
        map.insert("ashost".into(), self.ashost.clone());
        map.insert("sysnr".into(), self.sysnr.clone());
        map.insert("client".into(), self.client.clone());
        map.insert("user".into(), self.user.clone());
        map.insert("passwd".into(), self.passwd.clone());
        map.insert("lang".into(), self.lang.clone());
        map
    }
}

impl fmt::Debug for RfcConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RfcConnectParams")
            .field("ashost", &self.ashost)
            .field("sysnr", &self.sysnr)
            .field("client", &self.client)
            .field("user", &self.user)
            .field("passwd", &"***")
            .field("lang", &self.lang)
            .field("optional", &self.optional)
            .finish()
    }
}

/// Entry point into a native RFC library
pub trait RfcBinding: Send + Sync {
    /// Check that the library is loadable. Called once at startup.
    fn probe(&self) -> Result<()>;

    /// Open a session. Blocking.
    fn open(&self, params: &RfcConnectParams) -> Result<Box<dyn RfcSession>>;
}

/// One open RFC session. All calls block the calling thread.
pub trait RfcSession: Send {
    /// Invoke a function module. Import, changing and table parameters go in
    /// `params`; exports and tables come back as one object.
    fn call(&mut self, function: &str, params: &Params) -> Result<Value>;

    fn ping(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

type SharedSession = Arc<Mutex<Box<dyn RfcSession>>>;

/// Async front for an `RfcSession`, dispatching every call to the blocking pool
pub(crate) struct RfcClient {
    session: SharedSession,
    blocking: Arc<BlockingPool>,
    timeout: Duration,
}

impl RfcClient {
    pub(crate) async fn open(
        binding: Arc<dyn RfcBinding>,
        params: RfcConnectParams,
        blocking: Arc<BlockingPool>,
        timeout: Duration,
    ) -> Result<Self> {
        let session = blocking
            .run(timeout, move || binding.open(&params))
            .await?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            blocking,
            timeout,
        })
    }

    pub(crate) async fn call(&self, function: &str, params: Params) -> Result<Value> {
        let session = self.session.clone();
        let function = function.to_string();
        self.blocking
            .run(self.timeout, move || session.lock().call(&function, &params))
            .await
    }

    pub(crate) async fn ping(&self) -> Result<()> {
        let session = self.session.clone();
        self.blocking
            .run(self.timeout, move || session.lock().ping())
            .await
    }

    pub(crate) async fn close(self) -> Result<()> {
        let session = self.session;
        self.blocking
            .run(self.timeout, move || session.lock().close())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config(value: Value) -> ConnectionConfig {
        let params = value.as_object().cloned().expect("object");
        ConnectionConfig::from_params(&params).expect("valid config")
    }

    #[test]
    fn test_defaults_applied() {
        let params = RfcConnectParams::from_config(&config(json!({
            "ashost": "sap.example.com",
            "user": "RFC_USER",
            "passwd": "secret",
        })))
        .expect("params");

        assert_eq!(params.sysnr, "00");
        assert_eq!(params.client, "100");
        assert_eq!(params.lang, "EN");
        assert!(params.optional.is_empty());
    }

    #[test]
    fn test_optional_keys_pass_through() {
        let params = RfcConnectParams::from_config(&config(json!({
            "host": "sap.example.com",
            "username": "RFC_USER",
            "password": "secret",
            "client": "800",
            "router": "/H/saprouter/S/3299",
            "sncmode": "1",
            "unrelated": "ignored",
        })))
        .expect("params");

        let map = params.to_map();
        assert_eq!(map["client"], "800");
        assert_eq!(map["saprouter"], "/H/saprouter/S/3299");
        assert_eq!(map["snc_mode"], "1");
        assert!(!map.contains_key("unrelated"));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let err = RfcConnectParams::from_config(&config(json!({"ashost": "sap"}))).unwrap_err();
        assert!(matches!(err, ErpError::Configuration(ref m) if m.contains("user")));
    }

    #[test]
    fn test_debug_hides_password() {
        let params = RfcConnectParams::from_config(&config(json!({
            "ashost": "sap",
            "user": "u",
            "passwd": "hunter2",
        })))
        .expect("params");
        assert!(!format!("{:?}", params).contains("hunter2"));
    }
}

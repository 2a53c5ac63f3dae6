//! Session-token connector for the DIA web service API

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use erpgate_core::{
    ConnectionConfig, Connector, ConnectorFactory, ConnectorKind, ConnectorStats, ErpError,
    Params, Result,
};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use super::{DiaOperation, DiaSettings};
use crate::http::{retry_after, snippet, transport_error};

const SUCCESS_CODE: &str = "200";

/// Server-side session tracked by its expiry only
#[derive(Debug, Clone)]
struct DiaSession {
    id: String,
    expires_at: Option<DateTime<Utc>>,
}

impl DiaSession {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => true,
        }
    }
}

/// Session ids are credentials; only a prefix goes to the logs
fn short_id(id: &str) -> &str {
    match id.char_indices().nth(10) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// DIA returns `code` as either a string or a number
fn response_code(body: &Value) -> Option<String> {
    match body.get("code")? {
        Value::String(code) => Some(code.clone()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}

fn response_message(body: &Value) -> String {
    match body.get("msg") {
        Some(Value::String(msg)) => msg.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub struct DiaConnector {
    config: Arc<ConnectionConfig>,
    settings: DiaSettings,
    http: Client,
    session: Option<DiaSession>,
    stats: ConnectorStats,
}

impl DiaConnector {
    pub fn new(config: Arc<ConnectionConfig>) -> Result<Self> {
        let settings = DiaSettings::from_config(&config)?;
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ErpError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            settings,
            http,
            session: None,
            stats: ConnectorStats::new(),
        })
    }

    pub fn settings(&self) -> &DiaSettings {
        &self.settings
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    pub fn session_expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().and_then(|s| s.expires_at)
    }

    /// POST a JSON body and return the decoded response.
    ///
    /// HTTP-level failures are mapped here; the `code` field of the body is
    /// left to the caller since login and service calls treat it differently.
    async fn post(&mut self, endpoint: &str, body: &Value) -> Result<Value> {
        let url = self.settings.endpoint_url(endpoint);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error("DIA request", e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            if let Some(session) = self.session.take() {
                tracing::warn!(session = short_id(&session.id), "DIA session rejected");
            }
            return Err(ErpError::Authentication(
                "DIA rejected the session (401)".to_string(),
            ));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ErpError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }
        if status.is_client_error() || status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(ErpError::Connection(format!(
                "DIA returned {}: {}",
                status,
                snippet(&text)
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| transport_error("DIA response", e))
    }

    /// Log in and store the new session
    #[tracing::instrument(skip(self), fields(base_url = %self.settings.base_url, user = %self.settings.username))]
    pub async fn authenticate(&mut self) -> Result<()> {
        let disconnect_same_user = if self.settings.disconnect_same_user {
            "True"
        } else {
            "False"
        };
        let body = json!({
            "login": {
                "username": self.settings.username,
                "password": self.settings.password,
                "disconnect_same_user": disconnect_same_user,
                "params": { "apikey": self.settings.api_key },
            }
        });

        let response = self.post(DiaOperation::sis_endpoint(), &body).await?;
        let code = response_code(&response);
        if code.as_deref() != Some(SUCCESS_CODE) {
            let message = response_message(&response);
            tracing::error!(code = ?code, message = %message, "DIA login rejected");
            return Err(ErpError::Authentication(format!(
                "DIA login failed ({}): {}",
                code.unwrap_or_else(|| "no code".to_string()),
                message
            )));
        }

        let id = response_message(&response);
        if id.is_empty() {
            return Err(ErpError::Authentication(
                "DIA login returned no session id".to_string(),
            ));
        }

        let expires_at = chrono::Duration::from_std(self.settings.session_timeout)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        tracing::debug!(session = short_id(&id), expires_at = ?expires_at, "DIA session opened");
        self.session = Some(DiaSession { id, expires_at });
        Ok(())
    }

    /// Session id of a live session, logging in again when it has expired
    pub async fn ensure_authenticated(&mut self) -> Result<String> {
        let expired = self.session.as_ref().is_none_or(DiaSession::is_expired);
        if expired {
            tracing::info!("DIA session expired, re-authenticating");
            self.authenticate().await?;
        }
        self.session
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or_else(|| ErpError::Authentication("no DIA session".to_string()))
    }

    /// Run one web service call with the current session
    pub async fn call(&mut self, op: DiaOperation, params: &Params) -> Result<Value> {
        let session_id = self.ensure_authenticated().await?;

        let mut payload = Params::new();
        payload.insert("session_id".to_string(), Value::String(session_id));
        if op.is_scf() {
            if let Some(firma) = self.settings.default_firma_kodu {
                payload.insert("firma_kodu".to_string(), json!(firma));
            }
            payload.insert(
                "donem_kodu".to_string(),
                json!(self.settings.default_donem_kodu),
            );
        }
        for (key, value) in params {
            if key != "session_id" {
                payload.insert(key.clone(), value.clone());
            }
        }

        let mut body = Params::new();
        body.insert(op.service_name(), Value::Object(payload));

        let mut response = self.post(op.endpoint(), &Value::Object(body)).await?;
        let code = response_code(&response);
        if code.as_deref() != Some(SUCCESS_CODE) {
            return Err(ErpError::Backend(format!(
                "{}: {}",
                code.unwrap_or_else(|| "unknown".to_string()),
                response_message(&response)
            )));
        }

        let result = match response.get_mut("result").map(Value::take) {
            Some(result) => result,
            None => response.get_mut("data").map(Value::take).unwrap_or(Value::Null),
        };
        Ok(result)
    }

    async fn logout(&mut self, session_id: &str) -> Result<()> {
        let body = json!({ "logout": { "session_id": session_id } });
        self.post(DiaOperation::sis_endpoint(), &body).await.map(|_| ())
    }
}

#[async_trait]
impl Connector for DiaConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Dia
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn stats(&self) -> &ConnectorStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut ConnectorStats {
        &mut self.stats
    }

    async fn connect(&mut self) -> Result<bool> {
        if self.session.as_ref().is_some_and(|s| !s.is_expired()) {
            return Ok(false);
        }

        let started = Instant::now();
        self.authenticate().await?;
        self.stats.record_connect(started.elapsed());
        tracing::info!(
            base_url = %self.settings.base_url,
            duration_ms = started.elapsed().as_millis() as u64,
            "connected to DIA"
        );
        Ok(true)
    }

    async fn disconnect(&mut self) -> Result<bool> {
        let Some(session) = self.session.take() else {
            return Ok(false);
        };

        if let Err(e) = self.logout(&session.id).await {
            tracing::warn!(session = short_id(&session.id), error = %e, "DIA logout failed");
        }
        tracing::info!(base_url = %self.settings.base_url, "disconnected from DIA");
        Ok(true)
    }

    async fn execute(&mut self, operation: &str, params: &Params) -> Result<Value> {
        let op: DiaOperation = operation.parse()?;
        if self.session.is_none() {
            return Err(ErpError::NotConnected("not connected to DIA".to_string()));
        }
        self.call(op, params).await
    }

    async fn ping(&mut self) -> Result<bool> {
        if self.session.is_none() {
            return Ok(false);
        }
        match self.call(DiaOperation::KontorSorgula, &Params::new()).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::debug!(error = %e, "DIA ping failed");
                Ok(false)
            }
        }
    }

    fn check_operation(&self, operation: &str) -> Result<()> {
        operation.parse::<DiaOperation>().map(|_| ())
    }
}

pub struct DiaConnectorFactory;

impl ConnectorFactory for DiaConnectorFactory {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Dia
    }

    fn create(&self, config: Arc<ConnectionConfig>) -> Result<Box<dyn Connector>> {
        Ok(Box::new(DiaConnector::new(config)?))
    }
}

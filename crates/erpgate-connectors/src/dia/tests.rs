//! Tests for the DIA connector against a mock web service

use std::sync::Arc;

use erpgate_core::{ConnectionConfig, Connector, ConnectorFactory, ConnectorKind, ErpError, Params};
use mockito::{Matcher, Mock, ServerGuard};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use super::*;

const SIS: &str = "/SIS/json";
const SCF: &str = "/SCF/json";
const SESSION: &str = "sess-0123456789abcdef";

// ============================================================================
// Helpers
// ============================================================================

fn config(server: &ServerGuard) -> ConnectionConfig {
    ConnectionConfig::new()
        .with_credentials("ws_user", "secret")
        .with_param("base_url", server.url())
        .with_param("api_key", "key-1")
        .with_param("firma_kodu", 3)
}

fn connector(config: ConnectionConfig) -> DiaConnector {
    DiaConnector::new(Arc::new(config)).expect("connector")
}

async fn mock_login(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", SIS)
        .match_body(Matcher::PartialJson(json!({"login": {}})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"code": "200", "msg": SESSION}).to_string())
        .create_async()
        .await
}

/// A connected connector and the login mock, which must outlive it
async fn connected(server: &mut ServerGuard) -> (DiaConnector, Mock) {
    let login = mock_login(server).await;
    let mut connector = connector(config(server));
    connector.connect().await.expect("connect");
    (connector, login)
}

fn params(value: Value) -> Params {
    value.as_object().cloned().expect("object")
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_connect_sends_login() {
    let mut server = mockito::Server::new_async().await;
    let login = server
        .mock("POST", SIS)
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "login": {
                "username": "ws_user",
                "password": "secret",
                "disconnect_same_user": "True",
                "params": {"apikey": "key-1"},
            }
        })))
        .with_status(200)
        .with_body(json!({"code": 200, "msg": SESSION}).to_string())
        .create_async()
        .await;

    let mut connector = connector(config(&server));
    assert!(connector.connect().await.expect("connect"));
    assert!(!connector.connect().await.expect("session still valid"));

    login.assert_async().await;
    assert!(connector.is_connected());
    assert_eq!(connector.session_id(), Some(SESSION));
    assert!(connector.session_expires_at().is_some());
    assert!(connector.stats().connection_time().is_some());
}

#[tokio::test]
async fn test_rejected_login() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", SIS)
        .with_status(200)
        .with_body(json!({"code": "401", "msg": "Invalid user"}).to_string())
        .create_async()
        .await;

    let mut connector = connector(config(&server));
    let err = connector.connect().await.unwrap_err();

    assert!(matches!(err, ErpError::Authentication(ref m) if m.contains("Invalid user")));
    assert!(!connector.is_connected());
}

#[tokio::test]
async fn test_expired_session_logs_in_again() {
    let mut server = mockito::Server::new_async().await;
    let login = server
        .mock("POST", SIS)
        .match_body(Matcher::PartialJson(json!({"login": {}})))
        .with_status(200)
        .with_body(json!({"code": "200", "msg": SESSION}).to_string())
        .expect(2)
        .create_async()
        .await;
    let kontor = server
        .mock("POST", SIS)
        .match_body(Matcher::PartialJson(json!({"sis_kontor_sorgula": {}})))
        .with_status(200)
        .with_body(json!({"code": "200", "result": {"kontor": 120}}).to_string())
        .create_async()
        .await;

    let mut connector = connector(config(&server).with_param("session_timeout", 0));
    connector.connect().await.expect("connect");
    let value = connector
        .execute("kontor_sorgula", &Params::new())
        .await
        .expect("kontor");

    assert_eq!(value, json!({"kontor": 120}));
    login.assert_async().await;
    kontor.assert_async().await;
}

#[tokio::test]
async fn test_disconnect_sends_logout() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let logout = server
        .mock("POST", SIS)
        .match_body(Matcher::Json(json!({"logout": {"session_id": SESSION}})))
        .with_status(200)
        .with_body(json!({"code": "200", "msg": ""}).to_string())
        .create_async()
        .await;

    assert!(connector.disconnect().await.expect("disconnect"));
    assert!(!connector.disconnect().await.expect("already disconnected"));

    logout.assert_async().await;
    assert!(!connector.is_connected());
}

#[tokio::test]
async fn test_failed_logout_still_clears_session() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let _mock = server
        .mock("POST", SIS)
        .match_body(Matcher::PartialJson(json!({"logout": {}})))
        .with_status(502)
        .create_async()
        .await;

    assert!(connector.disconnect().await.expect("disconnect"));
    assert!(!connector.is_connected());
}

// ============================================================================
// Operations
// ============================================================================

#[tokio::test]
async fn test_scf_request_carries_session_and_defaults() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let listele = server
        .mock("POST", SCF)
        .match_body(Matcher::Json(json!({
            "scf_carikart_listele": {
                "session_id": SESSION,
                "firma_kodu": 3,
                "donem_kodu": 1,
                "limit": 10,
            }
        })))
        .with_status(200)
        .with_body(
            json!({"code": "200", "result": [{"carikartkodu": "C001"}, {"carikartkodu": "C002"}]})
                .to_string(),
        )
        .create_async()
        .await;

    let value = connector
        .execute("scf_carikart_listele", &params(json!({"limit": 10})))
        .await
        .expect("listele");

    listele.assert_async().await;
    assert_eq!(value.as_array().map(Vec::len), Some(2));
    assert_eq!(value[0]["carikartkodu"], "C001");
}

#[tokio::test]
async fn test_explicit_period_overrides_default() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let getir = server
        .mock("POST", SCF)
        .match_body(Matcher::PartialJson(json!({
            "scf_stokkart_getir": {"firma_kodu": 7, "donem_kodu": 2, "key": 42}
        })))
        .with_status(200)
        .with_body(json!({"code": "200", "data": {"stokkartkodu": "S-42"}}).to_string())
        .create_async()
        .await;

    let value = connector
        .execute(
            "scf_stokkart_getir",
            &params(json!({"firma_kodu": 7, "donem_kodu": 2, "key": 42})),
        )
        .await
        .expect("getir");

    getir.assert_async().await;
    assert_eq!(value, json!({"stokkartkodu": "S-42"}));
}

#[tokio::test]
async fn test_sis_request_has_no_scf_defaults() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let firma = server
        .mock("POST", SIS)
        .match_body(Matcher::Json(json!({
            "sis_yetkili_firma_donem_sube_depo": {"session_id": SESSION}
        })))
        .with_status(200)
        .with_body(json!({"code": "200", "result": [{"firmakodu": 3}]}).to_string())
        .create_async()
        .await;

    let value = connector
        .execute("yetkili_firma_donem", &Params::new())
        .await
        .expect("firma list");

    firma.assert_async().await;
    assert_eq!(value[0]["firmakodu"], 3);
}

#[tokio::test]
async fn test_error_code_maps_to_backend() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let _mock = server
        .mock("POST", SCF)
        .with_status(200)
        .with_body(json!({"code": "404", "msg": "Record not found"}).to_string())
        .create_async()
        .await;

    let err = connector
        .execute("scf_faturafisi_getir", &params(json!({"key": 1})))
        .await
        .unwrap_err();

    assert!(matches!(err, ErpError::Backend(ref m) if m == "404: Record not found"));
    assert!(connector.is_connected());
}

#[tokio::test]
async fn test_http_401_clears_session() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let _mock = server
        .mock("POST", SCF)
        .with_status(401)
        .create_async()
        .await;

    let err = connector
        .execute("scf_carikart_listele", &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ErpError::Authentication(_)));
    assert!(!connector.is_connected());

    let err = connector
        .execute("scf_carikart_listele", &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ErpError::NotConnected(_)));
}

#[tokio::test]
async fn test_rate_limit_reports_retry_after() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let _mock = server
        .mock("POST", SCF)
        .with_status(429)
        .with_header("retry-after", "30")
        .create_async()
        .await;

    let err = connector
        .execute("scf_stokkart_listele", &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ErpError::RateLimited { retry_after: Some(30) }));
    assert!(connector.is_connected());
}

#[tokio::test]
async fn test_server_error_maps_to_connection() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let _mock = server
        .mock("POST", SCF)
        .with_status(500)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let err = connector
        .execute("scf_carikart_ekle", &params(json!({"kart": {"unvan": "Acme"}})))
        .await
        .unwrap_err();

    assert!(matches!(err, ErpError::Connection(ref m) if m.contains("upstream unavailable")));
}

#[tokio::test]
async fn test_execute_requires_session() {
    let server = mockito::Server::new_async().await;
    let mut connector = connector(config(&server));

    let err = connector
        .execute("kontor_sorgula", &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ErpError::NotConnected(_)));

    let err = connector
        .execute("scf_carikart_sat", &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ErpError::UnknownOperation(_)));
    assert!(connector.check_operation("scf_carikart_sat").is_err());
    assert!(connector.check_operation("sis_kontor_sorgula").is_ok());
}

// ============================================================================
// Ping
// ============================================================================

#[tokio::test]
async fn test_ping_uses_kontor_query() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let kontor = server
        .mock("POST", SIS)
        .match_body(Matcher::PartialJson(json!({"sis_kontor_sorgula": {"session_id": SESSION}})))
        .with_status(200)
        .with_body(json!({"code": "200", "result": 55}).to_string())
        .create_async()
        .await;

    assert!(connector.ping().await.expect("ping"));
    kontor.assert_async().await;
}

#[tokio::test]
async fn test_ping_reports_failure_as_false() {
    let mut server = mockito::Server::new_async().await;
    let (mut connector, _login) = connected(&mut server).await;
    let _mock = server
        .mock("POST", SIS)
        .match_body(Matcher::PartialJson(json!({"sis_kontor_sorgula": {}})))
        .with_status(503)
        .create_async()
        .await;

    assert!(!connector.ping().await.expect("ping"));

    connector.disconnect().await.expect("disconnect");
    assert!(!connector.ping().await.expect("ping while disconnected"));
}

// ============================================================================
// Factory
// ============================================================================

#[tokio::test]
async fn test_factory() {
    let server = mockito::Server::new_async().await;
    let factory = DiaConnectorFactory;
    assert_eq!(factory.kind(), ConnectorKind::Dia);

    let connector = factory
        .create(Arc::new(config(&server)))
        .expect("connector");
    assert_eq!(connector.kind(), ConnectorKind::Dia);
    assert!(!connector.is_connected());

    let missing_key = ConnectionConfig::new()
        .with_host("acme")
        .with_credentials("ws_user", "secret");
    let err = factory.create(Arc::new(missing_key)).err().expect("missing api key");
    assert!(matches!(err, ErpError::Configuration(_)));
}

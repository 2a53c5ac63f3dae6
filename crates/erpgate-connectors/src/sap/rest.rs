//! OData/REST transport for SAP Gateway

use erpgate_core::{ConnectionConfig, ErpError, Params, ParamsExt, Result};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use url::Url;

use crate::http::{retry_after, snippet, transport_error};

/// Service probed on connect and used for the CSRF token fetch
pub const DEFAULT_ODATA_SERVICE: &str = "ZEI_INTEGRATION_SRV";

const ODATA_ROOT: &str = "/sap/opu/odata/sap";
const CATALOG_PATH: &str = "/sap/opu/odata/IWFND/CATALOGSERVICE;v=2/ServiceCollection";
const CSRF_HEADER: &str = "X-CSRF-Token";

/// Gateway base URL: `https` on port 443, `http` otherwise, with the port
/// left out for 80 and 443. `base_url` in the extra params overrides it.
pub fn base_url(config: &ConnectionConfig) -> Result<String> {
    let url = match config.param_str(&["base_url"]) {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => {
            let host = config.host.as_deref().ok_or_else(|| {
                ErpError::Configuration("SAP REST connection requires 'host'".to_string())
            })?;
            let scheme = if config.port == Some(443) { "https" } else { "http" };
            match config.port {
                Some(port) if port != 80 && port != 443 => {
                    format!("{}://{}:{}", scheme, host, port)
                }
                _ => format!("{}://{}", scheme, host),
            }
        }
    };

    Url::parse(&url)
        .map_err(|e| ErpError::Configuration(format!("invalid SAP base URL '{}': {}", url, e)))?;
    Ok(url)
}

pub(crate) struct ODataClient {
    http: Client,
    base_url: String,
    service: String,
    username: Option<String>,
    password: Option<String>,
    csrf_token: Option<String>,
}

impl ODataClient {
    pub(crate) fn new(config: &ConnectionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        let http = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ErpError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url(config)?,
            service: config
                .param_str(&["odata_service", "service"])
                .unwrap_or_else(|| DEFAULT_ODATA_SERVICE.to_string()),
            username: config.username.clone(),
            password: config.password.clone(),
            csrf_token: None,
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn default_service(&self) -> &str {
        &self.service
    }

    pub(crate) fn has_csrf_token(&self) -> bool {
        self.csrf_token.is_some()
    }

    fn service_url(&self, service: &str) -> String {
        format!("{}{}/{}", self.base_url, ODATA_ROOT, service)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut builder = self.http.request(method.clone(), url);
        if let Some(user) = &self.username {
            builder = builder.basic_auth(user, self.password.as_ref());
        }
        if method != Method::GET {
            if let Some(token) = &self.csrf_token {
                builder = builder.header(CSRF_HEADER, token);
            }
        }
        builder
    }

    async fn send(&self, context: &str, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(|e| transport_error(context, e))
    }

    /// Probe the default service and fetch a CSRF token for writes
    pub(crate) async fn connect(&mut self) -> Result<()> {
        let url = format!("{}/$metadata", self.service_url(&self.service));
        let response = self.send("SAP metadata probe", self.request(Method::GET, &url)).await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ErpError::Authentication(format!(
                    "SAP Gateway rejected credentials ({})",
                    response.status()
                )));
            }
            status => {
                return Err(ErpError::Connection(format!(
                    "SAP metadata probe returned {}",
                    status
                )));
            }
        }

        self.csrf_token = self.fetch_csrf_token().await;
        Ok(())
    }

    async fn fetch_csrf_token(&self) -> Option<String> {
        let url = format!("{}/", self.service_url(&self.service));
        let builder = self.request(Method::GET, &url).header(CSRF_HEADER, "Fetch");

        match self.send("SAP CSRF fetch", builder).await {
            Ok(response) => {
                let token = response
                    .headers()
                    .get(CSRF_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                if token.is_some() {
                    tracing::debug!("CSRF token obtained");
                }
                token
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch CSRF token");
                None
            }
        }
    }

    pub(crate) async fn ping(&self) -> bool {
        let url = format!("{}{}/", self.base_url, ODATA_ROOT);
        match self.request(Method::GET, &url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                tracing::debug!(error = %e, "SAP ping failed");
                false
            }
        }
    }

    pub(crate) async fn read_entity(&self, args: &Params) -> Result<Value> {
        let service = args.require_str("service")?;
        let entity_set = args.require_str("entity_set")?;
        let key = args.require_str("entity_key")?;

        let url = format!("{}/{}({})", self.service_url(service), entity_set, key);
        let mut query = Vec::new();
        push_list(&mut query, "$select", args.opt_str_list("select"));
        push_list(&mut query, "$expand", args.opt_str_list("expand"));

        let response = self
            .send("Read entity", self.request(Method::GET, &url).query(&query))
            .await?;
        let response = check_status("Read entity", response, &[StatusCode::OK]).await?;
        Ok(unwrap_d(json_body("Read entity", response).await?))
    }

    pub(crate) async fn read_collection(&self, args: &Params) -> Result<Value> {
        let service = args.require_str("service")?;
        let entity_set = args.require_str("entity_set")?;

        let url = format!("{}/{}", self.service_url(service), entity_set);
        let mut query = Vec::new();
        if let Some(filter) = args.opt_str("filter") {
            query.push(("$filter", filter.to_string()));
        }
        push_list(&mut query, "$select", args.opt_str_list("select"));
        if let Some(order_by) = args.opt_str("orderby") {
            query.push(("$orderby", order_by.to_string()));
        }
        if let Some(top) = args.opt_u64("top").filter(|n| *n > 0) {
            query.push(("$top", top.to_string()));
        }
        if let Some(skip) = args.opt_u64("skip").filter(|n| *n > 0) {
            query.push(("$skip", skip.to_string()));
        }

        let response = self
            .send("Read collection", self.request(Method::GET, &url).query(&query))
            .await?;
        let response = check_status("Read collection", response, &[StatusCode::OK]).await?;
        Ok(Value::Array(unwrap_collection(
            json_body("Read collection", response).await?,
        )))
    }

    pub(crate) async fn create_entity(&self, args: &Params) -> Result<Value> {
        let service = args.require_str("service")?;
        let entity_set = args.require_str("entity_set")?;
        let data = entity_data(args)?;

        let url = format!("{}/{}", self.service_url(service), entity_set);
        let response = self
            .send("Create entity", self.request(Method::POST, &url).json(data))
            .await?;
        let response = check_status(
            "Create entity",
            response,
            &[StatusCode::OK, StatusCode::CREATED],
        )
        .await?;
        Ok(unwrap_d(json_body("Create entity", response).await?))
    }

    pub(crate) async fn update_entity(&self, args: &Params) -> Result<Value> {
        let service = args.require_str("service")?;
        let entity_set = args.require_str("entity_set")?;
        let key = args.require_str("entity_key")?;
        let data = entity_data(args)?;

        let url = format!("{}/{}({})", self.service_url(service), entity_set, key);
        let response = self
            .send("Update entity", self.request(Method::PUT, &url).json(data))
            .await?;
        check_status(
            "Update entity",
            response,
            &[StatusCode::OK, StatusCode::NO_CONTENT],
        )
        .await?;
        Ok(json!({ "status": "updated" }))
    }

    pub(crate) async fn delete_entity(&self, args: &Params) -> Result<Value> {
        let service = args.require_str("service")?;
        let entity_set = args.require_str("entity_set")?;
        let key = args.require_str("entity_key")?;

        let url = format!("{}/{}({})", self.service_url(service), entity_set, key);
        let response = self
            .send("Delete entity", self.request(Method::DELETE, &url))
            .await?;
        check_status(
            "Delete entity",
            response,
            &[StatusCode::OK, StatusCode::NO_CONTENT],
        )
        .await?;
        Ok(json!({ "status": "deleted" }))
    }

    /// POST a function import with `name='value'` query parameters
    pub(crate) async fn call_function(
        &self,
        service: &str,
        function: &str,
        params: Option<&Params>,
    ) -> Result<Value> {
        let url = format!("{}/{}", self.service_url(service), function);
        let query: Vec<(&str, String)> = params
            .into_iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), quoted_literal(v)))
            .collect();

        let response = self
            .send(
                "Function call",
                self.request(Method::POST, &url).query(&query),
            )
            .await?;
        let response = check_status("Function call", response, &[StatusCode::OK]).await?;
        Ok(unwrap_d(json_body("Function call", response).await?))
    }

    /// Raw EDMX document of a service
    pub(crate) async fn service_metadata(&self, service: &str) -> Result<Value> {
        let url = format!("{}/$metadata", self.service_url(service));
        let builder = self
            .request(Method::GET, &url)
            .header(ACCEPT, "application/xml");
        let response = self.send("Metadata request", builder).await?;
        let response = check_status("Metadata request", response, &[StatusCode::OK]).await?;
        let metadata = response
            .text()
            .await
            .map_err(|e| transport_error("Metadata request", e))?;

        Ok(json!({ "service_name": service, "metadata": metadata }))
    }

    /// Services registered in the Gateway catalog
    pub(crate) async fn list_services(&self) -> Result<Value> {
        let url = format!("{}{}", self.base_url, CATALOG_PATH);
        let response = self
            .send("Service catalog", self.request(Method::GET, &url))
            .await?;
        let response = check_status("Service catalog", response, &[StatusCode::OK]).await?;
        let services = unwrap_collection(json_body("Service catalog", response).await?);

        let services: Vec<Value> = services
            .iter()
            .map(|service| {
                let technical = service
                    .get("TechnicalServiceName")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                json!({
                    "id": service.get("ID").cloned().unwrap_or(Value::Null),
                    "title": service.get("Title").cloned().unwrap_or(Value::Null),
                    "technical_service_name": technical,
                    "metadata_url": format!("{}/$metadata", self.service_url(technical)),
                })
            })
            .collect();

        Ok(Value::Array(services))
    }
}

async fn check_status(
    context: &str,
    response: Response,
    accepted: &[StatusCode],
) -> Result<Response> {
    let status = response.status();
    if accepted.contains(&status) {
        return Ok(response);
    }

    let retry = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ErpError::Authentication(format!("{} failed: {}", context, status))
        }
        StatusCode::TOO_MANY_REQUESTS => ErpError::RateLimited { retry_after: retry },
        _ => ErpError::Backend(format!("{} failed: {} {}", context, status, snippet(&body))),
    })
}

async fn json_body(context: &str, response: Response) -> Result<Value> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| transport_error(context, e))
}

fn entity_data(args: &Params) -> Result<&Value> {
    args.get("data")
        .filter(|v| v.is_object())
        .ok_or_else(|| ErpError::InvalidArgument("'data' object is required".to_string()))
}

fn push_list(query: &mut Vec<(&'static str, String)>, name: &'static str, items: Vec<String>) {
    if !items.is_empty() {
        query.push((name, items.join(",")));
    }
}

/// OData string literal; embedded quotes are doubled
fn quoted_literal(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("'{}'", raw.replace('\'', "''"))
}

/// Strip the OData v2 `{"d": ...}` envelope
fn unwrap_d(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("d") => {
            map.remove("d").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// `d.results` for collections; a bare entity becomes a one-element list
fn unwrap_collection(body: Value) -> Vec<Value> {
    match unwrap_d(body) {
        Value::Object(mut map) if map.contains_key("results") => match map.remove("results") {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        },
        Value::Array(items) => items,
        other => vec![other],
    }
}

//! ArcGIS REST feature layer client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::{FeatureLayer, SurveyError};
use crate::config::{Config, FieldNames};
use crate::models::{OutputKind, Request};

/// Requested token lifetime in minutes.
const TOKEN_EXPIRATION_MINUTES: u32 = 60;

/// Refresh tokens this close to expiry.
const TOKEN_REFRESH_MARGIN_MS: i64 = 60_000;

/// Features requested per query page.
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct Token {
    value: String,
    expires_ms: i64,
}

impl Token {
    fn is_fresh(&self) -> bool {
        self.expires_ms - Utc::now().timestamp_millis() > TOKEN_REFRESH_MARGIN_MS
    }
}

/// One page of a layer query.
#[derive(Debug, Default)]
pub struct QueryPage {
    pub requests: Vec<Request>,
    /// More features are available past this page.
    pub exceeded_transfer_limit: bool,
}

/// Survey layer served by ArcGIS Online or an Enterprise portal.
pub struct ArcGisLayer {
    client: Client,
    layer_url: Url,
    token_url: Option<Url>,
    credentials: Option<(String, String)>,
    fields: FieldNames,
    token: Mutex<Option<Token>>,
}

impl ArcGisLayer {
    /// Build a client for the survey layer described by the config.
    ///
    /// Without credentials the layer is accessed anonymously.
    pub fn from_config(config: &Config) -> Result<Self, SurveyError> {
        let layer_url = Url::parse(config.survey_path.trim_end_matches('/'))
            .map_err(|e| SurveyError::InvalidUrl(format!("{}: {}", config.survey_path, e)))?;

        let credentials = config
            .arcgis_credentials()
            .map(|(u, p)| (u.to_string(), p.to_string()));
        let token_url = match credentials {
            Some(_) => Some(
                Url::parse(&format!(
                    "{}/sharing/rest/generateToken",
                    config.portal_root()
                ))
                .map_err(|e| {
                    SurveyError::InvalidUrl(format!("{}: {}", config.portal_root(), e))
                })?,
            ),
            None => {
                warn!("No ArcGIS credentials configured; accessing survey layer anonymously");
                None
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            client,
            layer_url,
            token_url,
            credentials,
            fields: config.fields.clone(),
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}", self.layer_url.as_str().trim_end_matches('/'), operation)
    }

    /// Current token, signing in again when it is missing or about to expire.
    async fn token(&self) -> Result<Option<String>, SurveyError> {
        let (Some(token_url), Some((username, password))) = (&self.token_url, &self.credentials)
        else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(Some(token.value.clone()));
        }

        debug!("Requesting token from {}", token_url);
        let expiration = TOKEN_EXPIRATION_MINUTES.to_string();
        let response = self
            .client
            .post(token_url.clone())
            .form(&[
                ("username", username.as_str()),
                ("password", password.as_str()),
                ("client", "requestip"),
                ("expiration", expiration.as_str()),
                ("f", "json"),
            ])
            .send()
            .await?;
        let body = read_json(response).await?;
        let token = parse_token_response(&body)?;
        info!("Signed in to {}", token_url.origin().ascii_serialization());

        let value = token.value.clone();
        *cached = Some(token);
        Ok(Some(value))
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn query_page(&self, offset: usize) -> Result<QueryPage, SurveyError> {
        let where_clause = format!("{} IS NULL", self.fields.fulfilled_date);
        let offset_param = offset.to_string();
        let count_param = PAGE_SIZE.to_string();
        let mut params = vec![
            ("where", where_clause.as_str()),
            ("outFields", "*"),
            ("returnGeometry", "false"),
            ("resultOffset", offset_param.as_str()),
            ("resultRecordCount", count_param.as_str()),
            ("f", "json"),
        ];
        let token = self.token().await?;
        if let Some(ref token) = token {
            params.push(("token", token.as_str()));
        }

        let url = self.endpoint("query");
        debug!("Querying {} (offset {})", url, offset);
        let response = self.client.get(&url).query(&params).send().await?;
        let body = read_json(response).await?;
        parse_query_page(&body, &self.fields)
    }

    async fn query_all(&self) -> Result<Vec<Request>, SurveyError> {
        let mut requests = Vec::new();
        loop {
            let page = self.query_page(requests.len()).await?;
            let fetched = page.requests.len();
            requests.extend(page.requests);
            if !page.exceeded_transfer_limit || fetched == 0 {
                break;
            }
        }
        Ok(requests)
    }

    async fn apply_date(
        &self,
        global_id: &str,
        field: &str,
        value: DateTime<Utc>,
    ) -> Result<(), SurveyError> {
        let mut attributes = Map::new();
        attributes.insert(self.fields.global_id.clone(), json!(global_id));
        attributes.insert(field.to_string(), json!(value.timestamp_millis()));
        let updates = json!([{ "attributes": attributes }]).to_string();

        let mut form = vec![
            ("f", "json"),
            ("useGlobalIds", "true"),
            ("updates", updates.as_str()),
        ];
        let token = self.token().await?;
        if let Some(ref token) = token {
            form.push(("token", token.as_str()));
        }

        let response = self
            .client
            .post(self.endpoint("applyEdits"))
            .form(&form)
            .send()
            .await?;
        let body = read_json(response).await?;
        parse_edit_response(&body, global_id)
    }
}

#[async_trait]
impl FeatureLayer for ArcGisLayer {
    async fn query_unfulfilled(&self) -> Result<Vec<Request>, SurveyError> {
        match self.query_all().await {
            Err(e) if e.is_token_error() => {
                warn!("Token rejected ({}); signing in again", e);
                self.invalidate_token().await;
                self.query_all().await
            }
            other => other,
        }
    }

    async fn set_date(
        &self,
        global_id: &str,
        field: &str,
        value: DateTime<Utc>,
    ) -> Result<(), SurveyError> {
        match self.apply_date(global_id, field, value).await {
            Err(e) if e.is_token_error() => {
                warn!("Token rejected ({}); signing in again", e);
                self.invalidate_token().await;
                self.apply_date(global_id, field, value).await
            }
            other => other,
        }?;
        debug!("Set {} on {}", field, global_id);
        Ok(())
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, SurveyError> {
    let status = response.status();
    let url = response.url().to_string();
    if !status.is_success() {
        return Err(SurveyError::Status {
            status: status.as_u16(),
            url,
        });
    }
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| SurveyError::Decode(format!("{} ({})", e, url)))
}

/// ArcGIS reports most failures as `{"error": {...}}` with HTTP 200.
fn check_service_error(body: &Value) -> Result<(), SurveyError> {
    let Some(error) = body.get("error") else {
        return Ok(());
    };
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let mut message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let details: Vec<&str> = error
        .get("details")
        .and_then(Value::as_array)
        .map(|d| d.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !details.is_empty() {
        message = format!("{} ({})", message, details.join("; "));
    }
    Err(SurveyError::Service { code, message })
}

fn parse_token_response(body: &Value) -> Result<Token, SurveyError> {
    check_service_error(body).map_err(|e| SurveyError::Auth(e.to_string()))?;
    let value = body
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| SurveyError::Auth("response has no token".to_string()))?;
    let expires_ms = body
        .get("expires")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| {
            Utc::now().timestamp_millis() + i64::from(TOKEN_EXPIRATION_MINUTES) * 60_000
        });
    Ok(Token {
        value: value.to_string(),
        expires_ms,
    })
}

/// Decode a `query` response into requests.
pub fn parse_query_page(body: &Value, fields: &FieldNames) -> Result<QueryPage, SurveyError> {
    check_service_error(body)?;
    let features = body
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| SurveyError::Decode("query response has no features array".to_string()))?;

    let requests = features
        .iter()
        .filter_map(|feature| feature.get("attributes").and_then(Value::as_object))
        .map(|attributes| request_from_attributes(attributes, fields))
        .collect();

    Ok(QueryPage {
        requests,
        exceeded_transfer_limit: body
            .get("exceededTransferLimit")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Decode an `applyEdits` response for a single update.
pub fn parse_edit_response(body: &Value, global_id: &str) -> Result<(), SurveyError> {
    check_service_error(body)?;
    let result = body
        .get("updateResults")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .ok_or_else(|| SurveyError::Edit {
            global_id: global_id.to_string(),
            message: "no update result returned".to_string(),
        })?;

    if result.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let message = result
        .pointer("/error/description")
        .and_then(Value::as_str)
        .unwrap_or("update rejected")
        .to_string();
    Err(SurveyError::Edit {
        global_id: global_id.to_string(),
        message,
    })
}

/// Field lookup that ignores case, since services differ on `GlobalID` vs `globalid`.
fn attribute<'a>(attributes: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    if name.is_empty() {
        return None;
    }
    attributes.get(name).or_else(|| {
        attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

fn text_attribute(attributes: &Map<String, Value>, name: &str) -> String {
    match attribute(attributes, name) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Dates arrive as epoch milliseconds.
fn date_attribute(attributes: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
    let value = attribute(attributes, name)?;
    let millis = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))?;
    Utc.timestamp_millis_opt(millis).single()
}

fn request_from_attributes(attributes: &Map<String, Value>, fields: &FieldNames) -> Request {
    // Tracking fields are optional on the layer; only ones the feature
    // carries may be written back.
    let tracked_outputs = [OutputKind::AsBuilts, OutputKind::GisFiles]
        .into_iter()
        .filter(|kind| {
            fields
                .output_fulfilled(*kind)
                .is_some_and(|name| attribute(attributes, name).is_some())
        })
        .collect();

    Request {
        global_id: text_attribute(attributes, &fields.global_id),
        email: text_attribute(attributes, &fields.email),
        folder_name: text_attribute(attributes, &fields.folder),
        desired_output: text_attribute(attributes, &fields.desired_output),
        utilities: text_attribute(attributes, &fields.utilities),
        creation_date: date_attribute(attributes, &fields.creation_date),
        fulfilled_date: date_attribute(attributes, &fields.fulfilled_date),
        as_builts_fulfilled: date_attribute(attributes, &fields.as_builts_fulfilled),
        gis_files_fulfilled: date_attribute(attributes, &fields.gis_files_fulfilled),
        tracked_outputs,
    }
}

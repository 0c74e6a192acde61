//! Google Sheets v4 backend for the relay, authenticated as a service account.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hackalert_core::{SheetInfo, SheetSnapshot, SheetSource, SheetsConfig, SourceError};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const API_BASE: &str = "https://sheets.googleapis.com/v4";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

pub struct GoogleSheetsClient {
    http: Client,
    config: SheetsConfig,
    token_url: String,
    api_base: String,
    access_token: RwLock<Option<String>>,
}

impl GoogleSheetsClient {
    pub fn new(config: SheetsConfig) -> Result<Self, SourceError> {
        Self::with_endpoints(config, TOKEN_URL, API_BASE)
    }

    pub fn with_endpoints(
        config: SheetsConfig,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            config,
            token_url: token_url.into(),
            api_base: api_base.into(),
            access_token: RwLock::new(None),
        })
    }

    async fn bearer(&self) -> Result<String, SourceError> {
        self.access_token
            .read()
            .await
            .clone()
            .ok_or(SourceError::NotInitialized)
    }

    fn spreadsheet_url(&self, extra: &[&str]) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|err| SourceError::Transport(format!("invalid api base: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Transport("api base cannot carry a path".to_string()))?
            .pop_if_empty()
            .push("spreadsheets")
            .push(&self.config.sheet_id)
            .extend(extra);
        Ok(url)
    }
}

#[async_trait]
impl SheetSource for GoogleSheetsClient {
    async fn authenticate(&self) -> Result<(), SourceError> {
        let assertion = sign_assertion(&self.config, &self.token_url, Utc::now().timestamp())?;

        let response = self
            .http
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(SourceError::RateLimited);
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(decode)?;
        *self.access_token.write().await = Some(token.access_token);
        info!(
            account = %self.config.service_account_email,
            expires_in = token.expires_in,
            "spreadsheet access token acquired"
        );
        Ok(())
    }

    async fn load_info(&self) -> Result<SheetInfo, SourceError> {
        let url = self.spreadsheet_url(&[])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(self.bearer().await?)
            .query(&[("fields", "properties.title,sheets.properties")])
            .send()
            .await
            .map_err(transport)?;

        let metadata: SpreadsheetMetadata = check(response).await?.json().await.map_err(decode)?;
        first_sheet(metadata)
    }

    async fn load_cells(&self, sheet: &SheetInfo) -> Result<SheetSnapshot, SourceError> {
        let range = a1_range(&sheet.sheet_title);
        let url = self.spreadsheet_url(&["values", &range])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(self.bearer().await?)
            .query(&[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("dateTimeRenderOption", "SERIAL_NUMBER"),
            ])
            .send()
            .await
            .map_err(transport)?;

        let values: ValueRange = check(response).await?.json().await.map_err(decode)?;
        let snapshot = snapshot_from_values(values);
        debug!(rows = snapshot.row_count(), "loaded sheet cells");
        Ok(snapshot)
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

fn claims<'a>(config: &'a SheetsConfig, audience: &'a str, now: i64) -> Claims<'a> {
    Claims {
        iss: &config.service_account_email,
        scope: SCOPE,
        aud: audience,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    }
}

fn sign_assertion(config: &SheetsConfig, audience: &str, now: i64) -> Result<String, SourceError> {
    let key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())
        .map_err(|err| SourceError::Auth(format!("invalid private key: {err}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims(config, audience, now), &key)
        .map_err(|err| SourceError::Auth(format!("failed to sign assertion: {err}")))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    index: i64,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: usize,
    #[serde(default)]
    column_count: usize,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

fn first_sheet(metadata: SpreadsheetMetadata) -> Result<SheetInfo, SourceError> {
    let first = metadata
        .sheets
        .into_iter()
        .map(|entry| entry.properties)
        .min_by_key(|properties| properties.index)
        .ok_or(SourceError::NoSheets)?;

    Ok(SheetInfo {
        spreadsheet_title: metadata.properties.title,
        sheet_id: first.sheet_id,
        sheet_title: first.title,
        row_count: first.grid_properties.row_count,
        column_count: first.grid_properties.column_count,
    })
}

/// Whole-sheet A1 range; quotes in the title are doubled.
fn a1_range(sheet_title: &str) -> String {
    format!("'{}'", sheet_title.replace('\'', "''"))
}

fn snapshot_from_values(values: ValueRange) -> SheetSnapshot {
    SheetSnapshot::new(
        values
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect(),
    )
}

/// Text form of an unformatted cell value. Whole numbers print without a fraction.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(number) => match number.as_i64() {
            Some(whole) => whole.to_string(),
            None => number
                .as_f64()
                .map(|float| float.to_string())
                .unwrap_or_else(|| number.to_string()),
        },
        other => other.to_string(),
    }
}

async fn check(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), body))
}

fn status_error(status: u16, body: String) -> SourceError {
    match status {
        429 => SourceError::RateLimited,
        401 | 403 => SourceError::Unauthorized(body),
        _ => SourceError::Http { status, body },
    }
}

fn transport(err: reqwest::Error) -> SourceError {
    SourceError::Transport(err.to_string())
}

fn decode(err: reqwest::Error) -> SourceError {
    if err.is_decode() {
        SourceError::Decode(err.to_string())
    } else {
        transport(err)
    }
}

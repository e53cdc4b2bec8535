//! Google Sheets API v4 client
//!
//! Direct HTTP via reqwest. Authentication is a bearer access token taken
//! from the environment; obtaining and refreshing it is left to whoever
//! launches the process.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::{CellValue, ColumnKind, SheetData, SheetRow, SheetsApi, SheetsError, column_letter};
use crate::config::SheetsConfig;

/// Spreadsheet metadata, trimmed to what is used
#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    index: i64,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Google Sheets client bound to one spreadsheet
pub struct GoogleSheetsClient {
    base_url: Url,
    spreadsheet_id: String,
    token: String,
    http: Client,
}

impl GoogleSheetsClient {
    /// Create a client from configuration, reading the token from the environment
    pub fn from_config(config: &SheetsConfig) -> Result<Self, SheetsError> {
        debug!(spreadsheet_id = %config.spreadsheet_id, "GoogleSheetsClient::from_config: called");
        let token = std::env::var(&config.token_env).map_err(|_| SheetsError::MissingToken(config.token_env.clone()))?;
        Self::new(
            &config.base_url,
            &config.spreadsheet_id,
            token,
            Duration::from_millis(config.timeout_ms),
        )
    }

    pub fn new(base_url: &str, spreadsheet_id: &str, token: String, timeout: Duration) -> Result<Self, SheetsError> {
        let parsed = Url::parse(base_url).map_err(|e| SheetsError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(SheetsError::InvalidUrl(base_url.to_string()));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: parsed,
            spreadsheet_id: spreadsheet_id.to_string(),
            token,
            http,
        })
    }

    /// `{base}/spreadsheets/{id}` followed by `segments`, each percent-encoded
    /// as a single path segment
    fn url(&self, segments: &[&str]) -> Result<Url, SheetsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SheetsError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("spreadsheets")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "GoogleSheetsClient::request");
        self.http.request(method, url).bearer_auth(&self.token)
    }

    /// URL of a `values` call on `range` of sheet `title`, e.g. `values/'май 24'!A1:append`
    fn values_url(&self, title: &str, range: &str, suffix: &str) -> Result<Url, SheetsError> {
        let target = format!("{}{}", a1(title, range), suffix);
        self.url(&[self.spreadsheet_id.as_str(), "values", target.as_str()])
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SheetsError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(%status, "GoogleSheetsClient::send: API error");
            return Err(SheetsError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn sheets(&self) -> Result<Vec<SheetProperties>, SheetsError> {
        let request = self
            .request(Method::GET, self.url(&[self.spreadsheet_id.as_str()])?)
            .query(&[("fields", "sheets.properties(sheetId,title,index)")]);
        let spreadsheet: Spreadsheet = self.send(request).await?;
        Ok(spreadsheet.sheets.into_iter().map(|s| s.properties).collect())
    }
}

/// `'Title'!range` with quotes escaped
fn a1(title: &str, range: &str) -> String {
    format!("'{}'!{}", title.replace('\'', "''"), range)
}

/// Cell value as written with `USER_ENTERED`. Text that the spreadsheet would
/// read as a number gets a leading `'` so it is stored and shown verbatim.
fn entered_value(value: &CellValue) -> Value {
    match value {
        CellValue::Text(s) if looks_numeric(s) => Value::String(format!("'{}", s)),
        other => other.to_json(),
    }
}

fn looks_numeric(text: &str) -> bool {
    matches!(CellValue::parse(ColumnKind::Number, text), CellValue::Number(_))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetsApi for GoogleSheetsClient {
    async fn sheet_titles(&self) -> Result<Vec<String>, SheetsError> {
        Ok(self.sheets().await?.into_iter().map(|p| p.title).collect())
    }

    async fn duplicate_sheet(&self, source: &str, title: &str) -> Result<(), SheetsError> {
        let sheets = self.sheets().await?;
        let source_sheet = sheets
            .iter()
            .find(|p| p.title == source)
            .ok_or_else(|| SheetsError::SheetMissing(source.to_string()))?;

        let body = json!({
            "requests": [{
                "duplicateSheet": {
                    "sourceSheetId": source_sheet.sheet_id,
                    "insertSheetIndex": source_sheet.index,
                    "newSheetName": title,
                }
            }]
        });
        let url = self.url(&[format!("{}:batchUpdate", self.spreadsheet_id).as_str()])?;
        let _: Value = self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn clear_sheet(&self, title: &str) -> Result<(), SheetsError> {
        let url = self.values_url(title, "A2:ZZ", ":clear")?;
        let _: Value = self.send(self.request(Method::POST, url).json(&json!({}))).await?;
        Ok(())
    }

    async fn load_rows(&self, title: &str) -> Result<SheetData, SheetsError> {
        let request = self
            .request(Method::GET, self.values_url(title, "A1:ZZ", "")?)
            .query(&[("valueRenderOption", "FORMATTED_VALUE")]);
        let value_range: ValueRange = self.send(request).await?;

        let mut rows = value_range.values.into_iter();
        let header = rows
            .next()
            .map(|cells| cells.iter().map(cell_text).collect())
            .unwrap_or_default();
        let rows = rows
            .enumerate()
            .map(|(i, cells)| SheetRow {
                number: i + 2,
                cells: cells.iter().map(cell_text).collect(),
            })
            .collect();
        Ok(SheetData { header, rows })
    }

    async fn append_rows(&self, title: &str, rows: Vec<Vec<CellValue>>) -> Result<(), SheetsError> {
        if rows.is_empty() {
            return Ok(());
        }
        let values: Vec<Vec<Value>> = rows
            .iter()
            .map(|row| row.iter().map(entered_value).collect())
            .collect();
        let request = self
            .request(Method::POST, self.values_url(title, "A1", ":append")?)
            .query(&[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": values }));
        let _: Value = self.send(request).await?;
        Ok(())
    }

    async fn update_cells(
        &self,
        title: &str,
        row_number: usize,
        cells: Vec<(usize, CellValue)>,
    ) -> Result<(), SheetsError> {
        if cells.is_empty() {
            return Ok(());
        }
        let data: Vec<Value> = cells
            .iter()
            .map(|(index, value)| {
                json!({
                    "range": a1(title, &format!("{}{}", column_letter(*index), row_number)),
                    "values": [[entered_value(value)]],
                })
            })
            .collect();
        let body = json!({ "valueInputOption": "USER_ENTERED", "data": data });
        let url = self.url(&[self.spreadsheet_id.as_str(), "values:batchUpdate"])?;
        let _: Value = self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }
}

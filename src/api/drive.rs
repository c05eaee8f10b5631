//! Implements the `Drive` trait with the Google Drive v3 and Sheets v4 REST APIs.

use crate::api::{Drive, DriveError, DriveFile, HttpPolicy, TokenProvider, SPREADSHEET_MIME_TYPE};
use crate::Result;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{trace, warn};
use url::Url;

const DRIVE_FILES: &str = "https://www.googleapis.com/drive/v3/files";
const SHEETS: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const PAGE_SIZE: &str = "100";
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Talks to Google with a service account token. Each request has a timeout and transient
/// failures are retried with exponential backoff.
#[derive(Debug)]
pub(crate) struct GoogleDrive {
    token_provider: TokenProvider,
    client: reqwest::Client,
    policy: HttpPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata {
    id: String,
    mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl GoogleDrive {
    pub(crate) fn new(token_provider: TokenProvider, policy: HttpPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(policy.timeout)
            .build()
            .context("Unable to create the HTTP client")?;
        Ok(Self {
            token_provider,
            client,
            policy,
        })
    }

    /// GETs `url` and decodes the JSON body, retrying transient failures.
    async fn get_json<T: DeserializeOwned>(&self, url: &Url, what: &str) -> Result<T, DriveError> {
        with_retries(self.policy.max_retries, backoff, what, || {
            self.try_get_json(url, what)
        })
        .await
    }

    async fn try_get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        what: &str,
    ) -> Result<T, DriveError> {
        trace!("GET {url}");
        let token = self.token_provider.token().await?;
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(DriveError::Transport)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(DriveError::Transport)?;
        if !(200..300).contains(&status) {
            return Err(classify(status, what, body));
        }
        serde_json::from_str(&body).map_err(|e| DriveError::Decode(format!("{what}: {e}")))
    }
}

#[async_trait::async_trait]
impl Drive for GoogleDrive {
    async fn list_spreadsheets(&mut self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        let folder: FileMetadata = self
            .get_json(&folder_url(folder_id)?, &format!("folder {folder_id}"))
            .await?;
        if folder.mime_type != FOLDER_MIME_TYPE {
            return Err(DriveError::NotFound(format!(
                "{} is not a folder",
                folder.id
            )));
        }

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = list_url(folder_id, page_token.as_deref())?;
            let page: FileList = self
                .get_json(&url, &format!("the files of folder {folder_id}"))
                .await?;
            files.extend(page.files.into_iter().map(|f| DriveFile::new(f.id, f.name)));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(files)
    }

    async fn sheet_names(&mut self, spreadsheet_id: &str) -> Result<Vec<String>, DriveError> {
        let spreadsheet: Spreadsheet = self
            .get_json(
                &spreadsheet_url(spreadsheet_id)?,
                &format!("spreadsheet {spreadsheet_id}"),
            )
            .await?;
        Ok(spreadsheet
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    async fn values(
        &mut self,
        spreadsheet_id: &str,
        tab: &str,
    ) -> Result<Vec<Vec<String>>, DriveError> {
        let range: ValueRange = self
            .get_json(
                &values_url(spreadsheet_id, tab)?,
                &format!("tab '{tab}' of spreadsheet {spreadsheet_id}"),
            )
            .await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

/// `FORMATTED_VALUE` cells are strings; anything else is rendered as JSON.
fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Runs `op` until it succeeds, fails with a permanent error, or has been retried `max_retries`
/// times. Waits `delay(attempt)` before each retry.
async fn with_retries<T, F, Fut>(
    max_retries: u32,
    delay: impl Fn(u32) -> Duration,
    what: &str,
    mut op: F,
) -> Result<T, DriveError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DriveError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let wait = delay(attempt);
                warn!(
                    "Fetching {what} failed ({e}), retry {} of {max_retries} in {wait:?}",
                    attempt + 1
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    INITIAL_BACKOFF
        .checked_mul(2u32.saturating_pow(attempt))
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

fn classify(status: u16, what: &str, body: String) -> DriveError {
    match status {
        429 => DriveError::RateLimited { status },
        403 if body.contains("rateLimitExceeded") || body.contains("userRateLimitExceeded") => {
            DriveError::RateLimited { status }
        }
        401 | 403 => DriveError::Auth(format!("access to {what} was denied (HTTP {status})")),
        404 => DriveError::NotFound(what.to_string()),
        500..=599 => DriveError::Server { status, body },
        _ => DriveError::Api { status, body },
    }
}

fn parse(base: &str) -> Result<Url, DriveError> {
    Url::parse(base).map_err(|e| DriveError::Decode(format!("invalid URL '{base}': {e}")))
}

fn with_segments(mut url: Url, segments: &[&str]) -> Result<Url, DriveError> {
    let base = url.to_string();
    url.path_segments_mut()
        .map_err(|_| DriveError::Decode(format!("'{base}' cannot have path segments")))?
        .extend(segments);
    Ok(url)
}

fn folder_url(folder_id: &str) -> Result<Url, DriveError> {
    let mut url = with_segments(parse(DRIVE_FILES)?, &[folder_id])?;
    url.query_pairs_mut()
        .append_pair("fields", "id,mimeType")
        .append_pair("supportsAllDrives", "true");
    Ok(url)
}

fn list_url(folder_id: &str, page_token: Option<&str>) -> Result<Url, DriveError> {
    let mut url = parse(DRIVE_FILES)?;
    let query = format!(
        "'{}' in parents and mimeType='{SPREADSHEET_MIME_TYPE}' and trashed=false",
        folder_id.replace('\'', "\\'")
    );
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("q", &query)
            .append_pair("fields", "nextPageToken,files(id,name)")
            .append_pair("pageSize", PAGE_SIZE)
            .append_pair("orderBy", "name")
            .append_pair("includeItemsFromAllDrives", "true")
            .append_pair("supportsAllDrives", "true");
        if let Some(token) = page_token {
            pairs.append_pair("pageToken", token);
        }
    }
    Ok(url)
}

fn spreadsheet_url(spreadsheet_id: &str) -> Result<Url, DriveError> {
    let mut url = with_segments(parse(SHEETS)?, &[spreadsheet_id])?;
    url.query_pairs_mut()
        .append_pair("fields", "sheets.properties.title");
    Ok(url)
}

fn values_url(spreadsheet_id: &str, tab: &str) -> Result<Url, DriveError> {
    let range = format!("'{}'!A:ZZ", tab.replace('\'', "''"));
    let mut url = with_segments(parse(SHEETS)?, &[spreadsheet_id, "values", &range])?;
    url.query_pairs_mut()
        .append_pair("valueRenderOption", "FORMATTED_VALUE")
        .append_pair("majorDimension", "ROWS");
    Ok(url)
}

use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::error::StoreError;

/// Matches PostgREST's default `max_rows`; a larger page would be cut short
/// by the server and read as the last one.
pub const PAGE_SIZE: usize = 1000;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            api_key: config.store_api_key().to_string(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        let apikey = HeaderValue::from_str(&self.anon_key)
            .map_err(|_| StoreError::Auth("Anon key is not a valid header value".to_string()))?;
        headers.insert("apikey", apikey);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let token = auth_token.unwrap_or(&self.api_key);
        if !token.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| StoreError::Auth("Token is not a valid header value".to_string()))?;
            headers.insert(AUTHORIZATION, bearer);
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, StoreError>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> Result<T, StoreError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("API error ({}): {}", status, text);
            return Err(StoreError::from_status(status.as_u16(), text));
        }

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };
        Ok(serde_json::from_value(value)?)
    }

    /// Write helper asking PostgREST to echo the affected rows.
    pub async fn write_returning<T>(&self, method: Method, path: &str, body: Option<Value>)
                                    -> Result<Vec<T>, StoreError>
    where T: DeserializeOwned {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(method, path, None, body, Some(headers)).await
    }

    /// Reads every row behind `path`, one `limit`/`offset` page at a time,
    /// until a short page comes back. `path` must carry a stable `order`.
    pub async fn select_all<T>(&self, path: &str, page_size: usize) -> Result<Vec<T>, StoreError>
    where T: DeserializeOwned {
        let page_size = page_size.max(1);
        let mut rows = Vec::new();

        loop {
            let page_path = format!("{}&limit={}&offset={}", path, page_size, rows.len());
            let page: Vec<T> = self.request(Method::GET, &page_path, None, None).await?;
            let fetched = page.len();
            rows.extend(page);

            if fetched < page_size {
                break;
            }
            debug!("Fetched {} rows from {}, reading next page", rows.len(), path);
        }

        Ok(rows)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }
}

/// `/rest/v1/{table}?{filters}` with the tenant filter always first.
pub fn rest_path(table: &str, tenant: &str, filters: &[String]) -> String {
    let mut parts = vec![format!("tenant_id=eq.{}", urlencode(tenant))];
    parts.extend(filters.iter().cloned());
    format!("/rest/v1/{}?{}", table, parts.join("&"))
}

pub fn urlencode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

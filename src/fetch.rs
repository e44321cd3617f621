// src/fetch.rs

use crate::error::SurveyError;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Raw body of one fetch plus whatever hints where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub body: String,
    /// Path or file name used for extension-based format detection.
    pub name_hint: Option<String>,
}

/// Something that can produce the current survey export.
#[async_trait]
pub trait Source: Send + Sync {
    async fn fetch(&self) -> Result<Fetched, SurveyError>;

    /// Label used in logs.
    fn describe(&self) -> String;
}

/// Plain HTTP GET against a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    url: Url,
}

impl HttpSource {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn fetch(&self) -> Result<Fetched, SurveyError> {
        debug!(url = %self.url, "fetching survey export");
        let resp = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| SurveyError::fetch(self.url.as_str(), e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SurveyError::fetch(
                self.url.as_str(),
                format!("HTTP error: {}", status),
            ));
        }

        // follow redirects for the extension hint
        let name_hint = Some(resp.url().path().to_string());
        let body = resp
            .text()
            .await
            .map_err(|e| SurveyError::fetch(self.url.as_str(), e))?;
        debug!(url = %self.url, bytes = body.len(), "fetched survey export");

        Ok(Fetched { body, name_hint })
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

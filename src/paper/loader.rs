use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DocumentError;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const CONNECT_ATTEMPTS: u32 = 3;

/// Where the paper text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PaperSource {
    Url(String),
    Path(PathBuf),
}

impl fmt::Display for PaperSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperSource::Url(url) => write!(f, "{}", url),
            PaperSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Document text extraction collaborator.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, source: &PaperSource) -> Result<String, DocumentError>;
}

pub struct HttpDocumentLoader {
    client: reqwest::Client,
}

impl HttpDocumentLoader {
    pub fn new() -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/pdf,text/html,application/xhtml+xml,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(45))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create document HTTP client")?;
        Ok(Self { client })
    }

    async fn send_with_retry(&self, url: &str) -> Result<reqwest::Response, DocumentError> {
        let mut attempt = 0;
        loop {
            match self.client.get(url).send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt + 1 < CONNECT_ATTEMPTS => {
                    let backoff = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(url, attempt, error = %e, "document fetch failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(DocumentError::Network(e.to_string())),
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, DocumentError> {
        let resp = self.send_with_retry(url).await?;
        if resp.url().as_str().contains("unsupported_browser") {
            return Err(DocumentError::Blocked);
        }
        let status = resp.status().as_u16();
        if status == 403 {
            return Err(DocumentError::Forbidden);
        }
        if !resp.status().is_success() {
            return Err(DocumentError::Http { status });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let body = resp
            .bytes()
            .await
            .map_err(|e| DocumentError::Network(e.to_string()))?;

        debug!(url, content_type, size = body.len(), "document fetched");
        decode(&content_type, body.to_vec()).await
    }

    async fn read_path(&self, path: &Path) -> Result<String, DocumentError> {
        let bytes = tokio::fs::read(path).await?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let content_type = match ext.as_str() {
            "pdf" => "application/pdf",
            "html" | "htm" => "text/html",
            "txt" | "md" | "text" => "text/plain",
            other => return Err(DocumentError::UnsupportedFormat(format!(".{}", other))),
        };
        decode(content_type, bytes).await
    }
}

#[async_trait]
impl DocumentLoader for HttpDocumentLoader {
    async fn load(&self, source: &PaperSource) -> Result<String, DocumentError> {
        let text = match source {
            PaperSource::Url(url) => self.fetch(url).await?,
            PaperSource::Path(path) => self.read_path(path).await?,
        };
        info!(source = %source, chars = text.len(), "paper loaded");
        Ok(text)
    }
}

/// Turn a fetched body into plain text according to its content type.
pub(crate) async fn decode(content_type: &str, body: Vec<u8>) -> Result<String, DocumentError> {
    let text = if content_type.contains("pdf") || body.starts_with(b"%PDF") {
        tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&body).map_err(|e| DocumentError::Pdf(e.to_string()))
        })
        .await
        .map_err(|e| DocumentError::Pdf(e.to_string()))??
    } else if content_type.contains("html") {
        html2text::from_read(&body[..], 120)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string())
    } else if content_type.starts_with("text/") || content_type.is_empty() {
        String::from_utf8_lossy(&body).to_string()
    } else {
        return Err(DocumentError::UnsupportedFormat(content_type.to_string()));
    };

    if text.trim().is_empty() {
        return Err(DocumentError::Empty);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_decode_plain_text() {
        let text = decode("text/plain; charset=utf-8", b"Abstract\nhello".to_vec())
            .await
            .unwrap();
        assert_eq!(text, "Abstract\nhello");
    }

    #[tokio::test]
    async fn test_decode_html_strips_markup() {
        let html = b"<html><body><h1>Abstract</h1><p>We study routing.</p></body></html>".to_vec();
        let text = decode("text/html", html).await.unwrap();
        assert!(text.contains("Abstract"));
        assert!(text.contains("We study routing."));
        assert!(!text.contains("<p>"));
    }

    #[tokio::test]
    async fn test_decode_rejects_unknown_and_empty() {
        let err = decode("application/zip", b"PK..".to_vec()).await.unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat(_)));

        let err = decode("text/plain", b"   \n".to_vec()).await.unwrap_err();
        assert!(matches!(err, DocumentError::Empty));
    }

    #[tokio::test]
    async fn test_load_text_file() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "Abstract\nSparse routing.").unwrap();
        let loader = HttpDocumentLoader::new().unwrap();
        let text = loader
            .load(&PaperSource::Path(file.path().to_path_buf()))
            .await
            .unwrap();
        assert!(text.starts_with("Abstract"));
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        let loader = HttpDocumentLoader::new().unwrap();
        let err = loader
            .load(&PaperSource::Path(file.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_source_serde_shape() {
        let source = PaperSource::Url("https://arxiv.org/pdf/1706.03762".into());
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["kind"], "url");
        let back: PaperSource = serde_json::from_value(json).unwrap();
        assert_eq!(back, source);
    }
}

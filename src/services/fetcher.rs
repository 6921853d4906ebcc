use crate::error::{PrototypeError, Result};
use crate::types::{SourceMetadata, SourceType};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};
use url::Url;

pub const PROJECT_MARKUP_FILE: &str = "index.html";

pub struct ContentFetcher;

impl ContentFetcher {
    /// Resolves a project directory, markup file or URL to its text.
    pub async fn fetch_content(source: &str) -> Result<(String, SourceMetadata)> {
        if Self::is_url(source) {
            Self::fetch_from_url(source).await
        } else if Path::new(source).is_dir() {
            Self::fetch_from_project_dir(source).await
        } else {
            Self::fetch_from_file(source).await
        }
    }

    pub async fn fetch_multiple(sources: &[String]) -> Result<Vec<(String, SourceMetadata)>> {
        let mut results = Vec::new();

        for source in sources {
            match Self::fetch_content(source).await {
                Ok(content) => {
                    info!("Successfully fetched content from: {}", source);
                    results.push(content);
                }
                Err(e) => {
                    warn!("Failed to fetch content from {}: {}", source, e);
                    return Err(e);
                }
            }
        }

        Ok(results)
    }

    async fn fetch_from_url(url: &str) -> Result<(String, SourceMetadata)> {
        info!("Fetching content from URL: {}", url);

        let parsed_url = Url::parse(url)?;
        let response = reqwest::get(parsed_url.clone()).await?;

        if !response.status().is_success() {
            return Err(PrototypeError::HttpStatus {
                status: response.status().as_u16(),
            });
        }

        let content = response.text().await?;
        let metadata = SourceMetadata {
            filename: Self::extract_filename_from_url(&parsed_url),
            source_type: SourceType::Url,
            created_at: chrono::Utc::now().to_rfc3339(),
            total_lines: content.lines().count(),
            asset_root: None,
        };

        Ok((content, metadata))
    }

    async fn fetch_from_project_dir(dir: &str) -> Result<(String, SourceMetadata)> {
        let root = Path::new(dir);
        let markup = root.join(PROJECT_MARKUP_FILE);
        info!("Reading project: {}", root.display());

        if !markup.is_file() {
            return Err(PrototypeError::FileNotFound {
                path: markup.display().to_string(),
            });
        }

        let content = fs::read_to_string(&markup).await?;
        let metadata = SourceMetadata {
            filename: PROJECT_MARKUP_FILE.to_string(),
            source_type: SourceType::ProjectDir,
            created_at: chrono::Utc::now().to_rfc3339(),
            total_lines: content.lines().count(),
            asset_root: Some(root.to_path_buf()),
        };

        Ok((content, metadata))
    }

    async fn fetch_from_file(file_path: &str) -> Result<(String, SourceMetadata)> {
        info!("Reading file: {}", file_path);

        let path = Path::new(file_path);

        if !path.exists() {
            return Err(PrototypeError::FileNotFound {
                path: file_path.to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let metadata = SourceMetadata {
            filename,
            source_type: SourceType::LocalFile,
            created_at: chrono::Utc::now().to_rfc3339(),
            total_lines: content.lines().count(),
            asset_root: path.parent().map(|p| {
                if p.as_os_str().is_empty() {
                    Path::new(".").to_path_buf()
                } else {
                    p.to_path_buf()
                }
            }),
        };

        Ok((content, metadata))
    }

    /// Downloads raw bytes, returning the response content type if any.
    pub async fn download_binary(url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let parsed_url = Url::parse(url)?;
        let response = reqwest::get(parsed_url).await?;

        if !response.status().is_success() {
            return Err(PrototypeError::HttpStatus {
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        Ok((bytes.to_vec(), content_type))
    }

    pub fn is_url(source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }

    pub fn extract_filename_from_url(url: &Url) -> String {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|name| if name.is_empty() { None } else { Some(name) })
            .unwrap_or("downloaded.html")
            .to_string()
    }

    pub async fn validate_sources(sources: &[String]) -> Result<Vec<String>> {
        let mut validated = Vec::new();

        for source in sources {
            if Self::is_url(source) {
                Url::parse(source)?;
                validated.push(source.clone());
            } else {
                let path = Path::new(source);
                let exists = if path.is_dir() {
                    path.join(PROJECT_MARKUP_FILE).is_file()
                } else {
                    path.is_file()
                };
                if !exists {
                    return Err(PrototypeError::FileNotFound {
                        path: source.clone(),
                    });
                }
                validated.push(source.clone());
            }
        }

        Ok(validated)
    }
}

/// GitHub REST API 客户端
///
/// 封装所有与 GitHub API 相关的调用逻辑，响应可缓存到磁盘
use crate::config::Config;
use crate::error::ApiError;
use crate::models::RepoRef;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 仓库基本信息
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    pub full_name: String,
    pub html_url: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub private: bool,
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitEntry {
    pub sha: String,
    pub commit: CommitDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub message: String,
}

impl CommitEntry {
    pub fn message(&self) -> &str {
        &self.commit.message
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueEntry {
    pub number: u64,
    pub title: String,
    /// issues 接口也会返回 PR，PR 带有这个字段
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl IssueEntry {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEntry {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub merged_at: Option<String>,
}

impl PullRequestEntry {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

/// GitHub 客户端
///
/// 内部的 `reqwest::Client` 自带连接池，可在所有学生之间共享。
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    cache_dir: Option<PathBuf>,
}

impl GithubClient {
    /// 创建新的 GitHub 客户端
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        if let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {}", config.github_token)) {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("autochecker/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|source| ApiError::RequestFailed {
                endpoint: config.github_api_base_url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: config.github_api_base_url.trim_end_matches('/').to_string(),
            cache_dir: config.cache_dir.as_ref().map(PathBuf::from),
        })
    }

    fn repo_url(&self, repo: &RepoRef, endpoint: &str) -> String {
        let base = format!("{}/repos/{}/{}", self.base_url, repo.owner, repo.name);
        if endpoint.is_empty() {
            base
        } else {
            format!("{}/{}", base, endpoint)
        }
    }

    /// 仓库基本信息，不走缓存；仓库不存在时返回 None
    pub async fn repo_info(&self, repo: &RepoRef) -> Result<Option<RepoInfo>, ApiError> {
        self.get_json(&self.repo_url(repo, ""), false).await
    }

    /// 某个分支上最近的提交（最多 100 条）
    pub async fn commits(&self, repo: &RepoRef, branch: &str) -> Result<Vec<CommitEntry>, ApiError> {
        let url = self.repo_url(repo, &format!("commits?sha={}&per_page=100", branch));
        Ok(self.get_json(&url, true).await?.unwrap_or_default())
    }

    /// 所有 issue（包括已关闭的），其中可能混有 PR
    pub async fn issues(&self, repo: &RepoRef) -> Result<Vec<IssueEntry>, ApiError> {
        let url = self.repo_url(repo, "issues?state=all&per_page=100");
        Ok(self.get_json(&url, true).await?.unwrap_or_default())
    }

    pub async fn pull_requests(&self, repo: &RepoRef) -> Result<Vec<PullRequestEntry>, ApiError> {
        let url = self.repo_url(repo, "pulls?state=all&per_page=100");
        Ok(self.get_json(&url, true).await?.unwrap_or_default())
    }

    /// 下载默认分支的 zipball，仓库不存在时返回 None
    pub async fn download_zipball(&self, repo: &RepoRef) -> Result<Option<Vec<u8>>, ApiError> {
        let url = self.repo_url(repo, "zipball");
        debug!("🚚 下载压缩包: {}", url);

        let response = self.send(&url).await?;
        let Some(response) = response else {
            return Ok(None);
        };
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApiError::RequestFailed { endpoint: url, source })?;
        Ok(Some(bytes.to_vec()))
    }

    /// 发送 GET 请求，404 返回 None，其余错误状态转换为 `ApiError`
    async fn send(&self, url: &str) -> Result<Option<reqwest::Response>, ApiError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ApiError::RequestFailed {
                endpoint: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("❌ 资源不存在: {}", url);
            return Ok(None);
        }
        if is_rate_limited(&response) {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            warn!("⚠️ GitHub API 触发频率限制: {}", url);
            return Err(ApiError::RateLimited {
                endpoint: url.to_string(),
                retry_after,
            });
        }
        if !status.is_success() {
            return Err(ApiError::BadResponse {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Some(response))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, use_cache: bool) -> Result<Option<T>, ApiError> {
        let cache_file = if use_cache { self.cache_file(url) } else { None };

        if let Some(path) = &cache_file {
            if let Some(cached) = read_cache(path, url).await {
                return Ok(Some(cached));
            }
        }

        let Some(response) = self.send(url).await? else {
            return Ok(None);
        };
        let body = response.text().await.map_err(|source| ApiError::RequestFailed {
            endpoint: url.to_string(),
            source,
        })?;
        let data = serde_json::from_str(&body).map_err(|source| ApiError::JsonParseFailed {
            endpoint: url.to_string(),
            source,
        })?;

        if let Some(path) = &cache_file {
            write_cache(path, &body).await;
        }
        Ok(Some(data))
    }

    fn cache_file(&self, url: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(cache_key(url)))
    }
}

fn is_rate_limited(response: &reqwest::Response) -> bool {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && response
            .headers()
            .get("x-ratelimit-remaining")
            .is_some_and(|v| v.as_bytes() == b"0")
}

/// 缓存文件名：URL 的 SHA-256
pub fn cache_key(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}

async fn read_cache<T: DeserializeOwned>(path: &Path, url: &str) -> Option<T> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&content) {
        Ok(data) => {
            debug!("CACHE HIT: {}", url);
            Some(data)
        }
        Err(e) => {
            warn!("缓存文件损坏，重新请求 {}: {}", url, e);
            None
        }
    }
}

async fn write_cache(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!("无法创建缓存目录 {}: {}", parent.display(), e);
            return;
        }
    }
    if let Err(e) = tokio::fs::write(path, body).await {
        warn!("无法写入缓存 {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_cache(cache_dir: &Path) -> GithubClient {
        let config = Config {
            github_token: "test-token".into(),
            // 不可达的地址，确保测试只会命中缓存
            github_api_base_url: "http://127.0.0.1:9/".into(),
            cache_dir: Some(cache_dir.display().to_string()),
            ..Config::default()
        };
        GithubClient::new(&config).unwrap()
    }

    #[test]
    fn cache_key_is_stable_hex_digest() {
        let key = cache_key("https://api.github.com/repos/a/b/issues?state=all&per_page=100");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, cache_key("https://api.github.com/repos/a/b/issues?state=all&per_page=100"));
        assert_ne!(key, cache_key("https://api.github.com/repos/a/c/issues?state=all&per_page=100"));
    }

    #[tokio::test]
    async fn cached_endpoints_are_served_from_disk() {
        let cache = tempfile::tempdir().unwrap();
        let client = client_with_cache(cache.path());
        let repo = RepoRef {
            owner: "alice".into(),
            name: "lab".into(),
        };

        let url = client.repo_url(&repo, "issues?state=all&per_page=100");
        assert_eq!(url, "http://127.0.0.1:9/repos/alice/lab/issues?state=all&per_page=100");
        let body = r#"[
            {"number": 1, "title": "[Task] one"},
            {"number": 2, "title": "Add feature", "pull_request": {"url": "x"}}
        ]"#;
        std::fs::write(cache.path().join(cache_key(&url)), body).unwrap();

        let issues = client.issues(&repo).await.unwrap();
        assert_eq!(issues.len(), 2);
        assert!(!issues[0].is_pull_request());
        assert!(issues[1].is_pull_request());
    }

    #[test]
    fn commit_entry_exposes_message() {
        let entry: CommitEntry =
            serde_json::from_str(r#"{"sha": "abc", "commit": {"message": "feat: init"}}"#).unwrap();
        assert_eq!(entry.message(), "feat: init");
    }
}

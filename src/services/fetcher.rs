//! 源码拉取服务 - 业务能力层
//!
//! 只负责"把一个学生的仓库放进工作目录"，不关心评测流程

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::clients::GithubClient;
use crate::error::FetchError;
use crate::infrastructure::{extract_zipball, RepoSnapshot, WorkArea};
use crate::models::WorkItem;

/// 源码拉取能力
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// 把 `item` 对应的仓库快照放进 `area`
    async fn fetch(&self, item: &WorkItem, area: &mut WorkArea) -> Result<RepoSnapshot, FetchError>;
}

/// 从 GitHub 下载 zipball 的拉取实现
pub struct GithubFetcher {
    client: Arc<GithubClient>,
    max_archive_bytes: u64,
}

impl GithubFetcher {
    pub fn new(client: Arc<GithubClient>, max_archive_bytes: u64) -> Self {
        Self {
            client,
            max_archive_bytes,
        }
    }
}

#[async_trait]
impl SourceFetcher for GithubFetcher {
    async fn fetch(&self, item: &WorkItem, area: &mut WorkArea) -> Result<RepoSnapshot, FetchError> {
        let repo = &item.repo;

        let info = self
            .client
            .repo_info(repo)
            .await?
            .ok_or_else(|| FetchError::NotFound {
                repo: repo.full_name(),
            })?;
        if info.private {
            return Err(FetchError::Private {
                repo: repo.full_name(),
            });
        }

        let bytes = self
            .client
            .download_zipball(repo)
            .await?
            .ok_or_else(|| FetchError::NotFound {
                repo: repo.full_name(),
            })?;
        debug!("压缩包大小: {} 字节 ({})", bytes.len(), repo);

        // 解压是阻塞的文件 IO，放到阻塞线程池。
        // 本 future 被丢弃（超时）时阻塞任务不会停止，由 guard 通知它自行停止并清理目录
        let dest = area.path().to_path_buf();
        let limit = self.max_archive_bytes;
        let guard = CancelOnDrop::new();
        let cancelled = guard.flag();
        let source_root = tokio::task::spawn_blocking(move || extract_zipball(&bytes, &dest, limit, &cancelled))
            .await
            .map_err(|e| FetchError::TaskAborted(e.to_string()))??;
        guard.disarm();

        Ok(RepoSnapshot {
            html_url: info.html_url,
            default_branch: info.default_branch,
            source_root,
        })
    }
}

/// 被丢弃时置位取消标志，除非已经 `disarm`
struct CancelOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            armed: true,
        }
    }

    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

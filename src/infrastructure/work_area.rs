//! 工作目录 - 基础设施层
//!
//! 每个学生独占一个工作目录，目录随 `WorkArea` 的 Drop 删除，
//! 因此成功、失败、超时取消三种退出路径都会释放。

use crate::models::{RepoRef, StudentIdentity};
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;

/// 拉取完成后的仓库快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSnapshot {
    pub html_url: String,
    pub default_branch: String,
    /// 解压后的源码根目录
    pub source_root: PathBuf,
}

/// 一次批量运行的根目录，所有学生的工作目录都建在它下面
pub struct BatchWorkspace {
    root: TempDir,
}

impl BatchWorkspace {
    pub fn create() -> io::Result<Self> {
        let root = tempfile::Builder::new().prefix("autochecker-").tempdir()?;
        tracing::debug!("📁 批次工作目录: {}", root.path().display());
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }
}

/// 单个学生的工作目录
///
/// 目录名由名单位置和安全化后的学生标识组成，并发运行的学生之间不会冲突。
#[derive(Debug)]
pub struct WorkArea {
    dir: TempDir,
    identity: StudentIdentity,
    repo: RepoRef,
    snapshot: Option<RepoSnapshot>,
}

impl WorkArea {
    /// 在 `root` 下为学生创建工作目录
    pub fn acquire(root: &Path, index: usize, identity: &StudentIdentity, repo: &RepoRef) -> io::Result<Self> {
        let prefix = format!("{:04}-{}-", index, identity.path_safe());
        let dir = tempfile::Builder::new().prefix(&prefix).tempdir_in(root)?;
        Ok(Self {
            dir,
            identity: identity.clone(),
            repo: repo.clone(),
            snapshot: None,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn identity(&self) -> &StudentIdentity {
        &self.identity
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    pub fn snapshot(&self) -> Option<&RepoSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn set_snapshot(&mut self, snapshot: RepoSnapshot) {
        self.snapshot = Some(snapshot);
    }

    /// 源码根目录，未拉取时为工作目录本身
    pub fn source_root(&self) -> &Path {
        self.snapshot
            .as_ref()
            .map(|s| s.source_root.as_path())
            .unwrap_or_else(|| self.dir.path())
    }

    /// 源码中是否存在该文件，越界路径一律视为不存在
    pub fn file_exists(&self, relative: &str) -> bool {
        self.resolve(relative).is_some_and(|p| p.is_file())
    }

    /// 读取源码中的文本文件，不存在或不是 UTF-8 时返回 None
    pub fn read_file(&self, relative: &str) -> Option<String> {
        let path = self.resolve(relative)?;
        std::fs::read_to_string(path).ok()
    }

    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        let inside = relative.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        inside.then(|| self.source_root().join(relative))
    }

    /// 显式释放，删除失败时返回错误（Drop 时会静默忽略）
    pub fn release(self) -> io::Result<()> {
        self.dir.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(root: &Path, index: usize, alias: &str) -> WorkArea {
        let identity = StudentIdentity::new(alias);
        let repo = RepoRef::resolve(&identity, "lab");
        WorkArea::acquire(root, index, &identity, &repo).unwrap()
    }

    #[test]
    fn concurrent_areas_do_not_collide() {
        let batch = BatchWorkspace::create().unwrap();
        let a = area(batch.path(), 0, "same/name");
        let b = area(batch.path(), 1, "same/name");

        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(batch.path()));
        assert!(a.path().file_name().unwrap().to_string_lossy().starts_with("0000-same_name-"));
    }

    #[test]
    fn area_is_removed_on_drop_and_release() {
        let batch = BatchWorkspace::create().unwrap();
        let dropped = area(batch.path(), 0, "s1");
        let dropped_path = dropped.path().to_path_buf();
        drop(dropped);
        assert!(!dropped_path.exists());

        let released = area(batch.path(), 1, "s2");
        let released_path = released.path().to_path_buf();
        released.release().unwrap();
        assert!(!released_path.exists());
    }

    #[test]
    fn file_lookup_stays_inside_source_root() {
        let batch = BatchWorkspace::create().unwrap();
        let mut area = area(batch.path(), 0, "s1");
        let root = area.path().join("repo-sha");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("README.md"), "# hi").unwrap();
        area.set_snapshot(RepoSnapshot {
            html_url: "https://github.com/s1/lab".into(),
            default_branch: "main".into(),
            source_root: root,
        });

        assert!(area.file_exists("README.md"));
        assert!(area.file_exists("./README.md"));
        assert!(!area.file_exists("../README.md"));
        assert!(!area.file_exists("/etc/passwd"));
        assert_eq!(area.read_file("README.md").as_deref(), Some("# hi"));
    }
}

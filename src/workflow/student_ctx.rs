//! 学生处理上下文
//!
//! 封装"我正在处理名单中的第几个学生、哪个仓库"这一信息

use std::fmt::Display;

use crate::models::{RepoRef, StudentIdentity, WorkItem};

/// 学生处理上下文
///
/// 只用于日志前缀，不参与业务判断
#[derive(Debug, Clone)]
pub struct StudentCtx {
    /// 名单中的位置（从 1 开始，仅用于日志显示）
    pub position: usize,

    pub identity: StudentIdentity,

    pub repo: RepoRef,
}

impl StudentCtx {
    pub fn new(item: &WorkItem) -> Self {
        Self {
            position: item.index + 1,
            identity: item.identity.clone(),
            repo: item.repo.clone(),
        }
    }
}

impl Display for StudentCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[学生 #{} {}]", self.position, self.repo)
    }
}

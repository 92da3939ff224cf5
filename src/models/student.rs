use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::models::lab_spec::LabSpec;

/// 学生标识（GitHub 账号别名）
///
/// 在一次批量运行中唯一，名单中的顺序即报告中的顺序。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentIdentity(String);

impl StudentIdentity {
    pub fn new(alias: impl Into<String>) -> Self {
        Self(alias.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 用作目录名的安全形式
    pub fn path_safe(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>()
            .trim_start_matches('.')
            .to_string()
    }
}

impl fmt::Display for StudentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StudentIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StudentIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 仓库引用（owner/name）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// 学生的仓库位于其账号下，仓库名由批次统一指定
    pub fn resolve(identity: &StudentIdentity, repo_name: &str) -> Self {
        Self {
            owner: identity.as_str().to_string(),
            name: repo_name.to_string(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// 一个待处理的学生任务
///
/// 批次开始时按名单逐条创建，之后不再修改，只会被流水线消费一次。
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// 在名单中的位置（从 0 开始）
    pub index: usize,
    pub identity: StudentIdentity,
    pub repo: RepoRef,
    pub spec: Arc<LabSpec>,
}

impl WorkItem {
    /// 按名单顺序为每个学生创建任务
    pub fn from_roster(roster: &[StudentIdentity], repo_name: &str, spec: Arc<LabSpec>) -> Vec<Self> {
        roster
            .iter()
            .enumerate()
            .map(|(index, identity)| Self {
                index,
                identity: identity.clone(),
                repo: RepoRef::resolve(identity, repo_name),
                spec: Arc::clone(&spec),
            })
            .collect()
    }
}

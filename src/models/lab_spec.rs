//! 实验规格
//!
//! 规格文件（TOML / YAML）描述一次实验要对每个学生仓库执行的检查项。

use serde::{Deserialize, Serialize};

/// 实验规格
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabSpec {
    pub id: String,
    #[serde(default)]
    pub repo_name: String,
    pub checks: Vec<CheckSpec>,
}

impl LabSpec {
    pub fn new(id: impl Into<String>, repo_name: impl Into<String>, checks: Vec<CheckSpec>) -> Self {
        Self {
            id: id.into(),
            repo_name: repo_name.into(),
            checks,
        }
    }
}

/// 单个检查项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSpec {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub rule: CheckRule,
}

/// 检查规则
///
/// 每种规则是一个枚举变体，由评估器按变体分派，不做按名称的动态查找。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckRule {
    /// 仓库存在且可访问
    RepoExists,
    /// 仓库中存在指定文件
    FileExists { path: String },
    /// 所有提交信息都以该正则开头匹配
    CommitMessageRegex { pattern: String },
    /// 标题匹配正则的 issue 数量不少于 min_count
    IssuesCount { title_regex: String, min_count: usize },
    /// 已合并的 PR 数量不少于 min_count
    PrMergedCount { min_count: usize },
    /// 规格中出现了未知的检查类型，评估时记为 ERROR
    #[serde(skip_deserializing)]
    Unsupported { kind: String },
}

impl CheckRule {
    /// 规格文件中可用的 `type` 取值
    pub const KINDS: [&'static str; 5] = [
        "repo_exists",
        "file_exists",
        "commit_message_regex",
        "issues_count",
        "pr_merged_count",
    ];

    pub fn kind(&self) -> &str {
        match self {
            CheckRule::RepoExists => "repo_exists",
            CheckRule::FileExists { .. } => "file_exists",
            CheckRule::CommitMessageRegex { .. } => "commit_message_regex",
            CheckRule::IssuesCount { .. } => "issues_count",
            CheckRule::PrMergedCount { .. } => "pr_merged_count",
            CheckRule::Unsupported { kind } => kind,
        }
    }
}

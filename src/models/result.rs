//! 单个学生的评测结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::student::StudentIdentity;

/// 检查项状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// 单个检查项的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CheckResult {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, description: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            description: description.into(),
            status,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// 单个学生失败的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 拉取源码失败
    Fetch,
    /// 规格评估失败
    Evaluation,
    /// 提取比对材料失败
    Normalization,
    /// 超时
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Fetch => "fetch_error",
            ErrorKind::Evaluation => "evaluation_error",
            ErrorKind::Normalization => "normalization_error",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// 学生的最终结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed { kind: ErrorKind, message: String },
}

/// 用于查重比对的提交材料：相对路径 → 文件文本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradingArtifact {
    files: BTreeMap<String, String>,
}

impl GradingArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// 按路径排序的文件
    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<P: Into<String>, C: Into<String>> FromIterator<(P, C)> for GradingArtifact {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut artifact = Self::new();
        for (path, content) in iter {
            artifact.insert(path, content);
        }
        artifact
    }
}

/// LLM 定性分析结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitativeAnalysis {
    pub verdict: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub quotes: Vec<String>,
}

impl QualitativeAnalysis {
    /// 分析失败时的占位结论，不影响评分
    pub fn failed(reason: impl fmt::Display) -> Self {
        let reason = reason.to_string();
        Self {
            verdict: "analysis_failed".to_string(),
            reasons: vec![format!("LLM 分析失败: {}", crate::utils::logging::truncate_text(&reason, 100))],
            quotes: Vec::new(),
        }
    }
}

/// 单个学生的评测记录
///
/// 由流水线创建（成功或失败都会创建），之后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentResult {
    /// 在名单中的位置
    pub index: usize,
    pub student: StudentIdentity,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub checks: Vec<CheckResult>,
    pub passed: usize,
    pub total: usize,
    /// 百分制得分
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<QualitativeAnalysis>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    #[serde(skip)]
    pub artifact: Option<GradingArtifact>,
}

impl StudentResult {
    /// 成功完成评测的记录
    pub fn graded(
        index: usize,
        student: StudentIdentity,
        checks: Vec<CheckResult>,
        repo_url: Option<String>,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
    ) -> Self {
        let (passed, total, score) = summarize_checks(&checks);
        Self {
            index,
            student,
            outcome: Outcome::Success,
            checks,
            passed,
            total,
            score,
            repo_url,
            analysis: None,
            started_at,
            elapsed_ms,
            artifact: None,
        }
    }

    /// 失败的记录
    pub fn failed(
        index: usize,
        student: StudentIdentity,
        kind: ErrorKind,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            index,
            student,
            outcome: Outcome::Failed {
                kind,
                message: message.into(),
            },
            checks: Vec::new(),
            passed: 0,
            total: 0,
            score: 0.0,
            repo_url: None,
            analysis: None,
            started_at,
            elapsed_ms,
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Option<GradingArtifact>) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn with_analysis(mut self, analysis: Option<QualitativeAnalysis>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failed { message, .. } => Some(message),
        }
    }

    /// 把比对材料交出去，记录本身保持不变
    pub fn into_parts(mut self) -> (Self, Option<GradingArtifact>) {
        let artifact = self.artifact.take();
        (self, artifact)
    }
}

/// (通过数, 总数, 百分制得分)
pub fn summarize_checks(checks: &[CheckResult]) -> (usize, usize, f64) {
    let total = checks.len();
    let passed = checks.iter().filter(|c| c.status == CheckStatus::Pass).count();
    let score = if total > 0 {
        passed as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    (passed, total, score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_counts_only_passed_checks() {
        let checks = vec![
            CheckResult::new("a", "repo_exists", "", CheckStatus::Pass),
            CheckResult::new("b", "file_exists", "", CheckStatus::Fail),
            CheckResult::new("c", "issues_count", "", CheckStatus::Error),
            CheckResult::new("d", "file_exists", "", CheckStatus::Pass),
        ];
        assert_eq!(summarize_checks(&checks), (2, 4, 50.0));
        assert_eq!(summarize_checks(&[]), (0, 0, 0.0));
    }

    #[test]
    fn failed_result_serializes_error_kind() {
        let result = StudentResult::failed(2, "s2".into(), ErrorKind::Fetch, "仓库不存在", Utc::now(), 12);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "fetch");
        assert_eq!(json["student"], "s2");
        assert!(json.get("artifact").is_none());
        assert_eq!(result.error_kind(), Some(ErrorKind::Fetch));
    }

    #[test]
    fn into_parts_hands_over_artifact() {
        let artifact: GradingArtifact = [("main.py", "print(1)")].into_iter().collect();
        let result = StudentResult::graded(0, "s1".into(), Vec::new(), None, Utc::now(), 1)
            .with_artifact(Some(artifact.clone()));

        let (result, taken) = result.into_parts();
        assert_eq!(taken, Some(artifact));
        assert!(result.artifact.is_none());
        assert!(result.is_success());
    }
}

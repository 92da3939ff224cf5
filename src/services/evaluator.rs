//! 规格评估服务 - 业务能力层
//!
//! 按实验规格逐项检查一个学生的仓库。每种规则是 `CheckRule` 的一个变体，
//! 这里按变体分派。单个检查项出错只会记为 ERROR，不会让整个评估失败。

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::clients::github_client::{CommitEntry, IssueEntry, PullRequestEntry};
use crate::clients::GithubClient;
use crate::error::EvaluationError;
use crate::infrastructure::{RepoSnapshot, WorkArea};
use crate::models::{CheckResult, CheckRule, CheckSpec, CheckStatus, LabSpec};

/// 规格评估能力
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, area: &WorkArea, spec: &LabSpec) -> Result<Vec<CheckResult>, EvaluationError>;
}

/// 基于 GitHub 数据和工作目录内容的规则评估器
pub struct RuleEvaluator {
    client: Arc<GithubClient>,
}

impl RuleEvaluator {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Evaluator for RuleEvaluator {
    async fn evaluate(&self, area: &WorkArea, spec: &LabSpec) -> Result<Vec<CheckResult>, EvaluationError> {
        let snapshot = area
            .snapshot()
            .ok_or_else(|| EvaluationError::MissingSnapshot(area.path().display().to_string()))?;

        let mut session = EvalSession {
            client: &self.client,
            area,
            snapshot,
            commits: None,
            issues: None,
            pulls: None,
        };

        let mut results = Vec::with_capacity(spec.checks.len());
        for check in &spec.checks {
            results.push(session.run_check(check).await);
        }
        Ok(results)
    }
}

/// 一次评估内的数据缓存，同一个学生的多个检查项共享 API 响应
struct EvalSession<'a> {
    client: &'a GithubClient,
    area: &'a WorkArea,
    snapshot: &'a RepoSnapshot,
    commits: Option<Vec<CommitEntry>>,
    issues: Option<Vec<IssueEntry>>,
    pulls: Option<Vec<PullRequestEntry>>,
}

impl EvalSession<'_> {
    async fn run_check(&mut self, check: &CheckSpec) -> CheckResult {
        let kind = check.rule.kind().to_string();
        let result = CheckResult::new(&check.id, &kind, &check.description, CheckStatus::Fail);

        if let CheckRule::Unsupported { kind } = &check.rule {
            return CheckResult {
                status: CheckStatus::Error,
                ..result
            }
            .with_details(format!("未知的检查类型: {}", kind));
        }

        match self.check_rule(&check.rule).await {
            Ok(true) => CheckResult {
                status: CheckStatus::Pass,
                ..result
            },
            Ok(false) => result,
            Err(e) => {
                debug!("检查项 {} 执行出错: {:#}", check.id, e);
                CheckResult {
                    status: CheckStatus::Error,
                    ..result
                }
                .with_details(format!("检查项 '{}' 执行出错: {:#}", check.id, e))
            }
        }
    }

    async fn check_rule(&mut self, rule: &CheckRule) -> anyhow::Result<bool> {
        match rule {
            // 拉取阶段已经确认仓库存在且公开
            CheckRule::RepoExists => Ok(true),
            CheckRule::FileExists { path } => Ok(self.area.file_exists(path)),
            CheckRule::CommitMessageRegex { pattern } => {
                let re = compile(pattern)?;
                Ok(all_commits_match(self.commits().await?, &re))
            }
            CheckRule::IssuesCount { title_regex, min_count } => {
                let re = compile(title_regex)?;
                Ok(count_matching_issues(self.issues().await?, &re) >= *min_count)
            }
            CheckRule::PrMergedCount { min_count } => {
                Ok(self.pulls().await?.iter().filter(|pr| pr.is_merged()).count() >= *min_count)
            }
            CheckRule::Unsupported { kind } => anyhow::bail!("未知的检查类型: {}", kind),
        }
    }

    async fn commits(&mut self) -> anyhow::Result<&[CommitEntry]> {
        if self.commits.is_none() {
            let repo = self.area.repo();
            let commits = self
                .client
                .commits(repo, &self.snapshot.default_branch)
                .await
                .with_context(|| format!("获取 {} 的提交记录失败", repo))?;
            self.commits = Some(commits);
        }
        Ok(self.commits.as_deref().unwrap_or_default())
    }

    async fn issues(&mut self) -> anyhow::Result<&[IssueEntry]> {
        if self.issues.is_none() {
            let repo = self.area.repo();
            let issues = self
                .client
                .issues(repo)
                .await
                .with_context(|| format!("获取 {} 的 issue 失败", repo))?;
            self.issues = Some(issues);
        }
        Ok(self.issues.as_deref().unwrap_or_default())
    }

    async fn pulls(&mut self) -> anyhow::Result<&[PullRequestEntry]> {
        if self.pulls.is_none() {
            let repo = self.area.repo();
            let pulls = self
                .client
                .pull_requests(repo)
                .await
                .with_context(|| format!("获取 {} 的 PR 失败", repo))?;
            self.pulls = Some(pulls);
        }
        Ok(self.pulls.as_deref().unwrap_or_default())
    }
}

fn compile(pattern: &str) -> anyhow::Result<Regex> {
    Regex::new(pattern).with_context(|| format!("正则表达式无效: {}", pattern))
}

/// 从文本开头匹配
fn matches_at_start(re: &Regex, text: &str) -> bool {
    re.find(text).is_some_and(|m| m.start() == 0)
}

/// 没有提交时不通过，否则要求每条提交信息都从开头匹配
fn all_commits_match(commits: &[CommitEntry], re: &Regex) -> bool {
    !commits.is_empty() && commits.iter().all(|c| matches_at_start(re, c.message()))
}

/// 标题从开头匹配的 issue 数量，PR 不计入
fn count_matching_issues(issues: &[IssueEntry], re: &Regex) -> usize {
    issues
        .iter()
        .filter(|i| !i.is_pull_request() && matches_at_start(re, &i.title))
        .count()
}

//! 端到端流水线：模拟的拉取与评估，真实的工作目录、材料提取、调度和查重

use async_trait::async_trait;
use autochecker::error::{EvaluationError, FetchError};
use autochecker::infrastructure::{BatchWorkspace, RepoSnapshot, WorkArea};
use autochecker::models::{
    CheckResult, CheckStatus, ErrorKind, GradingArtifact, LabSpec, StudentIdentity, StudentResult, WorkItem,
};
use autochecker::models::QualitativeAnalysis;
use autochecker::services::{Evaluator, QualitativeAnalyzer, ReportWriter, SourceFetcher};
use autochecker::{analyze, run_batch, GradingFlow};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const SHARED_SOLUTION: &str = r#"
def fib(n):
    a, b = 0, 1
    for _ in range(n):
        a, b = b, a + b
    return a

if __name__ == "__main__":
    print(fib(10))
"#;

const OWN_SOLUTION: &str = r#"
import sys

def main():
    total = sum(int(line) for line in sys.stdin if line.strip())
    print("total:", total)

main()
"#;

/// 把预设的文件写进工作目录，模拟下载并解压
struct FakeFetcher {
    repos: HashMap<String, Vec<(&'static str, &'static str)>>,
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, item: &WorkItem, area: &mut WorkArea) -> Result<RepoSnapshot, FetchError> {
        let full_name = item.repo.full_name();
        if item.identity.as_str() == "broken" {
            // 快照指向不存在的目录，提取材料时失败
            return Ok(RepoSnapshot {
                html_url: format!("https://github.com/{}", full_name),
                default_branch: "main".into(),
                source_root: area.path().join("missing"),
            });
        }
        let files = self
            .repos
            .get(item.identity.as_str())
            .ok_or_else(|| FetchError::NotFound { repo: full_name.clone() })?;

        let root = area.path().join("src-main");
        for (path, content) in files {
            let target = root.join(path);
            std::fs::create_dir_all(target.parent().unwrap()).map_err(FetchError::WorkArea)?;
            std::fs::write(&target, content).map_err(FetchError::WorkArea)?;
        }
        Ok(RepoSnapshot {
            html_url: format!("https://github.com/{}", full_name),
            default_branch: "main".into(),
            source_root: root,
        })
    }
}

/// 只检查 README.md 是否存在
struct ReadmeEvaluator;

#[async_trait]
impl Evaluator for ReadmeEvaluator {
    async fn evaluate(&self, area: &WorkArea, _spec: &LabSpec) -> Result<Vec<CheckResult>, EvaluationError> {
        let status = if area.file_exists("README.md") {
            CheckStatus::Pass
        } else {
            CheckStatus::Fail
        };
        Ok(vec![CheckResult::new("readme", "file_exists", "README.md 存在", status)])
    }
}

struct FailingAnalyzer;

#[async_trait]
impl QualitativeAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _area: &WorkArea, _spec: &LabSpec) -> anyhow::Result<QualitativeAnalysis> {
        anyhow::bail!("模型不可用")
    }
}

fn fake_repos() -> HashMap<String, Vec<(&'static str, &'static str)>> {
    HashMap::from([
        (
            "alice".to_string(),
            vec![("README.md", "# Lab 1\n"), ("main.py", SHARED_SOLUTION)],
        ),
        (
            "bob".to_string(),
            // 只有空白和注释不同
            vec![("README.md", "# Lab 1\n"), ("main.py", "# copied\ndef fib(n):\n  a, b = 0, 1\n  for _ in range(n):\n    a, b = b, a + b\n  return a\nif __name__ == \"__main__\":\n  print(fib(10))\n")],
        ),
        ("carol".to_string(), vec![("main.py", OWN_SOLUTION)]),
    ])
}

async fn run_roster(names: &[&str], workers: usize, flow: GradingFlow) -> Vec<StudentResult> {
    let roster: Vec<StudentIdentity> = names.iter().map(|n| StudentIdentity::new(*n)).collect();
    let items = WorkItem::from_roster(&roster, "lab-01", Arc::new(LabSpec::new("lab-01", "lab-01", Vec::new())));
    let flow = Arc::new(flow);
    run_batch(items, workers, None, move |item| {
        let flow = Arc::clone(&flow);
        async move { flow.run(item).await }
    })
    .await
    .unwrap()
}

fn artifacts_of(results: &mut [StudentResult]) -> BTreeMap<StudentIdentity, GradingArtifact> {
    results
        .iter_mut()
        .filter(|r| r.is_success())
        .filter_map(|r| r.artifact.take().map(|a| (r.student.clone(), a)))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn grades_roster_and_flags_copied_pair() {
    let workspace = BatchWorkspace::create().unwrap();
    let flow = GradingFlow::new(
        Arc::new(FakeFetcher { repos: fake_repos() }),
        Arc::new(ReadmeEvaluator),
        workspace.path(),
    );

    let mut results = run_roster(&["alice", "bob", "carol"], 2, flow).await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(StudentResult::is_success));
    assert_eq!((results[0].passed, results[0].total), (1, 1));
    assert_eq!((results[2].passed, results[2].total), (0, 1));
    assert_eq!(results[1].repo_url.as_deref(), Some("https://github.com/bob/lab-01"));

    let report = analyze(artifacts_of(&mut results), 0.8).unwrap();
    assert_eq!(report.groups.len(), 1);
    let members: Vec<&str> = report.groups[0].members.iter().map(StudentIdentity::as_str).collect();
    assert_eq!(members, vec!["alice", "bob"]);

    let pair = &report.pairs[0];
    assert_eq!((pair.a.as_str(), pair.b.as_str()), ("alice", "bob"));
    assert_eq!(pair.score, 1.0);
    assert!(pair.shared_files.contains(&"main.py".to_string()));

    // 工作目录用完即删
    assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn failures_are_classified_per_student() {
    let workspace = BatchWorkspace::create().unwrap();
    let flow = GradingFlow::new(
        Arc::new(FakeFetcher { repos: fake_repos() }),
        Arc::new(ReadmeEvaluator),
        workspace.path(),
    );

    let results = run_roster(&["alice", "ghost", "broken", "carol"], 3, flow).await;

    assert!(results[0].is_success());
    assert_eq!(results[1].error_kind(), Some(ErrorKind::Fetch));
    assert!(results[1].error_message().unwrap().contains("ghost/lab-01"));
    assert_eq!(results[2].error_kind(), Some(ErrorKind::Normalization));
    assert!(results[3].is_success());
    assert!(results[1].checks.is_empty());
}

#[tokio::test]
async fn skips_artifacts_when_plagiarism_is_disabled() {
    let workspace = BatchWorkspace::create().unwrap();
    let flow = GradingFlow::new(
        Arc::new(FakeFetcher { repos: fake_repos() }),
        Arc::new(ReadmeEvaluator),
        workspace.path(),
    )
    .with_artifacts(false);

    // 关闭查重时，source_root 不存在也不会失败
    let results = run_roster(&["alice", "broken"], 1, flow).await;
    assert!(results.iter().all(StudentResult::is_success));
    assert!(results.iter().all(|r| r.artifact.is_none()));
}

#[tokio::test]
async fn analyzer_failure_does_not_fail_the_student() {
    let workspace = BatchWorkspace::create().unwrap();
    let flow = GradingFlow::new(
        Arc::new(FakeFetcher { repos: fake_repos() }),
        Arc::new(ReadmeEvaluator),
        workspace.path(),
    )
    .with_analyzer(Some(Arc::new(FailingAnalyzer)));

    let results = run_roster(&["carol"], 1, flow).await;
    assert!(results[0].is_success());
    let analysis = results[0].analysis.as_ref().unwrap();
    assert!(analysis.reasons.iter().any(|r| r.contains("模型不可用")));
}

#[tokio::test]
async fn writes_batch_reports() {
    use autochecker::models::{BatchMetadata, BatchReport};

    let workspace = BatchWorkspace::create().unwrap();
    let output = tempfile::tempdir().unwrap();
    let flow = GradingFlow::new(
        Arc::new(FakeFetcher { repos: fake_repos() }),
        Arc::new(ReadmeEvaluator),
        workspace.path(),
    );

    let mut results = run_roster(&["alice", "bob", "ghost"], 2, flow).await;
    let similarity = analyze(artifacts_of(&mut results), 0.8).unwrap();
    let report = BatchReport {
        metadata: BatchMetadata {
            spec_id: "lab-01".into(),
            repo_name: "lab-01".into(),
            started_at: chrono::Utc::now(),
            finished_at: chrono::Utc::now(),
            workers: 2,
            threshold: Some(0.8),
            timeout_secs: None,
        },
        results,
        similarity,
    };

    ReportWriter::new(output.path()).write_batch(&report).await.unwrap();

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output.path().join("batch_summary.json")).unwrap()).unwrap();
    assert_eq!(summary["total_students"], 3);
    assert_eq!(summary["failed"], 1);
    assert!(output.path().join("plagiarism_report.json").exists());
    assert!(output.path().join("batch_summary.html").exists());
}

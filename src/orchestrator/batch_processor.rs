//! 批量评测处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量评测的调度和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验配置、创建 GitHub / LLM 客户端、创建批次工作目录
//! 2. **并发控制**：公平 Semaphore 限制同时运行的流水线数量，按名单顺序补位
//! 3. **失败隔离**：超时、panic 都被转换为该学生的失败结果
//! 4. **结果收集**：单一收集者按下标把结果放回名单位置
//! 5. **查重**：全部完成后在阻塞线程池中运行查重引擎
//! 6. **报告输出**：组装 `BatchReport` 并交给 `ReportWriter`

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::clients::{GithubClient, LlmClient};
use crate::config::Config;
use crate::error::{AppError, AppResult, ConfigError, RosterError};
use crate::infrastructure::BatchWorkspace;
use crate::models::{
    BatchMetadata, BatchReport, ErrorKind, GradingArtifact, LabSpec, SimilarityReport, StudentIdentity,
    StudentResult, WorkItem,
};
use crate::services::{GithubFetcher, LlmService, QualitativeAnalyzer, ReportWriter, RuleEvaluator};
use crate::similarity;
use crate::utils::logging::{log_progress, log_roster_loaded, log_startup, print_final_stats};
use crate::workflow::GradingFlow;

/// 在有限并发下对名单中的每一项运行流水线
///
/// - 每一项恰好产生一条结果，返回顺序与 `items` 一致
/// - 同时运行的流水线不超过 `concurrency`，排队的项按名单顺序进入
/// - 超时、panic 都只影响该项本身
pub async fn run_batch<F, Fut>(
    items: Vec<WorkItem>,
    concurrency: usize,
    timeout: Option<Duration>,
    pipeline: F,
) -> AppResult<Vec<StudentResult>>
where
    F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StudentResult> + Send + 'static,
{
    if items.is_empty() {
        return Err(RosterError::Empty.into());
    }
    if concurrency == 0 {
        return Err(ConfigError::InvalidWorkers(concurrency).into());
    }

    let total = items.len();
    let roster: Vec<(usize, StudentIdentity)> = items.iter().map(|i| (i.index, i.identity.clone())).collect();

    // 公平信号量：先到先得，保证按名单顺序补位
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let pipeline = Arc::new(pipeline);
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, StudentResult)>();

    let dispatcher = tokio::spawn(async move {
        for (slot, item) in items.into_iter().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let tx = tx.clone();
            let pipeline = Arc::clone(&pipeline);

            tokio::spawn(async move {
                let _permit = permit;
                let result = run_guarded(item, pipeline.as_ref(), timeout).await;
                // 接收端只会在收集结束后关闭
                let _ = tx.send((slot, result));
            });
        }
    });

    // 单一收集者：只有这里写结果数组
    let mut slots: Vec<Option<StudentResult>> = (0..total).map(|_| None).collect();
    let mut completed = 0;
    while let Some((slot, result)) = rx.recv().await {
        completed += 1;
        log_progress(completed, total, &result);
        slots[slot] = Some(result);
    }

    if let Err(e) = dispatcher.await {
        error!("调度任务异常退出: {}", e);
    }

    let results = slots
        .into_iter()
        .zip(roster)
        .map(|(slot, (index, identity))| {
            slot.unwrap_or_else(|| {
                error!("[学生 #{}] {} 没有产生结果", index + 1, identity);
                StudentResult::failed(index, identity, ErrorKind::Evaluation, "流水线异常中止", Utc::now(), 0)
            })
        })
        .collect();

    Ok(results)
}

/// 运行单个流水线，把超时和 panic 转换为失败结果
async fn run_guarded<F, Fut>(item: WorkItem, pipeline: &F, timeout: Option<Duration>) -> StudentResult
where
    F: Fn(WorkItem) -> Fut,
    Fut: Future<Output = StudentResult>,
{
    let started_at = Utc::now();
    let clock = Instant::now();
    let index = item.index;
    let identity = item.identity.clone();

    let guarded = AssertUnwindSafe(async move { pipeline(item).await }).catch_unwind();
    let outcome = match timeout {
        // 超时后 future 被丢弃，进行中的 IO 随之取消，工作目录随 Drop 删除
        Some(limit) => tokio::time::timeout(limit, guarded).await.ok(),
        None => Some(guarded.await),
    };
    let elapsed_ms = clock.elapsed().as_millis() as u64;

    match outcome {
        Some(Ok(result)) => result,
        Some(Err(panic)) => StudentResult::failed(
            index,
            identity,
            ErrorKind::Evaluation,
            format!("流水线崩溃: {}", panic_message(panic.as_ref())),
            started_at,
            elapsed_ms,
        ),
        None => StudentResult::failed(
            index,
            identity,
            ErrorKind::Timeout,
            format!("超过 {} 秒未完成", timeout.map(|t| t.as_secs_f64()).unwrap_or_default()),
            started_at,
            elapsed_ms,
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}

/// 一次批量评测的输入
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub roster: Vec<StudentIdentity>,
    /// `repo_name` 已按命令行参数覆盖
    pub spec: LabSpec,
}

/// 应用主结构
pub struct App {
    config: Config,
    github: Arc<GithubClient>,
    writer: ReportWriter,
    workspace: BatchWorkspace,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        config.validate()?;

        let github = GithubClient::new(&config).map_err(|e| AppError::Other(e.to_string()))?;
        let workspace =
            BatchWorkspace::create().map_err(|e| AppError::Other(format!("无法创建批次工作目录: {}", e)))?;

        Ok(Self {
            writer: ReportWriter::new(&config.output_dir),
            github: Arc::new(github),
            workspace,
            config,
        })
    }

    fn build_flow(&self, collect_artifacts: bool) -> GradingFlow {
        let fetcher = Arc::new(GithubFetcher::new(Arc::clone(&self.github), self.config.max_archive_bytes));
        let evaluator = Arc::new(RuleEvaluator::new(Arc::clone(&self.github)));
        let analyzer: Option<Arc<dyn QualitativeAnalyzer>> = if self.config.llm_enabled() {
            Some(Arc::new(LlmService::new(LlmClient::new(&self.config), Arc::clone(&self.github))))
        } else {
            None
        };

        GradingFlow::new(fetcher, evaluator, self.workspace.path())
            .with_analyzer(analyzer)
            .with_artifacts(collect_artifacts)
    }

    /// 运行批量评测并写出报告
    pub async fn run(&self, job: BatchJob) -> AppResult<BatchReport> {
        log_startup(&self.config, &job.spec.id);
        log_roster_loaded(job.roster.len(), self.config.max_concurrent_students);

        let spec_id = job.spec.id.clone();
        let repo_name = job.spec.repo_name.clone();
        let items = WorkItem::from_roster(&job.roster, &repo_name, Arc::new(job.spec));

        let flow = Arc::new(self.build_flow(self.config.check_plagiarism));
        let started_at = Utc::now();
        let results = run_batch(
            items,
            self.config.max_concurrent_students,
            self.config.student_timeout(),
            move |item| {
                let flow = Arc::clone(&flow);
                async move { flow.run(item).await }
            },
        )
        .await?;

        // 比对材料只交给查重引擎，不进入报告
        let mut artifacts: BTreeMap<StudentIdentity, GradingArtifact> = BTreeMap::new();
        let results: Vec<StudentResult> = results
            .into_iter()
            .map(|result| {
                let (result, artifact) = result.into_parts();
                if let (true, Some(artifact)) = (result.is_success(), artifact) {
                    artifacts.insert(result.student.clone(), artifact);
                }
                result
            })
            .collect();

        let similarity = if self.config.check_plagiarism {
            self.detect_plagiarism(artifacts).await?
        } else {
            SimilarityReport::default()
        };

        let report = BatchReport {
            metadata: BatchMetadata {
                spec_id,
                repo_name,
                started_at,
                finished_at: Utc::now(),
                workers: self.config.max_concurrent_students,
                threshold: self.config.check_plagiarism.then_some(self.config.plagiarism_threshold),
                timeout_secs: self.config.student_timeout_secs,
            },
            results,
            similarity,
        };

        self.writer
            .write_batch(&report)
            .await
            .map_err(|e| AppError::Other(format!("报告写入失败: {:#}", e)))?;
        print_final_stats(&report.summary(), &self.config.output_dir);

        Ok(report)
    }

    async fn detect_plagiarism(
        &self,
        artifacts: BTreeMap<StudentIdentity, GradingArtifact>,
    ) -> AppResult<SimilarityReport> {
        let threshold = self.config.plagiarism_threshold;
        info!("\n🔍 查重: {} 份提交参与比对 (阈值 {:.2})", artifacts.len(), threshold);

        let report = tokio::task::spawn_blocking(move || similarity::analyze(artifacts, threshold))
            .await
            .map_err(|e| AppError::Other(format!("查重任务异常中止: {}", e)))??;

        if report.groups.is_empty() {
            info!("✓ 未发现疑似抄袭");
        } else {
            for group in &report.groups {
                let members: Vec<&str> = group.members.iter().map(StudentIdentity::as_str).collect();
                warn!("🚨 疑似抄袭小组 ({:.1}%): {}", group.peak_score * 100.0, members.join(", "));
            }
        }
        Ok(report)
    }

    /// 单个学生模式：同一条流水线，名单只有一人，不做查重
    pub async fn check_one(&self, identity: StudentIdentity, spec: LabSpec) -> AppResult<StudentResult> {
        // 空白账号等同于空名单，在调度前拒绝
        if identity.as_str().trim().is_empty() {
            return Err(RosterError::Empty.into());
        }
        log_startup(&self.config, &spec.id);

        let repo_name = spec.repo_name.clone();
        let items = WorkItem::from_roster(&[identity], &repo_name, Arc::new(spec));
        let flow = Arc::new(self.build_flow(false));

        let mut results = run_batch(items, 1, self.config.student_timeout(), move |item| {
            let flow = Arc::clone(&flow);
            async move { flow.run(item).await }
        })
        .await?;
        let result = results.pop().ok_or(RosterError::Empty)?;

        self.writer
            .write_student(&result)
            .await
            .map_err(|e| AppError::Other(format!("报告写入失败: {:#}", e)))?;
        info!(
            "\n报告已保存至: {}",
            self.writer.output_dir().join(result.student.path_safe()).display()
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<WorkItem> {
        let roster: Vec<StudentIdentity> = (0..n).map(|i| StudentIdentity::new(format!("s{}", i))).collect();
        WorkItem::from_roster(&roster, "lab", Arc::new(LabSpec::new("lab", "lab", Vec::new())))
    }

    fn ok(item: WorkItem) -> StudentResult {
        StudentResult::graded(item.index, item.identity, Vec::new(), None, Utc::now(), 0)
    }

    #[test]
    fn rejects_empty_roster_and_zero_workers() {
        let err = tokio_test::block_on(run_batch(Vec::new(), 2, None, |item| async move { ok(item) })).unwrap_err();
        assert!(matches!(err, AppError::Roster(RosterError::Empty)));

        let err = tokio_test::block_on(run_batch(items(1), 0, None, |item| async move { ok(item) })).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::InvalidWorkers(0))));
    }

    #[tokio::test]
    async fn panicking_pipeline_becomes_evaluation_failure() {
        let results = run_batch(items(3), 2, None, |item| async move {
            if item.index == 1 {
                panic!("boom");
            }
            ok(item)
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success());
        assert_eq!(results[1].error_kind(), Some(ErrorKind::Evaluation));
        assert!(results[1].error_message().unwrap().contains("boom"));
        assert!(results[2].is_success());
    }

    #[test]
    fn check_one_rejects_blank_student() {
        let output = tempfile::tempdir().unwrap();
        let config = Config {
            github_token: "test-token".into(),
            github_api_base_url: "http://127.0.0.1:9".into(),
            cache_dir: None,
            output_dir: output.path().display().to_string(),
            ..Config::default()
        };

        let err = tokio_test::block_on(async {
            let app = App::initialize(config).await.unwrap();
            app.check_one(StudentIdentity::new("   "), LabSpec::new("lab", "lab", Vec::new()))
                .await
                .unwrap_err()
        });

        assert!(matches!(err, AppError::Roster(RosterError::Empty)));
        assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
    }

    #[test]
    fn panic_message_handles_both_payload_types() {
        let static_payload: Box<dyn Any + Send> = Box::new("static");
        let owned_payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(static_payload.as_ref()), "static");
        assert_eq!(panic_message(owned_payload.as_ref()), "owned");
    }
}

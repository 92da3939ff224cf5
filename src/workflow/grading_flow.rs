//! 学生评测流程 - 流程层
//!
//! 核心职责：定义"一个学生"的完整评测流程
//!
//! 流程顺序：
//! 1. 创建工作目录
//! 2. 拉取源码
//! 3. 按规格评估
//! 4. 提取比对材料（查重关闭时跳过）
//! 5. LLM 定性分析（可选，失败不影响结果）
//! 6. 释放工作目录，生成 `StudentResult`
//!
//! 任何一步失败都只会终止当前学生，错误被归类后写进结果，不会向上传播。

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{EvaluationError, FetchError, NormalizationError};
use crate::infrastructure::WorkArea;
use crate::models::{CheckResult, ErrorKind, GradingArtifact, QualitativeAnalysis, StudentResult, WorkItem};
use crate::services::{collect_artifact, Evaluator, QualitativeAnalyzer, SourceFetcher};
use crate::workflow::student_ctx::StudentCtx;

/// 某一步失败后的分类结果
#[derive(Debug)]
struct StepFailure {
    kind: ErrorKind,
    message: String,
}

impl From<FetchError> for StepFailure {
    fn from(e: FetchError) -> Self {
        Self {
            kind: ErrorKind::Fetch,
            message: e.to_string(),
        }
    }
}

impl From<EvaluationError> for StepFailure {
    fn from(e: EvaluationError) -> Self {
        Self {
            kind: ErrorKind::Evaluation,
            message: e.to_string(),
        }
    }
}

impl From<NormalizationError> for StepFailure {
    fn from(e: NormalizationError) -> Self {
        Self {
            kind: ErrorKind::Normalization,
            message: e.to_string(),
        }
    }
}

/// 成功评测后的产物
struct Graded {
    checks: Vec<CheckResult>,
    repo_url: String,
    artifact: Option<GradingArtifact>,
    analysis: Option<QualitativeAnalysis>,
}

/// 学生评测流程
///
/// - 编排单个学生的完整评测流程
/// - 不持有任何共享可变状态，可被多个任务同时调用
/// - 只依赖业务能力（services）
pub struct GradingFlow {
    fetcher: Arc<dyn SourceFetcher>,
    evaluator: Arc<dyn Evaluator>,
    analyzer: Option<Arc<dyn QualitativeAnalyzer>>,
    work_root: PathBuf,
    collect_artifacts: bool,
}

impl GradingFlow {
    /// 创建新的评测流程，工作目录建在 `work_root` 下
    pub fn new(fetcher: Arc<dyn SourceFetcher>, evaluator: Arc<dyn Evaluator>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            evaluator,
            analyzer: None,
            work_root: work_root.into(),
            collect_artifacts: true,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Option<Arc<dyn QualitativeAnalyzer>>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// 是否提取比对材料（查重关闭时不需要）
    pub fn with_artifacts(mut self, collect: bool) -> Self {
        self.collect_artifacts = collect;
        self
    }

    /// 评测一个学生，总会返回一条结果
    pub async fn run(&self, item: WorkItem) -> StudentResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let ctx = StudentCtx::new(&item);

        info!("{} 👨‍🎓 开始评测", ctx);
        let outcome = self.grade(&item, &ctx).await;
        let elapsed_ms = clock.elapsed().as_millis() as u64;

        match outcome {
            Ok(graded) => {
                let result = StudentResult::graded(
                    item.index,
                    item.identity,
                    graded.checks,
                    Some(graded.repo_url),
                    started_at,
                    elapsed_ms,
                )
                .with_artifact(graded.artifact)
                .with_analysis(graded.analysis);
                info!("{} ✓ 评测完成: {}/{} 通过", ctx, result.passed, result.total);
                result
            }
            Err(failure) => {
                warn!("{} ❌ {}: {}", ctx, failure.kind, failure.message);
                StudentResult::failed(item.index, item.identity, failure.kind, failure.message, started_at, elapsed_ms)
            }
        }
    }

    async fn grade(&self, item: &WorkItem, ctx: &StudentCtx) -> Result<Graded, StepFailure> {
        // ========== 1. 工作目录 ==========
        let mut area = WorkArea::acquire(&self.work_root, item.index, &item.identity, &item.repo)
            .map_err(FetchError::WorkArea)?;
        debug!("{} 工作目录: {}", ctx, area.path().display());

        // ========== 2. 拉取源码 ==========
        info!("{} 🚚 拉取仓库...", ctx);
        let snapshot = self.fetcher.fetch(item, &mut area).await?;
        let repo_url = snapshot.html_url.clone();
        area.set_snapshot(snapshot);

        // ========== 3. 规格评估 ==========
        let checks = self.evaluator.evaluate(&area, &item.spec).await?;
        debug!("{} 完成 {} 项检查", ctx, checks.len());

        // ========== 4. 比对材料 ==========
        let artifact = if self.collect_artifacts {
            let artifact = collect_artifact(area.source_root()).await?;
            debug!("{} 收集到 {} 个文本文件", ctx, artifact.len());
            Some(artifact)
        } else {
            None
        };

        // ========== 5. 定性分析 ==========
        let analysis = match &self.analyzer {
            Some(analyzer) => match analyzer.analyze(&area, &item.spec).await {
                Ok(analysis) => {
                    info!("{} 🤖 LLM 结论: {}", ctx, analysis.verdict);
                    Some(analysis)
                }
                Err(e) => {
                    warn!("{} ⚠️ LLM 分析失败: {:#}", ctx, e);
                    Some(QualitativeAnalysis::failed(format!("{:#}", e)))
                }
            },
            None => None,
        };

        // ========== 6. 释放工作目录 ==========
        if let Err(e) = area.release() {
            warn!("{} 工作目录清理失败: {}", ctx, e);
        }

        Ok(Graded {
            checks,
            repo_url,
            artifact,
            analysis,
        })
    }
}

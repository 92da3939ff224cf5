/// 日志工具模块
///
/// 提供日志初始化和批次进度输出的辅助函数
use crate::config::Config;
use crate::models::{BatchSummary, StudentResult};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// `RUST_LOG` 优先，否则按 `verbose` 选择 debug / info。重复初始化会被忽略。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 生效的配置
/// - `spec_id`: 实验规格 ID
pub fn log_startup(config: &Config, spec_id: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量评测模式");
    info!("📘 实验规格: {}", spec_id);
    info!("📊 最大并发数: {}", config.max_concurrent_students);
    match config.student_timeout_secs {
        Some(secs) => info!("⏱️ 单个学生超时: {} 秒", secs),
        None => info!("⏱️ 单个学生超时: 不限"),
    }
    if config.check_plagiarism {
        info!("🔍 查重已启用，阈值: {:.2}", config.plagiarism_threshold);
    }
    if config.llm_enabled() {
        info!("🤖 LLM 定性分析已启用 ({})", config.llm_model_name);
    }
    info!("{}", "=".repeat(60));
}

/// 记录名单加载信息
pub fn log_roster_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 个待评测的学生", total);
    info!("📋 最多同时处理 {} 个，按名单顺序补位\n", max_concurrent);
}

/// 记录单个学生完成后的进度
///
/// # 参数
/// - `completed`: 已完成数量
/// - `total`: 学生总数
/// - `result`: 刚完成的结果
pub fn log_progress(completed: usize, total: usize, result: &StudentResult) {
    match result.error_message() {
        None => info!(
            "[{}/{}] ✅ {}: {}/{} 通过 ({:.1} 分)",
            completed, total, result.student, result.passed, result.total, result.score
        ),
        Some(message) => warn!(
            "[{}/{}] ❌ {}: {} - {}",
            completed,
            total,
            result.student,
            result.error_kind().map(|k| k.to_string()).unwrap_or_default(),
            truncate_text(message, 80)
        ),
    }
}

/// 打印最终统计信息
///
/// # 参数
/// - `summary`: 批次汇总
/// - `output_dir`: 报告输出目录
pub fn print_final_stats(summary: &BatchSummary, output_dir: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!("完成时间: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.successful, summary.total_students);
    info!("❌ 失败: {}", summary.failed);
    for (kind, count) in &summary.failures_by_kind {
        info!("   - {}: {}", kind, count);
    }
    info!(
        "⏱️ 总耗时: {:.1} 秒 (平均 {:.2} 秒/人)",
        summary.elapsed_time_seconds, summary.average_time_per_student
    );
    if summary.plagiarism_detected > 0 {
        warn!("🚨 疑似抄袭学生: {} 人", summary.plagiarism_detected);
    }
    info!("{}", "=".repeat(60));
    info!("\n报告已保存至: {}", output_dir);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

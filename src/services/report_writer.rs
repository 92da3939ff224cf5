//! 报告写入服务 - 业务能力层
//!
//! 只负责把评测结果写成 JSON / JSONL / HTML 文件，不关心流程

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::models::{
    BatchMetadata, BatchReport, BatchSummary, CheckStatus, SimilarityPair, SimilarityReport, StudentResult,
};

/// 学生报告中最多展示的相似匹配
const MAX_MATCHES_SHOWN: usize = 3;

/// 报告写入服务
///
/// 目录结构：
/// - `<output>/<学生>/results.jsonl` 与 `summary.html`
/// - `<output>/batch_summary.json` 与 `batch_summary.html`
/// - `<output>/plagiarism_report.json`（仅在发现疑似抄袭时）
pub struct ReportWriter {
    output_dir: PathBuf,
}

#[derive(Serialize)]
struct BatchSummaryFile<'a> {
    metadata: &'a BatchMetadata,
    #[serde(flatten)]
    summary: &'a BatchSummary,
    results: &'a [StudentResult],
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 写单个学生的报告（不含查重信息）
    pub async fn write_student(&self, result: &StudentResult) -> Result<()> {
        self.write_student_report(result, &[]).await
    }

    /// 写整个批次：每个学生的报告、批次汇总和查重报告
    pub async fn write_batch(&self, report: &BatchReport) -> Result<()> {
        fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("无法创建输出目录 {}", self.output_dir.display()))?;

        for result in &report.results {
            let matches = report.similarity.matches_for(&result.student);
            self.write_student_report(result, &matches).await?;
        }

        let summary = report.summary();
        let summary_file = BatchSummaryFile {
            metadata: &report.metadata,
            summary: &summary,
            results: &report.results,
        };
        let json_path = self.output_dir.join("batch_summary.json");
        write_file(&json_path, serde_json::to_string_pretty(&summary_file)?).await?;

        let html_path = self.output_dir.join("batch_summary.html");
        write_file(&html_path, render_batch_html(report, &summary)).await?;
        info!("📄 批次汇总已保存: {}", html_path.display());

        if !report.similarity.groups.is_empty() {
            let path = self.output_dir.join("plagiarism_report.json");
            let content = json!({
                "threshold": report.metadata.threshold,
                "groups": &report.similarity.groups,
                "pairs": &report.similarity.pairs,
            });
            write_file(&path, serde_json::to_string_pretty(&content)?).await?;
            info!("📄 查重报告已保存: {}", path.display());
        }

        Ok(())
    }

    async fn write_student_report(&self, result: &StudentResult, matches: &[&SimilarityPair]) -> Result<()> {
        let student_dir = self.output_dir.join(result.student.path_safe());
        fs::create_dir_all(&student_dir)
            .await
            .with_context(|| format!("无法创建学生目录 {}", student_dir.display()))?;

        // 清理上一次运行留下的报告
        for old in ["results.jsonl", "summary.html"] {
            let _ = fs::remove_file(student_dir.join(old)).await;
        }

        let html = match result.error_message() {
            None => {
                write_file(&student_dir.join("results.jsonl"), render_jsonl(result)?).await?;
                render_student_html(result, matches)
            }
            Some(message) => render_failure_html(result, message),
        };
        write_file(&student_dir.join("summary.html"), html).await?;
        debug!("📈 已写入 {} 的报告", result.student);
        Ok(())
    }
}

async fn write_file(path: &Path, content: String) -> Result<()> {
    fs::write(path, content)
        .await
        .with_context(|| format!("无法写入 {}", path.display()))
}

/// 第一行是汇总，之后每行一个检查项
fn render_jsonl(result: &StudentResult) -> Result<String> {
    let count = |status: CheckStatus| result.checks.iter().filter(|c| c.status == status).count();
    let mut summary = json!({
        "student_alias": result.student,
        "score": format!("{:.2}%", result.score),
        "passed_checks": count(CheckStatus::Pass),
        "failed_checks": count(CheckStatus::Fail),
        "errored_checks": count(CheckStatus::Error),
        "total_checks": result.total,
    });
    if let Some(analysis) = &result.analysis {
        summary["llm_analysis"] = serde_json::to_value(analysis)?;
    }

    let mut lines = vec![serde_json::to_string(&summary)?];
    for check in &result.checks {
        lines.push(serde_json::to_string(check)?);
    }
    Ok(lines.join("\n") + "\n")
}

fn render_student_html(result: &StudentResult, matches: &[&SimilarityPair]) -> String {
    let student = escape_html(result.student.as_str());
    let mut html = String::new();

    let _ = match &result.repo_url {
        Some(url) => write!(
            html,
            "<h1>评测报告: <a href='{}' target='_blank'>{}</a> - {:.2}%</h1>",
            escape_html(url),
            student,
            result.score
        ),
        None => write!(html, "<h1>评测报告: {} - {:.2}%</h1>", student, result.score),
    };

    if !matches.is_empty() {
        html.push_str("<h2>⚠️ 查重结果</h2><ul>");
        for pair in matches.iter().take(MAX_MATCHES_SHOWN) {
            let other = pair.other(&result.student).map(|s| s.as_str()).unwrap_or_default();
            let _ = write!(
                html,
                "<li><b>{}</b>: 相似度 {:.1}% ({} 个相同文件)</li>",
                escape_html(other),
                pair.score * 100.0,
                pair.shared_files.len()
            );
        }
        html.push_str("</ul>");
    }

    if let Some(analysis) = &result.analysis {
        html.push_str("<h2>🤖 LLM 分析</h2>");
        let _ = write!(html, "<p><b>结论:</b> {}</p>", escape_html(&analysis.verdict));
        if !analysis.reasons.is_empty() {
            html.push_str("<h3>理由:</h3><ul>");
            for reason in &analysis.reasons {
                let _ = write!(html, "<li>{}</li>", escape_html(reason));
            }
            html.push_str("</ul>");
        }
        if !analysis.quotes.is_empty() {
            html.push_str("<h3>引用:</h3><blockquote>");
            for quote in &analysis.quotes {
                let _ = write!(html, "<p><i>\"{}\"</i></p>", escape_html(quote));
            }
            html.push_str("</blockquote>");
        }
    }

    let count = |status: CheckStatus| result.checks.iter().filter(|c| c.status == status).count();
    html.push_str("<h2>⚙️ 自动检查结果</h2><ul>");
    let _ = write!(html, "<li>✅ 通过: {}</li>", count(CheckStatus::Pass));
    let _ = write!(html, "<li>❌ 未通过: {}</li>", count(CheckStatus::Fail));
    let _ = write!(html, "<li>⚠️ 出错: {}</li>", count(CheckStatus::Error));
    html.push_str("</ul>");

    html.push_str("<h3>详情:</h3><table border='1'><tr><th>ID</th><th>状态</th><th>描述</th><th>说明</th></tr>");
    for check in &result.checks {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{} {}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&check.id),
            status_icon(check.status),
            check.status,
            escape_html(&check.description),
            escape_html(check.details.as_deref().unwrap_or_default())
        );
    }
    html.push_str("</table>");
    html
}

fn render_failure_html(result: &StudentResult, message: &str) -> String {
    let kind = result.error_kind().map(|k| k.to_string()).unwrap_or_default();
    format!(
        "<h1>评测报告: {}</h1><h2>❌ 评测失败 ({})</h2><p>{}</p>",
        escape_html(result.student.as_str()),
        kind,
        escape_html(message)
    )
}

fn render_batch_html(report: &BatchReport, summary: &BatchSummary) -> String {
    let mut html = String::from(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>批量评测汇总</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 20px; }
        table { border-collapse: collapse; width: 100%; margin-top: 20px; }
        th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
        th { background-color: #f2f2f2; }
        .success { color: green; }
        .error { color: red; }
    </style>
</head>
<body>
"#,
    );

    let _ = write!(html, "<h1>批量评测汇总: {}</h1>", escape_html(&report.metadata.spec_id));
    let _ = write!(html, "<p><b>学生总数:</b> {}</p>", summary.total_students);
    let _ = write!(html, "<p><b>成功:</b> <span class=\"success\">{}</span></p>", summary.successful);
    let _ = write!(html, "<p><b>失败:</b> <span class=\"error\">{}</span></p>", summary.failed);
    let _ = write!(
        html,
        "<p><b>耗时:</b> {:.1} 秒 ({:.1} 分钟)</p><p><b>平均每人:</b> {:.1} 秒</p>",
        summary.elapsed_time_seconds,
        summary.elapsed_time_seconds / 60.0,
        summary.average_time_per_student
    );
    if summary.plagiarism_detected > 0 {
        let _ = write!(html, "<p><b>⚠️ 疑似抄袭学生:</b> {}</p>", summary.plagiarism_detected);
    }

    html.push_str("<h2>学生详情</h2><table><tr><th>学生</th><th>状态</th><th>通过</th><th>报告</th></tr>");
    let mut ordered: Vec<&StudentResult> = report.results.iter().collect();
    // 成功的按分数从高到低，失败的排在最后，同分保持名单顺序
    ordered.sort_by(|a, b| sort_score(b).total_cmp(&sort_score(a)).then(a.index.cmp(&b.index)));
    for result in ordered {
        let student = escape_html(result.student.as_str());
        let (class, status, link) = match result.error_message() {
            None => (
                "success",
                format!("✅ {:.1}%", result.score),
                format!("<a href='{}/summary.html' target='_blank'>报告</a>", escape_html(&result.student.path_safe())),
            ),
            Some(message) => ("error", format!("❌ {}", escape_html(message)), "-".to_string()),
        };
        let _ = write!(
            html,
            "<tr><td>{}</td><td class=\"{}\">{}</td><td>{}/{}</td><td>{}</td></tr>",
            student, class, status, result.passed, result.total, link
        );
    }
    html.push_str("</table>");

    html.push_str(&render_groups_html(&report.similarity));
    html.push_str("</body>\n</html>\n");
    html
}

fn render_groups_html(similarity: &SimilarityReport) -> String {
    if similarity.groups.is_empty() {
        return String::new();
    }
    let mut html = String::from("<h2>🔍 疑似抄袭小组</h2><table><tr><th>成员</th><th>最高相似度</th></tr>");
    for group in &similarity.groups {
        let members: Vec<String> = group.members.iter().map(|m| escape_html(m.as_str())).collect();
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{:.1}%</td></tr>",
            members.join(", "),
            group.peak_score * 100.0
        );
    }
    html.push_str("</table>");
    html
}

fn sort_score(result: &StudentResult) -> f64 {
    if result.is_success() {
        result.score
    } else {
        -1.0
    }
}

fn status_icon(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "✅",
        CheckStatus::Fail => "❌",
        CheckStatus::Error => "⚠️",
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckResult, ErrorKind, PlagiarismGroup};
    use chrono::Utc;

    fn sample_report() -> BatchReport {
        let now = Utc::now();
        let checks = vec![
            CheckResult::new("repo", "repo_exists", "仓库存在", CheckStatus::Pass),
            CheckResult::new("readme", "file_exists", "README", CheckStatus::Fail),
        ];
        BatchReport {
            metadata: BatchMetadata {
                spec_id: "lab-01".into(),
                repo_name: "lab".into(),
                started_at: now,
                finished_at: now,
                workers: 2,
                threshold: Some(0.8),
                timeout_secs: None,
            },
            results: vec![
                StudentResult::graded(0, "s1".into(), checks.clone(), Some("https://github.com/s1/lab".into()), now, 5),
                StudentResult::failed(1, "s2".into(), ErrorKind::Fetch, "仓库 s2/lab 不存在或无法访问", now, 1),
                StudentResult::graded(2, "s3".into(), checks, None, now, 5),
            ],
            similarity: SimilarityReport {
                pairs: vec![SimilarityPair {
                    a: "s1".into(),
                    b: "s3".into(),
                    score: 1.0,
                    shared_files: vec!["main.py".into()],
                }],
                groups: vec![PlagiarismGroup {
                    members: vec!["s1".into(), "s3".into()],
                    peak_score: 1.0,
                }],
            },
        }
    }

    #[tokio::test]
    async fn writes_all_batch_files() {
        let out = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(out.path());
        writer.write_batch(&sample_report()).await.unwrap();

        for file in ["batch_summary.json", "batch_summary.html", "plagiarism_report.json", "s1/results.jsonl"] {
            assert!(out.path().join(file).is_file(), "缺少 {}", file);
        }
        // 失败的学生只有失败报告
        assert!(!out.path().join("s2/results.jsonl").exists());
        let failure = std::fs::read_to_string(out.path().join("s2/summary.html")).unwrap();
        assert!(failure.contains("fetch_error"));

        let s1_html = std::fs::read_to_string(out.path().join("s1/summary.html")).unwrap();
        assert!(s1_html.contains("查重结果"));
        assert!(s1_html.contains("<b>s3</b>"));

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.path().join("batch_summary.json")).unwrap()).unwrap();
        assert_eq!(summary["total_students"], 3);
        assert_eq!(summary["failed"], 1);
        assert_eq!(summary["results"][1]["student"], "s2");
    }

    #[test]
    fn jsonl_starts_with_summary_line() {
        let report = sample_report();
        let jsonl = render_jsonl(&report.results[0]).unwrap();
        let lines: Vec<&str> = jsonl.lines().collect();

        assert_eq!(lines.len(), 3);
        let summary: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(summary["score"], "50.00%");
        assert_eq!(summary["passed_checks"], 1);
        assert_eq!(summary["failed_checks"], 1);
    }

    #[test]
    fn html_escapes_student_content() {
        assert_eq!(escape_html("<script>&'\""), "&lt;script&gt;&amp;&#39;&quot;");
    }
}

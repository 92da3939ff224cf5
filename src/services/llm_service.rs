//! LLM 服务 - 业务能力层
//!
//! 只负责"定性分析"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用（见 `clients::llm_client`）
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Gemini, Azure 等）

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::clients::{GithubClient, LlmClient};
use crate::infrastructure::WorkArea;
use crate::models::{LabSpec, QualitativeAnalysis};
use crate::utils::logging::truncate_text;

/// README 和提交历史在提示词中的最大长度
const MAX_SECTION_CHARS: usize = 6000;

/// 定性分析能力
///
/// 可选能力：失败时由流程记录 `analysis_failed`，不影响评分。
#[async_trait]
pub trait QualitativeAnalyzer: Send + Sync {
    async fn analyze(&self, area: &WorkArea, spec: &LabSpec) -> Result<QualitativeAnalysis>;
}

/// LLM 服务
///
/// 职责：
/// - 收集 README 和提交信息
/// - 调用 LLM 给出结论、理由和引用
/// - 只处理单个学生
pub struct LlmService {
    llm: LlmClient,
    github: Arc<GithubClient>,
}

impl LlmService {
    pub fn new(llm: LlmClient, github: Arc<GithubClient>) -> Self {
        Self { llm, github }
    }

    /// 构建分析用的消息
    ///
    /// 返回 (user_message, system_message)
    fn build_messages(spec: &LabSpec, readme: &str, commit_messages: &str) -> (String, String) {
        let system_message = "你是一名经验丰富的编程课程教师，正在检查学生的课程项目。\
                              你只输出 JSON，不输出任何其他内容。"
            .to_string();

        let user_message = format!(
            r#"请分析以下学生作业（实验: {}）并给出建设性的反馈。

README.md 内容：
---
{}
---

提交历史：
---
{}
---

回答必须是 JSON，包含以下字段：
- "verdict": 简短结论，取值为 "excellent"、"good"、"satisfactory"、"weak"、"fail" 之一
- "reasons": 字符串列表，说明评价理由：哪些做得好，哪些不足
- "quotes": 2-3 条来自 README 或提交信息的原文引用，用于支撑你的结论

示例：
{{
  "verdict": "good",
  "reasons": ["README 结构清晰", "部分提交信息不符合约定格式"],
  "quotes": ["feat: add user authentication", "Initial commit"]
}}"#,
            spec.id,
            truncate_text(readme, MAX_SECTION_CHARS),
            truncate_text(commit_messages, MAX_SECTION_CHARS)
        );

        (user_message, system_message)
    }
}

#[async_trait]
impl QualitativeAnalyzer for LlmService {
    async fn analyze(&self, area: &WorkArea, spec: &LabSpec) -> Result<QualitativeAnalysis> {
        let readme = area
            .read_file("README.md")
            .unwrap_or_else(|| "未找到 README.md".to_string());

        let branch = area.snapshot().map(|s| s.default_branch.as_str()).unwrap_or("main");
        let commits = self
            .github
            .commits(area.repo(), branch)
            .await
            .with_context(|| format!("获取 {} 的提交记录失败", area.repo()))?;
        let commit_messages = if commits.is_empty() {
            "未找到提交记录".to_string()
        } else {
            commits.iter().map(|c| c.message()).collect::<Vec<_>>().join("\n")
        };

        let (user_message, system_message) = Self::build_messages(spec, &readme, &commit_messages);
        debug!("开始 LLM 定性分析: {}, 模型: {}", area.repo(), self.llm.model_name());

        let response = self.llm.chat(&user_message, Some(&system_message)).await?;
        parse_analysis(&response)
    }
}

/// 解析 LLM 返回的 JSON，允许外面包着 ```json 代码块
pub fn parse_analysis(response: &str) -> Result<QualitativeAnalysis> {
    let cleaned = response.trim().replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    // 模型偶尔会在 JSON 前后加说明文字
    let json = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => cleaned,
    };

    serde_json::from_str(json)
        .with_context(|| format!("无法解析 LLM 响应: {}", truncate_text(cleaned, 100)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let analysis = parse_analysis(r#"{"verdict": "good", "reasons": ["ok"], "quotes": []}"#).unwrap();
        assert_eq!(analysis.verdict, "good");
        assert_eq!(analysis.reasons, vec!["ok"]);
    }

    #[test]
    fn strips_code_fences_and_chatter() {
        let response = "好的，以下是分析：\n```json\n{\"verdict\": \"weak\", \"reasons\": [], \"quotes\": [\"wip\"]}\n```";
        let analysis = parse_analysis(response).unwrap();
        assert_eq!(analysis.verdict, "weak");
        assert_eq!(analysis.quotes, vec!["wip"]);
    }

    #[test]
    fn missing_optional_lists_default_to_empty() {
        let analysis = parse_analysis(r#"{"verdict": "fail"}"#).unwrap();
        assert!(analysis.reasons.is_empty());
        assert!(analysis.quotes.is_empty());
    }

    #[test]
    fn rejects_non_json_reply() {
        assert!(parse_analysis("我无法完成这个请求").is_err());
    }

    #[test]
    fn prompt_contains_readme_and_commits() {
        let spec = LabSpec::new("lab-01", "repo", Vec::new());
        let (user, system) = LlmService::build_messages(&spec, "# My Lab", "feat: init");
        assert!(user.contains("lab-01"));
        assert!(user.contains("# My Lab"));
        assert!(user.contains("feat: init"));
        assert!(system.contains("JSON"));
    }
}

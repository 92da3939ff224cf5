use crate::error::SpecError;
use crate::models::lab_spec::{CheckRule, CheckSpec, LabSpec};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::Path;
use tokio::fs;

/// 规格文件的原始形态，`params` 先按通用 JSON 读入，再按 `type` 解析
#[derive(Debug, Deserialize)]
struct RawLabSpec {
    id: String,
    #[serde(default)]
    repo_name: String,
    #[serde(default)]
    checks: Vec<RawCheckSpec>,
}

#[derive(Debug, Deserialize)]
struct RawCheckSpec {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: JsonValue,
    #[serde(default)]
    description: String,
}

/// 从 TOML / YAML 文件加载实验规格
///
/// 扩展名为 `.yaml` / `.yml` 时按 YAML 解析，其余按 TOML 解析。
pub async fn load_lab_spec(spec_path: &Path) -> Result<LabSpec, SpecError> {
    let path = spec_path.display().to_string();
    let content = fs::read_to_string(spec_path)
        .await
        .map_err(|source| SpecError::Unreadable {
            path: path.clone(),
            source,
        })?;

    let is_yaml = matches!(
        spec_path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    );
    let spec = if is_yaml {
        parse_yaml_spec(&content, &path)?
    } else {
        parse_toml_spec(&content, &path)?
    };

    tracing::info!("✅ 规格 '{}' 加载成功，检查项数量: {}", spec.id, spec.checks.len());
    Ok(spec)
}

pub fn parse_toml_spec(content: &str, path: &str) -> Result<LabSpec, SpecError> {
    let raw: RawLabSpec = toml::from_str(content).map_err(|e| SpecError::ParseFailed {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    into_lab_spec(raw)
}

pub fn parse_yaml_spec(content: &str, path: &str) -> Result<LabSpec, SpecError> {
    let raw: RawLabSpec = serde_yaml::from_str(content).map_err(|e| SpecError::ParseFailed {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    into_lab_spec(raw)
}

fn into_lab_spec(raw: RawLabSpec) -> Result<LabSpec, SpecError> {
    let checks = raw
        .checks
        .into_iter()
        .map(into_check_spec)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LabSpec {
        id: raw.id,
        repo_name: raw.repo_name,
        checks,
    })
}

fn into_check_spec(raw: RawCheckSpec) -> Result<CheckSpec, SpecError> {
    // 未知类型不在加载时报错，评估时记为 ERROR
    if !CheckRule::KINDS.contains(&raw.kind.as_str()) {
        tracing::warn!("检查项 {} 使用了未知类型: {}", raw.id, raw.kind);
        return Ok(CheckSpec {
            id: raw.id,
            description: raw.description,
            rule: CheckRule::Unsupported { kind: raw.kind },
        });
    }

    let mut params = match raw.params {
        JsonValue::Object(map) => map,
        JsonValue::Null => serde_json::Map::new(),
        other => {
            return Err(SpecError::InvalidCheck {
                check_id: raw.id,
                kind: raw.kind,
                reason: format!("params 必须是表，实际为 {}", other),
            })
        }
    };
    params.insert("type".to_string(), JsonValue::String(raw.kind.clone()));

    let rule: CheckRule =
        serde_json::from_value(JsonValue::Object(params)).map_err(|e| SpecError::InvalidCheck {
            check_id: raw.id.clone(),
            kind: raw.kind.clone(),
            reason: e.to_string(),
        })?;

    Ok(CheckSpec {
        id: raw.id,
        description: raw.description,
        rule,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_SPEC: &str = r#"
id = "lab-01"
repo_name = "lab-01-market-product-and-git"

[[checks]]
id = "repo"
type = "repo_exists"
description = "仓库存在"

[[checks]]
id = "readme"
type = "file_exists"
params = { path = "README.md" }

[[checks]]
id = "issues"
type = "issues_count"
params = { title_regex = "^\\[Task\\]", min_count = 3 }

[[checks]]
id = "future"
type = "branch_protection"
"#;

    #[test]
    fn parses_toml_checks_into_typed_rules() {
        let spec = parse_toml_spec(TOML_SPEC, "lab-01.toml").unwrap();

        assert_eq!(spec.id, "lab-01");
        assert_eq!(spec.checks.len(), 4);
        assert_eq!(spec.checks[0].rule, CheckRule::RepoExists);
        assert_eq!(
            spec.checks[1].rule,
            CheckRule::FileExists {
                path: "README.md".into()
            }
        );
        assert_eq!(
            spec.checks[2].rule,
            CheckRule::IssuesCount {
                title_regex: "^\\[Task\\]".into(),
                min_count: 3
            }
        );
        assert_eq!(spec.checks[3].rule.kind(), "branch_protection");
    }

    #[test]
    fn parses_yaml_spec() {
        let yaml = r#"
id: lab-02
repo_name: lab-02
checks:
  - id: commits
    type: commit_message_regex
    params:
      pattern: "^(feat|fix|docs):"
  - id: prs
    type: pr_merged_count
    params:
      min_count: 1
"#;
        let spec = parse_yaml_spec(yaml, "lab-02.yaml").unwrap();
        assert_eq!(spec.checks[1].rule, CheckRule::PrMergedCount { min_count: 1 });
    }

    #[test]
    fn rejects_missing_params_for_known_kind() {
        let toml = r#"
id = "lab"
[[checks]]
id = "readme"
type = "file_exists"
"#;
        let err = parse_toml_spec(toml, "lab.toml").unwrap_err();
        assert!(matches!(err, SpecError::InvalidCheck { ref check_id, .. } if check_id == "readme"));
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let err = load_lab_spec(Path::new("/definitely/not/here.toml")).await.unwrap_err();
        assert!(matches!(err, SpecError::Unreadable { .. }));
    }
}

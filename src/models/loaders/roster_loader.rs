use crate::error::RosterError;
use crate::models::student::StudentIdentity;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

/// 名单文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterFormat {
    /// 第一行为表头，取 `student_alias` 列，没有则取第一列
    Csv,
    /// 字符串数组 `["student1", "student2"]`
    Json,
    /// 每行一个学生
    Lines,
}

impl RosterFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("csv") => RosterFormat::Csv,
            Some("json") => RosterFormat::Json,
            _ => RosterFormat::Lines,
        }
    }
}

/// 从文件加载学生名单，保持文件中的顺序
pub async fn load_roster(roster_path: &Path) -> Result<Vec<StudentIdentity>, RosterError> {
    let path = roster_path.display().to_string();
    let content = fs::read_to_string(roster_path)
        .await
        .map_err(|source| RosterError::Unreadable {
            path: path.clone(),
            source,
        })?;

    let roster = parse_roster(&content, RosterFormat::from_path(roster_path), &path)?;
    tracing::info!("📋 已加载学生名单: {} 人 ({})", roster.len(), path);
    Ok(roster)
}

/// 解析名单内容，空行被忽略，重复或为空时报错
pub fn parse_roster(content: &str, format: RosterFormat, path: &str) -> Result<Vec<StudentIdentity>, RosterError> {
    let aliases = match format {
        RosterFormat::Csv => parse_csv(content),
        RosterFormat::Json => parse_json(content, path)?,
        RosterFormat::Lines => content.lines().map(|l| l.trim().to_string()).collect(),
    };

    let mut seen = HashSet::new();
    let mut roster = Vec::new();
    for alias in aliases.into_iter().filter(|a| !a.is_empty()) {
        if !seen.insert(alias.clone()) {
            return Err(RosterError::Duplicate {
                identity: alias,
                position: roster.len() + 1,
            });
        }
        roster.push(StudentIdentity::new(alias));
    }

    if roster.is_empty() {
        return Err(RosterError::Empty);
    }
    Ok(roster)
}

fn parse_csv(content: &str) -> Vec<String> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };

    let column = split_csv_line(header)
        .iter()
        .position(|h| h == "student_alias")
        .unwrap_or(0);

    lines
        .map(|line| split_csv_line(line).into_iter().nth(column).unwrap_or_default())
        .collect()
}

fn split_csv_line(line: &str) -> Vec<String> {
    line.split(',')
        .map(|cell| cell.trim().trim_matches('"').trim().to_string())
        .collect()
}

fn parse_json(content: &str, path: &str) -> Result<Vec<String>, RosterError> {
    let aliases: Vec<String> = serde_json::from_str(content).map_err(|e| RosterError::Malformed {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(aliases.into_iter().map(|a| a.trim().to_string()).collect())
}

//! 批次报告
//!
//! `BatchReport` 是渲染的唯一输入，组装完成后不再修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::result::{ErrorKind, StudentResult};
use crate::models::student::StudentIdentity;

/// 两个学生之间的相似度，`a < b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityPair {
    pub a: StudentIdentity,
    pub b: StudentIdentity,
    pub score: f64,
    /// 两份提交中规范化后内容完全相同的文件
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_files: Vec<String>,
}

impl SimilarityPair {
    pub fn involves(&self, student: &StudentIdentity) -> bool {
        &self.a == student || &self.b == student
    }

    /// 对于 `student` 而言的另一方
    pub fn other(&self, student: &StudentIdentity) -> Option<&StudentIdentity> {
        if &self.a == student {
            Some(&self.b)
        } else if &self.b == student {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// 疑似抄袭小组：通过超过阈值的相似度传递连通的学生
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlagiarismGroup {
    /// 按字典序排列
    pub members: Vec<StudentIdentity>,
    /// 组内最高的两两相似度
    pub peak_score: f64,
}

/// 查重引擎的输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub pairs: Vec<SimilarityPair>,
    pub groups: Vec<PlagiarismGroup>,
}

impl SimilarityReport {
    /// 与某个学生相关的匹配，按相似度从高到低
    pub fn matches_for(&self, student: &StudentIdentity) -> Vec<&SimilarityPair> {
        // pairs 本身已按相似度降序排列
        self.pairs.iter().filter(|p| p.involves(student)).collect()
    }

    pub fn flagged_students(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }
}

/// 运行级元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub spec_id: String,
    pub repo_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub workers: usize,
    /// 未启用查重时为 None
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// 批次报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub metadata: BatchMetadata,
    /// 与名单顺序一致
    pub results: Vec<StudentResult>,
    pub similarity: SimilarityReport,
}

/// 批次汇总统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_students: usize,
    pub successful: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,
    pub elapsed_time_seconds: f64,
    pub average_time_per_student: f64,
    pub plagiarism_detected: usize,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let total = self.results.len();
        let successful = self.results.iter().filter(|r| r.is_success()).count();

        let mut failures_by_kind = BTreeMap::new();
        for kind in self.results.iter().filter_map(StudentResult::error_kind) {
            *failures_by_kind.entry(kind).or_insert(0) += 1;
        }

        let elapsed = (self.metadata.finished_at - self.metadata.started_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;

        BatchSummary {
            total_students: total,
            successful,
            failed: total - successful,
            failures_by_kind,
            elapsed_time_seconds: elapsed,
            average_time_per_student: if total > 0 { elapsed / total as f64 } else { 0.0 },
            plagiarism_detected: self.similarity.flagged_students(),
        }
    }
}

//! 查重引擎
//!
//! 所有学生的流水线结束后运行：规范化每份提交，全量两两打分，
//! 把达到阈值的配对按连通性聚成抄袭小组。
//!
//! ```text
//! GradingArtifact → tokenizer::tokenize (按扩展名选注释语法) → Fingerprint (3-gram shingles)
//!                 → Jaccard → SimilarityPair (≥ threshold) → 并查集 → PlagiarismGroup
//! ```

pub mod engine;
pub mod tokenizer;

pub use engine::{analyze, score, Fingerprint};
pub use tokenizer::{tokenize, tokenize_with, CommentStyle};

//! # Autochecker
//!
//! 批量评测学生 GitHub 作业仓库，并对全部提交做两两查重
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `infrastructure/` - 独占的临时工作目录、zip 安全解压
//! - `clients/` - GitHub REST（带磁盘缓存）、OpenAI 兼容的 LLM 接口
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个学生
//! - `SourceFetcher` - 拉取仓库快照
//! - `Evaluator` - 按实验规格逐项检查
//! - `QualitativeAnalyzer` - LLM 定性分析（可选）
//! - `ReportWriter` - 写 JSONL / JSON / HTML 报告
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个学生"的完整评测流程
//! - `StudentCtx` - 日志上下文（名单位置 + 仓库）
//! - `GradingFlow` - 流程编排（fetch → evaluate → collect → analyze）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 有限并发调度、超时与 panic 隔离、结果按名单顺序收集
//!
//! ### 查重引擎（Similarity）
//! - `similarity/` - 纯函数：规范化、shingle 指纹、Jaccard、并查集聚类
//!
//! ## 模块结构

pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod similarity;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{BatchReport, LabSpec, StudentIdentity, StudentResult, WorkItem};
pub use orchestrator::{run_batch, App, BatchJob};
pub use similarity::{analyze, score};
pub use workflow::{GradingFlow, StudentCtx};

//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ### `batch_processor` - 批量评测处理器
//! - `run_batch`：有限并发、按名单顺序补位、按下标收集结果
//! - `App`：管理应用生命周期（初始化、运行、写报告），持有 GitHub 客户端和批次工作目录
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<WorkItem>)
//!     ↓
//! workflow::GradingFlow (处理单个学生)
//!     ↓
//! services (能力层：fetch / evaluate / collect / llm / report)
//!     ↓
//! infrastructure (基础设施：WorkArea / zip 解压)
//! ```
//!
//! 查重引擎（`similarity`）在全部流水线结束后由 `App` 调用，不进入本层的并发域。

pub mod batch_processor;

// 重新导出主要类型
pub use batch_processor::{run_batch, App, BatchJob};

pub mod artifact_collector;
pub mod evaluator;
pub mod fetcher;
pub mod llm_service;
pub mod report_writer;

pub use artifact_collector::collect_artifact;
pub use evaluator::{Evaluator, RuleEvaluator};
pub use fetcher::{GithubFetcher, SourceFetcher};
pub use llm_service::{LlmService, QualitativeAnalyzer};
pub use report_writer::ReportWriter;

pub mod lab_spec;
pub mod loaders;
pub mod report;
pub mod result;
pub mod student;

pub use lab_spec::{CheckRule, CheckSpec, LabSpec};
pub use loaders::{load_lab_spec, load_roster};
pub use report::{BatchMetadata, BatchReport, BatchSummary, PlagiarismGroup, SimilarityPair, SimilarityReport};
pub use result::{CheckResult, CheckStatus, ErrorKind, GradingArtifact, Outcome, QualitativeAnalysis, StudentResult};
pub use student::{RepoRef, StudentIdentity, WorkItem};

//! 基础设施层：持有磁盘资源，只暴露能力

pub mod archive;
pub mod work_area;

pub use archive::extract_zipball;
pub use work_area::{BatchWorkspace, RepoSnapshot, WorkArea};

//! 输入文件加载：学生名单与实验规格

pub mod roster_loader;
pub mod spec_loader;

pub use roster_loader::{load_roster, parse_roster, RosterFormat};
pub use spec_loader::{load_lab_spec, parse_toml_spec, parse_yaml_spec};

//! 命令行参数
//!
//! 参数优先级：命令行 > 环境变量 > 默认值。未在命令行给出的选项保持 `Config::from_env()` 的结果。

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// GitHub 作业批量评测与查重工具
#[derive(Parser, Debug)]
#[command(name = "autochecker", version, about = "批量检查学生的 GitHub 仓库并检测疑似抄袭")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short = 'v', long, global = true, help = "显示详细日志")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "批量评测名单中的所有学生")]
    Batch(BatchArgs),

    #[command(about = "评测单个学生")]
    Check(CheckArgs),
}

/// 两个子命令共用的选项
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    #[arg(short = 'r', long, value_name = "NAME", help = "学生仓库名（所有学生相同）")]
    pub repo: String,

    #[arg(
        short = 's',
        long,
        value_name = "PATH",
        default_value = "specs/lab-01.toml",
        help = "实验规格文件 (.toml / .yaml)"
    )]
    pub spec: PathBuf,

    #[arg(short = 'o', long, value_name = "DIR", help = "报告输出目录 [默认: results]")]
    pub output: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, help = "GitHub Token")]
    pub token: Option<String>,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true, help = "LLM API Key，提供时启用定性分析")]
    pub llm_api_key: Option<String>,

    #[arg(long, value_name = "SECONDS", help = "单个学生的超时时间")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    #[arg(long, value_name = "PATH", help = "学生名单 (.csv / .json / .txt)")]
    pub students: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(short = 'w', long, value_name = "N", help = "同时评测的学生数 [默认: 10]")]
    pub workers: Option<usize>,

    #[arg(long, help = "关闭查重")]
    pub no_plagiarism: bool,

    #[arg(long, value_name = "RATIO", help = "查重阈值 0-1 [默认: 0.8]")]
    pub plagiarism_threshold: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[arg(long, value_name = "ALIAS", help = "学生的 GitHub 账号")]
    pub student: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl CommonArgs {
    fn apply_to(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(token) = &self.token {
            config.github_token = token.clone();
        }
        if let Some(key) = self.llm_api_key.as_ref().filter(|k| !k.is_empty()) {
            config.llm_api_key = Some(key.clone());
        }
        if self.timeout.is_some() {
            config.student_timeout_secs = self.timeout;
        }
    }
}

impl Command {
    /// 把命令行选项覆盖到配置上
    pub fn apply_to(&self, config: &mut Config) {
        match self {
            Command::Batch(args) => {
                args.common.apply_to(config);
                if let Some(workers) = args.workers {
                    config.max_concurrent_students = workers;
                }
                if args.no_plagiarism {
                    config.check_plagiarism = false;
                }
                if let Some(threshold) = args.plagiarism_threshold {
                    config.plagiarism_threshold = threshold;
                }
            }
            Command::Check(args) => {
                args.common.apply_to(config);
                config.max_concurrent_students = 1;
                config.check_plagiarism = false;
            }
        }
    }

    pub fn common(&self) -> &CommonArgs {
        match self {
            Command::Batch(args) => &args.common,
            Command::Check(args) => &args.common,
        }
    }
}

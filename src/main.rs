use anyhow::{Context, Result};
use clap::Parser;

use autochecker::cli::{Cli, Command};
use autochecker::models::{load_lab_spec, load_roster, StudentIdentity};
use autochecker::utils::logging;
use autochecker::{App, BatchJob, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 先初始化日志，配置加载时的警告才能输出
    logging::init(cli.verbose);

    // 加载配置：默认值 < 环境变量 < 命令行
    let mut config = Config::from_env();
    cli.command.apply_to(&mut config);

    let common = cli.command.common();
    let mut spec = load_lab_spec(&common.spec)
        .await
        .with_context(|| format!("无法加载实验规格 {}", common.spec.display()))?;
    spec.repo_name = common.repo.clone();

    match &cli.command {
        Command::Batch(args) => {
            let roster = load_roster(&args.students)
                .await
                .with_context(|| format!("无法加载学生名单 {}", args.students.display()))?;

            let app = App::initialize(config).await?;
            app.run(BatchJob { roster, spec }).await?;
        }
        Command::Check(args) => {
            let app = App::initialize(config).await?;
            app.check_one(StudentIdentity::new(args.student.trim()), spec).await?;
        }
    }

    Ok(())
}

use crate::error::ConfigError;
use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的学生数量
    pub max_concurrent_students: usize,
    /// 单个学生的超时时间（秒），None 表示不限时
    pub student_timeout_secs: Option<u64>,
    /// 结果输出目录
    pub output_dir: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 查重配置 ---
    pub check_plagiarism: bool,
    pub plagiarism_threshold: f64,
    // --- GitHub 配置 ---
    pub github_token: String,
    pub github_api_base_url: String,
    /// API 响应缓存目录，None 表示禁用缓存
    pub cache_dir: Option<String>,
    /// 仓库压缩包解压后的大小上限（字节）
    pub max_archive_bytes: u64,
    // --- LLM 配置 ---
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_students: 10,
            student_timeout_secs: None,
            output_dir: "results".to_string(),
            verbose_logging: false,
            check_plagiarism: true,
            plagiarism_threshold: 0.8,
            github_token: String::new(),
            github_api_base_url: "https://api.github.com".to_string(),
            cache_dir: Some(".autochecker_cache".to_string()),
            max_archive_bytes: 200 * 1024 * 1024,
            llm_api_key: None,
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-1.5-flash".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置或无法解析的变量使用默认值
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_students: env_parse("MAX_CONCURRENT_STUDENTS").unwrap_or(default.max_concurrent_students),
            student_timeout_secs: env_parse("STUDENT_TIMEOUT_SECS").or(default.student_timeout_secs),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or(default.output_dir),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            check_plagiarism: env_parse("CHECK_PLAGIARISM").unwrap_or(default.check_plagiarism),
            plagiarism_threshold: env_parse("PLAGIARISM_THRESHOLD").unwrap_or(default.plagiarism_threshold),
            github_token: std::env::var("GITHUB_TOKEN").unwrap_or(default.github_token),
            github_api_base_url: std::env::var("GITHUB_API_BASE_URL").unwrap_or(default.github_api_base_url),
            cache_dir: match std::env::var("CACHE_DIR") {
                Ok(v) if v.is_empty() => None,
                Ok(v) => Some(v),
                Err(_) => default.cache_dir,
            },
            max_archive_bytes: env_parse("MAX_ARCHIVE_BYTES").unwrap_or(default.max_archive_bytes),
            llm_api_key: std::env::var("LLM_API_KEY").ok().filter(|v| !v.is_empty()).or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
        }
    }

    /// 校验配置，在调度开始前调用
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_students == 0 {
            return Err(ConfigError::InvalidWorkers(0));
        }
        validate_threshold(self.plagiarism_threshold)?;
        if self.student_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.github_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(())
    }

    pub fn student_timeout(&self) -> Option<Duration> {
        self.student_timeout_secs.map(Duration::from_secs)
    }

    /// 是否启用 LLM 定性分析
    pub fn llm_enabled(&self) -> bool {
        self.llm_api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// 阈值必须落在 [0, 1]，NaN 也会被拒绝
pub fn validate_threshold(threshold: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold(threshold))
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str) -> Option<T> {
    let value = std::env::var(var_name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            let err = ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            };
            tracing::warn!("{}，使用默认值", err);
            None
        }
    }
}

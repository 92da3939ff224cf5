use thiserror::Error;

/// 应用程序级致命错误
///
/// 只有在调度开始之前才会出现，出现即终止整个批次。
/// 单个学生的失败不会走到这里，而是记录在 `StudentResult` 中。
#[derive(Debug, Error)]
pub enum AppError {
    /// 学生名单错误
    #[error("名单错误: {0}")]
    Roster(#[from] RosterError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 实验规格错误
    #[error("规格错误: {0}")]
    Spec(#[from] SpecError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 学生名单错误
#[derive(Debug, Error)]
pub enum RosterError {
    /// 名单文件无法读取
    #[error("无法读取名单文件 {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 名单格式错误
    #[error("名单文件格式错误 ({path}): {reason}")]
    Malformed { path: String, reason: String },
    /// 名单为空
    #[error("学生名单为空")]
    Empty,
    /// 名单中存在重复的学生
    #[error("学生 {identity} 在名单中重复出现 (第 {position} 项)")]
    Duplicate { identity: String, position: usize },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 并发数必须大于 0
    #[error("并发数必须 >= 1，当前为 {0}")]
    InvalidWorkers(usize),
    /// 相似度阈值必须在 [0, 1] 之间
    #[error("相似度阈值必须在 [0, 1] 之间，当前为 {0}")]
    InvalidThreshold(f64),
    /// 超时时间必须大于 0
    #[error("单个学生的超时时间必须大于 0 秒")]
    InvalidTimeout,
    /// 缺少 GitHub Token
    #[error("未提供 GitHub Token (--token 或环境变量 GITHUB_TOKEN)")]
    MissingToken,
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 实验规格错误
#[derive(Debug, Error)]
pub enum SpecError {
    /// 规格文件无法读取
    #[error("无法读取规格文件 {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 规格文件解析失败
    #[error("规格文件解析失败 ({path}): {reason}")]
    ParseFailed { path: String, reason: String },
    /// 检查项参数不合法
    #[error("检查项 {check_id} ({kind}) 参数不合法: {reason}")]
    InvalidCheck {
        check_id: String,
        kind: String,
        reason: String,
    },
}

/// GitHub API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// API 返回错误响应
    #[error("API返回错误响应 ({endpoint}): HTTP {status}")]
    BadResponse { endpoint: String, status: u16 },
    /// 请求频率限制
    #[error("API请求频率限制 ({endpoint}), 建议等待: {retry_after:?}秒")]
    RateLimited {
        endpoint: String,
        retry_after: Option<u64>,
    },
    /// JSON 解析失败
    #[error("JSON解析失败 ({endpoint}): {source}")]
    JsonParseFailed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 压缩包解压错误
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("无法读取 zip 压缩包: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// 压缩包中包含越界路径（zip slip）
    #[error("压缩包包含非法路径: {0}")]
    UnsafePath(String),
    #[error("解压后大小超过上限 {limit} 字节")]
    TooLarge { limit: u64 },
    #[error("解压写入失败: {0}")]
    Io(#[from] std::io::Error),
    /// 调用方已放弃（例如超时），解压目录已删除
    #[error("解压已取消")]
    Cancelled,
}

/// 拉取源码失败（单个学生，非致命）
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("仓库 {repo} 不存在或无法访问")]
    NotFound { repo: String },
    #[error("仓库 {repo} 是私有仓库")]
    Private { repo: String },
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("无法准备工作目录: {0}")]
    WorkArea(#[source] std::io::Error),
    #[error("解压任务异常中止: {0}")]
    TaskAborted(String),
}

/// 规格评估失败（单个学生，非致命）
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// 工作目录中还没有拉取到的仓库快照
    #[error("工作目录 {0} 中没有仓库快照")]
    MissingSnapshot(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// 提取比对材料失败（单个学生，非致命）
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("无法读取 {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("提取任务异常中止: {0}")]
    TaskAborted(String),
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

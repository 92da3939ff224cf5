//! 比对材料提取 - 业务能力层
//!
//! 遍历源码目录，收集可用于查重的文本文件

use phf::phf_set;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::NormalizationError;
use crate::models::GradingArtifact;

/// 不参与比对的目录
static IGNORED_DIRS: phf::Set<&'static str> = phf_set! {
    ".git",
    ".github",
    ".idea",
    ".vscode",
    ".venv",
    "venv",
    "node_modules",
    "__pycache__",
    "target",
    "dist",
    "build",
};

/// 二进制或生成文件的扩展名
static IGNORED_EXTENSIONS: phf::Set<&'static str> = phf_set! {
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp",
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    "zip", "tar", "gz", "7z", "rar",
    "exe", "dll", "so", "dylib", "class", "jar", "pyc", "o", "a",
    "mp3", "mp4", "mov", "wav",
    "ttf", "woff", "woff2", "lock",
};

/// 单个文件的大小上限，超过的文件视为生成物
const MAX_FILE_BYTES: u64 = 512 * 1024;

/// 在阻塞线程池中提取比对材料
pub async fn collect_artifact(source_root: &Path) -> Result<GradingArtifact, NormalizationError> {
    let root = source_root.to_path_buf();
    tokio::task::spawn_blocking(move || collect_from_dir(&root))
        .await
        .map_err(|e| NormalizationError::TaskAborted(e.to_string()))?
}

/// 收集 `root` 下所有文本文件，键为使用 `/` 分隔的相对路径
pub fn collect_from_dir(root: &Path) -> Result<GradingArtifact, NormalizationError> {
    let mut artifact = GradingArtifact::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).map_err(|e| io_error(&dir, e))? {
            let entry = entry.map_err(|e| io_error(&dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| io_error(&path, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if file_type.is_dir() {
                if !IGNORED_DIRS.contains(name.as_ref()) {
                    pending.push(path);
                }
                continue;
            }
            if !file_type.is_file() || is_ignored_file(&path) {
                continue;
            }
            if entry.metadata().map_err(|e| io_error(&path, e))?.len() > MAX_FILE_BYTES {
                continue;
            }

            match fs::read_to_string(&path) {
                Ok(content) => artifact.insert(relative_key(root, &path), content),
                // 非 UTF-8 文件不参与比对
                Err(e) if e.kind() == io::ErrorKind::InvalidData => continue,
                Err(e) => return Err(io_error(&path, e)),
            }
        }
    }

    Ok(artifact)
}

fn is_ignored_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IGNORED_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn io_error(path: &Path, source: io::Error) -> NormalizationError {
    NormalizationError::Io {
        path: path.display().to_string(),
        source,
    }
}

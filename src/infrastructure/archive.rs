//! 仓库压缩包解压

use crate::error::ArchiveError;
use std::fs::{self, File};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use zip::read::ZipArchive;

/// 把 GitHub zipball 解压到 `destination_dir`，返回源码根目录
///
/// zipball 的所有条目都位于 `owner-repo-sha/` 之下，解压后若目标目录中
/// 只有这一个顶层目录，就把它作为源码根目录返回。
///
/// 每个条目之前检查 `cancelled`，被取消时停止并删除 `destination_dir`。
pub fn extract_zipball(
    archive_bytes: &[u8],
    destination_dir: &Path,
    max_uncompressed_size: u64,
    cancelled: &AtomicBool,
) -> Result<PathBuf, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    let mut total_uncompressed_size = 0u64;

    for i in 0..archive.len() {
        if cancelled.load(Ordering::SeqCst) {
            return Err(abandon(destination_dir));
        }
        let mut file = archive.by_index(i)?;
        let relative = file
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafePath(file.name().to_string()))?;
        let outpath = destination_dir.join(relative);

        total_uncompressed_size += file.size();
        if total_uncompressed_size > max_uncompressed_size {
            return Err(ArchiveError::TooLarge {
                limit: max_uncompressed_size,
            });
        }

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(p) = outpath.parent() {
                fs::create_dir_all(p)?;
            }
            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut file, &mut outfile)?;
        }
    }

    if cancelled.load(Ordering::SeqCst) {
        return Err(abandon(destination_dir));
    }
    Ok(single_top_level_dir(destination_dir).unwrap_or_else(|| destination_dir.to_path_buf()))
}

fn abandon(destination_dir: &Path) -> ArchiveError {
    if let Err(e) = fs::remove_dir_all(destination_dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("取消解压后清理 {} 失败: {}", destination_dir.display(), e);
        }
    }
    ArchiveError::Cancelled
}

fn single_top_level_dir(dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).ok()?.filter_map(Result::ok);
    let first = entries.next()?;
    if entries.next().is_some() {
        return None;
    }
    let path = first.path();
    path.is_dir().then_some(path)
}

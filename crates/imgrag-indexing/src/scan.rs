use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub const DEFAULT_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".webp"];

/// 按扩展名识别支持的图片文件
#[derive(Debug, Clone)]
pub struct ImageScanner {
    extensions: Vec<String>,
}

impl Default for ImageScanner {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied())
    }
}

impl ImageScanner {
    /// 扩展名不区分大小写，带不带前导 `.` 都可以
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// 递归枚举目录下的图片，按文件名排序，`max` 限制数量
    pub fn scan(&self, dir: &Path, max: Option<usize>) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.is_supported(path))
            .take(max.unwrap_or(usize::MAX))
            .collect()
    }
}

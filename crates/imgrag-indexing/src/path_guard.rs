use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use directories::BaseDirs;
use tracing::debug;

use crate::error::{IndexingError, IndexingResult};

/// 文件访问白名单
///
/// 只有位于某个根目录之下的路径才允许被处理。克隆出的实例共享同一份根目录列表，
/// 运行时通过 [`PathValidator::set_roots`] 替换后所有持有者立即可见。
#[derive(Debug, Clone, Default)]
pub struct PathValidator {
    roots: Arc<RwLock<Vec<PathBuf>>>,
}

impl PathValidator {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: Arc::new(RwLock::new(roots.into_iter().map(Into::into).collect())),
        }
    }

    /// 用户主目录 + 当前工作目录
    pub fn default_roots() -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if let Some(dirs) = BaseDirs::new() {
            roots.push(dirs.home_dir().to_path_buf());
        }
        if let Ok(cwd) = std::env::current_dir() {
            roots.push(cwd);
        }
        roots
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_roots(&self, roots: Vec<PathBuf>) {
        debug!("allowed roots replaced: {:?}", roots);
        *self.roots.write().unwrap_or_else(|e| e.into_inner()) = roots;
    }

    pub fn is_allowed(&self, path: &Path) -> bool {
        let candidate = normalize(path);
        let roots = self.roots.read().unwrap_or_else(|e| e.into_inner());
        roots.iter().any(|root| candidate.starts_with(normalize(root)))
    }

    /// 校验通过时返回规范化后的绝对路径
    pub fn check(&self, path: &Path) -> IndexingResult<PathBuf> {
        if self.is_allowed(path) {
            Ok(normalize(path))
        } else {
            Err(IndexingError::PathDenied(path.to_path_buf()))
        }
    }
}

/// 转为绝对路径并按词法消除 `.` 与 `..`，不访问文件系统
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_root() {
        let validator = PathValidator::new(["/data"]);
        assert!(validator.is_allowed(Path::new("/data/x/y.jpg")));
        assert!(validator.is_allowed(Path::new("/data")));
        assert!(!validator.is_allowed(Path::new("/etc/passwd")));
    }

    #[test]
    fn test_traversal_and_sibling_prefix() {
        let validator = PathValidator::new(["/data"]);
        assert!(!validator.is_allowed(Path::new("/data/../etc/passwd")));
        assert!(!validator.is_allowed(Path::new("/database/x.jpg")));
        assert!(validator.is_allowed(Path::new("/data/./a/../b.png")));
    }

    #[test]
    fn test_check_returns_normalized() {
        let validator = PathValidator::new(["/data"]);
        let path = validator.check(Path::new("/data/a/./b/../c.jpg")).unwrap();
        assert_eq!(path, PathBuf::from("/data/a/c.jpg"));

        let err = validator.check(Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, IndexingError::PathDenied(_)));
    }

    #[test]
    fn test_set_roots_is_shared() {
        let validator = PathValidator::new(["/data"]);
        let shared = validator.clone();
        shared.set_roots(vec![PathBuf::from("/srv/images")]);

        assert!(!validator.is_allowed(Path::new("/data/x.jpg")));
        assert!(validator.is_allowed(Path::new("/srv/images/x.jpg")));
        assert_eq!(validator.roots(), vec![PathBuf::from("/srv/images")]);
    }

    #[test]
    fn test_empty_allow_list_denies_everything() {
        let validator = PathValidator::default();
        assert!(!validator.is_allowed(Path::new("/data/x.jpg")));
    }
}

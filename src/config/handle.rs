use super::SafetyConfig;
use crate::error::Result;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// 교체 가능한 설정 스냅샷 보관소
///
/// 평가 중인 요청은 시작 시점에 받은 `Arc<SafetyConfig>`만 사용하므로
/// 교체 전 설정 또는 교체 후 설정 중 하나만 보게 됩니다.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<SafetyConfig>>,
}

impl ConfigHandle {
    pub fn new(config: SafetyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// 현재 설정 스냅샷
    pub fn current_configuration(&self) -> Arc<SafetyConfig> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// 새 설정을 검증 후 게시하고 이전 스냅샷을 반환
    ///
    /// 검증에 실패하면 기존 설정이 그대로 유지됩니다.
    pub fn publish(&self, config: SafetyConfig) -> Result<Arc<SafetyConfig>> {
        config.validate()?;
        let next = Arc::new(config);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *guard, next);
        info!(
            max_rows = guard.limits.max_rows,
            max_cells = guard.limits.max_cells,
            "safety configuration published"
        );
        Ok(previous)
    }

    /// 파일에서 다시 읽어 게시
    pub fn reload_from(&self, path: &Path) -> Result<Arc<SafetyConfig>> {
        let config = SafetyConfig::load(path)?;
        self.publish(config)
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(SafetyConfig::default())),
        }
    }
}

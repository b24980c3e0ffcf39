use thiserror::Error;

#[derive(Error, Debug)]
pub enum SheetGuardError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Target not found: {message}")]
    TargetNotFound {
        message: String,
        /// 범위를 벗어난 행 인덱스 (조건 매칭 실패 시 비어 있음)
        missing_rows: Vec<usize>,
    },

    #[error("Ambiguous target: {match_count} rows match {criteria}; add more identifying columns")]
    AmbiguousTarget {
        match_count: usize,
        rows: Vec<usize>,
        criteria: String,
    },

    #[error("Operation blocked: {0}")]
    BlockedOperation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl SheetGuardError {
    /// 호출자가 요청을 수정하거나 대상을 더 구체적으로 지정해야 하는 에러인지 여부
    pub fn needs_clarification(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::TargetNotFound { .. } | Self::AmbiguousTarget { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SheetGuardError>;

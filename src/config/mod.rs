mod handle;

pub use handle::ConfigHandle;

use crate::error::{Result, SheetGuardError};
use crate::operation::OperationKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

static FUNCTION_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.]*$").unwrap());

/// sheetguard 안전성 설정
///
/// 설정 파일은 ~/.sheetguard/config.toml에 저장됩니다.
/// 모든 필드는 생략 가능하며 생략 시 기본값이 사용됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// 확인 프롬프트에 보여줄 샘플 행 수
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,

    /// 작업 범위 한도
    #[serde(default)]
    pub limits: ScopeLimits,

    /// 위험도 임계값
    #[serde(default)]
    pub risk: RiskThresholds,

    /// 차단 목록 확장
    #[serde(default)]
    pub blocking: BlockingRules,

    /// 파라미터 정제 규칙
    #[serde(default)]
    pub sanitization: SanitizationRules,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeLimits {
    #[serde(default = "default_max_rows")]
    pub max_rows: u64,

    #[serde(default = "default_max_columns")]
    pub max_columns: u64,

    #[serde(default = "default_max_cells")]
    pub max_cells: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// 이 셀 수 이상을 바꾸는 update_cells는 대량 수정(파괴적)으로 취급
    #[serde(default = "default_mass_update_min_cells")]
    pub mass_update_min_cells: u64,

    /// 비파괴 변경 작업이 이 행 수를 넘으면 High로 상향 (없으면 항상 Medium)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural_high_rows: Option<u64>,
}

/// 내장 차단 목록에 추가되는 항목 (내장 항목은 제거 불가)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingRules {
    #[serde(default)]
    pub denied_operations: Vec<OperationKind>,

    /// 추가 위험 문구 정규식 (대소문자 무시)
    #[serde(default)]
    pub dangerous_phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizationRules {
    /// 내장 목록에 추가할 위험 함수 이름
    #[serde(default)]
    pub injection_functions: Vec<String>,

    #[serde(default)]
    pub injection_policy: InjectionPolicy,

    #[serde(default = "default_max_string_length")]
    pub max_string_length: usize,

    #[serde(default = "default_max_sheet_name_length")]
    pub max_sheet_name_length: usize,
}

/// 수식 주입 감지 시 처리 방식 (경고는 항상 기록됨)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionPolicy {
    /// 위험 부분을 제거하고 계속 진행
    #[default]
    Strip,
    /// 검증 실패로 처리
    Reject,
}

fn default_preview_rows() -> usize {
    3
}

fn default_max_rows() -> u64 {
    50
}

fn default_max_columns() -> u64 {
    20
}

fn default_max_cells() -> u64 {
    1000
}

fn default_mass_update_min_cells() -> u64 {
    2
}

fn default_max_string_length() -> usize {
    1000
}

fn default_max_sheet_name_length() -> usize {
    31
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            preview_rows: default_preview_rows(),
            limits: ScopeLimits::default(),
            risk: RiskThresholds::default(),
            blocking: BlockingRules::default(),
            sanitization: SanitizationRules::default(),
        }
    }
}

impl Default for ScopeLimits {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            max_columns: default_max_columns(),
            max_cells: default_max_cells(),
        }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            mass_update_min_cells: default_mass_update_min_cells(),
            structural_high_rows: None,
        }
    }
}

impl Default for SanitizationRules {
    fn default() -> Self {
        Self {
            injection_functions: Vec::new(),
            injection_policy: InjectionPolicy::default(),
            max_string_length: default_max_string_length(),
            max_sheet_name_length: default_max_sheet_name_length(),
        }
    }
}

impl SafetyConfig {
    /// 기본 설정 파일 경로 (~/.sheetguard/config.toml)
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sheetguard")
            .join("config.toml")
    }

    /// 설정 파일에서 로드 후 검증
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SafetyConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 로드 (파일이 없으면 기본값)
    ///
    /// # Examples
    /// ```no_run
    /// use sheetguard::config::SafetyConfig;
    ///
    /// let config = SafetyConfig::load_default().unwrap();
    /// assert!(config.limits.max_rows > 0);
    /// ```
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// 설정을 파일에 저장 (상위 디렉토리가 없으면 생성)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| SheetGuardError::ConfigError(e.to_string()))?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// 설정 값 검증 (한도는 양수, 정규식은 컴파일 가능해야 함)
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("limits.max_rows", self.limits.max_rows),
            ("limits.max_columns", self.limits.max_columns),
            ("limits.max_cells", self.limits.max_cells),
            ("risk.mass_update_min_cells", self.risk.mass_update_min_cells),
            (
                "sanitization.max_string_length",
                self.sanitization.max_string_length as u64,
            ),
            (
                "sanitization.max_sheet_name_length",
                self.sanitization.max_sheet_name_length as u64,
            ),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(SheetGuardError::ConfigError(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }

        if self.risk.structural_high_rows == Some(0) {
            return Err(SheetGuardError::ConfigError(
                "risk.structural_high_rows must be at least 1 when set".to_string(),
            ));
        }

        for phrase in &self.blocking.dangerous_phrases {
            Regex::new(phrase).map_err(|e| {
                SheetGuardError::ConfigError(format!(
                    "blocking.dangerous_phrases entry '{}' is not a valid pattern: {}",
                    phrase, e
                ))
            })?;
        }

        for name in &self.sanitization.injection_functions {
            if !FUNCTION_NAME_REGEX.is_match(name) {
                return Err(SheetGuardError::ConfigError(format!(
                    "sanitization.injection_functions entry '{}' is not a function name",
                    name
                )));
            }
        }

        Ok(())
    }
}

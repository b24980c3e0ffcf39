use crate::config::RiskThresholds;
use crate::operation::OperationKind;
use crate::safety::scope::ScopeAnalysis;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// 위험도 (Low < Medium < High < Dangerous)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Dangerous,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Dangerous => "dangerous",
        }
    }

    /// 사용자에게 보여줄 위험도 설명
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "This is a safe operation with minimal risk to your data.",
            Self::Medium => "This operation may modify your data structure. Review carefully.",
            Self::High => {
                "This operation could significantly impact your data. Confirmation required."
            }
            Self::Dangerous => {
                "This operation is blocked for safety as it could cause data loss."
            }
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// 첫 번째 항목은 적용된 규칙, 이후는 부가 설명
    pub reasons: Vec<String>,
    /// Dangerous일 때만 true
    pub blocked: bool,
}

impl RiskAssessment {
    pub fn explanation(&self) -> String {
        if self.reasons.is_empty() {
            return self.level.description().to_string();
        }
        format!(
            "{} Reasons: {}",
            self.level.description(),
            self.reasons.join("; ")
        )
    }
}

/// 작업 종류 + 영향 범위 -> 위험도
///
/// 규칙은 위에서부터 평가되며 처음 일치한 규칙이 등급을 결정합니다.
///
/// | 조건                              | 등급      |
/// |-----------------------------------|-----------|
/// | 파괴적 작업 + 한도 초과           | Dangerous |
/// | 파괴적 작업                       | High      |
/// | 비파괴 변경 (삽입, 단일 셀, 차트) | Medium    |
/// | 읽기 전용                         | Low       |
pub struct RiskAssessor {
    thresholds: RiskThresholds,
}

impl RiskAssessor {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    /// 파괴적 작업인지 판단 (여러 셀에 걸친 update_cells는 대량 수정으로 취급)
    pub fn is_destructive(&self, operation: OperationKind, scope: &ScopeAnalysis) -> bool {
        operation.is_destructive()
            || (operation == OperationKind::UpdateCells
                && scope.estimated_cells >= self.thresholds.mass_update_min_cells)
    }

    pub fn assess(
        &self,
        operation: OperationKind,
        scope: &ScopeAnalysis,
        parameters: &Map<String, Value>,
        command_text: Option<&str>,
    ) -> RiskAssessment {
        let mut reasons = Vec::new();

        let level = if self.is_destructive(operation, scope) {
            if scope.within_limits() {
                reasons.push(format!(
                    "{} is destructive and affects {} rows ({} cells)",
                    operation, scope.estimated_rows, scope.estimated_cells
                ));
                RiskLevel::High
            } else {
                let violations: Vec<String> =
                    scope.violations.iter().map(|v| v.to_string()).collect();
                reasons.push(format!(
                    "{} is destructive and exceeds safety limits: {}",
                    operation,
                    violations.join(", ")
                ));
                RiskLevel::Dangerous
            }
        } else if !operation.is_read_only() {
            match self.thresholds.structural_high_rows {
                Some(threshold) if scope.estimated_rows > threshold => {
                    reasons.push(format!(
                        "{} changes {} rows (above the {}-row threshold for structural changes)",
                        operation, scope.estimated_rows, threshold
                    ));
                    RiskLevel::High
                }
                _ => {
                    reasons.push(format!(
                        "{} modifies sheet structure or values without removing data",
                        operation
                    ));
                    RiskLevel::Medium
                }
            }
        } else {
            reasons.push(format!("{} is read-only", operation));
            if !scope.within_limits() {
                reasons.push(format!(
                    "Reads {} rows, beyond the configured limits",
                    scope.estimated_rows
                ));
            }
            RiskLevel::Low
        };

        if ["format", "style", "formatting"]
            .iter()
            .any(|key| parameters.contains_key(*key))
        {
            reasons.push("Operation involves formatting changes".to_string());
        }

        if let Some(text) = command_text.map(str::trim).filter(|t| !t.is_empty()) {
            reasons.push(format!("Requested as: \"{}\"", text));
        }

        debug!(operation = %operation, level = %level, "risk assessed");

        RiskAssessment {
            level,
            reasons,
            blocked: level == RiskLevel::Dangerous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeLimits;
    use crate::safety::scope::ScopeAnalyzer;

    fn scope(rows: u64, columns: u64) -> ScopeAnalysis {
        let analyzer = ScopeAnalyzer::new(ScopeLimits::default());
        let cells = rows * columns;
        ScopeAnalysis {
            estimated_rows: rows,
            estimated_columns: columns,
            estimated_cells: cells,
            violations: analyzer.check_limits(rows, columns, cells),
        }
    }

    fn assess(operation: OperationKind, rows: u64, columns: u64) -> RiskAssessment {
        RiskAssessor::new(RiskThresholds::default()).assess(
            operation,
            &scope(rows, columns),
            &Map::new(),
            None,
        )
    }

    #[test]
    fn test_rule_table() {
        assert_eq!(assess(OperationKind::DeleteRows, 80, 4).level, RiskLevel::Dangerous);
        assert_eq!(assess(OperationKind::DeleteRows, 25, 4).level, RiskLevel::High);
        assert_eq!(assess(OperationKind::InsertRow, 1, 4).level, RiskLevel::Medium);
        assert_eq!(assess(OperationKind::QueryData, 500, 4).level, RiskLevel::Low);
    }

    #[test]
    fn test_only_dangerous_is_blocked() {
        assert!(assess(OperationKind::ClearData, 60, 2).blocked);
        assert!(!assess(OperationKind::ClearData, 10, 2).blocked);
    }

    #[test]
    fn test_update_cells_escalates_with_cell_count() {
        assert_eq!(assess(OperationKind::UpdateCells, 1, 1).level, RiskLevel::Medium);
        assert_eq!(assess(OperationKind::UpdateCells, 5, 1).level, RiskLevel::High);
        assert_eq!(assess(OperationKind::UpdateCells, 100, 2).level, RiskLevel::Dangerous);
    }

    #[test]
    fn test_monotonic_in_row_count() {
        for operation in OperationKind::ALL {
            let mut previous = RiskLevel::Low;
            for rows in 0..120 {
                let level = assess(operation, rows, 3).level;
                assert!(level >= previous, "{} dropped at {} rows", operation, rows);
                previous = level;
            }
        }
    }

    #[test]
    fn test_structural_threshold() {
        let assessor = RiskAssessor::new(RiskThresholds {
            mass_update_min_cells: 2,
            structural_high_rows: Some(30),
        });
        let small = assessor.assess(OperationKind::CreateChart, &scope(20, 2), &Map::new(), None);
        let large = assessor.assess(OperationKind::CreateChart, &scope(40, 2), &Map::new(), None);
        assert_eq!(small.level, RiskLevel::Medium);
        assert_eq!(large.level, RiskLevel::High);
    }

    #[test]
    fn test_command_text_is_only_annotation() {
        let assessor = RiskAssessor::new(RiskThresholds::default());
        let assessment = assessor.assess(
            OperationKind::QueryData,
            &scope(3, 2),
            &Map::new(),
            Some("show everything in the entire sheet"),
        );
        assert_eq!(assessment.level, RiskLevel::Low);
        assert!(assessment.reasons.last().unwrap().contains("entire sheet"));
    }

    #[test]
    fn test_explanation() {
        let assessment = assess(OperationKind::DeleteRows, 25, 4);
        let explanation = assessment.explanation();
        assert!(explanation.starts_with("This operation could significantly impact your data."));
        assert!(explanation.contains("delete_rows is destructive and affects 25 rows"));
    }
}

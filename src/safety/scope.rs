use crate::config::ScopeLimits;
use crate::operation::OperationKind;
use crate::safety::range::CellRange;
use crate::safety::target::ResolvedTarget;
use crate::sheet::SheetSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// 한도 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    MaxRows,
    MaxColumns,
    MaxCells,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxRows => "max_rows",
            Self::MaxColumns => "max_columns",
            Self::MaxCells => "max_cells",
        }
    }
}

/// 한도 초과 기록 (에러가 아닌 사실 기록)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitViolation {
    pub limit: LimitKind,
    pub actual: u64,
    pub allowed: u64,
    pub suggestion: String,
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exceeded: {} (limit {})",
            self.limit.as_str(),
            self.actual,
            self.allowed
        )
    }
}

/// 영향 범위 추정 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeAnalysis {
    pub estimated_rows: u64,
    pub estimated_columns: u64,
    pub estimated_cells: u64,
    pub violations: Vec<LimitViolation>,
}

impl ScopeAnalysis {
    pub fn within_limits(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn exceeds(&self, limit: LimitKind) -> bool {
        self.violations.iter().any(|v| v.limit == limit)
    }

    /// 범위를 줄이기 위한 제안 목록
    pub fn suggestions(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.suggestion.clone()).collect()
    }

    /// 한 줄 요약
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} rows x {} columns ({} cells)",
            self.estimated_rows, self.estimated_columns, self.estimated_cells
        );
        if !self.within_limits() {
            let violations: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
            summary.push_str(&format!("; {}", violations.join("; ")));
        }
        summary
    }
}

/// 범위 추정의 입력
#[derive(Debug, Clone, Copy)]
pub enum ScopeSource<'a> {
    /// 이미 해석된 대상
    Target(&'a ResolvedTarget),
    /// 아직 행으로 풀지 않은 범위 (범위 기반 조회)
    Range(CellRange),
    /// 대상 지정 없음 (삽입, 차트, 시트 전체 작업)
    Sheet,
}

/// 영향 범위 분석기
///
/// 한도 초과를 기록만 하며 차단 결정은 내리지 않습니다.
pub struct ScopeAnalyzer {
    limits: ScopeLimits,
}

impl ScopeAnalyzer {
    pub fn new(limits: ScopeLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ScopeLimits {
        &self.limits
    }

    pub fn analyze(
        &self,
        operation: OperationKind,
        source: ScopeSource<'_>,
        parameters: &Map<String, Value>,
        sheet: &SheetSnapshot,
    ) -> ScopeAnalysis {
        let range = match source {
            ScopeSource::Target(target) => target.range,
            ScopeSource::Range(range) => Some(range),
            ScopeSource::Sheet if operation.is_chart() => data_range(parameters),
            ScopeSource::Sheet => None,
        };

        let rows = match source {
            ScopeSource::Target(target) => target.row_count() as u64,
            ScopeSource::Range(range) => range.effective_row_count(sheet.row_count()),
            ScopeSource::Sheet => Self::untargeted_rows(operation, parameters, sheet, range),
        };

        let columns = match range {
            Some(range) => range.effective_column_count(sheet.column_count()),
            None => Self::declared_columns(operation, parameters)
                .unwrap_or_else(|| sheet.column_count().max(1) as u64),
        };

        let cells = rows.saturating_mul(columns);
        let violations = self.check_limits(rows, columns, cells);

        debug!(
            operation = %operation,
            rows,
            columns,
            cells,
            violations = violations.len(),
            "scope analyzed"
        );

        ScopeAnalysis {
            estimated_rows: rows,
            estimated_columns: columns,
            estimated_cells: cells,
            violations,
        }
    }

    /// 행/열/셀 수를 한도와 비교
    pub fn check_limits(&self, rows: u64, columns: u64, cells: u64) -> Vec<LimitViolation> {
        let mut violations = Vec::new();

        if rows > self.limits.max_rows {
            violations.push(LimitViolation {
                limit: LimitKind::MaxRows,
                actual: rows,
                allowed: self.limits.max_rows,
                suggestion: format!(
                    "Add a condition to narrow the result, or process in batches of at most {} rows",
                    self.limits.max_rows
                ),
            });
        }

        if columns > self.limits.max_columns {
            violations.push(LimitViolation {
                limit: LimitKind::MaxColumns,
                actual: columns,
                allowed: self.limits.max_columns,
                suggestion: format!(
                    "Specify only the columns you need (at most {})",
                    self.limits.max_columns
                ),
            });
        }

        if cells > self.limits.max_cells {
            violations.push(LimitViolation {
                limit: LimitKind::MaxCells,
                actual: cells,
                allowed: self.limits.max_cells,
                suggestion: format!(
                    "Process in batches of at most {} cells",
                    self.limits.max_cells
                ),
            });
        }

        violations
    }

    fn untargeted_rows(
        operation: OperationKind,
        parameters: &Map<String, Value>,
        sheet: &SheetSnapshot,
        range: Option<CellRange>,
    ) -> u64 {
        match operation {
            OperationKind::InsertRow => count_param(parameters)
                .or_else(|| data_rows(parameters))
                .unwrap_or(1),
            OperationKind::InsertColumn => sheet.row_count().max(1) as u64,
            OperationKind::CreateChart | OperationKind::ModifyChart | OperationKind::ResizeChart => {
                range
                    .map(|r| r.effective_row_count(sheet.row_count()))
                    .unwrap_or(1)
            }
            _ => sheet.row_count() as u64,
        }
    }

    /// 파라미터로 선언된 열 수
    fn declared_columns(operation: OperationKind, parameters: &Map<String, Value>) -> Option<u64> {
        if operation == OperationKind::InsertColumn {
            return Some(count_param(parameters).unwrap_or(1));
        }

        if let Some(columns) = parameters.get("columns") {
            return match columns {
                Value::Array(items) => Some(items.len().max(1) as u64),
                _ => Some(1),
            };
        }

        if let Some(Value::Object(values)) = parameters.get("values") {
            return Some(values.len().max(1) as u64);
        }

        match parameters.get("data") {
            Some(Value::Array(items)) => match items.first() {
                Some(Value::Array(first)) => Some(first.len().max(1) as u64),
                Some(Value::Object(first)) => Some(first.len().max(1) as u64),
                _ => Some(items.len().max(1) as u64),
            },
            Some(Value::Object(fields)) => Some(fields.len().max(1) as u64),
            Some(_) => Some(1),
            None => None,
        }
    }
}

fn data_range(parameters: &Map<String, Value>) -> Option<CellRange> {
    parameters
        .get("data_range")
        .and_then(Value::as_str)
        .and_then(|r| CellRange::parse(r).ok())
}

fn count_param(parameters: &Map<String, Value>) -> Option<u64> {
    parameters.get("count").and_then(Value::as_u64).filter(|n| *n > 0)
}

/// 2차원 data는 행 수, 그 외는 한 행
fn data_rows(parameters: &Map<String, Value>) -> Option<u64> {
    match parameters.get("data")? {
        Value::Array(items) if matches!(items.first(), Some(Value::Array(_) | Value::Object(_))) => {
            Some(items.len() as u64)
        }
        _ => Some(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::target::TargetMode;
    use serde_json::json;

    fn sheet(rows: usize) -> SheetSnapshot {
        let mut sheet = SheetSnapshot::with_columns("Orders", &["Id", "Item", "Qty", "Status"]);
        for i in 0..rows {
            sheet
                .push_row(vec![
                    (i as i64).into(),
                    "widget".into(),
                    1i64.into(),
                    "Open".into(),
                ])
                .unwrap();
        }
        sheet
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn target(rows: Vec<usize>, range: Option<&str>) -> ResolvedTarget {
        ResolvedTarget {
            rows,
            mode: if range.is_some() {
                TargetMode::Range
            } else {
                TargetMode::Conditions
            },
            ambiguous: false,
            match_count: None,
            range: range.map(|r| CellRange::parse(r).unwrap()),
            criteria: None,
        }
    }

    #[test]
    fn test_range_target_exceeds_rows() {
        let analyzer = ScopeAnalyzer::new(ScopeLimits::default());
        let resolved = target((0..100).collect(), Some("A1:B100"));
        let scope = analyzer.analyze(
            OperationKind::UpdateCells,
            ScopeSource::Target(&resolved),
            &Map::new(),
            &sheet(120),
        );

        assert_eq!(scope.estimated_rows, 100);
        assert_eq!(scope.estimated_columns, 2);
        assert_eq!(scope.estimated_cells, 200);
        assert!(scope.exceeds(LimitKind::MaxRows));
        assert!(!scope.exceeds(LimitKind::MaxCells));
        assert_eq!(scope.violations[0].allowed, 50);
        assert!(scope.suggestions()[0].contains("batches of at most 50 rows"));
    }

    #[test]
    fn test_condition_target_uses_declared_columns() {
        let analyzer = ScopeAnalyzer::new(ScopeLimits::default());
        let resolved = target(vec![1, 4, 7], None);
        let scope = analyzer.analyze(
            OperationKind::UpdateCells,
            ScopeSource::Target(&resolved),
            &params(json!({"values": {"Status": "Closed"}})),
            &sheet(10),
        );
        assert_eq!(scope.estimated_cells, 3);
        assert!(scope.within_limits());
    }

    #[test]
    fn test_delete_rows_spans_all_columns() {
        let analyzer = ScopeAnalyzer::new(ScopeLimits::default());
        let resolved = target((0..25).collect(), None);
        let scope = analyzer.analyze(
            OperationKind::DeleteRows,
            ScopeSource::Target(&resolved),
            &Map::new(),
            &sheet(60),
        );
        assert_eq!(scope.estimated_rows, 25);
        assert_eq!(scope.estimated_columns, 4);
        assert!(scope.within_limits());
    }

    #[test]
    fn test_raw_range_for_query() {
        let analyzer = ScopeAnalyzer::new(ScopeLimits::default());
        let scope = analyzer.analyze(
            OperationKind::QueryData,
            ScopeSource::Range(CellRange::parse("A:C").unwrap()),
            &Map::new(),
            &sheet(30),
        );
        assert_eq!(scope.estimated_rows, 30);
        assert_eq!(scope.estimated_columns, 3);
    }

    #[test]
    fn test_insert_row_counts_data_rows() {
        let analyzer = ScopeAnalyzer::new(ScopeLimits::default());
        let scope = analyzer.analyze(
            OperationKind::InsertRow,
            ScopeSource::Sheet,
            &params(json!({"data": [[1, "a"], [2, "b"], [3, "c"]]})),
            &sheet(5),
        );
        assert_eq!(scope.estimated_rows, 3);
        assert_eq!(scope.estimated_columns, 2);

        let single = analyzer.analyze(
            OperationKind::InsertRow,
            ScopeSource::Sheet,
            &params(json!({"data": {"Id": 9, "Item": "bolt"}})),
            &sheet(5),
        );
        assert_eq!((single.estimated_rows, single.estimated_columns), (1, 2));
    }

    #[test]
    fn test_chart_uses_data_range() {
        let analyzer = ScopeAnalyzer::new(ScopeLimits::default());
        let scope = analyzer.analyze(
            OperationKind::CreateChart,
            ScopeSource::Sheet,
            &params(json!({"data_range": "A1:D80", "chart_type": "bar"})),
            &sheet(80),
        );
        assert_eq!(scope.estimated_rows, 80);
        assert_eq!(scope.estimated_cells, 320);
        assert!(scope.exceeds(LimitKind::MaxRows));
    }

    #[test]
    fn test_all_limits_reported() {
        let analyzer = ScopeAnalyzer::new(ScopeLimits {
            max_rows: 10,
            max_columns: 2,
            max_cells: 15,
        });
        let violations = analyzer.check_limits(11, 3, 33);
        let kinds: Vec<LimitKind> = violations.iter().map(|v| v.limit).collect();
        assert_eq!(
            kinds,
            vec![LimitKind::MaxRows, LimitKind::MaxColumns, LimitKind::MaxCells]
        );
    }

    #[test]
    fn test_summary() {
        let analyzer = ScopeAnalyzer::new(ScopeLimits::default());
        let resolved = target((0..60).collect(), None);
        let scope = analyzer.analyze(
            OperationKind::DeleteRows,
            ScopeSource::Target(&resolved),
            &Map::new(),
            &sheet(60),
        );
        let summary = scope.summary();
        assert!(summary.starts_with("60 rows x 4 columns (240 cells)"));
        assert!(summary.contains("max_rows exceeded: 60 (limit 50)"));
    }
}

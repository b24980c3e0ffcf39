use crate::error::{Result, SheetGuardError};
use crate::safety::target::TargetSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// 지원하는 시트 작업 종류 (닫힌 열거형)
///
/// 새 작업은 여기에 변형을 추가하고 위험도/범위 규칙의 `match`에 분기를 추가합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    InsertRow,
    InsertColumn,
    #[serde(alias = "update")]
    UpdateCells,
    #[serde(alias = "delete")]
    DeleteRows,
    DeleteColumns,
    ClearData,
    #[serde(alias = "query")]
    QueryData,
    FilterData,
    SortData,
    AggregateData,
    CreateChart,
    ModifyChart,
    ResizeChart,
    FormatAll,
    DeleteAll,
    ClearAll,
    ReplaceAll,
}

impl OperationKind {
    pub const ALL: [OperationKind; 17] = [
        Self::InsertRow,
        Self::InsertColumn,
        Self::UpdateCells,
        Self::DeleteRows,
        Self::DeleteColumns,
        Self::ClearData,
        Self::QueryData,
        Self::FilterData,
        Self::SortData,
        Self::AggregateData,
        Self::CreateChart,
        Self::ModifyChart,
        Self::ResizeChart,
        Self::FormatAll,
        Self::DeleteAll,
        Self::ClearAll,
        Self::ReplaceAll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsertRow => "insert_row",
            Self::InsertColumn => "insert_column",
            Self::UpdateCells => "update_cells",
            Self::DeleteRows => "delete_rows",
            Self::DeleteColumns => "delete_columns",
            Self::ClearData => "clear_data",
            Self::QueryData => "query_data",
            Self::FilterData => "filter_data",
            Self::SortData => "sort_data",
            Self::AggregateData => "aggregate_data",
            Self::CreateChart => "create_chart",
            Self::ModifyChart => "modify_chart",
            Self::ResizeChart => "resize_chart",
            Self::FormatAll => "format_all",
            Self::DeleteAll => "delete_all",
            Self::ClearAll => "clear_all",
            Self::ReplaceAll => "replace_all",
        }
    }

    /// 읽기 전용 작업 (조회/필터/정렬/집계)
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::QueryData | Self::FilterData | Self::SortData | Self::AggregateData
        )
    }

    /// 본질적으로 파괴적인 작업 (삭제, 지우기, 시트 전체 대상 작업)
    ///
    /// `UpdateCells`는 여기 포함되지 않으며, 여러 셀에 걸친 경우에만
    /// 위험도 평가 단계에서 파괴적으로 취급됩니다.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::DeleteRows
                | Self::DeleteColumns
                | Self::ClearData
                | Self::FormatAll
                | Self::DeleteAll
                | Self::ClearAll
                | Self::ReplaceAll
        )
    }

    /// 시트 전체를 대상으로 하는 대량 작업 (항상 차단)
    pub fn is_mass_operation(&self) -> bool {
        matches!(
            self,
            Self::FormatAll | Self::DeleteAll | Self::ClearAll | Self::ReplaceAll
        )
    }

    pub fn is_chart(&self) -> bool {
        matches!(
            self,
            Self::CreateChart | Self::ModifyChart | Self::ResizeChart
        )
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Self::InsertRow | Self::InsertColumn)
    }

    /// 기존 행을 대상으로 지정해야 하는 작업
    pub fn requires_row_target(&self) -> bool {
        matches!(self, Self::UpdateCells | Self::DeleteRows | Self::ClearData)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = SheetGuardError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        let kind = match normalized.as_str() {
            "update" => Self::UpdateCells,
            "delete" => Self::DeleteRows,
            "query" => Self::QueryData,
            other => Self::ALL
                .iter()
                .copied()
                .find(|k| k.as_str() == other)
                .ok_or_else(|| {
                    SheetGuardError::Validation(format!("Unknown operation: {}", s))
                })?,
        };
        Ok(kind)
    }
}

/// 안전성 평가를 받을 작업 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    /// 작업 종류
    pub operation: OperationKind,
    /// 대상 시트 이름
    pub sheet: String,
    /// 원본 파라미터 (평가 중 변경되지 않음)
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// 사용자가 입력한 원문 명령 (선택)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_text: Option<String>,
    /// 대상 지정 (없으면 파라미터의 rows/range/conditions/unique_identifier 사용)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetSpec>,
    /// 사용자 확인 완료 여부 (두 번째 호출에서 true)
    #[serde(default)]
    pub confirmed: bool,
}

impl OperationRequest {
    pub fn new(operation: OperationKind, sheet: impl Into<String>) -> Self {
        Self {
            operation,
            sheet: sheet.into(),
            parameters: Map::new(),
            command_text: None,
            target: None,
            confirmed: false,
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_command_text(mut self, text: impl Into<String>) -> Self {
        self.command_text = Some(text.into());
        self
    }

    pub fn with_target(mut self, target: TargetSpec) -> Self {
        self.target = Some(target);
        self
    }

    /// 확인 완료 상태의 복사본 (재평가용)
    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

use crate::error::{Result, SheetGuardError};
use crate::safety::condition::{describe_clauses, ConditionClause, ConditionEvaluator};
use crate::safety::range::{CellRange, RangeShape};
use crate::sheet::SheetSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// 파라미터 매핑에서 대상 지정으로 해석되는 키
pub const TARGET_KEYS: [&str; 5] = ["rows", "row", "range", "conditions", "unique_identifier"];

/// 대상 지정 방식 (서로 배타적)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTargetSpec", into = "RawTargetSpec")]
pub enum TargetSpec {
    /// 0부터 시작하는 행 인덱스 목록
    Rows(Vec<usize>),
    /// "A1:B10" 같은 범위 문자열
    Range(String),
    /// AND로 결합되는 필터 조건
    Conditions(Vec<ConditionClause>),
    /// 정확히 한 행을 가리켜야 하는 식별 조건
    UniqueIdentifier(Vec<ConditionClause>),
}

impl TargetSpec {
    pub fn mode(&self) -> TargetMode {
        match self {
            Self::Rows(_) => TargetMode::Rows,
            Self::Range(_) => TargetMode::Range,
            Self::Conditions(_) => TargetMode::Conditions,
            Self::UniqueIdentifier(_) => TargetMode::UniqueIdentifier,
        }
    }

    /// 조건 기반 대상 지정이 참조하는 조건들
    pub fn clauses(&self) -> &[ConditionClause] {
        match self {
            Self::Conditions(clauses) | Self::UniqueIdentifier(clauses) => clauses,
            _ => &[],
        }
    }

    /// 요청 파라미터에서 대상 지정 추출
    ///
    /// 대상 키가 하나도 없으면 `Ok(None)`, 둘 이상이면 모호한 지정으로 에러.
    pub fn from_parameters(parameters: &Map<String, Value>) -> Result<Option<Self>> {
        if !TARGET_KEYS.iter().any(|key| parameters.contains_key(*key)) {
            return Ok(None);
        }

        let rows = match (parameters.get("rows"), parameters.get("row")) {
            (Some(_), Some(_)) => {
                return Err(SheetGuardError::Validation(
                    "Both 'rows' and 'row' were given; use only one".to_string(),
                ))
            }
            (Some(rows), None) => Some(serde_json::from_value::<Vec<usize>>(rows.clone()).map_err(
                |_| {
                    SheetGuardError::Validation(format!(
                        "'rows' must be a list of non-negative row indices, got: {}",
                        rows
                    ))
                },
            )?),
            (None, Some(row)) => Some(vec![row.as_u64().ok_or_else(|| {
                SheetGuardError::Validation(format!(
                    "'row' must be a non-negative row index, got: {}",
                    row
                ))
            })? as usize]),
            (None, None) => None,
        };

        let range = match parameters.get("range") {
            None => None,
            Some(Value::String(range)) => Some(range.clone()),
            Some(other) => {
                return Err(SheetGuardError::Validation(format!(
                    "'range' must be a string like \"A1:B10\", got: {}",
                    other
                )))
            }
        };

        let raw = RawTargetSpec {
            rows,
            range,
            conditions: parameters.get("conditions").cloned(),
            unique_identifier: parameters.get("unique_identifier").cloned(),
        };
        TargetSpec::try_from(raw).map(Some)
    }
}

/// 느슨한 형태의 대상 지정 (JSON 입력용)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTargetSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_identifier: Option<Value>,
}

impl TryFrom<RawTargetSpec> for TargetSpec {
    type Error = SheetGuardError;

    fn try_from(raw: RawTargetSpec) -> Result<Self> {
        let mut given = Vec::new();
        if raw.rows.is_some() {
            given.push("rows");
        }
        if raw.range.is_some() {
            given.push("range");
        }
        if raw.conditions.is_some() {
            given.push("conditions");
        }
        if raw.unique_identifier.is_some() {
            given.push("unique_identifier");
        }

        if given.len() > 1 {
            return Err(SheetGuardError::Validation(format!(
                "Target mixes several targeting modes ({}); specify exactly one",
                given.join(", ")
            )));
        }

        match raw {
            RawTargetSpec { rows: Some(rows), .. } => Ok(Self::Rows(rows)),
            RawTargetSpec { range: Some(range), .. } => Ok(Self::Range(range)),
            RawTargetSpec {
                conditions: Some(conditions),
                ..
            } => Ok(Self::Conditions(ConditionClause::parse_set(&conditions)?)),
            RawTargetSpec {
                unique_identifier: Some(identifier),
                ..
            } => Ok(Self::UniqueIdentifier(ConditionClause::parse_set(&identifier)?)),
            _ => Err(SheetGuardError::Validation(
                "Target is empty; specify rows, range, conditions, or unique_identifier".to_string(),
            )),
        }
    }
}

impl From<TargetSpec> for RawTargetSpec {
    fn from(spec: TargetSpec) -> Self {
        let clauses_json = |clauses: &[ConditionClause]| {
            Value::Array(clauses.iter().map(ConditionClause::to_json).collect())
        };
        match spec {
            TargetSpec::Rows(rows) => Self {
                rows: Some(rows),
                ..Default::default()
            },
            TargetSpec::Range(range) => Self {
                range: Some(range),
                ..Default::default()
            },
            TargetSpec::Conditions(clauses) => Self {
                conditions: Some(clauses_json(&clauses)),
                ..Default::default()
            },
            TargetSpec::UniqueIdentifier(clauses) => Self {
                unique_identifier: Some(clauses_json(&clauses)),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    Rows,
    Range,
    Conditions,
    UniqueIdentifier,
}

/// 해석된 대상
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    /// 대상 행 인덱스 (오름차순, 중복 없음)
    pub rows: Vec<usize>,
    pub mode: TargetMode,
    /// 고유 식별자가 둘 이상의 행과 일치한 경우 true
    pub ambiguous: bool,
    /// 고유 식별자 해석 시 일치한 행 수
    pub match_count: Option<usize>,
    /// 범위 지정으로 해석된 경우 원래 범위
    pub range: Option<CellRange>,
    /// 조건 기반 해석에 사용된 조건 설명
    pub criteria: Option<String>,
}

impl ResolvedTarget {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 모호한 대상이면 에러로 변환 (변경 작업은 절대 진행 불가)
    pub fn require_unambiguous(self) -> Result<Self> {
        if self.ambiguous {
            return Err(SheetGuardError::AmbiguousTarget {
                match_count: self.match_count.unwrap_or(self.rows.len()),
                criteria: self.criteria.clone().unwrap_or_default(),
                rows: self.rows,
            });
        }
        Ok(self)
    }
}

/// 대상 지정 -> 구체적인 행 집합
pub struct TargetResolver;

impl TargetResolver {
    pub fn new() -> Self {
        Self
    }

    /// 스냅샷 기준으로 대상 지정 해석
    ///
    /// 고유 식별자가 여러 행과 일치하면 `ambiguous = true`인 결과를 반환합니다.
    /// 변경 작업 전에는 [`ResolvedTarget::require_unambiguous`]로 확인해야 합니다.
    pub fn resolve(&self, sheet: &SheetSnapshot, spec: &TargetSpec) -> Result<ResolvedTarget> {
        let resolved = match spec {
            TargetSpec::Rows(rows) => self.resolve_rows(sheet, rows)?,
            TargetSpec::Range(range) => self.resolve_range(sheet, range)?,
            TargetSpec::Conditions(clauses) => ResolvedTarget {
                rows: Self::matching_rows(sheet, clauses),
                mode: TargetMode::Conditions,
                ambiguous: false,
                match_count: None,
                range: None,
                criteria: Some(describe_clauses(clauses)),
            },
            TargetSpec::UniqueIdentifier(clauses) => self.resolve_unique(sheet, clauses)?,
        };

        debug!(
            sheet = %sheet.name,
            mode = ?resolved.mode,
            rows = resolved.rows.len(),
            ambiguous = resolved.ambiguous,
            "target resolved"
        );

        Ok(resolved)
    }

    fn resolve_rows(&self, sheet: &SheetSnapshot, rows: &[usize]) -> Result<ResolvedTarget> {
        if rows.is_empty() {
            return Err(SheetGuardError::Validation(
                "Row list is empty; specify at least one row index".to_string(),
            ));
        }

        let mut missing: Vec<usize> = rows
            .iter()
            .copied()
            .filter(|row| *row >= sheet.row_count())
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            missing.dedup();
            return Err(SheetGuardError::TargetNotFound {
                message: format!(
                    "rows {:?} are outside sheet '{}' ({} rows, valid indices 0..{})",
                    missing,
                    sheet.name,
                    sheet.row_count(),
                    sheet.row_count()
                ),
                missing_rows: missing,
            });
        }

        let mut resolved = rows.to_vec();
        resolved.sort_unstable();
        resolved.dedup();

        Ok(ResolvedTarget {
            rows: resolved,
            mode: TargetMode::Rows,
            ambiguous: false,
            match_count: None,
            range: None,
            criteria: None,
        })
    }

    /// 범위의 모든 행
    ///
    /// 셀 범위는 데이터 범위를 넘어서도 사각형 전체를 대상으로 하고,
    /// 열 전체 참조(`A:C`)는 실제 데이터 행으로 제한됩니다.
    fn resolve_range(&self, sheet: &SheetSnapshot, range: &str) -> Result<ResolvedTarget> {
        let parsed = CellRange::parse(range)?;

        let rows: Vec<usize> = match parsed.shape {
            RangeShape::Columns => (0..sheet.row_count()).collect(),
            RangeShape::Cells | RangeShape::Rows => {
                (parsed.start_row as usize - 1..parsed.end_row as usize).collect()
            }
        };

        Ok(ResolvedTarget {
            rows,
            mode: TargetMode::Range,
            ambiguous: false,
            match_count: None,
            range: Some(parsed),
            criteria: Some(parsed.to_string()),
        })
    }

    fn resolve_unique(
        &self,
        sheet: &SheetSnapshot,
        clauses: &[ConditionClause],
    ) -> Result<ResolvedTarget> {
        let rows = Self::matching_rows(sheet, clauses);
        let criteria = describe_clauses(clauses);

        if rows.is_empty() {
            return Err(SheetGuardError::TargetNotFound {
                message: format!("no row in sheet '{}' matches {}", sheet.name, criteria),
                missing_rows: Vec::new(),
            });
        }

        Ok(ResolvedTarget {
            match_count: Some(rows.len()),
            ambiguous: rows.len() > 1,
            rows,
            mode: TargetMode::UniqueIdentifier,
            range: None,
            criteria: Some(criteria),
        })
    }

    fn matching_rows(sheet: &SheetSnapshot, clauses: &[ConditionClause]) -> Vec<usize> {
        sheet
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| ConditionEvaluator::matches_all(row, clauses))
            .map(|(index, _)| index)
            .collect()
    }
}

impl Default for TargetResolver {
    fn default() -> Self {
        Self::new()
    }
}

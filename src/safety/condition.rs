use crate::error::{Result, SheetGuardError};
use crate::sheet::{CellValue, Row};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// 조건 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "starts_with")]
    StartsWith,
    #[serde(rename = "ends_with")]
    EndsWith,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
        }
    }
}

impl FromStr for ConditionOperator {
    type Err = SheetGuardError;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s.trim().to_lowercase().as_str() {
            "=" | "==" => Self::Eq,
            "!=" | "<>" => Self::NotEq,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            "contains" => Self::Contains,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            other => {
                return Err(SheetGuardError::Validation(format!(
                    "Unsupported condition operator '{}' (expected =, !=, >, >=, <, <=, contains, starts_with, ends_with)",
                    other
                )))
            }
        };
        Ok(op)
    }
}

/// 단일 필터 조건 (열, 연산자, 비교 값)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionClause {
    pub column: String,
    pub operator: ConditionOperator,
    pub value: CellValue,
}

impl ConditionClause {
    pub fn new(column: impl Into<String>, operator: ConditionOperator, value: CellValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(column, ConditionOperator::Eq, value.into())
    }

    /// JSON 조건 집합 파싱
    ///
    /// 두 가지 형태를 받습니다:
    /// - 매핑: `{"Status": "Inactive", "Age": {"operator": ">=", "value": 30}}`
    /// - 목록: `[{"column": "Age", "operator": ">=", "value": 30}]`
    pub fn parse_set(value: &Value) -> Result<Vec<ConditionClause>> {
        let clauses = match value {
            Value::Object(map) => map
                .iter()
                .map(|(column, condition)| Self::from_mapping_entry(column, condition))
                .collect::<Result<Vec<_>>>()?,
            Value::Array(items) => items
                .iter()
                .map(Self::from_list_item)
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(SheetGuardError::Validation(format!(
                    "Conditions must be a mapping or a list, got: {}",
                    other
                )))
            }
        };

        if clauses.is_empty() {
            return Err(SheetGuardError::Validation(
                "Conditions must contain at least one clause".to_string(),
            ));
        }

        Ok(clauses)
    }

    fn from_mapping_entry(column: &str, condition: &Value) -> Result<Self> {
        match condition {
            Value::Object(spec) if spec.contains_key("operator") || spec.contains_key("value") => {
                Self::from_operator_spec(column, spec)
            }
            other => Ok(Self::new(
                column,
                ConditionOperator::Eq,
                scalar(column, other)?,
            )),
        }
    }

    fn from_list_item(item: &Value) -> Result<Self> {
        let spec = item.as_object().ok_or_else(|| {
            SheetGuardError::Validation(format!(
                "Condition list items must be objects with 'column', 'operator', 'value': {}",
                item
            ))
        })?;
        let column = spec
            .get("column")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SheetGuardError::Validation(format!("Condition is missing 'column': {}", item))
            })?;
        Self::from_operator_spec(column, spec)
    }

    fn from_operator_spec(column: &str, spec: &Map<String, Value>) -> Result<Self> {
        let operator = match spec.get("operator") {
            None => ConditionOperator::Eq,
            Some(Value::String(op)) => op.parse()?,
            Some(other) => {
                return Err(SheetGuardError::Validation(format!(
                    "Condition operator for '{}' must be a string, got: {}",
                    column, other
                )))
            }
        };
        let value = scalar(column, spec.get("value").unwrap_or(&Value::Null))?;

        // 빈 피연산자는 모든 행과 일치하므로 텍스트 연산자에서는 거부
        let text_operator = matches!(
            operator,
            ConditionOperator::Contains | ConditionOperator::StartsWith | ConditionOperator::EndsWith
        );
        let blank = match &value {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        };
        if text_operator && blank {
            return Err(SheetGuardError::Validation(format!(
                "Condition '{}' on '{}' needs a non-empty value",
                operator.as_str(),
                column
            )));
        }

        Ok(Self::new(column, operator, value))
    }

    pub fn to_json(&self) -> Value {
        json!({
            "column": self.column,
            "operator": self.operator.as_str(),
            "value": self.value.to_json(),
        })
    }
}

impl fmt::Display for ConditionClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            CellValue::Text(s) => write!(f, "{} {} \"{}\"", self.column, self.operator.as_str(), s),
            other => write!(f, "{} {} {}", self.column, self.operator.as_str(), other),
        }
    }
}

fn scalar(column: &str, value: &Value) -> Result<CellValue> {
    CellValue::from_json(value).ok_or_else(|| {
        SheetGuardError::Validation(format!(
            "Condition value for '{}' must be a single value, got: {}",
            column, value
        ))
    })
}

/// 조건 목록을 사람이 읽을 수 있는 형태로 ("Name = \"Kim\" AND Age >= 30")
pub fn describe_clauses(clauses: &[ConditionClause]) -> String {
    clauses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// 행 단위 조건 평가기
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 한 행이 조건을 만족하는지 확인
    ///
    /// 행에 없는 열을 참조하면 항상 false. 숫자 비교에서 변환이 불가능하면 false.
    pub fn matches(row: &Row, clause: &ConditionClause) -> bool {
        let Some(actual) = row.get(&clause.column) else {
            return false;
        };

        match clause.operator {
            ConditionOperator::Eq => values_equal(actual, &clause.value),
            ConditionOperator::NotEq => !values_equal(actual, &clause.value),
            ConditionOperator::Gt => compare_numeric(actual, &clause.value, |a, b| a > b),
            ConditionOperator::Gte => compare_numeric(actual, &clause.value, |a, b| a >= b),
            ConditionOperator::Lt => compare_numeric(actual, &clause.value, |a, b| a < b),
            ConditionOperator::Lte => compare_numeric(actual, &clause.value, |a, b| a <= b),
            ConditionOperator::Contains => {
                lowered(actual).contains(&lowered(&clause.value))
            }
            ConditionOperator::StartsWith => {
                lowered(actual).starts_with(&lowered(&clause.value))
            }
            ConditionOperator::EndsWith => {
                lowered(actual).ends_with(&lowered(&clause.value))
            }
        }
    }

    /// 모든 조건을 AND로 결합
    pub fn matches_all(row: &Row, clauses: &[ConditionClause]) -> bool {
        clauses.iter().all(|clause| Self::matches(row, clause))
    }
}

/// 타입을 구분하는 정확한 비교 (문자열 "5"와 숫자 5는 다름)
fn values_equal(a: &CellValue, b: &CellValue) -> bool {
    match (a, b) {
        (CellValue::Empty, CellValue::Empty) => true,
        (CellValue::Bool(x), CellValue::Bool(y)) => x == y,
        (CellValue::Number(x), CellValue::Number(y)) => x == y,
        (CellValue::Text(x), CellValue::Text(y)) => x == y,
        _ => false,
    }
}

fn compare_numeric(a: &CellValue, b: &CellValue, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

fn lowered(value: &CellValue) -> String {
    value.to_string().to_lowercase()
}

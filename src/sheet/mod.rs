use crate::error::{Result, SheetGuardError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 셀 값 (타입 정보 유지)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// JSON 스칼라 값을 셀 값으로 변환 (배열/객체는 None)
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Empty),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// 숫자 비교용 변환
    ///
    /// 숫자는 그대로, 문자열은 파싱 가능한 경우에만 숫자로 취급합니다.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// 선언된 열 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Boolean,
    #[default]
    Any,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Any => "any",
        }
    }

    /// 값이 이 열 타입과 호환되는지 확인 (빈 값은 항상 허용)
    pub fn accepts(&self, value: &CellValue) -> bool {
        match (self, value) {
            (Self::Any, _) | (_, CellValue::Empty) => true,
            (Self::Text, CellValue::Text(_)) => true,
            (Self::Number, v) => v.as_number().is_some(),
            (Self::Boolean, CellValue::Bool(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// 한 행: 열 이름 -> 값의 순서 있는 매핑
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new(cells: Vec<(String, CellValue)>) -> Self {
        Self { cells }
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 미리보기용 요약 ("Name: Kim, Status: Active")
    pub fn preview(&self, max_columns: usize) -> String {
        self.cells
            .iter()
            .take(max_columns)
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 시트 스냅샷 파일 포맷
///
/// ```json
/// { "name": "Customers",
///   "columns": [{"name": "Name", "type": "text"}],
///   "rows": [["Kim"], ["Lee"]] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SheetFile {
    name: String,
    columns: Vec<ColumnSpec>,
    #[serde(default)]
    rows: Vec<Vec<CellValue>>,
}

/// 평가 시점에 고정된 읽기 전용 시트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SheetFile", into = "SheetFile")]
pub struct SheetSnapshot {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    rows: Vec<Row>,
}

impl SheetSnapshot {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// 열 이름만으로 스냅샷 생성 (열 타입은 Any)
    pub fn with_columns(name: impl Into<String>, columns: &[&str]) -> Self {
        let columns = columns
            .iter()
            .map(|c| ColumnSpec::new(*c, ColumnType::Any))
            .collect();
        Self::new(name, columns)
    }

    /// 값 목록을 열 순서대로 한 행으로 추가
    ///
    /// 열 수보다 짧은 행은 허용 (남은 열은 행에 존재하지 않음),
    /// 열 수보다 긴 행은 에러.
    pub fn push_row(&mut self, values: Vec<CellValue>) -> Result<()> {
        if values.len() > self.columns.len() {
            return Err(SheetGuardError::Validation(format!(
                "row {} has {} values but sheet '{}' declares {} columns",
                self.rows.len() + 1,
                values.len(),
                self.name,
                self.columns.len()
            )));
        }

        let cells = self
            .columns
            .iter()
            .zip(values)
            .map(|(column, value)| (column.name.clone(), value))
            .collect();
        self.rows.push(Row::new(cells));
        Ok(())
    }

    pub fn with_row(mut self, values: Vec<CellValue>) -> Result<Self> {
        self.push_row(values)?;
        Ok(self)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

impl TryFrom<SheetFile> for SheetSnapshot {
    type Error = SheetGuardError;

    fn try_from(file: SheetFile) -> Result<Self> {
        let mut snapshot = SheetSnapshot::new(file.name, file.columns);
        for values in file.rows {
            snapshot.push_row(values)?;
        }
        Ok(snapshot)
    }
}

impl From<SheetSnapshot> for SheetFile {
    fn from(snapshot: SheetSnapshot) -> Self {
        let rows = snapshot
            .rows
            .into_iter()
            .map(|row| row.cells.into_iter().map(|(_, value)| value).collect())
            .collect();
        Self {
            name: snapshot.name,
            columns: snapshot.columns,
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_json() {
        let json = r#"{
            "name": "Customers",
            "columns": [
                {"name": "Name", "type": "text"},
                {"name": "Age", "type": "number"},
                {"name": "Active"}
            ],
            "rows": [["Kim", 31, true], ["Lee", null]]
        }"#;

        let sheet = SheetSnapshot::from_json_str(json).unwrap();
        assert_eq!(sheet.row_count(), 2);
        assert_eq!(sheet.column_count(), 3);
        assert_eq!(sheet.columns[2].kind, ColumnType::Any);

        let first = sheet.row(0).unwrap();
        assert_eq!(first.get("Age"), Some(&CellValue::Number(31.0)));
        assert_eq!(first.get("Active"), Some(&CellValue::Bool(true)));

        // 짧은 행은 남은 열이 존재하지 않음
        let second = sheet.row(1).unwrap();
        assert_eq!(second.get("Age"), Some(&CellValue::Empty));
        assert_eq!(second.get("Active"), None);
    }

    #[test]
    fn test_row_longer_than_columns_is_rejected() {
        let json = r#"{"name": "S", "columns": [{"name": "A"}], "rows": [[1, 2]]}"#;
        assert!(SheetSnapshot::from_json_str(json).is_err());
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(CellValue::from(" 42 ").as_number(), Some(42.0));
        assert_eq!(CellValue::from("abc").as_number(), None);
        assert_eq!(CellValue::Bool(true).as_number(), None);
        assert_eq!(CellValue::Empty.as_number(), None);
    }

    #[test]
    fn test_display_integral_numbers() {
        assert_eq!(CellValue::Number(25.0).to_string(), "25");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_column_type_accepts() {
        assert!(ColumnType::Number.accepts(&CellValue::from("12")));
        assert!(!ColumnType::Number.accepts(&CellValue::from("twelve")));
        assert!(ColumnType::Text.accepts(&CellValue::Empty));
        assert!(!ColumnType::Boolean.accepts(&CellValue::Number(1.0)));
    }

    #[test]
    fn test_row_preview() {
        let sheet = SheetSnapshot::with_columns("S", &["Name", "Status", "Age", "City"])
            .with_row(vec!["Kim".into(), "Inactive".into(), 30i64.into(), "Seoul".into()])
            .unwrap();
        assert_eq!(
            sheet.row(0).unwrap().preview(3),
            "Name: Kim, Status: Inactive, Age: 30"
        );
    }
}

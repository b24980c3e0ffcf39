use crate::config::{InjectionPolicy, SafetyConfig, SanitizationRules, ScopeLimits};
use crate::error::{Result, SheetGuardError};
use crate::operation::OperationKind;
use crate::safety::condition::{ConditionClause, ConditionOperator};
use crate::safety::range::CellRange;
use crate::sheet::{CellValue, ColumnSpec, SheetSnapshot};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use tracing::{debug, warn};

/// 간접 참조/외부 연결을 수행하는 스프레드시트 함수
pub const BUILTIN_INJECTION_FUNCTIONS: [&str; 17] = [
    "INDIRECT",
    "HYPERLINK",
    "WEBSERVICE",
    "FILTERXML",
    "IMPORTXML",
    "IMPORTDATA",
    "IMPORTRANGE",
    "IMPORTHTML",
    "IMPORTFEED",
    "CALL",
    "REGISTER.ID",
    "EXEC",
    "SHELL",
    "DDE",
    "RTD",
    "EVALUATE",
    "SYSTEM",
];

pub const CHART_TYPES: [&str; 10] = [
    "bar",
    "line",
    "pie",
    "scatter",
    "area",
    "column",
    "histogram",
    "box",
    "bubble",
    "radar",
];

pub const AGGREGATIONS: [&str; 11] = [
    "sum", "avg", "average", "count", "max", "min", "median", "std", "var", "first", "last",
];

const INVALID_SHEET_NAME_CHARS: [char; 6] = ['/', '\\', '?', '*', '[', ']'];
const MAX_INSERT_FIELDS: usize = 100;
const MANY_FILTER_CONDITIONS: usize = 10;

/// 필드 단위 검증 에러
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// 파라미터 검증 결과
///
/// `sanitized_parameters`는 항상 입력과 별개의 새 매핑입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub sanitized_parameters: Map<String, Value>,
    pub errors: Vec<FieldError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    /// 모든 필드 에러를 하나의 crate 에러로 변환
    pub fn into_error(self) -> Option<SheetGuardError> {
        if self.valid {
            return None;
        }
        Some(SheetGuardError::Validation(self.error_messages().join("; ")))
    }
}

/// 선언된 파라미터 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamType {
    Text,
    Integer,
    Number,
    TextList,
    RowList,
    Object,
    Data,
    ChartId,
    Conditions,
}

impl ParamType {
    fn of(field: &str) -> Option<Self> {
        let kind = match field {
            "sheet_name" | "range" | "data_range" | "chart_type" | "operation" | "axis"
            | "column_name" | "title" => Self::Text,
            "max_rows" | "max_columns" | "position" | "count" | "row" | "width" | "height" => {
                Self::Integer
            }
            "amount" => Self::Number,
            "columns" => Self::TextList,
            "rows" => Self::RowList,
            "values" => Self::Object,
            "data" => Self::Data,
            "chart_id" => Self::ChartId,
            "conditions" | "unique_identifier" => Self::Conditions,
            _ => return None,
        };
        Some(kind)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::TextList => "list of text",
            Self::RowList => "list of row indices",
            Self::Object => "mapping",
            Self::Data => "list, mapping or text",
            Self::ChartId => "text or integer",
            Self::Conditions => "condition mapping or list",
        }
    }
}

#[derive(Default)]
struct Report {
    errors: Vec<FieldError>,
    warnings: Vec<String>,
}

impl Report {
    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// 파라미터 검증 및 정제
///
/// 단계: 필수 항목 -> 타입 변환 -> 값 범위 -> 수식 주입 검사.
/// 수식 주입 검사는 설정과 무관하게 항상 수행됩니다.
pub struct ParameterValidator {
    limits: ScopeLimits,
    rules: SanitizationRules,
    function_pattern: Regex,
}

impl ParameterValidator {
    pub fn new(config: &SafetyConfig) -> Result<Self> {
        let names: Vec<String> = BUILTIN_INJECTION_FUNCTIONS
            .iter()
            .map(|n| n.to_string())
            .chain(config.sanitization.injection_functions.iter().cloned())
            .map(|n| regex::escape(&n))
            .collect();

        let function_pattern = RegexBuilder::new(&format!(r"\b({})\s*\(", names.join("|")))
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                SheetGuardError::ConfigError(format!("invalid injection function list: {}", e))
            })?;

        Ok(Self {
            limits: config.limits,
            rules: config.sanitization.clone(),
            function_pattern,
        })
    }

    /// 작업별 필수 파라미터
    pub fn required_parameters(operation: OperationKind) -> &'static [&'static str] {
        match operation {
            OperationKind::InsertRow => &["data"],
            OperationKind::InsertColumn => &["column_name"],
            OperationKind::UpdateCells => &["values"],
            OperationKind::FilterData => &["conditions"],
            OperationKind::CreateChart => &["data_range", "chart_type"],
            OperationKind::ModifyChart | OperationKind::ResizeChart => &["chart_id"],
            OperationKind::AggregateData => &["columns", "operation"],
            _ => &[],
        }
    }

    pub fn validate(
        &self,
        operation: OperationKind,
        parameters: &Map<String, Value>,
    ) -> ValidationResult {
        let mut report = Report::default();
        let mut sanitized = parameters.clone();

        for field in Self::required_parameters(operation) {
            if matches!(parameters.get(*field), None | Some(Value::Null)) {
                report.error(field, format!("Missing required parameter: {}", field));
            }
        }

        for (field, value) in sanitized.iter_mut() {
            if let Some(kind) = ParamType::of(field) {
                if value.is_null() {
                    continue;
                }
                if let Some(converted) = self.coerce(field, kind, value, &mut report) {
                    *value = converted;
                }
            }
        }

        self.check_bounds(operation, &mut sanitized, &mut report);

        for (field, value) in sanitized.iter_mut() {
            let clauses = matches!(ParamType::of(field), Some(ParamType::Conditions));
            self.check_injection(field, value, clauses, &mut report);
        }

        let valid = report.errors.is_empty();
        if valid {
            debug!(operation = %operation, warnings = report.warnings.len(), "parameters valid");
        } else {
            debug!(operation = %operation, errors = report.errors.len(), "parameters rejected");
        }

        ValidationResult {
            valid,
            sanitized_parameters: sanitized,
            errors: report.errors,
            warnings: report.warnings,
        }
    }

    /// 시트 이름 규칙 확인 (길이, 금지 문자)
    pub fn check_sheet_name(&self, name: &str) -> Result<()> {
        let message = if name.trim().is_empty() {
            "sheet name must be a non-empty string".to_string()
        } else if name.chars().count() > self.rules.max_sheet_name_length {
            format!(
                "sheet name cannot exceed {} characters",
                self.rules.max_sheet_name_length
            )
        } else if name.contains(&INVALID_SHEET_NAME_CHARS[..]) {
            "sheet name contains invalid characters (/ \\ ? * [ ])".to_string()
        } else {
            return Ok(());
        };
        Err(SheetGuardError::Validation(format!("{}: '{}'", message, name)))
    }

    /// 수식 주입 여부 (`=`로 시작하거나 위험 함수 호출 포함)
    pub fn is_injection(&self, value: &str) -> bool {
        value.trim_start().starts_with('=') || self.function_pattern.is_match(value)
    }

    /// 위험 부분 제거 (더 이상 바뀌지 않을 때까지 반복)
    ///
    /// ```
    /// use sheetguard::config::SafetyConfig;
    /// use sheetguard::safety::ParameterValidator;
    ///
    /// let validator = ParameterValidator::new(&SafetyConfig::default()).unwrap();
    /// assert_eq!(validator.sanitize_string("=INDIRECT(A1)"), "(A1)");
    /// ```
    pub fn sanitize_string(&self, value: &str) -> String {
        let mut current = value.to_string();
        loop {
            let mut next = current.clone();
            if next.trim_start().starts_with('=') {
                next = next
                    .trim_start()
                    .trim_start_matches(|c: char| c == '=' || c.is_whitespace())
                    .to_string();
            }
            next = self.function_pattern.replace_all(&next, "(").into_owned();
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn coerce(
        &self,
        field: &str,
        kind: ParamType,
        value: &Value,
        report: &mut Report,
    ) -> Option<Value> {
        let mismatch = |report: &mut Report| -> Option<Value> {
            report.error(field, format!("must be {}, got {}", kind.name(), json_type(value)));
            None
        };

        match (kind, value) {
            (ParamType::Text, Value::String(_)) => None,
            (ParamType::Text, Value::Number(_) | Value::Bool(_)) => {
                report.warn(format!("Converted {} to text", field));
                Some(Value::String(value.to_string()))
            }

            (ParamType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => None,
            (ParamType::Integer, Value::Number(n)) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    report.warn(format!("Converted {} to integer", field));
                    Some(Value::Number(Number::from(f as i64)))
                }
                _ => mismatch(report),
            },
            (ParamType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(n) => {
                    report.warn(format!("Converted {} to integer", field));
                    Some(Value::Number(Number::from(n)))
                }
                Err(_) => mismatch(report),
            },

            (ParamType::Number, Value::Number(_)) => None,
            (ParamType::Number, Value::String(s)) => {
                match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                    Some(n) => {
                        report.warn(format!("Converted {} to number", field));
                        Some(Value::Number(n))
                    }
                    None => mismatch(report),
                }
            }

            (ParamType::TextList, Value::String(s)) => {
                report.warn(format!("Converted {} to a list", field));
                Some(Value::Array(vec![Value::String(s.clone())]))
            }
            (ParamType::TextList, Value::Array(items)) => {
                if items.iter().all(Value::is_string) {
                    return None;
                }
                if items.iter().all(|i| i.is_number() || i.is_string() || i.is_boolean()) {
                    report.warn(format!("Converted {} entries to text", field));
                    return Some(Value::Array(
                        items
                            .iter()
                            .map(|i| match i {
                                Value::String(_) => i.clone(),
                                other => Value::String(other.to_string()),
                            })
                            .collect(),
                    ));
                }
                mismatch(report)
            }

            (ParamType::RowList, Value::Array(items)) if items.iter().all(Value::is_u64) => None,

            (ParamType::Object, Value::Object(_)) => None,

            (ParamType::Data, Value::Array(_) | Value::Object(_) | Value::String(_)) => None,
            (ParamType::Data, Value::Number(_) | Value::Bool(_)) => {
                report.warn(format!("Converted {} to text", field));
                Some(Value::String(value.to_string()))
            }

            (ParamType::ChartId, Value::String(_)) => None,
            (ParamType::ChartId, Value::Number(n)) if n.is_i64() || n.is_u64() => None,

            (ParamType::Conditions, Value::Object(_) | Value::Array(_)) => {
                if let Err(e) = ConditionClause::parse_set(value) {
                    report.error(field, e.to_string());
                }
                None
            }

            _ => mismatch(report),
        }
    }

    fn check_bounds(
        &self,
        operation: OperationKind,
        sanitized: &mut Map<String, Value>,
        report: &mut Report,
    ) {
        let bounded = [
            ("max_rows", self.limits.max_rows),
            ("max_columns", self.limits.max_columns),
        ];
        for (field, ceiling) in bounded {
            if let Some(n) = sanitized.get(field).and_then(Value::as_i64) {
                if n < 1 {
                    report.error(field, format!("{} must be at least 1", field));
                } else if n as u64 > ceiling {
                    report.error(field, format!("{} cannot exceed {} for safety", field, ceiling));
                }
            }
        }

        for field in ["position", "count"] {
            if let Some(n) = sanitized.get(field).and_then(Value::as_i64) {
                if n < 1 {
                    report.error(field, format!("{} must be at least 1", field));
                }
            }
        }

        if let Some(Value::String(name)) = sanitized.get("sheet_name") {
            if let Err(e) = self.check_sheet_name(name) {
                report.error("sheet_name", e.to_string());
            }
        }

        for field in ["range", "data_range"] {
            if let Some(Value::String(range)) = sanitized.get(field) {
                if let Err(e) = CellRange::parse(range) {
                    report.error(field, e.to_string());
                }
            }
        }

        if let Some(Value::String(chart_type)) = sanitized.get_mut("chart_type") {
            let normalized = chart_type.trim().to_lowercase();
            if !CHART_TYPES.contains(&normalized.as_str()) {
                report.error(
                    "chart_type",
                    format!(
                        "Invalid chart type: {}. Valid types: {}",
                        normalized,
                        CHART_TYPES.join(", ")
                    ),
                );
            }
            *chart_type = normalized;
        }

        if operation == OperationKind::AggregateData {
            if let Some(Value::String(aggregation)) = sanitized.get_mut("operation") {
                let normalized = aggregation.trim().to_lowercase();
                if !AGGREGATIONS.contains(&normalized.as_str()) {
                    report.error(
                        "operation",
                        format!(
                            "Invalid aggregation operation: {}. Valid operations: {}",
                            normalized,
                            AGGREGATIONS.join(", ")
                        ),
                    );
                }
                *aggregation = normalized;
            }
        }

        if operation == OperationKind::InsertRow {
            let fields = match sanitized.get("data") {
                Some(Value::Array(items)) if !items.iter().any(Value::is_array) => items.len(),
                Some(Value::Object(fields)) => fields.len(),
                _ => 0,
            };
            if fields > MAX_INSERT_FIELDS {
                report.error(
                    "data",
                    format!(
                        "Cannot insert more than {} values in a single row",
                        MAX_INSERT_FIELDS
                    ),
                );
            }
        }

        if operation == OperationKind::FilterData {
            if let Some(Value::Array(conditions)) = sanitized.get("conditions") {
                if conditions.len() > MANY_FILTER_CONDITIONS {
                    report.warn("Large number of filter conditions may impact performance");
                }
            }
        }

        for (field, value) in sanitized.iter() {
            self.check_string_lengths(field, value, report);
        }
    }

    fn check_string_lengths(&self, path: &str, value: &Value, report: &mut Report) {
        match value {
            Value::String(s) if s.chars().count() > self.rules.max_string_length => {
                report.error(
                    path,
                    format!(
                        "value is {} characters long (limit {})",
                        s.chars().count(),
                        self.rules.max_string_length
                    ),
                );
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.check_string_lengths(&format!("{}[{}]", path, i), item, report);
                }
            }
            Value::Object(fields) => {
                for (key, item) in fields {
                    self.check_string_lengths(&format!("{}.{}", path, key), item, report);
                }
            }
            _ => {}
        }
    }

    /// 문자열 값과 매핑 키 재귀 검사
    ///
    /// 조건 파라미터 안의 "operator" 값은 지원하는 연산자일 때만 건너뜁니다.
    fn check_injection(&self, path: &str, value: &mut Value, clauses: bool, report: &mut Report) {
        match value {
            Value::String(s) if self.is_injection(s) => {
                warn!(field = %path, "formula injection detected");
                report.warn(format!(
                    "Parameter {} contains a potential formula injection: {:?}",
                    path, s
                ));
                match self.rules.injection_policy {
                    InjectionPolicy::Strip => *s = self.sanitize_string(s),
                    InjectionPolicy::Reject => {
                        report.error(path, "formulas and external-reference functions are not allowed")
                    }
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter_mut().enumerate() {
                    self.check_injection(&format!("{}[{}]", path, i), item, clauses, report);
                }
            }
            Value::Object(fields) => {
                for (key, mut item) in std::mem::take(fields) {
                    let child = format!("{}.{}", path, key);
                    let clause_operator = clauses
                        && key == "operator"
                        && item
                            .as_str()
                            .map_or(false, |op| op.parse::<ConditionOperator>().is_ok());
                    if !clause_operator {
                        self.check_injection(&child, &mut item, clauses, report);
                    }

                    let key = self.check_key(&child, key, report);
                    if fields.contains_key(&key) {
                        report.error(
                            &child,
                            format!("key collides with existing key '{}' after sanitization", key),
                        );
                        continue;
                    }
                    fields.insert(key, item);
                }
            }
            _ => {}
        }
    }

    /// 매핑 키 검사 (삽입/수정 시 열 이름이 됨)
    fn check_key(&self, path: &str, key: String, report: &mut Report) -> String {
        if !self.is_injection(&key) {
            return key;
        }

        warn!(field = %path, "formula injection in mapping key");
        report.warn(format!(
            "Key of {} contains a potential formula injection: {:?}",
            path, key
        ));
        match self.rules.injection_policy {
            InjectionPolicy::Strip => {
                let cleaned = self.sanitize_string(&key);
                if cleaned.trim().is_empty() {
                    report.error(path, "key is empty after removing the formula");
                }
                cleaned
            }
            InjectionPolicy::Reject => {
                report.error(path, "mapping keys must not contain formulas");
                key
            }
        }
    }

    /// `values`/`data`의 값을 시트에 선언된 열 타입과 비교
    ///
    /// 시트에 없는 열이나 스칼라가 아닌 값은 검사하지 않습니다.
    pub fn check_column_types(
        parameters: &Map<String, Value>,
        sheet: &SheetSnapshot,
    ) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if let Some(Value::Object(values)) = parameters.get("values") {
            check_named_cells("values", values, sheet, &mut errors);
        }

        match parameters.get("data") {
            Some(Value::Object(fields)) => check_named_cells("data", fields, sheet, &mut errors),
            Some(Value::Array(items)) if items.iter().any(|i| i.is_array() || i.is_object()) => {
                for (i, item) in items.iter().enumerate() {
                    let path = format!("data[{}]", i);
                    match item {
                        Value::Object(fields) => check_named_cells(&path, fields, sheet, &mut errors),
                        Value::Array(cells) => check_positional_cells(&path, cells, sheet, &mut errors),
                        _ => {}
                    }
                }
            }
            Some(Value::Array(cells)) => check_positional_cells("data", cells, sheet, &mut errors),
            _ => {}
        }

        errors
    }
}

fn check_named_cells(
    path: &str,
    fields: &Map<String, Value>,
    sheet: &SheetSnapshot,
    errors: &mut Vec<FieldError>,
) {
    for (name, value) in fields {
        if let Some(column) = sheet.column(name) {
            check_cell(&format!("{}.{}", path, name), column, value, errors);
        }
    }
}

fn check_positional_cells(
    path: &str,
    cells: &[Value],
    sheet: &SheetSnapshot,
    errors: &mut Vec<FieldError>,
) {
    for (i, (column, value)) in sheet.columns.iter().zip(cells).enumerate() {
        check_cell(&format!("{}[{}]", path, i), column, value, errors);
    }
}

fn check_cell(path: &str, column: &ColumnSpec, value: &Value, errors: &mut Vec<FieldError>) {
    let Some(cell) = CellValue::from_json(value) else {
        return;
    };
    if !column.kind.accepts(&cell) {
        errors.push(FieldError {
            field: path.to_string(),
            message: format!(
                "{} expects {}, got {}",
                column.name,
                column.kind.as_str(),
                cell.type_name()
            ),
        });
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> ParameterValidator {
        ParameterValidator::new(&SafetyConfig::default()).unwrap()
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_required_parameters() {
        let result = validator().validate(OperationKind::CreateChart, &params(json!({"chart_type": "bar"})));
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "data_range");
        assert!(result.errors[0].message.contains("Missing required parameter"));
    }

    #[test]
    fn test_injection_is_stripped_with_warning() {
        let raw = params(json!({"values": {"Note": "=INDIRECT(A1)"}}));
        let result = validator().validate(OperationKind::UpdateCells, &raw);

        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("values.Note"));
        assert_eq!(result.sanitized_parameters["values"]["Note"], json!("(A1)"));
        // 입력은 그대로
        assert_eq!(raw["values"]["Note"], json!("=INDIRECT(A1)"));
    }

    #[test]
    fn test_injection_reject_policy() {
        let mut config = SafetyConfig::default();
        config.sanitization.injection_policy = InjectionPolicy::Reject;
        let validator = ParameterValidator::new(&config).unwrap();

        let result = validator.validate(
            OperationKind::InsertRow,
            &params(json!({"data": ["Kim", "=HYPERLINK(\"http://evil\")"]})),
        );
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "data[1]");
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_function_names_without_equals() {
        let validator = validator();
        assert!(validator.is_injection("see webservice (\"http://x\")"));
        assert!(validator.is_injection("  =1+1"));
        assert!(validator.is_injection("SYSTEM(\"calc\")"));
        assert!(!validator.is_injection("Call center"));
        assert!(!validator.is_injection("a = b"));
        assert_eq!(validator.sanitize_string("x IMPORTXML(y)"), "x (y)");
    }

    #[test]
    fn test_configured_injection_functions() {
        let mut config = SafetyConfig::default();
        config.sanitization.injection_functions.push("CUBEVALUE".to_string());
        let validator = ParameterValidator::new(&config).unwrap();
        assert!(validator.is_injection("cubevalue(\"x\")"));
        assert!(validator.is_injection("REGISTER.ID(1)"));
    }

    #[test]
    fn test_sanitization_is_idempotent() {
        let validator = validator();
        let samples = [
            json!({"data": ["==INDIRECT(INDIRECT(A1))", " = shell(\"rm\")", "plain"]}),
            json!({"data": {"Note": "=  =HYPERLINK(x)"}, "title": "=EVALUATE(1)"}),
            json!({"values": {"A": "IMPORTDATA (url) and DDE(y)"}}),
        ];

        for sample in samples {
            let once = validator.validate(OperationKind::InsertRow, &params(sample));
            let twice = validator.validate(OperationKind::InsertRow, &once.sanitized_parameters);
            assert_eq!(once.sanitized_parameters, twice.sanitized_parameters);
            assert!(twice.warnings.is_empty());
        }
    }

    #[test]
    fn test_condition_operator_is_not_scanned() {
        let result = validator().validate(
            OperationKind::FilterData,
            &params(json!({"conditions": {"Score": {"operator": ">=", "value": 10}}})),
        );
        assert!(result.valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_operator_key_outside_conditions_is_scanned() {
        let result = validator().validate(
            OperationKind::InsertRow,
            &params(json!({"data": {"operator": "=HYPERLINK(\"http://evil\", \"x\")"}})),
        );
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("data.operator"));
        let cleaned = result.sanitized_parameters["data"]["operator"].as_str().unwrap();
        assert!(!validator().is_injection(cleaned));

        // 연산자가 아닌 수식은 조건 안에서도 검사
        let result = validator().validate(
            OperationKind::FilterData,
            &params(json!({"conditions": {"Score": {"operator": "=WEBSERVICE(\"u\")", "value": 1}}})),
        );
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("conditions.Score.operator"));
    }

    #[test]
    fn test_mapping_keys_are_scanned() {
        let result = validator().validate(
            OperationKind::InsertRow,
            &params(json!({"data": {"=INDIRECT(A1)": "v", "Name": "Kim"}})),
        );
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Key of data.=INDIRECT(A1)"));
        let data = result.sanitized_parameters["data"].as_object().unwrap();
        assert_eq!(data.get("(A1)"), Some(&json!("v")));
        assert!(!data.contains_key("=INDIRECT(A1)"));

        let mut config = SafetyConfig::default();
        config.sanitization.injection_policy = InjectionPolicy::Reject;
        let strict = ParameterValidator::new(&config).unwrap();
        let result = strict.validate(
            OperationKind::UpdateCells,
            &params(json!({"values": {"=INDIRECT(A1)": "v"}})),
        );
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "values.=INDIRECT(A1)");
        assert_eq!(result.errors[0].message, "mapping keys must not contain formulas");
    }

    #[test]
    fn test_sanitized_key_collision_is_an_error() {
        let result = validator().validate(
            OperationKind::InsertRow,
            &params(json!({"data": {"=Name": "a", "Name": "b"}})),
        );
        assert!(!result.valid);
        assert!(result.errors[0].message.contains("collides with existing key 'Name'"));
    }

    #[test]
    fn test_type_coercion() {
        let result = validator().validate(
            OperationKind::AggregateData,
            &params(json!({"columns": "Revenue", "operation": "SUM", "position": "3"})),
        );
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.sanitized_parameters["columns"], json!(["Revenue"]));
        assert_eq!(result.sanitized_parameters["operation"], json!("sum"));
        assert_eq!(result.sanitized_parameters["position"], json!(3));
        assert_eq!(result.warnings.len(), 2);

        let result = validator().validate(
            OperationKind::InsertColumn,
            &params(json!({"column_name": "Tier", "position": "left"})),
        );
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "position");
    }

    #[test]
    fn test_bounds() {
        let validator = validator();
        let result = validator.validate(
            OperationKind::QueryData,
            &params(json!({"max_rows": 80, "max_columns": 0, "position": 0})),
        );
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["max_rows", "max_columns", "position"]);

        let result = validator.validate(
            OperationKind::CreateChart,
            &params(json!({"data_range": "A1:", "chart_type": "Donut"})),
        );
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["data_range", "chart_type"]);
    }

    #[test]
    fn test_string_length_ceiling() {
        let long = "x".repeat(1001);
        let result = validator().validate(
            OperationKind::InsertRow,
            &params(json!({"data": {"Note": long}})),
        );
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "data.Note");
    }

    #[test]
    fn test_sheet_name_rules() {
        let validator = validator();
        assert!(validator.check_sheet_name("Customers").is_ok());
        assert!(validator.check_sheet_name("").is_err());
        assert!(validator.check_sheet_name("Q1/Q2").is_err());
        assert!(validator.check_sheet_name(&"S".repeat(32)).is_err());
        assert!(validator.check_sheet_name(&"S".repeat(31)).is_ok());
    }

    #[test]
    fn test_invalid_conditions() {
        let result = validator().validate(
            OperationKind::FilterData,
            &params(json!({"conditions": {}})),
        );
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "conditions");
    }
}

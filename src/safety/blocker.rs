use crate::config::SafetyConfig;
use crate::error::{Result, SheetGuardError};
use crate::operation::OperationKind;
use crate::safety::range::CellRange;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// 전체 범위를 암시하는 문구 (대소문자 무시)
static DANGEROUS_PHRASES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b(format|delete|clear|remove|replace)\s+(all|everything|entire|whole)\b",
        r"\b(all|everything|entire|whole)\s+(format|delete|clear|remove|replace)\b",
        r"\b(entire|whole|complete)\s+(spreadsheet|workbook|file|sheet)\b",
        r"\bremove\s+all\s+data\b",
        r"\bformat\s+entire\b",
        r"\bA:Z\b",
        r"\b1:1048576\b",
        r"\bA1:XFD1048576\b",
    ]
    .iter()
    .map(|p| compile_phrase(p).unwrap())
    .collect()
});

fn compile_phrase(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// 차단 검사 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResult {
    pub blocked: bool,
    /// 짧은 차단 사유
    pub reason: String,
    /// 사용자에게 보여줄 설명
    pub message: String,
    pub suggested_alternatives: Vec<String>,
}

impl BlockResult {
    pub fn allowed() -> Self {
        Self::default()
    }

    fn deny(reason: impl Into<String>, message: impl Into<String>, alternatives: &[&str]) -> Self {
        Self {
            blocked: true,
            reason: reason.into(),
            message: message.into(),
            suggested_alternatives: alternatives.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// 차단 사유 + 대안 목록을 하나의 메시지로
    pub fn format_error_message(&self) -> String {
        if !self.blocked {
            return String::new();
        }

        let mut message = format!("{}\n\n{}", self.reason, self.message);
        if !self.suggested_alternatives.is_empty() {
            message.push_str("\n\nSuggested alternatives:");
            for (i, alternative) in self.suggested_alternatives.iter().enumerate() {
                message.push_str(&format!("\n  {}. {}", i + 1, alternative));
            }
        }
        message
    }

    pub fn into_error(self) -> Option<SheetGuardError> {
        self.blocked
            .then(|| SheetGuardError::BlockedOperation(self.reason))
    }
}

/// 차단 목록 검사기
///
/// 내장 차단 작업과 위험 문구는 항상 적용되며 설정으로는 추가만 가능합니다.
pub struct CommandBlocker {
    denied_operations: Vec<OperationKind>,
    extra_phrases: Vec<Regex>,
}

impl CommandBlocker {
    pub fn new(config: &SafetyConfig) -> Result<Self> {
        let extra_phrases = config
            .blocking
            .dangerous_phrases
            .iter()
            .map(|p| {
                compile_phrase(p).map_err(|e| {
                    SheetGuardError::ConfigError(format!("invalid dangerous phrase '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            denied_operations: config.blocking.denied_operations.clone(),
            extra_phrases,
        })
    }

    pub fn is_operation_blocked(&self, operation: OperationKind) -> bool {
        operation.is_mass_operation() || self.denied_operations.contains(&operation)
    }

    /// 작업 이름, 원문 명령, 범위 순으로 검사
    ///
    /// `target_range`는 요청의 대상 지정에서 나온 범위로, 범위 파라미터와 같은 규칙을 적용합니다.
    pub fn check(
        &self,
        operation: OperationKind,
        parameters: &Map<String, Value>,
        command_text: Option<&str>,
        target_range: Option<CellRange>,
    ) -> BlockResult {
        if self.is_operation_blocked(operation) {
            warn!(operation = %operation, "operation is on the deny-list");
            return Self::denied(operation);
        }

        if let Some(text) = command_text {
            if let Some(pattern) = self.matching_phrase(text) {
                warn!(operation = %operation, pattern = %pattern, "dangerous phrase in command");
                return Self::mass_phrase();
            }
        }

        let full_sheet = ["range", "data_range"]
            .iter()
            .filter_map(|key| {
                parameters
                    .get(*key)
                    .and_then(Value::as_str)
                    .and_then(|r| CellRange::parse(r).ok())
                    .map(|range| (*key, range))
            })
            .chain(target_range.map(|range| ("target", range)))
            .find(|(_, range)| range.is_full_sheet());

        if let Some((source, range)) = full_sheet {
            warn!(operation = %operation, source, range = %range, "full-sheet range");
            return BlockResult::deny(
                "Range covers the entire sheet",
                format!(
                    "'{}' ({}) covers every cell in the sheet. Please specify the exact cells to use.",
                    source, range
                ),
                &[
                    "Specify exact cell ranges (e.g., A1:B10)",
                    "Add conditions to limit the operation scope",
                ],
            );
        }

        BlockResult::allowed()
    }

    /// 차단 작업의 대안 제안
    pub fn safe_alternatives(&self, operation: OperationKind) -> Vec<String> {
        Self::denied(operation).suggested_alternatives
    }

    fn matching_phrase(&self, text: &str) -> Option<&Regex> {
        DANGEROUS_PHRASES
            .iter()
            .chain(self.extra_phrases.iter())
            .find(|pattern| pattern.is_match(text))
    }

    fn mass_phrase() -> BlockResult {
        BlockResult::deny(
            "Command contains dangerous mass operation pattern",
            "This command appears to be a mass operation that could affect large amounts of data. \
             For safety, please specify exact ranges, conditions, or limits for your operation.",
            &[
                "Specify exact cell ranges (e.g., A1:B10)",
                "Add conditions to limit the operation scope",
                "Break the operation into smaller, specific tasks",
                "Use preview mode to see what would be affected",
            ],
        )
    }

    fn denied(operation: OperationKind) -> BlockResult {
        match operation {
            OperationKind::FormatAll => BlockResult::deny(
                "Mass formatting operations are not allowed",
                "This operation is not allowed as it would affect the entire spreadsheet formatting. \
                 Please specify a specific range or cells to format.",
                &[
                    "Specify a cell range like \"A1:B10\" instead of \"all\"",
                    "Format individual columns or rows",
                    "Use conditional formatting for specific criteria",
                ],
            ),
            OperationKind::DeleteAll => BlockResult::deny(
                "Mass deletion operations are not permitted",
                "Mass deletion operations are not permitted for safety. \
                 Please specify exact rows, columns, or conditions for deletion.",
                &[
                    "Delete specific rows by row number",
                    "Delete based on specific conditions",
                    "Clear content instead of deleting structure",
                ],
            ),
            OperationKind::ClearAll => BlockResult::deny(
                "Mass clear operations are not allowed",
                "Clearing all data is not permitted for safety. \
                 Please specify the exact range or conditions for clearing data.",
                &[
                    "Clear specific cell ranges",
                    "Clear based on conditions",
                    "Clear individual sheets instead of entire workbook",
                ],
            ),
            OperationKind::ReplaceAll => BlockResult::deny(
                "Mass replace operations are dangerous",
                "Mass replace operations could cause unintended data changes. \
                 Please specify conditions or ranges for replacement.",
                &[
                    "Replace within specific columns",
                    "Use find and replace with conditions",
                    "Preview changes before applying",
                ],
            ),
            other => BlockResult::deny(
                format!("Operation '{}' is disabled by configuration", other),
                format!(
                    "The '{}' operation is on the configured deny-list and cannot be run.",
                    other
                ),
                &["Ask an administrator to review the blocking configuration"],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blocker() -> CommandBlocker {
        CommandBlocker::new(&SafetyConfig::default()).unwrap()
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_mass_operations_always_blocked() {
        let blocker = blocker();
        for operation in [
            OperationKind::FormatAll,
            OperationKind::DeleteAll,
            OperationKind::ClearAll,
            OperationKind::ReplaceAll,
        ] {
            let result = blocker.check(operation, &params(json!({"range": "A1:A2"})), None, None);
            assert!(result.blocked, "{} should be blocked", operation);
            assert!(!result.suggested_alternatives.is_empty());
        }
    }

    #[test]
    fn test_format_all_message() {
        let result = blocker().check(OperationKind::FormatAll, &Map::new(), Some("make it bold"), None);
        assert_eq!(result.reason, "Mass formatting operations are not allowed");
        assert!(result
            .suggested_alternatives
            .contains(&"Specify a cell range like \"A1:B10\" instead of \"all\"".to_string()));
    }

    #[test]
    fn test_dangerous_phrases() {
        let blocker = blocker();
        for text in [
            "Delete everything please",
            "format the whole sheet",
            "please remove all data",
            "update A1:XFD1048576",
            "Entire Workbook should be cleared",
        ] {
            let result = blocker.check(OperationKind::UpdateCells, &Map::new(), Some(text), None);
            assert!(result.blocked, "expected block for {:?}", text);
        }

        let result = blocker.check(
            OperationKind::DeleteRows,
            &Map::new(),
            Some("delete inactive customers"),
            None,
        );
        assert!(!result.blocked);
    }

    #[test]
    fn test_full_sheet_range_parameter() {
        let blocker = blocker();
        let result = blocker.check(
            OperationKind::CreateChart,
            &params(json!({"data_range": "A:XFD"})),
            None,
            None,
        );
        assert!(result.blocked);
        assert_eq!(result.reason, "Range covers the entire sheet");

        let result = blocker.check(
            OperationKind::UpdateCells,
            &params(json!({"range": "A1:B10"})),
            None,
            None,
        );
        assert!(!result.blocked);
    }

    #[test]
    fn test_full_sheet_target_range() {
        let blocker = blocker();
        for range in ["A1:XFD1048576", "A:XFD", "1:1048576"] {
            let result = blocker.check(
                OperationKind::QueryData,
                &Map::new(),
                None,
                Some(CellRange::parse(range).unwrap()),
            );
            assert!(result.blocked, "expected block for target {}", range);
            assert!(result.message.starts_with("'target'"));
        }

        let result = blocker.check(
            OperationKind::ModifyChart,
            &Map::new(),
            None,
            Some(CellRange::parse("A1:C20").unwrap()),
        );
        assert!(!result.blocked);
    }

    #[test]
    fn test_config_extends_deny_list() {
        let mut config = SafetyConfig::default();
        config.blocking.denied_operations.push(OperationKind::DeleteColumns);
        config.blocking.dangerous_phrases.push(r"\bwipe\b".to_string());
        let blocker = CommandBlocker::new(&config).unwrap();

        assert!(blocker.is_operation_blocked(OperationKind::DeleteColumns));
        assert!(blocker.is_operation_blocked(OperationKind::FormatAll));
        assert!(blocker
            .check(OperationKind::ClearData, &Map::new(), Some("WIPE column C"), None)
            .blocked);
    }

    #[test]
    fn test_format_error_message() {
        let message = blocker()
            .check(OperationKind::DeleteAll, &Map::new(), None, None)
            .format_error_message();
        assert!(message.contains("Mass deletion operations are not permitted"));
        assert!(message.contains("1. Delete specific rows by row number"));
        assert!(BlockResult::allowed().format_error_message().is_empty());
    }
}

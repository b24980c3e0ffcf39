use crate::config::{ConfigHandle, SafetyConfig};
use crate::error::{Result, SheetGuardError};
use crate::operation::{OperationKind, OperationRequest};
use crate::safety::blocker::{BlockResult, CommandBlocker};
use crate::safety::decision::SafetyDecision;
use crate::safety::range::CellRange;
use crate::safety::risk::{RiskAssessment, RiskAssessor, RiskLevel};
use crate::safety::scope::{ScopeAnalysis, ScopeAnalyzer, ScopeSource};
use crate::safety::target::{ResolvedTarget, TargetResolver, TargetSpec};
use crate::safety::validator::{FieldError, ParameterValidator, ValidationResult};
use crate::sheet::SheetSnapshot;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 미리보기 행마다 보여줄 열 수
const PREVIEW_COLUMNS: usize = 3;

/// 안전성 평가 파이프라인
///
/// 단계 순서는 고정입니다: 검증 -> 대상 해석 -> 범위 -> 위험도 -> 차단 -> 종합.
/// 차단 목록의 작업만은 검증 결과와 무관하게 곧바로 차단됩니다.
/// 매니저는 생성 시점의 설정 스냅샷만 사용하며 내부 가변 상태가 없습니다.
pub struct SafetyManager {
    config: Arc<SafetyConfig>,
    validator: ParameterValidator,
    resolver: TargetResolver,
    scope: ScopeAnalyzer,
    risk: RiskAssessor,
    blocker: CommandBlocker,
}

impl SafetyManager {
    pub fn new(config: Arc<SafetyConfig>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            validator: ParameterValidator::new(&config)?,
            resolver: TargetResolver::new(),
            scope: ScopeAnalyzer::new(config.limits),
            risk: RiskAssessor::new(config.risk),
            blocker: CommandBlocker::new(&config)?,
            config,
        })
    }

    /// 현재 게시된 설정 스냅샷으로 생성
    pub fn from_handle(handle: &ConfigHandle) -> Result<Self> {
        Self::new(handle.current_configuration())
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// 요청 하나를 평가
    pub fn evaluate(&self, request: &OperationRequest, sheet: &SheetSnapshot) -> SafetyDecision {
        let operation = request.operation;
        debug!(operation = %operation, sheet = %request.sheet, confirmed = request.confirmed, "evaluating request");

        // 1. 파라미터 검증
        let mut validation = self.validator.validate(operation, &request.parameters);

        // 차단 목록의 작업은 파라미터와 무관하게 차단
        if self.blocker.is_operation_blocked(operation) {
            return self.deny_listed(request, validation);
        }

        if let Err(e) = self.validator.check_sheet_name(&request.sheet) {
            validation.errors.push(FieldError {
                field: "sheet".to_string(),
                message: e.to_string(),
            });
            validation.valid = false;
        }
        let type_errors =
            ParameterValidator::check_column_types(&validation.sanitized_parameters, sheet);
        if !type_errors.is_empty() {
            validation.errors.extend(type_errors);
            validation.valid = false;
        }
        if !validation.valid {
            let errors = validation.error_messages();
            return self.reject(
                request,
                validation,
                errors,
                vec!["Correct the listed parameters and resubmit the request".to_string()],
            );
        }

        // 2. 대상 해석
        let mut warnings = validation.warnings.clone();
        let (target, source_range) = match self.resolve_target(request, &validation, sheet, &mut warnings) {
            Ok(resolved) => resolved,
            Err(e) => {
                let suggestions = clarification_suggestions(&e);
                return self.reject(request, validation, vec![e.to_string()], suggestions);
            }
        };

        // 3. 영향 범위
        let target_range = target.as_ref().and_then(|t| t.range).or(source_range);
        let source = match (&target, source_range) {
            (Some(target), _) => ScopeSource::Target(target),
            (None, Some(range)) => ScopeSource::Range(range),
            (None, None) => ScopeSource::Sheet,
        };
        let scope = self
            .scope
            .analyze(operation, source, &validation.sanitized_parameters, sheet);

        // 4. 위험도
        let risk = self.risk.assess(
            operation,
            &scope,
            &validation.sanitized_parameters,
            request.command_text.as_deref(),
        );

        // 5. 차단 목록
        let mut block = self.blocker.check(
            operation,
            &validation.sanitized_parameters,
            request.command_text.as_deref(),
            target_range,
        );
        if !block.blocked && risk.blocked {
            block = dangerous_block(&risk, &scope);
        }

        // 6. 종합
        let mut suggestions = scope.suggestions();
        let mut decision = SafetyDecision {
            operation,
            sheet: request.sheet.clone(),
            safe: false,
            blocked: false,
            confirmation_required: false,
            confirmation_prompt: None,
            backup_required: false,
            errors: Vec::new(),
            warnings,
            suggestions: Vec::new(),
            validation,
            target,
            scope: Some(scope),
            risk: Some(risk),
            block: None,
        };

        if block.blocked {
            warn!(operation = %operation, reason = %block.reason, "operation blocked");
            decision.blocked = true;
            decision.errors.push(block.reason.clone());
            suggestions.extend(block.suggested_alternatives.iter().cloned());
        } else {
            let level = decision.risk.as_ref().map(|r| r.level).unwrap_or(RiskLevel::Low);
            decision.backup_required = level == RiskLevel::High;
            if level == RiskLevel::Low || request.confirmed {
                decision.safe = true;
            } else {
                decision.confirmation_required = true;
                decision.confirmation_prompt = Some(self.confirmation_prompt(&decision, sheet));
            }
        }

        decision.suggestions = dedup(suggestions);
        decision.block = Some(block);

        info!(
            operation = %operation,
            sheet = %decision.sheet,
            verdict = %decision.verdict(),
            rows = decision.affected_rows(),
            "safety decision"
        );
        decision
    }

    /// 독립된 요청들을 병렬로 평가 (결과 순서는 입력 순서와 동일)
    pub fn evaluate_batch(
        &self,
        requests: &[OperationRequest],
        sheet: &SheetSnapshot,
    ) -> Vec<SafetyDecision> {
        requests
            .par_iter()
            .map(|request| self.evaluate(request, sheet))
            .collect()
    }

    /// 대상 지정을 찾아 해석
    ///
    /// 반환값: (해석된 대상, 아직 풀지 않은 조회용 범위)
    fn resolve_target(
        &self,
        request: &OperationRequest,
        validation: &ValidationResult,
        sheet: &SheetSnapshot,
        warnings: &mut Vec<String>,
    ) -> Result<(Option<ResolvedTarget>, Option<CellRange>)> {
        let operation = request.operation;

        if request.sheet != sheet.name {
            return Err(SheetGuardError::Validation(format!(
                "request targets sheet '{}' but the snapshot is of sheet '{}'",
                request.sheet, sheet.name
            )));
        }

        let from_parameters = TargetSpec::from_parameters(&validation.sanitized_parameters)?;
        let spec = match (&request.target, from_parameters) {
            (Some(_), Some(_)) => {
                return Err(SheetGuardError::Validation(
                    "target is given both in 'target' and in the parameters; specify it once"
                        .to_string(),
                ))
            }
            (Some(target), None) => Some(target.clone()),
            (None, from_parameters) => from_parameters,
        };

        let Some(spec) = spec else {
            if operation.requires_row_target() {
                return Err(SheetGuardError::Validation(format!(
                    "{} needs a target: rows, range, conditions or unique_identifier",
                    operation
                )));
            }
            return Ok((None, None));
        };

        for clause in spec.clauses() {
            if !sheet.has_column(&clause.column) {
                warnings.push(format!(
                    "Column '{}' does not exist in sheet '{}'; the condition never matches",
                    clause.column, sheet.name
                ));
            }
        }

        if let (TargetSpec::Range(range), true) = (&spec, operation.is_read_only()) {
            return Ok((None, Some(CellRange::parse(range)?)));
        }

        let resolved = self.resolver.resolve(sheet, &spec)?.require_unambiguous()?;

        if resolved.is_empty() && mutates_existing_rows(operation) {
            return Err(SheetGuardError::TargetNotFound {
                message: format!(
                    "no rows in sheet '{}' match {}",
                    sheet.name,
                    resolved.criteria.as_deref().unwrap_or("the target")
                ),
                missing_rows: Vec::new(),
            });
        }

        Ok((Some(resolved), None))
    }

    /// 차단 목록 작업: 검증 결과와 상관없이 차단
    fn deny_listed(
        &self,
        request: &OperationRequest,
        validation: ValidationResult,
    ) -> SafetyDecision {
        let block = self.blocker.check(
            request.operation,
            &validation.sanitized_parameters,
            request.command_text.as_deref(),
            None,
        );
        warn!(operation = %request.operation, reason = %block.reason, "operation blocked");
        SafetyDecision {
            operation: request.operation,
            sheet: request.sheet.clone(),
            safe: false,
            blocked: true,
            confirmation_required: false,
            confirmation_prompt: None,
            backup_required: false,
            errors: vec![block.reason.clone()],
            warnings: validation.warnings.clone(),
            suggestions: block.suggested_alternatives.clone(),
            validation,
            target: None,
            scope: None,
            risk: None,
            block: Some(block),
        }
    }

    fn reject(
        &self,
        request: &OperationRequest,
        validation: ValidationResult,
        errors: Vec<String>,
        suggestions: Vec<String>,
    ) -> SafetyDecision {
        info!(
            operation = %request.operation,
            sheet = %request.sheet,
            errors = errors.len(),
            "request rejected"
        );
        SafetyDecision {
            operation: request.operation,
            sheet: request.sheet.clone(),
            safe: false,
            blocked: false,
            confirmation_required: false,
            confirmation_prompt: None,
            backup_required: false,
            errors,
            warnings: validation.warnings.clone(),
            suggestions,
            validation,
            target: None,
            scope: None,
            risk: None,
            block: None,
        }
    }

    /// 확인 프롬프트: 요약 -> 위험 요인 -> 샘플 행 -> 경고 -> (백업) -> 안내
    fn confirmation_prompt(&self, decision: &SafetyDecision, sheet: &SheetSnapshot) -> String {
        let mut lines = Vec::new();

        let level = decision.risk.as_ref().map(|r| r.level).unwrap_or(RiskLevel::Medium);
        let scope_summary = decision
            .scope
            .as_ref()
            .map(ScopeAnalysis::summary)
            .unwrap_or_default();
        lines.push(format!(
            "{} risk: {} on sheet '{}' affects {}",
            level.as_str().to_uppercase(),
            decision.operation,
            decision.sheet,
            scope_summary
        ));

        if let Some(risk) = &decision.risk {
            lines.push("Risk factors:".to_string());
            lines.extend(risk.reasons.iter().map(|r| format!("  - {}", r)));
        }

        if let Some(target) = decision.target.as_ref().filter(|t| !t.is_empty()) {
            let limit = self.config.preview_rows;
            if limit > 0 {
                lines.push("Sample of affected rows:".to_string());
                for index in target.rows.iter().take(limit) {
                    match sheet.row(*index) {
                        Some(row) => lines.push(format!(
                            "  Row {}: {}",
                            index + 1,
                            row.preview(PREVIEW_COLUMNS)
                        )),
                        None => lines.push(format!("  Row {}: (empty)", index + 1)),
                    }
                }
                if target.rows.len() > limit {
                    lines.push(format!("  ... and {} more", target.rows.len() - limit));
                }
            }
        }

        if !decision.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            lines.extend(decision.warnings.iter().map(|w| format!("  - {}", w)));
        }

        if level == RiskLevel::High {
            lines.push(format!(
                "A backup of sheet '{}' must be taken before proceeding.",
                decision.sheet
            ));
        }

        lines.push("Re-submit the request with confirmed=true to proceed.".to_string());
        lines.join("\n")
    }
}

/// 기존 행을 바꾸거나 지우는 작업 (빈 대상이면 진행할 의미가 없음)
fn mutates_existing_rows(operation: OperationKind) -> bool {
    !operation.is_read_only() && !operation.is_insert()
}

fn dangerous_block(risk: &RiskAssessment, scope: &ScopeAnalysis) -> BlockResult {
    let mut alternatives = scope.suggestions();
    alternatives.push("Break the operation into smaller, specific tasks".to_string());
    BlockResult {
        blocked: true,
        reason: "Operation is destructive and exceeds safety limits".to_string(),
        message: risk.explanation(),
        suggested_alternatives: alternatives,
    }
}

fn clarification_suggestions(error: &SheetGuardError) -> Vec<String> {
    match error {
        SheetGuardError::TargetNotFound { missing_rows, .. } if !missing_rows.is_empty() => vec![
            "Check the row indices against the current sheet (indices start at 0)".to_string(),
        ],
        SheetGuardError::TargetNotFound { .. } => {
            vec!["Check the conditions against the current sheet contents".to_string()]
        }
        SheetGuardError::AmbiguousTarget { rows, .. } => {
            let listed: Vec<String> = rows.iter().map(|r| (r + 1).to_string()).collect();
            vec![
                format!("Matching rows: {}", listed.join(", ")),
                "Add more identifying columns to unique_identifier so only one row matches"
                    .to_string(),
            ]
        }
        _ => vec!["Correct the target and resubmit the request".to_string()],
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(items.len());
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::decision::Verdict;
    use crate::sheet::{CellValue, ColumnSpec, ColumnType};
    use serde_json::json;

    fn customers() -> SheetSnapshot {
        let mut sheet = SheetSnapshot::with_columns("Customers", &["Name", "Status", "Age", "City"]);
        let people = [
            ("Kim", "Active", 31),
            ("Lee", "Inactive", 45),
            ("Park", "Inactive", 28),
            ("Kim", "Inactive", 52),
            ("Choi", "Active", 39),
        ];
        for (name, status, age) in people {
            sheet
                .push_row(vec![
                    name.into(),
                    status.into(),
                    CellValue::from(age as i64),
                    "Seoul".into(),
                ])
                .unwrap();
        }
        sheet
    }

    fn manager() -> SafetyManager {
        SafetyManager::new(Arc::new(SafetyConfig::default())).unwrap()
    }

    #[test]
    fn test_query_is_allowed() {
        let request = OperationRequest::new(OperationKind::QueryData, "Customers")
            .with_parameter("conditions", json!({"Status": "Active"}));
        let decision = manager().evaluate(&request, &customers());
        assert_eq!(decision.verdict(), Verdict::Allow);
        assert_eq!(decision.target.unwrap().rows, vec![0, 4]);
    }

    #[test]
    fn test_delete_needs_confirmation_with_preview() {
        let request = OperationRequest::new(OperationKind::DeleteRows, "Customers")
            .with_parameter("conditions", json!({"Status": "Inactive"}));
        let decision = manager().evaluate(&request, &customers());

        assert_eq!(decision.verdict(), Verdict::Confirm);
        assert!(decision.backup_required);
        let prompt = decision.confirmation_prompt.unwrap();
        assert!(prompt.starts_with("HIGH risk: delete_rows on sheet 'Customers' affects 3 rows"));
        assert!(prompt.contains("  Row 2: Name: Lee, Status: Inactive, Age: 45"));
        assert!(!prompt.contains("City"));
        assert!(prompt.contains("A backup of sheet 'Customers' must be taken"));
        assert!(prompt.ends_with("Re-submit the request with confirmed=true to proceed."));
    }

    #[test]
    fn test_confirmed_request_is_allowed() {
        let request = OperationRequest::new(OperationKind::DeleteRows, "Customers")
            .with_parameter("rows", json!([1, 2]))
            .confirmed();
        let decision = manager().evaluate(&request, &customers());
        assert!(decision.safe);
        assert!(!decision.confirmation_required);
        assert!(decision.backup_required);
    }

    #[test]
    fn test_preview_truncation() {
        let mut config = SafetyConfig::default();
        config.preview_rows = 1;
        let manager = SafetyManager::new(Arc::new(config)).unwrap();
        let request = OperationRequest::new(OperationKind::ClearData, "Customers")
            .with_parameter("conditions", json!({"Status": "Inactive"}));
        let prompt = manager
            .evaluate(&request, &customers())
            .confirmation_prompt
            .unwrap();
        assert!(prompt.contains("Row 2:"));
        assert!(!prompt.contains("Row 3:"));
        assert!(prompt.contains("... and 2 more"));
    }

    #[test]
    fn test_ambiguous_identifier_is_rejected_even_when_confirmed() {
        let request = OperationRequest::new(OperationKind::UpdateCells, "Customers")
            .with_parameter("unique_identifier", json!({"Name": "Kim"}))
            .with_parameter("values", json!({"Status": "VIP"}))
            .confirmed();
        let decision = manager().evaluate(&request, &customers());

        assert_eq!(decision.verdict(), Verdict::Reject);
        assert!(decision.errors[0].contains("2 rows match"));
        assert!(decision.suggestions.contains(&"Matching rows: 1, 4".to_string()));
    }

    #[test]
    fn test_single_cell_update_is_medium() {
        let request = OperationRequest::new(OperationKind::UpdateCells, "Customers")
            .with_parameter("unique_identifier", json!({"Name": "Lee"}))
            .with_parameter("values", json!({"Status": "Active"}));
        let decision = manager().evaluate(&request, &customers());
        assert_eq!(decision.verdict(), Verdict::Confirm);
        assert_eq!(decision.risk.unwrap().level, RiskLevel::Medium);
        assert!(!decision.backup_required);
    }

    #[test]
    fn test_empty_conditions_match_aborts_mutation() {
        let request = OperationRequest::new(OperationKind::DeleteRows, "Customers")
            .with_parameter("conditions", json!({"Status": "Banned"}));
        let decision = manager().evaluate(&request, &customers());
        assert_eq!(decision.verdict(), Verdict::Reject);
        assert!(decision.errors[0].starts_with("Target not found"));
    }

    #[test]
    fn test_missing_target_for_delete() {
        let request = OperationRequest::new(OperationKind::DeleteRows, "Customers");
        let decision = manager().evaluate(&request, &customers());
        assert_eq!(decision.verdict(), Verdict::Reject);
        assert!(decision.errors[0].contains("needs a target"));
    }

    #[test]
    fn test_target_given_twice() {
        let request = OperationRequest::new(OperationKind::DeleteRows, "Customers")
            .with_target(TargetSpec::Rows(vec![1]))
            .with_parameter("range", json!("A2:D2"));
        let decision = manager().evaluate(&request, &customers());
        assert_eq!(decision.verdict(), Verdict::Reject);
    }

    #[test]
    fn test_unknown_condition_column_warns() {
        let request = OperationRequest::new(OperationKind::QueryData, "Customers")
            .with_parameter("conditions", json!({"Tier": "Gold"}));
        let decision = manager().evaluate(&request, &customers());
        assert_eq!(decision.verdict(), Verdict::Allow);
        assert!(decision.warnings[0].contains("Column 'Tier' does not exist"));
    }

    #[test]
    fn test_blocked_request_cannot_be_confirmed() {
        let request = OperationRequest::new(OperationKind::ClearAll, "Customers").confirmed();
        let decision = manager().evaluate(&request, &customers());
        assert!(decision.blocked);
        assert!(!decision.safe);
        assert!(!decision.confirmation_required);
        assert!(decision.confirmation_prompt.is_none());
    }

    #[test]
    fn test_invalid_sheet_name_is_rejected() {
        let request = OperationRequest::new(OperationKind::QueryData, "Q1/Q2");
        let decision = manager().evaluate(&request, &customers());
        assert_eq!(decision.verdict(), Verdict::Reject);
        assert_eq!(decision.validation.errors[0].field, "sheet");
    }

    #[test]
    fn test_deny_listed_operation_blocks_despite_invalid_parameters() {
        let request = OperationRequest::new(OperationKind::FormatAll, "Customers")
            .with_parameter("position", json!("left"));
        let decision = manager().evaluate(&request, &customers());
        assert_eq!(decision.verdict(), Verdict::Block);
        assert!(!decision.validation.valid);
        assert!(decision.block.unwrap().blocked);
        assert!(!decision.suggestions.is_empty());
    }

    #[test]
    fn test_deny_listed_operation_blocks_on_other_sheet() {
        let request = OperationRequest::new(OperationKind::DeleteAll, "Other");
        let decision = manager().evaluate(&request, &customers());
        assert_eq!(decision.verdict(), Verdict::Block);
        assert!(decision.scope.is_none());
    }

    #[test]
    fn test_full_sheet_target_is_blocked() {
        let request = OperationRequest::new(OperationKind::ModifyChart, "Customers")
            .with_parameter("chart_id", json!("chart1"))
            .with_target(TargetSpec::Range("A:XFD".to_string()))
            .confirmed();
        let decision = manager().evaluate(&request, &customers());
        assert_eq!(decision.verdict(), Verdict::Block);
        assert!(decision.block.unwrap().message.starts_with("'target' (A:XFD)"));
    }

    #[test]
    fn test_value_type_mismatch_is_rejected() {
        let sheet = SheetSnapshot::new(
            "Staff",
            vec![
                ColumnSpec::new("Name", ColumnType::Text),
                ColumnSpec::new("Age", ColumnType::Number),
            ],
        )
        .with_row(vec!["Kim".into(), 31i64.into()])
        .unwrap();

        let request = OperationRequest::new(OperationKind::UpdateCells, "Staff")
            .with_parameter("rows", json!([0]))
            .with_parameter("values", json!({"Age": "old"}))
            .confirmed();
        let decision = manager().evaluate(&request, &sheet);
        assert_eq!(decision.verdict(), Verdict::Reject);
        let error = &decision.validation.errors[0];
        assert_eq!(error.field, "values.Age");
        assert_eq!(error.message, "Age expects number, got text");

        let request = OperationRequest::new(OperationKind::InsertRow, "Staff")
            .with_parameter("data", json!(["Lee", "45"]));
        assert_ne!(manager().evaluate(&request, &sheet).verdict(), Verdict::Reject);

        let request = OperationRequest::new(OperationKind::InsertRow, "Staff")
            .with_parameter("data", json!([{"Name": 7, "Age": 45}]));
        let decision = manager().evaluate(&request, &sheet);
        assert_eq!(decision.verdict(), Verdict::Reject);
        assert_eq!(decision.validation.errors[0].field, "data[0].Name");
    }

    #[test]
    fn test_batch_preserves_order() {
        let requests = vec![
            OperationRequest::new(OperationKind::QueryData, "Customers"),
            OperationRequest::new(OperationKind::FormatAll, "Customers"),
            OperationRequest::new(OperationKind::DeleteRows, "Customers")
                .with_parameter("rows", json!([0])),
        ];
        let verdicts: Vec<Verdict> = manager()
            .evaluate_batch(&requests, &customers())
            .iter()
            .map(SafetyDecision::verdict)
            .collect();
        assert_eq!(verdicts, vec![Verdict::Allow, Verdict::Block, Verdict::Confirm]);
    }
}

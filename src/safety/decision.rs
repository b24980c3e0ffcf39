use crate::operation::OperationKind;
use crate::safety::blocker::BlockResult;
use crate::safety::risk::RiskAssessment;
use crate::safety::scope::ScopeAnalysis;
use crate::safety::target::ResolvedTarget;
use crate::safety::validator::ValidationResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 최종 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// 바로 실행 가능
    Allow,
    /// 사용자 확인 후 재요청 필요
    Confirm,
    /// 차단 (확인으로도 해제 불가)
    Block,
    /// 요청 수정 또는 대상 명확화 필요
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allowed",
            Self::Confirm => "confirmation required",
            Self::Block => "blocked",
            Self::Reject => "rejected",
        }
    }

    /// CLI 종료 코드
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Allow => 0,
            Self::Confirm => 1,
            Self::Block => 2,
            Self::Reject => 3,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 안전성 평가 결과
///
/// 하위 단계 결과는 실행된 단계까지만 채워집니다.
/// 예를 들어 파라미터 검증에서 거부되면 `target`, `scope`, `risk`, `block`은 None입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyDecision {
    pub operation: OperationKind,
    pub sheet: String,
    pub safe: bool,
    pub blocked: bool,
    pub confirmation_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_prompt: Option<String>,
    /// 실행 전에 백업이 필요함 (High 위험도)
    pub backup_required: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub validation: ValidationResult,
    pub target: Option<ResolvedTarget>,
    pub scope: Option<ScopeAnalysis>,
    pub risk: Option<RiskAssessment>,
    pub block: Option<BlockResult>,
}

impl SafetyDecision {
    pub fn verdict(&self) -> Verdict {
        if self.blocked {
            Verdict::Block
        } else if self.confirmation_required {
            Verdict::Confirm
        } else if self.safe {
            Verdict::Allow
        } else {
            Verdict::Reject
        }
    }

    /// 호출자가 요청을 고치거나 대상을 더 구체적으로 지정해야 하는지
    pub fn needs_clarification(&self) -> bool {
        self.verdict() == Verdict::Reject
    }

    pub fn affected_rows(&self) -> u64 {
        self.scope.as_ref().map(|s| s.estimated_rows).unwrap_or(0)
    }

    /// 로그/CLI용 상세 보고서
    pub fn report(&self) -> String {
        let mut lines = vec![format!(
            "Verdict: {} ({} on sheet '{}')",
            self.verdict().as_str().to_uppercase(),
            self.operation,
            self.sheet
        )];

        if let Some(risk) = &self.risk {
            lines.push(format!("Risk: {}", risk.level));
            lines.push(format!("  {}", risk.explanation()));
        }

        if let Some(scope) = &self.scope {
            lines.push(format!("Scope: {}", scope.summary()));
        }

        if let Some(target) = &self.target {
            let mut line = format!("Target: {} rows", target.row_count());
            if let Some(criteria) = &target.criteria {
                line.push_str(&format!(" matching {}", criteria));
            }
            lines.push(line);
        }

        if let Some(block) = self.block.as_ref().filter(|b| b.blocked) {
            lines.push(format!("Blocked: {}", block.reason));
            lines.push(format!("  {}", block.message));
        }

        if self.backup_required {
            lines.push(format!(
                "Backup: required before modifying '{}'",
                self.sheet
            ));
        }

        push_section(&mut lines, "Errors", &self.errors);
        push_section(&mut lines, "Warnings", &self.warnings);
        push_section(&mut lines, "Suggestions", &self.suggestions);

        lines.join("\n")
    }
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(format!("{}:", title));
    lines.extend(items.iter().map(|item| format!("  - {}", item)));
}

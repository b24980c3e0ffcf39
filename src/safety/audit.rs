use crate::error::Result;
use crate::operation::{OperationKind, OperationRequest};
use crate::safety::decision::{SafetyDecision, Verdict};
use crate::safety::risk::RiskLevel;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 평가 결과 감사 기록 (JSON 한 줄로 저장)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub operation: OperationKind,
    pub sheet: String,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    pub affected_rows: u64,
    pub confirmed: bool,
    /// 요청 지문 (확인 전후 요청이 같은 값을 가짐)
    pub fingerprint: String,
    pub messages: Vec<String>,
}

impl AuditRecord {
    pub fn from_decision(request: &OperationRequest, decision: &SafetyDecision) -> Result<Self> {
        let mut messages = decision.errors.clone();
        messages.extend(decision.warnings.iter().cloned());

        Ok(Self {
            timestamp: chrono::Utc::now(),
            operation: decision.operation,
            sheet: decision.sheet.clone(),
            verdict: decision.verdict(),
            risk_level: decision.risk.as_ref().map(|r| r.level),
            affected_rows: decision.affected_rows(),
            confirmed: request.confirmed,
            fingerprint: fingerprint(request)?,
            messages,
        })
    }

    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 요청 내용의 SHA256 해시 (hex)
///
/// `confirmed` 플래그는 제외되므로 확인 전 요청과 확인 후 재요청을 연결할 수 있습니다.
pub fn fingerprint(request: &OperationRequest) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(request.operation.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(request.sheet.as_bytes());
    hasher.update(b"|");
    hasher.update(serde_json::to_string(&request.parameters)?.as_bytes());
    hasher.update(b"|");
    hasher.update(serde_json::to_string(&request.target)?.as_bytes());
    hasher.update(b"|");
    hasher.update(request.command_text.as_deref().unwrap_or("").as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

//! 错误定义模块

use crate::models::{CaseId, CaseState, ResourceId};
use thiserror::Error;

/// 分诊引擎统一错误类型
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("输入无效: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("病例 {case_id} 已处于终止状态 {state:?}")]
    AlreadyTerminal { case_id: CaseId, state: CaseState },

    #[error("资源 {0} 未被分配")]
    NotAllocated(ResourceId),

    #[error("资源 {resource_id} 正被病例 {case_id} 占用")]
    CurrentlyAllocated {
        resource_id: ResourceId,
        case_id: CaseId,
    },

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("内部不变量被破坏: {0}")]
    InvariantViolation(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("指标错误: {0}")]
    Metrics(String),
}

impl TriageError {
    /// 是否为防御性故障（说明上游存在缺陷，而不是调用方的普通错误）
    pub fn is_defensive_fault(&self) -> bool {
        matches!(
            self,
            TriageError::NotAllocated(_)
                | TriageError::InvariantViolation(_)
                | TriageError::InvalidStateTransition { .. }
        )
    }
}

impl From<config::ConfigError> for TriageError {
    fn from(err: config::ConfigError) -> Self {
        TriageError::Config(err.to_string())
    }
}

/// 分诊引擎统一结果类型
pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defensive_fault_classification() {
        assert!(TriageError::NotAllocated(ResourceId(3)).is_defensive_fault());
        assert!(TriageError::InvariantViolation("double enqueue".to_string()).is_defensive_fault());
        assert!(!TriageError::NotFound("case 1".to_string()).is_defensive_fault());
        assert!(!TriageError::AlreadyTerminal {
            case_id: CaseId(1),
            state: CaseState::Served,
        }
        .is_defensive_fault());
    }
}

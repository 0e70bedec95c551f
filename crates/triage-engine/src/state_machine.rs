//! 病例状态机
//!
//! 管理病例从到达到终止的完整生命周期状态转换

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use triage_core::{CaseState, Result, TriageError};

/// 病例状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CaseEvent {
    Enqueue,
    Allocate,
    Complete,
    Cancel,
}

/// 病例状态机
#[derive(Debug)]
pub struct CaseStateMachine {
    transitions: HashMap<(CaseState, CaseEvent), CaseState>,
}

impl CaseStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((CaseState::Arrived, CaseEvent::Enqueue), CaseState::Waiting);
        transitions.insert((CaseState::Waiting, CaseEvent::Allocate), CaseState::Allocated);
        transitions.insert((CaseState::Allocated, CaseEvent::Complete), CaseState::Served);
        transitions.insert((CaseState::Waiting, CaseEvent::Cancel), CaseState::Abandoned);
        transitions.insert((CaseState::Allocated, CaseEvent::Cancel), CaseState::Abandoned);

        Self { transitions }
    }

    /// 执行状态转换
    pub fn transition(&self, from: CaseState, event: CaseEvent) -> Result<CaseState> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(TriageError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }
}

impl Default for CaseStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: [CaseEvent; 4] = [
        CaseEvent::Enqueue,
        CaseEvent::Allocate,
        CaseEvent::Complete,
        CaseEvent::Cancel,
    ];

    #[test]
    fn test_valid_transitions() {
        let sm = CaseStateMachine::new();

        assert_eq!(sm.transition(CaseState::Arrived, CaseEvent::Enqueue).unwrap(), CaseState::Waiting);
        assert_eq!(sm.transition(CaseState::Waiting, CaseEvent::Allocate).unwrap(), CaseState::Allocated);
        assert_eq!(sm.transition(CaseState::Allocated, CaseEvent::Complete).unwrap(), CaseState::Served);
        assert_eq!(sm.transition(CaseState::Waiting, CaseEvent::Cancel).unwrap(), CaseState::Abandoned);
        assert_eq!(sm.transition(CaseState::Allocated, CaseEvent::Cancel).unwrap(), CaseState::Abandoned);
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = CaseStateMachine::new();

        // 未持有资源不能完成服务
        let result = sm.transition(CaseState::Waiting, CaseEvent::Complete);
        assert!(matches!(result, Err(TriageError::InvalidStateTransition { .. })));
        assert!(sm.transition(CaseState::Arrived, CaseEvent::Complete).is_err());
    }

    #[test]
    fn test_terminal_states_accept_no_event() {
        let sm = CaseStateMachine::new();
        for state in [CaseState::Served, CaseState::Abandoned] {
            for event in EVENTS {
                assert!(sm.transition(state, event).is_err());
            }
        }
    }
}

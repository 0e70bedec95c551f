//! 病例登记表
//!
//! 所有活跃病例的权威存储。状态变更只能经由状态机执行，
//! 并且只由分配调度器或外部取消请求触发。

use crate::state_machine::{CaseEvent, CaseStateMachine};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use triage_core::{Case, CaseId, CaseState, ResourceId, Result, Specialty, TriageError};

/// 取消结果
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub case_id: CaseId,
    pub specialty: Specialty,
    /// 取消前的状态
    pub previous: CaseState,
    /// 取消时释放的资源（病例处于已分配状态时）
    pub released: Option<ResourceId>,
}

/// 服务完成结果
#[derive(Debug, Clone)]
pub struct Completion {
    pub case_id: CaseId,
    pub specialty: Specialty,
    pub resource_id: ResourceId,
    pub service_time: Duration,
}

#[derive(Debug, Default)]
struct RegistryInner {
    cases: HashMap<CaseId, Case>,
    next_id: u64,
}

/// 病例登记表
#[derive(Debug)]
pub struct CaseRegistry {
    inner: RwLock<RegistryInner>,
    severity_min: f64,
    severity_max: f64,
    state_machine: CaseStateMachine,
}

impl CaseRegistry {
    pub fn new(severity_min: f64, severity_max: f64) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            severity_min,
            severity_max,
            state_machine: CaseStateMachine::new(),
        }
    }

    /// 校验严重度是否在声明的范围内
    pub fn validate_score(&self, severity_score: f64) -> Result<()> {
        if !severity_score.is_finite()
            || severity_score < self.severity_min
            || severity_score > self.severity_max
        {
            return Err(TriageError::InvalidInput(format!(
                "severity score {} outside [{}, {}]",
                severity_score, self.severity_min, self.severity_max
            )));
        }
        Ok(())
    }

    /// 创建病例：Arrived 后立即转为 Waiting
    pub async fn create(
        &self,
        severity_score: f64,
        specialty: Specialty,
        now: DateTime<Utc>,
    ) -> Result<Case> {
        self.validate_score(severity_score)?;

        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = CaseId(inner.next_id);

        let mut case = Case {
            id,
            severity_score,
            specialty,
            arrived_at: now,
            state: CaseState::Arrived,
            assigned_resource: None,
            allocated_at: None,
            finished_at: None,
        };
        case.state = self.state_machine.transition(case.state, CaseEvent::Enqueue)?;

        inner.cases.insert(id, case.clone());
        tracing::debug!("Registered case {} ({}, severity {})", id, specialty, severity_score);
        Ok(case)
    }

    /// 获取病例
    pub async fn get(&self, case_id: CaseId) -> Result<Case> {
        let inner = self.inner.read().await;
        inner
            .cases
            .get(&case_id)
            .cloned()
            .ok_or_else(|| TriageError::NotFound(format!("Case {} not found", case_id)))
    }

    /// 在同一次读锁内获取多个病例，未知标识符被跳过
    pub async fn get_many(&self, case_ids: &[CaseId]) -> Vec<Case> {
        let inner = self.inner.read().await;
        case_ids
            .iter()
            .filter_map(|id| inner.cases.get(id).cloned())
            .collect()
    }

    /// 取消病例
    pub async fn cancel(&self, case_id: CaseId, now: DateTime<Utc>) -> Result<Cancellation> {
        let mut inner = self.inner.write().await;
        let case = inner
            .cases
            .get_mut(&case_id)
            .ok_or_else(|| TriageError::NotFound(format!("Case {} not found", case_id)))?;

        if case.state.is_terminal() {
            return Err(TriageError::AlreadyTerminal {
                case_id,
                state: case.state,
            });
        }

        let previous = case.state;
        case.state = self.state_machine.transition(previous, CaseEvent::Cancel)?;
        case.finished_at = Some(now);
        let released = case.assigned_resource.take();

        Ok(Cancellation {
            case_id,
            specialty: case.specialty,
            previous,
            released,
        })
    }

    /// 提交分配
    ///
    /// 病例仍在等待时绑定资源并返回 `true`；若病例已在此期间被取消则返回 `false`，
    /// 调用方必须立即归还资源。
    pub async fn commit_allocation(
        &self,
        case_id: CaseId,
        resource_id: ResourceId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let case = inner
            .cases
            .get_mut(&case_id)
            .ok_or_else(|| TriageError::NotFound(format!("Case {} not found", case_id)))?;

        if case.state != CaseState::Waiting {
            return Ok(false);
        }
        if let Some(held) = case.assigned_resource {
            return Err(TriageError::InvariantViolation(format!(
                "waiting case {} already holds resource {}",
                case_id, held
            )));
        }

        case.state = self.state_machine.transition(case.state, CaseEvent::Allocate)?;
        case.assigned_resource = Some(resource_id);
        case.allocated_at = Some(now);
        Ok(true)
    }

    /// 完成服务：Allocated → Served，返回需要归还的资源和服务时长
    pub async fn complete(&self, case_id: CaseId, now: DateTime<Utc>) -> Result<Completion> {
        let mut inner = self.inner.write().await;
        let case = inner
            .cases
            .get_mut(&case_id)
            .ok_or_else(|| TriageError::NotFound(format!("Case {} not found", case_id)))?;

        if case.state.is_terminal() {
            return Err(TriageError::AlreadyTerminal {
                case_id,
                state: case.state,
            });
        }

        let next = self.state_machine.transition(case.state, CaseEvent::Complete)?;
        let resource_id = case.assigned_resource.take().ok_or_else(|| {
            TriageError::InvariantViolation(format!("allocated case {} holds no resource", case_id))
        })?;

        case.state = next;
        case.finished_at = Some(now);
        let service_time = case
            .allocated_at
            .and_then(|at| (now - at).to_std().ok())
            .unwrap_or(Duration::ZERO);

        Ok(Completion {
            case_id,
            specialty: case.specialty,
            resource_id,
            service_time,
        })
    }

    /// 按状态统计病例数
    pub async fn counts(&self) -> HashMap<CaseState, usize> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for case in inner.cases.values() {
            *counts.entry(case.state).or_insert(0) += 1;
        }
        counts
    }

    /// 当前所有 病例 → 资源 绑定
    pub async fn allocations(&self) -> Vec<(CaseId, ResourceId)> {
        let inner = self.inner.read().await;
        let mut bindings: Vec<_> = inner
            .cases
            .values()
            .filter_map(|case| case.assigned_resource.map(|r| (case.id, r)))
            .collect();
        bindings.sort();
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CaseRegistry {
        CaseRegistry::new(0.0, 100.0)
    }

    #[tokio::test]
    async fn test_create_assigns_monotonic_ids() {
        let registry = registry();
        let now = Utc::now();

        let a = registry.create(50.0, Specialty::Cardiology, now).await.unwrap();
        let b = registry.create(20.0, Specialty::Neurology, now).await.unwrap();

        assert!(b.id > a.id);
        assert_eq!(a.state, CaseState::Waiting);
        assert!(a.assigned_resource.is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_out_of_range_score() {
        let registry = registry();
        let now = Utc::now();

        for score in [-1.0, 100.5, f64::NAN, f64::INFINITY] {
            let result = registry.create(score, Specialty::Cardiology, now).await;
            assert!(matches!(result, Err(TriageError::InvalidInput(_))));
        }
        assert!(registry.counts().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_and_terminal() {
        let registry = registry();
        let now = Utc::now();

        assert!(matches!(
            registry.cancel(CaseId(42), now).await,
            Err(TriageError::NotFound(_))
        ));

        let case = registry.create(30.0, Specialty::Dermatology, now).await.unwrap();
        let cancellation = registry.cancel(case.id, now).await.unwrap();
        assert_eq!(cancellation.previous, CaseState::Waiting);
        assert!(cancellation.released.is_none());

        let again = registry.cancel(case.id, now).await;
        assert!(matches!(
            again,
            Err(TriageError::AlreadyTerminal {
                state: CaseState::Abandoned,
                ..
            })
        ));
        assert_eq!(registry.get(case.id).await.unwrap().state, CaseState::Abandoned);
    }

    #[tokio::test]
    async fn test_commit_after_cancel_is_refused() {
        let registry = registry();
        let now = Utc::now();

        let case = registry.create(70.0, Specialty::Orthopedics, now).await.unwrap();
        registry.cancel(case.id, now).await.unwrap();

        let committed = registry.commit_allocation(case.id, ResourceId(1), now).await.unwrap();
        assert!(!committed);

        let stored = registry.get(case.id).await.unwrap();
        assert_eq!(stored.state, CaseState::Abandoned);
        assert!(stored.assigned_resource.is_none());
    }

    #[tokio::test]
    async fn test_complete_reports_service_time() {
        let registry = registry();
        let start = Utc::now();

        let case = registry.create(60.0, Specialty::Cardiology, start).await.unwrap();
        assert!(registry.commit_allocation(case.id, ResourceId(7), start).await.unwrap());

        let done = start + chrono::Duration::seconds(600);
        let completion = registry.complete(case.id, done).await.unwrap();
        assert_eq!(completion.resource_id, ResourceId(7));
        assert_eq!(completion.service_time, Duration::from_secs(600));

        let stored = registry.get(case.id).await.unwrap();
        assert_eq!(stored.state, CaseState::Served);
        assert!(stored.assigned_resource.is_none());
    }

    #[tokio::test]
    async fn test_complete_requires_allocation() {
        let registry = registry();
        let now = Utc::now();

        let case = registry.create(60.0, Specialty::Cardiology, now).await.unwrap();
        let result = registry.complete(case.id, now).await;
        assert!(matches!(result, Err(TriageError::InvalidStateTransition { .. })));
        assert_eq!(registry.get(case.id).await.unwrap().state, CaseState::Waiting);
    }

    #[tokio::test]
    async fn test_cancel_allocated_releases_resource() {
        let registry = registry();
        let now = Utc::now();

        let case = registry.create(60.0, Specialty::Cardiology, now).await.unwrap();
        registry.commit_allocation(case.id, ResourceId(3), now).await.unwrap();

        let cancellation = registry.cancel(case.id, now).await.unwrap();
        assert_eq!(cancellation.previous, CaseState::Allocated);
        assert_eq!(cancellation.released, Some(ResourceId(3)));
        assert!(registry.allocations().await.is_empty());
    }
}

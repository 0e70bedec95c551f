//! 资源池管理
//!
//! 按类型跟踪可计数的医疗资源，授予和归还独占持有。
//! 注册/注销与获取/归还共用同一把锁，资源不会在分配途中被注销。

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use triage_core::{
    CaseId, PoolStatus, Resource, ResourceId, ResourceState, Result, Specialty, TriageError,
};

#[derive(Debug, Default)]
struct PoolInner {
    resources: BTreeMap<ResourceId, Resource>,
    next_id: u64,
}

/// 资源池管理器
#[derive(Debug, Default)]
pub struct ResourcePool {
    inner: RwLock<PoolInner>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册资源
    pub async fn register(&self, resource_type: Specialty, now: DateTime<Utc>) -> ResourceId {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = ResourceId(inner.next_id);

        inner.resources.insert(
            id,
            Resource {
                id,
                resource_type,
                state: ResourceState::Free,
                registered_at: now,
            },
        );

        info!("Registered resource {} for {}", id, resource_type);
        id
    }

    /// 注销资源，被占用的资源不能注销
    pub async fn deregister(&self, resource_id: ResourceId) -> Result<Resource> {
        let mut inner = self.inner.write().await;
        let resource = inner
            .resources
            .get(&resource_id)
            .ok_or_else(|| TriageError::NotFound(format!("Resource {} not found", resource_id)))?;

        if let ResourceState::Allocated { case_id } = resource.state {
            return Err(TriageError::CurrentlyAllocated {
                resource_id,
                case_id,
            });
        }

        let removed = inner
            .resources
            .remove(&resource_id)
            .ok_or_else(|| TriageError::NotFound(format!("Resource {} not found", resource_id)))?;
        warn!("Deregistered resource {} ({})", resource_id, removed.resource_type);
        Ok(removed)
    }

    /// 获取一个空闲资源，没有容量时返回 `None`
    pub async fn acquire(&self, resource_type: Specialty, case_id: CaseId) -> Option<ResourceId> {
        let mut inner = self.inner.write().await;
        let resource = inner
            .resources
            .values_mut()
            .find(|r| r.resource_type == resource_type && r.is_free())?;

        resource.state = ResourceState::Allocated { case_id };
        debug!("Resource {} acquired for case {}", resource.id, case_id);
        Some(resource.id)
    }

    /// 归还资源，返回之前的持有病例
    pub async fn release(&self, resource_id: ResourceId) -> Result<CaseId> {
        let mut inner = self.inner.write().await;
        let resource = inner
            .resources
            .get_mut(&resource_id)
            .ok_or_else(|| TriageError::NotFound(format!("Resource {} not found", resource_id)))?;

        match resource.state {
            ResourceState::Free => Err(TriageError::NotAllocated(resource_id)),
            ResourceState::Allocated { case_id } => {
                resource.state = ResourceState::Free;
                debug!("Resource {} released by case {}", resource_id, case_id);
                Ok(case_id)
            }
        }
    }

    /// 查询资源
    pub async fn get(&self, resource_id: ResourceId) -> Result<Resource> {
        let inner = self.inner.read().await;
        inner
            .resources
            .get(&resource_id)
            .cloned()
            .ok_or_else(|| TriageError::NotFound(format!("Resource {} not found", resource_id)))
    }

    /// 某类资源的空闲数和总数（同一次读锁）
    pub async fn status(&self, resource_type: Specialty) -> PoolStatus {
        let inner = self.inner.read().await;
        let (free, total) = inner
            .resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .fold((0, 0), |(free, total), r| {
                (free + usize::from(r.is_free()), total + 1)
            });

        PoolStatus {
            resource_type,
            free,
            total,
        }
    }

    pub async fn has_free(&self, resource_type: Specialty) -> bool {
        let inner = self.inner.read().await;
        inner
            .resources
            .values()
            .any(|r| r.resource_type == resource_type && r.is_free())
    }

    /// 全部资源状态
    pub async fn all_status(&self) -> Vec<PoolStatus> {
        let inner = self.inner.read().await;
        Specialty::ALL
            .iter()
            .map(|specialty| {
                let of_type = inner.resources.values().filter(|r| r.resource_type == *specialty);
                let (free, total) = of_type.fold((0, 0), |(free, total), r| {
                    (free + usize::from(r.is_free()), total + 1)
                });
                PoolStatus {
                    resource_type: *specialty,
                    free,
                    total,
                }
            })
            .collect()
    }

    /// 当前所有 资源 → 病例 绑定
    pub async fn allocations(&self) -> Vec<(ResourceId, CaseId)> {
        let inner = self.inner.read().await;
        inner
            .resources
            .values()
            .filter_map(|r| match r.state {
                ResourceState::Allocated { case_id } => Some((r.id, case_id)),
                ResourceState::Free => None,
            })
            .collect()
    }
}

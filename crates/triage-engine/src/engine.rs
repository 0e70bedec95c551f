//! 分诊引擎
//!
//! 分配调度器：协调病例登记表、优先级队列、资源池和等待时间估计器。
//!
//! 调度周期由三种事件触发：新病例入院、资源释放（或新资源注册）、周期性时钟。
//! 弹出与获取资源两步之间不持有跨结构的锁；获取失败时病例按原优先级重新入队，
//! 提交分配前再检查病例状态，病例已被取消则立即归还资源。

use crate::estimator::{estimate_wait, WaitTimeEstimator};
use crate::levels::{care_plan, CarePlan};
use crate::metrics::EngineMetrics;
use crate::pool::ResourcePool;
use crate::queue::{PriorityQueueSet, QueueEntry};
use crate::registry::CaseRegistry;
use crate::signal::SeveritySignal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use triage_core::{
    Case, CaseId, CaseSnapshot, CaseState, Clock, PoolStatus, PriorityLevel, ResourceId,
    ResourceState, Result, Specialty, SystemClock, TriageConfig, TriageError, WaitEstimate,
    WaitingEntry,
};

/// 单次分配尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllocationOutcome {
    Allocated(ResourceId),
    /// 资源被并发触发抢走，病例已重新入队
    Requeued,
    /// 病例已不在等待状态，资源已归还
    Discarded,
}

/// 专科队列统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub specialty: Specialty,
    pub waiting: usize,
    /// 等待超过所属等级目标时长的病例数
    pub overdue: usize,
    pub by_level: BTreeMap<PriorityLevel, usize>,
    pub longest_wait: Duration,
    pub pool: PoolStatus,
}

/// 系统概览
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemOverview {
    pub waiting: usize,
    pub allocated: usize,
    pub served: usize,
    pub abandoned: usize,
    pub free_resources: usize,
    pub total_resources: usize,
    /// 已分配资源 / 资源总数；无资源时为 1.0
    pub load: f64,
}

/// 分诊引擎
#[derive(Debug)]
pub struct TriageEngine {
    config: TriageConfig,
    clock: Arc<dyn Clock>,
    pub(crate) registry: CaseRegistry,
    pub(crate) queues: PriorityQueueSet,
    pub(crate) pool: ResourcePool,
    estimator: WaitTimeEstimator,
    metrics: EngineMetrics,
}

impl TriageEngine {
    /// 使用系统时钟创建引擎
    pub fn new(config: TriageConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// 使用指定时钟创建引擎
    pub fn with_clock(config: TriageConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let epoch = clock.now();
        Ok(Self {
            registry: CaseRegistry::new(config.severity_min, config.severity_max),
            queues: PriorityQueueSet::new(config.aging_rate, epoch),
            pool: ResourcePool::new(),
            estimator: WaitTimeEstimator::new(&config),
            metrics: EngineMetrics::new()?,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn estimator(&self) -> &WaitTimeEstimator {
        &self.estimator
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 接收新病例并触发一次调度
    pub async fn admit(&self, severity_score: f64, specialty: Specialty) -> Result<CaseId> {
        let case = match self.registry.create(severity_score, specialty, self.now()).await {
            Ok(case) => case,
            Err(e) => {
                self.metrics.cases_rejected.inc();
                warn!("Rejected admission ({}, {}): {}", severity_score, specialty, e);
                return Err(e);
            }
        };

        self.enqueue_waiting(QueueEntry::from_case(&case)).await?;
        self.metrics.cases_admitted.inc();
        info!(
            "Admitted case {} for {} with severity {}",
            case.id, specialty, severity_score
        );

        self.run_cycle_for(specialty).await;
        Ok(case.id)
    }

    /// 外部评分组件入口：专科以文本形式给出
    pub async fn submit_case(&self, severity_score: f64, specialty: &str) -> Result<CaseId> {
        let specialty = match specialty.parse::<Specialty>() {
            Ok(specialty) => specialty,
            Err(e) => {
                self.metrics.cases_rejected.inc();
                warn!("Rejected admission: {}", e);
                return Err(e);
            }
        };
        self.admit(severity_score, specialty).await
    }

    /// 通过严重度信号评分后入院
    pub async fn submit_with<S>(&self, signal: &S, input: &S::Input) -> Result<CaseId>
    where
        S: SeveritySignal + ?Sized,
    {
        let assessment = signal.produce(input).await?;
        self.admit(assessment.score, assessment.specialty).await
    }

    /// 取消病例，调用返回时已经生效
    pub async fn cancel(&self, case_id: CaseId) -> Result<()> {
        let cancellation = self.registry.cancel(case_id, self.now()).await?;
        self.metrics.cases_abandoned.inc();

        if cancellation.previous == CaseState::Waiting {
            // 可能已被调度器弹出，提交分配时会发现已取消
            self.queues.remove(cancellation.specialty, case_id).await;
        }

        if let Some(resource_id) = cancellation.released {
            if let Err(e) = self.pool.release(resource_id).await {
                error!("Failed to release resource {} of cancelled case {}: {}", resource_id, case_id, e);
                return Err(e);
            }
            info!("Case {} cancelled, resource {} released", case_id, resource_id);
            self.run_cycle_for(cancellation.specialty).await;
        } else {
            info!("Case {} cancelled while waiting", case_id);
            self.refresh_waiting_gauge().await;
        }

        Ok(())
    }

    /// 完成服务：记录服务时长、归还资源并触发调度
    pub async fn complete(&self, case_id: CaseId) -> Result<()> {
        let completion = self.registry.complete(case_id, self.now()).await?;
        self.estimator
            .record_service_completion(completion.specialty, completion.service_time)
            .await;
        self.metrics.cases_served.inc();

        if let Err(e) = self.pool.release(completion.resource_id).await {
            error!(
                "Failed to release resource {} of served case {}: {}",
                completion.resource_id, case_id, e
            );
            return Err(e);
        }

        info!(
            "Case {} served in {:?}, resource {} released",
            case_id, completion.service_time, completion.resource_id
        );
        self.run_cycle_for(completion.specialty).await;
        Ok(())
    }

    /// 按资源归还：持有该资源的病例视为服务完成
    pub async fn release(&self, resource_id: ResourceId) -> Result<()> {
        let resource = self.pool.get(resource_id).await?;
        match resource.state {
            ResourceState::Free => {
                error!("Release requested for free resource {}", resource_id);
                Err(TriageError::NotAllocated(resource_id))
            }
            ResourceState::Allocated { case_id } => self.complete(case_id).await,
        }
    }

    /// 注册资源，新容量会触发一次调度
    pub async fn register_resource(&self, resource_type: Specialty) -> ResourceId {
        let resource_id = self.pool.register(resource_type, self.now()).await;
        self.run_cycle_for(resource_type).await;
        resource_id
    }

    /// 注销资源
    pub async fn deregister_resource(&self, resource_id: ResourceId) -> Result<()> {
        self.pool.deregister(resource_id).await.map(|_| ())
    }

    /// 对所有专科执行一次调度，返回本次分配数
    pub async fn run_cycle(&self) -> usize {
        let mut allocated = 0;
        for specialty in Specialty::ALL {
            allocated += self.run_specialty(specialty).await;
        }
        self.refresh_waiting_gauge().await;
        allocated
    }

    /// 对单个专科执行一次调度
    pub async fn run_cycle_for(&self, specialty: Specialty) -> usize {
        let allocated = self.run_specialty(specialty).await;
        self.refresh_waiting_gauge().await;
        allocated
    }

    async fn run_specialty(&self, specialty: Specialty) -> usize {
        let mut allocated = 0;

        // 队列为空时不触碰资源池
        while self.queues.peek_highest(specialty).await.is_some()
            && self.pool.has_free(specialty).await
        {
            let Some(entry) = self.queues.pop_highest(specialty).await else {
                break;
            };

            match self.allocate_popped(entry).await {
                AllocationOutcome::Allocated(_) => allocated += 1,
                AllocationOutcome::Discarded => continue,
                AllocationOutcome::Requeued => break,
            }
        }

        if allocated > 0 {
            debug!("Scheduling cycle for {} allocated {} case(s)", specialty, allocated);
        }
        allocated
    }

    /// 为已弹出的病例获取资源并提交分配
    pub(crate) async fn allocate_popped(&self, entry: QueueEntry) -> AllocationOutcome {
        let Some(resource_id) = self.pool.acquire(entry.specialty, entry.case_id).await else {
            return self.requeue_after_lost_race(entry).await;
        };

        match self
            .registry
            .commit_allocation(entry.case_id, resource_id, self.now())
            .await
        {
            Ok(true) => {
                self.metrics.allocations.inc();
                info!(
                    "Allocated resource {} to case {} ({})",
                    resource_id, entry.case_id, entry.specialty
                );
                AllocationOutcome::Allocated(resource_id)
            }
            Ok(false) => {
                warn!(
                    "Case {} left the queue during allocation, returning resource {}",
                    entry.case_id, resource_id
                );
                self.rollback(resource_id).await;
                AllocationOutcome::Discarded
            }
            Err(e) => {
                error!("Failed to commit allocation for case {}: {}", entry.case_id, e);
                self.rollback(resource_id).await;
                AllocationOutcome::Discarded
            }
        }
    }

    async fn requeue_after_lost_race(&self, entry: QueueEntry) -> AllocationOutcome {
        let still_waiting = matches!(
            self.registry.get(entry.case_id).await,
            Ok(Case { state: CaseState::Waiting, .. })
        );
        if !still_waiting {
            return AllocationOutcome::Discarded;
        }

        match self.enqueue_waiting(entry).await {
            Ok(true) => {}
            Ok(false) => return AllocationOutcome::Discarded,
            Err(e) => error!("Failed to re-enqueue case {}: {}", entry.case_id, e),
        }
        self.metrics.requeues.inc();
        debug!("No free {} resource for case {}, re-enqueued", entry.specialty, entry.case_id);
        AllocationOutcome::Requeued
    }

    /// 入队后复核病例状态，入队期间被取消的病例从队列中撤回
    ///
    /// 取消先标记 `Abandoned` 再出队，复核与之配合保证非等待病例不会留在队列中。
    async fn enqueue_waiting(&self, entry: QueueEntry) -> Result<bool> {
        self.queues.enqueue(entry).await?;

        let still_waiting = matches!(
            self.registry.get(entry.case_id).await,
            Ok(Case { state: CaseState::Waiting, .. })
        );
        if !still_waiting && self.queues.remove(entry.specialty, entry.case_id).await {
            debug!("Case {} left the queue while being enqueued, withdrawn", entry.case_id);
        }
        Ok(still_waiting)
    }

    async fn rollback(&self, resource_id: ResourceId) {
        self.metrics.allocation_rollbacks.inc();
        if let Err(e) = self.pool.release(resource_id).await {
            error!("Failed to roll back resource {}: {}", resource_id, e);
        }
    }

    async fn refresh_waiting_gauge(&self) {
        let waiting = self.queues.total_len().await;
        self.metrics.waiting_cases.set(waiting as i64);
    }

    fn snapshot(&self, case: Case, now: DateTime<Utc>) -> CaseSnapshot {
        CaseSnapshot {
            age_adjusted_priority: case.age_adjusted_priority(now, self.config.aging_rate),
            level: PriorityLevel::classify(case.severity_score, &self.config.level_thresholds),
            waited: case.waited(now),
            taken_at: now,
            case,
        }
    }

    /// 病例快照
    pub async fn get_case(&self, case_id: CaseId) -> Result<CaseSnapshot> {
        let case = self.registry.get(case_id).await?;
        Ok(self.snapshot(case, self.now()))
    }

    /// 病例的护理安排建议
    pub async fn care_plan(&self, case_id: CaseId) -> Result<CarePlan> {
        let case = self.registry.get(case_id).await?;
        let level = PriorityLevel::classify(case.severity_score, &self.config.level_thresholds);
        Ok(care_plan(level, case.specialty))
    }

    /// 估计等待时间
    ///
    /// 已分配的病例返回零；已终止的病例返回 `AlreadyTerminal`。
    pub async fn estimate(&self, case_id: CaseId) -> Result<WaitEstimate> {
        let case = self.registry.get(case_id).await?;
        match case.state {
            CaseState::Arrived | CaseState::Waiting => {
                let ahead = self
                    .queues
                    .position(case.specialty, case_id)
                    .await
                    .unwrap_or(0);
                let pool = self.pool.status(case.specialty).await;
                let average = self.estimator.average_service_time(case.specialty).await;
                Ok(estimate_wait(ahead + 1, average, &pool))
            }
            CaseState::Allocated => Ok(WaitEstimate::Known(Duration::ZERO)),
            CaseState::Served | CaseState::Abandoned => Err(TriageError::AlreadyTerminal {
                case_id,
                state: case.state,
            }),
        }
    }

    /// 按出队顺序列出某专科的等待病例
    pub async fn list_waiting(&self, specialty: Specialty) -> Vec<WaitingEntry> {
        let now = self.now();
        let order: Vec<CaseId> = self
            .queues
            .snapshot(specialty)
            .await
            .iter()
            .map(|entry| entry.case_id)
            .collect();
        let cases = self.registry.get_many(&order).await;
        let pool = self.pool.status(specialty).await;
        let average = self.estimator.average_service_time(specialty).await;

        cases
            .into_iter()
            .filter(|case| case.state == CaseState::Waiting)
            .enumerate()
            .map(|(ahead, case)| WaitingEntry {
                case_id: case.id,
                severity_score: case.severity_score,
                age_adjusted_priority: case.age_adjusted_priority(now, self.config.aging_rate),
                level: PriorityLevel::classify(case.severity_score, &self.config.level_thresholds),
                waited: case.waited(now),
                estimated_wait: estimate_wait(ahead + 1, average, &pool),
            })
            .collect()
    }

    /// 资源池状态 (free, total)
    pub async fn pool_status(&self, resource_type: Specialty) -> PoolStatus {
        self.pool.status(resource_type).await
    }

    /// 专科队列统计
    pub async fn queue_stats(&self, specialty: Specialty) -> QueueStats {
        let waiting = self.list_waiting(specialty).await;

        let mut by_level: BTreeMap<PriorityLevel, usize> =
            PriorityLevel::ALL.iter().map(|level| (*level, 0)).collect();
        let mut overdue = 0;
        let mut longest_wait = Duration::ZERO;
        for entry in &waiting {
            *by_level.entry(entry.level).or_insert(0) += 1;
            if entry.waited > entry.level.target_wait() {
                overdue += 1;
            }
            longest_wait = longest_wait.max(entry.waited);
        }

        QueueStats {
            specialty,
            waiting: waiting.len(),
            overdue,
            by_level,
            longest_wait,
            pool: self.pool.status(specialty).await,
        }
    }

    /// 系统概览
    pub async fn overview(&self) -> SystemOverview {
        let counts = self.registry.counts().await;
        let count = |state| counts.get(&state).copied().unwrap_or(0);

        let pools = self.pool.all_status().await;
        let free_resources: usize = pools.iter().map(|p| p.free).sum();
        let total_resources: usize = pools.iter().map(|p| p.total).sum();
        let load = if total_resources == 0 {
            1.0
        } else {
            (total_resources - free_resources) as f64 / total_resources as f64
        };

        SystemOverview {
            waiting: count(CaseState::Waiting),
            allocated: count(CaseState::Allocated),
            served: count(CaseState::Served),
            abandoned: count(CaseState::Abandoned),
            free_resources,
            total_resources,
            load,
        }
    }

    /// 检查病例与资源的双向绑定是否一致
    ///
    /// 只在没有并发分配进行时调用才有意义。
    pub async fn check_invariants(&self) -> Result<()> {
        let case_side = self.registry.allocations().await;
        let pool_side = self.pool.allocations().await;

        let mut held = HashSet::new();
        for (case_id, resource_id) in &case_side {
            if !held.insert(*resource_id) {
                return Err(TriageError::InvariantViolation(format!(
                    "resource {} is referenced by more than one case",
                    resource_id
                )));
            }
            if !pool_side.contains(&(*resource_id, *case_id)) {
                return Err(TriageError::InvariantViolation(format!(
                    "case {} holds resource {} but the pool disagrees",
                    case_id, resource_id
                )));
            }
        }

        for (resource_id, case_id) in &pool_side {
            if !case_side.contains(&(*case_id, *resource_id)) {
                return Err(TriageError::InvariantViolation(format!(
                    "resource {} is allocated to case {} which does not hold it",
                    resource_id, case_id
                )));
            }
        }

        Ok(())
    }

    /// 启动周期性调度任务
    pub fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let period = engine.config.tick_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let allocated = engine.run_cycle().await;
                if allocated > 0 {
                    info!("Periodic tick allocated {} case(s)", allocated);
                }
            }
        })
    }
}

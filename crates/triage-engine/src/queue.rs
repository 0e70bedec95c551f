//! 优先级队列集合
//!
//! 每个专科一条有序队列，按年龄调整优先级降序、到达时间升序出队。
//!
//! 老化速率对所有病例相同，因此任意两个等待病例在同一时刻的优先级差
//! `(s_a + r·(now - t_a)) - (s_b + r·(now - t_b))` 等于 `(s_a - r·t_a) - (s_b - r·t_b)`，
//! 与 `now` 无关。队列按这个与时间无关的秩排序，插入 O(log n)，
//! 出队结果与在出队时刻逐对比较年龄调整优先级完全一致，不需要周期性重排。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use triage_core::{Case, CaseId, Result, Specialty, TriageError};

/// 队列中的病例引用
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub case_id: CaseId,
    pub specialty: Specialty,
    pub severity_score: f64,
    pub arrived_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn from_case(case: &Case) -> Self {
        Self {
            case_id: case.id,
            specialty: case.specialty,
            severity_score: case.severity_score,
            arrived_at: case.arrived_at,
        }
    }
}

/// 排序键
#[derive(Debug, Clone, Copy)]
struct RankKey {
    rank: f64,
    arrived_at: DateTime<Utc>,
    case_id: CaseId,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .rank
            .total_cmp(&self.rank)
            .then_with(|| self.arrived_at.cmp(&other.arrived_at))
            .then_with(|| self.case_id.cmp(&other.case_id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

/// 单个专科的队列
#[derive(Debug, Default)]
pub(crate) struct SpecialtyQueue {
    order: BTreeMap<RankKey, QueueEntry>,
    index: HashMap<CaseId, RankKey>,
}

/// 优先级队列集合
#[derive(Debug)]
pub struct PriorityQueueSet {
    queues: Vec<Mutex<SpecialtyQueue>>,
    aging_rate: f64,
    /// 计算秩的时间原点
    epoch: DateTime<Utc>,
}

impl PriorityQueueSet {
    pub fn new(aging_rate: f64, epoch: DateTime<Utc>) -> Self {
        Self {
            queues: Specialty::ALL
                .iter()
                .map(|_| Mutex::new(SpecialtyQueue::default()))
                .collect(),
            aging_rate,
            epoch,
        }
    }

    pub(crate) fn queue(&self, specialty: Specialty) -> &Mutex<SpecialtyQueue> {
        &self.queues[specialty.ordinal()]
    }

    fn key_for(&self, entry: &QueueEntry) -> RankKey {
        let offset = entry.arrived_at - self.epoch;
        let offset_secs = match offset.num_microseconds() {
            Some(micros) => micros as f64 / 1_000_000.0,
            None => offset.num_milliseconds() as f64 / 1_000.0,
        };

        RankKey {
            rank: entry.severity_score - self.aging_rate * offset_secs,
            arrived_at: entry.arrived_at,
            case_id: entry.case_id,
        }
    }

    /// 加入队列
    ///
    /// 排序键只由严重度和到达时间决定，被弹出后重新入队的病例保持原有优先级，
    /// 等待时长继续累积。
    pub async fn enqueue(&self, entry: QueueEntry) -> Result<()> {
        let key = self.key_for(&entry);
        let mut queue = self.queue(entry.specialty).lock().await;

        if queue.index.contains_key(&entry.case_id) {
            return Err(TriageError::InvariantViolation(format!(
                "case {} is already queued for {}",
                entry.case_id, entry.specialty
            )));
        }

        queue.index.insert(entry.case_id, key);
        queue.order.insert(key, entry);
        Ok(())
    }

    /// 弹出优先级最高的病例，队列为空时返回 `None`
    pub async fn pop_highest(&self, specialty: Specialty) -> Option<QueueEntry> {
        let mut queue = self.queue(specialty).lock().await;
        let (_, entry) = queue.order.pop_first()?;
        queue.index.remove(&entry.case_id);
        Some(entry)
    }

    /// 查看优先级最高的病例
    pub async fn peek_highest(&self, specialty: Specialty) -> Option<QueueEntry> {
        let queue = self.queue(specialty).lock().await;
        queue.order.values().next().copied()
    }

    /// 移除病例；病例不在队列中（可能刚被弹出）时返回 `false`
    pub async fn remove(&self, specialty: Specialty, case_id: CaseId) -> bool {
        let mut queue = self.queue(specialty).lock().await;
        match queue.index.remove(&case_id) {
            Some(key) => queue.order.remove(&key).is_some(),
            None => false,
        }
    }

    /// 排在该病例之前的病例数
    pub async fn position(&self, specialty: Specialty, case_id: CaseId) -> Option<usize> {
        let queue = self.queue(specialty).lock().await;
        let key = *queue.index.get(&case_id)?;
        Some(queue.order.range(..key).count())
    }

    /// 按出队顺序的队列快照
    pub async fn snapshot(&self, specialty: Specialty) -> Vec<QueueEntry> {
        let queue = self.queue(specialty).lock().await;
        queue.order.values().copied().collect()
    }

    pub async fn len(&self, specialty: Specialty) -> usize {
        self.queue(specialty).lock().await.order.len()
    }

    /// 所有专科的排队总数
    pub async fn total_len(&self) -> usize {
        let mut total = 0;
        for queue in &self.queues {
            total += queue.lock().await.order.len();
        }
        total
    }
}

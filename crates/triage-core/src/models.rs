//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::TriageError;

/// 病例标识符，单调递增分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseId(pub u64);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// 资源标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// 专科（病例所需、资源可服务的医疗能力类别）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    Emergency,        // 急诊
    Cardiology,       // 心内科
    Neurology,        // 神经内科
    Gastroenterology, // 消化内科
    Dermatology,      // 皮肤科
    Orthopedics,      // 骨科
    GeneralPractice,  // 全科
}

impl Specialty {
    /// 全部专科
    pub const ALL: [Specialty; 7] = [
        Specialty::Emergency,
        Specialty::Cardiology,
        Specialty::Neurology,
        Specialty::Gastroenterology,
        Specialty::Dermatology,
        Specialty::Orthopedics,
        Specialty::GeneralPractice,
    ];

    /// 在 `ALL` 中的序号
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Cardiology => "cardiology",
            Self::Neurology => "neurology",
            Self::Gastroenterology => "gastroenterology",
            Self::Dermatology => "dermatology",
            Self::Orthopedics => "orthopedics",
            Self::GeneralPractice => "general_practice",
        }
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Specialty {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();

        Specialty::ALL
            .iter()
            .copied()
            .find(|specialty| specialty.as_str() == normalized)
            .ok_or_else(|| TriageError::InvalidInput(format!("unknown specialty '{}'", s)))
    }
}

/// 病例生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseState {
    Arrived,   // 已到达
    Waiting,   // 排队中
    Allocated, // 已分配资源
    Served,    // 已完成服务
    Abandoned, // 已放弃（取消）
}

impl CaseState {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseState::Served | CaseState::Abandoned)
    }
}

/// 病例
///
/// 年龄调整优先级不存储，每次读取时根据当前时间重新计算。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub severity_score: f64,
    pub specialty: Specialty,
    pub arrived_at: DateTime<Utc>,
    pub state: CaseState,
    /// 当前持有的资源（至多一个）
    pub assigned_resource: Option<ResourceId>,
    pub allocated_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Case {
    /// 截至 `now` 的等待时长
    pub fn waited(&self, now: DateTime<Utc>) -> Duration {
        (now - self.arrived_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// 年龄调整优先级 = 严重度 + 老化速率 × 等待秒数
    pub fn age_adjusted_priority(&self, now: DateTime<Utc>, aging_rate: f64) -> f64 {
        self.severity_score + aging_rate * self.waited(now).as_secs_f64()
    }
}

/// 病例只读快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSnapshot {
    pub case: Case,
    pub age_adjusted_priority: f64,
    pub level: PriorityLevel,
    pub waited: Duration,
    pub taken_at: DateTime<Utc>,
}

/// 资源可用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    Free,
    /// 只记录反向引用，病例由病例登记表持有
    Allocated { case_id: CaseId },
}

/// 可分配的医疗资源（床位、专科医生、影像工作站）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub resource_type: Specialty,
    pub state: ResourceState,
    pub registered_at: DateTime<Utc>,
}

impl Resource {
    pub fn is_free(&self) -> bool {
        self.state == ResourceState::Free
    }
}

/// 某类资源池状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub resource_type: Specialty,
    pub free: usize,
    pub total: usize,
}

impl PoolStatus {
    pub fn allocated(&self) -> usize {
        self.total - self.free
    }
}

/// 等待时间估计（仅供参考，不影响排序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitEstimate {
    Known(Duration),
    /// 该类资源从未注册过，无法估计
    Unknown,
}

impl WaitEstimate {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            WaitEstimate::Known(duration) => Some(*duration),
            WaitEstimate::Unknown => None,
        }
    }
}

/// 等待列表条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub case_id: CaseId,
    pub severity_score: f64,
    pub age_adjusted_priority: f64,
    pub level: PriorityLevel,
    pub waited: Duration,
    pub estimated_wait: WaitEstimate,
}

/// 外部严重度评分组件的输出
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityAssessment {
    pub score: f64,
    pub specialty: Specialty,
}

/// 优先级等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriorityLevel {
    Low,      // 常规
    Moderate, // 一般
    Urgent,   // 紧急
    Critical, // 危急
}

impl PriorityLevel {
    /// 全部等级，从高到低
    pub const ALL: [PriorityLevel; 4] = [
        PriorityLevel::Critical,
        PriorityLevel::Urgent,
        PriorityLevel::Moderate,
        PriorityLevel::Low,
    ];

    /// 按阈值对严重度分级
    pub fn classify(score: f64, thresholds: &LevelThresholds) -> Self {
        if score >= thresholds.critical {
            PriorityLevel::Critical
        } else if score >= thresholds.urgent {
            PriorityLevel::Urgent
        } else if score >= thresholds.moderate {
            PriorityLevel::Moderate
        } else {
            PriorityLevel::Low
        }
    }

    /// 目标最长等待时间
    pub fn target_wait(&self) -> Duration {
        match self {
            PriorityLevel::Critical => Duration::from_secs(15 * 60),
            PriorityLevel::Urgent => Duration::from_secs(60 * 60),
            PriorityLevel::Moderate => Duration::from_secs(3 * 60 * 60),
            PriorityLevel::Low => Duration::from_secs(4 * 60 * 60),
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityLevel::Critical => write!(f, "CRITICAL"),
            PriorityLevel::Urgent => write!(f, "URGENT"),
            PriorityLevel::Moderate => write!(f, "MODERATE"),
            PriorityLevel::Low => write!(f, "LOW"),
        }
    }
}

/// 优先级等级阈值（严重度下限）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub critical: f64,
    pub urgent: f64,
    pub moderate: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            critical: 80.0,
            urgent: 60.0,
            moderate: 40.0,
        }
    }
}

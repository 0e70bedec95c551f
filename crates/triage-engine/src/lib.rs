//! # 分诊队列与资源分配引擎
//!
//! 接收外部评分后的病例，按年龄调整优先级排队，把稀缺医疗资源分配给队首病例，
//! 并给出等待时间估计：
//! - 病例登记表：所有病例的权威状态
//! - 优先级队列：每个专科一条队列，随等待时间老化防止饿死
//! - 资源池：按类型管理床位、专科医生、影像工作站的独占持有
//! - 等待时间估计：基于队列深度、资源数和历史服务时长
//! - 分配调度器：由入院、资源释放和周期性时钟触发的调度循环

pub mod engine;
pub mod estimator;
pub mod levels;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod signal;
pub mod state_machine;

// 重新导出主要类型
pub use engine::{QueueStats, SystemOverview, TriageEngine};
pub use estimator::{estimate_wait, WaitTimeEstimator};
pub use levels::{care_plan, CarePlan};
pub use metrics::EngineMetrics;
pub use pool::ResourcePool;
pub use queue::{PriorityQueueSet, QueueEntry};
pub use registry::{Cancellation, CaseRegistry, Completion};
pub use signal::{FixedSignal, SeveritySignal};
pub use state_machine::{CaseEvent, CaseStateMachine};

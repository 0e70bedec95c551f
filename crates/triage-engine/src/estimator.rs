//! 等待时间估计
//!
//! 估计值只用于对外展示，引擎从不依据它阻塞或重排。

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use triage_core::{PoolStatus, Specialty, TriageConfig, WaitEstimate};

/// 等待时间估计器
#[derive(Debug)]
pub struct WaitTimeEstimator {
    /// 每个专科最近 N 次服务时长
    samples: RwLock<HashMap<Specialty, VecDeque<Duration>>>,
    window: usize,
    baselines: HashMap<Specialty, Duration>,
}

impl WaitTimeEstimator {
    pub fn new(config: &TriageConfig) -> Self {
        let baselines = Specialty::ALL
            .iter()
            .map(|specialty| (*specialty, config.baseline_for(*specialty)))
            .collect();

        Self {
            samples: RwLock::new(HashMap::new()),
            window: config.rolling_average_window.max(1),
            baselines,
        }
    }

    /// 记录一次真实完成的服务；取消的病例不应调用
    pub async fn record_service_completion(&self, specialty: Specialty, duration: Duration) {
        let mut samples = self.samples.write().await;
        let window = samples.entry(specialty).or_default();
        window.push_back(duration);
        while window.len() > self.window {
            window.pop_front();
        }
        tracing::debug!(
            "Recorded {:?} service for {} ({} samples)",
            duration,
            specialty,
            window.len()
        );
    }

    /// 平均服务时长；样本不足 N 时使用冷启动基线
    pub async fn average_service_time(&self, specialty: Specialty) -> Duration {
        let samples = self.samples.read().await;
        match samples.get(&specialty) {
            Some(window) if window.len() >= self.window => {
                let total: Duration = window.iter().sum();
                total / window.len() as u32
            }
            _ => self.baseline(specialty),
        }
    }

    fn baseline(&self, specialty: Specialty) -> Duration {
        self.baselines
            .get(&specialty)
            .copied()
            .unwrap_or(Duration::from_secs(15 * 60))
    }

    pub async fn sample_count(&self, specialty: Specialty) -> usize {
        let samples = self.samples.read().await;
        samples.get(&specialty).map(VecDeque::len).unwrap_or(0)
    }
}

/// 估计公式
///
/// `depth × 平均服务时长 / max(1, 空闲数 + 服务中数)`，`depth` 为排在前面的病例数加上自身。
/// 服务中的每个资源在一个平均服务周期内预计完成一次服务，按完成速率计入分母。
/// 该类资源从未注册或结果超出 `Duration` 表示范围时返回 `Unknown`。
pub fn estimate_wait(depth: usize, average_service: Duration, pool: &PoolStatus) -> WaitEstimate {
    if pool.total == 0 {
        return WaitEstimate::Unknown;
    }

    let servers = (pool.free + pool.allocated()).max(1);
    let secs = average_service.as_secs_f64() * depth as f64 / servers as f64;
    match Duration::try_from_secs_f64(secs) {
        Ok(wait) => WaitEstimate::Known(wait),
        Err(_) => WaitEstimate::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(window: usize) -> TriageConfig {
        TriageConfig {
            rolling_average_window: window,
            baseline_service_secs: 600,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cold_start_uses_baseline() {
        let estimator = WaitTimeEstimator::new(&config(3));
        estimator
            .record_service_completion(Specialty::Cardiology, Duration::from_secs(60))
            .await;

        assert_eq!(
            estimator.average_service_time(Specialty::Cardiology).await,
            Duration::from_secs(600)
        );
    }

    #[tokio::test]
    async fn test_rolling_window_average() {
        let estimator = WaitTimeEstimator::new(&config(3));
        for secs in [100, 200, 300, 400] {
            estimator
                .record_service_completion(Specialty::Neurology, Duration::from_secs(secs))
                .await;
        }

        // 只保留最近三次：200, 300, 400
        assert_eq!(estimator.sample_count(Specialty::Neurology).await, 3);
        assert_eq!(
            estimator.average_service_time(Specialty::Neurology).await,
            Duration::from_secs(300)
        );
        assert_eq!(
            estimator.average_service_time(Specialty::Cardiology).await,
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_estimate_formula() {
        let pool = PoolStatus {
            resource_type: Specialty::Cardiology,
            free: 0,
            total: 2,
        };
        let estimate = estimate_wait(3, Duration::from_secs(600), &pool);
        assert_eq!(estimate, WaitEstimate::Known(Duration::from_secs(900)));
    }

    #[test]
    fn test_estimate_unknown_without_resources() {
        let pool = PoolStatus {
            resource_type: Specialty::Dermatology,
            free: 0,
            total: 0,
        };
        assert_eq!(
            estimate_wait(1, Duration::from_secs(600), &pool),
            WaitEstimate::Unknown
        );
    }

    #[test]
    fn test_estimate_out_of_range_is_unknown() {
        let pool = PoolStatus {
            resource_type: Specialty::Emergency,
            free: 0,
            total: 1,
        };
        assert_eq!(estimate_wait(10, Duration::MAX, &pool), WaitEstimate::Unknown);
        assert_eq!(
            estimate_wait(1, Duration::from_secs(u64::MAX / 4), &pool),
            WaitEstimate::Known(Duration::from_secs_f64((u64::MAX / 4) as f64))
        );
    }
}

//! 引擎指标
//!
//! Prometheus 计数器与仪表，供外部抓取。

use prometheus::{IntCounter, IntGauge, Opts, Registry};
use triage_core::{Result, TriageError};

/// 引擎指标收集器
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    /// Prometheus指标注册表
    registry: Registry,
    /// 接收的病例数
    pub cases_admitted: IntCounter,
    /// 因输入无效被拒绝的病例数
    pub cases_rejected: IntCounter,
    /// 成功分配的次数
    pub allocations: IntCounter,
    /// 完成服务的病例数
    pub cases_served: IntCounter,
    /// 放弃（取消）的病例数
    pub cases_abandoned: IntCounter,
    /// 获取资源失败后重新入队的次数
    pub requeues: IntCounter,
    /// 分配途中被取消而立即归还资源的次数
    pub allocation_rollbacks: IntCounter,
    /// 当前排队病例数
    pub waiting_cases: IntGauge,
}

fn counter(name: &str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help)).map_err(|e| TriageError::Metrics(e.to_string()))
}

impl EngineMetrics {
    /// 创建新的指标收集器
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cases_admitted = counter("triage_cases_admitted_total", "Total number of admitted cases")?;
        let cases_rejected = counter(
            "triage_cases_rejected_total",
            "Total number of admissions rejected as invalid",
        )?;
        let allocations = counter("triage_allocations_total", "Total number of resource allocations")?;
        let cases_served = counter("triage_cases_served_total", "Total number of served cases")?;
        let cases_abandoned = counter("triage_cases_abandoned_total", "Total number of abandoned cases")?;
        let requeues = counter(
            "triage_requeues_total",
            "Cases re-enqueued after losing a resource race",
        )?;
        let allocation_rollbacks = counter(
            "triage_allocation_rollbacks_total",
            "Resources returned because the case was cancelled mid-allocation",
        )?;
        let waiting_cases = IntGauge::with_opts(Opts::new(
            "triage_waiting_cases",
            "Number of cases currently waiting",
        ))
        .map_err(|e| TriageError::Metrics(e.to_string()))?;

        for collector in [
            &cases_admitted,
            &cases_rejected,
            &allocations,
            &cases_served,
            &cases_abandoned,
            &requeues,
            &allocation_rollbacks,
        ] {
            registry
                .register(Box::new(collector.clone()))
                .map_err(|e| TriageError::Metrics(e.to_string()))?;
        }
        registry
            .register(Box::new(waiting_cases.clone()))
            .map_err(|e| TriageError::Metrics(e.to_string()))?;

        Ok(Self {
            registry,
            cases_admitted,
            cases_rejected,
            allocations,
            cases_served,
            cases_abandoned,
            requeues,
            allocation_rollbacks,
            waiting_cases,
        })
    }

    /// 以文本格式导出指标
    pub fn render(&self) -> Result<String> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| TriageError::Metrics(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| TriageError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.cases_admitted.inc();
        metrics.waiting_cases.set(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("triage_cases_admitted_total 1"));
        assert!(text.contains("triage_waiting_cases 3"));
    }
}

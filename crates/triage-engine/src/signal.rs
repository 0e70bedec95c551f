//! 严重度信号
//!
//! 严重度评分由外部组件完成（规则或模型），引擎只消费其输出。

use async_trait::async_trait;
use triage_core::{Result, SeverityAssessment, Specialty};

/// 严重度评分能力
#[async_trait]
pub trait SeveritySignal: Send + Sync {
    /// 评分输入，例如症状文本或影像数据
    type Input: Send + Sync;

    async fn produce(&self, input: &Self::Input) -> Result<SeverityAssessment>;
}

/// 返回固定评分的信号源
#[derive(Debug, Clone, Copy)]
pub struct FixedSignal {
    pub score: f64,
    pub specialty: Specialty,
}

impl FixedSignal {
    pub fn new(score: f64, specialty: Specialty) -> Self {
        Self { score, specialty }
    }
}

#[async_trait]
impl SeveritySignal for FixedSignal {
    type Input = ();

    async fn produce(&self, _input: &()) -> Result<SeverityAssessment> {
        Ok(SeverityAssessment {
            score: self.score,
            specialty: self.specialty,
        })
    }
}

//! 配置管理
//!
//! 引擎的所有可调参数在构造时由外部提供：老化速率、滚动平均窗口、冷启动基线服务时间等。
//! 加载顺序：内置默认值 → TOML 配置文件（可选）→ `TRIAGE_` 前缀的环境变量。

use crate::error::{Result, TriageError};
use crate::models::{LevelThresholds, Specialty};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info};

/// 分诊引擎完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// 老化速率：每等待一秒增加的优先级分值
    pub aging_rate: f64,
    /// 服务时间滚动平均窗口大小 N
    pub rolling_average_window: usize,
    /// 冷启动基线服务时间（秒）
    pub baseline_service_secs: u64,
    /// 按专科覆盖的冷启动基线（秒）
    pub specialty_baselines: HashMap<String, u64>,
    /// 严重度下限（含）
    pub severity_min: f64,
    /// 严重度上限（含）
    pub severity_max: f64,
    /// 周期性调度间隔（秒）
    pub tick_interval_secs: u64,
    /// 初始资源清单：专科 -> 数量
    pub resources: HashMap<String, u32>,
    /// 优先级等级阈值
    pub level_thresholds: LevelThresholds,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            aging_rate: 0.05,
            rolling_average_window: 50,
            baseline_service_secs: 15 * 60,
            specialty_baselines: HashMap::new(),
            severity_min: 0.0,
            severity_max: 100.0,
            tick_interval_secs: 5,
            resources: HashMap::new(),
            level_thresholds: LevelThresholds::default(),
        }
    }
}

impl TriageConfig {
    /// 加载配置并验证
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("TRIAGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: TriageConfig = settings.try_deserialize()?;
        ConfigValidator::new().validate(&config)?;

        match config_path {
            Some(path) => info!("Configuration loaded successfully from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        ConfigValidator::new().validate(self)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// 某专科的冷启动基线服务时间
    pub fn baseline_for(&self, specialty: Specialty) -> Duration {
        let secs = self
            .specialty_baselines
            .iter()
            .find(|(name, _)| name.parse::<Specialty>().ok() == Some(specialty))
            .map(|(_, secs)| *secs)
            .unwrap_or(self.baseline_service_secs);
        Duration::from_secs(secs)
    }

    /// 解析初始资源清单
    pub fn resource_inventory(&self) -> Result<Vec<(Specialty, u32)>> {
        let mut inventory = self
            .resources
            .iter()
            .map(|(name, count)| {
                name.parse::<Specialty>()
                    .map(|specialty| (specialty, *count))
                    .map_err(|_| TriageError::Config(format!("unknown resource type '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        inventory.sort();
        Ok(inventory)
    }
}

/// 配置验证规则
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&TriageConfig) -> std::result::Result<(), String>,
}

/// 配置验证器
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "aging_rate",
                validator: |config| {
                    if config.aging_rate.is_finite() && config.aging_rate > 0.0 {
                        Ok(())
                    } else {
                        Err("aging rate must be a positive number".to_string())
                    }
                },
            },
            ValidationRule {
                field_path: "rolling_average_window",
                validator: |config| {
                    if config.rolling_average_window == 0 {
                        Err("rolling average window cannot be 0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "baseline_service_secs",
                validator: |config| {
                    if config.baseline_service_secs == 0
                        || config.specialty_baselines.values().any(|secs| *secs == 0)
                    {
                        Err("baseline service time cannot be 0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "specialty_baselines",
                validator: |config| {
                    match config
                        .specialty_baselines
                        .keys()
                        .find(|name| name.parse::<Specialty>().is_err())
                    {
                        Some(name) => Err(format!("unknown specialty '{}'", name)),
                        None => Ok(()),
                    }
                },
            },
            ValidationRule {
                field_path: "severity_min",
                validator: |config| {
                    if config.severity_min.is_finite()
                        && config.severity_max.is_finite()
                        && config.severity_min < config.severity_max
                    {
                        Ok(())
                    } else {
                        Err("severity range must be finite and non-empty".to_string())
                    }
                },
            },
            ValidationRule {
                field_path: "tick_interval_secs",
                validator: |config| {
                    if config.tick_interval_secs == 0 {
                        Err("tick interval cannot be 0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "resources",
                validator: |config| config.resource_inventory().map(|_| ()).map_err(|e| e.to_string()),
            },
            ValidationRule {
                field_path: "level_thresholds",
                validator: |config| {
                    let t = &config.level_thresholds;
                    if t.critical > t.urgent && t.urgent > t.moderate {
                        Ok(())
                    } else {
                        Err("level thresholds must be strictly descending".to_string())
                    }
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &TriageConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(TriageError::Config(format!("{}: {}", rule.field_path, e)));
            }
        }
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TriageConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_aging_rate() {
        let config = TriageConfig {
            aging_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TriageError::Config(_))));
    }

    #[test]
    fn test_rejects_inverted_severity_range() {
        let config = TriageConfig {
            severity_min: 100.0,
            severity_max: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_resource_type() {
        let mut config = TriageConfig::default();
        config.resources.insert("oncology".to_string(), 2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_specialty_baseline_override() {
        let mut config = TriageConfig::default();
        config.specialty_baselines.insert("cardiology".to_string(), 1200);

        assert_eq!(config.baseline_for(Specialty::Cardiology), Duration::from_secs(1200));
        assert_eq!(config.baseline_for(Specialty::Neurology), Duration::from_secs(900));
    }

    #[test]
    fn test_resource_inventory_parsing() {
        let mut config = TriageConfig::default();
        config.resources.insert("cardiology".to_string(), 2);
        config.resources.insert("general practice".to_string(), 3);

        let inventory = config.resource_inventory().unwrap();
        assert_eq!(
            inventory,
            vec![(Specialty::Cardiology, 2), (Specialty::GeneralPractice, 3)]
        );
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = TriageConfig::load(None).unwrap();
        assert_eq!(config.rolling_average_window, 50);
    }
}

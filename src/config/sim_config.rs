// ==========================================
// 企业能源负荷仿真系统 - 仿真配置对象
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 9. 配置对象
// 职责: 地平线起点、默认容差、深度防御余量
// 存储: JSON 文件 (serde),启动时加载一次
// ==========================================

use anyhow::{bail, Context};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ==========================================
// SimulationConfig - 仿真配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub horizon_start: NaiveDateTime,     // 排程地平线起点 (活动不得早于此)
    pub default_shortfall_tolerance: f64, // 默认缺口容差 [0,1], 流未指定时生效
    pub depth_margin: usize,              // 递归深度防御余量 (拓扑深度之上)
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon_start: NaiveDate::from_ymd_opt(2026, 1, 1)
                .expect("固定日期合法")
                .and_hms_opt(0, 0, 0)
                .expect("固定时刻合法"),
            default_shortfall_tolerance: 0.0,
            depth_margin: 2,
        }
    }
}

impl SimulationConfig {
    /// 从 JSON 文件加载配置
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: SimulationConfig =
            serde_json::from_str(&raw).with_context(|| format!("解析配置失败: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置取值
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.default_shortfall_tolerance) {
            bail!(
                "默认缺口容差必须在 [0,1] 内: {}",
                self.default_shortfall_tolerance
            );
        }
        Ok(())
    }
}

// ==========================================
// 企业能源负荷仿真系统 - 负荷曲线引擎
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 4.5 Load Profile Aggregator
// 职责: 由冻结计划的活动区间推导分工序与全厂功率时序
// 输入: FrozenPlan + 各工序功率模型
// 输出: 有序不重叠 (start, end, power) 采样段
// ==========================================

use crate::domain::network::{ProcessNetwork, ProcessNode};
use crate::domain::plan::{ActivityEntry, FrozenPlan};
use crate::domain::types::Dimension;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::debug;

/// 功率判零阈值 (kW)
const POWER_EPS: f64 = 1e-9;

// ==========================================
// LoadSample - 负荷采样段
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSample {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub power_kw: f64,
}

impl LoadSample {
    /// 段时长 (小时)
    pub fn hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }
}

// ==========================================
// StepPowerModel - 工序功率模型 (外部协作方)
// ==========================================
// 契约: 活动区间 + 产耗量 → 区间内恒定功率 (kW)
pub trait StepPowerModel {
    fn power_kw(&self, activity: &ActivityEntry) -> f64;
}

// ==========================================
// RatedPowerModel - 额定功率模型
// ==========================================
// 规则: 工序有额定功率则取额定; 产出品类为能量时按能量/时长折算
#[derive(Debug, Clone, Default)]
pub struct RatedPowerModel {
    rated: BTreeMap<String, f64>,
}

impl RatedPowerModel {
    /// 从网络中各工序的额定功率构建
    pub fn from_network(network: &ProcessNetwork) -> Self {
        let mut rated = BTreeMap::new();
        for node in network.nodes() {
            if let ProcessNode::Step(step) = node {
                if let Some(kw) = step.rated_power_kw {
                    rated.insert(step.name.clone(), kw);
                }
            }
        }
        Self { rated }
    }

    /// 覆写单个工序的额定功率
    pub fn with_rating(mut self, step: impl Into<String>, power_kw: f64) -> Self {
        self.rated.insert(step.into(), power_kw);
        self
    }
}

impl StepPowerModel for RatedPowerModel {
    fn power_kw(&self, activity: &ActivityEntry) -> f64 {
        if let Some(kw) = self.rated.get(&activity.step_name) {
            return *kw;
        }
        // 产出能量的工序: 平均功率 = 能量 / 时长
        if activity.produced.dimension() == Dimension::Energy {
            let hours = (activity.end_time - activity.start_time).num_seconds() as f64 / 3600.0;
            if hours > 0.0 {
                return activity.produced.base_magnitude() / hours;
            }
        }
        0.0
    }
}

// ==========================================
// LoadProfileEngine - 负荷曲线引擎
// ==========================================
pub struct LoadProfileEngine {
    // 无状态引擎,不需要注入依赖
}

impl LoadProfileEngine {
    /// 构造函数
    pub fn new() -> Self {
        Self {}
    }

    /// 分工序负荷曲线
    pub fn step_profiles(
        &self,
        plan: &FrozenPlan,
        model: &dyn StepPowerModel,
    ) -> BTreeMap<String, Vec<LoadSample>> {
        let mut grouped: BTreeMap<String, Vec<(NaiveDateTime, NaiveDateTime, f64)>> =
            BTreeMap::new();
        for activity in plan.activities() {
            grouped
                .entry(activity.step_name.clone())
                .or_default()
                .push((
                    activity.start_time,
                    activity.end_time,
                    model.power_kw(activity),
                ));
        }
        grouped
            .into_iter()
            .map(|(step, intervals)| (step, sweep(&intervals)))
            .collect()
    }

    /// 全厂总负荷曲线 (分段求和)
    pub fn enterprise_profile(
        &self,
        plan: &FrozenPlan,
        model: &dyn StepPowerModel,
    ) -> Vec<LoadSample> {
        let intervals: Vec<(NaiveDateTime, NaiveDateTime, f64)> = plan
            .activities()
            .iter()
            .map(|a| (a.start_time, a.end_time, model.power_kw(a)))
            .collect();
        let profile = sweep(&intervals);
        debug!(
            plan_id = %plan.plan_id(),
            segments = profile.len(),
            "全厂负荷曲线聚合完成"
        );
        profile
    }

    /// 负荷曲线积分为总电量 (kWh)
    pub fn total_energy_kwh(&self, samples: &[LoadSample]) -> f64 {
        samples.iter().map(|s| s.power_kw * s.hours()).sum()
    }
}

/// 边界扫描: 区间集合 → 有序不重叠的功率段
fn sweep(intervals: &[(NaiveDateTime, NaiveDateTime, f64)]) -> Vec<LoadSample> {
    let mut events: Vec<(NaiveDateTime, f64)> = Vec::with_capacity(intervals.len() * 2);
    for (start, end, power) in intervals {
        if end > start && power.abs() > POWER_EPS {
            events.push((*start, *power));
            events.push((*end, -*power));
        }
    }
    // 稳定排序: 同时刻事件保持插入序,保证可复现
    events.sort_by(|a, b| a.0.cmp(&b.0));

    let mut samples = Vec::new();
    let mut current_power = 0.0f64;
    let mut prev_time: Option<NaiveDateTime> = None;
    let mut i = 0;
    while i < events.len() {
        let time = events[i].0;
        if let Some(prev) = prev_time {
            if time > prev && current_power > POWER_EPS {
                samples.push(LoadSample {
                    start: prev,
                    end: time,
                    power_kw: current_power,
                });
            }
        }
        // 同时刻事件一次吸收
        while i < events.len() && events[i].0 == time {
            current_power += events[i].1;
            i += 1;
        }
        prev_time = Some(time);
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::ProductionPlan;
    use crate::domain::quantity::Quantity;
    use crate::domain::types::Unit;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn activity(step: &str, start: u32, end: u32) -> ActivityEntry {
        ActivityEntry {
            entry_seq: 0,
            step_name: step.to_string(),
            start_time: ts(start),
            end_time: ts(end),
            commodity: "coil".to_string(),
            produced: Quantity::new(10.0, Unit::Tonne),
            consumed: vec![],
        }
    }

    fn plan_with(activities: Vec<ActivityEntry>) -> FrozenPlan {
        let mut plan = ProductionPlan::new("P1");
        for a in activities {
            plan.append_activity(a);
        }
        plan.finalize()
    }

    #[test]
    fn test_step_profile_from_rated_power() {
        let plan = plan_with(vec![activity("rolling", 8, 10)]);
        let model = RatedPowerModel::default().with_rating("rolling", 800.0);
        let engine = LoadProfileEngine::new();
        let profiles = engine.step_profiles(&plan, &model);
        assert_eq!(
            profiles["rolling"],
            vec![LoadSample {
                start: ts(8),
                end: ts(10),
                power_kw: 800.0
            }]
        );
    }

    #[test]
    fn test_enterprise_profile_sums_overlap() {
        let plan = plan_with(vec![activity("rolling", 8, 12), activity("annealing", 10, 14)]);
        let model = RatedPowerModel::default()
            .with_rating("rolling", 800.0)
            .with_rating("annealing", 200.0);
        let engine = LoadProfileEngine::new();
        let profile = engine.enterprise_profile(&plan, &model);
        assert_eq!(profile.len(), 3);
        assert_eq!(profile[0], LoadSample { start: ts(8), end: ts(10), power_kw: 800.0 });
        assert_eq!(profile[1], LoadSample { start: ts(10), end: ts(12), power_kw: 1000.0 });
        assert_eq!(profile[2], LoadSample { start: ts(12), end: ts(14), power_kw: 200.0 });
    }

    #[test]
    fn test_energy_commodity_fallback_power() {
        let mut a = activity("boiler", 8, 10);
        a.produced = Quantity::new(400.0, Unit::KilowattHour);
        let plan = plan_with(vec![a]);
        let model = RatedPowerModel::default();
        let engine = LoadProfileEngine::new();
        let profile = engine.enterprise_profile(&plan, &model);
        assert_eq!(profile.len(), 1);
        assert!((profile[0].power_kw - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_total_energy_integration() {
        let engine = LoadProfileEngine::new();
        let samples = vec![
            LoadSample { start: ts(8), end: ts(10), power_kw: 800.0 },
            LoadSample { start: ts(10), end: ts(11), power_kw: 200.0 },
        ];
        assert!((engine.total_energy_kwh(&samples) - 1800.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_power_segments_skipped() {
        let plan = plan_with(vec![activity("manual_station", 8, 10)]);
        let model = RatedPowerModel::default();
        let engine = LoadProfileEngine::new();
        assert!(engine.enterprise_profile(&plan, &model).is_empty());
    }
}

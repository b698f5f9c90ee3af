// ==========================================
// 企业能源负荷仿真系统 - 工序状态机
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 4.2 工序状态机
// 职责: Idle→Requested→InputsPending→Producing→Completed 推进,
//       产能区间预定与转换规则展开
// 红线: 同一工序的活动区间不得重叠 (单机产能)
// ==========================================

use crate::domain::network::{DurationModel, ProcessStep};
use crate::domain::quantity::Quantity;
use crate::domain::types::StepPhase;
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::stream_model::{hours_to_duration, PendingStream};
use chrono::NaiveDateTime;
use tracing::debug;

// ==========================================
// StepCalendar - 工序产能日历
// ==========================================
// 已预定区间按开始时间升序维护
#[derive(Debug, Clone, Default)]
pub struct StepCalendar {
    bookings: Vec<(NaiveDateTime, NaiveDateTime)>,
}

impl StepCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// 自 desired_end 向过去预定最晚可用区间
    ///
    /// 先到先得 (按截止时间优先序): 后到请求只能使用最近一次预定
    /// 结束之后的剩余产能,保证先到请求的区间不被挤占。
    /// 触及可用下界时, `allow_partial` 决定截断还是放弃。
    ///
    /// # 返回
    /// - `Some((start, end, granted_hours))`: 预定成功 (可能截断)
    /// - `None`: 无任何可用时长
    pub fn book_backward(
        &mut self,
        desired_end: NaiveDateTime,
        duration_hours: f64,
        horizon_start: NaiveDateTime,
        allow_partial: bool,
    ) -> Option<(NaiveDateTime, NaiveDateTime, f64)> {
        // 瞬时转换不占用产能
        if duration_hours <= 0.0 {
            return (desired_end >= horizon_start).then_some((desired_end, desired_end, 0.0));
        }

        let floor = self
            .bookings
            .last()
            .map(|(_, b_end)| *b_end)
            .unwrap_or(horizon_start)
            .max(horizon_start);
        if desired_end <= floor {
            return None;
        }

        let duration = hours_to_duration(duration_hours);
        let start = (desired_end - duration).max(floor);
        let granted_hours =
            ((desired_end - start).num_seconds() as f64 / 3600.0).min(duration_hours);
        if granted_hours + 1e-9 < duration_hours && !allow_partial {
            return None;
        }

        self.bookings.push((start, desired_end));
        Some((start, desired_end, granted_hours))
    }

    /// 释放一段预定 (任务受阻时回收产能)
    pub fn release(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        if let Some(pos) = self
            .bookings
            .iter()
            .position(|(b_start, b_end)| *b_start == start && *b_end == end)
        {
            self.bookings.remove(pos);
        }
    }

    /// 已预定区间 (只读)
    pub fn bookings(&self) -> &[(NaiveDateTime, NaiveDateTime)] {
        &self.bookings
    }
}

// ==========================================
// PlannedActivity - 预定的活动区间
// ==========================================
#[derive(Debug, Clone)]
pub struct PlannedActivity {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub feasible: Quantity, // 产能截断后的可产出量
    pub truncated: bool,    // 是否因产能不足被截断
}

// ==========================================
// InputRequirement - 转换规则展开结果
// ==========================================
#[derive(Debug, Clone)]
pub struct InputRequirement {
    pub commodity: String,
    pub required: Quantity,
    pub per_output_base: f64, // 每基准单位产出的基准消耗 (回推可支撑产出用)
}

// ==========================================
// InputDemand - 任务的单口输入需求
// ==========================================
#[derive(Debug, Clone)]
pub struct InputDemand {
    pub stream_id: String,
    pub commodity: String,
    pub required: Quantity,
    pub per_output_base: f64,
    pub child_req: u64,
    pub delivered: Option<Quantity>,
    pub available_from: Option<NaiveDateTime>,
}

// ==========================================
// StepTask - 单次请求的工序任务
// ==========================================
// 工序可重入: 每个下游请求对应一个独立任务
#[derive(Debug, Clone)]
pub struct StepTask {
    pub step_name: String,
    pub phase: StepPhase,
    pub pending_out: PendingStream,
    pub feasible: Quantity,
    pub interval: (NaiveDateTime, NaiveDateTime),
    pub inputs: Vec<InputDemand>,
    pub unresolved: usize,
    pub truncated: bool,
}

impl StepTask {
    /// 记录一个输入口的解析结果; 全部解析后进入 Producing
    pub fn record_input(
        &mut self,
        child_req: u64,
        delivered: Quantity,
        available_from: NaiveDateTime,
    ) {
        if let Some(demand) = self.inputs.iter_mut().find(|d| d.child_req == child_req) {
            if demand.delivered.is_none() {
                demand.delivered = Some(delivered);
                demand.available_from = Some(available_from);
                self.unresolved = self.unresolved.saturating_sub(1);
            }
        }
        if self.unresolved == 0 && self.phase == StepPhase::InputsPending {
            self.phase = StepPhase::Producing;
        }
    }

    /// 全部输入解析后的最终可产出量
    ///
    /// 取各输入口可支撑产出的最小值,再受产能预定量封顶
    pub fn final_output(&self) -> Quantity {
        let mut output_base = self.feasible.base_magnitude();
        for demand in &self.inputs {
            if demand.per_output_base <= 0.0 {
                continue;
            }
            if let Some(delivered) = &demand.delivered {
                let supportable = delivered.base_magnitude() / demand.per_output_base;
                output_base = output_base.min(supportable);
            }
        }
        Quantity::new(
            output_base / self.feasible.unit.base_factor(),
            self.feasible.unit,
        )
    }

    /// 全部输入的最晚就绪时点 (活动开始的因果下界)
    pub fn inputs_available_from(&self) -> Option<NaiveDateTime> {
        self.inputs.iter().filter_map(|d| d.available_from).max()
    }
}

// ==========================================
// StepMachine - 工序调度引擎
// ==========================================
pub struct StepMachine {
    // 无状态引擎,不需要注入依赖
}

impl StepMachine {
    /// 构造函数
    pub fn new() -> Self {
        Self {}
    }

    /// 在工序日历上预定活动区间
    ///
    /// # 参数
    /// - `planned`: 形态量化后的目标产出量
    /// - `due_end`: 活动必须结束的时点 (输出流传输起点)
    ///
    /// # 返回
    /// - `Ok(None)`: 截止前无任何可用产能 (受阻,由调度器传播)
    pub fn plan_activity(
        &self,
        step: &ProcessStep,
        commodity: &str,
        planned: &Quantity,
        due_end: NaiveDateTime,
        calendar: &mut StepCalendar,
        horizon_start: NaiveDateTime,
    ) -> ScheduleResult<Option<PlannedActivity>> {
        if step.output_port(commodity).is_none() {
            return Err(ScheduleError::ConversionInfeasible {
                step: step.name.clone(),
                commodity: commodity.to_string(),
                detail: "工序无此输出口".to_string(),
            });
        }
        if !planned.is_positive() {
            return Err(ScheduleError::ConversionInfeasible {
                step: step.name.clone(),
                commodity: commodity.to_string(),
                detail: format!("请求量非正: {}", planned),
            });
        }

        let (duration_hours, allow_partial) = match &step.duration {
            DurationModel::Instantaneous => (0.0, false),
            DurationModel::Fixed { minutes } => (*minutes as f64 / 60.0, false),
            DurationModel::Throughput { rate } => (planned.duration_at_rate(rate)?, true),
        };

        let booked = calendar.book_backward(due_end, duration_hours, horizon_start, allow_partial);
        let Some((start, end, granted_hours)) = booked else {
            debug!(
                step = %step.name,
                due_end = %due_end,
                duration_hours,
                "截止前无可用产能"
            );
            return Ok(None);
        };

        let truncated = granted_hours + 1e-9 < duration_hours;
        let feasible = if truncated {
            planned.scale(granted_hours / duration_hours)
        } else {
            *planned
        };

        Ok(Some(PlannedActivity {
            start,
            end,
            feasible,
            truncated,
        }))
    }

    /// 按转换规则展开输出需求为各输入口需求
    pub fn required_inputs(
        &self,
        step: &ProcessStep,
        output: &Quantity,
    ) -> ScheduleResult<Vec<InputRequirement>> {
        let output_base = output.base_magnitude();
        let mut requirements = Vec::with_capacity(step.inputs.len());
        for port in &step.inputs {
            if !(port.factor.is_finite() && port.factor > 0.0) {
                return Err(ScheduleError::ConversionInfeasible {
                    step: step.name.clone(),
                    commodity: port.commodity.clone(),
                    detail: format!("消耗系数非法: {}", port.factor),
                });
            }
            requirements.push(InputRequirement {
                commodity: port.commodity.clone(),
                required: Quantity::new(output_base * port.factor, port.unit),
                per_output_base: port.factor * port.unit.base_factor(),
            });
        }
        Ok(requirements)
    }
}

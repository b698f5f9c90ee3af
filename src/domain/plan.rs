// ==========================================
// 企业能源负荷仿真系统 - 生产计划领域模型
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 4.4 Production Plan
// 红线: 仿真期间只追加,不修改不删除 (物料/能量平衡可审计)
// 红线: finalize 之后只读; 冻结由类型系统保证
// ==========================================

use crate::domain::quantity::Quantity;
use crate::domain::types::OrderStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// StreamEntry - 已解析流条目
// ==========================================
// 追加顺序: 倒排协商序 (最下游在前,沿支路逆流而上)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub entry_seq: i64,                  // 解析序号
    pub stream_id: String,               // 流ID
    pub commodity: String,               // 品类
    pub requested: Quantity,             // 下游原始请求量
    pub delivered: Quantity,             // 实际交付量 (批次上取整后可超过请求量)
    pub transfer_start: NaiveDateTime,   // 传输开始
    pub transfer_end: NaiveDateTime,     // 传输结束 (不晚于下游要求时点)
    pub shortfall: Option<Quantity>,     // 容差内缺口
    pub annotation: Option<String>,      // 备注 (缺口警告/整批上取整)
}

// ==========================================
// ConsumedInput - 工序活动消耗明细
// ==========================================
// 持久化为 activity_entry.consumed_json 列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumedInput {
    pub commodity: String,  // 输入品类
    pub quantity: Quantity, // 消耗量
}

// ==========================================
// ActivityEntry - 工序活动区间
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub entry_seq: i64,              // 解析序号
    pub step_name: String,           // 工序名称
    pub start_time: NaiveDateTime,   // 活动开始
    pub end_time: NaiveDateTime,     // 活动结束
    pub commodity: String,           // 产出品类
    pub produced: Quantity,          // 产出量
    pub consumed: Vec<ConsumedInput>, // 各输入口消耗量
}

// ==========================================
// OrderOutcome - 订单结局
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub order_seq: i64,            // 订单序号 (入队顺序)
    pub sink: String,              // 汇节点
    pub commodity: String,         // 品类
    pub requested: Quantity,       // 订单需求量
    pub delivered: Quantity,       // 实际交付量
    pub deadline: NaiveDateTime,   // 交付期限
    pub status: OrderStatus,       // 结局
    pub reason: Option<String>,    // 受阻/缺口原因
}

// ==========================================
// ProductionPlan - 生产计划 (构建态)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionPlan {
    pub plan_id: String,
    streams: Vec<StreamEntry>,
    activities: Vec<ActivityEntry>,
    outcomes: Vec<OrderOutcome>,
}

impl ProductionPlan {
    /// 创建空计划
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            streams: Vec::new(),
            activities: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// 追加流条目
    pub fn append_stream(&mut self, entry: StreamEntry) {
        self.streams.push(entry);
    }

    /// 追加工序活动条目
    pub fn append_activity(&mut self, entry: ActivityEntry) {
        self.activities.push(entry);
    }

    /// 追加订单结局
    pub fn append_outcome(&mut self, outcome: OrderOutcome) {
        self.outcomes.push(outcome);
    }

    /// 冻结计划; 此后仅剩只读访问
    pub fn finalize(self) -> FrozenPlan {
        FrozenPlan(self)
    }

    pub fn streams(&self) -> &[StreamEntry] {
        &self.streams
    }

    pub fn activities(&self) -> &[ActivityEntry] {
        &self.activities
    }

    pub fn outcomes(&self) -> &[OrderOutcome] {
        &self.outcomes
    }
}

// ==========================================
// FrozenPlan - 冻结计划 (只读)
// ==========================================
// 用途: 调度完成信号; 持久化/负荷聚合/目标函数只消费冻结计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenPlan(ProductionPlan);

impl FrozenPlan {
    pub fn plan_id(&self) -> &str {
        &self.0.plan_id
    }

    pub fn streams(&self) -> &[StreamEntry] {
        self.0.streams()
    }

    pub fn activities(&self) -> &[ActivityEntry] {
        self.0.activities()
    }

    pub fn outcomes(&self) -> &[OrderOutcome] {
        self.0.outcomes()
    }

    /// 导出为关系行 (持久化协作方接口)
    pub fn export(&self) -> (Vec<StreamEntry>, Vec<ActivityEntry>, Vec<OrderOutcome>) {
        (
            self.0.streams.clone(),
            self.0.activities.clone(),
            self.0.outcomes.clone(),
        )
    }

    /// 从持久化行重建等价计划
    pub fn restore(
        plan_id: impl Into<String>,
        streams: Vec<StreamEntry>,
        activities: Vec<ActivityEntry>,
        outcomes: Vec<OrderOutcome>,
    ) -> Self {
        FrozenPlan(ProductionPlan {
            plan_id: plan_id.into(),
            streams,
            activities,
            outcomes,
        })
    }

    /// 计划时间跨度 (最早活动开始 → 最晚交付), 外层寻优驱动常用标量
    pub fn makespan_hours(&self) -> f64 {
        let earliest = self
            .0
            .activities
            .iter()
            .map(|a| a.start_time)
            .chain(self.0.streams.iter().map(|s| s.transfer_start))
            .min();
        let latest = self
            .0
            .streams
            .iter()
            .map(|s| s.transfer_end)
            .chain(self.0.activities.iter().map(|a| a.end_time))
            .max();
        match (earliest, latest) {
            (Some(a), Some(b)) => (b - a).num_seconds() as f64 / 3600.0,
            _ => 0.0,
        }
    }
}

// ==========================================
// 企业能源负荷仿真系统 - 调度引擎错误类型
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 7. 错误分级
// 红线: 致命错误整体回滚,不向调用方暴露半成品计划
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::network::NetworkError;
use crate::domain::quantity::UnitError;
use thiserror::Error;

/// 调度引擎错误类型
///
/// 所有变体对当次 run 都是致命的; 容差内缺口不是错误,
/// 以 ShortfallWarning 注记写入计划条目。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    // ===== 物理量错误 =====
    #[error("量纲错误: {0}")]
    Dimension(#[from] UnitError),

    // ===== 拓扑错误 =====
    #[error("拓扑校验失败: {0}")]
    Topology(#[from] NetworkError),

    #[error("网络不可达: 汇节点 {sink}: {detail}")]
    NetworkUnreachable { sink: String, detail: String },

    // ===== 转换规则错误 =====
    #[error("工序 {step} 对品类 {commodity} 转换不可行: {detail}")]
    ConversionInfeasible {
        step: String,
        commodity: String,
        detail: String,
    },

    // ===== 订单错误 =====
    #[error("订单无效: 汇节点 {sink}: {detail}")]
    InvalidOrder { sink: String, detail: String },
}

/// Result 类型别名
pub type ScheduleResult<T> = Result<T, ScheduleError>;

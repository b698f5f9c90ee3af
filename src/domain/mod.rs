// ==========================================
// 企业能源负荷仿真系统 - 领域层
// ==========================================
// 依据: Plant_Energy_Master_Spec.md - PART A 数据模型
// 红线: 领域实体不含调度逻辑,不访问数据库
// ==========================================

pub mod commodity;
pub mod network;
pub mod plan;
pub mod quantity;
pub mod types;

// 重导出核心实体
pub use commodity::Commodity;
pub use network::{
    DurationModel, InputPort, NetworkError, OutputPort, ProcessNetwork, ProcessNode, ProcessStep,
    StreamKind, StreamSpec, TopologyInfo,
};
pub use plan::{
    ActivityEntry, ConsumedInput, FrozenPlan, OrderOutcome, ProductionPlan, StreamEntry,
};
pub use quantity::{Quantity, UnitError, UnitResult};
pub use types::{Dimension, OrderStatus, StepPhase, Unit};

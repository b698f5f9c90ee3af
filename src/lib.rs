// ==========================================
// 企业能源负荷仿真系统 - 核心库
// ==========================================
// 依据: Plant_Energy_Master_Spec.md - 系统宪法
// 技术栈: Rust + SQLite
// 系统定位: 生产网络倒排仿真与负荷推导 (静态计划,非实时控制)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 倒排调度与负荷聚合
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施(连接初始化/PRAGMA 统一)
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{Dimension, OrderStatus, StepPhase, Unit};

// 领域实体
pub use domain::{
    ActivityEntry, Commodity, ConsumedInput, DurationModel, FrozenPlan, InputPort, NetworkError,
    OrderOutcome, OutputPort, ProcessNetwork, ProcessNode, ProcessStep, ProductionPlan, Quantity,
    StreamEntry, StreamKind, StreamSpec, UnitError,
};

// 引擎
pub use engine::{
    BackwardScheduler, LoadProfileEngine, LoadSample, Order, RatedPowerModel, ScheduleError,
    StepPowerModel,
};

// 配置
pub use config::SimulationConfig;

// API
pub use api::SimulationApi;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "企业能源负荷仿真系统";

// ==========================================
// 预编译检查
// ==========================================

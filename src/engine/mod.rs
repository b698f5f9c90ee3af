// ==========================================
// 企业能源负荷仿真系统 - 引擎层
// ==========================================
// 依据: Plant_Energy_Master_Spec.md - PART B 引擎体系
// 依据: Sim_Engine_Specs_v0.2.md - 4. 组件设计
// ==========================================
// 职责: 倒排协商、工序状态机、流量化、负荷聚合
// 红线: 引擎不访问数据库; 单线程同步,无进程级可变状态
// ==========================================

pub mod error;
pub mod load_profile;
pub mod scheduler;
pub mod step_machine;
pub mod stream_model;

// 重导出核心引擎
pub use error::{ScheduleError, ScheduleResult};
pub use load_profile::{LoadProfileEngine, LoadSample, RatedPowerModel, StepPowerModel};
pub use scheduler::{BackwardScheduler, Order};
pub use step_machine::{PlannedActivity, StepCalendar, StepMachine, StepTask};
pub use stream_model::{PendingStream, StreamResolution};

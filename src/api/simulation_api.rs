// ==========================================
// 企业能源负荷仿真系统 - 仿真业务接口
// ==========================================
// 依据: Plant_Energy_Master_Spec.md - PART C 外部接口
// 职责: 编排 网络 + 调度器 + 仓储 + 负荷引擎,服务外层驱动
// 用途: 外层扫参驱动按候选配置反复调用,读取标量目标值
// ==========================================

use crate::config::SimulationConfig;
use crate::domain::network::ProcessNetwork;
use crate::domain::plan::FrozenPlan;
use crate::engine::{BackwardScheduler, LoadProfileEngine, Order, RatedPowerModel};
use crate::repository::PlanRepository;
use anyhow::Context;
use chrono::Utc;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

/// CSV 时间戳格式 (与数据库一致)
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// SimulationApi - 仿真接口
// ==========================================
pub struct SimulationApi {
    network: Arc<ProcessNetwork>,
    scheduler: BackwardScheduler,
    repo: PlanRepository,
}

impl SimulationApi {
    /// 创建仿真接口
    ///
    /// # 参数
    /// - network: 生产网络 (只读,可跨 run 复用)
    /// - config: 仿真配置 (启动时构建一次)
    /// - db_path: SQLite 数据库路径
    pub fn new(
        network: Arc<ProcessNetwork>,
        config: Arc<SimulationConfig>,
        db_path: &str,
    ) -> anyhow::Result<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)
            .with_context(|| format!("打开数据库失败: {}", db_path))?;
        let repo = PlanRepository::new(Arc::new(Mutex::new(conn)));
        repo.init_schema()?;
        let scheduler = BackwardScheduler::new(network.clone(), config);
        Ok(Self {
            network,
            scheduler,
            repo,
        })
    }

    /// 执行一次仿真并持久化冻结计划
    ///
    /// plan_id 由接口层铸造 (uuid); 调度核心内部不产生任何随机量
    pub fn run_and_persist(&self, orders: &[Order]) -> anyhow::Result<FrozenPlan> {
        let plan_id = Uuid::new_v4().to_string();
        let plan = self.scheduler.run_all(&plan_id, orders)?;
        self.repo.save(&plan, Utc::now().naive_utc())?;
        info!(plan_id = %plan.plan_id(), "计划已持久化");
        Ok(plan)
    }

    /// 按 plan_id 重建冻结计划
    pub fn load_plan(&self, plan_id: &str) -> anyhow::Result<Option<FrozenPlan>> {
        Ok(self.repo.load(plan_id)?)
    }

    /// 已持久化的计划ID列表
    pub fn list_plan_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.repo.list_plan_ids()?)
    }

    /// 外层寻优的标量目标值: 全厂总电量 (kWh)
    pub fn objective_total_energy_kwh(&self, plan: &FrozenPlan) -> f64 {
        let model = RatedPowerModel::from_network(&self.network);
        let engine = LoadProfileEngine::new();
        let profile = engine.enterprise_profile(plan, &model);
        engine.total_energy_kwh(&profile)
    }

    /// 导出负荷曲线 CSV (分工序 + 全厂汇总)
    pub fn export_load_profile_csv(
        &self,
        plan: &FrozenPlan,
        path: impl AsRef<Path>,
    ) -> anyhow::Result<()> {
        let model = RatedPowerModel::from_network(&self.network);
        let engine = LoadProfileEngine::new();

        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("创建 CSV 文件失败: {}", path.display()))?;
        writer.write_record(["scope", "name", "start", "end", "power_kw"])?;

        for (step, samples) in engine.step_profiles(plan, &model) {
            for sample in samples {
                let start = sample.start.format(TS_FORMAT).to_string();
                let end = sample.end.format(TS_FORMAT).to_string();
                let power = sample.power_kw.to_string();
                writer.write_record(["STEP", step.as_str(), &start, &end, &power])?;
            }
        }
        for sample in engine.enterprise_profile(plan, &model) {
            let start = sample.start.format(TS_FORMAT).to_string();
            let end = sample.end.format(TS_FORMAT).to_string();
            let power = sample.power_kw.to_string();
            writer.write_record(["TOTAL", "enterprise", &start, &end, &power])?;
        }
        writer.flush()?;
        info!(plan_id = %plan.plan_id(), path = %path.display(), "负荷曲线已导出");
        Ok(())
    }
}

// ==========================================
// 企业能源负荷仿真系统 - CLI 主入口
// ==========================================
// 依据: Plant_Energy_Master_Spec.md
// 技术栈: Rust + SQLite
// 用途: 构建示例生产网络,执行一次倒排仿真,
//       持久化冻结计划并输出负荷概要
// ==========================================

use anyhow::Context;
use chrono::NaiveDate;
use plant_energy_sim::domain::network::{
    DurationModel, InputPort, OutputPort, ProcessNetwork, ProcessNode, ProcessStep, StreamKind,
    StreamSpec,
};
use plant_energy_sim::engine::{LoadProfileEngine, Order, RatedPowerModel};
use plant_energy_sim::{Quantity, SimulationApi, SimulationConfig, Unit};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    plant_energy_sim::logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", plant_energy_sim::APP_NAME);
    tracing::info!("系统版本: {}", plant_energy_sim::VERSION);
    tracing::info!("==================================================");

    // 数据库路径: 首个参数覆盖,默认落在用户数据目录
    let db_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => default_db_path()?,
    };
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("创建数据目录失败: {}", dir.display()))?;
    }
    tracing::info!("使用数据库: {}", db_path.display());

    let config = Arc::new(SimulationConfig {
        horizon_start: NaiveDate::from_ymd_opt(2026, 3, 1)
            .context("固定日期非法")?
            .and_hms_opt(0, 0, 0)
            .context("固定时刻非法")?,
        ..Default::default()
    });
    let network = Arc::new(demo_network());
    let api = SimulationApi::new(
        network.clone(),
        config.clone(),
        db_path.to_str().context("数据库路径非 UTF-8")?,
    )?;

    // 终端订单: 48 小时后交付 240 t 退火卷
    let order = Order {
        sink: "customer".to_string(),
        commodity: "annealed_coil".to_string(),
        quantity: Quantity::new(240.0, Unit::Tonne),
        deadline: config.horizon_start + chrono::Duration::hours(48),
    };

    let plan = api.run_and_persist(std::slice::from_ref(&order))?;

    // ==========================================
    // 结果概要
    // ==========================================
    for outcome in plan.outcomes() {
        tracing::info!(
            sink = %outcome.sink,
            status = %outcome.status,
            requested = %outcome.requested,
            delivered = %outcome.delivered,
            "订单结局"
        );
    }
    tracing::info!(
        streams = plan.streams().len(),
        activities = plan.activities().len(),
        makespan_hours = plan.makespan_hours(),
        "计划规模"
    );

    let model = RatedPowerModel::from_network(&network);
    let engine = LoadProfileEngine::new();
    let profile = engine.enterprise_profile(&plan, &model);
    for sample in &profile {
        tracing::info!(
            start = %sample.start,
            end = %sample.end,
            power_kw = sample.power_kw,
            "全厂负荷段"
        );
    }
    tracing::info!(
        total_energy_kwh = engine.total_energy_kwh(&profile),
        objective = api.objective_total_energy_kwh(&plan),
        "能耗汇总"
    );

    Ok(())
}

/// 默认数据库位置: <用户数据目录>/plant-energy-sim/plans.db
fn default_db_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .context("无法确定用户数据目录")?;
    Ok(base.join("plant-energy-sim").join("plans.db"))
}

/// 示例网络: 板坯库/电网 → 热轧 → 退火 → 客户
fn demo_network() -> ProcessNetwork {
    let mut net = ProcessNetwork::new();

    net.add_node(ProcessNode::Source {
        name: "slab_yard".to_string(),
        commodity: "slab".to_string(),
    });
    net.add_node(ProcessNode::Source {
        name: "grid".to_string(),
        commodity: "electricity".to_string(),
    });
    net.add_node(ProcessNode::Step(ProcessStep {
        name: "hot_rolling".to_string(),
        inputs: vec![
            InputPort {
                commodity: "slab".to_string(),
                factor: 1.03, // 轧损
                unit: Unit::Tonne,
            },
            InputPort {
                commodity: "electricity".to_string(),
                factor: 95.0,
                unit: Unit::KilowattHour,
            },
        ],
        outputs: vec![OutputPort {
            commodity: "coil".to_string(),
        }],
        duration: DurationModel::Throughput {
            rate: Quantity::new(250.0, Unit::TonnePerHour),
        },
        rated_power_kw: Some(24_000.0),
    }));
    net.add_node(ProcessNode::Step(ProcessStep {
        name: "annealing".to_string(),
        inputs: vec![InputPort {
            commodity: "coil".to_string(),
            factor: 1.0,
            unit: Unit::Tonne,
        }],
        outputs: vec![OutputPort {
            commodity: "annealed_coil".to_string(),
        }],
        duration: DurationModel::Fixed { minutes: 180 },
        rated_power_kw: Some(3_500.0),
    }));
    net.add_node(ProcessNode::Sink {
        name: "customer".to_string(),
        commodity: "annealed_coil".to_string(),
    });

    net.add_stream(StreamSpec {
        stream_id: "s_slab".to_string(),
        from_node: "slab_yard".to_string(),
        to_node: "hot_rolling".to_string(),
        commodity: "slab".to_string(),
        kind: StreamKind::Continuous {
            max_rate: Quantity::new(500.0, Unit::TonnePerHour),
        },
        shortfall_tolerance: None,
    });
    net.add_stream(StreamSpec {
        stream_id: "s_power".to_string(),
        from_node: "grid".to_string(),
        to_node: "hot_rolling".to_string(),
        commodity: "electricity".to_string(),
        kind: StreamKind::Continuous {
            max_rate: Quantity::new(50.0, Unit::Megawatt),
        },
        shortfall_tolerance: None,
    });
    net.add_stream(StreamSpec {
        stream_id: "s_coil".to_string(),
        from_node: "hot_rolling".to_string(),
        to_node: "annealing".to_string(),
        commodity: "coil".to_string(),
        kind: StreamKind::Batch {
            batch_size: Quantity::new(120.0, Unit::Tonne),
        },
        shortfall_tolerance: None,
    });
    net.add_stream(StreamSpec {
        stream_id: "s_annealed".to_string(),
        from_node: "annealing".to_string(),
        to_node: "customer".to_string(),
        commodity: "annealed_coil".to_string(),
        kind: StreamKind::Continuous {
            max_rate: Quantity::new(300.0, Unit::TonnePerHour),
        },
        shortfall_tolerance: None,
    });

    net
}

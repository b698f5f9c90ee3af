// ==========================================
// 倒排调度引擎集成测试
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 8. 可测性质
// 职责: 验证调度器在完整网络上的端到端行为
// 场景: 单链交付 / 共享工序产能竞争 / 缺口传播 / 可复现性
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use plant_energy_sim::domain::network::{
    DurationModel, InputPort, OutputPort, ProcessNetwork, ProcessNode, ProcessStep, StreamKind,
    StreamSpec,
};
use plant_energy_sim::engine::{BackwardScheduler, Order, ScheduleError};
use plant_energy_sim::{OrderStatus, Quantity, SimulationConfig, Unit};
use std::sync::Arc;

// ==========================================
// 测试辅助函数
// ==========================================

fn ts(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 1)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

/// 传输近似瞬时的连续流 (速率大到时窗取整为 0 秒)
fn fast_stream(
    id: &str,
    from: &str,
    to: &str,
    commodity: &str,
    tolerance: Option<f64>,
) -> StreamSpec {
    StreamSpec {
        stream_id: id.to_string(),
        from_node: from.to_string(),
        to_node: to.to_string(),
        commodity: commodity.to_string(),
        kind: StreamKind::Continuous {
            max_rate: Quantity::new(100_000.0, Unit::TonnePerHour),
        },
        shortfall_tolerance: tolerance,
    }
}

fn throughput_step(name: &str, input: &str, output: &str, factor: f64, rate: f64) -> ProcessStep {
    ProcessStep {
        name: name.to_string(),
        inputs: vec![InputPort {
            commodity: input.to_string(),
            factor,
            unit: Unit::Tonne,
        }],
        outputs: vec![OutputPort {
            commodity: output.to_string(),
        }],
        duration: DurationModel::Throughput {
            rate: Quantity::new(rate, Unit::TonnePerHour),
        },
        rated_power_kw: Some(1_000.0),
    }
}

/// 单链网络: slab_yard → mill → customer
fn chain_network(factor: f64, duration: DurationModel) -> ProcessNetwork {
    let mut net = ProcessNetwork::new();
    net.add_node(ProcessNode::Source {
        name: "slab_yard".to_string(),
        commodity: "slab".to_string(),
    });
    net.add_node(ProcessNode::Step(ProcessStep {
        name: "mill".to_string(),
        inputs: vec![InputPort {
            commodity: "slab".to_string(),
            factor,
            unit: Unit::Tonne,
        }],
        outputs: vec![OutputPort {
            commodity: "coil".to_string(),
        }],
        duration,
        rated_power_kw: Some(800.0),
    }));
    net.add_node(ProcessNode::Sink {
        name: "customer".to_string(),
        commodity: "coil".to_string(),
    });
    net.add_stream(fast_stream("s_slab", "slab_yard", "mill", "slab", None));
    net.add_stream(fast_stream("s_coil", "mill", "customer", "coil", None));
    net
}

/// 双汇共享工序网络: slab_yard → press → {customer_a, customer_b}
fn shared_step_network(rate: f64, tol_b: Option<f64>) -> ProcessNetwork {
    let mut net = ProcessNetwork::new();
    net.add_node(ProcessNode::Source {
        name: "slab_yard".to_string(),
        commodity: "slab".to_string(),
    });
    net.add_node(ProcessNode::Step(throughput_step(
        "press", "slab", "plate", 1.0, rate,
    )));
    net.add_node(ProcessNode::Sink {
        name: "customer_a".to_string(),
        commodity: "plate".to_string(),
    });
    net.add_node(ProcessNode::Sink {
        name: "customer_b".to_string(),
        commodity: "plate".to_string(),
    });
    net.add_stream(fast_stream("s_slab", "slab_yard", "press", "slab", None));
    net.add_stream(fast_stream("s_plate_a", "press", "customer_a", "plate", None));
    net.add_stream(fast_stream("s_plate_b", "press", "customer_b", "plate", tol_b));
    net
}

fn scheduler(net: ProcessNetwork) -> BackwardScheduler {
    let config = SimulationConfig {
        horizon_start: ts(0),
        ..Default::default()
    };
    BackwardScheduler::new(Arc::new(net), Arc::new(config))
}

fn order(sink: &str, commodity: &str, qty_t: f64, deadline: NaiveDateTime) -> Order {
    Order {
        sink: sink.to_string(),
        commodity: commodity.to_string(),
        quantity: Quantity::new(qty_t, Unit::Tonne),
        deadline,
    }
}

// ==========================================
// 场景1: 单链交付 (1:1 瞬时工序)
// ==========================================
#[test]
fn test_scenario_single_chain_instantaneous() {
    let sched = scheduler(chain_network(1.0, DurationModel::Instantaneous));
    let plan = sched
        .run("P1", order("customer", "coil", 10.0, ts(12)))
        .unwrap();

    // 一段活动,按期结束
    assert_eq!(plan.activities().len(), 1);
    let activity = &plan.activities()[0];
    assert_eq!(activity.step_name, "mill");
    assert!(activity.end_time <= ts(12));

    // 到客户的流条目: 10 t 按期到达
    let to_customer = plan
        .streams()
        .iter()
        .find(|s| s.stream_id == "s_coil")
        .unwrap();
    assert!((to_customer.delivered.value - 10.0).abs() < 1e-9);
    assert!(to_customer.transfer_end <= ts(12));

    assert_eq!(plan.outcomes().len(), 1);
    assert_eq!(plan.outcomes()[0].status, OrderStatus::Fulfilled);
}

// ==========================================
// 场景2: 双汇共享工序,产能充足时按截止排序
// ==========================================
#[test]
fn test_deadline_tie_break_on_shared_step() {
    let sched = scheduler(shared_step_network(5.0, None));
    let plan = sched
        .run_all(
            "P1",
            &[
                order("customer_a", "plate", 10.0, ts(10)),
                order("customer_b", "plate", 10.0, ts(16)),
            ],
        )
        .unwrap();

    assert_eq!(plan.activities().len(), 2);
    let mut activities: Vec<_> = plan.activities().to_vec();
    activities.sort_by_key(|a| a.end_time);
    // 早截止订单的活动区间不晚于晚截止订单
    assert!(activities[0].start_time <= activities[1].start_time);
    assert!(activities[0].end_time <= ts(10));
    assert!(activities[1].end_time <= ts(16));
    assert!(plan
        .outcomes()
        .iter()
        .all(|o| o.status == OrderStatus::Fulfilled));
}

// ==========================================
// 场景3: 共享工序产能不足,仅晚截止订单受阻
// ==========================================
#[test]
fn test_shared_step_capacity_blocks_later_order_only() {
    // press 5 t/h: d1 订单 [1,3] 恰好占满, d2 只剩 [3,4) 一小时
    let sched = scheduler(shared_step_network(5.0, None));
    let plan = sched
        .run_all(
            "P1",
            &[
                order("customer_a", "plate", 10.0, ts(3)),
                order("customer_b", "plate", 10.0, ts(4)),
            ],
        )
        .unwrap();

    assert_eq!(plan.outcomes()[0].status, OrderStatus::Fulfilled);
    assert_eq!(plan.outcomes()[1].status, OrderStatus::Blocked);
    // 受阻支路不留条目: 只有 d1 的一段活动
    assert_eq!(plan.activities().len(), 1);
    assert!((plan.outcomes()[1].delivered.value - 0.0).abs() < 1e-12);
}

#[test]
fn test_shared_step_capacity_shortfall_within_tolerance() {
    // customer_b 的流容差 0.6: 5/10 的缺口被吸收为 ShortfallWarning
    let sched = scheduler(shared_step_network(5.0, Some(0.6)));
    let plan = sched
        .run_all(
            "P1",
            &[
                order("customer_a", "plate", 10.0, ts(3)),
                order("customer_b", "plate", 10.0, ts(4)),
            ],
        )
        .unwrap();

    assert_eq!(plan.outcomes()[0].status, OrderStatus::Fulfilled);
    let outcome_b = &plan.outcomes()[1];
    assert_eq!(outcome_b.status, OrderStatus::Shortfall);
    assert!((outcome_b.delivered.value - 5.0).abs() < 1e-9);

    let entry_b = plan
        .streams()
        .iter()
        .find(|s| s.stream_id == "s_plate_b")
        .unwrap();
    let shortfall = entry_b.shortfall.unwrap();
    assert!((shortfall.value - 5.0).abs() < 1e-9);
    assert!(entry_b.annotation.as_deref().unwrap().contains("缺口警告"));
}

// ==========================================
// 性质: 物料/能量平衡
// ==========================================
#[test]
fn test_mass_and_energy_balance() {
    // 1.05 轧损 + 每吨 95 kWh 电耗
    let mut net = chain_network(1.05, DurationModel::Throughput {
        rate: Quantity::new(20.0, Unit::TonnePerHour),
    });
    net.add_node(ProcessNode::Source {
        name: "grid".to_string(),
        commodity: "electricity".to_string(),
    });
    // mill 增加电力输入口
    let mill = match net.node("mill").unwrap() {
        ProcessNode::Step(step) => {
            let mut step = step.clone();
            step.inputs.push(InputPort {
                commodity: "electricity".to_string(),
                factor: 95.0,
                unit: Unit::KilowattHour,
            });
            step
        }
        _ => unreachable!(),
    };
    net.add_node(ProcessNode::Step(mill));
    net.add_stream(StreamSpec {
        stream_id: "s_power".to_string(),
        from_node: "grid".to_string(),
        to_node: "mill".to_string(),
        commodity: "electricity".to_string(),
        kind: StreamKind::Continuous {
            max_rate: Quantity::new(50.0, Unit::Megawatt),
        },
        shortfall_tolerance: None,
    });

    let sched = scheduler(net);
    let plan = sched
        .run("P1", order("customer", "coil", 40.0, ts(20)))
        .unwrap();

    let activity = &plan.activities()[0];
    assert!((activity.produced.value - 40.0).abs() < 1e-9);
    let slab = activity
        .consumed
        .iter()
        .find(|c| c.commodity == "slab")
        .unwrap();
    assert!((slab.quantity.value - 42.0).abs() < 1e-9);
    let power = activity
        .consumed
        .iter()
        .find(|c| c.commodity == "electricity")
        .unwrap();
    assert!((power.quantity.value - 3800.0).abs() < 1e-9);

    // 每条输入流的交付量覆盖活动消耗量
    for consumed in &activity.consumed {
        let entry = plan
            .streams()
            .iter()
            .find(|s| s.commodity == consumed.commodity)
            .unwrap();
        assert!(
            entry.delivered.base_magnitude() + 1e-9 >= consumed.quantity.base_magnitude(),
            "输入流 {} 交付不足",
            entry.stream_id
        );
    }
}

// ==========================================
// 性质: 因果有序
// ==========================================
#[test]
fn test_causal_ordering_deep_chain() {
    // slab_yard → roughing → finishing → customer
    let mut net = ProcessNetwork::new();
    net.add_node(ProcessNode::Source {
        name: "slab_yard".to_string(),
        commodity: "slab".to_string(),
    });
    net.add_node(ProcessNode::Step(throughput_step(
        "roughing", "slab", "bar", 1.0, 10.0,
    )));
    net.add_node(ProcessNode::Step(throughput_step(
        "finishing", "bar", "coil", 1.0, 10.0,
    )));
    net.add_node(ProcessNode::Sink {
        name: "customer".to_string(),
        commodity: "coil".to_string(),
    });
    net.add_stream(fast_stream("s_slab", "slab_yard", "roughing", "slab", None));
    net.add_stream(fast_stream("s_bar", "roughing", "finishing", "bar", None));
    net.add_stream(fast_stream("s_coil", "finishing", "customer", "coil", None));

    let steps = ["roughing", "finishing"];
    let sched = scheduler(net);
    let plan = sched
        .run("P1", order("customer", "coil", 20.0, ts(12)))
        .unwrap();

    for entry in plan.streams() {
        let producer = plan
            .activities()
            .iter()
            .find(|a| a.entry_seq == entry.entry_seq - 1 && steps.contains(&a.step_name.as_str()));
        match entry.stream_id.as_str() {
            // 工序产出的流: 生产活动先于流条目入账,且活动结束不晚于传输开始
            "s_coil" | "s_bar" => {
                let producer = producer.expect("工序产出流缺少前置活动条目");
                assert!(producer.end_time <= entry.transfer_start);
            }
            // 源供给的流没有生产活动
            _ => assert!(producer.is_none()),
        }
    }

    // 条目序严格递增 (追加序即解析序)
    let mut seqs: Vec<i64> = plan
        .streams()
        .iter()
        .map(|s| s.entry_seq)
        .chain(plan.activities().iter().map(|a| a.entry_seq))
        .collect();
    seqs.sort_unstable();
    seqs.dedup();
    assert_eq!(seqs.len(), plan.streams().len() + plan.activities().len());
}

// ==========================================
// 性质: 可复现性 (逐字节一致)
// ==========================================
#[test]
fn test_determinism_byte_identical() {
    let orders = [
        order("customer_a", "plate", 10.0, ts(10)),
        order("customer_b", "plate", 8.0, ts(16)),
    ];
    let plan1 = scheduler(shared_step_network(5.0, None))
        .run_all("P1", &orders)
        .unwrap();
    let plan2 = scheduler(shared_step_network(5.0, None))
        .run_all("P1", &orders)
        .unwrap();

    assert_eq!(plan1, plan2);
    assert_eq!(
        serde_json::to_string(&plan1).unwrap(),
        serde_json::to_string(&plan2).unwrap()
    );
}

// ==========================================
// 缺口沿请求链向下游收缩
// ==========================================
#[test]
fn test_shortfall_propagates_through_chain() {
    // upstream 5 t/h 是瓶颈; 两级流容差 0.6 吸收一半缺口
    let mut net = ProcessNetwork::new();
    net.add_node(ProcessNode::Source {
        name: "slab_yard".to_string(),
        commodity: "slab".to_string(),
    });
    net.add_node(ProcessNode::Step(throughput_step(
        "upstream", "slab", "bar", 1.0, 5.0,
    )));
    net.add_node(ProcessNode::Step(ProcessStep {
        name: "downstream".to_string(),
        inputs: vec![InputPort {
            commodity: "bar".to_string(),
            factor: 1.0,
            unit: Unit::Tonne,
        }],
        outputs: vec![OutputPort {
            commodity: "coil".to_string(),
        }],
        duration: DurationModel::Instantaneous,
        rated_power_kw: None,
    }));
    net.add_node(ProcessNode::Sink {
        name: "customer".to_string(),
        commodity: "coil".to_string(),
    });
    net.add_stream(fast_stream("s_slab", "slab_yard", "upstream", "slab", None));
    net.add_stream(fast_stream("s_bar", "upstream", "downstream", "bar", Some(0.6)));
    net.add_stream(fast_stream("s_coil", "downstream", "customer", "coil", Some(0.6)));

    let sched = scheduler(net);
    // 截止 1 小时, 瓶颈只能产 5 t
    let plan = sched
        .run("P1", order("customer", "coil", 10.0, ts(1)))
        .unwrap();

    let outcome = &plan.outcomes()[0];
    assert_eq!(outcome.status, OrderStatus::Shortfall);
    assert!((outcome.delivered.value - 5.0).abs() < 1e-9);

    // downstream 活动按实际到料收缩
    let downstream = plan
        .activities()
        .iter()
        .find(|a| a.step_name == "downstream")
        .unwrap();
    assert!((downstream.produced.value - 5.0).abs() < 1e-9);
    assert!((downstream.consumed[0].quantity.value - 5.0).abs() < 1e-9);
}

// ==========================================
// 批次流整批上取整
// ==========================================
#[test]
fn test_batch_stream_rounds_up() {
    let mut net = chain_network(1.0, DurationModel::Instantaneous);
    // 输入流改为 3 t 整批
    let mut streams: Vec<StreamSpec> = net.streams().cloned().collect();
    for s in &mut streams {
        if s.stream_id == "s_slab" {
            s.kind = StreamKind::Batch {
                batch_size: Quantity::new(3.0, Unit::Tonne),
            };
        }
    }
    let mut rebuilt = ProcessNetwork::new();
    for node in net.nodes() {
        rebuilt.add_node(node.clone());
    }
    for s in streams {
        rebuilt.add_stream(s);
    }

    let sched = scheduler(rebuilt);
    let plan = sched
        .run("P1", order("customer", "coil", 10.0, ts(12)))
        .unwrap();

    let slab_entry = plan
        .streams()
        .iter()
        .find(|s| s.stream_id == "s_slab")
        .unwrap();
    assert!((slab_entry.delivered.value - 12.0).abs() < 1e-9);
    assert!(slab_entry
        .annotation
        .as_deref()
        .unwrap()
        .contains("整批上取整"));
    assert_eq!(plan.outcomes()[0].status, OrderStatus::Fulfilled);
}

// ==========================================
// 致命错误: 原子失败,不暴露计划
// ==========================================
#[test]
fn test_dimension_mismatch_is_fatal() {
    // 工序速率误配为功率单位,吨位请求换算时长必然失败
    let net = chain_network(
        1.0,
        DurationModel::Throughput {
            rate: Quantity::new(100.0, Unit::Kilowatt),
        },
    );
    let sched = scheduler(net);
    let err = sched
        .run("P1", order("customer", "coil", 10.0, ts(12)))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Dimension(_)));
}

#[test]
fn test_cyclic_material_flow_is_fatal() {
    let mut net = chain_network(1.0, DurationModel::Instantaneous);
    // coil 回流到 mill 形成物料环
    let mill = match net.node("mill").unwrap() {
        ProcessNode::Step(step) => {
            let mut step = step.clone();
            step.inputs.push(InputPort {
                commodity: "coil".to_string(),
                factor: 0.1,
                unit: Unit::Tonne,
            });
            step
        }
        _ => unreachable!(),
    };
    net.add_node(ProcessNode::Step(mill));
    net.add_stream(fast_stream("s_loop", "mill", "mill", "coil", None));

    let sched = scheduler(net);
    let err = sched
        .run("P1", order("customer", "coil", 10.0, ts(12)))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Topology(_)));
}

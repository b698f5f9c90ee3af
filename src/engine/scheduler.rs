// ==========================================
// 企业能源负荷仿真系统 - 倒排调度引擎
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 4.3 倒排调度协议
// 职责: 自订单向上游逐级协商,显式工作队列驱动 (禁止调用栈递归)
// 红线: 最早截止优先,同刻按入队先后 (FIFO); 同输入同输出逐字节可复现
// 红线: 致命错误整体回滚,不暴露半成品计划
// ==========================================

use crate::config::SimulationConfig;
use crate::domain::network::{ProcessNetwork, ProcessNode, TopologyInfo};
use crate::domain::plan::{
    ActivityEntry, ConsumedInput, FrozenPlan, OrderOutcome, ProductionPlan, StreamEntry,
};
use crate::domain::quantity::Quantity;
use crate::domain::types::{OrderStatus, StepPhase};
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::step_machine::{InputDemand, StepCalendar, StepMachine, StepTask};
use crate::engine::stream_model::{PendingStream, StreamResolution};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 相对数值容差
const REL_EPS: f64 = 1e-9;

// ==========================================
// Order - 终端订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub sink: String,            // 汇节点
    pub commodity: String,       // 品类
    pub quantity: Quantity,      // 需求量
    pub deadline: NaiveDateTime, // 交付期限
}

// ==========================================
// 请求台账 (arena)
// ==========================================

/// 单条上游请求的生命周期记录
struct RequestRecord {
    stream_id: String,
    quantity: Quantity,
    deadline: NaiveDateTime,
    parent: Option<usize>,
    order_idx: usize,
    depth: usize,
    cancelled: bool,
    resolution: Option<NodeResolution>,
}

/// 请求在被寻址节点处的解析状态
enum NodeResolution {
    /// 源节点即时解析
    Source { entry: StreamEntry },
    /// 工序任务在途 (InputsPending / Blocked)
    Step { task: StepTask },
    /// 工序任务完成, 活动与输出流条目待组装
    StepDone {
        activity: ActivityEntry,
        entry: StreamEntry,
    },
    /// 请求在寻址时即受阻
    Blocked { reason: String },
}

/// 子请求向父任务回传的信号
enum ChildSignal {
    Delivered {
        quantity: Quantity,
        available_from: NaiveDateTime,
    },
    Blocked {
        reason: String,
    },
}

/// 单次 run 的全部可变状态 (run 间互不共享)
struct RunState {
    requests: Vec<RequestRecord>,
    queue: BinaryHeap<Reverse<(NaiveDateTime, u64)>>,
    calendars: BTreeMap<String, StepCalendar>,
    pop_order: Vec<usize>,
    outcomes: Vec<Option<OrderOutcome>>,
}

// ==========================================
// BackwardScheduler - 倒排调度器
// ==========================================
pub struct BackwardScheduler {
    network: Arc<ProcessNetwork>,
    config: Arc<SimulationConfig>,
}

impl BackwardScheduler {
    /// 创建调度器实例
    ///
    /// # 参数
    /// - network: 生产网络 (run 期间只读,可跨 run 复用)
    /// - config: 仿真配置 (启动时构建,不可变)
    pub fn new(network: Arc<ProcessNetwork>, config: Arc<SimulationConfig>) -> Self {
        Self { network, config }
    }

    /// 单订单入口
    pub fn run(&self, plan_id: &str, order: Order) -> ScheduleResult<FrozenPlan> {
        self.run_all(plan_id, std::slice::from_ref(&order))
    }

    /// 多订单入口 (共享工序产能按最早截止优先)
    #[instrument(skip(self, orders), fields(plan_id = %plan_id, order_count = orders.len()))]
    pub fn run_all(&self, plan_id: &str, orders: &[Order]) -> ScheduleResult<FrozenPlan> {
        let topo = self.network.validate()?;
        info!(max_depth = topo.max_depth, "拓扑校验通过, 开始倒排仿真");

        let machine = StepMachine::new();
        let mut state = RunState {
            requests: Vec::new(),
            queue: BinaryHeap::new(),
            calendars: BTreeMap::new(),
            pop_order: Vec::new(),
            outcomes: vec![None; orders.len()],
        };

        // ==========================================
        // 播种: 每张订单落在汇节点的唯一上游流
        // ==========================================
        for (idx, order) in orders.iter().enumerate() {
            self.validate_order(order)?;
            let stream = self.network.sink_inbound(&order.sink).ok_or_else(|| {
                ScheduleError::NetworkUnreachable {
                    sink: order.sink.clone(),
                    detail: "汇节点无上游流".to_string(),
                }
            })?;
            let seq = state.requests.len();
            state.requests.push(RequestRecord {
                stream_id: stream.stream_id.clone(),
                quantity: order.quantity,
                deadline: order.deadline,
                parent: None,
                order_idx: idx,
                depth: 1,
                cancelled: false,
                resolution: None,
            });
            state.queue.push(Reverse((order.deadline, seq as u64)));
        }

        // ==========================================
        // 主循环: 最早截止优先弹出,同刻按入队序
        // ==========================================
        while let Some(Reverse((_, seq))) = state.queue.pop() {
            let seq = seq as usize;
            if state.requests[seq].cancelled {
                continue;
            }
            self.process_request(&machine, &mut state, seq, &topo, orders)?;
        }

        // ==========================================
        // 原子组装: 至此无致命错误,按解析序落盘
        // ==========================================
        let mut plan = ProductionPlan::new(plan_id);
        let mut entry_seq = 1i64;
        for &seq in &state.pop_order {
            if !branch_alive(&state, seq) {
                continue;
            }
            match &state.requests[seq].resolution {
                Some(NodeResolution::Source { entry }) => {
                    let mut entry = entry.clone();
                    entry.entry_seq = entry_seq;
                    entry_seq += 1;
                    plan.append_stream(entry);
                }
                Some(NodeResolution::StepDone { activity, entry }) => {
                    let mut activity = activity.clone();
                    activity.entry_seq = entry_seq;
                    entry_seq += 1;
                    plan.append_activity(activity);
                    let mut entry = entry.clone();
                    entry.entry_seq = entry_seq;
                    entry_seq += 1;
                    plan.append_stream(entry);
                }
                _ => {}
            }
        }
        for (idx, outcome) in state.outcomes.into_iter().enumerate() {
            plan.append_outcome(outcome.unwrap_or_else(|| OrderOutcome {
                order_seq: idx as i64,
                sink: orders[idx].sink.clone(),
                commodity: orders[idx].commodity.clone(),
                requested: orders[idx].quantity,
                delivered: Quantity::zero(orders[idx].quantity.unit),
                deadline: orders[idx].deadline,
                status: OrderStatus::Blocked,
                reason: Some("请求链未完成解析".to_string()),
            }));
        }

        info!(
            streams = plan.streams().len(),
            activities = plan.activities().len(),
            "仿真完成"
        );
        Ok(plan.finalize())
    }

    /// 订单静态校验
    fn validate_order(&self, order: &Order) -> ScheduleResult<()> {
        let node = self
            .network
            .node(&order.sink)
            .ok_or_else(|| ScheduleError::InvalidOrder {
                sink: order.sink.clone(),
                detail: "节点不存在".to_string(),
            })?;
        match node {
            ProcessNode::Sink { commodity, .. } if *commodity == order.commodity => {}
            ProcessNode::Sink { .. } => {
                return Err(ScheduleError::InvalidOrder {
                    sink: order.sink.clone(),
                    detail: format!("汇节点不消耗品类 {}", order.commodity),
                });
            }
            _ => {
                return Err(ScheduleError::InvalidOrder {
                    sink: order.sink.clone(),
                    detail: "订单必须落在汇节点".to_string(),
                });
            }
        }
        if !order.quantity.is_positive() {
            return Err(ScheduleError::InvalidOrder {
                sink: order.sink.clone(),
                detail: format!("订单量非正: {}", order.quantity),
            });
        }
        Ok(())
    }

    /// 处理一条弹出的请求: 寻址上游节点并解析或展开
    fn process_request(
        &self,
        machine: &StepMachine,
        state: &mut RunState,
        seq: usize,
        topo: &TopologyInfo,
        orders: &[Order],
    ) -> ScheduleResult<()> {
        let (stream_id, quantity, deadline, depth, order_idx) = {
            let rec = &state.requests[seq];
            (
                rec.stream_id.clone(),
                rec.quantity,
                rec.deadline,
                rec.depth,
                rec.order_idx,
            )
        };

        // 深度防御: 正常拓扑不会触发
        if depth > topo.max_depth + self.config.depth_margin {
            return Err(ScheduleError::NetworkUnreachable {
                sink: orders[order_idx].sink.clone(),
                detail: format!("请求深度 {} 超出拓扑上界 {}", depth, topo.max_depth),
            });
        }

        let spec = self.network.stream(&stream_id).ok_or_else(|| {
            ScheduleError::NetworkUnreachable {
                sink: orders[order_idx].sink.clone(),
                detail: format!("流不存在: {}", stream_id),
            }
        })?;
        let pending = PendingStream::request(
            spec,
            &quantity,
            deadline,
            self.config.default_shortfall_tolerance,
        )?;
        state.pop_order.push(seq);

        let from = self.network.node(&spec.from_node).ok_or_else(|| {
            ScheduleError::NetworkUnreachable {
                sink: orders[order_idx].sink.clone(),
                detail: format!("上游节点不存在: {}", spec.from_node),
            }
        })?;

        match from {
            // ===== 源节点: 无上游约束,即时足量解析 =====
            ProcessNode::Source { .. } => {
                let due = pending.production_due();
                match pending.resolve(pending.planned, due, 0)? {
                    StreamResolution::Resolved(entry) => {
                        let delivered = entry.delivered;
                        let available_from = entry.transfer_end;
                        debug!(stream = %stream_id, %delivered, "源节点解析");
                        state.requests[seq].resolution = Some(NodeResolution::Source { entry });
                        self.propagate(
                            state,
                            seq,
                            ChildSignal::Delivered {
                                quantity: delivered,
                                available_from,
                            },
                            orders,
                        )?;
                    }
                    StreamResolution::Blocked { reason, .. } => {
                        state.requests[seq].resolution = Some(NodeResolution::Blocked {
                            reason: reason.clone(),
                        });
                        self.propagate(state, seq, ChildSignal::Blocked { reason }, orders)?;
                    }
                }
            }

            // ===== 汇节点不能作为上游 (validate 已拦截,防御) =====
            ProcessNode::Sink { name, .. } => {
                return Err(ScheduleError::NetworkUnreachable {
                    sink: name.clone(),
                    detail: "汇节点不能作为上游".to_string(),
                });
            }

            // ===== 工序节点: 预定产能并展开上游请求 =====
            ProcessNode::Step(step) => {
                let due_end = pending.production_due();
                let planned_act = {
                    let calendar = state
                        .calendars
                        .entry(step.name.clone())
                        .or_insert_with(StepCalendar::new);
                    machine.plan_activity(
                        step,
                        &spec.commodity,
                        &pending.planned,
                        due_end,
                        calendar,
                        self.config.horizon_start,
                    )?
                };

                let Some(act) = planned_act else {
                    let reason = format!("工序 {} 在 {} 前无可用产能", step.name, due_end);
                    state.requests[seq].resolution = Some(NodeResolution::Blocked {
                        reason: reason.clone(),
                    });
                    self.propagate(state, seq, ChildSignal::Blocked { reason }, orders)?;
                    return Ok(());
                };

                // 产能截断的早期容差核查 (避免展开注定失败的子树)
                if act.truncated {
                    let frac =
                        1.0 - act.feasible.base_magnitude() / pending.requested.base_magnitude();
                    if frac > pending.tolerance + REL_EPS {
                        if let Some(cal) = state.calendars.get_mut(&step.name) {
                            cal.release(act.start, act.end);
                        }
                        let reason = format!(
                            "工序 {} 产能缺口 {:.1}% 超出容差 {:.1}%",
                            step.name,
                            frac * 100.0,
                            pending.tolerance * 100.0
                        );
                        state.requests[seq].resolution = Some(NodeResolution::Blocked {
                            reason: reason.clone(),
                        });
                        self.propagate(state, seq, ChildSignal::Blocked { reason }, orders)?;
                        return Ok(());
                    }
                }

                // Requested → InputsPending: 按转换规则展开各输入口
                let requirements = machine.required_inputs(step, &act.feasible)?;
                let mut inputs = Vec::with_capacity(requirements.len());
                for req in requirements {
                    let input_stream = self
                        .network
                        .step_input_stream(&step.name, &req.commodity)
                        .ok_or_else(|| ScheduleError::NetworkUnreachable {
                            sink: orders[order_idx].sink.clone(),
                            detail: format!(
                                "工序 {} 输入口 {} 无上游流",
                                step.name, req.commodity
                            ),
                        })?;
                    let child_seq = state.requests.len();
                    state.requests.push(RequestRecord {
                        stream_id: input_stream.stream_id.clone(),
                        quantity: req.required,
                        deadline: act.start,
                        parent: Some(seq),
                        order_idx,
                        depth: depth + 1,
                        cancelled: false,
                        resolution: None,
                    });
                    state.queue.push(Reverse((act.start, child_seq as u64)));
                    inputs.push(InputDemand {
                        stream_id: input_stream.stream_id.clone(),
                        commodity: req.commodity,
                        required: req.required,
                        per_output_base: req.per_output_base,
                        child_req: child_seq as u64,
                        delivered: None,
                        available_from: None,
                    });
                }

                debug!(
                    step = %step.name,
                    feasible = %act.feasible,
                    start = %act.start,
                    end = %act.end,
                    input_count = inputs.len(),
                    "工序任务展开"
                );

                let unresolved = inputs.len();
                state.requests[seq].resolution = Some(NodeResolution::Step {
                    task: StepTask {
                        step_name: step.name.clone(),
                        phase: StepPhase::InputsPending,
                        pending_out: pending,
                        feasible: act.feasible,
                        interval: (act.start, act.end),
                        inputs,
                        unresolved,
                        truncated: act.truncated,
                    },
                });
            }
        }
        Ok(())
    }

    /// 解析结果沿父链向下游回传 (迭代,不用调用栈递归)
    fn propagate(
        &self,
        state: &mut RunState,
        mut child: usize,
        mut signal: ChildSignal,
        orders: &[Order],
    ) -> ScheduleResult<()> {
        loop {
            let Some(pseq) = state.requests[child].parent else {
                // 顶层请求: 记录订单结局
                let order_idx = state.requests[child].order_idx;
                let order = &orders[order_idx];
                let outcome = match signal {
                    ChildSignal::Delivered { quantity, .. } => {
                        let fulfilled = quantity.to(order.quantity.unit)?.base_magnitude()
                            >= order.quantity.base_magnitude() * (1.0 - REL_EPS);
                        let deficit = order.quantity.checked_sub(&quantity.to(order.quantity.unit)?)?;
                        OrderOutcome {
                            order_seq: order_idx as i64,
                            sink: order.sink.clone(),
                            commodity: order.commodity.clone(),
                            requested: order.quantity,
                            delivered: quantity,
                            deadline: order.deadline,
                            status: if fulfilled {
                                OrderStatus::Fulfilled
                            } else {
                                OrderStatus::Shortfall
                            },
                            reason: (!fulfilled).then(|| format!("容差内缺口: {}", deficit)),
                        }
                    }
                    ChildSignal::Blocked { reason } => OrderOutcome {
                        order_seq: order_idx as i64,
                        sink: order.sink.clone(),
                        commodity: order.commodity.clone(),
                        requested: order.quantity,
                        delivered: Quantity::zero(order.quantity.unit),
                        deadline: order.deadline,
                        status: OrderStatus::Blocked,
                        reason: Some(reason),
                    },
                };
                state.outcomes[order_idx] = Some(outcome);
                return Ok(());
            };

            // 取出父任务,避免台账别名借用
            let mut resolution = state.requests[pseq].resolution.take();
            let Some(NodeResolution::Step { task }) = resolution.as_mut() else {
                state.requests[pseq].resolution = resolution;
                return Ok(());
            };
            if task.phase == StepPhase::Blocked || task.phase == StepPhase::Completed {
                state.requests[pseq].resolution = resolution;
                return Ok(());
            }

            match signal {
                // ===== 上游受阻: 父任务受阻并继续向下游传播 =====
                ChildSignal::Blocked { reason } => {
                    task.phase = StepPhase::Blocked;
                    let (b_start, b_end) = task.interval;
                    let step_name = task.step_name.clone();
                    let pending_children: Vec<usize> = task
                        .inputs
                        .iter()
                        .filter(|d| d.delivered.is_none() && d.child_req as usize != child)
                        .map(|d| d.child_req as usize)
                        .collect();
                    state.requests[pseq].resolution = resolution;
                    if let Some(cal) = state.calendars.get_mut(&step_name) {
                        cal.release(b_start, b_end);
                    }
                    cancel_subtrees(state, &pending_children);
                    debug!(step = %step_name, %reason, "工序任务受阻");
                    signal = ChildSignal::Blocked {
                        reason: format!("工序 {} 上游受阻: {}", step_name, reason),
                    };
                    child = pseq;
                }

                // ===== 上游交付: 记录输入,就绪则进入 Producing =====
                ChildSignal::Delivered {
                    quantity,
                    available_from,
                } => {
                    task.record_input(child as u64, quantity, available_from);
                    if task.phase != StepPhase::Producing {
                        state.requests[pseq].resolution = resolution;
                        return Ok(());
                    }

                    // Producing: 最终产出受各输入口可支撑量封顶
                    let final_output = task.final_output();
                    match task.pending_out.resolve(final_output, task.interval.1, 0)? {
                        StreamResolution::Resolved(entry) => {
                            let ratio = if task.feasible.base_magnitude() > 0.0 {
                                final_output.base_magnitude() / task.feasible.base_magnitude()
                            } else {
                                0.0
                            };
                            let consumed = task
                                .inputs
                                .iter()
                                .map(|d| ConsumedInput {
                                    commodity: d.commodity.clone(),
                                    quantity: d.required.scale(ratio),
                                })
                                .collect();
                            let activity = ActivityEntry {
                                entry_seq: 0,
                                step_name: task.step_name.clone(),
                                start_time: task.interval.0,
                                end_time: task.interval.1,
                                commodity: task.pending_out.commodity.clone(),
                                produced: final_output,
                                consumed,
                            };
                            task.phase = StepPhase::Completed;
                            let delivered = entry.delivered;
                            let available_from = entry.transfer_end;
                            debug!(
                                step = %task.step_name,
                                produced = %final_output,
                                "工序任务完成"
                            );
                            state.requests[pseq].resolution =
                                Some(NodeResolution::StepDone { activity, entry });
                            signal = ChildSignal::Delivered {
                                quantity: delivered,
                                available_from,
                            };
                            child = pseq;
                        }
                        StreamResolution::Blocked { reason, .. } => {
                            task.phase = StepPhase::Blocked;
                            let (b_start, b_end) = task.interval;
                            let step_name = task.step_name.clone();
                            state.requests[pseq].resolution = resolution;
                            if let Some(cal) = state.calendars.get_mut(&step_name) {
                                cal.release(b_start, b_end);
                            }
                            debug!(step = %step_name, %reason, "产出缺口超容差");
                            signal = ChildSignal::Blocked { reason };
                            child = pseq;
                        }
                    }
                }
            }
        }
    }
}

/// 该请求及其全部祖先是否都存活且完成
fn branch_alive(state: &RunState, mut seq: usize) -> bool {
    loop {
        let rec = &state.requests[seq];
        if rec.cancelled {
            return false;
        }
        match &rec.resolution {
            None | Some(NodeResolution::Blocked { .. }) => return false,
            Some(NodeResolution::Step { task }) if task.phase != StepPhase::Completed => {
                return false
            }
            _ => {}
        }
        match rec.parent {
            Some(parent) => seq = parent,
            None => return true,
        }
    }
}

/// 取消受阻父任务下仍未解析的子树
fn cancel_subtrees(state: &mut RunState, roots: &[usize]) {
    let mut stack: Vec<usize> = roots.to_vec();
    while let Some(seq) = stack.pop() {
        if state.requests[seq].cancelled {
            continue;
        }
        state.requests[seq].cancelled = true;
        if let Some(NodeResolution::Step { task }) = &state.requests[seq].resolution {
            stack.extend(
                task.inputs
                    .iter()
                    .filter(|d| d.delivered.is_none())
                    .map(|d| d.child_req as usize),
            );
        }
    }
}

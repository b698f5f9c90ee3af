// ==========================================
// 企业能源负荷仿真系统 - 生产网络拓扑
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 3.4 Process Network
// 红线: 物料流向必须无环; 请求协议中的"环"是协商往返,不是图环
// 红线: 拓扑构建完成后在单次仿真内只读
// ==========================================

use crate::domain::quantity::Quantity;
use crate::domain::types::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ==========================================
// NetworkError - 拓扑校验错误
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("节点不存在: {0}")]
    UnknownNode(String),

    #[error("流 {stream_id} 重复定义")]
    DuplicateStream { stream_id: String },

    #[error("流 {stream_id} 品类不匹配: 节点 {node} 不处理品类 {commodity}")]
    CommodityMismatch {
        stream_id: String,
        node: String,
        commodity: String,
    },

    #[error("源节点 {0} 不允许有上游流")]
    SourceHasInbound(String),

    #[error("汇节点 {0} 不允许有下游流")]
    SinkHasOutbound(String),

    #[error("汇节点 {sink} 必须恰好有一条上游流, 实际 {count} 条")]
    SinkInboundCount { sink: String, count: usize },

    #[error("工序 {step} 的输入口 {commodity} 缺少上游流")]
    MissingInputStream { step: String, commodity: String },

    #[error("工序 {step} 的输入口 {commodity} 存在多条上游流")]
    AmbiguousInputStream { step: String, commodity: String },

    #[error("工序 {0} 必须至少定义一个输入口和一个输出口")]
    EmptyPorts(String),

    #[error("物料流向存在环路, 涉及节点 {0}")]
    CycleDetected(String),
}

// ==========================================
// StreamKind - 流的运输形态
// ==========================================
// 连续流: 速率 × 时窗; 批次流: 整批 × 离散时点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamKind {
    Continuous {
        max_rate: Quantity, // 最大传输速率 (质量流量或功率)
    },
    Batch {
        batch_size: Quantity, // 固定批量
    },
}

// ==========================================
// StreamSpec - 流定义
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub stream_id: String,               // 流ID
    pub from_node: String,               // 上游节点
    pub to_node: String,                 // 下游节点
    pub commodity: String,               // 承载品类
    pub kind: StreamKind,                // 运输形态
    pub shortfall_tolerance: Option<f64>, // 缺口容差 [0,1], None 时取系统默认
}

// ==========================================
// InputPort / OutputPort - 工序端口
// ==========================================
// 转换规则: 每产出 1 基准单位输出, 消耗 factor 个 unit 单位的该输入品类
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPort {
    pub commodity: String, // 输入品类
    pub factor: f64,       // 单位产出的消耗系数
    pub unit: Unit,        // 消耗量单位
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPort {
    pub commodity: String, // 输出品类
}

// ==========================================
// DurationModel - 工序时长/产能模型
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DurationModel {
    Instantaneous, // 瞬时转换
    Fixed {
        minutes: i64, // 固定加工时长
    },
    Throughput {
        rate: Quantity, // 最大转换速率 (质量流量或功率)
    },
}

// ==========================================
// ProcessStep - 工序节点
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    pub name: String,                // 工序名称
    pub inputs: Vec<InputPort>,      // 输入口 (有序)
    pub outputs: Vec<OutputPort>,    // 输出口 (有序)
    pub duration: DurationModel,     // 时长/产能模型
    pub rated_power_kw: Option<f64>, // 运行额定电功率 (负荷曲线用)
}

impl ProcessStep {
    /// 按品类查找输入口
    pub fn input_port(&self, commodity: &str) -> Option<&InputPort> {
        self.inputs.iter().find(|p| p.commodity == commodity)
    }

    /// 按品类查找输出口
    pub fn output_port(&self, commodity: &str) -> Option<&OutputPort> {
        self.outputs.iter().find(|p| p.commodity == commodity)
    }
}

// ==========================================
// ProcessNode - 网络节点 (封闭变体)
// ==========================================
// 红线: 节点种类封闭枚举,调度器必须穷尽匹配,禁止开放继承
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessNode {
    Source {
        name: String,      // 节点名称
        commodity: String, // 供给品类 (无上游约束)
    },
    Sink {
        name: String,      // 节点名称
        commodity: String, // 消耗品类 (订单起点)
    },
    Step(ProcessStep),
}

impl ProcessNode {
    /// 节点名称
    pub fn name(&self) -> &str {
        match self {
            ProcessNode::Source { name, .. } => name,
            ProcessNode::Sink { name, .. } => name,
            ProcessNode::Step(step) => &step.name,
        }
    }
}

// ==========================================
// TopologyInfo - 校验产物
// ==========================================
// depths: 节点到最远源头的跳数,作为调度递归深度的防御上界
#[derive(Debug, Clone)]
pub struct TopologyInfo {
    pub depths: BTreeMap<String, usize>,
    pub max_depth: usize,
}

// ==========================================
// ProcessNetwork - 生产网络
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessNetwork {
    nodes: BTreeMap<String, ProcessNode>,
    streams: Vec<StreamSpec>,
}

impl ProcessNetwork {
    /// 构造空网络
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加节点 (同名覆盖)
    pub fn add_node(&mut self, node: ProcessNode) {
        self.nodes.insert(node.name().to_string(), node);
    }

    /// 添加流
    pub fn add_stream(&mut self, stream: StreamSpec) {
        self.streams.push(stream);
    }

    /// 按名称查找节点
    pub fn node(&self, name: &str) -> Option<&ProcessNode> {
        self.nodes.get(name)
    }

    /// 按ID查找流
    pub fn stream(&self, stream_id: &str) -> Option<&StreamSpec> {
        self.streams.iter().find(|s| s.stream_id == stream_id)
    }

    /// 只读遍历节点 (拓扑/报表协作方接口)
    pub fn nodes(&self) -> impl Iterator<Item = &ProcessNode> {
        self.nodes.values()
    }

    /// 只读遍历流
    pub fn streams(&self) -> impl Iterator<Item = &StreamSpec> {
        self.streams.iter()
    }

    /// 节点的上游流 (按定义顺序)
    pub fn inbound_streams(&self, node: &str) -> Vec<&StreamSpec> {
        self.streams.iter().filter(|s| s.to_node == node).collect()
    }

    /// 节点的下游流
    pub fn outbound_streams(&self, node: &str) -> Vec<&StreamSpec> {
        self.streams.iter().filter(|s| s.from_node == node).collect()
    }

    /// 汇节点的唯一上游流
    pub fn sink_inbound(&self, sink: &str) -> Option<&StreamSpec> {
        let inbound = self.inbound_streams(sink);
        match inbound.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// 工序某输入口的上游流
    pub fn step_input_stream(&self, step: &str, commodity: &str) -> Option<&StreamSpec> {
        self.streams
            .iter()
            .find(|s| s.to_node == step && s.commodity == commodity)
    }

    // ==========================================
    // 拓扑校验
    // ==========================================

    /// 校验拓扑并计算深度上界
    ///
    /// 校验内容:
    /// 1) 流端点存在且品类两端兼容
    /// 2) 源无上游, 汇恰一条上游且无下游
    /// 3) 工序每个输入口恰有一条上游流
    /// 4) 物料流向无环
    pub fn validate(&self) -> Result<TopologyInfo, NetworkError> {
        // 流ID唯一性
        for (i, s) in self.streams.iter().enumerate() {
            if self.streams[..i].iter().any(|p| p.stream_id == s.stream_id) {
                return Err(NetworkError::DuplicateStream {
                    stream_id: s.stream_id.clone(),
                });
            }
        }

        // 端点与品类
        for s in &self.streams {
            let from = self
                .nodes
                .get(&s.from_node)
                .ok_or_else(|| NetworkError::UnknownNode(s.from_node.clone()))?;
            let to = self
                .nodes
                .get(&s.to_node)
                .ok_or_else(|| NetworkError::UnknownNode(s.to_node.clone()))?;

            match from {
                ProcessNode::Source { commodity, .. } if commodity != &s.commodity => {
                    return Err(NetworkError::CommodityMismatch {
                        stream_id: s.stream_id.clone(),
                        node: s.from_node.clone(),
                        commodity: s.commodity.clone(),
                    });
                }
                ProcessNode::Sink { name, .. } => {
                    return Err(NetworkError::SinkHasOutbound(name.clone()));
                }
                ProcessNode::Step(step) if step.output_port(&s.commodity).is_none() => {
                    return Err(NetworkError::CommodityMismatch {
                        stream_id: s.stream_id.clone(),
                        node: s.from_node.clone(),
                        commodity: s.commodity.clone(),
                    });
                }
                _ => {}
            }

            match to {
                ProcessNode::Source { name, .. } => {
                    return Err(NetworkError::SourceHasInbound(name.clone()));
                }
                ProcessNode::Sink { commodity, .. } if commodity != &s.commodity => {
                    return Err(NetworkError::CommodityMismatch {
                        stream_id: s.stream_id.clone(),
                        node: s.to_node.clone(),
                        commodity: s.commodity.clone(),
                    });
                }
                ProcessNode::Step(step) if step.input_port(&s.commodity).is_none() => {
                    return Err(NetworkError::CommodityMismatch {
                        stream_id: s.stream_id.clone(),
                        node: s.to_node.clone(),
                        commodity: s.commodity.clone(),
                    });
                }
                _ => {}
            }
        }

        // 节点度约束与输入口覆盖
        for node in self.nodes.values() {
            match node {
                ProcessNode::Source { name, .. } => {
                    if !self.inbound_streams(name).is_empty() {
                        return Err(NetworkError::SourceHasInbound(name.clone()));
                    }
                }
                ProcessNode::Sink { name, .. } => {
                    let count = self.inbound_streams(name).len();
                    if count != 1 {
                        return Err(NetworkError::SinkInboundCount {
                            sink: name.clone(),
                            count,
                        });
                    }
                }
                ProcessNode::Step(step) => {
                    if step.inputs.is_empty() || step.outputs.is_empty() {
                        return Err(NetworkError::EmptyPorts(step.name.clone()));
                    }
                    for port in &step.inputs {
                        let feeding: Vec<_> = self
                            .streams
                            .iter()
                            .filter(|s| s.to_node == step.name && s.commodity == port.commodity)
                            .collect();
                        match feeding.len() {
                            0 => {
                                return Err(NetworkError::MissingInputStream {
                                    step: step.name.clone(),
                                    commodity: port.commodity.clone(),
                                })
                            }
                            1 => {}
                            _ => {
                                return Err(NetworkError::AmbiguousInputStream {
                                    step: step.name.clone(),
                                    commodity: port.commodity.clone(),
                                })
                            }
                        }
                    }
                }
            }
        }

        // 物料流向无环 + 深度计算 (沿上游边回溯到源)
        let mut depths: BTreeMap<String, usize> = BTreeMap::new();
        let mut visiting: Vec<String> = Vec::new();
        for name in self.nodes.keys() {
            self.depth_of(name, &mut depths, &mut visiting)?;
        }
        let max_depth = depths.values().copied().max().unwrap_or(0);

        Ok(TopologyInfo { depths, max_depth })
    }

    /// 递归计算节点深度 (带环检测)
    fn depth_of(
        &self,
        name: &str,
        depths: &mut BTreeMap<String, usize>,
        visiting: &mut Vec<String>,
    ) -> Result<usize, NetworkError> {
        if let Some(d) = depths.get(name) {
            return Ok(*d);
        }
        if visiting.iter().any(|n| n == name) {
            return Err(NetworkError::CycleDetected(name.to_string()));
        }
        visiting.push(name.to_string());

        let depth = match self.nodes.get(name) {
            Some(ProcessNode::Source { .. }) | None => 0,
            _ => {
                let mut max_upstream = 0usize;
                for s in self.inbound_streams(name) {
                    let d = self.depth_of(&s.from_node, depths, visiting)?;
                    max_upstream = max_upstream.max(d + 1);
                }
                max_upstream
            }
        };

        visiting.pop();
        depths.insert(name.to_string(), depth);
        Ok(depth)
    }
}

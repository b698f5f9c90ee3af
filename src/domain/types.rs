// ==========================================
// 企业能源负荷仿真系统 - 领域类型定义
// ==========================================
// 依据: Plant_Energy_Master_Spec.md - PART A 数据红线
// 依据: Sim_Engine_Specs_v0.2.md - 0.3 量纲与单位体系
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 量纲 (Dimension)
// ==========================================
// 红线: 跨量纲运算必须显式失败,不允许静默换算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dimension {
    Mass,     // 质量
    Energy,   // 能量
    Power,    // 功率
    Time,     // 时间
    MassFlow, // 质量流量
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Mass => write!(f, "MASS"),
            Dimension::Energy => write!(f, "ENERGY"),
            Dimension::Power => write!(f, "POWER"),
            Dimension::Time => write!(f, "TIME"),
            Dimension::MassFlow => write!(f, "MASS_FLOW"),
        }
    }
}

// ==========================================
// 单位 (Unit)
// ==========================================
// 基准单位: 质量=t, 能量=kWh, 功率=kW, 时间=h, 质量流量=t/h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    Kilogram,        // kg
    Tonne,           // t
    KilowattHour,    // kWh
    Megajoule,       // MJ
    Kilowatt,        // kW
    Megawatt,        // MW
    Hour,            // h
    Minute,          // min
    TonnePerHour,    // t/h
    KilogramPerHour, // kg/h
}

impl Unit {
    /// 单位所属量纲
    pub fn dimension(&self) -> Dimension {
        match self {
            Unit::Kilogram | Unit::Tonne => Dimension::Mass,
            Unit::KilowattHour | Unit::Megajoule => Dimension::Energy,
            Unit::Kilowatt | Unit::Megawatt => Dimension::Power,
            Unit::Hour | Unit::Minute => Dimension::Time,
            Unit::TonnePerHour | Unit::KilogramPerHour => Dimension::MassFlow,
        }
    }

    /// 换算到量纲基准单位的系数
    pub fn base_factor(&self) -> f64 {
        match self {
            Unit::Kilogram => 0.001,
            Unit::Tonne => 1.0,
            Unit::KilowattHour => 1.0,
            Unit::Megajoule => 1.0 / 3.6,
            Unit::Kilowatt => 1.0,
            Unit::Megawatt => 1000.0,
            Unit::Hour => 1.0,
            Unit::Minute => 1.0 / 60.0,
            Unit::TonnePerHour => 1.0,
            Unit::KilogramPerHour => 0.001,
        }
    }

    /// 量纲的基准单位
    pub fn base_unit(dimension: Dimension) -> Unit {
        match dimension {
            Dimension::Mass => Unit::Tonne,
            Dimension::Energy => Unit::KilowattHour,
            Dimension::Power => Unit::Kilowatt,
            Dimension::Time => Unit::Hour,
            Dimension::MassFlow => Unit::TonnePerHour,
        }
    }

    /// 从字符串解析单位
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "KILOGRAM" | "KG" => Some(Unit::Kilogram),
            "TONNE" | "T" => Some(Unit::Tonne),
            "KILOWATT_HOUR" | "KWH" => Some(Unit::KilowattHour),
            "MEGAJOULE" | "MJ" => Some(Unit::Megajoule),
            "KILOWATT" | "KW" => Some(Unit::Kilowatt),
            "MEGAWATT" | "MW" => Some(Unit::Megawatt),
            "HOUR" | "H" => Some(Unit::Hour),
            "MINUTE" | "MIN" => Some(Unit::Minute),
            "TONNE_PER_HOUR" | "T/H" => Some(Unit::TonnePerHour),
            "KILOGRAM_PER_HOUR" | "KG/H" => Some(Unit::KilogramPerHour),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Unit::Kilogram => "KILOGRAM",
            Unit::Tonne => "TONNE",
            Unit::KilowattHour => "KILOWATT_HOUR",
            Unit::Megajoule => "MEGAJOULE",
            Unit::Kilowatt => "KILOWATT",
            Unit::Megawatt => "MEGAWATT",
            Unit::Hour => "HOUR",
            Unit::Minute => "MINUTE",
            Unit::TonnePerHour => "TONNE_PER_HOUR",
            Unit::KilogramPerHour => "KILOGRAM_PER_HOUR",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Kilogram => write!(f, "kg"),
            Unit::Tonne => write!(f, "t"),
            Unit::KilowattHour => write!(f, "kWh"),
            Unit::Megajoule => write!(f, "MJ"),
            Unit::Kilowatt => write!(f, "kW"),
            Unit::Megawatt => write!(f, "MW"),
            Unit::Hour => write!(f, "h"),
            Unit::Minute => write!(f, "min"),
            Unit::TonnePerHour => write!(f, "t/h"),
            Unit::KilogramPerHour => write!(f, "kg/h"),
        }
    }
}

// ==========================================
// 工序状态机阶段 (Step Phase)
// ==========================================
// 依据: Sim_Engine_Specs 4.2 工序状态机
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepPhase {
    Idle,          // 空闲
    Requested,     // 已接收下游请求
    InputsPending, // 等待上游流解析
    Producing,     // 产出区间已确定
    Completed,     // 本次请求完成
    Blocked,       // 上游缺口不可恢复
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepPhase::Idle => write!(f, "IDLE"),
            StepPhase::Requested => write!(f, "REQUESTED"),
            StepPhase::InputsPending => write!(f, "INPUTS_PENDING"),
            StepPhase::Producing => write!(f, "PRODUCING"),
            StepPhase::Completed => write!(f, "COMPLETED"),
            StepPhase::Blocked => write!(f, "BLOCKED"),
        }
    }
}

// ==========================================
// 订单结局 (Order Status)
// ==========================================
// 顺序: Fulfilled < Shortfall < Blocked (严重程度)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Fulfilled, // 足量按期
    Shortfall, // 容差内缺口
    Blocked,   // 缺口超容差,订单受阻
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Fulfilled => write!(f, "FULFILLED"),
            OrderStatus::Shortfall => write!(f, "SHORTFALL"),
            OrderStatus::Blocked => write!(f, "BLOCKED"),
        }
    }
}

impl OrderStatus {
    /// 从字符串解析订单结局
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "FULFILLED" => OrderStatus::Fulfilled,
            "SHORTFALL" => OrderStatus::Shortfall,
            "BLOCKED" => OrderStatus::Blocked,
            _ => OrderStatus::Blocked, // 未知状态按最严重处理
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::Shortfall => "SHORTFALL",
            OrderStatus::Blocked => "BLOCKED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_dimension_mapping() {
        assert_eq!(Unit::Kilogram.dimension(), Dimension::Mass);
        assert_eq!(Unit::Megajoule.dimension(), Dimension::Energy);
        assert_eq!(Unit::Megawatt.dimension(), Dimension::Power);
        assert_eq!(Unit::Minute.dimension(), Dimension::Time);
        assert_eq!(Unit::KilogramPerHour.dimension(), Dimension::MassFlow);
    }

    #[test]
    fn test_unit_db_str_roundtrip() {
        let units = [
            Unit::Kilogram,
            Unit::Tonne,
            Unit::KilowattHour,
            Unit::Megajoule,
            Unit::Kilowatt,
            Unit::Megawatt,
            Unit::Hour,
            Unit::Minute,
            Unit::TonnePerHour,
            Unit::KilogramPerHour,
        ];
        for unit in units {
            assert_eq!(Unit::from_str(unit.to_db_str()), Some(unit));
        }
    }

    #[test]
    fn test_unit_from_short_code() {
        assert_eq!(Unit::from_str("kg"), Some(Unit::Kilogram));
        assert_eq!(Unit::from_str("kWh"), Some(Unit::KilowattHour));
        assert_eq!(Unit::from_str("t/h"), Some(Unit::TonnePerHour));
        assert_eq!(Unit::from_str("furlong"), None);
    }

    #[test]
    fn test_order_status_severity_order() {
        assert!(OrderStatus::Fulfilled < OrderStatus::Shortfall);
        assert!(OrderStatus::Shortfall < OrderStatus::Blocked);
    }
}

// ==========================================
// 企业能源负荷仿真系统 - 物理量模型
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 0.3 量纲与单位体系
// 红线: 跨量纲运算一律返回 DimensionMismatch,不做静默换算
// ==========================================

use crate::domain::types::{Dimension, Unit};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

// ==========================================
// UnitError - 单位运算错误
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("量纲不匹配: {left} 与 {right} 无法进行 {op} 运算")]
    DimensionMismatch {
        op: &'static str,
        left: Dimension,
        right: Dimension,
    },
}

/// Result 类型别名
pub type UnitResult<T> = Result<T, UnitError>;

// ==========================================
// Quantity - 带单位物理量
// ==========================================
// 不变式: 所有算术只在同量纲或规定的派生组合内进行
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64, // 数值
    pub unit: Unit, // 单位
}

impl Quantity {
    /// 构造物理量
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// 零值
    pub fn zero(unit: Unit) -> Self {
        Self { value: 0.0, unit }
    }

    /// 所属量纲
    pub fn dimension(&self) -> Dimension {
        self.unit.dimension()
    }

    /// 以量纲基准单位表示的数值
    pub fn base_magnitude(&self) -> f64 {
        self.value * self.unit.base_factor()
    }

    /// 换算到目标单位
    pub fn to(&self, unit: Unit) -> UnitResult<Quantity> {
        if self.dimension() != unit.dimension() {
            return Err(UnitError::DimensionMismatch {
                op: "换算",
                left: self.dimension(),
                right: unit.dimension(),
            });
        }
        Ok(Quantity {
            value: self.base_magnitude() / unit.base_factor(),
            unit,
        })
    }

    /// 同量纲相加,结果保持 self 的单位
    pub fn checked_add(&self, other: &Quantity) -> UnitResult<Quantity> {
        if self.dimension() != other.dimension() {
            return Err(UnitError::DimensionMismatch {
                op: "加法",
                left: self.dimension(),
                right: other.dimension(),
            });
        }
        Ok(Quantity {
            value: self.value + other.to(self.unit)?.value,
            unit: self.unit,
        })
    }

    /// 同量纲相减,结果保持 self 的单位
    pub fn checked_sub(&self, other: &Quantity) -> UnitResult<Quantity> {
        if self.dimension() != other.dimension() {
            return Err(UnitError::DimensionMismatch {
                op: "减法",
                left: self.dimension(),
                right: other.dimension(),
            });
        }
        Ok(Quantity {
            value: self.value - other.to(self.unit)?.value,
            unit: self.unit,
        })
    }

    /// 标量缩放
    pub fn scale(&self, factor: f64) -> Quantity {
        Quantity {
            value: self.value * factor,
            unit: self.unit,
        }
    }

    /// 同量纲比值 (无量纲),用于整批数计算
    pub fn ratio_to(&self, other: &Quantity) -> UnitResult<f64> {
        if self.dimension() != other.dimension() {
            return Err(UnitError::DimensionMismatch {
                op: "比值",
                left: self.dimension(),
                right: other.dimension(),
            });
        }
        Ok(self.base_magnitude() / other.base_magnitude())
    }

    /// 同量纲全序比较
    pub fn try_cmp(&self, other: &Quantity) -> UnitResult<Ordering> {
        if self.dimension() != other.dimension() {
            return Err(UnitError::DimensionMismatch {
                op: "比较",
                left: self.dimension(),
                right: other.dimension(),
            });
        }
        Ok(self
            .base_magnitude()
            .partial_cmp(&other.base_magnitude())
            .unwrap_or(Ordering::Equal))
    }

    /// 按速率换算传输时长 (小时)
    ///
    /// 合法组合: 质量/质量流量, 能量/功率
    pub fn duration_at_rate(&self, rate: &Quantity) -> UnitResult<f64> {
        let ok = matches!(
            (self.dimension(), rate.dimension()),
            (Dimension::Mass, Dimension::MassFlow) | (Dimension::Energy, Dimension::Power)
        );
        if !ok {
            return Err(UnitError::DimensionMismatch {
                op: "时长换算",
                left: self.dimension(),
                right: rate.dimension(),
            });
        }
        Ok(self.base_magnitude() / rate.base_magnitude())
    }

    /// 速率 × 时长 (小时) 得到累计量
    ///
    /// 合法组合: 质量流量 → 质量, 功率 → 能量
    pub fn over_duration_hours(&self, hours: f64) -> UnitResult<Quantity> {
        let target = match self.dimension() {
            Dimension::MassFlow => Dimension::Mass,
            Dimension::Power => Dimension::Energy,
            other => {
                return Err(UnitError::DimensionMismatch {
                    op: "累计量换算",
                    left: other,
                    right: Dimension::Time,
                })
            }
        };
        Ok(Quantity {
            value: self.base_magnitude() * hours,
            unit: Unit::base_unit(target),
        })
    }

    /// 是否为正值
    pub fn is_positive(&self) -> bool {
        self.value > 0.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

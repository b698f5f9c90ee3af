// ==========================================
// 企业能源负荷仿真系统 - 物料/能源品类
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 3.1 Commodity
// 红线: 品类以名称为唯一标识,构建后不可变
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// Commodity - 品类
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commodity {
    pub name: String, // 品类名称 (唯一标识)
}

impl Commodity {
    /// 构造品类
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

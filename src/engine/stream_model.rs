// ==========================================
// 企业能源负荷仿真系统 - 流协商模型
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 4.1 Stream 协商协议
// 职责: 按流形态量化下游请求,核对上游供给
// 红线: 流在协商期可变,写入计划后不可变
// ==========================================

use crate::domain::network::{StreamKind, StreamSpec};
use crate::domain::plan::StreamEntry;
use crate::domain::quantity::{Quantity, UnitResult};
use chrono::{Duration, NaiveDateTime};

/// 相对数值容差 (浮点累计误差防护)
const REL_EPS: f64 = 1e-9;

/// 小时数换算为秒级时长
pub(crate) fn hours_to_duration(hours: f64) -> Duration {
    Duration::seconds((hours * 3600.0).round() as i64)
}

// ==========================================
// PendingStream - 协商中的流
// ==========================================
#[derive(Debug, Clone)]
pub struct PendingStream {
    pub stream_id: String,
    pub commodity: String,
    pub kind: StreamKind,
    pub requested: Quantity,        // 下游原始需求
    pub planned: Quantity,          // 形态量化后的计划量 (批次上取整)
    pub deadline: NaiveDateTime,    // 传输截止 (transfer_end)
    pub transfer_hours: f64,        // 计划量对应的传输时长
    pub tolerance: f64,             // 缺口容差 [0,1]
    pub annotation: Option<String>, // 量化备注
}

// ==========================================
// StreamResolution - 核对结果
// ==========================================
#[derive(Debug, Clone)]
pub enum StreamResolution {
    /// 足量或容差内缺口,产出最终计划条目
    Resolved(StreamEntry),
    /// 缺口超容差,下游请求方受阻
    Blocked { deficit: Quantity, reason: String },
}

impl PendingStream {
    /// 按流形态量化下游请求
    ///
    /// 批次流: 上取整到整批数; 连续流: 最大速率下的最短时窗
    pub fn request(
        spec: &StreamSpec,
        need: &Quantity,
        by_time: NaiveDateTime,
        default_tolerance: f64,
    ) -> UnitResult<PendingStream> {
        let tolerance = spec.shortfall_tolerance.unwrap_or(default_tolerance);
        match &spec.kind {
            StreamKind::Batch { batch_size } => {
                let batches = need.ratio_to(batch_size)?.ceil().max(1.0);
                let planned = batch_size.scale(batches);
                let rounded_up = planned.ratio_to(need)? > 1.0 + REL_EPS;
                Ok(PendingStream {
                    stream_id: spec.stream_id.clone(),
                    commodity: spec.commodity.clone(),
                    kind: spec.kind.clone(),
                    requested: *need,
                    planned,
                    deadline: by_time,
                    transfer_hours: 0.0,
                    tolerance,
                    annotation: rounded_up
                        .then(|| format!("整批上取整: {} 批 × {}", batches as i64, batch_size)),
                })
            }
            StreamKind::Continuous { max_rate } => {
                let transfer_hours = need.duration_at_rate(max_rate)?;
                Ok(PendingStream {
                    stream_id: spec.stream_id.clone(),
                    commodity: spec.commodity.clone(),
                    kind: spec.kind.clone(),
                    requested: *need,
                    planned: *need,
                    deadline: by_time,
                    transfer_hours,
                    tolerance,
                    annotation: None,
                })
            }
        }
    }

    /// 上游供给必须就绪的时点
    ///
    /// 连续流: 传输时窗起点; 批次流: 截止时点即交接时点
    pub fn production_due(&self) -> NaiveDateTime {
        match self.kind {
            StreamKind::Continuous { .. } => self.deadline - hours_to_duration(self.transfer_hours),
            StreamKind::Batch { .. } => self.deadline,
        }
    }

    /// 核对上游实际供给,产出最终条目或受阻信号
    ///
    /// # 参数
    /// - `delivered`: 上游可交付量
    /// - `available_from`: 上游供给就绪时点
    /// - `entry_seq`: 计划条目序号
    pub fn resolve(
        &self,
        delivered: Quantity,
        available_from: NaiveDateTime,
        entry_seq: i64,
    ) -> UnitResult<StreamResolution> {
        let requested_base = self.requested.base_magnitude();
        let delivered_base = delivered.to(self.requested.unit)?.base_magnitude();
        let deficit_frac = if requested_base > 0.0 {
            (1.0 - delivered_base / requested_base).max(0.0)
        } else {
            0.0
        };

        if delivered_base <= 0.0 || deficit_frac > self.tolerance + REL_EPS {
            let deficit = self.requested.checked_sub(&delivered.to(self.requested.unit)?)?;
            return Ok(StreamResolution::Blocked {
                deficit,
                reason: format!(
                    "流 {} 缺口 {:.1}% 超出容差 {:.1}%",
                    self.stream_id,
                    deficit_frac * 100.0,
                    self.tolerance * 100.0
                ),
            });
        }

        // 传输时窗: 连续流按实际交付量就近截止; 批次流为交接区间
        let transfer_start = match &self.kind {
            StreamKind::Continuous { max_rate } => {
                let hours = delivered.duration_at_rate(max_rate)?;
                self.deadline - hours_to_duration(hours)
            }
            StreamKind::Batch { .. } => available_from.min(self.deadline),
        };

        let shortfall = if deficit_frac > REL_EPS {
            Some(self.requested.checked_sub(&delivered.to(self.requested.unit)?)?)
        } else {
            None
        };

        let mut annotation = self.annotation.clone();
        if let Some(deficit) = &shortfall {
            let warn = format!("缺口警告: 缺 {} (容差内)", deficit);
            annotation = Some(match annotation {
                Some(prev) => format!("{}; {}", prev, warn),
                None => warn,
            });
        }

        Ok(StreamResolution::Resolved(StreamEntry {
            entry_seq,
            stream_id: self.stream_id.clone(),
            commodity: self.commodity.clone(),
            requested: self.requested,
            delivered,
            transfer_start,
            transfer_end: self.deadline,
            shortfall,
            annotation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Unit;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn continuous_spec(rate_t_per_h: f64, tolerance: Option<f64>) -> StreamSpec {
        StreamSpec {
            stream_id: "s1".to_string(),
            from_node: "a".to_string(),
            to_node: "b".to_string(),
            commodity: "slab".to_string(),
            kind: StreamKind::Continuous {
                max_rate: Quantity::new(rate_t_per_h, Unit::TonnePerHour),
            },
            shortfall_tolerance: tolerance,
        }
    }

    fn batch_spec(batch_t: f64) -> StreamSpec {
        StreamSpec {
            stream_id: "s1".to_string(),
            from_node: "a".to_string(),
            to_node: "b".to_string(),
            commodity: "slab".to_string(),
            kind: StreamKind::Batch {
                batch_size: Quantity::new(batch_t, Unit::Tonne),
            },
            shortfall_tolerance: None,
        }
    }

    #[test]
    fn test_continuous_minimal_window() {
        let spec = continuous_spec(5.0, None);
        let pending =
            PendingStream::request(&spec, &Quantity::new(10.0, Unit::Tonne), ts(12), 0.0).unwrap();
        assert!((pending.transfer_hours - 2.0).abs() < 1e-12);
        assert_eq!(pending.production_due(), ts(10));
        assert_eq!(pending.planned, Quantity::new(10.0, Unit::Tonne));
    }

    #[test]
    fn test_batch_rounds_up_to_whole_batches() {
        let spec = batch_spec(3.0);
        let pending =
            PendingStream::request(&spec, &Quantity::new(10.0, Unit::Tonne), ts(12), 0.0).unwrap();
        assert!((pending.planned.value - 12.0).abs() < 1e-12);
        assert!(pending.annotation.as_deref().unwrap().contains("整批上取整"));
        assert_eq!(pending.production_due(), ts(12));
    }

    #[test]
    fn test_resolve_full_delivery() {
        let spec = continuous_spec(5.0, None);
        let pending =
            PendingStream::request(&spec, &Quantity::new(10.0, Unit::Tonne), ts(12), 0.0).unwrap();
        let res = pending
            .resolve(Quantity::new(10.0, Unit::Tonne), ts(9), 7)
            .unwrap();
        match res {
            StreamResolution::Resolved(entry) => {
                assert_eq!(entry.entry_seq, 7);
                assert_eq!(entry.transfer_start, ts(10));
                assert_eq!(entry.transfer_end, ts(12));
                assert!(entry.shortfall.is_none());
            }
            StreamResolution::Blocked { .. } => panic!("不应受阻"),
        }
    }

    #[test]
    fn test_resolve_tolerated_shortfall_annotated() {
        let spec = continuous_spec(5.0, Some(0.2));
        let pending =
            PendingStream::request(&spec, &Quantity::new(10.0, Unit::Tonne), ts(12), 0.0).unwrap();
        let res = pending
            .resolve(Quantity::new(9.0, Unit::Tonne), ts(9), 1)
            .unwrap();
        match res {
            StreamResolution::Resolved(entry) => {
                let shortfall = entry.shortfall.unwrap();
                assert!((shortfall.value - 1.0).abs() < 1e-9);
                assert!(entry.annotation.unwrap().contains("缺口警告"));
            }
            StreamResolution::Blocked { .. } => panic!("容差内缺口不应受阻"),
        }
    }

    #[test]
    fn test_resolve_excess_shortfall_blocks() {
        let spec = continuous_spec(5.0, Some(0.05));
        let pending =
            PendingStream::request(&spec, &Quantity::new(10.0, Unit::Tonne), ts(12), 0.0).unwrap();
        let res = pending
            .resolve(Quantity::new(9.0, Unit::Tonne), ts(9), 1)
            .unwrap();
        assert!(matches!(res, StreamResolution::Blocked { .. }));
    }

    #[test]
    fn test_resolve_zero_delivery_always_blocks() {
        let spec = continuous_spec(5.0, Some(1.0));
        let pending =
            PendingStream::request(&spec, &Quantity::new(10.0, Unit::Tonne), ts(12), 0.0).unwrap();
        let res = pending
            .resolve(Quantity::zero(Unit::Tonne), ts(9), 1)
            .unwrap();
        assert!(matches!(res, StreamResolution::Blocked { .. }));
    }
}

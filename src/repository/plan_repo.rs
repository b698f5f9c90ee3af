// ==========================================
// 企业能源负荷仿真系统 - 生产计划数据仓储
// ==========================================
// 依据: Sim_Engine_Specs_v0.2.md - 6. 持久化协作方
// 职责: 冻结计划 ↔ 关系行 (stream_entry / activity_entry / order_outcome)
// 红线: Repository 不含业务逻辑; 所有查询参数化
// ==========================================

use crate::domain::plan::{ActivityEntry, ConsumedInput, FrozenPlan, OrderOutcome, StreamEntry};
use crate::domain::quantity::Quantity;
use crate::domain::types::{OrderStatus, Unit};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

/// 时间戳统一存储格式
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// PlanRepository - 生产计划仓储
// ==========================================
pub struct PlanRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PlanRepository {
    /// 创建新的 PlanRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 建表 (幂等)
    pub fn init_schema(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS plan (
                plan_id    TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stream_entry (
                plan_id         TEXT NOT NULL,
                entry_seq       INTEGER NOT NULL,
                stream_id       TEXT NOT NULL,
                commodity       TEXT NOT NULL,
                requested_value REAL NOT NULL,
                requested_unit  TEXT NOT NULL,
                delivered_value REAL NOT NULL,
                delivered_unit  TEXT NOT NULL,
                transfer_start  TEXT NOT NULL,
                transfer_end    TEXT NOT NULL,
                shortfall_value REAL,
                shortfall_unit  TEXT,
                annotation      TEXT,
                PRIMARY KEY (plan_id, entry_seq),
                FOREIGN KEY (plan_id) REFERENCES plan(plan_id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS activity_entry (
                plan_id        TEXT NOT NULL,
                entry_seq      INTEGER NOT NULL,
                step_name      TEXT NOT NULL,
                start_time     TEXT NOT NULL,
                end_time       TEXT NOT NULL,
                commodity      TEXT NOT NULL,
                produced_value REAL NOT NULL,
                produced_unit  TEXT NOT NULL,
                consumed_json  TEXT NOT NULL,
                PRIMARY KEY (plan_id, entry_seq),
                FOREIGN KEY (plan_id) REFERENCES plan(plan_id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS order_outcome (
                plan_id         TEXT NOT NULL,
                order_seq       INTEGER NOT NULL,
                sink            TEXT NOT NULL,
                commodity       TEXT NOT NULL,
                requested_value REAL NOT NULL,
                requested_unit  TEXT NOT NULL,
                delivered_value REAL NOT NULL,
                delivered_unit  TEXT NOT NULL,
                deadline        TEXT NOT NULL,
                status          TEXT NOT NULL,
                reason          TEXT,
                PRIMARY KEY (plan_id, order_seq),
                FOREIGN KEY (plan_id) REFERENCES plan(plan_id) ON DELETE CASCADE
            );
            "#,
        )?;
        Ok(())
    }

    /// 保存冻结计划 (同 plan_id 重复保存报唯一约束冲突)
    pub fn save(&self, plan: &FrozenPlan, created_at: NaiveDateTime) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "INSERT INTO plan (plan_id, created_at) VALUES (?, ?)",
            params![plan.plan_id(), created_at.format(TS_FORMAT).to_string()],
        )?;

        for entry in plan.streams() {
            conn.execute(
                r#"INSERT INTO stream_entry (
                    plan_id, entry_seq, stream_id, commodity,
                    requested_value, requested_unit, delivered_value, delivered_unit,
                    transfer_start, transfer_end, shortfall_value, shortfall_unit, annotation
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    plan.plan_id(),
                    entry.entry_seq,
                    &entry.stream_id,
                    &entry.commodity,
                    entry.requested.value,
                    entry.requested.unit.to_db_str(),
                    entry.delivered.value,
                    entry.delivered.unit.to_db_str(),
                    entry.transfer_start.format(TS_FORMAT).to_string(),
                    entry.transfer_end.format(TS_FORMAT).to_string(),
                    entry.shortfall.map(|q| q.value),
                    entry.shortfall.map(|q| q.unit.to_db_str()),
                    &entry.annotation,
                ],
            )?;
        }

        for entry in plan.activities() {
            let consumed_json = serde_json::to_string(&entry.consumed)
                .map_err(|e| RepositoryError::FieldValueError {
                    field: "consumed_json".to_string(),
                    message: e.to_string(),
                })?;
            conn.execute(
                r#"INSERT INTO activity_entry (
                    plan_id, entry_seq, step_name, start_time, end_time,
                    commodity, produced_value, produced_unit, consumed_json
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    plan.plan_id(),
                    entry.entry_seq,
                    &entry.step_name,
                    entry.start_time.format(TS_FORMAT).to_string(),
                    entry.end_time.format(TS_FORMAT).to_string(),
                    &entry.commodity,
                    entry.produced.value,
                    entry.produced.unit.to_db_str(),
                    consumed_json,
                ],
            )?;
        }

        for outcome in plan.outcomes() {
            conn.execute(
                r#"INSERT INTO order_outcome (
                    plan_id, order_seq, sink, commodity,
                    requested_value, requested_unit, delivered_value, delivered_unit,
                    deadline, status, reason
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    plan.plan_id(),
                    outcome.order_seq,
                    &outcome.sink,
                    &outcome.commodity,
                    outcome.requested.value,
                    outcome.requested.unit.to_db_str(),
                    outcome.delivered.value,
                    outcome.delivered.unit.to_db_str(),
                    outcome.deadline.format(TS_FORMAT).to_string(),
                    outcome.status.to_db_str(),
                    &outcome.reason,
                ],
            )?;
        }

        Ok(())
    }

    /// 按 plan_id 读取流条目 (按 entry_seq 升序)
    pub fn restore_stream_results(&self, plan_id: &str) -> RepositoryResult<Vec<StreamEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT entry_seq, stream_id, commodity,
                      requested_value, requested_unit, delivered_value, delivered_unit,
                      transfer_start, transfer_end, shortfall_value, shortfall_unit, annotation
               FROM stream_entry
               WHERE plan_id = ?
               ORDER BY entry_seq ASC"#,
        )?;
        let entries = stmt
            .query_map(params![plan_id], map_stream_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// 按 plan_id 读取工序活动条目 (按 entry_seq 升序)
    pub fn restore_process_step_results(
        &self,
        plan_id: &str,
    ) -> RepositoryResult<Vec<ActivityEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT entry_seq, step_name, start_time, end_time,
                      commodity, produced_value, produced_unit, consumed_json
               FROM activity_entry
               WHERE plan_id = ?
               ORDER BY entry_seq ASC"#,
        )?;
        let entries = stmt
            .query_map(params![plan_id], map_activity_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// 按 plan_id 读取订单结局 (按 order_seq 升序)
    pub fn restore_order_outcomes(&self, plan_id: &str) -> RepositoryResult<Vec<OrderOutcome>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT order_seq, sink, commodity,
                      requested_value, requested_unit, delivered_value, delivered_unit,
                      deadline, status, reason
               FROM order_outcome
               WHERE plan_id = ?
               ORDER BY order_seq ASC"#,
        )?;
        let outcomes = stmt
            .query_map(params![plan_id], map_outcome_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(outcomes)
    }

    /// 重建等价冻结计划
    pub fn load(&self, plan_id: &str) -> RepositoryResult<Option<FrozenPlan>> {
        {
            let conn = self.get_conn()?;
            let exists: Option<String> = conn
                .query_row(
                    "SELECT plan_id FROM plan WHERE plan_id = ?",
                    params![plan_id],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            if exists.is_none() {
                return Ok(None);
            }
        }
        let streams = self.restore_stream_results(plan_id)?;
        let activities = self.restore_process_step_results(plan_id)?;
        let outcomes = self.restore_order_outcomes(plan_id)?;
        Ok(Some(FrozenPlan::restore(
            plan_id, streams, activities, outcomes,
        )))
    }

    /// 全部计划ID (按创建时间降序)
    pub fn list_plan_ids(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT plan_id FROM plan ORDER BY created_at DESC, plan_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// 删除计划 (级联删除条目)
    pub fn delete(&self, plan_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM plan WHERE plan_id = ?", params![plan_id])?;
        Ok(())
    }
}

// ==========================================
// 行映射
// ==========================================

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&raw, TS_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_unit(idx: usize, raw: String) -> rusqlite::Result<Unit> {
    Unit::from_str(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("未知单位: {}", raw).into(),
        )
    })
}

fn map_stream_row(row: &Row) -> rusqlite::Result<StreamEntry> {
    let shortfall = match (
        row.get::<_, Option<f64>>(9)?,
        row.get::<_, Option<String>>(10)?,
    ) {
        (Some(value), Some(unit)) => Some(Quantity::new(value, parse_unit(10, unit)?)),
        _ => None,
    };
    Ok(StreamEntry {
        entry_seq: row.get(0)?,
        stream_id: row.get(1)?,
        commodity: row.get(2)?,
        requested: Quantity::new(row.get(3)?, parse_unit(4, row.get(4)?)?),
        delivered: Quantity::new(row.get(5)?, parse_unit(6, row.get(6)?)?),
        transfer_start: parse_ts(7, row.get(7)?)?,
        transfer_end: parse_ts(8, row.get(8)?)?,
        shortfall,
        annotation: row.get(11)?,
    })
}

fn map_activity_row(row: &Row) -> rusqlite::Result<ActivityEntry> {
    let consumed_json: String = row.get(7)?;
    let consumed: Vec<ConsumedInput> = serde_json::from_str(&consumed_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ActivityEntry {
        entry_seq: row.get(0)?,
        step_name: row.get(1)?,
        start_time: parse_ts(2, row.get(2)?)?,
        end_time: parse_ts(3, row.get(3)?)?,
        commodity: row.get(4)?,
        produced: Quantity::new(row.get(5)?, parse_unit(6, row.get(6)?)?),
        consumed,
    })
}

fn map_outcome_row(row: &Row) -> rusqlite::Result<OrderOutcome> {
    let status: String = row.get(8)?;
    Ok(OrderOutcome {
        order_seq: row.get(0)?,
        sink: row.get(1)?,
        commodity: row.get(2)?,
        requested: Quantity::new(row.get(3)?, parse_unit(4, row.get(4)?)?),
        delivered: Quantity::new(row.get(5)?, parse_unit(6, row.get(6)?)?),
        deadline: parse_ts(7, row.get(7)?)?,
        status: OrderStatus::from_str(&status),
        reason: row.get(9)?,
    })
}

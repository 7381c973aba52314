pub mod activities;
pub mod core;
pub mod enrollments;
pub mod grades;
pub mod promotion;
pub mod roster;
pub mod terms;
pub mod years;

use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use rusqlite::{Connection, OptionalExtension};

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_db_mut(state: &mut AppState) -> Result<&mut Connection, HandlerErr> {
    state
        .db
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn param_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing params.{}", key)))
}

pub fn param_opt_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

pub fn param_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("{} must be an integer", key)))
}

pub fn param_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("{} must be a number", key)))
}

/// School-year lock gate shared by every mutating handler.
pub fn ensure_year_unlocked(conn: &Connection, school_year_id: &str) -> Result<(), HandlerErr> {
    let locked: Option<i64> = conn
        .query_row(
            "SELECT is_locked FROM school_years WHERE id = ?",
            [school_year_id],
            |r| r.get(0),
        )
        .optional()?;
    match locked {
        None => Err(HandlerErr::new("not_found", "school year not found")),
        Some(0) => Ok(()),
        Some(_) => Err(HandlerErr::new("locked_year", "school year is locked")),
    }
}

pub fn row_exists(conn: &Connection, table: &str, id: &str) -> Result<bool, HandlerErr> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

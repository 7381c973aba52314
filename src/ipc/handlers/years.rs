use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::{param_str, require_db, require_db_mut};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "schoolYears.list" => list(state),
        "schoolYears.create" => create(state, &req.params),
        "schoolYears.update" => update(state, &req.params),
        "schoolYears.delete" => delete(state, &req.params),
        "schoolYears.activate" => activate(state, &req.params),
        "schoolYears.lock" => lock(state, &req.params),
        "schoolYears.unlock" => unlock(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}

fn parse_date_range(params: &serde_json::Value) -> Result<(String, String), HandlerErr> {
    let start = param_str(params, "startDate")?;
    let end = param_str(params, "endDate")?;
    let start_date = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .map_err(|_| HandlerErr::new("bad_params", "startDate must be YYYY-MM-DD"))?;
    let end_date = NaiveDate::parse_from_str(end, "%Y-%m-%d")
        .map_err(|_| HandlerErr::new("bad_params", "endDate must be YYYY-MM-DD"))?;
    if end_date <= start_date {
        return Err(HandlerErr::new(
            "bad_params",
            "endDate must be after startDate",
        ));
    }
    Ok((start.to_string(), end.to_string()))
}

fn list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut stmt = conn.prepare(
        "SELECT id, name, start_date, end_date, status, is_locked
         FROM school_years ORDER BY start_date DESC",
    )?;
    let years = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "startDate": r.get::<_, String>(2)?,
                "endDate": r.get::<_, String>(3)?,
                "status": r.get::<_, String>(4)?,
                "isLocked": r.get::<_, i64>(5)? != 0,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "schoolYears": years }))
}

fn create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = param_str(params, "name")?.trim().to_string();
    let (start_date, end_date) = parse_date_range(params)?;
    let conn = require_db(state)?;

    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM school_years WHERE name = ?", [&name], |r| {
            r.get(0)
        })
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::new("bad_params", "school year name already exists"));
    }

    // New years always start inactive; activation is a separate, explicit step.
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO school_years(id, name, start_date, end_date, status, is_locked)
         VALUES (?, ?, ?, ?, 'inactive', 0)",
        (&id, &name, &start_date, &end_date),
    )?;
    Ok(json!({ "schoolYearId": id }))
}

fn load_year(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<(String, i64), HandlerErr> {
    conn.query_row(
        "SELECT status, is_locked FROM school_years WHERE id = ?",
        [id],
        |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)),
    )
    .optional()?
    .ok_or_else(|| HandlerErr::new("not_found", "school year not found"))
}

fn update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "schoolYearId")?;
    let name = param_str(params, "name")?.trim().to_string();
    let (start_date, end_date) = parse_date_range(params)?;
    let conn = require_db(state)?;

    let (_, is_locked) = load_year(conn, id)?;
    if is_locked != 0 {
        return Err(HandlerErr::new("locked_year", "school year is locked"));
    }
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM school_years WHERE name = ? AND id != ?",
            (&name, id),
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::new("bad_params", "school year name already exists"));
    }
    conn.execute(
        "UPDATE school_years SET name = ?, start_date = ?, end_date = ? WHERE id = ?",
        (&name, &start_date, &end_date, id),
    )?;
    Ok(json!({ "updated": true }))
}

fn delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "schoolYearId")?;
    let conn = require_db(state)?;
    let (status, _) = load_year(conn, id)?;
    if status == "active" {
        return Err(HandlerErr::new(
            "bad_params",
            "cannot delete the active school year",
        ));
    }
    conn.execute("DELETE FROM school_years WHERE id = ?", [id])?;
    Ok(json!({ "deleted": true }))
}

/// At most one active year system-wide: deactivate and activate commit together.
fn activate(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "schoolYearId")?.to_string();
    let conn = require_db_mut(state)?;
    let (_, is_locked) = load_year(conn, &id)?;
    if is_locked != 0 {
        return Err(HandlerErr::new("locked_year", "school year is locked"));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE school_years SET status = 'inactive' WHERE status = 'active'",
        [],
    )?;
    tx.execute(
        "UPDATE school_years SET status = 'active' WHERE id = ?",
        [&id],
    )?;
    tx.commit()?;
    Ok(json!({ "activated": true }))
}

fn lock(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "schoolYearId")?;
    let conn = require_db(state)?;
    let (status, is_locked) = load_year(conn, id)?;
    if is_locked != 0 {
        return Err(HandlerErr::new("locked_year", "school year is already locked"));
    }
    if status == "active" {
        return Err(HandlerErr::new(
            "bad_params",
            "deactivate school year before locking",
        ));
    }
    conn.execute("UPDATE school_years SET is_locked = 1 WHERE id = ?", [id])?;
    Ok(json!({ "locked": true }))
}

fn unlock(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "schoolYearId")?;
    let conn = require_db(state)?;
    let (_, is_locked) = load_year(conn, id)?;
    if is_locked == 0 {
        return Err(HandlerErr::new("bad_params", "school year is not locked"));
    }
    conn.execute("UPDATE school_years SET is_locked = 0 WHERE id = ?", [id])?;
    Ok(json!({ "unlocked": true }))
}

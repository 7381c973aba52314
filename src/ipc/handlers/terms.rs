use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::{param_i64, param_str, require_db, require_db_mut, row_exists};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "semesters.list" => list_semesters(state, &req.params),
        "semesters.create" => create_semester(state, &req.params),
        "semesters.update" => update_semester(state, &req.params),
        "semesters.delete" => delete_semester(state, &req.params),
        "semesters.activate" => activate_semester(state, &req.params),
        "gradingPeriods.list" => list_periods(state, &req.params),
        "gradingPeriods.create" => create_period(state, &req.params),
        "gradingPeriods.update" => update_period(state, &req.params),
        "gradingPeriods.delete" => delete_period(state, &req.params),
        "gradingPeriods.activate" => activate_period(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}

fn list_semesters(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_year_id = param_str(params, "schoolYearId")?;
    let conn = require_db(state)?;
    let mut stmt = conn.prepare(
        "SELECT id, name, ord, status FROM semesters
         WHERE school_year_id = ? ORDER BY ord",
    )?;
    let semesters = stmt
        .query_map([school_year_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "order": r.get::<_, i64>(2)?,
                "status": r.get::<_, String>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "semesters": semesters }))
}

fn create_semester(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_year_id = param_str(params, "schoolYearId")?;
    let name = param_str(params, "name")?.trim().to_string();
    let ord = param_i64(params, "order")?;
    if ord < 1 {
        return Err(HandlerErr::new("bad_params", "order must be >= 1"));
    }
    let conn = require_db(state)?;
    if !row_exists(conn, "school_years", school_year_id)? {
        return Err(HandlerErr::new("not_found", "school year not found"));
    }
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM semesters WHERE school_year_id = ? AND ord = ?",
            (school_year_id, ord),
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::new(
            "bad_params",
            "a semester with this order already exists for the school year",
        ));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO semesters(id, school_year_id, name, ord, status)
         VALUES (?, ?, ?, ?, 'inactive')",
        (&id, school_year_id, &name, ord),
    )?;
    Ok(json!({ "semesterId": id }))
}

fn update_semester(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "semesterId")?;
    let name = param_str(params, "name")?.trim().to_string();
    let ord = param_i64(params, "order")?;
    let conn = require_db(state)?;
    if !row_exists(conn, "semesters", id)? {
        return Err(HandlerErr::new("not_found", "semester not found"));
    }
    conn.execute(
        "UPDATE semesters SET name = ?, ord = ? WHERE id = ?",
        (&name, ord, id),
    )?;
    Ok(json!({ "updated": true }))
}

fn delete_semester(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "semesterId")?;
    let conn = require_db(state)?;
    if !row_exists(conn, "semesters", id)? {
        return Err(HandlerErr::new("not_found", "semester not found"));
    }
    let deleted = conn.execute(
        "DELETE FROM semesters WHERE id = ? AND status != 'active'",
        [id],
    )?;
    if deleted == 0 {
        return Err(HandlerErr::new(
            "bad_params",
            "cannot delete the active semester",
        ));
    }
    Ok(json!({ "deleted": true }))
}

/// Exactly one active semester per school year: both writes commit together
/// so a crash never leaves two (or zero, if one was active) active siblings.
fn activate_semester(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "semesterId")?.to_string();
    let conn = require_db_mut(state)?;
    let school_year_id: Option<String> = conn
        .query_row("SELECT school_year_id FROM semesters WHERE id = ?", [&id], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(school_year_id) = school_year_id else {
        return Err(HandlerErr::new("not_found", "semester not found"));
    };

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE semesters SET status = 'inactive'
         WHERE school_year_id = ? AND status = 'active'",
        [&school_year_id],
    )?;
    tx.execute("UPDATE semesters SET status = 'active' WHERE id = ?", [&id])?;
    tx.commit()?;
    Ok(json!({ "activated": true }))
}

fn list_periods(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = param_str(params, "semesterId")?;
    let conn = require_db(state)?;
    let mut stmt = conn.prepare(
        "SELECT id, name, ord, status FROM grading_periods
         WHERE semester_id = ? ORDER BY ord",
    )?;
    let periods = stmt
        .query_map([semester_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "order": r.get::<_, i64>(2)?,
                "status": r.get::<_, String>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "gradingPeriods": periods }))
}

fn create_period(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = param_str(params, "semesterId")?;
    let name = param_str(params, "name")?.trim().to_string();
    let ord = param_i64(params, "order")?;
    if ord < 1 {
        return Err(HandlerErr::new("bad_params", "order must be >= 1"));
    }
    let conn = require_db(state)?;
    if !row_exists(conn, "semesters", semester_id)? {
        return Err(HandlerErr::new("not_found", "semester not found"));
    }
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM grading_periods WHERE semester_id = ? AND ord = ?",
            (semester_id, ord),
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::new(
            "bad_params",
            "a grading period with this order already exists for the semester",
        ));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO grading_periods(id, semester_id, name, ord, status)
         VALUES (?, ?, ?, ?, 'inactive')",
        (&id, semester_id, &name, ord),
    )?;
    Ok(json!({ "gradingPeriodId": id }))
}

fn update_period(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "gradingPeriodId")?;
    let name = param_str(params, "name")?.trim().to_string();
    let ord = param_i64(params, "order")?;
    let conn = require_db(state)?;
    if !row_exists(conn, "grading_periods", id)? {
        return Err(HandlerErr::new("not_found", "grading period not found"));
    }
    conn.execute(
        "UPDATE grading_periods SET name = ?, ord = ? WHERE id = ?",
        (&name, ord, id),
    )?;
    Ok(json!({ "updated": true }))
}

fn delete_period(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "gradingPeriodId")?;
    let conn = require_db(state)?;
    if !row_exists(conn, "grading_periods", id)? {
        return Err(HandlerErr::new("not_found", "grading period not found"));
    }
    let deleted = conn.execute(
        "DELETE FROM grading_periods WHERE id = ? AND status != 'active'",
        [id],
    )?;
    if deleted == 0 {
        return Err(HandlerErr::new(
            "bad_params",
            "cannot delete the active grading period",
        ));
    }
    Ok(json!({ "deleted": true }))
}

/// Exactly one active grading period per semester, same shape as
/// `activate_semester`.
fn activate_period(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = param_str(params, "gradingPeriodId")?.to_string();
    let conn = require_db_mut(state)?;
    let semester_id: Option<String> = conn
        .query_row(
            "SELECT semester_id FROM grading_periods WHERE id = ?",
            [&id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(semester_id) = semester_id else {
        return Err(HandlerErr::new("not_found", "grading period not found"));
    };

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE grading_periods SET status = 'inactive'
         WHERE semester_id = ? AND status = 'active'",
        [&semester_id],
    )?;
    tx.execute(
        "UPDATE grading_periods SET status = 'active' WHERE id = ?",
        [&id],
    )?;
    tx.commit()?;
    Ok(json!({ "activated": true }))
}

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::{
    ensure_year_unlocked, param_f64, param_opt_str, param_str, require_db, require_db_mut,
    row_exists,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const ACTIVITY_TYPES: [&str; 5] = ["quiz", "assignment", "exam", "project", "recitation"];

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "activities.list" => list(state, &req.params),
        "activities.create" => create(state, &req.params),
        "activities.update" => update(state, &req.params),
        "activities.delete" => delete(state, &req.params),
        "scores.save" => save_scores(state, &req.params),
        "scores.list" => list_scores(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}

fn class_year(conn: &Connection, class_id: &str) -> Result<String, HandlerErr> {
    conn.query_row(
        "SELECT school_year_id FROM classes WHERE id = ?",
        [class_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| HandlerErr::new("not_found", "class not found"))
}

fn parse_activity_type(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let t = param_str(params, "type")?.to_ascii_lowercase();
    if !ACTIVITY_TYPES.contains(&t.as_str()) {
        return Err(HandlerErr::with_details(
            "bad_params",
            "type must be one of: quiz, assignment, exam, project, recitation",
            json!({ "type": t }),
        ));
    }
    Ok(t)
}

fn parse_weight(params: &serde_json::Value) -> Result<Option<f64>, HandlerErr> {
    match params.get("weight") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let w = v
                .as_f64()
                .ok_or_else(|| HandlerErr::new("bad_params", "weight must be a number"))?;
            if w < 0.0 {
                return Err(HandlerErr::new("bad_params", "weight must be >= 0"));
            }
            Ok(Some(w))
        }
    }
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(params, "classId")?;
    let conn = require_db(state)?;
    if !row_exists(conn, "classes", class_id)? {
        return Err(HandlerErr::new("not_found", "class not found"));
    }
    let mut stmt = conn.prepare(
        "SELECT id, grading_period_id, name, activity_type, max_score, weight, due_date, is_published
         FROM activities WHERE class_id = ? ORDER BY rowid",
    )?;
    let activities = stmt
        .query_map([class_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "gradingPeriodId": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
                "type": r.get::<_, String>(3)?,
                "maxScore": r.get::<_, f64>(4)?,
                "weight": r.get::<_, Option<f64>>(5)?,
                "dueDate": r.get::<_, Option<String>>(6)?,
                "isPublished": r.get::<_, i64>(7)? != 0,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "activities": activities }))
}

fn create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(params, "classId")?;
    let grading_period_id = param_str(params, "gradingPeriodId")?;
    let name = param_str(params, "name")?.trim().to_string();
    let activity_type = parse_activity_type(params)?;
    let max_score = param_f64(params, "maxScore")?;
    if max_score <= 0.0 {
        return Err(HandlerErr::new("bad_params", "maxScore must be > 0"));
    }
    let weight = parse_weight(params)?;
    let due_date = param_opt_str(params, "dueDate").map(|s| s.to_string());

    let conn = require_db(state)?;
    let year_id = class_year(conn, class_id)?;
    ensure_year_unlocked(conn, &year_id)?;
    if !row_exists(conn, "grading_periods", grading_period_id)? {
        return Err(HandlerErr::new("not_found", "grading period not found"));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO activities(id, class_id, grading_period_id, name, activity_type,
                                max_score, weight, due_date, is_published)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)",
        (
            &id,
            class_id,
            grading_period_id,
            &name,
            &activity_type,
            max_score,
            weight,
            &due_date,
        ),
    )?;
    Ok(json!({ "activityId": id }))
}

fn update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let activity_id = param_str(params, "activityId")?;
    let name = param_str(params, "name")?.trim().to_string();
    let activity_type = parse_activity_type(params)?;
    let max_score = param_f64(params, "maxScore")?;
    if max_score <= 0.0 {
        return Err(HandlerErr::new("bad_params", "maxScore must be > 0"));
    }
    let weight = parse_weight(params)?;
    let due_date = param_opt_str(params, "dueDate").map(|s| s.to_string());
    let is_published = params
        .get("isPublished")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::new("bad_params", "isPublished must be boolean"))?;

    let conn = require_db(state)?;
    let class_id: Option<String> = conn
        .query_row(
            "SELECT class_id FROM activities WHERE id = ?",
            [activity_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(class_id) = class_id else {
        return Err(HandlerErr::new("not_found", "activity not found"));
    };
    let year_id = class_year(conn, &class_id)?;
    ensure_year_unlocked(conn, &year_id)?;

    conn.execute(
        "UPDATE activities
         SET name = ?, activity_type = ?, max_score = ?, weight = ?, due_date = ?, is_published = ?
         WHERE id = ?",
        (
            &name,
            &activity_type,
            max_score,
            weight,
            &due_date,
            is_published as i64,
            activity_id,
        ),
    )?;
    Ok(json!({ "updated": true }))
}

fn delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let activity_id = param_str(params, "activityId")?;
    let conn = require_db(state)?;
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT class_id, is_published FROM activities WHERE id = ?",
            [activity_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((class_id, is_published)) = row else {
        return Err(HandlerErr::new("not_found", "activity not found"));
    };
    if is_published != 0 {
        return Err(HandlerErr::new(
            "bad_params",
            "unpublish activity before deleting",
        ));
    }
    let year_id = class_year(conn, &class_id)?;
    ensure_year_unlocked(conn, &year_id)?;

    // Scores cascade with the activity.
    conn.execute("DELETE FROM activities WHERE id = ?", [activity_id])?;
    Ok(json!({ "deleted": true }))
}

/// Batch upsert of a gradebook column. NULL means "not attempted" and is
/// distinct from a score of 0; each entry is bounded by the activity's
/// max_score. The whole batch commits or none of it does.
fn save_scores(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let activity_id = param_str(params, "activityId")?.to_string();
    let entries = params
        .get("scores")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::new("bad_params", "scores must be an array"))?
        .clone();

    let conn = require_db_mut(state)?;
    let row: Option<(String, f64)> = conn
        .query_row(
            "SELECT class_id, max_score FROM activities WHERE id = ?",
            [&activity_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((class_id, max_score)) = row else {
        return Err(HandlerErr::new("not_found", "activity not found"));
    };
    let year_id = class_year(conn, &class_id)?;
    ensure_year_unlocked(conn, &year_id)?;

    // Validate the whole batch before any write.
    let mut parsed: Vec<(String, Option<f64>)> = Vec::with_capacity(entries.len());
    for entry in &entries {
        let student_id = entry
            .get("studentId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::new("bad_params", "scores[].studentId is required"))?
            .to_string();
        let score = match entry.get("score") {
            None => None,
            Some(v) if v.is_null() => None,
            Some(v) => {
                let s = v.as_f64().ok_or_else(|| {
                    HandlerErr::new("bad_params", "scores[].score must be a number or null")
                })?;
                if s < 0.0 || s > max_score {
                    return Err(HandlerErr::with_details(
                        "bad_params",
                        format!("score must be within 0..={}", max_score),
                        json!({ "studentId": student_id, "score": s }),
                    ));
                }
                Some(s)
            }
        };
        if !row_exists(conn, "students", &student_id)? {
            return Err(HandlerErr::with_details(
                "not_found",
                "student not found",
                json!({ "studentId": student_id }),
            ));
        }
        parsed.push((student_id, score));
    }

    let updated_at = chrono::Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    for (student_id, score) in &parsed {
        tx.execute(
            "INSERT INTO activity_scores(id, activity_id, student_id, score, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(activity_id, student_id)
             DO UPDATE SET score = excluded.score, updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                &activity_id,
                student_id,
                score,
                &updated_at,
            ),
        )?;
    }
    tx.commit()?;
    Ok(json!({ "saved": parsed.len() }))
}

fn list_scores(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let activity_id = param_str(params, "activityId")?;
    let conn = require_db(state)?;
    if !row_exists(conn, "activities", activity_id)? {
        return Err(HandlerErr::new("not_found", "activity not found"));
    }
    let mut stmt = conn.prepare(
        "SELECT student_id, score, updated_at FROM activity_scores WHERE activity_id = ?",
    )?;
    let scores = stmt
        .query_map([activity_id], |r| {
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "score": r.get::<_, Option<f64>>(1)?,
                "updatedAt": r.get::<_, Option<String>>(2)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "scores": scores }))
}

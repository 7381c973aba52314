use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::{ensure_year_unlocked, param_str, require_db, require_db_mut, row_exists};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "enrollments.list" => list(state, &req.params),
        "enrollments.enroll" => enroll(state, &req.params),
        "enrollments.transfer" => transfer(state, &req.params),
        "enrollments.drop" => close(state, &req.params, "dropped"),
        "enrollments.complete" => close(state, &req.params, "completed"),
        "enrollments.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}

#[derive(Debug, Clone)]
pub struct EnrollmentRow {
    pub id: String,
    pub student_id: String,
    pub school_year_id: String,
    pub section_id: String,
    pub status: String,
    pub is_promoted: bool,
}

pub fn load_enrollment(conn: &Connection, id: &str) -> Result<EnrollmentRow, HandlerErr> {
    conn.query_row(
        "SELECT id, student_id, school_year_id, section_id, status, is_promoted
         FROM enrollments WHERE id = ?",
        [id],
        |r| {
            Ok(EnrollmentRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                school_year_id: r.get(2)?,
                section_id: r.get(3)?,
                status: r.get(4)?,
                is_promoted: r.get::<_, i64>(5)? != 0,
            })
        },
    )
    .optional()?
    .ok_or_else(|| HandlerErr::new("not_found", "enrollment not found"))
}

fn has_enrolled_row(
    conn: &Connection,
    student_id: &str,
    school_year_id: &str,
) -> Result<bool, HandlerErr> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM enrollments
             WHERE student_id = ? AND school_year_id = ? AND status = 'enrolled'",
            (student_id, school_year_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Insert a fresh `enrolled` row. The partial unique index on
/// (student, year) WHERE status = 'enrolled' backs the application-level
/// duplicate check, so a racing insert fails here instead of slipping in.
pub fn insert_enrolled(
    conn: &Connection,
    student_id: &str,
    school_year_id: &str,
    section_id: &str,
) -> Result<String, HandlerErr> {
    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO enrollments(id, student_id, school_year_id, section_id, status, is_promoted, created_at)
         VALUES (?, ?, ?, ?, 'enrolled', 0, ?)",
        (&id, student_id, school_year_id, section_id, &created_at),
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            HandlerErr::new(
                "duplicate_enrollment",
                "student is already enrolled for this school year",
            )
        }
        other => other.into(),
    })?;
    Ok(id)
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_year_id = param_str(params, "schoolYearId")?;
    let conn = require_db(state)?;
    let mut stmt = conn.prepare(
        "SELECT e.id, e.student_id, s.student_no, s.last_name, s.first_name,
                e.section_id, sec.name, e.status, e.is_promoted
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         JOIN sections sec ON sec.id = e.section_id
         WHERE e.school_year_id = ?
         ORDER BY s.last_name, s.first_name, e.created_at",
    )?;
    let enrollments = stmt
        .query_map([school_year_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "studentNo": r.get::<_, String>(2)?,
                "lastName": r.get::<_, String>(3)?,
                "firstName": r.get::<_, String>(4)?,
                "sectionId": r.get::<_, String>(5)?,
                "sectionName": r.get::<_, String>(6)?,
                "status": r.get::<_, String>(7)?,
                "isPromoted": r.get::<_, i64>(8)? != 0,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "enrollments": enrollments }))
}

fn enroll(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = param_str(params, "studentId")?;
    let school_year_id = param_str(params, "schoolYearId")?;
    let section_id = param_str(params, "sectionId")?;
    let conn = require_db(state)?;

    ensure_year_unlocked(conn, school_year_id)?;
    if !row_exists(conn, "students", student_id)? {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    if !row_exists(conn, "sections", section_id)? {
        return Err(HandlerErr::new("not_found", "section not found"));
    }
    if has_enrolled_row(conn, student_id, school_year_id)? {
        return Err(HandlerErr::new(
            "duplicate_enrollment",
            "student is already enrolled for this school year",
        ));
    }

    let id = insert_enrolled(conn, student_id, school_year_id, section_id)?;
    Ok(json!({ "enrollmentId": id }))
}

/// Close-and-reopen in one transaction: a transfer must never leave the
/// student enrolled nowhere or enrolled twice.
fn transfer(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let enrollment_id = param_str(params, "enrollmentId")?.to_string();
    let new_section_id = param_str(params, "newSectionId")?.to_string();
    let conn = require_db_mut(state)?;

    let enrollment = load_enrollment(conn, &enrollment_id)?;
    if enrollment.status != "enrolled" {
        return Err(HandlerErr::with_details(
            "invalid_transition",
            "only enrolled students can be transferred",
            json!({ "status": enrollment.status }),
        ));
    }
    if enrollment.section_id == new_section_id {
        return Err(HandlerErr::new(
            "bad_params",
            "student is already in this section",
        ));
    }
    if !row_exists(conn, "sections", &new_section_id)? {
        return Err(HandlerErr::new("not_found", "section not found"));
    }
    ensure_year_unlocked(conn, &enrollment.school_year_id)?;

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE enrollments SET status = 'transferred' WHERE id = ?",
        [&enrollment_id],
    )?;
    let new_id = insert_enrolled(
        &tx,
        &enrollment.student_id,
        &enrollment.school_year_id,
        &new_section_id,
    )?;
    tx.commit()?;
    Ok(json!({ "enrollmentId": new_id }))
}

fn close(
    state: &mut AppState,
    params: &serde_json::Value,
    terminal: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let enrollment_id = param_str(params, "enrollmentId")?;
    let conn = require_db(state)?;

    let enrollment = load_enrollment(conn, enrollment_id)?;
    if enrollment.status != "enrolled" {
        return Err(HandlerErr::with_details(
            "invalid_transition",
            format!("only enrolled students can be marked {}", terminal),
            json!({ "status": enrollment.status }),
        ));
    }
    ensure_year_unlocked(conn, &enrollment.school_year_id)?;

    conn.execute(
        "UPDATE enrollments SET status = ? WHERE id = ?",
        (terminal, enrollment_id),
    )?;
    Ok(json!({ "status": terminal }))
}

// Administrative correction only; an active enrollment must be closed first.
fn delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let enrollment_id = param_str(params, "enrollmentId")?;
    let conn = require_db(state)?;

    let enrollment = load_enrollment(conn, enrollment_id)?;
    if enrollment.status == "enrolled" {
        return Err(HandlerErr::new(
            "invalid_transition",
            "cannot delete an active enrollment",
        ));
    }
    conn.execute("DELETE FROM enrollments WHERE id = ?", [enrollment_id])?;
    Ok(json!({ "deleted": true }))
}

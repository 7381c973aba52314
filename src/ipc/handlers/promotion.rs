use crate::calc;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::enrollments::{insert_enrolled, load_enrollment};
use crate::ipc::handlers::{param_str, require_db, require_db_mut, row_exists};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "promotion.promote" => promote(state, &req.params),
        "promotion.undo" => undo(state, &req.params),
        "promotion.logs" => logs(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}

#[derive(Debug, Clone)]
struct PromoteItem {
    enrollment_id: String,
    next_section_id: String,
}

fn parse_items(params: &serde_json::Value) -> Result<Vec<PromoteItem>, HandlerErr> {
    let arr = params
        .get("items")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::new("bad_params", "items must be an array"))?;
    if arr.is_empty() {
        return Err(HandlerErr::new("bad_params", "items must not be empty"));
    }
    let mut items = Vec::with_capacity(arr.len());
    for item in arr {
        let enrollment_id = item
            .get("enrollmentId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::new("bad_params", "items[].enrollmentId is required"))?;
        let next_section_id = item
            .get("nextSectionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::new("bad_params", "items[].nextSectionId is required"))?;
        items.push(PromoteItem {
            enrollment_id: enrollment_id.to_string(),
            next_section_id: next_section_id.to_string(),
        });
    }
    Ok(items)
}

/// Bulk year-end promotion. Preconditions (unlocked target year, well-formed
/// and resolvable batch items) fail the whole call before any write; after
/// that each student is promoted in its own transaction, and a skip or
/// failure on one never aborts the rest.
fn promote(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let target_year_id = param_str(params, "targetSchoolYearId")?.to_string();
    let performed_by = param_str(params, "performedBy")?.to_string();
    let items = parse_items(params)?;
    let conn = require_db_mut(state)?;

    let target_locked: Option<i64> = conn
        .query_row(
            "SELECT is_locked FROM school_years WHERE id = ?",
            [&target_year_id],
            |r| r.get(0),
        )
        .optional()?;
    match target_locked {
        None => return Err(HandlerErr::new("not_found", "target school year not found")),
        Some(0) => {}
        Some(_) => {
            return Err(HandlerErr::new(
                "locked_year",
                "target school year is locked",
            ))
        }
    }
    for item in &items {
        if !row_exists(conn, "enrollments", &item.enrollment_id)? {
            return Err(HandlerErr::with_details(
                "not_found",
                "enrollment not found",
                json!({ "enrollmentId": item.enrollment_id }),
            ));
        }
        if !row_exists(conn, "sections", &item.next_section_id)? {
            return Err(HandlerErr::with_details(
                "not_found",
                "section not found",
                json!({ "sectionId": item.next_section_id }),
            ));
        }
    }

    let active_periods = calc::active_grading_period_ids(conn)?;
    let mut promoted = 0_i64;
    let mut skipped = 0_i64;
    let mut results: Vec<serde_json::Value> = Vec::with_capacity(items.len());

    for item in &items {
        match promote_one(conn, item, &target_year_id, &performed_by, &active_periods) {
            Ok(Some(new_enrollment_id)) => {
                promoted += 1;
                results.push(json!({
                    "enrollmentId": item.enrollment_id,
                    "status": "promoted",
                    "newEnrollmentId": new_enrollment_id,
                }));
            }
            Ok(None) => {
                skipped += 1;
                results.push(json!({
                    "enrollmentId": item.enrollment_id,
                    "status": "skipped",
                }));
            }
            Err(e) => {
                skipped += 1;
                results.push(json!({
                    "enrollmentId": item.enrollment_id,
                    "status": "skipped",
                    "reason": e.code,
                }));
            }
        }
    }

    Ok(json!({
        "promoted": promoted,
        "skipped": skipped,
        "results": results,
    }))
}

/// One student's promotion: new target-year enrollment, `is_promoted` on the
/// source row, one audit log row — all or nothing. Already-promoted and
/// ineligible students are silent skips (`Ok(None)`), keeping the batch
/// idempotent per student.
fn promote_one(
    conn: &mut Connection,
    item: &PromoteItem,
    target_year_id: &str,
    performed_by: &str,
    active_periods: &[String],
) -> Result<Option<String>, HandlerErr> {
    let enrollment = load_enrollment(conn, &item.enrollment_id)?;
    if enrollment.is_promoted {
        return Ok(None);
    }
    if !calc::is_eligible_for_promotion(
        conn,
        &enrollment.student_id,
        &enrollment.school_year_id,
        active_periods,
    )? {
        return Ok(None);
    }

    let created_at = chrono::Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    let new_enrollment_id = insert_enrolled(
        &tx,
        &enrollment.student_id,
        target_year_id,
        &item.next_section_id,
    )?;
    tx.execute(
        "UPDATE enrollments SET is_promoted = 1 WHERE id = ?",
        [&item.enrollment_id],
    )?;
    tx.execute(
        "INSERT INTO promotion_logs(id, student_id, from_school_year_id, to_school_year_id,
                                    from_section_id, to_section_id, action, performed_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 'promote', ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &enrollment.student_id,
            &enrollment.school_year_id,
            target_year_id,
            &enrollment.section_id,
            &item.next_section_id,
            performed_by,
            &created_at,
        ),
    )?;
    tx.commit()?;
    Ok(Some(new_enrollment_id))
}

/// Reverse a promotion while the target year is still open. Deletes the
/// student's enrollments in every year other than the source year (broader
/// than the single promotion-created row, matching how double promotions get
/// cleaned up), drops the matching promote log rows, and clears the flag.
fn undo(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let enrollment_id = param_str(params, "enrollmentId")?.to_string();
    let conn = require_db_mut(state)?;

    let enrollment = load_enrollment(conn, &enrollment_id)?;

    // A locked year anywhere the undo would reach means the promotion is final.
    let mut stmt = conn.prepare(
        "SELECT DISTINCT y.id FROM school_years y
         WHERE y.is_locked = 1
           AND y.id != ?1
           AND (y.id IN (SELECT to_school_year_id FROM promotion_logs
                         WHERE student_id = ?2 AND from_school_year_id = ?1 AND action = 'promote')
                OR y.id IN (SELECT school_year_id FROM enrollments
                            WHERE student_id = ?2 AND school_year_id != ?1))",
    )?;
    let locked_targets: Vec<String> = stmt
        .query_map((&enrollment.school_year_id, &enrollment.student_id), |r| {
            r.get::<_, String>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);
    if !locked_targets.is_empty() {
        return Err(HandlerErr::with_details(
            "locked_year",
            "target school year is locked; promotion is final",
            json!({ "lockedYearIds": locked_targets }),
        ));
    }

    if !enrollment.is_promoted {
        // Nothing to reverse; undo stays retryable.
        return Ok(json!({ "undone": false }));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM enrollments WHERE student_id = ? AND school_year_id != ?",
        (&enrollment.student_id, &enrollment.school_year_id),
    )?;
    tx.execute(
        "DELETE FROM promotion_logs
         WHERE student_id = ? AND from_school_year_id = ? AND action = 'promote'",
        (&enrollment.student_id, &enrollment.school_year_id),
    )?;
    tx.execute(
        "UPDATE enrollments SET is_promoted = 0 WHERE id = ?",
        [&enrollment_id],
    )?;
    tx.commit()?;
    Ok(json!({ "undone": true }))
}

fn logs(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let from_year_id = param_str(params, "fromSchoolYearId")?;
    let conn = require_db(state)?;
    if !row_exists(conn, "school_years", from_year_id)? {
        return Err(HandlerErr::new("not_found", "school year not found"));
    }
    let mut stmt = conn.prepare(
        "SELECT l.id, l.student_id, s.student_no, s.last_name, s.first_name,
                l.to_school_year_id, l.from_section_id, fs.name,
                l.to_section_id, ts.name, ts.grade_level,
                l.action, l.performed_by, l.created_at
         FROM promotion_logs l
         JOIN students s ON s.id = l.student_id
         JOIN sections fs ON fs.id = l.from_section_id
         JOIN sections ts ON ts.id = l.to_section_id
         WHERE l.from_school_year_id = ?
         ORDER BY l.created_at, s.last_name",
    )?;
    let entries = stmt
        .query_map([from_year_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "studentNo": r.get::<_, String>(2)?,
                "lastName": r.get::<_, String>(3)?,
                "firstName": r.get::<_, String>(4)?,
                "toSchoolYearId": r.get::<_, String>(5)?,
                "fromSectionId": r.get::<_, String>(6)?,
                "fromSectionName": r.get::<_, String>(7)?,
                "toSectionId": r.get::<_, String>(8)?,
                "promotedTo": {
                    "name": r.get::<_, String>(9)?,
                    "gradeLevel": r.get::<_, i64>(10)?,
                },
                "action": r.get::<_, String>(11)?,
                "performedBy": r.get::<_, String>(12)?,
                "createdAt": r.get::<_, String>(13)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "logs": entries }))
}

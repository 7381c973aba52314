//! IPC surface over the grade aggregator in `calc`. All pure reads; the
//! caller resolves and passes any "active period" context it wants pinned,
//! otherwise the currently active grading periods are used.

use crate::calc;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::{param_opt_str, param_str, require_db, row_exists};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "grades.period" => period(state, &req.params),
        "grades.class" => class(state, &req.params),
        "grades.final" => final_grade(state, &req.params),
        "grades.reportCard" => report_card(state, &req.params),
        "grades.eligibility" => eligibility(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}

fn optional_period_ids(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<Vec<String>, HandlerErr> {
    match params.get("gradingPeriodIds") {
        None => Ok(calc::active_grading_period_ids(conn)?),
        Some(v) if v.is_null() => Ok(calc::active_grading_period_ids(conn)?),
        Some(v) => {
            let arr = v.as_array().ok_or_else(|| {
                HandlerErr::new("bad_params", "gradingPeriodIds must be an array of ids")
            })?;
            let mut ids = Vec::with_capacity(arr.len());
            for item in arr {
                let id = item.as_str().ok_or_else(|| {
                    HandlerErr::new("bad_params", "gradingPeriodIds must be an array of ids")
                })?;
                ids.push(id.to_string());
            }
            Ok(ids)
        }
    }
}

fn period(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = param_str(params, "studentId")?;
    let class_id = param_str(params, "classId")?;
    let grading_period_id = param_opt_str(params, "gradingPeriodId");
    let conn = require_db(state)?;
    if !row_exists(conn, "students", student_id)? {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    if !row_exists(conn, "classes", class_id)? {
        return Err(HandlerErr::new("not_found", "class not found"));
    }
    let grade = calc::student_period_grade(conn, student_id, class_id, grading_period_id)?;
    Ok(json!({ "grade": grade }))
}

fn class(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(params, "classId")?;
    let grading_period_id = param_opt_str(params, "gradingPeriodId");
    let conn = require_db(state)?;
    let grades = calc::class_period_grades(conn, class_id, grading_period_id)?;
    Ok(json!({ "grades": grades }))
}

fn final_grade(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = param_str(params, "studentId")?;
    let class_id = param_str(params, "classId")?;
    let conn = require_db(state)?;
    if !row_exists(conn, "students", student_id)? {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    if !row_exists(conn, "classes", class_id)? {
        return Err(HandlerErr::new("not_found", "class not found"));
    }
    let period_ids = optional_period_ids(conn, params)?;
    let grade = calc::final_subject_grade(conn, student_id, class_id, &period_ids)?;
    Ok(json!({ "finalGrade": grade }))
}

fn report_card(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = param_str(params, "studentId")?;
    let school_year_id = param_str(params, "schoolYearId")?;
    let conn = require_db(state)?;
    if !row_exists(conn, "students", student_id)? {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    if !row_exists(conn, "school_years", school_year_id)? {
        return Err(HandlerErr::new("not_found", "school year not found"));
    }
    let subjects = calc::report_card(conn, student_id, school_year_id)?;
    Ok(json!({ "subjects": subjects }))
}

fn eligibility(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = param_str(params, "studentId")?;
    let school_year_id = param_str(params, "schoolYearId")?;
    let conn = require_db(state)?;
    if !row_exists(conn, "students", student_id)? {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    if !row_exists(conn, "school_years", school_year_id)? {
        return Err(HandlerErr::new("not_found", "school year not found"));
    }
    let period_ids = optional_period_ids(conn, params)?;
    let eligible = calc::is_eligible_for_promotion(conn, student_id, school_year_id, &period_ids)?;
    Ok(json!({ "eligible": eligible }))
}

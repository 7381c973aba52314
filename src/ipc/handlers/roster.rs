//! Reference-data records the engine joins against. The roster is owned by
//! an external identity provider in the larger system; the daemon keeps a
//! local copy so grade and promotion queries stay self-contained.

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::{param_i64, param_str, require_db, row_exists};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "students.create" => create_student(state, &req.params),
        "students.list" => list_students(state),
        "teachers.create" => create_teacher(state, &req.params),
        "teachers.list" => list_teachers(state),
        "sections.create" => create_section(state, &req.params),
        "sections.list" => list_sections(state),
        "subjects.create" => create_subject(state, &req.params),
        "subjects.list" => list_subjects(state),
        "classes.create" => create_class(state, &req.params),
        "classes.list" => list_classes(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}

fn create_student(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_no = param_str(params, "studentNo")?.trim().to_string();
    let last_name = param_str(params, "lastName")?.trim().to_string();
    let first_name = param_str(params, "firstName")?.trim().to_string();
    let conn = require_db(state)?;
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE student_no = ?",
            [&student_no],
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::new("bad_params", "student number already exists"));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, student_no, last_name, first_name, status)
         VALUES (?, ?, ?, ?, 'active')",
        (&id, &student_no, &last_name, &first_name),
    )?;
    Ok(json!({ "studentId": id }))
}

fn list_students(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut stmt = conn.prepare(
        "SELECT id, student_no, last_name, first_name, status
         FROM students ORDER BY last_name, first_name",
    )?;
    let students = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentNo": r.get::<_, String>(1)?,
                "lastName": r.get::<_, String>(2)?,
                "firstName": r.get::<_, String>(3)?,
                "status": r.get::<_, String>(4)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "students": students }))
}

fn create_teacher(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let last_name = param_str(params, "lastName")?.trim().to_string();
    let first_name = param_str(params, "firstName")?.trim().to_string();
    let conn = require_db(state)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, last_name, first_name) VALUES (?, ?, ?)",
        (&id, &last_name, &first_name),
    )?;
    Ok(json!({ "teacherId": id }))
}

fn list_teachers(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut stmt = conn.prepare(
        "SELECT id, last_name, first_name FROM teachers ORDER BY last_name, first_name",
    )?;
    let teachers = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "lastName": r.get::<_, String>(1)?,
                "firstName": r.get::<_, String>(2)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "teachers": teachers }))
}

fn create_section(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = param_str(params, "name")?.trim().to_string();
    let grade_level = param_i64(params, "gradeLevel")?;
    if grade_level < 1 {
        return Err(HandlerErr::new("bad_params", "gradeLevel must be >= 1"));
    }
    let conn = require_db(state)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sections(id, name, grade_level, status) VALUES (?, ?, ?, 'active')",
        (&id, &name, grade_level),
    )?;
    Ok(json!({ "sectionId": id }))
}

fn list_sections(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut stmt = conn.prepare(
        "SELECT id, name, grade_level, status FROM sections ORDER BY grade_level, name",
    )?;
    let sections = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "gradeLevel": r.get::<_, i64>(2)?,
                "status": r.get::<_, String>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "sections": sections }))
}

fn create_subject(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = param_str(params, "name")?.trim().to_string();
    let conn = require_db(state)?;
    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM subjects WHERE name = ?", [&name], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::new("bad_params", "subject already exists"));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO subjects(id, name) VALUES (?, ?)", (&id, &name))?;
    Ok(json!({ "subjectId": id }))
}

fn list_subjects(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut stmt = conn.prepare("SELECT id, name FROM subjects ORDER BY name")?;
    let subjects = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "subjects": subjects }))
}

fn create_class(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_year_id = param_str(params, "schoolYearId")?;
    let section_id = param_str(params, "sectionId")?;
    let subject_id = param_str(params, "subjectId")?;
    let teacher_id = param_str(params, "teacherId")?;
    let conn = require_db(state)?;
    for (table, id) in [
        ("school_years", school_year_id),
        ("sections", section_id),
        ("subjects", subject_id),
        ("teachers", teacher_id),
    ] {
        if !row_exists(conn, table, id)? {
            return Err(HandlerErr::with_details(
                "not_found",
                "referenced record not found",
                json!({ "table": table, "id": id }),
            ));
        }
    }
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM classes WHERE school_year_id = ? AND section_id = ? AND subject_id = ?",
            (school_year_id, section_id, subject_id),
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::new(
            "bad_params",
            "class already exists for this year, section, and subject",
        ));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, school_year_id, section_id, subject_id, teacher_id, status)
         VALUES (?, ?, ?, ?, ?, 'active')",
        (&id, school_year_id, section_id, subject_id, teacher_id),
    )?;
    Ok(json!({ "classId": id }))
}

fn list_classes(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_year_id = param_str(params, "schoolYearId")?;
    let conn = require_db(state)?;
    let mut stmt = conn.prepare(
        "SELECT c.id, c.section_id, sec.name, c.subject_id, subj.name, c.teacher_id, c.status
         FROM classes c
         JOIN sections sec ON sec.id = c.section_id
         JOIN subjects subj ON subj.id = c.subject_id
         WHERE c.school_year_id = ?
         ORDER BY sec.grade_level, sec.name, subj.name",
    )?;
    let classes = stmt
        .query_map([school_year_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "sectionId": r.get::<_, String>(1)?,
                "sectionName": r.get::<_, String>(2)?,
                "subjectId": r.get::<_, String>(3)?,
                "subjectName": r.get::<_, String>(4)?,
                "teacherId": r.get::<_, String>(5)?,
                "status": r.get::<_, String>(6)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "classes": classes }))
}

use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

/// Minimum final grade, per subject, for promotion eligibility (100 scale).
pub const PASSING_GRADE: f64 = 75.0;

/// Half-up rounding to two decimals: `floor(100*x + 0.5) / 100`.
pub fn round_half_up_2(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

fn db_err(e: rusqlite::Error) -> CalcError {
    CalcError::new("db_query_failed", e.to_string())
}

/// One published activity in scope: (activity_id, max_score).
#[derive(Debug, Clone)]
pub struct PublishedActivity {
    pub id: String,
    pub max_score: f64,
}

/// Percentage grade over (max_score, attempted score) pairs. Unattempted
/// activities (score `None`) contribute to neither sum; an empty or fully
/// unattempted scope has no grade.
pub fn aggregate_percent<I>(rows: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, Option<f64>)>,
{
    let mut total_score = 0.0_f64;
    let mut total_max = 0.0_f64;
    for (max_score, score) in rows {
        let Some(v) = score else {
            continue;
        };
        total_score += v;
        total_max += max_score;
    }
    if total_max <= 0.0 {
        return None;
    }
    Some(round_half_up_2(total_score / total_max * 100.0))
}

/// Mean of already-rounded period grades, rounded the same way.
pub fn mean_grade(grades: &[f64]) -> Option<f64> {
    if grades.is_empty() {
        return None;
    }
    let sum: f64 = grades.iter().sum();
    Some(round_half_up_2(sum / grades.len() as f64))
}

pub fn published_activities(
    conn: &Connection,
    class_id: &str,
    grading_period_id: Option<&str>,
) -> Result<Vec<PublishedActivity>, CalcError> {
    let mut sql = String::from(
        "SELECT id, max_score FROM activities
         WHERE class_id = ?1 AND is_published = 1",
    );
    let mut binds: Vec<Value> = vec![Value::Text(class_id.to_string())];
    if let Some(gp) = grading_period_id {
        sql.push_str(" AND grading_period_id = ?2");
        binds.push(Value::Text(gp.to_string()));
    }
    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    stmt.query_map(params_from_iter(binds), |r| {
        Ok(PublishedActivity {
            id: r.get(0)?,
            max_score: r.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

/// One batched score fetch: (activity_id, student_id) -> score. A missing
/// pair and a NULL score both read back as "not attempted".
pub fn scores_by_pair(
    conn: &Connection,
    activity_ids: &[String],
    student_ids: &[String],
) -> Result<HashMap<(String, String), Option<f64>>, CalcError> {
    let mut map: HashMap<(String, String), Option<f64>> = HashMap::new();
    if activity_ids.is_empty() || student_ids.is_empty() {
        return Ok(map);
    }

    let activity_placeholders = std::iter::repeat("?")
        .take(activity_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let student_placeholders = std::iter::repeat("?")
        .take(student_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT activity_id, student_id, score
         FROM activity_scores
         WHERE activity_id IN ({}) AND student_id IN ({})",
        activity_placeholders, student_placeholders
    );
    let mut binds: Vec<Value> = Vec::with_capacity(activity_ids.len() + student_ids.len());
    for id in activity_ids {
        binds.push(Value::Text(id.clone()));
    }
    for id in student_ids {
        binds.push(Value::Text(id.clone()));
    }

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params_from_iter(binds), |r| {
            let activity_id: String = r.get(0)?;
            let student_id: String = r.get(1)?;
            let score: Option<f64> = r.get(2)?;
            Ok((activity_id, student_id, score))
        })
        .map_err(db_err)?;
    for row in rows {
        let (activity_id, student_id, score) = row.map_err(db_err)?;
        map.insert((activity_id, student_id), score);
    }
    Ok(map)
}

/// Grade for one student in one class, optionally narrowed to one grading
/// period. Only published activities count; missing work is excluded from
/// both numerator and denominator, never treated as zero.
pub fn student_period_grade(
    conn: &Connection,
    student_id: &str,
    class_id: &str,
    grading_period_id: Option<&str>,
) -> Result<Option<f64>, CalcError> {
    let activities = published_activities(conn, class_id, grading_period_id)?;
    if activities.is_empty() {
        return Ok(None);
    }
    let activity_ids: Vec<String> = activities.iter().map(|a| a.id.clone()).collect();
    let student_key = student_id.to_string();
    let scores = scores_by_pair(conn, &activity_ids, std::slice::from_ref(&student_key))?;
    Ok(aggregate_percent(activities.iter().map(|a| {
        let score = scores
            .get(&(a.id.clone(), student_key.clone()))
            .copied()
            .flatten();
        (a.max_score, score)
    })))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGrade {
    pub student_id: String,
    pub student_no: String,
    pub display_name: String,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone)]
struct RosterStudent {
    id: String,
    student_no: String,
    display_name: String,
}

fn class_roster(conn: &Connection, class_id: &str) -> Result<Vec<RosterStudent>, CalcError> {
    let class_scope: Option<(String, String)> = conn
        .query_row(
            "SELECT school_year_id, section_id FROM classes WHERE id = ?",
            [class_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    let Some((school_year_id, section_id)) = class_scope else {
        return Err(CalcError::new("not_found", "class not found"));
    };

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.student_no, s.last_name, s.first_name
             FROM enrollments e
             JOIN students s ON s.id = e.student_id
             WHERE e.school_year_id = ? AND e.section_id = ? AND e.status = 'enrolled'
             ORDER BY s.last_name, s.first_name",
        )
        .map_err(db_err)?;
    stmt.query_map((school_year_id, section_id), |r| {
        let last: String = r.get(2)?;
        let first: String = r.get(3)?;
        Ok(RosterStudent {
            id: r.get(0)?,
            student_no: r.get(1)?,
            display_name: format!("{}, {}", last, first),
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

/// Period grades for every enrolled student of the class's section/year,
/// computed from a single batched score query.
pub fn class_period_grades(
    conn: &Connection,
    class_id: &str,
    grading_period_id: Option<&str>,
) -> Result<Vec<StudentGrade>, CalcError> {
    let roster = class_roster(conn, class_id)?;
    let activities = published_activities(conn, class_id, grading_period_id)?;
    let activity_ids: Vec<String> = activities.iter().map(|a| a.id.clone()).collect();
    let student_ids: Vec<String> = roster.iter().map(|s| s.id.clone()).collect();
    let scores = scores_by_pair(conn, &activity_ids, &student_ids)?;

    Ok(roster
        .into_iter()
        .map(|s| {
            let grade = aggregate_percent(activities.iter().map(|a| {
                let score = scores
                    .get(&(a.id.clone(), s.id.clone()))
                    .copied()
                    .flatten();
                (a.max_score, score)
            }));
            StudentGrade {
                student_id: s.id,
                student_no: s.student_no,
                display_name: s.display_name,
                grade,
            }
        })
        .collect())
}

/// All currently active grading periods, across every semester, ordered.
/// Zero, one, or several may be active at once.
pub fn active_grading_period_ids(conn: &Connection) -> Result<Vec<String>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT gp.id
             FROM grading_periods gp
             JOIN semesters sem ON sem.id = gp.semester_id
             WHERE gp.status = 'active'
             ORDER BY sem.ord, gp.ord",
        )
        .map_err(db_err)?;
    stmt.query_map([], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)
}

/// Final subject grade: mean of the non-absent period grades over the given
/// period set. Periods with no grade are dropped, not zeroed; zero
/// contributing periods means no final grade.
pub fn final_subject_grade(
    conn: &Connection,
    student_id: &str,
    class_id: &str,
    grading_period_ids: &[String],
) -> Result<Option<f64>, CalcError> {
    let mut grades: Vec<f64> = Vec::new();
    for gp in grading_period_ids {
        if let Some(g) = student_period_grade(conn, student_id, class_id, Some(gp))? {
            grades.push(g);
        }
    }
    Ok(mean_grade(&grades))
}

fn enrolled_section_id(
    conn: &Connection,
    student_id: &str,
    school_year_id: &str,
) -> Result<Option<String>, CalcError> {
    conn.query_row(
        "SELECT section_id FROM enrollments
         WHERE student_id = ? AND school_year_id = ? AND status = 'enrolled'",
        (student_id, school_year_id),
        |r| r.get(0),
    )
    .optional()
    .map_err(db_err)
}

fn section_classes(
    conn: &Connection,
    school_year_id: &str,
    section_id: &str,
) -> Result<Vec<(String, String)>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT c.id, subj.name
             FROM classes c
             JOIN subjects subj ON subj.id = c.subject_id
             WHERE c.school_year_id = ? AND c.section_id = ?
             ORDER BY subj.name",
        )
        .map_err(db_err)?;
    stmt.query_map((school_year_id, section_id), |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

/// Promotion gate: every subject of the student's enrolled section/year must
/// have a final grade, and every final grade must reach PASSING_GRADE. A
/// subject with no grade counts as failing, not as unevaluated.
pub fn is_eligible_for_promotion(
    conn: &Connection,
    student_id: &str,
    school_year_id: &str,
    grading_period_ids: &[String],
) -> Result<bool, CalcError> {
    let Some(section_id) = enrolled_section_id(conn, student_id, school_year_id)? else {
        return Ok(false);
    };
    for (class_id, _subject) in section_classes(conn, school_year_id, &section_id)? {
        match final_subject_grade(conn, student_id, &class_id, grading_period_ids)? {
            Some(g) if g >= PASSING_GRADE => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReport {
    pub class_id: String,
    pub subject: String,
    pub period_grades: HashMap<String, Option<f64>>,
    pub final_grade: Option<f64>,
}

/// Report-card model: for each subject of the student's enrolled section,
/// the grade per grading period of that school year plus the final grade
/// over the currently active periods.
pub fn report_card(
    conn: &Connection,
    student_id: &str,
    school_year_id: &str,
) -> Result<Vec<SubjectReport>, CalcError> {
    let Some(section_id) = enrolled_section_id(conn, student_id, school_year_id)? else {
        return Ok(Vec::new());
    };

    let mut stmt = conn
        .prepare(
            "SELECT gp.id
             FROM grading_periods gp
             JOIN semesters sem ON sem.id = gp.semester_id
             WHERE sem.school_year_id = ?
             ORDER BY sem.ord, gp.ord",
        )
        .map_err(db_err)?;
    let year_periods: Vec<String> = stmt
        .query_map([school_year_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let active_periods = active_grading_period_ids(conn)?;

    let mut report = Vec::new();
    for (class_id, subject) in section_classes(conn, school_year_id, &section_id)? {
        let mut period_grades: HashMap<String, Option<f64>> = HashMap::new();
        for gp in &year_periods {
            let grade = student_period_grade(conn, student_id, &class_id, Some(gp))?;
            period_grades.insert(gp.clone(), grade);
        }
        let final_grade = final_subject_grade(conn, student_id, &class_id, &active_periods)?;
        report.push(SubjectReport {
            class_id,
            subject,
            period_grades,
            final_grade,
        });
    }
    Ok(report)
}

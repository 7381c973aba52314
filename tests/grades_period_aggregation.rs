mod test_support;

use serde_json::{json, Value};
use test_support::{id_of, temp_workspace, Daemon};

/// Year + semester + one activated grading period + section/teacher/subject.
struct Academics {
    year_id: String,
    period_id: String,
    section_id: String,
    teacher_id: String,
}

fn seed_academics(d: &mut Daemon) -> Academics {
    let year = d.ok(
        "schoolYears.create",
        json!({ "name": "SY 2025-2026", "startDate": "2025-08-01", "endDate": "2026-05-31" }),
    );
    let year_id = id_of(&year, "schoolYearId");
    d.ok("schoolYears.activate", json!({ "schoolYearId": year_id }));
    let sem = d.ok(
        "semesters.create",
        json!({ "schoolYearId": year_id, "name": "1st Semester", "order": 1 }),
    );
    let semester_id = id_of(&sem, "semesterId");
    d.ok("semesters.activate", json!({ "semesterId": semester_id }));
    let gp = d.ok(
        "gradingPeriods.create",
        json!({ "semesterId": semester_id, "name": "Q1", "order": 1 }),
    );
    let period_id = id_of(&gp, "gradingPeriodId");
    d.ok(
        "gradingPeriods.activate",
        json!({ "gradingPeriodId": period_id }),
    );
    let section = d.ok(
        "sections.create",
        json!({ "name": "Diamond", "gradeLevel": 7 }),
    );
    let teacher = d.ok(
        "teachers.create",
        json!({ "lastName": "Reyes", "firstName": "Ana" }),
    );
    Academics {
        year_id,
        period_id,
        section_id: id_of(&section, "sectionId"),
        teacher_id: id_of(&teacher, "teacherId"),
    }
}

fn create_class(d: &mut Daemon, a: &Academics, subject: &str) -> String {
    let subj = d.ok("subjects.create", json!({ "name": subject }));
    let subject_id = id_of(&subj, "subjectId");
    let class = d.ok(
        "classes.create",
        json!({
            "schoolYearId": a.year_id,
            "sectionId": a.section_id,
            "subjectId": subject_id,
            "teacherId": a.teacher_id,
        }),
    );
    id_of(&class, "classId")
}

fn create_student(d: &mut Daemon, a: &Academics, no: &str, last: &str, first: &str) -> String {
    let student = d.ok(
        "students.create",
        json!({ "studentNo": no, "lastName": last, "firstName": first }),
    );
    let student_id = id_of(&student, "studentId");
    d.ok(
        "enrollments.enroll",
        json!({ "studentId": student_id, "schoolYearId": a.year_id, "sectionId": a.section_id }),
    );
    student_id
}

fn add_published_activity(
    d: &mut Daemon,
    class_id: &str,
    period_id: &str,
    name: &str,
    max_score: f64,
) -> String {
    let created = d.ok(
        "activities.create",
        json!({
            "classId": class_id,
            "gradingPeriodId": period_id,
            "name": name,
            "type": "quiz",
            "maxScore": max_score,
        }),
    );
    let activity_id = id_of(&created, "activityId");
    d.ok(
        "activities.update",
        json!({
            "activityId": activity_id,
            "name": name,
            "type": "quiz",
            "maxScore": max_score,
            "isPublished": true,
        }),
    );
    activity_id
}

#[test]
fn two_quizzes_aggregate_to_percentage() {
    let ws = temp_workspace("registrar-period-grade");
    let mut d = Daemon::spawn(&ws);
    let a = seed_academics(&mut d);
    let class_id = create_class(&mut d, &a, "Mathematics");
    let student_id = create_student(&mut d, &a, "2025-0001", "Santos", "Liza");

    let quiz1 = add_published_activity(&mut d, &class_id, &a.period_id, "Quiz 1", 100.0);
    let quiz2 = add_published_activity(&mut d, &class_id, &a.period_id, "Quiz 2", 50.0);
    d.ok(
        "scores.save",
        json!({ "activityId": quiz1, "scores": [{ "studentId": student_id, "score": 80.0 }] }),
    );
    d.ok(
        "scores.save",
        json!({ "activityId": quiz2, "scores": [{ "studentId": student_id, "score": 40.0 }] }),
    );

    // (80 + 40) / (100 + 50) = 80.00
    let res = d.ok(
        "grades.period",
        json!({ "studentId": student_id, "classId": class_id, "gradingPeriodId": a.period_id }),
    );
    assert_eq!(res["grade"].as_f64(), Some(80.0));

    // Same answer with no period filter: the class has one period's worth of work.
    let res = d.ok(
        "grades.period",
        json!({ "studentId": student_id, "classId": class_id }),
    );
    assert_eq!(res["grade"].as_f64(), Some(80.0));
}

#[test]
fn unscored_published_activity_yields_no_grade() {
    let ws = temp_workspace("registrar-unscored");
    let mut d = Daemon::spawn(&ws);
    let a = seed_academics(&mut d);
    let class_id = create_class(&mut d, &a, "Science");
    let student_id = create_student(&mut d, &a, "2025-0002", "Cruz", "Ben");

    add_published_activity(&mut d, &class_id, &a.period_id, "Exam 1", 100.0);

    let res = d.ok(
        "grades.period",
        json!({ "studentId": student_id, "classId": class_id, "gradingPeriodId": a.period_id }),
    );
    assert!(res["grade"].is_null(), "no attempts must mean no grade");
}

#[test]
fn null_score_is_excluded_but_zero_counts() {
    let ws = temp_workspace("registrar-null-vs-zero");
    let mut d = Daemon::spawn(&ws);
    let a = seed_academics(&mut d);
    let class_id = create_class(&mut d, &a, "English");
    let student_id = create_student(&mut d, &a, "2025-0003", "Lim", "Carl");

    let q1 = add_published_activity(&mut d, &class_id, &a.period_id, "Quiz 1", 100.0);
    let q2 = add_published_activity(&mut d, &class_id, &a.period_id, "Quiz 2", 100.0);

    // Explicit null row: not attempted, excluded from both sums.
    d.ok(
        "scores.save",
        json!({ "activityId": q1, "scores": [{ "studentId": student_id, "score": null }] }),
    );
    d.ok(
        "scores.save",
        json!({ "activityId": q2, "scores": [{ "studentId": student_id, "score": 50.0 }] }),
    );
    let res = d.ok(
        "grades.period",
        json!({ "studentId": student_id, "classId": class_id }),
    );
    assert_eq!(res["grade"].as_f64(), Some(50.0));

    // A real zero drags the grade down instead of being skipped.
    d.ok(
        "scores.save",
        json!({ "activityId": q1, "scores": [{ "studentId": student_id, "score": 0.0 }] }),
    );
    let res = d.ok(
        "grades.period",
        json!({ "studentId": student_id, "classId": class_id }),
    );
    assert_eq!(res["grade"].as_f64(), Some(25.0));
}

#[test]
fn unpublished_activities_stay_out_of_the_grade() {
    let ws = temp_workspace("registrar-draft-activity");
    let mut d = Daemon::spawn(&ws);
    let a = seed_academics(&mut d);
    let class_id = create_class(&mut d, &a, "History");
    let student_id = create_student(&mut d, &a, "2025-0004", "Ong", "Dana");

    let published = add_published_activity(&mut d, &class_id, &a.period_id, "Quiz 1", 100.0);
    // Draft gradebook column: created but never published.
    let draft = d.ok(
        "activities.create",
        json!({
            "classId": class_id,
            "gradingPeriodId": a.period_id,
            "name": "Draft Exam",
            "type": "exam",
            "maxScore": 200.0,
        }),
    );
    let draft_id = id_of(&draft, "activityId");

    d.ok(
        "scores.save",
        json!({ "activityId": published, "scores": [{ "studentId": student_id, "score": 90.0 }] }),
    );
    d.ok(
        "scores.save",
        json!({ "activityId": draft_id, "scores": [{ "studentId": student_id, "score": 10.0 }] }),
    );

    let res = d.ok(
        "grades.period",
        json!({ "studentId": student_id, "classId": class_id }),
    );
    assert_eq!(res["grade"].as_f64(), Some(90.0));
}

#[test]
fn class_grades_cover_the_roster() {
    let ws = temp_workspace("registrar-class-grades");
    let mut d = Daemon::spawn(&ws);
    let a = seed_academics(&mut d);
    let class_id = create_class(&mut d, &a, "Filipino");
    let scored = create_student(&mut d, &a, "2025-0005", "Uy", "Ella");
    let unscored = create_student(&mut d, &a, "2025-0006", "Velasco", "Finn");

    let quiz = add_published_activity(&mut d, &class_id, &a.period_id, "Quiz 1", 40.0);
    d.ok(
        "scores.save",
        json!({ "activityId": quiz, "scores": [{ "studentId": scored, "score": 30.0 }] }),
    );

    let res = d.ok(
        "grades.class",
        json!({ "classId": class_id, "gradingPeriodId": a.period_id }),
    );
    let grades = res["grades"].as_array().expect("grades array");
    assert_eq!(grades.len(), 2);
    let by_id: std::collections::HashMap<&str, &Value> = grades
        .iter()
        .map(|g| (g["studentId"].as_str().unwrap(), g))
        .collect();
    assert_eq!(by_id[scored.as_str()]["grade"].as_f64(), Some(75.0));
    assert!(by_id[unscored.as_str()]["grade"].is_null());
}

#[test]
fn score_above_max_is_rejected() {
    let ws = temp_workspace("registrar-score-bounds");
    let mut d = Daemon::spawn(&ws);
    let a = seed_academics(&mut d);
    let class_id = create_class(&mut d, &a, "Values");
    let student_id = create_student(&mut d, &a, "2025-0007", "Wong", "Gio");
    let quiz = add_published_activity(&mut d, &class_id, &a.period_id, "Quiz 1", 20.0);

    let code = d.err_code(
        "scores.save",
        json!({ "activityId": quiz, "scores": [{ "studentId": student_id, "score": 21.0 }] }),
    );
    assert_eq!(code, "bad_params");
}

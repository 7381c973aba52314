mod test_support;

use serde_json::json;
use test_support::{id_of, temp_workspace, Daemon};

struct Academics {
    year_id: String,
    // Q1 lives in semester 1, Q2 in semester 2, so both can be active at once.
    q1_id: String,
    q2_id: String,
    sem2_id: String,
    section_id: String,
    teacher_id: String,
    student_id: String,
}

fn seed(d: &mut Daemon) -> Academics {
    let year = d.ok(
        "schoolYears.create",
        json!({ "name": "SY 2025-2026", "startDate": "2025-08-01", "endDate": "2026-05-31" }),
    );
    let year_id = id_of(&year, "schoolYearId");
    d.ok("schoolYears.activate", json!({ "schoolYearId": year_id }));

    let sem1 = id_of(
        &d.ok(
            "semesters.create",
            json!({ "schoolYearId": year_id, "name": "1st Semester", "order": 1 }),
        ),
        "semesterId",
    );
    let sem2 = id_of(
        &d.ok(
            "semesters.create",
            json!({ "schoolYearId": year_id, "name": "2nd Semester", "order": 2 }),
        ),
        "semesterId",
    );
    let q1 = id_of(
        &d.ok(
            "gradingPeriods.create",
            json!({ "semesterId": sem1, "name": "Q1", "order": 1 }),
        ),
        "gradingPeriodId",
    );
    let q2 = id_of(
        &d.ok(
            "gradingPeriods.create",
            json!({ "semesterId": sem2, "name": "Q2", "order": 1 }),
        ),
        "gradingPeriodId",
    );
    d.ok("gradingPeriods.activate", json!({ "gradingPeriodId": q1 }));
    d.ok("gradingPeriods.activate", json!({ "gradingPeriodId": q2 }));

    let section_id = id_of(
        &d.ok("sections.create", json!({ "name": "Ruby", "gradeLevel": 8 })),
        "sectionId",
    );
    let teacher_id = id_of(
        &d.ok(
            "teachers.create",
            json!({ "lastName": "Torres", "firstName": "Mia" }),
        ),
        "teacherId",
    );
    let student_id = id_of(
        &d.ok(
            "students.create",
            json!({ "studentNo": "2025-1001", "lastName": "Abad", "firstName": "Nina" }),
        ),
        "studentId",
    );
    d.ok(
        "enrollments.enroll",
        json!({ "studentId": student_id, "schoolYearId": year_id, "sectionId": section_id }),
    );

    Academics {
        year_id,
        q1_id: q1,
        q2_id: q2,
        sem2_id: sem2,
        section_id,
        teacher_id,
        student_id,
    }
}

fn create_class(d: &mut Daemon, a: &Academics, subject: &str) -> String {
    let subject_id = id_of(&d.ok("subjects.create", json!({ "name": subject })), "subjectId");
    id_of(
        &d.ok(
            "classes.create",
            json!({
                "schoolYearId": a.year_id,
                "sectionId": a.section_id,
                "subjectId": subject_id,
                "teacherId": a.teacher_id,
            }),
        ),
        "classId",
    )
}

fn add_scored_activity(
    d: &mut Daemon,
    class_id: &str,
    period_id: &str,
    name: &str,
    max_score: f64,
    student_id: &str,
    score: f64,
) {
    let activity_id = id_of(
        &d.ok(
            "activities.create",
            json!({
                "classId": class_id,
                "gradingPeriodId": period_id,
                "name": name,
                "type": "exam",
                "maxScore": max_score,
            }),
        ),
        "activityId",
    );
    d.ok(
        "activities.update",
        json!({
            "activityId": activity_id,
            "name": name,
            "type": "exam",
            "maxScore": max_score,
            "isPublished": true,
        }),
    );
    d.ok(
        "scores.save",
        json!({ "activityId": activity_id, "scores": [{ "studentId": student_id, "score": score }] }),
    );
}

#[test]
fn final_grade_averages_active_periods() {
    let ws = temp_workspace("registrar-final-grade");
    let mut d = Daemon::spawn(&ws);
    let a = seed(&mut d);
    let class_id = create_class(&mut d, &a, "Mathematics");

    add_scored_activity(&mut d, &class_id, &a.q1_id, "Q1 Exam", 100.0, &a.student_id, 80.0);
    add_scored_activity(&mut d, &class_id, &a.q2_id, "Q2 Exam", 100.0, &a.student_id, 91.0);

    let res = d.ok(
        "grades.final",
        json!({ "studentId": a.student_id, "classId": class_id }),
    );
    assert_eq!(res["finalGrade"].as_f64(), Some(85.5));

    // Caller may pin the period set explicitly.
    let res = d.ok(
        "grades.final",
        json!({ "studentId": a.student_id, "classId": class_id, "gradingPeriodIds": [a.q1_id] }),
    );
    assert_eq!(res["finalGrade"].as_f64(), Some(80.0));
}

#[test]
fn deactivated_period_drops_out_of_the_final() {
    let ws = temp_workspace("registrar-final-subset");
    let mut d = Daemon::spawn(&ws);
    let a = seed(&mut d);
    let class_id = create_class(&mut d, &a, "Science");

    add_scored_activity(&mut d, &class_id, &a.q1_id, "Q1 Exam", 100.0, &a.student_id, 80.0);
    add_scored_activity(&mut d, &class_id, &a.q2_id, "Q2 Exam", 100.0, &a.student_id, 90.0);

    // Activating a sibling in semester 2 deactivates Q2; the final now tracks
    // only the currently relevant periods, intentionally not full history.
    let q2b = id_of(
        &d.ok(
            "gradingPeriods.create",
            json!({ "semesterId": a.sem2_id, "name": "Q2 Makeup", "order": 2 }),
        ),
        "gradingPeriodId",
    );
    d.ok("gradingPeriods.activate", json!({ "gradingPeriodId": q2b }));

    let res = d.ok(
        "grades.final",
        json!({ "studentId": a.student_id, "classId": class_id }),
    );
    // Q2 Makeup has no activities, so it contributes nothing; only Q1 remains.
    assert_eq!(res["finalGrade"].as_f64(), Some(80.0));
}

#[test]
fn perfect_scores_round_trip_to_one_hundred() {
    let ws = temp_workspace("registrar-perfect");
    let mut d = Daemon::spawn(&ws);
    let a = seed(&mut d);
    let class_id = create_class(&mut d, &a, "English");

    add_scored_activity(&mut d, &class_id, &a.q1_id, "Q1 Quiz", 60.0, &a.student_id, 60.0);
    add_scored_activity(&mut d, &class_id, &a.q1_id, "Q1 Exam", 100.0, &a.student_id, 100.0);
    add_scored_activity(&mut d, &class_id, &a.q2_id, "Q2 Exam", 45.0, &a.student_id, 45.0);

    for (period, expect) in [(&a.q1_id, 100.0), (&a.q2_id, 100.0)] {
        let res = d.ok(
            "grades.period",
            json!({ "studentId": a.student_id, "classId": class_id, "gradingPeriodId": period }),
        );
        assert_eq!(res["grade"].as_f64(), Some(expect));
    }
    let res = d.ok(
        "grades.final",
        json!({ "studentId": a.student_id, "classId": class_id }),
    );
    assert_eq!(res["finalGrade"].as_f64(), Some(100.0));
}

#[test]
fn eligibility_requires_every_subject_to_pass() {
    let ws = temp_workspace("registrar-eligibility");
    let mut d = Daemon::spawn(&ws);
    let a = seed(&mut d);
    let math = create_class(&mut d, &a, "Mathematics");

    add_scored_activity(&mut d, &math, &a.q1_id, "Q1 Exam", 100.0, &a.student_id, 85.0);
    let res = d.ok(
        "grades.eligibility",
        json!({ "studentId": a.student_id, "schoolYearId": a.year_id }),
    );
    assert_eq!(res["eligible"].as_bool(), Some(true));

    // A second subject with no grade at all counts as failing, not unknown.
    let science = create_class(&mut d, &a, "Science");
    let res = d.ok(
        "grades.eligibility",
        json!({ "studentId": a.student_id, "schoolYearId": a.year_id }),
    );
    assert_eq!(res["eligible"].as_bool(), Some(false));

    // Exactly at the threshold passes...
    add_scored_activity(&mut d, &science, &a.q1_id, "Q1 Exam", 100.0, &a.student_id, 75.0);
    let res = d.ok(
        "grades.eligibility",
        json!({ "studentId": a.student_id, "schoolYearId": a.year_id }),
    );
    assert_eq!(res["eligible"].as_bool(), Some(true));

    // ...and one subject slipping below it fails the gate.
    add_scored_activity(&mut d, &science, &a.q2_id, "Q2 Exam", 100.0, &a.student_id, 40.0);
    let res = d.ok(
        "grades.eligibility",
        json!({ "studentId": a.student_id, "schoolYearId": a.year_id }),
    );
    assert_eq!(res["eligible"].as_bool(), Some(false));
}

#[test]
fn report_card_lists_period_and_final_grades_per_subject() {
    let ws = temp_workspace("registrar-report-card");
    let mut d = Daemon::spawn(&ws);
    let a = seed(&mut d);
    let class_id = create_class(&mut d, &a, "Mathematics");

    add_scored_activity(&mut d, &class_id, &a.q1_id, "Q1 Exam", 100.0, &a.student_id, 82.0);

    let res = d.ok(
        "grades.reportCard",
        json!({ "studentId": a.student_id, "schoolYearId": a.year_id }),
    );
    let subjects = res["subjects"].as_array().expect("subjects");
    assert_eq!(subjects.len(), 1);
    let math = &subjects[0];
    assert_eq!(math["subject"].as_str(), Some("Mathematics"));
    assert_eq!(math["periodGrades"][&a.q1_id].as_f64(), Some(82.0));
    assert!(math["periodGrades"][&a.q2_id].is_null());
    // Q2 is active but absent, so the final falls back to Q1 alone.
    assert_eq!(math["finalGrade"].as_f64(), Some(82.0));
}

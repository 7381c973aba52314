use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("registrar.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'inactive',
            is_locked INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            school_year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            ord INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'inactive',
            FOREIGN KEY(school_year_id) REFERENCES school_years(id) ON DELETE CASCADE,
            UNIQUE(school_year_id, ord)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_semesters_year ON semesters(school_year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grading_periods(
            id TEXT PRIMARY KEY,
            semester_id TEXT NOT NULL,
            name TEXT NOT NULL,
            ord INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'inactive',
            FOREIGN KEY(semester_id) REFERENCES semesters(id) ON DELETE CASCADE,
            UNIQUE(semester_id, ord)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grading_periods_semester ON grading_periods(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_no TEXT NOT NULL UNIQUE,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade_level INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            school_year_id TEXT NOT NULL,
            section_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            FOREIGN KEY(school_year_id) REFERENCES school_years(id) ON DELETE CASCADE,
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            UNIQUE(school_year_id, section_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_year_section ON classes(school_year_id, section_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            school_year_id TEXT NOT NULL,
            section_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'enrolled',
            is_promoted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;
    // Transfers close the old row before inserting the replacement, so the
    // pair is only unique while a row is still 'enrolled'.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student_year
         ON enrollments(student_id, school_year_id)",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_enrollments_one_enrolled
         ON enrollments(student_id, school_year_id) WHERE status = 'enrolled'",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_year_section
         ON enrollments(school_year_id, section_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activities(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            grading_period_id TEXT NOT NULL,
            name TEXT NOT NULL,
            activity_type TEXT NOT NULL,
            max_score REAL NOT NULL,
            weight REAL,
            due_date TEXT,
            is_published INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(class_id) REFERENCES classes(id) ON DELETE CASCADE,
            FOREIGN KEY(grading_period_id) REFERENCES grading_periods(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_class ON activities(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_class_period
         ON activities(class_id, grading_period_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_scores(
            id TEXT PRIMARY KEY,
            activity_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            score REAL,
            updated_at TEXT,
            FOREIGN KEY(activity_id) REFERENCES activities(id) ON DELETE CASCADE,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(activity_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_scores_activity ON activity_scores(activity_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_scores_student ON activity_scores(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS promotion_logs(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            from_school_year_id TEXT NOT NULL,
            to_school_year_id TEXT NOT NULL,
            from_section_id TEXT NOT NULL,
            to_section_id TEXT NOT NULL,
            action TEXT NOT NULL,
            performed_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(from_school_year_id) REFERENCES school_years(id),
            FOREIGN KEY(to_school_year_id) REFERENCES school_years(id),
            FOREIGN KEY(from_section_id) REFERENCES sections(id),
            FOREIGN KEY(to_section_id) REFERENCES sections(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_promotion_logs_student_from
         ON promotion_logs(student_id, from_school_year_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_promotion_logs_from_year
         ON promotion_logs(from_school_year_id)",
        [],
    )?;

    Ok(conn)
}

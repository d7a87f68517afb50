use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("attendance.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS colleges(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            created_by TEXT,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            college_id TEXT NOT NULL,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            created_by TEXT,
            created_at TEXT,
            FOREIGN KEY(college_id) REFERENCES colleges(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_departments_college ON departments(college_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS years(
            id TEXT PRIMARY KEY,
            department_id TEXT NOT NULL,
            year_number INTEGER NOT NULL,
            created_at TEXT,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_years_department ON years(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(year_id) REFERENCES years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_year ON sections(year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL,
            roll_number TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT,
            gender TEXT,
            created_at TEXT,
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section ON students(section_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section_roll ON students(section_id, roll_number)",
        [],
    )?;

    // Workspaces created before the gender column exist in the field. Add it
    // in place rather than bumping a schema version.
    ensure_students_gender(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            marked_by TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_section_date ON attendance(section_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_sheet_templates(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department_id TEXT,
            year_id TEXT,
            section_id TEXT,
            created_by TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(department_id) REFERENCES departments(id),
            FOREIGN KEY(year_id) REFERENCES years(id),
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS template_cells(
            id TEXT PRIMARY KEY,
            template_id TEXT NOT NULL,
            row_index INTEGER NOT NULL,
            col_index INTEGER NOT NULL,
            rowspan INTEGER NOT NULL DEFAULT 1,
            colspan INTEGER NOT NULL DEFAULT 1,
            cell_type TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT '',
            config TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(template_id) REFERENCES attendance_sheet_templates(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_template_cells_template ON template_cells(template_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_roles(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT,
            UNIQUE(user_id, role)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_roles_user ON user_roles(user_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_gender(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "gender")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN gender TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

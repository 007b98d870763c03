//! SQLite schema for problems, exams and their links.

/// Schema statements, applied in order on every connect.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS problems (
    id          TEXT PRIMARY KEY NOT NULL,
    owner_id    TEXT,
    parent_id   TEXT REFERENCES problems(id),
    content     TEXT NOT NULL,
    solution    TEXT,
    subject     TEXT NOT NULL DEFAULT 'math',
    difficulty  INTEGER NOT NULL DEFAULT 1 CHECK (difficulty BETWEEN 1 AND 5),
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_problems_parent ON problems(parent_id);

CREATE INDEX IF NOT EXISTS idx_problems_owner ON problems(owner_id);

CREATE TABLE IF NOT EXISTS exams (
    id            TEXT PRIMARY KEY NOT NULL,
    owner_id      TEXT NOT NULL,
    title         TEXT NOT NULL,
    description   TEXT,
    is_published  INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS exam_problems (
    exam_id      TEXT NOT NULL REFERENCES exams(id) ON DELETE CASCADE,
    problem_id   TEXT NOT NULL REFERENCES problems(id),
    order_index  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (exam_id, problem_id)
);

CREATE INDEX IF NOT EXISTS idx_exam_problems_problem ON exam_problems(problem_id);
"#;

/// Split a schema script into individual statements.
pub fn split_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';').map(str::trim).filter(|s| !s.is_empty())
}

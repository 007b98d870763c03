//! [`ContentStore`] implementation on a SQLite connection pool.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use probforge_core::error::{Error, Result};
use probforge_core::model::{
    DeleteOutcome, DeletePolicy, Exam, ExamProblem, NewExam, NewProblem, Problem, ProblemFilter,
};
use probforge_core::traits::ContentStore;

use crate::schema::{split_statements, SCHEMA_SQL};

/// Failure to open or migrate the database.
#[derive(Debug, thiserror::Error)]
pub enum StoreInitError {
    #[error("invalid database url: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// SQLite-backed content store.
///
/// Every multi-statement write runs in its own `BEGIN IMMEDIATE` transaction,
/// so existence checks and the write they guard are atomic and concurrent
/// writers queue on the busy timeout instead of failing a lock upgrade.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

const PROBLEM_COLUMNS: &str =
    "id, owner_id, parent_id, content, solution, subject, difficulty, created_at";
const EXAM_COLUMNS: &str = "id, owner_id, title, description, is_published, created_at";

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> std::result::Result<Self, StoreInitError> {
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreInitError::Config(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Each connection to `:memory:` is a separate database, so keep exactly one alive.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(database_url, "content store ready");
        Ok(store)
    }

    /// Fresh private in-memory database.
    pub async fn in_memory() -> std::result::Result<Self, StoreInitError> {
        Self::connect("sqlite::memory:").await
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> std::result::Result<(), StoreInitError> {
        for statement in split_statements(SCHEMA_SQL) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("schema applied");
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| Error::Storage(format!("corrupt uuid in column {column}: {raw:?} ({e})")))
}

fn parse_opt_uuid(raw: Option<String>, column: &str) -> Result<Option<Uuid>> {
    raw.as_deref().map(|s| parse_uuid(s, column)).transpose()
}

fn problem_from_row(row: &SqliteRow) -> Result<Problem> {
    let id: String = row.try_get("id").map_err(db_error)?;
    let owner_id: Option<String> = row.try_get("owner_id").map_err(db_error)?;
    let parent_id: Option<String> = row.try_get("parent_id").map_err(db_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_error)?;
    Ok(Problem {
        id: parse_uuid(&id, "problems.id")?,
        owner_id: parse_opt_uuid(owner_id, "problems.owner_id")?,
        parent_id: parse_opt_uuid(parent_id, "problems.parent_id")?,
        content: row.try_get("content").map_err(db_error)?,
        solution: row.try_get("solution").map_err(db_error)?,
        subject: row.try_get("subject").map_err(db_error)?,
        difficulty: row.try_get("difficulty").map_err(db_error)?,
        created_at,
    })
}

fn exam_from_row(row: &SqliteRow) -> Result<Exam> {
    let id: String = row.try_get("id").map_err(db_error)?;
    let owner_id: String = row.try_get("owner_id").map_err(db_error)?;
    Ok(Exam {
        id: parse_uuid(&id, "exams.id")?,
        owner_id: parse_uuid(&owner_id, "exams.owner_id")?,
        title: row.try_get("title").map_err(db_error)?,
        description: row.try_get("description").map_err(db_error)?,
        is_published: row.try_get("is_published").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
    })
}

async fn exists<'e, E>(executor: E, sql: &str, id: Uuid) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let found: Option<i64> = sqlx::query_scalar(sql)
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .map_err(db_error)?;
    Ok(found.is_some())
}

const PROBLEM_EXISTS: &str = "SELECT 1 FROM problems WHERE id = ?";
const EXAM_EXISTS: &str = "SELECT 1 FROM exams WHERE id = ?";

/// A pooled connection holding an open `BEGIN IMMEDIATE` transaction.
///
/// The write lock is taken up front. A deferred transaction that reads first
/// gets `SQLITE_BUSY` on upgrade without waiting on the busy handler.
struct WriteTx {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTx {
    async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut conn = pool.acquire().await.map_err(db_error)?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| Error::Storage("write transaction already finished".into()))
    }

    /// Commit on `Ok`, roll back on `Err`; either way `outcome` is returned
    /// unless ending the transaction itself fails.
    async fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        let Some(mut conn) = self.conn.take() else {
            return outcome;
        };
        let end = if outcome.is_ok() { "COMMIT" } else { "ROLLBACK" };
        match sqlx::query(end).execute(&mut *conn).await {
            Ok(_) => outcome,
            Err(e) => {
                warn!(error = %e, statement = end, "closing connection after failed transaction end");
                drop(conn.detach());
                outcome.and(Err(db_error(e)))
            }
        }
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        // A connection still held here means the owning future was cancelled mid-transaction.
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                        warn!(error = %e, "rollback of abandoned transaction failed");
                        drop(conn.detach());
                    }
                });
            }
            Err(_) => drop(conn.detach()),
        }
    }
}

async fn insert_problem(conn: &mut SqliteConnection, problem: NewProblem) -> Result<Problem> {
    if let Some(parent_id) = problem.parent_id {
        if !exists(&mut *conn, PROBLEM_EXISTS, parent_id).await? {
            return Err(Error::ParentNotFound(parent_id));
        }
    }

    let problem = problem.into_problem();
    sqlx::query(
        r#"
        INSERT INTO problems (id, owner_id, parent_id, content, solution, subject, difficulty, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(problem.id.to_string())
    .bind(problem.owner_id.map(|id| id.to_string()))
    .bind(problem.parent_id.map(|id| id.to_string()))
    .bind(&problem.content)
    .bind(&problem.solution)
    .bind(&problem.subject)
    .bind(problem.difficulty)
    .bind(problem.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(problem)
}

async fn remove_problem(
    conn: &mut SqliteConnection,
    id: Uuid,
    policy: DeletePolicy,
) -> Result<DeleteOutcome> {
    if !exists(&mut *conn, PROBLEM_EXISTS, id).await? {
        return Err(Error::ProblemNotFound(id));
    }

    let children: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM problems WHERE parent_id = ?")
        .bind(id.to_string())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error)?;
    if children > 0 {
        return Err(Error::ProblemInUse {
            id,
            reason: format!("{children} variant(s) derive from it"),
        });
    }

    let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exam_problems WHERE problem_id = ?")
        .bind(id.to_string())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error)?;
    if links > 0 && policy == DeletePolicy::Reject {
        return Err(Error::ProblemInUse {
            id,
            reason: format!("linked into {links} exam(s)"),
        });
    }

    sqlx::query("DELETE FROM exam_problems WHERE problem_id = ?")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    sqlx::query("DELETE FROM problems WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    Ok(DeleteOutcome {
        problem_id: id,
        links_removed: links as usize,
    })
}

async fn publish_exam(conn: &mut SqliteConnection, id: Uuid, published: bool) -> Result<Exam> {
    let updated = sqlx::query("UPDATE exams SET is_published = ? WHERE id = ?")
        .bind(published)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?
        .rows_affected();
    if updated == 0 {
        return Err(Error::ExamNotFound(id));
    }
    let row = sqlx::query(&format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = ?"))
        .bind(id.to_string())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error)?;
    exam_from_row(&row)
}

async fn insert_link(conn: &mut SqliteConnection, link: ExamProblem) -> Result<ExamProblem> {
    if !exists(&mut *conn, EXAM_EXISTS, link.exam_id).await? {
        return Err(Error::ExamNotFound(link.exam_id));
    }
    if !exists(&mut *conn, PROBLEM_EXISTS, link.problem_id).await? {
        return Err(Error::ProblemNotFound(link.problem_id));
    }

    let inserted =
        sqlx::query("INSERT INTO exam_problems (exam_id, problem_id, order_index) VALUES (?, ?, ?)")
            .bind(link.exam_id.to_string())
            .bind(link.problem_id.to_string())
            .bind(link.order_index)
            .execute(&mut *conn)
            .await;
    match inserted {
        Ok(_) => Ok(link),
        Err(e) if is_unique_violation(&e) => Err(Error::DuplicateLink {
            exam_id: link.exam_id,
            problem_id: link.problem_id,
        }),
        Err(e) => Err(db_error(e)),
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn create_problem(&self, problem: NewProblem) -> Result<Problem> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let outcome = insert_problem(tx.conn()?, problem).await;
        tx.finish(outcome).await
    }

    async fn get_problem(&self, id: Uuid) -> Result<Problem> {
        let row = sqlx::query(&format!("SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(Error::ProblemNotFound(id))?;
        problem_from_row(&row)
    }

    async fn list_problems(&self, filter: &ProblemFilter) -> Result<Vec<Problem>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PROBLEM_COLUMNS} FROM problems
            WHERE (?1 IS NULL OR subject = ?1)
              AND (?2 IS NULL OR owner_id = ?2)
              AND (?3 = 0 OR parent_id IS NULL)
            ORDER BY rowid
            "#
        ))
        .bind(&filter.subject)
        .bind(filter.owner_id.map(|id| id.to_string()))
        .bind(filter.roots_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(problem_from_row).collect()
    }

    async fn list_children(&self, parent_id: Uuid) -> Result<Vec<Problem>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems WHERE parent_id = ? ORDER BY rowid"
        ))
        .bind(parent_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(problem_from_row).collect()
    }

    async fn delete_problem(&self, id: Uuid, policy: DeletePolicy) -> Result<DeleteOutcome> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let outcome = remove_problem(tx.conn()?, id, policy).await;
        tx.finish(outcome).await
    }

    async fn create_exam(&self, exam: NewExam) -> Result<Exam> {
        let exam = exam.into_exam();
        sqlx::query(
            r#"
            INSERT INTO exams (id, owner_id, title, description, is_published, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(exam.id.to_string())
        .bind(exam.owner_id.to_string())
        .bind(&exam.title)
        .bind(&exam.description)
        .bind(exam.is_published)
        .bind(exam.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(exam)
    }

    async fn get_exam(&self, id: Uuid) -> Result<Exam> {
        let row = sqlx::query(&format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(Error::ExamNotFound(id))?;
        exam_from_row(&row)
    }

    async fn list_exams(&self, owner_id: Option<Uuid>) -> Result<Vec<Exam>> {
        let rows = sqlx::query(&format!(
            "SELECT {EXAM_COLUMNS} FROM exams WHERE (?1 IS NULL OR owner_id = ?1) ORDER BY rowid"
        ))
        .bind(owner_id.map(|id| id.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(exam_from_row).collect()
    }

    async fn set_exam_published(&self, id: Uuid, published: bool) -> Result<Exam> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let outcome = publish_exam(tx.conn()?, id, published).await;
        tx.finish(outcome).await
    }

    async fn create_link(&self, link: ExamProblem) -> Result<ExamProblem> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let outcome = insert_link(tx.conn()?, link).await;
        tx.finish(outcome).await
    }

    async fn update_link_order(
        &self,
        exam_id: Uuid,
        problem_id: Uuid,
        order_index: i32,
    ) -> Result<ExamProblem> {
        let updated = sqlx::query(
            "UPDATE exam_problems SET order_index = ? WHERE exam_id = ? AND problem_id = ?",
        )
        .bind(order_index)
        .bind(exam_id.to_string())
        .bind(problem_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_error)?
        .rows_affected();
        if updated == 0 {
            return Err(Error::LinkNotFound {
                exam_id,
                problem_id,
            });
        }
        Ok(ExamProblem {
            exam_id,
            problem_id,
            order_index,
        })
    }

    async fn delete_link(&self, exam_id: Uuid, problem_id: Uuid) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM exam_problems WHERE exam_id = ? AND problem_id = ?")
            .bind(exam_id.to_string())
            .bind(problem_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_error)?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn list_exam_problems(&self, exam_id: Uuid) -> Result<Vec<(ExamProblem, Problem)>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        if !exists(&mut *tx, EXAM_EXISTS, exam_id).await? {
            return Err(Error::ExamNotFound(exam_id));
        }

        let rows = sqlx::query(
            r#"
            SELECT ep.order_index,
                   p.id, p.owner_id, p.parent_id, p.content, p.solution,
                   p.subject, p.difficulty, p.created_at
            FROM exam_problems ep
            JOIN problems p ON p.id = ep.problem_id
            WHERE ep.exam_id = ?
            ORDER BY ep.order_index, ep.rowid
            "#,
        )
        .bind(exam_id.to_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        rows.iter()
            .map(|row| {
                let problem = problem_from_row(row)?;
                let link = ExamProblem {
                    exam_id,
                    problem_id: problem.id,
                    order_index: row.try_get("order_index").map_err(db_error)?,
                };
                Ok((link, problem))
            })
            .collect()
    }
}

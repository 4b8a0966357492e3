use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use eyre::{Context, Result, eyre};
use rand::rngs::StdRng;
use sqlx::any::{AnyConnectOptions, AnyQueryResult, AnyRow};
use sqlx::{AnyConnection, Connection, Row};
use tracing::{debug, info};

use crate::model::{Level, Student, StudentId, UserId};

mod accounts;
mod groups;
mod projects;
mod tasks;

pub use self::groups::StudentProject;

const SQLITE_SCHEMA: &str = include_str!("../../sql/schema_sqlite.sql");
const MYSQL_SCHEMA: &str = include_str!("../../sql/schema_mysql.sql");

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Columns expected by `student_from_row`, for a query joining
/// `etudiants e` with `users u`.
const STUDENT_COLUMNS: &str = "e.id AS student_id, e.user_id AS user_id, u.name AS name, \
     u.email AS email, e.matricule AS matricule, e.filiere AS filiere, e.niveau AS niveau";

pub struct Store {
    conn: AnyConnection,
    rng: StdRng,
}

impl Store {
    pub async fn connect(url: &str, rng: StdRng) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let options = AnyConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url {url}"))?;
        let conn = AnyConnection::connect_with(&options)
            .await
            .context("cannot connect to database")?;
        debug!(backend = conn.backend_name(), "connected to database");
        Ok(Self { conn, rng })
    }

    /// Create the missing tables.
    pub async fn initialize(&mut self) -> Result<()> {
        let schema = match self.conn.backend_name() {
            "MySQL" => MYSQL_SCHEMA,
            _ => SQLITE_SCHEMA,
        };
        let mut tx = self.conn.begin().await?;
        for statement in statements(schema) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("cannot execute schema statement {statement:?}"))?;
        }
        tx.commit().await.context("cannot commit schema creation")?;
        info!("database schema is ready");
        Ok(())
    }
}

/// Split a schema file into statements, discarding comments.
fn statements(schema: &str) -> Vec<String> {
    let without_comments = schema
        .lines()
        .filter(|l| !l.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    // the stored form has a one second resolution
    parse_datetime(&format_datetime(now)).unwrap_or(now)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_datetime(datetime: NaiveDateTime) -> String {
    datetime.format(DATETIME_FORMAT).to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| format!("invalid stored date {s:?}"))
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .with_context(|| format!("invalid stored timestamp {s:?}"))
}

fn get_id(row: &AnyRow, column: &str) -> Result<i64> {
    row.try_get::<i64, _>(column)
        .with_context(|| format!("cannot read column {column}"))
}

fn get_opt_id(row: &AnyRow, column: &str) -> Result<Option<i64>> {
    row.try_get::<Option<i64>, _>(column)
        .with_context(|| format!("cannot read column {column}"))
}

fn get_u32(row: &AnyRow, column: &str) -> Result<u32> {
    let n = get_id(row, column)?;
    u32::try_from(n).with_context(|| format!("column {column} holds out-of-range value {n}"))
}

fn get_string(row: &AnyRow, column: &str) -> Result<String> {
    row.try_get::<String, _>(column)
        .with_context(|| format!("cannot read column {column}"))
}

fn get_opt_string(row: &AnyRow, column: &str) -> Result<Option<String>> {
    row.try_get::<Option<String>, _>(column)
        .with_context(|| format!("cannot read column {column}"))
}

fn get_opt_date(row: &AnyRow, column: &str) -> Result<Option<NaiveDate>> {
    get_opt_string(row, column)?
        .as_deref()
        .map(parse_date)
        .transpose()
}

/// Id of the row inserted by `result`, read on the connection which ran
/// the insertion. The SQLite driver does not report it in the result.
async fn inserted_id(conn: &mut AnyConnection, result: &AnyQueryResult) -> Result<i64> {
    match result.last_insert_id() {
        Some(id) => Ok(id),
        None if conn.backend_name() == "SQLite" => {
            let row = sqlx::query("SELECT last_insert_rowid() AS id")
                .fetch_one(&mut *conn)
                .await
                .context("cannot read the inserted row id")?;
            get_id(&row, "id")
        }
        None => Err(eyre!("database did not return the inserted row id")),
    }
}

fn student_from_row(row: &AnyRow) -> Result<Student> {
    Ok(Student {
        id: StudentId(get_id(row, "student_id")?),
        user_id: UserId(get_id(row, "user_id")?),
        name: get_string(row, "name")?,
        email: get_string(row, "email")?,
        matricule: get_string(row, "matricule")?,
        field: get_string(row, "filiere")?,
        level: Level::from_str(&get_string(row, "niveau")?)?,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::model::{
        AdminInput, Level, ProfId, ProfessorInput, ProjectId, ProjectInput, StudentId, StudentInput,
        SubjectId, SubjectInput,
    };
    use rand::SeedableRng;

    pub async fn store() -> Store {
        let mut store = Store::connect("sqlite::memory:", StdRng::seed_from_u64(17))
            .await
            .unwrap();
        store.initialize().await.unwrap();
        store
    }

    pub async fn admin(store: &mut Store) -> UserId {
        store
            .add_admin(&AdminInput {
                name: "Admin".into(),
                email: "admin@example.org".into(),
            })
            .await
            .unwrap()
            .id
    }

    pub async fn professor(store: &mut Store, n: u32) -> ProfId {
        store
            .add_professor(&ProfessorInput {
                name: format!("Prof {n}"),
                email: format!("prof{n}@example.org"),
                matricule: format!("PROF{n:04}"),
                speciality: "Informatique".into(),
                grade: "MCF".into(),
            })
            .await
            .unwrap()
            .id
    }

    pub async fn students(store: &mut Store, level: Level, n: usize) -> Vec<StudentId> {
        let mut ids = Vec::new();
        for _ in 0..n {
            let k = store.list_students().await.unwrap().len() + 1;
            let student = store
                .add_student(&StudentInput {
                    matricule: format!("ETU{k:04}"),
                    name: format!("Student {k:02}"),
                    email: format!("student{k}@example.org"),
                    field: "Informatique".into(),
                    level,
                })
                .await
                .unwrap();
            ids.push(student.id);
        }
        ids
    }

    pub fn project_input(group_size: u32, levels: &[Level]) -> ProjectInput {
        ProjectInput {
            title: "Compilateur".into(),
            description: Some("Un petit compilateur".into()),
            group_size,
            levels: levels.to_vec(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 28).unwrap(),
        }
    }

    pub async fn project(
        store: &mut Store,
        prof: ProfId,
        group_size: u32,
        levels: &[Level],
    ) -> ProjectId {
        store
            .create_project(prof, project_input(group_size, levels))
            .await
            .unwrap()
            .id
    }

    pub async fn subject(store: &mut Store, prof: ProfId, project: ProjectId, title: &str) -> SubjectId {
        store
            .add_subject(
                prof,
                project,
                &SubjectInput {
                    title: title.into(),
                    description: None,
                },
            )
            .await
            .unwrap()
            .id
    }
}

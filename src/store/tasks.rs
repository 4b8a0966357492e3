use std::str::FromStr;

use eyre::{Context, Result};
use sqlx::AnyConnection;
use sqlx::any::AnyRow;
use tracing::{debug, info};

use super::accounts::find_student;
use super::projects::ensure_professor;
use super::{
    Store, format_date, format_datetime, get_id, get_opt_date, get_opt_id, get_string, get_u32,
    inserted_id, now, parse_datetime,
};
use crate::errors::GroupsError;
use crate::model::{
    Level, Priority, ProfId, ProfessorTask, ProjectId, StudentId, Task, TaskId, TaskInput,
    TaskPatch, TaskStats, TaskStatus,
};

const TASK_QUERY: &str = "SELECT t.id AS id, t.etudiant_id AS etudiant_id, \
     t.projet_id AS projet_id, p.titre AS projet_titre, t.nom AS nom, t.statut AS statut, \
     t.priorite AS priorite, t.date_debut AS date_debut, t.date_fin AS date_fin, \
     t.created_at AS created_at FROM taches t JOIN projets p ON p.id = t.projet_id";

impl Store {
    pub async fn list_tasks(&mut self, student: StudentId) -> Result<Vec<Task>> {
        find_student(&mut self.conn, student).await?;
        sqlx::query(&format!("{TASK_QUERY} WHERE t.etudiant_id = ? ORDER BY t.id DESC"))
            .bind(student.0)
            .fetch_all(&mut self.conn)
            .await
            .context("cannot load tasks")?
            .iter()
            .map(task_from_row)
            .collect()
    }

    pub async fn show_task(&mut self, student: StudentId, id: TaskId) -> Result<Task> {
        find_task(&mut self.conn, student, id).await
    }

    /// Create a task in a project the student has a group in.
    pub async fn create_task(&mut self, student: StudentId, input: &TaskInput) -> Result<Task> {
        input.validate()?;
        find_student(&mut self.conn, student).await?;
        ensure_member(&mut self.conn, student, input.project_id).await?;
        let result = sqlx::query(
            "INSERT INTO taches (etudiant_id, projet_id, nom, statut, priorite, date_debut, \
             date_fin, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(student.0)
        .bind(input.project_id.0)
        .bind(&input.name)
        .bind(TaskStatus::default().as_str())
        .bind(input.priority.as_str())
        .bind(input.start_date.map(format_date))
        .bind(input.end_date.map(format_date))
        .bind(format_datetime(now()))
        .execute(&mut self.conn)
        .await
        .context("cannot create task")?;
        let id = TaskId(inserted_id(&mut self.conn, &result).await?);
        info!(student = %student, task = %id, project = %input.project_id, "task created");
        find_task(&mut self.conn, student, id).await
    }

    /// Apply a partial update. Moving the task to another project
    /// requires a group in that project too.
    pub async fn update_task(
        &mut self,
        student: StudentId,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task> {
        patch.validate()?;
        let mut task = find_task(&mut self.conn, student, id).await?;
        if let Some(project) = patch.project_id.filter(|p| *p != task.project_id) {
            ensure_member(&mut self.conn, student, project).await?;
            debug!(task = %id, from = %task.project_id, to = %project, "task moved");
        }
        patch.apply(&mut task);
        sqlx::query(
            "UPDATE taches SET projet_id = ?, nom = ?, statut = ?, priorite = ?, date_debut = ?, \
             date_fin = ? WHERE id = ?",
        )
        .bind(task.project_id.0)
        .bind(&task.name)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.start_date.map(format_date))
        .bind(task.end_date.map(format_date))
        .bind(id.0)
        .execute(&mut self.conn)
        .await
        .context("cannot update task")?;
        find_task(&mut self.conn, student, id).await
    }

    pub async fn set_task_status(
        &mut self,
        student: StudentId,
        id: TaskId,
        status: TaskStatus,
    ) -> Result<Task> {
        self.update_task(
            student,
            id,
            TaskPatch {
                status: Some(status),
                ..TaskPatch::default()
            },
        )
        .await
    }

    pub async fn delete_task(&mut self, student: StudentId, id: TaskId) -> Result<()> {
        find_task(&mut self.conn, student, id).await?;
        sqlx::query("DELETE FROM taches WHERE id = ?")
            .bind(id.0)
            .execute(&mut self.conn)
            .await
            .context("cannot delete task")?;
        info!(student = %student, task = %id, "task deleted");
        Ok(())
    }

    pub async fn task_stats(&mut self, student: StudentId) -> Result<TaskStats> {
        find_student(&mut self.conn, student).await?;
        let rows = sqlx::query(
            "SELECT statut, COUNT(*) AS n FROM taches WHERE etudiant_id = ? GROUP BY statut",
        )
        .bind(student.0)
        .fetch_all(&mut self.conn)
        .await
        .context("cannot count tasks")?;
        let mut stats = TaskStats::default();
        for row in &rows {
            stats.record(TaskStatus::from_str(&get_string(row, "statut")?)?, get_u32(row, "n")?);
        }
        Ok(stats)
    }

    /// Tasks of every student working on one of the professor's projects.
    pub async fn professor_tasks(&mut self, prof: ProfId) -> Result<Vec<ProfessorTask>> {
        ensure_professor(&mut self.conn, prof).await?;
        let rows = sqlx::query(&format!(
            "SELECT tq.*, u.name AS student_name, u.email AS student_email, \
             e.matricule AS matricule, e.niveau AS niveau, e.filiere AS filiere, \
             g.numero_groupe AS numero_groupe \
             FROM ({TASK_QUERY} WHERE p.prof_id = ?) tq \
             JOIN etudiants e ON e.id = tq.etudiant_id \
             JOIN users u ON u.id = e.user_id \
             LEFT JOIN etudiant_groupe eg ON eg.etudiant_id = tq.etudiant_id \
             AND eg.projet_id = tq.projet_id \
             LEFT JOIN groupes g ON g.id = eg.groupe_id \
             ORDER BY tq.id DESC"
        ))
        .bind(prof.0)
        .fetch_all(&mut self.conn)
        .await
        .context("cannot load professor tasks")?;
        rows.iter()
            .map(|row| {
                Ok(ProfessorTask {
                    task: task_from_row(row)?,
                    student_name: get_string(row, "student_name")?,
                    student_email: get_string(row, "student_email")?,
                    matricule: get_string(row, "matricule")?,
                    level: Level::from_str(&get_string(row, "niveau")?)?,
                    field: get_string(row, "filiere")?,
                    group_number: get_opt_id(row, "numero_groupe")?
                        .map(u32::try_from)
                        .transpose()
                        .context("group number out of range")?,
                })
            })
            .collect()
    }
}

async fn find_task(conn: &mut AnyConnection, student: StudentId, id: TaskId) -> Result<Task> {
    let row = sqlx::query(&format!("{TASK_QUERY} WHERE t.id = ? AND t.etudiant_id = ?"))
        .bind(id.0)
        .bind(student.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(GroupsError::TaskNotFound(id))?;
    task_from_row(&row)
}

async fn ensure_member(conn: &mut AnyConnection, student: StudentId, project: ProjectId) -> Result<()> {
    sqlx::query("SELECT id FROM projets WHERE id = ?")
        .bind(project.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(GroupsError::ProjectNotFound(project))?;
    sqlx::query("SELECT id FROM etudiant_groupe WHERE etudiant_id = ? AND projet_id = ?")
        .bind(student.0)
        .bind(project.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(GroupsError::NotInProjectGroup { student, project })?;
    Ok(())
}

fn task_from_row(row: &AnyRow) -> Result<Task> {
    Ok(Task {
        id: TaskId(get_id(row, "id")?),
        student_id: StudentId(get_id(row, "etudiant_id")?),
        project_id: ProjectId(get_id(row, "projet_id")?),
        project_title: get_string(row, "projet_titre")?,
        name: get_string(row, "nom")?,
        status: TaskStatus::from_str(&get_string(row, "statut")?)?,
        priority: Priority::from_str(&get_string(row, "priorite")?)?,
        start_date: get_opt_date(row, "date_debut")?,
        end_date: get_opt_date(row, "date_fin")?,
        created_at: parse_datetime(&get_string(row, "created_at")?)?,
    })
}

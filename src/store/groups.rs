use std::collections::HashMap;

use chrono::NaiveDate;
use eyre::{Context, Result};
use rand::Rng;
use sqlx::{AnyConnection, Connection};
use tracing::{debug, info};

use super::accounts::find_student;
use super::projects::{full_project, load_subjects, project_row};
use super::{
    STUDENT_COLUMNS, Store, get_id, get_opt_id, get_opt_string, get_string, get_u32, inserted_id,
    parse_date, student_from_row,
};
use crate::algos::{cycle_subjects, plan_groups};
use crate::checks::{check_lonely_students, ensure_consistent};
use crate::errors::GroupsError;
use crate::model::{
    Group, GroupId, Level, PlannedGroup, ProfId, Project, ProjectId, Student, StudentId, Subject,
    SubjectId,
};

/// A project seen from one of its students.
#[derive(Clone, Debug)]
pub struct StudentProject {
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub prof_name: String,
    pub prof_email: String,
    pub group_number: u32,
    pub subject: Option<Subject>,
    pub teammates: Vec<Student>,
}

impl Store {
    /// Replace the groups of a project by a fresh repartition of the
    /// eligible students, returning the project and the number of groups
    /// created. The previous groups are only removed if the new
    /// repartition can be made.
    pub async fn repartition(
        &mut self,
        prof: ProfId,
        id: ProjectId,
        dry_run: bool,
    ) -> Result<(Project, usize)> {
        let mut tx = self.conn.begin().await?;
        let current = project_row(&mut tx, prof, id).await?;
        let subjects = subject_ids(&load_subjects(&mut tx, id).await?);
        let students = all_students(&mut tx).await?;
        let planned = plan_groups(
            &students,
            &current.levels,
            current.group_size,
            &subjects,
            &mut self.rng,
        )?;
        delete_groups(&mut tx, id).await?;
        let created = save_groups(&mut tx, id, &planned, &students, current.group_size).await?;
        let project = full_project(&mut tx, prof, id).await?;
        if dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await.context("cannot commit repartition")?;
        }
        info!(project = %id, groups = created, dry_run, "repartition done");
        Ok((project, created))
    }

    /// Deal the subjects again over the existing groups, keeping their
    /// members.
    pub async fn reassign_subjects(
        &mut self,
        prof: ProfId,
        id: ProjectId,
        dry_run: bool,
    ) -> Result<Project> {
        let mut tx = self.conn.begin().await?;
        project_row(&mut tx, prof, id).await?;
        let subjects = subject_ids(&load_subjects(&mut tx, id).await?);
        if subjects.is_empty() {
            return Err(GroupsError::NoSubjects.into());
        }
        let groups = sqlx::query("SELECT id FROM groupes WHERE projet_id = ? ORDER BY numero_groupe")
            .bind(id.0)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| get_id(row, "id").map(GroupId))
            .collect::<Result<Vec<_>>>()?;
        if groups.is_empty() {
            return Err(GroupsError::NoGroups.into());
        }
        for (group, subject) in cycle_subjects(&groups, &subjects, &mut self.rng) {
            sqlx::query("UPDATE groupes SET sujet_id = ? WHERE id = ?")
                .bind(subject.map(|s| s.0))
                .bind(group.0)
                .execute(&mut *tx)
                .await
                .context("cannot reassign subject")?;
        }
        let project = full_project(&mut tx, prof, id).await?;
        if dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await.context("cannot commit subject reassignment")?;
        }
        info!(project = %id, groups = groups.len(), dry_run, "subjects reassigned");
        Ok(project)
    }

    /// Projects of a student, newest group first, with their teammates.
    pub async fn student_projects(&mut self, student: StudentId) -> Result<Vec<StudentProject>> {
        find_student(&mut self.conn, student).await?;
        let rows = sqlx::query(
            "SELECT g.id AS groupe_id, g.numero_groupe AS numero_groupe, \
             s.id AS sujet_id, s.titre_sujet AS titre_sujet, s.description AS sujet_description, \
             p.id AS projet_id, p.titre AS titre, p.description AS description, \
             p.date_debut AS date_debut, p.date_fin AS date_fin, \
             u.name AS prof_name, u.email AS prof_email \
             FROM etudiant_groupe eg \
             JOIN groupes g ON g.id = eg.groupe_id \
             JOIN projets p ON p.id = g.projet_id \
             JOIN profs pr ON pr.id = p.prof_id \
             JOIN users u ON u.id = pr.user_id \
             LEFT JOIN sujets s ON s.id = g.sujet_id \
             WHERE eg.etudiant_id = ? ORDER BY g.id DESC",
        )
        .bind(student.0)
        .fetch_all(&mut self.conn)
        .await
        .context("cannot load student projects")?;
        let mut projects = Vec::with_capacity(rows.len());
        for row in &rows {
            let project_id = ProjectId(get_id(row, "projet_id")?);
            let group_id = GroupId(get_id(row, "groupe_id")?);
            let subject = match get_opt_id(row, "sujet_id")? {
                Some(id) => Some(Subject {
                    id: SubjectId(id),
                    project_id,
                    title: get_string(row, "titre_sujet")?,
                    description: get_opt_string(row, "sujet_description")?,
                }),
                None => None,
            };
            let teammates = group_members(&mut self.conn, group_id)
                .await?
                .into_iter()
                .filter(|s| s.id != student)
                .collect();
            projects.push(StudentProject {
                project_id,
                title: get_string(row, "titre")?,
                description: get_opt_string(row, "description")?,
                start_date: parse_date(&get_string(row, "date_debut")?)?,
                end_date: parse_date(&get_string(row, "date_fin")?)?,
                prof_name: get_string(row, "prof_name")?,
                prof_email: get_string(row, "prof_email")?,
                group_number: get_u32(row, "numero_groupe")?,
                subject,
                teammates,
            });
        }
        Ok(projects)
    }
}

fn subject_ids(subjects: &[Subject]) -> Vec<SubjectId> {
    subjects.iter().map(|s| s.id).collect()
}

async fn all_students(conn: &mut AnyConnection) -> Result<Vec<Student>> {
    sqlx::query(&format!(
        "SELECT {STUDENT_COLUMNS} FROM etudiants e JOIN users u ON u.id = e.user_id ORDER BY e.id"
    ))
    .fetch_all(&mut *conn)
    .await
    .context("cannot load students")?
    .iter()
    .map(student_from_row)
    .collect()
}

/// Rebuild the groups of a project after its parameters changed. Having
/// no eligible student left is not an error here: the project simply has
/// no group anymore.
pub(super) async fn recreate_groups<R: Rng + ?Sized>(
    conn: &mut AnyConnection,
    rng: &mut R,
    project: ProjectId,
    levels: &[Level],
    group_size: u32,
    subjects: &[Subject],
) -> Result<usize> {
    let students = all_students(conn).await?;
    match plan_groups(&students, levels, group_size, &subject_ids(subjects), rng) {
        Ok(planned) => save_groups(conn, project, &planned, &students, group_size).await,
        Err(GroupsError::NoEligibleStudents) => {
            debug!(project = %project, "no student matches the new levels");
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

async fn save_groups(
    conn: &mut AnyConnection,
    project: ProjectId,
    planned: &[PlannedGroup],
    students: &[Student],
    group_size: u32,
) -> Result<usize> {
    ensure_consistent(planned, students, group_size)
        .with_context(|| format!("refusing inconsistent repartition of project {project}"))?;
    check_lonely_students(planned, group_size);
    for group in planned {
        let result = sqlx::query(
            "INSERT INTO groupes (projet_id, sujet_id, numero_groupe) VALUES (?, ?, ?)",
        )
        .bind(project.0)
        .bind(group.subject.0)
        .bind(i64::from(group.number))
        .execute(&mut *conn)
        .await
        .with_context(|| format!("cannot create group {}", group.number))?;
        let group_id = inserted_id(&mut *conn, &result).await?;
        for student in &group.students {
            sqlx::query(
                "INSERT INTO etudiant_groupe (groupe_id, etudiant_id, projet_id) VALUES (?, ?, ?)",
            )
            .bind(group_id)
            .bind(student.0)
            .bind(project.0)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("cannot add student {student} to group {}", group.number))?;
        }
    }
    Ok(planned.len())
}

pub(super) async fn delete_groups(conn: &mut AnyConnection, project: ProjectId) -> Result<()> {
    sqlx::query("DELETE FROM etudiant_groupe WHERE projet_id = ?")
        .bind(project.0)
        .execute(&mut *conn)
        .await
        .context("cannot delete group memberships")?;
    let result = sqlx::query("DELETE FROM groupes WHERE projet_id = ?")
        .bind(project.0)
        .execute(&mut *conn)
        .await
        .context("cannot delete groups")?;
    debug!(project = %project, groups = result.rows_affected(), "groups deleted");
    Ok(())
}

/// Groups of a project by number, members sorted by name.
pub(super) async fn load_groups(conn: &mut AnyConnection, project: ProjectId) -> Result<Vec<Group>> {
    let mut groups = sqlx::query(
        "SELECT id, sujet_id, numero_groupe FROM groupes WHERE projet_id = ? ORDER BY numero_groupe",
    )
    .bind(project.0)
    .fetch_all(&mut *conn)
    .await
    .context("cannot load groups")?
    .iter()
    .map(|row| {
        Ok(Group {
            id: GroupId(get_id(row, "id")?),
            number: get_u32(row, "numero_groupe")?,
            subject_id: get_opt_id(row, "sujet_id")?.map(SubjectId),
            members: Vec::new(),
        })
    })
    .collect::<Result<Vec<_>>>()?;
    let index = groups
        .iter()
        .enumerate()
        .map(|(i, g)| (g.id, i))
        .collect::<HashMap<_, _>>();
    let rows = sqlx::query(&format!(
        "SELECT eg.groupe_id AS groupe_id, {STUDENT_COLUMNS} FROM etudiant_groupe eg \
         JOIN etudiants e ON e.id = eg.etudiant_id JOIN users u ON u.id = e.user_id \
         WHERE eg.projet_id = ? ORDER BY u.name, e.id"
    ))
    .bind(project.0)
    .fetch_all(&mut *conn)
    .await
    .context("cannot load group members")?;
    for row in &rows {
        let group = GroupId(get_id(row, "groupe_id")?);
        if let Some(&i) = index.get(&group) {
            groups[i].members.push(student_from_row(row)?);
        }
    }
    Ok(groups)
}

async fn group_members(conn: &mut AnyConnection, group: GroupId) -> Result<Vec<Student>> {
    sqlx::query(&format!(
        "SELECT {STUDENT_COLUMNS} FROM etudiant_groupe eg \
         JOIN etudiants e ON e.id = eg.etudiant_id JOIN users u ON u.id = e.user_id \
         WHERE eg.groupe_id = ? ORDER BY u.name, e.id"
    ))
    .bind(group.0)
    .fetch_all(&mut *conn)
    .await
    .context("cannot load group members")?
    .iter()
    .map(student_from_row)
    .collect()
}

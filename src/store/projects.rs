use eyre::{Context, Result};
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Connection};
use tracing::{debug, info};

use super::accounts::ensure_admin;
use super::groups::{delete_groups, load_groups, recreate_groups};
use super::{
    Store, format_date, format_datetime, get_id, get_opt_string, get_string, get_u32,
    inserted_id, now, parse_date, parse_datetime,
};
use crate::algos::cycle_subjects;
use crate::errors::GroupsError;
use crate::model::{
    GroupId, ProfId, Project, ProjectId, ProjectInput, ProjectSummary, Subject, SubjectId,
    SubjectInput, UserId, decode_levels, encode_levels, normalize_levels,
};

const PROJECT_COLUMNS: &str =
    "id, prof_id, titre, description, nb_par_groupe, niveaux, date_debut, date_fin, date_creation";

/// Outcome of a project update.
#[derive(Debug)]
pub struct ProjectUpdate {
    pub project: Project,
    /// The group size or the levels changed and the groups were rebuilt.
    pub groups_recreated: bool,
}

impl Store {
    /// Every project, for administrators.
    pub async fn list_all_projects(&mut self, admin: UserId) -> Result<Vec<ProjectSummary>> {
        ensure_admin(&mut self.conn, admin).await?;
        sqlx::query(
            "SELECT p.id AS id, p.titre AS titre, p.nb_par_groupe AS nb_par_groupe, \
             p.niveaux AS niveaux, p.date_debut AS date_debut, p.date_fin AS date_fin, \
             u.name AS prof_name, u.email AS prof_email, \
             (SELECT COUNT(*) FROM groupes g WHERE g.projet_id = p.id) AS nb_groupes, \
             (SELECT COUNT(*) FROM sujets s WHERE s.projet_id = p.id) AS nb_sujets \
             FROM projets p JOIN profs pr ON pr.id = p.prof_id JOIN users u ON u.id = pr.user_id \
             ORDER BY p.id DESC",
        )
        .fetch_all(&mut self.conn)
        .await
        .context("cannot load projects")?
        .iter()
        .map(|row| {
            Ok(ProjectSummary {
                id: ProjectId(get_id(row, "id")?),
                title: get_string(row, "titre")?,
                group_size: get_u32(row, "nb_par_groupe")?,
                levels: normalize_levels(&decode_levels(&get_string(row, "niveaux")?)?),
                start_date: parse_date(&get_string(row, "date_debut")?)?,
                end_date: parse_date(&get_string(row, "date_fin")?)?,
                prof_name: get_string(row, "prof_name")?,
                prof_email: get_string(row, "prof_email")?,
                groups: get_u32(row, "nb_groupes")?,
                subjects: get_u32(row, "nb_sujets")?,
            })
        })
        .collect()
    }

    /// The professor's projects, newest first, with subjects and groups.
    pub async fn list_projects(&mut self, prof: ProfId) -> Result<Vec<Project>> {
        ensure_professor(&mut self.conn, prof).await?;
        let ids = sqlx::query("SELECT id FROM projets WHERE prof_id = ? ORDER BY id DESC")
            .bind(prof.0)
            .fetch_all(&mut self.conn)
            .await?
            .iter()
            .map(|row| get_id(row, "id").map(ProjectId))
            .collect::<Result<Vec<_>>>()?;
        let mut projects = Vec::with_capacity(ids.len());
        for id in ids {
            projects.push(full_project(&mut self.conn, prof, id).await?);
        }
        Ok(projects)
    }

    pub async fn create_project(&mut self, prof: ProfId, input: ProjectInput) -> Result<Project> {
        let input = input.validate()?;
        ensure_professor(&mut self.conn, prof).await?;
        let created_at = now();
        let result = sqlx::query(
            "INSERT INTO projets (prof_id, titre, description, nb_par_groupe, niveaux, \
             date_debut, date_fin, date_creation) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(prof.0)
        .bind(&input.title)
        .bind(input.description.as_deref())
        .bind(i64::from(input.group_size))
        .bind(encode_levels(&input.levels))
        .bind(format_date(input.start_date))
        .bind(format_date(input.end_date))
        .bind(format_datetime(created_at))
        .execute(&mut self.conn)
        .await
        .context("cannot create project")?;
        let id = ProjectId(inserted_id(&mut self.conn, &result).await?);
        info!(project = %id, prof = %prof, title = input.title, "project created");
        Ok(Project {
            id,
            prof_id: prof,
            title: input.title,
            description: input.description,
            group_size: input.group_size,
            levels: input.levels,
            start_date: input.start_date,
            end_date: input.end_date,
            created_at,
            subjects: Vec::new(),
            groups: Vec::new(),
        })
    }

    pub async fn show_project(&mut self, prof: ProfId, id: ProjectId) -> Result<Project> {
        full_project(&mut self.conn, prof, id).await
    }

    /// Update a project. When the group size or the level set changes
    /// while groups exist, the groups are dropped and, if the project has
    /// subjects, a new repartition is made with the new parameters.
    pub async fn update_project(
        &mut self,
        prof: ProfId,
        id: ProjectId,
        input: ProjectInput,
        dry_run: bool,
    ) -> Result<ProjectUpdate> {
        let input = input.validate()?;
        let mut tx = self.conn.begin().await?;
        let current = project_row(&mut tx, prof, id).await?;
        let groups = sqlx::query("SELECT COUNT(*) AS n FROM groupes WHERE projet_id = ?")
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;
        let groups_recreated = input.invalidates_groups_of(&current) && get_id(&groups, "n")? > 0;
        if groups_recreated {
            delete_groups(&mut tx, id).await?;
        }
        sqlx::query(
            "UPDATE projets SET titre = ?, description = ?, nb_par_groupe = ?, niveaux = ?, \
             date_debut = ?, date_fin = ? WHERE id = ?",
        )
        .bind(&input.title)
        .bind(input.description.as_deref())
        .bind(i64::from(input.group_size))
        .bind(encode_levels(&input.levels))
        .bind(format_date(input.start_date))
        .bind(format_date(input.end_date))
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .context("cannot update project")?;
        if groups_recreated {
            let subjects = load_subjects(&mut tx, id).await?;
            if subjects.is_empty() {
                debug!(project = %id, "groups dropped, no subject to repartition on");
            } else {
                let created = recreate_groups(
                    &mut tx,
                    &mut self.rng,
                    id,
                    &input.levels,
                    input.group_size,
                    &subjects,
                )
                .await?;
                info!(project = %id, groups = created, "groups recreated after parameter change");
            }
        }
        let project = full_project(&mut tx, prof, id).await?;
        if dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await.context("cannot commit project update")?;
        }
        Ok(ProjectUpdate {
            project,
            groups_recreated,
        })
    }

    /// Delete a project with its subjects, groups and tasks.
    pub async fn delete_project(&mut self, prof: ProfId, id: ProjectId) -> Result<()> {
        let mut tx = self.conn.begin().await?;
        project_row(&mut tx, prof, id).await?;
        delete_project_rows(&mut tx, id).await?;
        tx.commit().await.context("cannot delete project")?;
        info!(project = %id, "project deleted");
        Ok(())
    }

    /// Add a subject. Existing groups keep their subjects until the next
    /// repartition or subject reassignment.
    pub async fn add_subject(
        &mut self,
        prof: ProfId,
        project: ProjectId,
        input: &SubjectInput,
    ) -> Result<Subject> {
        input.validate()?;
        project_row(&mut self.conn, prof, project).await?;
        let result =
            sqlx::query("INSERT INTO sujets (projet_id, titre_sujet, description) VALUES (?, ?, ?)")
                .bind(project.0)
                .bind(&input.title)
                .bind(input.description.as_deref())
                .execute(&mut self.conn)
                .await
                .context("cannot add subject")?;
        let subject = Subject {
            id: SubjectId(inserted_id(&mut self.conn, &result).await?),
            project_id: project,
            title: input.title.clone(),
            description: input.description.clone(),
        };
        info!(project = %project, subject = %subject.id, "subject added");
        Ok(subject)
    }

    pub async fn update_subject(
        &mut self,
        prof: ProfId,
        id: SubjectId,
        input: &SubjectInput,
    ) -> Result<Subject> {
        input.validate()?;
        let subject = owned_subject(&mut self.conn, prof, id).await?;
        sqlx::query("UPDATE sujets SET titre_sujet = ?, description = ? WHERE id = ?")
            .bind(&input.title)
            .bind(input.description.as_deref())
            .bind(id.0)
            .execute(&mut self.conn)
            .await
            .context("cannot update subject")?;
        Ok(Subject {
            title: input.title.clone(),
            description: input.description.clone(),
            ..subject
        })
    }

    /// Delete a subject. Groups which worked on it get one of the
    /// remaining subjects, dealt cyclically, or none if no subject is left.
    /// Returns the number of groups which lost the subject.
    pub async fn delete_subject(&mut self, prof: ProfId, id: SubjectId) -> Result<usize> {
        let mut tx = self.conn.begin().await?;
        let subject = owned_subject(&mut tx, prof, id).await?;
        let affected = sqlx::query(
            "SELECT id FROM groupes WHERE projet_id = ? AND sujet_id = ? ORDER BY numero_groupe",
        )
        .bind(subject.project_id.0)
        .bind(id.0)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| get_id(row, "id").map(GroupId))
        .collect::<Result<Vec<_>>>()?;
        sqlx::query("UPDATE groupes SET sujet_id = NULL WHERE sujet_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sujets WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .context("cannot delete subject")?;
        if !affected.is_empty() {
            let remaining = load_subjects(&mut tx, subject.project_id)
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect::<Vec<_>>();
            for (group, replacement) in cycle_subjects(&affected, &remaining, &mut self.rng) {
                sqlx::query("UPDATE groupes SET sujet_id = ? WHERE id = ?")
                    .bind(replacement.map(|s| s.0))
                    .bind(group.0)
                    .execute(&mut *tx)
                    .await
                    .context("cannot reassign subject")?;
            }
            info!(
                subject = %id,
                groups = affected.len(),
                remaining = remaining.len(),
                "groups reassigned after subject deletion",
            );
        }
        tx.commit().await.context("cannot commit subject deletion")?;
        Ok(affected.len())
    }
}

/// Delete a project and everything that hangs from it.
pub(super) async fn delete_project_rows(conn: &mut AnyConnection, id: ProjectId) -> Result<()> {
    delete_groups(conn, id).await?;
    for statement in [
        "DELETE FROM taches WHERE projet_id = ?",
        "DELETE FROM sujets WHERE projet_id = ?",
        "DELETE FROM projets WHERE id = ?",
    ] {
        sqlx::query(statement)
            .bind(id.0)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("cannot delete project {id}"))?;
    }
    Ok(())
}

pub(super) async fn ensure_professor(conn: &mut AnyConnection, prof: ProfId) -> Result<()> {
    sqlx::query("SELECT id FROM profs WHERE id = ?")
        .bind(prof.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(GroupsError::ProfessorNotFound(prof))?;
    Ok(())
}

fn project_from_row(row: &AnyRow) -> Result<Project> {
    Ok(Project {
        id: ProjectId(get_id(row, "id")?),
        prof_id: ProfId(get_id(row, "prof_id")?),
        title: get_string(row, "titre")?,
        description: get_opt_string(row, "description")?,
        group_size: get_u32(row, "nb_par_groupe")?,
        levels: normalize_levels(&decode_levels(&get_string(row, "niveaux")?)?),
        start_date: parse_date(&get_string(row, "date_debut")?)?,
        end_date: parse_date(&get_string(row, "date_fin")?)?,
        created_at: parse_datetime(&get_string(row, "date_creation")?)?,
        subjects: Vec::new(),
        groups: Vec::new(),
    })
}

/// Project without its subjects and groups, if it belongs to `prof`.
pub(super) async fn project_row(
    conn: &mut AnyConnection,
    prof: ProfId,
    id: ProjectId,
) -> Result<Project> {
    let row = sqlx::query(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projets WHERE id = ? AND prof_id = ?"
    ))
    .bind(id.0)
    .bind(prof.0)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(GroupsError::ProjectNotFound(id))?;
    project_from_row(&row)
}

pub(super) async fn full_project(
    conn: &mut AnyConnection,
    prof: ProfId,
    id: ProjectId,
) -> Result<Project> {
    let mut project = project_row(conn, prof, id).await?;
    project.subjects = load_subjects(conn, id).await?;
    project.groups = load_groups(conn, id).await?;
    Ok(project)
}

pub(super) async fn load_subjects(conn: &mut AnyConnection, project: ProjectId) -> Result<Vec<Subject>> {
    sqlx::query(
        "SELECT id, projet_id, titre_sujet, description FROM sujets WHERE projet_id = ? ORDER BY id",
    )
    .bind(project.0)
    .fetch_all(&mut *conn)
    .await
    .context("cannot load subjects")?
    .iter()
    .map(subject_from_row)
    .collect()
}

fn subject_from_row(row: &AnyRow) -> Result<Subject> {
    Ok(Subject {
        id: SubjectId(get_id(row, "id")?),
        project_id: ProjectId(get_id(row, "projet_id")?),
        title: get_string(row, "titre_sujet")?,
        description: get_opt_string(row, "description")?,
    })
}

/// A subject whose project belongs to `prof`.
async fn owned_subject(conn: &mut AnyConnection, prof: ProfId, id: SubjectId) -> Result<Subject> {
    let row = sqlx::query(
        "SELECT s.id AS id, s.projet_id AS projet_id, s.titre_sujet AS titre_sujet, \
         s.description AS description, p.prof_id AS prof_id \
         FROM sujets s JOIN projets p ON p.id = s.projet_id WHERE s.id = ?",
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(GroupsError::SubjectNotFound(id))?;
    if ProfId(get_id(&row, "prof_id")?) != prof {
        return Err(GroupsError::Forbidden(id).into());
    }
    subject_from_row(&row)
}

use eyre::{Context, Result};
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Connection};
use tracing::{debug, info};

use super::projects::delete_project_rows;
use super::{STUDENT_COLUMNS, Store, get_id, get_string, inserted_id, student_from_row};
use crate::errors::GroupsError;
use crate::model::{
    AdminInput, ProfId, Professor, ProfessorInput, ProjectId, Role, Student, StudentId,
    StudentInput, User, UserId,
};

const PROFESSOR_QUERY: &str = "SELECT p.id AS prof_id, p.user_id AS user_id, u.name AS name, \
     u.email AS email, p.matricule AS matricule, p.specialite AS specialite, p.grade AS grade \
     FROM profs p JOIN users u ON u.id = p.user_id";

impl Store {
    pub async fn add_professor(&mut self, input: &ProfessorInput) -> Result<Professor> {
        input.validate()?;
        let mut tx = self.conn.begin().await?;
        let user_id = insert_user(&mut tx, &input.name, &input.email, Role::Prof.as_str()).await?;
        let result = sqlx::query(
            "INSERT INTO profs (user_id, matricule, specialite, grade) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id.0)
        .bind(&input.matricule)
        .bind(&input.speciality)
        .bind(&input.grade)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("cannot insert professor {}", input.matricule))?;
        let id = ProfId(inserted_id(&mut tx, &result).await?);
        tx.commit().await?;
        info!(prof = %id, matricule = input.matricule, "professor added");
        Ok(Professor {
            id,
            user_id,
            name: input.name.clone(),
            email: input.email.clone(),
            matricule: input.matricule.clone(),
            speciality: input.speciality.clone(),
            grade: input.grade.clone(),
        })
    }

    pub async fn list_professors(&mut self) -> Result<Vec<Professor>> {
        sqlx::query(&format!("{PROFESSOR_QUERY} ORDER BY u.name, p.id"))
            .fetch_all(&mut self.conn)
            .await
            .context("cannot load professors")?
            .iter()
            .map(professor_from_row)
            .collect()
    }

    /// Update a professor's account and profile. Their projects are kept.
    pub async fn update_professor(
        &mut self,
        prof: ProfId,
        input: &ProfessorInput,
    ) -> Result<Professor> {
        input.validate()?;
        let mut tx = self.conn.begin().await?;
        let current = find_professor(&mut tx, prof).await?;
        sqlx::query("UPDATE users SET name = ?, email = ? WHERE id = ?")
            .bind(&input.name)
            .bind(&input.email)
            .bind(current.user_id.0)
            .execute(&mut *tx)
            .await
            .context("cannot update professor account")?;
        sqlx::query("UPDATE profs SET matricule = ?, specialite = ?, grade = ? WHERE id = ?")
            .bind(&input.matricule)
            .bind(&input.speciality)
            .bind(&input.grade)
            .bind(prof.0)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("cannot update professor {}", input.matricule))?;
        let professor = find_professor(&mut tx, prof).await?;
        tx.commit().await?;
        info!(prof = %prof, "professor updated");
        Ok(professor)
    }

    /// Delete a professor together with their projects.
    pub async fn delete_professor(&mut self, prof: ProfId) -> Result<()> {
        let mut tx = self.conn.begin().await?;
        let professor = find_professor(&mut tx, prof).await?;
        let projects = sqlx::query("SELECT id FROM projets WHERE prof_id = ?")
            .bind(prof.0)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| get_id(row, "id").map(ProjectId))
            .collect::<Result<Vec<_>>>()?;
        for project in projects {
            delete_project_rows(&mut tx, project).await?;
        }
        sqlx::query("DELETE FROM profs WHERE id = ?")
            .bind(prof.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(professor.user_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await.context("cannot delete professor")?;
        info!(prof = %prof, "professor deleted");
        Ok(())
    }

    pub async fn add_admin(&mut self, input: &AdminInput) -> Result<User> {
        input.validate()?;
        let id = insert_user(&mut self.conn, &input.name, &input.email, Role::Admin.as_str()).await?;
        info!(user = %id, "administrator added");
        Ok(User {
            id,
            name: input.name.clone(),
            email: input.email.clone(),
            role: Role::Admin,
        })
    }

    /// Every account, administrators first.
    pub async fn list_users(&mut self) -> Result<Vec<User>> {
        sqlx::query(
            "SELECT id, name, email, role FROM users \
             ORDER BY CASE role WHEN 'admin' THEN 0 WHEN 'prof' THEN 1 ELSE 2 END, name, id",
        )
        .fetch_all(&mut self.conn)
        .await
        .context("cannot load accounts")?
        .iter()
        .map(|row| {
            Ok(User {
                id: UserId(get_id(row, "id")?),
                name: get_string(row, "name")?,
                email: get_string(row, "email")?,
                role: get_string(row, "role")?.parse()?,
            })
        })
        .collect()
    }

    /// Delete an administrator account. Professor and student accounts
    /// go through their own deletions.
    pub async fn delete_admin(&mut self, id: UserId) -> Result<()> {
        ensure_admin(&mut self.conn, id).await?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.0)
            .execute(&mut self.conn)
            .await
            .context("cannot delete administrator")?;
        info!(user = %id, "administrator deleted");
        Ok(())
    }

    pub async fn add_student(&mut self, input: &StudentInput) -> Result<Student> {
        input.validate()?;
        let mut tx = self.conn.begin().await?;
        let student = insert_student(&mut tx, input).await?;
        tx.commit().await?;
        info!(student = %student, level = %student.level, "student added");
        Ok(student)
    }

    /// Insert a whole roster, or nothing if one entry is refused.
    pub async fn import_students(&mut self, roster: &[StudentInput]) -> Result<usize> {
        for (line, input) in roster.iter().enumerate() {
            input
                .validate()
                .with_context(|| format!("invalid roster entry {}", line + 1))?;
        }
        let mut tx = self.conn.begin().await?;
        for input in roster {
            let student = insert_student(&mut tx, input).await?;
            debug!(student = %student, "student imported");
        }
        tx.commit().await.context("cannot commit student import")?;
        info!(students = roster.len(), "roster imported");
        Ok(roster.len())
    }

    pub async fn list_students(&mut self) -> Result<Vec<Student>> {
        sqlx::query(&format!(
            "SELECT {STUDENT_COLUMNS} FROM etudiants e JOIN users u ON u.id = e.user_id \
             ORDER BY u.name, e.id"
        ))
        .fetch_all(&mut self.conn)
        .await
        .context("cannot load students")?
        .iter()
        .map(student_from_row)
        .collect()
    }

    pub async fn student(&mut self, id: StudentId) -> Result<Student> {
        find_student(&mut self.conn, id).await
    }

    /// Update a student's profile. Existing groups are left untouched,
    /// even if the level changes.
    pub async fn update_student(&mut self, id: StudentId, input: &StudentInput) -> Result<Student> {
        input.validate()?;
        let mut tx = self.conn.begin().await?;
        let current = find_student(&mut tx, id).await?;
        sqlx::query("UPDATE users SET name = ?, email = ? WHERE id = ?")
            .bind(&input.name)
            .bind(&input.email)
            .bind(current.user_id.0)
            .execute(&mut *tx)
            .await
            .context("cannot update student account")?;
        sqlx::query("UPDATE etudiants SET matricule = ?, filiere = ?, niveau = ? WHERE id = ?")
            .bind(&input.matricule)
            .bind(&input.field)
            .bind(input.level.as_str())
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .context("cannot update student")?;
        let student = find_student(&mut tx, id).await?;
        tx.commit().await?;
        if student.level != current.level {
            debug!(student = %student, from = %current.level, to = %student.level, "level changed");
        }
        Ok(student)
    }

    /// Delete a student, their group memberships and their tasks.
    pub async fn delete_student(&mut self, id: StudentId) -> Result<()> {
        let mut tx = self.conn.begin().await?;
        let student = find_student(&mut tx, id).await?;
        for statement in [
            "DELETE FROM etudiant_groupe WHERE etudiant_id = ?",
            "DELETE FROM taches WHERE etudiant_id = ?",
            "DELETE FROM etudiants WHERE id = ?",
        ] {
            sqlx::query(statement).bind(id.0).execute(&mut *tx).await?;
        }
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(student.user_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await.context("cannot delete student")?;
        info!(student = %student, "student deleted");
        Ok(())
    }
}

async fn insert_user(conn: &mut AnyConnection, name: &str, email: &str, role: &str) -> Result<UserId> {
    let result = sqlx::query("INSERT INTO users (name, email, role) VALUES (?, ?, ?)")
        .bind(name)
        .bind(email)
        .bind(role)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("cannot create account for {email}"))?;
    Ok(UserId(inserted_id(&mut *conn, &result).await?))
}

async fn insert_student(conn: &mut AnyConnection, input: &StudentInput) -> Result<Student> {
    let user_id = insert_user(conn, &input.name, &input.email, Role::Student.as_str()).await?;
    let result =
        sqlx::query("INSERT INTO etudiants (user_id, matricule, filiere, niveau) VALUES (?, ?, ?, ?)")
            .bind(user_id.0)
            .bind(&input.matricule)
            .bind(&input.field)
            .bind(input.level.as_str())
            .execute(&mut *conn)
            .await
            .with_context(|| format!("cannot insert student {}", input.matricule))?;
    Ok(Student {
        id: StudentId(inserted_id(&mut *conn, &result).await?),
        user_id,
        name: input.name.clone(),
        email: input.email.clone(),
        matricule: input.matricule.clone(),
        field: input.field.clone(),
        level: input.level,
    })
}

pub(super) async fn ensure_admin(conn: &mut AnyConnection, id: UserId) -> Result<()> {
    let role = sqlx::query("SELECT role FROM users WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| get_string(&row, "role"))
        .transpose()?
        .ok_or(GroupsError::UserNotFound(id))?;
    if role.parse::<Role>()? != Role::Admin {
        return Err(GroupsError::NotAdmin(id).into());
    }
    Ok(())
}

async fn find_professor(conn: &mut AnyConnection, id: ProfId) -> Result<Professor> {
    let row = sqlx::query(&format!("{PROFESSOR_QUERY} WHERE p.id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(GroupsError::ProfessorNotFound(id))?;
    professor_from_row(&row)
}

fn professor_from_row(row: &AnyRow) -> Result<Professor> {
    Ok(Professor {
        id: ProfId(get_id(row, "prof_id")?),
        user_id: UserId(get_id(row, "user_id")?),
        name: get_string(row, "name")?,
        email: get_string(row, "email")?,
        matricule: get_string(row, "matricule")?,
        speciality: get_string(row, "specialite")?,
        grade: get_string(row, "grade")?,
    })
}

pub(super) async fn find_student(conn: &mut AnyConnection, id: StudentId) -> Result<Student> {
    let row = sqlx::query(&format!(
        "SELECT {STUDENT_COLUMNS} FROM etudiants e JOIN users u ON u.id = e.user_id WHERE e.id = ?"
    ))
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(GroupsError::StudentNotFound(id))?;
    student_from_row(&row)
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::model::Level;

    fn roster_entry(k: u32, level: Level) -> StudentInput {
        StudentInput {
            matricule: format!("ETU{k:04}"),
            name: format!("Student {k}"),
            email: format!("s{k}@example.org"),
            field: "Mathématiques".into(),
            level,
        }
    }

    #[tokio::test]
    async fn test_students() {
        let mut store = testing::store().await;
        let ids = testing::students(&mut store, Level::L2, 3).await;
        assert_eq!(store.list_students().await.unwrap().len(), 3);
        let updated = store
            .update_student(ids[1], &roster_entry(99, Level::M1))
            .await
            .unwrap();
        assert_eq!(updated.level, Level::M1);
        assert_eq!(updated.matricule, "ETU0099");
        store.delete_student(ids[0]).await.unwrap();
        let err = store.student(ids[0]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GroupsError>(),
            Some(GroupsError::StudentNotFound(_))
        ));
        assert_eq!(store.list_students().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_import_is_all_or_nothing() {
        let mut store = testing::store().await;
        let roster = vec![
            roster_entry(1, Level::L1),
            roster_entry(2, Level::L1),
            roster_entry(1, Level::L3),
        ];
        assert!(store.import_students(&roster).await.is_err());
        assert!(store.list_students().await.unwrap().is_empty());
        assert_eq!(store.import_students(&roster[..2]).await.unwrap(), 2);
        assert_eq!(store.list_students().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_professors() {
        let mut store = testing::store().await;
        let prof = testing::professor(&mut store, 1).await;
        testing::professor(&mut store, 2).await;
        let project = testing::project(&mut store, prof, 2, &[Level::L1]).await;
        testing::subject(&mut store, prof, project, "Interpréteur").await;
        assert_eq!(store.list_professors().await.unwrap().len(), 2);
        store.delete_professor(prof).await.unwrap();
        assert_eq!(store.list_professors().await.unwrap().len(), 1);
        let admin = testing::admin(&mut store).await;
        assert!(store.list_all_projects(admin).await.unwrap().is_empty());
        let err = store.delete_professor(prof).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GroupsError>(),
            Some(GroupsError::ProfessorNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_professor() {
        let mut store = testing::store().await;
        let prof = testing::professor(&mut store, 1).await;
        let project = testing::project(&mut store, prof, 2, &[Level::L1]).await;
        let input = ProfessorInput {
            name: "Fatou Ndiaye".into(),
            email: "fatou@example.org".into(),
            matricule: "PROF0042".into(),
            speciality: "Réseaux".into(),
            grade: "PR".into(),
        };
        let updated = store.update_professor(prof, &input).await.unwrap();
        assert_eq!((updated.id, updated.name.as_str()), (prof, "Fatou Ndiaye"));
        assert_eq!(updated.grade, "PR");
        let listed = store.list_professors().await.unwrap();
        assert_eq!(listed[0].email, "fatou@example.org");
        assert_eq!(listed[0].user_id, updated.user_id);
        assert_eq!(store.show_project(prof, project).await.unwrap().prof_id, prof);
        let err = store.update_professor(ProfId(99), &input).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GroupsError>(),
            Some(GroupsError::ProfessorNotFound(_))
        ));
        let bad = ProfessorInput {
            email: "nobody".into(),
            ..input
        };
        assert!(store.update_professor(prof, &bad).await.is_err());
        assert_eq!(store.list_professors().await.unwrap()[0].name, "Fatou Ndiaye");
    }

    #[tokio::test]
    async fn test_administrators() {
        let mut store = testing::store().await;
        let prof = testing::professor(&mut store, 1).await;
        testing::students(&mut store, Level::L1, 1).await;
        let admin = store
            .add_admin(&AdminInput {
                name: "Root".into(),
                email: "root@example.org".into(),
            })
            .await
            .unwrap();
        let users = store.list_users().await.unwrap();
        let roles = users.iter().map(|u| u.role).collect::<Vec<_>>();
        assert_eq!(roles, vec![Role::Admin, Role::Prof, Role::Student]);
        assert_eq!(users[0].id, admin.id);
        testing::project(&mut store, prof, 2, &[Level::L1]).await;
        assert_eq!(store.list_all_projects(admin.id).await.unwrap().len(), 1);
        let prof_user = users[1].id;
        let err = store.list_all_projects(prof_user).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GroupsError>(),
            Some(GroupsError::NotAdmin(_))
        ));
        let err = store.delete_admin(prof_user).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GroupsError>(),
            Some(GroupsError::NotAdmin(_))
        ));
        assert_eq!(store.list_professors().await.unwrap().len(), 1);
        store.delete_admin(admin.id).await.unwrap();
        let err = store.list_all_projects(admin.id).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GroupsError>(),
            Some(GroupsError::UserNotFound(_))
        ));
        assert_eq!(store.list_users().await.unwrap().len(), 2);
    }
}

use std::fmt;
use std::str::FromStr;

use super::{Level, ProfId, StudentId, UserId, check_title};
use crate::errors::GroupsError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Admin,
    Prof,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Prof => "prof",
            Role::Student => "etudiant",
        }
    }
}

impl FromStr for Role {
    type Err = GroupsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Role::Admin, Role::Prof, Role::Student]
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| GroupsError::InvalidInput {
                field: "role",
                reason: format!("unknown role {s:?}"),
            })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any account, whatever its role.
#[derive(Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Clone, Debug)]
pub struct AdminInput {
    pub name: String,
    pub email: String,
}

impl AdminInput {
    pub fn validate(&self) -> Result<(), GroupsError> {
        check_title("name", &self.name)?;
        check_email(&self.email)
    }
}

#[derive(Clone, Debug)]
pub struct Professor {
    pub id: ProfId,
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub matricule: String,
    pub speciality: String,
    pub grade: String,
}

#[derive(Clone, Debug)]
pub struct Student {
    pub id: StudentId,
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub matricule: String,
    pub field: String,
    pub level: Level,
}

impl Student {
    /// Student record without a backing account, for computations only.
    #[cfg(test)]
    pub fn dummy(id: i64, level: Level) -> Self {
        Student {
            id: StudentId(id),
            user_id: UserId(id),
            name: format!("Student {id}"),
            email: format!("student{id}@example.org"),
            matricule: format!("ETU{id:04}"),
            field: "Informatique".to_owned(),
            level,
        }
    }
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.matricule)
    }
}

#[derive(Clone, Debug)]
pub struct ProfessorInput {
    pub name: String,
    pub email: String,
    pub matricule: String,
    pub speciality: String,
    pub grade: String,
}

impl ProfessorInput {
    pub fn validate(&self) -> Result<(), GroupsError> {
        check_title("name", &self.name)?;
        check_email(&self.email)?;
        check_title("matricule", &self.matricule)?;
        check_title("speciality", &self.speciality)?;
        check_title("grade", &self.grade)
    }
}

/// One roster entry, as typed on the command line or read from a CSV file.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct StudentInput {
    pub matricule: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "filiere")]
    pub field: String,
    #[serde(rename = "niveau")]
    pub level: Level,
}

impl StudentInput {
    pub fn validate(&self) -> Result<(), GroupsError> {
        check_title("matricule", &self.matricule)?;
        check_title("name", &self.name)?;
        check_email(&self.email)?;
        check_title("filiere", &self.field)
    }
}

fn check_email(email: &str) -> Result<(), GroupsError> {
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(GroupsError::InvalidInput {
            field: "email",
            reason: format!("{email:?} is not an email address"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_student_validation() {
        let mut input = StudentInput {
            matricule: "ETU2024001".into(),
            name: "Awa Diop".into(),
            email: "awa@example.org".into(),
            field: "Informatique".into(),
            level: Level::L3,
        };
        assert!(input.validate().is_ok());
        input.email = "awa.example.org".into();
        assert!(matches!(
            input.validate(),
            Err(GroupsError::InvalidInput { field: "email", .. })
        ));
        input.email = "awa@example.org".into();
        input.name = "   ".into();
        assert!(matches!(
            input.validate(),
            Err(GroupsError::InvalidInput { field: "name", .. })
        ));
    }
}

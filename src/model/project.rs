use chrono::{NaiveDate, NaiveDateTime};

use super::{Group, Level, ProfId, ProjectId, SubjectId, check_title, normalize_levels};
use crate::errors::GroupsError;

#[derive(Clone, Debug)]
pub struct Project {
    pub id: ProjectId,
    pub prof_id: ProfId,
    pub title: String,
    pub description: Option<String>,
    pub group_size: u32,
    pub levels: Vec<Level>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub subjects: Vec<Subject>,
    pub groups: Vec<Group>,
}

impl Project {
    pub fn subject(&self, id: SubjectId) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }
}

/// Administrator view of a project.
#[derive(Clone, Debug)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub title: String,
    pub group_size: u32,
    pub levels: Vec<Level>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub prof_name: String,
    pub prof_email: String,
    pub groups: u32,
    pub subjects: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subject {
    pub id: SubjectId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ProjectInput {
    pub title: String,
    pub description: Option<String>,
    pub group_size: u32,
    pub levels: Vec<Level>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ProjectInput {
    /// Validate the input and put its level set in canonical form.
    pub fn validate(mut self) -> Result<Self, GroupsError> {
        check_title("title", &self.title)?;
        if self.group_size == 0 {
            return Err(GroupsError::InvalidGroupSize);
        }
        if self.levels.is_empty() {
            return Err(GroupsError::NoLevels);
        }
        if self.end_date < self.start_date {
            return Err(GroupsError::InvalidInput {
                field: "end date",
                reason: format!("{} is before start date {}", self.end_date, self.start_date),
            });
        }
        self.levels = normalize_levels(&self.levels);
        Ok(self)
    }

    /// A repartition computed with the old parameters is stale.
    pub fn invalidates_groups_of(&self, project: &Project) -> bool {
        self.group_size != project.group_size || self.levels != project.levels
    }
}

#[derive(Clone, Debug)]
pub struct SubjectInput {
    pub title: String,
    pub description: Option<String>,
}

impl SubjectInput {
    pub fn validate(&self) -> Result<(), GroupsError> {
        check_title("subject title", &self.title)
    }
}

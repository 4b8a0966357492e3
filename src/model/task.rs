use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};

use super::{Level, ProjectId, StudentId, TaskId, check_title};
use crate::errors::GroupsError;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum TaskStatus {
    #[default]
    Todo,
    #[value(name = "in_progress")]
    InProgress,
    Overdue,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Overdue,
        TaskStatus::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Overdue => "overdue",
            TaskStatus::Done => "done",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum Priority {
    High,
    #[default]
    Mid,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Mid, Priority::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Mid => "mid",
            Priority::Low => "low",
        }
    }
}

macro_rules! text_enum {
    ($ty:ident, $what:literal) => {
        impl FromStr for $ty {
            type Err = GroupsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| GroupsError::InvalidInput {
                        field: $what,
                        reason: format!("unknown value {s:?}"),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(TaskStatus, "status");
text_enum!(Priority, "priority");

#[derive(Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub student_id: StudentId,
    pub project_id: ProjectId,
    pub project_title: String,
    pub name: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

/// A task seen by the professor supervising its project.
#[derive(Clone, Debug)]
pub struct ProfessorTask {
    pub task: Task,
    pub student_name: String,
    pub student_email: String,
    pub matricule: String,
    pub level: Level,
    pub field: String,
    pub group_number: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct TaskInput {
    pub project_id: ProjectId,
    pub name: String,
    pub priority: Priority,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl TaskInput {
    pub fn validate(&self) -> Result<(), GroupsError> {
        check_title("task name", &self.name)
    }
}

/// Partial update of a task; `None` keeps the current value.
#[derive(Clone, Debug, Default)]
pub struct TaskPatch {
    pub project_id: Option<ProjectId>,
    pub name: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl TaskPatch {
    pub fn validate(&self) -> Result<(), GroupsError> {
        match &self.name {
            Some(name) => check_title("task name", name),
            None => Ok(()),
        }
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(project_id) = self.project_id {
            task.project_id = project_id;
        }
        if let Some(name) = self.name {
            task.name = name;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if self.start_date.is_some() {
            task.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            task.end_date = self.end_date;
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TaskStats {
    pub total: u32,
    pub todo: u32,
    pub in_progress: u32,
    pub overdue: u32,
    pub done: u32,
}

impl TaskStats {
    pub fn record(&mut self, status: TaskStatus, n: u32) {
        self.total += n;
        *match status {
            TaskStatus::Todo => &mut self.todo,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::Overdue => &mut self.overdue,
            TaskStatus::Done => &mut self.done,
        } += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("started".parse::<TaskStatus>().is_err());
        assert_eq!("low".parse::<Priority>().unwrap(), Priority::Low);
    }

    #[test]
    fn test_patch_keeps_unset_fields() {
        let mut task = Task {
            id: TaskId(1),
            student_id: StudentId(2),
            project_id: ProjectId(3),
            project_title: "Compilateur".into(),
            name: "Lexer".into(),
            status: TaskStatus::Todo,
            priority: Priority::Mid,
            start_date: None,
            end_date: None,
            created_at: NaiveDateTime::default(),
        };
        TaskPatch {
            priority: Some(Priority::High),
            status: Some(TaskStatus::Done),
            ..TaskPatch::default()
        }
        .apply(&mut task);
        assert_eq!(task.name, "Lexer");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.project_id, ProjectId(3));
    }

    #[test]
    fn test_stats() {
        let mut stats = TaskStats::default();
        stats.record(TaskStatus::Done, 2);
        stats.record(TaskStatus::Overdue, 1);
        assert_eq!(
            stats,
            TaskStats {
                total: 3,
                overdue: 1,
                done: 2,
                ..TaskStats::default()
            }
        );
    }
}

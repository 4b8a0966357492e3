use crate::model::{ProfId, ProjectId, StudentId, SubjectId, TaskId, UserId};

/// Refusals from the domain operations. They travel inside an
/// `eyre::Report` and can be recovered with `downcast_ref`.
#[derive(Debug, thiserror::Error)]
pub enum GroupsError {
    #[error("invalid level {0:?} (expected one of L1, L2, L3, M1, M2)")]
    InvalidLevel(String),
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },
    #[error("group size must be at least 1")]
    InvalidGroupSize,
    #[error("account {0} not found")]
    UserNotFound(UserId),
    #[error("account {0} is not an administrator")]
    NotAdmin(UserId),
    #[error("professor {0} not found")]
    ProfessorNotFound(ProfId),
    #[error("student {0} not found")]
    StudentNotFound(StudentId),
    #[error("project {0} not found or not owned by this professor")]
    ProjectNotFound(ProjectId),
    #[error("subject {0} not found")]
    SubjectNotFound(SubjectId),
    #[error("subject {0} belongs to a project of another professor")]
    Forbidden(SubjectId),
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    #[error("add at least one subject to the project first")]
    NoSubjects,
    #[error("no level defined for this project")]
    NoLevels,
    #[error("no student available for the repartition")]
    NoEligibleStudents,
    #[error("no group exists yet, run the repartition first")]
    NoGroups,
    #[error("student {student} is not in any group of project {project}")]
    NotInProjectGroup {
        student: StudentId,
        project: ProjectId,
    },
}

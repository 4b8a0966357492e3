pub use self::account::{AdminInput, Professor, ProfessorInput, Role, Student, StudentInput, User};
pub use self::group::{Group, PlannedGroup};
pub use self::level::{Level, decode_levels, encode_levels, normalize_levels};
pub use self::project::{Project, ProjectInput, ProjectSummary, Subject, SubjectInput};
pub use self::task::{Priority, ProfessorTask, Task, TaskInput, TaskPatch, TaskStats, TaskStatus};

mod account;
mod group;
mod level;
mod project;
mod task;

macro_rules! id_type {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
            pub struct $name(pub i64);

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

id_type!(UserId, ProfId, StudentId, ProjectId, SubjectId, GroupId, TaskId);

/// Check a mandatory title-like field: non-blank and at most 255 characters.
pub(crate) fn check_title(field: &'static str, value: &str) -> Result<(), crate::errors::GroupsError> {
    let reason = if value.trim().is_empty() {
        "must not be empty"
    } else if value.chars().count() > 255 {
        "must be at most 255 characters"
    } else {
        return Ok(());
    };
    Err(crate::errors::GroupsError::InvalidInput {
        field,
        reason: reason.to_owned(),
    })
}

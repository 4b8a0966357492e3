use std::collections::HashMap;

use eyre::{Result, bail, ensure};
use tracing::warn;

use crate::model::{PlannedGroup, Student, StudentId};

/// Refuse a repartition which would break the group invariants.
pub fn ensure_consistent(
    groups: &[PlannedGroup],
    students: &[Student],
    group_size: u32,
) -> Result<()> {
    let levels = students
        .iter()
        .map(|s| (s.id, s.level))
        .collect::<HashMap<_, _>>();
    let mut seen: HashMap<StudentId, u32> = HashMap::new();
    for (expected, group) in (1..).zip(groups) {
        ensure!(
            group.number == expected,
            "group {} found where group {} was expected",
            group.number,
            expected
        );
        ensure!(!group.students.is_empty(), "group {} is empty", group.number);
        ensure!(
            group.students.len() <= group_size as usize,
            "group {} has {} students, more than {}",
            group.number,
            group.students.len(),
            group_size
        );
        for &student in &group.students {
            if let Some(other) = seen.insert(student, group.number) {
                bail!(
                    "student {} is in both groups {} and {}",
                    student,
                    other,
                    group.number
                );
            }
            match levels.get(&student) {
                Some(&level) if level == group.level => (),
                Some(&level) => bail!(
                    "student {} of level {} is in group {} of level {}",
                    student,
                    level,
                    group.number,
                    group.level
                ),
                None => bail!("group {} contains unknown student {}", group.number, student),
            }
        }
    }
    Ok(())
}

pub fn check_lonely_students(groups: &[PlannedGroup], group_size: u32) {
    if group_size < 2 {
        return;
    }
    for g in groups.iter().filter(|g| g.students.len() == 1) {
        warn!(
            group = g.number,
            level = %g.level,
            "student {} will work alone",
            g.students[0]
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Level, SubjectId};

    fn group(number: u32, level: Level, students: &[i64]) -> PlannedGroup {
        PlannedGroup {
            number,
            level,
            subject: SubjectId(1),
            students: students.iter().copied().map(StudentId).collect(),
        }
    }

    fn pool() -> Vec<Student> {
        vec![
            Student::dummy(1, Level::L1),
            Student::dummy(2, Level::L1),
            Student::dummy(3, Level::M1),
        ]
    }

    #[test]
    fn test_consistent() {
        let groups = [group(1, Level::L1, &[1, 2]), group(2, Level::M1, &[3])];
        assert!(ensure_consistent(&groups, &pool(), 2).is_ok());
    }

    #[test]
    fn test_inconsistencies() {
        let pool = pool();
        let twice = [group(1, Level::L1, &[1]), group(2, Level::L1, &[1, 2])];
        assert!(ensure_consistent(&twice, &pool, 2).is_err());
        let gap = [group(1, Level::L1, &[1]), group(3, Level::M1, &[3])];
        assert!(ensure_consistent(&gap, &pool, 2).is_err());
        let mixed = [group(1, Level::L1, &[1, 3])];
        assert!(ensure_consistent(&mixed, &pool, 2).is_err());
        let oversized = [group(1, Level::L1, &[1, 2])];
        assert!(ensure_consistent(&oversized, &pool, 1).is_err());
        let stranger = [group(1, Level::L1, &[9])];
        assert!(ensure_consistent(&stranger, &pool, 2).is_err());
    }
}

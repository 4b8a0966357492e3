use std::collections::BTreeMap;

use crate::model::{Group, Level, Project, Subject};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LevelStats {
    pub level: Option<Level>,
    pub groups: usize,
    pub students: usize,
    pub smallest: usize,
    pub largest: usize,
}

/// Group counts and group sizes by group level, empty groups last.
pub fn level_statistics(groups: &[Group]) -> Vec<LevelStats> {
    let mut stats: BTreeMap<(bool, Option<Level>), LevelStats> = BTreeMap::new();
    for g in groups {
        let level = g.level();
        let size = g.members.len();
        let entry = stats.entry((level.is_none(), level)).or_insert(LevelStats {
            level,
            groups: 0,
            students: 0,
            smallest: size,
            largest: size,
        });
        entry.groups += 1;
        entry.students += size;
        entry.smallest = entry.smallest.min(size);
        entry.largest = entry.largest.max(size);
    }
    stats.into_values().collect()
}

/// Number of groups working on each subject, in subject order, and the
/// number of groups without a subject.
pub fn subject_usage(project: &Project) -> (Vec<(&Subject, usize)>, usize) {
    let usage = project
        .subjects
        .iter()
        .map(|s| {
            let n = project
                .groups
                .iter()
                .filter(|g| g.subject_id == Some(s.id))
                .count();
            (s, n)
        })
        .collect();
    let orphans = project
        .groups
        .iter()
        .filter(|g| g.subject_id.is_none())
        .count();
    (usage, orphans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupId, Student};

    fn group(id: i64, members: Vec<Student>) -> Group {
        Group {
            id: GroupId(id),
            number: id as u32,
            subject_id: None,
            members,
        }
    }

    #[test]
    fn test_level_statistics() {
        let groups = vec![
            group(1, vec![Student::dummy(1, Level::M1), Student::dummy(2, Level::M1)]),
            group(2, vec![Student::dummy(3, Level::L2)]),
            group(3, vec![]),
            group(4, vec![Student::dummy(4, Level::M1)]),
        ];
        let stats = level_statistics(&groups);
        assert_eq!(
            stats,
            vec![
                LevelStats {
                    level: Some(Level::L2),
                    groups: 1,
                    students: 1,
                    smallest: 1,
                    largest: 1,
                },
                LevelStats {
                    level: Some(Level::M1),
                    groups: 2,
                    students: 3,
                    smallest: 1,
                    largest: 2,
                },
                LevelStats {
                    level: None,
                    groups: 1,
                    students: 0,
                    smallest: 0,
                    largest: 0,
                },
            ]
        );
    }
}

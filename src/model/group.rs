use std::collections::HashMap;

use super::{GroupId, Level, Student, StudentId, SubjectId};

#[derive(Clone, Debug)]
pub struct Group {
    pub id: GroupId,
    pub number: u32,
    pub subject_id: Option<SubjectId>,
    pub members: Vec<Student>,
}

impl Group {
    pub fn level(&self) -> Option<Level> {
        group_level(self.members.iter().map(|s| s.level))
    }
}

/// A group computed by the repartition, not saved yet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlannedGroup {
    pub number: u32,
    pub level: Level,
    pub subject: SubjectId,
    pub students: Vec<StudentId>,
}

/// Most frequent level among the members; the first one seen wins a tie.
pub fn group_level(levels: impl IntoIterator<Item = Level>) -> Option<Level> {
    let mut counts: HashMap<Level, (usize, usize)> = HashMap::new();
    for (seen, level) in levels.into_iter().enumerate() {
        counts.entry(level).or_insert((0, seen)).0 += 1;
    }
    counts
        .into_iter()
        .max_by_key(|&(_, (count, first))| (count, std::cmp::Reverse(first)))
        .map(|(level, _)| level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_level() {
        assert_eq!(group_level([]), None);
        assert_eq!(
            group_level([Level::L2, Level::L3, Level::L3]),
            Some(Level::L3)
        );
        assert_eq!(
            group_level([Level::M1, Level::L1, Level::L1, Level::M1]),
            Some(Level::M1)
        );
    }

    #[test]
    fn test_group_level_from_members() {
        let group = Group {
            id: GroupId(1),
            number: 1,
            subject_id: None,
            members: vec![Student::dummy(4, Level::L1), Student::dummy(7, Level::L1)],
        };
        assert_eq!(group.level(), Some(Level::L1));
    }
}

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, trace};

use crate::errors::GroupsError;
use crate::model::{Level, PlannedGroup, Student, StudentId, SubjectId};

/// Split the students whose level belongs to `levels` into groups of at
/// most `group_size` students of a single level, and hand out the
/// subjects cyclically in a random order.
///
/// Levels are visited in canonical order and group numbers run from 1
/// across all levels. Only the last group of a level may be smaller than
/// `group_size`.
pub fn plan_groups<R: Rng + ?Sized>(
    students: &[Student],
    levels: &[Level],
    group_size: u32,
    subjects: &[SubjectId],
    rng: &mut R,
) -> Result<Vec<PlannedGroup>, GroupsError> {
    if subjects.is_empty() {
        return Err(GroupsError::NoSubjects);
    }
    if levels.is_empty() {
        return Err(GroupsError::NoLevels);
    }
    if group_size == 0 {
        return Err(GroupsError::InvalidGroupSize);
    }
    let mut by_level: BTreeMap<Level, Vec<StudentId>> = BTreeMap::new();
    for student in students.iter().filter(|s| levels.contains(&s.level)) {
        by_level.entry(student.level).or_default().push(student.id);
    }
    if by_level.is_empty() {
        return Err(GroupsError::NoEligibleStudents);
    }
    let mut subjects = subjects.to_vec();
    subjects.shuffle(rng);
    let mut groups: Vec<PlannedGroup> = Vec::new();
    for (level, mut ids) in by_level {
        ids.shuffle(rng);
        debug!(%level, students = ids.len(), "splitting level");
        for chunk in ids.chunks(group_size as usize) {
            let index = groups.len();
            let group = PlannedGroup {
                number: index as u32 + 1,
                level,
                subject: subjects[index % subjects.len()],
                students: chunk.to_vec(),
            };
            trace!(
                number = group.number,
                %level,
                subject = %group.subject,
                students = group.students.len(),
                "planned group",
            );
            groups.push(group);
        }
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn students(levels: &[(Level, usize)]) -> Vec<Student> {
        let mut id = 0;
        let mut students = Vec::new();
        for &(level, n) in levels {
            for _ in 0..n {
                id += 1;
                students.push(Student::dummy(id, level));
            }
        }
        students
    }

    fn subjects(n: i64) -> Vec<SubjectId> {
        (1..=n).map(SubjectId).collect()
    }

    fn level_of(students: &[Student], id: StudentId) -> Level {
        students.iter().find(|s| s.id == id).unwrap().level
    }

    #[test]
    fn test_groups_are_stratified_by_level() {
        let pool = students(&[(Level::M1, 5), (Level::L3, 7), (Level::L1, 4)]);
        let mut rng = StdRng::seed_from_u64(7);
        let groups = plan_groups(&pool, &[Level::L3, Level::M1], 3, &subjects(2), &mut rng).unwrap();
        // L3: 3+3+1, then M1: 3+2
        let shape = groups
            .iter()
            .map(|g| (g.number, g.level, g.students.len()))
            .collect::<Vec<_>>();
        assert_eq!(
            shape,
            vec![
                (1, Level::L3, 3),
                (2, Level::L3, 3),
                (3, Level::L3, 1),
                (4, Level::M1, 3),
                (5, Level::M1, 2),
            ]
        );
        for group in &groups {
            assert!(group.students.iter().all(|&s| level_of(&pool, s) == group.level));
        }
    }

    #[test]
    fn test_every_eligible_student_is_placed_once() {
        let pool = students(&[(Level::L2, 11), (Level::M2, 6), (Level::L1, 3)]);
        let mut rng = StdRng::seed_from_u64(42);
        let groups = plan_groups(&pool, &[Level::L2, Level::M2], 4, &subjects(3), &mut rng).unwrap();
        let placed = groups
            .iter()
            .flat_map(|g| g.students.iter().copied())
            .collect::<Vec<_>>();
        let unique = placed.iter().copied().collect::<HashSet<_>>();
        assert_eq!(placed.len(), 17);
        assert_eq!(unique.len(), 17);
        assert!(placed.iter().all(|&s| level_of(&pool, s) != Level::L1));
    }

    #[test]
    fn test_subjects_are_used_cyclically() {
        let pool = students(&[(Level::L1, 14)]);
        let mut rng = StdRng::seed_from_u64(3);
        let groups = plan_groups(&pool, &[Level::L1], 2, &subjects(3), &mut rng).unwrap();
        assert_eq!(groups.len(), 7);
        // the sequence repeats with period 3 and uses every subject
        for (i, group) in groups.iter().enumerate().skip(3) {
            assert_eq!(group.subject, groups[i - 3].subject);
        }
        let first_three = groups[..3].iter().map(|g| g.subject).collect::<HashSet<_>>();
        assert_eq!(first_three, subjects(3).into_iter().collect::<HashSet<_>>());
    }

    #[test]
    fn test_more_subjects_than_groups() {
        let pool = students(&[(Level::M1, 3)]);
        let mut rng = StdRng::seed_from_u64(11);
        let groups = plan_groups(&pool, &[Level::M1], 5, &subjects(4), &mut rng).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].students.len(), 3);
    }

    #[test]
    fn test_same_seed_same_repartition() {
        let pool = students(&[(Level::L3, 9), (Level::M1, 4)]);
        let run = |seed| {
            plan_groups(
                &pool,
                &[Level::L3, Level::M1],
                2,
                &subjects(3),
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap()
        };
        assert_eq!(run(5), run(5));
    }

    #[test]
    fn test_refusals() {
        let pool = students(&[(Level::L1, 3)]);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            plan_groups(&pool, &[Level::L1], 2, &[], &mut rng),
            Err(GroupsError::NoSubjects)
        ));
        assert!(matches!(
            plan_groups(&pool, &[], 2, &subjects(1), &mut rng),
            Err(GroupsError::NoLevels)
        ));
        assert!(matches!(
            plan_groups(&pool, &[Level::M2], 2, &subjects(1), &mut rng),
            Err(GroupsError::NoEligibleStudents)
        ));
        assert!(matches!(
            plan_groups(&pool, &[Level::L1], 0, &subjects(1), &mut rng),
            Err(GroupsError::InvalidGroupSize)
        ));
    }
}

use rand::Rng;
use rand::seq::SliceRandom;

use crate::model::{GroupId, SubjectId};

/// Shuffle the subjects and deal them to the groups in turn, starting
/// over when every subject has been used. Without subjects, every group
/// loses its subject.
pub fn cycle_subjects<R: Rng + ?Sized>(
    groups: &[GroupId],
    subjects: &[SubjectId],
    rng: &mut R,
) -> Vec<(GroupId, Option<SubjectId>)> {
    let mut subjects = subjects.to_vec();
    subjects.shuffle(rng);
    groups
        .iter()
        .enumerate()
        .map(|(i, &group)| {
            let subject = (!subjects.is_empty()).then(|| subjects[i % subjects.len()]);
            (group, subject)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_cycle_subjects() {
        let groups = (1..=5).map(GroupId).collect::<Vec<_>>();
        let subjects = [SubjectId(10), SubjectId(20)];
        let mut rng = StdRng::seed_from_u64(1);
        let assigned = cycle_subjects(&groups, &subjects, &mut rng);
        assert_eq!(
            assigned.iter().map(|&(g, _)| g).collect::<Vec<_>>(),
            groups
        );
        let dealt = assigned
            .iter()
            .map(|&(_, s)| s.unwrap())
            .collect::<Vec<_>>();
        assert_ne!(dealt[0], dealt[1]);
        assert_eq!(dealt[0], dealt[2]);
        assert_eq!(dealt[0], dealt[4]);
        assert_eq!(dealt[1], dealt[3]);
    }

    #[test]
    fn test_no_subject_left() {
        let mut rng = StdRng::seed_from_u64(1);
        let assigned = cycle_subjects(&[GroupId(1), GroupId(2)], &[], &mut rng);
        assert_eq!(assigned, vec![(GroupId(1), None), (GroupId(2), None)]);
    }
}

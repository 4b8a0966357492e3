pub use self::repartition::plan_groups;
pub use self::subjects::cycle_subjects;

mod repartition;
mod subjects;

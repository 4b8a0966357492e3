use crate::model::{
    Professor, ProfessorTask, Project, ProjectSummary, Student, Task, TaskStats, User,
    encode_levels,
};
use crate::stats::{level_statistics, subject_usage};
use crate::store::StudentProject;

fn optional<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_owned(), |v| v.to_string())
}

pub fn display_project(p: &Project) {
    println!("Project {}: {} (professor {})", p.id, p.title, p.prof_id);
    if let Some(description) = &p.description {
        println!("  {description}");
    }
    println!(
        "  Levels: {}, {} students per group, from {} to {}",
        encode_levels(&p.levels),
        p.group_size,
        p.start_date,
        p.end_date
    );
    println!("  Created at {}", p.created_at);
    if p.subjects.is_empty() {
        println!("  No subject yet");
    } else {
        println!("  Subjects:");
        for s in &p.subjects {
            print!("    - [{}] {}", s.id, s.title);
            if let Some(description) = &s.description {
                print!(": {description}");
            }
            println!();
        }
    }
    println!();
    display_groups(p);
}

pub fn display_groups(p: &Project) {
    if p.groups.is_empty() {
        println!("No group yet");
        return;
    }
    for g in &p.groups {
        let subject = g
            .subject_id
            .and_then(|id| p.subject(id))
            .map_or("no subject", |s| s.title.as_str());
        println!("Group {} ({}, {}):", g.number, optional(g.level()), subject);
        for s in &g.members {
            println!("  - {} <{}>", s, s.email);
        }
    }
    println!();
}

pub fn display_stats(p: &Project) {
    let stats = level_statistics(&p.groups);
    let students: usize = stats.iter().map(|s| s.students).sum();
    println!("Groups/students: {}/{}", p.groups.len(), students);
    for s in &stats {
        println!(
            "  - {}: {} groups, {} students (sizes {} to {})",
            s.level.map_or("empty", |l| l.as_str()),
            s.groups,
            s.students,
            s.smallest,
            s.largest
        );
    }
    let (usage, orphans) = subject_usage(p);
    if !usage.is_empty() {
        println!("Subjects:");
        for (subject, n) in usage {
            println!("  - {}: {} groups", subject.title, n);
        }
    }
    if orphans > 0 {
        println!("Groups without subject: {orphans}");
    }
}

pub fn display_project_summaries(projects: &[ProjectSummary]) {
    for p in projects {
        println!(
            "[{}] {} ({}, {} per group, {} to {}) by {} <{}>: {} subjects, {} groups",
            p.id,
            p.title,
            encode_levels(&p.levels),
            p.group_size,
            p.start_date,
            p.end_date,
            p.prof_name,
            p.prof_email,
            p.subjects,
            p.groups
        );
    }
}

pub fn display_users(users: &[User]) {
    for u in users {
        println!("[{}] {} <{}>, {}", u.id, u.name, u.email, u.role);
    }
}

pub fn display_professors(professors: &[Professor]) {
    for p in professors {
        println!(
            "[{}] {} ({}) <{}>, {} {}",
            p.id, p.name, p.matricule, p.email, p.grade, p.speciality
        );
    }
}

pub fn display_students(students: &[Student]) {
    for s in students {
        println!("[{}] {} <{}>, {} {}", s.id, s, s.email, s.level, s.field);
    }
}

pub fn display_student_projects(projects: &[StudentProject]) {
    if projects.is_empty() {
        println!("Not in any group yet");
    }
    for p in projects {
        println!("Project {}: {} ({} to {})", p.project_id, p.title, p.start_date, p.end_date);
        if let Some(description) = &p.description {
            println!("  {description}");
        }
        println!("  Supervised by {} <{}>", p.prof_name, p.prof_email);
        match &p.subject {
            Some(s) => println!("  Group {} on {}", p.group_number, s.title),
            None => println!("  Group {}, no subject", p.group_number),
        }
        for s in &p.teammates {
            println!("    - {} <{}>", s, s.email);
        }
    }
}

pub fn display_task(t: &Task) {
    println!(
        "[{}] {} ({}, {} priority) in {}, from {} to {}, created at {}",
        t.id,
        t.name,
        t.status,
        t.priority,
        t.project_title,
        optional(t.start_date),
        optional(t.end_date),
        t.created_at
    );
}

pub fn display_tasks(tasks: &[Task]) {
    for t in tasks {
        display_task(t);
    }
}

pub fn display_task_stats(stats: &TaskStats) {
    println!(
        "Tasks todo/in progress/overdue/done/total: {}/{}/{}/{}/{}",
        stats.todo, stats.in_progress, stats.overdue, stats.done, stats.total
    );
}

pub fn display_professor_tasks(tasks: &[ProfessorTask]) {
    for t in tasks {
        println!(
            "[{}] {} ({}, {} priority) in {}",
            t.task.id, t.task.name, t.task.status, t.task.priority, t.task.project_title
        );
        println!(
            "  by student {}, {} ({}) <{}>, {} {}, group {}",
            t.task.student_id,
            t.student_name,
            t.matricule,
            t.student_email,
            t.level,
            t.field,
            optional(t.group_number)
        );
    }
}

use std::fs::File;
use std::io;
use std::path::Path;

use eyre::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::model::{Project, StudentInput};

const EXPORT_HEADER: [&str; 6] = ["numero_groupe", "niveau", "sujet", "matricule", "name", "email"];

/// One exported line: a group member with their group and subject.
#[derive(Serialize)]
struct GroupRow<'a> {
    numero_groupe: u32,
    niveau: &'a str,
    sujet: &'a str,
    matricule: &'a str,
    name: &'a str,
    email: &'a str,
}

/// Read a roster with a `matricule,name,email,filiere,niveau` header.
pub fn read_roster<R: io::Read>(reader: R) -> Result<Vec<StudentInput>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut roster = Vec::new();
    for (line, record) in reader.deserialize::<StudentInput>().enumerate() {
        // line 1 is the header
        roster.push(record.with_context(|| format!("invalid roster line {}", line + 2))?);
    }
    debug!(students = roster.len(), "roster read");
    Ok(roster)
}

pub fn read_roster_file(path: &Path) -> Result<Vec<StudentInput>> {
    let file =
        File::open(path).with_context(|| format!("cannot open roster {}", path.display()))?;
    read_roster(file).with_context(|| format!("cannot read roster {}", path.display()))
}

/// Write one line per group member, groups in number order.
pub fn write_groups<W: io::Write>(project: &Project, writer: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(EXPORT_HEADER)?;
    for group in &project.groups {
        let level = group.level().map_or("", |l| l.as_str());
        let subject = group
            .subject_id
            .and_then(|id| project.subject(id))
            .map_or("", |s| s.title.as_str());
        if group.members.is_empty() {
            // keep track of the group even without members
            let number = group.number.to_string();
            writer.write_record([number.as_str(), level, subject, "", "", ""])?;
        }
        for student in &group.members {
            writer.serialize(GroupRow {
                numero_groupe: group.number,
                niveau: level,
                sujet: subject,
                matricule: &student.matricule,
                name: &student.name,
                email: &student.email,
            })?;
        }
    }
    writer.flush().context("cannot write groups")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::model::{Group, GroupId, Level, ProfId, ProjectId, Student, Subject, SubjectId};

    #[test]
    fn test_read_roster() {
        let roster = read_roster(
            "matricule,name,email,filiere,niveau\n\
             ETU0001, Alice Martin ,alice@example.org,Informatique,L3\n\
             ETU0002,Bob Durand,bob@example.org,Mathématiques,M1\n"
                .as_bytes(),
        )
        .unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].name, "Alice Martin");
        assert_eq!(roster[0].level, Level::L3);
        assert_eq!(roster[1].field, "Mathématiques");
    }

    #[test]
    fn test_read_roster_bad_level() {
        let err = read_roster(
            "matricule,name,email,filiere,niveau\n\
             ETU0001,Alice Martin,alice@example.org,Informatique,L4\n"
                .as_bytes(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_write_groups() {
        let student = |id: i64, name: &str| Student {
            name: name.into(),
            matricule: format!("ETU{id:04}"),
            email: format!("s{id}@example.org"),
            ..Student::dummy(id, Level::M1)
        };
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let project = Project {
            id: ProjectId(1),
            prof_id: ProfId(1),
            title: "Compilateur".into(),
            description: None,
            group_size: 2,
            levels: vec![Level::M1],
            start_date: date,
            end_date: date,
            created_at: NaiveDateTime::default(),
            subjects: vec![Subject {
                id: SubjectId(5),
                project_id: ProjectId(1),
                title: "Lexer".into(),
                description: None,
            }],
            groups: vec![
                Group {
                    id: GroupId(1),
                    number: 1,
                    subject_id: Some(SubjectId(5)),
                    members: vec![student(1, "Alice"), student(2, "Bob")],
                },
                Group {
                    id: GroupId(2),
                    number: 2,
                    subject_id: None,
                    members: vec![student(3, "Chloé")],
                },
            ],
        };
        let mut out = Vec::new();
        write_groups(&project, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "numero_groupe,niveau,sujet,matricule,name,email\n\
             1,M1,Lexer,ETU0001,Alice,s1@example.org\n\
             1,M1,Lexer,ETU0002,Bob,s2@example.org\n\
             2,M1,,ETU0003,Chloé,s3@example.org\n"
        );
    }
}

use std::fs::File;
use std::io;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use eyre::{Context, Result, bail};
use tracing::{Level as LogLevel, info};

use crate::config::Config;
use crate::display::*;
use crate::model::{
    AdminInput, Level, Priority, ProfId, ProfessorInput, ProjectId, ProjectInput, StudentId, StudentInput,
    SubjectId, SubjectInput, TaskId, TaskInput, TaskPatch, TaskStatus, UserId,
};
use crate::store::Store;

mod algos;
mod checks;
mod config;
mod csvio;
mod display;
mod errors;
mod model;
mod stats;
mod store;

#[derive(Parser, Debug)]
#[command(name = "rgroups", version, about = "Split students into project groups")]
struct Cli {
    /// Use FILE instead of rgroups.toml
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Database URL, overrides the configuration file
    #[arg(long, value_name = "URL", global = true)]
    database: Option<String>,
    /// Set verbosity level
    #[arg(short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database tables
    Init,
    /// Manage administrator accounts
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Manage professors
    #[command(subcommand)]
    Prof(ProfCommand),
    /// Manage students
    #[command(subcommand)]
    Student(StudentCommand),
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage the subjects of a project
    #[command(subcommand)]
    Subject(SubjectCommand),
    /// Split the eligible students of a project into new groups
    Repartition {
        #[command(flatten)]
        target: ProjectTarget,
        /// Do not write back results to database
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Deal the subjects again over the existing groups
    ReassignSubjects {
        #[command(flatten)]
        target: ProjectTarget,
        /// Do not write back results to database
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Show the projects and teammates of a student
    StudentProjects {
        #[arg(long)]
        student: i64,
    },
    /// Manage the tasks of a student
    #[command(subcommand)]
    Task(TaskCommand),
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// List every account
    List,
    Delete {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum ProfCommand {
    Add(ProfArgs),
    List,
    /// Update a professor account, their projects are kept
    Update {
        id: i64,
        #[command(flatten)]
        prof: ProfArgs,
    },
    /// Delete a professor and their projects
    Delete { id: i64 },
}

#[derive(Args, Debug)]
struct ProfArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    matricule: String,
    #[arg(long)]
    speciality: String,
    #[arg(long)]
    grade: String,
}

impl From<ProfArgs> for ProfessorInput {
    fn from(a: ProfArgs) -> Self {
        ProfessorInput {
            name: a.name,
            email: a.email,
            matricule: a.matricule,
            speciality: a.speciality,
            grade: a.grade,
        }
    }
}

#[derive(Subcommand, Debug)]
enum StudentCommand {
    Add(StudentArgs),
    List,
    Show {
        id: i64,
    },
    /// Update a student profile, existing groups are kept
    Update {
        id: i64,
        #[command(flatten)]
        student: StudentArgs,
    },
    /// Delete a student with their memberships and tasks
    Delete {
        id: i64,
    },
    /// Import a CSV roster (matricule,name,email,filiere,niveau)
    Import {
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct StudentArgs {
    #[arg(long)]
    matricule: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    /// Field of study
    #[arg(long)]
    field: String,
    #[arg(long)]
    level: Level,
}

impl From<StudentArgs> for StudentInput {
    fn from(a: StudentArgs) -> Self {
        StudentInput {
            matricule: a.matricule,
            name: a.name,
            email: a.email,
            field: a.field,
            level: a.level,
        }
    }
}

#[derive(Args, Debug)]
struct ProjectTarget {
    /// Acting professor
    #[arg(long)]
    prof: i64,
    project: i64,
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// List the projects of a professor, or every project
    List {
        #[arg(long, required_unless_present = "admin", conflicts_with = "admin")]
        prof: Option<i64>,
        /// Every project, seen by the administrator account ID
        #[arg(long, value_name = "ID")]
        admin: Option<i64>,
    },
    Show {
        #[command(flatten)]
        target: ProjectTarget,
        /// Also display group statistics
        #[arg(long)]
        stats: bool,
    },
    Create {
        #[arg(long)]
        prof: i64,
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Update a project, groups are rebuilt if the group size or the levels change
    Update {
        #[command(flatten)]
        target: ProjectTarget,
        #[command(flatten)]
        project: ProjectArgs,
        /// Do not write back results to database
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Delete a project with its subjects, groups and tasks
    Delete {
        #[command(flatten)]
        target: ProjectTarget,
    },
    /// Export the groups as CSV
    Export {
        #[command(flatten)]
        target: ProjectTarget,
        /// Write to FILE instead of the standard output
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ProjectArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    group_size: u32,
    /// Comma separated levels, for example L3,M1
    #[arg(long, value_delimiter = ',', required = true)]
    levels: Vec<Level>,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,
    /// End date (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,
}

impl From<ProjectArgs> for ProjectInput {
    fn from(a: ProjectArgs) -> Self {
        ProjectInput {
            title: a.title,
            description: a.description,
            group_size: a.group_size,
            levels: a.levels,
            start_date: a.start,
            end_date: a.end,
        }
    }
}

#[derive(Subcommand, Debug)]
enum SubjectCommand {
    Add {
        #[command(flatten)]
        target: ProjectTarget,
        #[command(flatten)]
        subject: SubjectArgs,
    },
    Update {
        #[arg(long)]
        prof: i64,
        id: i64,
        #[command(flatten)]
        subject: SubjectArgs,
    },
    /// Delete a subject, its groups get one of the remaining subjects
    Delete {
        #[arg(long)]
        prof: i64,
        id: i64,
    },
}

#[derive(Args, Debug)]
struct SubjectArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: Option<String>,
}

impl From<SubjectArgs> for SubjectInput {
    fn from(a: SubjectArgs) -> Self {
        SubjectInput {
            title: a.title,
            description: a.description,
        }
    }
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    Add {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        project: i64,
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value_t = Priority::Mid)]
        priority: Priority,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    List {
        #[arg(long)]
        student: i64,
    },
    Show {
        #[arg(long)]
        student: i64,
        id: i64,
    },
    Update {
        #[arg(long)]
        student: i64,
        id: i64,
        /// Move the task to another project
        #[arg(long)]
        project: Option<i64>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long, value_enum)]
        status: Option<TaskStatus>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    Status {
        #[arg(long)]
        student: i64,
        id: i64,
        #[arg(value_enum)]
        status: TaskStatus,
    },
    Delete {
        #[arg(long)]
        student: i64,
        id: i64,
    },
    Stats {
        #[arg(long)]
        student: i64,
    },
    /// Tasks of the students working on a professor's projects
    Supervised {
        #[arg(long)]
        prof: i64,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LogLevel::ERROR,
        1 => LogLevel::WARN,
        2 => LogLevel::INFO,
        3 => LogLevel::DEBUG,
        _ => LogLevel::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.database {
        config.database.url = url;
    }
    let mut store = Store::connect(&config.database.url, config.rng()).await?;
    match cli.command {
        Command::Init => store.initialize().await?,
        Command::Admin(command) => admin(&mut store, command).await?,
        Command::Prof(command) => prof(&mut store, command).await?,
        Command::Student(command) => student(&mut store, command).await?,
        Command::Project(command) => project(&mut store, command).await?,
        Command::Subject(command) => subject(&mut store, command).await?,
        Command::Repartition { target, dry_run } => {
            let (project, created) = store
                .repartition(ProfId(target.prof), ProjectId(target.project), dry_run)
                .await?;
            println!("{created} groups created");
            display_groups(&project);
            display_stats(&project);
            report_dry_run(dry_run);
        }
        Command::ReassignSubjects { target, dry_run } => {
            let project = store
                .reassign_subjects(ProfId(target.prof), ProjectId(target.project), dry_run)
                .await?;
            display_groups(&project);
            report_dry_run(dry_run);
        }
        Command::StudentProjects { student } => {
            display_student_projects(&store.student_projects(StudentId(student)).await?);
        }
        Command::Task(command) => task(&mut store, command).await?,
    }
    Ok(())
}

fn report_dry_run(dry_run: bool) {
    if dry_run {
        println!("Dry run, nothing has been saved");
    }
}

async fn admin(store: &mut Store, command: AdminCommand) -> Result<()> {
    match command {
        AdminCommand::Add { name, email } => {
            display_users(&[store.add_admin(&AdminInput { name, email }).await?]);
        }
        AdminCommand::List => display_users(&store.list_users().await?),
        AdminCommand::Delete { id } => store.delete_admin(UserId(id)).await?,
    }
    Ok(())
}

async fn prof(store: &mut Store, command: ProfCommand) -> Result<()> {
    match command {
        ProfCommand::Add(args) => {
            display_professors(&[store.add_professor(&args.into()).await?]);
        }
        ProfCommand::List => display_professors(&store.list_professors().await?),
        ProfCommand::Update { id, prof } => {
            display_professors(&[store.update_professor(ProfId(id), &prof.into()).await?]);
        }
        ProfCommand::Delete { id } => store.delete_professor(ProfId(id)).await?,
    }
    Ok(())
}

async fn student(store: &mut Store, command: StudentCommand) -> Result<()> {
    match command {
        StudentCommand::Add(args) => display_students(&[store.add_student(&args.into()).await?]),
        StudentCommand::List => display_students(&store.list_students().await?),
        StudentCommand::Show { id } => display_students(&[store.student(StudentId(id)).await?]),
        StudentCommand::Update { id, student } => {
            display_students(&[store.update_student(StudentId(id), &student.into()).await?]);
        }
        StudentCommand::Delete { id } => store.delete_student(StudentId(id)).await?,
        StudentCommand::Import { file } => {
            let roster = csvio::read_roster_file(&file)?;
            let n = store.import_students(&roster).await?;
            println!("{n} students imported");
        }
    }
    Ok(())
}

async fn project(store: &mut Store, command: ProjectCommand) -> Result<()> {
    match command {
        ProjectCommand::List { prof, admin } => match (prof, admin) {
            (Some(prof), _) => {
                for p in store.list_projects(ProfId(prof)).await? {
                    display_project(&p);
                }
            }
            (None, Some(admin)) => {
                display_project_summaries(&store.list_all_projects(UserId(admin)).await?);
            }
            (None, None) => bail!("either --prof or --admin is required"),
        },
        ProjectCommand::Show { target, stats } => {
            let p = store
                .show_project(ProfId(target.prof), ProjectId(target.project))
                .await?;
            display_project(&p);
            if stats {
                display_stats(&p);
            }
        }
        ProjectCommand::Create { prof, project } => {
            display_project(&store.create_project(ProfId(prof), project.into()).await?);
        }
        ProjectCommand::Update {
            target,
            project,
            dry_run,
        } => {
            let update = store
                .update_project(
                    ProfId(target.prof),
                    ProjectId(target.project),
                    project.into(),
                    dry_run,
                )
                .await?;
            if update.groups_recreated {
                println!("Group size or levels changed, groups have been rebuilt");
            }
            display_project(&update.project);
            report_dry_run(dry_run);
        }
        ProjectCommand::Delete { target } => {
            store
                .delete_project(ProfId(target.prof), ProjectId(target.project))
                .await?;
        }
        ProjectCommand::Export { target, output } => {
            let p = store
                .show_project(ProfId(target.prof), ProjectId(target.project))
                .await?;
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("cannot create {}", path.display()))?;
                    csvio::write_groups(&p, file)?;
                    info!(project = %p.id, file = %path.display(), "groups exported");
                }
                None => csvio::write_groups(&p, io::stdout().lock())?,
            }
        }
    }
    Ok(())
}

async fn subject(store: &mut Store, command: SubjectCommand) -> Result<()> {
    match command {
        SubjectCommand::Add { target, subject } => {
            let s = store
                .add_subject(
                    ProfId(target.prof),
                    ProjectId(target.project),
                    &subject.into(),
                )
                .await?;
            println!("Subject {} added: {}", s.id, s.title);
        }
        SubjectCommand::Update { prof, id, subject } => {
            let s = store
                .update_subject(ProfId(prof), SubjectId(id), &subject.into())
                .await?;
            println!("Subject {} updated: {}", s.id, s.title);
        }
        SubjectCommand::Delete { prof, id } => {
            let n = store.delete_subject(ProfId(prof), SubjectId(id)).await?;
            println!("Subject deleted, {n} groups got another subject");
        }
    }
    Ok(())
}

async fn task(store: &mut Store, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::Add {
            student,
            project,
            name,
            priority,
            start,
            end,
        } => {
            let input = TaskInput {
                project_id: ProjectId(project),
                name,
                priority,
                start_date: start,
                end_date: end,
            };
            display_task(&store.create_task(StudentId(student), &input).await?);
        }
        TaskCommand::List { student } => display_tasks(&store.list_tasks(StudentId(student)).await?),
        TaskCommand::Show { student, id } => {
            display_task(&store.show_task(StudentId(student), TaskId(id)).await?);
        }
        TaskCommand::Update {
            student,
            id,
            project,
            name,
            priority,
            status,
            start,
            end,
        } => {
            let patch = TaskPatch {
                project_id: project.map(ProjectId),
                name,
                priority,
                status,
                start_date: start,
                end_date: end,
            };
            display_task(&store.update_task(StudentId(student), TaskId(id), patch).await?);
        }
        TaskCommand::Status {
            student,
            id,
            status,
        } => {
            display_task(
                &store
                    .set_task_status(StudentId(student), TaskId(id), status)
                    .await?,
            );
        }
        TaskCommand::Delete { student, id } => {
            store.delete_task(StudentId(student), TaskId(id)).await?;
        }
        TaskCommand::Stats { student } => {
            display_task_stats(&store.task_stats(StudentId(student)).await?);
        }
        TaskCommand::Supervised { prof } => {
            display_professor_tasks(&store.professor_tasks(ProfId(prof)).await?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_project_create() {
        let cli = Cli::try_parse_from([
            "rgroups", "-vv", "project", "create", "--prof", "3", "--title", "Compilateur",
            "--group-size", "3", "--levels", "L3,M1", "--start", "2025-01-06", "--end",
            "2025-03-28",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Project(ProjectCommand::Create { prof, project }) = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!(prof, 3);
        let input = ProjectInput::from(project);
        assert_eq!(input.levels, vec![Level::L3, Level::M1]);
        assert_eq!(input.group_size, 3);
    }

    #[test]
    fn test_parse_dry_run() {
        let cli = Cli::try_parse_from(["rgroups", "repartition", "--prof", "1", "7", "-n"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Repartition {
                target: ProjectTarget { prof: 1, project: 7 },
                dry_run: true
            }
        ));
        assert!(Cli::try_parse_from(["rgroups", "project", "list"]).is_err());
        assert!(Cli::try_parse_from(["rgroups", "project", "list", "--admin", "1"]).is_ok());
        assert!(
            Cli::try_parse_from(["rgroups", "project", "list", "--admin", "1", "--prof", "2"])
                .is_err()
        );
    }

    #[test]
    fn test_parse_prof_update() {
        let cli = Cli::try_parse_from([
            "rgroups", "prof", "update", "4", "--name", "Fatou Ndiaye", "--email",
            "fatou@example.org", "--matricule", "PROF0004", "--speciality", "Réseaux", "--grade",
            "PR",
        ])
        .unwrap();
        let Command::Prof(ProfCommand::Update { id, prof }) = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!(id, 4);
        let input = ProfessorInput::from(prof);
        assert_eq!((input.name.as_str(), input.grade.as_str()), ("Fatou Ndiaye", "PR"));
        let cli = Cli::try_parse_from(["rgroups", "admin", "delete", "2"]).unwrap();
        assert!(matches!(cli.command, Command::Admin(AdminCommand::Delete { id: 2 })));
    }
}

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use tallybook::api::payloads::{EventEdit, InitialLog, LogEdit, NewEvent, NewLog};
use tallybook::api::types::{Day, Event, Stat, Task, TaskStatus};
use tallybook::cache::{SearchText, TaskFilter};
use tallybook::config::Config;
use tallybook::logging::{self, LogTarget};
use tallybook::views::{self, TaskSort};
use tallybook::Tallybook;

#[derive(Parser, Debug)]
#[command(name = "tallybook")]
#[command(about = "Track projects, tasks and the hours booked against them")]
#[command(version)]
struct Cli {
  /// Path to config file (default: $XDG_CONFIG_HOME/tallybook/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Log to stderr instead of the data directory
  #[arg(long, global = true)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List days with their events
  Days {
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
  },
  /// Show a single day
  Day { date: NaiveDate },
  /// Hours booked per date
  Stats {
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
  },
  /// List events, optionally for one day or task
  Events {
    #[arg(long)]
    day: Option<NaiveDate>,
    #[arg(long)]
    task: Option<String>,
  },
  /// List tasks
  Tasks(TaskArgs),
  /// List projects
  Projects,
  /// Create, edit or delete events
  #[command(subcommand)]
  Event(EventCommand),
  /// Create, edit or delete logs
  #[command(subcommand)]
  Log(LogCommand),
}

#[derive(Args, Debug)]
struct TaskArgs {
  #[arg(long)]
  project: Option<String>,
  /// upcoming, in-progress or done
  #[arg(long, value_parser = parse_status)]
  status: Option<TaskStatus>,
  #[arg(long)]
  lead: Option<String>,
  /// Server-side search text
  #[arg(long)]
  search: Option<String>,
  /// Narrow the listing locally by title, description or lead
  #[arg(long)]
  grep: Option<String>,
  /// title, newest, updated, due-date or pl
  #[arg(long, value_parser = parse_sort, default_value = "")]
  sort: TaskSort,
  #[arg(long)]
  limit: Option<u32>,
  #[arg(long)]
  offset: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum EventCommand {
  Add {
    #[arg(long)]
    day: NaiveDate,
    #[arg(long)]
    title: String,
    #[arg(long)]
    task: Option<String>,
    /// Hours for an initial log titled like the event
    #[arg(long)]
    hours: Option<f64>,
  },
  Edit {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    task: Option<String>,
  },
  Rm { id: String },
}

#[derive(Subcommand, Debug)]
enum LogCommand {
  Add {
    #[arg(long)]
    event: String,
    #[arg(long)]
    title: String,
    #[arg(long)]
    hours: f64,
  },
  Edit {
    id: String,
    #[arg(long)]
    event: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    hours: Option<f64>,
  },
  Rm {
    id: String,
    #[arg(long)]
    event: String,
  },
}

fn parse_status(s: &str) -> std::result::Result<TaskStatus, String> {
  TaskStatus::parse(s).ok_or_else(|| format!("unknown status: {}", s))
}

fn parse_sort(s: &str) -> std::result::Result<TaskSort, String> {
  TaskSort::parse(s).ok_or_else(|| format!("unknown sort: {}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let cli = Cli::parse();

  let target = if cli.log_stderr {
    LogTarget::Stderr
  } else {
    LogTarget::default_dir()
  };
  let _guard = logging::init(&target)?;

  let config = Config::load(cli.config.as_deref())?;
  let client = Tallybook::connect(&config, Config::session())?;

  run(&client, cli.command).await
}

async fn run(client: &Tallybook, command: Command) -> Result<()> {
  match command {
    Command::Days { start, end } => {
      let days = client.days(start, end).await?;
      for day in &days {
        print_day(day);
      }
      println!("total {:.2}h", views::total_hours(&days));
    }
    Command::Day { date } => match client.day(date).await? {
      Some(day) => print_day(&day),
      None => println!("{}: nothing booked", date),
    },
    Command::Stats { start, end } => {
      for stat in client.stats(start, end).await? {
        print_stat(&stat);
      }
    }
    Command::Events { day, task } => {
      for event in client.events(day, task.as_deref()).await? {
        let day = event
          .day
          .map(|d| d.to_string())
          .unwrap_or_else(|| "-".to_string());
        println!("{:<10} {}", day, event_line(&event));
      }
    }
    Command::Tasks(args) => {
      let filter = TaskFilter {
        project_id: args.project,
        status: args.status,
        limit: args.limit,
        offset: args.offset,
        lead: args.lead,
        search: args.search.as_deref().map(SearchText::new),
      };
      let tasks = client.tasks(filter).await?;
      let grep = args.grep.unwrap_or_default();
      for task in views::sort_and_filter_tasks(&tasks, &grep, args.sort) {
        println!("{}", task_line(task));
      }
    }
    Command::Projects => {
      for project in client.projects().await? {
        println!(
          "{:<38} {:<30} {:<12} {:>3.0}% done",
          project.id,
          project.title,
          project.pl,
          views::project_progress(&project) * 100.0
        );
      }
    }
    Command::Event(command) => run_event(client, command).await?,
    Command::Log(command) => run_log(client, command).await?,
  }
  Ok(())
}

async fn run_event(client: &Tallybook, command: EventCommand) -> Result<()> {
  let mutations = client.mutations();
  match command {
    EventCommand::Add {
      day,
      title,
      task,
      hours,
    } => {
      let log = hours.map(|duration| InitialLog {
        title: title.clone(),
        duration,
      });
      let event = mutations
        .create_event(NewEvent {
          title,
          day,
          task_id: task,
          log,
        })
        .await?;
      println!("created {}", event_line(&event));
    }
    EventCommand::Edit { id, title, task } => {
      if title.is_none() && task.is_none() {
        return Err(eyre!("Nothing to change: pass --title or --task"));
      }
      let patch = mutations
        .edit_event(EventEdit {
          id,
          title,
          task_id: task,
        })
        .await?;
      println!("updated event {}", patch.id);
    }
    EventCommand::Rm { id } => {
      mutations.delete_event(&id).await?;
      println!("deleted event {}", id);
    }
  }
  Ok(())
}

async fn run_log(client: &Tallybook, command: LogCommand) -> Result<()> {
  let mutations = client.mutations();
  match command {
    LogCommand::Add {
      event,
      title,
      hours,
    } => {
      let log = mutations
        .create_log(NewLog {
          event_id: event,
          title,
          duration: hours,
        })
        .await?;
      println!("created log {} ({:.2}h)", log.id, log.duration);
    }
    LogCommand::Edit {
      id,
      event,
      title,
      hours,
    } => {
      if title.is_none() && hours.is_none() {
        return Err(eyre!("Nothing to change: pass --title or --hours"));
      }
      let patch = mutations
        .edit_log(LogEdit {
          id,
          event_id: event,
          title,
          duration: hours,
        })
        .await?;
      println!("updated log {}", patch.id);
    }
    LogCommand::Rm { id, event } => {
      mutations.delete_log(&id, &event).await?;
      println!("deleted log {}", id);
    }
  }
  Ok(())
}

fn print_day(day: &Day) {
  println!("{} ({:.2}h)", day.working_date, day.worked_hours());
  for event in &day.events {
    println!("  {}", event_line(event));
    for log in &event.logs {
      println!("    {:<38} {:>5.2}h  {}", log.id, log.duration, log.title);
    }
  }
}

fn print_stat(stat: &Stat) {
  println!("{} {:>6.2}h  {} events", stat.day, stat.worked_hours(), stat.events.len());
}

fn event_line(event: &Event) -> String {
  let task = event
    .task_title
    .as_deref()
    .or(event.task_id.as_deref())
    .map(|t| format!(" [{}]", t))
    .unwrap_or_default();
  format!(
    "{:<38} {:>5.2}h  {}{}",
    event.id,
    event.total_duration(),
    event.title,
    task
  )
}

fn task_line(task: &Task) -> String {
  let due = task
    .due_date
    .map(|d| d.to_string())
    .unwrap_or_else(|| "-".to_string());
  format!(
    "{:<38} {:<12} {:<10} {:<12} {}",
    task.id,
    task.status.as_str(),
    due,
    task.pl.as_deref().unwrap_or("-"),
    task.title
  )
}

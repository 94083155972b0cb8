use std::env;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use classcal::calendar::time_codec::format_start;
use classcal::storage::config::Config;
use classcal::{
    CalendarEvent, Dashboard, DashboardView, EventDraft, EventFilter, Notifier, Severity,
};

const LINE_WIDTH: usize = 100;

const USAGE: &str = "\
Usage: classcal [COMMAND]

Commands:
  status                      Show login state and event counters
  login                       Print the URL that starts a login
  logout                      End the backend session
  list [FILTER]               List events (all, assignment, announcement, custom, other)
  sync                        Sync coursework into the calendar
  add --title T --date YYYY-MM-DD [--time HH:MM] [--description D]
                              Create a custom event
  delete ID                   Delete an event
  --help                      Show this message";

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Status,
    Login,
    Logout,
    List(Option<EventFilter>),
    Sync,
    Add(EventDraft),
    Delete(String),
    Help,
}

pub fn parse_cli_command() -> Result<CliCommand, String> {
    parse_args(env::args().skip(1))
}

pub fn parse_args<I>(args: I) -> Result<CliCommand, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(command) = args.next() else {
        return Ok(CliCommand::List(None));
    };

    let command = match command.as_str() {
        "status" => CliCommand::Status,
        "login" => CliCommand::Login,
        "logout" => CliCommand::Logout,
        "sync" => CliCommand::Sync,
        "--help" | "-h" | "help" => CliCommand::Help,
        "list" => match args.next() {
            Some(filter) => CliCommand::List(Some(filter.parse()?)),
            None => CliCommand::List(None),
        },
        "delete" => {
            let id = args
                .next()
                .ok_or_else(|| "delete needs an event ID".to_string())?;
            CliCommand::Delete(id)
        }
        "add" => return parse_add(args),
        other => return Err(format!("Unknown command: {}", other)),
    };

    match args.next() {
        Some(extra) => Err(format!("Unexpected argument: {}", extra)),
        None => Ok(command),
    }
}

fn parse_add(mut args: impl Iterator<Item = String>) -> Result<CliCommand, String> {
    let mut title = None;
    let mut date = None;
    let mut time = None;
    let mut description = None;

    while let Some(flag) = args.next() {
        let slot = match flag.as_str() {
            "--title" => &mut title,
            "--date" => &mut date,
            "--time" => &mut time,
            "--description" => &mut description,
            _ => return Err(format!("Unknown argument: {}", flag)),
        };
        let value = args
            .next()
            .ok_or_else(|| format!("{} needs a value", flag))?;
        *slot = Some(value);
    }

    let title = title.ok_or_else(|| "add needs --title".to_string())?;
    let date = date.ok_or_else(|| "add needs --date".to_string())?;

    let mut draft = EventDraft::new(title, date);
    if let Some(time) = time {
        draft = draft.with_time(time);
    }
    if let Some(description) = description {
        draft = draft.with_description(description);
    }
    Ok(CliCommand::Add(draft))
}

pub fn print_usage() {
    println!("{USAGE}");
}

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => println!("{}", message),
            Severity::Success => println!("[ok] {}", message),
            Severity::Error => {
                tracing::error!("{}", message);
                eprintln!("[error] {}", message);
            }
        }
    }
}

pub async fn run(command: CliCommand, config: &Config) -> Result<()> {
    if command == CliCommand::Help {
        print_usage();
        return Ok(());
    }

    let dashboard = Dashboard::from_config(&config.backend, Arc::new(ConsoleNotifier))
        .context("Failed to build backend client")?;

    if command == CliCommand::Login {
        println!("Open this URL in your browser to sign in:");
        println!("{}", dashboard.login_url());
        return Ok(());
    }

    if !dashboard.check_auth().await {
        println!("Not logged in. Run `classcal login` to get started.");
        return Ok(());
    }

    match command {
        CliCommand::Status => {
            dashboard.load().await?;
            print_summary(&dashboard.view(EventFilter::All));
        }
        CliCommand::Logout => {
            dashboard.logout().await?;
        }
        CliCommand::List(filter) => {
            let filter = match filter {
                Some(filter) => filter,
                None => default_filter(config)?,
            };
            dashboard.load().await?;
            print_view(&dashboard.view(filter));
        }
        CliCommand::Sync => {
            println!("Starting sync process...");
            dashboard.sync().await?;
            print_view(&dashboard.view(EventFilter::All));
        }
        CliCommand::Add(draft) => {
            let event = dashboard.store().add(&draft).await?;
            println!("{}", format_event_line(&event, LINE_WIDTH));
        }
        CliCommand::Delete(id) => {
            dashboard.store().delete(&id).await?;
        }
        CliCommand::Help | CliCommand::Login => {}
    }

    Ok(())
}

fn default_filter(config: &Config) -> Result<EventFilter> {
    let value = &config.display.default_filter;
    match value.parse() {
        Ok(filter) => Ok(filter),
        Err(e) => bail!("Invalid display.default_filter '{}': {}", value, e),
    }
}

fn print_summary(view: &DashboardView) {
    println!(
        "Assignments: {}  Announcements: {}  Total events: {}",
        view.stats.assignments, view.stats.announcements, view.stats.total_events
    );
    println!("Last sync: {}", view.last_synced());
    if let Some(error) = view.sync_error() {
        println!("Sync error: {}", error);
    }
}

fn print_view(view: &DashboardView) {
    print_summary(view);
    println!();

    if let Some(message) = view.empty_message() {
        println!("{}", message);
        return;
    }
    for event in &view.events {
        println!("{}", format_event_line(event, LINE_WIDTH));
    }
}

fn format_event_line(event: &CalendarEvent, width: usize) -> String {
    let mut line = format!(
        "{:<22} | {:<12} | {}",
        format_start(&event.start),
        event.kind,
        event.title
    );
    if let Some(course) = &event.course_name {
        line.push_str(&format!(" ({})", course));
    }
    line.push_str(&format!("  [{}]", event.id));
    truncate_to_width(&line, width)
}

fn truncate_to_width(line: &str, width: usize) -> String {
    if width > 0 && line.chars().count() > width {
        let mut truncated = line.chars().take(width.saturating_sub(1)).collect::<String>();
        truncated.push('…');
        truncated
    } else {
        line.to_string()
    }
}

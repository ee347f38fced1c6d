use std::path::PathBuf;
use std::sync::Arc;

use agenda_core::metadata::keys;
use agenda_core::time::{parse_hhmm, parse_local_to_utc};
use agenda_core::{
    MemoryCalendar, MetaValue, Metadata, NewTask, Scheduler, SlotQuery, SweepReport, TaskTiming,
    TaskView, parse_windows,
};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod config;
mod holidays;
mod state;
mod store;

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("AGENDA_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "agenda", version, long_version = LONG_VERSION, about = "Business-hours aware task scheduler")]
struct Cli {
    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage ~/.agenda/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Find the next free slot without booking it
    Slot(SlotArgs),

    /// Find a slot and book a task into it
    Schedule {
        #[arg(long)]
        title: String,

        /// Free text stored above the metadata block
        #[arg(long, default_value = "")]
        body: String,

        /// Book the whole day instead of a timed slot
        #[arg(long)]
        all_day: bool,

        #[command(flatten)]
        slot: SlotArgs,

        #[command(flatten)]
        priority: PriorityArgs,
    },

    /// List tasks between two dates (inclusive, default today)
    List {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Show one task with its metadata
    Show { id: String },

    /// Move overdue pending tasks to the next business day
    Sweep {
        /// Reference time, local "YYYY-MM-DD HH:MM" (default: now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Score a task from its metadata
    Priority(PriorityArgs),

    /// Check a date against weekends and holidays
    BusinessDay {
        date: NaiveDate,
        #[arg(long)]
        allow_weekend: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default config if none exists
    Init,
    /// Print the effective config
    Show,
}

#[derive(Args, Debug)]
struct SlotArgs {
    /// Start date (default: today)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Hours (default: 1)
    #[arg(long)]
    duration: Option<f64>,

    /// Earliest start, HH:MM
    #[arg(long, value_parser = parse_time)]
    preferred: Option<NaiveTime>,

    /// Comma-separated HH:MM-HH:MM windows
    #[arg(long)]
    windows: Option<String>,

    /// Minimum minutes between tasks
    #[arg(long)]
    gap: Option<i64>,

    #[arg(long)]
    allow_weekend: bool,
}

impl SlotArgs {
    fn query(&self) -> Result<SlotQuery> {
        let windows = match self.windows.as_deref() {
            Some(s) => Some(parse_windows(s)?),
            None => None,
        };
        Ok(SlotQuery {
            date: self.date,
            preferred_start: self.preferred,
            duration_hours: self.duration,
            windows,
            min_gap_minutes: self.gap,
            allow_weekend_holiday: self.allow_weekend.then_some(true),
        })
    }
}

#[derive(Args, Debug)]
struct PriorityArgs {
    /// Due date, YYYY-MM-DD
    #[arg(long)]
    deadline: Option<String>,

    /// 1-5
    #[arg(long)]
    impact: Option<f64>,

    /// 1-5
    #[arg(long)]
    effort: Option<f64>,

    #[arg(long)]
    must: bool,

    /// Fixed score; skips the formula
    #[arg(long = "override")]
    priority_override: Option<String>,

    /// Extra metadata as a JSON object
    #[arg(long)]
    meta: Option<String>,
}

impl PriorityArgs {
    fn metadata(&self) -> Result<Option<Metadata>> {
        let mut meta = match self.meta.as_deref() {
            Some(raw) => {
                let value: serde_json::Value = serde_json::from_str(raw).context("parse --meta")?;
                if !value.is_object() {
                    bail!("--meta must be a JSON object");
                }
                Metadata::from_json(&value).unwrap_or_default()
            }
            None => Metadata::new(),
        };
        if let Some(deadline) = &self.deadline {
            meta.insert(keys::DEADLINE, deadline.as_str());
        }
        if let Some(impact) = self.impact {
            meta.set_number(keys::IMPACT, impact);
        }
        if let Some(effort) = self.effort {
            meta.set_number(keys::EFFORT, effort);
        }
        if self.must {
            meta.insert(keys::MUST, true);
        }
        Ok((!meta.is_empty()).then_some(meta))
    }

    fn explicit(&self) -> Option<MetaValue> {
        self.priority_override.as_deref().map(MetaValue::string)
    }
}

fn parse_time(s: &str) -> std::result::Result<NaiveTime, String> {
    parse_hhmm(s).ok_or_else(|| format!("expected HH:MM, got '{s}'"))
}

struct App {
    scheduler: Scheduler,
    calendar: Arc<MemoryCalendar>,
    calendar_path: PathBuf,
    json: bool,
}

impl App {
    fn open(cfg: config::Config, json: bool) -> Result<Self> {
        let tz = cfg.engine.timezone;
        let calendar_path = state::calendar_path()?;
        let calendar = Arc::new(store::load_calendar(&calendar_path, tz)?);
        let holidays = holidays::holiday_oracle(&cfg.holidays)?;
        let identity = Arc::new(cfg.identity.resolve());
        let scheduler = Scheduler::new(cfg.engine, calendar.clone(), holidays, identity);
        Ok(Self {
            scheduler,
            calendar,
            calendar_path,
            json,
        })
    }

    fn tz(&self) -> Tz {
        self.scheduler.config().timezone
    }

    fn save(&self) -> Result<()> {
        store::save_calendar(&self.calendar_path, &self.calendar)
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn print_task(&self, view: &TaskView) {
        println!(
            "{:<10} {:>6.2}  {}  {}",
            view.task.id.as_deref().unwrap_or("-"),
            view.priority,
            format_timing(&view.task.timing, self.tz()),
            view.task.title
        );
    }

    fn print_report(&self, report: &SweepReport) {
        println!(
            "Sweep at {}: {} moved, {} failed",
            report.checked_at.with_timezone(&self.tz()).format("%Y-%m-%d %H:%M"),
            report.rescheduled.len(),
            report.errors.len()
        );
        for moved in &report.rescheduled {
            println!(
                "  {} {:>6.2}  {} -> {}  {}",
                moved.task_id,
                moved.priority,
                moved.previous_start.with_timezone(&self.tz()).format("%m-%d %H:%M"),
                format_timing(&moved.timing, self.tz()),
                moved.title
            );
        }
        for err in &report.errors {
            println!("  ! {}: {}", err.task_id.as_deref().unwrap_or("?"), err.message);
        }
    }
}

fn format_timing(timing: &TaskTiming, tz: Tz) -> String {
    match timing {
        TaskTiming::Timed { start, end } => format!(
            "{}-{}",
            start.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
            end.with_timezone(&tz).format("%H:%M")
        ),
        TaskTiming::AllDay { date } => format!("{date} (all day)"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "agenda=debug,agenda_core=debug"
    } else {
        "agenda=info,agenda_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config()?;
    let now = Utc::now();

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                println!("# {}", state::config_path()?.display());
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
        },

        Command::Slot(args) => {
            let app = App::open(cfg, cli.json)?;
            let found = app.scheduler.find_slot(&args.query()?, now).await?;
            if app.json {
                app.print_json(&found)?;
            } else {
                let timing = TaskTiming::Timed {
                    start: found.slot.start,
                    end: found.slot.end,
                };
                println!("{}", format_timing(&timing, app.tz()));
            }
        }

        Command::Schedule {
            title,
            body,
            all_day,
            slot,
            priority,
        } => {
            let app = App::open(cfg, cli.json)?;
            let new = NewTask {
                title,
                body,
                all_day,
                slot: slot.query()?,
                metadata: priority.metadata()?,
                priority: priority.explicit(),
            };
            let view = app.scheduler.schedule_task(new, now).await?;
            app.save()?;
            if app.json {
                app.print_json(&view)?;
            } else {
                app.print_task(&view);
            }
        }

        Command::List { from, to } => {
            let app = App::open(cfg, cli.json)?;
            let from = from.unwrap_or_else(|| app.scheduler.today(now));
            let to = to.unwrap_or(from);
            let tasks = app.scheduler.list_tasks(from, to, now).await?;
            if app.json {
                app.print_json(&tasks)?;
            } else if tasks.is_empty() {
                println!("No tasks between {from} and {to}.");
            } else {
                for view in &tasks {
                    app.print_task(view);
                }
            }
        }

        Command::Show { id } => {
            let app = App::open(cfg, cli.json)?;
            let view = app.scheduler.get_task(&id, now).await?;
            if app.json {
                app.print_json(&view)?;
            } else {
                app.print_task(&view);
                if !view.body.is_empty() {
                    println!("\n{}", view.body);
                }
                if let Some(meta) = &view.metadata {
                    println!("\n{}", serde_json::to_string_pretty(&meta.to_json())?);
                }
            }
        }

        Command::Sweep { at } => {
            let app = App::open(cfg, cli.json)?;
            let reference: DateTime<Utc> = match at.as_deref() {
                Some(local) => parse_local_to_utc(local, app.tz())?,
                None => now,
            };
            let report = app.scheduler.reschedule_pending(reference).await;
            if !report.rescheduled.is_empty() {
                app.save()?;
            }
            if app.json {
                app.print_json(&report)?;
            } else {
                app.print_report(&report);
            }
        }

        Command::Priority(args) => {
            let app = App::open(cfg, cli.json)?;
            let meta = args.metadata()?;
            let score = app.scheduler.priority(meta.as_ref(), args.explicit().as_ref(), now);
            if app.json {
                app.print_json(&serde_json::json!({ "priority": score }))?;
            } else {
                match score {
                    Some(p) => println!("{p:.2}"),
                    None => println!("(no inputs; tasks default to 50)"),
                }
            }
        }

        Command::BusinessDay {
            date,
            allow_weekend,
        } => {
            let app = App::open(cfg, cli.json)?;
            let business = app.scheduler.is_business_day(date, allow_weekend).await;
            let next = app.scheduler.next_business_day(date, allow_weekend).await;
            if app.json {
                app.print_json(&serde_json::json!({
                    "date": date,
                    "business_day": business,
                    "next_business_day": next,
                }))?;
            } else {
                println!(
                    "{date} {}; next business day {next}",
                    if business { "is a business day" } else { "is not a business day" }
                );
            }
        }
    }

    Ok(())
}

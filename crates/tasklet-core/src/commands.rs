use std::fs;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::board::{Action, TaskBoard};
use crate::cli::{AddArgs, Command};
use crate::config::Settings;
use crate::datetime::{parse_clock_time, parse_date_input};
use crate::filter::ViewFilter;
use crate::notify::{ConsoleUi, Notifier, Permission, Prompter};
use crate::render::{Renderer, render_html};
use crate::store::TaskStore;
use crate::task::TaskDraft;

pub struct Session<'a, S: TaskStore> {
    pub board: &'a mut TaskBoard<S>,
    pub settings: &'a Settings,
    pub renderer: &'a mut Renderer,
    pub permission: Permission,
}

#[instrument(skip(session, command))]
pub fn dispatch<S: TaskStore>(session: Session<'_, S>, command: Command) -> anyhow::Result<()> {
    let now = Utc::now();
    debug!(?command, "dispatching command");

    let assume_yes = matches!(
        command,
        Command::Delete { yes: true, .. } | Command::Action { yes: true, .. }
    );
    let mut ui = ConsoleUi::stdio(assume_yes, session.permission);

    let Session {
        board,
        settings,
        renderer,
        ..
    } = session;

    // Interactive commands check reminders on startup.
    let machine_output = matches!(
        command,
        Command::Remind | Command::Watch { .. } | Command::Render { .. } | Command::Export
    );
    if board.profile().is_full() && !machine_output {
        cmd_remind(board, settings, now, &mut ui)?;
    }

    match command {
        Command::Add(args) => cmd_add(board, settings, renderer, &args, now, &mut ui),
        Command::List(view) => {
            board.set_filter(view.filter);
            show(board, settings, renderer, now)
        }
        Command::Done { id } => {
            if board.toggle_complete(id, &mut ui)?.is_none() {
                debug!(id, "no task to toggle");
            }
            show(board, settings, renderer, now)
        }
        Command::Delete { id, .. } => {
            board.delete_task(id, &mut ui)?;
            show(board, settings, renderer, now)
        }
        Command::Action { action, .. } => {
            let action: Action = action.parse()?;
            board.dispatch(action, &mut ui)?;
            show(board, settings, renderer, now)
        }
        Command::Remind => cmd_remind(board, settings, now, &mut ui),
        Command::Watch { interval, count } => {
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or(settings.reminder_interval);
            cmd_watch(board, settings, interval, count, &mut ui)
        }
        Command::Render { view, output } => {
            board.set_filter(view.filter);
            let html = render_html(
                board.tasks(),
                board.filter(),
                board.profile(),
                settings.zone.today(now),
            );
            match output {
                Some(path) => fs::write(&path, html)
                    .with_context(|| format!("failed to write {}", path.display())),
                None => {
                    io::stdout().lock().write_all(html.as_bytes())?;
                    Ok(())
                }
            }
        }
        Command::Stats => match board.summary() {
            Some(stats) => renderer.print_stats(stats),
            None => {
                warn!("summary counters are only available with the full profile");
                Ok(())
            }
        },
        Command::Export => {
            let json = serde_json::to_string_pretty(board.tasks())?;
            println!("{json}");
            Ok(())
        }
    }
}

#[instrument(skip(board, settings, renderer, args, now, ui))]
fn cmd_add<S, U>(
    board: &mut TaskBoard<S>,
    settings: &Settings,
    renderer: &mut Renderer,
    args: &AddArgs,
    now: DateTime<Utc>,
    ui: &mut U,
) -> anyhow::Result<()>
where
    S: TaskStore,
    U: Prompter + Notifier,
{
    info!("command add");
    let today = settings.zone.today(now);

    let draft = TaskDraft {
        title: args.title.join(" "),
        description: args.description.clone().unwrap_or_default(),
        category: args.category.clone(),
        priority: args.priority.unwrap_or_default(),
        date: args
            .date
            .as_deref()
            .map(|raw| parse_date_input(raw, today))
            .transpose()?,
        time: args.time.as_deref().map(parse_clock_time).transpose()?,
    };

    if let Some(task) = board.add_task(&draft, now, ui)? {
        println!("Created task {}.", task.id);
        show(board, settings, renderer, now)?;
    }
    Ok(())
}

#[instrument(skip(board, settings, now, notifier))]
fn cmd_remind<S: TaskStore, N: Notifier>(
    board: &mut TaskBoard<S>,
    settings: &Settings,
    now: DateTime<Utc>,
    notifier: &mut N,
) -> anyhow::Result<()> {
    let report = board.check_reminders(settings.zone.today(now), notifier)?;
    info!(
        reminded = report.reminded.len(),
        overdue = report.overdue.len(),
        "reminder check done"
    );
    Ok(())
}

#[instrument(skip(board, settings, notifier))]
fn cmd_watch<S: TaskStore, N: Notifier>(
    board: &mut TaskBoard<S>,
    settings: &Settings,
    interval: Duration,
    count: Option<u64>,
    notifier: &mut N,
) -> anyhow::Result<()> {
    if !board.profile().is_full() {
        warn!("reminders are only available with the full profile");
        return Ok(());
    }

    info!(interval_secs = interval.as_secs(), ?count, "watching for reminders");
    let mut checks = 0_u64;
    loop {
        board.reload();
        cmd_remind(board, settings, Utc::now(), notifier)?;
        checks += 1;

        if count.map(|limit| checks >= limit).unwrap_or(false) {
            debug!(checks, "watch finished");
            return Ok(());
        }
        thread::sleep(interval);
    }
}

/// Re-renders the list and, for the full profile, the counters.
fn show<S: TaskStore>(
    board: &TaskBoard<S>,
    settings: &Settings,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let today = settings.zone.today(now);
    let visible = board.visible();
    renderer.print_task_table(&visible, board.profile(), today)?;

    if let Some(stats) = board.summary() {
        if board.filter() != ViewFilter::All {
            println!("Filter: {}", board.filter());
        }
        renderer.print_stats(stats)?;
    }
    Ok(())
}

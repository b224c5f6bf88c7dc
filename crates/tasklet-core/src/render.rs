use std::cmp::Ordering;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::date_label;
use crate::filter::ViewFilter;
use crate::task::{Profile, Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
}

impl Stats {
    pub fn of(tasks: &[Task]) -> Self {
        let completed = tasks.iter().filter(|t| t.completed).count();
        Self {
            total: tasks.len(),
            pending: tasks.len() - completed,
            completed,
        }
    }
}

/// Incomplete before completed, then ascending date with undated last.
/// Stable, so equal keys keep collection order.
pub fn sort_for_display(tasks: &mut [&Task]) {
    tasks.sort_by(|a, b| {
        a.completed.cmp(&b.completed).then_with(|| match (a.date, b.date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
    });
}

/// The list a profile shows for `filter`. The simple profile ignores the
/// filter and keeps insertion order.
pub fn visible_tasks<'a>(tasks: &'a [Task], filter: ViewFilter, profile: Profile) -> Vec<&'a Task> {
    match profile {
        Profile::Full => {
            let mut shown = filter.apply(tasks);
            sort_for_display(&mut shown);
            shown
        }
        Profile::Simple => tasks.iter().collect(),
    }
}

#[tracing::instrument(skip(tasks, today), fields(count = tasks.len()))]
pub fn render_html(tasks: &[Task], filter: ViewFilter, profile: Profile, today: NaiveDate) -> String {
    let shown = visible_tasks(tasks, filter, profile);
    if shown.is_empty() {
        return concat!(
            "<div class=\"empty-state\">\n",
            "    <h3>No tasks found</h3>\n",
            "    <p>Try adjusting your filters</p>\n",
            "</div>\n"
        )
        .to_string();
    }

    let mut out = String::new();
    for task in shown {
        match profile {
            Profile::Full => out.push_str(&task_card(task, today)),
            Profile::Simple => out.push_str(&task_item(task)),
        }
    }
    out
}

fn task_card(task: &Task, today: NaiveDate) -> String {
    let mut out = String::new();
    let state = if task.completed { " completed" } else { "" };
    out.push_str(&format!("<div class=\"task-card{state}\" data-id=\"{}\">\n", task.id));

    out.push_str("    <div class=\"task-header\">\n");
    out.push_str(&format!(
        "        <div class=\"task-title\">{}</div>\n",
        escape_html(&task.title)
    ));
    out.push_str(&format!(
        "        <span class=\"priority-badge priority-{p}\">{p}</span>\n",
        p = task.priority
    ));
    out.push_str("    </div>\n");

    if !task.description.is_empty() {
        out.push_str(&format!(
            "    <div class=\"task-description\">{}</div>\n",
            escape_html(&task.description)
        ));
    }

    out.push_str("    <div class=\"task-meta\">\n");
    out.push_str(&format!("        <span>📁 {}</span>\n", escape_html(&task.category)));
    out.push_str(&format!("        <span>📅 {}</span>\n", date_label(task.date, today)));
    if let Some(time) = task.time {
        out.push_str(&format!("        <span>🕐 {}</span>\n", time.format("%H:%M")));
    }
    out.push_str("    </div>\n");

    let toggle_label = if task.completed { "↩️ Reopen" } else { "✓ Complete" };
    out.push_str("    <div class=\"task-actions\">\n");
    out.push_str(&format!(
        "        <button class=\"action-btn complete-btn\" data-action=\"toggle\" data-id=\"{}\">{toggle_label}</button>\n",
        task.id
    ));
    out.push_str(&format!(
        "        <button class=\"action-btn delete-btn\" data-action=\"delete\" data-id=\"{}\">🗑️ Delete</button>\n",
        task.id
    ));
    out.push_str("    </div>\n");
    out.push_str("</div>\n");
    out
}

fn task_item(task: &Task) -> String {
    let state = if task.completed { "completed" } else { "" };
    let due = task
        .date
        .map(|d| format!(" | Due: {}", d.format("%Y-%m-%d")))
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str(&format!("<li class=\"task\" data-id=\"{}\">\n", task.id));
    out.push_str(&format!(
        "    <span class=\"{state}\">{} <small style=\"color: gray;\">{due}</small></span>\n",
        escape_html(&task.title)
    ));
    out.push_str("    <div class=\"buttons\">\n");
    out.push_str(&format!(
        "        <button class=\"complete-btn\" data-action=\"toggle\" data-id=\"{}\">Complete</button>\n",
        task.id
    ));
    out.push_str(&format!(
        "        <button class=\"delete-btn\" data-action=\"delete\" data-id=\"{}\">Delete</button>\n",
        task.id
    ));
    out.push_str("    </div>\n");
    out.push_str("</li>\n");
    out
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, today))]
    pub fn print_task_table(
        &mut self,
        tasks: &[&Task],
        profile: Profile,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let painted = self.color && io::stdout().is_terminal();
        let out = io::stdout().lock();
        write_task_table(out, tasks, profile, today, painted)
    }

    pub fn print_stats(&mut self, stats: Stats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "Total: {}  Pending: {}  Completed: {}",
            stats.total, stats.pending, stats.completed
        )?;
        Ok(())
    }
}

pub fn write_task_table<W: Write>(
    mut writer: W,
    tasks: &[&Task],
    profile: Profile,
    today: NaiveDate,
    color: bool,
) -> anyhow::Result<()> {
    if tasks.is_empty() {
        writeln!(writer, "No tasks found.")?;
        return Ok(());
    }

    let headers: Vec<String> = match profile {
        Profile::Full => ["ID", "Date", "Time", "Priority", "Category", "Title", "Status"],
        Profile::Simple => ["ID", "Date", "", "", "", "Title", "Status"],
    }
    .iter()
    .filter(|h| !h.is_empty())
    .map(|h| h.to_string())
    .collect();

    let mut rows = Vec::with_capacity(tasks.len());
    for task in tasks {
        let id = paint(&task.id.to_string(), "33", color);
        let date = match profile {
            Profile::Full => date_label(task.date, today),
            Profile::Simple => task.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
        };
        let date = if task.is_overdue(today) {
            paint(&date, "31", color)
        } else {
            date
        };
        let status = if task.completed { "done" } else { "pending" }.to_string();

        let row = match profile {
            Profile::Full => vec![
                id,
                date,
                task.time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
                task.priority.to_string(),
                task.category.clone(),
                task.title.clone(),
                status,
            ],
            Profile::Simple => vec![id, date, task.title.clone(), status],
        };
        rows.push(row);
    }

    write_table(&mut writer, headers, rows)
}

fn paint(text: &str, code: &str, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    format!("\x1b[{code}m{text}\x1b[0m")
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

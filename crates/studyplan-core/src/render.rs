use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::aggregate::{Motivation, Stats};
use crate::config::Config;
use crate::datetime::format_local;
use crate::reminder::ReminderEvent;
use crate::task::{Priority, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> Self {
        Self {
            color: cfg.display.color && io::stdout().is_terminal(),
            tz,
        }
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(&mut self, tasks: &[Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        if tasks.is_empty() {
            println!("No tasks found.");
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Due".to_string(),
            "Subject".to_string(),
            "Title".to_string(),
            "Priority".to_string(),
            "Status".to_string(),
        ];

        let rows = tasks
            .iter()
            .map(|task| {
                let due = format_local(task.due_instant(&self.tz), &self.tz, "%Y-%m-%d %H:%M");
                let due = if task.is_overdue(now, &self.tz) {
                    self.paint(&format!("{due} overdue"), "31")
                } else {
                    due
                };
                let status = if task.completed {
                    self.paint("done", "32")
                } else {
                    "pending".to_string()
                };
                vec![
                    self.paint(&task.id.to_string(), "33"),
                    due,
                    task.subject.clone(),
                    task.title.clone(),
                    self.paint_priority(task.priority),
                    status,
                ]
            })
            .collect();

        write_table(io::stdout().lock(), headers, rows)
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_timeline(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "No tasks scheduled yet.")?;
            return Ok(());
        }

        for task in tasks {
            let when = format_local(task.due_instant(&self.tz), &self.tz, "%a, %b %-d, %H:%M");
            let marker = if task.completed { "[x]" } else { "[ ]" };
            writeln!(out, "{marker} {when}  {}  ({})", task.title, task.subject)?;
        }
        Ok(())
    }

    pub fn print_stats(&mut self, stats: &Stats, motivation: Motivation) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "Total      {}", stats.total)?;
        writeln!(out, "Completed  {}", stats.completed)?;
        writeln!(out, "Pending    {}", stats.pending)?;
        writeln!(out, "Progress   {}% {}", stats.percent, progress_bar(stats.percent, 20))?;
        writeln!(out)?;
        writeln!(out, "{}", motivation.message())?;
        Ok(())
    }

    pub fn print_reminder(&mut self, event: &ReminderEvent) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let when = format_local(event.due, &self.tz, "%H:%M");
        writeln!(out, "{} (due {when})", self.paint(&event.message(), "1;33"))?;
        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::High => "31",
            Priority::Medium => "33",
            Priority::Low => "36",
        };
        self.paint(&priority.as_str().to_ascii_uppercase(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn progress_bar(percent: u8, width: usize) -> String {
    let filled = usize::from(percent.min(100)) * width / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
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

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
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

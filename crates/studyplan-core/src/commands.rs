use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::aggregate;
use crate::cli::{Command, ThemeAction};
use crate::config::Config;
use crate::datastore::TaskStore;
use crate::keyvalue::KeyValueStore;
use crate::lifecycle::{self, EditDraft, TaskDraft};
use crate::prefs;
use crate::query::{Query, SortKey, timeline};
use crate::reminder::{Clock, ReminderSchedule, ReminderScanner, run_until_stopped};
use crate::render::Renderer;
use crate::task::TaskId;

/// Runs one CLI command against the store. `None` means `list` with
/// default selections.
#[instrument(skip(store, cfg, renderer, command, clock))]
pub fn dispatch<K, C>(
    store: &mut TaskStore<K>,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Option<Command>,
    clock: &C,
) -> anyhow::Result<()>
where
    K: KeyValueStore,
    C: Clock,
{
    let tz = cfg.timezone();
    let now = clock.now();
    let today = now.with_timezone(&tz).date_naive();

    let command = command.unwrap_or(Command::List {
        priority: Default::default(),
        status: Default::default(),
        sort: "date".to_string(),
    });
    debug!(?command, "dispatching command");

    match command {
        Command::Add {
            title,
            subject,
            date,
            time,
            priority,
            description,
        } => {
            info!("command add");
            let draft = TaskDraft {
                title: title.unwrap_or_default(),
                subject: subject.unwrap_or_default(),
                date: date.unwrap_or_default(),
                time: time.unwrap_or_default(),
                priority: priority.unwrap_or_default(),
                description: description.unwrap_or_default(),
            };
            let id = lifecycle::add_task(store, &draft, now, today)?;
            println!("Created task {id}.");
            Ok(())
        }
        Command::Edit {
            id,
            title,
            subject,
            date,
            time,
            priority,
            description,
        } => {
            info!("command edit");
            let draft = EditDraft {
                title,
                subject,
                date,
                time,
                priority,
                description,
            };
            let task = lifecycle::edit_task(store, id, &draft, today)?;
            println!("Updated task {}.", task.id);
            Ok(())
        }
        Command::Done { id } => {
            info!("command done");
            let task = lifecycle::toggle_complete(store, id)?;
            if task.completed {
                println!("Completed task {}.", task.id);
            } else {
                println!("Reopened task {}.", task.id);
            }
            Ok(())
        }
        Command::Delete { id, yes } => cmd_delete(store, id, yes),
        Command::ClearCompleted { yes } => cmd_clear_completed(store, yes),
        Command::List {
            priority,
            status,
            sort,
        } => {
            info!("command list");
            let query = Query::new(priority, status, SortKey::parse_lenient(&sort));
            let rows = query.apply(&store.snapshot(), &tz);
            renderer.print_task_table(&rows, now)
        }
        Command::Timeline => {
            info!("command timeline");
            renderer.print_timeline(&timeline(&store.snapshot(), &tz))
        }
        Command::Stats { seed } => {
            info!("command stats");
            let stats = aggregate(&store.snapshot());
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            renderer.print_stats(&stats, stats.motivation(&mut rng))
        }
        Command::Remind => {
            info!("command remind");
            let scanner = ReminderScanner::new(cfg.reminder_lookahead(), tz);
            let outcome = scanner.scan(store, now);
            if outcome.events.is_empty() {
                println!("No reminders due.");
            }
            for event in &outcome.events {
                renderer.print_reminder(event)?;
            }
            match outcome.persist_error {
                Some(err) => Err(err).context("reminders shown but not saved"),
                None => Ok(()),
            }
        }
        Command::Watch { ticks } => {
            info!("command watch");
            let scanner = ReminderScanner::new(cfg.reminder_lookahead(), tz);
            let mut schedule = ReminderSchedule::new(cfg.reminder_interval());
            let stop = stop_on_interrupt()?;
            let mut print_error = None;

            run_until_stopped(&mut schedule, &scanner, store, clock, &stop, ticks, |event| {
                if let Err(err) = renderer.print_reminder(event) {
                    print_error.get_or_insert(err);
                }
            });

            match print_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
        Command::Theme { action } => cmd_theme(store.key_value(), action),
    }
}

#[instrument(skip(store))]
fn cmd_delete<K: KeyValueStore>(store: &mut TaskStore<K>, id: TaskId, yes: bool) -> anyhow::Result<()> {
    info!("command delete");
    let task = store.get(id).ok_or(crate::error::StoreError::NotFound(id))?;

    if !yes && !confirm(&format!("Delete task {id} \"{}\"?", task.title))? {
        println!("Cancelled.");
        return Ok(());
    }

    lifecycle::delete_task(store, id)?;
    println!("Deleted task {id}.");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_clear_completed<K: KeyValueStore>(store: &mut TaskStore<K>, yes: bool) -> anyhow::Result<()> {
    info!("command clear-completed");
    let count = store.snapshot().iter().filter(|task| task.completed).count();
    if count == 0 {
        println!("No completed tasks to clear.");
        return Ok(());
    }

    if !yes && !confirm(&format!("Delete {count} completed task(s)?"))? {
        println!("Cancelled.");
        return Ok(());
    }

    let removed = lifecycle::clear_completed(store)?;
    println!("Cleared {removed} completed task(s).");
    Ok(())
}

fn cmd_theme<K: KeyValueStore>(kv: &K, action: Option<ThemeAction>) -> anyhow::Result<()> {
    match action.unwrap_or(ThemeAction::Show) {
        ThemeAction::Show => {
            println!("{}", prefs::load_theme(kv));
        }
        ThemeAction::Toggle => {
            let theme = prefs::toggle_theme(kv)?;
            println!("Theme set to {theme}.");
        }
        ThemeAction::Set { theme } => {
            prefs::save_theme(kv, theme)?;
            println!("Theme set to {theme}.");
        }
    }
    Ok(())
}

/// Flag raised by the first Ctrl-C. The listener runs on its own thread
/// with a single-threaded runtime.
fn stop_on_interrupt() -> anyhow::Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    let flag = Arc::clone(&stop);
    std::thread::Builder::new()
        .name("studyplan-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        warn!("received interrupt; stopping reminder loop");
                        flag.store(true, Ordering::SeqCst);
                    }
                    Err(err) => warn!(error = %err, "failed waiting for ctrl_c signal"),
                }
            });
        })
        .context("failed to spawn interrupt listener")?;

    Ok(stop)
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    let mut out = io::stdout().lock();
    write!(out, "{prompt} [y/N] ")?;
    out.flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed reading confirmation")?;

    let accepted = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
    if !accepted {
        warn!("destructive command not confirmed");
    }
    Ok(accepted)
}

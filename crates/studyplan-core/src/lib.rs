pub mod aggregate;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod keyvalue;
pub mod lifecycle;
pub mod prefs;
pub mod query;
pub mod reminder;
pub mod render;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting studyplan CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  )?;
  debug!(?cfg, "effective config");

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let kv =
    keyvalue::FileKeyValueStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open data \
         directory at {}",
        data_dir.display()
      )
    })?;
  let mut store =
    datastore::TaskStore::load(kv);

  let mut renderer =
    render::Renderer::new(
      &cfg,
      cfg.timezone()
    );

  commands::dispatch(
    &mut store,
    &cfg,
    &mut renderer,
    cli.command,
    &reminder::SystemClock
  )?;

  info!("done");
  Ok(())
}

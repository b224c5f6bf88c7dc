pub mod board;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod filter;
pub mod notify;
pub mod render;
pub mod store;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::cli::Command;
use crate::filter::ViewFilter;
use crate::notify::{
  DESKTOP_PROGRAM,
  Permission
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tasklet"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );
  let settings =
    config::Settings::from_config(&cfg)?;

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store = store::open(
    &settings.store,
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open task store at \
       {}",
      data_dir.display()
    )
  })?;

  let mut board =
    board::TaskBoard::open(
      store,
      settings.profile
    )
    .with_delete_confirmation(
      settings.confirm_delete
    )
    .with_zone(settings.zone);

  let mut renderer =
    render::Renderer::new(&cfg)?;

  // Permission is settled once, before
  // the first reminder check.
  let permission = Permission::detect(
    settings.desktop_notify,
    DESKTOP_PROGRAM
  );

  let command =
    cli.command.unwrap_or_else(|| {
      Command::List(cli::ViewArgs {
        filter: ViewFilter::All
      })
    });

  commands::dispatch(
    commands::Session {
      board: &mut board,
      settings: &settings,
      renderer: &mut renderer,
      permission
    },
    command
  )?;

  info!("done");
  Ok(())
}

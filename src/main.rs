#![allow(
    clippy::collapsible_else_if,
    clippy::collapsible_if,
    clippy::module_inception,
    clippy::needless_range_loop,
    clippy::result_map_unit_fn,
    clippy::useless_format
)]
#![deny(
    clippy::get_unwrap,
    clippy::panic,
    clippy::print_stdout,
    clippy::unwrap_used,
    clippy::used_underscore_binding,
    clippy::used_underscore_items
)]

mod actions;
mod config;
mod error;
mod guest;
mod logger;
mod mounts;
mod session;
mod types;
mod util;

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser};
use clap_complete::CompleteEnv;
use config::{cli, resolve_config};
use error::exit_code_for;
use log::{Log, debug, error, warn};
use nix::unistd::geteuid;
use serde_json::Value;
use util::{
    drop_privileges, print_json_output, resolve_uid_gid_home, set_json_output,
    set_should_print_output,
};

pub fn main() {
    let logger = match logger::ChrootLogger::new(log::LevelFilter::Trace).init()
    {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logger: {}", e);
            std::process::exit(1);
        }
    };

    let code = match run(logger) {
        Ok(code) => code,
        Err(e) => {
            // Config errors can happen while output is still deferred
            logger.print_deferred();
            error!("{:#}", e);
            exit_code_for(&e)
        }
    };

    logger.flush();
    std::process::exit(code);
}

fn run(logger: &'static logger::ChrootLogger) -> Result<i32> {
    // Tab completion. Completers read the sandbox's passwd, which doesn't need
    // root, so run them as the invoking user. Does not return when completion
    // was requested.
    if std::env::var_os("COMPLETE").is_some() {
        if geteuid().is_root() {
            let invoker =
                resolve_uid_gid_home().context("Resolving uid/gid/home")?;
            drop_privileges(invoker.uid, invoker.gid, &[invoker.gid])?;
        }
        CompleteEnv::with_factory(cli::Args::command).complete();
        return Ok(0);
    }

    let cli: cli::Args = cli::Args::parse();

    if let Some(log_level) = cli.log_level {
        logger.set_level(log_level);
    } else {
        logger.set_level(log::LevelFilter::Info);
    };

    set_should_print_output(!cli.json);
    let json = cli.json;
    let result = dispatch(logger, cli);

    if json {
        match &result {
            Ok(_) => {
                set_json_output("status", Value::String("success".to_string()))
            }
            Err(e) => {
                set_json_output("status", Value::String("error".to_string()));
                set_json_output("error", Value::String(format!("{:#}", e)));
            }
        }
        print_json_output()?;
    }

    result
}

fn dispatch(
    logger: &'static logger::ChrootLogger,
    cli: cli::Args,
) -> Result<i32> {
    let force = cli.force;
    let action = cli.action.clone();
    let config = resolve_config(cli).context("Resolving config")?;

    // Now that we've loaded the config, we can set the log level and print
    // out any deferred messages emitted while we were loading it.
    logger.set_level(config.log_level);
    if let Err(e) = logger.attach_file(&config.log_file) {
        // Unprivileged `config` and `help` runs can't write the system log
        if geteuid().is_root() {
            warn!("{:#}, logging to stderr only", e);
        } else {
            debug!("{:#}", e);
        }
    }
    logger.print_deferred();

    if let cli::Action::Config { keys } = action {
        actions::config(&config, keys)?;
        return Ok(0);
    }

    // Ensure we're running as root
    if !geteuid().is_root() {
        return Err(anyhow!(
            "Insufficient permissions to manage mounts, please retry using `sudo`"
        ));
    }

    match action {
        cli::Action::Prepare => actions::prepare(&config, force).map(|_| 0),
        cli::Action::Shell { user } => {
            actions::enter(&config, user, None, force)
        }
        cli::Action::Run { user, command } => {
            actions::enter(&config, user, Some(command), force)
        }
        cli::Action::Stop => actions::stop(&config, force).map(|_| 0),
        cli::Action::Status => actions::status(&config).map(|_| 0),
        cli::Action::Config { .. } => Ok(0),
    }
}

// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Command line interface.

use crate::{Chains, Config, Orchestrator, LOG_TARGET};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, about, version, rename_all = "kebab-case")]
pub struct Cli {
	/// Path of the configuration file.
	#[arg(long, short, default_value = "provisioner.json")]
	pub config: PathBuf,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
#[command(rename_all = "kebab-case")]
pub enum Command {
	/// Create the assets on the origin and register them on every destination.
	Provision,
	/// Reserve transfer the registered assets to their destinations.
	Bridge,
	/// Create the configured pools on the destinations.
	BootstrapPools,
	/// Register and fund local assets with root origin on the `seed` chain.
	SeedLocal,
	/// `provision`, `bridge` and `bootstrap-pools` in order.
	RunAll,
}

fn init_logger() {
	let env = env_logger::Env::default().default_filter_or("info");
	let _ = env_logger::Builder::from_env(env).format_timestamp_millis().try_init();
}

/// Run `cli.command` against the chains of the configuration file.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
	init_logger();
	let config = Config::load(&cli.config)?;
	let chains = match cli.command {
		Command::SeedLocal => Chains::connect_seed(&config).await?,
		_ => Chains::connect_network(&config).await?,
	};
	let mut orchestrator = Orchestrator::new(config, chains)?;

	match cli.command {
		Command::Provision => {
			let report = orchestrator.provision().await?;
			let destinations = &orchestrator.config().destinations;
			for (destination, records) in destinations.iter().zip(&report.records) {
				log::info!(
					target: LOG_TARGET,
					"{} records written to {}",
					records.len(),
					destination.metadata_file.display()
				);
			}
		},
		Command::Bridge => {
			let report = orchestrator.bridge().await?;
			if !report.failed.is_empty() {
				anyhow::bail!(
					"{} of {} transfer(s) failed",
					report.failed.len(),
					report.failed.len() + report.transferred.len()
				);
			}
		},
		Command::BootstrapPools => {
			orchestrator.bootstrap_pools().await?;
		},
		Command::SeedLocal => {
			let report = orchestrator.seed_local().await?;
			log::info!(
				target: LOG_TARGET,
				"Seeded {:?}, skipped {:?}, pool created: {}",
				report.registered,
				report.skipped,
				report.pool_created
			);
		},
		Command::RunAll => {
			let report = orchestrator.run_all().await?;
			if !report.bridge.failed.is_empty() {
				anyhow::bail!("{} transfer(s) failed", report.bridge.failed.len());
			}
		},
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;
	use pretty_assertions::assert_eq;

	#[test]
	fn cli_is_well_formed() {
		Cli::command().debug_assert();
	}

	#[test]
	fn parses_subcommands() {
		let cli = Cli::parse_from(["xcm-provisioner", "bootstrap-pools"]);
		assert_eq!(cli.command, Command::BootstrapPools);
		assert_eq!(cli.config, PathBuf::from("provisioner.json"));

		let cli = Cli::parse_from(["xcm-provisioner", "--config", "local.json", "seed-local"]);
		assert_eq!(cli.command, Command::SeedLocal);
		assert_eq!(cli.config, PathBuf::from("local.json"));
	}
}

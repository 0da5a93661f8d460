// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use xcm_provisioner::{cli, Error, LOG_TARGET};

#[tokio::main]
async fn main() {
	if let Err(err) = cli::run(cli::Cli::parse()).await {
		log::error!(target: LOG_TARGET, "{err:#}");
		eprintln!("Error: {err:#}");
		if err.downcast_ref::<Error>().is_some_and(Error::is_recoverable) {
			eprintln!("The failure is recoverable, run the same command again to resume.");
		}
		std::process::exit(1);
	}
}

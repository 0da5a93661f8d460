// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Runs the provisioning phases across the configured chains.
//!
//! Every phase starts the block pacers of the chains it drives on entry and stops them on exit,
//! whether the phase succeeded or not. Between dependent cross-chain steps the chains are advanced
//! one block each in causal order: origin, relay, destination.

use crate::{
	bridge::{bridge, BridgeRoute, ReserveTransfer},
	config::{parse_account, Config, DestinationConfig},
	counter::Counter,
	pools::{self, PoolPair},
	provisioning::{asset_exists, provision_assets, ProvisionParams},
	registrar::Registrar,
	seeding::{self, SeedReport},
	store::MetadataStore,
	Error, Result, LOG_TARGET,
};
use std::{path::Path, sync::Arc};
use xcm_provisioner_client::{
	BlockPacer, Chain, ChainEndpoint, ChainError, ChainHandle, Keypair, PacerConfig, RootScheduler,
};
use xcm_provisioner_primitives::{
	AssetDescriptor, AssetId, AssetSpec, Balance, CrossChainAssetRecord,
};

/// Connections used by an [`Orchestrator`].
#[derive(Default)]
pub struct Chains {
	pub origin: Option<Arc<dyn Chain>>,
	pub relay: Option<Arc<dyn Chain>>,
	/// In the order of the configured destinations.
	pub destinations: Vec<Arc<dyn Chain>>,
	pub seed: Option<Arc<dyn Chain>>,
}

async fn connect(endpoint: &ChainEndpoint) -> Result<Arc<dyn Chain>> {
	Ok(Arc::new(ChainHandle::connect(endpoint.clone()).await?))
}

impl Chains {
	/// Connect to the origin, the relay and every destination.
	pub async fn connect_network(config: &Config) -> Result<Self> {
		let origin = connect(&config.origin.endpoint).await?;
		let relay = match &config.relay {
			Some(endpoint) => Some(connect(endpoint).await?),
			None => None,
		};
		let mut destinations = Vec::with_capacity(config.destinations.len());
		for destination in &config.destinations {
			destinations.push(connect(&destination.endpoint).await?);
		}
		Ok(Self { origin: Some(origin), relay, destinations, seed: None })
	}

	/// Connect to the chain of the `seed` section.
	pub async fn connect_seed(config: &Config) -> Result<Self> {
		let seed = config
			.seed
			.as_ref()
			.ok_or_else(|| Error::Config("no `seed` section configured".into()))?;
		Ok(Self { seed: Some(connect(&seed.endpoint).await?), ..Default::default() })
	}
}

struct Paced {
	pacer: BlockPacer,
	config: PacerConfig,
}

impl Paced {
	fn new(chain: Arc<dyn Chain>, config: PacerConfig) -> Self {
		Self { pacer: BlockPacer::new(chain), config }
	}

	fn chain(&self) -> &dyn Chain {
		&**self.pacer.chain()
	}
}

/// Result of the `provision` phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
	pub descriptors: Vec<AssetDescriptor>,
	/// Registration records per destination, in configuration order.
	pub records: Vec<Vec<CrossChainAssetRecord>>,
}

/// One asset moved to a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgedAsset {
	pub destination: String,
	pub origin_asset_id: AssetId,
	pub destination_asset_id: AssetId,
	/// Increase of the beneficiary's balance observed after the causal advance.
	pub received: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTransfer {
	pub destination: String,
	pub origin_asset_id: AssetId,
	pub reason: String,
}

/// Result of the `bridge` phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeReport {
	pub transferred: Vec<BridgedAsset>,
	pub failed: Vec<FailedTransfer>,
}

/// Result of the `run-all` phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
	pub provision: ProvisionReport,
	pub bridge: BridgeReport,
	pub pools_created: usize,
}

/// Owns the chains, their pacers and the identifier counters of one run.
pub struct Orchestrator {
	config: Config,
	signer: Keypair,
	origin: Option<Paced>,
	relay: Option<Paced>,
	destinations: Vec<Paced>,
	seed: Option<Paced>,
	asset_counter: Counter,
	registry_counters: Vec<Counter>,
}

impl Orchestrator {
	pub fn new(config: Config, chains: Chains) -> Result<Self> {
		if !chains.destinations.is_empty() && chains.destinations.len() != config.destinations.len()
		{
			return Err(Error::Config(format!(
				"{} destination(s) configured, {} connected",
				config.destinations.len(),
				chains.destinations.len()
			)))
		}
		let signer = config.signer()?;
		let origin = chains.origin.map(|chain| Paced::new(chain, config.origin.endpoint.pacer));
		let relay = chains.relay.map(|chain| {
			let pacer = config.relay.as_ref().map(|relay| relay.pacer).unwrap_or_default();
			Paced::new(chain, pacer)
		});
		let destinations = chains
			.destinations
			.into_iter()
			.zip(&config.destinations)
			.map(|(chain, destination)| Paced::new(chain, destination.endpoint.pacer))
			.collect();
		let seed = chains.seed.map(|chain| {
			let pacer = config.seed.as_ref().map(|seed| seed.endpoint.pacer).unwrap_or_default();
			Paced::new(chain, pacer)
		});
		let asset_counter = Counter::assets().with_fallback(config.origin.first_asset_id);
		let registry_counters =
			config.destinations.iter().map(|_| Counter::asset_registry()).collect();

		Ok(Self {
			config,
			signer,
			origin,
			relay,
			destinations,
			seed,
			asset_counter,
			registry_counters,
		})
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	fn origin(&self) -> Result<&Paced> {
		self.origin.as_ref().ok_or_else(|| Error::Config("origin chain is not connected".into()))
	}

	fn network(&self) -> Result<(&Paced, Vec<(&DestinationConfig, &Paced)>)> {
		let origin = self.origin()?;
		if self.destinations.is_empty() {
			return Err(Error::Config("no destination chains configured".into()))
		}
		Ok((origin, self.config.destinations.iter().zip(&self.destinations).collect()))
	}

	fn paced_chains(&mut self) -> impl Iterator<Item = &mut Paced> {
		self.origin.iter_mut().chain(self.relay.iter_mut()).chain(self.destinations.iter_mut())
	}

	async fn start_pacers(&mut self) {
		for paced in self.paced_chains() {
			paced.pacer.start(paced.config).await;
		}
	}

	async fn stop_pacers(&mut self) {
		for paced in self.paced_chains() {
			paced.pacer.stop().await;
		}
	}

	/// Advance origin, relay and the destinations at `destinations`, in that order, one block
	/// each.
	async fn advance_causally(&self, destinations: &[usize]) -> Result<()> {
		let origin = self.origin()?;
		origin.pacer.advance(1).await?;
		if let Some(relay) = &self.relay {
			relay.pacer.advance(1).await?;
		}
		for index in destinations {
			if let Some(destination) = self.destinations.get(*index) {
				destination.pacer.advance(1).await?;
			}
		}
		Ok(())
	}

	/// Create the assets listed in the assets file on the origin and register them on every
	/// destination.
	///
	/// If the provisioned file already lists assets created by an earlier run, those are reused
	/// instead of being created again and only destinations without a metadata file are
	/// registered. A destination that already registered all of them, because an earlier
	/// registration landed after its inclusion timed out, gets its records from the chain.
	/// Nothing is done once every destination has its metadata file.
	pub async fn provision(&mut self) -> Result<ProvisionReport> {
		self.start_pacers().await;
		let result = self.run_provision().await;
		self.stop_pacers().await;
		result
	}

	/// Reserve transfer every registered asset to its destination.
	pub async fn bridge(&mut self) -> Result<BridgeReport> {
		self.start_pacers().await;
		let result = self.run_bridge().await;
		self.stop_pacers().await;
		result
	}

	/// Create the configured pools from the registration records. Returns the number of pools
	/// created.
	pub async fn bootstrap_pools(&mut self) -> Result<usize> {
		self.start_pacers().await;
		let result = self.run_bootstrap_pools().await;
		self.stop_pacers().await;
		result
	}

	/// `provision`, `bridge` and `bootstrap-pools` in order.
	pub async fn run_all(&mut self) -> Result<RunReport> {
		self.start_pacers().await;
		let result = async {
			let provision = self.run_provision().await?;
			let bridge = self.run_bridge().await?;
			let pools_created = self.run_bootstrap_pools().await?;
			Ok::<_, Error>(RunReport { provision, bridge, pools_created })
		}
		.await;
		self.stop_pacers().await;
		result
	}

	/// Register and fund the local assets of the `seed` section.
	///
	/// The seeded chain's blocks are forced by the root scheduler only, its periodic pacer is not
	/// started.
	pub async fn seed_local(&mut self) -> Result<SeedReport> {
		let config = self
			.config
			.seed
			.as_ref()
			.ok_or_else(|| Error::Config("no `seed` section configured".into()))?;
		let seed = self
			.seed
			.as_ref()
			.ok_or_else(|| Error::Config("seed chain is not connected".into()))?;
		let scheduler = RootScheduler::new(seed.pacer.chain().clone())?;
		seeding::seed_local(
			&seed.pacer,
			&scheduler,
			&self.signer,
			config.native_asset_id,
			&config.assets,
			config.pool.as_ref(),
		)
		.await
	}

	async fn run_provision(&self) -> Result<ProvisionReport> {
		let (origin, destinations) = self.network()?;
		let provisioned = MetadataStore::new(&self.config.provisioned_file);
		let pending: Vec<usize> = destinations
			.iter()
			.enumerate()
			.filter(|(_, (destination, _))| !Path::new(&destination.metadata_file).exists())
			.map(|(index, _)| index)
			.collect();

		let resumed = provisioned.exists();
		let descriptors = if resumed {
			if pending.is_empty() {
				return Err(Error::Store {
					path: provisioned.path().to_path_buf(),
					reason: "assets are already registered on every destination".into(),
				})
			}
			self.resume_provisioned(origin.chain(), &provisioned).await?
		} else {
			for (destination, _) in &destinations {
				MetadataStore::new(&destination.metadata_file).ensure_absent()?;
			}
			let specs: Vec<AssetSpec> = MetadataStore::new(&self.config.assets_file).load()?;
			let params = ProvisionParams {
				mint_amount: self.config.amounts.mint,
				min_balance: self.config.amounts.min_balance,
				counterpart: self.config.counterpart()?.unwrap_or(self.signer.public_key().0),
			};
			let descriptors =
				provision_assets(origin.chain(), &self.asset_counter, &self.signer, &specs, &params)
					.await?;
			provisioned.save_new(&descriptors)?;
			descriptors
		};

		let (para_id, pallet_instance) =
			(self.config.origin.para_id, self.config.origin.assets_pallet_instance);
		let mut records = Vec::with_capacity(destinations.len());
		for (index, (destination, paced)) in destinations.iter().enumerate() {
			let store = MetadataStore::new(&destination.metadata_file);
			if !pending.contains(&index) {
				log::info!(
					target: LOG_TARGET,
					"Assets already registered on {}, see {}",
					paced.chain().name(),
					store.path().display()
				);
				records.push(store.load()?);
				continue
			}
			let registrar = Registrar {
				chain: paced.chain(),
				counter: &self.registry_counters[index],
				id_offset: destination.asset_id_offset,
				store: &store,
			};
			let recovered = if resumed {
				registrar.recover_registered(para_id, pallet_instance, &descriptors).await?
			} else {
				None
			};
			let registered = match recovered {
				Some(registered) => registered,
				None => {
					registrar
						.register_external(&self.signer, para_id, pallet_instance, &descriptors)
						.await?
				},
			};
			records.push(registered);
		}

		self.advance_causally(&pending).await?;
		log::info!(
			target: LOG_TARGET,
			"✅ Provisioned {} asset(s) on {} destination(s)",
			descriptors.len(),
			pending.len()
		);
		Ok(ProvisionReport { descriptors, records })
	}

	/// Descriptors of assets created by an earlier run, checked against the origin.
	async fn resume_provisioned(
		&self,
		origin: &dyn Chain,
		provisioned: &MetadataStore,
	) -> Result<Vec<AssetDescriptor>> {
		let descriptors: Vec<AssetDescriptor> = provisioned.load()?;
		for descriptor in &descriptors {
			let id = descriptor.local_id;
			if !asset_exists(origin, id).await? {
				return Err(Error::Store {
					path: provisioned.path().to_path_buf(),
					reason: format!("asset {id} does not exist on {}", origin.name()),
				})
			}
		}
		log::info!(
			target: LOG_TARGET,
			"♻️ Reusing {} asset(s) already created on {}, listed in {}",
			descriptors.len(),
			origin.name(),
			provisioned.path().display()
		);
		Ok(descriptors)
	}

	async fn run_bridge(&self) -> Result<BridgeReport> {
		let (origin, destinations) = self.network()?;
		let mut report = BridgeReport::default();

		for (index, (destination, paced)) in destinations.iter().enumerate() {
			let records: Vec<CrossChainAssetRecord> =
				MetadataStore::new(&destination.metadata_file).load()?;
			let beneficiary = match &destination.beneficiary {
				Some(account) => parse_account(account)?,
				None => self.signer.public_key().0,
			};
			let route = BridgeRoute {
				pallet_instance: self.config.origin.assets_pallet_instance,
				destination_para_id: destination.para_id,
				beneficiary,
				xcm_fee: self.config.amounts.xcm_fee,
			};

			for record in records {
				let transfer = ReserveTransfer {
					origin_asset_id: record.origin_asset_id,
					amount: self.config.amounts.transfer,
				};
				let balance = || {
					pools::free_balance(
						paced.chain(),
						destination.native_asset_id,
						&beneficiary,
						record.destination_local_id,
					)
				};
				let before = balance().await?;
				match bridge(origin.chain(), &self.signer, &transfer, &route).await {
					Ok(_) => {},
					Err(
						err @ (Error::XcmSendRejected { .. } |
						Error::Chain(ChainError::DispatchFailed { .. })),
					) => {
						log::error!(
							target: LOG_TARGET,
							"Bridging asset {} to {} failed: {err}",
							record.origin_asset_id,
							destination.endpoint.name
						);
						report.failed.push(FailedTransfer {
							destination: destination.endpoint.name.clone(),
							origin_asset_id: record.origin_asset_id,
							reason: err.to_string(),
						});
						continue
					},
					Err(err) => return Err(err),
				}
				self.advance_causally(&[index]).await?;

				let received = balance().await?.saturating_sub(before);
				if received == 0 {
					log::warn!(
						target: LOG_TARGET,
						"Asset {} not yet delivered to {}",
						record.destination_local_id,
						destination.endpoint.name
					);
				}
				report.transferred.push(BridgedAsset {
					destination: destination.endpoint.name.clone(),
					origin_asset_id: record.origin_asset_id,
					destination_asset_id: record.destination_local_id,
					received,
				});
			}
		}
		log::info!(
			target: LOG_TARGET,
			"Bridged {} asset(s), {} failed",
			report.transferred.len(),
			report.failed.len()
		);
		Ok(report)
	}

	async fn run_bootstrap_pools(&self) -> Result<usize> {
		let (_, destinations) = self.network()?;
		let mut created = 0;

		for (destination, paced) in destinations {
			let Some(config) = &destination.pools else { continue };
			let records: Vec<CrossChainAssetRecord> =
				MetadataStore::new(&destination.metadata_file).load()?;
			let Some((first, others)) = records.split_first() else { continue };
			let chain = paced.chain();

			if let Some(anchor) = &config.anchor {
				let pair = PoolPair {
					asset_a: anchor.asset_id,
					amount_a: anchor.amount,
					asset_b: first.destination_local_id,
					amount_b: pools::quote_amount(anchor.amount, &anchor.price)?,
				};
				if pools::submit_pools(chain, &self.signer, destination.native_asset_id, &[pair])
					.await?
					.is_some()
				{
					created += 1;
				}
			}

			let quotes: Vec<(AssetId, _)> = others
				.iter()
				.map(|record| {
					let price = record.initial_price.unwrap_or(config.default_price);
					(record.destination_local_id, price)
				})
				.collect();
			if pools::create_pools(
				chain,
				&self.signer,
				destination.native_asset_id,
				first.destination_local_id,
				config.base_amount,
				&quotes,
			)
			.await?
			.is_some()
			{
				created += quotes.len();
			}
		}
		log::info!(target: LOG_TARGET, "Created {created} pool(s)");
		Ok(created)
	}
}

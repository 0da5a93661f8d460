// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! An in-memory [`Chain`] simulating the pallets the provisioner talks to.
//!
//! Every submission is included in a freshly built block. Batches are applied to a copy of the
//! state which is only committed if every call succeeds. Calls with malformed arguments are
//! rejected before inclusion, like an undecodable extrinsic would be.

use crate::network::{InboundTransfer, MockNetwork};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
	collections::BTreeMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};
use xcm_provisioner_client::{
	value, BatchedCall, BlockBuildMode, BlockNumber, Call, Chain, ChainError, ControlCommand,
	EmittedEvent, Keypair, StorageQuery, TransactionOutcome, Value, H256,
};
use xcm_provisioner_primitives::{
	sibling_account, Asset, AssetId, Balance, Junction, Location,
};

type AccountId = [u8; 32];

/// Offset added to the registry counter when allocating sequential ids.
pub const DEFAULT_REGISTRY_ID_OFFSET: AssetId = 1_000_000;

const ENCODED_CALL_PREFIX: &[u8] = b"mock-call:";

#[derive(Debug, Clone, Default)]
struct AssetDetails {
	owner: AccountId,
	admin: AccountId,
	min_balance: Balance,
	supply: Balance,
	name: Vec<u8>,
	symbol: Vec<u8>,
	decimals: u8,
	accounts: BTreeMap<AccountId, Balance>,
}

#[derive(Debug, Clone, Default)]
struct RegistryEntry {
	name: Option<Vec<u8>>,
	symbol: Option<Vec<u8>>,
	decimals: Option<u8>,
	location: Option<Location>,
	existential_deposit: Balance,
	is_sufficient: bool,
}

#[derive(Debug, Clone, Default)]
struct State {
	height: BlockNumber,
	build_mode: Option<BlockBuildMode>,
	next_asset_id: Option<AssetId>,
	assets: BTreeMap<AssetId, AssetDetails>,
	registry_next_id: AssetId,
	registry: BTreeMap<AssetId, RegistryEntry>,
	location_assets: BTreeMap<Location, AssetId>,
	tokens: BTreeMap<(AccountId, AssetId), Balance>,
	native: BTreeMap<AccountId, Balance>,
	accepted_currencies: BTreeMap<AssetId, u128>,
	pools: BTreeMap<(AssetId, AssetId), (Balance, Balance)>,
	agenda: BTreeMap<BlockNumber, Vec<BatchedCall>>,
	scheduled_results: Vec<(BlockNumber, Result<(), String>)>,
	undelivered: Vec<InboundTransfer>,
	outbox: Vec<(u32, InboundTransfer)>,
	events: Vec<EmittedEvent>,
	/// Identifiers consumed by another actor before the next submission.
	stolen_ids: u32,
	/// The next submission times out. `Some(true)` if it is included nonetheless.
	time_out: Option<bool>,
}

#[derive(Debug, Clone, Copy)]
enum Origin {
	Signed(AccountId),
	Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Failure {
	pallet: &'static str,
	error: &'static str,
}

fn fail<T>(pallet: &'static str, error: &'static str) -> Result<T, Failure> {
	Err(Failure { pallet, error })
}

/// A call with decoded arguments.
#[derive(Debug, Clone)]
enum MockCall {
	AssetsCreate { id: AssetId, admin: AccountId, min_balance: Balance },
	AssetsSetMetadata { id: AssetId, name: Vec<u8>, symbol: Vec<u8>, decimals: u8 },
	AssetsMint { id: AssetId, beneficiary: AccountId, amount: Balance },
	AssetsTouchOther { id: AssetId, who: AccountId },
	RegisterExternal { location: Location },
	Register {
		asset_id: Option<AssetId>,
		entry: RegistryEntry,
	},
	AddCurrency { currency: AssetId, price: u128 },
	SetBalance { who: AccountId, currency_id: AssetId, new_free: Balance },
	ReserveTransfer {
		dest: Location,
		beneficiary: Location,
		assets: Vec<Asset>,
		fee_asset_item: u32,
	},
	CreatePool { asset_a: AssetId, amount_a: Balance, asset_b: AssetId, amount_b: Balance },
	Remark,
}

fn arg<'a>(call: &'a Call, name: &str) -> Result<&'a Value, String> {
	call.field(name)
		.ok_or_else(|| format!("{}::{} is missing argument `{name}`", call.pallet(), call.name()))
}

fn optional<T>(
	call: &Call,
	name: &str,
	decode: impl Fn(&Value) -> Result<T, ChainError>,
) -> Result<Option<T>, String> {
	value::to_option(arg(call, name)?)
		.and_then(|inner| inner.map(decode).transpose())
		.map_err(|err| err.to_string())
}

fn decode_call(call: &Call) -> Result<MockCall, String> {
	let u32_arg = |name: &str| value::to_u32(arg(call, name)?).map_err(|err| err.to_string());
	let u128_arg = |name: &str| value::to_u128(arg(call, name)?).map_err(|err| err.to_string());
	let account_arg =
		|name: &str| value::to_account_id(arg(call, name)?).map_err(|err| err.to_string());
	let bytes_arg = |name: &str| value::to_bytes(arg(call, name)?).map_err(|err| err.to_string());

	Ok(match (call.pallet(), call.name()) {
		("Assets", "create") => MockCall::AssetsCreate {
			id: u32_arg("id")?,
			admin: account_arg("admin")?,
			min_balance: u128_arg("min_balance")?,
		},
		("Assets", "set_metadata") => MockCall::AssetsSetMetadata {
			id: u32_arg("id")?,
			name: bytes_arg("name")?,
			symbol: bytes_arg("symbol")?,
			decimals: value::to_u8(arg(call, "decimals")?).map_err(|err| err.to_string())?,
		},
		("Assets", "mint") => MockCall::AssetsMint {
			id: u32_arg("id")?,
			beneficiary: account_arg("beneficiary")?,
			amount: u128_arg("amount")?,
		},
		("Assets", "touch_other") => {
			MockCall::AssetsTouchOther { id: u32_arg("id")?, who: account_arg("who")? }
		},
		("AssetRegistry", "register_external") => MockCall::RegisterExternal {
			location: value::to_location(arg(call, "location")?).map_err(|err| err.to_string())?,
		},
		("AssetRegistry", "register") => MockCall::Register {
			asset_id: optional(call, "asset_id", value::to_u32)?,
			entry: RegistryEntry {
				name: optional(call, "name", value::to_bytes)?,
				symbol: optional(call, "symbol", value::to_bytes)?,
				decimals: optional(call, "decimals", value::to_u8)?,
				location: optional(call, "location", value::to_location)?,
				existential_deposit: optional(call, "existential_deposit", value::to_u128)?
					.unwrap_or_default(),
				is_sufficient: *arg(call, "is_sufficient")? == Value::bool(true),
			},
		},
		("MultiTransactionPayment", "add_currency") => {
			MockCall::AddCurrency { currency: u32_arg("currency")?, price: u128_arg("price")? }
		},
		("Tokens", "set_balance") => MockCall::SetBalance {
			who: account_arg("who")?,
			currency_id: u32_arg("currency_id")?,
			new_free: u128_arg("new_free")?,
		},
		("PolkadotXcm", "limited_reserve_transfer_assets") => MockCall::ReserveTransfer {
			dest: value::to_location(arg(call, "dest")?).map_err(|err| err.to_string())?,
			beneficiary: value::to_location(arg(call, "beneficiary")?)
				.map_err(|err| err.to_string())?,
			assets: value::to_assets(arg(call, "assets")?).map_err(|err| err.to_string())?,
			fee_asset_item: u32_arg("fee_asset_item")?,
		},
		("XYK", "create_pool") => MockCall::CreatePool {
			asset_a: u32_arg("asset_a")?,
			amount_a: u128_arg("amount_a")?,
			asset_b: u32_arg("asset_b")?,
			amount_b: u128_arg("amount_b")?,
		},
		("System", "remark") => MockCall::Remark,
		(pallet, name) => return Err(format!("unknown call {pallet}::{name}")),
	})
}

fn event(
	pallet: &str,
	variant: &str,
	fields: impl IntoIterator<Item = (&'static str, Value)>,
) -> EmittedEvent {
	EmittedEvent {
		pallet: pallet.into(),
		variant: variant.into(),
		fields: Value::named_composite(fields),
	}
}

/// Builder-style configuration followed by [`MockChain::build`].
pub struct MockChain {
	name: String,
	para_id: Option<u32>,
	native_asset_id: AssetId,
	registry_id_offset: AssetId,
	root_injection: bool,
	network: Option<Arc<MockNetwork>>,
	state: Mutex<State>,
	encoded: Mutex<Vec<BatchedCall>>,
	extrinsics: AtomicU64,
}

impl MockChain {
	pub fn new(name: &str) -> Self {
		Self {
			name: name.into(),
			para_id: None,
			native_asset_id: 0,
			registry_id_offset: DEFAULT_REGISTRY_ID_OFFSET,
			root_injection: false,
			network: None,
			state: Mutex::new(State { registry_next_id: 1, ..Default::default() }),
			encoded: Mutex::new(Vec::new()),
			extrinsics: AtomicU64::new(0),
		}
	}

	/// Make this chain a parachain attached to `network`.
	pub fn with_para_id(mut self, para_id: u32, network: &Arc<MockNetwork>) -> Self {
		self.para_id = Some(para_id);
		self.network = Some(network.clone());
		self
	}

	/// Set `Assets::NextAssetId`. `None` lets `Assets::create` accept any free id.
	pub fn with_next_asset_id(mut self, next: Option<AssetId>) -> Self {
		self.state.get_mut().next_asset_id = next;
		self
	}

	/// Set `AssetRegistry::NextAssetId` and the offset of sequential ids.
	pub fn with_registry_counter(mut self, next: AssetId, offset: AssetId) -> Self {
		self.state.get_mut().registry_next_id = next;
		self.registry_id_offset = offset;
		self
	}

	pub fn with_native_asset_id(mut self, id: AssetId) -> Self {
		self.native_asset_id = id;
		self
	}

	pub fn with_root_injection(mut self) -> Self {
		self.root_injection = true;
		self
	}

	pub fn with_height(mut self, height: BlockNumber) -> Self {
		self.state.get_mut().height = height;
		self
	}

	/// Credit `amount` of registry asset `id` (or the native asset) to `account`.
	pub fn with_balance(mut self, account: AccountId, id: AssetId, amount: Balance) -> Self {
		let native = self.native_asset_id;
		credit(self.state.get_mut(), native, account, id, amount);
		self
	}

	pub fn build(self) -> Arc<Self> {
		Arc::new(self)
	}

	pub fn para_id(&self) -> Option<u32> {
		self.para_id
	}

	pub fn height(&self) -> BlockNumber {
		self.state.lock().height
	}

	pub fn build_mode(&self) -> Option<BlockBuildMode> {
		self.state.lock().build_mode
	}

	pub fn next_asset_id(&self) -> Option<AssetId> {
		self.state.lock().next_asset_id
	}

	/// `(name, symbol, decimals)` of an `Assets` asset.
	pub fn asset_metadata(&self, id: AssetId) -> Option<(String, String, u8)> {
		self.state.lock().assets.get(&id).map(|details| {
			(
				String::from_utf8_lossy(&details.name).into_owned(),
				String::from_utf8_lossy(&details.symbol).into_owned(),
				details.decimals,
			)
		})
	}

	/// Balance of `account` in `Assets` asset `id`, `None` if the account does not exist.
	pub fn asset_balance(&self, id: AssetId, account: &AccountId) -> Option<Balance> {
		self.state.lock().assets.get(&id).and_then(|details| details.accounts.get(account).copied())
	}

	pub fn asset_owner(&self, id: AssetId) -> Option<AccountId> {
		self.state.lock().assets.get(&id).map(|details| details.owner)
	}

	/// Registry id of `location`.
	pub fn registered_id(&self, location: &Location) -> Option<AssetId> {
		self.state.lock().location_assets.get(location).copied()
	}

	pub fn registry_decimals(&self, id: AssetId) -> Option<u8> {
		self.state.lock().registry.get(&id).and_then(|entry| entry.decimals)
	}

	/// Free balance of `account` in registry asset `id` (or the native asset).
	pub fn balance(&self, account: &AccountId, id: AssetId) -> Balance {
		balance_of(&self.state.lock(), self.native_asset_id, account, id)
	}

	/// Accept `id` as fee currency outside of any transaction.
	pub fn accept_currency(&self, id: AssetId, price: u128) {
		self.state.lock().accepted_currencies.insert(id, price);
	}

	pub fn accepted_currency(&self, id: AssetId) -> Option<u128> {
		self.state.lock().accepted_currencies.get(&id).copied()
	}

	/// Reserves of the pool between `a` and `b`, in that order.
	pub fn pool(&self, a: AssetId, b: AssetId) -> Option<(Balance, Balance)> {
		let state = self.state.lock();
		state
			.pools
			.get(&(a, b))
			.copied()
			.or_else(|| state.pools.get(&(b, a)).map(|(rb, ra)| (*ra, *rb)))
	}

	pub fn pool_count(&self) -> usize {
		self.state.lock().pools.len()
	}

	/// Outcome of every root batch dispatched from the scheduler agenda.
	pub fn scheduled_results(&self) -> Vec<(BlockNumber, Result<(), String>)> {
		self.state.lock().scheduled_results.clone()
	}

	/// Inbound transfers that could not be credited.
	pub fn undelivered(&self) -> Vec<InboundTransfer> {
		self.state.lock().undelivered.clone()
	}

	/// Let another actor consume `count` identifiers of every counter before the next
	/// submission is applied.
	pub fn steal_ids_before_next_submission(&self, count: u32) {
		self.state.lock().stolen_ids = count;
	}

	/// Report the next submission as not included in time. With `lands` the submission is
	/// still applied in a new block, otherwise it is dropped.
	pub fn time_out_next_submission(&self, lands: bool) {
		self.state.lock().time_out = Some(lands);
	}

	/// Register `location` in the registry outside of any transaction.
	pub fn register_location(&self, location: Location) -> AssetId {
		let mut state = self.state.lock();
		let id = self.registry_id_offset + state.registry_next_id;
		state.registry_next_id += 1;
		let entry = RegistryEntry { location: Some(location.clone()), ..Default::default() };
		state.registry.insert(id, entry);
		state.location_assets.insert(location, id);
		id
	}

	fn build_block(&self, state: &mut State) {
		state.height += 1;
		let height = state.height;

		for batch in state.agenda.remove(&height).unwrap_or_default() {
			let result = batch
				.calls()
				.iter()
				.map(decode_call)
				.collect::<Result<Vec<_>, _>>()
				.and_then(|calls| {
					self.apply(state, Origin::Root, &calls)
						.map(|_| ())
						.map_err(|failure| format!("{}::{}", failure.pallet, failure.error))
				});
			if let Err(err) = &result {
				log::debug!(
					target: "xcm-provisioner::mock",
					"Scheduled batch failed on {}: {err}",
					self.name
				);
			}
			state.scheduled_results.push((height, result));
		}

		if let (Some(para_id), Some(network)) = (self.para_id, &self.network) {
			for transfer in network.take(para_id) {
				self.deliver(state, transfer);
			}
		}
	}

	fn deliver(&self, state: &mut State, transfer: InboundTransfer) {
		let beneficiary = match transfer.beneficiary.interior.last() {
			Some(Junction::AccountId32 { id, .. }) if transfer.beneficiary.parents == 0 => *id,
			_ => {
				state.undelivered.push(transfer);
				return
			},
		};
		let mut credits = Vec::new();
		for asset in &transfer.assets {
			// The fee is paid in the relay native asset, which costs nothing here.
			if asset.id == Location::parent() {
				continue
			}
			let local = asset
				.id
				.reanchored_for_sibling(transfer.origin_para_id)
				.ok()
				.and_then(|location| state.location_assets.get(&location).copied());
			match local {
				Some(id) => credits.push((id, asset.amount())),
				None => {
					state.undelivered.push(transfer.clone());
					return
				},
			}
		}
		for (id, amount) in credits {
			credit(state, self.native_asset_id, beneficiary, id, amount);
		}
	}

	/// Apply `calls` atomically, returning the emitted events.
	fn apply(
		&self,
		state: &mut State,
		origin: Origin,
		calls: &[MockCall],
	) -> Result<Vec<EmittedEvent>, Failure> {
		let mut scratch = state.clone();
		scratch.events.clear();
		for call in calls {
			self.dispatch(&mut scratch, origin, call)?;
		}
		scratch.events.push(event("Utility", "BatchCompleted", []));
		let events = std::mem::take(&mut scratch.events);
		let outbox = std::mem::take(&mut scratch.outbox);
		*state = scratch;
		if let Some(network) = &self.network {
			for (destination, transfer) in outbox {
				network.send(destination, transfer);
			}
		}
		Ok(events)
	}

	fn dispatch(&self, state: &mut State, origin: Origin, call: &MockCall) -> Result<(), Failure> {
		let signed = || match origin {
			Origin::Signed(who) => Ok(who),
			Origin::Root => fail("System", "BadOrigin"),
		};
		let root = || match origin {
			Origin::Root => Ok(()),
			Origin::Signed(_) => fail("System", "BadOrigin"),
		};

		match call.clone() {
			MockCall::AssetsCreate { id, admin, min_balance } => {
				let owner = signed()?;
				if state.assets.contains_key(&id) {
					return fail("Assets", "InUse")
				}
				if let Some(next) = state.next_asset_id {
					if id != next {
						return fail("Assets", "BadAssetId")
					}
					state.next_asset_id = Some(next + 1);
				}
				if min_balance == 0 {
					return fail("Assets", "MinBalanceZero")
				}
				state
					.assets
					.insert(id, AssetDetails { owner, admin, min_balance, ..Default::default() });
				let created = event("Assets", "Created", [("asset_id", Value::u128(id.into()))]);
				state.events.push(created);
			},
			MockCall::AssetsSetMetadata { id, name, symbol, decimals } => {
				let who = signed()?;
				let Some(details) = state.assets.get_mut(&id) else {
					return fail("Assets", "Unknown")
				};
				if details.owner != who {
					return fail("Assets", "NoPermission")
				}
				details.name = name;
				details.symbol = symbol;
				details.decimals = decimals;
			},
			MockCall::AssetsMint { id, beneficiary, amount } => {
				let who = signed()?;
				let Some(details) = state.assets.get_mut(&id) else {
					return fail("Assets", "Unknown")
				};
				if details.admin != who {
					return fail("Assets", "NoPermission")
				}
				let balance = details.accounts.entry(beneficiary).or_default();
				if *balance + amount < details.min_balance {
					return fail("Assets", "BelowMinimum")
				}
				*balance += amount;
				details.supply += amount;
			},
			MockCall::AssetsTouchOther { id, who } => {
				let signer = signed()?;
				let Some(details) = state.assets.get_mut(&id) else {
					return fail("Assets", "Unknown")
				};
				if details.admin != signer {
					return fail("Assets", "NoPermission")
				}
				if details.accounts.contains_key(&who) {
					return fail("Assets", "AlreadyExists")
				}
				details.accounts.insert(who, 0);
			},
			MockCall::RegisterExternal { location } => {
				signed()?;
				if state.location_assets.contains_key(&location) {
					return fail("AssetRegistry", "LocationAlreadyRegistered")
				}
				let id = self.registry_id_offset + state.registry_next_id;
				state.registry_next_id += 1;
				let entry =
					RegistryEntry { location: Some(location.clone()), ..Default::default() };
				state.registry.insert(id, entry);
				state.location_assets.insert(location, id);
				let registered =
					event("AssetRegistry", "Registered", [("asset_id", Value::u128(id.into()))]);
				state.events.push(registered);
			},
			MockCall::Register { asset_id, entry } => {
				root()?;
				let id = match asset_id {
					Some(id) if state.registry.contains_key(&id) => {
						return fail("AssetRegistry", "AssetAlreadyRegistered")
					},
					Some(id) => id,
					None => {
						let id = self.registry_id_offset + state.registry_next_id;
						state.registry_next_id += 1;
						id
					},
				};
				if let Some(location) = &entry.location {
					if state.location_assets.contains_key(location) {
						return fail("AssetRegistry", "LocationAlreadyRegistered")
					}
					state.location_assets.insert(location.clone(), id);
				}
				state.registry.insert(id, entry);
				let registered =
					event("AssetRegistry", "Registered", [("asset_id", Value::u128(id.into()))]);
				state.events.push(registered);
			},
			MockCall::AddCurrency { currency, price } => {
				root()?;
				if state.accepted_currencies.contains_key(&currency) {
					return fail("MultiTransactionPayment", "AlreadyAccepted")
				}
				state.accepted_currencies.insert(currency, price);
			},
			MockCall::SetBalance { who, currency_id, new_free } => {
				root()?;
				if currency_id == self.native_asset_id {
					state.native.insert(who, new_free);
				} else {
					state.tokens.insert((who, currency_id), new_free);
				}
			},
			MockCall::ReserveTransfer { dest, beneficiary, assets, fee_asset_item } => {
				let who = signed()?;
				let (Some(origin_para_id), Some(_)) = (self.para_id, &self.network) else {
					return fail("PolkadotXcm", "Unreachable")
				};
				let destination = match (dest.parents, dest.interior.as_slice()) {
					(1, [Junction::Parachain(para_id)]) => *para_id,
					_ => return fail("PolkadotXcm", "Unreachable"),
				};
				if assets.is_empty() || fee_asset_item as usize >= assets.len() {
					return fail("PolkadotXcm", "Empty")
				}
				let sovereign = sibling_account(destination);
				let mut forwarded = Vec::new();
				for asset in assets {
					if asset.id == Location::parent() {
						forwarded.push(asset);
						continue
					}
					let id = match (asset.id.parents, asset.id.interior.as_slice()) {
						(0, [Junction::PalletInstance(_), Junction::GeneralIndex(index)]) => {
							AssetId::try_from(*index).or_else(|_| {
								fail("PolkadotXcm", "InvalidAssetUnknownReserve")
							})?
						},
						_ => return fail("PolkadotXcm", "InvalidAssetUnknownReserve"),
					};
					let Some(details) = state.assets.get_mut(&id) else {
						return fail("PolkadotXcm", "LocalExecutionIncomplete")
					};
					let available = details.accounts.get(&who).copied().unwrap_or_default();
					if available < asset.amount() {
						return fail("PolkadotXcm", "LocalExecutionIncomplete")
					}
					details.accounts.insert(who, available - asset.amount());
					*details.accounts.entry(sovereign).or_default() += asset.amount();
					forwarded.push(asset);
				}
				state.outbox.push((
					destination,
					InboundTransfer { origin_para_id, beneficiary, assets: forwarded },
				));
				state.events.push(event(
					"PolkadotXcm",
					"Sent",
					[("destination", Value::u128(destination.into()))],
				));
			},
			MockCall::CreatePool { asset_a, amount_a, asset_b, amount_b } => {
				let who = signed()?;
				if asset_a == asset_b {
					return fail("XYK", "CannotCreatePoolWithSameAssets")
				}
				if state.pools.contains_key(&(asset_a, asset_b)) ||
					state.pools.contains_key(&(asset_b, asset_a))
				{
					return fail("XYK", "TokenPoolAlreadyExists")
				}
				if amount_a == 0 || amount_b == 0 {
					return fail("XYK", "InsufficientLiquidity")
				}
				let native = self.native_asset_id;
				if balance_of(state, native, &who, asset_a) < amount_a ||
					balance_of(state, native, &who, asset_b) < amount_b
				{
					return fail("XYK", "InsufficientAssetBalance")
				}
				debit(state, native, who, asset_a, amount_a);
				debit(state, native, who, asset_b, amount_b);
				state.pools.insert((asset_a, asset_b), (amount_a, amount_b));
				state.events.push(event(
					"XYK",
					"PoolCreated",
					[
						("asset_a", Value::u128(asset_a.into())),
						("asset_b", Value::u128(asset_b.into())),
					],
				));
			},
			MockCall::Remark => {},
		}
		Ok(())
	}

	fn decode_batch(&self, call: &BatchedCall) -> Result<Vec<MockCall>, ChainError> {
		call.calls()
			.iter()
			.map(decode_call)
			.collect::<Result<Vec<_>, _>>()
			.map_err(|reason| ChainError::SubmissionRejected { chain: self.name.clone(), reason })
	}

	fn schedule_from_patch(&self, patch: &serde_json::Value) -> Result<(), ChainError> {
		let invalid = || ChainError::UnexpectedValue(format!("unsupported storage patch {patch}"));
		let agenda = patch
			.get("scheduler")
			.and_then(|scheduler| scheduler.get("agenda"))
			.and_then(|agenda| agenda.as_array())
			.ok_or_else(invalid)?;

		let encoded = self.encoded.lock();
		let mut state = self.state.lock();
		for entry in agenda {
			let target = entry
				.pointer("/0/0")
				.and_then(|target| target.as_u64())
				.and_then(|target| BlockNumber::try_from(target).ok())
				.ok_or_else(invalid)?;
			let items = entry.get(1).and_then(|items| items.as_array()).ok_or_else(invalid)?;
			for item in items {
				let origin = item.pointer("/origin/system").and_then(|origin| origin.as_str());
				if origin != Some("Root") {
					return Err(invalid())
				}
				let bytes = item
					.pointer("/call/Inline")
					.and_then(|call| call.as_str())
					.and_then(|call| hex::decode(call.trim_start_matches("0x")).ok())
					.ok_or_else(invalid)?;
				let index = bytes
					.strip_prefix(ENCODED_CALL_PREFIX)
					.and_then(|index| <[u8; 4]>::try_from(index).ok())
					.map(|index| u32::from_le_bytes(index) as usize)
					.ok_or_else(invalid)?;
				let batch = encoded.get(index).cloned().ok_or_else(invalid)?;
				state.agenda.entry(target).or_default().push(batch);
			}
		}
		Ok(())
	}
}

fn balance_of(state: &State, native: AssetId, account: &AccountId, id: AssetId) -> Balance {
	if id == native {
		state.native.get(account).copied().unwrap_or_default()
	} else {
		state.tokens.get(&(*account, id)).copied().unwrap_or_default()
	}
}

fn credit(state: &mut State, native: AssetId, account: AccountId, id: AssetId, amount: Balance) {
	if id == native {
		*state.native.entry(account).or_default() += amount;
	} else {
		*state.tokens.entry((account, id)).or_default() += amount;
	}
}

fn debit(state: &mut State, native: AssetId, account: AccountId, id: AssetId, amount: Balance) {
	let balance = if id == native {
		state.native.entry(account).or_default()
	} else {
		state.tokens.entry((account, id)).or_default()
	};
	*balance = balance.saturating_sub(amount);
}

fn account_info(free: Balance) -> Value {
	Value::named_composite([
		("nonce", Value::u128(0)),
		("consumers", Value::u128(0)),
		("providers", Value::u128(1)),
		("sufficients", Value::u128(0)),
		(
			"data",
			Value::named_composite([
				("free", Value::u128(free)),
				("reserved", Value::u128(0)),
				("frozen", Value::u128(0)),
				("flags", Value::u128(0)),
			]),
		),
	])
}

#[async_trait]
impl Chain for MockChain {
	fn name(&self) -> &str {
		&self.name
	}

	fn allows_root_injection(&self) -> bool {
		self.root_injection
	}

	async fn best_block_number(&self) -> Result<BlockNumber, ChainError> {
		Ok(self.height())
	}

	async fn submit(
		&self,
		call: &BatchedCall,
		signer: &Keypair,
	) -> Result<TransactionOutcome, ChainError> {
		let calls = self.decode_batch(call)?;
		let who = signer.public_key().0;
		let extrinsic_hash =
			H256::from_low_u64_be(self.extrinsics.fetch_add(1, Ordering::SeqCst) + 1);

		let mut state = self.state.lock();
		if state.stolen_ids > 0 {
			let stolen = std::mem::take(&mut state.stolen_ids);
			state.next_asset_id = state.next_asset_id.map(|next| next + stolen);
			state.registry_next_id += stolen;
		}
		if let Some(lands) = state.time_out.take() {
			if lands {
				self.build_block(&mut state);
				if let Err(failure) = self.apply(&mut state, Origin::Signed(who), &calls) {
					log::debug!(
						target: "xcm-provisioner::mock",
						"Late submission {extrinsic_hash:?} on {} failed: {failure:?}",
						self.name
					);
				}
			}
			return Err(ChainError::InclusionTimeout { chain: self.name.clone(), extrinsic_hash })
		}
		self.build_block(&mut state);
		let block_number = state.height;
		let block_hash = H256::from_low_u64_be((1 << 32) | block_number as u64);

		let events = self.apply(&mut state, Origin::Signed(who), &calls).map_err(|failure| {
			ChainError::DispatchFailed {
				chain: self.name.clone(),
				pallet: failure.pallet.into(),
				error: failure.error.into(),
			}
		})?;
		Ok(TransactionOutcome { block_hash, extrinsic_hash, block_number, events })
	}

	async fn fetch(&self, query: &StorageQuery) -> Result<Option<Value>, ChainError> {
		let state = self.state.lock();
		let key = |index: usize| {
			query.keys.get(index).ok_or_else(|| {
				ChainError::UnexpectedValue(format!(
					"{}::{} expects key #{index}",
					query.pallet, query.entry
				))
			})
		};
		Ok(match (query.pallet.as_str(), query.entry.as_str()) {
			("Assets", "NextAssetId") => state.next_asset_id.map(|id| Value::u128(id.into())),
			("Assets", "Asset") => state.assets.get(&value::to_u32(key(0)?)?).map(|details| {
				Value::named_composite([
					("owner", value::account_id(&details.owner)),
					("supply", Value::u128(details.supply)),
					("min_balance", Value::u128(details.min_balance)),
				])
			}),
			("AssetRegistry", "NextAssetId") => Some(Value::u128(state.registry_next_id.into())),
			("AssetRegistry", "LocationAssets") => state
				.location_assets
				.get(&value::to_location(key(0)?)?)
				.map(|id| Value::u128((*id).into())),
			("AssetRegistry", "Assets") => {
				state.registry.get(&value::to_u32(key(0)?)?).map(|entry| {
					let bytes = |bytes: &Option<Vec<u8>>| {
						value::option(bytes.as_ref().map(|bytes| Value::from_bytes(bytes)))
					};
					Value::named_composite([
						("name", bytes(&entry.name)),
						("symbol", bytes(&entry.symbol)),
						("decimals", value::option(entry.decimals.map(|d| Value::u128(d.into())))),
						("existential_deposit", Value::u128(entry.existential_deposit)),
						("is_sufficient", Value::bool(entry.is_sufficient)),
					])
				})
			},
			("Tokens", "Accounts") => {
				let account = value::to_account_id(key(0)?)?;
				state.tokens.get(&(account, value::to_u32(key(1)?)?)).map(|free| {
					Value::named_composite([
						("free", Value::u128(*free)),
						("reserved", Value::u128(0)),
						("frozen", Value::u128(0)),
					])
				})
			},
			("System", "Account") => {
				let account = value::to_account_id(key(0)?)?;
				state.native.get(&account).map(|free| account_info(*free))
			},
			(pallet, entry) => {
				return Err(ChainError::UnexpectedValue(format!(
					"storage {pallet}::{entry} is not simulated"
				)))
			},
		})
	}

	fn encode_call(&self, call: &BatchedCall) -> Result<Vec<u8>, ChainError> {
		self.decode_batch(call)?;
		let mut encoded = self.encoded.lock();
		let index = encoded.len() as u32;
		encoded.push(call.clone());
		Ok([ENCODED_CALL_PREFIX, &index.to_le_bytes()[..]].concat())
	}

	async fn control(&self, command: ControlCommand) -> Result<(), ChainError> {
		match command {
			ControlCommand::NewBlock { count } => {
				let mut state = self.state.lock();
				for _ in 0..count {
					self.build_block(&mut state);
				}
			},
			ControlCommand::SetBlockBuildMode(mode) => self.state.lock().build_mode = Some(mode),
			ControlCommand::SetStorage(patch) => self.schedule_from_patch(&patch)?,
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::keyring::{account_of, alice};
	use assert_matches::assert_matches;
	use pretty_assertions::assert_eq;
	use xcm_provisioner_client::{compose, value::XcmVersion, RootScheduler};

	fn create(id: AssetId, admin: &AccountId) -> Call {
		Call::new(
			"Assets",
			"create",
			[
				("id", Value::u128(id.into())),
				("admin", value::multi_address(admin)),
				("min_balance", Value::u128(1)),
			],
		)
	}

	fn mint(id: AssetId, beneficiary: &AccountId, amount: Balance) -> Call {
		Call::new(
			"Assets",
			"mint",
			[
				("id", Value::u128(id.into())),
				("beneficiary", value::multi_address(beneficiary)),
				("amount", Value::u128(amount)),
			],
		)
	}

	#[tokio::test]
	async fn failed_batch_leaves_no_trace() {
		let chain = MockChain::new("origin").with_next_asset_id(Some(5)).build();
		let signer = alice();
		let who = account_of(&signer);

		let result = chain.submit(&compose([create(5, &who), create(7, &who)]), &signer).await;
		assert_matches!(
			result,
			Err(ChainError::DispatchFailed { pallet, error, .. })
				if pallet == "Assets" && error == "BadAssetId"
		);
		assert_eq!(chain.next_asset_id(), Some(5));
		assert_eq!(chain.asset_owner(5), None);
		assert_eq!(chain.height(), 1);

		chain.submit(&compose([create(5, &who), mint(5, &who, 10)]), &signer).await.unwrap();
		assert_eq!(chain.next_asset_id(), Some(6));
		assert_eq!(chain.asset_balance(5, &who), Some(10));
	}

	#[tokio::test]
	async fn timed_out_submission_may_still_land() {
		let chain = MockChain::new("origin").with_next_asset_id(Some(5)).build();
		let signer = alice();
		let who = account_of(&signer);

		chain.time_out_next_submission(false);
		assert_matches!(
			chain.submit(&compose([create(5, &who)]), &signer).await,
			Err(ChainError::InclusionTimeout { .. })
		);
		assert_eq!((chain.height(), chain.asset_owner(5)), (0, None));

		chain.time_out_next_submission(true);
		assert_matches!(
			chain.submit(&compose([create(5, &who)]), &signer).await,
			Err(ChainError::InclusionTimeout { .. })
		);
		assert_eq!((chain.height(), chain.asset_owner(5)), (1, Some(who)));

		chain.submit(&compose([mint(5, &who, 10)]), &signer).await.unwrap();
		assert_eq!(chain.asset_balance(5, &who), Some(10));
	}

	#[tokio::test]
	async fn malformed_call_is_rejected_before_inclusion() {
		let chain = MockChain::new("origin").build();
		let call = Call::new("Assets", "create", [("id", Value::u128(1))]);
		assert_matches!(
			chain.submit(&call.into(), &alice()).await,
			Err(ChainError::SubmissionRejected { .. })
		);
		assert_eq!(chain.height(), 0);
	}

	#[tokio::test]
	async fn reserve_transfer_credits_registered_location() {
		let network = MockNetwork::new();
		let origin = MockChain::new("origin").with_para_id(1000, &network).build();
		let destination = MockChain::new("destination").with_para_id(2034, &network).build();
		let signer = alice();
		let who = account_of(&signer);

		origin.submit(&compose([create(1, &who), mint(1, &who, 100)]), &signer).await.unwrap();
		let id = destination.register_location(Location::sibling_asset(1000, 50, 1));

		let transfer = Call::new(
			"PolkadotXcm",
			"limited_reserve_transfer_assets",
			[
				("dest", value::versioned_location(&Location::sibling(2034), XcmVersion::V4)),
				(
					"beneficiary",
					value::versioned_location(&Location::account_id32(None, who), XcmVersion::V4),
				),
				(
					"assets",
					value::versioned_assets(
						&[Asset::fungible(Location::local_asset(50, 1), 40)],
						XcmVersion::V4,
					),
				),
				("fee_asset_item", Value::u128(0)),
				("weight_limit", Value::unnamed_variant("Unlimited", [])),
			],
		);
		origin.submit(&transfer.into(), &signer).await.unwrap();
		assert_eq!(origin.asset_balance(1, &who), Some(60));
		assert_eq!(origin.asset_balance(1, &sibling_account(2034)), Some(40));
		assert_eq!(network.pending(2034), 1);

		destination.control(ControlCommand::NewBlock { count: 1 }).await.unwrap();
		assert_eq!(network.pending(2034), 0);
		assert_eq!(destination.balance(&who, id), 40);
		assert!(destination.undelivered().is_empty());
	}

	#[tokio::test]
	async fn root_batches_run_from_the_agenda() {
		let chain = MockChain::new("destination").with_root_injection().with_height(10).build();
		let who = account_of(&alice());
		let set_balance = Call::new(
			"Tokens",
			"set_balance",
			[
				("who", value::multi_address(&who)),
				("currency_id", Value::u128(9999)),
				("new_free", Value::u128(500)),
				("new_reserved", Value::u128(0)),
			],
		);

		let scheduler = RootScheduler::new(chain.clone()).unwrap();
		let target = scheduler.schedule(&set_balance.clone().into()).await.unwrap();
		assert_eq!(target, 11);
		assert_eq!(chain.scheduled_results(), vec![(11, Ok(()))]);
		assert_eq!(chain.balance(&who, 9999), 500);

		assert_matches!(
			chain.submit(&set_balance.into(), &alice()).await,
			Err(ChainError::DispatchFailed { error, .. }) if error == "BadOrigin"
		);
	}
}

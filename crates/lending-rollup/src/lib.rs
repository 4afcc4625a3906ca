//! # lending-rollup
//!
//! lending pool whose per-user balances live off-chain in two sparse merkle
//! maps. the shared ledger only stores the committed roots of both maps and
//! the pool's event log.
//!
//! ## flow
//!
//! ```text
//!   client                    witness service              ledger
//!     │ get_committed_witness ──────▶│                         │
//!     │◀──── proof (record, path) ───│                         │
//!     │ sign intent                  │                         │
//!     │ add_liquidity / borrow ──────┼──── verify vs root ────▶│
//!     │                              │◀─── apply_delta ────────│ events
//!     │                              │                         │
//!   operator: rollup_liquidity ──────┼──── working roots ─────▶│ commit
//! ```
//!
//! - a transition is checked against the root the ledger holds when it runs,
//!   never the one the client saw
//! - accepted deltas accumulate in the working maps until a rollup folds
//!   them into the committed maps
//! - every intent carries a per-map sequence, so a replayed submission is
//!   rejected
//!
//! ## usage
//!
//! ```rust,ignore
//! use lending_rollup::*;
//!
//! let config = PoolConfig::new(Account::derive(b"pool"), TokenId::derive("USD"));
//! let mut pool = LiquidityPool::new(config, InMemoryLedger::new(), tokens)?;
//! let mut service = WitnessService::new();
//! pool.deploy(&service)?;
//!
//! let proof = service.get_committed_witness(MapKind::Liquidity, &identity)?;
//! let signed = intent.sign(&signing_key);
//! pool.add_liquidity(&mut service, &signed, &proof)?;
//! pool.rollup_liquidity(&mut service)?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod intent;
pub mod ledger;
pub mod pool;
pub mod runtime;
pub mod service;
pub mod token;
pub mod types;

pub use config::{ConfigError, PoolConfig};
pub use error::{PoolError, Result, SignatureFault};
pub use events::{EncodedEvent, EventKind, EventLog, PoolEvent};
pub use intent::{Action, Intent, SignedIntent};
pub use ledger::{InMemoryLedger, LedgerError, SharedLedger, TransitionBundle};
pub use pool::{LiquidityPool, PoolStatus, TransitionReceipt};
pub use runtime::PoolRuntime;
pub use service::{identity_index, WitnessService, LEDGER_HEIGHT};
pub use token::{TokenLedger, TokenTransfer, TransferError};
pub use types::{Account, Identity, MapKind, MembershipProof, Record, StateCommitment, TokenId};

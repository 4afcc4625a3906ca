//! liquidity pool transitions
//!
//! every transition follows the same shape:
//!
//! 1. check the intent (action, amount, token, counterparty, signature,
//!    sequence)
//! 2. check the caller's witnesses against the commitment the ledger holds
//!    *now*, not the one the caller saw when fetching them
//! 3. check pool policy (collateral, reserve, back-pressure)
//! 4. move tokens through the collaborator
//! 5. submit the bundle to the ledger
//! 6. apply the delta to the witness service
//!
//! nothing is mutated before step 4, so a rejected transfer leaves no trace.
//! a ledger rejection in step 5 is compensated by reversing the transfer.

use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result, SignatureFault};
use crate::events::PoolEvent;
use crate::intent::{Action, SignedIntent};
use crate::ledger::{SharedLedger, TransitionBundle};
use crate::service::WitnessService;
use crate::token::TokenTransfer;
use crate::types::{Account, MapKind, MembershipProof, Record, StateCommitment};

/// lifecycle of a pool account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PoolStatus {
    #[default]
    Uninitialized,
    Active,
}

/// outcome of an accepted transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionReceipt {
    /// record written to the working map
    pub record: Record,
    /// sequence indices the ledger assigned to the emitted events
    pub event_indices: Vec<u64>,
}

/// validated request, ready to execute
struct Prepared {
    index: u64,
    map: MapKind,
    current: Record,
    committed: StateCommitment,
}

pub struct LiquidityPool<L, T> {
    config: PoolConfig,
    status: PoolStatus,
    /// tokens held by the pool, tracked outside the merkle maps
    reserve: u64,
    ledger: L,
    tokens: T,
}

impl<L: SharedLedger, T: TokenTransfer> LiquidityPool<L, T> {
    pub fn new(config: PoolConfig, ledger: L, tokens: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            status: PoolStatus::Uninitialized,
            reserve: 0,
            ledger,
            tokens,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn account(&self) -> Account {
        self.config.account
    }

    pub fn status(&self) -> PoolStatus {
        self.status
    }

    pub fn reserve(&self) -> u64 {
        self.reserve
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    /// commitment the ledger currently holds for this pool
    pub fn committed(&self) -> Result<StateCommitment> {
        self.ensure_active()?;
        Ok(self.ledger.committed(&self.config.account)?)
    }

    /// Uninitialized -> Active. publishes the service's committed roots as
    /// genesis.
    pub fn deploy(&mut self, service: &WitnessService) -> Result<StateCommitment> {
        if self.status == PoolStatus::Active {
            return Err(PoolError::AlreadyDeployed);
        }
        let genesis = service.committed_commitment();
        self.ledger.deploy(self.config.account, genesis)?;
        self.status = PoolStatus::Active;
        info!(account = %self.config.account, root = %genesis, "pool deployed");
        Ok(genesis)
    }

    /// deposit `intent.amount` tokens and credit the subject's liquidity leaf
    pub fn add_liquidity(
        &mut self,
        service: &mut WitnessService,
        signed: &SignedIntent,
        proof: &MembershipProof,
    ) -> Result<TransitionReceipt> {
        let prepared = self.prepare(service, signed, Action::AddLiquidity)?;
        self.check_proof(service, &prepared, MapKind::Liquidity, proof)?;
        self.check_back_pressure(service, &prepared)?;

        let intent = &signed.intent;
        let new_amount = prepared
            .current
            .amount
            .checked_add(intent.amount)
            .ok_or(PoolError::Overflow)?;
        let reserve = self.reserve.checked_add(intent.amount).ok_or(PoolError::Overflow)?;
        let record = Record::new(new_amount, intent.sequence);

        let from = intent.subject.account();
        let pool = self.config.account;
        let events = vec![
            self.transfer_event(from, pool, intent.amount),
            PoolEvent::LiquidityAdd {
                identity: intent.subject,
                amount: intent.amount,
                new_total: new_amount,
            },
        ];

        let event_indices = self.execute(&prepared, from, pool, intent.amount, events)?;
        self.commit_delta(service, signed, &prepared, record)?;
        self.reserve = reserve;

        debug!(
            identity = %intent.subject,
            amount = intent.amount,
            total = new_amount,
            "liquidity added"
        );
        Ok(TransitionReceipt { record, event_indices })
    }

    /// withdraw liquidity not locked as collateral
    pub fn remove_liquidity(
        &mut self,
        service: &mut WitnessService,
        signed: &SignedIntent,
        proof: &MembershipProof,
    ) -> Result<TransitionReceipt> {
        let prepared = self.prepare(service, signed, Action::RemoveLiquidity)?;
        self.check_proof(service, &prepared, MapKind::Liquidity, proof)?;

        let intent = &signed.intent;
        if intent.amount > prepared.current.amount {
            return Err(PoolError::ExceedsRecord {
                requested: intent.amount,
                available: prepared.current.amount,
            });
        }

        let debt = service.current_record(MapKind::Borrows, prepared.index)?;
        let locked = self.config.required_collateral(debt.amount);
        let collateral = self.collateral(service, &prepared, &proof.record)?;
        let free = collateral.saturating_sub(locked);
        if intent.amount > free {
            return Err(PoolError::InsufficientCollateral {
                required: locked.saturating_add(intent.amount),
                available: collateral,
            });
        }
        self.check_reserve(intent.amount)?;
        self.check_back_pressure(service, &prepared)?;

        let new_amount = prepared.current.amount - intent.amount;
        let record = Record::new(new_amount, intent.sequence);

        let pool = self.config.account;
        let to = intent.subject.account();
        let events = vec![
            self.transfer_event(pool, to, intent.amount),
            PoolEvent::LiquidityRemove {
                identity: intent.subject,
                amount: intent.amount,
                new_total: new_amount,
            },
        ];

        let event_indices = self.execute(&prepared, pool, to, intent.amount, events)?;
        self.commit_delta(service, signed, &prepared, record)?;
        self.reserve -= intent.amount;

        debug!(
            identity = %intent.subject,
            amount = intent.amount,
            total = new_amount,
            "liquidity removed"
        );
        Ok(TransitionReceipt { record, event_indices })
    }

    /// lend `intent.amount` tokens to `intent.counterparty` against the
    /// subject's committed liquidity
    pub fn borrow(
        &mut self,
        service: &mut WitnessService,
        signed: &SignedIntent,
        liquidity: &MembershipProof,
        debt: &MembershipProof,
    ) -> Result<TransitionReceipt> {
        let prepared = self.prepare(service, signed, Action::Borrow)?;
        if signed.intent.token.is_none() {
            return Err(SignatureFault::WrongToken.into());
        }
        self.check_proof(service, &prepared, MapKind::Liquidity, liquidity)?;
        self.check_proof(service, &prepared, MapKind::Borrows, debt)?;

        let intent = &signed.intent;
        let new_debt = prepared
            .current
            .amount
            .checked_add(intent.amount)
            .ok_or(PoolError::Overflow)?;
        let required = self.config.required_collateral(new_debt);
        let available = self.collateral(service, &prepared, &liquidity.record)?;
        if required > available {
            return Err(PoolError::InsufficientCollateral { required, available });
        }
        self.check_reserve(intent.amount)?;
        self.check_back_pressure(service, &prepared)?;

        let record = Record::new(new_debt, intent.sequence);
        let pool = self.config.account;
        let recipient = intent.counterparty;
        let events = vec![
            self.transfer_event(pool, recipient, intent.amount),
            PoolEvent::Borrow {
                identity: intent.subject,
                amount: intent.amount,
            },
        ];

        let event_indices = self.execute(&prepared, pool, recipient, intent.amount, events)?;
        self.commit_delta(service, signed, &prepared, record)?;
        self.reserve -= intent.amount;

        debug!(
            identity = %intent.subject,
            %recipient,
            amount = intent.amount,
            debt = new_debt,
            "borrowed"
        );
        Ok(TransitionReceipt { record, event_indices })
    }

    /// pay back up to the outstanding debt
    pub fn repay(
        &mut self,
        service: &mut WitnessService,
        signed: &SignedIntent,
        debt: &MembershipProof,
    ) -> Result<TransitionReceipt> {
        let prepared = self.prepare(service, signed, Action::Repay)?;
        self.check_proof(service, &prepared, MapKind::Borrows, debt)?;

        let intent = &signed.intent;
        if intent.amount > prepared.current.amount {
            return Err(PoolError::ExceedsRecord {
                requested: intent.amount,
                available: prepared.current.amount,
            });
        }
        let reserve = self.reserve.checked_add(intent.amount).ok_or(PoolError::Overflow)?;
        self.check_back_pressure(service, &prepared)?;

        let remaining = prepared.current.amount - intent.amount;
        let record = Record::new(remaining, intent.sequence);

        let from = intent.subject.account();
        let pool = self.config.account;
        let events = vec![
            self.transfer_event(from, pool, intent.amount),
            PoolEvent::Repay {
                identity: intent.subject,
                amount: intent.amount,
                remaining,
            },
        ];

        let event_indices = self.execute(&prepared, from, pool, intent.amount, events)?;
        self.commit_delta(service, signed, &prepared, record)?;
        self.reserve = reserve;

        debug!(identity = %intent.subject, amount = intent.amount, remaining, "repaid");
        Ok(TransitionReceipt { record, event_indices })
    }

    /// publish the working roots as the new committed state
    ///
    /// idempotent: with nothing pending no bundle is submitted and the
    /// current commitment is returned.
    pub fn rollup_liquidity(&mut self, service: &mut WitnessService) -> Result<StateCommitment> {
        let committed = self.committed()?;
        if !service.has_pending() {
            return Ok(committed);
        }
        self.check_mirror(service, &committed)?;

        let commitment = service.working_commitment();
        let pending = service.pending_len();
        self.ledger.submit(TransitionBundle {
            account: self.config.account,
            precondition: committed,
            commitment,
            events: Vec::new(),
        })?;

        let folded = service.rollup()?;
        debug_assert_eq!(folded, commitment);

        info!(pending, from = %committed, to = %commitment, "liquidity rolled up");
        Ok(commitment)
    }

    fn ensure_active(&self) -> Result<()> {
        match self.status {
            PoolStatus::Active => Ok(()),
            PoolStatus::Uninitialized => Err(PoolError::NotDeployed),
        }
    }

    /// intent-level checks shared by every transition
    fn prepare(
        &self,
        service: &WitnessService,
        signed: &SignedIntent,
        action: Action,
    ) -> Result<Prepared> {
        self.ensure_active()?;
        let intent = &signed.intent;

        if intent.action != action {
            return Err(SignatureFault::WrongAction {
                expected: action.tag(),
                got: intent.action.tag(),
            }
            .into());
        }
        if intent.amount == 0 {
            return Err(PoolError::InvalidAmount);
        }
        if let Some(token) = &intent.token {
            if token != &self.config.token_id {
                return Err(SignatureFault::WrongToken.into());
            }
        }
        // borrowed funds leave the pool, everything else is paid to or from it
        let to_pool = intent.counterparty == self.config.account;
        if to_pool == (action == Action::Borrow) {
            return Err(SignatureFault::WrongCounterparty.into());
        }
        signed.verify_signature().map_err(|fault| {
            warn!(identity = %intent.subject, action = action.tag(), %fault, "rejected intent");
            PoolError::from(fault)
        })?;

        let map = action.map();
        let index = service.resolve(&intent.subject)?;
        let current = service.current_record(map, index)?;
        let expected = current.next_sequence();
        if intent.sequence != expected {
            warn!(identity = %intent.subject, expected, got = intent.sequence, "replayed intent");
            return Err(SignatureFault::Replayed {
                expected,
                got: intent.sequence,
            }
            .into());
        }

        let committed = self.ledger.committed(&self.config.account)?;
        Ok(Prepared {
            index,
            map,
            current,
            committed,
        })
    }

    /// the proof must authenticate the service's committed record under the
    /// root the ledger holds right now
    fn check_proof(
        &self,
        service: &WitnessService,
        prepared: &Prepared,
        map: MapKind,
        proof: &MembershipProof,
    ) -> Result<()> {
        let root = prepared.committed.root(map);
        let mirrored = service.committed_record(map, prepared.index)?;
        if !proof.verify(prepared.index, root) || proof.record != mirrored {
            warn!(index = prepared.index, %map, "witness mismatch");
            return Err(PoolError::WitnessMismatch { map });
        }
        Ok(())
    }

    /// the service's committed trees must match the ledger before their
    /// working roots can be published
    fn check_mirror(&self, service: &WitnessService, committed: &StateCommitment) -> Result<()> {
        let mirrored = service.committed_commitment();
        for map in [MapKind::Liquidity, MapKind::Borrows] {
            if mirrored.root(map) != committed.root(map) {
                warn!(%map, "witness service diverged from ledger");
                return Err(PoolError::WitnessMismatch { map });
            }
        }
        Ok(())
    }

    /// liquidity usable as collateral: the committed contribution, reduced
    /// by any pending withdrawal
    fn collateral(
        &self,
        service: &WitnessService,
        prepared: &Prepared,
        committed: &Record,
    ) -> Result<u64> {
        let current = service.current_record(MapKind::Liquidity, prepared.index)?;
        Ok(committed.amount.min(current.amount))
    }

    fn check_reserve(&self, amount: u64) -> Result<()> {
        if amount > self.reserve {
            return Err(PoolError::InsufficientReserve {
                requested: amount,
                reserve: self.reserve,
            });
        }
        Ok(())
    }

    fn check_back_pressure(&self, service: &WitnessService, prepared: &Prepared) -> Result<()> {
        if let Some(max) = self.config.max_pending {
            let new_leaf = !service.is_pending(prepared.map, prepared.index);
            if new_leaf && service.pending_len() >= max {
                return Err(PoolError::StaleState {
                    index: prepared.index,
                });
            }
        }
        Ok(())
    }

    fn transfer_event(&self, from: Account, to: Account, amount: u64) -> PoolEvent {
        PoolEvent::TokenTransfer {
            from,
            to,
            amount,
            token: self.config.token_id,
        }
    }

    /// move tokens and submit the bundle. leaf roots are unchanged by
    /// balance transitions, only a rollup moves them.
    fn execute(
        &mut self,
        prepared: &Prepared,
        from: Account,
        to: Account,
        amount: u64,
        events: Vec<PoolEvent>,
    ) -> Result<Vec<u64>> {
        let token = self.config.token_id;
        self.tokens.transfer(&from, &to, amount, &token)?;

        let bundle = TransitionBundle {
            account: self.config.account,
            precondition: prepared.committed,
            commitment: prepared.committed,
            events,
        };
        match self.ledger.submit(bundle) {
            Ok(indices) => Ok(indices),
            Err(err) => {
                if let Err(refund) = self.tokens.transfer(&to, &from, amount, &token) {
                    warn!(%from, %to, amount, %refund, "failed to reverse transfer");
                }
                Err(err.into())
            }
        }
    }

    fn commit_delta(
        &self,
        service: &mut WitnessService,
        signed: &SignedIntent,
        prepared: &Prepared,
        record: Record,
    ) -> Result<()> {
        service.init_user(&signed.intent.subject)?;
        service.apply_delta(prepared.map, prepared.index, record.pack())
    }
}

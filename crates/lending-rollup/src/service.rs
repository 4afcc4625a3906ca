//! witness service
//!
//! off-chain mirror of the pool's committed balances. each logical map is
//! kept twice: the `committed` tree matches the root recorded on the ledger,
//! the `working` tree additionally holds every delta accepted since the last
//! rollup. the dirty set remembers which leaves differ between the two.
//!
//! ```text
//!   transition ──apply_delta──▶ working + pending
//!   rollup     ──fold pending──▶ committed == working
//! ```

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};
use witness_merkle::{LeafValue, MerkleMap, Witness};

use crate::error::{PoolError, Result};
use crate::types::{Identity, MapKind, MembershipProof, Record, StateCommitment};

/// height shared by every balance map
pub const LEDGER_HEIGHT: usize = 64;

/// domain separator for identity -> leaf index hashing
pub const IDENTITY_DOMAIN: &[u8] = b"lending-rollup.identity.v1";

pub type LedgerMap = MerkleMap<LEDGER_HEIGHT>;

/// leaf index for an identity
pub fn identity_index(identity: &Identity) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(IDENTITY_DOMAIN);
    hasher.update(&identity.0);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    let mask = 1u64
        .checked_shl(LEDGER_HEIGHT as u32)
        .map_or(u64::MAX, |bound| bound - 1);
    u64::from_le_bytes(bytes) & mask
}

#[derive(Clone, Debug, Default)]
struct BalanceMap {
    committed: LedgerMap,
    working: LedgerMap,
    /// index -> accumulated value since the last rollup
    pending: BTreeMap<u64, LeafValue>,
}

impl BalanceMap {
    fn apply(&mut self, index: u64, value: LeafValue) -> Result<()> {
        self.working.set_leaf(index, value)?;
        self.pending.insert(index, value);
        Ok(())
    }

    fn fold(&mut self) -> Result<()> {
        for (index, value) in std::mem::take(&mut self.pending) {
            self.committed.set_leaf(index, value)?;
        }
        debug_assert_eq!(self.committed.root(), self.working.root());
        Ok(())
    }
}

/// authoritative off-chain state for one pool deployment
#[derive(Clone, Debug, Default)]
pub struct WitnessService {
    /// leaf index -> identity that owns it
    registry: HashMap<u64, Identity>,
    liquidity: BalanceMap,
    borrows: BalanceMap,
}

impl WitnessService {
    pub fn new() -> Self {
        Self::default()
    }

    /// assign `identity` its leaf index, no-op if already registered
    pub fn init_user(&mut self, identity: &Identity) -> Result<u64> {
        let index = self.resolve(identity)?;
        if self.registry.insert(index, *identity).is_none() {
            debug!(%identity, index, "registered identity");
        }
        Ok(index)
    }

    /// leaf index for `identity` without registering it
    ///
    /// fails if the index already belongs to a different identity.
    pub fn resolve(&self, identity: &Identity) -> Result<u64> {
        let index = identity_index(identity);
        match self.registry.get(&index) {
            Some(owner) if owner != identity => Err(PoolError::IndexCollision { index }),
            _ => Ok(index),
        }
    }

    pub fn is_registered(&self, identity: &Identity) -> bool {
        self.registry.get(&identity_index(identity)) == Some(identity)
    }

    pub fn user_count(&self) -> usize {
        self.registry.len()
    }

    /// witness against the working root, including pending deltas
    pub fn get_witness(&self, map: MapKind, identity: &Identity) -> Result<(Witness, Record)> {
        let index = self.resolve(identity)?;
        let balances = self.map(map);
        let witness = balances.working.witness_for(index)?;
        let record = Record::unpack(balances.working.get(index)?);
        Ok((witness, record))
    }

    /// witness against the last committed root
    ///
    /// fails with `StaleState` when the identity has a pending delta in
    /// `map`, since the committed record no longer reflects its balance.
    pub fn get_committed_witness(
        &self,
        map: MapKind,
        identity: &Identity,
    ) -> Result<MembershipProof> {
        let index = self.resolve(identity)?;
        let balances = self.map(map);
        if balances.pending.contains_key(&index) {
            return Err(PoolError::StaleState { index });
        }
        let witness = balances.committed.witness_for(index)?;
        let record = Record::unpack(balances.committed.get(index)?);
        Ok(MembershipProof::new(witness, record))
    }

    /// committed borrow proof plus the record a borrow of `amount` would
    /// produce. reads only.
    pub fn record_borrow(
        &self,
        identity: &Identity,
        amount: u64,
    ) -> Result<(MembershipProof, Record)> {
        let proof = self.get_committed_witness(MapKind::Borrows, identity)?;
        let current = proof.record;
        let projected = Record::new(
            current.amount.checked_add(amount).ok_or(PoolError::Overflow)?,
            current.next_sequence(),
        );
        Ok((proof, projected))
    }

    pub fn committed_record(&self, map: MapKind, index: u64) -> Result<Record> {
        Ok(Record::unpack(self.map(map).committed.get(index)?))
    }

    /// record including pending deltas
    pub fn current_record(&self, map: MapKind, index: u64) -> Result<Record> {
        Ok(Record::unpack(self.map(map).working.get(index)?))
    }

    /// overwrite the working leaf and mark it dirty. only validated
    /// transitions call this.
    pub(crate) fn apply_delta(&mut self, map: MapKind, index: u64, value: LeafValue) -> Result<()> {
        self.map_mut(map).apply(index, value)
    }

    pub fn committed_commitment(&self) -> StateCommitment {
        StateCommitment {
            liquidity: self.liquidity.committed.root(),
            borrows: self.borrows.committed.root(),
        }
    }

    /// commitment the next rollup would publish
    pub fn working_commitment(&self) -> StateCommitment {
        StateCommitment {
            liquidity: self.liquidity.working.root(),
            borrows: self.borrows.working.root(),
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.liquidity.pending.is_empty() || !self.borrows.pending.is_empty()
    }

    /// dirty leaves across both maps
    pub fn pending_len(&self) -> usize {
        self.liquidity.pending.len() + self.borrows.pending.len()
    }

    pub fn is_pending(&self, map: MapKind, index: u64) -> bool {
        self.map(map).pending.contains_key(&index)
    }

    pub fn pending_indices(&self, map: MapKind) -> Vec<u64> {
        self.map(map).pending.keys().copied().collect()
    }

    /// fold every dirty leaf into the committed trees
    ///
    /// returns the new committed commitment, unchanged when nothing is
    /// pending.
    pub fn rollup(&mut self) -> Result<StateCommitment> {
        if !self.has_pending() {
            return Ok(self.committed_commitment());
        }

        let folded = self.pending_len();
        self.liquidity.fold()?;
        self.borrows.fold()?;

        let commitment = self.committed_commitment();
        info!(folded, root = %commitment, "rolled up pending deltas");
        Ok(commitment)
    }

    fn map(&self, map: MapKind) -> &BalanceMap {
        match map {
            MapKind::Liquidity => &self.liquidity,
            MapKind::Borrows => &self.borrows,
        }
    }

    fn map_mut(&mut self, map: MapKind) -> &mut BalanceMap {
        match map {
            MapKind::Liquidity => &mut self.liquidity,
            MapKind::Borrows => &mut self.borrows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use witness_merkle::empty_root;

    fn alice() -> Identity {
        Identity([0xa1; 32])
    }

    fn bob() -> Identity {
        Identity([0xb0; 32])
    }

    #[test]
    fn test_fresh_service_commits_empty_roots() {
        let service = WitnessService::new();
        let empty = empty_root::<LEDGER_HEIGHT>();
        assert_eq!(service.committed_commitment().liquidity, empty);
        assert_eq!(service.committed_commitment().borrows, empty);
        assert_eq!(service.working_commitment(), service.committed_commitment());
    }

    #[test]
    fn test_init_user_is_idempotent() {
        let mut service = WitnessService::new();
        let index = service.init_user(&alice()).unwrap();
        service.apply_delta(MapKind::Liquidity, index, Record::new(50, 1).pack()).unwrap();

        assert_eq!(service.init_user(&alice()).unwrap(), index);
        assert_eq!(service.current_record(MapKind::Liquidity, index).unwrap(), Record::new(50, 1));
        assert_eq!(service.user_count(), 1);
        assert!(service.is_registered(&alice()));
        assert!(!service.is_registered(&bob()));
    }

    #[test]
    fn test_committed_witness_blocked_by_pending_delta() {
        let mut service = WitnessService::new();
        let index = service.init_user(&alice()).unwrap();
        service.apply_delta(MapKind::Liquidity, index, Record::new(10, 1).pack()).unwrap();

        assert!(matches!(
            service.get_committed_witness(MapKind::Liquidity, &alice()),
            Err(PoolError::StaleState { index: i }) if i == index
        ));
        // other map and other users are unaffected
        assert!(service.get_committed_witness(MapKind::Borrows, &alice()).is_ok());
        assert!(service.get_committed_witness(MapKind::Liquidity, &bob()).is_ok());

        // the working witness already reflects the delta
        let (witness, record) = service.get_witness(MapKind::Liquidity, &alice()).unwrap();
        assert_eq!(record, Record::new(10, 1));
        assert!(witness.verify(index, record.pack(), &service.working_commitment().liquidity));
    }

    #[test]
    fn test_rollup_folds_and_is_idempotent() {
        let mut service = WitnessService::new();
        let a = service.init_user(&alice()).unwrap();
        let b = service.init_user(&bob()).unwrap();
        service.apply_delta(MapKind::Liquidity, a, Record::new(10, 1).pack()).unwrap();
        service.apply_delta(MapKind::Borrows, b, Record::new(4, 1).pack()).unwrap();
        let expected = service.working_commitment();

        let first = service.rollup().unwrap();
        assert_eq!(first, expected);
        assert!(!service.has_pending());

        let second = service.rollup().unwrap();
        assert_eq!(first, second);

        let proof = service.get_committed_witness(MapKind::Borrows, &bob()).unwrap();
        assert_eq!(proof.record, Record::new(4, 1));
        assert!(proof.verify(b, &first.borrows));
    }

    #[test]
    fn test_pending_deltas_accumulate_per_index() {
        let mut service = WitnessService::new();
        let a = service.init_user(&alice()).unwrap();
        service.apply_delta(MapKind::Liquidity, a, Record::new(10_000, 1).pack()).unwrap();
        service.apply_delta(MapKind::Liquidity, a, Record::new(13_000, 2).pack()).unwrap();

        assert_eq!(service.pending_len(), 1);
        assert_eq!(service.pending_indices(MapKind::Liquidity), vec![a]);
        service.rollup().unwrap();
        assert_eq!(service.committed_record(MapKind::Liquidity, a).unwrap(), Record::new(13_000, 2));
    }

    #[test]
    fn test_record_borrow_projects_without_mutating() {
        let service = WitnessService::new();
        let (proof, projected) = service.record_borrow(&alice(), 700).unwrap();
        assert_eq!(proof.record, Record::ZERO);
        assert_eq!(projected, Record::new(700, 1));
        assert!(!service.has_pending());
    }

    #[test]
    fn test_index_collision_detected() {
        let mut service = WitnessService::new();
        let index = service.init_user(&alice()).unwrap();
        // plant a foreign owner on bob's slot to simulate a hash collision
        service.registry.insert(identity_index(&bob()), Identity([0xff; 32]));

        let err = service.init_user(&bob()).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(service.resolve(&alice()).unwrap(), index);
    }
}

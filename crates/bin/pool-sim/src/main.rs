use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ed25519_dalek::SigningKey;
use lending_rollup::{
    Account, Action, Identity, InMemoryLedger, Intent, LiquidityPool, MapKind, PoolConfig,
    PoolError, SharedLedger, SignedIntent, TokenId, TokenLedger, WitnessService,
};
use lending_rollup::service::LedgerMap;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{info, warn};
use witness_merkle::{Hash, LeafValue, Witness};

type Pool = LiquidityPool<InMemoryLedger, TokenLedger>;

#[derive(Parser, Debug)]
#[command(name = "pool-sim")]
#[command(about = "scripted lending pool session against an in-memory ledger", long_about = None)]
struct Args {
    /// pool config (json). flags below are ignored when set
    #[arg(long, env = "POOL_SIM_CONFIG")]
    config: Option<PathBuf>,

    /// number of simulated users
    #[arg(long, default_value_t = 4)]
    users: usize,

    /// liquidity each user deposits
    #[arg(long, default_value_t = 10_000)]
    deposit: u64,

    /// amount each user borrows after the first rollup
    #[arg(long, default_value_t = 5_000)]
    borrow: u64,

    /// collateral ratio in basis points
    #[arg(long, default_value_t = 10_000)]
    collateral_bps: u64,

    /// dirty leaves allowed before a rollup is forced
    #[arg(long)]
    max_pending: Option<usize>,

    /// rng seed for user keys
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// print the pool event log as json when done
    #[arg(long)]
    dump_events: bool,
}

struct User {
    key: SigningKey,
    identity: Identity,
}

impl User {
    fn sign(
        &self,
        action: Action,
        counterparty: Account,
        amount: u64,
        token: TokenId,
        sequence: u64,
    ) -> SignedIntent {
        Intent {
            action,
            subject: self.identity,
            counterparty,
            amount,
            token: Some(token),
            sequence,
        }
        .sign(&self.key)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pool_sim=info,lending_rollup=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PoolConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let mut config = PoolConfig::new(Account::derive(b"pool-sim"), TokenId::derive("USD"))
                .with_collateral_ratio(args.collateral_bps);
            config.max_pending = args.max_pending;
            config
        }
    };

    info!("starting pool-sim");
    info!("pool account: {}", config.account);
    info!("collateral ratio: {} bps", config.collateral_ratio_bps);
    info!("users: {}", args.users);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let users: Vec<User> = (0..args.users)
        .map(|_| {
            let key = SigningKey::generate(&mut rng);
            let identity = Identity::from_verifying_key(&key.verifying_key());
            User { key, identity }
        })
        .collect();

    let mut tokens = TokenLedger::new(config.token_id);
    for user in &users {
        tokens.mint(user.identity.account(), args.deposit)?;
    }

    let mut pool = LiquidityPool::new(config, InMemoryLedger::new(), tokens)?;
    let mut service = WitnessService::new();
    let genesis = pool.deploy(&service)?;
    info!("genesis: {}", genesis);

    for user in &users {
        deposit(&mut pool, &mut service, user, args.deposit)
            .with_context(|| format!("deposit for {}", user.identity))?;
    }
    let root = pool.rollup_liquidity(&mut service)?;
    info!("liquidity root: {}", hex::encode(root.liquidity));

    for user in &users {
        match borrow(&mut pool, &mut service, user, args.borrow) {
            Ok(()) => {}
            Err(
                err @ (PoolError::InsufficientCollateral { .. }
                | PoolError::InsufficientReserve { .. }),
            ) => {
                warn!("{} borrow refused: {}", user.identity, err);
            }
            Err(err) => return Err(err.into()),
        }
    }
    let root = pool.rollup_liquidity(&mut service)?;
    info!("borrows root: {}", hex::encode(root.borrows));

    // every other user repays half
    for user in users.iter().step_by(2) {
        repay_half(&mut pool, &mut service, user)?;
    }
    let root = pool.rollup_liquidity(&mut service)?;

    let working = service.working_commitment();
    for user in &users {
        let (witness, record) = service.get_witness(MapKind::Borrows, &user.identity)?;
        check_path(&witness, &user.identity, record.pack(), &working.borrows)?;
        info!("{} debt {} (seq {})", user.identity, record.amount, record.sequence);
    }

    info!("final commitment: {}", root);
    info!("commitment digest: {}", hex::encode(root.digest()));
    info!("reserve: {}", pool.reserve());
    info!("ledger height: {}", pool.ledger().height());

    if args.dump_events {
        let events = pool.ledger().events(&pool.account(), 0)?;
        println!("{}", serde_json::to_string_pretty(&events)?);
    }

    Ok(())
}

fn deposit(
    pool: &mut Pool,
    service: &mut WitnessService,
    user: &User,
    amount: u64,
) -> Result<(), PoolError> {
    let token = pool.config().token_id;
    loop {
        let proof = service.get_committed_witness(MapKind::Liquidity, &user.identity)?;
        let sequence = proof.record.next_sequence();
        let signed = user.sign(Action::AddLiquidity, pool.account(), amount, token, sequence);
        match pool.add_liquidity(service, &signed, &proof) {
            Err(PoolError::StaleState { .. }) => force_rollup(pool, service)?,
            other => return other.map(drop),
        }
    }
}

fn borrow(
    pool: &mut Pool,
    service: &mut WitnessService,
    user: &User,
    amount: u64,
) -> Result<(), PoolError> {
    let token = pool.config().token_id;
    loop {
        let liquidity = service.get_committed_witness(MapKind::Liquidity, &user.identity)?;
        let (debt, projected) = service.record_borrow(&user.identity, amount)?;
        let recipient = user.identity.account();
        let signed = user.sign(Action::Borrow, recipient, amount, token, projected.sequence);
        match pool.borrow(service, &signed, &liquidity, &debt) {
            Err(PoolError::StaleState { .. }) => force_rollup(pool, service)?,
            other => return other.map(drop),
        }
    }
}

fn repay_half(pool: &mut Pool, service: &mut WitnessService, user: &User) -> Result<(), PoolError> {
    let token = pool.config().token_id;
    loop {
        let debt = service.get_committed_witness(MapKind::Borrows, &user.identity)?;
        let amount = debt.record.amount / 2;
        if amount == 0 {
            return Ok(());
        }
        let sequence = debt.record.next_sequence();
        let signed = user.sign(Action::Repay, pool.account(), amount, token, sequence);
        match pool.repay(service, &signed, &debt) {
            Err(PoolError::StaleState { .. }) => force_rollup(pool, service)?,
            other => return other.map(drop),
        }
    }
}

/// dirty set hit `max_pending`
fn force_rollup(pool: &mut Pool, service: &mut WitnessService) -> Result<(), PoolError> {
    let pending = service.pending_len();
    let root = pool.rollup_liquidity(service)?;
    info!("forced rollup of {} leaves: {}", pending, root);
    Ok(())
}

fn check_path(witness: &Witness, identity: &Identity, value: LeafValue, root: &Hash) -> Result<()> {
    let index = lending_rollup::identity_index(identity);
    if !LedgerMap::verify(witness, index, value, root) {
        bail!("witness for {} does not match working root", identity);
    }
    Ok(())
}

//! # Gacha Draw Simulation
//!
//! Wires the services over an in-memory store and hammers one shared player
//! with concurrent draws, then checks that no coin was lost or double spent.
//!
//! ## Usage
//!
//! ```bash
//! gacha_sim --config data/gacha.toml --threads 8 --draws 50 --times 10
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use gacha_economy::{
    AccountService, CollectionService, Database, DrawEngine, GachaError, GachaSettings, GameService,
    MemoryStore, PlayerStore, RankingService, WeightedTable,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

/// Score reported per funding game.
const FUNDING_SCORE: i64 = 100_000;

/// Ways the simulation can fail.
#[derive(Error, Debug)]
enum SimError {
    #[error(transparent)]
    Gacha(#[from] GachaError),

    #[error("drawer thread {0} panicked")]
    DrawerPanicked(usize),

    #[error("balance mismatch: have {actual}, expected {expected}")]
    BalanceMismatch { actual: u64, expected: u64 },

    #[error("reward_rate_bp yields no coin for a funding game, cannot fund draws")]
    NoReward,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/gacha.toml").to_string();
    let mut threads = 8usize;
    let mut draws_per_thread = 50u32;
    let mut times = 10i64;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path.clone_from(&args[i + 1]);
                    i += 1;
                }
            }
            "--threads" | "-t" => {
                if i + 1 < args.len() {
                    threads = args[i + 1].parse().unwrap_or(8);
                    i += 1;
                }
            }
            "--draws" | "-d" => {
                if i + 1 < args.len() {
                    draws_per_thread = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--times" | "-n" => {
                if i + 1 < args.len() {
                    times = args[i + 1].parse().unwrap_or(10);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: gacha_sim [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>     Settings file (default: data/gacha.toml)");
                println!("  -t, --threads <NUM>     Concurrent drawers (default: 8)");
                println!("  -d, --draws <NUM>       Draw requests per thread (default: 50)");
                println!("  -n, --times <NUM>       Items per draw request (default: 10)");
                println!("  -h, --help              Show this help");
                return;
            }
            _ => {}
        }
        i += 1;
    }

    if let Err(err) = run(&config_path, threads, draws_per_thread, times) {
        eprintln!("gacha_sim failed: {err}");
        std::process::exit(1);
    }
}

/// Plays funding games until `player_id` earned at least `target_coin`.
fn fund<D: Database>(
    games: &GameService<D>,
    player_id: &str,
    target_coin: u64,
) -> Result<u64, SimError> {
    let mut funded = 0u64;
    while funded < target_coin {
        let reward = games.finish_game(player_id, FUNDING_SCORE)?.coin;
        if reward == 0 {
            return Err(SimError::NoReward);
        }
        funded += reward;
    }
    Ok(funded)
}

fn run(config_path: &str, threads: usize, draws_per_thread: u32, times: i64) -> Result<(), SimError> {
    let settings = GachaSettings::load(config_path)?;
    let store = MemoryStore::from_settings(&settings);
    let stores = store.stores();

    let accounts = AccountService::new(stores.clone());
    let games = GameService::new(stores.clone(), settings.economy.clone());
    let engine = Arc::new(DrawEngine::new(stores.clone(), settings.economy.clone())?);
    let ranking = RankingService::new(stores.clone(), settings.economy.ranking_page_size)?;
    let collection = CollectionService::new(stores);

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Settings:        {config_path}");
    println!("│ Draw cost:       {} coin", settings.economy.draw_cost);
    println!("│ Catalog items:   {}", settings.items.len());
    println!("│ Drawers:         {threads} x {draws_per_thread} requests x {times} items");
    println!("└─────────────────────────────────────────────────────────────────┘");

    // Fund a shared player through played games: enough for roughly half the requests
    let shared = accounts.create_player("shared")?;
    let budget_requests = u64::from(draws_per_thread) * threads as u64 / 2;
    let cost_per_request = settings.economy.draw_cost * u64::try_from(times).unwrap_or(0);
    let target_coin = budget_requests * cost_per_request;
    fund(&games, &shared.player_id, target_coin)?;
    let starting_coin = accounts.get_player(&shared.player_id)?.coin;

    let succeeded = Arc::new(AtomicU64::new(0));
    let rejected = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let succeeded = Arc::clone(&succeeded);
            let rejected = Arc::clone(&rejected);
            let player_id = shared.player_id.clone();

            thread::spawn(move || -> Result<(), GachaError> {
                for _ in 0..draws_per_thread {
                    match engine.draw(&player_id, times) {
                        Ok(_) => {
                            succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(GachaError::InsufficientBalance { .. }) => {
                            rejected.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            eprintln!("drawer {t}: {err}");
                            return Err(err);
                        }
                    }
                }
                Ok(())
            })
        })
        .collect();

    for (t, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err(SimError::DrawerPanicked(t)),
        }
    }
    let elapsed = start.elapsed();

    let succeeded = succeeded.load(Ordering::Relaxed);
    let rejected = rejected.load(Ordering::Relaxed);
    let final_coin = accounts.get_player(&shared.player_id)?.coin;
    let expected_coin = starting_coin - succeeded * cost_per_request;

    println!();
    println!("┌─ RESULTS ───────────────────────────────────────────────────────┐");
    println!("│ Elapsed:         {elapsed:?}");
    println!("│ Committed:       {succeeded}");
    println!("│ Rejected:        {rejected} (insufficient balance)");
    println!("│ Coin:            {starting_coin} -> {final_coin} (expected {expected_coin})");
    println!("└─────────────────────────────────────────────────────────────────┘");

    if final_coin != expected_coin {
        return Err(SimError::BalanceMismatch {
            actual: final_coin,
            expected: expected_coin,
        });
    }

    let owned = collection
        .collection_list(&shared.player_id)?
        .into_iter()
        .filter(|entry| entry.has_item)
        .count();
    println!("Collection: {owned}/{} items", settings.items.len());

    // Drop odds check
    let table = WeightedTable::new(settings.probabilities.clone())?;
    let stats = table.run_statistics(100_000, &mut ChaCha20Rng::seed_from_u64(0));
    println!();
    println!("Drop rates over {} picks:", stats.total_draws);
    for entry in table.entries() {
        #[allow(clippy::cast_precision_loss)]
        let expected = f64::from(entry.weight) / table.total_weight() as f64;
        println!(
            "  {:>6}  observed {:>6.2}%  expected {:>6.2}%",
            entry.item_id,
            stats.frequency(&entry.item_id) * 100.0,
            expected * 100.0
        );
    }

    println!();
    println!("Leaderboard ({} players):", store.count().map_err(GachaError::from)?);
    for row in ranking.rank_info_list(1)? {
        println!("  #{:<3} {:<10} {}", row.rank, row.user_name, row.score);
    }

    Ok(())
}

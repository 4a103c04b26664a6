mod scenario;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use furrow_ledger::{math::block_reward_multiplier, Error, LockRecord, ReleaseWindow};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use scenario::{Labels, StepResult};

fn print_banner() {
    let ver = env!("CARGO_PKG_VERSION");
    println!();
    println!("  Furrow  v{ver}  ·  emission farm ledger simulator");
    println!("  {}", "─".repeat(62));
    println!("  Reward    dual accumulator, 1e12 fixed point, dev share 1/10");
    println!("  Bonus     multiplier window with partial lock-up of rewards");
    println!("  Vesting   linear release over a block window");
    println!("  Votes     delegated checkpoints, 32-bit block bound");
    println!();
}

#[derive(Parser)]
#[command(
    name    = "furrow",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Replay staking, vesting and delegation scenarios against the Furrow ledger.",
    after_help = "\
ENVIRONMENT:
  FURROW_LOG    tracing filter, e.g. `furrow_ledger=debug`  [default: warn]

QUICK START:
  furrow run demos/bonus-window.json
  furrow run demos/bonus-window.json --json
  furrow multiplier --from 90 --to 110 --bonus-end 100 --bonus-multiplier 4
  furrow unlockable --locked 1000 --last-unlock 0 --start 0 --end 100 --block 50"
)]
struct Cli {
    /// Output machine-readable JSON instead of human-readable text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Log every ledger event (overrides FURROW_LOG)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON scenario file step by step
    ///
    /// Each step runs at its own block with its own caller. A rejected step
    /// is reported with its error kind and leaves the ledger unchanged; the
    /// replay then continues with the next step.
    #[command(
        after_help = "\
EXAMPLES:
  furrow run demos/bonus-window.json
  FURROW_LOG=furrow_ledger=debug furrow run demos/bonus-window.json

NOTES:
  Labels such as \"alice\" or \"lp-a\" map to keys derived from sha256(label).
  \"farm\" and \"token\" are the custody addresses of the farm and the token."
    )]
    Run {
        /// Scenario file
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,
    },

    /// Emission multiplier for a block range
    #[command(
        after_help = "\
EXAMPLES:
  # 10 bonus blocks at 4x plus 10 plain blocks = 50
  furrow multiplier --from 90 --to 110 --bonus-end 100 --bonus-multiplier 4"
    )]
    Multiplier {
        #[arg(long, value_name = "BLOCK")]
        from: u64,

        #[arg(long, value_name = "BLOCK")]
        to: u64,

        #[arg(long, value_name = "BLOCK")]
        bonus_end: u64,

        #[arg(long, value_name = "N", default_value_t = 1)]
        bonus_multiplier: u64,
    },

    /// Amount an unlock would release at a block
    #[command(
        after_help = "\
EXAMPLES:
  furrow unlockable --locked 1000 --last-unlock 0 --start 0 --end 100 --block 50
  furrow unlockable --locked 500 --last-unlock 50 --start 0 --end 100 --block 75"
    )]
    Unlockable {
        #[arg(long, value_name = "AMOUNT")]
        locked: u64,

        /// Unlock cursor of the lock
        #[arg(long, value_name = "BLOCK", default_value_t = 0)]
        last_unlock: u64,

        /// Release window start
        #[arg(long, value_name = "BLOCK")]
        start: u64,

        /// Release window end
        #[arg(long, value_name = "BLOCK")]
        end: u64,

        #[arg(long, value_name = "BLOCK")]
        block: u64,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("FURROW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    // When invoked with no arguments, show banner + full help and exit cleanly.
    if std::env::args().len() == 1 {
        print_banner();
        Cli::command().print_long_help().ok();
        println!();
        return Ok(());
    }

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Run { scenario } => cmd_run(scenario, cli.json)?,
        Commands::Multiplier { from, to, bonus_end, bonus_multiplier } => {
            cmd_multiplier(*from, *to, *bonus_end, *bonus_multiplier, cli.json)?;
        }
        Commands::Unlockable { locked, last_unlock, start, end, block } => {
            cmd_unlockable(*locked, *last_unlock, *start, *end, *block, cli.json)?;
        }
    }

    Ok(())
}

// ─── run ──────────────────────────────────────────────────────────────────────

fn cmd_run(path: &Path, json_output: bool) -> Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read scenario '{}'", path.display()))?;
    let parsed = scenario::parse(&source)
        .with_context(|| format!("Cannot parse scenario '{}'", path.display()))?;
    let mut labels = Labels::new();
    let replay = scenario::replay(&parsed, &mut labels)?;
    let summary = scenario::summary(&replay.farm, &labels);
    let rejected = replay
        .outcomes
        .iter()
        .filter(|o| matches!(o.result, StepResult::Error { .. }))
        .count();

    if json_output {
        println!("{}", json!({
            "status":   "ok",
            "command":  "run",
            "scenario": path.display().to_string(),
            "rejected": rejected,
            "steps":    replay.outcomes,
            "summary":  summary,
        }));
        return Ok(());
    }

    println!("─── Steps ────────────────────────────────────────────────────────");
    for outcome in &replay.outcomes {
        let detail = match &outcome.result {
            StepResult::Ok { value } if value.is_null() => "ok".to_string(),
            StepResult::Ok { value } => format!("ok  {value}"),
            StepResult::Error { kind, message } => format!("REJECTED  {kind}: {message}"),
        };
        println!(
            "  #{:<3} block {:>8}  {:<10} {:<20} {detail}",
            outcome.step, outcome.block, outcome.caller, outcome.action
        );
    }
    println!();
    print_summary(&summary);
    println!();
    println!("  {} steps, {rejected} rejected.", replay.outcomes.len());
    Ok(())
}

fn num(value: &Value) -> u64 {
    value.as_u64().unwrap_or(0)
}

fn print_summary(summary: &Value) {
    let empty = Vec::new();
    let list = |key: &str| summary[key].as_array().unwrap_or(&empty).clone();

    println!("─── Pools ────────────────────────────────────────────────────────");
    for pool in list("pools") {
        println!(
            "  [{}] {:<10} alloc {:>6}  staked {:>12}  last block {:>8}",
            num(&pool["pid"]),
            pool["stake_asset"].as_str().unwrap_or("?"),
            num(&pool["alloc_point"]),
            num(&pool["staked"]),
            num(&pool["last_reward_block"]),
        );
        println!(
            "      acc/share {}  til bonus end {}",
            pool["acc_reward_per_share"].as_str().unwrap_or("0"),
            pool["acc_reward_per_share_til_bonus_end"].as_str().unwrap_or("0"),
        );
    }
    println!();
    println!("─── Positions ────────────────────────────────────────────────────");
    for position in list("positions") {
        println!(
            "  [{}] {:<10} amount {:>12}  funded by {}",
            num(&position["pid"]),
            position["account"].as_str().unwrap_or("?"),
            num(&position["amount"]),
            position["funded_by"].as_str().unwrap_or("-"),
        );
    }
    println!();
    println!("─── Token ────────────────────────────────────────────────────────");
    println!("  Total supply     {:>20}", num(&summary["token"]["total_supply"]));
    println!("  Total locked     {:>20}", num(&summary["token"]["total_lock"]));
    println!("  Manual minted    {:>20}", num(&summary["token"]["manual_minted"]));
    println!();
    println!("  {:<10} {:>14} {:>14} {:>14}  delegate", "account", "free", "locked", "votes");
    for account in list("accounts") {
        println!(
            "  {:<10} {:>14} {:>14} {:>14}  {}",
            account["account"].as_str().unwrap_or("?"),
            num(&account["free"]),
            num(&account["locked"]),
            num(&account["votes"]),
            account["delegate"].as_str().unwrap_or("-"),
        );
    }
}

// ─── multiplier ───────────────────────────────────────────────────────────────

fn cmd_multiplier(
    from: u64,
    to: u64,
    bonus_end: u64,
    bonus_multiplier: u64,
    json_output: bool,
) -> Result<()> {
    let multiplier = block_reward_multiplier(from, to, bonus_end, bonus_multiplier)
        .map_err(|e| anyhow!("{e}\n  {}", multiplier_hint(&e)))?;

    if json_output {
        println!("{}", json!({
            "status":           "ok",
            "command":          "multiplier",
            "from":             from,
            "to":               to,
            "bonus_end":        bonus_end,
            "bonus_multiplier": bonus_multiplier,
            "multiplier":       multiplier,
        }));
    } else {
        println!("─── Emission Multiplier ──────────────────────────────────────────");
        println!("  Blocks           {from} → {to}");
        println!("  Bonus window     ..={bonus_end} at {bonus_multiplier}x");
        println!("  Multiplier       {:>20}", multiplier);
    }
    Ok(())
}

fn multiplier_hint(err: &Error) -> &'static str {
    match err {
        Error::InvalidParameter(_) => "--to must not be before --from.",
        _ => "Lower --bonus-multiplier or narrow the block range.",
    }
}

// ─── unlockable ───────────────────────────────────────────────────────────────

fn cmd_unlockable(
    locked: u64,
    last_unlock: u64,
    start: u64,
    end: u64,
    block: u64,
    json_output: bool,
) -> Result<()> {
    let window = ReleaseWindow::new(start, end).context("--start/--end")?;
    let record = LockRecord {
        locked,
        last_unlock_block: last_unlock.max(start),
    };
    let amount = record.unlockable(&window, block);

    if json_output {
        println!("{}", json!({
            "status":      "ok",
            "command":     "unlockable",
            "locked":      locked,
            "last_unlock": record.last_unlock_block,
            "start":       start,
            "end":         end,
            "block":       block,
            "unlockable":  amount,
            "remaining":   locked - amount,
        }));
    } else {
        println!("─── Unlockable ───────────────────────────────────────────────────");
        println!("  Window           {start} → {end}");
        println!("  Locked           {:>20}", locked);
        println!("  Cursor           {:>20}", record.last_unlock_block);
        println!("  At block {:<8}{:>20}", block, amount);
        println!("  Remaining        {:>20}", locked - amount);
    }
    Ok(())
}

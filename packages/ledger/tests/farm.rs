use furrow_ledger::{
    delegation, AssetBank, Context, EmissionSchedule, Error, ErrorKind, Farm, FarmConfig,
    ReleaseWindow, RewardToken, StakeBank, TokenConfig,
};
use proptest::prelude::*;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};

struct Harness {
    farm: Farm,
    owner: Pubkey,
    dev: Pubkey,
    lp: Pubkey,
}

fn harness(emission: EmissionSchedule, release: ReleaseWindow) -> Harness {
    let (address, owner, dev, lp) = (
        Pubkey::new_unique(),
        Pubkey::new_unique(),
        Pubkey::new_unique(),
        Pubkey::new_unique(),
    );
    let token = RewardToken::new(
        TokenConfig {
            name: "Furrow".to_string(),
            address: Pubkey::new_unique(),
            cap: u64::MAX / 2,
            manual_mint_limit: 0,
            release,
        },
        address,
    )
    .unwrap();
    let farm = Farm::new(
        FarmConfig {
            address,
            owner,
            dev,
            emission,
        },
        token,
        AssetBank::new(),
    )
    .unwrap();
    Harness {
        farm,
        owner,
        dev,
        lp,
    }
}

fn emission(
    reward_per_block: u64,
    bonus_multiplier: u64,
    bonus_end_block: u64,
    bps: u64,
) -> EmissionSchedule {
    EmissionSchedule {
        reward_per_block,
        start_block: 0,
        bonus_multiplier,
        bonus_end_block,
        bonus_lock_up_bps: bps,
    }
}

fn window(start: u64, end: u64) -> ReleaseWindow {
    ReleaseWindow::new(start, end).unwrap()
}

#[test]
fn sole_depositor_earns_full_emission() {
    let mut h = harness(emission(20, 1, 0, 0), window(0, 100));
    let alice = Pubkey::new_unique();
    h.farm.bank_mut().credit(&h.lp, &alice, 1_000).unwrap();
    let pid = h.farm.add_pool(&Context::new(h.owner, 100), 300, h.lp, false).unwrap();
    assert_eq!(h.farm.total_alloc_point(), 300);

    h.farm.deposit(&Context::new(alice, 100), alice, pid, 1_000).unwrap();
    assert_eq!(h.farm.pending_reward(pid, &alice, 110).unwrap(), 200);

    let harvest = h.farm.harvest(&Context::new(alice, 110), pid).unwrap();
    assert_eq!(harvest.reward, 200);
    assert_eq!(harvest.bonus_locked, 0);
    assert_eq!(h.farm.token().balance_of(&alice), 200);
    // dev share is minted on top
    assert_eq!(h.farm.token().balance_of(&h.dev), 20);
    assert_eq!(h.farm.token().total_supply(), 220);
    assert_eq!(h.farm.pending_reward(pid, &alice, 110).unwrap(), 0);
}

#[test]
fn rewards_split_by_stake_share() {
    let mut h = harness(emission(30, 1, 0, 0), window(0, 100));
    let (alice, bob) = (Pubkey::new_unique(), Pubkey::new_unique());
    h.farm.bank_mut().credit(&h.lp, &alice, 100).unwrap();
    h.farm.bank_mut().credit(&h.lp, &bob, 200).unwrap();
    let pid = h.farm.add_pool(&Context::new(h.owner, 0), 1, h.lp, false).unwrap();

    h.farm.deposit(&Context::new(alice, 10), alice, pid, 100).unwrap();
    // bob's deposit at 20 must not share the first 10 blocks
    h.farm.deposit(&Context::new(bob, 20), bob, pid, 200).unwrap();

    assert_eq!(h.farm.pending_reward(pid, &alice, 30).unwrap(), 300 + 100);
    assert_eq!(h.farm.pending_reward(pid, &bob, 30).unwrap(), 200);
}

#[test]
fn pools_share_emission_by_weight() {
    let mut h = harness(emission(40, 1, 0, 0), window(0, 100));
    let other = Pubkey::new_unique();
    let alice = Pubkey::new_unique();
    h.farm.bank_mut().credit(&h.lp, &alice, 10).unwrap();
    h.farm.bank_mut().credit(&other, &alice, 10).unwrap();
    let admin = Context::new(h.owner, 0);
    let first = h.farm.add_pool(&admin, 1, h.lp, false).unwrap();
    let second = h.farm.add_pool(&admin, 3, other, false).unwrap();

    h.farm.deposit(&Context::new(alice, 0), alice, first, 10).unwrap();
    h.farm.deposit(&Context::new(alice, 0), alice, second, 10).unwrap();
    assert_eq!(h.farm.pending_reward(first, &alice, 10).unwrap(), 100);
    assert_eq!(h.farm.pending_reward(second, &alice, 10).unwrap(), 300);

    // re-weighting with an update settles the old weights first
    h.farm.set_pool(&Context::new(h.owner, 10), first, 3, true).unwrap();
    assert_eq!(h.farm.pending_reward(first, &alice, 20).unwrap(), 100 + 200);
    assert_eq!(h.farm.pending_reward(second, &alice, 20).unwrap(), 300 + 200);
}

#[test]
fn bonus_window_locks_part_of_every_harvest() {
    let mut h = harness(emission(100, 4, 100, 5_000), window(1_000, 2_000));
    let alice = Pubkey::new_unique();
    h.farm.bank_mut().credit(&h.lp, &alice, 1_000).unwrap();
    let pid = h.farm.add_pool(&Context::new(h.owner, 0), 1, h.lp, false).unwrap();
    h.farm.deposit(&Context::new(alice, 80), alice, pid, 1_000).unwrap();

    // inside the window: 10 blocks * 4x * 100
    let inside = h.farm.harvest(&Context::new(alice, 90), pid).unwrap();
    assert_eq!(inside.reward, 4_000);
    assert_eq!(inside.bonus_locked, 2_000);
    assert_eq!(h.farm.token().balance_of(&alice), 2_000);
    assert_eq!(h.farm.token().lock_of(&alice), 2_000);
    assert_eq!(h.farm.token().lock_of(&h.dev), 200);

    // straddling: 10 bonus blocks at 4x plus 10 plain blocks
    let straddle = h.farm.harvest(&Context::new(alice, 110), pid).unwrap();
    assert_eq!(straddle.reward, 5_000);
    assert_eq!(straddle.bonus_locked, 2_000);
    assert_eq!(h.farm.token().lock_of(&h.dev), 400);

    // fully past: nothing more is locked
    let after = h.farm.harvest(&Context::new(alice, 120), pid).unwrap();
    assert_eq!(after.reward, 1_000);
    assert_eq!(after.bonus_locked, 0);
    assert_eq!(h.farm.token().lock_of(&alice), 4_000);
    assert_eq!(h.farm.token().total_lock(), 4_400);

    // locked reward vests over the release window
    let alice_ctx = Context::new(alice, 1_500);
    assert_eq!(h.farm.token().can_unlock_amount(&alice, 999), 0);
    assert_eq!(h.farm.token_mut().unlock(&alice_ctx).unwrap(), 2_000);
    assert_eq!(h.farm.token().total_balance_of(&alice), 10_000);
}

#[test]
fn delegated_votes_track_harvested_reward() {
    let mut h = harness(emission(10, 1, 0, 0), window(0, 1_000));
    let holder = Keypair::new();
    let alice = holder.pubkey();
    let carol = Pubkey::new_unique();
    h.farm.bank_mut().credit(&h.lp, &alice, 100).unwrap();
    let pid = h.farm.add_pool(&Context::new(h.owner, 0), 1, h.lp, false).unwrap();
    h.farm.deposit(&Context::new(alice, 0), alice, pid, 100).unwrap();

    // delegation by signature, submitted by a relayer
    let domain = h.farm.token().domain_separator();
    let signed = delegation::sign_delegation(&holder, &domain, &carol, 0, 10_000);
    let relayer = Context::new(Pubkey::new_unique(), 5).with_timestamp(9_000);
    h.farm
        .token_mut()
        .delegate_by_sig(&relayer, carol, 0, 10_000, &signed)
        .unwrap();

    h.farm.harvest(&Context::new(alice, 10), pid).unwrap();
    h.farm.harvest(&Context::new(alice, 20), pid).unwrap();
    assert_eq!(h.farm.token().current_votes(&carol), 200);
    assert_eq!(h.farm.token().prior_votes(&carol, 15, 21).unwrap(), 100);
    assert_eq!(h.farm.token().prior_votes(&carol, 9, 21).unwrap(), 0);

    let err = h
        .farm
        .token_mut()
        .delegate_by_sig(&relayer, carol, 0, 10_000, &signed)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReplayOrExpired);
}

#[test]
fn reward_custody_shortfall_is_fatal() {
    let mut h = harness(emission(10, 1, 0, 0), window(0, 100));
    let alice = Pubkey::new_unique();
    h.farm.bank_mut().credit(&h.lp, &alice, 100).unwrap();
    let pid = h.farm.add_pool(&Context::new(h.owner, 0), 1, h.lp, false).unwrap();
    h.farm.deposit(&Context::new(alice, 0), alice, pid, 100).unwrap();
    h.farm.update_pool(&Context::new(alice, 10), pid).unwrap();

    // drain the farm's reward custody behind its back
    let custody = Context::new(h.farm.address(), 10);
    h.farm
        .token_mut()
        .transfer(&custody, &Pubkey::new_unique(), 60)
        .unwrap();

    let err = h.farm.harvest(&Context::new(alice, 10), pid).unwrap_err();
    assert_eq!(err, Error::RewardExceedsCustody { pending: 100, custody: 40 });
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(h.farm.token().balance_of(&alice), 0);
    assert_eq!(
        h.farm.withdraw(&Context::new(alice, 10), alice, pid, 100),
        Err(Error::RewardExceedsCustody { pending: 100, custody: 40 })
    );

    // the principal still comes back, without the reward
    let exit = h
        .farm
        .emergency_withdraw(&Context::new(alice, 10), alice, pid)
        .unwrap();
    assert_eq!(exit.principal, 100);
    assert_eq!(exit.forfeited_reward, 100);
    assert_eq!(h.farm.bank().balance_of(&h.lp, &alice), 100);
    assert_eq!(h.farm.token().balance_of(&alice), 0);
}

#[derive(Debug, Clone)]
enum Step {
    Deposit { who: usize, amount: u64 },
    Withdraw { who: usize, amount: u64 },
    Harvest { who: usize },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0usize..3, 0u64..500).prop_map(|(who, amount)| Step::Deposit { who, amount }),
        (0usize..3, 0u64..500).prop_map(|(who, amount)| Step::Withdraw { who, amount }),
        (0usize..3).prop_map(|who| Step::Harvest { who }),
    ]
}

proptest! {
    #[test]
    fn staked_sum_matches_custody(steps in proptest::collection::vec((1u64..20, step()), 1..40)) {
        let mut h = harness(emission(7, 3, 150, 2_500), window(0, 1_000));
        let accounts: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        for account in &accounts {
            h.farm.bank_mut().credit(&h.lp, account, 2_000).unwrap();
        }
        let pid = h.farm.add_pool(&Context::new(h.owner, 0), 1, h.lp, false).unwrap();

        let mut block = 0u64;
        for (gap, step) in steps {
            block += gap;
            let _ = match step {
                Step::Deposit { who, amount } => {
                    let ctx = Context::new(accounts[who], block);
                    h.farm.deposit(&ctx, accounts[who], pid, amount).map(|_| ())
                }
                Step::Withdraw { who, amount } => {
                    let ctx = Context::new(accounts[who], block);
                    h.farm.withdraw(&ctx, accounts[who], pid, amount).map(|_| ())
                }
                Step::Harvest { who } => {
                    let expected = h.farm.pending_reward(pid, &accounts[who], block).unwrap();
                    match h.farm.harvest(&Context::new(accounts[who], block), pid) {
                        Ok(harvest) => {
                            prop_assert_eq!(harvest.reward, expected);
                            Ok(())
                        }
                        Err(err) => Err(err),
                    }
                }
            };
            let staked: u64 = accounts
                .iter()
                .map(|account| h.farm.position(pid, account).amount)
                .sum();
            prop_assert_eq!(staked, h.farm.staked_supply(pid).unwrap());
            prop_assert_eq!(
                staked + accounts.iter().map(|a| h.farm.bank().balance_of(&h.lp, a)).sum::<u64>(),
                6_000
            );
        }
    }

    #[test]
    fn pending_equals_harvest(
        deposits in proptest::collection::vec((1u64..1_000, 0u64..30), 1..5),
        at in 1u64..300,
        pick in any::<prop::sample::Index>(),
    ) {
        let mut h = harness(emission(13, 5, 60, 10_000), window(0, 1_000));
        let pid = h.farm.add_pool(&Context::new(h.owner, 0), 1, h.lp, false).unwrap();
        let mut accounts = Vec::new();
        let mut last = 0;
        for (amount, gap) in deposits {
            let account = Pubkey::new_unique();
            h.farm.bank_mut().credit(&h.lp, &account, amount).unwrap();
            last += gap;
            h.farm.deposit(&Context::new(account, last), account, pid, amount).unwrap();
            accounts.push(account);
        }
        let block = last + at;
        let account = *pick.get(&accounts);
        let expected = h.farm.pending_reward(pid, &account, block).unwrap();
        let harvest = h.farm.harvest(&Context::new(account, block), pid).unwrap();
        prop_assert_eq!(harvest.reward, expected);
        prop_assert!(harvest.bonus_locked <= harvest.reward);
        prop_assert_eq!(h.farm.pending_reward(pid, &account, block).unwrap(), 0);
    }
}

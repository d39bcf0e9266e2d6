//! Bonus boxes: spawn, claim, expiry

use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::battle::{BattleError, BattleState};
use super::constants::bonus;
use super::effects::EffectKind;
use super::tank::TankState;
use super::timers::TimerEvent;
use crate::net::protocol::{Command, CommandName};
use crate::store::QuestEvent;
use crate::util::{TaskScope, Vector3};

/// Sound played with the gold drop announcement
const GOLD_SOUND: u64 = 490_113;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BonusKind {
    DoubleArmor,
    DoubleDamage,
    Nitro,
    RepairKit,
    Crystal,
    Gold,
}

impl BonusKind {
    pub const ALL: [BonusKind; 6] = [
        BonusKind::DoubleArmor,
        BonusKind::DoubleDamage,
        BonusKind::Nitro,
        BonusKind::RepairKit,
        BonusKind::Crystal,
        BonusKind::Gold,
    ];

    /// Kinds dropped by the periodic spawner
    pub const PERIODIC: [BonusKind; 5] = [
        BonusKind::DoubleArmor,
        BonusKind::DoubleDamage,
        BonusKind::Nitro,
        BonusKind::RepairKit,
        BonusKind::Crystal,
    ];

    pub fn key(self) -> &'static str {
        match self {
            BonusKind::DoubleArmor => "armor",
            BonusKind::DoubleDamage => "damage",
            BonusKind::Nitro => "nitro",
            BonusKind::RepairKit => "health",
            BonusKind::Crystal => "crystall",
            BonusKind::Gold => "gold",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }

    pub fn resource(self) -> u64 {
        match self {
            BonusKind::DoubleArmor => 170_006,
            BonusKind::DoubleDamage => 170_007,
            BonusKind::Nitro => 170_008,
            BonusKind::RepairKit => 170_009,
            BonusKind::Crystal => 170_010,
            BonusKind::Gold => 170_011,
        }
    }

    /// Light color of the box
    pub fn color(self) -> u32 {
        match self {
            BonusKind::DoubleArmor => 0x00_9f_ff,
            BonusKind::DoubleDamage => 0xff_30_30,
            BonusKind::Nitro => 0xff_ff_00,
            BonusKind::RepairKit => 0x00_ff_00,
            BonusKind::Crystal => 0x8e_e5_ff,
            BonusKind::Gold => 0xff_d7_00,
        }
    }

    pub fn lifetime(self) -> Duration {
        match self {
            BonusKind::Crystal => Duration::from_secs(bonus::CRYSTAL_LIFETIME_SECS),
            BonusKind::Gold => Duration::from_secs(bonus::GOLD_LIFETIME_SECS),
            _ => Duration::from_secs(bonus::SUPPLY_LIFETIME_SECS),
        }
    }

    pub fn effect(self) -> Option<EffectKind> {
        match self {
            BonusKind::DoubleArmor => Some(EffectKind::DoubleArmor),
            BonusKind::DoubleDamage => Some(EffectKind::DoubleDamage),
            BonusKind::Nitro => Some(EffectKind::Nitro),
            BonusKind::RepairKit => Some(EffectKind::RepairKit),
            BonusKind::Crystal | BonusKind::Gold => None,
        }
    }
}

/// Split a client bonus key `kind_id`
pub fn parse_bonus_key(key: &str) -> Option<(BonusKind, u32)> {
    let (kind, id) = key.rsplit_once('_')?;
    Some((BonusKind::from_key(kind)?, id.parse().ok()?))
}

#[derive(Debug)]
pub struct BattleBonus {
    pub id: u32,
    pub kind: BonusKind,
    pub position: Vector3,
    pub spawned: Instant,
    /// Pending expiry; cancelled when the bonus is dropped
    pub(crate) tasks: TaskScope,
}

impl BattleBonus {
    pub fn key(&self) -> String {
        format!("{}_{}", self.kind.key(), self.id)
    }

    pub fn spawn_data(&self) -> Value {
        let remaining = self.kind.lifetime().saturating_sub(self.spawned.elapsed());
        json!({
            "id": self.key(),
            "x": self.position.x,
            "y": self.position.y,
            "z": self.position.z,
            "disappearing_time": remaining.as_secs(),
        })
    }
}

impl BattleState {
    pub fn bonus_count(&self) -> usize {
        self.bonuses.len()
    }

    /// Place a box and arm its expiry
    pub fn spawn_bonus(&mut self, kind: BonusKind, position: Vector3) -> u32 {
        let id = self.next_bonus_id();
        let mut bonus = BattleBonus {
            id,
            kind,
            position: position.lifted(bonus::DROP_HEIGHT),
            spawned: Instant::now(),
            tasks: TaskScope::new(),
        };
        bonus
            .tasks
            .add(self.scheduler.schedule(kind.lifetime(), TimerEvent::BonusExpired { bonus: id }));
        self.broadcast(Command::with_args(CommandName::SpawnBonus, [bonus.spawn_data().to_string()]));
        debug!(battle = %self.info.id, bonus = %bonus.key(), "Bonus spawned");
        self.bonuses.insert(id, bonus);
        id
    }

    /// Announce a gold box; it lands after the drop delay
    pub fn announce_gold(&mut self, position: Vector3) {
        self.broadcast(Command::with_args(
            CommandName::SpawnGold,
            ["A gold box will be dropped soon".to_string(), GOLD_SOUND.to_string()],
        ));
        let delay = self.services.timings.gold_drop_delay;
        self.schedule_for_battle(delay, TimerEvent::GoldDrop { position });
    }

    pub(crate) fn drop_gold_box(&mut self, position: Vector3) {
        self.spawn_bonus(BonusKind::Gold, position);
    }

    pub(crate) fn expire_bonus(&mut self, id: u32) {
        if let Some(bonus) = self.bonuses.remove(&id) {
            self.broadcast(Command::with_args(CommandName::RemoveBonus, [bonus.key()]));
            self.services.metrics.bonuses_expired.fetch_add(1, Ordering::Relaxed);
            debug!(battle = %self.info.id, bonus = %bonus.key(), "Bonus expired");
        }
    }

    /// Tank picked up a box
    pub fn claim_bonus(&mut self, username: &str, key: &str) -> Result<BonusKind, BattleError> {
        let (claimed_kind, id) =
            parse_bonus_key(key).ok_or_else(|| BattleError::BonusNotFound(key.to_string()))?;
        let Some(bonus) = self.bonuses.get(&id) else {
            warn!(battle = %self.info.id, player = %username, bonus = %key, "Bonus not found");
            return Err(BattleError::BonusNotFound(key.to_string()));
        };
        if bonus.kind != claimed_kind {
            warn!(
                battle = %self.info.id,
                bonus = %key,
                actual = bonus.kind.key(),
                "Bonus kind mismatch"
            );
        }
        let tank = self.require_tank(username)?;
        if tank.state != TankState::Active {
            return Err(BattleError::InvalidTankState {
                tank: username.to_string(),
                state: tank.state,
                expected: "Active",
            });
        }

        // Dropping the bonus cancels its expiry
        let Some(bonus) = self.bonuses.remove(&id) else {
            return Err(BattleError::BonusNotFound(key.to_string()));
        };
        let kind = bonus.kind;
        self.broadcast(Command::with_args(CommandName::ActivateBonus, [bonus.key()]));
        drop(bonus);

        match kind.effect() {
            Some(effect) => self.run_effect(username, effect)?,
            None => {
                let reward = if kind == BonusKind::Gold {
                    bonus::GOLD_REWARD
                } else {
                    bonus::CRYSTAL_REWARD
                };
                match self.services.users.adjust_crystals(username, reward) {
                    Ok(balance) => self.send_to(
                        username,
                        Command::with_args(CommandName::UpdateCrystals, [balance.to_string()]),
                    ),
                    Err(e) => warn!(player = %username, error = %e, "Failed to credit crystals"),
                }
                if kind == BonusKind::Gold {
                    self.broadcast(Command::with_args(CommandName::TakeGold, [username]));
                }
            }
        }

        self.services
            .quests
            .record(username, QuestEvent::TakeBonus(kind.key().to_string()));
        self.services.metrics.bonuses_taken.fetch_add(1, Ordering::Relaxed);
        Ok(kind)
    }

    /// Periodic supply drop at a random bonus point
    pub(crate) fn periodic_bonus_drop(&mut self) {
        let mut rng = thread_rng();
        if let Some(point) = self.info.map.random_bonus_point(&mut rng) {
            if rng.gen_ratio(1, 20) {
                self.announce_gold(point);
            } else if let Some(&kind) = BonusKind::PERIODIC.choose(&mut rng) {
                self.spawn_bonus(kind, point);
            }
        }
        if let Some(interval) = self.services.timings.bonus_spawn_interval {
            self.schedule_for_battle(interval, TimerEvent::BonusDrop);
        }
    }
}

//! Supply effects attached to tanks
//!
//! Cooldown is client-visible slot time only; the server never refuses
//! a reactivation because of it.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::battle::{BattleError, BattleState};
use super::constants::effects;
use super::tank::{BattleTank, TankState};
use super::timers::TimerEvent;
use crate::net::protocol::{Command, CommandName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    RepairKit,
    DoubleArmor,
    DoubleDamage,
    Nitro,
    Mine,
}

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        EffectKind::RepairKit,
        EffectKind::DoubleArmor,
        EffectKind::DoubleDamage,
        EffectKind::Nitro,
        EffectKind::Mine,
    ];

    /// Client effect id, also the inventory slot
    pub fn id(self) -> u32 {
        match self {
            EffectKind::RepairKit => 1,
            EffectKind::DoubleArmor => 2,
            EffectKind::DoubleDamage => 3,
            EffectKind::Nitro => 4,
            EffectKind::Mine => 5,
        }
    }

    /// Inventory item name
    pub fn item(self) -> &'static str {
        match self {
            EffectKind::RepairKit => "health",
            EffectKind::DoubleArmor => "armor",
            EffectKind::DoubleDamage => "double_damage",
            EffectKind::Nitro => "n2o",
            EffectKind::Mine => "mine",
        }
    }

    pub fn from_item(item: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.item() == item)
    }

    /// `None` for instantaneous effects
    pub fn duration(self) -> Option<Duration> {
        match self {
            EffectKind::RepairKit => Some(Duration::from_secs(effects::REPAIR_KIT_DURATION_SECS)),
            EffectKind::DoubleArmor | EffectKind::DoubleDamage | EffectKind::Nitro => {
                Some(Duration::from_secs(effects::BOOST_DURATION_SECS))
            }
            EffectKind::Mine => None,
        }
    }

    pub fn cooldown(self) -> Duration {
        Duration::from_secs(effects::COOLDOWN_SECS)
    }
}

#[derive(Debug, Clone)]
pub struct TankEffect {
    pub id: u32,
    pub kind: EffectKind,
    pub started: Instant,
    pub duration: Duration,
}

impl TankEffect {
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.started.elapsed())
    }
}

impl BattleTank {
    pub fn has_effect(&self, kind: EffectKind) -> bool {
        self.effects.iter().any(|e| e.kind == kind)
    }

    /// Drop every effect without client notifications
    pub fn clear_effects(&mut self) {
        self.effects.clear();
        self.speed_multiplier = 1.0;
    }
}

impl BattleState {
    /// Use an inventory supply
    pub fn activate_item(&mut self, username: &str, item: &str) -> Result<(), BattleError> {
        let kind = EffectKind::from_item(item).ok_or_else(|| BattleError::UnknownItem(item.to_string()))?;
        let tank = self.require_tank(username)?;
        if tank.state != TankState::Active {
            return Err(BattleError::InvalidTankState {
                tank: username.to_string(),
                state: tank.state,
                expected: "Active",
            });
        }

        self.run_effect(username, kind)?;

        let mut blocked = kind.duration().unwrap_or_default();
        if self.info.properties.supplies_cooldown_enabled {
            blocked += kind.cooldown();
        }
        self.send_to(
            username,
            Command::with_args(
                CommandName::ClientActivateItem,
                [item.to_string(), blocked.as_millis().to_string(), true.to_string()],
            ),
        );
        Ok(())
    }

    /// Apply an effect, announce it and schedule its expiry
    ///
    /// Effects do not stack: a second activation of a running kind restarts
    /// its timer and drops the old entry, whose expiry then finds nothing.
    pub(crate) fn run_effect(&mut self, username: &str, kind: EffectKind) -> Result<(), BattleError> {
        let refreshed = {
            let tank = self.require_tank_mut(username)?;
            let before = tank.effects.len();
            tank.effects.retain(|e| e.kind != kind);
            tank.effects.len() != before
        };
        match kind {
            EffectKind::RepairKit => self.heal(username, username, effects::REPAIR_KIT_HEAL)?,
            EffectKind::DoubleArmor | EffectKind::DoubleDamage => {}
            EffectKind::Nitro if refreshed => {}
            EffectKind::Nitro => {
                let tank = self.require_tank_mut(username)?;
                tank.speed_multiplier *= effects::NITRO_SPEED_MULTIPLIER;
                self.broadcast_specification(username);
            }
            EffectKind::Mine => {
                let position = self.require_tank(username)?.position;
                self.spawn_mine(username, position);
            }
        }

        let duration = kind.duration();
        self.broadcast(Command::with_args(
            CommandName::EnableEffect,
            [
                username.to_string(),
                kind.id().to_string(),
                duration.map(|d| d.as_millis()).unwrap_or(0).to_string(),
                false.to_string(),
                "0".to_string(),
            ],
        ));

        let Some(duration) = duration else {
            return Ok(());
        };
        let effect_id = self.next_effect_id();
        let tank = self.require_tank_mut(username)?;
        tank.effects.push(TankEffect {
            id: effect_id,
            kind,
            started: Instant::now(),
            duration,
        });
        let incarnation = tank.incarnation;
        self.schedule_for_tank(
            username,
            duration,
            TimerEvent::EffectExpired {
                tank: username.to_string(),
                incarnation,
                effect: effect_id,
                kind,
            },
        );
        debug!(battle = %self.info.id, tank = %username, ?kind, "Effect activated");
        Ok(())
    }

    pub(crate) fn expire_effect(&mut self, username: &str, incarnation: u32, effect: u32, kind: EffectKind) {
        let Some(tank) = self.tank_incarnation_mut(username, incarnation) else {
            return;
        };
        let Some(index) = tank.effects.iter().position(|e| e.id == effect) else {
            return;
        };
        tank.effects.remove(index);
        if kind == EffectKind::Nitro {
            tank.speed_multiplier /= effects::NITRO_SPEED_MULTIPLIER;
            self.broadcast_specification(username);
        }
        self.broadcast(Command::with_args(
            CommandName::DisableEffect,
            [username.to_string(), kind.id().to_string(), false.to_string()],
        ));
        debug!(battle = %self.info.id, tank = %username, ?kind, "Effect expired");
    }

    fn broadcast_specification(&self, username: &str) {
        if let Some(tank) = self.tank(username) {
            self.broadcast(Command::with_args(
                CommandName::ChangeTankSpecification,
                [username.to_string(), tank.specification().to_string()],
            ));
        }
    }
}

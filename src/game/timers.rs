//! Scheduled battle continuations
//!
//! A timer is a spawned task that sleeps, then re-enters the battle
//! through its lock. The returned `AbortHandle` is kept in the owning
//! entity's `TaskScope` so removal cancels it; handlers still re-check
//! identity because a fire can race with cancellation.

use std::sync::Weak;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::trace;

use super::battle::{Battle, BattleState};
use super::effects::EffectKind;
use crate::util::Vector3;

#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    ActivateTank { tank: String, incarnation: u32 },
    SelfDestruct { tank: String, incarnation: u32 },
    EffectExpired { tank: String, incarnation: u32, effect: u32, kind: EffectKind },
    BonusExpired { bonus: u32 },
    GoldDrop { position: Vector3 },
    MineArmed { mine: u32 },
    /// Periodic supply drop; reschedules itself
    BonusDrop,
}

/// Spawns timers bound to one battle
#[derive(Debug, Clone)]
pub struct TimerScheduler {
    battle: Weak<Battle>,
}

impl TimerScheduler {
    pub fn new(battle: Weak<Battle>) -> Self {
        Self { battle }
    }

    pub fn schedule(&self, delay: Duration, event: TimerEvent) -> AbortHandle {
        let battle = self.battle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match battle.upgrade() {
                Some(battle) => battle.fire_timer(event),
                None => trace!(?event, "Timer fired after battle was dropped"),
            }
        })
        .abort_handle()
    }
}

impl BattleState {
    pub(crate) fn handle_timer(&mut self, event: TimerEvent) {
        trace!(battle = %self.info.id, ?event, "Timer fired");
        match event {
            TimerEvent::ActivateTank { tank, incarnation } => self.activate_tank(&tank, incarnation),
            TimerEvent::SelfDestruct { tank, incarnation } => {
                if self.tank_incarnation_mut(&tank, incarnation).is_some() {
                    self.self_destruct_now(&tank);
                }
            }
            TimerEvent::EffectExpired {
                tank,
                incarnation,
                effect,
                kind,
            } => self.expire_effect(&tank, incarnation, effect, kind),
            TimerEvent::BonusExpired { bonus } => self.expire_bonus(bonus),
            TimerEvent::GoldDrop { position } => self.drop_gold_box(position),
            TimerEvent::MineArmed { mine } => self.arm_mine(mine),
            TimerEvent::BonusDrop => self.periodic_bonus_drop(),
        }
    }

    /// Spawn a timer owned by the tank's current incarnation
    pub(crate) fn schedule_for_tank(&mut self, tank: &str, delay: Duration, event: TimerEvent) {
        let handle = self.scheduler.schedule(delay, event);
        match self.player_mut(tank).and_then(|p| p.tank.as_mut()) {
            Some(tank) => tank.tasks.add(handle),
            None => handle.abort(),
        }
    }

    /// Spawn a timer owned by the player (outlives tank incarnations)
    pub(crate) fn schedule_for_player(&mut self, username: &str, delay: Duration, event: TimerEvent) {
        let handle = self.scheduler.schedule(delay, event);
        match self.player_mut(username) {
            Some(player) => player.tasks.add(handle),
            None => handle.abort(),
        }
    }

    /// Spawn a timer owned by the battle itself
    pub(crate) fn schedule_for_battle(&mut self, delay: Duration, event: TimerEvent) {
        let handle = self.scheduler.schedule(delay, event);
        self.tasks.add(handle);
    }

    pub(crate) fn start_housekeeping(&mut self) {
        if !cfg!(feature = "bonus_drops")
            || !self.info.properties.bonuses_enabled
            || self.info.properties.parkour_mode
        {
            return;
        }
        if let Some(interval) = self.services.timings.bonus_spawn_interval {
            self.schedule_for_battle(interval, TimerEvent::BonusDrop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::battle::test_support::*;
    use crate::game::modes::BattleMode;
    use crate::game::properties::BattleProperties;
    use crate::game::tank::TankState;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_through_battle_lock() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _rx = join(&battle, 1, "alice", "railgun_m0", None);
        battle.lock().spawn_tank("alice").unwrap();
        assert_eq!(battle.lock().tank("alice").unwrap().state, TankState::SemiActive);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(battle.lock().tank("alice").unwrap().state, TankState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_after_battle_dropped_is_noop() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let scheduler = battle.lock().scheduler.clone();
        drop(battle);
        let handle = scheduler.schedule(Duration::from_millis(10), TimerEvent::BonusDrop);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tank_timer_cancelled_with_scope() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _rx = join(&battle, 1, "alice", "railgun_m0", None);
        battle.lock().spawn_tank("alice").unwrap();
        battle.lock().player_mut("alice").unwrap().cancel_tasks();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(battle.lock().tank("alice").unwrap().state, TankState::SemiActive);
    }
}

//! Mine placement, arming and detonation

use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::battle::{BattleError, BattleState};
use super::combat::DamageOptions;
use super::constants::damage;
use super::tank::TankState;
use super::timers::TimerEvent;
use crate::net::protocol::{Command, CommandName};
use crate::util::Vector3;

/// A mine placed by a tank
#[derive(Debug, Clone)]
pub struct BattleMine {
    pub id: u32,
    pub owner: String,
    pub position: Vector3,
    pub spawned: Instant,
    pub armed: bool,
}

impl BattleMine {
    /// Client-side key, `owner_id`
    pub fn key(&self) -> String {
        format!("{}_{}", self.owner, self.id)
    }

    pub fn spawn_data(&self) -> Value {
        json!({
            "mineId": self.key(),
            "userId": self.owner,
            "x": self.position.x,
            "y": self.position.y,
            "z": self.position.z,
        })
    }
}

impl BattleState {
    pub fn spawn_mine(&mut self, owner: &str, position: Vector3) -> u32 {
        let id = self.next_mine_id();
        let mine = BattleMine {
            id,
            owner: owner.to_string(),
            position,
            spawned: Instant::now(),
            armed: false,
        };
        self.broadcast(Command::with_args(CommandName::AddMine, [mine.spawn_data().to_string()]));
        debug!(battle = %self.info.id, mine = %mine.key(), "Mine placed");
        self.mines.insert(id, mine);

        let delay = self.services.timings.mine_arming_delay;
        self.schedule_for_player(owner, delay, TimerEvent::MineArmed { mine: id });
        id
    }

    pub(crate) fn arm_mine(&mut self, id: u32) {
        let Some(mine) = self.mines.get_mut(&id) else {
            return;
        };
        mine.armed = true;
        let key = mine.key();
        self.broadcast(Command::with_args(CommandName::ActivateMine, [key]));
    }

    /// A tank drove over a mine; the mine is consumed whatever the damage rules say
    pub fn trigger_mine(&mut self, victim: &str, key: &str) -> Result<(), BattleError> {
        let id = self
            .mines
            .iter()
            .find(|(_, mine)| mine.key() == key)
            .map(|(id, _)| *id)
            .ok_or_else(|| BattleError::MineNotFound(key.to_string()))?;
        let tank = self.require_tank(victim)?;
        if tank.state != TankState::Active {
            return Err(BattleError::InvalidTankState {
                tank: victim.to_string(),
                state: tank.state,
                expected: "Active",
            });
        }

        let Some(mine) = self.mines.remove(&id) else {
            return Err(BattleError::MineNotFound(key.to_string()));
        };
        let options = DamageOptions {
            ignore_source_effects: true,
            ..Default::default()
        };
        if self.player(&mine.owner).is_some() {
            self.deal_damage(&mine.owner, victim, damage::MINE_DAMAGE, options)?;
        } else {
            warn!(battle = %self.info.id, mine = %key, "Mine owner already gone");
        }

        // Damage is broadcast before the trigger
        self.broadcast(Command::with_args(
            CommandName::ClientTriggerMine,
            [mine.key(), victim.to_string()],
        ));
        self.services.metrics.mines_triggered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Remove all mines of `owner`. `native` sends one bulk removal,
    /// otherwise every mine is detonated without a victim.
    pub fn deactivate_mines(&mut self, owner: &str, native: bool) {
        let owned: Vec<u32> = self
            .mines
            .values()
            .filter(|m| m.owner == owner)
            .map(|m| m.id)
            .collect();
        if owned.is_empty() {
            return;
        }
        let removed: Vec<BattleMine> = owned.iter().filter_map(|id| self.mines.remove(id)).collect();
        if native {
            self.broadcast(Command::with_args(CommandName::RemoveMines, [owner]));
        } else {
            for mine in &removed {
                self.broadcast(Command::with_args(
                    CommandName::ClientTriggerMine,
                    [mine.key(), String::new()],
                ));
            }
        }
        debug!(battle = %self.info.id, owner = %owner, count = removed.len(), "Mines removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::battle::test_support::*;
    use crate::game::modes::BattleMode;
    use crate::game::properties::BattleProperties;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_mine_arms_after_delay() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let mut rx = join_active(&battle, 1, "a", "railgun_m0", None);
        drain(&mut rx);

        let id = battle.lock().spawn_mine("a", Vector3::new(1.0, 2.0, 3.0));
        let placed = drain(&mut rx);
        assert_eq!(names(&placed), [CommandName::AddMine]);
        let data: Value = serde_json::from_str(&placed[0].args[0]).unwrap();
        assert_eq!(data["mineId"], format!("a_{id}"));
        assert_eq!(data["userId"], "a");

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let armed = drain(&mut rx);
        assert_eq!(names(&armed), [CommandName::ActivateMine]);
        assert!(battle.lock().mines[&id].armed);
    }

    #[tokio::test]
    async fn test_trigger_damages_and_consumes() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _a = join_active(&battle, 1, "a", "railgun_m0", None);
        let mut b = join_active(&battle, 2, "b", "railgun_m0", None);
        let id = battle.lock().spawn_mine("a", Vector3::ZERO);
        // Owner's double damage has no effect on mines
        battle.lock().activate_item("a", "double_damage").unwrap();
        drain(&mut b);

        let key = format!("a_{id}");
        battle.lock().trigger_mine("b", &key).unwrap();
        assert_eq!(health(&battle, "b"), 10_000.0 - 80.0 * 30.0);
        let sent = drain(&mut b);
        let position = |name| sent.iter().position(|c| c.name == name).unwrap();
        let hit = &sent[position(CommandName::ClientTriggerMine)];
        assert_eq!(hit.args, [key.clone(), "b".to_string()]);
        assert!(position(CommandName::ChangeHealth) < position(CommandName::ClientTriggerMine));

        assert!(matches!(
            battle.lock().trigger_mine("b", &key),
            Err(BattleError::MineNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivate_native_vs_detonate() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let mut rx = join_active(&battle, 1, "a", "railgun_m0", None);
        let mut state = battle.lock();
        state.spawn_mine("a", Vector3::ZERO);
        state.spawn_mine("a", Vector3::ZERO);
        drain(&mut rx);

        state.deactivate_mines("a", false);
        let sent = drain(&mut rx);
        assert_eq!(names(&sent), [CommandName::ClientTriggerMine, CommandName::ClientTriggerMine]);
        assert_eq!(sent[0].args[1], "");
        assert!(state.mines.is_empty());

        state.spawn_mine("a", Vector3::ZERO);
        drain(&mut rx);
        state.deactivate_mines("a", true);
        assert_eq!(names(&drain(&mut rx)), [CommandName::RemoveMines]);
        // Nothing left, nothing sent
        state.deactivate_mines("a", true);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_leaving_removes_mines() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _a = join_active(&battle, 1, "a", "railgun_m0", None);
        let mut b = join(&battle, 2, "b", "railgun_m0", None);
        battle.lock().spawn_mine("a", Vector3::ZERO);
        drain(&mut b);

        battle.lock().remove_player("a").unwrap();
        let sent = names(&drain(&mut b));
        assert_eq!(sent[0], CommandName::RemoveMines);
        assert!(battle.lock().mines.is_empty());
    }
}

//! Damage application, healing and kills

use std::sync::atomic::Ordering;
use tracing::{debug, info};

use super::battle::{BattleError, BattleState};
use super::constants::{effects, scoring, tank};
use super::damage::DamageType;
use super::effects::EffectKind;
use super::player::Team;
use super::tank::TankState;
use crate::net::protocol::{Command, CommandName};
use crate::store::QuestEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamageOptions {
    /// Skip the source's damage multipliers (mines)
    pub ignore_source_effects: bool,
    pub critical: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Rules or target state prevented the hit
    Ignored,
    Damaged { health: f64 },
    Killed,
}

impl BattleState {
    /// Whether `source` may hurt `target` under the battle rules
    fn damage_allowed(&self, source: &str, target: &str) -> bool {
        let props = &self.info.properties;
        if !props.damage_enabled {
            return false;
        }
        if source == target {
            return props.self_damage_enabled;
        }
        if self.info.mode.is_team() {
            let team = self.team_of(source);
            if team != Team::None && team == self.team_of(target) {
                return props.friendly_fire;
            }
        }
        true
    }

    /// Apply `amount` weapon damage; health drops by `amount * 30`
    pub fn deal_damage(
        &mut self,
        source: &str,
        target: &str,
        amount: f64,
        options: DamageOptions,
    ) -> Result<DamageOutcome, BattleError> {
        if !self.damage_allowed(source, target) || !self.is_active_tank(target) {
            return Ok(DamageOutcome::Ignored);
        }

        let mut total = amount;
        if !options.ignore_source_effects
            && self.tank(source).is_some_and(|t| t.has_effect(EffectKind::DoubleDamage))
        {
            total *= effects::DOUBLE_MULTIPLIER;
        }
        let target_tank = self.require_tank_mut(target)?;
        if target_tank.has_effect(EffectKind::DoubleArmor) {
            total /= effects::DOUBLE_MULTIPLIER;
        }

        target_tank.health = (target_tank.health - total * tank::HEALTH_PER_DAMAGE).max(0.0);
        let health = target_tank.health;
        self.broadcast(Command::with_args(
            CommandName::ChangeHealth,
            [target.to_string(), health.to_string()],
        ));
        self.services.metrics.damage_events.fetch_add(1, Ordering::Relaxed);

        let (outcome, kind) = if health <= 0.0 {
            self.kill(target, source)?;
            (DamageOutcome::Killed, DamageType::Fatal)
        } else if options.critical {
            (DamageOutcome::Damaged { health }, DamageType::Critical)
        } else {
            (DamageOutcome::Damaged { health }, DamageType::Normal)
        };
        self.send_to(
            source,
            Command::with_args(
                CommandName::DamageTank,
                [target.to_string(), total.to_string(), kind.key().to_string()],
            ),
        );
        Ok(outcome)
    }

    /// Restore `amount * 30` health, capped at full health
    pub fn heal(&mut self, source: &str, target: &str, amount: f64) -> Result<(), BattleError> {
        let target_tank = self.require_tank_mut(target)?;
        if target_tank.state == TankState::Dead {
            return Ok(());
        }
        target_tank.health = (target_tank.health + amount * tank::HEALTH_PER_DAMAGE).min(tank::MAX_HEALTH);
        let health = target_tank.health;
        self.broadcast(Command::with_args(
            CommandName::ChangeHealth,
            [target.to_string(), health.to_string()],
        ));
        if source != target {
            self.send_to(
                source,
                Command::with_args(
                    CommandName::DamageTank,
                    [target.to_string(), amount.to_string(), DamageType::Heal.key().to_string()],
                ),
            );
        }
        Ok(())
    }

    /// Transition `victim` to Dead; respawn is requested by the client
    pub fn kill(&mut self, victim: &str, killer: &str) -> Result<(), BattleError> {
        let victim_tank = self.require_tank_mut(victim)?;
        if victim_tank.state == TankState::Dead {
            return Ok(());
        }
        victim_tank.state = TankState::Dead;
        victim_tank.self_destructing = false;
        victim_tank.tasks.cancel_all();
        victim_tank.weapon.set_fire_started(false);
        victim_tank.clear_effects();

        self.drop_carried_flag(victim);
        if self.info.properties.deactivate_mines_on_death {
            self.deactivate_mines(victim, true);
        }

        let suicide = victim == killer;
        self.send_to(victim, Command::new(CommandName::KillLocalTank));
        self.broadcast(Command::with_args(
            CommandName::KillTank,
            [victim, if suicide { "suicide" } else { "killed" }, killer],
        ));

        if let Some(player) = self.player_mut(victim) {
            player.deaths += 1;
        }
        if !suicide {
            if let Some(player) = self.player_mut(killer) {
                player.kills += 1;
                player.score += scoring::KILL_SCORE;
            }
            self.update_statistics(killer);

            let killer_team = self.team_of(killer);
            let enemy = killer_team == Team::None || killer_team != self.team_of(victim);
            if enemy {
                if matches!(
                    self.info.mode,
                    super::modes::BattleMode::TeamDeathmatch | super::modes::BattleMode::ControlPoints
                ) {
                    self.add_team_score(killer_team, 1);
                }
                self.fund += scoring::FUND_PER_KILL;
                self.broadcast_fund();
                self.services.quests.record(killer, QuestEvent::KillEnemy);
            }
        }
        self.update_statistics(victim);

        self.services.metrics.kills_total.fetch_add(1, Ordering::Relaxed);
        if suicide {
            debug!(battle = %self.info.id, tank = %victim, "Tank self-destructed");
        } else {
            info!(battle = %self.info.id, victim = %victim, killer = %killer, "Tank killed");
        }
        Ok(())
    }
}

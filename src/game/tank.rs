//! Tank entity and its lifecycle inside a battle
//!
//! ```text
//! Respawn --ready_to_spawn--> SemiActive --timer--> Active --kill--> Dead
//!    ^                                                               |
//!    +------------------ ready_to_respawn (new incarnation) ---------+
//! ```

use rand::thread_rng;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::battle::{BattleError, BattleState};
use super::constants::tank;
use super::effects::TankEffect;
use super::player::Team;
use super::timers::TimerEvent;
use super::weapons::Weapon;
use crate::catalog::{HullSpec, PaintSpec};
use crate::net::protocol::{Command, CommandName};
use crate::util::{TaskScope, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TankState {
    /// Created, waiting for the client to place it
    Respawn,
    /// Placed and visible, not yet hittable
    SemiActive,
    Active,
    Dead,
}

impl TankState {
    /// State name used in `init_tank`
    pub fn init_key(self) -> &'static str {
        match self {
            TankState::Respawn | TankState::SemiActive => "newcome",
            TankState::Active => "active",
            TankState::Dead => "suicide",
        }
    }
}

#[derive(Debug)]
pub struct BattleTank {
    pub id: String,
    pub incarnation: u32,
    pub state: TankState,
    pub health: f64,
    pub position: Vector3,
    pub orientation: Vector3,
    pub hull: Arc<HullSpec>,
    pub weapon: Weapon,
    pub paint: Option<Arc<PaintSpec>>,
    pub effects: Vec<TankEffect>,
    pub speed_multiplier: f64,
    pub self_destructing: bool,
    /// Timers bound to this incarnation
    pub tasks: TaskScope,
}

impl BattleTank {
    pub fn new(
        id: String,
        incarnation: u32,
        hull: Arc<HullSpec>,
        weapon: Weapon,
        paint: Option<Arc<PaintSpec>>,
    ) -> Self {
        Self {
            id,
            incarnation,
            state: TankState::Respawn,
            health: tank::MAX_HEALTH,
            position: Vector3::new(0.0, 0.0, tank::INITIAL_HEIGHT),
            orientation: Vector3::ZERO,
            hull,
            weapon,
            paint,
            effects: Vec::new(),
            speed_multiplier: 1.0,
            self_destructing: false,
            tasks: TaskScope::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TankState::Active
    }

    pub fn placement(&self) -> String {
        self.position.to_placement(self.orientation.z)
    }

    pub fn init_data(&self, battle_id: &str, rank: u8, team: Team) -> Value {
        let physics = &self.hull.physics;
        json!({
            "battleId": battle_id,
            "tank_id": self.id,
            "nickname": self.id,
            "rank": rank,
            "team_type": team.key(),
            "incration": self.incarnation,
            "state": self.state.init_key(),
            "health": self.health,
            "hull_id": self.hull.id,
            "hullResource": self.hull.resource,
            "turret_id": self.weapon.spec().id,
            "turretResource": self.weapon.spec().resource,
            "colormap_id": self.paint.as_ref().map(|p| p.resource).unwrap_or_default(),
            "maxSpeed": physics.speed * self.speed_multiplier,
            "maxTurnSpeed": physics.turn_speed,
            "acceleration": physics.acceleration,
            "reverseAcceleration": physics.reverse_acceleration,
            "sideAcceleration": physics.side_acceleration,
            "turnAcceleration": physics.turn_acceleration,
            "reverseTurnAcceleration": physics.reverse_turn_acceleration,
            "mass": physics.mass,
            "power": physics.power,
            "dampingCoeff": physics.damping,
            "turret_turn_speed": self.weapon.spec().turret_rotation_speed,
            "turretTurnAcceleration": self.weapon.spec().turret_turn_acceleration,
            "reloadMsec": self.weapon.spec().reload_ms,
            "position": self.position.to_string(),
            "orientation": self.orientation.to_string(),
        })
    }

    pub fn spawn_data(&self, team: Team) -> Value {
        json!({
            "tank_id": self.id,
            "health": self.health,
            "incration_id": self.incarnation,
            "team_type": team.key(),
            "x": self.position.x,
            "y": self.position.y,
            "z": self.position.z,
            "rot": self.orientation.z,
            "speed": self.hull.physics.speed * self.speed_multiplier,
            "turn_speed": self.hull.physics.turn_speed,
            "turret_rotation_speed": self.weapon.spec().turret_rotation_speed,
            "turretTurnAcceleration": self.weapon.spec().turret_turn_acceleration,
            "acceleration": self.hull.physics.acceleration,
            "reverseAcceleration": self.hull.physics.reverse_acceleration,
            "sideAcceleration": self.hull.physics.side_acceleration,
            "turnAcceleration": self.hull.physics.turn_acceleration,
            "reverseTurnAcceleration": self.hull.physics.reverse_turn_acceleration,
            "mass": self.hull.physics.mass,
            "power": self.hull.physics.power,
            "dampingCoeff": self.hull.physics.damping,
        })
    }

    /// Payload of `change_spec_tank`
    pub fn specification(&self) -> Value {
        json!({
            "speed": self.hull.physics.speed * self.speed_multiplier,
            "turnSpeed": self.hull.physics.turn_speed,
            "turretRotationSpeed": self.weapon.spec().turret_rotation_speed,
            "turretTurnAcceleration": self.weapon.spec().turret_turn_acceleration,
            "acceleration": self.hull.physics.acceleration,
            "reverseAcceleration": self.hull.physics.reverse_acceleration,
            "sideAcceleration": self.hull.physics.side_acceleration,
            "turnAcceleration": self.hull.physics.turn_acceleration,
            "reverseTurnAcceleration": self.hull.physics.reverse_turn_acceleration,
            "dampingCoeff": self.hull.physics.damping,
        })
    }

    fn expect_state(&self, expected: TankState, label: &'static str) -> Result<(), BattleError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(BattleError::InvalidTankState {
                tank: self.id.clone(),
                state: self.state,
                expected: label,
            })
        }
    }
}

impl BattleState {
    /// Pick a spawn point and tell the client where to place the tank
    pub fn prepare_to_spawn(&mut self, username: &str) -> Result<(), BattleError> {
        let team = self.require_player(username)?.team;
        let spawn = self
            .info
            .map
            .random_spawn(team, &mut thread_rng())
            .map(|point| (point.position, point.rotation));
        let tank = self.require_tank_mut(username)?;
        tank.expect_state(TankState::Respawn, "Respawn")?;

        if let Some((position, rotation)) = spawn {
            tank.position = position.lifted(tank::SPAWN_HEIGHT_OFFSET);
            tank.orientation = rotation;
        }
        let command = Command::with_args(
            CommandName::PrepareToSpawn,
            [tank.id.clone(), tank.placement()],
        );
        self.send_to(username, command);
        Ok(())
    }

    /// Client placed the tank: show it and arm the activation timer
    pub fn spawn_tank(&mut self, username: &str) -> Result<(), BattleError> {
        let team = self.require_player(username)?.team;
        let tank = self.require_tank_mut(username)?;
        tank.expect_state(TankState::Respawn, "Respawn")?;

        tank.state = TankState::SemiActive;
        tank.health = tank::MAX_HEALTH;
        let incarnation = tank.incarnation;
        let health = Command::with_args(
            CommandName::ChangeHealth,
            [tank.id.clone(), tank.health.to_string()],
        );
        let spawn = Command::with_args(CommandName::SpawnTank, [tank.spawn_data(team).to_string()]);

        self.broadcast(health);
        self.broadcast(spawn);
        let delay = self.services.timings.tank_activation_delay;
        self.schedule_for_tank(
            username,
            delay,
            TimerEvent::ActivateTank {
                tank: username.to_string(),
                incarnation,
            },
        );
        debug!(battle = %self.info.id, tank = %username, incarnation, "Tank spawned");
        Ok(())
    }

    /// Activation timer continuation; stale incarnations are ignored
    pub(crate) fn activate_tank(&mut self, username: &str, incarnation: u32) {
        let Some(tank) = self.tank_incarnation_mut(username, incarnation) else {
            return;
        };
        if tank.state != TankState::SemiActive {
            return;
        }
        tank.state = TankState::Active;

        // The activating client learns which tanks are already hittable
        let active: Vec<String> = self
            .players
            .iter()
            .filter_map(|p| p.tank.as_ref())
            .filter(|t| t.is_active() && t.id != username)
            .map(|t| t.id.clone())
            .collect();
        for id in active {
            self.send_to(username, Command::with_args(CommandName::ActivateTank, [id]));
        }
        self.broadcast(Command::with_args(CommandName::ActivateTank, [username]));
        debug!(battle = %self.info.id, tank = %username, "Tank activated");
    }

    /// Dead tank asks for a new life
    pub fn respawn(&mut self, username: &str) -> Result<(), BattleError> {
        self.require_tank(username)?
            .expect_state(TankState::Dead, "Dead")?;
        self.create_tank(username)?;
        self.prepare_to_spawn(username)
    }

    /// Self-destruct request; delayed unless the battle makes it instant
    pub fn request_self_destruct(&mut self, username: &str) -> Result<(), BattleError> {
        let instant = self.info.properties.instant_self_destruct;
        let delay = self.services.timings.self_destruct_delay;
        let tank = self.require_tank(username)?;
        if tank.state == TankState::Dead || tank.self_destructing {
            return Ok(());
        }
        if instant {
            self.self_destruct_now(username);
            return Ok(());
        }
        let tank = self.require_tank_mut(username)?;
        tank.self_destructing = true;
        let incarnation = tank.incarnation;
        self.schedule_for_tank(
            username,
            delay,
            TimerEvent::SelfDestruct {
                tank: username.to_string(),
                incarnation,
            },
        );
        Ok(())
    }

    pub(crate) fn self_destruct_now(&mut self, username: &str) {
        if let Err(e) = self.kill(username, username) {
            warn!(battle = %self.info.id, tank = %username, error = %e, "Self-destruct failed");
        }
    }

    /// Movement gate: `Ok(false)` suppresses the relay
    pub fn track_movement(&mut self, username: &str, position: Option<Vector3>) -> Result<bool, BattleError> {
        let tank = self.require_tank_mut(username)?;
        match tank.state {
            TankState::Dead => Ok(false),
            TankState::Respawn => {
                warn!(tank = %username, "Movement from a tank that is not spawned yet");
                Ok(true)
            }
            TankState::SemiActive | TankState::Active => {
                if let Some(position) = position {
                    tank.position = position;
                }
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::battle::test_support::*;
    use crate::game::modes::BattleMode;
    use crate::game::properties::BattleProperties;
    use std::time::Duration;

    #[tokio::test]
    async fn test_prepare_to_spawn_lifts_position() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let mut rx = join(&battle, 1, "alice", "railgun_m0", None);
        let prepare = drain(&mut rx)
            .into_iter()
            .find(|c| c.name == CommandName::PrepareToSpawn)
            .unwrap();
        assert_eq!(prepare.args[0], "alice");
        let parts: Vec<f64> = prepare.args[1].split('@').map(|v| v.parse().unwrap()).collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[2], 200.0);
    }

    #[tokio::test]
    async fn test_spawn_broadcasts_health_then_spawn() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let mut rx = join(&battle, 1, "alice", "railgun_m0", None);
        drain(&mut rx);
        battle.lock().spawn_tank("alice").unwrap();
        let sent = drain(&mut rx);
        assert_eq!(names(&sent), [CommandName::ChangeHealth, CommandName::SpawnTank]);
        assert_eq!(sent[0].args, ["alice", "10000"]);

        // Second spawn is a state error
        assert!(matches!(
            battle.lock().spawn_tank("alice"),
            Err(BattleError::InvalidTankState { .. })
        ));
    }

    #[tokio::test]
    async fn test_activation_introduces_active_tanks() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _alice = join_active(&battle, 1, "alice", "railgun_m0", None);
        let mut bob = join(&battle, 2, "bob", "railgun_m0", None);
        battle.lock().spawn_tank("bob").unwrap();
        drain(&mut bob);

        let mut state = battle.lock();
        let incarnation = state.tank("bob").unwrap().incarnation;
        // Stale incarnation is ignored
        state.activate_tank("bob", incarnation + 1);
        assert_eq!(state.tank("bob").unwrap().state, TankState::SemiActive);
        state.activate_tank("bob", incarnation);
        drop(state);

        let sent = drain(&mut bob);
        assert_eq!(sent[0].args, ["alice"]);
        assert_eq!(sent[1].args, ["bob"]);
    }

    #[tokio::test]
    async fn test_respawn_requires_dead_tank() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _rx = join_active(&battle, 1, "alice", "railgun_m0", None);
        let mut state = battle.lock();
        assert!(matches!(
            state.respawn("alice"),
            Err(BattleError::InvalidTankState { .. })
        ));
        state.kill("alice", "alice").unwrap();
        state.respawn("alice").unwrap();
        let tank = state.tank("alice").unwrap();
        assert_eq!(tank.incarnation, 2);
        assert_eq!(tank.state, TankState::Respawn);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_self_destruct() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _rx = join_active(&battle, 1, "alice", "railgun_m0", None);
        battle.lock().request_self_destruct("alice").unwrap();
        // Duplicate request is ignored
        battle.lock().request_self_destruct("alice").unwrap();
        assert_eq!(battle.lock().tank("alice").unwrap().state, TankState::Active);

        tokio::time::sleep(Duration::from_secs(11)).await;
        let state = battle.lock();
        assert_eq!(state.tank("alice").unwrap().state, TankState::Dead);
        assert_eq!(state.player("alice").unwrap().deaths, 1);
    }

    #[tokio::test]
    async fn test_instant_self_destruct() {
        let props = BattleProperties {
            instant_self_destruct: true,
            ..Default::default()
        };
        let battle = battle(BattleMode::Deathmatch, props);
        let _rx = join_active(&battle, 1, "alice", "railgun_m0", None);
        battle.lock().request_self_destruct("alice").unwrap();
        assert_eq!(battle.lock().tank("alice").unwrap().state, TankState::Dead);
    }

    #[tokio::test]
    async fn test_movement_gate() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _rx = join(&battle, 1, "alice", "railgun_m0", None);
        let mut state = battle.lock();
        let target = Vector3::new(1.0, 2.0, 3.0);

        // Respawn: relayed but position untouched
        assert!(state.track_movement("alice", Some(target)).unwrap());
        assert_ne!(state.tank("alice").unwrap().position, target);

        state.spawn_tank("alice").unwrap();
        assert!(state.track_movement("alice", Some(target)).unwrap());
        assert_eq!(state.tank("alice").unwrap().position, target);

        state.kill("alice", "alice").unwrap();
        assert!(!state.track_movement("alice", None).unwrap());
    }
}

//! Weapon handlers and firing contracts
//!
//! Each kind supports a subset of the fire operations; anything else is
//! rejected with `UnsupportedFire`. Shot events are cosmetic relays to
//! the other participants, sent after damage has been applied.

use rand::thread_rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

use super::battle::{BattleError, BattleState};
use super::combat::DamageOptions;
use super::constants::damage;
use super::damage::{chain_falloff, DamageCalculator, DamageError};
use super::player::Team;
use crate::catalog::WeaponSpec;
use crate::net::protocol::{Command, CommandName};
use crate::util::Vector3;

/// Impact force attached to shaft shot events
const SHAFT_IMPACT_FORCE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeaponKind {
    Railgun,
    Thunder,
    Smoky,
    Twins,
    Ricochet,
    Shaft,
    Flamethrower,
    Freeze,
    Isida,
}

#[derive(Debug, Clone)]
pub struct WeaponCore {
    pub spec: Arc<WeaponSpec>,
    pub calculator: DamageCalculator,
}

/// Per-tank weapon state; rebuilt on every tank incarnation
#[derive(Debug, Clone)]
pub enum Weapon {
    Railgun(WeaponCore),
    Thunder(WeaponCore),
    Smoky(WeaponCore),
    Twins(WeaponCore),
    Ricochet(WeaponCore),
    Shaft { core: WeaponCore, sniping: bool },
    Flamethrower { core: WeaponCore, fire_started: bool },
    Freeze { core: WeaponCore, fire_started: bool },
    Isida { core: WeaponCore, fire_started: bool },
}

impl Weapon {
    pub fn new(spec: Arc<WeaponSpec>) -> Result<Self, DamageError> {
        let core = WeaponCore {
            calculator: DamageCalculator::new(spec.damage)?,
            spec,
        };
        Ok(match core.spec.kind {
            WeaponKind::Railgun => Weapon::Railgun(core),
            WeaponKind::Thunder => Weapon::Thunder(core),
            WeaponKind::Smoky => Weapon::Smoky(core),
            WeaponKind::Twins => Weapon::Twins(core),
            WeaponKind::Ricochet => Weapon::Ricochet(core),
            WeaponKind::Shaft => Weapon::Shaft { core, sniping: false },
            WeaponKind::Flamethrower => Weapon::Flamethrower { core, fire_started: false },
            WeaponKind::Freeze => Weapon::Freeze { core, fire_started: false },
            WeaponKind::Isida => Weapon::Isida { core, fire_started: false },
        })
    }

    pub fn core(&self) -> &WeaponCore {
        match self {
            Weapon::Railgun(core)
            | Weapon::Thunder(core)
            | Weapon::Smoky(core)
            | Weapon::Twins(core)
            | Weapon::Ricochet(core)
            | Weapon::Shaft { core, .. }
            | Weapon::Flamethrower { core, .. }
            | Weapon::Freeze { core, .. }
            | Weapon::Isida { core, .. } => core,
        }
    }

    pub fn spec(&self) -> &WeaponSpec {
        &self.core().spec
    }

    pub fn kind(&self) -> WeaponKind {
        self.spec().kind
    }

    /// Sustained fire currently running
    pub fn fire_started(&self) -> bool {
        matches!(
            self,
            Weapon::Flamethrower { fire_started: true, .. }
                | Weapon::Freeze { fire_started: true, .. }
                | Weapon::Isida { fire_started: true, .. }
        )
    }

    pub(crate) fn set_fire_started(&mut self, started: bool) {
        if let Weapon::Flamethrower { fire_started, .. }
        | Weapon::Freeze { fire_started, .. }
        | Weapon::Isida { fire_started, .. } = self
        {
            *fire_started = started;
        }
    }
}

/// Superset of the fire payload fields sent by the different weapons
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FirePayload {
    pub phys_time: i64,
    pub target: Option<String>,
    pub targets: Vec<String>,
    pub hit_point: Option<Vector3>,
    pub hit_point_world: Option<Vector3>,
    pub splash_target_ids: Vec<String>,
    pub splash_target_distances: Vec<String>,
}

impl FirePayload {
    pub fn parse(raw: &str) -> Result<Self, BattleError> {
        serde_json::from_str(raw).map_err(|e| BattleError::Payload(e.to_string()))
    }
}

fn payload_value(raw: &str) -> Result<Value, BattleError> {
    serde_json::from_str(raw).map_err(|e| BattleError::Payload(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IsidaMode {
    Damage,
    Heal,
}

impl IsidaMode {
    fn key(self) -> &'static str {
        match self {
            IsidaMode::Damage => "damage",
            IsidaMode::Heal => "heal",
        }
    }
}

impl BattleState {
    fn weapon_kind(&self, shooter: &str) -> Result<WeaponKind, BattleError> {
        Ok(self.require_tank(shooter)?.weapon.kind())
    }

    fn unsupported(kind: WeaponKind, operation: &'static str) -> BattleError {
        BattleError::UnsupportedFire {
            weapon: kind,
            operation,
        }
    }

    fn relay_shot(&self, shooter: &str, name: CommandName, payload: Option<String>) {
        let mut args = vec![shooter.to_string()];
        args.extend(payload);
        self.broadcast_except(shooter, Command::with_args(name, args));
    }

    fn calculator(&self, shooter: &str) -> Result<DamageCalculator, BattleError> {
        Ok(self.require_tank(shooter)?.weapon.core().calculator)
    }

    /// Distance in meters between two tanks
    fn tank_distance(&self, a: &str, b: &str) -> f64 {
        match (self.tank(a), self.tank(b)) {
            (Some(a), Some(b)) => a.position.distance_to(b.position) * damage::TO_METERS,
            _ => 0.0,
        }
    }

    pub fn start_fire(&mut self, shooter: &str, raw: &str) -> Result<(), BattleError> {
        match self.weapon_kind(shooter)? {
            WeaponKind::Railgun => {
                self.relay_shot(shooter, CommandName::ClientStartFire, None);
                Ok(())
            }
            WeaponKind::Flamethrower | WeaponKind::Freeze => {
                self.require_tank_mut(shooter)?.weapon.set_fire_started(true);
                self.relay_shot(shooter, CommandName::ClientStartFire, None);
                Ok(())
            }
            WeaponKind::Isida => self.isida_start(shooter, raw),
            kind => Err(Self::unsupported(kind, "start_fire")),
        }
    }

    pub fn fire(&mut self, shooter: &str, raw: &str) -> Result<(), BattleError> {
        match self.weapon_kind(shooter)? {
            WeaponKind::Thunder | WeaponKind::Smoky | WeaponKind::Twins | WeaponKind::Ricochet => {
                self.relay_shot(shooter, CommandName::Shot, Some(raw.to_string()));
                Ok(())
            }
            kind => Err(Self::unsupported(kind, "fire")),
        }
    }

    pub fn fire_static(&mut self, shooter: &str, raw: &str) -> Result<(), BattleError> {
        match self.weapon_kind(shooter)? {
            WeaponKind::Thunder => {
                let payload = FirePayload::parse(raw)?;
                let hit = payload.hit_point.or(payload.hit_point_world);
                self.thunder_splash(shooter, hit, &payload)?;
            }
            WeaponKind::Smoky | WeaponKind::Twins | WeaponKind::Ricochet => {}
            kind => return Err(Self::unsupported(kind, "fire_static")),
        }
        self.relay_shot(shooter, CommandName::ShotStatic, Some(raw.to_string()));
        Ok(())
    }

    pub fn fire_target(&mut self, shooter: &str, raw: &str) -> Result<(), BattleError> {
        let kind = self.weapon_kind(shooter)?;
        let payload = FirePayload::parse(raw)?;
        let mut rng = thread_rng();
        let mut relay = Some(raw.to_string());

        match kind {
            WeaponKind::Railgun => {
                let mut amount = self.calculator(shooter)?.base_damage(&mut rng);
                for target in &payload.targets {
                    if !self.is_active_tank(target) {
                        continue;
                    }
                    self.deal_damage(shooter, target, amount, DamageOptions::default())?;
                    amount = chain_falloff(amount, damage::RAILGUN_CHAIN_FALLOFF);
                }
            }
            WeaponKind::Thunder => {
                if let Some(target) = payload.target.as_deref().filter(|t| self.is_active_tank(t)) {
                    let amount = self.calculator(shooter)?.base_damage(&mut rng);
                    self.deal_damage(shooter, target, amount, DamageOptions::default())?;
                }
                let hit = payload.hit_point_world.or(payload.hit_point);
                self.thunder_splash(shooter, hit, &payload)?;
            }
            WeaponKind::Smoky => {
                let mut shot = payload_value(raw)?;
                if let Some(target) = payload.target.as_deref().filter(|t| self.is_active_tank(t)) {
                    let distance = self.tank_distance(shooter, target);
                    let result = self.calculator(shooter)?.calculate(&mut rng, distance, false);
                    self.deal_damage(
                        shooter,
                        target,
                        result.damage,
                        DamageOptions {
                            critical: result.is_critical,
                            ..Default::default()
                        },
                    )?;
                    if let Value::Object(map) = &mut shot {
                        map.insert("weakening".into(), result.weakening.into());
                        map.insert("critical".into(), result.is_critical.into());
                    }
                }
                relay = Some(shot.to_string());
            }
            WeaponKind::Twins | WeaponKind::Ricochet => {
                if let Some(target) = payload.target.as_deref().filter(|t| self.is_active_tank(t)) {
                    let amount = self.calculator(shooter)?.base_damage(&mut rng);
                    self.deal_damage(shooter, target, amount, DamageOptions::default())?;
                }
            }
            WeaponKind::Shaft => {
                let amount = self.calculator(shooter)?.base_damage(&mut rng);
                relay = Some(self.shaft_hit(shooter, raw, &payload, amount)?);
            }
            WeaponKind::Flamethrower | WeaponKind::Freeze => {
                if !self.require_tank(shooter)?.weapon.fire_started() {
                    trace!(tank = %shooter, "Sustained fire target without start");
                    return Ok(());
                }
                let calculator = self.calculator(shooter)?;
                for target in &payload.targets {
                    if !self.is_active_tank(target) {
                        continue;
                    }
                    let distance = self.tank_distance(shooter, target);
                    let result = calculator.calculate(&mut rng, distance, false);
                    self.deal_damage(shooter, target, result.damage, DamageOptions::default())?;
                }
                // Sustained fire has no per-tick shot event
                relay = None;
            }
            WeaponKind::Isida => return Err(Self::unsupported(kind, "fire_target")),
        }

        if let Some(relay) = relay {
            self.relay_shot(shooter, CommandName::ShotTarget, Some(relay));
        }
        Ok(())
    }

    pub fn stop_fire(&mut self, shooter: &str) -> Result<(), BattleError> {
        match self.weapon_kind(shooter)? {
            WeaponKind::Flamethrower | WeaponKind::Freeze | WeaponKind::Isida => {
                self.require_tank_mut(shooter)?.weapon.set_fire_started(false);
                self.relay_shot(shooter, CommandName::ClientStopFire, None);
                Ok(())
            }
            kind => Err(Self::unsupported(kind, "stop_fire")),
        }
    }

    /// Splash hits around `hit`; distances reported by the client win
    fn thunder_splash(
        &mut self,
        shooter: &str,
        hit: Option<Vector3>,
        payload: &FirePayload,
    ) -> Result<(), BattleError> {
        let calculator = self.calculator(shooter)?;
        let mut rng = thread_rng();
        for (index, target) in payload.splash_target_ids.iter().enumerate() {
            if !self.is_active_tank(target) {
                continue;
            }
            let reported = payload
                .splash_target_distances
                .get(index)
                .and_then(|d| d.parse::<f64>().ok());
            let distance = match (reported, hit, self.tank(target)) {
                (Some(distance), _, _) => distance * damage::TO_METERS,
                (None, Some(hit), Some(tank)) => hit.distance_to(tank.position) * damage::TO_METERS,
                _ => continue,
            };
            let result = calculator.calculate(&mut rng, distance, true);
            if result.damage <= 0.0 {
                continue;
            }
            self.deal_damage(shooter, target, result.damage, DamageOptions::default())?;
        }
        Ok(())
    }

    fn shaft_hit(
        &mut self,
        shooter: &str,
        raw: &str,
        payload: &FirePayload,
        amount: f64,
    ) -> Result<String, BattleError> {
        if let Some(target) = payload.target.as_deref().filter(|t| self.is_active_tank(t)) {
            self.deal_damage(shooter, target, amount, DamageOptions::default())?;
        }
        let mut shot = payload_value(raw)?;
        if let Value::Object(map) = &mut shot {
            map.insert("impactForce".into(), SHAFT_IMPACT_FORCE.into());
        }
        Ok(shot.to_string())
    }

    pub fn enter_sniping_mode(&mut self, shooter: &str) -> Result<(), BattleError> {
        self.set_sniping(shooter, true)?;
        self.relay_shot(shooter, CommandName::ClientEnterSnipingMode, None);
        Ok(())
    }

    pub fn exit_sniping_mode(&mut self, shooter: &str) -> Result<(), BattleError> {
        self.set_sniping(shooter, false)?;
        self.relay_shot(shooter, CommandName::ClientExitSnipingMode, None);
        Ok(())
    }

    fn set_sniping(&mut self, shooter: &str, value: bool) -> Result<(), BattleError> {
        match &mut self.require_tank_mut(shooter)?.weapon {
            Weapon::Shaft { sniping, .. } => {
                *sniping = value;
                Ok(())
            }
            other => Err(Self::unsupported(other.kind(), "sniping")),
        }
    }

    /// Scoped shot; always deals the sniping damage
    pub fn fire_sniping(&mut self, shooter: &str, raw: &str) -> Result<(), BattleError> {
        let kind = self.weapon_kind(shooter)?;
        if kind != WeaponKind::Shaft {
            return Err(Self::unsupported(kind, "fire_sniping"));
        }
        let payload = FirePayload::parse(raw)?;
        let shot = self.shaft_hit(shooter, raw, &payload, damage::SHAFT_SNIPING_DAMAGE)?;
        self.relay_shot(shooter, CommandName::ShotTarget, Some(shot));
        Ok(())
    }

    fn require_isida(&self, shooter: &str, operation: &'static str) -> Result<(), BattleError> {
        match self.weapon_kind(shooter)? {
            WeaponKind::Isida => Ok(()),
            kind => Err(Self::unsupported(kind, operation)),
        }
    }

    pub fn set_target(&mut self, shooter: &str, raw: &str) -> Result<(), BattleError> {
        self.require_isida(shooter, "set_target")?;
        self.relay_shot(shooter, CommandName::ClientSetTarget, Some(raw.to_string()));
        Ok(())
    }

    pub fn reset_target(&mut self, shooter: &str, raw: &str) -> Result<(), BattleError> {
        self.require_isida(shooter, "reset_target")?;
        self.relay_shot(shooter, CommandName::ClientResetTarget, Some(raw.to_string()));
        Ok(())
    }

    /// First contact announces the beam; later contacts heal or damage
    fn isida_start(&mut self, shooter: &str, raw: &str) -> Result<(), BattleError> {
        let payload = FirePayload::parse(raw)?;
        let Some(target) = payload.target.clone() else {
            return Err(BattleError::Payload("isida start without target".to_string()));
        };
        if !self.is_active_tank(&target) {
            return Ok(());
        }
        let same_team = self.info.mode.is_team() && {
            let team = self.team_of(shooter);
            team != Team::None && team == self.team_of(&target)
        };
        let mode = if same_team { IsidaMode::Heal } else { IsidaMode::Damage };

        if self.require_tank(shooter)?.weapon.fire_started() {
            match mode {
                IsidaMode::Damage => {
                    self.deal_damage(shooter, &target, damage::ISIDA_DAMAGE, DamageOptions::default())?;
                    self.heal(shooter, shooter, damage::ISIDA_SELF_HEAL)?;
                }
                IsidaMode::Heal => self.heal(shooter, &target, damage::ISIDA_HEAL)?,
            }
            return Ok(());
        }

        self.require_tank_mut(shooter)?.weapon.set_fire_started(true);
        let mut announce = payload_value(raw)?;
        if let Value::Object(map) = &mut announce {
            map.insert("actionType".into(), mode.key().into());
        }
        self.relay_shot(shooter, CommandName::ClientSetTarget, Some(announce.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::battle::test_support::*;
    use crate::game::modes::BattleMode;
    use crate::game::properties::BattleProperties;

    #[test]
    fn test_weapon_variant_matches_kind() {
        let garage = crate::catalog::GarageCatalog::builtin();
        for spec in garage.weapons() {
            let weapon = Weapon::new(spec.clone()).unwrap();
            assert_eq!(weapon.kind(), spec.kind);
            assert!(!weapon.fire_started());
        }
        assert_eq!(serde_json::to_string(&WeaponKind::Flamethrower).unwrap(), "\"flamethrower\"");
    }

    #[test]
    fn test_payload_defaults() {
        let payload = FirePayload::parse(r#"{"physTime":5,"targets":["a","b"]}"#).unwrap();
        assert_eq!(payload.targets, ["a", "b"]);
        assert!(payload.target.is_none());
        assert!(FirePayload::parse("not json").is_err());
    }

    #[tokio::test]
    async fn test_railgun_chain_falloff() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _s = join_active(&battle, 1, "shooter", "railgun_m0", None);
        let _x = join_active(&battle, 2, "x", "railgun_m0", None);
        let _y = join_active(&battle, 3, "y", "railgun_m0", None);
        let _z = join_active(&battle, 4, "z", "railgun_m0", None);

        battle
            .lock()
            .fire_target("shooter", r#"{"physTime":1,"targets":["x","y","z"]}"#)
            .unwrap();
        assert_eq!(health(&battle, "x"), 10_000.0 - 70.0 * 30.0);
        assert_eq!(health(&battle, "y"), 10_000.0 - 35.0 * 30.0);
        assert_eq!(health(&battle, "z"), 10_000.0 - 18.0 * 30.0);
    }

    #[tokio::test]
    async fn test_railgun_skips_inactive_targets() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _s = join_active(&battle, 1, "shooter", "railgun_m0", None);
        let _x = join(&battle, 2, "x", "railgun_m0", None);
        let mut y = join_active(&battle, 3, "y", "railgun_m0", None);
        drain(&mut y);

        battle
            .lock()
            .fire_target("shooter", r#"{"targets":["x","ghost","y"]}"#)
            .unwrap();
        assert_eq!(health(&battle, "x"), 10_000.0);
        // First valid target takes the full hit
        assert_eq!(health(&battle, "y"), 10_000.0 - 70.0 * 30.0);
        assert!(drain(&mut y).iter().any(|c| c.name == CommandName::ShotTarget && c.args[0] == "shooter"));
    }

    #[tokio::test]
    async fn test_thunder_splash_uses_reported_distance() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _s = join_active(&battle, 1, "shooter", "thunder_m0", None);
        let _a = join_active(&battle, 2, "a", "railgun_m0", None);
        let _b = join_active(&battle, 3, "b", "railgun_m0", None);

        battle
            .lock()
            .fire_target(
                "shooter",
                r#"{"target":"a","hitPointWorld":{"x":0,"y":0,"z":0},
                    "splashTargetIds":["b"],"splashTargetDistances":["500"]}"#,
            )
            .unwrap();
        assert_eq!(health(&battle, "a"), 10_000.0 - 100.0 * 30.0);
        // 5 m of a 10 m radius: 0.1 + 0.5 * 0.4 = 0.3
        assert!((health(&battle, "b") - (10_000.0 - 30.0 * 30.0)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_smoky_shot_carries_weakening() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _s = join_active(&battle, 1, "shooter", "smoky_m0", None);
        let mut target = join_active(&battle, 2, "t", "railgun_m0", None);
        drain(&mut target);

        battle.lock().fire_target("shooter", r#"{"target":"t"}"#).unwrap();
        let shot = drain(&mut target)
            .into_iter()
            .find(|c| c.name == CommandName::ShotTarget)
            .unwrap();
        let payload: Value = serde_json::from_str(&shot.args[1]).unwrap();
        assert!(payload["weakening"].as_f64().unwrap() > 0.0);
        assert_eq!(payload["critical"], false);
        let hp = health(&battle, "t");
        assert!(hp < 10_000.0 && hp >= 10_000.0 - 16.0 * 30.0);
    }

    #[tokio::test]
    async fn test_flamethrower_requires_start() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _s = join_active(&battle, 1, "shooter", "flamethrower_m0", None);
        let _t = join_active(&battle, 2, "t", "railgun_m0", None);
        let report = r#"{"targets":["t"]}"#;

        let mut state = battle.lock();
        state.fire_target("shooter", report).unwrap();
        assert_eq!(state.tank("t").unwrap().health, 10_000.0);

        state.start_fire("shooter", "{}").unwrap();
        state.fire_target("shooter", report).unwrap();
        assert_eq!(state.tank("t").unwrap().health, 10_000.0 - 10.0 * 30.0);

        state.stop_fire("shooter").unwrap();
        state.fire_target("shooter", report).unwrap();
        assert_eq!(state.tank("t").unwrap().health, 10_000.0 - 10.0 * 30.0);
    }

    #[tokio::test]
    async fn test_isida_damage_and_heal() {
        let battle = battle(BattleMode::TeamDeathmatch, BattleProperties::default());
        let _h = join_active(&battle, 1, "healer", "isida_m0", Some(Team::Red));
        let _f = join_active(&battle, 2, "friend", "railgun_m0", Some(Team::Red));
        let mut enemy = join_active(&battle, 3, "enemy", "railgun_m0", Some(Team::Blue));
        drain(&mut enemy);

        let mut state = battle.lock();
        // First contact only announces the beam
        state.start_fire("healer", r#"{"target":"enemy","incarnation":1}"#).unwrap();
        assert_eq!(state.tank("enemy").unwrap().health, 10_000.0);

        state.tank_incarnation_mut("healer", 1).unwrap().health = 9_000.0;
        state.start_fire("healer", r#"{"target":"enemy"}"#).unwrap();
        assert_eq!(state.tank("enemy").unwrap().health, 10_000.0 - 20.0 * 30.0);
        assert_eq!(state.tank("healer").unwrap().health, 9_000.0 + 10.0 * 30.0);

        state.tank_incarnation_mut("friend", 1).unwrap().health = 5_000.0;
        state.start_fire("healer", r#"{"target":"friend"}"#).unwrap();
        assert_eq!(state.tank("friend").unwrap().health, 5_000.0 + 20.0 * 30.0);
        drop(state);

        let announce = drain(&mut enemy)
            .into_iter()
            .find(|c| c.name == CommandName::ClientSetTarget)
            .unwrap();
        let payload: Value = serde_json::from_str(&announce.args[1]).unwrap();
        assert_eq!(payload["actionType"], "damage");
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _s = join_active(&battle, 1, "twins", "twins_m0", None);
        let mut state = battle.lock();
        assert!(matches!(
            state.start_fire("twins", "{}"),
            Err(BattleError::UnsupportedFire { weapon: WeaponKind::Twins, .. })
        ));
        assert!(matches!(
            state.enter_sniping_mode("twins"),
            Err(BattleError::UnsupportedFire { .. })
        ));
        assert!(state.fire("twins", "{}").is_ok());
    }

    #[tokio::test]
    async fn test_shaft_sniping() {
        let battle = battle(BattleMode::Deathmatch, BattleProperties::default());
        let _s = join_active(&battle, 1, "shaft", "shaft_m0", None);
        let mut t = join_active(&battle, 2, "t", "railgun_m0", None);
        drain(&mut t);

        let mut state = battle.lock();
        state.enter_sniping_mode("shaft").unwrap();
        state.fire_sniping("shaft", r#"{"target":"t"}"#).unwrap();
        assert_eq!(state.tank("t").unwrap().health, 10_000.0 - 150.0 * 30.0);
        state.fire_target("shaft", r#"{"target":"t"}"#).unwrap();
        assert_eq!(state.tank("t").unwrap().health, 10_000.0 - 225.0 * 30.0);
        drop(state);

        let sent = drain(&mut t);
        assert_eq!(sent[0].name, CommandName::ClientEnterSnipingMode);
        let shot = sent.iter().find(|c| c.name == CommandName::ShotTarget).unwrap();
        let payload: Value = serde_json::from_str(&shot.args[1]).unwrap();
        assert_eq!(payload["impactForce"], 5.0);
    }
}

//! Battle instance
//!
//! All mutable battle data lives in `BattleState` behind one mutex per
//! battle. Every mutating operation runs to completion under that lock
//! and never awaits; outbound commands are queued on sockets, timers
//! are spawned tasks that re-acquire the lock when they fire.

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::bonus::{BattleBonus, BonusKind};
use super::constants::{effects, mines, net};
use super::damage::DamageError;
use super::effects::EffectKind;
use super::mines::BattleMine;
use super::modes::{statistics_user, BattleMode, ModeHandler};
use super::player::{BattlePlayer, LoadStage, Team};
use super::properties::BattleProperties;
use super::tank::{BattleTank, TankState};
use super::timers::TimerScheduler;
use super::weapons::{Weapon, WeaponKind};
use crate::catalog::{GarageCatalog, MapDescriptor};
use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::net::protocol::{Command, CommandName};
use crate::net::socket::UserSocket;
use crate::store::{InMemoryQuestTracker, InMemoryUserRepository, QuestTracker, User, UserRepository};
use crate::util::TaskScope;

pub type BattleId = String;

#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    #[error("Player '{0}' is not in this battle")]
    PlayerNotFound(String),
    #[error("Player '{0}' is already in this battle")]
    AlreadyJoined(String),
    #[error("Battle is full ({0} players)")]
    BattleFull(usize),
    #[error("Rank {0} is not allowed in this battle")]
    RankNotAllowed(u8),
    #[error("Player '{0}' has no tank")]
    NoTank(String),
    #[error("Tank '{tank}' is {state:?}, expected {expected}")]
    InvalidTankState {
        tank: String,
        state: TankState,
        expected: &'static str,
    },
    #[error("Player '{player}' is at load stage {stage:?}")]
    StageOutOfOrder { player: String, stage: LoadStage },
    #[error("Unknown equipment '{0}'")]
    UnknownEquipment(String),
    #[error("Unknown item '{0}'")]
    UnknownItem(String),
    #[error("Bonus '{0}' not found")]
    BonusNotFound(String),
    #[error("Mine '{0}' not found")]
    MineNotFound(String),
    #[error("{weapon:?} does not support {operation}")]
    UnsupportedFire {
        weapon: WeaponKind,
        operation: &'static str,
    },
    #[error("Invalid payload: {0}")]
    Payload(String),
    #[error("Battle mode {0:?} has no flags")]
    NotCaptureTheFlag(BattleMode),
    #[error("Unknown team '{0}'")]
    UnknownTeam(String),
    #[error("Player '{0}' does not carry a flag")]
    NoFlag(String),
    #[error(transparent)]
    Damage(#[from] DamageError),
}

/// Delays for the battle's scheduled continuations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BattleTimings {
    pub tank_activation_delay: Duration,
    pub self_destruct_delay: Duration,
    pub mine_arming_delay: Duration,
    pub bonus_spawn_interval: Option<Duration>,
    pub gold_drop_delay: Duration,
}

impl Default for BattleTimings {
    fn default() -> Self {
        Self {
            tank_activation_delay: Duration::from_millis(1500),
            self_destruct_delay: Duration::from_millis(10_000),
            mine_arming_delay: Duration::from_millis(mines::ACTIVATION_TIME_MS),
            bonus_spawn_interval: Some(Duration::from_secs(30)),
            gold_drop_delay: Duration::from_secs(20),
        }
    }
}

impl BattleTimings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            tank_activation_delay: Duration::from_millis(config.tank_activation_delay_ms),
            self_destruct_delay: Duration::from_millis(config.self_destruct_delay_ms),
            mine_arming_delay: Duration::from_millis(config.mine_arming_delay_ms),
            bonus_spawn_interval: (config.bonus_spawn_interval_secs > 0)
                .then(|| Duration::from_secs(config.bonus_spawn_interval_secs)),
            gold_drop_delay: Duration::from_secs(config.gold_drop_delay_secs),
        }
    }
}

/// Collaborators handed to every battle
#[derive(Debug, Clone)]
pub struct BattleServices {
    pub garage: Arc<GarageCatalog>,
    pub users: Arc<dyn UserRepository>,
    pub quests: Arc<dyn QuestTracker>,
    pub metrics: Arc<Metrics>,
    pub timings: BattleTimings,
}

impl BattleServices {
    /// Built-in garage with in-memory stores
    pub fn standalone() -> Self {
        Self {
            garage: Arc::new(GarageCatalog::builtin()),
            users: Arc::new(InMemoryUserRepository::new()),
            quests: Arc::new(InMemoryQuestTracker::new()),
            metrics: Arc::new(Metrics::new()),
            timings: BattleTimings::default(),
        }
    }
}

/// Immutable battle description
#[derive(Debug, Clone)]
pub struct BattleInfo {
    pub id: BattleId,
    pub title: String,
    pub map: Arc<MapDescriptor>,
    pub mode: BattleMode,
    pub properties: BattleProperties,
    /// Kept alive when the last player leaves
    pub persistent: bool,
}

/// Lobby listing entry
#[derive(Debug, Clone, Serialize)]
pub struct BattleSummary {
    #[serde(rename = "battleId")]
    pub id: BattleId,
    pub name: String,
    pub map: String,
    #[serde(rename = "battleMode")]
    pub mode: &'static str,
    #[serde(rename = "maxPeople")]
    pub max_people: usize,
    #[serde(rename = "minRank")]
    pub min_rank: u8,
    #[serde(rename = "maxRank")]
    pub max_rank: u8,
    #[serde(rename = "countRedPeople")]
    pub red: usize,
    #[serde(rename = "countBluePeople")]
    pub blue: usize,
    #[serde(rename = "countPeople")]
    pub players: usize,
    pub users: Vec<SummaryUser>,
    #[serde(rename = "parkourMode")]
    pub parkour: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryUser {
    pub nickname: String,
    pub rank: u8,
    pub kills: u32,
    pub team_type: &'static str,
}

/// Shared handle to a battle
#[derive(Debug)]
pub struct Battle {
    info: BattleInfo,
    state: Mutex<BattleState>,
}

impl Battle {
    pub fn new(info: BattleInfo, services: BattleServices) -> Arc<Self> {
        Arc::new_cyclic(|weak| Battle {
            state: Mutex::new(BattleState::new(
                info.clone(),
                services,
                TimerScheduler::new(weak.clone()),
            )),
            info,
        })
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &BattleInfo {
        &self.info
    }

    /// Acquire the battle's single-writer lock
    pub fn lock(&self) -> MutexGuard<'_, BattleState> {
        self.state.lock()
    }

    pub(crate) fn fire_timer(&self, event: super::timers::TimerEvent) {
        self.state.lock().handle_timer(event);
    }

    /// Start periodic housekeeping (bonus drops)
    pub fn start(&self) {
        self.state.lock().start_housekeeping();
    }

    /// Cancel every timer and drop all world objects
    pub fn shutdown(&self) {
        self.state.lock().shutdown();
    }
}

/// Mutable state of one battle
#[derive(Debug)]
pub struct BattleState {
    pub(crate) info: BattleInfo,
    pub(crate) players: Vec<BattlePlayer>,
    pub(crate) mode: ModeHandler,
    pub(crate) mines: hashbrown::HashMap<u32, BattleMine>,
    pub(crate) bonuses: hashbrown::HashMap<u32, BattleBonus>,
    pub(crate) fund: u32,
    pub(crate) services: BattleServices,
    pub(crate) scheduler: TimerScheduler,
    next_mine_id: u32,
    next_bonus_id: u32,
    next_effect_id: u32,
    /// Battle-level timers (bonus drops, gold)
    pub(crate) tasks: TaskScope,
}

impl BattleState {
    fn new(info: BattleInfo, services: BattleServices, scheduler: TimerScheduler) -> Self {
        let mode = ModeHandler::new(info.mode, &info.map);
        Self {
            info,
            players: Vec::new(),
            mode,
            mines: hashbrown::HashMap::new(),
            bonuses: hashbrown::HashMap::new(),
            fund: 0,
            services,
            scheduler,
            next_mine_id: 0,
            next_bonus_id: 0,
            next_effect_id: 0,
            tasks: TaskScope::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &BattleInfo {
        &self.info
    }

    pub fn properties(&self) -> &BattleProperties {
        &self.info.properties
    }

    pub fn mode(&self) -> &ModeHandler {
        &self.mode
    }

    pub fn fund(&self) -> u32 {
        self.fund
    }

    pub fn players(&self) -> &[BattlePlayer] {
        &self.players
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn combatant_count(&self) -> usize {
        self.players.iter().filter(|p| !p.is_spectator).count()
    }

    pub fn player(&self, username: &str) -> Option<&BattlePlayer> {
        self.players.iter().find(|p| p.username == username)
    }

    pub fn player_mut(&mut self, username: &str) -> Option<&mut BattlePlayer> {
        self.players.iter_mut().find(|p| p.username == username)
    }

    pub fn tank(&self, id: &str) -> Option<&BattleTank> {
        self.player(id).and_then(|p| p.tank.as_ref())
    }

    pub(crate) fn require_player(&self, username: &str) -> Result<&BattlePlayer, BattleError> {
        self.player(username)
            .ok_or_else(|| BattleError::PlayerNotFound(username.to_string()))
    }

    pub(crate) fn require_player_mut(&mut self, username: &str) -> Result<&mut BattlePlayer, BattleError> {
        self.player_mut(username)
            .ok_or_else(|| BattleError::PlayerNotFound(username.to_string()))
    }

    pub(crate) fn require_tank(&self, username: &str) -> Result<&BattleTank, BattleError> {
        self.require_player(username)?
            .tank
            .as_ref()
            .ok_or_else(|| BattleError::NoTank(username.to_string()))
    }

    pub(crate) fn require_tank_mut(&mut self, username: &str) -> Result<&mut BattleTank, BattleError> {
        self.require_player_mut(username)?
            .tank
            .as_mut()
            .ok_or_else(|| BattleError::NoTank(username.to_string()))
    }

    /// Tank that is alive in its current incarnation
    pub(crate) fn tank_incarnation_mut(&mut self, id: &str, incarnation: u32) -> Option<&mut BattleTank> {
        self.player_mut(id)
            .and_then(|p| p.tank.as_mut())
            .filter(|t| t.incarnation == incarnation && t.state != TankState::Dead)
    }

    pub(crate) fn is_active_tank(&self, id: &str) -> bool {
        self.tank(id).is_some_and(|t| t.state == TankState::Active)
    }

    pub(crate) fn team_of(&self, username: &str) -> Team {
        self.player(username).map(|p| p.team).unwrap_or_default()
    }

    pub(crate) fn next_mine_id(&mut self) -> u32 {
        self.next_mine_id += 1;
        self.next_mine_id
    }

    pub(crate) fn next_bonus_id(&mut self) -> u32 {
        self.next_bonus_id += 1;
        self.next_bonus_id
    }

    pub(crate) fn next_effect_id(&mut self) -> u32 {
        self.next_effect_id += 1;
        self.next_effect_id
    }

    /// Send to every player that finished loading
    pub fn broadcast(&self, command: Command) {
        for player in self.players.iter().filter(|p| p.ready()) {
            player.send(command.clone());
        }
    }

    /// Send to every loaded player except `username`
    pub fn broadcast_except(&self, username: &str, command: Command) {
        for player in self
            .players
            .iter()
            .filter(|p| p.ready() && p.username != username)
        {
            player.send(command.clone());
        }
    }

    pub fn send_to(&self, username: &str, command: Command) {
        if let Some(player) = self.player(username) {
            player.send(command);
        }
    }

    /// Combatant count per team; used for auto balance
    pub fn team_sizes(&self) -> (usize, usize) {
        self.players
            .iter()
            .filter(|p| !p.is_spectator)
            .fold((0, 0), |(red, blue), p| match p.team {
                Team::Red => (red + 1, blue),
                Team::Blue => (red, blue + 1),
                Team::None => (red, blue),
            })
    }

    /// Team with fewer combatants, Red on ties
    pub fn pick_team(&self) -> Team {
        if !self.info.mode.is_team() {
            return Team::None;
        }
        let (red, blue) = self.team_sizes();
        if blue < red {
            Team::Blue
        } else {
            Team::Red
        }
    }

    /// Register a participant; combatants get their first tank immediately
    pub fn add_player(
        &mut self,
        socket: Arc<UserSocket>,
        user: &User,
        team: Option<Team>,
        spectator: bool,
    ) -> Result<(), BattleError> {
        if self.player(&user.username).is_some() {
            return Err(BattleError::AlreadyJoined(user.username.clone()));
        }
        if !spectator {
            if self.combatant_count() >= self.info.properties.max_people {
                return Err(BattleError::BattleFull(self.info.properties.max_people));
            }
            if !self.info.properties.allows_rank(user.rank) {
                return Err(BattleError::RankNotAllowed(user.rank));
            }
        }

        let team = match (spectator, self.info.mode.is_team(), team) {
            (true, _, _) | (false, false, _) => Team::None,
            (false, true, Some(team)) if team != Team::None => team,
            (false, true, _) => self.pick_team(),
        };

        let player = BattlePlayer::new(
            socket,
            user.username.clone(),
            user.rank,
            team,
            spectator,
            user.equipment.clone(),
        );
        self.players.push(player);
        if !spectator {
            if let Err(e) = self.create_tank(&user.username) {
                self.players.pop();
                return Err(e);
            }
        }

        self.services.metrics.players_in_battles.fetch_add(1, Ordering::Relaxed);
        info!(
            battle = %self.info.id,
            player = %user.username,
            team = team.key(),
            spectator,
            "Player joined battle"
        );
        Ok(())
    }

    /// Create the player's next tank incarnation in Respawn state
    pub(crate) fn create_tank(&mut self, username: &str) -> Result<(), BattleError> {
        let garage = self.services.garage.clone();
        let player = self.require_player_mut(username)?;

        let hull = garage
            .hull(&player.equipment.hull)
            .ok_or_else(|| BattleError::UnknownEquipment(player.equipment.hull.clone()))?;
        let weapon_spec = garage
            .weapon(&player.equipment.weapon)
            .ok_or_else(|| BattleError::UnknownEquipment(player.equipment.weapon.clone()))?;
        let paint = garage.paint(&player.equipment.paint);
        let weapon = Weapon::new(weapon_spec)?;

        player.incarnation += 1;
        if let Some(previous) = player.tank.as_mut() {
            previous.tasks.cancel_all();
        }
        player.tank = Some(BattleTank::new(
            username.to_string(),
            player.incarnation,
            hull,
            weapon,
            paint,
        ));
        debug!(battle = %self.info.id, tank = %username, "Tank created");
        Ok(())
    }

    /// First load stage: battle model, after map resources are loaded
    pub fn init_player(&mut self, username: &str) -> Result<(), BattleError> {
        let player = self.require_player(username)?;
        let map = &self.info.map;
        let props = &self.info.properties;

        let bonus_data: Vec<serde_json::Value> = BonusKind::ALL
            .iter()
            .map(|kind| {
                json!({
                    "id": kind.key(),
                    "resourceId": kind.resource(),
                    "lifeTime": kind.lifetime().as_secs(),
                    "lighting": {
                        "attenuationBegin": 100,
                        "attenuationEnd": 500,
                        "color": kind.color(),
                        "intensity": 1,
                        "time": 0,
                    },
                })
            })
            .collect();
        player.send(Command::with_args(
            CommandName::InitBonusesData,
            [json!({
                "bonuses": bonus_data,
                "cordResource": 1_000_065,
                "parachuteInnerResource": 170_005,
                "parachuteResource": 170_004,
                "pickupSoundResource": 269_321,
            })
            .to_string()],
        ));

        player.send(Command::with_args(
            CommandName::InitBattleModel,
            [json!({
                "battleId": self.info.id,
                "map_id": map.name,
                "mapId": map.preview,
                "kick_period_ms": net::KICK_PERIOD_MS,
                "invisible_time": net::INVISIBLE_TIME_MS,
                "spectator": player.is_spectator,
                "reArmorEnabled": props.rearming_enabled,
                "active": true,
                "minRank": props.min_rank,
                "maxRank": props.max_rank,
                "skybox": map.skybox,
                "sound_id": 584_396,
                "map_graphic_data": { "theme": map.theme },
            })
            .to_string()],
        ));

        let bonuses: Vec<serde_json::Value> = self.bonuses.values().map(BattleBonus::spawn_data).collect();
        player.send(Command::with_args(
            CommandName::InitBonuses,
            [serde_json::Value::Array(bonuses).to_string()],
        ));

        self.require_player_mut(username)?.stage = LoadStage::ModelsReady;
        Ok(())
    }

    /// Second load stage: models of the local tank and GUI
    pub fn init_local(&mut self, username: &str) -> Result<(), BattleError> {
        let player = self.require_player(username)?;
        if player.stage != LoadStage::ModelsReady {
            return Err(BattleError::StageOutOfOrder {
                player: username.to_string(),
                stage: player.stage,
            });
        }
        let props = &self.info.properties;

        let suicide_delay = if props.instant_self_destruct {
            0
        } else {
            self.services.timings.self_destruct_delay.as_millis() as u64
        };
        player.send(Command::with_args(CommandName::InitSuicideModel, [suicide_delay.to_string()]));
        player.send(Command::with_args(CommandName::InitStatisticsModel, [self.info.title.clone()]));
        player.send(self.mode_init_model());

        let users: Vec<serde_json::Value> = self
            .players
            .iter()
            .filter(|p| !p.is_spectator)
            .map(|p| json!({ "nickname": p.username, "rank": p.rank, "teamType": p.team.key() }))
            .collect();
        player.send(Command::with_args(
            CommandName::InitGuiModel,
            [json!({
                "name": self.info.title,
                "fund": self.fund,
                "scoreLimit": props.score_limit,
                "timeLimit": props.time_limit_secs,
                "timeLeft": props.time_limit_secs,
                "team": self.info.mode.is_team(),
                "parkourMode": props.parkour_mode,
                "battleType": self.info.mode.key(),
                "users": users,
            })
            .to_string()],
        ));
        self.mode_post_gui(username);

        if props.parkour_mode {
            self.send_system_chat(username, "Parkour mode: damage is disabled in this battle");
        }

        self.require_player_mut(username)?.stage = LoadStage::LocalReady;
        Ok(())
    }

    /// Final load stage, run on the first ping after local init
    ///
    /// Returns `false` when the player is not waiting for this stage.
    pub fn init_battle(&mut self, username: &str) -> Result<bool, BattleError> {
        let player = self.require_player(username)?;
        if player.stage != LoadStage::LocalReady {
            return Ok(false);
        }
        let is_spectator = player.is_spectator;

        self.mode_player_join(username);

        if !is_spectator {
            player.send(self.inventory_command());
        }
        player.send(self.mine_model_command());

        // Introduce the joiner's tank and every existing tank
        if let Some(tank) = player.tank.as_ref() {
            let init = Command::with_args(
                CommandName::InitTank,
                [tank.init_data(&self.info.id, player.rank, player.team).to_string()],
            );
            player.send(init.clone());
            self.broadcast_except(username, init);
        }
        for other in self.players.iter().filter(|p| p.username != username) {
            if let Some(tank) = other.tank.as_ref() {
                player.send(Command::with_args(
                    CommandName::InitTank,
                    [tank.init_data(&self.info.id, other.rank, other.team).to_string()],
                ));
            }
        }
        player.send(self.statistics_command(player));
        self.broadcast_except(username, self.statistics_command(player));
        player.send(self.effects_command());

        // Already placed tanks become visible to the joiner
        for other in self.players.iter().filter(|p| p.username != username) {
            if let Some(tank) = other.tank.as_ref() {
                if matches!(tank.state, TankState::SemiActive | TankState::Active) {
                    player.send(Command::with_args(
                        CommandName::SpawnTank,
                        [tank.spawn_data(other.team).to_string()],
                    ));
                }
                if tank.state == TankState::Active {
                    player.send(Command::with_args(CommandName::ActivateTank, [tank.id.clone()]));
                }
            }
        }

        self.require_player_mut(username)?.stage = LoadStage::Ready;
        if is_spectator {
            self.broadcast_spectators();
        }

        let needs_spawn = self
            .tank(username)
            .is_some_and(|t| t.state == TankState::Respawn);
        if needs_spawn {
            self.prepare_to_spawn(username)?;
        }
        debug!(battle = %self.info.id, player = %username, "Player ready");
        Ok(true)
    }

    fn inventory_command(&self) -> Command {
        let items: Vec<serde_json::Value> = EffectKind::ALL
            .iter()
            .map(|kind| {
                json!({
                    "id": kind.item(),
                    "count": effects::INVENTORY_COUNT,
                    "slotId": kind.id(),
                    "itemEffectTime": kind.duration().map(|d| d.as_secs()).unwrap_or(0),
                    "itemRestSec": kind.cooldown().as_secs(),
                })
            })
            .collect();
        Command::with_args(CommandName::InitInventory, [json!({ "items": items }).to_string()])
    }

    fn mine_model_command(&self) -> Command {
        let mines: Vec<serde_json::Value> = self.mines.values().map(BattleMine::spawn_data).collect();
        Command::with_args(
            CommandName::InitMineModel,
            [json!({
                "activationTimeMsec": self.services.timings.mine_arming_delay.as_millis() as u64,
                "farVisibilityRadius": mines::FAR_VISIBILITY_RADIUS,
                "nearVisibilityRadius": mines::NEAR_VISIBILITY_RADIUS,
                "impactForce": mines::IMPACT_FORCE,
                "minDistanceFromBase": mines::MIN_DISTANCE_FROM_BASE,
                "radius": mines::RADIUS,
                "minDamage": mines::MIN_DAMAGE,
                "maxDamage": mines::MAX_DAMAGE,
                "mines": mines,
            })
            .to_string()],
        )
    }

    pub(crate) fn statistics_command(&self, player: &BattlePlayer) -> Command {
        Command::with_args(
            CommandName::UpdatePlayerStatistics,
            [statistics_user(player).to_string()],
        )
    }

    /// Broadcast the current statistics of `username`
    pub(crate) fn update_statistics(&self, username: &str) {
        if let Some(player) = self.player(username) {
            self.broadcast(self.statistics_command(player));
        }
    }

    fn effects_command(&self) -> Command {
        let effects: Vec<serde_json::Value> = self
            .players
            .iter()
            .filter_map(|p| p.tank.as_ref())
            .flat_map(|tank| {
                tank.effects.iter().map(move |effect| {
                    json!({
                        "userID": tank.id,
                        "itemIndex": effect.kind.id(),
                        "durationTime": effect.remaining().as_millis() as u64,
                        "activeAfterDeath": false,
                        "effectLevel": 0,
                    })
                })
            })
            .collect();
        Command::with_args(CommandName::InitEffects, [json!({ "effects": effects }).to_string()])
    }

    fn broadcast_spectators(&self) {
        let spects: Vec<&str> = self
            .players
            .iter()
            .filter(|p| p.is_spectator)
            .map(|p| p.username.as_str())
            .collect();
        self.broadcast(Command::with_args(
            CommandName::UpdateSpectatorsList,
            [json!({ "spects": spects }).to_string()],
        ));
    }

    /// Remove a participant, cancelling every task it owns
    pub fn remove_player(&mut self, username: &str) -> Result<BattlePlayer, BattleError> {
        let index = self
            .players
            .iter()
            .position(|p| p.username == username)
            .ok_or_else(|| BattleError::PlayerNotFound(username.to_string()))?;

        self.deactivate_mines(username, true);
        self.mode_player_leave(username);

        let mut player = self.players.remove(index);
        player.cancel_tasks();
        if let Some(tank) = player.tank.as_mut() {
            tank.effects.clear();
        }

        self.broadcast(Command::with_args(CommandName::BattlePlayerRemove, [username]));
        if player.is_spectator {
            self.broadcast_spectators();
        }

        self.services.metrics.players_in_battles.fetch_sub(1, Ordering::Relaxed);
        info!(battle = %self.info.id, player = %username, "Player left battle");
        Ok(player)
    }

    /// Battle chat; team-only messages stay within the sender's team
    pub fn broadcast_chat(&self, sender: &str, message: &str, team_only: bool) -> Result<(), BattleError> {
        let player = self.require_player(sender)?;
        let command = Command::with_args(
            CommandName::SendBattleChatMessageClient,
            [sender, message, player.team.key()],
        );
        let team_scoped = team_only && self.info.mode.is_team() && !player.is_spectator;
        for receiver in self.players.iter().filter(|p| p.ready()) {
            if !team_scoped || receiver.team == player.team {
                receiver.send(command.clone());
            }
        }
        Ok(())
    }

    /// Chat line from the server itself
    pub(crate) fn send_system_chat(&self, username: &str, message: &str) {
        self.send_to(
            username,
            Command::with_args(CommandName::SendBattleChatMessageClient, ["", message, Team::None.key()]),
        );
    }

    pub(crate) fn broadcast_fund(&self) {
        self.broadcast(Command::with_args(CommandName::ChangeFund, [self.fund.to_string()]));
    }

    pub fn summary(&self) -> BattleSummary {
        let (red, blue) = self.team_sizes();
        BattleSummary {
            id: self.info.id.clone(),
            name: self.info.title.clone(),
            map: self.info.map.name.clone(),
            mode: self.info.mode.key(),
            max_people: self.info.properties.max_people,
            min_rank: self.info.properties.min_rank,
            max_rank: self.info.properties.max_rank,
            red,
            blue,
            players: self.combatant_count(),
            users: self
                .players
                .iter()
                .filter(|p| !p.is_spectator)
                .map(|p| SummaryUser {
                    nickname: p.username.clone(),
                    rank: p.rank,
                    kills: p.kills,
                    team_type: p.team.key(),
                })
                .collect(),
            parkour: self.info.properties.parkour_mode,
        }
    }

    fn shutdown(&mut self) {
        self.tasks.cancel_all();
        for player in &mut self.players {
            player.cancel_tasks();
        }
        self.bonuses.clear();
        self.mines.clear();
        info!(battle = %self.info.id, "Battle shut down");
    }
}

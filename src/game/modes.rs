//! Battle mode rules: deathmatch, team deathmatch, capture the flag,
//! control points

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use smallvec::SmallVec;
use tracing::debug;

use super::battle::{BattleError, BattleState};
use super::constants::{ctf, dom};
use super::player::{BattlePlayer, Team};
use crate::catalog::maps::{FlagBases, PointSpec};
use crate::catalog::MapDescriptor;
use crate::net::protocol::{Command, CommandName};
use crate::store::QuestEvent;
use crate::util::Vector3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleMode {
    #[serde(rename = "DM")]
    Deathmatch,
    #[serde(rename = "TDM")]
    TeamDeathmatch,
    #[serde(rename = "CTF")]
    CaptureTheFlag,
    #[serde(rename = "CP")]
    ControlPoints,
}

impl BattleMode {
    pub fn key(self) -> &'static str {
        match self {
            BattleMode::Deathmatch => "DM",
            BattleMode::TeamDeathmatch => "TDM",
            BattleMode::CaptureTheFlag => "CTF",
            BattleMode::ControlPoints => "CP",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_uppercase().as_str() {
            "DM" => Some(BattleMode::Deathmatch),
            "TDM" => Some(BattleMode::TeamDeathmatch),
            "CTF" => Some(BattleMode::CaptureTheFlag),
            "CP" | "DOM" => Some(BattleMode::ControlPoints),
            _ => None,
        }
    }

    pub fn is_team(self) -> bool {
        !matches!(self, BattleMode::Deathmatch)
    }
}

/// Team scores and the values last sent to clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamScores {
    red: u32,
    blue: u32,
    sent_red: u32,
    sent_blue: u32,
}

impl TeamScores {
    pub fn get(&self, team: Team) -> u32 {
        match team {
            Team::Red => self.red,
            Team::Blue => self.blue,
            Team::None => 0,
        }
    }

    pub fn add(&mut self, team: Team, points: u32) {
        match team {
            Team::Red => self.red += points,
            Team::Blue => self.blue += points,
            Team::None => {}
        }
    }

    /// Scores that differ from what clients last saw; marks them sent
    pub fn take_changes(&mut self) -> SmallVec<[(Team, u32); 2]> {
        let mut changes = SmallVec::new();
        if self.red != self.sent_red {
            self.sent_red = self.red;
            changes.push((Team::Red, self.red));
        }
        if self.blue != self.sent_blue {
            self.sent_blue = self.blue;
            changes.push((Team::Blue, self.blue));
        }
        changes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlagState {
    OnPedestal,
    Carrying { carrier: String },
    Dropped { position: Vector3 },
}

/// What a flag touch does, decided before any state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagAction {
    /// Enemy flag picked up
    Capture,
    /// Carried enemy flag brought to the own pedestal
    Deliver { enemy: Team },
    /// Own dropped flag sent back to its pedestal
    Return,
    Ignore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CtfState {
    pub red: FlagState,
    pub blue: FlagState,
}

impl Default for CtfState {
    fn default() -> Self {
        Self {
            red: FlagState::OnPedestal,
            blue: FlagState::OnPedestal,
        }
    }
}

impl CtfState {
    pub fn flag(&self, team: Team) -> Option<&FlagState> {
        match team {
            Team::Red => Some(&self.red),
            Team::Blue => Some(&self.blue),
            Team::None => None,
        }
    }

    fn flag_mut(&mut self, team: Team) -> Option<&mut FlagState> {
        match team {
            Team::Red => Some(&mut self.red),
            Team::Blue => Some(&mut self.blue),
            Team::None => None,
        }
    }

    pub fn set(&mut self, team: Team, state: FlagState) {
        if let Some(flag) = self.flag_mut(team) {
            *flag = state;
        }
    }

    /// Team whose flag `tank` carries
    pub fn carried_by(&self, tank: &str) -> Option<Team> {
        [Team::Red, Team::Blue].into_iter().find(|&team| {
            matches!(self.flag(team), Some(FlagState::Carrying { carrier }) if carrier == tank)
        })
    }

    pub fn decide(&self, player_team: Team, tank: &str, flag_team: Team) -> FlagAction {
        let Some(flag) = self.flag(flag_team) else {
            return FlagAction::Ignore;
        };
        if player_team != flag_team {
            if matches!(flag, FlagState::Carrying { .. }) {
                FlagAction::Ignore
            } else {
                FlagAction::Capture
            }
        } else {
            match flag {
                FlagState::OnPedestal if self.carried_by(tank) == Some(flag_team.opposite()) => {
                    FlagAction::Deliver {
                        enemy: flag_team.opposite(),
                    }
                }
                FlagState::Dropped { .. } => FlagAction::Return,
                _ => FlagAction::Ignore,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlPoint {
    pub spec: PointSpec,
    pub progress: i32,
}

/// Mode-specific state of a battle
#[derive(Debug, Clone)]
pub enum ModeHandler {
    Deathmatch,
    TeamDeathmatch {
        scores: TeamScores,
    },
    CaptureTheFlag {
        scores: TeamScores,
        flags: CtfState,
        bases: FlagBases,
    },
    ControlPoints {
        scores: TeamScores,
        points: Vec<ControlPoint>,
    },
}

impl ModeHandler {
    pub fn new(mode: BattleMode, map: &MapDescriptor) -> Self {
        match mode {
            BattleMode::Deathmatch => ModeHandler::Deathmatch,
            BattleMode::TeamDeathmatch => ModeHandler::TeamDeathmatch {
                scores: TeamScores::default(),
            },
            BattleMode::CaptureTheFlag => ModeHandler::CaptureTheFlag {
                scores: TeamScores::default(),
                flags: CtfState::default(),
                bases: map.flags.unwrap_or(FlagBases {
                    red: Vector3::ZERO,
                    blue: Vector3::ZERO,
                }),
            },
            BattleMode::ControlPoints => ModeHandler::ControlPoints {
                scores: TeamScores::default(),
                points: map
                    .points
                    .iter()
                    .cloned()
                    .map(|spec| ControlPoint { spec, progress: 0 })
                    .collect(),
            },
        }
    }

    pub fn mode(&self) -> BattleMode {
        match self {
            ModeHandler::Deathmatch => BattleMode::Deathmatch,
            ModeHandler::TeamDeathmatch { .. } => BattleMode::TeamDeathmatch,
            ModeHandler::CaptureTheFlag { .. } => BattleMode::CaptureTheFlag,
            ModeHandler::ControlPoints { .. } => BattleMode::ControlPoints,
        }
    }

    pub fn scores(&self) -> Option<&TeamScores> {
        match self {
            ModeHandler::Deathmatch => None,
            ModeHandler::TeamDeathmatch { scores }
            | ModeHandler::CaptureTheFlag { scores, .. }
            | ModeHandler::ControlPoints { scores, .. } => Some(scores),
        }
    }

    fn scores_mut(&mut self) -> Option<&mut TeamScores> {
        match self {
            ModeHandler::Deathmatch => None,
            ModeHandler::TeamDeathmatch { scores }
            | ModeHandler::CaptureTheFlag { scores, .. }
            | ModeHandler::ControlPoints { scores, .. } => Some(scores),
        }
    }

    pub fn flags(&self) -> Option<&CtfState> {
        match self {
            ModeHandler::CaptureTheFlag { flags, .. } => Some(flags),
            _ => None,
        }
    }

    fn flags_mut(&mut self) -> Option<&mut CtfState> {
        match self {
            ModeHandler::CaptureTheFlag { flags, .. } => Some(flags),
            _ => None,
        }
    }
}

fn vector_json(v: Vector3) -> Value {
    json!({ "x": v.x, "y": v.y, "z": v.z })
}

/// Roster entry of statistics payloads
pub(crate) fn statistics_user(player: &BattlePlayer) -> Value {
    json!({
        "uid": player.username,
        "rank": player.rank,
        "teamType": player.team.key(),
        "score": player.score,
        "kills": player.kills,
        "deaths": player.deaths,
    })
}

impl BattleState {
    fn roster(&self, team: Option<Team>) -> Vec<Value> {
        self.players
            .iter()
            .filter(|p| !p.is_spectator && team.map_or(true, |t| p.team == t))
            .map(statistics_user)
            .collect()
    }

    pub(crate) fn mode_init_model(&self) -> Command {
        match &self.mode {
            ModeHandler::Deathmatch => Command::new(CommandName::InitDmModel),
            ModeHandler::TeamDeathmatch { .. } => Command::new(CommandName::InitTdmModel),
            ModeHandler::CaptureTheFlag { .. } => {
                Command::with_args(CommandName::InitCtfModel, [self.ctf_model().to_string()])
            }
            ModeHandler::ControlPoints { points, .. } => {
                let points: Vec<Value> = points
                    .iter()
                    .map(|point| {
                        json!({
                            "id": point.spec.id,
                            "name": point.spec.name,
                            "radius": point.spec.radius,
                            "x": point.spec.position.x,
                            "y": point.spec.position.y,
                            "z": point.spec.position.z,
                            "score": point.progress,
                            "state": "neutral",
                            "occupated_users": [],
                        })
                    })
                    .collect();
                Command::with_args(
                    CommandName::InitDomModel,
                    [json!({
                        "points": points,
                        "mine_activation_radius": dom::MINE_ACTIVATION_RADIUS,
                    })
                    .to_string()],
                )
            }
        }
    }

    fn ctf_model(&self) -> Value {
        let ModeHandler::CaptureTheFlag { flags, bases, .. } = &self.mode else {
            return Value::Null;
        };
        let dropped = |state: &FlagState| match state {
            FlagState::Dropped { position } => vector_json(*position),
            _ => Value::Null,
        };
        let carrier = |state: &FlagState| match state {
            FlagState::Carrying { carrier } => Value::String(carrier.clone()),
            _ => Value::Null,
        };
        json!({
            "basePosRedFlag": vector_json(bases.red.lifted(ctf::FLAG_OFFSET_Z)),
            "basePosBlueFlag": vector_json(bases.blue.lifted(ctf::FLAG_OFFSET_Z)),
            "posRedFlag": dropped(&flags.red),
            "posBlueFlag": dropped(&flags.blue),
            "redFlagCarrierId": carrier(&flags.red),
            "blueFlagCarrierId": carrier(&flags.blue),
        })
    }

    /// Sent once the GUI model is up
    pub(crate) fn mode_post_gui(&self, username: &str) {
        match &self.mode {
            ModeHandler::Deathmatch => {}
            ModeHandler::CaptureTheFlag { .. } => {
                self.send_to(
                    username,
                    Command::with_args(CommandName::InitFlags, [self.ctf_model().to_string()]),
                );
            }
            ModeHandler::TeamDeathmatch { scores } | ModeHandler::ControlPoints { scores, .. } => {
                for team in [Team::Red, Team::Blue] {
                    self.send_to(
                        username,
                        Command::with_args(
                            CommandName::ChangeTeamScore,
                            [team.key().to_string(), scores.get(team).to_string()],
                        ),
                    );
                }
            }
        }
    }

    /// Statistics snapshot to the joiner, join notice to everyone else
    pub(crate) fn mode_player_join(&self, username: &str) {
        let Some(player) = self.player(username) else {
            return;
        };
        match self.mode.scores() {
            None => {
                let users = self.roster(None);
                player.send(Command::with_args(
                    CommandName::InitDmStatistics,
                    [json!({ "users": users }).to_string()],
                ));
                if !player.is_spectator {
                    self.broadcast_except(
                        username,
                        Command::with_args(
                            CommandName::BattlePlayerJoinDm,
                            [json!({ "id": username, "players": users }).to_string()],
                        ),
                    );
                }
            }
            Some(scores) => {
                player.send(Command::with_args(
                    CommandName::InitTeamStatistics,
                    [json!({
                        "reds": self.roster(Some(Team::Red)),
                        "blues": self.roster(Some(Team::Blue)),
                        "redScore": scores.get(Team::Red),
                        "blueScore": scores.get(Team::Blue),
                    })
                    .to_string()],
                ));
                if !player.is_spectator {
                    self.broadcast_except(
                        username,
                        Command::with_args(
                            CommandName::BattlePlayerJoinTeam,
                            [json!({
                                "id": username,
                                "team": player.team.key(),
                                "players": self.roster(Some(player.team)),
                            })
                            .to_string()],
                        ),
                    );
                }
            }
        }
    }

    pub(crate) fn mode_player_leave(&mut self, username: &str) {
        let Some(player) = self.player(username) else {
            return;
        };
        if player.is_spectator {
            return;
        }
        self.drop_carried_flag(username);
        let name = if self.mode.scores().is_some() {
            CommandName::BattlePlayerLeaveTeam
        } else {
            CommandName::BattlePlayerLeaveDm
        };
        self.broadcast_except(username, Command::with_args(name, [username]));
    }

    /// Add team points and push changed scores
    pub(crate) fn add_team_score(&mut self, team: Team, points: u32) {
        let changes = match self.mode.scores_mut() {
            Some(scores) => {
                scores.add(team, points);
                scores.take_changes()
            }
            None => return,
        };
        for (team, score) in changes {
            self.broadcast(Command::with_args(
                CommandName::ChangeTeamScore,
                [team.key().to_string(), score.to_string()],
            ));
        }
    }

    fn require_ctf(&self) -> Result<(), BattleError> {
        match self.mode {
            ModeHandler::CaptureTheFlag { .. } => Ok(()),
            _ => Err(BattleError::NotCaptureTheFlag(self.mode.mode())),
        }
    }

    /// A tank touched the flag of `flag_team`
    pub fn trigger_flag(&mut self, username: &str, flag_team: Team) -> Result<FlagAction, BattleError> {
        self.require_ctf()?;
        if flag_team == Team::None {
            return Err(BattleError::UnknownTeam(flag_team.key().to_string()));
        }
        let player_team = self.require_player(username)?.team;
        self.require_tank(username)?;

        let action = match self.mode.flags() {
            Some(flags) => flags.decide(player_team, username, flag_team),
            None => FlagAction::Ignore,
        };
        debug!(battle = %self.info.id, player = %username, ?flag_team, ?action, "Flag triggered");

        match action {
            FlagAction::Capture => {
                self.set_flag(
                    flag_team,
                    FlagState::Carrying {
                        carrier: username.to_string(),
                    },
                );
                self.broadcast(Command::with_args(
                    CommandName::FlagCaptured,
                    [username, flag_team.key()],
                ));
            }
            FlagAction::Deliver { enemy } => {
                self.set_flag(enemy, FlagState::OnPedestal);
                self.broadcast(Command::with_args(
                    CommandName::FlagDelivered,
                    [flag_team.key(), username],
                ));
                self.add_team_score(flag_team, 1);
                self.services.quests.record(username, QuestEvent::DeliverFlag);
            }
            FlagAction::Return => self.return_flag(flag_team, Some(username)),
            FlagAction::Ignore => {}
        }
        Ok(action)
    }

    /// Carrier drops the flag; a flag lost off the map returns home
    pub fn drop_flag(&mut self, username: &str, position: Vector3, raycast: bool) -> Result<Team, BattleError> {
        self.require_ctf()?;
        let team = self
            .mode
            .flags()
            .and_then(|flags| flags.carried_by(username))
            .ok_or_else(|| BattleError::NoFlag(username.to_string()))?;
        if raycast {
            self.place_dropped_flag(team, position);
        } else {
            self.return_flag(team, None);
        }
        Ok(team)
    }

    /// Drop whatever flag `username` carries at its tank position
    pub(crate) fn drop_carried_flag(&mut self, username: &str) {
        let Some(team) = self.mode.flags().and_then(|flags| flags.carried_by(username)) else {
            return;
        };
        let position = self.tank(username).map(|t| t.position).unwrap_or(Vector3::ZERO);
        self.place_dropped_flag(team, position);
    }

    fn place_dropped_flag(&mut self, team: Team, position: Vector3) {
        self.set_flag(team, FlagState::Dropped { position });
        self.broadcast(Command::with_args(
            CommandName::FlagDropped,
            [json!({
                "x": position.x,
                "y": position.y,
                "z": position.z,
                "flagTeam": team.key(),
            })
            .to_string()],
        ));
    }

    fn return_flag(&mut self, team: Team, by: Option<&str>) {
        self.set_flag(team, FlagState::OnPedestal);
        self.broadcast(Command::with_args(
            CommandName::FlagReturned,
            [team.key(), by.unwrap_or("null")],
        ));
    }

    fn set_flag(&mut self, team: Team, state: FlagState) {
        if let Some(flags) = self.mode.flags_mut() {
            flags.set(team, state);
        }
    }
}

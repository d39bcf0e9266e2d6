use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::tank::BattleTank;
use crate::net::protocol::Command;
use crate::net::socket::UserSocket;
use crate::store::users::Equipment;
use crate::util::TaskScope;

/// Team of a battle participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Team {
    Red,
    Blue,
    #[default]
    None,
}

impl Team {
    pub fn key(self) -> &'static str {
        match self {
            Team::Red => "RED",
            Team::Blue => "BLUE",
            Team::None => "NONE",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_uppercase().as_str() {
            "RED" => Some(Team::Red),
            "BLUE" => Some(Team::Blue),
            "NONE" => Some(Team::None),
            _ => None,
        }
    }

    /// The other side; `None` has no opponent team
    pub fn opposite(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
            Team::None => Team::None,
        }
    }
}

/// How far the client has progressed through the battle load sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadStage {
    /// Resources are still being loaded
    Loading,
    /// Battle model sent, waiting for the local tank request
    ModelsReady,
    /// Local models sent, waiting for the first ping
    LocalReady,
    /// Fully joined; receives battle broadcasts
    Ready,
}

/// A participant of one battle
#[derive(Debug)]
pub struct BattlePlayer {
    pub socket: Arc<UserSocket>,
    pub username: String,
    pub rank: u8,
    pub team: Team,
    pub is_spectator: bool,
    pub equipment: Equipment,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
    /// Incremented for every tank created; disambiguates stale timers
    pub incarnation: u32,
    pub tank: Option<BattleTank>,
    pub stage: LoadStage,
    /// Timers owned by the player (mine arming)
    pub tasks: TaskScope,
}

impl BattlePlayer {
    pub fn new(
        socket: Arc<UserSocket>,
        username: String,
        rank: u8,
        team: Team,
        is_spectator: bool,
        equipment: Equipment,
    ) -> Self {
        Self {
            socket,
            username,
            rank,
            team,
            is_spectator,
            equipment,
            score: 0,
            kills: 0,
            deaths: 0,
            incarnation: 0,
            tank: None,
            stage: LoadStage::Loading,
            tasks: TaskScope::new(),
        }
    }

    /// Receives battle broadcasts
    pub fn ready(&self) -> bool {
        self.stage == LoadStage::Ready
    }

    pub fn send(&self, command: Command) {
        self.socket.send(command);
    }

    /// Cancel every timer owned by the player and its tank
    pub fn cancel_tasks(&mut self) {
        if let Some(tank) = self.tank.as_mut() {
            tank.tasks.cancel_all();
        }
        self.tasks.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_keys() {
        assert_eq!(Team::from_key("red"), Some(Team::Red));
        assert_eq!(Team::from_key(Team::Blue.key()), Some(Team::Blue));
        assert_eq!(Team::from_key("green"), None);
        assert_eq!(Team::Red.opposite(), Team::Blue);
        assert_eq!(Team::None.opposite(), Team::None);
    }

    #[test]
    fn test_team_serde() {
        assert_eq!(serde_json::to_string(&Team::Red).unwrap(), "\"RED\"");
        let team: Team = serde_json::from_str("\"BLUE\"").unwrap();
        assert_eq!(team, Team::Blue);
    }

    #[test]
    fn test_load_stage_order() {
        assert!(LoadStage::Loading < LoadStage::ModelsReady);
        assert!(LoadStage::LocalReady < LoadStage::Ready);
    }
}

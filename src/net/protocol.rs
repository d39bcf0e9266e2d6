//! Command identities and text serialization
//!
//! A record is `<category>;<key>;<arg1>;<arg2>...`. The (category, key,
//! side) table below is the binding contract with the client: every
//! identity the server sends or accepts appears exactly once.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::OnceLock;

/// Argument separator inside a record
pub const SEPARATOR: char = ';';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed record: '{0}'")]
    Malformed(String),
    #[error("Unknown category '{0}'")]
    UnknownCategory(String),
    #[error("Unknown command '{category};{key}'")]
    UnknownCommand { category: String, key: String },
}

/// Which peer a command travels to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandSide {
    /// Sent by the client, handled by the server
    Server,
    /// Sent by the server to the client
    Client,
}

macro_rules! command_categories {
    ($($variant:ident => $key:literal),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandCategory {
            $($variant),*
        }

        impl CommandCategory {
            pub const ALL: &'static [CommandCategory] = &[$(CommandCategory::$variant),*];

            pub fn key(self) -> &'static str {
                match self {
                    $(CommandCategory::$variant => $key),*
                }
            }

            pub fn from_key(key: &str) -> Option<Self> {
                match key {
                    $($key => Some(CommandCategory::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

command_categories! {
    System => "system",
    Auth => "auth",
    Lobby => "lobby",
    BattleSelect => "battle_select",
    BattleCreate => "battle_create",
    Battle => "battle",
    BattleChat => "chat",
}

macro_rules! command_names {
    ($($variant:ident => ($category:ident, $key:literal, $side:ident)),* $(,)?) => {
        /// Every command identity known to the protocol
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandName {
            $($variant),*
        }

        impl CommandName {
            pub const ALL: &'static [CommandName] = &[$(CommandName::$variant),*];

            pub fn category(self) -> CommandCategory {
                match self {
                    $(CommandName::$variant => CommandCategory::$category),*
                }
            }

            pub fn key(self) -> &'static str {
                match self {
                    $(CommandName::$variant => $key),*
                }
            }

            pub fn side(self) -> CommandSide {
                match self {
                    $(CommandName::$variant => CommandSide::$side),*
                }
            }
        }
    };
}

command_names! {
    // Connection bootstrap and resource handshake
    InitLocale => (System, "init_locale", Client),
    LoadResources => (System, "load_resources", Client),
    MainResourcesLoaded => (System, "main_resources_loaded", Client),
    DependenciesLoaded => (System, "dependencies_loaded", Server),
    ClientError => (System, "error", Server),

    Login => (Auth, "login", Server),
    AuthAccept => (Auth, "accept", Client),
    AuthDenied => (Auth, "denied", Client),

    ChangeLayout => (Lobby, "change_layout_state", Client),
    InitBattleSelect => (Lobby, "init_battle_select", Client),
    SelectBattle => (Lobby, "select", Client),
    ShowBattleInfo => (Lobby, "show_battle_info", Client),
    AddBattle => (Lobby, "create_battle", Client),
    RemoveBattle => (Lobby, "remove_battle", Client),
    UnloadBattleSelect => (Lobby, "unload_battle_select", Client),
    StartBattle => (Lobby, "start_battle", Client),
    UnloadChat => (Lobby, "unload_chat", Client),
    UpdateCrystals => (Lobby, "add_crystall", Client),
    SwitchBattleSelect => (Lobby, "switch_battle_select", Server),

    BattleSelect => (BattleSelect, "select", Server),
    Fight => (BattleSelect, "fight", Server),
    JoinBattleTeam => (BattleSelect, "enter_battle_team", Server),
    JoinAsSpectator => (BattleSelect, "enter_battle_spectator", Server),
    CreateBattle => (BattleCreate, "battle_create", Server),

    // Battle load sequence
    InitShotsData => (Battle, "init_shots_data", Client),
    InitBonusesData => (Battle, "init_bonuses_data", Client),
    InitBattleModel => (Battle, "init_battle_model", Client),
    InitBonuses => (Battle, "init_bonuses", Client),
    GetInitDataLocalTank => (Battle, "get_init_data_local_tank", Server),
    InitSuicideModel => (Battle, "init_suicide_model", Client),
    InitStatisticsModel => (Battle, "init_statistics_model", Client),
    InitGuiModel => (Battle, "init_gui_model", Client),
    InitDmModel => (Battle, "init_dm_model", Client),
    InitTdmModel => (Battle, "init_tdm_model", Client),
    InitCtfModel => (Battle, "init_ctf_model", Client),
    InitDomModel => (Battle, "init_dom_model", Client),
    InitDmStatistics => (Battle, "init_dm_statistics", Client),
    InitTeamStatistics => (Battle, "init_team_statistics", Client),
    UpdateSpectatorsList => (Battle, "update_spectator_list", Client),
    InitInventory => (Battle, "init_inventory", Client),
    InitMineModel => (Battle, "init_mine_model", Client),
    InitEffects => (Battle, "init_effects", Client),
    InitTank => (Battle, "init_tank", Client),
    Ping => (Battle, "ping", Server),
    Pong => (Battle, "pong", Client),

    // Roster and statistics
    BattlePlayerJoinDm => (Battle, "user_connect_dm", Client),
    BattlePlayerLeaveDm => (Battle, "user_disconnect_dm", Client),
    BattlePlayerJoinTeam => (Battle, "user_connect_team", Client),
    BattlePlayerLeaveTeam => (Battle, "user_disconnect_team", Client),
    BattlePlayerRemove => (Battle, "remove_user", Client),
    UpdatePlayerStatistics => (Battle, "update_player_statistic", Client),
    ChangeTeamScore => (Battle, "change_team_scores", Client),
    ChangeFund => (Battle, "change_fund", Client),
    ExitFromBattle => (Battle, "i_exit_from_battle", Server),
    UnloadBattle => (Battle, "unload_battle", Client),

    // Tank lifecycle
    PrepareToSpawn => (Battle, "prepare_to_spawn", Client),
    ReadyToSpawn => (Battle, "ready_to_spawn", Server),
    ReadyToRespawn => (Battle, "ready_to_respawn", Server),
    ChangeHealth => (Battle, "change_health", Client),
    SpawnTank => (Battle, "spawn", Client),
    ActivateTank => (Battle, "activate_tank", Client),
    SelfDestruct => (Battle, "suicide", Server),
    KillLocalTank => (Battle, "local_user_killed", Client),
    KillTank => (Battle, "kill_tank", Client),
    DamageTank => (Battle, "damage_tank", Client),
    ChangeTankSpecification => (Battle, "change_spec_tank", Client),

    // Movement, relayed verbatim
    Move => (Battle, "move", Server),
    FullMove => (Battle, "fullMove", Server),
    RotateTurret => (Battle, "rotateTurret", Server),
    MovementControl => (Battle, "movementControl", Server),
    ClientMove => (Battle, "move", Client),
    ClientFullMove => (Battle, "fullMove", Client),
    ClientRotateTurret => (Battle, "rotateTurret", Client),
    ClientMovementControl => (Battle, "movementControl", Client),

    // Shots
    StartFire => (Battle, "start_fire", Server),
    Fire => (Battle, "fire", Server),
    FireStatic => (Battle, "fire_static", Server),
    FireTarget => (Battle, "fire_target", Server),
    StopFire => (Battle, "stop_fire", Server),
    ClientStartFire => (Battle, "start_fire", Client),
    Shot => (Battle, "shot", Client),
    ShotStatic => (Battle, "shot_static", Client),
    ShotTarget => (Battle, "shot_target", Client),
    ClientStopFire => (Battle, "stop_fire", Client),
    SetTarget => (Battle, "set_target", Server),
    ResetTarget => (Battle, "reset_target", Server),
    ClientSetTarget => (Battle, "set_target", Client),
    ClientResetTarget => (Battle, "reset_target", Client),
    EnterSnipingMode => (Battle, "enter_sniping_mode", Server),
    ExitSnipingMode => (Battle, "exit_sniping_mode", Server),
    FireSniping => (Battle, "fire_sniping", Server),
    ClientEnterSnipingMode => (Battle, "enter_sniping_mode", Client),
    ClientExitSnipingMode => (Battle, "exit_sniping_mode", Client),

    // Supplies and effects
    ActivateItem => (Battle, "activate_item", Server),
    ClientActivateItem => (Battle, "activate_item", Client),
    EnableEffect => (Battle, "enable_effect", Client),
    DisableEffect => (Battle, "disable_effect", Client),

    // Bonuses
    SpawnBonus => (Battle, "spawn_bonus", Client),
    RemoveBonus => (Battle, "remove_bonus", Client),
    TryActivateBonus => (Battle, "attempt_to_take_bonus", Server),
    ActivateBonus => (Battle, "take_bonus_by", Client),
    SpawnGold => (Battle, "gold_spawn", Client),
    TakeGold => (Battle, "gold_taken", Client),

    // Mines
    AddMine => (Battle, "put_mine", Client),
    ActivateMine => (Battle, "activate_mine", Client),
    TriggerMine => (Battle, "mine_hit", Server),
    ClientTriggerMine => (Battle, "hit_mine", Client),
    RemoveMines => (Battle, "remove_mines", Client),

    // Capture the flag
    TriggerFlag => (Battle, "attempt_to_take_flag", Server),
    DropFlag => (Battle, "flag_drop", Server),
    FlagCaptured => (Battle, "flagTaken", Client),
    FlagDropped => (Battle, "flag_drop", Client),
    FlagDelivered => (Battle, "deliver_flag", Client),
    FlagReturned => (Battle, "return_flag", Client),
    InitFlags => (Battle, "init_flags", Client),

    // Battle chat; the client-bound record is written without its key
    SendBattleChatMessageServer => (BattleChat, "send_message", Server),
    SendBattleChatMessageClient => (BattleChat, "message", Client),
}

type LookupTable = FxHashMap<(CommandCategory, &'static str), SmallVec<[CommandName; 2]>>;

fn lookup_table() -> &'static LookupTable {
    static TABLE: OnceLock<LookupTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = LookupTable::default();
        for &name in CommandName::ALL {
            table
                .entry((name.category(), name.key()))
                .or_default()
                .push(name);
        }
        table
    })
}

impl CommandName {
    /// Resolve a (category, key) pair, preferring identities of `side`
    ///
    /// Several keys exist in both directions (`move`, `start_fire`, ...);
    /// when the preferred side has no entry the other direction is
    /// returned so dispatch can report a direction mismatch.
    pub fn resolve(category: CommandCategory, key: &str, side: CommandSide) -> Option<CommandName> {
        let candidates = lookup_table().get(&(category, key))?;
        candidates
            .iter()
            .copied()
            .find(|name| name.side() == side)
            .or_else(|| candidates.first().copied())
    }

    /// Written as `<category>;<args...>` with no key
    pub fn omits_key(self) -> bool {
        matches!(self, CommandName::SendBattleChatMessageClient)
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.category().key(), self.key())
    }
}

/// A typed command with raw string arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: CommandName,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: CommandName) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(name: CommandName, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Text form without the frame delimiter
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(64);
        out.push_str(self.name.category().key());
        if !self.name.omits_key() {
            out.push(SEPARATOR);
            out.push_str(self.name.key());
        }
        for arg in &self.args {
            out.push(SEPARATOR);
            out.push_str(arg);
        }
        out
    }

    /// Parse a decrypted frame received from a client
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Self::parse_from(text, CommandSide::Server)
    }

    /// Parse a frame, preferring identities travelling towards `side`
    pub fn parse_from(text: &str, side: CommandSide) -> Result<Self, ProtocolError> {
        let mut tokens = text.split(SEPARATOR);
        let category_key = tokens.next().unwrap_or_default();
        let key = tokens
            .next()
            .ok_or_else(|| ProtocolError::Malformed(text.to_string()))?;

        let category = CommandCategory::from_key(category_key)
            .ok_or_else(|| ProtocolError::UnknownCategory(category_key.to_string()))?;
        let name = CommandName::resolve(category, key, side).ok_or_else(|| {
            ProtocolError::UnknownCommand {
                category: category_key.to_string(),
                key: key.to_string(),
            }
        })?;

        Ok(Self {
            name,
            args: tokens.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.name, self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identities_unique() {
        let mut seen = HashSet::new();
        for &name in CommandName::ALL {
            assert!(
                seen.insert((name.category(), name.key(), name.side())),
                "duplicate identity {}",
                name
            );
        }
    }

    #[test]
    fn test_category_keys_round_trip() {
        for &category in CommandCategory::ALL {
            assert_eq!(CommandCategory::from_key(category.key()), Some(category));
        }
        assert_eq!(CommandCategory::from_key("garage"), None);
    }

    #[test]
    fn test_round_trip_every_identity() {
        let arg_sets: [Vec<&str>; 3] = [vec![], vec!["user"], vec!["a", "{\"x\":1}", ""]];
        for &name in CommandName::ALL {
            if name.omits_key() {
                continue;
            }
            for args in &arg_sets {
                let command = Command::with_args(name, args.iter().copied());
                let parsed = Command::parse_from(&command.serialize(), name.side()).unwrap();
                assert_eq!(parsed, command);
            }
        }
    }

    #[test]
    fn test_serialize_layout() {
        let command = Command::with_args(CommandName::KillTank, ["tank1", "killed", "tank2"]);
        assert_eq!(command.serialize(), "battle;kill_tank;tank1;killed;tank2");
        assert_eq!(Command::new(CommandName::Pong).serialize(), "battle;pong");
    }

    #[test]
    fn test_chat_record_omits_key() {
        let command = Command::with_args(
            CommandName::SendBattleChatMessageClient,
            ["alice", "hello", "NONE"],
        );
        assert_eq!(command.serialize(), "chat;alice;hello;NONE");
    }

    #[test]
    fn test_resolve_prefers_side() {
        let inbound = Command::parse("battle;move;{}").unwrap();
        assert_eq!(inbound.name, CommandName::Move);
        let outbound = Command::parse_from("battle;move;tank;{}", CommandSide::Client).unwrap();
        assert_eq!(outbound.name, CommandName::ClientMove);
        // Client-only identity still resolves so dispatch can reject it
        let wrong_way = Command::parse("battle;kill_tank;x").unwrap();
        assert_eq!(wrong_way.name.side(), CommandSide::Client);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Command::parse("battle"),
            Err(ProtocolError::Malformed("battle".to_string()))
        );
        assert_eq!(
            Command::parse("garage;try_buy"),
            Err(ProtocolError::UnknownCategory("garage".to_string()))
        );
        assert!(matches!(
            Command::parse("battle;teleport;x"),
            Err(ProtocolError::UnknownCommand { .. })
        ));
    }
}

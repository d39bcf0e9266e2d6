//! Process-wide state shared by every connection

use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::{CatalogError, GarageCatalog, MapCatalog};
use crate::config::{ConfigError, ServerConfig};
use crate::game::{Battle, BattleProperties, BattleServices, BattleTimings};
use crate::handlers::{self, HandlerContext};
use crate::lobby::{BattleManager, CreateBattle, LeaveOutcome, ManagerError};
use crate::metrics::Metrics;
use crate::net::connection::SocketRegistry;
use crate::net::dispatch::{CommandRegistry, DispatchError};
use crate::net::protocol::{Command, CommandName};
use crate::net::socket::{Screen, UserSocket};
use crate::store::{InMemoryQuestTracker, InMemoryUserRepository, QuestTracker, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid handler table: {0}")]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error("Map '{0}' is not in the catalog")]
    UnknownMap(String),
}

/// Catalogs, stores, battles and connected sockets
pub struct ServerContext {
    pub config: ServerConfig,
    pub maps: Arc<MapCatalog>,
    pub garage: Arc<GarageCatalog>,
    pub users: Arc<dyn UserRepository>,
    pub quests: Arc<dyn QuestTracker>,
    pub metrics: Arc<Metrics>,
    pub battles: BattleManager,
    pub sockets: SocketRegistry,
    pub registry: CommandRegistry<HandlerContext>,
}

impl ServerContext {
    pub fn new(
        config: ServerConfig,
        maps: MapCatalog,
        garage: GarageCatalog,
        users: Arc<dyn UserRepository>,
        quests: Arc<dyn QuestTracker>,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<Self>, ServerError> {
        let garage = Arc::new(garage);
        let services = BattleServices {
            garage: garage.clone(),
            users: users.clone(),
            quests: quests.clone(),
            metrics: metrics.clone(),
            timings: BattleTimings::from_config(&config),
        };
        Ok(Arc::new(Self {
            battles: BattleManager::new(config.max_battles, services),
            registry: handlers::build_registry()?,
            sockets: SocketRegistry::new(),
            maps: Arc::new(maps),
            garage,
            users,
            quests,
            metrics,
            config,
        }))
    }

    /// Catalogs from the configured JSON files, built-ins otherwise, with in-memory stores
    pub fn from_config(config: ServerConfig, metrics: Arc<Metrics>) -> Result<Arc<Self>, ServerError> {
        config.validate()?;
        let maps = match &config.maps_path {
            Some(path) => MapCatalog::from_json_file(path)?,
            None => MapCatalog::builtin(),
        };
        let garage = match &config.garage_path {
            Some(path) => GarageCatalog::from_json_file(path)?,
            None => GarageCatalog::builtin(),
        };
        info!(
            maps = maps.names().count(),
            weapons = garage.weapons().count(),
            "Catalogs loaded"
        );
        Self::new(
            config,
            maps,
            garage,
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryQuestTracker::new()),
            metrics,
        )
    }

    /// The persistent battle every fresh server lists
    pub fn create_default_battle(&self) -> Result<Arc<Battle>, ServerError> {
        let map = self
            .maps
            .get(&self.config.default_battle_map)
            .ok_or_else(|| ServerError::UnknownMap(self.config.default_battle_map.clone()))?;
        let battle = self.battles.create(CreateBattle {
            title: self.config.default_battle_title.clone(),
            map,
            mode: self.config.default_mode()?,
            properties: BattleProperties {
                max_people: self.config.max_players_per_battle,
                ..Default::default()
            },
            persistent: true,
        })?;
        Ok(battle)
    }

    /// Take `socket` out of its battle
    ///
    /// The session forgets the battle first, so a second call is a no-op.
    /// A removed battle disappears from every battle-select screen.
    pub fn leave_battle(&self, socket: &UserSocket) -> Result<Option<LeaveOutcome>, ManagerError> {
        let (battle_id, username) = socket.update_session(|s| {
            let battle = s.battle.take();
            if battle.is_some() {
                s.screen = Screen::BattleSelect;
            }
            (battle, s.username.clone())
        });
        let (Some(battle_id), Some(username)) = (battle_id, username) else {
            return Ok(None);
        };

        let outcome = self.battles.leave(&battle_id, &username)?;
        if outcome == LeaveOutcome::BattleRemoved {
            debug!(battle = %battle_id, "Announcing removed battle");
            self.broadcast_on_screen(
                Screen::BattleSelect,
                Command::with_args(CommandName::RemoveBattle, [battle_id]),
            );
        }
        Ok(Some(outcome))
    }

    /// Send to every socket currently showing `screen`
    pub fn broadcast_on_screen(&self, screen: Screen, command: Command) {
        for socket in self.sockets.on_screen(screen) {
            socket.send(command.clone());
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Arc<Self> {
        let config = ServerConfig {
            protocol_encryption: false,
            bonus_spawn_interval_secs: 0,
            ..Default::default()
        };
        Self::new(
            config,
            MapCatalog::builtin(),
            GarageCatalog::builtin(),
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryQuestTracker::new()),
            Arc::new(Metrics::new()),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;

    #[tokio::test]
    async fn test_default_battle_is_persistent() {
        let server = ServerContext::for_tests();
        let battle = server.create_default_battle().unwrap();
        assert!(battle.info().persistent);
        assert_eq!(battle.info().title, "For newbies");
        assert_eq!(server.battles.len(), 1);
    }

    #[tokio::test]
    async fn test_default_battle_unknown_map() {
        let config = ServerConfig {
            default_battle_map: "map_void".to_string(),
            ..Default::default()
        };
        let server = ServerContext::from_config(config, Arc::new(Metrics::new())).unwrap();
        assert!(matches!(server.create_default_battle(), Err(ServerError::UnknownMap(_))));
    }

    #[tokio::test]
    async fn test_leave_battle_twice() {
        let server = ServerContext::for_tests();
        server.create_default_battle().unwrap();
        let (ctx, _rx) = in_battle(&server, 1, "alice").await;

        assert_eq!(server.leave_battle(&ctx.socket).unwrap(), Some(LeaveOutcome::Stayed));
        assert_eq!(server.leave_battle(&ctx.socket).unwrap(), None);
        assert_eq!(ctx.socket.screen(), Screen::BattleSelect);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        assert!(matches!(
            ServerContext::from_config(config, Arc::new(Metrics::new())),
            Err(ServerError::Config(ConfigError::ZeroPort))
        ));
    }
}

use parking_lot::RwLock;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::maps::MapDescriptor;
use crate::game::{Battle, BattleError, BattleId, BattleInfo, BattleMode, BattleProperties, BattleServices, BattleSummary};

/// Parameters of a new battle
#[derive(Debug, Clone)]
pub struct CreateBattle {
    pub title: String,
    pub map: Arc<MapDescriptor>,
    pub mode: BattleMode,
    pub properties: BattleProperties,
    pub persistent: bool,
}

/// What happened to the battle after a player left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Stayed,
    /// The battle emptied and was removed from the registry
    BattleRemoved,
}

/// Registry of running battles
///
/// Lock order is registry first, then a battle; the battle lock is never
/// held while the registry lock is taken.
#[derive(Debug)]
pub struct BattleManager {
    battles: RwLock<Vec<Arc<Battle>>>,
    max_battles: usize,
    services: BattleServices,
}

impl BattleManager {
    pub fn new(max_battles: usize, services: BattleServices) -> Self {
        Self {
            battles: RwLock::new(Vec::new()),
            max_battles,
            services,
        }
    }

    pub fn services(&self) -> &BattleServices {
        &self.services
    }

    /// Create, start and register a battle
    pub fn create(&self, request: CreateBattle) -> Result<Arc<Battle>, ManagerError> {
        if !request.map.supports(request.mode) {
            return Err(ManagerError::ModeNotSupported {
                map: request.map.name.clone(),
                mode: request.mode,
            });
        }

        let mut battles = self.battles.write();
        if battles.len() >= self.max_battles {
            return Err(ManagerError::TooManyBattles(self.max_battles));
        }

        let info = BattleInfo {
            id: new_battle_id(),
            title: request.title,
            map: request.map,
            mode: request.mode,
            properties: request.properties.normalized(),
            persistent: request.persistent,
        };
        let battle = Battle::new(info, self.services.clone());
        battle.start();
        battles.push(battle.clone());
        self.services.metrics.battles_active.fetch_add(1, Ordering::Relaxed);

        info!(
            battle = %battle.id(),
            title = %battle.info().title,
            map = %battle.info().map.name,
            mode = battle.info().mode.key(),
            "Battle created"
        );
        Ok(battle)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Battle>> {
        self.battles.read().iter().find(|b| b.id() == id).cloned()
    }

    pub fn require(&self, id: &str) -> Result<Arc<Battle>, ManagerError> {
        self.get(id).ok_or_else(|| ManagerError::BattleNotFound(id.to_string()))
    }

    /// Battles in creation order
    pub fn list(&self) -> Vec<Arc<Battle>> {
        self.battles.read().clone()
    }

    pub fn summaries(&self) -> Vec<BattleSummary> {
        self.list().iter().map(|b| b.lock().summary()).collect()
    }

    pub fn len(&self) -> usize {
        self.battles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.battles.read().is_empty()
    }

    /// Remove `username` from a battle; an emptied non-persistent battle goes away
    pub fn leave(&self, battle_id: &str, username: &str) -> Result<LeaveOutcome, ManagerError> {
        let battle = self.require(battle_id)?;
        battle.lock().remove_player(username)?;

        if battle.info().persistent {
            return Ok(LeaveOutcome::Stayed);
        }
        let mut battles = self.battles.write();
        // Someone may have joined between the two locks
        if !battle.lock().is_empty() {
            return Ok(LeaveOutcome::Stayed);
        }
        battles.retain(|b| b.id() != battle_id);
        drop(battles);
        self.finish(&battle);
        Ok(LeaveOutcome::BattleRemoved)
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Battle>> {
        let battle = {
            let mut battles = self.battles.write();
            let index = battles.iter().position(|b| b.id() == id)?;
            battles.remove(index)
        };
        self.finish(&battle);
        Some(battle)
    }

    fn finish(&self, battle: &Battle) {
        battle.shutdown();
        self.services.metrics.battles_active.fetch_sub(1, Ordering::Relaxed);
        debug!(battle = %battle.id(), "Battle removed");
    }

    /// Shut every battle down, cancelling their timers
    pub fn shutdown_all(&self) {
        let battles: Vec<Arc<Battle>> = std::mem::take(&mut *self.battles.write());
        for battle in &battles {
            self.finish(battle);
        }
        info!(count = battles.len(), "All battles shut down");
    }
}

/// Short hex id
fn new_battle_id() -> BattleId {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Manager errors
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Battle limit of {0} reached")]
    TooManyBattles(usize),
    #[error("Battle {0} not found")]
    BattleNotFound(String),
    #[error("Map {map} does not support {mode:?}")]
    ModeNotSupported { map: String, mode: BattleMode },
    #[error(transparent)]
    Battle(#[from] BattleError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MapCatalog;
    use crate::game::Team;
    use crate::net::socket::detached_socket;
    use crate::store::User;

    fn manager(max: usize) -> BattleManager {
        BattleManager::new(max, BattleServices::standalone())
    }

    fn request(title: &str, persistent: bool) -> CreateBattle {
        CreateBattle {
            title: title.to_string(),
            map: MapCatalog::builtin().get("map_sandbox").unwrap(),
            mode: BattleMode::Deathmatch,
            properties: BattleProperties::default(),
            persistent,
        }
    }

    fn enter(battle: &Battle, id: u64, name: &str) {
        let (socket, _rx) = detached_socket(id);
        battle
            .lock()
            .add_player(socket, &User::new(name, "pw"), Some(Team::None), false)
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let manager = manager(10);
        let a = manager.create(request("A", false)).unwrap();
        let b = manager.create(request("B", false)).unwrap();
        assert_eq!(a.id().len(), 16);
        assert_ne!(a.id(), b.id());

        let titles: Vec<String> = manager.summaries().into_iter().map(|s| s.name).collect();
        assert_eq!(titles, ["A", "B"]);
        assert!(manager.get(b.id()).is_some());
        assert_eq!(
            manager.services().metrics.battles_active.load(Ordering::Relaxed),
            2
        );
    }

    #[tokio::test]
    async fn test_max_battles() {
        let manager = manager(1);
        manager.create(request("A", false)).unwrap();
        assert!(matches!(
            manager.create(request("B", false)),
            Err(ManagerError::TooManyBattles(1))
        ));
    }

    #[tokio::test]
    async fn test_empty_battle_removed() {
        let manager = manager(10);
        let battle = manager.create(request("A", false)).unwrap();
        enter(&battle, 1, "alice");
        enter(&battle, 2, "bob");

        assert_eq!(manager.leave(battle.id(), "alice").unwrap(), LeaveOutcome::Stayed);
        assert_eq!(manager.leave(battle.id(), "bob").unwrap(), LeaveOutcome::BattleRemoved);
        assert!(manager.get(battle.id()).is_none());
        assert!(matches!(
            manager.leave(battle.id(), "bob"),
            Err(ManagerError::BattleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persistent_battle_kept() {
        let manager = manager(10);
        let battle = manager.create(request("Main", true)).unwrap();
        enter(&battle, 1, "alice");
        assert_eq!(manager.leave(battle.id(), "alice").unwrap(), LeaveOutcome::Stayed);
        assert_eq!(manager.len(), 1);
        assert!(matches!(
            manager.leave(battle.id(), "alice"),
            Err(ManagerError::Battle(BattleError::PlayerNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let manager = manager(10);
        manager.create(request("A", true)).unwrap();
        manager.create(request("B", false)).unwrap();
        manager.shutdown_all();
        assert!(manager.is_empty());
        assert_eq!(
            manager.services().metrics.battles_active.load(Ordering::Relaxed),
            0
        );
    }
}

//! Static map descriptors

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::{read_file, CatalogError, ResourceRef};
use crate::game::modes::BattleMode;
use crate::game::player::Team;
use crate::util::Vector3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub position: Vector3,
    /// Euler angles; only z is used for placement
    pub rotation: Vector3,
    #[serde(default)]
    pub team: Option<Team>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlagBases {
    pub red: Vector3,
    pub blue: Vector3,
}

impl FlagBases {
    pub fn base(&self, team: Team) -> Option<Vector3> {
        match team {
            Team::Red => Some(self.red),
            Team::Blue => Some(self.blue),
            Team::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSpec {
    pub id: u32,
    pub name: String,
    pub position: Vector3,
    pub radius: f64,
}

/// Resource sets loaded while entering a battle, in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MapResources {
    pub proplibs: Vec<ResourceRef>,
    pub skybox: Vec<ResourceRef>,
    pub map: Vec<ResourceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDescriptor {
    pub name: String,
    pub title: String,
    pub theme: String,
    pub preview: u64,
    pub min_rank: u8,
    pub max_rank: u8,
    pub max_people: usize,
    pub skybox: String,
    pub modes: Vec<BattleMode>,
    pub spawn_points: Vec<SpawnPoint>,
    #[serde(default)]
    pub flags: Option<FlagBases>,
    #[serde(default)]
    pub points: Vec<PointSpec>,
    #[serde(default)]
    pub bonus_points: Vec<Vector3>,
    #[serde(default)]
    pub resources: MapResources,
}

impl MapDescriptor {
    /// Random spawn point, restricted to `team` when the map has team points
    pub fn random_spawn<R: Rng + ?Sized>(&self, team: Team, rng: &mut R) -> Option<&SpawnPoint> {
        let team_points: Vec<&SpawnPoint> = self
            .spawn_points
            .iter()
            .filter(|p| team != Team::None && p.team == Some(team))
            .collect();
        if team_points.is_empty() {
            self.spawn_points.choose(rng)
        } else {
            team_points.choose(rng).copied()
        }
    }

    pub fn random_bonus_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Vector3> {
        self.bonus_points.choose(rng).copied()
    }

    pub fn supports(&self, mode: BattleMode) -> bool {
        self.modes.contains(&mode)
    }
}

/// Map lookup by name
#[derive(Debug, Clone)]
pub struct MapCatalog {
    maps: HashMap<String, Arc<MapDescriptor>>,
}

impl MapCatalog {
    pub fn new(maps: Vec<MapDescriptor>) -> Result<Self, CatalogError> {
        if maps.is_empty() {
            return Err(CatalogError::Empty);
        }
        if let Some(map) = maps.iter().find(|m| m.spawn_points.is_empty()) {
            return Err(CatalogError::NoSpawnPoints(map.name.clone()));
        }
        Ok(Self::index(maps))
    }

    fn index(maps: Vec<MapDescriptor>) -> Self {
        Self {
            maps: maps.into_iter().map(|m| (m.name.clone(), Arc::new(m))).collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &str) -> Result<Self, CatalogError> {
        Self::from_json(&read_file(path)?)
    }

    pub fn get(&self, name: &str) -> Option<Arc<MapDescriptor>> {
        self.maps.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    /// A small symmetric arena supporting every mode
    pub fn builtin() -> Self {
        let spawn = |x, y, rot, team| SpawnPoint {
            position: Vector3::new(x, y, 0.0),
            rotation: Vector3::new(0.0, 0.0, rot),
            team,
        };
        let sandbox = MapDescriptor {
            name: "map_sandbox".to_string(),
            title: "Sandbox".to_string(),
            theme: "SUMMER".to_string(),
            preview: 500_001,
            min_rank: 1,
            max_rank: 30,
            max_people: 16,
            skybox: "skybox_summer".to_string(),
            modes: vec![
                BattleMode::Deathmatch,
                BattleMode::TeamDeathmatch,
                BattleMode::CaptureTheFlag,
                BattleMode::ControlPoints,
            ],
            spawn_points: vec![
                spawn(-3000.0, -3000.0, 0.785, Some(Team::Red)),
                spawn(-3000.0, -1500.0, 0.785, Some(Team::Red)),
                spawn(3000.0, 3000.0, -2.356, Some(Team::Blue)),
                spawn(3000.0, 1500.0, -2.356, Some(Team::Blue)),
                spawn(0.0, 2500.0, 3.141, None),
                spawn(0.0, -2500.0, 0.0, None),
            ],
            flags: Some(FlagBases {
                red: Vector3::new(-3500.0, -3500.0, 0.0),
                blue: Vector3::new(3500.0, 3500.0, 0.0),
            }),
            points: vec![
                PointSpec { id: 0, name: "A".to_string(), position: Vector3::new(-1500.0, 1500.0, 0.0), radius: 1000.0 },
                PointSpec { id: 1, name: "B".to_string(), position: Vector3::ZERO, radius: 1000.0 },
                PointSpec { id: 2, name: "C".to_string(), position: Vector3::new(1500.0, -1500.0, 0.0), radius: 1000.0 },
            ],
            bonus_points: vec![
                Vector3::new(0.0, 0.0, 1000.0),
                Vector3::new(-1500.0, 1500.0, 1000.0),
                Vector3::new(1500.0, -1500.0, 1000.0),
            ],
            resources: MapResources {
                proplibs: vec![ResourceRef::new(160_001, 11), ResourceRef::new(160_002, 11)],
                skybox: vec![ResourceRef::new(170_001, 10)],
                map: vec![ResourceRef::new(180_001, 7)],
            },
        };
        Self::index(vec![sandbox])
    }
}

impl Default for MapCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_builtin_map() {
        let catalog = MapCatalog::builtin();
        let map = catalog.get("map_sandbox").unwrap();
        assert!(map.supports(BattleMode::CaptureTheFlag));
        assert!(map.flags.is_some());
        assert_eq!(map.points.len(), 3);
        assert!(catalog.get("map_unknown").is_none());
    }

    #[test]
    fn test_team_spawn_filter() {
        let map = MapCatalog::builtin().get("map_sandbox").unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            assert_eq!(map.random_spawn(Team::Red, &mut rng).unwrap().team, Some(Team::Red));
            assert_eq!(map.random_spawn(Team::Blue, &mut rng).unwrap().team, Some(Team::Blue));
        }
        assert!(map.random_spawn(Team::None, &mut rng).is_some());
    }

    #[test]
    fn test_rejects_map_without_spawns() {
        let mut map = (*MapCatalog::builtin().get("map_sandbox").unwrap()).clone();
        map.spawn_points.clear();
        assert!(matches!(
            MapCatalog::new(vec![map]),
            Err(CatalogError::NoSpawnPoints(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let map = (*MapCatalog::builtin().get("map_sandbox").unwrap()).clone();
        let json = serde_json::to_string(&vec![map.clone()]).unwrap();
        let catalog = MapCatalog::from_json(&json).unwrap();
        assert_eq!(*catalog.get("map_sandbox").unwrap(), map);
    }
}

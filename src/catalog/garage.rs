//! Hull, weapon and paint stat blocks

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::{read_file, CatalogError};
use crate::game::damage::{BaseDamage, DamageCalculator, DamageConfig, DamageRange, Splash, Weakening};
use crate::game::weapons::WeaponKind;

/// Movement specification sent with spawn/spec-change commands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HullPhysics {
    pub speed: f64,
    pub turn_speed: f64,
    pub acceleration: f64,
    pub reverse_acceleration: f64,
    pub side_acceleration: f64,
    pub turn_acceleration: f64,
    pub reverse_turn_acceleration: f64,
    pub mass: f64,
    pub power: f64,
    pub damping: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HullSpec {
    pub id: String,
    pub resource: u64,
    pub physics: HullPhysics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponSpec {
    pub id: String,
    pub kind: WeaponKind,
    pub resource: u64,
    pub reload_ms: u64,
    pub turret_rotation_speed: f64,
    pub turret_turn_acceleration: f64,
    pub damage: DamageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaintSpec {
    pub id: String,
    pub resource: u64,
}

#[derive(Debug, Deserialize)]
struct GarageFile {
    hulls: Vec<HullSpec>,
    weapons: Vec<WeaponSpec>,
    paints: Vec<PaintSpec>,
}

/// Equipment stat lookup
#[derive(Debug, Clone)]
pub struct GarageCatalog {
    hulls: HashMap<String, Arc<HullSpec>>,
    weapons: HashMap<String, Arc<WeaponSpec>>,
    paints: HashMap<String, Arc<PaintSpec>>,
}

impl GarageCatalog {
    fn from_parts(
        hulls: Vec<HullSpec>,
        weapons: Vec<WeaponSpec>,
        paints: Vec<PaintSpec>,
    ) -> Result<Self, CatalogError> {
        if hulls.is_empty() || weapons.is_empty() {
            return Err(CatalogError::Empty);
        }
        for weapon in &weapons {
            DamageCalculator::new(weapon.damage).map_err(|source| CatalogError::InvalidWeapon {
                id: weapon.id.clone(),
                source,
            })?;
        }
        Ok(Self::index(hulls, weapons, paints))
    }

    fn index(hulls: Vec<HullSpec>, weapons: Vec<WeaponSpec>, paints: Vec<PaintSpec>) -> Self {
        Self {
            hulls: hulls.into_iter().map(|h| (h.id.clone(), Arc::new(h))).collect(),
            weapons: weapons.into_iter().map(|w| (w.id.clone(), Arc::new(w))).collect(),
            paints: paints.into_iter().map(|p| (p.id.clone(), Arc::new(p))).collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: GarageFile = serde_json::from_str(json)?;
        Self::from_parts(file.hulls, file.weapons, file.paints)
    }

    pub fn from_json_file(path: &str) -> Result<Self, CatalogError> {
        Self::from_json(&read_file(path)?)
    }

    pub fn hull(&self, id: &str) -> Option<Arc<HullSpec>> {
        self.hulls.get(id).cloned()
    }

    pub fn weapon(&self, id: &str) -> Option<Arc<WeaponSpec>> {
        self.weapons.get(id).cloned()
    }

    pub fn paint(&self, id: &str) -> Option<Arc<PaintSpec>> {
        self.paints.get(id).cloned()
    }

    pub fn weapons(&self) -> impl Iterator<Item = &Arc<WeaponSpec>> {
        self.weapons.values()
    }

    /// Built-in m0 equipment
    pub fn builtin() -> Self {
        let hull = |id: &str, resource, speed, turn_speed, acceleration, mass| HullSpec {
            id: id.to_string(),
            resource,
            physics: HullPhysics {
                speed,
                turn_speed,
                acceleration,
                reverse_acceleration: acceleration * 1.2,
                side_acceleration: acceleration * 1.3,
                turn_acceleration: turn_speed * 1.4,
                reverse_turn_acceleration: turn_speed * 2.5,
                mass,
                power: acceleration,
                damping: 1500.0,
            },
        };
        let hulls = vec![
            hull("wasp_m0", 600_001, 10.0, 2.0, 11.0, 1500.0),
            hull("hunter_m0", 600_002, 8.0, 1.6, 9.0, 2000.0),
            hull("titan_m0", 600_003, 6.0, 1.2, 7.0, 3000.0),
        ];

        let weapon = |id: &str, kind, resource, reload_ms, damage| WeaponSpec {
            id: id.to_string(),
            kind,
            resource,
            reload_ms,
            turret_rotation_speed: 1.7,
            turret_turn_acceleration: 2.3,
            damage,
        };
        let weapons = vec![
            weapon("railgun_m0", WeaponKind::Railgun, 700_001, 3500, DamageConfig::fixed(70.0)),
            weapon(
                "thunder_m0",
                WeaponKind::Thunder,
                700_002,
                3000,
                DamageConfig {
                    base: BaseDamage::Fixed(100.0),
                    weakening: None,
                    splash: Some(Splash { minimum: 0.1, maximum: 0.5, radius: 10.0 }),
                },
            ),
            weapon(
                "smoky_m0",
                WeaponKind::Smoky,
                700_003,
                1500,
                DamageConfig {
                    base: BaseDamage::Range(DamageRange { from: 10.0, to: 16.0 }),
                    weakening: Some(Weakening { inner: 40.0, outer: 80.0, minimum: 0.5 }),
                    splash: None,
                },
            ),
            weapon("twins_m0", WeaponKind::Twins, 700_004, 600, DamageConfig::fixed(25.0)),
            weapon("ricochet_m0", WeaponKind::Ricochet, 700_005, 900, DamageConfig::fixed(40.0)),
            weapon("shaft_m0", WeaponKind::Shaft, 700_006, 3000, DamageConfig::fixed(75.0)),
            weapon("flamethrower_m0", WeaponKind::Flamethrower, 700_007, 250, DamageConfig::fixed(10.0)),
            weapon("freeze_m0", WeaponKind::Freeze, 700_008, 250, DamageConfig::fixed(20.0)),
            weapon("isida_m0", WeaponKind::Isida, 700_009, 250, DamageConfig::fixed(20.0)),
        ];

        let paints = vec![
            PaintSpec { id: "green_m0".to_string(), resource: 800_001 },
            PaintSpec { id: "holiday_m0".to_string(), resource: 800_002 },
        ];

        Self::index(hulls, weapons, paints)
    }
}

impl Default for GarageCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let garage = GarageCatalog::builtin();
        assert_eq!(garage.weapon("railgun_m0").unwrap().kind, WeaponKind::Railgun);
        assert!(garage.hull("hunter_m0").is_some());
        assert!(garage.paint("green_m0").is_some());
        assert!(garage.weapon("plasma_m0").is_none());
        assert_eq!(garage.weapons().count(), 9);
    }

    #[test]
    fn test_builtin_damage_valid() {
        for weapon in GarageCatalog::builtin().weapons() {
            assert!(DamageCalculator::new(weapon.damage).is_ok(), "{}", weapon.id);
        }
    }

    #[test]
    fn test_json_catalog_validates_damage() {
        let json = r#"{
            "hulls": [{"id":"h","resource":1,"physics":{"speed":1,"turn_speed":1,"acceleration":1,
                "reverse_acceleration":1,"side_acceleration":1,"turn_acceleration":1,
                "reverse_turn_acceleration":1,"mass":1,"power":1,"damping":1}}],
            "weapons": [{"id":"w","kind":"smoky","resource":2,"reload_ms":100,
                "turret_rotation_speed":1,"turret_turn_acceleration":1,
                "damage":{"base":{"fixed":10},"weakening":{"inner":50,"outer":20,"minimum":0.5}}}],
            "paints": []
        }"#;
        assert!(matches!(
            GarageCatalog::from_json(json),
            Err(CatalogError::InvalidWeapon { .. })
        ));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let json = r#"{"hulls":[],"weapons":[],"paints":[]}"#;
        assert!(matches!(GarageCatalog::from_json(json), Err(CatalogError::Empty)));
    }
}

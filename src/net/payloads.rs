//! JSON records carried inside command arguments

use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::GarageCatalog;
use crate::game::{BattleProperties, BattleState, BattleSummary, Team};
use crate::util::Vector3;

/// `battle_create` request from the battle-select screen
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BattleCreateRequest {
    pub name: String,
    pub map_id: String,
    pub battle_mode: String,
    pub max_people_count: usize,
    pub min_rank: u8,
    pub max_rank: u8,
    pub time_limit_in_sec: u32,
    pub score_limit: u32,
    pub friendly_fire: bool,
    pub without_bonuses: bool,
    pub parkour_mode: bool,
    pub auto_balance: bool,
}

impl Default for BattleCreateRequest {
    fn default() -> Self {
        let props = BattleProperties::default();
        Self {
            name: String::new(),
            map_id: String::new(),
            battle_mode: "DM".to_string(),
            max_people_count: props.max_people,
            min_rank: props.min_rank,
            max_rank: props.max_rank,
            time_limit_in_sec: props.time_limit_secs,
            score_limit: props.score_limit,
            friendly_fire: props.friendly_fire,
            without_bonuses: !props.bonuses_enabled,
            parkour_mode: props.parkour_mode,
            auto_balance: true,
        }
    }
}

impl BattleCreateRequest {
    /// Overlay the request on `base`; rules the request does not carry keep their defaults
    pub fn into_properties(&self, base: BattleProperties) -> BattleProperties {
        BattleProperties {
            friendly_fire: self.friendly_fire,
            parkour_mode: self.parkour_mode,
            bonuses_enabled: !self.without_bonuses,
            min_rank: self.min_rank,
            max_rank: self.max_rank,
            max_people: self.max_people_count,
            time_limit_secs: self.time_limit_in_sec,
            score_limit: self.score_limit,
            ..base
        }
        .normalized()
    }
}

/// Position part of a movement report; everything else is relayed untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovePayload {
    #[serde(default)]
    pub position: Option<Vector3>,
}

impl MovePayload {
    /// Lenient parse: a report without a readable position still relays
    pub fn position_of(raw: &str) -> Option<Vector3> {
        serde_json::from_str::<MovePayload>(raw)
            .ok()
            .and_then(|payload| payload.position)
    }
}

/// Payload of `init_battle_select`
pub fn battle_list(summaries: &[BattleSummary]) -> String {
    json!({ "battles": summaries }).to_string()
}

/// Payload of `show_battle_info`
pub fn battle_info(state: &BattleState) -> String {
    let info = state.info();
    let props = &info.properties;
    let users: Vec<Value> = state
        .players()
        .iter()
        .filter(|p| !p.is_spectator)
        .map(|p| {
            json!({
                "user": p.username,
                "kills": p.kills,
                "score": p.score,
                "teamType": p.team.key(),
            })
        })
        .collect();
    let mut payload = json!({
        "itemId": info.id,
        "battleMode": info.mode.key(),
        "name": info.title,
        "preview": info.map.preview,
        "maxPeopleCount": props.max_people,
        "minRank": props.min_rank,
        "maxRank": props.max_rank,
        "scoreLimit": props.score_limit,
        "timeLimitInSec": props.time_limit_secs,
        "timeLeftInSec": props.time_limit_secs,
        "spectator": true,
        "withoutBonuses": !props.bonuses_enabled,
        "parkourMode": props.parkour_mode,
        "users": users,
    });
    if let Some(scores) = state.mode().scores() {
        payload["scoreRed"] = json!(scores.get(Team::Red));
        payload["scoreBlue"] = json!(scores.get(Team::Blue));
    }
    payload.to_string()
}

/// Payload of `init_shots_data`: reload and turret data of every weapon
pub fn shots_data(garage: &GarageCatalog) -> String {
    let mut weapons: Vec<Value> = garage
        .weapons()
        .map(|weapon| {
            json!({
                "id": weapon.id,
                "kind": weapon.kind,
                "resource": weapon.resource,
                "reload": weapon.reload_ms,
                "turretRotationSpeed": weapon.turret_rotation_speed,
                "turretTurnAcceleration": weapon.turret_turn_acceleration,
            })
        })
        .collect();
    weapons.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
    json!({ "weapons": weapons }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults_missing_fields() {
        let request: BattleCreateRequest =
            serde_json::from_str(r#"{"name":"Arena","mapId":"map_sandbox","battleMode":"TDM","friendlyFire":true}"#)
                .unwrap();
        assert_eq!(request.name, "Arena");
        assert_eq!(request.battle_mode, "TDM");
        assert_eq!(request.max_people_count, 16);

        let props = request.into_properties(BattleProperties::default());
        assert!(props.friendly_fire);
        assert!(props.bonuses_enabled);
        assert!(props.damage_enabled);
    }

    #[test]
    fn test_create_request_parkour_normalized() {
        let request = BattleCreateRequest {
            parkour_mode: true,
            min_rank: 10,
            max_rank: 3,
            ..Default::default()
        };
        let props = request.into_properties(BattleProperties::default());
        assert!(!props.damage_enabled);
        assert!(props.instant_self_destruct);
        assert_eq!((props.min_rank, props.max_rank), (3, 10));
    }

    #[test]
    fn test_move_position() {
        let raw = r#"{"physTime":10,"control":3,"position":{"x":1.5,"y":2.0,"z":-3.0},"orientation":{"x":0,"y":0,"z":0}}"#;
        assert_eq!(MovePayload::position_of(raw), Some(Vector3::new(1.5, 2.0, -3.0)));
        assert_eq!(MovePayload::position_of(r#"{"control":3}"#), None);
        assert_eq!(MovePayload::position_of("not json"), None);
    }

    #[test]
    fn test_shots_data_lists_weapons() {
        let data: Value = serde_json::from_str(&shots_data(&GarageCatalog::builtin())).unwrap();
        let weapons = data["weapons"].as_array().unwrap();
        assert!(weapons.iter().any(|w| w["id"] == "railgun_m0"));
    }
}

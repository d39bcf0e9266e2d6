use tracing::debug;

use super::{HandlerContext, HandlerError};
use crate::game::Team;
use crate::net::dispatch::BoundArgs;
use crate::util::Vector3;

/// `battle;attempt_to_take_flag;<flagTeam>`
pub async fn trigger_flag(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let key = args.str(0)?;
    let team = Team::from_key(key).ok_or_else(|| HandlerError::UnknownTeam(key.to_string()))?;
    let action = ctx.with_battle(|state, username| state.trigger_flag(username, team))?;
    debug!(conn = ctx.socket.id(), flag = %key, ?action, "Flag trigger handled");
    Ok(())
}

/// `battle;flag_drop;<position>;<raycast>`
///
/// Without a raycast hit the flag fell off the map and goes home.
pub async fn drop_flag(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let position: Vector3 = args.json(0)?;
    let raycast = args.bool(1)?;
    ctx.with_battle(|state, username| state.drop_flag(username, position, raycast))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{BattleError, BattleMode, BattleProperties};
    use crate::handlers::battle::ready_to_spawn;
    use crate::handlers::test_support::*;
    use crate::lobby::CreateBattle;
    use crate::net::dispatch::{ArgBinding, ArgKind};
    use crate::net::protocol::CommandName;
    use crate::server::ServerContext;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctf_server() -> Arc<ServerContext> {
        let server = ServerContext::for_tests();
        let map = server.maps.get("map_sandbox").unwrap();
        server
            .battles
            .create(CreateBattle {
                title: "Flags".to_string(),
                map,
                mode: BattleMode::CaptureTheFlag,
                properties: BattleProperties::default(),
                persistent: true,
            })
            .unwrap();
        server
    }

    fn team_arg(team: &str) -> BoundArgs {
        ArgBinding::Positional(&[ArgKind::Str]).bind(vec![team.to_string()]).unwrap()
    }

    fn drop_args(position: &str, raycast: bool) -> BoundArgs {
        ArgBinding::Positional(&[ArgKind::Json, ArgKind::Bool])
            .bind(vec![position.to_string(), raycast.to_string()])
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_then_drop() {
        let server = ctf_server();
        let (alice, _alice_rx) = in_battle(&server, 1, "alice").await;
        let (_bob, mut bob_rx) = in_battle(&server, 2, "bob").await;
        ready_to_spawn(alice.clone(), BoundArgs::Raw(Vec::new())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        while bob_rx.try_recv().is_ok() {}

        let enemy = alice.battle().unwrap().lock().player("alice").unwrap().team.opposite();
        trigger_flag(alice.clone(), team_arg(enemy.key())).await.unwrap();
        let captured = bob_rx.try_recv().unwrap();
        assert_eq!(captured.name, CommandName::FlagCaptured);
        assert_eq!(captured.args, ["alice".to_string(), enemy.key().to_string()]);

        drop_flag(alice.clone(), drop_args(r#"{"x":1.0,"y":2.0,"z":3.0}"#, true))
            .await
            .unwrap();
        assert_eq!(bob_rx.try_recv().unwrap().name, CommandName::FlagDropped);
    }

    #[tokio::test]
    async fn test_drop_without_flag() {
        let server = ctf_server();
        let (alice, _rx) = in_battle(&server, 1, "alice").await;
        let result = drop_flag(alice, drop_args(r#"{"x":0,"y":0,"z":0}"#, false)).await;
        assert!(matches!(result, Err(HandlerError::Battle(BattleError::NoFlag(_)))));
    }

    #[tokio::test]
    async fn test_flags_outside_ctf() {
        let server = ServerContext::for_tests();
        server.create_default_battle().unwrap();
        let (alice, _rx) = in_battle(&server, 1, "alice").await;
        assert!(matches!(
            trigger_flag(alice.clone(), team_arg("RED")).await,
            Err(HandlerError::Battle(BattleError::NotCaptureTheFlag(_)))
        ));
        assert!(matches!(
            trigger_flag(alice, team_arg("GREEN")).await,
            Err(HandlerError::UnknownTeam(_))
        ));
    }
}

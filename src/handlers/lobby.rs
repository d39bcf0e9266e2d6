use std::sync::Arc;
use tracing::{debug, info};

use super::{HandlerContext, HandlerError};
use crate::catalog::resources_json;
use crate::game::{Battle, BattleMode, BattleProperties, Team};
use crate::lobby::CreateBattle;
use crate::net::dispatch::{ArgumentError, BoundArgs};
use crate::net::payloads::{self, BattleCreateRequest};
use crate::net::protocol::{Command, CommandName};
use crate::net::socket::Screen;
use crate::store::StoreError;

/// Battle-select screen: layout, balance, battle list and the current selection
pub fn show_battle_select(ctx: &HandlerContext, crystals: i64) {
    let socket = &ctx.socket;
    socket.send(Command::with_args(CommandName::ChangeLayout, [Screen::BattleSelect.layout()]));
    socket.send(Command::with_args(CommandName::UpdateCrystals, [crystals.to_string()]));
    socket.send(Command::with_args(
        CommandName::InitBattleSelect,
        [payloads::battle_list(&ctx.server.battles.summaries())],
    ));

    let selected = socket
        .session()
        .selected_battle
        .and_then(|id| ctx.server.battles.get(&id))
        .or_else(|| ctx.server.battles.list().into_iter().next());
    if let Some(battle) = selected {
        show_battle(ctx, &battle);
    }
}

/// Select `battle` for this socket and show its details
fn show_battle(ctx: &HandlerContext, battle: &Battle) {
    ctx.socket
        .update_session(|s| s.selected_battle = Some(battle.id().to_string()));
    ctx.socket
        .send(Command::with_args(CommandName::SelectBattle, [battle.id()]));
    let info = payloads::battle_info(&battle.lock());
    ctx.socket.send(Command::with_args(CommandName::ShowBattleInfo, [info]));
}

/// `battle_select;select;<battleId>`
pub async fn select_battle(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let id = args.str(0)?;
    let battle = ctx.server.battles.require(id)?;
    debug!(conn = ctx.socket.id(), battle = %id, "Battle selected");
    show_battle(&ctx, &battle);
    Ok(())
}

/// Battle named by the first argument, or the selected one
fn target_battle(ctx: &HandlerContext, explicit: Option<&str>) -> Result<Arc<Battle>, HandlerError> {
    let id = match explicit.filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => ctx
            .socket
            .session()
            .selected_battle
            .ok_or(HandlerError::NoBattleSelected)?,
    };
    Ok(ctx.server.battles.require(&id)?)
}

/// `battle_select;fight[;<battleId>]`: join with automatic team balance
pub async fn fight(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let battle = target_battle(&ctx, args.raw().first().map(String::as_str))?;
    enter_battle(&ctx, battle, None, false).await
}

/// `battle_select;enter_battle_team[;<battleId>];<team>`
pub async fn join_team(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let raw = args.raw();
    let team_key = raw.last().ok_or(ArgumentError::Missing(0))?.as_str();
    let battle_id = (raw.len() > 1).then(|| raw[0].as_str());
    let team = Team::from_key(team_key)
        .filter(|t| *t != Team::None)
        .ok_or_else(|| HandlerError::UnknownTeam(team_key.to_string()))?;
    let battle = target_battle(&ctx, battle_id)?;
    enter_battle(&ctx, battle, Some(team), false).await
}

/// `battle_select;enter_battle_spectator[;<battleId>]`
pub async fn join_spectator(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let battle = target_battle(&ctx, args.raw().first().map(String::as_str))?;
    enter_battle(&ctx, battle, None, true).await
}

/// Register the player and drive the client through the battle load sequence
pub async fn enter_battle(
    ctx: &HandlerContext,
    battle: Arc<Battle>,
    team: Option<Team>,
    spectator: bool,
) -> Result<(), HandlerError> {
    let username = ctx.username()?;
    if let Some(current) = ctx.socket.battle_id() {
        return Err(HandlerError::AlreadyInBattle(current));
    }
    let user = ctx
        .server
        .users
        .find(&username)
        .ok_or_else(|| StoreError::UserNotFound(username.clone()))?;

    battle
        .lock()
        .add_player(ctx.socket.clone(), &user, team, spectator)?;
    ctx.socket.update_session(|s| {
        s.battle = Some(battle.id().to_string());
        s.selected_battle = Some(battle.id().to_string());
        s.screen = Screen::Battle;
    });

    let socket = &ctx.socket;
    socket.send(Command::with_args(CommandName::ChangeLayout, [Screen::Battle.layout()]));
    socket.send(Command::new(CommandName::UnloadBattleSelect));
    socket.send(Command::new(CommandName::StartBattle));
    socket.send(Command::new(CommandName::UnloadChat));
    socket.send(Command::with_args(
        CommandName::InitShotsData,
        [payloads::shots_data(&ctx.server.garage)],
    ));

    let resources = &battle.info().map.resources;
    for set in [&resources.proplibs, &resources.skybox, &resources.map] {
        socket.load_and_await(resources_json(set)).await?;
    }

    battle.lock().init_player(&username)?;
    info!(battle = %battle.id(), player = %username, spectator, "Battle resources loaded");
    Ok(())
}

/// `battle_create;battle_create;<json>`
pub async fn create_battle(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    ctx.username()?;
    let request: BattleCreateRequest = args.json(0)?;
    let map = ctx
        .server
        .maps
        .get(&request.map_id)
        .ok_or_else(|| HandlerError::UnknownMap(request.map_id.clone()))?;
    let mode = BattleMode::from_key(&request.battle_mode)
        .ok_or_else(|| HandlerError::UnknownMode(request.battle_mode.clone()))?;

    let title = match request.name.trim() {
        "" => format!("{} {}", map.title, mode.key()),
        name => name.to_string(),
    };
    let base = BattleProperties {
        max_people: ctx.server.config.max_players_per_battle,
        ..Default::default()
    };
    let battle = ctx.server.battles.create(CreateBattle {
        title,
        map,
        mode,
        properties: request.into_properties(base),
        persistent: false,
    })?;

    let summary = serde_json::to_string(&battle.lock().summary())
        .map_err(|e| crate::game::BattleError::Payload(e.to_string()))?;
    ctx.server
        .broadcast_on_screen(Screen::BattleSelect, Command::with_args(CommandName::AddBattle, [summary]));
    show_battle(&ctx, &battle);
    Ok(())
}

/// `lobby;switch_battle_select`: leave the current battle for the battle list
pub async fn switch_battle_select(ctx: HandlerContext, _args: BoundArgs) -> Result<(), HandlerError> {
    if ctx.socket.battle_id().is_none() {
        debug!(conn = ctx.socket.id(), "Switch to battle select outside a battle");
        return Ok(());
    }
    return_to_battle_select(&ctx)
}

/// Leave the battle, unload it on the client and show the battle list
pub fn return_to_battle_select(ctx: &HandlerContext) -> Result<(), HandlerError> {
    let username = ctx.username()?;
    ctx.server.leave_battle(&ctx.socket)?;
    ctx.socket.send(Command::new(CommandName::UnloadBattle));
    let crystals = ctx.server.users.find(&username).map_or(0, |u| u.crystals);
    show_battle_select(ctx, crystals);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use crate::net::dispatch::{ArgBinding, ArgKind};
    use crate::server::ServerContext;

    fn raw(values: &[&str]) -> BoundArgs {
        BoundArgs::Raw(values.iter().map(|v| v.to_string()).collect())
    }

    fn create_args(json: &str) -> BoundArgs {
        ArgBinding::Positional(&[ArgKind::Json]).bind(vec![json.to_string()]).unwrap()
    }

    #[tokio::test]
    async fn test_battle_select_lists_default_battle() {
        let server = ServerContext::for_tests();
        let default = server.create_default_battle().unwrap();
        let (ctx, mut rx) = logged_in(&server, 1, "alice");

        show_battle_select(&ctx, 5);
        let names: Vec<CommandName> = std::iter::from_fn(|| rx.try_recv().ok()).map(|c| c.name).collect();
        assert_eq!(
            names,
            [
                CommandName::ChangeLayout,
                CommandName::UpdateCrystals,
                CommandName::InitBattleSelect,
                CommandName::SelectBattle,
                CommandName::ShowBattleInfo,
            ]
        );
        assert_eq!(ctx.socket.session().selected_battle.as_deref(), Some(default.id()));
    }

    #[tokio::test]
    async fn test_fight_runs_load_sequence() {
        let server = ServerContext::for_tests();
        let battle = server.create_default_battle().unwrap();
        let (ctx, mut rx) = logged_in(&server, 1, "alice");
        ctx.socket.update_session(|s| s.selected_battle = Some(battle.id().to_string()));

        let seen = run_acking(&ctx, &mut rx, fight(ctx.clone(), raw(&[]))).await;
        let names: Vec<CommandName> = seen.iter().map(|c| c.name).collect();
        assert_eq!(names[0], CommandName::ChangeLayout);
        assert_eq!(names.iter().filter(|n| **n == CommandName::LoadResources).count(), 3);
        assert!(names.contains(&CommandName::InitBattleModel));
        assert_eq!(ctx.socket.battle_id().as_deref(), Some(battle.id()));
        assert_eq!(ctx.socket.screen(), Screen::Battle);
        assert!(battle.lock().player("alice").is_some());
    }

    #[tokio::test]
    async fn test_fight_without_selection() {
        let server = ServerContext::for_tests();
        let (ctx, _rx) = logged_in(&server, 1, "alice");
        let result = fight(ctx, raw(&[])).await;
        assert!(matches!(result, Err(HandlerError::NoBattleSelected)));
    }

    #[tokio::test]
    async fn test_join_team_rejects_unknown_team() {
        let server = ServerContext::for_tests();
        let battle = server.create_default_battle().unwrap();
        let (ctx, _rx) = logged_in(&server, 1, "alice");
        let result = join_team(ctx, raw(&[battle.id(), "GREEN"])).await;
        assert!(matches!(result, Err(HandlerError::UnknownTeam(_))));
    }

    #[tokio::test]
    async fn test_create_battle_announced() {
        let server = ServerContext::for_tests();
        let (creator, _rx) = logged_in(&server, 1, "alice");
        let (watcher, mut watcher_rx) = logged_in(&server, 2, "bob");
        watcher.socket.update_session(|s| s.screen = Screen::BattleSelect);

        create_battle(
            creator.clone(),
            create_args(r#"{"name":"Night TDM","mapId":"map_sandbox","battleMode":"TDM","maxPeopleCount":6}"#),
        )
        .await
        .unwrap();

        assert_eq!(server.battles.len(), 1);
        let battle = &server.battles.list()[0];
        assert_eq!(battle.info().title, "Night TDM");
        assert_eq!(battle.info().properties.max_people, 6);
        let announce = watcher_rx.try_recv().unwrap();
        assert_eq!(announce.name, CommandName::AddBattle);
        assert_eq!(creator.socket.session().selected_battle.as_deref(), Some(battle.id()));
    }

    #[tokio::test]
    async fn test_create_battle_unknown_map() {
        let server = ServerContext::for_tests();
        let (ctx, _rx) = logged_in(&server, 1, "alice");
        let result = create_battle(ctx, create_args(r#"{"mapId":"map_nowhere"}"#)).await;
        assert!(matches!(result, Err(HandlerError::UnknownMap(_))));
    }

    #[tokio::test]
    async fn test_leaving_created_battle_removes_it() {
        let server = ServerContext::for_tests();
        let (ctx, mut rx) = logged_in(&server, 1, "alice");
        let (watcher, mut watcher_rx) = logged_in(&server, 2, "bob");
        watcher.socket.update_session(|s| s.screen = Screen::BattleSelect);
        create_battle(ctx.clone(), create_args(r#"{"mapId":"map_sandbox"}"#)).await.unwrap();
        let battle = server.battles.list()[0].clone();
        run_acking(&ctx, &mut rx, fight(ctx.clone(), raw(&[]))).await;
        while watcher_rx.try_recv().is_ok() {}

        switch_battle_select(ctx.clone(), raw(&[])).await.unwrap();
        assert!(server.battles.get(battle.id()).is_none());
        assert!(ctx.socket.battle_id().is_none());
        let removed = watcher_rx.try_recv().unwrap();
        assert_eq!(removed.name, CommandName::RemoveBattle);
        assert_eq!(removed.args, [battle.id().to_string()]);
    }
}

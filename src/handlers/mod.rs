//! Server-bound command handlers
//!
//! Every handler is an `async fn(HandlerContext, BoundArgs)`. The table
//! is built once from the explicit list in `build_registry`; nothing is
//! discovered at runtime.

pub mod battle;
pub mod chat;
pub mod ctf;
pub mod lobby;
pub mod shot;
pub mod supply;
pub mod system;

use futures::FutureExt;
use std::sync::Arc;

use crate::game::{Battle, BattleError, BattleState};
use crate::lobby::ManagerError;
use crate::net::dispatch::{ArgBinding, ArgKind, ArgumentError, BoundArgs, CommandRegistry, DispatchError};
use crate::net::protocol::CommandName;
use crate::net::socket::{SocketError, UserSocket};
use crate::server::ServerContext;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Already logged in")]
    AlreadyLoggedIn,
    #[error("Not in a battle")]
    NotInBattle,
    #[error("Already in battle {0}")]
    AlreadyInBattle(String),
    #[error("No battle selected")]
    NoBattleSelected,
    #[error("Unknown map '{0}'")]
    UnknownMap(String),
    #[error("Unknown battle mode '{0}'")]
    UnknownMode(String),
    #[error("Unknown team '{0}'")]
    UnknownTeam(String),
    #[error(transparent)]
    Arguments(#[from] ArgumentError),
    #[error(transparent)]
    Battle(#[from] BattleError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Socket(#[from] SocketError),
}

impl HandlerError {
    /// The connection went away while the handler was suspended
    pub fn is_disconnect(&self) -> bool {
        matches!(self, HandlerError::Socket(SocketError::Closed))
    }

    /// Missing context or bad client input; the command simply has no effect
    pub fn is_precondition(&self) -> bool {
        match self {
            HandlerError::Battle(BattleError::Damage(_)) => false,
            HandlerError::Manager(ManagerError::Battle(BattleError::Damage(_))) => false,
            HandlerError::Store(StoreError::UserNotFound(_)) => false,
            HandlerError::Socket(_) => false,
            _ => true,
        }
    }
}

/// What a handler sees: its connection and the shared server state
#[derive(Clone)]
pub struct HandlerContext {
    pub socket: Arc<UserSocket>,
    pub server: Arc<ServerContext>,
}

impl HandlerContext {
    pub fn new(socket: Arc<UserSocket>, server: Arc<ServerContext>) -> Self {
        Self { socket, server }
    }

    pub fn username(&self) -> Result<String, HandlerError> {
        self.socket.username().ok_or(HandlerError::NotLoggedIn)
    }

    /// Battle the connection currently plays in
    pub fn battle(&self) -> Result<Arc<Battle>, HandlerError> {
        let id = self.socket.battle_id().ok_or(HandlerError::NotInBattle)?;
        Ok(self.server.battles.require(&id)?)
    }

    /// Run `f` under the battle lock with the caller's username
    pub fn with_battle<R>(
        &self,
        f: impl FnOnce(&mut BattleState, &str) -> Result<R, BattleError>,
    ) -> Result<R, HandlerError> {
        let username = self.username()?;
        let battle = self.battle()?;
        let mut state = battle.lock();
        Ok(f(&mut state, &username)?)
    }
}

/// Full raw argument list as one string; fire and movement payloads are single JSON tokens
pub(crate) fn raw_payload(args: &BoundArgs) -> String {
    args.raw().join(";")
}

const STR: &[ArgKind] = &[ArgKind::Str];
const NONE: &[ArgKind] = &[];

/// Build the identity -> handler table
pub fn build_registry() -> Result<CommandRegistry<HandlerContext>, DispatchError> {
    use ArgBinding::{Positional, Raw};
    use CommandName as N;

    let mut registry = CommandRegistry::new();

    // System and auth
    registry.register(N::Login, Raw, |ctx, args| system::login(ctx, args).boxed())?;
    registry.register(N::ClientError, Raw, |ctx, args| system::client_error(ctx, args).boxed())?;

    // Battle select
    registry.register(N::BattleSelect, Positional(STR), |ctx, args| lobby::select_battle(ctx, args).boxed())?;
    registry.register(N::Fight, Raw, |ctx, args| lobby::fight(ctx, args).boxed())?;
    registry.register(N::JoinBattleTeam, Raw, |ctx, args| lobby::join_team(ctx, args).boxed())?;
    registry.register(N::JoinAsSpectator, Raw, |ctx, args| lobby::join_spectator(ctx, args).boxed())?;
    registry.register(
        N::CreateBattle,
        Positional(&[ArgKind::Json]),
        |ctx, args| lobby::create_battle(ctx, args).boxed(),
    )?;
    registry.register(N::SwitchBattleSelect, Raw, |ctx, args| lobby::switch_battle_select(ctx, args).boxed())?;

    // Battle load and tank lifecycle
    registry.register(N::GetInitDataLocalTank, Positional(NONE), |ctx, args| {
        battle::init_local_tank(ctx, args).boxed()
    })?;
    registry.register(N::Ping, Raw, |ctx, args| battle::ping(ctx, args).boxed())?;
    registry.register(N::ReadyToSpawn, Raw, |ctx, args| battle::ready_to_spawn(ctx, args).boxed())?;
    registry.register(N::ReadyToRespawn, Raw, |ctx, args| battle::ready_to_respawn(ctx, args).boxed())?;
    registry.register(N::SelfDestruct, Raw, |ctx, args| battle::self_destruct(ctx, args).boxed())?;
    registry.register(N::ExitFromBattle, Raw, |ctx, args| battle::exit_from_battle(ctx, args).boxed())?;

    // Movement relays
    registry.register(N::Move, Raw, |ctx, args| battle::movement(ctx, args, N::ClientMove).boxed())?;
    registry.register(N::FullMove, Raw, |ctx, args| battle::movement(ctx, args, N::ClientFullMove).boxed())?;
    registry.register(N::RotateTurret, Raw, |ctx, args| {
        battle::movement(ctx, args, N::ClientRotateTurret).boxed()
    })?;
    registry.register(N::MovementControl, Raw, |ctx, args| {
        battle::movement(ctx, args, N::ClientMovementControl).boxed()
    })?;

    // Shots
    registry.register(N::StartFire, Raw, |ctx, args| shot::start_fire(ctx, args).boxed())?;
    registry.register(N::Fire, Raw, |ctx, args| shot::fire(ctx, args).boxed())?;
    registry.register(N::FireStatic, Raw, |ctx, args| shot::fire_static(ctx, args).boxed())?;
    registry.register(N::FireTarget, Raw, |ctx, args| shot::fire_target(ctx, args).boxed())?;
    registry.register(N::StopFire, Raw, |ctx, args| shot::stop_fire(ctx, args).boxed())?;
    registry.register(N::SetTarget, Raw, |ctx, args| shot::set_target(ctx, args).boxed())?;
    registry.register(N::ResetTarget, Raw, |ctx, args| shot::reset_target(ctx, args).boxed())?;
    registry.register(N::EnterSnipingMode, Raw, |ctx, args| shot::enter_sniping(ctx, args).boxed())?;
    registry.register(N::ExitSnipingMode, Raw, |ctx, args| shot::exit_sniping(ctx, args).boxed())?;
    registry.register(N::FireSniping, Raw, |ctx, args| shot::fire_sniping(ctx, args).boxed())?;

    // Supplies, bonuses, mines
    registry.register(N::ActivateItem, Raw, |ctx, args| supply::activate_item(ctx, args).boxed())?;
    registry.register(N::TryActivateBonus, Positional(STR), |ctx, args| supply::take_bonus(ctx, args).boxed())?;
    registry.register(N::TriggerMine, Positional(STR), |ctx, args| supply::trigger_mine(ctx, args).boxed())?;

    // Capture the flag
    registry.register(N::TriggerFlag, Positional(STR), |ctx, args| ctf::trigger_flag(ctx, args).boxed())?;
    registry.register(
        N::DropFlag,
        Positional(&[ArgKind::Json, ArgKind::Bool]),
        |ctx, args| ctf::drop_flag(ctx, args).boxed(),
    )?;

    // Battle chat
    registry.register(
        N::SendBattleChatMessageServer,
        Positional(&[ArgKind::Str, ArgKind::Bool]),
        |ctx, args| chat::send_message(ctx, args).boxed(),
    )?;

    Ok(registry)
}

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{lobby, HandlerContext, HandlerError};
use crate::catalog::{resources_json, MAIN_RESOURCES};
use crate::net::dispatch::{ArgumentError, BoundArgs};
use crate::net::protocol::{Command, CommandName};
use crate::net::socket::{Screen, SocketError, UserSocket};
use crate::store::StoreError;

const LOCALE: &str = "en";

/// First exchange on a fresh connection: locale, main resources, then the login screen
///
/// Runs as a scoped task so the read loop keeps consuming the dependency ack.
pub async fn bootstrap(socket: Arc<UserSocket>) -> Result<(), SocketError> {
    socket.send(Command::with_args(CommandName::InitLocale, [LOCALE]));
    let id = socket.load_and_await(resources_json(MAIN_RESOURCES)).await?;
    debug!(conn = socket.id(), dependency = id, "Main resources loaded");
    socket.send(Command::new(CommandName::MainResourcesLoaded));
    Ok(())
}

/// `auth;login;...;<username>;<password>`
///
/// The client prepends captcha and remember-me fields; only the last two
/// arguments are credentials.
pub async fn login(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let raw = args.raw();
    if raw.len() < 2 {
        return Err(ArgumentError::Arity {
            expected: 2,
            actual: raw.len(),
        }
        .into());
    }
    let username = raw[raw.len() - 2].trim();
    let password = &raw[raw.len() - 1];

    if ctx.socket.username().is_some() {
        return Err(HandlerError::AlreadyLoggedIn);
    }

    let user = match ctx.server.users.authenticate(username, password) {
        Ok(user) => user,
        Err(e @ (StoreError::InvalidCredentials(_) | StoreError::InvalidUsername(_))) => {
            info!(conn = ctx.socket.id(), user = %username, reason = %e, "Login denied");
            ctx.socket.send(Command::new(CommandName::AuthDenied));
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if !ctx.server.sockets.claim_username(&ctx.socket, &user.username) {
        info!(conn = ctx.socket.id(), user = %user.username, "Login denied: already online");
        ctx.socket.send(Command::new(CommandName::AuthDenied));
        return Ok(());
    }

    info!(conn = ctx.socket.id(), user = %user.username, rank = user.rank, "User logged in");
    ctx.socket.send(Command::new(CommandName::AuthAccept));
    ctx.socket.update_session(|s| s.screen = Screen::BattleSelect);
    lobby::show_battle_select(&ctx, user.crystals);
    Ok(())
}

pub async fn client_error(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    warn!(conn = ctx.socket.id(), error = %args.raw().join(";"), "Client reported an error");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use crate::net::socket::detached_socket;
    use crate::server::ServerContext;

    fn login_args(values: &[&str]) -> BoundArgs {
        BoundArgs::Raw(values.iter().map(|v| v.to_string()).collect())
    }

    #[tokio::test]
    async fn test_bootstrap_waits_for_ack() {
        let (socket, mut rx) = detached_socket(1);
        let task = tokio::spawn(bootstrap(socket.clone()));

        assert_eq!(rx.recv().await.unwrap().name, CommandName::InitLocale);
        let load = rx.recv().await.unwrap();
        assert_eq!(load.name, CommandName::LoadResources);
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        socket.dependencies().mark_loaded(load.args[1].parse().unwrap());
        task.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().name, CommandName::MainResourcesLoaded);
    }

    #[tokio::test]
    async fn test_login_accepts_client_form() {
        let server = ServerContext::for_tests();
        let (socket, mut rx) = detached_socket(1);
        server.sockets.register(socket.clone());
        let ctx = HandlerContext::new(socket.clone(), server.clone());

        login(ctx, login_args(&["", "false", "alice", "secret"])).await.unwrap();
        assert_eq!(socket.username().as_deref(), Some("alice"));
        assert_eq!(socket.screen(), Screen::BattleSelect);
        assert_eq!(rx.recv().await.unwrap().name, CommandName::AuthAccept);
        assert_eq!(rx.recv().await.unwrap().name, CommandName::ChangeLayout);
    }

    #[tokio::test]
    async fn test_login_wrong_password_denied() {
        let server = ServerContext::for_tests();
        let (first, _rx) = logged_in(&server, 1, "alice");
        first.socket.close();
        server.sockets.unregister(first.socket.id());

        let (socket, mut rx) = detached_socket(2);
        server.sockets.register(socket.clone());
        login(HandlerContext::new(socket.clone(), server), login_args(&["alice", "wrong"]))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().name, CommandName::AuthDenied);
        assert!(socket.username().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_login_denied() {
        let server = ServerContext::for_tests();
        let (_first, _rx) = logged_in(&server, 1, "alice");

        let (socket, mut rx) = detached_socket(2);
        server.sockets.register(socket.clone());
        login(HandlerContext::new(socket.clone(), server), login_args(&["alice", "pw"]))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().name, CommandName::AuthDenied);
        assert!(socket.username().is_none());
    }

    #[tokio::test]
    async fn test_login_arity() {
        let server = ServerContext::for_tests();
        let (socket, _rx) = detached_socket(1);
        let result = login(HandlerContext::new(socket, server), login_args(&["alice"])).await;
        assert!(matches!(result, Err(HandlerError::Arguments(ArgumentError::Arity { .. }))));
    }
}

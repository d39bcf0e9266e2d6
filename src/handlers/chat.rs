use super::{HandlerContext, HandlerError};
use crate::net::dispatch::BoundArgs;

/// Longest message relayed; longer text is cut
pub const MAX_MESSAGE_CHARS: usize = 300;

/// `chat;send_message;<text>;<teamOnly>`
pub async fn send_message(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let text = args.str(0)?;
    let team_only = args.bool(1)?;
    let message = text.trim();
    if message.is_empty() {
        return Ok(());
    }
    let message: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
    ctx.with_battle(|state, username| state.broadcast_chat(username, &message, team_only))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{BattleMode, BattleProperties};
    use crate::handlers::test_support::*;
    use crate::lobby::CreateBattle;
    use crate::net::dispatch::{ArgBinding, ArgKind};
    use crate::net::protocol::CommandName;
    use crate::server::ServerContext;

    fn chat(text: &str, team_only: bool) -> BoundArgs {
        ArgBinding::Positional(&[ArgKind::Str, ArgKind::Bool])
            .bind(vec![text.to_string(), team_only.to_string()])
            .unwrap()
    }

    #[tokio::test]
    async fn test_message_reaches_everyone() {
        let server = ServerContext::for_tests();
        server.create_default_battle().unwrap();
        let (alice, mut alice_rx) = in_battle(&server, 1, "alice").await;
        let (_bob, mut bob_rx) = in_battle(&server, 2, "bob").await;
        while alice_rx.try_recv().is_ok() {}
        while bob_rx.try_recv().is_ok() {}

        send_message(alice, chat("  gg  ", false)).await.unwrap();
        for rx in [&mut alice_rx, &mut bob_rx] {
            let line = rx.try_recv().unwrap();
            assert_eq!(line.name, CommandName::SendBattleChatMessageClient);
            assert_eq!(line.args[0], "alice");
            assert_eq!(line.args[1], "gg");
        }
    }

    #[tokio::test]
    async fn test_team_message_stays_in_team() {
        let server = ServerContext::for_tests();
        let map = server.maps.get("map_sandbox").unwrap();
        server
            .battles
            .create(CreateBattle {
                title: "Teams".to_string(),
                map,
                mode: BattleMode::TeamDeathmatch,
                properties: BattleProperties::default(),
                persistent: true,
            })
            .unwrap();
        let (alice, _alice_rx) = in_battle(&server, 1, "alice").await;
        let (_bob, mut bob_rx) = in_battle(&server, 2, "bob").await;
        while bob_rx.try_recv().is_ok() {}

        // Auto balance puts the two players on opposite teams
        send_message(alice, chat("push mid", true)).await.unwrap();
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_and_long_messages() {
        let server = ServerContext::for_tests();
        server.create_default_battle().unwrap();
        let (alice, mut rx) = in_battle(&server, 1, "alice").await;
        while rx.try_recv().is_ok() {}

        send_message(alice.clone(), chat("   ", false)).await.unwrap();
        assert!(rx.try_recv().is_err());

        send_message(alice, chat(&"a".repeat(1000), false)).await.unwrap();
        assert_eq!(rx.try_recv().unwrap().args[1].chars().count(), MAX_MESSAGE_CHARS);
    }
}

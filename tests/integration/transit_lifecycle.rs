//! Transit lifecycle integration tests
//!
//! These tests run on tokio's paused clock so the 5 second hold and the
//! retry backoff can be checked exactly.

use lobby_transit::transit::{CoordinatorConfig, RetryPolicy, TransitCoordinator};
use lobby_transit::types::{Notice, PlayerHandle, RouteDecision, ServerSnapshot, TransitPhase};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_test::{assert_err, assert_ok};

// Import test fixtures
use crate::fixtures::{
    create_test_system, no_lobby_servers, standard_servers, test_player, RecordingQueueBackend,
};

/// Route `player` from survival to survival2 and land them on lobby2
async fn park_on_lobby(coordinator: &TransitCoordinator, player: &PlayerHandle) -> Instant {
    coordinator
        .on_arrived_at_server(player, "survival")
        .await
        .unwrap();
    let decision = coordinator
        .on_route_request(player, "survival2")
        .await
        .unwrap();
    assert_eq!(decision, RouteDecision::Suppress);
    coordinator
        .on_arrived_at_server(player, "lobby2")
        .await
        .unwrap();
    Instant::now()
}

fn assert_single_enqueue(backend: &RecordingQueueBackend, player: &PlayerHandle) {
    assert_eq!(backend.enqueues_for(player.id), vec!["survival2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_timer_advances_exactly_once_after_delay() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    let arrived = park_on_lobby(&coordinator, &steve).await;
    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.phase, TransitPhase::AtLobby);
    assert_eq!(state.last_server.as_deref(), Some("lobby2"));

    sleep(Duration::from_millis(4_900)).await;
    assert!(backend.enqueues_for(steve.id).is_empty());

    sleep(Duration::from_millis(200)).await;
    assert_single_enqueue(&backend, &steve);
    let (at, _) = backend.enqueue_log_for(steve.id)[0].clone();
    assert_eq!(at.duration_since(arrived), Duration::from_secs(5));

    sleep(Duration::from_secs(30)).await;
    assert_single_enqueue(&backend, &steve);

    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.phase, TransitPhase::Redirected);
    assert_eq!(coordinator.stats().unwrap().timer_advances, 1);
}

#[tokio::test(start_paused = true)]
async fn test_safe_signal_short_circuits_timer() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    let arrived = park_on_lobby(&coordinator, &steve).await;
    sleep(Duration::from_secs(1)).await;

    assert!(coordinator.on_safe_signal(steve.id).await.unwrap());
    assert_single_enqueue(&backend, &steve);
    let (at, _) = backend.enqueue_log_for(steve.id)[0].clone();
    assert_eq!(at.duration_since(arrived), Duration::from_secs(1));

    // The 5 second timer firing later is a no-op
    sleep(Duration::from_secs(10)).await;
    assert_single_enqueue(&backend, &steve);

    let stats = coordinator.stats().unwrap();
    assert_eq!(stats.signal_advances, 1);
    assert_eq!(stats.timer_advances, 0);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_signal_is_idempotent() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    park_on_lobby(&coordinator, &steve).await;
    assert!(coordinator.on_safe_signal(steve.id).await.unwrap());
    assert!(!coordinator.on_safe_signal(steve.id).await.unwrap());

    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.phase, TransitPhase::Redirected);
    assert_single_enqueue(&backend, &steve);
}

#[tokio::test(start_paused = true)]
async fn test_signal_before_arrival_is_ignored() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    coordinator
        .on_arrived_at_server(&steve, "survival")
        .await
        .unwrap();
    coordinator
        .on_route_request(&steve, "survival2")
        .await
        .unwrap();

    // Still on the way to the lobby
    assert!(!coordinator.on_safe_signal(steve.id).await.unwrap());
    assert!(backend.enqueues_for(steve.id).is_empty());

    coordinator
        .on_arrived_at_server(&steve, "lobby2")
        .await
        .unwrap();
    sleep(Duration::from_secs(6)).await;
    assert_single_enqueue(&backend, &steve);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_advance() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    park_on_lobby(&coordinator, &steve).await;
    sleep(Duration::from_secs(2)).await;
    coordinator.on_disconnect(steve.id).await.unwrap();

    sleep(Duration::from_secs(10)).await;
    assert!(backend.enqueues_for(steve.id).is_empty());

    // A late signal must not bring the record back
    assert!(!coordinator.on_safe_signal(steve.id).await.unwrap());
    assert!(coordinator.snapshot(steve.id).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gets_a_fresh_record() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    park_on_lobby(&coordinator, &steve).await;
    coordinator.on_disconnect(steve.id).await.unwrap();

    // Same player logs straight back in and lands on a lobby with no request
    coordinator.on_login(&steve).await.unwrap();
    coordinator
        .on_arrived_at_server(&steve, "lobby2")
        .await
        .unwrap();

    sleep(Duration::from_secs(10)).await;
    assert!(backend.enqueues_for(steve.id).is_empty());
    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.phase, TransitPhase::Unrouted);
    assert!(state.desired_server.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_retries_with_backoff_until_lobby_appears() {
    let (coordinator, backend, notifier) =
        create_test_system(no_lobby_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    coordinator
        .on_arrived_at_server(&steve, "survival")
        .await
        .unwrap();
    let decision = coordinator
        .on_route_request(&steve, "survival2")
        .await
        .unwrap();

    assert_eq!(decision, RouteDecision::Suppress);
    assert_eq!(backend.list_count_for(steve.id), 1);
    assert!(backend.connects_for(steve.id).is_empty());
    assert_eq!(notifier.notices_for(steve.id), vec![Notice::NoLobbyAvailable]);
    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.phase, TransitPhase::AwaitingLobbyPlacement);
    assert!(state.desired_server.is_none());

    // First retry after 2s
    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(backend.list_count_for(steve.id), 2);

    // Second retry 4s after the first
    let mut servers = no_lobby_servers();
    servers.push(ServerSnapshot::new("lobby3", true, true));
    backend.set_servers(servers);
    sleep(Duration::from_millis(3_800)).await;
    assert_eq!(backend.list_count_for(steve.id), 2);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.list_count_for(steve.id), 3);
    assert_eq!(backend.connects_for(steve.id), vec!["lobby3"]);

    // Failure notice was only sent once
    assert_eq!(
        notifier.notices_for(steve.id),
        vec![
            Notice::NoLobbyAvailable,
            Notice::RedirectingToLobby {
                lobby: "lobby3".to_string()
            }
        ]
    );

    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.desired_server.as_deref(), Some("survival2"));

    coordinator
        .on_arrived_at_server(&steve, "lobby3")
        .await
        .unwrap();
    sleep(Duration::from_secs(5)).await;
    assert_single_enqueue(&backend, &steve);
    assert_eq!(coordinator.stats().unwrap().placement_retries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_abandons_after_retry_bound() {
    let config = CoordinatorConfig {
        retry: RetryPolicy::fixed(Duration::from_secs(1), 2),
        ..CoordinatorConfig::default()
    };
    let (coordinator, backend, notifier) = create_test_system(no_lobby_servers(), config);
    let steve = test_player("Steve");

    coordinator
        .on_arrived_at_server(&steve, "survival")
        .await
        .unwrap();
    coordinator
        .on_route_request(&steve, "survival2")
        .await
        .unwrap();

    sleep(Duration::from_secs(10)).await;

    // Initial attempt plus two retries, then nothing more
    assert_eq!(backend.list_count_for(steve.id), 3);
    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.phase, TransitPhase::Abandoned);
    assert_eq!(
        notifier.notices_for(steve.id),
        vec![Notice::NoLobbyAvailable, Notice::PlacementAbandoned]
    );
    assert_eq!(coordinator.stats().unwrap().abandoned_episodes, 1);
    assert_eq!(
        coordinator
            .metrics()
            .transit()
            .placements_abandoned_total
            .get(),
        1
    );

    sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.list_count_for(steve.id), 3);

    // A new request starts a fresh episode
    backend.set_servers(standard_servers());
    let decision = coordinator
        .on_route_request(&steve, "survival2")
        .await
        .unwrap();
    assert_eq!(decision, RouteDecision::Suppress);
    assert_eq!(backend.connects_for(steve.id), vec!["lobby2"]);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let (coordinator, backend, _notifier) =
        create_test_system(no_lobby_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    coordinator
        .on_route_request(&steve, "survival2")
        .await
        .unwrap();
    coordinator.on_disconnect(steve.id).await.unwrap();

    sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.list_count_for(steve.id), 1);
}

#[tokio::test(start_paused = true)]
async fn test_listing_failure_counts_as_unavailable() {
    let (coordinator, backend, notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");
    backend.set_fail_listing(true);

    let decision = coordinator
        .on_route_request(&steve, "survival2")
        .await
        .unwrap();
    assert_eq!(decision, RouteDecision::Suppress);
    assert_eq!(notifier.notices_for(steve.id), vec![Notice::NoLobbyAvailable]);

    backend.set_fail_listing(false);
    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(backend.connects_for(steve.id), vec!["lobby2"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_is_retried() {
    let (coordinator, backend, notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");
    backend.set_fail_connect(true);

    coordinator
        .on_route_request(&steve, "survival2")
        .await
        .unwrap();
    assert_eq!(notifier.notices_for(steve.id), vec![Notice::NoLobbyAvailable]);
    let state = coordinator.require_state(steve.id).await.unwrap();
    assert!(state.placement_lobby.is_none());

    backend.set_fail_connect(false);
    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(backend.connects_for(steve.id), vec!["lobby2", "lobby2"]);
    assert_eq!(
        notifier.count_for(
            steve.id,
            &Notice::RedirectingToLobby {
                lobby: "lobby2".to_string()
            }
        ),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_request_while_redirected_from_lobby_proceeds() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    park_on_lobby(&coordinator, &steve).await;
    sleep(Duration::from_secs(6)).await;
    assert_single_enqueue(&backend, &steve);

    // Still on lobby2 while the queue works; a new request goes straight through
    let decision = coordinator
        .on_route_request(&steve, "creative")
        .await
        .unwrap();
    assert_eq!(decision, RouteDecision::Proceed);
    assert_eq!(backend.connects_for(steve.id), vec!["lobby2"]);
}

#[tokio::test(start_paused = true)]
async fn test_bounced_back_to_lobby_is_parked_again() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    park_on_lobby(&coordinator, &steve).await;
    sleep(Duration::from_secs(6)).await;
    assert_single_enqueue(&backend, &steve);

    // The desired server kicked them back to a lobby
    coordinator
        .on_arrived_at_server(&steve, "lobby1")
        .await
        .unwrap();
    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.phase, TransitPhase::AtLobby);

    sleep(Duration::from_secs(6)).await;
    assert_eq!(backend.enqueues_for(steve.id), vec!["survival2", "survival2"]);
}

#[tokio::test(start_paused = true)]
async fn test_new_request_from_game_server_starts_new_episode() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    park_on_lobby(&coordinator, &steve).await;
    sleep(Duration::from_secs(6)).await;
    coordinator
        .on_arrived_at_server(&steve, "survival2")
        .await
        .unwrap();
    let first_episode = coordinator.require_state(steve.id).await.unwrap().episode;

    let decision = coordinator
        .on_route_request(&steve, "creative")
        .await
        .unwrap();
    assert_eq!(decision, RouteDecision::Suppress);

    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.episode, first_episode + 1);
    assert_eq!(state.desired_server.as_deref(), Some("creative"));
    assert_eq!(backend.connects_for(steve.id), vec!["lobby2", "lobby2"]);
}

#[tokio::test(start_paused = true)]
async fn test_custom_advance_delay() {
    let config = CoordinatorConfig {
        advance_delay: Duration::from_secs(3),
        ..CoordinatorConfig::default()
    };
    let (coordinator, backend, _notifier) = create_test_system(standard_servers(), config);
    let steve = test_player("Steve");

    park_on_lobby(&coordinator, &steve).await;
    sleep(Duration::from_millis(3_100)).await;
    assert_single_enqueue(&backend, &steve);
}

#[tokio::test(start_paused = true)]
async fn test_failed_signal_advance_falls_back_to_timer() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    let arrived = park_on_lobby(&coordinator, &steve).await;
    sleep(Duration::from_secs(1)).await;

    backend.fail_next_enqueues(1);
    let err = assert_err!(coordinator.on_safe_signal(steve.id).await);
    assert!(matches!(
        err.downcast_ref::<lobby_transit::TransitError>(),
        Some(lobby_transit::TransitError::BackendFailed { .. })
    ));

    // Still parked, with the original timer armed
    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.phase, TransitPhase::AtLobby);

    sleep(Duration::from_millis(4_100)).await;
    let log = backend.enqueue_log_for(steve.id);
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].0.duration_since(arrived), Duration::from_secs(5));

    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.phase, TransitPhase::Redirected);
    let stats = coordinator.stats().unwrap();
    assert_eq!(stats.timer_advances, 1);
    assert_eq!(stats.signal_advances, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_timer_advance_is_rescheduled() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");
    backend.fail_next_enqueues(1);

    let arrived = park_on_lobby(&coordinator, &steve).await;
    sleep(Duration::from_millis(5_100)).await;

    assert_eq!(backend.enqueue_log_for(steve.id).len(), 1);
    let state = coordinator.require_state(steve.id).await.unwrap();
    assert_eq!(state.phase, TransitPhase::AtLobby);

    sleep(Duration::from_secs(5)).await;
    let log = backend.enqueue_log_for(steve.id);
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].0.duration_since(arrived), Duration::from_secs(10));
    assert_eq!(coordinator.stats().unwrap().timer_advances, 1);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.enqueue_log_for(steve.id).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_signal_after_failed_advance_succeeds_once() {
    let (coordinator, backend, _notifier) =
        create_test_system(standard_servers(), CoordinatorConfig::default());
    let steve = test_player("Steve");

    park_on_lobby(&coordinator, &steve).await;
    backend.fail_next_enqueues(1);
    assert_err!(coordinator.on_safe_signal(steve.id).await);
    assert!(assert_ok!(coordinator.on_safe_signal(steve.id).await));

    // The re-armed timer must not enqueue a third time
    sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.enqueues_for(steve.id), vec!["survival2", "survival2"]);
    assert_eq!(coordinator.stats().unwrap().signal_advances, 1);
}

//! End-to-end tests driving the InterModHost and InterModClient mods through
//! the mod manager against a real mods directory.

use inter_mod_client::{ClientMod, CLIENT_MOD_NAME, TEST_COMMAND};
use inter_mod_host::{HostMod, HOST_MOD_NAME};
use mod_api::{AccessLevel, CommandInvocation, ModError, ModState, SharedCounters};
use mod_manager::ModManager;
use mod_settings::{RetryPolicy, SETTINGS_FILE_NAME};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    manager: Arc<ModManager>,
    host_mod: Arc<HostMod>,
}

async fn setup(prepare: impl FnOnce(&std::path::Path)) -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let mods_dir = dir.path().join("Mods");
    prepare(&mods_dir);

    let manager = ModManager::new(&mods_dir);
    let host_mod = Arc::new(HostMod::new(
        manager.mod_path(HOST_MOD_NAME),
        RetryPolicy::immediate(3),
    ));
    let client = Arc::new(ClientMod::new(
        manager.mod_path(CLIENT_MOD_NAME),
        RetryPolicy::immediate(3),
    ));

    manager.register_mod(host_mod.clone()).await.unwrap();
    manager.register_mod(client).await.unwrap();

    Harness {
        _dir: dir,
        manager,
        host_mod,
    }
}

fn test_command(access_level: AccessLevel) -> CommandInvocation {
    CommandInvocation::new("integration", access_level, TEST_COMMAND)
}

#[tokio::test]
async fn test_fresh_install_starts_and_creates_settings() {
    let harness = setup(|_| {}).await;

    let running = harness.manager.start_all().await;
    assert_eq!(running, vec![HOST_MOD_NAME.to_string(), CLIENT_MOD_NAME.to_string()]);

    for name in [HOST_MOD_NAME, CLIENT_MOD_NAME] {
        let settings = harness.manager.mod_path(name).join(SETTINGS_FILE_NAME);
        assert!(settings.exists(), "missing {}", settings.display());
    }

    harness.manager.shutdown_all().await;
}

#[tokio::test]
async fn test_client_command_bumps_host_counter() {
    let harness = setup(|_| {}).await;
    harness.manager.start_all().await;

    let before = inter_mod_host::global_counter();
    for _ in 0..3 {
        harness
            .manager
            .run_command(test_command(AccessLevel::Player))
            .await
            .unwrap();
    }

    assert_eq!(harness.host_mod.instance_counter(), 3);
    assert!(inter_mod_host::global_counter() >= before + 3);

    let stats = harness.manager.get_stats().await;
    assert_eq!(stats.commands_dispatched, 3);
    assert_eq!(stats.commands_failed, 0);
}

#[tokio::test]
async fn test_host_settings_seed_instance_counter() {
    let harness = setup(|mods_dir| {
        let host_dir = mods_dir.join(HOST_MOD_NAME);
        std::fs::create_dir_all(&host_dir).unwrap();
        std::fs::write(
            host_dir.join(SETTINGS_FILE_NAME),
            "{\n  \"counterSeed\": 100,\n}\n",
        )
        .unwrap();
    })
    .await;
    harness.manager.start_all().await;

    harness
        .manager
        .run_command(test_command(AccessLevel::Admin))
        .await
        .unwrap();

    assert_eq!(harness.host_mod.instance_counter(), 101);
}

#[tokio::test]
async fn test_corrupt_client_settings_disable_client() {
    let harness = setup(|mods_dir| {
        let client_dir = mods_dir.join(CLIENT_MOD_NAME);
        std::fs::create_dir_all(&client_dir).unwrap();
        std::fs::write(client_dir.join(SETTINGS_FILE_NAME), "{ nope").unwrap();
    })
    .await;

    let running = harness.manager.start_all().await;
    assert_eq!(running, vec![HOST_MOD_NAME.to_string()]);

    let state = harness.manager.start_mod(CLIENT_MOD_NAME).await.unwrap();
    assert_eq!(state, ModState::Error);

    let stats = harness.manager.get_stats().await;
    assert_eq!(stats.disable_requests, 2);
    assert_eq!(stats.running_mods, 1);
    assert_eq!(stats.disabled_mods, 1);

    let client = stats
        .mods
        .iter()
        .find(|m| m.name == CLIENT_MOD_NAME)
        .unwrap();
    assert!(!client.enabled);
    assert_eq!(client.state, ModState::Stopped);
    assert_eq!(client.failed_start, Some(ModState::Error));
    assert_eq!(stats.failed_mods, 1);

    // The corrupt file is left for the operator to inspect
    let text = std::fs::read_to_string(
        harness
            .manager
            .mod_path(CLIENT_MOD_NAME)
            .join(SETTINGS_FILE_NAME),
    )
    .unwrap();
    assert_eq!(text, "{ nope");

    // A disabled mod no longer serves its commands
    let result = harness
        .manager
        .run_command(test_command(AccessLevel::Player))
        .await;
    assert!(matches!(result, Err(ModError::CommandNotFound(_))));
}

#[tokio::test]
async fn test_restart_after_fixing_settings() {
    let harness = setup(|mods_dir| {
        let client_dir = mods_dir.join(CLIENT_MOD_NAME);
        std::fs::create_dir_all(&client_dir).unwrap();
        std::fs::write(client_dir.join(SETTINGS_FILE_NAME), "{ nope").unwrap();
    })
    .await;
    harness.manager.start_all().await;

    std::fs::write(
        harness
            .manager
            .mod_path(CLIENT_MOD_NAME)
            .join(SETTINGS_FILE_NAME),
        "{ \"hostModName\": \"InterModHost\" }",
    )
    .unwrap();

    let state = harness.manager.start_mod(CLIENT_MOD_NAME).await.unwrap();
    assert_eq!(state, ModState::Running);
    assert_eq!(harness.manager.get_stats().await.failed_mods, 0);

    harness
        .manager
        .run_command(test_command(AccessLevel::Player))
        .await
        .unwrap();
    assert_eq!(harness.host_mod.instance_counter(), 1);
}

#[tokio::test]
async fn test_shutdown_all_stops_every_mod() {
    let harness = setup(|_| {}).await;
    harness.manager.start_all().await;
    harness.manager.shutdown_all().await;

    let states = harness.manager.get_mod_states().await;
    assert_eq!(states.len(), 2);
    assert!(states.iter().all(|(_, state)| *state == ModState::Stopped));

    let stats = harness.manager.get_stats().await;
    assert_eq!(stats.disabled_mods, 2);
    assert_eq!(stats.disable_requests, 0);
}

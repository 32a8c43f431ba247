//! Full flow: legacy file on disk -> manager -> executor -> driver

use pinrun::config::{AliasRecord, ConfigManager, ConfigModel, ConfigStore, FileConfigStore, GroupAction};
use pinrun::drivers::ConsoleDriver;
use pinrun::error::{CommandError, ConfigError};
use pinrun::executor::{Command, CommandBatch, CommandExecutor, CommandSuccess};
use pinrun::scheduler::{ActivationScheduler, Remaining};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const LEGACY_YAML: &str = r#"
GPIO_PINS:
  S1: 4
  S2:
    pin_num: 5
  S3: null
ALIASES:
  m1: S1
  lamp:
    config_spot: S2
    auto_off: false
  broken: S3
GROUPS:
  pair: [m1, lamp]
  halt:
    aliases: [m1, lamp]
    action: OFF
"#;

struct Rig {
    _dir: TempDir,
    store: Arc<FileConfigStore>,
    manager: Arc<ConfigManager>,
    driver: Arc<ConsoleDriver>,
    executor: CommandExecutor,
}

async fn rig() -> Rig {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pinrun.yaml");
    std::fs::write(&path, LEGACY_YAML).unwrap();

    let store = Arc::new(FileConfigStore::new(&path));
    let initial = store.load_or_init().await.unwrap();
    let range = initial.output_range;
    let manager = Arc::new(ConfigManager::new(initial, store.clone()));

    let driver = Arc::new(ConsoleDriver::new("e2e"));
    let scheduler = Arc::new(ActivationScheduler::new(driver.clone(), range));
    let executor = CommandExecutor::new(manager.shared(), scheduler);

    Rig {
        _dir: dir,
        store,
        manager,
        driver,
        executor,
    }
}

#[tokio::test(start_paused = true)]
async fn test_legacy_file_drives_outputs() {
    let rig = rig().await;

    // Legacy shapes were migrated on disk at load
    let on_disk = std::fs::read_to_string(rig.store.path()).unwrap();
    assert!(on_disk.contains("config_spot: S1"));

    let result = rig
        .executor
        .execute(&Command::activate_alias("m1", Some(0.5.into())))
        .unwrap();
    assert!(matches!(result, CommandSuccess::ActivateAlias { index: 4, .. }));
    assert!(rig.driver.is_high(4));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!rig.driver.is_high(4));
    assert!(rig.executor.status().is_empty());

    assert!(matches!(
        rig.executor.execute(&Command::activate_alias("broken", None)),
        Err(CommandError::Unmapped { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_group_on_then_off_from_batch() {
    let rig = rig().await;

    let batch: CommandBatch = serde_json::from_value(serde_json::json!([
        {"action": "activate_group", "target": "pair", "duration": "2 min"},
        {"action": "status"}
    ]))
    .unwrap();
    let results = rig.executor.execute_batch(batch);

    match &results[1] {
        Ok(CommandSuccess::Status { active }) => {
            assert!(matches!(active.get(&4), Some(Remaining::Seconds(s)) if *s > 119.0));
            assert_eq!(active.get(&5), Some(&Remaining::Indefinite));
        }
        other => panic!("unexpected {other:?}"),
    }

    rig.executor
        .execute(&Command::activate_group("halt", None))
        .unwrap();
    assert!(rig.executor.status().is_empty());
    assert!(!rig.driver.is_high(4));
    assert!(!rig.driver.is_high(5));
}

#[tokio::test]
async fn test_admin_changes_persist_and_apply() {
    let rig = rig().await;

    rig.manager.set_binding("S4", Some(6)).await.unwrap();
    rig.manager
        .set_alias("fan", AliasRecord::new("S4", true))
        .await
        .unwrap();
    assert_eq!(
        rig.manager
            .set_alias("ghost", AliasRecord::new("S9", true))
            .await,
        Err(ConfigError::UnknownSlot("S9".into()))
    );

    // New alias is usable immediately
    rig.executor
        .execute(&Command::activate_alias("fan", Some(30.0.into())))
        .unwrap();
    assert!(rig.driver.is_high(6));

    // And was saved in the file
    let saved: ConfigModel = rig.store.load().await.unwrap();
    assert_eq!(saved.aliases["fan"], AliasRecord::new("S4", true));
    assert_eq!(saved.groups["halt"].action, GroupAction::Off);
}

#[tokio::test]
async fn test_reload_picks_up_external_edit() {
    let rig = rig().await;

    let mut edited = rig.store.load().await.unwrap();
    edited.delete_alias("m1").unwrap();
    rig.store.save(&edited).await.unwrap();

    assert!(rig.manager.reload().await.unwrap());
    assert!(!rig.manager.reload().await.unwrap());
    assert_eq!(
        rig.executor.execute(&Command::activate_alias("m1", None)),
        Err(CommandError::UnknownAlias("m1".into()))
    );

    // A broken file keeps the running configuration
    std::fs::write(rig.store.path(), "aliases: [not, a, map]").unwrap();
    assert!(rig.manager.reload().await.is_err());
    assert!(rig.manager.snapshot().aliases.contains_key("lamp"));
}

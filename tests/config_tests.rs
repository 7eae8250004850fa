use std::io::Write;

use golem::events::ReactionType;
use golem::types::EventType;
use golem::Config;

#[test]
fn test_load_from_file_applies_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
agent_name = "bob"

[task_loop]
max_iterations = 12

[reactions.hostile_approach]
enabled = true
reaction_type = "emergency"
probability = 50
idle_only = false
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.agent_name, "bob");
    assert_eq!(config.task_loop.max_iterations, 12);
    assert_eq!(config.task_loop.reply_wait_ms, 90_000);

    let table = config.reaction_table();
    let hostile = table.get(EventType::HostileApproach).unwrap();
    assert_eq!(hostile.reaction_type, ReactionType::Emergency);
    assert_eq!(hostile.probability, 50);
    assert!(!hostile.idle_only);

    let damage = table.get(EventType::Damage).unwrap();
    assert_eq!(damage.reaction_type, ReactionType::Emergency);
}

#[test]
fn test_load_missing_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = Config::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("absent.toml"));
}

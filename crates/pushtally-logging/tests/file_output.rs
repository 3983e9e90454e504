//! File output test
//!
//! Lives in its own test binary because it installs the global subscriber.

use pushtally_logging::{
    ConsoleFormat, FileOutput, FileRotation, LogConfig, LoggingError, PushtallySubscriberBuilder,
};
use tempfile::TempDir;

#[test]
fn test_jsonl_file_output() {
    let temp_dir = TempDir::new().unwrap();
    let config = LogConfig {
        level: "info".to_string(),
        file: Some(FileOutput {
            prefix: "engine".to_string(),
            rotation: FileRotation::Never,
            keep: None,
            ..FileOutput::in_dir(temp_dir.path().join("logs"))
        }),
        ..LogConfig::testing()
    };

    let guard = PushtallySubscriberBuilder::new()
        .with_config(config)
        .with_console(ConsoleFormat::Off)
        .try_init()
        .unwrap();
    assert!(guard.is_some());

    tracing::info!(room = "!room", pairs = 3, "Rotation pass complete");
    drop(guard);

    let contents = std::fs::read_to_string(temp_dir.path().join("logs").join("engine.log")).unwrap();
    let line = contents.lines().last().unwrap();
    assert!(line.contains("\"message\":\"Rotation pass complete\""));
    assert!(line.contains("\"pairs\":3"));

    // A second subscriber is refused
    let second = PushtallySubscriberBuilder::new().try_init();
    assert!(matches!(second, Err(LoggingError::AlreadyInitialized(_))));
}

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use story_config::{Config, ConfigError, LayerKind, LoadOptions};
use tempfile::TempDir;

fn write_file(path: impl AsRef<Path>, contents: &str) {
    let mut file = fs::File::create(path).expect("create config");
    file.write_all(contents.as_bytes()).expect("write config");
}

fn canonical(path: impl AsRef<Path>) -> PathBuf {
    fs::canonicalize(path).expect("canonicalize path")
}

#[test]
fn loads_defaults_when_no_files_present() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());

    let config = Config::load(LoadOptions::default().with_working_dir(working_dir.clone()))
        .expect("load defaults");

    assert_eq!(
        config.drafts.database,
        working_dir.join(".obs-editor/drafts.sqlite3")
    );
    assert_eq!(config.drafts.save_delay, Duration::from_secs(3));
    assert_eq!(config.drafts.default_language, "en");
    assert_eq!(config.export.image_alt, "OBS Image");
    assert_eq!(config.export.output_dir, working_dir.join("."));

    assert_eq!(config.layers.len(), 1);
    assert_eq!(config.layers[0].kind, LayerKind::Builtin);
}

#[test]
fn applies_precedence_and_resolves_paths_per_layer() {
    let temp = TempDir::new().expect("tempdir");
    let git_root = canonical(temp.path());
    fs::create_dir(git_root.join(".git")).expect("create .git");

    write_file(
        git_root.join(".obs-editor.toml"),
        r#"
        [drafts]
        database = "shared/drafts.db"
        default_language = "hi"

        [export]
        image_alt = "Frame"
        "#,
    );

    let working_dir = git_root.join("stories");
    fs::create_dir(&working_dir).expect("create stories/");
    write_file(
        working_dir.join(".obs-editor.toml"),
        r#"
        [drafts]
        save_delay_ms = 500

        [export]
        output_dir = "out"
        "#,
    );

    let override_path = git_root.join("ci.toml");
    write_file(
        &override_path,
        r#"
        [drafts]
        default_language = "ta"
        "#,
    );

    let config = Config::load(
        LoadOptions::default()
            .with_working_dir(&working_dir)
            .with_override_path(&override_path),
    )
    .expect("load layered config");

    assert_eq!(config.drafts.database, git_root.join("shared/drafts.db"));
    assert_eq!(config.drafts.save_delay, Duration::from_millis(500));
    assert_eq!(config.drafts.default_language, "ta");
    assert_eq!(config.export.image_alt, "Frame");
    assert_eq!(config.export.output_dir, working_dir.join("out"));

    let kinds: Vec<LayerKind> = config.layers.iter().map(|l| l.kind).collect();
    assert_eq!(
        kinds,
        vec![
            LayerKind::Builtin,
            LayerKind::Repository,
            LayerKind::Directory,
            LayerKind::Explicit,
        ]
    );
}

#[test]
fn reports_every_invalid_setting() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());
    write_file(
        working_dir.join(".obs-editor.toml"),
        r#"
        [drafts]
        save_delay_ms = 0
        default_language = "en_US"

        [export]
        image_alt = "[x]"
        "#,
    );

    let err = Config::load(LoadOptions::default().with_working_dir(&working_dir))
        .expect_err("invalid config");

    match err {
        ConfigError::Invalid(problems) => {
            assert_eq!(problems.len(), 3);
            let rendered = problems.to_string();
            assert!(rendered.contains("save_delay_ms"));
            assert!(rendered.contains("default_language"));
            assert!(rendered.contains("image_alt"));
            assert!(rendered.contains("[directory config "));
        }
        other => panic!("expected invalid settings, got {other}"),
    }
}

#[test]
fn rejects_unknown_keys_and_missing_override() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());

    let missing = Config::load(
        LoadOptions::default()
            .with_working_dir(&working_dir)
            .with_override_path("nope.toml"),
    );
    assert!(matches!(missing, Err(ConfigError::MissingOverride { .. })));

    write_file(
        working_dir.join(".obs-editor.toml"),
        "[drafts]\ndatabse = \"typo.db\"\n",
    );
    let parse = Config::load(LoadOptions::default().with_working_dir(&working_dir));
    assert!(matches!(parse, Err(ConfigError::Parse { .. })));
}

// Integration tests for project provisioning and folder resolution

mod common;

use common::{Workspace, entries};
use gravipack::models::{LogicalFolder, ModMetadata};
use gravipack::services::layout::{self, LayoutError};
use std::fs;

#[test]
fn test_initialize_creates_full_skeleton() {
    let ws = Workspace::new();
    let report = layout::initialize(&ws.paths).unwrap();

    assert!(report.readme_created);
    for folder in LogicalFolder::DIRECTORIES {
        assert!(ws.paths.folder(folder).is_dir(), "{} missing", folder);
    }
    assert!(ws.paths.folder(LogicalFolder::Readme).is_file());
    assert_eq!(
        entries(ws.paths.mod_project_dir()),
        vec![
            "CORE",
            "dds_work",
            "extracted_game_sounds",
            "extracted_game_textures",
            "prepared_sounds",
            "prepared_textures",
            "readme.txt",
            "wav_sfx_work",
            "wav_speech_work",
        ]
    );
}

#[test]
fn test_initialize_twice_changes_nothing() {
    let ws = Workspace::new();
    layout::initialize(&ws.paths).unwrap();

    let readme = ws.paths.folder(LogicalFolder::Readme);
    fs::write(&readme, "my own readme").unwrap();

    let second = layout::initialize(&ws.paths).unwrap();
    assert!(second.is_noop());
    assert_eq!(fs::read_to_string(&readme).unwrap(), "my own readme");
}

#[test]
fn test_initialize_with_metadata_seeds_readme() {
    let ws = Workspace::new();
    let metadata = ModMetadata {
        name: "Winter Camo".to_string(),
        author: "Sapper".to_string(),
        version: "2.1".to_string(),
    };
    layout::initialize_with(&ws.paths, &metadata).unwrap();

    let readme = fs::read_to_string(ws.paths.folder(LogicalFolder::Readme)).unwrap();
    assert!(readme.contains("Winter Camo"));
    assert!(readme.contains("Sapper"));
}

#[test]
fn test_initialize_without_starter_fails_and_writes_nothing() {
    let ws = Workspace::new();
    fs::remove_file(ws.paths.starter_exe()).unwrap();

    let err = layout::initialize(&ws.paths).unwrap_err();
    assert!(matches!(err, LayoutError::PathInvalid(path) if path == ws.paths.starter_exe()));
    assert!(!ws.paths.mod_project_dir().exists());
}

#[test]
fn test_resolve_every_logical_name() {
    let ws = Workspace::new();
    let names = [
        ("dds_work", "dds_work"),
        ("prepared_textures", "prepared_textures"),
        ("prepared_sounds_sfx", "prepared_sounds/sfx"),
        ("prepared_sounds_speech", "prepared_sounds/speech"),
        ("core", "CORE"),
        ("packed_data", "CORE/shared/packed_data"),
        ("extracted_atf", "extracted_game_textures/atf"),
        ("extracted_dds", "extracted_game_textures/dds"),
        ("extracted_sounds", "extracted_game_sounds"),
        ("wav_sfx_work", "wav_sfx_work"),
        ("wav_speech_work", "wav_speech_work"),
        ("readme", "readme.txt"),
        ("manifest", "CORE/desc.addpack"),
    ];

    for (name, relative) in names {
        let resolved = layout::resolve(&ws.paths, name).unwrap();
        assert_eq!(resolved, ws.paths.mod_project_dir().join(relative), "{}", name);
    }
}

#[test]
fn test_resolve_unknown_name() {
    let ws = Workspace::new();
    let err = layout::resolve(&ws.paths, "textures_final").unwrap_err();
    assert!(matches!(err, LayoutError::UnknownLogicalName(name) if name == "textures_final"));
}

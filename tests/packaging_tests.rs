// Integration tests for archive building, manifest generation and the mod container

mod common;

use camino::Utf8Path;
use common::{FakeStarter, Workspace, entries};
use gravipack::models::{
    ArchiveCategory, LogicalFolder, ModMetadata, PackagingJob, PackagingStage, PreparedAsset,
    PreparedKind,
};
use gravipack::StateManager;
use gravipack::services::{AssetRegistry, PackagingEngine, PackagingError};
use std::fs;
use std::io::Read;

fn demo_metadata() -> ModMetadata {
    ModMetadata::new("Demo", "A", "100")
}

/// Two textures and one SFX `.aaf` in the prepared folders.
fn prepared_workspace() -> (Workspace, Vec<PreparedAsset>) {
    let ws = Workspace::initialized();
    ws.put(LogicalFolder::PreparedTextures, "gun.texture", "gun");
    ws.put(LogicalFolder::PreparedTextures, "tank.texture", "tank");
    ws.put(LogicalFolder::PreparedSoundsSfx, "boom.aaf", "boom");
    let assets = AssetRegistry::new(ws.paths.clone()).scan_prepared();
    assert_eq!(assets.len(), 3);
    (ws, assets)
}

fn zip_entry(container: &Utf8Path, name: &str) -> String {
    let file = fs::File::open(container).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    content
}

fn zip_names(container: &Utf8Path) -> Vec<String> {
    let file = fs::File::open(container).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_full_packaging_flow() {
    let (ws, assets) = prepared_workspace();
    let ctx = ws.context(FakeStarter::new());
    let mut engine = PackagingEngine::new(ctx.clone());
    assert_eq!(engine.stage(), PackagingStage::Idle);

    let files = engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), assets))
        .await
        .unwrap();
    assert_eq!(engine.stage(), PackagingStage::FilesGenerated);
    assert!(files.used_builtin_template);

    let packed = ws.paths.folder(LogicalFolder::PackedData);
    assert_eq!(entries(&packed), vec!["sounds.flatdata", "textures.flatdata"]);
    assert_eq!(
        files.archives,
        vec![packed.join("textures.flatdata"), packed.join("sounds.flatdata")]
    );

    // The fake tool copies the flatlist into the archive.
    let textures = fs::read_to_string(packed.join("textures.flatdata")).unwrap();
    assert_eq!(
        textures,
        "i_unflat:unflat()\n{\n    gun\t, texture\t, loc_def ;\n    tank\t, texture\t, loc_def ;\n}\n"
    );
    let sounds = fs::read_to_string(packed.join("sounds.flatdata")).unwrap();
    assert!(sounds.contains("    boom\t, sound\t, loc_def ;"));

    let manifest = fs::read_to_string(&files.manifest).unwrap();
    assert!(manifest.contains("name[*] = Demo;"));
    assert!(manifest.contains("author[*] = A;"));
    assert!(manifest.contains("version[u] = 100;"));
    assert!(manifest.contains("path[*] = mods/Demo;"));
    assert!(manifest.contains("type[*] = RES;"));

    let readme = fs::read_to_string(&files.readme).unwrap();
    assert!(readme.starts_with("Mod: Demo\nAuthor: A\nVersion: 100\n"));
    assert!(ws.modwork_entries().is_empty());

    let container = engine.create_distributable(&ws.root).unwrap();
    assert_eq!(container, ws.root.join("Demo.gt2extension"));
    assert_eq!(engine.stage(), PackagingStage::ArchiveCreated);

    let names = zip_names(&container);
    for expected in [
        "CORE/desc.addpack",
        "CORE/shared/packed_data/sounds.flatdata",
        "CORE/shared/packed_data/textures.flatdata",
        "readme.txt",
    ] {
        assert!(names.iter().any(|n| n == expected), "{} not in {:?}", expected, names);
    }
    assert_eq!(zip_entry(&container, "CORE/desc.addpack"), manifest);
    assert_eq!(zip_entry(&container, "readme.txt"), readme);

    // A second export is allowed.
    let again = engine.create_distributable(&ws.root.join("copy")).unwrap();
    assert_eq!(again, ws.root.join("copy.gt2extension"));
    assert!(again.is_file());
}

#[tokio::test]
async fn test_distributable_before_generation_is_refused() {
    let (ws, _) = prepared_workspace();
    let mut engine = PackagingEngine::new(ws.context(FakeStarter::new()));

    let target = ws.root.join("early.gt2extension");
    let err = engine.create_distributable(&target).unwrap_err();
    assert!(matches!(
        err,
        PackagingError::WrongState {
            stage: PackagingStage::Idle,
            ..
        }
    ));
    assert!(!target.exists());
    assert!(!ws.paths.folder(LogicalFolder::Manifest).exists());
}

#[tokio::test]
async fn test_empty_selection_and_blank_metadata() {
    let (ws, assets) = prepared_workspace();
    let mut engine = PackagingEngine::new(ws.context(FakeStarter::new()));

    let err = engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, PackagingError::EmptySelection));

    let err = engine
        .generate_mod_files(&PackagingJob::new(ModMetadata::new("Demo", "  ", "1"), assets))
        .await
        .unwrap_err();
    assert!(matches!(err, PackagingError::InvalidMetadata { field: "author" }));
    assert_eq!(engine.stage(), PackagingStage::Idle);
}

#[tokio::test]
async fn test_failed_archive_installs_nothing() {
    let (ws, assets) = prepared_workspace();
    let starter = FakeStarter::new().fail_when("sounds.flatdata");
    let mut engine = PackagingEngine::new(ws.context(starter));

    let err = engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), assets))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PackagingError::ArchiveBuildFailed {
            category: ArchiveCategory::Sounds,
            ..
        }
    ));
    assert!(entries(&ws.paths.folder(LogicalFolder::PackedData)).is_empty());
    assert!(!ws.paths.folder(LogicalFolder::Manifest).exists());
    assert!(ws.modwork_entries().is_empty());
    assert_eq!(engine.stage(), PackagingStage::Idle);
}

#[tokio::test]
async fn test_missing_selected_file() {
    let (ws, mut assets) = prepared_workspace();
    let ghost = ws.paths.folder(LogicalFolder::PreparedTextures).join("ghost.texture");
    assets.push(PreparedAsset::new(ghost.clone(), PreparedKind::Tex));

    let mut engine = PackagingEngine::new(ws.context(FakeStarter::new()));
    let err = engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), assets))
        .await
        .unwrap_err();
    assert!(matches!(err, PackagingError::MissingInputs(path) if path == ghost));
}

#[tokio::test]
async fn test_clashing_sound_names_are_rejected() {
    let ws = Workspace::initialized();
    ws.put(LogicalFolder::PreparedSoundsSfx, "shot.aaf", "a");
    ws.put(LogicalFolder::PreparedSoundsSpeech, "shot.loc_def.sound", "b");
    let assets = AssetRegistry::new(ws.paths.clone()).scan_prepared();

    let ctx = ws.context(FakeStarter::new());
    let mut engine = PackagingEngine::new(ctx.clone());
    let err = engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), assets))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PackagingError::DuplicateAssetName { category: ArchiveCategory::Sounds, ref name }
            if name == "shot.loc_def.sound"
    ));
    assert!(ctx.gateway.runner().calls().is_empty());
}

#[tokio::test]
async fn test_deleted_manifest_blocks_the_container() {
    let (ws, assets) = prepared_workspace();
    let mut engine = PackagingEngine::new(ws.context(FakeStarter::new()));
    engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), assets))
        .await
        .unwrap();

    let manifest = ws.paths.folder(LogicalFolder::Manifest);
    fs::remove_file(&manifest).unwrap();

    let err = engine.create_distributable(&ws.root).unwrap_err();
    assert!(matches!(err, PackagingError::MissingInputs(path) if path == manifest));
    assert!(!ws.root.join("Demo.gt2extension").exists());
}

#[tokio::test]
async fn test_deleted_readme_is_regenerated() {
    let (ws, assets) = prepared_workspace();
    let mut engine = PackagingEngine::new(ws.context(FakeStarter::new()));
    engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), assets))
        .await
        .unwrap();
    fs::remove_file(ws.paths.folder(LogicalFolder::Readme)).unwrap();

    let container = engine.create_distributable(&ws.root).unwrap();
    assert!(zip_entry(&container, "readme.txt").contains("Mod: Demo"));
}

#[tokio::test]
async fn test_game_stencil_keeps_addon_type() {
    let (ws, assets) = prepared_workspace();
    let stencil = ws.paths.manifest_template();
    fs::create_dir_all(stencil.parent().unwrap()).unwrap();
    fs::write(
        &stencil,
        "i_addpack:addpack()\n{\n  name[*] = <My Addon>;\n  author[*] = <Vasya Pupkin>;\n  path[*] = <my_updates>;\n  version[u] = 7;\n  type[*] = ADDN;\n}\n",
    )
    .unwrap();

    let mut engine = PackagingEngine::new(ws.context(FakeStarter::new()));
    let files = engine
        .generate_mod_files(&PackagingJob::new(
            ModMetadata::new("Night Ops", "A", "205"),
            assets,
        ))
        .await
        .unwrap();

    assert!(!files.used_builtin_template);
    let manifest = fs::read_to_string(&files.manifest).unwrap();
    assert!(manifest.contains("type[*] = ADDN;"));
    assert!(manifest.contains("version[u] = 205;"));
    assert!(manifest.contains("path[*] = mods/Night_Ops;"));
}

#[tokio::test]
async fn test_container_extension_is_enforced() {
    let (ws, assets) = prepared_workspace();
    let mut engine = PackagingEngine::new(ws.context(FakeStarter::new()));
    engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), assets))
        .await
        .unwrap();

    let container = engine
        .create_distributable(&ws.root.join("out").join("release.zip"))
        .unwrap();
    assert_eq!(container, ws.root.join("out").join("release.gt2extension"));
    assert!(container.is_file());
}

#[tokio::test]
async fn test_asset_kind_must_match_its_folder() {
    let (ws, _) = prepared_workspace();
    let gun = ws.paths.folder(LogicalFolder::PreparedTextures).join("gun.texture");
    let ctx = ws.context(FakeStarter::new());
    let mut engine = PackagingEngine::new(ctx.clone());

    // A texture tagged as a sound effect.
    let err = engine
        .generate_mod_files(&PackagingJob::new(
            demo_metadata(),
            vec![PreparedAsset::new(gun.clone(), PreparedKind::Sfx)],
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PackagingError::KindMismatch {
            ref path,
            kind: PreparedKind::Sfx,
            folder: LogicalFolder::PreparedSoundsSfx,
        } if *path == gun
    ));

    // A sound file dropped into the texture folder and tagged to match it.
    let stray = ws.put(LogicalFolder::PreparedTextures, "boom.aaf", "boom");
    let err = engine
        .generate_mod_files(&PackagingJob::new(
            demo_metadata(),
            vec![PreparedAsset::new(stray, PreparedKind::Tex)],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, PackagingError::KindMismatch { kind: PreparedKind::Tex, .. }));

    // A texture from outside the project.
    let outside = ws.root.join("loose.texture");
    fs::write(&outside, "x").unwrap();
    let err = engine
        .generate_mod_files(&PackagingJob::new(
            demo_metadata(),
            vec![PreparedAsset::new(outside, PreparedKind::Tex)],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, PackagingError::KindMismatch { .. }));

    assert!(ctx.gateway.runner().calls().is_empty());
    assert!(entries(&ws.paths.folder(LogicalFolder::PackedData)).is_empty());
    assert_eq!(engine.stage(), PackagingStage::Idle);
}

#[tokio::test]
async fn test_session_metadata_shared_between_engines() {
    let (ws, assets) = prepared_workspace();
    let state = StateManager::new();

    let mut first = PackagingEngine::new(ws.context(FakeStarter::new()).with_state(state.clone()));
    first
        .generate_mod_files(&PackagingJob::new(ModMetadata::new("Night Ops", "A", "7"), assets))
        .await
        .unwrap();
    fs::remove_file(ws.paths.folder(LogicalFolder::Readme)).unwrap();

    let mut second = PackagingEngine::new(ws.context(FakeStarter::new()).with_state(state.clone()));
    let container = second.create_distributable(&ws.root).unwrap();
    assert_eq!(container, ws.root.join("Night_Ops.gt2extension"));
    assert!(zip_entry(&container, "readme.txt").starts_with("Mod: Night Ops\nAuthor: A\n"));
}

#[tokio::test]
async fn test_stage_without_metadata_is_refused() {
    let (ws, assets) = prepared_workspace();
    let mut engine = PackagingEngine::new(ws.context(FakeStarter::new()));
    engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), assets))
        .await
        .unwrap();

    let state = StateManager::new();
    state.set_packaging_stage(PackagingStage::FilesGenerated);
    let mut stray = PackagingEngine::new(ws.context(FakeStarter::new()).with_state(state));
    let err = stray.create_distributable(&ws.root).unwrap_err();
    assert!(matches!(err, PackagingError::WrongState { .. }));
    assert!(!ws.root.join("MyMod.gt2extension").exists());
}

#[tokio::test]
async fn test_unwritable_manifest_installs_no_archives() {
    let (ws, assets) = prepared_workspace();
    let manifest = ws.paths.folder(LogicalFolder::Manifest);
    fs::create_dir_all(&manifest).unwrap();

    let ctx = ws.context(FakeStarter::new());
    let mut engine = PackagingEngine::new(ctx.clone());
    let err = engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), assets))
        .await
        .unwrap_err();

    assert!(matches!(err, PackagingError::Io { ref path, .. } if *path == manifest));
    assert_eq!(ctx.gateway.runner().calls().len(), 2);
    assert!(entries(&ws.paths.folder(LogicalFolder::PackedData)).is_empty());
    assert_eq!(entries(&ws.paths.folder(LogicalFolder::Core)), vec!["desc.addpack", "shared"]);
    assert!(ws.modwork_entries().is_empty());
    assert_eq!(engine.stage(), PackagingStage::Idle);
    assert!(ctx.state.packaging_metadata().is_none());
}

#[tokio::test]
async fn test_rebuild_drops_archives_no_longer_selected() {
    let (ws, assets) = prepared_workspace();
    let mut engine = PackagingEngine::new(ws.context(FakeStarter::new()));
    engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), assets.clone()))
        .await
        .unwrap();
    let packed = ws.paths.folder(LogicalFolder::PackedData);
    assert_eq!(entries(&packed), vec!["sounds.flatdata", "textures.flatdata"]);

    let textures_only: Vec<PreparedAsset> = assets
        .into_iter()
        .filter(|asset| asset.kind == PreparedKind::Tex)
        .collect();
    engine
        .generate_mod_files(&PackagingJob::new(demo_metadata(), textures_only))
        .await
        .unwrap();
    assert_eq!(entries(&packed), vec!["textures.flatdata"]);

    let container = engine.create_distributable(&ws.root).unwrap();
    let names = zip_names(&container);
    assert!(!names.iter().any(|n| n.ends_with("sounds.flatdata")));
    assert!(names.iter().any(|n| n == "CORE/shared/packed_data/textures.flatdata"));
}

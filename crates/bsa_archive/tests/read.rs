use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};

use bsa_archive::{
    error::Error, Archive, ArchiveSettings, File, UnpackOptions, UnpackProgress,
};
use miette::{IntoDiagnostic, Result};
use pretty_assertions::assert_eq;
use tracing::{info, instrument};
use tracing_test::traced_test;
use walkdir::WalkDir;

fn sample(default_compressed: bool) -> Archive {
    let mut archive = Archive::new(
        ArchiveSettings::builder()
            .default_compressed(default_compressed)
            .build(),
    );

    for (path, name) in [
        ("meshes\\armor\\combat", "helmet.nif"),
        ("meshes\\armor\\combat", "body.nif"),
        ("textures\\armor\\combat", "helmet.dds"),
        ("textures\\armor\\combat", "helmet_n.dds"),
        ("sound\\fx\\wpn", "fire.wav"),
        ("menus", "main_menu.xml"),
    ] {
        let data = format!("{path}\\{name}\n").repeat(64).into_bytes();
        archive.add_file(path, File::new(name, data, default_compressed));
    }
    archive
}

fn saved(dir: &Path, archive: &Archive) -> Result<Archive> {
    let path = dir.join("sample.bsa");
    archive.save(&path, false)?;
    Ok(Archive::open(&path)?)
}

/// Relative path and contents of every file below `dir`
#[instrument]
fn tree(dir: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.into_diagnostic()?;
        if entry.file_type().is_file() {
            let relative = entry.path().strip_prefix(dir).into_diagnostic()?;
            info!("found {}", relative.display());
            files.push((
                relative.to_string_lossy().replace('\\', "/"),
                fs::read(entry.path()).into_diagnostic()?,
            ));
        }
    }
    Ok(files)
}

#[test]
#[traced_test]
fn open_mapped_archive() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let archive = saved(dir.path(), &sample(true))?;

    assert_eq!(archive.len(), 4);
    assert_eq!(archive.file_count(), 6);

    let file = archive.by_name("meshes\\armor\\combat\\helmet.nif")?;
    assert!(file.is_compressed());
    assert!(!file.is_resolved());
    assert!(file.compressed_size() < Some(file.size()));

    let data = file.resolve()?;
    assert_eq!(data.len() as u64, file.size());
    assert!(file.is_resolved());
    Ok(())
}

#[test]
fn open_rejects_other_versions() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let path = dir.path().join("oblivion.bsa");
    sample(false).save(&path, false)?;

    let mut bytes = fs::read(&path).into_diagnostic()?;
    bytes[4] = 0x67;
    fs::write(&path, bytes).into_diagnostic()?;

    assert!(matches!(
        Archive::open(&path),
        Err(Error::UnsupportedVersion(0x67))
    ));
    Ok(())
}

#[test]
fn open_rejects_other_files() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let path = dir.path().join("readme.txt");
    fs::write(&path, b"this is not an archive at all, just some text").into_diagnostic()?;

    assert!(matches!(Archive::open(&path), Err(Error::BadMagic)));
    assert!(Archive::open(dir.path().join("missing.bsa")).is_err());
    Ok(())
}

#[test]
fn detached_archive_outlives_its_file() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let expected = sample(true);
    let mut archive = saved(dir.path(), &expected)?;

    archive.detach()?;
    fs::remove_file(dir.path().join("sample.bsa")).into_diagnostic()?;

    for (expected, actual) in expected.files().zip(archive.files()) {
        assert_eq!(expected.resolve()?, actual.resolve()?);
    }
    Ok(())
}

#[test]
#[traced_test]
fn unpack_reports_progress() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let archive = saved(dir.path(), &sample(true))?;
    let out = dir.path().join("out");

    let (tx, rx) = mpsc::channel();
    let options = UnpackOptions::builder().threads(3).build();
    let written = archive.unpack(&out, &options, Some(tx))?;
    assert_eq!(written, 6);

    let mut events: Vec<UnpackProgress> = rx.iter().collect();
    assert_eq!(events.len(), 6);
    assert!(events.iter().all(|e| e.total == 6));

    events.sort_by_key(|e| e.completed);
    assert_eq!(
        events.iter().map(|e| e.completed).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5, 6]
    );

    let mut names: Vec<String> = events.into_iter().map(|e| e.file_name).collect();
    names.sort();
    let mut expected: Vec<String> = archive.files().map(|f| f.full_path()).collect();
    expected.sort();
    assert_eq!(names, expected);

    let mut expected_tree = Vec::new();
    for file in archive.files() {
        expected_tree.push((file.full_path().replace('\\', "/"), file.resolve()?.to_vec()));
    }
    expected_tree.sort();
    let mut actual_tree = tree(&out)?;
    actual_tree.sort();
    assert_eq!(actual_tree, expected_tree);
    Ok(())
}

#[test]
fn unpack_refuses_to_overwrite() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let archive = saved(dir.path(), &sample(false))?;
    let out = dir.path().join("out");

    let existing = out.join("menus").join("main_menu.xml");
    fs::create_dir_all(existing.parent().unwrap_or(&out)).into_diagnostic()?;
    fs::write(&existing, b"keep me").into_diagnostic()?;

    let options = UnpackOptions::builder().threads(1).build();
    assert!(matches!(
        archive.unpack(&out, &options, None),
        Err(Error::IOError(_))
    ));
    assert_eq!(fs::read(&existing).into_diagnostic()?, b"keep me");

    let options = UnpackOptions::builder().overwrite(true).build();
    assert_eq!(archive.unpack(&out, &options, None)?, 6);
    assert_eq!(
        fs::read(&existing).into_diagnostic()?,
        archive.by_name("menus\\main_menu.xml")?.resolve()?
    );
    Ok(())
}

#[test]
fn unpack_cancelled_before_start() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let archive = saved(dir.path(), &sample(true))?;
    let out = dir.path().join("out");

    let cancel = Arc::new(AtomicBool::new(true));
    let options = UnpackOptions::builder().cancel(cancel).build();
    let (tx, rx) = mpsc::channel();

    assert!(matches!(
        archive.unpack(&out, &options, Some(tx)),
        Err(Error::Cancelled)
    ));
    assert_eq!(rx.iter().count(), 0);
    assert!(tree(&out).map(|t| t.is_empty()).unwrap_or(true));
    Ok(())
}

#[test]
fn unpack_rejects_escaping_paths() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let out = dir.path().join("out");

    let mut archive = sample(false);
    archive.add_file("..\\..\\escape", File::new("evil.txt", b"gotcha".to_vec(), false));

    assert!(matches!(
        archive.unpack(&out, &UnpackOptions::default(), None),
        Err(Error::UnsafePath(_))
    ));
    assert!(!out.exists());
    Ok(())
}

#[test]
#[traced_test]
fn pack_directory() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let source = dir.path().join("source");

    for (path, data) in [
        ("textures/armor/helmet.dds", &b"dds data"[..]),
        ("textures/armor/Gauntlets.DDS", &b"more dds data"[..]),
        ("meshes/armor/helmet.nif", &b"nif data"[..]),
        ("meshes/.gitignore", &b"*"[..]),
        ("loose.txt", &b"not in a folder"[..]),
    ] {
        let path = source.join(path);
        fs::create_dir_all(path.parent().unwrap_or(&source)).into_diagnostic()?;
        fs::write(path, data).into_diagnostic()?;
    }

    let settings = ArchiveSettings::builder().default_compressed(true).build();
    let archive = Archive::pack(&source, settings)?;

    assert_eq!(archive.len(), 2);
    assert_eq!(archive.file_count(), 3);
    assert!(logs_contain("skipping file outside of any folder"));
    assert!(logs_contain("skipping file without a name"));

    let file = archive.by_name("textures\\armor\\gauntlets.dds")?;
    assert_eq!(file.name(), "Gauntlets.DDS");
    assert!(file.is_compressed());

    let out = dir.path().join("out");
    let reopened = saved(dir.path(), &archive)?;
    reopened.unpack(&out, &UnpackOptions::default(), None)?;

    assert_eq!(
        tree(&out)?,
        vec![
            ("meshes/armor/helmet.nif".to_owned(), b"nif data".to_vec()),
            ("textures/armor/Gauntlets.DDS".to_owned(), b"more dds data".to_vec()),
            ("textures/armor/helmet.dds".to_owned(), b"dds data".to_vec()),
        ]
    );
    Ok(())
}

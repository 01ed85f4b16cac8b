//! The view service against a real directory and a SQLite catalog.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;

use linkview_core::{TagChain, ViewDefinition, VirtualLayout, Workspace};
use linkview_engine::{SaveOutcome, ViewService};
use linkview_fs::LocalFs;
use linkview_store::{Catalog, SqliteCatalog};
use tempfile::TempDir;

fn inode(path: &Path) -> u64 {
    fs::symlink_metadata(path).unwrap().ino()
}

struct Setup {
    _dir: TempDir,
    catalog: Arc<SqliteCatalog>,
    service: ViewService,
    workspace: Workspace,
}

fn setup() -> Setup {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("ws");
    fs::create_dir_all(&root).unwrap();
    let catalog = Arc::new(SqliteCatalog::open(&dir.path().join("catalog.db")).unwrap());
    let service = ViewService::new(
        catalog.clone(),
        catalog.clone(),
        Arc::new(LocalFs::confined_to([root.clone()])),
        VirtualLayout::default(),
    );
    Setup {
        _dir: dir,
        catalog,
        service,
        workspace: Workspace::new("ws", root),
    }
}

fn add(s: &Setup, name: &str, tags: &[(&str, &str)]) -> String {
    let path = s.workspace.root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, name).unwrap();
    let id = s.catalog.add_file("ws", &path, None).unwrap();
    for (dimension, value) in tags {
        let dim = s.catalog.add_dimension(dimension).unwrap();
        s.catalog.tag_file(&id, dim.id, value).unwrap();
    }
    id
}

fn chain(s: &Setup, selectors: &[(&str, &str)]) -> TagChain {
    TagChain::new(
        selectors
            .iter()
            .map(|(d, v)| s.catalog.selector(d, v).unwrap())
            .collect(),
    )
}

#[tokio::test]
async fn test_save_creates_real_hardlinks() {
    let s = setup();
    add(&s, "a.txt", &[("Genre", "Doc")]);
    add(&s, "b.txt", &[("Genre", "Doc"), ("Format", "PDF")]);

    let view = ViewDefinition::new("docs", "ws", "Docs", chain(&s, &[("Genre", "Doc"), ("Format", "PDF")]));
    let outcome = s.service.save_view(&s.workspace, view).await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Saved { .. }));

    let vroot = s.workspace.root.join(".linkview");
    assert_eq!(inode(&vroot.join("Doc/a.txt")), inode(&s.workspace.root.join("a.txt")));
    assert_eq!(inode(&vroot.join("Doc/PDF/b.txt")), inode(&s.workspace.root.join("b.txt")));
    assert!(!vroot.join("Doc/b.txt").exists());
    assert!(vroot.join("_ABOUT_LINKVIEW.en.txt").is_file());
    assert_eq!(fs::metadata(s.workspace.root.join("b.txt")).unwrap().nlink(), 2);

    // Writing through a link changes the original.
    fs::write(vroot.join("Doc/a.txt"), "edited").unwrap();
    assert_eq!(fs::read_to_string(s.workspace.root.join("a.txt")).unwrap(), "edited");
}

#[tokio::test]
async fn test_move_and_reconcile_on_disk() {
    let s = setup();
    let id = add(&s, "a.txt", &[("Genre", "Doc")]);
    let view = ViewDefinition::new("docs", "ws", "Docs", chain(&s, &[("Genre", "Doc")]));
    s.service.save_view(&s.workspace, view).await.unwrap();

    let old_path = s.workspace.root.join("a.txt");
    let new_path = s.workspace.root.join("sorted/a.txt");
    let capture = s
        .service
        .capture_before_move(&s.workspace, &id, &old_path)
        .await
        .unwrap();
    assert_eq!(capture.link_paths.len(), 1);

    // Copy then delete, so the inode changes.
    fs::create_dir_all(new_path.parent().unwrap()).unwrap();
    fs::copy(&old_path, &new_path).unwrap();
    fs::remove_file(&old_path).unwrap();
    s.catalog.set_path(&id, &new_path).unwrap();

    let report = s
        .service
        .relink_after_move(&s.workspace, &capture, &new_path)
        .await
        .unwrap();
    assert_eq!(report.repaired, 1);
    assert_eq!(inode(&capture.link_paths[0]), inode(&new_path));

    let genre = s.catalog.add_dimension("Genre").unwrap();
    s.catalog.untag_file(&id, genre.id).unwrap();
    let report = s.service.reconcile_workspace(&s.workspace).await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(!s.workspace.root.join(".linkview/Doc").exists());
    assert!(s.workspace.root.join(".linkview").is_dir());
}

#[tokio::test]
async fn test_views_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("catalog.db");
    {
        let catalog = Arc::new(SqliteCatalog::open(&db).unwrap());
        catalog.add_dimension("Genre").unwrap();
        let chain = TagChain::new(vec![catalog.selector("Genre", "Doc").unwrap()]);
        let service = ViewService::new(
            catalog.clone(),
            catalog,
            Arc::new(LocalFs::new()),
            VirtualLayout::default(),
        );
        let workspace = Workspace::new("ws", dir.path());
        service
            .save_view(&workspace, ViewDefinition::new("docs", "ws", "Docs", chain))
            .await
            .unwrap();
    }

    let catalog = Arc::new(SqliteCatalog::open(&db).unwrap());
    let service = ViewService::new(
        catalog.clone(),
        catalog,
        Arc::new(LocalFs::new()),
        VirtualLayout::default(),
    );
    let views = service.list_views(&Workspace::new("ws", dir.path())).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].chain.selectors()[0].tag_value, "Doc");
    assert!(dir.path().join(".linkview").is_dir());
}

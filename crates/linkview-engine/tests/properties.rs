//! End-to-end behavior of the view service over the in-memory filesystem
//! and catalog.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use linkview_core::{
    EngineError, FileIdentity, Filesystem, TagChain, TagSelector, ViewDefinition, ViewStore,
    VirtualLayout, Workspace,
};
use linkview_engine::{FileAssignment, PlanNode, PlanOptions, SaveOutcome, ViewService};
use linkview_fs::MemoryFs;
use linkview_store::{Catalog, MemoryCatalog};

const VROOT: &str = "/ws/.linkview";
const MARKER: &str = "/ws/.linkview/_ABOUT_LINKVIEW.en.txt";

struct Harness {
    fs: Arc<MemoryFs>,
    catalog: Arc<MemoryCatalog>,
    service: ViewService,
    workspace: Workspace,
}

impl Harness {
    fn new() -> Self {
        let fs = Arc::new(MemoryFs::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let service = ViewService::new(
            catalog.clone(),
            catalog.clone(),
            fs.clone(),
            VirtualLayout::default(),
        );
        Harness {
            fs,
            catalog,
            service,
            workspace: Workspace::new("ws", "/ws"),
        }
    }

    /// Create `/ws/<name>` and register it with `tags` as (dimension, value).
    fn file(&self, name: &str, tags: &[(&str, &str)]) -> (String, FileIdentity) {
        let path = PathBuf::from("/ws").join(name);
        let identity = self.fs.create_file(&path, name.as_bytes()).unwrap();
        let id = self.catalog.add_file("ws", &path, None).unwrap();
        for (dimension, value) in tags {
            let dim = self.catalog.add_dimension(dimension).unwrap();
            self.catalog.tag_file(&id, dim.id, value).unwrap();
        }
        (id, identity)
    }

    fn chain(&self, selectors: &[(&str, &str)]) -> TagChain {
        TagChain::new(
            selectors
                .iter()
                .map(|(dimension, value)| {
                    let dim = self.catalog.add_dimension(dimension).unwrap();
                    TagSelector::new(dim.id, dim.name, *value)
                })
                .collect(),
        )
    }

    async fn save(&self, id: &str, selectors: &[(&str, &str)]) -> SaveOutcome {
        let view = ViewDefinition::new(id, "ws", id, self.chain(selectors));
        self.service.save_view(&self.workspace, view).await.unwrap()
    }

    /// Every non-marker entry under the virtual root with its identity.
    fn snapshot(&self) -> Vec<(PathBuf, Option<FileIdentity>)> {
        self.fs
            .files_under(VROOT)
            .into_iter()
            .filter(|p| p != Path::new(MARKER))
            .map(|p| {
                let identity = self.fs.identity(&p);
                (p, identity)
            })
            .collect()
    }

    fn linked(&self, path: &str) -> Option<FileIdentity> {
        self.fs.identity(Path::new(VROOT).join(path))
    }
}

fn paths(snapshot: &[(PathBuf, Option<FileIdentity>)]) -> Vec<PathBuf> {
    snapshot.iter().map(|(p, _)| p.clone()).collect()
}

#[tokio::test]
async fn test_file_lands_at_deepest_matching_level() {
    let h = Harness::new();
    let (_, a) = h.file("a.txt", &[("Genre", "Doc")]);
    let (_, b) = h.file("b.txt", &[("Genre", "Doc"), ("Format", "PDF")]);

    let outcome = h.save("docs", &[("Genre", "Doc"), ("Format", "PDF")]).await;
    let SaveOutcome::Saved { virtual_path, report, .. } = outcome else {
        panic!("save was rejected");
    };

    assert_eq!(virtual_path, PathBuf::from("/ws/.linkview/Doc/PDF"));
    assert_eq!(h.linked("Doc/a.txt"), Some(a));
    assert_eq!(h.linked("Doc/PDF/b.txt"), Some(b));
    assert_eq!(h.linked("Doc/b.txt"), None);
    assert_eq!(paths(&h.snapshot()).len(), 2);
    assert_eq!(report.deduplicated, 1);
    assert!(report.is_clean());
    assert!(h.fs.exists(MARKER));
}

#[tokio::test]
async fn test_save_twice_is_idempotent() {
    let h = Harness::new();
    h.file("a.txt", &[("Genre", "Doc")]);
    h.file("b.txt", &[("Genre", "Doc"), ("Format", "PDF")]);
    h.file("c.txt", &[("Genre", "Music")]);

    h.save("docs", &[("Genre", "Doc"), ("Format", "PDF")]).await;
    let first = h.snapshot();
    h.save("docs", &[("Genre", "Doc"), ("Format", "PDF")]).await;

    assert_eq!(h.snapshot(), first);
}

#[tokio::test]
async fn test_shorter_chain_is_blocked_by_longer_view() {
    let h = Harness::new();
    h.file("b.txt", &[("Genre", "Doc"), ("Format", "PDF")]);
    h.save("long", &[("Genre", "Doc"), ("Format", "PDF")]).await;
    let before = h.snapshot();

    let outcome = h.save("short", &[("Genre", "Doc")]).await;
    let SaveOutcome::Conflict(conflict) = outcome else {
        panic!("shorter chain was saved");
    };

    assert_eq!(conflict.blocking_view_id, "long");
    assert!(h.catalog.get_view("ws", "short").await.unwrap().is_none());
    assert_eq!(h.snapshot(), before);
}

#[tokio::test]
async fn test_longer_chain_supersedes_shorter_view() {
    let h = Harness::new();
    let (_, a) = h.file("a.txt", &[("Genre", "Doc")]);
    let (_, b) = h.file("b.txt", &[("Genre", "Doc"), ("Format", "PDF")]);
    h.save("short", &[("Genre", "Doc")]).await;
    assert_eq!(h.linked("Doc/b.txt"), Some(b));

    let outcome = h.save("long", &[("Genre", "Doc"), ("Format", "PDF")]).await;
    let SaveOutcome::Saved { superseded, .. } = outcome else {
        panic!("longer chain was rejected");
    };

    assert_eq!(superseded.len(), 1);
    assert_eq!(superseded[0].id, "short");
    let views = h.service.list_views(&h.workspace).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, "long");
    assert_eq!(h.linked("Doc/a.txt"), Some(a));
    assert_eq!(h.linked("Doc/PDF/b.txt"), Some(b));
    assert_eq!(h.linked("Doc/b.txt"), None);
}

#[tokio::test]
async fn test_unrelated_chains_coexist() {
    let h = Harness::new();
    h.file("a.txt", &[("Genre", "Doc")]);
    h.file("c.txt", &[("Genre", "Music")]);

    h.save("docs", &[("Genre", "Doc")]).await;
    assert!(h.save("music", &[("Genre", "Music")]).await.is_saved());

    assert_eq!(h.service.list_views(&h.workspace).await.unwrap().len(), 2);
    assert!(h.linked("Doc/a.txt").is_some());
    assert!(h.linked("Music/c.txt").is_some());
}

#[tokio::test]
async fn test_last_saved_view_owns_shared_file() {
    let h = Harness::new();
    let (_, x) = h.file("x.txt", &[("Project", "Alpha"), ("Owner", "Me")]);
    let (_, y) = h.file("y.txt", &[("Project", "Alpha")]);

    h.save("project", &[("Project", "Alpha")]).await;
    assert_eq!(h.linked("Alpha/x.txt"), Some(x));

    let SaveOutcome::Saved { report, .. } = h.save("owner", &[("Owner", "Me")]).await else {
        panic!("save was rejected");
    };

    assert_eq!(h.linked("Me/x.txt"), Some(x));
    assert_eq!(h.linked("Alpha/x.txt"), None);
    assert_eq!(h.linked("Alpha/y.txt"), Some(y));
    assert_eq!(report.exclusivity_removed, 1);
}

#[tokio::test]
async fn test_reconcile_removes_orphans_and_prunes() {
    let h = Harness::new();
    let (a_id, _) = h.file("a.txt", &[("Genre", "Doc"), ("Format", "PDF")]);
    let (b_id, b) = h.file("b.txt", &[("Genre", "Doc")]);
    h.save("docs", &[("Genre", "Doc"), ("Format", "PDF")]).await;
    assert!(h.linked("Doc/PDF/a.txt").is_some());

    let format = h.catalog.add_dimension("Format").unwrap();
    h.catalog.untag_file(&a_id, format.id).unwrap();
    h.catalog.set_eligible(&b_id, false).unwrap();
    h.fs.create_file("/ws/.linkview/stray.txt", b"stray").unwrap();

    let report = h.service.reconcile_workspace(&h.workspace).await.unwrap();

    assert_eq!(report.removed, 3);
    assert!(!h.fs.exists("/ws/.linkview/Doc/PDF"));
    assert!(!h.fs.exists("/ws/.linkview/Doc"));
    assert!(h.fs.exists(MARKER));
    assert!(h.snapshot().is_empty());
    // The source itself is never touched.
    assert_eq!(h.fs.identity("/ws/b.txt"), Some(b));
}

#[tokio::test]
async fn test_reconcile_clean_tree_is_a_no_op() {
    let h = Harness::new();
    h.file("a.txt", &[("Genre", "Doc")]);
    h.save("docs", &[("Genre", "Doc")]).await;
    let before = h.snapshot();

    let report = h.service.reconcile_workspace(&h.workspace).await.unwrap();
    assert_eq!(report.changes(), 0);
    assert_eq!(h.snapshot(), before);
}

#[tokio::test]
async fn test_thumbnail_folder_is_left_alone() {
    let h = Harness::new();
    h.file("a.txt", &[("Genre", "Doc")]);
    h.save("docs", &[("Genre", "Doc")]).await;
    h.fs.create_file("/ws/.linkview/.thumbnails/a.png", b"png").unwrap();

    h.service.reconcile_workspace(&h.workspace).await.unwrap();
    assert!(h.fs.exists("/ws/.linkview/.thumbnails/a.png"));
}

#[tokio::test]
async fn test_links_survive_copy_and_delete_move() {
    let h = Harness::new();
    let (id, old) = h.file("a.txt", &[("Genre", "Doc"), ("Format", "PDF")]);
    h.save("docs", &[("Genre", "Doc"), ("Format", "PDF")]).await;

    let capture = h
        .service
        .capture_before_move(&h.workspace, &id, Path::new("/ws/a.txt"))
        .await
        .unwrap();
    assert_eq!(capture.old_identity, old);
    assert_eq!(capture.link_paths, vec![PathBuf::from("/ws/.linkview/Doc/PDF/a.txt")]);

    // A move that copies and deletes gives the file a new inode.
    let content = h.fs.read("/ws/a.txt").unwrap();
    let new = h.fs.create_file("/ws/sorted/a.txt", &content).unwrap();
    h.fs.remove(Path::new("/ws/a.txt")).await.unwrap();
    h.catalog.set_path(&id, Path::new("/ws/sorted/a.txt")).unwrap();
    assert_ne!(new, old);

    let report = h
        .service
        .relink_after_move(&h.workspace, &capture, Path::new("/ws/sorted/a.txt"))
        .await
        .unwrap();

    assert_eq!(report.repaired, 1);
    assert_eq!(h.linked("Doc/PDF/a.txt"), Some(new));
    assert_eq!(h.fs.link_count(old), 0);

    // Nothing is stale afterwards.
    let report = h.service.reconcile_workspace(&h.workspace).await.unwrap();
    assert_eq!(report.removed, 0);
}

#[tokio::test]
async fn test_cross_device_relink_is_counted_as_failed() {
    let h = Harness::new();
    h.fs.mount("/archive", 7);
    let (id, _) = h.file("a.txt", &[("Genre", "Doc")]);
    h.save("docs", &[("Genre", "Doc")]).await;

    let capture = h
        .service
        .capture_before_move(&h.workspace, &id, Path::new("/ws/a.txt"))
        .await
        .unwrap();
    h.fs.move_file("/ws/a.txt", "/archive/a.txt").unwrap();

    let report = h
        .service
        .relink_after_move(&h.workspace, &capture, Path::new("/archive/a.txt"))
        .await
        .unwrap();
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_same_device_move_keeps_links() {
    let h = Harness::new();
    let (id, identity) = h.file("a.txt", &[("Genre", "Doc")]);
    h.save("docs", &[("Genre", "Doc")]).await;

    let capture = h
        .service
        .capture_before_move(&h.workspace, &id, Path::new("/ws/a.txt"))
        .await
        .unwrap();
    h.fs.move_file("/ws/a.txt", "/ws/sorted/a.txt").unwrap();

    let report = h
        .service
        .relink_after_move(&h.workspace, &capture, Path::new("/ws/sorted/a.txt"))
        .await
        .unwrap();
    assert_eq!(report.changes(), 0);
    assert_eq!(h.linked("Doc/a.txt"), Some(identity));
}

#[tokio::test]
async fn test_capture_of_unknown_file_fails() {
    let h = Harness::new();
    let err = h
        .service
        .capture_before_move(&h.workspace, "f999999", Path::new("/ws/a.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FileNotFound(_)));

    let (id, _) = h.file("a.txt", &[]);
    let err = h
        .service
        .capture_before_move(&h.workspace, &id, Path::new("/ws/gone.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FileNotFound(_)));
}

#[tokio::test]
async fn test_missing_source_is_skipped() {
    let h = Harness::new();
    h.file("a.txt", &[("Genre", "Doc")]);
    let ghost = h.catalog.add_file("ws", Path::new("/ws/ghost.txt"), None).unwrap();
    let genre = h.catalog.add_dimension("Genre").unwrap();
    h.catalog.tag_file(&ghost, genre.id, "Doc").unwrap();

    let SaveOutcome::Saved { report, .. } = h.save("docs", &[("Genre", "Doc")]).await else {
        panic!("save was rejected");
    };
    assert_eq!(report.skipped_missing, 1);
    assert_eq!(report.linked, 1);
    assert!(h.linked("Doc/ghost.txt").is_none());
}

#[tokio::test]
async fn test_name_collisions_get_numbered() {
    let h = Harness::new();
    let (_, first) = h.file("a/report.pdf", &[("Genre", "Doc")]);
    let (_, second) = h.file("b/report.pdf", &[("Genre", "Doc")]);

    h.save("docs", &[("Genre", "Doc")]).await;
    assert_eq!(h.linked("Doc/report.pdf"), Some(first));
    assert_eq!(h.linked("Doc/report (2).pdf"), Some(second));
}

#[tokio::test]
async fn test_views_sharing_a_folder_name_keep_both_files() {
    for order in [["genre", "kind"], ["kind", "genre"]] {
        let h = Harness::new();
        let (_, first) = h.file("a/report.pdf", &[("Genre", "Doc")]);
        let (_, second) = h.file("b/report.pdf", &[("Kind", "Doc")]);

        for id in order {
            let dimension = if id == "genre" { "Genre" } else { "Kind" };
            h.save(id, &[(dimension, "Doc")]).await;
        }

        assert_eq!(h.linked("Doc/report.pdf"), Some(first), "order {:?}", order);
        assert_eq!(h.linked("Doc/report (2).pdf"), Some(second), "order {:?}", order);
        assert_eq!(h.snapshot().len(), 2, "order {:?}", order);

        let settled = h.snapshot();
        h.service.materialize_all(&h.workspace).await.unwrap();
        assert_eq!(h.snapshot(), settled, "order {:?}", order);
        let report = h.service.reconcile_workspace(&h.workspace).await.unwrap();
        assert_eq!(report.removed, 0, "order {:?}", order);
    }
}

#[tokio::test]
async fn test_shared_folder_renames_existing_link_for_new_neighbour() {
    let h = Harness::new();
    let (_, kind) = h.file("a/report.pdf", &[("Kind", "Doc")]);
    let (_, genre) = h.file("z/report.pdf", &[("Genre", "Doc")]);
    h.save("genre", &[("Genre", "Doc")]).await;
    assert_eq!(h.linked("Doc/report.pdf"), Some(genre));

    // The Kind file has the lower id, so it takes the plain name.
    h.save("kind", &[("Kind", "Doc")]).await;

    assert_eq!(h.linked("Doc/report.pdf"), Some(kind));
    assert_eq!(h.linked("Doc/report (2).pdf"), Some(genre));
    assert_eq!(h.snapshot().len(), 2);
}

#[tokio::test]
async fn test_resave_with_new_chain_removes_old_tree() {
    let h = Harness::new();
    let (_, a) = h.file("a.txt", &[("Genre", "Doc"), ("Format", "PDF")]);
    h.file("c.txt", &[("Genre", "Doc")]);
    h.save("v", &[("Genre", "Doc")]).await;
    assert!(h.linked("Doc/a.txt").is_some());
    assert!(h.linked("Doc/c.txt").is_some());

    h.save("v", &[("Format", "PDF")]).await;
    h.service.reconcile_workspace(&h.workspace).await.unwrap();
    h.service.materialize_all(&h.workspace).await.unwrap();

    assert_eq!(
        paths(&h.snapshot()),
        vec![PathBuf::from("/ws/.linkview/PDF/a.txt")]
    );
    assert_eq!(h.linked("PDF/a.txt"), Some(a));
    assert!(!h.fs.exists("/ws/.linkview/Doc"));
    let views = h.catalog.list_views("ws").await.unwrap();
    assert_eq!(views.len(), 1);
    assert!(views[0].chain.same_as(&h.chain(&[("Format", "PDF")])));
}

#[tokio::test]
async fn test_reconcile_removes_links_outside_views_and_plans() {
    let h = Harness::new();
    let (_, a) = h.file("a.txt", &[("Genre", "Doc")]);
    h.save("docs", &[("Genre", "Doc")]).await;
    // A link nobody produced: not a view level and not a plan folder.
    h.fs.mkdir_all(Path::new("/ws/.linkview/Elsewhere")).await.unwrap();
    h.fs.hard_link(Path::new("/ws/a.txt"), Path::new("/ws/.linkview/Elsewhere/a.txt"))
        .await
        .unwrap();

    let report = h.service.reconcile_workspace(&h.workspace).await.unwrap();

    assert_eq!(report.removed, 1);
    assert!(!h.fs.exists("/ws/.linkview/Elsewhere"));
    assert_eq!(h.linked("Doc/a.txt"), Some(a));
}

#[tokio::test]
async fn test_delete_view_keeps_shared_directories() {
    let h = Harness::new();
    let (_, a) = h.file("a.txt", &[("Genre", "Doc"), ("Format", "PDF")]);
    let (_, b) = h.file("b.txt", &[("Genre", "Doc"), ("Format", "Word")]);
    h.save("pdf", &[("Genre", "Doc"), ("Format", "PDF")]).await;
    h.save("word", &[("Genre", "Doc"), ("Format", "Word")]).await;
    // Both views share "Doc"; each file stays at its deepest level only.
    assert_eq!(h.linked("Doc/PDF/a.txt"), Some(a));
    assert_eq!(h.linked("Doc/a.txt"), None);
    assert_eq!(h.linked("Doc/b.txt"), None);

    let report = h.service.delete_view(&h.workspace, "pdf").await.unwrap();

    assert_eq!(report.removed, 1);
    assert!(!h.fs.exists("/ws/.linkview/Doc/PDF"));
    assert_eq!(h.linked("Doc/Word/b.txt"), Some(b));
    assert_eq!(h.linked("Doc/PDF/a.txt"), None);
    assert_eq!(h.fs.identity("/ws/a.txt"), Some(a));
    assert!(h.catalog.get_view("ws", "pdf").await.unwrap().is_none());
}

#[tokio::test]
async fn test_materialize_all_restores_tree() {
    let h = Harness::new();
    let (_, a) = h.file("a.txt", &[("Genre", "Doc")]);
    let (_, c) = h.file("c.txt", &[("Genre", "Music")]);
    h.save("docs", &[("Genre", "Doc")]).await;
    h.save("music", &[("Genre", "Music")]).await;
    let before = h.snapshot();

    h.fs.remove(Path::new("/ws/.linkview/Doc/a.txt")).await.unwrap();
    h.fs.remove(Path::new("/ws/.linkview/Doc")).await.unwrap();
    h.fs.remove(Path::new(MARKER)).await.unwrap();

    let report = h.service.materialize_all(&h.workspace).await.unwrap();

    assert_eq!(report.linked, 1);
    assert_eq!(h.snapshot(), before);
    assert_eq!(h.linked("Doc/a.txt"), Some(a));
    assert_eq!(h.linked("Music/c.txt"), Some(c));
    assert!(h.fs.exists(MARKER));
}

#[tokio::test]
async fn test_read_only_workspace_is_a_setup_error() {
    let h = Harness::new();
    h.file("a.txt", &[("Genre", "Doc")]);
    h.fs.set_read_only("/ws");

    let view = ViewDefinition::new("docs", "ws", "Docs", h.chain(&[("Genre", "Doc")]));
    let err = h.service.save_view(&h.workspace, view).await.unwrap_err();
    assert!(matches!(err, EngineError::Setup { .. }));
}

#[tokio::test]
async fn test_generate_nested_plan() {
    let h = Harness::new();
    let (a_id, a) = h.file("a.txt", &[]);
    let (b_id, b) = h.file("b.txt", &[]);
    let tree = vec![PlanNode::new("Finance").with_children(vec![PlanNode::new("2024")])];
    let assignments = vec![
        FileAssignment::new(&a_id, ["Finance", "2024"]),
        FileAssignment::new(&a_id, ["Finance"]),
        FileAssignment::new(&b_id, ["Finance"]),
        FileAssignment::new("f999999", ["Finance"]),
    ];

    let outcome = h
        .service
        .generate_from_plan(&h.workspace, &tree, &assignments, PlanOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.linked_count, 2);
    assert_eq!(outcome.report.skipped_missing, 1);
    assert_eq!(h.linked("Finance/2024/a.txt"), Some(a));
    assert_eq!(h.linked("Finance/a.txt"), None);
    assert_eq!(h.linked("Finance/b.txt"), Some(b));

    // Plan output survives reconciliation while its files stay eligible.
    h.service.reconcile_workspace(&h.workspace).await.unwrap();
    assert_eq!(h.linked("Finance/2024/a.txt"), Some(a));
}

#[tokio::test]
async fn test_generate_flattened_plan() {
    let h = Harness::new();
    let (a_id, a) = h.file("a.txt", &[]);
    let (b_id, b) = h.file("nested/b.txt", &[]);
    let tree = vec![PlanNode::new("Finance")];
    let assignments = vec![
        FileAssignment::new(&a_id, ["Finance"]),
        FileAssignment::new(&b_id, Vec::<String>::new()),
    ];

    let outcome = h
        .service
        .generate_from_plan(&h.workspace, &tree, &assignments, PlanOptions { flatten: true })
        .await
        .unwrap();

    assert_eq!(outcome.linked_count, 2);
    assert_eq!(h.linked("a.txt"), Some(a));
    assert_eq!(h.linked("b.txt"), Some(b));
    assert!(!h.fs.exists("/ws/.linkview/Finance"));
}

#[tokio::test]
async fn test_invalid_plan_changes_nothing() {
    let h = Harness::new();
    let tree = vec![PlanNode::new("../escape")];
    let err = h
        .service
        .generate_from_plan(&h.workspace, &tree, &[], PlanOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPlan(_)));
    assert!(h.snapshot().is_empty());
}

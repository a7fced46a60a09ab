//! Reference graph sync and backlink accounting

use super::{doc, test_db};
use crate::extract::LinkType;
use crate::graph::LinkGraphService;

#[test]
fn test_sync_creates_references_and_counters() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);

    let result = graph
        .sync("page", "page-a", "See [[Page B]] and ((block-9)).")
        .unwrap();
    assert_eq!(result.created, 2);
    assert_eq!(result.updated, 0);
    assert_eq!(result.deleted, 0);

    assert_eq!(db.reference_count().unwrap(), 2);
    assert_eq!(db.incoming_count_total().unwrap(), 2);

    let backlinks = graph.backlinks("page", "Page B").unwrap();
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0].source_id, "page-a");
    assert_eq!(backlinks[0].link_type, LinkType::PageReference);

    let block_backlinks = graph.backlinks("block", "block-9").unwrap();
    assert_eq!(block_backlinks.len(), 1);
    assert_eq!(block_backlinks[0].link_type, LinkType::BlockReference);
}

#[test]
fn test_resync_identical_text_is_noop() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);
    let text = "Link to [[Page B]] here.";

    graph.sync("page", "page-a", text).unwrap();
    let second = graph.sync("page", "page-a", text).unwrap();
    assert!(second.is_noop());
    assert_eq!(db.reference_count().unwrap(), 1);
    assert_eq!(db.incoming_count_total().unwrap(), 1);
}

#[test]
fn test_resync_removes_vanished_reference() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);

    graph
        .sync("page", "page-a", "[[Page B]] and [[Page C]]")
        .unwrap();
    let result = graph.sync("page", "page-a", "[[Page C]]").unwrap();

    // Page C moved to position 0, so it is recreated under the new key.
    assert_eq!(result.deleted, 2);
    assert_eq!(result.created, 1);
    assert!(graph.backlinks("page", "Page B").unwrap().is_empty());
    assert_eq!(graph.backlinks("page", "Page C").unwrap().len(), 1);
    assert_eq!(db.incoming_count_total().unwrap(), 1);
}

#[test]
fn test_alias_change_updates_in_place() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);

    graph.sync("page", "page-a", "[[Page B|first]]").unwrap();
    let result = graph.sync("page", "page-a", "[[Page B|other]]").unwrap();

    assert_eq!(result.updated, 1);
    assert_eq!(result.created, 0);
    assert_eq!(result.deleted, 0);

    let backlinks = graph.backlinks("page", "Page B").unwrap();
    assert_eq!(backlinks[0].display_text.as_deref(), Some("other"));
    assert_eq!(backlinks[0].link_type, LinkType::Alias);
}

#[test]
fn test_references_inside_code_fences_ignored() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);

    let text = "before [[Visible]]\n```\n[[Hidden]]\n```\nafter";
    let result = graph.sync("page", "page-a", text).unwrap();

    assert_eq!(result.created, 1);
    assert_eq!(graph.backlinks("page", "Visible").unwrap().len(), 1);
    assert!(graph.backlinks("page", "Hidden").unwrap().is_empty());
}

#[test]
fn test_delete_source_cascades_both_directions() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);

    graph.sync("page", "page-a", "[[page-b]]").unwrap();
    graph.sync("page", "page-c", "[[page-a]]").unwrap();

    let removed = graph.delete_source("page", "page-a").unwrap();
    assert_eq!(removed, 2);
    assert_eq!(db.reference_count().unwrap(), 0);
    assert_eq!(db.incoming_count_total().unwrap(), 0);
    assert!(graph.backlinks("page", "page-b").unwrap().is_empty());
}

#[test]
fn test_backlink_accounting_invariant_holds_across_operations() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);

    graph
        .sync("page", "page-a", "[[page-b]] [[page-c]] ((block-1))")
        .unwrap();
    graph.sync("page", "page-b", "[[page-c]]").unwrap();
    graph.sync("page", "page-a", "[[page-b]]").unwrap();
    graph.delete_source("page", "page-c").unwrap();

    assert_eq!(
        db.reference_count().unwrap(),
        db.incoming_count_total().unwrap()
    );
}

#[test]
fn test_orphans_are_indexed_units_without_backlinks() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);

    db.rebuild_documents(&[
        doc("page-a", "page", "A", "links out"),
        doc("page-b", "page", "B", "gets linked"),
    ])
    .unwrap();
    graph.sync("page", "page-a", "see [[page-b]]").unwrap();

    assert_eq!(graph.orphans("page").unwrap(), vec!["page-a".to_string()]);
}

#[test]
fn test_orphan_appears_after_reference_removed() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);

    db.rebuild_documents(&[
        doc("page-a", "page", "A", "a"),
        doc("page-b", "page", "B", "b"),
    ])
    .unwrap();
    graph.sync("page", "page-a", "[[page-b]]").unwrap();
    assert!(!graph.orphans("page").unwrap().contains(&"page-b".to_string()));

    graph.sync("page", "page-a", "no more links").unwrap();
    assert!(graph.orphans("page").unwrap().contains(&"page-b".to_string()));
}

#[test]
fn test_popular_targets_ordering() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);

    graph.sync("page", "p1", "[[hub]] [[minor]]").unwrap();
    graph.sync("page", "p2", "[[hub]]").unwrap();
    graph.sync("page", "p3", "[[hub]]").unwrap();

    let popular = graph.popular_targets(10).unwrap();
    assert_eq!(popular[0], ("page".to_string(), "hub".to_string(), 3));
    assert_eq!(popular[1].2, 1);
}

#[test]
fn test_dangling_targets_have_no_document() {
    let db = test_db();
    let graph = LinkGraphService::new(&db);

    db.rebuild_documents(&[doc("page-b", "page", "B", "exists")])
        .unwrap();
    graph.sync("page", "page-a", "[[page-b]] [[ghost]]").unwrap();

    assert_eq!(
        graph.dangling_targets().unwrap(),
        vec![("page".to_string(), "ghost".to_string())]
    );
}

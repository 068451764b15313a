//! End-to-end resolution scenarios.
//!
//! These tests drive full stacks of holders and groups through the
//! public query surface: local resolution, inheritance, context
//! filtering, and export.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use stratum_core::{
    Contexts, HolderEvent, ChannelEventSink, MapGroupLookup, Node, PermissionHolder, Tristate,
};
use stratum_config::ResolverConfig;
use tokio::task::JoinSet;

mod common;
use common::{deny, grant, holder, lookup_of, universe};

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[tokio::test]
async fn direct_grant_is_exported() {
    let user = holder("user");
    user.set_permission(grant("a.b")).await.unwrap();

    let lookup = MapGroupLookup::new();
    let perms = user
        .export_nodes(&lookup, &Contexts::allow_all(), &[], false)
        .await;
    assert_eq!(perms.get("a.b"), Some(&true));
}

#[tokio::test]
async fn local_deny_overrides_inherited_allow() {
    let group = holder("g");
    group.set_permission(grant("a.b")).await.unwrap();

    let user = holder("user");
    user.set_permission(grant("group.g")).await.unwrap();
    user.set_permission(deny("a.b")).await.unwrap();

    let lookup = lookup_of(&[&group]);
    let perms = user
        .export_nodes(&lookup, &Contexts::allow_all(), &[], false)
        .await;
    assert_eq!(perms.get("a.b"), Some(&false));
}

#[tokio::test]
async fn wildcard_fans_out_over_the_universe() {
    let user = holder("user");
    user.set_permission(grant("*")).await.unwrap();

    let lookup = MapGroupLookup::new();
    let possible = universe(&["x", "y", "z"]);
    let perms = user
        .export_nodes(&lookup, &Contexts::allow_all(), &possible, false)
        .await;

    for key in ["x", "y", "z"] {
        assert_eq!(perms.get(key), Some(&true), "missing fan-out for {key}");
    }
}

#[tokio::test]
async fn expired_node_is_audited_away() {
    let (sink, mut rx) = ChannelEventSink::pair();
    let user = PermissionHolder::group("user", ResolverConfig::default(), sink);

    let stale = Node::builder("a.b").expiry(now() - 1).build().unwrap();
    user.set_permission(stale.clone()).await.unwrap();
    rx.try_recv().unwrap(); // consume the set event

    assert!(user.audit_temporary_permissions().await);
    assert!(matches!(
        rx.try_recv().unwrap(),
        HolderEvent::PermissionNodeExpire { .. }
    ));
    assert_eq!(user.has_permission(&stale, false).await, Tristate::Undefined);

    // Auditing is idempotent: a second call has nothing to do.
    assert!(!user.audit_temporary_permissions().await);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn inheritance_cycle_terminates_and_yields_both_nodes() {
    let g1 = holder("g1");
    let g2 = holder("g2");
    g1.set_permission(grant("one")).await.unwrap();
    g1.set_permission(grant("group.g2")).await.unwrap();
    g2.set_permission(grant("two")).await.unwrap();
    g2.set_permission(grant("group.g1")).await.unwrap();

    let lookup = lookup_of(&[&g1, &g2]);
    let all = g1.get_all_nodes(&lookup, None, &Contexts::allow_all()).await;

    let ones = all.iter().filter(|ln| ln.node().permission() == "one").count();
    let twos = all.iter().filter(|ln| ln.node().permission() == "two").count();
    assert_eq!((ones, twos), (1, 1));
}

#[tokio::test]
async fn server_scoped_node_requires_matching_server() {
    let user = holder("user");
    user.set_permission(Node::builder("a").server("s1").build().unwrap())
        .await
        .unwrap();

    let lookup = MapGroupLookup::new();

    // include_global only rescues unscoped nodes; a server mismatch is
    // strict.
    let ctx = Contexts::of_scope(Some("s2"), None, true);
    let perms = user.export_nodes(&lookup, &ctx, &[], false).await;
    assert_eq!(perms.get("a"), None);

    let ctx = Contexts::of_scope(Some("s1"), None, true);
    let perms = user.export_nodes(&lookup, &ctx, &[], false).await;
    assert_eq!(perms.get("a"), Some(&true));
}

#[tokio::test]
async fn global_apply_flag_gates_unscoped_nodes() {
    let user = holder("user");
    user.set_permission(grant("a")).await.unwrap();

    let lookup = MapGroupLookup::new();

    let included = user
        .get_all_nodes_filtered(&lookup, &Contexts::of_scope(Some("s1"), None, true))
        .await;
    assert_eq!(included.len(), 1);

    let excluded = user
        .get_all_nodes_filtered(&lookup, &Contexts::of_scope(Some("s1"), None, false))
        .await;
    assert!(excluded.is_empty());
}

#[tokio::test]
async fn filtered_output_never_repeats_a_permission() {
    let parent = holder("parent");
    parent.set_permission(grant("a.b")).await.unwrap();
    parent
        .set_permission(Node::builder("c").server("s1").build().unwrap())
        .await
        .unwrap();

    let user = holder("user");
    user.set_permission(grant("group.parent")).await.unwrap();
    user.set_permission(deny("a.b")).await.unwrap();
    user.set_permission(Node::builder("c").value(false).build().unwrap())
        .await
        .unwrap();
    user.set_transient_permission(grant("d")).await.unwrap();

    let lookup = lookup_of(&[&parent]);
    for ctx in [
        Contexts::allow_all(),
        Contexts::of_scope(Some("s1"), None, true),
        Contexts::of_scope(Some("s1"), Some("w1"), true),
    ] {
        let filtered = user.get_all_nodes_filtered(&lookup, &ctx).await;
        let mut seen = HashSet::new();
        for ln in &filtered {
            assert!(
                seen.insert(ln.node().permission().to_string()),
                "duplicate permission {} under {ctx:?}",
                ln.node().permission()
            );
        }
    }
}

#[tokio::test]
async fn merge_temp_retains_the_highest_priority_duplicate() {
    let user = holder("user");
    let permanent = grant("a.b");
    let temporary = Node::builder("a.b").expiry(now() + 3600).build().unwrap();
    user.set_nodes(HashSet::from([permanent.clone(), temporary.clone()]))
        .await;

    let merged = user.get_permissions(true).await;
    assert_eq!(merged.len(), 1);
    let retained = merged.iter().next().unwrap();
    assert_eq!(retained.node(), &temporary);

    // The retained node outranks the shadowed one.
    assert_eq!(
        stratum_core::priority_cmp(retained.node(), &permanent),
        std::cmp::Ordering::Greater
    );
}

#[tokio::test]
async fn world_scoping_composes_with_server_scoping() {
    let user = holder("user");
    user.set_permission(
        Node::builder("w")
            .server("s1")
            .world("nether")
            .build()
            .unwrap(),
    )
    .await
    .unwrap();
    user.set_permission(grant("global")).await.unwrap();

    let lookup = MapGroupLookup::new();

    let perms = user
        .export_nodes(
            &lookup,
            &Contexts::of_scope(Some("s1"), Some("nether"), true),
            &[],
            false,
        )
        .await;
    assert_eq!(perms.get("w"), Some(&true));
    assert_eq!(perms.get("global"), Some(&true));

    let perms = user
        .export_nodes(
            &lookup,
            &Contexts::of_scope(Some("s1"), Some("overworld"), true),
            &[],
            false,
        )
        .await;
    assert_eq!(perms.get("w"), None);
}

#[tokio::test]
async fn regex_server_matcher_applies_when_enabled() {
    let user = holder("user");
    user.set_permission(
        Node::builder("lobby.perm")
            .server("R=lobby-\\d+")
            .build()
            .unwrap(),
    )
    .await
    .unwrap();

    let lookup = MapGroupLookup::new();
    let perms = user
        .export_nodes(
            &lookup,
            &Contexts::of_scope(Some("lobby-7"), None, true),
            &[],
            false,
        )
        .await;
    assert_eq!(perms.get("lobby.perm"), Some(&true));

    let perms = user
        .export_nodes(
            &lookup,
            &Contexts::of_scope(Some("survival"), None, true),
            &[],
            false,
        )
        .await;
    assert_eq!(perms.get("lobby.perm"), None);
}

#[tokio::test]
async fn deep_inheritance_chain_resolves_transitively() {
    let top = holder("top");
    top.set_permission(grant("root.perm")).await.unwrap();

    let mid = holder("mid");
    mid.set_permission(grant("group.top")).await.unwrap();
    mid.set_permission(grant("mid.perm")).await.unwrap();

    let user = holder("user");
    user.set_permission(grant("group.mid")).await.unwrap();

    let lookup = lookup_of(&[&top, &mid]);
    let perms = user
        .export_nodes(&lookup, &Contexts::allow_all(), &[], false)
        .await;

    assert_eq!(perms.get("root.perm"), Some(&true));
    assert_eq!(perms.get("mid.perm"), Some(&true));
    // Membership nodes are exported too.
    assert_eq!(perms.get("group.mid"), Some(&true));
    assert_eq!(perms.get("group.top"), Some(&true));
}

#[tokio::test]
async fn concurrent_readers_and_writers_stay_consistent() {
    let user = holder("user");
    user.set_permission(grant("stable.perm")).await.unwrap();
    let lookup = Arc::new(MapGroupLookup::new());

    let mut tasks = JoinSet::new();

    for i in 0..8 {
        let user = Arc::clone(&user);
        let lookup = Arc::clone(&lookup);
        tasks.spawn(async move {
            for _ in 0..50 {
                let perms = user
                    .export_nodes(&*lookup, &Contexts::allow_all(), &[], false)
                    .await;
                // The stable node is visible in every snapshot.
                assert_eq!(perms.get("stable.perm"), Some(&true));
            }
            i
        });
    }

    {
        let user = Arc::clone(&user);
        tasks.spawn(async move {
            for round in 0..50 {
                let node = Node::builder(format!("churn.{round}")).build().unwrap();
                user.set_permission(node.clone()).await.unwrap();
                user.unset_permission(&node).await.unwrap();
            }
            99
        });
    }

    while let Some(result) = tasks.join_next().await {
        result.expect("resolution task panicked");
    }

    // Churn left no residue behind.
    assert_eq!(user.get_permissions(false).await.len(), 1);
}

// Target discovery, auto-attach handshakes, filtering, and the
// attach-to-available end-to-end flow.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{settle, until, Harness};
use serde_json::json;
use tabwire::{
    FrameManager, Page, SessionEvent, TargetEvent, TargetManager, TargetType,
};

fn drain<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn deliver_target_created(harness: &Harness, target_id: &str, kind: &str, url: &str) {
    harness.deliver(json!({
        "method": "Target.targetCreated",
        "params": {
            "targetInfo": {
                "targetId": target_id,
                "type": kind,
                "url": url,
                "title": "",
                "attached": false,
            }
        },
    }));
}

fn manager_rules(harness: &Harness) {
    harness.respond("Target.setDiscoverTargets", json!({}));
    harness.respond("Target.setAutoAttach", json!({}));
    harness.respond("Runtime.runIfWaitingForDebugger", json!({}));
    harness.respond("Target.detachFromTarget", json!({}));
}

#[tokio::test]
async fn attach_makes_target_available_exactly_once() {
    let harness = Harness::new();
    manager_rules(&harness);
    let manager = TargetManager::new(harness.connection.clone(), None);
    let mut events = manager.subscribe();
    manager.initialize().await.unwrap();

    deliver_target_created(&harness, "T1", "page", "https://example.com/");
    harness.deliver_attached("S1", "T1", "page", "https://example.com/", None);

    let target = until(|| manager.target("T1")).await.expect("target attached");
    assert_eq!(target.kind(), TargetType::Page);
    assert_eq!(target.url(), "https://example.com/");
    assert!(target.session().is_some());

    // A second session attaching to the same target links up but must not
    // re-announce availability.
    harness.deliver_attached("S2", "T1", "page", "https://example.com/", None);
    settle().await;

    let mut discovered = 0;
    let mut available = 0;
    for event in drain(&mut events) {
        match event {
            TargetEvent::Discovered(info) => {
                assert_eq!(info.target_id, "T1");
                discovered += 1;
            }
            TargetEvent::Available(target) => {
                assert_eq!(target.target_id(), "T1");
                available += 1;
            }
            _ => {}
        }
    }
    assert_eq!(discovered, 1);
    assert_eq!(available, 1, "availability re-fired on re-attach");

    let session2 = harness.connection.session("S2").unwrap();
    assert!(session2.target().is_some(), "second session not linked");
}

#[tokio::test]
async fn initialize_waits_for_preexisting_targets() {
    let harness = Harness::new();
    manager_rules(&harness);
    let manager = TargetManager::new(harness.connection.clone(), None);

    // The browser already has a page before initialize is called.
    deliver_target_created(&harness, "T1", "page", "https://example.com/");
    settle().await;

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.initialize().await })
    };
    harness.wait_for_command("Target.setAutoAttach").await;
    settle().await;
    assert!(
        !pending.is_finished(),
        "initialize resolved before the existing target attached"
    );

    harness.deliver_attached("S1", "T1", "page", "https://example.com/", None);
    tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("initialize never resolved")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn auto_attach_filter_excludes_top_level_pages() {
    let harness = Harness::new();
    manager_rules(&harness);
    let manager = TargetManager::new(harness.connection.clone(), None);
    manager.initialize().await.unwrap();

    let command = harness.wait_for_command("Target.setAutoAttach").await;
    let filter = command["params"]["filter"].as_array().unwrap();
    assert_eq!(filter[0], json!({"type": "page", "exclude": true}));
    assert_eq!(*filter.last().unwrap(), json!({}));
    assert_eq!(command["params"]["flatten"], true);
    assert_eq!(command["params"]["waitForDebuggerOnStart"], true);
}

#[tokio::test]
async fn service_workers_are_detached_but_exposed() {
    let harness = Harness::new();
    manager_rules(&harness);
    let manager = TargetManager::new(harness.connection.clone(), None);
    let mut events = manager.subscribe();
    manager.initialize().await.unwrap();

    deliver_target_created(&harness, "W1", "service_worker", "https://example.com/sw.js");
    harness.deliver_attached("SW1", "W1", "service_worker", "https://example.com/sw.js", None);

    let target = until(|| manager.target("W1")).await.expect("worker exposed");
    assert_eq!(target.kind(), TargetType::ServiceWorker);
    assert!(target.session().is_none(), "worker session must not be held");

    // Let-it-run, then detach through the parent channel.
    let run = harness.wait_for_command("Runtime.runIfWaitingForDebugger").await;
    assert_eq!(run["sessionId"], "SW1");
    let detach = harness.wait_for_command("Target.detachFromTarget").await;
    assert_eq!(detach["params"]["sessionId"], "SW1");
    assert!(detach.get("sessionId").is_none(), "detach must go via the root");

    // Destruction is the only "gone" signal for silently-detached workers.
    harness.deliver(json!({
        "method": "Target.targetDestroyed",
        "params": {"targetId": "W1"},
    }));
    let gone = until(|| {
        drain(&mut events).into_iter().find_map(|event| match event {
            TargetEvent::Gone(target) => Some(target.target_id()),
            _ => None,
        })
    })
    .await;
    assert_eq!(gone.as_deref(), Some("W1"));
    assert!(manager.target("W1").is_none());
}

#[tokio::test]
async fn filtered_targets_are_silently_detached() {
    let harness = Harness::new();
    manager_rules(&harness);
    let filter: tabwire::TargetFilter = Arc::new(|info| !info.url.contains("blocked"));
    let manager = TargetManager::new(harness.connection.clone(), Some(filter));
    let mut events = manager.subscribe();
    manager.initialize().await.unwrap();

    deliver_target_created(&harness, "T9", "other", "https://blocked.example/");
    harness.deliver_attached("S9", "T9", "other", "https://blocked.example/", None);

    let detach = harness.wait_for_command("Target.detachFromTarget").await;
    assert_eq!(detach["params"]["sessionId"], "S9");
    settle().await;

    assert!(manager.target("T9").is_none());
    let available: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, TargetEvent::Available(_)))
        .collect();
    assert!(available.is_empty(), "filtered target became available");
}

#[tokio::test]
async fn url_change_emits_target_changed() {
    let harness = Harness::new();
    manager_rules(&harness);
    let manager = TargetManager::new(harness.connection.clone(), None);
    let mut events = manager.subscribe();
    manager.initialize().await.unwrap();

    harness.deliver_attached("S1", "T1", "page", "https://example.com/a", None);
    until(|| manager.target("T1")).await.unwrap();
    drain(&mut events);

    // Title-only change: stored info updates, no event.
    harness.deliver(json!({
        "method": "Target.targetInfoChanged",
        "params": {
            "targetInfo": {
                "targetId": "T1", "type": "page",
                "url": "https://example.com/a", "title": "New title", "attached": true,
            }
        },
    }));
    settle().await;
    assert!(drain(&mut events)
        .iter()
        .all(|event| !matches!(event, TargetEvent::Changed { .. })));

    harness.deliver(json!({
        "method": "Target.targetInfoChanged",
        "params": {
            "targetInfo": {
                "targetId": "T1", "type": "page",
                "url": "https://example.com/b", "title": "New title", "attached": true,
            }
        },
    }));
    let changed = until(|| {
        drain(&mut events).into_iter().find_map(|event| match event {
            TargetEvent::Changed {
                target,
                previous_url,
            } => Some((target.url(), previous_url)),
            _ => None,
        })
    })
    .await
    .expect("Changed event");
    assert_eq!(changed.0, "https://example.com/b");
    assert_eq!(changed.1, "https://example.com/a");
}

#[tokio::test]
async fn detach_unlinks_child_and_emits_gone() {
    let harness = Harness::new();
    manager_rules(&harness);
    let manager = TargetManager::new(harness.connection.clone(), None);
    let mut events = manager.subscribe();
    manager.initialize().await.unwrap();

    harness.deliver_attached("S1", "T1", "page", "https://example.com/", None);
    let parent = until(|| manager.target("T1")).await.unwrap();

    // A child iframe target attaches under S1.
    harness.deliver_attached("S2", "T2", "iframe", "https://frame.example/", Some("S1"));
    let child = until(|| manager.target("T2")).await.unwrap();
    assert_eq!(parent.child_targets().len(), 1);

    harness.deliver(json!({
        "method": "Target.detachedFromTarget",
        "params": {"sessionId": "S2"},
        "sessionId": "S1",
    }));
    let gone = until(|| {
        drain(&mut events).into_iter().find_map(|event| match event {
            TargetEvent::Gone(target) => Some(target.target_id()),
            _ => None,
        })
    })
    .await;
    assert_eq!(gone.as_deref(), Some("T2"));
    assert!(manager.target("T2").is_none());
    assert!(parent.child_targets().is_empty());
    assert_eq!(
        child.initialized().await,
        tabwire::InitializationStatus::Success,
        "already-successful initialization must stay terminal"
    );
}

#[tokio::test]
async fn prerender_activation_notifies_parent_session_of_swap() {
    let harness = Harness::new();
    manager_rules(&harness);
    let manager = TargetManager::new(harness.connection.clone(), None);
    manager.initialize().await.unwrap();

    harness.deliver_attached("S1", "T1", "page", "https://example.com/", None);
    until(|| manager.target("T1")).await.unwrap();
    let session1 = harness.connection.session("S1").unwrap();
    let mut session1_events = session1.subscribe();

    // A prerendered page target attaches as a child of the page session.
    harness.deliver(json!({
        "method": "Target.attachedToTarget",
        "params": {
            "sessionId": "S2",
            "targetInfo": {
                "targetId": "T2", "type": "page", "subtype": "prerender",
                "url": "https://example.com/next", "title": "", "attached": true,
            },
            "waitingForDebugger": false,
        },
        "sessionId": "S1",
    }));
    until(|| manager.target("T2")).await.unwrap();

    // Activation: the prerender subtype clears.
    harness.deliver(json!({
        "method": "Target.targetInfoChanged",
        "params": {
            "targetInfo": {
                "targetId": "T2", "type": "page",
                "url": "https://example.com/next", "title": "", "attached": true,
            }
        },
    }));

    let swapped = until(|| {
        while let Ok(event) = session1_events.try_recv() {
            if let SessionEvent::Swapped(session) = event {
                return Some(session.id().to_string());
            }
        }
        None
    })
    .await;
    assert_eq!(swapped.as_deref(), Some("S2"));
}

#[tokio::test]
async fn end_to_end_attach_then_frame_handshake() {
    let harness = Harness::new();
    manager_rules(&harness);
    harness.respond_page_handshake("F1", "https://example.com/");

    let manager = TargetManager::new(harness.connection.clone(), None);
    let mut events = manager.subscribe();
    manager.initialize().await.unwrap();

    harness.deliver_attached("S1", "T1", "page", "https://example.com/", None);
    let target = until(|| manager.target("T1")).await.unwrap();
    let available = until(|| {
        drain(&mut events).into_iter().find_map(|event| match event {
            TargetEvent::Available(target) => Some(target.target_id()),
            _ => None,
        })
    })
    .await;
    assert_eq!(available.as_deref(), Some("T1"));

    let session = harness.connection.session("S1").unwrap();
    let frame_manager = FrameManager::new(Arc::clone(&session));
    frame_manager.initialize(&session).await.unwrap();
    assert_eq!(frame_manager.main_frame().unwrap().id(), "F1");
    assert_eq!(target.initialized().await, tabwire::InitializationStatus::Success);
}

#[tokio::test]
async fn page_wraps_an_available_target() {
    let harness = Harness::new();
    manager_rules(&harness);
    harness.respond_page_handshake("F1", "https://example.com/");

    let manager = TargetManager::new(harness.connection.clone(), None);
    manager.initialize().await.unwrap();
    harness.deliver_attached("S1", "T1", "page", "https://example.com/", None);
    let target = until(|| manager.target("T1")).await.unwrap();

    let page = Page::create(Arc::clone(&target)).await.unwrap();
    assert_eq!(page.main_frame().unwrap().id(), "F1");

    let goto = {
        let url = "https://example.com/next".to_string();
        tokio::spawn(async move { page.goto(&url).await })
    };
    let command = harness.wait_for_command("Page.navigate").await;
    assert_eq!(command["sessionId"], "S1");
    harness.deliver(json!({
        "id": command["id"],
        "sessionId": "S1",
        "result": {"frameId": "F1", "loaderId": "L2"},
    }));
    let result = goto.await.unwrap().unwrap();
    assert_eq!(result["loaderId"], "L2");
}

//! Behavioural guarantees of capture + resolution over in-memory pages.

use std::sync::Arc;
use std::time::Duration;

use action_locator::{
    capture_target, CandidateScorer, CaptureOptions, LocatorEngine, MatchSource, PageSession,
    ResolveFailure, ResolveOptions, ResolveStatus, Resolution,
};
use nexaura_core_types::{AncestorSegment, Fingerprint, FrameInfo, StepAction, Target};
use perceiver_structural::{
    DocumentSnapshot, DomTree, MemoryDom, MutationHub, MutationRecord, NodeId, NodeSpec,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn dom(root: NodeSpec) -> MemoryDom {
    MemoryDom::new(DocumentSnapshot::new("https://app.example/board", root)).unwrap()
}

fn page(dom: MemoryDom) -> PageSession {
    PageSession::new(Arc::new(dom))
}

fn shell(children: Vec<NodeSpec>) -> NodeSpec {
    NodeSpec::new("html")
        .rect(0.0, 0.0, 1024.0, 768.0)
        .child(NodeSpec::new("body").rect(0.0, 0.0, 1024.0, 768.0).children(children))
}

fn node_with_text(tree: &dyn DomTree, tag: &str, text: &str) -> NodeId {
    tree.query(&|n| tree.tag_name(n).as_deref() == Some(tag) && tree.inner_text(n) == text)[0]
}

fn capture(tree: &MemoryDom, node: NodeId) -> Target {
    capture_target(tree, node, FrameInfo::default(), &CaptureOptions::default()).unwrap()
}

async fn resolve(page: &PageSession, target: &Target, options: &ResolveOptions) -> Resolution {
    LocatorEngine::new()
        .resolve(page, target, options, &CancellationToken::new())
        .await
}

fn resolved_node(resolution: &Resolution) -> NodeId {
    assert_eq!(resolution.status, ResolveStatus::Success, "{:?}", resolution.debug);
    resolution.element.as_ref().unwrap().node
}

fn toolbar(button: NodeSpec) -> NodeSpec {
    shell(vec![
        NodeSpec::new("header").rect(0.0, 0.0, 1024.0, 60.0).children([
            NodeSpec::new("a").attr("href", "/").text("Home").rect(10.0, 10.0, 60.0, 20.0),
            NodeSpec::new("a").attr("href", "/docs").text("Docs").rect(80.0, 10.0, 60.0, 20.0),
        ]),
        NodeSpec::new("main").rect(0.0, 60.0, 1024.0, 600.0).child(
            NodeSpec::new("section").class("toolbar").rect(0.0, 60.0, 1024.0, 50.0).children([
                NodeSpec::new("input")
                    .id("search-box")
                    .attr("type", "text")
                    .attr("placeholder", "Search")
                    .rect(10.0, 70.0, 300.0, 30.0),
                button,
            ]),
        ),
    ])
}

#[tokio::test(start_paused = true)]
async fn scoring_is_deterministic() {
    let tree = dom(toolbar(
        NodeSpec::new("button").id("go").class("btn").text("Search").rect(320.0, 70.0, 80.0, 30.0),
    ));
    let button = tree.by_id("go").unwrap();
    let target = capture(&tree, button);
    let scorer = CandidateScorer::default().with_action(Some(StepAction::Click));
    let first = scorer.score(&tree, button, &target);
    for _ in 0..10 {
        assert_eq!(scorer.score(&tree, button, &target), first);
    }

    let page = page(tree);
    let a = resolve(&page, &target, &ResolveOptions::default()).await;
    let b = resolve(&page, &target, &ResolveOptions::default()).await;
    assert_eq!(resolved_node(&a), resolved_node(&b));
    assert_eq!(a.element.unwrap().score, b.element.unwrap().score);
}

#[tokio::test(start_paused = true)]
async fn captured_target_resolves_to_the_same_element() {
    let tree = Arc::new(dom(toolbar(
        NodeSpec::new("button")
            .id("go")
            .class("btn btn-primary")
            .attr("data-testid", "search-go")
            .text("Search")
            .rect(320.0, 70.0, 80.0, 30.0),
    )));
    let page = PageSession::new(Arc::clone(&tree) as Arc<dyn DomTree>);
    for tag in ["button", "input", "a"] {
        let nodes = tree.query_selector_all(tag).unwrap();
        for node in nodes {
            let target = capture(&tree, node);
            let resolution = resolve(&page, &target, &ResolveOptions::default()).await;
            assert_eq!(resolved_node(&resolution), node, "{} did not round-trip", tag);
            assert_eq!(resolution.attempts, 1);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn survives_id_and_class_churn() {
    let recorded = dom(toolbar(
        NodeSpec::new("button")
            .id("go")
            .class("btn btn-primary")
            .attr("data-testid", "search-go")
            .text("Search")
            .rect(320.0, 70.0, 80.0, 30.0),
    ));
    let target = capture(&recorded, recorded.by_id("go").unwrap());

    let live = dom(toolbar(
        NodeSpec::new("div").class("wrap").rect(320.0, 70.0, 90.0, 30.0).child(
            NodeSpec::new("button")
                .id("btn-8812345")
                .class("cta")
                .text("Search")
                .rect(322.0, 70.0, 80.0, 30.0),
        ),
    ));
    let expected = node_with_text(&live, "button", "Search");
    let page = page(live);
    let resolution = resolve(&page, &target, &ResolveOptions::default()).await;
    assert_eq!(resolved_node(&resolution), expected);
    assert_eq!(resolution.element.unwrap().matched_by, MatchSource::Text);
}

fn cards(names: &[&str]) -> NodeSpec {
    shell(vec![NodeSpec::new("ul").class("cards").rect(0.0, 0.0, 300.0, 400.0).children(
        names.iter().enumerate().map(|(i, name)| {
            NodeSpec::new("li")
                .attr("data-testid", "card")
                .class("card")
                .text(*name)
                .rect(0.0, i as f64 * 40.0, 300.0, 36.0)
        }),
    )])
}

#[tokio::test(start_paused = true)]
async fn text_filter_picks_the_matching_twin() {
    let recorded = dom(cards(&["Buy milk", "Call Alice", "Pay rent"]));
    let target = capture(&recorded, node_with_text(&recorded, "li", "Call Alice"));
    let testid = &target.preferred_locators[0];
    assert_eq!(testid.text_filter.as_deref(), Some("Call Alice"));

    // Same test id on every card, and the order changed since recording.
    let live = dom(cards(&["Pay rent", "Buy milk", "Call Alice", "Call Alice later"]));
    let expected = node_with_text(&live, "li", "Call Alice");
    let page = page(live);
    let resolution = resolve(&page, &target, &ResolveOptions::default()).await;
    assert_eq!(resolved_node(&resolution), expected);
}

fn board(lists: &[&str]) -> NodeSpec {
    shell(vec![NodeSpec::new("div").class("board").rect(0.0, 0.0, 900.0, 600.0).children(
        lists.iter().enumerate().map(|(i, title)| {
            let x = i as f64 * 300.0;
            NodeSpec::new("div").class("list").rect(x, 0.0, 280.0, 600.0).children([
                NodeSpec::new("h2").text(*title).rect(x, 0.0, 280.0, 30.0),
                NodeSpec::new("div")
                    .class("card")
                    .attr("data-testid", "card")
                    .text("Write tests")
                    .rect(x, 40.0, 280.0, 40.0),
            ])
        }),
    )])
}

fn card_under(tree: &dyn DomTree, heading: &str) -> NodeId {
    let h2 = node_with_text(tree, "h2", heading);
    let list = tree.parent(h2).unwrap();
    tree.query_selector_within(list, "div.card").unwrap()[0]
}

#[tokio::test(start_paused = true)]
async fn container_heading_scopes_repeated_cards() {
    let recorded = dom(board(&["To Do", "Done"]));
    let target = capture(&recorded, card_under(&recorded, "Done"));
    assert_eq!(target.container_text(), Some("done"));

    // Lists swapped: every positional locator now points at the wrong card.
    let live = dom(board(&["Done", "To Do"]));
    let expected = card_under(&live, "Done");
    let page = page(live);
    let resolution = resolve(&page, &target, &ResolveOptions::default()).await;
    assert_eq!(resolved_node(&resolution), expected);
}

#[tokio::test(start_paused = true)]
async fn container_scoping_survives_heading_badges() {
    let recorded = dom(board(&["To Do", "Done"]));
    let target = capture(&recorded, card_under(&recorded, "Done"));

    // Lists swapped and each heading gained a card count.
    let live = dom(board(&["Done (1)", "To Do (1)"]));
    let expected = card_under(&live, "Done (1)");
    let page = page(live);
    let options = ResolveOptions::default();
    let resolution = resolve(&page, &target, &options).await;
    assert_eq!(resolved_node(&resolution), expected);
    let score = resolution.element.unwrap().score;
    assert!(score > options.container_bonus, "score {}", score);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_targets_fail_within_the_deadline() {
    let page = page(dom(cards(&["Buy milk"])));
    let mut target = Target::from_fingerprint(Fingerprint::new("button"));
    target.preferred_locators.push(nexaura_core_types::Locator::id("nope", 0.9));

    let options = ResolveOptions::default().with_timeout(Duration::from_millis(1000));
    let started = Instant::now();
    let resolution = resolve(&page, &target, &options).await;
    let elapsed = started.elapsed();

    assert_eq!(resolution.status, ResolveStatus::HardFail);
    assert_eq!(resolution.failure, Some(ResolveFailure::Timeout));
    assert!(elapsed <= Duration::from_millis(1000), "took {:?}", elapsed);
    assert!(resolution.attempts >= 2);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_ends_before_the_deadline() {
    let page = page(dom(cards(&["Buy milk"])));
    let target = Target::from_fingerprint(Fingerprint::new("button"));
    let options = ResolveOptions::default().with_retries(2);

    let started = Instant::now();
    let resolution = resolve(&page, &target, &options).await;

    assert_eq!(resolution.failure, Some(ResolveFailure::NoCandidates));
    assert_eq!(resolution.attempts, 3);
    // three quiet periods plus 200ms and 400ms of backoff
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3 * 250 + 600), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn busy_pages_are_searched_after_the_stability_timeout() {
    let tree = dom(cards(&["Buy milk"]));
    let card = node_with_text(&tree, "li", "Buy milk");
    let target = capture(&tree, card);

    let hub = MutationHub::default();
    let publisher = hub.clone();
    let pump = tokio::spawn(async move {
        loop {
            publisher.publish(MutationRecord::child_list(None));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });
    let page = page(tree).with_mutations(Arc::new(hub));

    let started = Instant::now();
    let resolution = resolve(&page, &target, &ResolveOptions::default()).await;
    pump.abort();

    assert_eq!(resolved_node(&resolution), card);
    assert!(resolution.debug.contains_message("dom still mutating"));
    assert!(started.elapsed() <= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn cancellation_skips_without_error() {
    let page = page(dom(cards(&["Buy milk"])));
    let target = Target::from_fingerprint(Fingerprint::new("button"));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });
    let resolution = LocatorEngine::new()
        .resolve(&page, &target, &ResolveOptions::default(), &cancel)
        .await;
    assert_eq!(resolution.status, ResolveStatus::Skipped);
    assert!(resolution.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn ancestor_trail_is_used_when_no_locator_exists() {
    let live = dom(shell(vec![NodeSpec::new("main").rect(0.0, 0.0, 800.0, 600.0).children([
        NodeSpec::new("section").rect(0.0, 0.0, 800.0, 100.0),
        NodeSpec::new("section").rect(0.0, 100.0, 800.0, 100.0).child(
            NodeSpec::new("button").rect(10.0, 110.0, 60.0, 30.0),
        ),
    ])]));
    let expected = live.query_selector_all("section:nth-of-type(2) > button").unwrap()[0];

    let mut target = Target::from_fingerprint(Fingerprint::new("button"));
    target.context.ancestor_trail = vec![
        AncestorSegment { tag: "html".into(), index: 0 },
        AncestorSegment { tag: "body".into(), index: 0 },
        AncestorSegment { tag: "main".into(), index: 0 },
        AncestorSegment { tag: "section".into(), index: 1 },
    ];
    target.fingerprint.text = Some("archive".into());

    let page = page(live);
    let resolution = resolve(&page, &target, &ResolveOptions::default()).await;
    assert_eq!(resolved_node(&resolution), expected);
    assert_eq!(
        resolution.element.unwrap().matched_by,
        MatchSource::AncestorTrail
    );
}

#[tokio::test(start_paused = true)]
async fn submit_button_beats_unrelated_input() {
    let live = dom(shell(vec![NodeSpec::new("form").rect(0.0, 0.0, 600.0, 100.0).children([
        NodeSpec::new("input").class("primary").rect(0.0, 0.0, 300.0, 30.0),
        NodeSpec::new("button")
            .class("primary cta")
            .attr("aria-label", "Go")
            .text("Submit")
            .rect(310.0, 0.0, 90.0, 30.0),
    ])]));
    let button = live.query_selector_all("button").unwrap()[0];
    let input = live.query_selector_all("input").unwrap()[0];

    let mut fingerprint = Fingerprint::new("button");
    fingerprint.text = Some("submit".into());
    fingerprint.class_tokens.insert("primary".into());
    let target = Target::from_fingerprint(fingerprint);

    let scorer = CandidateScorer::default();
    assert!(scorer.score(&live, button, &target) > scorer.score(&live, input, &target));

    let page = page(live);
    let resolution = resolve(&page, &target, &ResolveOptions::default()).await;
    assert_eq!(resolved_node(&resolution), button);
    assert_eq!(
        resolution.element.unwrap().matched_by,
        MatchSource::FingerprintText
    );
}

#[tokio::test(start_paused = true)]
async fn elements_inside_same_origin_frames_are_found() {
    let inner = DocumentSnapshot::new(
        "https://app.example/embed",
        shell(vec![NodeSpec::new("button").id("embed-ok").text("Confirm").rect(5.0, 5.0, 80.0, 24.0)]),
    );
    let outer = dom(shell(vec![
        NodeSpec::new("iframe").attr("src", "/embed").rect(0.0, 0.0, 400.0, 300.0).frame_document(inner),
    ]));
    let mut target = Target::from_fingerprint(Fingerprint::new("button"));
    target.preferred_locators.push(nexaura_core_types::Locator::id("embed-ok", 0.9));

    let page = page(outer);
    let resolution = resolve(&page, &target, &ResolveOptions::default()).await;
    let element = resolution.element.expect("resolved in frame");
    assert_eq!(element.frame.to_string(), "1:0");
    assert_eq!(element.document().unwrap().location().as_deref(), Some("https://app.example/embed"));
}

use std::sync::Arc;
use std::time::Duration;

use chunk_pager::client::list_renderer::{ListRenderer, StatusInfo};
use chunk_pager::client::{
    ChunksMap, Document, KeyController, MapOptions, NavKey, Selection, StatusBusy, Viewport,
};
use chunk_pager::source::MemoryChunkSource;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const PLACEHOLDER: u64 = 1_000;

struct Harness {
    map: ChunksMap,
    memory: Arc<MemoryChunkSource>,
    busy: Arc<StatusBusy>,
}

fn harness(segments: usize, per_segment: usize, height: u64) -> Harness {
    let memory = Arc::new(MemoryChunkSource::synthetic(segments, per_segment));
    let busy = Arc::new(StatusBusy::new());
    let map = ChunksMap::new(
        memory.clone(),
        Box::new(Document::new()),
        Arc::new(Viewport::new(height)),
        busy.clone(),
        MapOptions {
            segment_count: segments,
            placeholder_extent: PLACEHOLDER,
        },
    );
    Harness { map, memory, busy }
}

fn first_line(map: &ChunksMap) -> Option<String> {
    map.selected_text()
        .and_then(|text| text.lines().next().map(str::to_owned))
}

async fn wait_for_selection(map: &ChunksMap, expected: Selection) {
    while map.selected() != Some(expected) {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[test_timeout::tokio_timeout_test(10)]
async fn walking_forward_visits_every_record_once() {
    let Harness { map, memory, .. } = harness(4, 6, 200);
    map.init().await.unwrap();
    map.first().await.unwrap();

    let mut seen = vec![first_line(&map).unwrap()];
    loop {
        let before = map.selected();
        map.next().await.unwrap();
        if map.selected() == before {
            break;
        }
        seen.push(first_line(&map).unwrap());
    }

    let expected: Vec<String> = (0..4)
        .flat_map(|segment| (0..6).map(move |row| format!("record {segment}.{row}")))
        .collect();
    assert_eq!(seen, expected);
    for segment in 0..4 {
        assert_eq!(memory.requests(segment), 1, "segment {segment} fetched once");
    }
}

#[test_timeout::tokio_timeout_test(10)]
async fn walking_backward_from_the_end_mirrors_the_forward_walk() {
    let Harness { map, .. } = harness(3, 4, 200);
    map.init().await.unwrap();
    map.last().await.unwrap();
    assert_eq!(map.selected(), Some(Selection { chunk: 2, row: 3 }));

    let mut seen = vec![first_line(&map).unwrap()];
    for _ in 0..20 {
        map.prev().await.unwrap();
        let line = first_line(&map).unwrap();
        if seen.last() == Some(&line) {
            break;
        }
        seen.push(line);
    }
    assert_eq!(seen.len(), 12);
    assert_eq!(seen.first().map(String::as_str), Some("record 2.3"));
    assert_eq!(seen.last().map(String::as_str), Some("record 0.0"));
}

#[test_timeout::tokio_timeout_test(10)]
async fn key_presses_run_in_order_on_the_worker() {
    let Harness { map, .. } = harness(4, 6, 200);
    map.init().await.unwrap();
    let (keys, _errors) = KeyController::spawn(map.clone());

    assert!(keys.handle(&KeyEvent::new(KeyCode::End, KeyModifiers::NONE)));
    assert!(keys.handle(&KeyEvent::new(KeyCode::Up, KeyModifiers::NONE)));
    assert!(!keys.handle(&KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE)));
    wait_for_selection(&map, Selection { chunk: 3, row: 4 }).await;
    assert_eq!(first_line(&map).as_deref(), Some("record 3.4"));

    assert!(keys.dispatch(NavKey::First));
    assert!(keys.dispatch(NavKey::Next));
    wait_for_selection(&map, Selection { chunk: 0, row: 1 }).await;
}

#[test_timeout::tokio_timeout_test(10)]
async fn navigation_errors_are_reported_and_recoverable() {
    let Harness { map, memory, .. } = harness(2, 1, 200);
    map.init().await.unwrap();
    let (keys, mut errors) = KeyController::spawn(map.clone());

    memory.fail(1);
    keys.dispatch(NavKey::Last);
    let err = errors.recv().await.unwrap();
    assert!(err.to_string().contains("segment 1"));
    assert_eq!(map.selected(), None);

    memory.heal(1);
    keys.dispatch(NavKey::Last);
    wait_for_selection(&map, Selection { chunk: 1, row: 0 }).await;
    assert_eq!(memory.requests(1), 2);
}

#[test_timeout::tokio_timeout_test(10)]
async fn settled_scroll_evicts_loads_and_reanchors() {
    let Harness { map, memory, busy } = harness(6, 6, 200);
    let viewport = Arc::clone(map.viewport());
    let mut settled = viewport.settle_events(Duration::from_millis(10));
    map.init().await.unwrap();
    assert_eq!(map.chunk_position(2).map(|span| span.start), Some(1_180));

    viewport.user_scroll_by(1_200);
    settled.recv().await.unwrap();
    assert_eq!(map.get_chunk_by_position(viewport.top()), Some(2));
    map.prefetch_visible().await;

    assert!(!busy.is_active());
    assert_eq!(map.loaded_chunks(), vec![1, 2, 3, 4]);
    assert_eq!(memory.requests(0), 1);
    let span = map.chunk_position(2).unwrap();
    assert_eq!(viewport.top(), span.start + 20);
    assert_eq!(map.get_chunk_by_position(viewport.top()), Some(2));

    // Re-anchoring is an engine scroll and must not settle again.
    let quiet = tokio::time::timeout(Duration::from_millis(50), settled.recv()).await;
    assert!(quiet.is_err());
}

#[test_timeout::tokio_timeout_test(10)]
async fn window_renders_the_selected_record() {
    let Harness { map, .. } = harness(2, 3, 40);
    map.init().await.unwrap();
    map.first().await.unwrap();

    let mut renderer = ListRenderer::new(6);
    renderer.update(map.visible_rows(renderer.body_height()), StatusInfo::default());
    assert_eq!(
        renderer.visible_lines(),
        vec!["", "> record 0.0", "", "  record 0.1"]
    );
}

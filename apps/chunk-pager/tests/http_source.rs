use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;

use chunk_pager::client::{ChunksMap, Document, MapOptions, Selection, StatusBusy, Viewport};
use chunk_pager::config::{ConfigLayer, PagerConfig, SourceConfig};
use chunk_pager::source::{ChunkSource, HttpChunkSource, SourceError};

type Segments = Arc<Vec<String>>;

async fn segment(
    State(segments): State<Segments>,
    Path(name): Path<String>,
) -> Result<String, StatusCode> {
    let index = name
        .strip_prefix("doc_list_chunk_")
        .and_then(|rest| rest.strip_suffix(".pdx"))
        .and_then(|raw| raw.parse::<usize>().ok())
        .ok_or(StatusCode::NOT_FOUND)?;
    segments.get(index).cloned().ok_or(StatusCode::NOT_FOUND)
}

/// Serves `segments` under `/shared/doc_list_chunk_{n}.pdx` and returns the
/// base URL.
async fn serve(segments: Vec<&str>) -> String {
    let segments: Segments = Arc::new(segments.into_iter().map(str::to_owned).collect());
    let app = Router::new()
        .route("/shared/:name", get(segment))
        .with_state(segments);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/shared")
}

fn resolve_http(base: &str, segments: usize) -> String {
    let layer = ConfigLayer {
        url: Some(base.to_string()),
        segments: Some(segments),
        placeholder_extent: Some(500),
        ..ConfigLayer::default()
    };
    match PagerConfig::resolve(layer).unwrap().source {
        SourceConfig::Http { template } => template,
        other => panic!("expected an http source, got {other:?}"),
    }
}

#[test_timeout::tokio_timeout_test(20)]
async fn segments_are_fetched_and_framed() {
    let base = serve(vec!["a\nb\n\nc\n\nd\ne\n", "x\r\ny\r\n\r\nz\r\n"]).await;
    let source = HttpChunkSource::new(resolve_http(&base, 2)).unwrap();

    assert_eq!(
        source.fetch_segment(0).await.unwrap(),
        vec!["a\nb".to_string(), "c".to_string(), "d\ne".to_string()]
    );
    assert_eq!(
        source.fetch_segment(1).await.unwrap(),
        vec!["x\ny".to_string(), "z".to_string()]
    );
}

#[test_timeout::tokio_timeout_test(20)]
async fn missing_segment_reports_the_status() {
    let base = serve(vec!["only\n"]).await;
    let source = HttpChunkSource::new(resolve_http(&base, 1)).unwrap();

    match source.fetch_segment(3).await {
        Err(SourceError::HttpStatus { index, status }) => {
            assert_eq!(index, 3);
            assert_eq!(status.as_u16(), 404);
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[test_timeout::tokio_timeout_test(20)]
async fn directory_pages_through_an_http_source() {
    let base = serve(vec!["r0\n\nr1\n", "", "r2\ncont\n\nr3\n"]).await;
    let source = Arc::new(HttpChunkSource::new(resolve_http(&base, 3)).unwrap());
    let busy = Arc::new(StatusBusy::new());
    let map = ChunksMap::new(
        source,
        Box::new(Document::new()),
        Arc::new(Viewport::new(100)),
        busy.clone(),
        MapOptions {
            segment_count: 3,
            placeholder_extent: 500,
        },
    );
    map.init().await.unwrap();

    map.last().await.unwrap();
    assert_eq!(map.selected(), Some(Selection { chunk: 2, row: 1 }));
    assert_eq!(map.selected_text().as_deref(), Some("r3"));

    // Segment 1 is empty and gets skipped in both directions.
    map.prev().await.unwrap();
    map.prev().await.unwrap();
    assert_eq!(map.selected(), Some(Selection { chunk: 0, row: 1 }));
    assert_eq!(map.selected_text().as_deref(), Some("r1"));
    assert!(!busy.is_active());
}

#[test_timeout::tokio_timeout_test(20)]
async fn unreachable_root_segment_fails_init() {
    let base = serve(Vec::new()).await;
    let source = Arc::new(HttpChunkSource::new(resolve_http(&base, 2)).unwrap());
    let map = ChunksMap::new(
        source,
        Box::new(Document::new()),
        Arc::new(Viewport::new(100)),
        Arc::new(StatusBusy::new()),
        MapOptions {
            segment_count: 2,
            placeholder_extent: 500,
        },
    );
    let err = map.init().await.unwrap_err();
    assert!(err.to_string().contains("first segment"));
}

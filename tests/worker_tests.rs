mod common;

use common::{MockEngine, Script};
use render_proxy::{Error, PageEventKind, RenderRequest, RenderStatus, RenderWorker, SessionOptions};

fn options() -> SessionOptions {
    SessionOptions {
        settle_ms: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn async_render_roundtrip() {
    let engine = MockEngine::always(Script::loaded("<p>hi</p>").event(PageEventKind::Prompt, "who?"));
    let worker = RenderWorker::spawn(move || Ok(engine), options()).unwrap();

    let result = worker.render(RenderRequest::get("http://fixture.test/")).await.unwrap();
    assert_eq!(result.status, RenderStatus::Success);
    assert_eq!(result.prompts, vec!["who?"]);

    worker.close().await.unwrap();
}

#[tokio::test]
async fn jobs_run_in_submission_order() {
    let engine = MockEngine::new(|nav| Script::loaded(&nav.url));
    let calls = engine.calls();
    let worker = RenderWorker::spawn(move || Ok(engine), options()).unwrap();

    let first = worker.clone();
    let a = tokio::spawn(async move { first.render(RenderRequest::get("http://fixture.test/a")).await });
    let a = a.await.unwrap().unwrap();
    let b = worker.render(RenderRequest::get("http://fixture.test/b")).await.unwrap();

    assert_eq!(a.html, "http://fixture.test/a");
    assert_eq!(b.html, "http://fixture.test/b");
    let urls: Vec<_> = calls.lock().unwrap().opened.iter().map(|n| n.url.clone()).collect();
    assert_eq!(urls, vec!["http://fixture.test/a", "http://fixture.test/b"]);

    worker.close().await.unwrap();
}

#[tokio::test]
async fn closed_worker_refuses_jobs() {
    let worker = RenderWorker::spawn(|| Ok(MockEngine::always(Script::loaded(""))), options()).unwrap();
    let handle = worker.clone();
    worker.close().await.unwrap();

    assert!(handle.render(RenderRequest::get("http://fixture.test/")).await.is_err());
}

#[test]
fn blocking_render_from_plain_thread() {
    let worker = RenderWorker::spawn(|| Ok(MockEngine::always(Script::loaded("done"))), options()).unwrap();
    let result = std::thread::spawn(move || worker.render_blocking(RenderRequest::get("http://fixture.test/")))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(result.html, "done");
}

#[test]
fn factory_error_is_returned() {
    let res = RenderWorker::spawn(
        || -> render_proxy::Result<MockEngine> { Err(Error::InitializationError("no chrome".into())) },
        options(),
    );
    assert!(matches!(res, Err(Error::InitializationError(msg)) if msg == "no chrome"));
}

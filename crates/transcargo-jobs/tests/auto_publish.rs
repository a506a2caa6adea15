//! Queue + pipeline against a mocked completions API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use transcargo_core::OpenAiSettings;
use transcargo_jobs::pipeline::{GENERATE_ARTICLE, NOTIFY_NEW_ARTICLE_DRAFT};
use transcargo_jobs::*;
use transcargo_store::{Cache, MemoryCache, NewCountry, SqliteStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    queue: Arc<JobQueue>,
    store: Arc<SqliteStore>,
    _dir: TempDir,
}

async fn harness(server: &MockServer, per_minute: u32) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
    store
        .write(|tx| {
            tx.insert_country(&NewCountry {
                code: "KZ".into(),
                name_ru: "Казахстан".into(),
                name_en: "Kazakhstan".into(),
                flag_emoji: None,
                is_active: true,
                seo_data: json!({}),
            })
        })
        .unwrap();

    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::default());
    let queue = Arc::new(JobQueue::new(
        2,
        RetryPolicy {
            max_retries: 1,
            backoff_base_ms: 5,
            backoff_max_ms: 10,
        },
        TimeLimits {
            soft: Duration::from_secs(5),
            hard: Duration::from_secs(10),
        },
    ));
    let writer = OpenAiWriter::new(OpenAiSettings {
        api_key: Some("sk-test".into()),
        api_base: format!("{}/v1", server.uri()),
        ..OpenAiSettings::default()
    });
    let pipeline = ArticlePipeline::new(
        store.clone(),
        cache.clone(),
        Arc::new(writer),
        Arc::new(WindowRateLimiter::new(cache.clone(), per_minute)),
        Arc::new(QueueNotifier::new(queue.clone())),
        vec!["FedEx".into()],
    );
    queue.start(Arc::new(pipeline));
    Harness {
        queue,
        store,
        _dir: dir,
    }
}

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "gpt-4o-mini",
        "choices": [{"message": {"role": "assistant", "content": text}}],
    }))
}

#[tokio::test]
async fn generate_job_saves_draft_and_notifies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion(
            "# Грузоперевозки из Казахстана\n\n## Авто\nбыстрее FedEx\n## Ж/д\nтекст",
        ))
        .mount(&server)
        .await;
    let h = harness(&server, 3).await;

    let id = h
        .queue
        .enqueue(
            GENERATE_ARTICLE,
            json!({"country_code": "kz", "article_type": "route_guide"}),
            Schedule::Now,
        )
        .unwrap();
    let job = h.queue.wait(&id, Duration::from_secs(10)).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error);
    let result = job.result.unwrap();
    assert_eq!(result["slug"], "грузоперевозки-из-казахстана");
    assert_eq!(result["seo"]["structure"]["ok"], true);

    let article = h
        .store
        .read(|tx| tx.get_article_by_slug("грузоперевозки-из-казахстана"))
        .unwrap()
        .unwrap();
    assert!(article.content.contains("быстрее конкурент"));

    // The draft notification runs as its own job.
    let mut notified = false;
    for _ in 0..200 {
        notified = h
            .queue
            .list()
            .iter()
            .any(|j| j.name == NOTIFY_NEW_ARTICLE_DRAFT && j.status == JobStatus::Completed);
        if notified {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(notified);
}

#[tokio::test]
async fn upstream_errors_retry_then_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;
    let h = harness(&server, 10).await;

    let id = h
        .queue
        .enqueue(GENERATE_ARTICLE, json!({"country_code": "KZ"}), Schedule::Now)
        .unwrap();
    let job = h.queue.wait(&id, Duration::from_secs(10)).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 2);
    assert!(job.error.unwrap().contains("502"));
}

#[tokio::test]
async fn rate_limit_caps_calls_per_minute() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion("# Обзор\n\nтекст"))
        .mount(&server)
        .await;
    let h = harness(&server, 1).await;

    let first = h
        .queue
        .enqueue(GENERATE_ARTICLE, json!({"country_code": "KZ"}), Schedule::Now)
        .unwrap();
    let first = h.queue.wait(&first, Duration::from_secs(10)).await.unwrap();
    assert_eq!(first.status, JobStatus::Completed);

    let second = h
        .queue
        .enqueue(GENERATE_ARTICLE, json!({"country_code": "KZ"}), Schedule::Now)
        .unwrap();
    let second = h.queue.wait(&second, Duration::from_secs(10)).await.unwrap();
    // Unless the minute rolled over between the two jobs.
    if second.status == JobStatus::Failed {
        assert!(second.error.unwrap().contains("Rate limit"));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}

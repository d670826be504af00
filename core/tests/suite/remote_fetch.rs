use std::sync::Arc;
use std::sync::Barrier;
use std::time::Duration;

use pixelprops_core::CertifiedProps;
use pixelprops_core::FetchError;
use pixelprops_core::Override;
use pixelprops_core::OverrideKey;
use pixelprops_core::RemoteConfigFetcher;
use pixelprops_core::RemoteProfileStore;
use pretty_assertions::assert_eq;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

use super::support::FINGERPRINT_PATH;
use super::support::MockEndpoint;
use super::support::certified_payload;
use super::support::config;
use super::support::engine;
use super::support::eventually;

const GMS: &str = "com.google.android.gms";
const GMS_UNSTABLE: &str = "com.google.android.gms.unstable";

#[test]
fn fetched_profile_is_applied_to_droidguard_process() {
    let endpoint = MockEndpoint::start();
    endpoint.serve(ResponseTemplate::new(200).set_body_json(certified_payload()));
    let (engine, fields) = engine(config(endpoint.url(), Duration::from_secs(5)));

    let report = engine
        .on_process_attach(GMS, Some(GMS_UNSTABLE))
        .expect("gms is not allow-listed");

    assert_eq!(report.certified_refresh, Some(Ok(())));
    assert_eq!(fields.get(OverrideKey::Model), Some(Override::Model("Pixel 8 Pro".to_string())));
    assert_eq!(fields.get(OverrideKey::Device), Some(Override::Device("husky".to_string())));
    assert_eq!(fields.get(OverrideKey::ApiLevel), Some(Override::ApiLevel(33)));
    assert_eq!(fields.get(OverrideKey::Type), Some(Override::Type("user".to_string())));
    assert_eq!(
        fields.get(OverrideKey::Tags),
        Some(Override::Tags("release-keys".to_string()))
    );
    assert_eq!(fields.get(OverrideKey::Time), Some(Override::Time(1_736_000_000_000)));
}

#[test]
fn slow_endpoint_falls_back_to_compiled_defaults() {
    let endpoint = MockEndpoint::start();
    endpoint.serve(
        ResponseTemplate::new(200)
            .set_body_json(certified_payload())
            .set_delay(Duration::from_millis(1500)),
    );
    let budget = Duration::from_millis(100);
    let (engine, fields) = engine(config(endpoint.url(), budget));

    let report = engine
        .on_process_attach(GMS, Some(GMS_UNSTABLE))
        .expect("attached");

    let defaults = CertifiedProps::default();
    assert_eq!(report.certified_refresh, Some(Err(FetchError::WaitElapsed(budget))));
    assert_eq!(fields.get(OverrideKey::Model), Some(Override::Model(defaults.model)));
    assert_eq!(
        fields.get(OverrideKey::Fingerprint),
        Some(Override::Fingerprint(defaults.fingerprint))
    );

    // The abandoned fetch keeps running and lands in the cache.
    let store = Arc::clone(engine.remote_store());
    assert!(eventually(Duration::from_secs(5), || store.snapshot().is_some()));
    assert!(!store.is_fetch_in_flight());

    engine.on_process_attach(GMS, Some(GMS_UNSTABLE));
    assert_eq!(fields.get(OverrideKey::Model), Some(Override::Model("Pixel 8 Pro".to_string())));
}

#[test]
fn server_error_keeps_previously_fetched_values() {
    let endpoint = MockEndpoint::start();
    endpoint.serve(ResponseTemplate::new(200).set_body_json(certified_payload()));
    let (engine, fields) = engine(config(endpoint.url(), Duration::from_secs(5)));
    engine.on_process_attach(GMS, Some(GMS_UNSTABLE));

    endpoint.serve(ResponseTemplate::new(500));
    let report = engine
        .on_process_attach(GMS, Some(GMS_UNSTABLE))
        .expect("attached");

    assert_eq!(
        report.certified_refresh,
        Some(Err(FetchError::Status {
            url: endpoint.url(),
            status: 500,
        }))
    );
    assert_eq!(fields.get(OverrideKey::Model), Some(Override::Model("Pixel 8 Pro".to_string())));
}

#[test]
fn payload_missing_a_key_is_rejected_as_a_whole() {
    let endpoint = MockEndpoint::start();
    let mut payload = certified_payload();
    payload
        .as_object_mut()
        .expect("object payload")
        .remove("MODEL");
    endpoint.serve(ResponseTemplate::new(200).set_body_json(payload));
    let (engine, fields) = engine(config(endpoint.url(), Duration::from_secs(5)));

    let report = engine
        .on_process_attach(GMS, Some(GMS_UNSTABLE))
        .expect("attached");

    assert!(matches!(report.certified_refresh, Some(Err(FetchError::Parse(_)))));
    assert_eq!(engine.remote_store().snapshot(), None);
    // No partial merge: the fetched device must not leak in either.
    assert_eq!(
        fields.get(OverrideKey::Device),
        Some(Override::Device(CertifiedProps::default().device))
    );
}

#[test]
fn concurrent_attaches_share_one_fetch() {
    let endpoint = MockEndpoint::start();
    endpoint.serve(
        ResponseTemplate::new(200)
            .set_body_json(certified_payload())
            .set_delay(Duration::from_millis(300)),
    );
    let (engine, _fields) = engine(config(endpoint.url(), Duration::from_secs(5)));
    let engine = Arc::new(engine);
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                engine
                    .on_process_attach(GMS, Some(GMS_UNSTABLE))
                    .and_then(|report| report.certified_refresh)
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("attach thread"), Some(Ok(())));
    }
    assert_eq!(endpoint.request_count(), 1);
    assert_eq!(engine.remote_store().last_round().ticket, 1);
}

#[test]
fn fetcher_returns_the_fetched_profile() {
    let endpoint = MockEndpoint::start();
    endpoint.serve(ResponseTemplate::new(200).set_body_json(certified_payload()));
    let fetcher = RemoteConfigFetcher::new(
        Arc::new(RemoteProfileStore::new()),
        Duration::from_secs(10),
    )
    .expect("fetcher");

    let profile = fetcher
        .fetch_certified_profile(&endpoint.url(), Duration::from_secs(5))
        .expect("profile");

    assert_eq!(profile.len(), 11);
    assert_eq!(
        profile.get(OverrideKey::SecurityPatch),
        Some(&Override::SecurityPatch("2025-01-05".to_string()))
    );
}

#[test]
fn unreachable_endpoint_is_a_transport_error() {
    let fetcher = RemoteConfigFetcher::new(
        Arc::new(RemoteProfileStore::new()),
        Duration::from_secs(2),
    )
    .expect("fetcher");

    let err = fetcher
        .refresh("http://127.0.0.1:9/fingerprint.json", Duration::from_secs(5))
        .expect_err("nothing listens on the discard port");

    assert!(matches!(err, FetchError::Transport { .. }), "{err:?}");
}

async fn serve_immediately() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FINGERPRINT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(certified_payload()))
        .mount(&server)
        .await;
    server
}

#[tokio::test(flavor = "multi_thread")]
async fn attach_from_multi_thread_runtime_waits_for_fetch() {
    let server = serve_immediately().await;
    let (engine, fields) = engine(config(
        format!("{}{FINGERPRINT_PATH}", server.uri()),
        Duration::from_secs(5),
    ));

    let report = engine
        .on_process_attach(GMS, Some(GMS_UNSTABLE))
        .expect("attached");

    assert_eq!(report.certified_refresh, Some(Ok(())));
    assert_eq!(fields.get(OverrideKey::Model), Some(Override::Model("Pixel 8 Pro".to_string())));
}

#[tokio::test(flavor = "current_thread")]
async fn attach_from_current_thread_runtime_waits_for_fetch() {
    let server = serve_immediately().await;
    let (engine, fields) = engine(config(
        format!("{}{FINGERPRINT_PATH}", server.uri()),
        Duration::from_secs(5),
    ));

    let report = engine
        .on_process_attach(GMS, Some(GMS_UNSTABLE))
        .expect("attached");

    assert_eq!(report.certified_refresh, Some(Ok(())));
    assert_eq!(fields.get(OverrideKey::Device), Some(Override::Device("husky".to_string())));
}

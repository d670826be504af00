use std::sync::Arc;
use std::time::Duration;

use pixelprops_core::BuildFields;
use pixelprops_core::PolicyEngine;
use pixelprops_core::PolicyToggles;
use pixelprops_core::PropsConfig;
use pixelprops_core::RemoteConfig;
use serde_json::Value;
use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

pub const FINGERPRINT_PATH: &str = "/fingerprint.json";

/// Mock endpoint driven from its own runtime so the engine can block on
/// the calling thread the way a real attach does.
pub struct MockEndpoint {
    pub server: MockServer,
    pub runtime: Runtime,
}

impl MockEndpoint {
    pub fn start() -> Self {
        let runtime = Runtime::new().expect("test runtime");
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    pub fn url(&self) -> String {
        format!("{}{FINGERPRINT_PATH}", self.server.uri())
    }

    /// Replace whatever the endpoint served before with `template`.
    pub fn serve(&self, template: ResponseTemplate) {
        self.runtime.block_on(async {
            self.server.reset().await;
            Mock::given(method("GET"))
                .and(path(FINGERPRINT_PATH))
                .respond_with(template)
                .mount(&self.server)
                .await;
        });
    }

    pub fn request_count(&self) -> usize {
        self.runtime
            .block_on(self.server.received_requests())
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}

pub fn certified_payload() -> Value {
    json!({
        "BRAND": "google",
        "MANUFACTURER": "Google",
        "ID": "AP4A.250105.002",
        "DEVICE": "husky",
        "PRODUCT": "husky_beta",
        "MODEL": "Pixel 8 Pro",
        "FINGERPRINT": "google/husky_beta/husky:15/AP4A.250105.002/12701944:user/release-keys",
        "VERSION:SECURITY_PATCH": "2025-01-05",
        "VERSION:API_LEVEL": "33",
    })
}

pub fn config(url: String, wait: Duration) -> PropsConfig {
    PropsConfig {
        remote: RemoteConfig {
            url,
            wait_interval_ms: u64::try_from(wait.as_millis()).expect("wait fits in u64"),
            wait_iterations: 1,
            request_timeout_secs: 10,
        },
        ..PropsConfig::default()
    }
}

pub fn engine(config: PropsConfig) -> (PolicyEngine, Arc<BuildFields>) {
    let fields = Arc::new(BuildFields::new());
    let engine = PolicyEngine::new(config, PolicyToggles::default(), fields.clone())
        .expect("engine")
        .with_clock(|| 1_736_000_000_000);
    (engine, fields)
}

/// Poll `check` until it holds or `limit` passes.
pub fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + limit;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    check()
}

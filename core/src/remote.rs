//! Certified profile refresh.
//!
//! The certified GMS profile is best-effort, eventually-consistent state:
//! a background task fetches it and replaces the cached copy as a whole,
//! while callers wait for at most a fixed budget and then proceed with
//! whatever is cached. The fetch is never cancelled by an expired wait,
//! it keeps running and may update the cache after the caller moved on.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::mpsc;
use std::time::Duration;

use pixelprops_async_utils::CancelErr;
use pixelprops_async_utils::OrCancelExt;
use pixelprops_async_utils::WaitErr;
use pixelprops_async_utils::WithinExt;
use serde::Deserialize;
use serde_with::DisplayFromStr;
use serde_with::PickFirst;
use serde_with::serde_as;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::profile::Override;
use crate::profile::Profile;
use crate::profile::ProfileId;

/// Default location of the certified profile.
pub const DEFAULT_CERTIFIED_PROFILE_URL: &str =
    "https://raw.githubusercontent.com/nishant6342/PLAY_FP/main/fingerprint.json";

const CERTIFIED_TYPE: &str = "user";
const CERTIFIED_TAGS: &str = "release-keys";

/// Certified device values, as served by the remote endpoint.
///
/// Every key is required: a payload missing any of them is rejected as a
/// whole and the previously cached values stay in effect.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CertifiedProps {
    #[serde(rename = "BRAND")]
    pub brand: String,
    #[serde(rename = "MANUFACTURER")]
    pub manufacturer: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "DEVICE")]
    pub device: String,
    #[serde(rename = "PRODUCT")]
    pub product: String,
    #[serde(rename = "MODEL")]
    pub model: String,
    #[serde(rename = "FINGERPRINT")]
    pub fingerprint: String,
    #[serde(rename = "VERSION:SECURITY_PATCH")]
    pub security_patch: String,
    /// Accepts `34` as well as `"34"`.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "VERSION:API_LEVEL")]
    pub api_level: i32,
}

impl Default for CertifiedProps {
    /// Compiled-in values used until a fetch succeeds.
    fn default() -> Self {
        Self {
            brand: "google".to_string(),
            manufacturer: "Google".to_string(),
            id: "BP21.241121.009".to_string(),
            device: "tokay".to_string(),
            product: "tokay_beta".to_string(),
            model: "Pixel 9".to_string(),
            fingerprint: "google/tokay_beta/tokay:Baklava/BP21.241121.009/12787338:user/release-keys"
                .to_string(),
            security_patch: "2024-12-05".to_string(),
            api_level: 21,
        }
    }
}

impl CertifiedProps {
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Full certified profile, including the fixed build type and tags.
    pub fn to_profile(&self) -> Profile {
        Profile::new(
            ProfileId::GmsCertified,
            [
                Override::Brand(self.brand.clone()),
                Override::Manufacturer(self.manufacturer.clone()),
                Override::Id(self.id.clone()),
                Override::Device(self.device.clone()),
                Override::Product(self.product.clone()),
                Override::Model(self.model.clone()),
                Override::Fingerprint(self.fingerprint.clone()),
                Override::Type(CERTIFIED_TYPE.to_string()),
                Override::Tags(CERTIFIED_TAGS.to_string()),
                Override::SecurityPatch(self.security_patch.clone()),
                Override::ApiLevel(self.api_level),
            ],
        )
    }
}

/// Completion record of the most recent fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRound {
    /// Ticket of the latest finished fetch. Tickets are issued in claim
    /// order starting at 1; 0 means no fetch finished yet.
    pub ticket: u64,
    /// Outcome of the latest finished fetch, `None` before the first one.
    pub outcome: Option<Result<(), FetchError>>,
}

#[derive(Debug, Default)]
struct FetchSlot {
    in_flight: Option<u64>,
    issued: u64,
}

/// Result of asking to start a fetch.
enum Claim {
    /// No fetch was running; the caller owns the new one.
    Owner(InFlight),
    /// A fetch was already running under this ticket.
    Joined(u64),
}

/// Process-wide cache of the last successfully fetched certified profile.
///
/// Single writer at a time: the fetch slot admits one fetch, and the
/// cached value is swapped as a whole so readers never see a torn profile.
#[derive(Debug)]
pub struct RemoteProfileStore {
    patch: RwLock<Option<Arc<CertifiedProps>>>,
    slot: Mutex<FetchSlot>,
    rounds: watch::Sender<FetchRound>,
}

impl Default for RemoteProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteProfileStore {
    pub fn new() -> Self {
        let (rounds, _) = watch::channel(FetchRound::default());
        Self {
            patch: RwLock::new(None),
            slot: Mutex::new(FetchSlot::default()),
            rounds,
        }
    }

    /// Last successfully fetched values, if any fetch ever succeeded.
    pub fn snapshot(&self) -> Option<Arc<CertifiedProps>> {
        self.patch
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, props: CertifiedProps) {
        *self.patch.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(props));
    }

    pub fn is_fetch_in_flight(&self) -> bool {
        self.lock_slot().in_flight.is_some()
    }

    pub fn last_round(&self) -> FetchRound {
        self.rounds.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<FetchRound> {
        self.rounds.subscribe()
    }

    fn lock_slot(&self) -> MutexGuard<'_, FetchSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim_fetch(self: &Arc<Self>) -> Claim {
        let mut slot = self.lock_slot();
        if let Some(ticket) = slot.in_flight {
            return Claim::Joined(ticket);
        }
        slot.issued += 1;
        slot.in_flight = Some(slot.issued);
        Claim::Owner(InFlight {
            store: Arc::clone(self),
            ticket: slot.issued,
            outcome: None,
        })
    }
}

/// Holds the fetch slot for one fetch. Dropping it frees the slot and
/// publishes the outcome, so a panicking or aborted task still releases it.
struct InFlight {
    store: Arc<RemoteProfileStore>,
    ticket: u64,
    outcome: Option<Result<(), FetchError>>,
}

impl InFlight {
    fn finish(mut self, outcome: Result<(), FetchError>) {
        self.outcome = Some(outcome);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(Err(FetchError::Cancelled));
        // Free and publish under the slot lock: the next claim is always
        // issued after this round is visible.
        let mut slot = self.store.lock_slot();
        slot.in_flight = None;
        let ticket = self.ticket;
        self.store.rounds.send_modify(|round| {
            round.ticket = ticket;
            round.outcome = Some(outcome);
        });
    }
}

/// Wait until the fetch holding `ticket` (or a later one) has finished and
/// return its outcome.
async fn wait_for_ticket(
    rounds: &mut watch::Receiver<FetchRound>,
    ticket: u64,
) -> Result<(), FetchError> {
    loop {
        {
            let round = rounds.borrow_and_update();
            if round.ticket >= ticket {
                return round.outcome.clone().unwrap_or(Err(FetchError::Cancelled));
            }
        }
        if rounds.changed().await.is_err() {
            return Err(FetchError::Cancelled);
        }
    }
}

/// Fetches the certified profile on a dedicated background runtime.
pub struct RemoteConfigFetcher {
    store: Arc<RemoteProfileStore>,
    client: reqwest::Client,
    runtime: Option<tokio::runtime::Runtime>,
    shutdown: CancellationToken,
}

impl RemoteConfigFetcher {
    pub fn new(
        store: Arc<RemoteProfileStore>,
        request_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pixelprops-fetch")
            .enable_all()
            .build()
            .map_err(|e| FetchError::Runtime(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Runtime(e.to_string()))?;

        Ok(Self {
            store,
            client,
            runtime: Some(runtime),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn store(&self) -> &Arc<RemoteProfileStore> {
        &self.store
    }

    /// Start a fetch unless one is already in flight, then wait at most
    /// `budget` for that fetch to finish.
    ///
    /// `Ok(())` means the fetch finished within the budget and updated the
    /// cache. Any error leaves the cache as it was; after
    /// [`FetchError::WaitElapsed`] the fetch may still land later.
    ///
    /// Blocks the calling thread, including when called from inside
    /// another tokio runtime: the wait itself runs on the fetch runtime.
    pub fn refresh(&self, url: &str, budget: Duration) -> Result<(), FetchError> {
        let runtime = self.runtime()?;
        let ticket = match self.store.claim_fetch() {
            Claim::Owner(in_flight) => {
                let ticket = in_flight.ticket;
                self.spawn_fetch(runtime, url, in_flight);
                ticket
            }
            Claim::Joined(ticket) => {
                tracing::debug!(
                    url,
                    ticket,
                    "certified profile fetch already in flight, joining it"
                );
                ticket
            }
        };

        let mut rounds = self.store.subscribe();
        let (tx, rx) = mpsc::sync_channel(1);
        runtime.spawn(async move {
            let waited = wait_for_ticket(&mut rounds, ticket).within(budget).await;
            let _ = tx.send(waited);
        });

        match rx.recv() {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(WaitErr::Elapsed(budget))) => {
                tracing::info!(?budget, "certified profile fetch still in flight, proceeding");
                Err(FetchError::WaitElapsed(budget))
            }
            // The runtime shut down and dropped the wait.
            Err(_) => Err(FetchError::Cancelled),
        }
    }

    /// Refresh and return the fetched profile.
    ///
    /// Fails when no fetch completes within `budget` or the one that did
    /// failed; cached values from earlier fetches are not returned here.
    pub fn fetch_certified_profile(
        &self,
        url: &str,
        budget: Duration,
    ) -> Result<Profile, FetchError> {
        self.refresh(url, budget)?;
        self.store
            .snapshot()
            .map(|props| props.to_profile())
            .ok_or_else(|| {
                FetchError::Parse("fetch reported success without a payload".to_string())
            })
    }

    fn runtime(&self) -> Result<&tokio::runtime::Runtime, FetchError> {
        self.runtime
            .as_ref()
            .ok_or_else(|| FetchError::Runtime("fetch runtime shut down".to_string()))
    }

    fn spawn_fetch(&self, runtime: &tokio::runtime::Runtime, url: &str, in_flight: InFlight) {
        let client = self.client.clone();
        let store = Arc::clone(&self.store);
        let shutdown = self.shutdown.clone();
        let url = url.to_string();

        runtime.spawn(async move {
            let outcome = match fetch_certified(&client, &url).or_cancel(&shutdown).await {
                Ok(Ok(props)) => {
                    tracing::info!(
                        brand = %props.brand,
                        model = %props.model,
                        fingerprint = %props.fingerprint,
                        security_patch = %props.security_patch,
                        "received certified profile"
                    );
                    store.replace(props);
                    Ok(())
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        url = %url,
                        error = %err,
                        "certified profile fetch failed, keeping previous values"
                    );
                    Err(err)
                }
                Err(CancelErr::Cancelled) => Err(FetchError::Cancelled),
            };
            in_flight.finish(outcome);
        });
    }
}

impl Drop for RemoteConfigFetcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn fetch_certified(
    client: &reqwest::Client,
    url: &str,
) -> Result<CertifiedProps, FetchError> {
    let transport = |e: reqwest::Error| FetchError::Transport {
        url: url.to_string(),
        message: e.to_string(),
    };

    let resp = client.get(url).send().await.map_err(transport)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = resp.text().await.map_err(transport)?;
    tracing::debug!(body = %body, "certified profile payload");
    CertifiedProps::parse(&body)
}

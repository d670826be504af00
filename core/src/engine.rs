//! Policy engine: classification, profile resolution and application,
//! plus the attestation-block and feature-hiding policies.
//!
//! The engine is stateless per call apart from the role recorded by the
//! last attach and the certified profile cache owned by its fetcher.

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use crate::classifier::Classification;
use crate::classifier::PackageClassifier;
use crate::classifier::is_allowed_package;
use crate::config::PropsConfig;
use crate::error::AttestationBlocked;
use crate::error::FetchError;
use crate::error::Result;
use crate::profile::Override;
use crate::profile::Profile;
use crate::profile::ProfileId;
use crate::remote::RemoteConfigFetcher;
use crate::remote::RemoteProfileStore;
use crate::sink::ApplyReport;
use crate::sink::OverrideSink;
use crate::sink::apply_profile;
use crate::table::FEATURE_BLOCKLIST;
use crate::table::PACKAGE_FINSKY;
use crate::table::PACKAGE_GMS;
use crate::table::PACKAGE_PHOTOS;
use crate::table::PROCESS_GMS_UNSTABLE;
use crate::table::PropertyTable;
use crate::toggles::PolicyToggles;

/// Frame marker identifying the GMS integrity check call path.
const DROIDGUARD_MARKER: &str = "DroidGuard";

/// What the attached process is, as far as the policies care.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessRole {
    /// GMS running its unstable (DroidGuard) process
    pub gms_unstable: bool,
    /// GMS, any process
    pub full_gms: bool,
    /// Play Store
    pub finsky: bool,
    pub photos: bool,
}

impl ProcessRole {
    pub fn of(package: &str, process: &str) -> Self {
        Self {
            gms_unstable: package == PACKAGE_GMS && process == PROCESS_GMS_UNSTABLE,
            full_gms: package == PACKAGE_GMS,
            finsky: package == PACKAGE_FINSKY,
            photos: package == PACKAGE_PHOTOS,
        }
    }
}

/// Call path of an attestation request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallContext {
    in_droidguard: bool,
}

impl CallContext {
    /// Context from the class names of the current call stack.
    pub fn from_frames<'a>(frames: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            in_droidguard: frames.into_iter().any(|f| f.contains(DROIDGUARD_MARKER)),
        }
    }

    pub fn droidguard() -> Self {
        Self { in_droidguard: true }
    }

    pub fn in_droidguard(self) -> bool {
        self.in_droidguard
    }
}

/// What one attach did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachReport {
    pub classification: Classification,
    /// Outcome of the certified profile refresh, for the GMS profile only.
    pub certified_refresh: Option<std::result::Result<(), FetchError>>,
    /// One report per applied profile, in application order.
    pub applied: Vec<ApplyReport>,
    /// Build time written for GMS processes.
    pub build_time: Option<i64>,
}

impl AttachReport {
    pub fn applied_profiles(&self) -> Vec<ProfileId> {
        self.applied.iter().map(|r| r.profile).collect()
    }
}

type Clock = dyn Fn() -> i64 + Send + Sync;

fn wall_clock_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct PolicyEngine {
    config: PropsConfig,
    toggles: PolicyToggles,
    classifier: PackageClassifier,
    table: PropertyTable,
    fetcher: RemoteConfigFetcher,
    sink: Arc<dyn OverrideSink>,
    role: RwLock<ProcessRole>,
    clock: Box<Clock>,
}

impl PolicyEngine {
    /// Create an engine with the built-in property table.
    ///
    /// Starts the background fetch runtime; no request is made until a GMS
    /// process attaches.
    pub fn new(
        config: PropsConfig,
        toggles: PolicyToggles,
        sink: Arc<dyn OverrideSink>,
    ) -> Result<Self> {
        let store = Arc::new(RemoteProfileStore::new());
        let fetcher = RemoteConfigFetcher::new(store, config.remote.request_timeout())?;

        tracing::info!(
            games_enabled = toggles.games_enabled,
            block_key_attestation = toggles.block_key_attestation,
            remote_url = %config.remote.url,
            wait_budget = ?config.remote.wait_budget(),
            "pixelprops engine initialized"
        );

        Ok(Self {
            classifier: PackageClassifier::new(toggles.games_enabled),
            config,
            toggles,
            table: PropertyTable::builtin(),
            fetcher,
            sink,
            role: RwLock::new(ProcessRole::default()),
            clock: Box::new(wall_clock_millis),
        })
    }

    /// Replace the property table.
    pub fn with_table(mut self, table: PropertyTable) -> Self {
        self.table = table;
        self
    }

    /// Replace the wall clock used for the GMS build time.
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &PropsConfig {
        &self.config
    }

    pub fn toggles(&self) -> PolicyToggles {
        self.toggles
    }

    pub fn remote_store(&self) -> &Arc<RemoteProfileStore> {
        self.fetcher.store()
    }

    pub fn classify(&self, package: &str, process: &str) -> Classification {
        self.classifier.classify(package, process)
    }

    /// Role recorded by the last accepted attach.
    pub fn attached_role(&self) -> ProcessRole {
        *self.role.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Certified profile as it would be applied now: the cached remote
    /// values when a fetch ever succeeded, the compiled-in ones otherwise.
    pub fn certified_profile(&self) -> Option<Profile> {
        match self.remote_store().snapshot() {
            Some(props) => Some(props.to_profile()),
            None => self.table.get(ProfileId::GmsCertified).cloned(),
        }
    }

    /// Establish the identity of a freshly attached process and apply its
    /// overrides.
    ///
    /// Returns `None` when the process is left untouched (empty package,
    /// unknown process, allow-listed package). Never fails: fetch and apply
    /// errors are logged and reported, not propagated.
    pub fn on_process_attach(&self, package: &str, process: Option<&str>) -> Option<AttachReport> {
        if self.config.log_packages {
            tracing::debug!(package, ?process, "attach");
        }

        let Some(process) = process else {
            self.set_role(ProcessRole::default());
            return None;
        };
        if package.is_empty() || is_allowed_package(package) {
            self.set_role(ProcessRole::default());
            return None;
        }

        let span = tracing::info_span!("attach", %process);
        let _enter = span.enter();

        let role = ProcessRole::of(package, process);
        self.set_role(role);

        let classification = self.classifier.classify(package, process);
        let mut report = AttachReport {
            classification,
            certified_refresh: None,
            applied: Vec::new(),
            build_time: None,
        };

        if let Some(main) = classification.main_profile() {
            let profile = if main == ProfileId::GmsCertified {
                tracing::debug!("spoofing build for GMS");
                report.certified_refresh = Some(self.refresh_certified());
                self.certified_profile()
            } else {
                tracing::debug!(%package, profile = %main, "spoofing build");
                self.table.get(main).cloned()
            };
            self.apply(profile, main, &mut report);
        }

        if role.full_gms {
            let now = (self.clock)();
            tracing::debug!(now, "spoofing build time for GMS");
            if let Err(err) = self.sink.apply(&Override::Time(now)) {
                tracing::error!(error = %err, "failed to set build time");
            }
            report.build_time = Some(now);
        }

        if let Some(game) = classification.game_profile() {
            tracing::debug!(%package, profile = %game, "setting games props");
            self.apply(self.table.get(game).cloned(), game, &mut report);
        }

        Some(report)
    }

    /// Whether key attestation must be refused.
    ///
    /// `is_gms_caller` means the GMS unstable process calling from inside
    /// DroidGuard; `is_finsky_caller` means the Play Store.
    pub fn should_block_attestation(&self, is_gms_caller: bool, is_finsky_caller: bool) -> bool {
        should_block_attestation(
            self.toggles.block_key_attestation,
            is_gms_caller,
            is_finsky_caller,
        )
    }

    /// Fallible form of [`Self::should_block_attestation`], surfaced to
    /// the host as "operation not supported".
    pub fn check_attestation(
        &self,
        is_gms_caller: bool,
        is_finsky_caller: bool,
    ) -> std::result::Result<(), AttestationBlocked> {
        if !self.toggles.block_key_attestation {
            tracing::debug!("key attestation blocking disabled");
            return Ok(());
        }
        if self.should_block_attestation(is_gms_caller, is_finsky_caller) {
            tracing::info!(
                gms = is_gms_caller,
                finsky = is_finsky_caller,
                "blocked key attestation"
            );
            return Err(AttestationBlocked {
                gms: is_gms_caller,
                finsky: is_finsky_caller,
            });
        }
        Ok(())
    }

    /// Attestation gate for the attached process called along `ctx`.
    pub fn check_attestation_for_attached(
        &self,
        ctx: CallContext,
    ) -> std::result::Result<(), AttestationBlocked> {
        let role = self.attached_role();
        self.check_attestation(role.gms_unstable && ctx.in_droidguard(), role.finsky)
    }

    /// Feature answer for an explicit caller; see [`feature_answer`].
    pub fn should_hide_feature(&self, is_photos_caller: bool, name: &str, default: bool) -> bool {
        feature_answer(is_photos_caller, name, default)
    }

    /// Feature answer for the attached process.
    pub fn has_system_feature(&self, name: &str, default: bool) -> bool {
        feature_answer(self.attached_role().photos, name, default)
    }

    fn refresh_certified(&self) -> std::result::Result<(), FetchError> {
        let remote = &self.config.remote;
        let outcome = self.fetcher.refresh(&remote.url, remote.wait_budget());
        match &outcome {
            Ok(()) => tracing::debug!("applying fetched certified props"),
            Err(err) => tracing::info!(error = %err, "applying cached or default certified props"),
        }
        outcome
    }

    fn apply(&self, profile: Option<Profile>, id: ProfileId, report: &mut AttachReport) {
        match profile {
            Some(profile) => report.applied.push(apply_profile(self.sink.as_ref(), &profile)),
            None => tracing::warn!(profile = %id, "profile missing from property table"),
        }
    }

    fn set_role(&self, role: ProcessRole) {
        *self.role.write().unwrap_or_else(PoisonError::into_inner) = role;
    }
}

/// Block when the switch is on and the caller is DroidGuard or the Play Store.
pub fn should_block_attestation(
    enabled: bool,
    is_gms_caller: bool,
    is_finsky_caller: bool,
) -> bool {
    enabled && (is_gms_caller || is_finsky_caller)
}

/// Downgrade a "has feature" answer to `false` for Photos when the feature
/// name contains a blocked entry. Every other answer passes through.
pub fn feature_answer(is_photos_caller: bool, name: &str, default: bool) -> bool {
    if is_photos_caller
        && default
        && FEATURE_BLOCKLIST
            .iter()
            .any(|blocked| name.contains(blocked))
    {
        tracing::debug!(feature = name, "blocked system feature for Google Photos");
        return false;
    }
    default
}

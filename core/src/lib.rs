//! Root of the `pixelprops-core` library.
//!
//! Per-process device identity policy: decides which device profile a
//! package/process sees, applies it through an [`OverrideSink`], keeps the
//! certified GMS profile fresh from a remote endpoint, and answers the
//! key attestation and system feature queries.
//!
//! ## Usage
//!
//! ```ignore
//! use pixelprops_core::{BuildFields, PolicyEngine, PolicyToggles, PropsConfig, EnvProperties};
//!
//! let config = PropsConfig::load()?;
//! let toggles = PolicyToggles::resolve(&EnvProperties, &config);
//! let engine = PolicyEngine::new(config, toggles, Arc::new(BuildFields::new()))?;
//! engine.on_process_attach("com.google.android.gms", Some("com.google.android.gms.unstable"));
//! ```

// Library code logs through tracing; output belongs to the binary.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod profile;
pub mod remote;
pub mod sink;
pub mod table;
pub mod toggles;

pub use classifier::Classification;
pub use classifier::PackageClassifier;
pub use config::PropsConfig;
pub use config::RemoteConfig;
pub use engine::AttachReport;
pub use engine::CallContext;
pub use engine::PolicyEngine;
pub use engine::ProcessRole;
pub use error::ApplyError;
pub use error::AttestationBlocked;
pub use error::ConfigError;
pub use error::ErrorCategory;
pub use error::FetchError;
pub use error::PropsError;
pub use error::Result;
pub use profile::Override;
pub use profile::OverrideKey;
pub use profile::Profile;
pub use profile::ProfileId;
pub use remote::CertifiedProps;
pub use remote::RemoteConfigFetcher;
pub use remote::RemoteProfileStore;
pub use sink::ApplyReport;
pub use sink::BuildFields;
pub use sink::OverrideSink;
pub use table::PropertyTable;
pub use toggles::EnvProperties;
pub use toggles::PolicyToggles;
pub use toggles::SystemProperties;

use std::collections::BTreeMap;
use std::sync::Arc;

use pixelprops_core::AttestationBlocked;
use pixelprops_core::BuildFields;
use pixelprops_core::CallContext;
use pixelprops_core::Classification;
use pixelprops_core::Override;
use pixelprops_core::OverrideKey;
use pixelprops_core::PolicyEngine;
use pixelprops_core::PolicyToggles;
use pixelprops_core::ProfileId;
use pixelprops_core::PropsConfig;
use pixelprops_core::RemoteConfig;
use pixelprops_core::toggles::PROP_BLOCK_KEY_ATTESTATION;
use pixelprops_core::toggles::PROP_GAMES_SPOOF;
use pretty_assertions::assert_eq;

fn engine_with_props(props: &[(&str, &str)]) -> (PolicyEngine, Arc<BuildFields>) {
    let props: BTreeMap<String, String> = props
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    // Nothing listens on the discard port; GMS attaches fall back quickly.
    let config = PropsConfig {
        remote: RemoteConfig {
            url: "http://127.0.0.1:9/fingerprint.json".to_string(),
            wait_interval_ms: 200,
            wait_iterations: 1,
            request_timeout_secs: 2,
        },
        ..PropsConfig::default()
    };
    let toggles = PolicyToggles::resolve(&props, &config);
    let fields = Arc::new(BuildFields::new());
    let engine = PolicyEngine::new(config, toggles, fields.clone())
        .expect("engine")
        .with_clock(|| 42);
    (engine, fields)
}

#[test]
fn game_titles_follow_the_games_property() {
    let (off, off_fields) = engine_with_props(&[]);
    let report = off
        .on_process_attach("com.mobile.legends", Some("com.mobile.legends"))
        .expect("attached");
    assert_eq!(report.classification, Classification::NoOverride);
    assert!(off_fields.snapshot().is_empty());

    let (on, on_fields) = engine_with_props(&[(PROP_GAMES_SPOOF, "true")]);
    let report = on
        .on_process_attach("com.mobile.legends", Some("com.mobile.legends"))
        .expect("attached");
    assert_eq!(report.applied_profiles(), vec![ProfileId::RogPhone6]);
    assert_eq!(
        on_fields.get(OverrideKey::Model),
        Some(Override::Model("ASUS_AI2201".to_string()))
    );
}

#[test]
fn repeated_attach_is_idempotent() {
    let (engine, fields) = engine_with_props(&[]);
    let package = "com.google.android.apps.photos";

    engine.on_process_attach(package, Some(package));
    let first = fields.snapshot();
    engine.on_process_attach(package, Some(package));

    assert_eq!(fields.snapshot(), first);
    assert_eq!(
        first.get(&OverrideKey::Device),
        Some(&Override::Device("marlin".to_string()))
    );
}

#[test]
fn droidguard_attestation_blocked_only_in_unstable_process() {
    let (engine, _fields) = engine_with_props(&[]);
    let droidguard =
        CallContext::from_frames(["com.google.ccc.abuse.droidguard.DroidGuardChimeraService"]);

    engine.on_process_attach("com.google.android.gms", Some("com.google.android.gms.persistent"));
    assert_eq!(engine.check_attestation_for_attached(droidguard), Ok(()));

    engine.on_process_attach("com.google.android.gms", Some("com.google.android.gms.unstable"));
    assert_eq!(engine.check_attestation_for_attached(CallContext::default()), Ok(()));
    assert_eq!(
        engine.check_attestation_for_attached(droidguard),
        Err(AttestationBlocked {
            gms: true,
            finsky: false,
        })
    );
}

#[test]
fn attestation_property_disables_blocking() {
    let (engine, _fields) = engine_with_props(&[(PROP_BLOCK_KEY_ATTESTATION, "0")]);
    engine.on_process_attach("com.android.vending", Some("com.android.vending"));

    assert!(engine.attached_role().finsky);
    assert_eq!(engine.check_attestation_for_attached(CallContext::droidguard()), Ok(()));
}

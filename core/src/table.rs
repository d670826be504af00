//! Built-in override profiles and the package lists that select them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::profile::Override;
use crate::profile::Profile;
use crate::profile::ProfileId;
use crate::remote::CertifiedProps;

pub const PACKAGE_PREFIX_GOOGLE: &str = "com.google.android.";
pub const PACKAGE_GMS: &str = "com.google.android.gms";
pub const PROCESS_GMS_UNSTABLE: &str = "com.google.android.gms.unstable";
pub const PACKAGE_PHOTOS: &str = "com.google.android.apps.photos";
pub const PACKAGE_FINSKY: &str = "com.android.vending";

/// Never spoofed, whatever else matches.
pub const ALLOWED_PACKAGES: &[&str] = &[
    "com.google.android.apps.motionsense.bridge",
    "com.google.android.apps.pixelmigrate",
    "com.google.android.apps.recorder",
    "com.google.android.apps.restore",
    "com.google.android.apps.tachyon",
    "com.google.android.apps.tycho",
    "com.google.android.apps.wearables.maestro.companion",
    "com.google.android.settings.intelligence",
    "com.google.android.apps.youtube.kids",
    "com.google.android.as",
    "com.google.android.dialer",
    "com.google.android.euicc",
    "com.google.android.setupwizard",
    "com.google.ar.core",
    "com.google.oslo",
];

pub const RECENT_PIXEL_PACKAGES: &[&str] = &[
    "com.android.chrome",
    "com.breel.wallpapers20",
    "com.google.android.aicore",
    "com.google.android.apps.aiwallpapers",
    "com.google.android.apps.bard",
    "com.google.android.apps.customization.pixel",
    "com.google.android.apps.emojiwallpaper",
    "com.google.android.apps.nexuslauncher",
    "com.google.android.apps.pixel.agent",
    "com.google.android.apps.pixel.creativeassistant",
    "com.google.android.apps.pixel.support",
    "com.google.android.apps.privacy.wildlife",
    "com.google.android.apps.subscriptions.red",
    "com.google.android.apps.wallpaper",
    "com.google.android.apps.wallpaper.pixel",
    "com.google.android.apps.weather",
    "com.google.android.gms",
    "com.google.android.googlequicksearchbox",
    "com.google.android.wallpaper.effects",
    "com.google.pixel.livewallpaper",
    "com.nhs.online.nhsonline",
    "com.google.android.inputmethod.latin",
    "com.google.android.tts",
    "com.google.android.youtube",
    "com.google.android.apps.youtube.music",
];

/// Outside the Google prefix but still given the generic Pixel profile.
pub const EXTRA_PACKAGES: &[&str] = &["com.android.chrome", "com.android.vending"];

/// Game title lists in match order. The first list containing a package wins.
pub const GAME_PACKAGES: &[(ProfileId, &[&str])] = &[
    (
        ProfileId::RogPhone6,
        &[
            "com.activision.callofduty.shooter",
            "com.ea.gp.fifamobile",
            "com.gameloft.android.ANMP.GloftA9HM",
            "com.madfingergames.legends",
            "com.mobile.legends",
            "com.pearlabyss.blackdesertm",
            "com.pearlabyss.blackdesertm.gl",
        ],
    ),
    (
        ProfileId::Xperia5,
        &["com.garena.game.codm", "com.tencent.tmgp.kr.codm", "com.vng.codmvn"],
    ),
    (
        ProfileId::OnePlus8Pro,
        &[
            "com.netease.lztgglobal",
            "com.pubg.krmobile",
            "com.rekoo.pubgm",
            "com.riotgames.league.wildrift",
            "com.riotgames.league.wildrifttw",
            "com.riotgames.league.wildriftvn",
            "com.tencent.ig",
            "com.tencent.tmgp.pubgmhd",
            "com.vng.pubgmobile",
            "com.pubg.imobile",
        ],
    ),
    (
        ProfileId::OnePlus9Pro,
        &["com.epicgames.fortnite", "com.epicgames.portal", "com.tencent.lolm"],
    ),
    (
        ProfileId::Xiaomi11T,
        &[
            "com.ea.gp.apexlegendsmobilefps",
            "com.levelinfinite.hotta.gp",
            "com.supercell.clashofclans",
            "com.vng.mlbbvn",
        ],
    ),
    (
        ProfileId::Xiaomi13Pro,
        &["com.levelinfinite.sgameGlobal", "com.tencent.tmgp.sgame"],
    ),
    (ProfileId::PocoF4, &["com.dts.freefiremax", "com.dts.freefireth"]),
];

/// Feature names hidden from Photos so it keeps treating the device as an
/// older Pixel. Matched as substrings of the queried feature.
pub const FEATURE_BLOCKLIST: &[&str] = &[
    "PIXEL_2017_PRELOAD",
    "PIXEL_2018_PRELOAD",
    "PIXEL_2019_MIDYEAR_PRELOAD",
    "PIXEL_2019_PRELOAD",
    "PIXEL_2020_EXPERIENCE",
    "PIXEL_2020_MIDYEAR_EXPERIENCE",
    "PIXEL_2021_EXPERIENCE",
    "PIXEL_2021_MIDYEAR_EXPERIENCE",
    "PIXEL_2022_EXPERIENCE",
    "PIXEL_2022_MIDYEAR_EXPERIENCE",
    "PIXEL_2023_EXPERIENCE",
    "PIXEL_2023_MIDYEAR_EXPERIENCE",
    "PIXEL_2024_EXPERIENCE",
    "PIXEL_2024_MIDYEAR_EXPERIENCE",
    "PIXEL_TABLET_2023_EXPERIENCE",
];

static BUILD_ID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([A-Za-z0-9]+\.\d+\.\d+\.\w+)").ok());

/// Build id embedded in a fingerprint, e.g. `QP1A.191005.007.A3`.
///
/// Empty when the fingerprint carries no dotted build id.
pub fn build_id_from_fingerprint(fingerprint: &str) -> String {
    BUILD_ID_PATTERN
        .as_ref()
        .and_then(|re| re.captures(fingerprint))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Stock Google device profile derived from a single fingerprint.
pub fn google_spoof_profile(
    id: ProfileId,
    device: &str,
    model: &str,
    fingerprint: &str,
) -> Profile {
    Profile::new(
        id,
        [
            Override::Brand("google".to_string()),
            Override::Manufacturer("Google".to_string()),
            Override::Id(build_id_from_fingerprint(fingerprint)),
            Override::Device(device.to_string()),
            Override::Product(device.to_string()),
            Override::Model(model.to_string()),
            Override::Fingerprint(fingerprint.to_string()),
            Override::Type("user".to_string()),
            Override::Tags("release-keys".to_string()),
        ],
    )
}

fn pixel_profile(
    id: ProfileId,
    device: &str,
    build_id: &str,
    model: &str,
    fingerprint: &str,
) -> Profile {
    Profile::new(
        id,
        [
            Override::Brand("google".to_string()),
            Override::Manufacturer("Google".to_string()),
            Override::Device(device.to_string()),
            Override::Hardware(device.to_string()),
            Override::Id(build_id.to_string()),
            Override::Product(device.to_string()),
            Override::Model(model.to_string()),
            Override::Fingerprint(fingerprint.to_string()),
        ],
    )
}

fn game_profile(
    id: ProfileId,
    brand: Option<&str>,
    manufacturer: &str,
    device: Option<&str>,
    model: &str,
) -> Profile {
    let mut overrides = vec![
        Override::Manufacturer(manufacturer.to_string()),
        Override::Model(model.to_string()),
    ];
    if let Some(brand) = brand {
        overrides.push(Override::Brand(brand.to_string()));
    }
    if let Some(device) = device {
        overrides.push(Override::Device(device.to_string()));
    }
    Profile::new(id, overrides)
}

/// Profile for `id` with its compiled-in values.
pub fn builtin_profile(id: ProfileId) -> Profile {
    match id {
        ProfileId::GmsCertified => CertifiedProps::default().to_profile(),
        ProfileId::LegacyPixelXl => google_spoof_profile(
            id,
            "marlin",
            "Pixel XL",
            "google/marlin/marlin:10/QP1A.191005.007.A3/5972272:user/release-keys",
        ),
        ProfileId::RecentPixel => pixel_profile(
            id,
            "caiman",
            "AP4A.241205.013.C1",
            "Pixel 9 Pro",
            "google/caiman/caiman:15/AP4A.241205.013.C1/12657666:user/release-keys",
        ),
        ProfileId::GenericPixel => pixel_profile(
            id,
            "barbet",
            "AP2A.240805.004",
            "Pixel 5a",
            "google/barbet/barbet:14/AP2A.240805.005.S4/12281092:user/release-keys",
        ),
        ProfileId::RogPhone6 => {
            game_profile(id, Some("asus"), "asus", Some("AI2201"), "ASUS_AI2201")
        }
        ProfileId::Xperia5 => game_profile(id, None, "Sony", None, "SO-52A"),
        ProfileId::OnePlus8Pro => game_profile(id, None, "OnePlus", None, "IN2020"),
        ProfileId::OnePlus9Pro => game_profile(id, None, "OnePlus", None, "LE2123"),
        ProfileId::Xiaomi11T => game_profile(id, None, "Xiaomi", None, "21081111RG"),
        ProfileId::Xiaomi13Pro => game_profile(id, Some("Xiaomi"), "Xiaomi", None, "2210132C"),
        ProfileId::PocoF4 => game_profile(id, None, "Xiaomi", None, "22021211RG"),
    }
}

/// Static mapping of profile id to profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTable {
    profiles: BTreeMap<ProfileId, Profile>,
}

impl PropertyTable {
    /// Table holding every built-in profile.
    pub fn builtin() -> Self {
        use strum::IntoEnumIterator;
        Self::from_profiles(ProfileId::iter().map(builtin_profile))
    }

    /// Table from explicit profiles; a later profile with the same id wins.
    pub fn from_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.id(), p)).collect(),
        }
    }

    pub fn get(&self, id: ProfileId) -> Option<&Profile> {
        self.profiles.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ProfileId> + '_ {
        self.profiles.keys().copied()
    }
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

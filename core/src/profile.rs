//! Override profiles: typed key/value sets applied to the device identity.

use std::collections::BTreeMap;
use std::fmt;

use strum_macros::Display;
use strum_macros::EnumIter;
use strum_macros::EnumString;
use strum_macros::IntoStaticStr;

/// Device-identity field that a profile can override.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideKey {
    Brand,
    Manufacturer,
    Device,
    Product,
    Model,
    Fingerprint,
    Id,
    Type,
    Tags,
    Hardware,
    SecurityPatch,
    ApiLevel,
    Time,
}

/// Where an override lands in the host's build-identity holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    /// A field of the top-level build holder (`Build.MODEL`, ...)
    Build(&'static str),
    /// A field of the nested version holder (`Build.VERSION.SECURITY_PATCH`, ...)
    Version(&'static str),
}

impl FieldTarget {
    pub fn field(self) -> &'static str {
        match self {
            Self::Build(name) | Self::Version(name) => name,
        }
    }
}

impl fmt::Display for FieldTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build(name) => write!(f, "Build.{name}"),
            Self::Version(name) => write!(f, "Build.VERSION.{name}"),
        }
    }
}

impl OverrideKey {
    /// Field this key writes to.
    pub fn target(self) -> FieldTarget {
        match self {
            Self::SecurityPatch => FieldTarget::Version("SECURITY_PATCH"),
            Self::ApiLevel => FieldTarget::Version("DEVICE_INITIAL_SDK_INT"),
            other => FieldTarget::Build(other.into()),
        }
    }
}

/// One typed override. The payload type is fixed per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Override {
    Brand(String),
    Manufacturer(String),
    Device(String),
    Product(String),
    Model(String),
    Fingerprint(String),
    Id(String),
    Type(String),
    Tags(String),
    Hardware(String),
    SecurityPatch(String),
    ApiLevel(i32),
    /// Build time in milliseconds since the Unix epoch.
    Time(i64),
}

impl Override {
    pub fn key(&self) -> OverrideKey {
        match self {
            Self::Brand(_) => OverrideKey::Brand,
            Self::Manufacturer(_) => OverrideKey::Manufacturer,
            Self::Device(_) => OverrideKey::Device,
            Self::Product(_) => OverrideKey::Product,
            Self::Model(_) => OverrideKey::Model,
            Self::Fingerprint(_) => OverrideKey::Fingerprint,
            Self::Id(_) => OverrideKey::Id,
            Self::Type(_) => OverrideKey::Type,
            Self::Tags(_) => OverrideKey::Tags,
            Self::Hardware(_) => OverrideKey::Hardware,
            Self::SecurityPatch(_) => OverrideKey::SecurityPatch,
            Self::ApiLevel(_) => OverrideKey::ApiLevel,
            Self::Time(_) => OverrideKey::Time,
        }
    }

    /// Text payload, `None` for integer-valued keys.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Brand(v)
            | Self::Manufacturer(v)
            | Self::Device(v)
            | Self::Product(v)
            | Self::Model(v)
            | Self::Fingerprint(v)
            | Self::Id(v)
            | Self::Type(v)
            | Self::Tags(v)
            | Self::Hardware(v)
            | Self::SecurityPatch(v) => Some(v),
            Self::ApiLevel(_) | Self::Time(_) => None,
        }
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiLevel(v) => write!(f, "{v}"),
            Self::Time(v) => write!(f, "{v}"),
            other => f.write_str(other.as_text().unwrap_or_default()),
        }
    }
}

/// Identifier of a built-in profile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, EnumString,
)]
pub enum ProfileId {
    /// Certified device for the GMS unstable process; refreshed remotely.
    #[strum(serialize = "GMS_CERTIFIED")]
    GmsCertified,
    /// Pixel XL, keeps unlimited original-quality backup in Photos.
    #[strum(serialize = "LEGACY_PIXEL_XL")]
    LegacyPixelXl,
    #[strum(serialize = "RECENT_PIXEL")]
    RecentPixel,
    #[strum(serialize = "GENERIC_PIXEL")]
    GenericPixel,
    #[strum(serialize = "ROG_PHONE_6")]
    RogPhone6,
    #[strum(serialize = "XPERIA_5")]
    Xperia5,
    #[strum(serialize = "ONEPLUS_8_PRO")]
    OnePlus8Pro,
    #[strum(serialize = "ONEPLUS_9_PRO")]
    OnePlus9Pro,
    #[strum(serialize = "XIAOMI_11T")]
    Xiaomi11T,
    #[strum(serialize = "XIAOMI_13_PRO")]
    Xiaomi13Pro,
    #[strum(serialize = "POCO_F4")]
    PocoF4,
}

impl ProfileId {
    pub fn is_game(self) -> bool {
        !matches!(
            self,
            Self::GmsCertified | Self::LegacyPixelXl | Self::RecentPixel | Self::GenericPixel
        )
    }
}

/// Immutable set of overrides. The key set is fixed at construction and
/// each key appears at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    id: ProfileId,
    overrides: BTreeMap<OverrideKey, Override>,
}

impl Profile {
    /// Build a profile. A key given twice keeps its last value.
    pub fn new(id: ProfileId, overrides: impl IntoIterator<Item = Override>) -> Self {
        let overrides = overrides.into_iter().map(|o| (o.key(), o)).collect();
        Self { id, overrides }
    }

    pub fn id(&self) -> ProfileId {
        self.id
    }

    pub fn get(&self, key: OverrideKey) -> Option<&Override> {
        self.overrides.get(&key)
    }

    pub fn contains(&self, key: OverrideKey) -> bool {
        self.overrides.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = OverrideKey> + '_ {
        self.overrides.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Override> {
        self.overrides.values()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

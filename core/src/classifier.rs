//! Package classification: which profiles apply to a package/process pair.
//!
//! Pure and total. Main branches are evaluated in a fixed order and the
//! first match wins; the game check runs in addition to, never instead of,
//! the main classification.

use crate::profile::ProfileId;
use crate::table::ALLOWED_PACKAGES;
use crate::table::EXTRA_PACKAGES;
use crate::table::GAME_PACKAGES;
use crate::table::PACKAGE_GMS;
use crate::table::PACKAGE_PHOTOS;
use crate::table::PACKAGE_PREFIX_GOOGLE;
use crate::table::PROCESS_GMS_UNSTABLE;
use crate::table::RECENT_PIXEL_PACKAGES;

/// Profiles selected for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NoOverride,
    ApplyProfile(ProfileId),
    /// Main profile first, then the game profile on top.
    ApplyProfileThenGameProfile(ProfileId, ProfileId),
    /// Game title outside every main rule.
    GameProfileOnly(ProfileId),
}

impl Classification {
    pub fn main_profile(self) -> Option<ProfileId> {
        match self {
            Self::ApplyProfile(id) | Self::ApplyProfileThenGameProfile(id, _) => Some(id),
            Self::NoOverride | Self::GameProfileOnly(_) => None,
        }
    }

    pub fn game_profile(self) -> Option<ProfileId> {
        match self {
            Self::ApplyProfileThenGameProfile(_, game) | Self::GameProfileOnly(game) => Some(game),
            Self::NoOverride | Self::ApplyProfile(_) => None,
        }
    }

    /// Profiles in application order.
    pub fn profiles(self) -> impl Iterator<Item = ProfileId> {
        self.main_profile().into_iter().chain(self.game_profile())
    }

    fn with_game(main: Option<ProfileId>, game: Option<ProfileId>) -> Self {
        match (main, game) {
            (Some(main), Some(game)) => Self::ApplyProfileThenGameProfile(main, game),
            (Some(main), None) => Self::ApplyProfile(main),
            (None, Some(game)) => Self::GameProfileOnly(game),
            (None, None) => Self::NoOverride,
        }
    }
}

pub fn is_allowed_package(package: &str) -> bool {
    ALLOWED_PACKAGES.contains(&package)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageClassifier {
    games_enabled: bool,
}

impl PackageClassifier {
    pub fn new(games_enabled: bool) -> Self {
        Self { games_enabled }
    }

    pub fn games_enabled(self) -> bool {
        self.games_enabled
    }

    pub fn classify(self, package: &str, process: &str) -> Classification {
        if package.is_empty() || is_allowed_package(package) {
            return Classification::NoOverride;
        }

        let game = if self.games_enabled {
            classify_game(package)
        } else {
            None
        };
        Classification::with_game(classify_main(package, process), game)
    }
}

/// Main profile for a package that is neither empty nor allow-listed.
pub fn classify_main(package: &str, process: &str) -> Option<ProfileId> {
    if package == PACKAGE_GMS && process == PROCESS_GMS_UNSTABLE {
        Some(ProfileId::GmsCertified)
    } else if package == PACKAGE_PHOTOS {
        Some(ProfileId::LegacyPixelXl)
    } else if RECENT_PIXEL_PACKAGES.contains(&package) {
        Some(ProfileId::RecentPixel)
    } else if (package.starts_with(PACKAGE_PREFIX_GOOGLE)
        && !package.to_lowercase().contains("camera"))
        || EXTRA_PACKAGES.contains(&package)
    {
        Some(ProfileId::GenericPixel)
    } else {
        None
    }
}

/// Game profile for a package; earliest declared list wins.
pub fn classify_game(package: &str) -> Option<ProfileId> {
    GAME_PACKAGES
        .iter()
        .find(|(_, packages)| packages.contains(&package))
        .map(|(id, _)| *id)
}

//! Tunables of the OpenCV backend.

use std::fmt;
use std::str::FromStr;

use opencv::objdetect::PredefinedDictionaryType;
use serde::{Deserialize, Serialize};

macro_rules! aruco_dictionaries {
    ($($variant:ident => $name:literal, $cv:ident;)*) => {
        /// Predefined ArUco dictionary used by marker detection.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ArucoDictionary {
            $(
                #[serde(rename = $name)]
                $variant,
            )*
        }

        impl ArucoDictionary {
            pub const ALL: &'static [ArucoDictionary] = &[$(ArucoDictionary::$variant),*];

            /// Canonical OpenCV name, e.g. `DICT_6X6_250`.
            pub fn name(self) -> &'static str {
                match self {
                    $(ArucoDictionary::$variant => $name,)*
                }
            }

            /// Matching OpenCV predefined dictionary.
            pub fn predefined(self) -> PredefinedDictionaryType {
                match self {
                    $(ArucoDictionary::$variant => PredefinedDictionaryType::$cv,)*
                }
            }
        }
    };
}

aruco_dictionaries! {
    Dict4x4_50 => "DICT_4X4_50", DICT_4X4_50;
    Dict4x4_100 => "DICT_4X4_100", DICT_4X4_100;
    Dict4x4_250 => "DICT_4X4_250", DICT_4X4_250;
    Dict4x4_1000 => "DICT_4X4_1000", DICT_4X4_1000;
    Dict5x5_50 => "DICT_5X5_50", DICT_5X5_50;
    Dict5x5_100 => "DICT_5X5_100", DICT_5X5_100;
    Dict5x5_250 => "DICT_5X5_250", DICT_5X5_250;
    Dict5x5_1000 => "DICT_5X5_1000", DICT_5X5_1000;
    Dict6x6_50 => "DICT_6X6_50", DICT_6X6_50;
    Dict6x6_100 => "DICT_6X6_100", DICT_6X6_100;
    Dict6x6_250 => "DICT_6X6_250", DICT_6X6_250;
    Dict6x6_1000 => "DICT_6X6_1000", DICT_6X6_1000;
    Dict7x7_50 => "DICT_7X7_50", DICT_7X7_50;
    Dict7x7_100 => "DICT_7X7_100", DICT_7X7_100;
    Dict7x7_250 => "DICT_7X7_250", DICT_7X7_250;
    Dict7x7_1000 => "DICT_7X7_1000", DICT_7X7_1000;
    ArucoOriginal => "DICT_ARUCO_ORIGINAL", DICT_ARUCO_ORIGINAL;
}

impl Default for ArucoDictionary {
    fn default() -> Self {
        Self::Dict6x6_250
    }
}

impl fmt::Display for ArucoDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown ArUco dictionary {0:?}")]
pub struct UnknownDictionary(pub String);

impl FromStr for ArucoDictionary {
    type Err = UnknownDictionary;

    /// Accepts the OpenCV name with or without the `DICT_` prefix, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let wanted = if upper.starts_with("DICT_") {
            upper
        } else {
            format!("DICT_{upper}")
        };
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.name() == wanted)
            .ok_or_else(|| UnknownDictionary(s.to_owned()))
    }
}

/// Settings for [`crate::OpenCvBackend`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenCvConfig {
    pub dictionary: ArucoDictionary,
    /// Half-size of the sub-pixel corner refinement window; `0` disables refinement.
    pub subpix_window: u32,
    /// Pass adaptive thresholding and image normalisation to the chessboard search.
    pub adaptive_threshold: bool,
    /// Run the quick rejection pass before the full chessboard search.
    pub fast_check: bool,
}

impl Default for OpenCvConfig {
    fn default() -> Self {
        Self {
            dictionary: ArucoDictionary::default(),
            subpix_window: 11,
            adaptive_threshold: true,
            fast_check: true,
        }
    }
}

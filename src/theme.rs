use owo_colors::Rgb;
use serde::{Deserialize, Deserializer};

/// Color theme configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Theme {
    #[serde(default = "default_directory", deserialize_with = "deserialize_color")]
    pub directory: Rgb,

    #[serde(default = "default_executable", deserialize_with = "deserialize_color")]
    pub executable: Rgb,

    #[serde(default = "default_symlink", deserialize_with = "deserialize_color")]
    pub symlink: Rgb,

    #[serde(default = "default_hardlink", deserialize_with = "deserialize_color")]
    pub hardlink: Rgb,

    #[serde(default = "default_permissions", deserialize_with = "deserialize_color")]
    pub permissions: Rgb,

    #[serde(default = "default_size", deserialize_with = "deserialize_color")]
    pub size: Rgb,

    #[serde(default = "default_digest", deserialize_with = "deserialize_color")]
    pub digest: Rgb,

    #[serde(default = "default_layer_marker", deserialize_with = "deserialize_color")]
    pub layer_marker: Rgb,

    #[serde(default = "default_muted", deserialize_with = "deserialize_color")]
    pub muted: Rgb,

    #[serde(default = "default_warning", deserialize_with = "deserialize_color")]
    pub warning: Rgb,
}

/// Deserialize a color from either hex string (#RRGGBB) or RGB array [r, g, b]
fn deserialize_color<'de, D>(deserializer: D) -> Result<Rgb, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ColorValue {
        Hex(String),
        Rgb([u8; 3]),
    }

    match ColorValue::deserialize(deserializer)? {
        ColorValue::Hex(hex) => {
            parse_hex(&hex).ok_or_else(|| D::Error::custom(format!("Invalid hex color: {}", hex)))
        }
        ColorValue::Rgb([r, g, b]) => Ok(Rgb(r, g, b)),
    }
}

/// Parse a color like "#7daea3" or "7daea3"
fn parse_hex(hex: &str) -> Option<Rgb> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

// Default Gruvbox Material Dark theme colors
fn default_directory() -> Rgb {
    Rgb(125, 174, 163) // #7daea3
}

fn default_executable() -> Rgb {
    Rgb(169, 182, 101) // #a9b665
}

fn default_symlink() -> Rgb {
    Rgb(137, 180, 130) // #89b482
}

fn default_hardlink() -> Rgb {
    Rgb(146, 131, 116) // #928374
}

fn default_permissions() -> Rgb {
    Rgb(221, 199, 161) // #ddc7a1
}

fn default_size() -> Rgb {
    Rgb(216, 166, 87) // #d8a657
}

fn default_digest() -> Rgb {
    Rgb(211, 134, 155) // #d3869b
}

fn default_layer_marker() -> Rgb {
    Rgb(231, 138, 78) // #e78a4e
}

fn default_muted() -> Rgb {
    Rgb(146, 131, 116) // #928374
}

fn default_warning() -> Rgb {
    Rgb(234, 105, 98) // #ea6962
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            directory: default_directory(),
            executable: default_executable(),
            symlink: default_symlink(),
            hardlink: default_hardlink(),
            permissions: default_permissions(),
            size: default_size(),
            digest: default_digest(),
            layer_marker: default_layer_marker(),
            muted: default_muted(),
            warning: default_warning(),
        }
    }
}

impl Theme {
    /// Parse a theme from a JSON string; missing fields keep their defaults
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_theme() {
        let theme = Theme::default();
        assert_eq!(theme.directory, Rgb(125, 174, 163));
        assert_eq!(theme.executable, Rgb(169, 182, 101));
    }

    #[test]
    fn test_parse_hex_color() {
        let theme = Theme::from_json(r##"{"directory": "#ff0000"}"##).unwrap();
        assert_eq!(theme.directory, Rgb(255, 0, 0));
        // Other fields should have defaults
        assert_eq!(theme.executable, default_executable());
    }

    #[test]
    fn test_parse_rgb_array() {
        let theme = Theme::from_json(r#"{"digest": [255, 128, 64]}"#).unwrap();
        assert_eq!(theme.digest, Rgb(255, 128, 64));
        assert_eq!(theme.directory, default_directory());
    }

    #[test]
    fn test_parse_hex_without_hash() {
        let theme = Theme::from_json(r#"{"symlink": "89b482"}"#).unwrap();
        assert_eq!(theme.symlink, Rgb(137, 180, 130));
    }

    #[test]
    fn test_invalid_colors() {
        assert!(Theme::from_json(r##"{"size": "#12345"}"##).is_err());
        assert!(Theme::from_json(r##"{"size": "#gggggg"}"##).is_err());
        assert!(Theme::from_json(r#"{"size": [1, 2]}"#).is_err());
        assert!(Theme::from_json(r##"{"size": "#ééé"}"##).is_err());
    }
}

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use tilepack_tile_utils::TileCoord;

use crate::config::ConfigError;

/// A tile URL with `{z}`, `{x}` and `{y}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        let missing: Vec<_> = ["{z}", "{x}", "{y}"]
            .into_iter()
            .filter(|p| !template.contains(p))
            .collect();
        if missing.is_empty() {
            Ok(Self(template))
        } else {
            Err(ConfigError::InvalidUrlTemplate(template, missing.join(", ")))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn render(&self, tile: TileCoord) -> String {
        self.0
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }
}

impl FromStr for UrlTemplate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for UrlTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

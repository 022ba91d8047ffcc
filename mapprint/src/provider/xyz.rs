//! XYZ tile URL templates.
//!
//! Templates contain `{x}`, `{y}` and `{z}` placeholders plus optional
//! subdomain-rotation tokens like `{a-c}` or `{1-4}`. Rotation is
//! deterministic by tile coordinate so that planning the same viewport
//! twice produces the same URLs.

use regex::Regex;

use super::ProviderError;
use crate::tile::TileCoord;

/// A parsed XYZ URL template.
#[derive(Debug, Clone)]
pub struct XyzTemplate {
    template: String,
    rotation: Regex,
}

impl XyzTemplate {
    /// Parses a template, validating that it contains the coordinate
    /// placeholders.
    pub fn new(template: impl Into<String>) -> Result<Self, ProviderError> {
        let template = template.into();
        for placeholder in ["{x}", "{y}", "{z}"] {
            if !template.contains(placeholder) {
                return Err(ProviderError::BadTemplate(format!(
                    "template '{}' is missing {}",
                    template, placeholder
                )));
            }
        }
        let rotation = Regex::new(r"\{([a-z0-9])-([a-z0-9])\}")
            .map_err(|e| ProviderError::BadTemplate(e.to_string()))?;
        Ok(Self { template, rotation })
    }

    /// Expands the template for one tile.
    pub fn tile_url(&self, tile: TileCoord) -> String {
        let mut url = self
            .template
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
            .replace("{z}", &tile.z.to_string());

        // Expand rotation ranges one at a time; each pick is keyed off the
        // tile coordinate so it is stable across plans.
        while let Some(captures) = self.rotation.captures(&url) {
            let whole = captures.get(0).map(|m| (m.start(), m.end()));
            let (start, end) = match (captures[1].chars().next(), captures[2].chars().next()) {
                (Some(s), Some(e)) => (s, e),
                _ => break,
            };
            let Some((match_start, match_end)) = whole else {
                break;
            };
            let choices: Vec<char> = (start..=end).collect();
            let pick = if choices.is_empty() {
                start
            } else {
                choices[(tile.x as usize + tile.y as usize) % choices.len()]
            };
            url.replace_range(match_start..match_end, &pick.to_string());
        }
        url
    }
}

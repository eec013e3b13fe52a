//! Output formats for image variants and `Accept` negotiation.

use std::fmt;

// == Variant Format ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VariantFormat {
    #[default]
    Png,
    Webp,
    Avif,
}

/// Preference order when a client accepts several formats.
const PREFERENCE: [VariantFormat; 3] = [VariantFormat::Avif, VariantFormat::Webp, VariantFormat::Png];

impl VariantFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantFormat::Png => "png",
            VariantFormat::Webp => "webp",
            VariantFormat::Avif => "avif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            VariantFormat::Png => "image/png",
            VariantFormat::Webp => "image/webp",
            VariantFormat::Avif => "image/avif",
        }
    }

    // == Negotiate ==
    /// Picks the best format an `Accept` header declares, avif first, then
    /// webp, then png. Falls back to png.
    pub fn negotiate(accept: Option<&str>) -> Self {
        let Some(accept) = accept else {
            return Self::default();
        };

        let offered: Vec<&str> = accept
            .split(',')
            .filter_map(|item| item.split(';').next())
            .map(str::trim)
            .collect();

        PREFERENCE
            .into_iter()
            .find(|format| {
                offered
                    .iter()
                    .any(|media| media.eq_ignore_ascii_case(format.mime_type()))
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for VariantFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

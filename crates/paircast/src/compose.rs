//! Pair selection and message composition.
//!
//! Both collaborators are deliberately small: the selector picks from an
//! already-ranked list and the composer fills a fixed template. They sit
//! behind traits so the cycle machinery, which owns all retry behavior, can
//! be driven against scripted stand-ins.

use crate::config::MessageSettings;
use crate::types::Pair;

/// Picks the pair to publish out of the ranked set.
#[cfg_attr(test, mockall::automock)]
pub trait PairSelector: Send + Sync {
    /// One pair from `pairs`, or `None` when nothing qualifies.
    fn select(&self, pairs: &[Pair]) -> Option<Pair>;
}

/// Renders the update text for a pair.
#[cfg_attr(test, mockall::automock)]
pub trait MessageComposer: Send + Sync {
    /// The message text, or `None` when rendering comes up empty.
    fn compose(&self, pair: &Pair) -> Option<String>;
}

/// Takes the highest-ranked pair. The ranking source already ordered the
/// set, so position zero is the answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopVolumeSelector;

impl PairSelector for TopVolumeSelector {
    fn select(&self, pairs: &[Pair]) -> Option<Pair> {
        pairs.first().cloned()
    }
}

/// Fills the configured template with the pair's fields.
///
/// Placeholders: `{pair}` (symbol), `{volume}` (human-scale compound
/// volume), `{venues}` (joined venue list, truncated to the configured
/// limit).
#[derive(Debug, Clone)]
pub struct TemplateComposer {
    template: String,
    venues_limit: usize,
}

impl TemplateComposer {
    pub fn new(settings: &MessageSettings) -> Self {
        Self {
            template: settings.template.clone(),
            venues_limit: settings.venues_limit as usize,
        }
    }
}

impl MessageComposer for TemplateComposer {
    fn compose(&self, pair: &Pair) -> Option<String> {
        let venues = pair
            .venues
            .iter()
            .take(self.venues_limit)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let text = self
            .template
            .replace("{pair}", &pair.symbol)
            .replace("{volume}", &format_volume(pair.compound_volume))
            .replace("{venues}", &venues)
            .trim()
            .to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Human-scale volume: 1_234_567.0 renders as "1.23M".
fn format_volume(volume: f64) -> String {
    if volume >= 1e9 {
        format!("{:.2}B", volume / 1e9)
    } else if volume >= 1e6 {
        format!("{:.2}M", volume / 1e6)
    } else if volume >= 1e3 {
        format!("{:.2}K", volume / 1e3)
    } else {
        format!("{volume:.2}")
    }
}

use crate::core::types::{AdaptationStatus, MediaStatus};

pub const SKU_NEW_VOLUME: &str = "Vol 1 (New)";
pub const SKU_USED_SET: &str = "Complete Set (Used)";

/// Ongoing series sell first volumes new; finished ones move as used sets.
pub fn manga_sku(publication: MediaStatus) -> &'static str {
    if publication == MediaStatus::Releasing {
        SKU_NEW_VOLUME
    } else {
        SKU_USED_SET
    }
}

/// Goods suggestions from merch intent, demand velocity and adaptation stage.
/// Always returns at least one entry.
pub fn goods_skus(intent_merch: f64, velocity: f64, adaptation: AdaptationStatus) -> Vec<&'static str> {
    let mut skus = Vec::new();

    if intent_merch > 20.0 {
        skus.push("Scale Figure");
    } else if intent_merch > 5.0 {
        skus.push("Acrylic Stand");
    }
    if velocity > 0.5 {
        skus.push("Preorder Bonus");
    }
    if adaptation == AdaptationStatus::Announced {
        skus.push("Anime Hype Investment");
    }
    if skus.is_empty() {
        skus.push("General Merch");
    }
    skus
}

use crate::travel::{AdventureDate, Photo};
use std::collections::HashSet;

/// Group photos into one adventure per capture date.
///
/// Dates appear in the order they are first seen and each adventure's
/// thumbnail is the URL of the first photo taken on that date. Photos
/// without a capture date do not contribute.
pub fn aggregate(photos: &[Photo]) -> Vec<AdventureDate> {
    let mut seen: HashSet<&str> = HashSet::new();
    // label -> thumbnail, in insertion order
    let mut thumbnails: Vec<(&str, &str)> = Vec::new();

    for photo in photos {
        let Some(label) = photo.date_label() else {
            continue;
        };
        if seen.insert(label) {
            thumbnails.push((label, photo.url()));
        }
    }

    thumbnails
        .into_iter()
        .map(|(label, url)| AdventureDate::new(label, url))
        .collect()
}

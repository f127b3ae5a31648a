//! Merging confirmed background selections back into a listing's images.

use std::collections::BTreeMap;

use crate::image::Image;
use crate::types::PublicId;

/// Replace the URL of every image that has a selection and mark it
/// processed. Images without a selection pass through untouched, and
/// selections for images not in the list are dropped.
pub fn merge_selections(images: &[Image], selections: &BTreeMap<PublicId, String>) -> Vec<Image> {
    images
        .iter()
        .map(|image| match selections.get(&image.public_id) {
            Some(url) => Image {
                public_id: image.public_id.clone(),
                url: url.clone(),
                processed: true,
            },
            None => image.clone(),
        })
        .collect()
}

/// Number of images in `images` that a merge would change.
pub fn count_applicable(images: &[Image], selections: &BTreeMap<PublicId, String>) -> usize {
    images
        .iter()
        .filter(|i| selections.contains_key(&i.public_id))
        .count()
}

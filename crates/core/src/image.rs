//! Listing image records as stored by the listing backend.

use serde::{Deserialize, Serialize};

use crate::types::PublicId;

/// One image attached to a vehicle listing.
///
/// `public_id` never changes for the lifetime of the asset; `url` is the
/// current display URL and is replaced whenever a new background
/// variant is selected and saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub public_id: PublicId,
    pub url: String,
    /// Set once the image has been replaced by a processed variant.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub processed: bool,
}

impl Image {
    pub fn new(public_id: impl Into<PublicId>, url: impl Into<String>) -> Self {
        Self {
            public_id: public_id.into(),
            url: url.into(),
            processed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_without_processed_flag() {
        let json = r#"{"publicId":"cars/abc","url":"https://cdn/abc.jpg"}"#;
        let image: Image = serde_json::from_str(json).unwrap();
        assert_eq!(image, Image::new("cars/abc", "https://cdn/abc.jpg"));
    }

    #[test]
    fn unprocessed_flag_is_not_serialized() {
        let json = serde_json::to_value(Image::new("a", "u")).unwrap();
        assert!(json.get("processed").is_none());
        assert_eq!(json["publicId"], "a");
    }

    #[test]
    fn processed_flag_is_serialized_when_set() {
        let mut image = Image::new("a", "u");
        image.processed = true;
        let json = serde_json::to_value(image).unwrap();
        assert_eq!(json["processed"], true);
    }
}

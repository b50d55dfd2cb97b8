//! Metadata records describing uploaded image files.
//!
//! The blob itself already lives in object storage by the time one of these
//! is created; the record only makes it discoverable in the `images`
//! collection.

use serde::{Deserialize, Serialize};

/// What the uploaded image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    Product,
    User,
    Order,
    #[default]
    General,
}

/// Optional descriptive metadata for an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An image record that has not been written yet.
///
/// The store assigns the document ID and the `uploadedAt` timestamp.
/// `None` fields are left out of the stored document entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImageUpload {
    pub file_name: String,
    pub original_name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Size in bytes.
    pub size: u64,
    pub mime_type: String,
    pub uploaded_by: String,
    #[serde(default)]
    pub category: ImageCategory,
    /// ID of the related product, user or order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ImageMetadata>,
}

const fn default_active() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_optionals_are_omitted() {
        let record = NewImageUpload {
            file_name: "abc.jpg".to_string(),
            original_name: "IMG_0001.jpg".to_string(),
            url: "https://cdn.example/abc.jpg".to_string(),
            thumbnail_url: None,
            size: 2048,
            mime_type: "image/jpeg".to_string(),
            uploaded_by: "admin".to_string(),
            category: ImageCategory::Product,
            reference_id: None,
            tags: vec![],
            is_active: true,
            metadata: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("thumbnailUrl"));
        assert!(!obj.contains_key("referenceId"));
        assert!(!obj.contains_key("tags"));
        assert_eq!(obj["category"], "product");
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{"fileName":"a","originalName":"a","url":"u","size":1,"mimeType":"image/png","uploadedBy":"x"}"#;
        let record: NewImageUpload = serde_json::from_str(json).unwrap();
        assert!(record.is_active);
        assert_eq!(record.category, ImageCategory::General);
    }
}

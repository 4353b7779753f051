//! Normalized fetch metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw info document produced by a fetch engine at the end of its processing chain
pub type RawInfo = Map<String, Value>;

/// Codecs of the fetched media
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Codecs {
    /// Audio codec
    pub audio: Option<String>,
    /// Video codec
    pub video: Option<String>,
}

/// Where the fetched bytes ended up locally
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Downloaded {
    /// Local path of the downloaded file
    pub filename: Option<String>,
    /// Size in bytes
    pub filesize_bytes: Option<u64>,
}

/// Description of the remote resource
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Description text
    pub description: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Canonical page URL
    pub original_url: Option<String>,
    /// Tags
    pub tags: Option<Vec<String>>,
    /// Thumbnail URLs
    pub thumbnails: Option<Vec<String>>,
    /// Title
    pub title: Option<String>,
}

/// Who published the resource
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Uploader {
    /// Uploader ID
    pub id: Option<String>,
    /// Uploader page URL
    pub url: Option<String>,
}

/// Normalized metadata document; the fetch stage's result
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedInfo {
    /// Codecs
    #[serde(default)]
    pub codecs: Codecs,
    /// Local download
    #[serde(default)]
    pub downloaded: Downloaded,
    /// Remote source
    #[serde(default)]
    pub source: Source,
    /// Uploader
    #[serde(default)]
    pub uploader: Uploader,
}

/// Build the normalized document from a raw engine info document
///
/// Absent or wrongly typed source fields become `None`; this never fails.
pub fn normalize(raw: &RawInfo) -> NormalizedInfo {
    NormalizedInfo {
        codecs: Codecs {
            audio: string(raw, "acodec"),
            video: string(raw, "vcodec"),
        },
        downloaded: Downloaded {
            filename: string(raw, "filepath").or_else(|| string(raw, "_filename")),
            filesize_bytes: raw.get("filesize").and_then(Value::as_u64),
        },
        source: Source {
            description: string(raw, "description"),
            duration: raw.get("duration").and_then(Value::as_f64),
            original_url: string(raw, "webpage_url"),
            tags: raw.get("tags").and_then(Value::as_array).map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            }),
            thumbnails: raw.get("thumbnails").and_then(Value::as_array).map(|thumbs| {
                thumbs
                    .iter()
                    .filter_map(|thumb| thumb.get("url").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            }),
            title: string(raw, "title"),
        },
        uploader: Uploader {
            id: string(raw, "uploader_id"),
            url: string(raw, "uploader_url"),
        },
    }
}

fn string(raw: &RawInfo, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

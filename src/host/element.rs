//! Host elements: files and media attached to messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::session::PersistedFile;

/// Display type of an element, inferred from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// `image/*`
    Image,
    /// `audio/*`
    Audio,
    /// `video/*`
    Video,
    /// `application/pdf`
    Pdf,
    /// Anything else.
    File,
}

impl ElementKind {
    /// Infer the element kind from a MIME type.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime == "application/pdf" {
            Self::Pdf
        } else {
            Self::File
        }
    }
}

/// Where the host shows an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementDisplay {
    /// Inside the message.
    #[default]
    Inline,
    /// In a side panel.
    Side,
    /// On a separate page.
    Page,
}

/// A file or media element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Element id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display type.
    pub kind: ElementKind,
    /// Where the element is shown.
    #[serde(default)]
    pub display: ElementDisplay,
    /// Declared MIME type.
    #[serde(default)]
    pub mime: Option<String>,
    /// Remote content URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Local path of the content.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Key of the session file holding the content.
    #[serde(default)]
    pub file_key: Option<String>,
}

impl Element {
    /// Inline element backed by a session file.
    pub fn from_persisted(file: &PersistedFile) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            kind: ElementKind::from_mime(&file.mime),
            display: ElementDisplay::Inline,
            mime: Some(file.mime.clone()),
            url: None,
            path: Some(file.path.clone()),
            file_key: Some(file.id.clone()),
        }
    }

    /// Inline element pointing at a remote URL.
    pub fn from_url(name: impl Into<String>, url: impl Into<String>, mime: Option<String>) -> Self {
        let kind = mime
            .as_deref()
            .map_or(ElementKind::File, ElementKind::from_mime);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            display: ElementDisplay::Inline,
            mime,
            url: Some(url.into()),
            path: None,
            file_key: None,
        }
    }
}

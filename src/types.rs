//! Core types for checkpoint-stream

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Content type of a tar+gzip archive
pub const MIME_APPLICATION_GZIP: &str = "application/gzip";

/// Content type of a zip archive
pub const MIME_APPLICATION_ZIP: &str = "application/zip";

/// Archive format a checkpoint is streamed as
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    /// POSIX tar wrapped in a single gzip stream
    TarGz,
    /// Zip with streamed (data-descriptor) entries
    Zip,
}

impl ArchiveFormat {
    /// MIME type sent as the response content type
    pub fn mime_type(&self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => MIME_APPLICATION_GZIP,
            ArchiveFormat::Zip => MIME_APPLICATION_ZIP,
        }
    }

    /// Parse an exact MIME type; anything else is rejected
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        match mime_type {
            MIME_APPLICATION_GZIP => Some(ArchiveFormat::TarGz),
            MIME_APPLICATION_ZIP => Some(ArchiveFormat::Zip),
            _ => None,
        }
    }

    /// Conventional file extension, used for the download filename
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Zip => "zip",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

use image::ImageFormat;
use pdi_core::sha256_hex;
use pdi_model::sanitize_token;
use pdi_store::{StorageLayout, THUMB_PREFIX};
use std::fmt::{Display, Formatter};
use std::fs;
use tracing::warn;

const FIELD_PREFIX_MAX_LEN: usize = 40;
const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeError {
    Empty,
    TooLarge { limit_bytes: u64 },
    UnsupportedExtension(String),
    UnsupportedFormat(String),
    Decode(String),
    Io(String),
}

impl Display for IntakeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "upload is empty"),
            Self::TooLarge { limit_bytes } => {
                write!(f, "upload exceeds the {limit_bytes} byte limit")
            }
            Self::UnsupportedExtension(ext) => write!(f, "unsupported file extension: {ext}"),
            Self::UnsupportedFormat(msg) => write!(f, "unsupported image format: {msg}"),
            Self::Decode(msg) => write!(f, "image decode failed: {msg}"),
            Self::Io(msg) => write!(f, "image store i/o failure: {msg}"),
        }
    }
}

impl std::error::Error for IntakeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Storage-relative path of the stored original.
    pub stored_path: String,
    /// Storage-relative thumbnail path, when one was produced.
    pub thumb_path: Option<String>,
    pub width: u32,
    pub height: u32,
    pub checksum: String,
}

/// Validates and stores one uploaded image.
///
/// Validation order is fixed: size, client extension, byte sniff, decode.
/// The stored file keeps the uploaded bytes untouched; the canonical
/// extension comes from the sniffed format, never from the client name.
#[derive(Debug, Clone)]
pub struct ImageIntake {
    layout: StorageLayout,
    max_upload_bytes: u64,
    thumbnail_max_px: u32,
}

impl ImageIntake {
    #[must_use]
    pub fn new(layout: StorageLayout, max_upload_bytes: u64, thumbnail_max_px: u32) -> Self {
        Self {
            layout,
            max_upload_bytes,
            thumbnail_max_px,
        }
    }

    pub fn accept(
        &self,
        field_name: &str,
        client_file_name: &str,
        bytes: &[u8],
        now: i64,
    ) -> Result<StoredImage, IntakeError> {
        if bytes.is_empty() {
            return Err(IntakeError::Empty);
        }
        if bytes.len() as u64 > self.max_upload_bytes {
            return Err(IntakeError::TooLarge {
                limit_bytes: self.max_upload_bytes,
            });
        }

        // A .png holding JPEG bytes is fine; the sniffed type wins. The
        // claimed extension only has to be in the allowlist at all.
        client_extension(client_file_name)?;
        let format = image::guess_format(bytes)
            .map_err(|e| IntakeError::UnsupportedFormat(e.to_string()))?;
        let ext = canonical_extension(format).ok_or_else(|| {
            IntakeError::UnsupportedFormat(format!("{format:?} is not an accepted format"))
        })?;

        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| IntakeError::Decode(e.to_string()))?;
        let (width, height) = (decoded.width(), decoded.height());

        let prefix = sanitize_token(field_name, FIELD_PREFIX_MAX_LEN);
        let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
        let file_name = format!("{prefix}_{now}_{suffix}.{ext}");
        let abs = self.layout.images_dir().join(&file_name);

        let tmp = abs.with_extension(format!("{ext}.tmp"));
        fs::write(&tmp, bytes).map_err(|e| IntakeError::Io(e.to_string()))?;
        fs::rename(&tmp, &abs).map_err(|e| IntakeError::Io(e.to_string()))?;

        let stored_path = self
            .layout
            .to_storage_relative(&abs)
            .map_err(|e| IntakeError::Io(e.to_string()))?;

        // Thumbnails are a convenience artifact: failures never reject an
        // otherwise valid upload.
        let thumb_path = if width > self.thumbnail_max_px || height > self.thumbnail_max_px {
            let thumb_name = format!("{THUMB_PREFIX}{file_name}");
            let thumb_abs = self.layout.images_dir().join(&thumb_name);
            let thumb = decoded.thumbnail(self.thumbnail_max_px, self.thumbnail_max_px);
            match thumb.save_with_format(&thumb_abs, format) {
                Ok(()) => self.layout.to_storage_relative(&thumb_abs).ok(),
                Err(e) => {
                    warn!(field = field_name, error = %e, "thumbnail generation failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(StoredImage {
            stored_path,
            thumb_path,
            width,
            height,
            checksum: sha256_hex(bytes),
        })
    }
}

fn client_extension(file_name: &str) -> Result<String, IntakeError> {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(IntakeError::UnsupportedExtension(if ext.is_empty() {
            "(none)".to_string()
        } else {
            ext
        }))
    }
}

fn canonical_extension(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Png => Some("png"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::WebP => Some("webp"),
        _ => None,
    }
}

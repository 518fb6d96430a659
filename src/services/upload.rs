//! Upload validation pipeline: size, extension, sniffed content type,
//! structural decode probe, safe destination naming.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::task;
use tracing::{info, warn};

use crate::config::UploadsConfig;
use crate::services::image::ImageOptimizer;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload failed in transit: {0}")]
    Transport(String),

    #[error("File exceeds the maximum allowed size of {max} bytes")]
    TooLarge { max: u64 },

    #[error("File extension .{0} is not allowed here")]
    BadExtension(String),

    #[error("File content does not match its extension; possibly corrupted or disguised")]
    MimeMismatch,

    #[error("Image file is corrupt and cannot be decoded")]
    CorruptImage,

    #[error("Refusing to touch a path outside the upload root")]
    PolicyViolation,

    #[error("Failed to store file: {0}")]
    Storage(String),
}

/// Which admin form field the file arrived in. Each variant carries its own
/// validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadField {
    /// Illustration attached to a content item.
    Image,
    /// PDF / Word attachment of a content item.
    Document,
    /// Gallery photo belonging to an album.
    Photo,
}

impl UploadField {
    #[must_use]
    pub const fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Image | Self::Photo => &["jpg", "jpeg", "png"],
            Self::Document => &["pdf", "doc", "docx"],
        }
    }

    #[must_use]
    pub const fn max_bytes(self, config: &UploadsConfig) -> u64 {
        match self {
            Self::Image => config.max_image_bytes,
            Self::Document => config.max_document_bytes,
            Self::Photo => config.max_photo_bytes,
        }
    }

    #[must_use]
    const fn is_image(self) -> bool {
        matches!(self, Self::Image | Self::Photo)
    }
}

/// Outcome of a successful store: the generated name plus what was learned
/// about the file on the way in.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
    pub original_name: String,
    pub size: u64,
    pub mime: &'static str,
}

pub struct UploadService {
    root: PathBuf,
    config: UploadsConfig,
    optimizer: ImageOptimizer,
}

impl UploadService {
    #[must_use]
    pub fn new(config: UploadsConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root),
            optimizer: ImageOptimizer::from_config(&config),
            config,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate and persist one uploaded file under `<root>/<subdir>/`.
    ///
    /// Checks run in order and short-circuit on the first failure. The
    /// stored name is server-generated (timestamp + random suffix); the
    /// client-supplied name is kept only as metadata, so it can never
    /// traverse paths or overwrite an existing file.
    pub async fn store(
        &self,
        field: UploadField,
        subdir: &str,
        original_name: &str,
        data: Vec<u8>,
    ) -> Result<StoredFile, UploadError> {
        if data.is_empty() {
            return Err(UploadError::Transport("empty upload".to_string()));
        }

        let max = field.max_bytes(&self.config);
        if data.len() as u64 > max {
            return Err(UploadError::TooLarge { max });
        }

        let extension = extension_of(original_name)
            .ok_or_else(|| UploadError::BadExtension(String::new()))?;
        if !field.allowed_extensions().contains(&extension.as_str()) {
            return Err(UploadError::BadExtension(extension));
        }

        // Trust the bytes, not the client-declared type.
        let mime = sniff_mime(&data).ok_or(UploadError::MimeMismatch)?;
        if !allowed_mimes_for(&extension).contains(&mime) {
            return Err(UploadError::MimeMismatch);
        }

        // Decode probe + downscale are CPU-bound; keep them off the runtime.
        let data = if field.is_image() {
            let ext = extension.clone();
            let optimizer = self.optimizer;
            task::spawn_blocking(move || {
                let img =
                    image::load_from_memory(&data).map_err(|_| UploadError::CorruptImage)?;
                Ok::<Vec<u8>, UploadError>(optimizer.shrink(&img, &ext).unwrap_or(data))
            })
            .await
            .map_err(|e| UploadError::Storage(format!("image task panicked: {e}")))??
        } else {
            data
        };

        let filename = unique_filename(&extension);
        let dir = self.root.join(subdir);

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        let path = dir.join(&filename);
        fs::write(&path, &data)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;
        let path = fs::canonicalize(&path).await.unwrap_or(path);

        // Owner read/write, world read, never executable.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(|e| UploadError::Storage(e.to_string()))?;
        }

        info!(
            filename = %filename,
            original = %original_name,
            size = data.len(),
            mime,
            "Stored upload"
        );

        Ok(StoredFile {
            filename,
            path,
            original_name: original_name.to_string(),
            size: data.len() as u64,
            mime,
        })
    }

    /// Unlink a stored file. The target's directory must canonicalize to a
    /// descendant of the upload root; anything else is refused as a policy
    /// violation rather than an I/O error. A missing file is a no-op.
    pub async fn delete(&self, subdir: &str, filename: &str) -> Result<(), UploadError> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(UploadError::PolicyViolation);
        }

        let root = match fs::canonicalize(&self.root).await {
            Ok(root) => root,
            // No upload root yet means nothing was ever stored.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(UploadError::Storage(e.to_string())),
        };

        let dir = match fs::canonicalize(self.root.join(subdir)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(UploadError::Storage(e.to_string())),
        };

        if !dir.starts_with(&root) {
            warn!(subdir, filename, "Refused deletion outside upload root");
            return Err(UploadError::PolicyViolation);
        }

        match fs::remove_file(dir.join(filename)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UploadError::Storage(e.to_string())),
        }
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// MIME type from magic bytes. Only the types this system accepts are
/// recognized; everything else is `None`.
fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if data.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else if data.starts_with(&[b'P', b'K', 0x03, 0x04]) {
        Some("application/zip")
    } else if data.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        Some("application/msword")
    } else {
        None
    }
}

fn allowed_mimes_for(extension: &str) -> &'static [&'static str] {
    match extension {
        "jpg" | "jpeg" => &["image/jpeg"],
        "png" => &["image/png"],
        "pdf" => &["application/pdf"],
        // DOCX is a zip container.
        "docx" => &["application/zip"],
        "doc" => &["application/msword"],
        _ => &[],
    }
}

/// Unique and non-predictable: UTC timestamp plus a random suffix. The
/// original name never reaches the filesystem.
fn unique_filename(extension: &str) -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);

    let suffix = bytes.iter().fold(String::with_capacity(16), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    });

    format!(
        "{}_{}.{}",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        suffix,
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(root: &Path) -> UploadService {
        let config = UploadsConfig {
            root: root.to_string_lossy().into_owned(),
            ..UploadsConfig::default()
        };
        UploadService::new(config)
    }

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("civitas-upload-{tag}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut out = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn sniffs_the_supported_types() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_mime(b"%PDF-1.7 ..."), Some("application/pdf"));
        assert_eq!(sniff_mime(b"PK\x03\x04rest"), Some("application/zip"));
        assert_eq!(sniff_mime(b"MZ\x90\x00"), None);
        assert_eq!(sniff_mime(b""), None);
    }

    #[test]
    fn filenames_are_unique_and_keep_the_extension() {
        let a = unique_filename("pdf");
        let b = unique_filename("pdf");
        assert_ne!(a, b);
        assert!(a.ends_with(".pdf"));
    }

    #[test]
    fn extension_comparison_is_case_insensitive() {
        assert_eq!(extension_of("Raport.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("no-extension"), None);
    }

    #[tokio::test]
    async fn spoofed_extension_is_rejected_as_mime_mismatch() {
        let root = temp_root("spoof");
        let svc = service(&root);

        // Executable content wearing a .pdf extension.
        let result = svc
            .store(
                UploadField::Document,
                "documents",
                "malware.pdf",
                b"MZ\x90\x00\x03executable".to_vec(),
            )
            .await;

        assert!(matches!(result, Err(UploadError::MimeMismatch)));
    }

    #[tokio::test]
    async fn disallowed_extension_is_rejected() {
        let root = temp_root("ext");
        let svc = service(&root);

        let result = svc
            .store(
                UploadField::Document,
                "documents",
                "script.exe",
                b"%PDF-pretending".to_vec(),
            )
            .await;

        assert!(matches!(result, Err(UploadError::BadExtension(ref e)) if e == "exe"));
    }

    #[tokio::test]
    async fn truncated_png_is_rejected_as_corrupt() {
        let root = temp_root("corrupt");
        let svc = service(&root);

        let mut data = png_bytes(16, 16);
        data.truncate(20); // keep the signature, destroy the structure

        let result = svc
            .store(UploadField::Photo, "gallery", "photo.png", data)
            .await;

        assert!(matches!(result, Err(UploadError::CorruptImage)));
    }

    #[tokio::test]
    async fn valid_png_is_stored_under_a_generated_name() {
        let root = temp_root("ok");
        let svc = service(&root);

        let stored = svc
            .store(UploadField::Photo, "gallery", "vara 2024.png", png_bytes(16, 16))
            .await
            .expect("valid upload");

        assert_ne!(stored.filename, "vara 2024.png");
        assert!(stored.path.exists());
        assert_eq!(stored.original_name, "vara 2024.png");
        assert_eq!(stored.mime, "image/png");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let root = temp_root("size");
        let config = UploadsConfig {
            root: root.to_string_lossy().into_owned(),
            max_document_bytes: 16,
            ..UploadsConfig::default()
        };
        let svc = UploadService::new(config);

        let result = svc
            .store(
                UploadField::Document,
                "documents",
                "big.pdf",
                b"%PDF-1.7 0123456789 0123456789".to_vec(),
            )
            .await;

        assert!(matches!(result, Err(UploadError::TooLarge { max: 16 })));
    }

    #[tokio::test]
    async fn delete_refuses_traversal() {
        let root = temp_root("traversal");
        let svc = service(&root);

        let result = svc.delete("documents", "../../etc/passwd").await;
        assert!(matches!(result, Err(UploadError::PolicyViolation)));
    }

    #[tokio::test]
    async fn deleting_a_missing_file_is_a_no_op() {
        let root = temp_root("noop");
        let svc = service(&root);

        assert!(svc.delete("documents", "never-existed.pdf").await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_a_stored_file() {
        let root = temp_root("delete");
        let svc = service(&root);

        let stored = svc
            .store(UploadField::Photo, "gallery", "p.png", png_bytes(8, 8))
            .await
            .unwrap();

        svc.delete("gallery", &stored.filename).await.unwrap();
        assert!(!stored.path.exists());
    }
}

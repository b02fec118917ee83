use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::send::SendError;

#[derive(Error, Debug)]
pub enum PickError {
    #[error("Dosya bulunamadı: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Klasör bulunamadı: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// Where per-recipient images come from. Only one mode can be active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageSource {
    #[default]
    None,
    /// One image shared by every recipient.
    Single(PathBuf),
    /// A folder holding `1.png`, `2.png`, ... matched to recipients by position.
    Folder(PathBuf),
}

impl ImageSource {
    /// Picks a single image. The path must name an existing file.
    pub fn single(input: &str) -> Result<Self, PickError> {
        let path = expand_path(input);
        if path.is_file() {
            Ok(Self::Single(path))
        } else {
            Err(PickError::NotAFile(path))
        }
    }

    /// Picks an image folder. The path must name an existing directory.
    pub fn folder(input: &str) -> Result<Self, PickError> {
        let path = expand_path(input);
        if path.is_dir() {
            Ok(Self::Folder(path))
        } else {
            Err(PickError::NotADirectory(path))
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Path of the image that recipient 1 would receive, if it exists.
    pub fn first_image(&self) -> Option<PathBuf> {
        match self {
            Self::None => None,
            Self::Single(path) => Some(path.clone()),
            Self::Folder(folder) => {
                let path = indexed_image(folder, 1);
                path.exists().then_some(path)
            }
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "Seçili: yok"),
            Self::Single(path) => write!(f, "Seçili tek resim: {}", path.display()),
            Self::Folder(path) => write!(f, "Seçili klasör: {}", path.display()),
        }
    }
}

fn expand_path(input: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(input.trim()).into_owned())
}

/// `{folder}/{index}.png`, with a 1-based index.
pub fn indexed_image(folder: &Path, index: usize) -> PathBuf {
    folder.join(format!("{}.png", index))
}

/// Resolves one attachment path per recipient.
///
/// Folder mode needs `1.png` through `{count}.png` without gaps; the first
/// missing file fails the whole batch.
pub fn build_image_list(source: &ImageSource, count: usize) -> Result<Vec<PathBuf>, SendError> {
    match source {
        ImageSource::None => Err(SendError::NoAttachmentSource),
        ImageSource::Single(path) => Ok(vec![path.clone(); count]),
        ImageSource::Folder(folder) => (1..=count)
            .map(|index| {
                let path = indexed_image(folder, index);
                if path.exists() {
                    Ok(path)
                } else {
                    Err(SendError::MissingAttachment(path))
                }
            })
            .collect(),
    }
}

/// The base name used as the attachment's file name.
pub fn attachment_filename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

//! Storage of the images attached to posts and of their conversions
//!
//! Files live under the media root, one directory per media record:
//!
//! ```text
//! {root}/{media_id}/{file_name}
//! {root}/{media_id}/conversions/thumb.{ext}
//! {root}/{media_id}/conversions/web.{ext}
//! ```

use std::io::Cursor;
use std::path::PathBuf;

use cms_derive::CmsError;
use image::DynamicImage;
use image::ImageFormat;
use image::ImageReader;
use image::imageops::FilterType;
use serde::Serialize;
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

use cms_models::Media;

pub const THUMB_SIZE: (u32, u32) = (150, 150);
pub const WEB_BOUNDS: (u32, u32) = (800, 600);

#[derive(Debug, Error, CmsError)]
#[cms_error(base_id = "media")]
pub enum MediaError {
    #[error("Unsupported media type '{mime_type}', expected a jpeg, png or webp image")]
    #[cms_error(status = 422)]
    UnsupportedFormat { mime_type: String },
    #[error("The uploaded file is not a readable image")]
    #[cms_error(status = 422)]
    CannotReadImage,
    #[error("Could not encode the '{conversion}' conversion")]
    #[cms_error(status = 500)]
    CannotEncode { conversion: String },
    #[error("Could not write the media files")]
    #[cms_error(status = 500)]
    Io(#[from] std::io::Error),
}

/// Where media files are written and how they are served
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub root: PathBuf,
    pub base_url: Url,
}

/// Public URLs of a stored image
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct MediaUrls {
    pub url: String,
    pub thumb: String,
    pub web: String,
}

/// An uploaded image, decoded and ready to be stored
pub struct UploadedImage {
    pub file_name: String,
    pub format: ImageFormat,
    pub data: Vec<u8>,
    image: DynamicImage,
}

impl UploadedImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("jpg")
    }
}

fn supported(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP
    )
}

/// Keeps the base name of an uploaded file and replaces anything unusable in a URL
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        "file".to_owned()
    } else {
        sanitized.to_owned()
    }
}

/// Decodes an upload, rejecting anything but jpeg, png and webp images
pub fn decode_upload(
    file_name: &str,
    content_type: Option<&str>,
    data: Vec<u8>,
) -> Result<UploadedImage, MediaError> {
    let reader = ImageReader::new(Cursor::new(&data))
        .with_guessed_format()
        .map_err(|_| MediaError::CannotReadImage)?;
    let format = match reader.format() {
        Some(format) if supported(format) => format,
        Some(format) => {
            return Err(MediaError::UnsupportedFormat {
                mime_type: format.to_mime_type().to_owned(),
            });
        }
        None => {
            return Err(MediaError::UnsupportedFormat {
                mime_type: content_type.unwrap_or("application/octet-stream").to_owned(),
            });
        }
    };
    let image = reader.decode().map_err(|_| MediaError::CannotReadImage)?;
    Ok(UploadedImage {
        file_name: sanitize_file_name(file_name),
        format,
        data,
        image,
    })
}

/// Square thumbnail, cropped to fill
pub fn thumb(image: &DynamicImage) -> DynamicImage {
    let (width, height) = THUMB_SIZE;
    image.resize_to_fill(width, height, FilterType::Lanczos3)
}

/// Scaled down to fit within the web bounds, smaller images are kept as is
pub fn web(image: &DynamicImage) -> DynamicImage {
    let (width, height) = WEB_BOUNDS;
    if image.width() <= width && image.height() <= height {
        return image.clone();
    }
    image.resize(width, height, FilterType::Lanczos3)
}

fn encode(image: &DynamicImage, format: ImageFormat, conversion: &str) -> Result<Vec<u8>, MediaError> {
    let mut buffer = Cursor::new(Vec::new());
    // the jpeg encoder rejects alpha channels
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image.clone(),
    };
    image
        .write_to(&mut buffer, format)
        .map_err(|_| MediaError::CannotEncode {
            conversion: conversion.to_owned(),
        })?;
    Ok(buffer.into_inner())
}

impl MediaConfig {
    fn directory(&self, media_id: i64) -> PathBuf {
        self.root.join(media_id.to_string())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    pub fn urls(&self, media: &Media) -> MediaUrls {
        let extension = media.extension();
        MediaUrls {
            url: self.url(&format!("{}/{}", media.id, media.file_name)),
            thumb: self.url(&format!("{}/conversions/thumb.{extension}", media.id)),
            web: self.url(&format!("{}/conversions/web.{extension}", media.id)),
        }
    }

    /// Writes the original file and its conversions
    #[tracing::instrument(skip(self, upload), fields(file_name = %upload.file_name), err)]
    pub async fn store(&self, media_id: i64, upload: &UploadedImage) -> Result<(), MediaError> {
        let extension = upload.extension();
        let thumb = encode(&thumb(&upload.image), upload.format, "thumb")?;
        let web = encode(&web(&upload.image), upload.format, "web")?;

        let directory = self.directory(media_id);
        let conversions = directory.join("conversions");
        tokio::fs::create_dir_all(&conversions).await?;
        tokio::fs::write(directory.join(&upload.file_name), &upload.data).await?;
        tokio::fs::write(conversions.join(format!("thumb.{extension}")), thumb).await?;
        tokio::fs::write(conversions.join(format!("web.{extension}")), web).await?;
        tracing::debug!(media_id, "media stored");
        Ok(())
    }

    /// Removes the files of a media, missing files are not an error
    pub async fn remove(&self, media_id: i64) -> Result<(), MediaError> {
        match tokio::fs::remove_dir_all(self.directory(media_id)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(media_id, "media files already removed");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

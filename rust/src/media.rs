use agora_storage_traits::messages::types::MediaRef;
use url::Url;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Origin,
    Webp,
}

impl ImageFormat {
    fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Origin => "origin",
            ImageFormat::Webp => "webp",
        }
    }
}

/// On-the-fly resize parameters understood by the storage render endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageTransform {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
    pub format: Option<ImageFormat>,
}

impl ImageTransform {
    pub const THUMBNAIL: Self = Self {
        width: Some(320),
        height: Some(320),
        quality: Some(70),
        format: Some(ImageFormat::Webp),
    };

    fn is_empty(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.quality.is_none()
            && self.format.is_none()
    }
}

/// Builds object-storage URLs for attachments.
#[derive(Debug, Clone)]
pub struct MediaUrls {
    base: Url,
}

impl MediaUrls {
    pub fn new(base_url: &str) -> Result<Self, CoreError> {
        let mut base = Url::parse(base_url.trim())
            .map_err(|e| CoreError::Config(format!("backend_url {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CoreError::Config(format!("backend_url {base_url:?} is not a base URL")));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    fn join(&self, prefix: &str, media: &MediaRef) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(prefix.split('/'));
            segments.push(&media.bucket);
            segments.extend(media.path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    pub fn public_url(&self, media: &MediaRef) -> String {
        self.join("storage/v1/object/public", media).into()
    }

    /// Resized rendition of an image. Non-image attachments and empty transforms fall back to
    /// the public URL.
    pub fn transformed_url(&self, media: &MediaRef, transform: &ImageTransform) -> String {
        if !media.is_image() || transform.is_empty() {
            return self.public_url(media);
        }
        let mut url = self.join("storage/v1/render/image/public", media);
        {
            let mut query = url.query_pairs_mut();
            if let Some(w) = transform.width {
                query.append_pair("width", &w.to_string());
            }
            if let Some(h) = transform.height {
                query.append_pair("height", &h.to_string());
            }
            if let Some(q) = transform.quality {
                query.append_pair("quality", &q.clamp(20, 100).to_string());
            }
            if let Some(f) = transform.format {
                query.append_pair("format", f.as_str());
            }
        }
        url.into()
    }
}

//! Image classifier collaborator.
//!
//! The classifier is a black box: image in, top label and confidence out. The
//! service talks to it over HTTP; tests substitute their own implementations.

use crate::error::ClassifierError;
use crate::persistence::encode_jpeg;
use image::RgbImage;
use serde::Deserialize;
use std::time::Duration;

/// Top prediction of a classifier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Synchronous image classifier. Implementations must be safe to call from
/// several camera workers at once.
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &RgbImage) -> Result<Classification, ClassifierError>;
}

/// Posts frames as JPEG to an inference endpoint that answers
/// `{"label": "...", "confidence": 0.93}`.
pub struct HttpClassifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpClassifier {
    const JPEG_QUALITY: u8 = 90;

    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Classifier for HttpClassifier {
    fn classify(&self, image: &RgbImage) -> Result<Classification, ClassifierError> {
        let body = encode_jpeg(image, Self::JPEG_QUALITY)?;
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status.as_u16()));
        }
        Ok(response.json::<Classification>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn jpeg_encoding_produces_a_jpeg_stream() {
        let image = RgbImage::from_pixel(8, 8, Rgb([10, 200, 30]));
        let bytes = encode_jpeg(&image, 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn classification_parses_from_json() {
        let parsed: Classification =
            serde_json::from_str(r#"{"label":"violent","confidence":0.91}"#).unwrap();
        assert_eq!(parsed, Classification::new("violent", 0.91));
    }
}

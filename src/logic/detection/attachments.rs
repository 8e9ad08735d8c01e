//! Attachment Checks
//!
//! Hard caps first (count, URL size), then image-type gating, then the
//! external NSFW classifier for allowed image types. Classifier failures
//! degrade to allow.

use serde_json::json;

use crate::logic::classifier::Classifier;
use crate::logic::policy::config::MediaConfig;
use crate::logic::types::{Attachment, ModAction, ThreatType, Verdict};

pub async fn check(
    attachments: &[Attachment],
    media: &MediaConfig,
    classifier: &dyn Classifier,
) -> Option<Verdict> {
    if attachments.is_empty() {
        return None;
    }

    if attachments.len() > media.max_attachments as usize {
        return Some(
            Verdict::new(ModAction::Ban, 0.9, "attachment count over hard cap", ThreatType::Spam)
                .with_evidence(json!({
                    "attachment_count": attachments.len(),
                    "max_attachments": media.max_attachments,
                })),
        );
    }

    for attachment in attachments {
        if attachment.url.len() > media.max_url_length {
            return Some(
                Verdict::new(ModAction::Ban, 0.9, "oversized attachment url", ThreatType::Spam)
                    .with_evidence(json!({
                        "url_length": attachment.url.len(),
                        "max_url_length": media.max_url_length,
                    })),
            );
        }
    }

    for attachment in attachments.iter().filter(|a| a.is_image()) {
        let subtype = attachment.image_subtype().unwrap_or_default();
        if !media.allows_image_type(subtype) {
            // Unknown formats skip the NSFW scan but the message still
            // runs through the remaining stages.
            log::debug!(
                "image type not scanned: {} ({})",
                attachment.file_name,
                attachment.content_type
            );
            continue;
        }

        let Some(data) = &attachment.data else { continue };
        match classifier.classify_image(data).await {
            Ok(analysis) => {
                if analysis.is_nsfw && analysis.confidence >= media.nsfw_confidence_floor() {
                    return Some(
                        Verdict::new(
                            ModAction::Delete,
                            analysis.confidence,
                            "nsfw image content",
                            ThreatType::Nsfw,
                        )
                        .with_evidence(json!({
                            "file_name": attachment.file_name,
                            "categories": analysis.categories,
                        })),
                    );
                }
            }
            Err(e) => {
                log::warn!("image classification failed for {}: {}", attachment.file_name, e);
            }
        }
    }

    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::classifier::{
        BypassAnalysis, BypassPattern, ClassifierError, ContentAnalysis, ImageAnalysis,
        NullClassifier,
    };
    use crate::logic::types::Severity;
    use async_trait::async_trait;

    struct NsfwClassifier {
        confidence: f32,
        fail: bool,
    }

    #[async_trait]
    impl Classifier for NsfwClassifier {
        async fn classify_bypass(
            &self,
            _content: &str,
            _known: &[BypassPattern],
        ) -> Result<BypassAnalysis, ClassifierError> {
            unreachable!("attachment tests never classify bypass")
        }

        async fn classify_content(
            &self,
            _content: &str,
            _recent: &[String],
        ) -> Result<ContentAnalysis, ClassifierError> {
            Ok(ContentAnalysis {
                confidence: 0.0,
                threat_level: Severity::Low,
                threat_type: crate::logic::types::ThreatType::Toxicity,
                reasoning: String::new(),
            })
        }

        async fn classify_image(&self, _base64: &str) -> Result<ImageAnalysis, ClassifierError> {
            if self.fail {
                return Err(ClassifierError::Unavailable("down".to_string()));
            }
            Ok(ImageAnalysis {
                is_nsfw: true,
                confidence: self.confidence,
                categories: vec!["explicit".to_string()],
            })
        }
    }

    fn image(subtype: &str, data: Option<&str>) -> Attachment {
        Attachment {
            file_name: format!("pic.{}", subtype),
            content_type: format!("image/{}", subtype),
            size_bytes: 1_000,
            url: "https://cdn.example/pic".to_string(),
            data: data.map(|d| d.to_string()),
        }
    }

    #[tokio::test]
    async fn test_count_over_cap_bans() {
        let media = MediaConfig::default();
        let attachments: Vec<_> = (0..media.max_attachments + 1)
            .map(|_| image("png", None))
            .collect();
        let verdict = check(&attachments, &media, &NullClassifier).await.unwrap();
        assert_eq!(verdict.action, ModAction::Ban);
    }

    #[tokio::test]
    async fn test_oversized_url_bans() {
        let media = MediaConfig::default();
        let mut attachment = image("png", None);
        attachment.url = format!("https://x/{}", "a".repeat(media.max_url_length));
        let verdict = check(&[attachment], &media, &NullClassifier).await.unwrap();
        assert_eq!(verdict.action, ModAction::Ban);
        assert_eq!(verdict.reason, "oversized attachment url");
    }

    #[tokio::test]
    async fn test_disallowed_image_type_skipped_not_terminal() {
        let media = MediaConfig::default();
        // Even a classifier that would flag the image never sees it, and
        // the stage falls through so later checks still run.
        let classifier = NsfwClassifier { confidence: 0.99, fail: false };
        assert!(check(&[image("tiff", Some("data"))], &media, &classifier)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_nsfw_over_floor_deletes() {
        let media = MediaConfig::default();
        let classifier = NsfwClassifier { confidence: 0.95, fail: false };
        let verdict = check(&[image("png", Some("data"))], &media, &classifier)
            .await
            .unwrap();
        assert_eq!(verdict.action, ModAction::Delete);
        assert_eq!(verdict.threat_type, Some(ThreatType::Nsfw));
    }

    #[tokio::test]
    async fn test_nsfw_below_floor_allows() {
        let media = MediaConfig::default();
        let classifier = NsfwClassifier { confidence: 0.6, fail: false };
        assert!(check(&[image("png", Some("data"))], &media, &classifier)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_classifier_error_degrades_to_allow() {
        let media = MediaConfig::default();
        let classifier = NsfwClassifier { confidence: 0.99, fail: true };
        assert!(check(&[image("png", Some("data"))], &media, &classifier)
            .await
            .is_none());
    }
}

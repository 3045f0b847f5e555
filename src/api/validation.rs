use thiserror::Error;

use super::models::{InvokeAction, InvokeRequest};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvokeValidationError {
    #[error("scrape_work requires work_url or work_id")]
    MissingTarget,
    #[error("work_url must be an absolute http/https url, got '{0}'")]
    InvalidWorkUrl(String),
    #[error("work_id must not be empty")]
    EmptyWorkId,
    #[error("max_chapters must be at least 1")]
    InvalidMaxChapters,
    #[error("scrape_chapter requires work_id")]
    MissingWorkId,
    #[error("scrape_chapter requires chapter_url")]
    MissingChapterUrl,
    #[error("chapter_url must be an absolute http/https url, got '{0}'")]
    InvalidChapterUrl(String),
    #[error("scrape_chapter requires chapter_number")]
    MissingChapterNumber,
    #[error("chapter_number must be a finite number >= 0, got {0}")]
    InvalidChapterNumber(String),
    #[error("list_works requires source_id")]
    MissingSource,
    #[error("page must be at least 1")]
    InvalidPage,
}

pub fn validate_invoke(request: &InvokeRequest) -> Result<(), InvokeValidationError> {
    match request.action {
        InvokeAction::HealthCheck => Ok(()),
        InvokeAction::ScrapeWork => validate_scrape_work(request),
        InvokeAction::ScrapeChapter => {
            let chapter = request.chapter_request()?;
            if !is_http_url(&chapter.chapter_url) {
                return Err(InvokeValidationError::InvalidChapterUrl(chapter.chapter_url));
            }
            Ok(())
        }
        InvokeAction::ListWorks => {
            if request.source_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
                return Err(InvokeValidationError::MissingSource);
            }
            if request.page == Some(0) {
                return Err(InvokeValidationError::InvalidPage);
            }
            Ok(())
        }
    }
}

fn validate_scrape_work(request: &InvokeRequest) -> Result<(), InvokeValidationError> {
    if request.work_url.is_none() && request.work_id.is_none() {
        return Err(InvokeValidationError::MissingTarget);
    }

    if let Some(work_url) = &request.work_url {
        if !is_http_url(work_url) {
            return Err(InvokeValidationError::InvalidWorkUrl(work_url.clone()));
        }
    }

    if request.work_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
        return Err(InvokeValidationError::EmptyWorkId);
    }

    if request.max_chapters == Some(0) {
        return Err(InvokeValidationError::InvalidMaxChapters);
    }

    Ok(())
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrape(work_url: Option<&str>, work_id: Option<&str>) -> InvokeRequest {
        InvokeRequest {
            action: InvokeAction::ScrapeWork,
            work_url: work_url.map(str::to_string),
            work_id: work_id.map(str::to_string),
            source_id: None,
            max_chapters: None,
            chapter_url: None,
            chapter_number: None,
            page: None,
        }
    }

    #[test]
    fn validate_accepts_url_or_id() {
        assert!(validate_invoke(&scrape(Some("https://mangadex.org/title/x"), None)).is_ok());
        assert!(validate_invoke(&scrape(None, Some("mangadex-x"))).is_ok());
    }

    #[test]
    fn validate_rejects_missing_target() {
        assert_eq!(
            validate_invoke(&scrape(None, None)),
            Err(InvokeValidationError::MissingTarget)
        );
    }

    #[test]
    fn validate_rejects_bad_url() {
        for url in ["mangadex.org/title/x", "ftp://mangadex.org/x", ""] {
            assert!(matches!(
                validate_invoke(&scrape(Some(url), None)),
                Err(InvokeValidationError::InvalidWorkUrl(_))
            ));
        }
    }

    #[test]
    fn validate_rejects_zero_chapters() {
        let mut request = scrape(None, Some("mangadex-x"));
        request.max_chapters = Some(0);
        assert_eq!(
            validate_invoke(&request),
            Err(InvokeValidationError::InvalidMaxChapters)
        );
    }

    #[test]
    fn validate_scrape_chapter_fields() {
        let chapter = |url: Option<&str>, number: Option<f64>| InvokeRequest {
            action: InvokeAction::ScrapeChapter,
            chapter_url: url.map(str::to_string),
            chapter_number: number,
            ..scrape(None, Some("mangadex-x"))
        };

        assert!(validate_invoke(&chapter(Some("https://mangadex.org/chapter/c1"), Some(1.5))).is_ok());
        assert_eq!(
            validate_invoke(&chapter(None, Some(1.0))),
            Err(InvokeValidationError::MissingChapterUrl)
        );
        assert_eq!(
            validate_invoke(&chapter(Some("https://mangadex.org/chapter/c1"), None)),
            Err(InvokeValidationError::MissingChapterNumber)
        );
        assert!(matches!(
            validate_invoke(&chapter(Some("https://mangadex.org/chapter/c1"), Some(-1.0))),
            Err(InvokeValidationError::InvalidChapterNumber(_))
        ));
        assert!(matches!(
            validate_invoke(&chapter(Some("chapter/c1"), Some(1.0))),
            Err(InvokeValidationError::InvalidChapterUrl(_))
        ));

        let without_work = InvokeRequest {
            work_id: None,
            ..chapter(Some("https://mangadex.org/chapter/c1"), Some(1.0))
        };
        assert_eq!(
            validate_invoke(&without_work),
            Err(InvokeValidationError::MissingWorkId)
        );
    }

    #[test]
    fn validate_list_works_needs_source_and_page() {
        let listing = |source: Option<&str>, page: Option<u32>| InvokeRequest {
            action: InvokeAction::ListWorks,
            source_id: source.map(str::to_string),
            page,
            ..scrape(None, None)
        };

        assert!(validate_invoke(&listing(Some("mangadex"), None)).is_ok());
        assert_eq!(
            validate_invoke(&listing(None, Some(2))),
            Err(InvokeValidationError::MissingSource)
        );
        assert_eq!(
            validate_invoke(&listing(Some("mangadex"), Some(0))),
            Err(InvokeValidationError::InvalidPage)
        );
    }

    #[test]
    fn health_check_needs_nothing() {
        let request = InvokeRequest {
            action: InvokeAction::HealthCheck,
            ..scrape(None, None)
        };
        assert!(validate_invoke(&request).is_ok());
    }
}

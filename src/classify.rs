use url::Url;

use crate::domain::FileKind;

/// Decides which kind of attachment a link points to. Links that are not
/// PDFs are not attachments at all.
pub fn classify_link(url: &str, text: &str) -> Option<FileKind> {
    let path = link_path(url).to_lowercase();
    if !path.ends_with(".pdf") {
        return None;
    }

    let stem = path
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_end_matches(".pdf");
    if path.contains("/talks/") || stem.ends_with("_talk") {
        return Some(FileKind::Presentation);
    }
    if path.contains("/posters/") || stem.ends_with("_poster") {
        return Some(FileKind::Poster);
    }
    if path.contains("/papers/") {
        return Some(FileKind::Paper);
    }

    let text = text.to_lowercase();
    if ["slides", "talk", "presentation"]
        .iter()
        .any(|word| text.contains(word))
    {
        return Some(FileKind::Presentation);
    }
    if text.contains("poster") {
        return Some(FileKind::Poster);
    }
    Some(FileKind::Paper)
}

fn link_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

//! Web page retrieval and paragraph extraction using `reqwest` and `scraper`.

use super::ExtractionError;
use reqwest::Client;
use scraper::{Html, Selector};

/// GET `url` and return the text of its paragraphs.
///
/// Non-2xx responses and transport failures are reported as [`ExtractionError::Fetch`] carrying
/// the client's message.
pub(super) async fn fetch_paragraphs(http: &Client, url: &str) -> Result<String, ExtractionError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|error| ExtractionError::Fetch(error.to_string()))?
        .error_for_status()
        .map_err(|error| ExtractionError::Fetch(error.to_string()))?;
    let body = response
        .text()
        .await
        .map_err(|error| ExtractionError::Fetch(error.to_string()))?;

    let text = paragraph_text(&body);
    tracing::debug!(url, html_bytes = body.len(), text_chars = text.len(), "Fetched page");
    Ok(text)
}

/// Text content of every `<p>` element in document order, joined with single spaces.
///
/// Nested markup inside a paragraph contributes its text. A page without paragraphs yields an
/// empty string.
fn paragraph_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("p") else {
        return String::new();
    };
    document
        .select(&selector)
        .map(|paragraph| paragraph.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};

    #[test]
    fn paragraphs_are_space_joined_in_order() {
        let html = "<p>Alpha <a href='#'>link</a></p><section><p>Beta</p></section><p></p>";
        assert_eq!(paragraph_text(html), "Alpha link Beta ");
    }

    #[test]
    fn page_without_paragraphs_is_empty() {
        assert_eq!(paragraph_text("<html><body><div>No paragraphs</div></body></html>"), "");
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404).body("gone");
            })
            .await;

        let error = fetch_paragraphs(&Client::new(), &format!("{}/missing", server.base_url()))
            .await
            .expect_err("404 fails");

        assert!(matches!(error, ExtractionError::Fetch(message) if message.contains("404")));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_fetch_error() {
        let error = fetch_paragraphs(&Client::new(), "http://bad-host.invalid")
            .await
            .expect_err("dns failure");
        assert!(matches!(error, ExtractionError::Fetch(message) if !message.is_empty()));
    }
}

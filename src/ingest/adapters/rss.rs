//! RSS/Atom adapter
//!
//! Fetches each configured feed through the policy-governed fetcher,
//! parses it with feed-rs, deduplicates entry links within the run, then
//! fetches every article page and extracts title/body/cover/language from
//! the HTML. Unparseable feeds and pages are skipped, never fatal.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::ingest::adapters::{AdapterOutput, CrawlContext, SourceAdapter};
use crate::models::{bump, ArticleCandidate};
use crate::parser;

pub struct RssAdapter;

#[async_trait]
impl SourceAdapter for RssAdapter {
    async fn crawl(&self, ctx: &mut CrawlContext<'_>) -> AdapterOutput {
        let mut output = AdapterOutput::default();
        let mut seen_links: HashSet<String> = HashSet::new();

        for feed_url in &ctx.config.feed_urls {
            if output.candidates.len() >= ctx.max_articles {
                break;
            }

            let feed_body = match ctx
                .fetcher
                .fetch(feed_url, ctx.policy, ctx.state, ctx.histogram)
                .await
            {
                Ok(response) => response.body,
                Err(err) => {
                    debug!(feed_url, error = %err, "feed fetch failed");
                    output.skipped_count += 1;
                    continue;
                }
            };

            let feed = match feed_rs::parser::parse(feed_body.as_bytes()) {
                Ok(feed) => feed,
                Err(err) => {
                    debug!(feed_url, error = %err, "feed parse failed");
                    bump(ctx.histogram, "parse_error");
                    output.skipped_count += 1;
                    continue;
                }
            };

            for entry in feed.entries {
                if output.candidates.len() >= ctx.max_articles {
                    break;
                }

                let link = match entry.links.first() {
                    Some(link) if !link.href.trim().is_empty() => link.href.trim().to_string(),
                    _ => continue,
                };
                if !seen_links.insert(link.clone()) {
                    continue;
                }

                output.crawled_count += 1;
                let page = match ctx
                    .fetcher
                    .fetch(&link, ctx.policy, ctx.state, ctx.histogram)
                    .await
                {
                    Ok(response) => response,
                    Err(err) => {
                        debug!(url = %link, error = %err, "article fetch failed");
                        output.skipped_count += 1;
                        continue;
                    }
                };

                let fields = match parser::extract_article_fields(&page.body) {
                    Ok(fields) => fields,
                    Err(err) => {
                        debug!(url = %link, error = %err, "article parse failed");
                        bump(ctx.histogram, "parse_error");
                        output.skipped_count += 1;
                        continue;
                    }
                };

                let language = ctx
                    .language
                    .map(str::to_string)
                    .or_else(|| ctx.config.default_language.clone())
                    .or(fields.language);

                let authors = entry
                    .authors
                    .iter()
                    .map(|person| person.name.clone())
                    .filter(|name| !name.is_empty())
                    .collect();
                let topics = entry
                    .categories
                    .iter()
                    .map(|category| category.term.clone())
                    .filter(|term| !term.is_empty())
                    .collect();

                let cover_image_url = fields
                    .cover_image_url
                    .and_then(|raw| resolve_image_url(&page.final_url, &raw));

                output.candidates.push(ArticleCandidate {
                    url: page.final_url,
                    title: fields.title,
                    body: fields.body,
                    authors,
                    topics,
                    publisher: ctx.config.display_name.clone(),
                    language,
                    publishing_date: entry.published.or(entry.updated),
                    cover_image_url,
                });
            }
        }

        output
    }
}

/// Absolutize a cover image reference against the article page URL.
/// Unparseable references are dropped rather than stored raw.
fn resolve_image_url(page_url: &str, image: &str) -> Option<String> {
    match Url::parse(image) {
        Ok(url) => Some(url.into()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(page_url)
            .ok()
            .and_then(|base| base.join(image).ok())
            .map(Into::into),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_image_url_passes_through() {
        let resolved = resolve_image_url(
            "https://news.example.com/world/story",
            "https://cdn.example.com/a.jpg",
        );
        assert_eq!(resolved.as_deref(), Some("https://cdn.example.com/a.jpg"));
    }

    #[test]
    fn test_relative_image_url_resolves_against_page() {
        let resolved = resolve_image_url(
            "https://news.example.com/world/story",
            "/images/a.jpg",
        );
        assert_eq!(
            resolved.as_deref(),
            Some("https://news.example.com/images/a.jpg")
        );
    }

    #[test]
    fn test_garbage_image_url_is_dropped() {
        assert_eq!(resolve_image_url("not a url", "also : not % a url"), None);
    }
}

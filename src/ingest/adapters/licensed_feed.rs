//! Licensed feed adapter (credential-gated stub)
//!
//! Wire-service content arrives through contracted feed endpoints whose
//! URLs live in the environment. Without a contract reference the source
//! is skipped; with one it is still pending integration.

use async_trait::async_trait;

use crate::ingest::adapters::{AdapterOutput, CrawlContext, SourceAdapter};

pub struct LicensedFeedAdapter;

#[async_trait]
impl SourceAdapter for LicensedFeedAdapter {
    async fn crawl(&self, ctx: &mut CrawlContext<'_>) -> AdapterOutput {
        let feed_ref = ctx
            .config
            .credential_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.is_empty());

        if feed_ref.is_none() {
            return AdapterOutput::skipped("missing_contract_or_feed");
        }

        let mut output = AdapterOutput::skipped("licensed_feed_not_implemented");
        output.error_message = Some(format!(
            "licensed feed adapter for '{}' is not implemented yet",
            ctx.config.publisher_id
        ));
        output
    }
}

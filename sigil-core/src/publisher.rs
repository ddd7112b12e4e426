//! Community publisher
//!
//! Announces completed audits to a Moltbook-style community site with a
//! simple HTTP POST. Publishing is decoupled from signing and verification
//! and has no bearing on trust; the whole module sits behind the `publish`
//! feature.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::record::AuditRecord;
use crate::config::PublisherSettings;

/// Community site client
pub struct Publisher {
    client: reqwest::Client,
    settings: PublisherSettings,
    api_key: String,
}

/// Post creation request structure
///
/// The API requires the community name under both keys.
#[derive(Debug, Serialize)]
struct CreatePostRequest {
    title: String,
    content: String,
    submolt_name: String,
    submolt: String,
}

impl Publisher {
    /// Create a publisher, reading the API key from the environment
    /// variable named in the configuration
    pub fn new(settings: PublisherSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env).with_context(|| {
            format!(
                "Publishing requires the {} environment variable to be set",
                settings.api_key_env
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Publisher {
            client,
            settings,
            api_key,
        })
    }

    /// Render the announcement body for a record
    pub fn render_announcement(record: &AuditRecord) -> String {
        let manifest = &record.manifest;
        format!(
            "Audit completed for {} v{}.\n\n\
             SHA-256: {}\n\
             Signed by: {}\n\
             Timestamp: {}\n\n\
             The detached signature covers the canonical manifest; verify \
             locally with `sigil verify`.",
            manifest.component,
            manifest.version,
            manifest.digest,
            manifest.auditor,
            manifest.timestamp
        )
    }

    /// Post an audit announcement, returning the created post id
    pub async fn publish_record(
        &self,
        record: &AuditRecord,
        title: Option<&str>,
        community: Option<&str>,
    ) -> Result<String> {
        let title = title.map(str::to_string).unwrap_or_else(|| {
            format!(
                "Audit Report: {} v{}",
                record.manifest.component, record.manifest.version
            )
        });
        let community = community.unwrap_or(&self.settings.community).to_string();

        let request = CreatePostRequest {
            title: title.clone(),
            content: Self::render_announcement(record),
            submolt_name: community.clone(),
            submolt: community,
        };

        let url = format!("{}/posts", self.settings.api_base.trim_end_matches('/'));
        debug!("Publishing \"{}\" to {}", title, url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send post to community site")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Community API error: {} - {}", status, body);
            anyhow::bail!("Community API error: {status} - {body}");
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse community API response")?;

        let post_id = body
            .get("id")
            .or_else(|| body.pointer("/post/id"))
            .map(|id| match id {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .with_context(|| format!("Community API response carried no post id: {body}"))?;

        info!("Published audit announcement as post {}", post_id);
        Ok(post_id)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{CatalogItem, CatalogSource};
use crate::{Result, TranscriptorError};

/// Largest page size the Data API accepts
const PAGE_SIZE: usize = 50;

/// Channel catalog read from the YouTube Data API v3
pub struct YoutubeCatalog {
    client: Client,
    base_url: String,
    api_key: String,
    channel: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: Option<SearchId>,
    snippet: Option<ChannelSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelSnippet {
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: String,
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    description: String,
    published_at: DateTime<Utc>,
}

impl YoutubeCatalog {
    pub fn new(base_url: &str, api_key: &str, channel: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            channel: channel.to_string(),
        }
    }

    /// Issue a GET against the Data API and decode the JSON body
    async fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| TranscriptorError::Fetch(format!("{} request failed: {}", endpoint, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptorError::Fetch(format!(
                "{} returned HTTP {}: {}",
                endpoint,
                status,
                body.trim()
            ))
            .into());
        }

        response.json::<T>().await.map_err(|e| {
            TranscriptorError::Fetch(format!("{} response could not be decoded: {}", endpoint, e)).into()
        })
    }

    /// Turn the configured channel reference into a channel id
    async fn resolve_channel_id(&self) -> Result<String> {
        let query = match channel_reference(&self.channel) {
            ChannelRef::Id(id) => return Ok(id),
            ChannelRef::Query(q) => q,
        };

        tracing::info!("Resolving channel id for '{}'", query);
        let response: SearchResponse = self
            .get(
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "channel"),
                    ("q", query.as_str()),
                    ("maxResults", "1"),
                ],
            )
            .await?;

        response
            .items
            .into_iter()
            .find_map(|item| item.snippet.and_then(|s| s.channel_id))
            .ok_or_else(|| {
                TranscriptorError::Fetch(format!("No channel found for: {}", self.channel)).into()
            })
    }

    /// Every video id of the channel, newest first
    async fn list_video_ids(&self, channel_id: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        let page_size = PAGE_SIZE.to_string();

        loop {
            let mut query = vec![
                ("part", "id"),
                ("channelId", channel_id),
                ("type", "video"),
                ("order", "date"),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let page: SearchResponse = self.get("search", &query).await?;
            ids.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.id.and_then(|id| id.video_id)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }

    /// Full snippets for the given ids, in the order of `ids`
    async fn video_details(&self, ids: &[String]) -> Result<Vec<CatalogItem>> {
        let mut items = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(PAGE_SIZE) {
            let joined = chunk.join(",");
            let response: VideoListResponse = self
                .get("videos", &[("part", "snippet"), ("id", joined.as_str())])
                .await?;
            items.extend(order_by_ids(chunk, response.items));
        }

        Ok(items)
    }
}

#[async_trait]
impl CatalogSource for YoutubeCatalog {
    async fn fetch_catalog(&self) -> Result<Vec<CatalogItem>> {
        if self.api_key.is_empty() {
            return Err(TranscriptorError::Fetch("YouTube API key is not configured".into()).into());
        }

        let channel_id = self.resolve_channel_id().await?;
        let ids = self.list_video_ids(&channel_id).await?;
        tracing::info!("Channel {} lists {} videos", channel_id, ids.len());

        self.video_details(&ids).await
    }
}

#[derive(Debug, PartialEq)]
enum ChannelRef {
    Id(String),
    Query(String),
}

/// Classify a channel URL, handle or id
fn channel_reference(channel: &str) -> ChannelRef {
    let channel = channel.trim();

    if let Ok(url) = Url::parse(channel) {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        if let Some(pair) = segments.windows(2).find(|pair| pair[0] == "channel") {
            return ChannelRef::Id(pair[1].to_string());
        }
        if let Some(handle) = segments.iter().find(|seg| seg.starts_with('@')) {
            return ChannelRef::Query(handle.to_string());
        }
        if let Some(last) = segments.last() {
            return ChannelRef::Query(last.to_string());
        }
    }

    if channel.starts_with("UC") && !channel.contains(['/', '@', ' ']) {
        ChannelRef::Id(channel.to_string())
    } else {
        ChannelRef::Query(channel.to_string())
    }
}

/// Reorder fetched videos to match the requested id order, dropping unknown ones
fn order_by_ids(ids: &[String], videos: Vec<Video>) -> Vec<CatalogItem> {
    let mut videos: Vec<Option<Video>> = videos.into_iter().map(Some).collect();

    ids.iter()
        .filter_map(|id| {
            let slot = videos
                .iter_mut()
                .find(|v| v.as_ref().map(|v| &v.id == id).unwrap_or(false))?;
            let video = slot.take()?;
            Some(CatalogItem::new(
                video.id,
                video.snippet.title,
                video.snippet.description,
                video.snippet.published_at,
            ))
        })
        .collect()
}

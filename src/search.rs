//! Item search against a STAC API, following `next` links until the
//! requested number of items has been collected.
use crate::geometry::Bbox;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stac::{Item, ItemCollection};
use std::fs::{self, read_to_string};
use std::path::Path;
use tracing::{debug, info};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(collection: &str) -> Self {
        Self {
            collections: vec![collection.to_string()],
            ..Default::default()
        }
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = ids;
        self
    }

    pub fn bbox(mut self, bbox: Bbox) -> Self {
        self.bbox = Some(bbox.to_vec());
        self
    }

    /// RFC 3339 instant or interval, e.g. `2023-06-01/2023-08-31`.
    pub fn datetime(mut self, datetime: &str) -> Self {
        self.datetime = Some(datetime.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add a query extension filter such as `{"eo:cloud_cover": {"lt": 10}}`.
    pub fn query(mut self, property: &str, operator: &str, value: Value) -> Self {
        let query = self.query.get_or_insert_with(Map::new);
        let filters = query
            .entry(property.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(filters) = filters {
            filters.insert(operator.to_string(), value);
        }
        self
    }

    pub fn max_cloud_cover(self, percent: f64) -> Self {
        self.query("eo:cloud_cover", "lt", serde_json::json!(percent))
    }
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub items: Vec<Item>,
    /// Number of items the server reports as matching, which may exceed
    /// the number of items collected.
    pub matched: u64,
}

#[derive(Deserialize, Debug)]
struct SearchPage {
    #[serde(default)]
    features: Vec<Item>,
    #[serde(default)]
    links: Vec<PageLink>,
    #[serde(rename = "numberMatched")]
    number_matched: Option<u64>,
    context: Option<PageContext>,
}

#[derive(Deserialize, Debug)]
struct PageContext {
    matched: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
struct PageLink {
    rel: String,
    href: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    body: Option<Map<String, Value>>,
    #[serde(default)]
    merge: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum PageRequest {
    Get(String),
    Post { href: String, body: Value },
}

/// Work out the request for the next page from a page's links. A POST link
/// body replaces the previous body unless the link asks for a merge.
fn next_request(links: &[PageLink], previous_body: &Value) -> Option<PageRequest> {
    let link = links.iter().find(|link| link.rel == "next")?;
    let is_post = link
        .method
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("POST"));
    if !is_post {
        return Some(PageRequest::Get(link.href.clone()));
    }

    let mut body = match (link.merge, previous_body) {
        (true, Value::Object(previous)) => previous.clone(),
        _ => Map::new(),
    };
    if let Some(link_body) = &link.body {
        body.extend(link_body.clone());
    } else if !link.merge {
        if let Value::Object(previous) = previous_body {
            body = previous.clone();
        }
    }
    Some(PageRequest::Post {
        href: link.href.clone(),
        body: Value::Object(body),
    })
}

pub async fn search(
    client: &reqwest::Client,
    api: &str,
    request: &SearchRequest,
    max_items: usize,
) -> Result<SearchResults> {
    let url = format!("{}/search", api.trim_end_matches('/'));
    // Body of the latest POST, which `merge` links build on even after GET pages
    let mut last_body = serde_json::to_value(request)?;
    let mut next = Some(PageRequest::Post {
        href: url,
        body: last_body.clone(),
    });

    let mut items: Vec<Item> = vec![];
    let mut matched: Option<u64> = None;
    while let Some(page_request) = next.take() {
        let page: SearchPage = match &page_request {
            PageRequest::Get(href) => {
                debug!("GET {}", href);
                client.get(href).send().await?.error_for_status()?.json().await?
            }
            PageRequest::Post { href, body } => {
                debug!("POST {} {}", href, body);
                client
                    .post(href)
                    .json(body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?
            }
        };
        let SearchPage { features, links, number_matched, context } = page;
        if matched.is_none() {
            matched = number_matched.or(context.and_then(|c| c.matched));
        }
        if features.is_empty() {
            break;
        }
        items.extend(features);
        if items.len() >= max_items {
            items.truncate(max_items);
            break;
        }

        if let PageRequest::Post { body, .. } = page_request {
            last_body = body;
        }
        next = next_request(&links, &last_body);
    }

    let matched = matched.unwrap_or(items.len() as u64);
    info!("Search matched {} items, collected {}", matched, items.len());
    Ok(SearchResults { items, matched })
}

pub async fn search_by_ids(
    client: &reqwest::Client,
    api: &str,
    collection: &str,
    ids: Vec<String>,
) -> Result<Vec<Item>> {
    let max_items = ids.len();
    let request = SearchRequest::new(collection).ids(ids).limit(max_items);
    Ok(search(client, api, &request, max_items).await?.items)
}

pub async fn fetch_item(
    client: &reqwest::Client,
    api: &str,
    collection: &str,
    id: &str,
) -> Result<Item> {
    let url = format!(
        "{}/collections/{collection}/items/{id}",
        api.trim_end_matches('/')
    );
    debug!("GET {}", url);
    let item = client
        .get(&url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow!("Unable to fetch item {}: {}", id, e))?
        .json::<Item>()
        .await?;
    Ok(item)
}

pub fn read_item_from_file(path: &Path) -> Result<Item> {
    let content = read_to_string(path)?;
    let item: Item = serde_json::from_str(&content)?;
    Ok(item)
}

/// Read items saved by [`write_items`].
pub fn read_items<P: AsRef<Path>>(path: P) -> Result<Vec<Item>> {
    let content = read_to_string(path)?;
    let collection: ItemCollection = serde_json::from_str(&content)?;
    Ok(collection.items)
}

pub fn write_items<P: AsRef<Path>>(path: P, items: &[Item]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let collection = ItemCollection::from(items.to_vec());
    fs::write(path, serde_json::to_string_pretty(&collection)?)?;
    Ok(())
}

//! Confluence REST API store.
//!
//! Talks to the v1 content API with a blocking `reqwest` client. Each trait
//! call maps to one or a few requests:
//!
//! | Operation          | Request                                                  |
//! |--------------------|----------------------------------------------------------|
//! | `fetch_page`       | `GET content/{id}?expand=body.storage,version` + property |
//! | `find_page`        | `GET content?title=…&spaceKey=…`                         |
//! | `create_page`      | `POST content`                                           |
//! | `update_page`      | `PUT content/{id}` with version + 1                      |
//! | `upload_attachment`| `PUT content/{id}/child/attachment` (multipart)          |
//! | `set_labels`       | `GET`, then `DELETE`/`POST content/{id}/label`           |
//! | `set_properties`   | `GET`, then `PUT`/`POST content/{id}/property`           |
//!
//! A `409 Conflict` on update becomes [`StoreError::Conflict`]. Every other
//! non-success status is surfaced verbatim with the response body.

use super::{
    AttachmentUpload, PageSnapshot, PageStore, SYNC_PROPERTY, StoreError, digest_from_property,
};
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

/// How requests authenticate.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Cloud: account e-mail and API token.
    Basic { user: String, api_key: String },
    /// Data Center: personal access token.
    Bearer(String),
}

#[derive(Debug, Clone)]
pub struct ConfluenceSettings {
    /// Host name, e.g. `example.atlassian.net`.
    pub domain: String,
    /// Path prefix of the wiki, e.g. `/wiki/`.
    pub base_path: String,
    pub auth: Auth,
}

pub struct ConfluenceStore {
    client: Client,
    api: String,
    auth: Auth,
}

#[derive(Deserialize)]
struct ContentResponse {
    id: String,
    title: String,
    version: VersionField,
    body: Option<BodyField>,
}

#[derive(Deserialize)]
struct VersionField {
    number: u64,
}

#[derive(Deserialize)]
struct BodyField {
    storage: StorageField,
}

#[derive(Deserialize)]
struct StorageField {
    value: String,
}

#[derive(Deserialize)]
struct ResultsResponse<T> {
    results: Vec<T>,
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Deserialize)]
struct PropertyResponse {
    value: Value,
    version: VersionField,
}

impl ConfluenceStore {
    pub fn new(settings: ConfluenceSettings) -> Result<Self, StoreError> {
        if settings.domain.is_empty() {
            return Err(StoreError::Config(
                "no Confluence domain: set site.domain or CONFLUENCE_DOMAIN".into(),
            ));
        }
        let client = Client::builder()
            .user_agent(concat!("md2wiki/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let domain = settings.domain.trim_end_matches('/');
        let host = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        Ok(Self {
            client,
            api: format!("{host}{}rest/api/", settings.base_path),
            auth: settings.auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Basic { user, api_key } => request.basic_auth(user, Some(api_key)),
            Auth::Bearer(token) => request.bearer_auth(token),
        }
    }

    /// Send `request` and turn non-success statuses into errors.
    fn send(
        &self,
        method: &'static str,
        url: &str,
        request: RequestBuilder,
    ) -> Result<Response, StoreError> {
        log::debug!("{method} {url}");
        let response = self.authed(request).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default();
        Err(StoreError::Status {
            method,
            url: url.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, StoreError> {
        let response = self.send("GET", url, self.client.get(url))?;
        Ok(response.json()?)
    }

    /// Current value and version of one property, if set.
    fn property(&self, page_id: &str, key: &str) -> Result<Option<PropertyResponse>, StoreError> {
        let url = self.url(&format!(
            "content/{page_id}/property/{}",
            urlencoding::encode(key)
        ));
        match self.get_json::<PropertyResponse>(&url) {
            Ok(property) => Ok(Some(property)),
            Err(StoreError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn storage_body(body: &str) -> Value {
    json!({ "storage": { "value": body, "representation": "storage" } })
}

impl PageStore for ConfluenceStore {
    fn fetch_page(&self, page_id: &str) -> Result<PageSnapshot, StoreError> {
        let url = self.url(&format!("content/{page_id}?expand=body.storage,version"));
        let content = match self.get_json::<ContentResponse>(&url) {
            Err(StoreError::Status { status: 404, .. }) => {
                return Err(StoreError::NotFound(page_id.to_string()));
            }
            other => other?,
        };
        let sync_digest = self
            .property(page_id, SYNC_PROPERTY)?
            .and_then(|p| digest_from_property(&p.value));
        Ok(PageSnapshot {
            id: content.id,
            title: content.title,
            body: content.body.map(|b| b.storage.value).unwrap_or_default(),
            version: content.version.number,
            sync_digest,
        })
    }

    fn find_page(
        &self,
        title: &str,
        space_key: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        let mut url = self.url(&format!(
            "content?type=page&title={}",
            urlencoding::encode(title)
        ));
        if let Some(space) = space_key {
            url.push_str(&format!("&spaceKey={}", urlencoding::encode(space)));
        }
        let found: ResultsResponse<IdOnly> = self.get_json(&url)?;
        Ok(found.results.into_iter().next().map(|r| r.id))
    }

    fn create_page(
        &self,
        space_key: Option<&str>,
        parent: Option<&str>,
        title: &str,
        body: &str,
    ) -> Result<String, StoreError> {
        let space = space_key.ok_or_else(|| {
            StoreError::Config(format!("cannot create {title:?}: no space key"))
        })?;
        let mut payload = json!({
            "type": "page",
            "title": title,
            "space": { "key": space },
            "body": storage_body(body),
        });
        if let Some(parent) = parent {
            payload["ancestors"] = json!([{ "id": parent }]);
        }
        let url = self.url("content");
        let response = self.send("POST", &url, self.client.post(&url).json(&payload))?;
        let created: IdOnly = response.json()?;
        log::info!("created page {} {title:?}", created.id);
        Ok(created.id)
    }

    fn update_page(
        &self,
        page_id: &str,
        title: &str,
        body: &str,
        version: u64,
    ) -> Result<(), StoreError> {
        let payload = json!({
            "id": page_id,
            "type": "page",
            "title": title,
            "version": { "number": version + 1, "minorEdit": true },
            "body": storage_body(body),
        });
        let url = self.url(&format!("content/{page_id}"));
        match self.send("PUT", &url, self.client.put(&url).json(&payload)) {
            Err(StoreError::Status { status, .. }) if status == StatusCode::CONFLICT.as_u16() => {
                Err(StoreError::Conflict(page_id.to_string()))
            }
            other => other.map(|_| ()),
        }
    }

    fn upload_attachment(
        &self,
        page_id: &str,
        attachment: &AttachmentUpload,
    ) -> Result<(), StoreError> {
        let part = multipart::Part::bytes(attachment.bytes()?)
            .file_name(attachment.name.clone())
            .mime_str(&attachment.content_type)?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("minorEdit", "true");
        let url = self.url(&format!("content/{page_id}/child/attachment"));
        let request = self
            .client
            .put(&url)
            .header("X-Atlassian-Token", "no-check")
            .multipart(form);
        self.send("PUT", &url, request)?;
        Ok(())
    }

    fn set_labels(&self, page_id: &str, labels: &BTreeSet<String>) -> Result<(), StoreError> {
        let url = self.url(&format!("content/{page_id}/label"));
        let current: ResultsResponse<LabelResponse> = self.get_json(&url)?;
        let current: BTreeSet<String> = current.results.into_iter().map(|l| l.name).collect();

        for stale in current.difference(labels) {
            let delete_url = self.url(&format!(
                "content/{page_id}/label?name={}",
                urlencoding::encode(stale)
            ));
            self.send("DELETE", &delete_url, self.client.delete(&delete_url))?;
        }
        let added: Vec<Value> = labels
            .difference(&current)
            .map(|name| json!({ "prefix": "global", "name": name }))
            .collect();
        if !added.is_empty() {
            self.send("POST", &url, self.client.post(&url).json(&added))?;
        }
        Ok(())
    }

    fn set_properties(
        &self,
        page_id: &str,
        properties: &BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        for (key, value) in properties {
            match self.property(page_id, key)? {
                Some(existing) if existing.value == *value => {}
                Some(existing) => {
                    let url = self.url(&format!(
                        "content/{page_id}/property/{}",
                        urlencoding::encode(key)
                    ));
                    let payload = json!({
                        "key": key,
                        "value": value,
                        "version": { "number": existing.version.number + 1, "minorEdit": true },
                    });
                    self.send("PUT", &url, self.client.put(&url).json(&payload))?;
                }
                None => {
                    let url = self.url(&format!("content/{page_id}/property"));
                    let payload = json!({ "key": key, "value": value });
                    self.send("POST", &url, self.client.post(&url).json(&payload))?;
                }
            }
        }
        Ok(())
    }
}

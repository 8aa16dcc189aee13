//! Single-page fetching against cursor-paginated collections.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::credentials::CredentialStore;
use crate::error::{HarvestError, Result};
use crate::http_client::{ApiRequest, HttpClient, ResponseClass, TokenPlacement};
use crate::normalize::extract_path;

/// Opaque continuation token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How a collection encodes its pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingRules {
    /// Request parameter carrying the cursor (`pageToken`).
    pub cursor_param: String,
    /// Dotted path of the next cursor in the response (`nextPageToken`).
    pub cursor_path: String,
    /// Dotted path of the record array. Empty means the whole body is one record.
    pub records_path: String,
    pub token_placement: TokenPlacement,
}

/// A fully resolved collection endpoint.
#[derive(Debug, Clone)]
pub struct CollectionRef {
    /// Label for logs and errors.
    pub label: String,
    /// First-page request; the cursor is added per page.
    pub request: ApiRequest,
    pub paging: PagingRules,
}

impl CollectionRef {
    /// Request for the page at `cursor`. GET requests carry the cursor as a
    /// query parameter, requests with a JSON body carry it in the body.
    pub fn page_request(&self, cursor: Option<&Cursor>) -> ApiRequest {
        let mut request = self.request.clone();
        let Some(cursor) = cursor else {
            return request;
        };
        match request.body {
            Some(Value::Object(ref mut map)) => {
                map.insert(
                    self.paging.cursor_param.clone(),
                    Value::String(cursor.0.clone()),
                );
            }
            _ => request
                .query
                .push((self.paging.cursor_param.clone(), cursor.0.clone())),
        }
        request
    }
}

/// One decoded page.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub records: Vec<Value>,
    pub next_cursor: Option<Cursor>,
}

impl RawPage {
    /// Decode a page body according to `rules`.
    ///
    /// A missing record array is an empty page (Google APIs omit empty
    /// lists); any other shape mismatch is a malformed response.
    pub fn decode(body: &str, rules: &PagingRules) -> Result<Self> {
        let data: Value = serde_json::from_str(body)
            .map_err(|e| HarvestError::malformed(format!("invalid JSON: {}", e), body))?;
        if !data.is_object() {
            return Err(HarvestError::malformed("page is not a JSON object", body));
        }

        let records = match extract_path(&data, &rules.records_path) {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            obj @ Value::Object(_) if rules.records_path.is_empty() => vec![obj.clone()],
            _ => {
                return Err(HarvestError::malformed(
                    format!("'{}' is not a list", rules.records_path),
                    body,
                ))
            }
        };

        let next_cursor = if rules.cursor_path.is_empty() {
            None
        } else {
            match extract_path(&data, &rules.cursor_path) {
                Value::String(s) if !s.is_empty() => Some(Cursor(s.clone())),
                Value::String(_) | Value::Null => None,
                _ => {
                    return Err(HarvestError::malformed(
                        format!("'{}' is not a string", rules.cursor_path),
                        body,
                    ))
                }
            }
        };

        Ok(Self {
            records,
            next_cursor,
        })
    }
}

/// Performs one authenticated page request.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, collection: &CollectionRef, cursor: Option<&Cursor>) -> Result<RawPage>;
}

/// [`PageFetcher`] over HTTP using the run's credential store.
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: HttpClient,
    credentials: CredentialStore,
}

impl HttpPageFetcher {
    pub fn new(client: HttpClient, credentials: CredentialStore) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, collection: &CollectionRef, cursor: Option<&Cursor>) -> Result<RawPage> {
        let token = self.credentials.current().await;
        let request = collection.page_request(cursor);
        let response = self
            .client
            .send(&request, &token, &collection.paging.token_placement)
            .await?;

        if response.class() != ResponseClass::Success {
            return Err(response.into_error());
        }

        RawPage::decode(&response.body, &collection.paging).inspect_err(|e| {
            warn!("{}: {}", collection.label, e);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(records_path: &str) -> PagingRules {
        PagingRules {
            cursor_param: "pageToken".into(),
            cursor_path: "nextPageToken".into(),
            records_path: records_path.into(),
            token_placement: TokenPlacement::Bearer,
        }
    }

    #[test]
    fn test_decode_page_with_cursor() {
        let page = RawPage::decode(
            r#"{"reviews":[{"reviewId":"a"},{"reviewId":"b"}],"nextPageToken":"CAE"}"#,
            &rules("reviews"),
        )
        .unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.next_cursor, Some(Cursor("CAE".into())));
    }

    #[test]
    fn test_decode_last_page() {
        let page = RawPage::decode(
            r#"{"reviews":[{"reviewId":"a"}],"averageRating":4.5}"#,
            &rules("reviews"),
        )
        .unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_decode_missing_records_is_empty() {
        let page = RawPage::decode("{}", &rules("reviews")).unwrap();
        assert!(page.records.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_decode_whole_body_record() {
        let page = RawPage::decode(r#"{"data":[{"name":"m"}]}"#, &rules("")).unwrap();
        assert_eq!(page.records, vec![json!({"data":[{"name":"m"}]})]);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            RawPage::decode("<html>", &rules("reviews")),
            Err(HarvestError::MalformedResponse { .. })
        ));
        assert!(matches!(
            RawPage::decode(r#"{"reviews":"nope"}"#, &rules("reviews")),
            Err(HarvestError::MalformedResponse { .. })
        ));
        assert!(matches!(
            RawPage::decode(r#"{"reviews":[],"nextPageToken":5}"#, &rules("reviews")),
            Err(HarvestError::MalformedResponse { .. })
        ));
        assert!(matches!(
            RawPage::decode("[1,2]", &rules("reviews")),
            Err(HarvestError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_page_request_get_uses_query() {
        let collection = CollectionRef {
            label: "reviews".into(),
            request: ApiRequest::get("https://example.com/reviews").query("pageSize", "50"),
            paging: rules("reviews"),
        };
        let first = collection.page_request(None);
        assert_eq!(first.query, vec![("pageSize".to_string(), "50".to_string())]);

        let next = collection.page_request(Some(&Cursor("tok".into())));
        assert_eq!(next.query.last().unwrap(), &("pageToken".to_string(), "tok".to_string()));
    }

    #[test]
    fn test_page_request_post_uses_body() {
        let collection = CollectionRef {
            label: "batch".into(),
            request: ApiRequest::post(
                "https://example.com/locations:batchGetReviews",
                json!({"pageSize": 50}),
            ),
            paging: rules("locationReviews"),
        };
        let next = collection.page_request(Some(&Cursor("tok".into())));
        assert_eq!(next.body.unwrap()["pageToken"], json!("tok"));
        assert!(next.query.is_empty());
    }
}

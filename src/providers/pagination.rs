use crate::errors::FetchError;
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// How many items to ask for in each page.
pub const PER_PAGE: u32 = 100;

/// The bits of an HTTP response the paginator cares about.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Something which can send a `GET` request.
pub trait Transport {
    fn get(&self, url: &Url, headers: &HeaderMap) -> Result<Response, FetchError>;
}

impl Transport for Client {
    fn get(&self, url: &Url, headers: &HeaderMap) -> Result<Response, FetchError> {
        let to_fetch_error = |inner: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            inner,
        };

        let response = Client::get(self, url.clone())
            .headers(headers.clone())
            .send()
            .map_err(to_fetch_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().map_err(to_fetch_error)?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

/// How the server tells us we've reached the last page.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Termination {
    /// The server names the next page in a response header, pagination stops
    /// when the header is missing or empty.
    NextPageHeader(&'static str),
    /// Keep asking for pages until one comes back empty.
    EmptyPage,
}

/// An iterator over every page of a paginated endpoint.
///
/// Pages are requested lazily and the iterator stops after the first error.
pub struct Paginated<'a, T: ?Sized, I> {
    transport: &'a T,
    endpoint: Url,
    query: Vec<(&'static str, String)>,
    headers: HeaderMap,
    termination: Termination,
    next_page: Option<u32>,
    _phantom: PhantomData<I>,
}

impl<'a, T, I> Paginated<'a, T, I>
where
    T: Transport + ?Sized,
    I: DeserializeOwned,
{
    pub fn new(
        transport: &'a T,
        endpoint: Url,
        headers: HeaderMap,
        termination: Termination,
    ) -> Self {
        Paginated {
            transport,
            endpoint,
            query: Vec::new(),
            headers,
            termination,
            next_page: Some(1),
            _phantom: PhantomData,
        }
    }

    /// Add an extra query parameter to every request.
    pub fn with_query(mut self, key: &'static str, value: &str) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    fn page_url(&self, page: u32) -> Url {
        let mut url = self.endpoint.clone();

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
            pairs
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());
        }

        url
    }

    fn fetch(&mut self, page: u32) -> Result<Option<Vec<I>>, FetchError> {
        let url = self.page_url(page);
        debug!("Sending request to {}", url);

        let response = self.transport.get(&url, &self.headers)?;
        debug!("Received response ({})", response.status);

        if !response.status.is_success() {
            warn!("Request failed with {}", response.status);

            return Err(FetchError::BadResponse {
                url: url.to_string(),
                status: response.status,
            });
        }

        let items: Vec<I> =
            serde_json::from_slice(&response.body).map_err(|inner| FetchError::Deserialize {
                url: url.to_string(),
                inner,
            })?;
        trace!("Page {} contained {} items", page, items.len());

        match self.termination {
            Termination::NextPageHeader(header) => {
                self.next_page = next_page(&response.headers, header, page, &url)?;
                Ok(Some(items))
            }
            Termination::EmptyPage if items.is_empty() => Ok(None),
            Termination::EmptyPage => {
                self.next_page = Some(page + 1);
                Ok(Some(items))
            }
        }
    }
}

impl<'a, T, I> Iterator for Paginated<'a, T, I>
where
    T: Transport + ?Sized,
    I: DeserializeOwned,
{
    type Item = Result<Vec<I>, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.next_page.take()?;

        match self.fetch(page) {
            Ok(Some(items)) => Some(Ok(items)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Read the next page number out of `header`.
fn next_page(
    headers: &HeaderMap,
    header: &'static str,
    current: u32,
    url: &Url,
) -> Result<Option<u32>, FetchError> {
    let value = match headers.get(header) {
        Some(v) => v,
        None => return Ok(None),
    };

    let bad_header = || FetchError::BadHeader {
        url: url.to_string(),
        header,
        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    };

    let text = value.to_str().map_err(|_| bad_header())?.trim();
    if text.is_empty() {
        return Ok(None);
    }

    match text.parse::<u32>() {
        // a page we've already seen would loop forever
        Ok(next) if next > current => Ok(Some(next)),
        _ => Err(bad_header()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::FakeApi;
    use serde_json::Value;

    fn endpoint() -> Url {
        Url::parse("https://example.com/api/items").unwrap()
    }

    fn collect<T: Transport>(
        transport: &T,
        termination: Termination,
    ) -> Result<Vec<Value>, FetchError> {
        let mut items = Vec::new();

        for page in Paginated::new(transport, endpoint(), HeaderMap::new(), termination) {
            items.extend(page?);
        }

        Ok(items)
    }

    #[test]
    fn follow_the_next_page_header_until_it_is_missing() {
        let api = FakeApi::with_items(250, |i| serde_json::json!({ "id": i }))
            .next_page_header("x-next-page");

        let got = collect(&api, Termination::NextPageHeader("x-next-page")).unwrap();

        assert_eq!(got.len(), 250);
        assert_eq!(got[0]["id"], 0);
        assert_eq!(got[249]["id"], 249);
        assert_eq!(api.pages_requested(), vec![1, 2, 3]);
    }

    #[test]
    fn an_empty_next_page_header_is_the_last_page() {
        let api = FakeApi::with_items(100, |i| serde_json::json!(i))
            .next_page_header("x-next-page")
            .empty_header_on_last_page();

        let got = collect(&api, Termination::NextPageHeader("x-next-page")).unwrap();

        assert_eq!(got.len(), 100);
        assert_eq!(api.pages_requested(), vec![1]);
    }

    #[test]
    fn stop_at_the_first_empty_page() {
        let api = FakeApi::with_items(250, |i| serde_json::json!(i));

        let got = collect(&api, Termination::EmptyPage).unwrap();

        assert_eq!(got.len(), 250);
        // the 4th page is empty, there's no way to know that without asking
        assert_eq!(api.pages_requested(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn an_exact_multiple_of_the_page_size() {
        let api = FakeApi::with_items(200, |i| serde_json::json!(i))
            .next_page_header("x-next-page");

        let got = collect(&api, Termination::NextPageHeader("x-next-page")).unwrap();

        assert_eq!(got.len(), 200);
        assert_eq!(api.pages_requested(), vec![1, 2]);
    }

    #[test]
    fn bad_status_codes_abort_pagination() {
        let api = FakeApi::with_items(250, |i| serde_json::json!(i)).fail_on_page(2);

        let err = collect(&api, Termination::EmptyPage).unwrap_err();

        match err {
            FetchError::BadResponse { status, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
            }
            other => panic!("Unexpected error: {:?}", other),
        }
        assert_eq!(api.pages_requested(), vec![1, 2]);
    }

    #[test]
    fn a_next_page_which_goes_backwards_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert("x-next-page", "1".parse().unwrap());
        assert!(next_page(&headers, "x-next-page", 1, &endpoint()).is_err());

        headers.insert("x-next-page", "two".parse().unwrap());
        assert!(next_page(&headers, "x-next-page", 1, &endpoint()).is_err());

        headers.insert("x-next-page", "2".parse().unwrap());
        assert_eq!(next_page(&headers, "x-next-page", 1, &endpoint()).unwrap(), Some(2));
    }

    #[test]
    fn every_request_asks_for_a_full_page() {
        let api = FakeApi::with_items(1, |i| serde_json::json!(i));

        let pages: Paginated<'_, _, Value> =
            Paginated::new(&api, endpoint(), HeaderMap::new(), Termination::EmptyPage)
                .with_query("membership", "true");
        let _ = pages.collect::<Vec<_>>();

        let first = &api.requests()[0];
        let query: Vec<(String, String)> = first.url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("membership".to_string(), "true".to_string()),
                ("per_page".to_string(), "100".to_string()),
                ("page".to_string(), "1".to_string()),
            ]
        );
    }
}

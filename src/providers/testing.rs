//! An in-memory paginated API for exercising providers.

use super::pagination::{Response, Transport, PER_PAGE};
use crate::errors::FetchError;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::cell::RefCell;

#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub headers: HeaderMap,
}

#[derive(Debug, Default)]
pub struct FakeApi {
    items: Vec<Value>,
    next_page_header: Option<&'static str>,
    empty_header_on_last_page: bool,
    fail_on_page: Option<u32>,
    requests: RefCell<Vec<Request>>,
}

impl FakeApi {
    pub fn with_items<F>(count: usize, item: F) -> FakeApi
    where
        F: Fn(usize) -> Value,
    {
        FakeApi {
            items: (0..count).map(item).collect(),
            ..Default::default()
        }
    }

    pub fn next_page_header(mut self, name: &'static str) -> FakeApi {
        self.next_page_header = Some(name);
        self
    }

    pub fn empty_header_on_last_page(mut self) -> FakeApi {
        self.empty_header_on_last_page = true;
        self
    }

    pub fn fail_on_page(mut self, page: u32) -> FakeApi {
        self.fail_on_page = Some(page);
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn pages_requested(&self) -> Vec<u32> {
        self.requests
            .borrow()
            .iter()
            .map(|req| page_number(&req.url))
            .collect()
    }
}

fn page_number(url: &Url) -> u32 {
    url.query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok())
        .expect("Every request should ask for a page")
}

impl Transport for FakeApi {
    fn get(&self, url: &Url, headers: &HeaderMap) -> Result<Response, FetchError> {
        self.requests.borrow_mut().push(Request {
            url: url.clone(),
            headers: headers.clone(),
        });

        let page = page_number(url);

        if self.fail_on_page == Some(page) {
            return Ok(Response {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                headers: HeaderMap::new(),
                body: b"{\"message\": \"oops\"}".to_vec(),
            });
        }

        let per_page = PER_PAGE as usize;
        let start = (page as usize - 1) * per_page;
        let end = usize::min(start + per_page, self.items.len());
        let items: &[Value] = if start < end {
            &self.items[start..end]
        } else {
            &[]
        };

        let mut response_headers = HeaderMap::new();
        if let Some(name) = self.next_page_header {
            if end < self.items.len() {
                response_headers.insert(name, HeaderValue::from(page + 1));
            } else if self.empty_header_on_last_page {
                response_headers.insert(name, HeaderValue::from_static(""));
            }
        }

        Ok(Response {
            status: StatusCode::OK,
            headers: response_headers,
            body: serde_json::to_vec(items).expect("Values always serialize"),
        })
    }
}

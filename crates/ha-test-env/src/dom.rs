//! DOM-enabled sandbox
//!
//! [`DomEnvironment`] gives each test file a [`Document`] to render into and
//! query with CSS selectors, for testing UI fragments against live hub data.

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::environment::Environment;
use crate::error::{HassError, HassResult};

pub const DEFAULT_DOCUMENT_URL: &str = "http://localhost/";

/// An HTML document with a mutable head and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    url: String,
    head: String,
    body: String,
}

impl Document {
    pub fn blank(url: &str) -> Self {
        Self {
            url: url.to_string(),
            head: String::new(),
            body: String::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn head_html(&self) -> &str {
        &self.head
    }

    pub fn body_html(&self) -> &str {
        &self.body
    }

    pub fn set_head(&mut self, html: &str) {
        self.head = html.to_string();
    }

    pub fn set_body(&mut self, html: &str) {
        self.body = html.to_string();
    }

    pub fn append_to_body(&mut self, html: &str) {
        self.body.push_str(html);
    }

    /// Serialized document
    pub fn to_html(&self) -> String {
        format!(
            "<!DOCTYPE html><html><head>{}</head><body>{}</body></html>",
            self.head, self.body
        )
    }

    /// Text content of every element matching `selector`
    pub fn select_text(&self, selector: &str) -> HassResult<Vec<String>> {
        let selector = parse_selector(selector)?;
        let html = Html::parse_document(&self.to_html());
        Ok(html
            .select(&selector)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .collect())
    }

    /// Value of `attr` on every matching element that has it
    pub fn select_attr(&self, selector: &str, attr: &str) -> HassResult<Vec<String>> {
        let selector = parse_selector(selector)?;
        let html = Html::parse_document(&self.to_html());
        Ok(html
            .select(&selector)
            .filter_map(|element| element.value().attr(attr).map(String::from))
            .collect())
    }

    pub fn count(&self, selector: &str) -> HassResult<usize> {
        let selector = parse_selector(selector)?;
        let html = Html::parse_document(&self.to_html());
        Ok(html.select(&selector).count())
    }
}

fn parse_selector(selector: &str) -> HassResult<Selector> {
    Selector::parse(selector).map_err(|e| HassError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Sandbox that owns a document between setup and teardown
#[derive(Debug)]
pub struct DomEnvironment {
    url: String,
    document: Option<Document>,
}

impl Default for DomEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl DomEnvironment {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_DOCUMENT_URL)
    }

    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            document: None,
        }
    }

    /// `None` outside setup..teardown
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn document_mut(&mut self) -> Option<&mut Document> {
        self.document.as_mut()
    }
}

#[async_trait]
impl Environment for DomEnvironment {
    async fn setup(&mut self) -> HassResult<()> {
        self.document = Some(Document::blank(&self.url));
        Ok(())
    }

    async fn teardown(&mut self) -> HassResult<()> {
        self.document = None;
        Ok(())
    }
}
